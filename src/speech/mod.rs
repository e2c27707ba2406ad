//! Serialized speech output.
//!
//! All spoken announcements, from navigation and detection alike, funnel
//! through one [`SpeechQueue`]. A single consumer task owns the backlog and
//! awaits each utterance's completion before starting the next, so no two
//! utterances ever overlap and ordering is strict FIFO across producers.

use crate::config::SpeechConfig;
use crate::device::{TtsDevice, VoiceParams};
use crate::runtime::{EventSender, RuntimeEvent};
use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use tokio::sync::mpsc;
use tracing::{debug, warn};

/// Identifier for one enqueued utterance, monotonically increasing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct UtteranceId(u64);

impl std::fmt::Display for UtteranceId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "u{}", self.0)
    }
}

/// Partial voice parameters; `None` fields fall back to the queue defaults.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SpeechOptions {
    pub rate: Option<f32>,
    pub pitch: Option<f32>,
    pub language: Option<String>,
}

/// One queued spoken message.
#[derive(Debug, Clone)]
pub struct Utterance {
    pub id: UtteranceId,
    pub text: String,
    pub options: SpeechOptions,
}

/// Speech queue lifecycle events.
#[derive(Debug, Clone)]
pub enum SpeechEvent {
    /// An utterance started vocalizing.
    Started { id: UtteranceId, text: String },
    /// An utterance finished (successfully or not). Emitted exactly once
    /// per enqueued utterance, in insertion order.
    Finished { id: UtteranceId, ok: bool },
    /// `stop` dropped this many pending utterances.
    Cleared { dropped: usize },
}

enum Command {
    Enqueue(Utterance),
    Stop,
    SetDefaults(SpeechOptions),
}

/// Handle to the speech consumer task.
pub struct SpeechQueue {
    cmd_tx: mpsc::UnboundedSender<Command>,
    speaking: Arc<AtomicBool>,
    enabled: Arc<AtomicBool>,
    next_id: AtomicU64,
}

impl SpeechQueue {
    /// Spawn the consumer task over `device`.
    pub fn new(device: Arc<dyn TtsDevice>, config: &SpeechConfig, events: EventSender) -> Self {
        let (cmd_tx, cmd_rx) = mpsc::unbounded_channel();
        let speaking = Arc::new(AtomicBool::new(false));
        let enabled = Arc::new(AtomicBool::new(config.enabled));
        let defaults = VoiceParams {
            rate: config.rate,
            pitch: config.pitch,
            language: config.language.clone(),
        };
        tokio::spawn(run_queue(
            device,
            cmd_rx,
            defaults,
            Arc::clone(&speaking),
            Arc::clone(&enabled),
            events,
        ));
        Self {
            cmd_tx,
            speaking,
            enabled,
            next_id: AtomicU64::new(0),
        }
    }

    /// Queue an utterance. Starts immediately when the queue is idle.
    pub fn enqueue(&self, text: &str, options: SpeechOptions) -> UtteranceId {
        let id = UtteranceId(self.next_id.fetch_add(1, Ordering::Relaxed) + 1);
        let utterance = Utterance {
            id,
            text: text.to_owned(),
            options,
        };
        if self.cmd_tx.send(Command::Enqueue(utterance)).is_err() {
            warn!("speech queue task is gone; dropping utterance {id}");
        }
        id
    }

    /// Queue an utterance with the current default options.
    pub fn enqueue_default(&self, text: &str) -> UtteranceId {
        self.enqueue(text, SpeechOptions::default())
    }

    /// Halt the current utterance and drop the entire backlog.
    ///
    /// The queue stays usable: a subsequent `enqueue` starts immediately.
    pub fn stop(&self) {
        let _ = self.cmd_tx.send(Command::Stop);
    }

    /// Shallow-merge `options` into the defaults used for future utterances.
    pub fn set_default_options(&self, options: SpeechOptions) {
        let _ = self.cmd_tx.send(Command::SetDefaults(options));
    }

    /// Whether an utterance is being vocalized right now.
    pub fn is_speaking(&self) -> bool {
        self.speaking.load(Ordering::Relaxed)
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::Relaxed)
    }

    /// Enable or disable vocalization. While disabled, enqueued utterances
    /// complete immediately without reaching the device.
    pub fn set_enabled(&self, enabled: bool) {
        self.enabled.store(enabled, Ordering::Relaxed);
    }
}

fn apply_defaults(defaults: &mut VoiceParams, options: SpeechOptions) {
    if let Some(rate) = options.rate {
        defaults.rate = rate;
    }
    if let Some(pitch) = options.pitch {
        defaults.pitch = pitch;
    }
    if let Some(language) = options.language {
        defaults.language = language;
    }
}

fn resolve(options: &SpeechOptions, defaults: &VoiceParams) -> VoiceParams {
    VoiceParams {
        rate: options.rate.unwrap_or(defaults.rate),
        pitch: options.pitch.unwrap_or(defaults.pitch),
        language: options
            .language
            .clone()
            .unwrap_or_else(|| defaults.language.clone()),
    }
}

/// Consumer loop: pop the backlog front, await the device, repeat.
///
/// Completion of the in-flight utterance is the only advancement signal;
/// while one is outstanding the loop stays responsive to commands so `stop`
/// can interrupt mid-utterance.
async fn run_queue(
    device: Arc<dyn TtsDevice>,
    mut cmd_rx: mpsc::UnboundedReceiver<Command>,
    mut defaults: VoiceParams,
    speaking: Arc<AtomicBool>,
    enabled: Arc<AtomicBool>,
    events: EventSender,
) {
    let mut backlog: VecDeque<Utterance> = VecDeque::new();
    loop {
        if let Some(utterance) = backlog.pop_front() {
            if !enabled.load(Ordering::Relaxed) {
                // Speech is off: report completion, vocalize nothing.
                let _ = events.send(RuntimeEvent::Speech(SpeechEvent::Finished {
                    id: utterance.id,
                    ok: true,
                }));
                continue;
            }

            let params = resolve(&utterance.options, &defaults);
            speaking.store(true, Ordering::Relaxed);
            let _ = events.send(RuntimeEvent::Speech(SpeechEvent::Started {
                id: utterance.id,
                text: utterance.text.clone(),
            }));

            let speak = device.speak(&utterance.text, &params);
            tokio::pin!(speak);
            let mut shutdown = false;
            let ok = loop {
                tokio::select! {
                    result = &mut speak => {
                        if let Err(e) = &result {
                            warn!("utterance {} failed: {e}", utterance.id);
                        }
                        break result.is_ok();
                    }
                    cmd = cmd_rx.recv() => match cmd {
                        Some(Command::Enqueue(next)) => backlog.push_back(next),
                        Some(Command::SetDefaults(options)) => apply_defaults(&mut defaults, options),
                        Some(Command::Stop) => {
                            device.stop();
                            let dropped = backlog.len();
                            backlog.clear();
                            if dropped > 0 {
                                let _ = events.send(RuntimeEvent::Speech(SpeechEvent::Cleared { dropped }));
                            }
                            debug!("speech stopped mid-utterance, {dropped} pending dropped");
                            break false;
                        }
                        None => {
                            shutdown = true;
                            break false;
                        }
                    }
                }
            };
            speaking.store(false, Ordering::Relaxed);
            if shutdown {
                device.stop();
                return;
            }
            let _ = events.send(RuntimeEvent::Speech(SpeechEvent::Finished {
                id: utterance.id,
                ok,
            }));
        } else {
            match cmd_rx.recv().await {
                Some(Command::Enqueue(utterance)) => backlog.push_back(utterance),
                Some(Command::SetDefaults(options)) => apply_defaults(&mut defaults, options),
                // Nothing in flight and nothing pending; stop is a no-op
                // but still pokes the device in case it is mid-utterance
                // from a previous life.
                Some(Command::Stop) => device.stop(),
                None => return,
            }
        }
    }
}
