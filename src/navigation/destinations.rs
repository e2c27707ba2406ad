//! Static destination catalog.

use crate::location::Position;
use serde::{Deserialize, Serialize};

/// A known place a session can navigate to. Read-only during navigation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Destination {
    pub id: String,
    pub name: String,
    pub position: Position,
    #[serde(default)]
    pub description: Option<String>,
}

/// Fixed set of destinations, resolvable by id or name.
#[derive(Debug, Clone, Default)]
pub struct DestinationCatalog {
    entries: Vec<Destination>,
}

impl DestinationCatalog {
    pub fn new(entries: Vec<Destination>) -> Self {
        Self { entries }
    }

    /// The catalog bundled with the engine.
    pub fn builtin() -> Self {
        fn entry(id: &str, name: &str, lat: f64, lon: f64, description: &str) -> Destination {
            Destination {
                id: id.to_owned(),
                name: name.to_owned(),
                position: Position::new(lat, lon),
                description: Some(description.to_owned()),
            }
        }
        Self::new(vec![
            entry(
                "main-entrance",
                "Main Entrance",
                51.5012,
                -0.1248,
                "Street-level entrance with step-free access",
            ),
            entry(
                "transit-stop",
                "Transit Stop",
                51.5021,
                -0.1265,
                "Bus and tram stop with tactile paving",
            ),
            entry(
                "pharmacy",
                "Pharmacy",
                51.5004,
                -0.1231,
                "Corner pharmacy, automatic doors",
            ),
            entry(
                "park-gate",
                "Park Gate",
                51.5038,
                -0.1224,
                "South gate of the riverside park",
            ),
            entry(
                "library",
                "Library",
                51.4995,
                -0.1272,
                "Public library, accessible reading room on the ground floor",
            ),
        ])
    }

    /// Resolve a reference: exact id match first, then case-insensitive name.
    pub fn resolve(&self, reference: &str) -> Option<&Destination> {
        self.entries
            .iter()
            .find(|d| d.id == reference)
            .or_else(|| {
                self.entries
                    .iter()
                    .find(|d| d.name.eq_ignore_ascii_case(reference))
            })
    }

    pub fn entries(&self) -> &[Destination] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
