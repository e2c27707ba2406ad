//! Frame preprocessing: encoded camera buffer → model input tensor.

use crate::error::{AssistError, Result};
use image::imageops::FilterType;

/// Decode an encoded frame (JPEG or PNG) and produce a normalized NHWC
/// `[1, S, S, 3]` tensor, flattened, with values in `[0, 1]`.
///
/// # Errors
///
/// Returns a [`Device`](AssistError::Device) error when the buffer cannot
/// be decoded.
pub fn tensor_from_frame(data: &[u8], input_size: u32) -> Result<Vec<f32>> {
    let decoded = image::load_from_memory(data)
        .map_err(|e| AssistError::Device(format!("failed to decode frame: {e}")))?;
    let resized = decoded.resize_exact(input_size, input_size, FilterType::Triangle);
    let rgb = resized.to_rgb8();

    let mut tensor = Vec::with_capacity((input_size * input_size * 3) as usize);
    tensor.extend(rgb.as_raw().iter().map(|&v| f32::from(v) / 255.0));
    Ok(tensor)
}
