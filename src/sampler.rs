//! Frame sampler for the serving path.
//!
//! Turns an arbitrary-length animated GIF into a fixed-size batch of
//! normalized frames: stride sampling over the decoded sequence, then
//! stretch-resize to the model input size. Short or empty animations are
//! padded deterministically so the batch length never varies.
//!
//! Note: the batch preprocessing job uses a different, similarity-based
//! frame-selection policy with letterbox resize (see `keyframes`). The two
//! are intentionally separate.

use image::codecs::gif::GifDecoder;
use image::imageops::FilterType;
use image::{AnimationDecoder, DynamicImage, RgbImage};
use std::io::Cursor;

use crate::error::PipelineError;

/// A single normalized RGB frame, identified only by its batch position.
pub type Frame = RgbImage;

pub const DEFAULT_FRAME_COUNT: usize = 5;
pub const DEFAULT_FRAME_SIZE: (u32, u32) = (256, 256);

/// Sampling configuration. The defaults match the captioning model's
/// input contract (5 frames at 256x256).
#[derive(Debug, Clone, Copy)]
pub struct SampleOptions {
    pub frame_count: usize,
    pub frame_size: (u32, u32),
}

impl Default for SampleOptions {
    fn default() -> Self {
        Self {
            frame_count: DEFAULT_FRAME_COUNT,
            frame_size: DEFAULT_FRAME_SIZE,
        }
    }
}

/// Decode a GIF and sample it down to exactly `opts.frame_count` frames.
///
/// Fails with `PipelineError::Decode` if the bytes are not a parseable
/// animation container. A parseable container with zero frames is not an
/// error: the batch is filled with black frames instead.
pub fn sample(raw: &[u8], opts: &SampleOptions) -> Result<Vec<Frame>, PipelineError> {
    let frames = decode_frames(raw)?;
    Ok(sample_decoded(frames, opts))
}

/// Decode every frame of a GIF into RGB, in source order.
pub fn decode_frames(raw: &[u8]) -> Result<Vec<Frame>, PipelineError> {
    let decoder =
        GifDecoder::new(Cursor::new(raw)).map_err(|e| PipelineError::Decode(e.to_string()))?;
    let frames = decoder
        .into_frames()
        .collect_frames()
        .map_err(|e| PipelineError::Decode(e.to_string()))?;

    Ok(frames
        .into_iter()
        .map(|f| DynamicImage::ImageRgba8(f.into_buffer()).to_rgb8())
        .collect())
}

/// Source indices picked by stride sampling: 0, interval, 2*interval, ...
/// with `interval = max(total / n, 1)`, capped at `n` picks.
pub fn select_indices(total: usize, n: usize) -> Vec<usize> {
    if total == 0 || n == 0 {
        return Vec::new();
    }
    let interval = (total / n).max(1);
    (0..total).step_by(interval).take(n).collect()
}

/// Sample an already-decoded frame sequence.
///
/// Padding policy: repeat the last selected frame until the batch is full;
/// if nothing was selected (empty source), fill with all-zero frames of the
/// target size.
pub fn sample_decoded(frames: Vec<Frame>, opts: &SampleOptions) -> Vec<Frame> {
    let (width, height) = opts.frame_size;

    let mut selected: Vec<Frame> = select_indices(frames.len(), opts.frame_count)
        .into_iter()
        .map(|i| stretch_to(&frames[i], width, height))
        .collect();

    while selected.len() < opts.frame_count {
        match selected.last() {
            Some(last) => selected.push(last.clone()),
            None => selected.push(RgbImage::new(width, height)),
        }
    }

    // Defensive bound; stride selection is already capped at frame_count.
    selected.truncate(opts.frame_count);
    selected
}

/// Stretch-resize to the target size. Aspect ratio is NOT preserved here;
/// the letterbox policy in `keyframes` is a separate algorithm.
fn stretch_to(frame: &Frame, width: u32, height: u32) -> Frame {
    if frame.dimensions() == (width, height) {
        return frame.clone();
    }
    image::imageops::resize(frame, width, height, FilterType::Triangle)
}
