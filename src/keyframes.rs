//! Similarity-based key-frame extraction for the batch preprocessing job.
//!
//! This is a different frame-selection policy from the serving path's
//! stride sampler and the two must stay separate: here frames are picked by
//! visual dissimilarity (grayscale SSIM against the previous frame), and
//! resizing preserves aspect ratio via letterbox padding instead of
//! stretching.

use image::imageops::{self, FilterType};
use image::{GrayImage, Rgb, RgbImage};
use rand::Rng;

use crate::sampler::Frame;

// SSIM stability constants for a data range of 1.0 (k1 = 0.01, k2 = 0.03).
const SSIM_C1: f32 = 0.01 * 0.01;
const SSIM_C2: f32 = 0.03 * 0.03;

#[derive(Debug, Clone, Copy)]
pub struct KeyFrameOptions {
    /// Frames scoring below this against the previous frame count as a
    /// scene change.
    pub ssim_threshold: f32,
    /// Consecutive scene-change frames required before a key frame is kept.
    pub min_scene_change: usize,
    pub max_key_frames: usize,
}

impl Default for KeyFrameOptions {
    fn default() -> Self {
        Self {
            ssim_threshold: 0.95,
            min_scene_change: 10,
            max_key_frames: 10,
        }
    }
}

/// Aspect-ratio-preserving resize with centered black padding.
pub fn letterbox(frame: &Frame, target: (u32, u32)) -> Frame {
    let (target_w, target_h) = target;
    let (w, h) = frame.dimensions();
    let aspect = w as f32 / h as f32;

    let (new_w, new_h) = if aspect > 1.0 {
        (target_w, ((target_w as f32 / aspect) as u32).max(1))
    } else {
        (((target_h as f32 * aspect) as u32).max(1), target_h)
    };
    let new_w = new_w.min(target_w);
    let new_h = new_h.min(target_h);

    let resized = imageops::resize(frame, new_w, new_h, FilterType::Triangle);

    let mut canvas = RgbImage::from_pixel(target_w, target_h, Rgb([0, 0, 0]));
    let left = (target_w - new_w) / 2;
    let top = (target_h - new_h) / 2;
    imageops::replace(&mut canvas, &resized, left as i64, top as i64);
    canvas
}

/// Random training augmentation: 50% horizontal flip, 50% small rotation
/// (-10..10 degrees) about the center, black fill outside the source.
pub fn augment<R: Rng>(frame: &Frame, rng: &mut R) -> Frame {
    let mut out = frame.clone();
    if rng.random::<f32>() < 0.5 {
        out = imageops::flip_horizontal(&out);
    }
    if rng.random::<f32>() < 0.5 {
        let angle_deg = rng.random_range(-10..10) as f32;
        out = rotate_about_center(&out, angle_deg);
    }
    out
}

/// Nearest-neighbor rotation about the image center. Output size matches
/// the input; uncovered pixels are black.
pub fn rotate_about_center(frame: &Frame, angle_deg: f32) -> Frame {
    let (w, h) = frame.dimensions();
    let cx = w as f32 / 2.0;
    let cy = h as f32 / 2.0;
    let theta = angle_deg.to_radians();
    let (sin, cos) = theta.sin_cos();

    let mut out = RgbImage::new(w, h);
    for y in 0..h {
        for x in 0..w {
            // inverse mapping: where did this output pixel come from
            let dx = x as f32 - cx;
            let dy = y as f32 - cy;
            let src_x = (cos * dx + sin * dy + cx).round();
            let src_y = (-sin * dx + cos * dy + cy).round();
            if src_x >= 0.0 && src_x < w as f32 && src_y >= 0.0 && src_y < h as f32 {
                out.put_pixel(x, y, *frame.get_pixel(src_x as u32, src_y as u32));
            }
        }
    }
    out
}

/// Global structural similarity of two grayscale images, data range 1.0.
/// Both images must have the same dimensions.
pub fn ssim(a: &GrayImage, b: &GrayImage) -> f32 {
    assert_eq!(a.dimensions(), b.dimensions());
    let n = (a.width() * a.height()) as f32;

    let mut sum_a = 0.0f32;
    let mut sum_b = 0.0f32;
    for (pa, pb) in a.pixels().zip(b.pixels()) {
        sum_a += pa[0] as f32 / 255.0;
        sum_b += pb[0] as f32 / 255.0;
    }
    let mu_a = sum_a / n;
    let mu_b = sum_b / n;

    let mut var_a = 0.0f32;
    let mut var_b = 0.0f32;
    let mut cov = 0.0f32;
    for (pa, pb) in a.pixels().zip(b.pixels()) {
        let da = pa[0] as f32 / 255.0 - mu_a;
        let db = pb[0] as f32 / 255.0 - mu_b;
        var_a += da * da;
        var_b += db * db;
        cov += da * db;
    }
    var_a /= n;
    var_b /= n;
    cov /= n;

    ((2.0 * mu_a * mu_b + SSIM_C1) * (2.0 * cov + SSIM_C2))
        / ((mu_a * mu_a + mu_b * mu_b + SSIM_C1) * (var_a + var_b + SSIM_C2))
}

/// Pick key frames by scene change.
///
/// The first frame is always kept. After that, a frame is kept once
/// `min_scene_change` consecutive frames scored below the SSIM threshold,
/// until `max_key_frames` are collected. The result is padded to
/// `max_key_frames` by repeating the last key frame (empty input stays
/// empty). Also returns the source indices where scene changes were kept.
pub fn extract_key_frames(frames: &[Frame], opts: &KeyFrameOptions) -> (Vec<Frame>, Vec<usize>) {
    let mut key_frames: Vec<Frame> = Vec::new();
    let mut scene_changes: Vec<usize> = Vec::new();
    let mut prev_gray: Option<GrayImage> = None;
    let mut run = 0usize;

    for (i, frame) in frames.iter().enumerate() {
        let gray = imageops::grayscale(frame);

        match &prev_gray {
            None => {
                key_frames.push(frame.clone());
            }
            Some(prev) => {
                if ssim(prev, &gray) < opts.ssim_threshold {
                    run += 1;
                    if run >= opts.min_scene_change && key_frames.len() < opts.max_key_frames {
                        key_frames.push(frame.clone());
                        scene_changes.push(i);
                        run = 0;
                    }
                } else {
                    run = 0;
                }
            }
        }
        prev_gray = Some(gray);
    }

    if let Some(last) = key_frames.last().cloned() {
        while key_frames.len() < opts.max_key_frames {
            key_frames.push(last.clone());
        }
    }

    (key_frames, scene_changes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    fn solid(w: u32, h: u32, value: u8) -> Frame {
        RgbImage::from_pixel(w, h, Rgb([value, value, value]))
    }

    #[test]
    fn test_letterbox_pads_wide_image_vertically() {
        let out = letterbox(&solid(64, 16, 255), (32, 32));
        assert_eq!(out.dimensions(), (32, 32));
        // content is an 8px band centered vertically
        assert_eq!(out.get_pixel(16, 0)[0], 0);
        assert_eq!(out.get_pixel(16, 16)[0], 255);
        assert_eq!(out.get_pixel(16, 31)[0], 0);
    }

    #[test]
    fn test_letterbox_pads_tall_image_horizontally() {
        let out = letterbox(&solid(16, 64, 255), (32, 32));
        assert_eq!(out.dimensions(), (32, 32));
        assert_eq!(out.get_pixel(0, 16)[0], 0);
        assert_eq!(out.get_pixel(16, 16)[0], 255);
        assert_eq!(out.get_pixel(31, 16)[0], 0);
    }

    #[test]
    fn test_letterbox_square_fills_target() {
        let out = letterbox(&solid(100, 100, 255), (32, 32));
        assert_eq!(out.get_pixel(0, 0)[0], 255);
        assert_eq!(out.get_pixel(31, 31)[0], 255);
    }

    #[test]
    fn test_ssim_identical_is_one() {
        let a = imageops::grayscale(&solid(16, 16, 128));
        let score = ssim(&a, &a.clone());
        assert!((score - 1.0).abs() < 1e-5);
    }

    #[test]
    fn test_ssim_opposite_solids_is_low() {
        let black = imageops::grayscale(&solid(16, 16, 0));
        let white = imageops::grayscale(&solid(16, 16, 255));
        assert!(ssim(&black, &white) < 0.01);
    }

    #[test]
    fn test_key_frames_first_frame_always_kept() {
        let frames = vec![solid(8, 8, 200); 5];
        let opts = KeyFrameOptions {
            min_scene_change: 1,
            max_key_frames: 3,
            ..Default::default()
        };
        let (keys, changes) = extract_key_frames(&frames, &opts);
        // identical frames: no scene changes, first frame padded out
        assert_eq!(keys.len(), 3);
        assert!(changes.is_empty());
        assert_eq!(keys[1].as_raw(), keys[0].as_raw());
    }

    #[test]
    fn test_key_frames_respect_run_length() {
        // alternate black/white so every transition scores below threshold
        let frames: Vec<Frame> = (0..7)
            .map(|i| solid(8, 8, if i % 2 == 0 { 255 } else { 0 }))
            .collect();
        let opts = KeyFrameOptions {
            min_scene_change: 2,
            max_key_frames: 4,
            ..Default::default()
        };
        let (keys, changes) = extract_key_frames(&frames, &opts);
        assert_eq!(keys.len(), 4);
        // run resets after each kept frame: changes land every 2 frames
        assert_eq!(changes, vec![2, 4, 6]);
    }

    #[test]
    fn test_key_frames_empty_input_stays_empty() {
        let (keys, changes) = extract_key_frames(&[], &KeyFrameOptions::default());
        assert!(keys.is_empty());
        assert!(changes.is_empty());
    }

    #[test]
    fn test_rotation_preserves_dimensions_and_center() {
        let frame = solid(17, 17, 99);
        let out = rotate_about_center(&frame, 7.0);
        assert_eq!(out.dimensions(), (17, 17));
        assert_eq!(out.get_pixel(8, 8)[0], 99);
    }

    #[test]
    fn test_augment_is_deterministic_under_seed() {
        let frame = solid(8, 8, 42);
        let a = augment(&frame, &mut StdRng::seed_from_u64(7));
        let b = augment(&frame, &mut StdRng::seed_from_u64(7));
        assert_eq!(a.as_raw(), b.as_raw());
        assert_eq!(a.dimensions(), (8, 8));
    }
}
