//! Batch preprocessing job for the captioning dataset.
//!
//! Consumes split listing files (`<name>: <description>` per line), runs
//! each GIF through the key-frame policy (letterbox resize, optional
//! augmentation, SSIM key-frame extraction), and writes per-GIF frame PNGs
//! plus a JSON record under `<output>/<split>/<name>/`. Per-GIF failures
//! are logged and skipped; a bad file never aborts the split.

use rand::SeedableRng;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tokio::task::JoinSet;

use crate::keyframes::{self, KeyFrameOptions};
use crate::sampler;

/// One line of a split listing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DatasetEntry {
    pub gif_file: String,
    pub description: String,
}

/// Record written alongside the extracted key frames of one GIF.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GifRecord {
    pub gif_file: String,
    pub description: String,
    pub frame_count: usize,
    pub scene_changes: Vec<usize>,
    pub frames: Vec<String>,
    pub processed_at: chrono::DateTime<chrono::Utc>,
}

#[derive(Debug, Clone)]
pub struct JobOptions {
    /// Directory holding a `gifs/` subdirectory with the source files.
    pub input_dir: PathBuf,
    pub output_dir: PathBuf,
    pub frame_size: (u32, u32),
    pub key_frames: KeyFrameOptions,
    /// Random flip/rotation, train split only.
    pub augment: bool,
    pub concurrency: usize,
}

#[derive(Debug, Default)]
pub struct SplitSummary {
    pub processed: usize,
    pub failed: usize,
}

/// Parse a split listing. Lines that don't match `name: description` are
/// skipped. Listed names carry no extension; `.gif` is appended.
pub fn parse_listing(content: &str) -> Vec<DatasetEntry> {
    content
        .lines()
        .filter_map(|line| {
            let line = line.trim();
            if line.is_empty() {
                return None;
            }
            let (name, description) = line.split_once(": ")?;
            Some(DatasetEntry {
                gif_file: format!("{}.gif", name.trim()),
                description: description.trim().to_string(),
            })
        })
        .collect()
}

/// Process one split end to end. Work is spread over `concurrency` tasks,
/// refilled as each finishes.
pub async fn run_split(
    split: &str,
    listing_path: &Path,
    opts: &JobOptions,
) -> Result<SplitSummary, Box<dyn std::error::Error + Send + Sync>> {
    let content = tokio::fs::read_to_string(listing_path).await?;
    let mut entries = parse_listing(&content).into_iter();

    let mut summary = SplitSummary::default();
    let mut tasks = JoinSet::new();

    loop {
        while tasks.len() < opts.concurrency.max(1) {
            let Some(entry) = entries.next() else { break };
            let opts = opts.clone();
            let split = split.to_string();
            tasks.spawn(async move {
                let name = entry.gif_file.clone();
                let result = process_gif(&split, entry, &opts).await;
                if let Err(e) = &result {
                    eprintln!("[dataset] Failed {} in split {}: {}", name, split, e);
                }
                result.is_ok()
            });
        }

        let Some(result) = tasks.join_next().await else {
            break;
        };
        match result {
            Ok(true) => summary.processed += 1,
            Ok(false) => summary.failed += 1,
            Err(e) => {
                eprintln!("[dataset] Task panicked: {}", e);
                summary.failed += 1;
            }
        }
    }

    println!(
        "[dataset] Split {} complete: {} processed, {} failed",
        split, summary.processed, summary.failed
    );
    Ok(summary)
}

/// Decode, letterbox, optionally augment, extract key frames, write output.
async fn process_gif(
    split: &str,
    entry: DatasetEntry,
    opts: &JobOptions,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let gif_path = opts.input_dir.join("gifs").join(&entry.gif_file);
    let raw = tokio::fs::read(&gif_path).await?;

    let decoded = sampler::decode_frames(&raw)?;

    // StdRng rather than ThreadRng: this future is spawned and must be Send
    let mut rng = rand::rngs::StdRng::from_os_rng();
    let processed: Vec<_> = decoded
        .iter()
        .map(|frame| {
            let boxed = keyframes::letterbox(frame, opts.frame_size);
            if opts.augment {
                keyframes::augment(&boxed, &mut rng)
            } else {
                boxed
            }
        })
        .collect();

    let (key_frames, scene_changes) = keyframes::extract_key_frames(&processed, &opts.key_frames);
    if key_frames.is_empty() {
        return Err("no frames extracted".into());
    }

    let stem = entry.gif_file.trim_end_matches(".gif");
    let out_dir = opts.output_dir.join(split).join(stem);
    tokio::fs::create_dir_all(&out_dir).await?;

    let mut frame_files = Vec::with_capacity(key_frames.len());
    for (i, frame) in key_frames.iter().enumerate() {
        let filename = format!("frame_{}.png", i);
        frame.save(out_dir.join(&filename))?;
        frame_files.push(filename);
    }

    let record = GifRecord {
        gif_file: entry.gif_file,
        description: entry.description,
        frame_count: key_frames.len(),
        scene_changes,
        frames: frame_files,
        processed_at: chrono::Utc::now(),
    };
    let json = serde_json::to_string_pretty(&record)?;
    tokio::fs::write(out_dir.join("record.json"), json).await?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::codecs::gif::GifEncoder;
    use image::{Frame as GifFrame, RgbaImage};

    #[test]
    fn test_parse_listing() {
        let content = "dog_123: a dog running in a park\n\ncat_9: a cat sleeping  \nbadline\n";
        let entries = parse_listing(content);
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].gif_file, "dog_123.gif");
        assert_eq!(entries[0].description, "a dog running in a park");
        assert_eq!(entries[1].gif_file, "cat_9.gif");
        assert_eq!(entries[1].description, "a cat sleeping");
    }

    fn write_test_gif(path: &Path, frame_count: u32) {
        let mut buf = Vec::new();
        {
            let mut encoder = GifEncoder::new(&mut buf);
            for i in 0..frame_count {
                let value = if i % 2 == 0 { 255 } else { 0 };
                let rgba = RgbaImage::from_pixel(8, 8, image::Rgba([value, value, value, 255]));
                encoder.encode_frame(GifFrame::new(rgba)).unwrap();
            }
        }
        std::fs::write(path, buf).unwrap();
    }

    #[tokio::test]
    async fn test_run_split_writes_frames_and_records() {
        let dir = tempfile::tempdir().unwrap();
        let input_dir = dir.path().join("input");
        let output_dir = dir.path().join("output");
        std::fs::create_dir_all(input_dir.join("gifs")).unwrap();

        write_test_gif(&input_dir.join("gifs/sample_1.gif"), 6);
        let listing = input_dir.join("train_with_description.txt");
        std::fs::write(
            &listing,
            "sample_1: a flickering square\nmissing_2: not on disk\n",
        )
        .unwrap();

        let opts = JobOptions {
            input_dir,
            output_dir: output_dir.clone(),
            frame_size: (16, 16),
            key_frames: KeyFrameOptions {
                min_scene_change: 1,
                max_key_frames: 4,
                ..Default::default()
            },
            augment: false,
            concurrency: 2,
        };

        let summary = run_split("train", &listing, &opts).await.unwrap();
        assert_eq!(summary.processed, 1);
        assert_eq!(summary.failed, 1);

        let record_path = output_dir.join("train/sample_1/record.json");
        let record: GifRecord =
            serde_json::from_str(&std::fs::read_to_string(&record_path).unwrap()).unwrap();
        assert_eq!(record.frame_count, 4);
        assert_eq!(record.frames.len(), 4);
        for filename in &record.frames {
            let frame_path = output_dir.join("train/sample_1").join(filename);
            let img = image::open(&frame_path).unwrap();
            assert_eq!(img.width(), 16);
            assert_eq!(img.height(), 16);
        }
    }
}
