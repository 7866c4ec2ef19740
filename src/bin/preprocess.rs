//! Key-frame dataset preprocessing job.
//!
//! Usage: `preprocess <input_dir> <output_dir>`
//!
//! Expects `<input_dir>/gifs/` with the source GIFs and one listing file
//! per split (`train_with_description.txt`, `val_with_description.txt`,
//! `test_with_description.txt`) next to it. Augmentation is applied to the
//! train split only.

use std::env;
use std::path::PathBuf;

use gifcap::dataset::{JobOptions, run_split};
use gifcap::keyframes::KeyFrameOptions;

const DEFAULT_CONCURRENCY: usize = 4;
const SPLITS: [&str; 3] = ["train", "val", "test"];

fn job_concurrency() -> usize {
    env::var("PREPROCESS_CONCURRENCY")
        .ok()
        .and_then(|s| s.parse().ok())
        .filter(|v| *v > 0)
        .unwrap_or(DEFAULT_CONCURRENCY)
}

#[tokio::main]
async fn main() {
    let mut args = env::args().skip(1);
    let (Some(input_dir), Some(output_dir)) = (args.next(), args.next()) else {
        eprintln!("Usage: preprocess <input_dir> <output_dir>");
        std::process::exit(2);
    };
    let input_dir = PathBuf::from(input_dir);
    let output_dir = PathBuf::from(output_dir);

    let concurrency = job_concurrency();
    println!(
        "[dataset] Preprocessing {:?} -> {:?} ({} concurrency)",
        input_dir, output_dir, concurrency
    );

    let mut failed_splits = 0;
    for split in SPLITS {
        let listing = input_dir.join(format!("{}_with_description.txt", split));
        if !listing.exists() {
            eprintln!("[dataset] Missing listing for split {}: {:?}", split, listing);
            failed_splits += 1;
            continue;
        }

        let opts = JobOptions {
            input_dir: input_dir.clone(),
            output_dir: output_dir.clone(),
            frame_size: (256, 256),
            key_frames: KeyFrameOptions::default(),
            augment: split == "train",
            concurrency,
        };

        if let Err(e) = run_split(split, &listing, &opts).await {
            eprintln!("[dataset] Split {} failed: {}", split, e);
            failed_splits += 1;
        }
    }

    if failed_splits > 0 {
        std::process::exit(1);
    }
}
