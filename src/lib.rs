//! GIF captioning pipeline.
//!
//! Serving path: `sampler` turns raw GIF bytes into a fixed-size frame
//! batch, `pipeline` captions each frame through a hosted image-to-text
//! model and condenses the captions with a summarization model. The HTTP
//! surface lives in the `gifcap` binary; the `preprocess` binary runs the
//! separate key-frame dataset job.

pub mod dataset;
pub mod error;
pub mod fetch;
pub mod keyframes;
pub mod pipeline;
pub mod sampler;
pub mod services;
