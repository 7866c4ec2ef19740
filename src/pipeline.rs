//! Caption aggregation pipeline.
//!
//! One frame batch in, one consolidated description out: every frame is
//! captioned by the image-to-text service, the captions are joined in frame
//! order, and the joined text is condensed by the summarization service.
//!
//! The two model services are injected as capabilities so the failure
//! policies can be unit-tested with fakes. The aggregator holds no state
//! between requests.

use crate::error::PipelineError;
use crate::sampler::{self, Frame, SampleOptions};
use futures::future::join_all;

/// Result type for external model-service calls.
pub type ServiceResult<T> = Result<T, Box<dyn std::error::Error + Send + Sync>>;

/// Per-frame image-to-text call.
pub trait CaptionService: Send + Sync {
    fn caption(&self, frame: &Frame) -> impl Future<Output = ServiceResult<String>> + Send;
}

/// Text-to-text summarization call. Beam search runs inside the external
/// model; the params are forwarded opaquely.
pub trait SummaryService: Send + Sync {
    fn summarize(
        &self,
        text: &str,
        params: &SummaryParams,
    ) -> impl Future<Output = ServiceResult<String>> + Send;
}

/// Generation parameters forwarded to the summarization model.
#[derive(Debug, Clone, Copy)]
pub struct SummaryParams {
    pub max_output_length: u32,
    pub beam_width: u32,
}

impl Default for SummaryParams {
    fn default() -> Self {
        Self {
            max_output_length: 150,
            beam_width: 4,
        }
    }
}

/// What to do when a single per-frame captioning call fails.
///
/// `Degrade` (the reference behavior) substitutes an empty string at that
/// index and keeps going; `Strict` fails the whole request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CaptionFailurePolicy {
    Degrade,
    Strict,
}

pub struct Aggregator<C, S> {
    captioner: C,
    summarizer: S,
    params: SummaryParams,
    policy: CaptionFailurePolicy,
    concurrency: usize,
}

impl<C: CaptionService, S: SummaryService> Aggregator<C, S> {
    pub fn new(captioner: C, summarizer: S) -> Self {
        Self {
            captioner,
            summarizer,
            params: SummaryParams::default(),
            policy: CaptionFailurePolicy::Degrade,
            concurrency: 1,
        }
    }

    pub fn with_policy(mut self, policy: CaptionFailurePolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Upper bound on concurrent per-frame captioning calls. 1 reproduces
    /// the reference's strictly sequential loop.
    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency.max(1);
        self
    }

    pub fn with_summary_params(mut self, params: SummaryParams) -> Self {
        self.params = params;
        self
    }

    /// Caption every frame, preserving index order regardless of which
    /// calls complete first. Output length always equals input length.
    pub async fn caption_frames(&self, frames: &[Frame]) -> Result<Vec<String>, PipelineError> {
        // Chunked join_all keeps at most `concurrency` calls in flight and
        // yields results in frame order, not completion order.
        let mut results: Vec<ServiceResult<String>> = Vec::with_capacity(frames.len());
        for chunk in frames.chunks(self.concurrency) {
            let chunk_results =
                join_all(chunk.iter().map(|frame| self.captioner.caption(frame))).await;
            results.extend(chunk_results);
        }

        let mut captions = Vec::with_capacity(frames.len());
        for (i, result) in results.into_iter().enumerate() {
            match result {
                Ok(text) => captions.push(text),
                Err(e) => match self.policy {
                    CaptionFailurePolicy::Degrade => {
                        eprintln!("[pipeline] Captioning failed for frame {}: {}", i, e);
                        captions.push(String::new());
                    }
                    CaptionFailurePolicy::Strict => {
                        return Err(PipelineError::Captioning(format!("frame {}: {}", i, e)));
                    }
                },
            }
        }
        Ok(captions)
    }

    /// Run the full aggregation: caption all frames, join with single
    /// spaces in index order, summarize. Summarization waits for every
    /// caption (or its fallback) and its failure is terminal.
    pub async fn describe(&self, frames: &[Frame]) -> Result<String, PipelineError> {
        let captions = self.caption_frames(frames).await?;
        let concatenated = captions.join(" ");

        self.summarizer
            .summarize(&concatenated, &self.params)
            .await
            .map_err(|e| PipelineError::Summarization(e.to_string()))
    }

    /// Convenience entry point: sample raw GIF bytes, then describe.
    /// A decode failure returns before any captioning call is issued.
    pub async fn describe_gif(
        &self,
        raw: &[u8],
        opts: &SampleOptions,
    ) -> Result<String, PipelineError> {
        let frames = sampler::sample(raw, opts)?;
        self.describe(&frames).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgb, RgbImage};
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    // Frames carry their index in the red channel so fakes can tell them
    // apart without any real model in the loop.
    fn indexed_frames(n: usize) -> Vec<Frame> {
        (0..n)
            .map(|i| RgbImage::from_pixel(4, 4, Rgb([i as u8, 0, 0])))
            .collect()
    }

    fn frame_index(frame: &Frame) -> usize {
        frame.get_pixel(0, 0)[0] as usize
    }

    #[derive(Default)]
    struct FakeCaptioner {
        fail_at: Option<usize>,
        reverse_delays: bool,
        calls: AtomicUsize,
        completion_order: Mutex<Vec<usize>>,
    }

    impl CaptionService for FakeCaptioner {
        async fn caption(&self, frame: &Frame) -> ServiceResult<String> {
            let i = frame_index(frame);
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.reverse_delays {
                // later indices finish first
                tokio::time::sleep(Duration::from_millis(100 - (i as u64) * 10)).await;
            }
            self.completion_order.lock().unwrap().push(i);
            if self.fail_at == Some(i) {
                return Err("model unavailable".into());
            }
            Ok(format!("caption {}", i))
        }
    }

    struct FakeSummarizer {
        fail: bool,
        seen: Mutex<Vec<String>>,
    }

    impl FakeSummarizer {
        fn new(fail: bool) -> Self {
            Self {
                fail,
                seen: Mutex::new(Vec::new()),
            }
        }
    }

    impl SummaryService for FakeSummarizer {
        async fn summarize(&self, text: &str, params: &SummaryParams) -> ServiceResult<String> {
            assert_eq!(params.max_output_length, 150);
            assert_eq!(params.beam_width, 4);
            self.seen.lock().unwrap().push(text.to_string());
            if self.fail {
                return Err("summarizer down".into());
            }
            Ok("a short description".to_string())
        }
    }

    #[tokio::test]
    async fn test_captions_join_in_index_order() {
        let agg = Aggregator::new(FakeCaptioner::default(), FakeSummarizer::new(false));
        let description = agg.describe(&indexed_frames(5)).await.unwrap();
        assert_eq!(description, "a short description");
        let seen = agg.summarizer.seen.lock().unwrap();
        assert_eq!(
            seen[0],
            "caption 0 caption 1 caption 2 caption 3 caption 4"
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_concurrent_captioning_preserves_order() {
        let captioner = FakeCaptioner {
            reverse_delays: true,
            ..Default::default()
        };
        let agg = Aggregator::new(captioner, FakeSummarizer::new(false)).with_concurrency(5);
        let captions = agg.caption_frames(&indexed_frames(5)).await.unwrap();
        assert_eq!(
            captions,
            vec!["caption 0", "caption 1", "caption 2", "caption 3", "caption 4"]
        );
        // sanity: completion order really was reversed
        let completed = agg.captioner.completion_order.lock().unwrap();
        assert_eq!(*completed, vec![4, 3, 2, 1, 0]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_partial_concurrency_still_orders_by_index() {
        // concurrency below the frame count: calls run in bounded chunks
        let captioner = FakeCaptioner {
            reverse_delays: true,
            ..Default::default()
        };
        let agg = Aggregator::new(captioner, FakeSummarizer::new(false)).with_concurrency(2);
        let captions = agg.caption_frames(&indexed_frames(5)).await.unwrap();
        assert_eq!(
            captions,
            vec!["caption 0", "caption 1", "caption 2", "caption 3", "caption 4"]
        );
        // within each in-flight pair the later frame finished first
        let completed = agg.captioner.completion_order.lock().unwrap();
        assert_eq!(*completed, vec![1, 0, 3, 2, 4]);
    }

    #[tokio::test]
    async fn test_degrade_substitutes_empty_string() {
        let captioner = FakeCaptioner {
            fail_at: Some(2),
            ..Default::default()
        };
        let agg = Aggregator::new(captioner, FakeSummarizer::new(false));
        let captions = agg.caption_frames(&indexed_frames(5)).await.unwrap();
        assert_eq!(captions.len(), 5);
        assert_eq!(captions[2], "");
        assert_eq!(captions[3], "caption 3");
    }

    #[tokio::test]
    async fn test_strict_mode_surfaces_caption_failure() {
        let captioner = FakeCaptioner {
            fail_at: Some(1),
            ..Default::default()
        };
        let agg = Aggregator::new(captioner, FakeSummarizer::new(false))
            .with_policy(CaptionFailurePolicy::Strict);
        let err = agg.describe(&indexed_frames(5)).await.unwrap_err();
        assert!(matches!(err, PipelineError::Captioning(_)));
    }

    #[tokio::test]
    async fn test_summarizer_failure_is_terminal() {
        let agg = Aggregator::new(FakeCaptioner::default(), FakeSummarizer::new(true));
        let err = agg.describe(&indexed_frames(5)).await.unwrap_err();
        assert!(matches!(err, PipelineError::Summarization(_)));
    }

    #[tokio::test]
    async fn test_decode_failure_issues_no_caption_calls() {
        let agg = Aggregator::new(FakeCaptioner::default(), FakeSummarizer::new(false));
        let err = agg
            .describe_gif(b"not a gif at all", &SampleOptions::default())
            .await
            .unwrap_err();
        assert!(matches!(err, PipelineError::Decode(_)));
        assert_eq!(agg.captioner.calls.load(Ordering::SeqCst), 0);
    }
}
