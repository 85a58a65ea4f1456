//! Speech-to-speech pipeline: capture, normalize, transcribe, translate, speak.
//!
//! Each run executes its stages sequentially on the calling thread. Stage
//! failures are caught at the run boundary and reported with the stage that
//! raised them, together with whatever the earlier stages produced.

pub mod latency;
pub mod orchestrator;
pub mod types;

pub use latency::{StageTimings, format_duration};
pub use orchestrator::{CancelToken, Pipeline, PipelineConfig};
pub use types::{AudioInput, PipelineOutcome, RunState, Stage, StageFailure};
