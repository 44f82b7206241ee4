//! Frame sampling and selection.
//!
//! The sampler reduces a video timeline to a bounded set of candidate
//! images; the selector picks a small, temporally spread subset of the
//! scored candidates.

pub mod sampler;
pub mod selector;

pub use sampler::{sample_frames, sampling_interval, SampledFrame, SamplerConfig};
pub use selector::{select_frames, Selection, SelectorConfig};
