//! Shared data models for the postlist pipeline.
//!
//! This crate provides Serde-serializable types for:
//! - Source keys parsed from post URLs
//! - Request and session identifiers
//! - Processing stages and progress events
//! - Scored frames
//! - Listings and result documents
//! - Request status snapshots for polling

pub mod frame;
pub mod listing;
pub mod progress;
pub mod request;
pub mod source;
pub mod stage;
pub mod status;

// Re-export common types
pub use frame::Frame;
pub use listing::{image_reference, Listing, ResultDocument};
pub use progress::ProgressEvent;
pub use request::{RequestId, SessionId};
pub use source::{SourceKey, SourceKeyError};
pub use stage::ProcessingStage;
pub use status::RequestStatus;
