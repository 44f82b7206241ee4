//! Client for the frame relevance classifier service.
//!
//! The service scores one image at a time and answers with a relevance in
//! [0, 1]. Transient failures are retried here with exponential backoff;
//! callers see either a validated score or an error.

pub mod client;
pub mod error;
pub mod types;

pub use client::{MlClient, MlClientConfig};
pub use error::{MlError, MlResult};
pub use types::{ClassifyResponse, HealthResponse};
