//! snaplabel Core
//!
//! Core types, traits, and utilities shared across snaplabel components.
//!
//! This crate provides:
//! - The error taxonomy for fetching, loading, preprocessing and inference
//! - The class vocabulary and the prediction result indexed against it
//! - The presentation ranking contract (stable descending sort, top-label flag)

pub mod error;
pub mod rank;
pub mod types;

pub use error::{Error, ErrorKind, Result};
pub use rank::{rank, RankedEntry};
pub use types::{ClassId, PredictionResult, Vocabulary};

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::error::{Error, ErrorKind, Result};
    pub use crate::rank::{rank, RankedEntry};
    pub use crate::types::{ClassId, PredictionResult, Vocabulary};
}
