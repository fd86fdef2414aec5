//! Error handling for the m3u-slim application
//!
//! Provides a hierarchical error system: `AppError` at the top, with
//! source-handling and storage errors as dedicated sub-enums.

pub mod types;

pub use types::{AppError, SourceError, StorageError};

/// Convenience result alias used throughout the application
pub type AppResult<T> = Result<T, AppError>;
