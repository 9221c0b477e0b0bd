//! # Marquee Platform
//!
//! Platform abstraction layer for the Marquee frontend.
//!
//! This crate provides cross-platform abstractions for:
//! - **FileSystem**: canonical paths, bundled `:/` resources, file I/O and cache directories
//! - **Threading**: named worker threads and worker-count policy

pub mod filesystem;
pub mod threading;

pub use filesystem::{FileHandle, FileMode, FileSystem, canonical_path, is_bundled};
pub use threading::{Thread, default_worker_count};

use thiserror::Error;

/// Platform-specific errors
#[derive(Error, Debug)]
pub enum PlatformError {
    #[error("File I/O error: {0}")]
    FileIO(#[from] std::io::Error),

    #[error("Resource not found: {0}")]
    ResourceNotFound(String),

    #[error("Thread spawn failed: {0}")]
    ThreadSpawn(String),
}

/// Result type for platform operations
pub type PlatformResult<T> = Result<T, PlatformError>;
