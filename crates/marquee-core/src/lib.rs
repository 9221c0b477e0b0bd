//! # Marquee Core
//!
//! Foundational types shared by every Marquee crate.
//!
//! - **Config**: texture settings, on-disk frontend configuration and a live settings handle
//! - **Memory**: VRAM budgets, allocation statistics and usage reports
//! - **Math**: picture sizing helpers used when fitting images into a target box

pub mod config;
pub mod math;
pub mod memory;

pub use config::{FrontendConfig, SettingsHandle, TextureSettings};
pub use math::{MaxSizeInfo, Size2};
pub use memory::{MemoryBudget, MemoryReport, MemoryStats};

use thiserror::Error;

/// Core errors
#[derive(Error, Debug)]
pub enum CoreError {
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),
}

/// Result type for core operations
pub type CoreResult<T> = Result<T, CoreError>;

/// Bytes in one megabyte, as used by every MB-denominated setting
pub const MEGABYTE: usize = 1024 * 1024;
