//! Image size cache
//!
//! Remembers picture dimensions so async requests can report a provisional size (and
//! the loader can estimate its memory) before the picture is decoded. Dimensions come
//! either from a header-only probe or from a completed decode. Failed probes are
//! remembered too, so a missing file is only checked once.

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};

use ahash::AHashMap;
use marquee_core::Size2;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use crate::AssetResult;

/// Dimensions recorded for one source file
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
struct SizeEntry {
    file_size: u64,
    width: u32,
    height: u32,
}

impl SizeEntry {
    fn size(&self) -> Size2 {
        Size2::new(self.width, self.height)
    }
}

/// Thread-safe memo of picture dimensions keyed by texture path
#[derive(Debug, Default)]
pub struct ImageSizeCache {
    entries: Mutex<AHashMap<String, Option<SizeEntry>>>,
    dirty: AtomicBool,
}

impl ImageSizeCache {
    /// Create an empty cache
    pub fn new() -> Self {
        Self::default()
    }

    /// Dimensions of the picture behind `path`, read from `file`'s header when unknown
    ///
    /// A recorded size is discarded when the file size on disk no longer matches it.
    pub fn probe(&self, path: &str, file: &Path) -> Option<Size2> {
        let file_size = std::fs::metadata(file).map(|m| m.len()).ok();

        if let Some(cached) = self.entries.lock().get(path) {
            match cached {
                None => return None,
                Some(entry) if Some(entry.file_size) == file_size => return Some(entry.size()),
                Some(_) => {}
            }
        }

        let probed = match (file_size, image::image_dimensions(file)) {
            (Some(file_size), Ok((width, height))) if width > 0 && height > 0 => Some(SizeEntry {
                file_size,
                width,
                height,
            }),
            _ => None,
        };

        self.entries.lock().insert(path.to_string(), probed);
        if probed.is_some() {
            self.dirty.store(true, Ordering::Relaxed);
        }
        probed.map(|entry| entry.size())
    }

    /// Record the natural size of a decoded picture
    pub fn update(&self, path: &str, file_size: u64, size: Size2) {
        if size.is_empty() {
            return;
        }
        let entry = SizeEntry {
            file_size,
            width: size.width,
            height: size.height,
        };
        let previous = self.entries.lock().insert(path.to_string(), Some(entry));
        if previous != Some(Some(entry)) {
            self.dirty.store(true, Ordering::Relaxed);
        }
    }

    /// Recorded size for `path`, without probing
    pub fn get(&self, path: &str) -> Option<Size2> {
        self.entries
            .lock()
            .get(path)
            .copied()
            .flatten()
            .map(|entry| entry.size())
    }

    /// Number of remembered paths, failures included
    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    /// True when nothing is remembered
    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }

    /// True when sizes were recorded since the last save or load
    pub fn is_dirty(&self) -> bool {
        self.dirty.load(Ordering::Relaxed)
    }

    /// Load a cache previously written by [`save`](Self::save)
    pub fn load(path: &Path) -> AssetResult<Self> {
        let content = std::fs::read_to_string(path)?;
        let stored: BTreeMap<String, SizeEntry> = serde_json::from_str(&content)?;
        let entries = stored
            .into_iter()
            .map(|(key, entry)| (key, Some(entry)))
            .collect();

        Ok(Self {
            entries: Mutex::new(entries),
            dirty: AtomicBool::new(false),
        })
    }

    /// Write known sizes as JSON; failed probes are not persisted
    pub fn save(&self, path: &Path) -> AssetResult<()> {
        let stored: BTreeMap<String, SizeEntry> = self
            .entries
            .lock()
            .iter()
            .filter_map(|(key, entry)| entry.map(|entry| (key.clone(), entry)))
            .collect();

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, serde_json::to_string_pretty(&stored)?)?;
        self.dirty.store(false, Ordering::Relaxed);

        log::debug!("Saved {} image sizes to {}", stored.len(), path.display());
        Ok(())
    }
}
