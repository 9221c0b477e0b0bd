//! Threading Primitives
//!
//! Named background threads and the worker-count policy for decode pools.

use std::thread::{self, JoinHandle};

use crate::{PlatformError, PlatformResult};

/// Thread wrapper that joins on request and reports spawn failures as errors
pub struct Thread {
    handle: Option<JoinHandle<()>>,
    name: String,
}

impl Thread {
    /// Spawn a new thread with the given name and function
    pub fn spawn<F>(name: impl Into<String>, f: F) -> PlatformResult<Self>
    where
        F: FnOnce() + Send + 'static,
    {
        let name = name.into();

        let handle = thread::Builder::new()
            .name(name.clone())
            .spawn(f)
            .map_err(|e| PlatformError::ThreadSpawn(format!("{name}: {e}")))?;

        Ok(Self {
            handle: Some(handle),
            name,
        })
    }

    /// Get the thread name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Join the thread, waiting for it to complete
    pub fn join(mut self) -> thread::Result<()> {
        match self.handle.take() {
            Some(handle) => handle.join(),
            None => Ok(()),
        }
    }
}

/// Number of background decode workers: half the hardware threads, at least one
pub fn default_worker_count() -> usize {
    let hardware = thread::available_parallelism()
        .map(|p| p.get())
        .unwrap_or(2);
    (hardware / 2).max(1)
}
