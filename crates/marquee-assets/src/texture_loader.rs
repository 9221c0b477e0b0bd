//! Texture Loader
//!
//! Background decode pool. Requests queue most-recent-first; a queued request can be
//! cancelled for free, a started one always runs to completion.
//!
//! Each texture is in at most one of the pending queue and the processing set. Both
//! live under one mutex with a condition variable for workers and one for idle waiters.

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::{Duration, Instant};

use ahash::{AHashMap, AHashSet};
use marquee_platform::{Thread, default_worker_count};
use parking_lot::{Condvar, Mutex, MutexGuard};

use crate::texture_data::{TextureData, TextureDataId};

#[derive(Default)]
struct LoaderQueue {
    pending: VecDeque<Arc<TextureData>>,
    pending_ids: AHashSet<TextureDataId>,
    processing: AHashMap<TextureDataId, Arc<TextureData>>,
    paused: bool,
    exit: bool,
}

impl LoaderQueue {
    fn is_idle(&self) -> bool {
        self.pending.is_empty() && self.processing.is_empty()
    }

    fn remove_pending(&mut self, id: TextureDataId) -> bool {
        if !self.pending_ids.remove(&id) {
            return false;
        }
        self.pending.retain(|tex| tex.id() != id);
        true
    }
}

struct LoaderShared {
    queue: Mutex<LoaderQueue>,
    available: Condvar,
    idle: Condvar,
}

impl LoaderShared {
    fn notify_if_idle(&self, queue: &LoaderQueue) {
        if queue.is_idle() {
            self.idle.notify_all();
        }
    }
}

/// Pool of decode threads fed by a cancellable queue
pub struct TextureLoader {
    shared: Arc<LoaderShared>,
    workers: Vec<Thread>,
}

impl Default for TextureLoader {
    fn default() -> Self {
        Self::new()
    }
}

impl TextureLoader {
    /// Create a loader with the default worker count
    pub fn new() -> Self {
        Self::with_workers(default_worker_count())
    }

    /// Create a loader with `count` workers (at least one)
    pub fn with_workers(count: usize) -> Self {
        let shared = Arc::new(LoaderShared {
            queue: Mutex::new(LoaderQueue::default()),
            available: Condvar::new(),
            idle: Condvar::new(),
        });

        let mut workers = Vec::with_capacity(count.max(1));
        for index in 0..count.max(1) {
            let worker_shared = shared.clone();
            match Thread::spawn(format!("texture-loader-{index}"), move || {
                worker_loop(&worker_shared)
            }) {
                Ok(thread) => workers.push(thread),
                Err(e) => log::error!("Failed to start texture loader: {}", e),
            }
        }

        if workers.is_empty() {
            log::error!("No texture loader threads running, async loads will not complete");
        } else {
            log::debug!("Texture loader started with {} workers", workers.len());
        }

        Self { shared, workers }
    }

    /// Number of running workers
    pub fn worker_count(&self) -> usize {
        self.workers.len()
    }

    /// Queue a texture for decoding, ahead of everything already queued
    ///
    /// Does nothing when the texture is loaded or being decoded. A texture already
    /// pending is moved to the front.
    pub fn load(&self, tex: &Arc<TextureData>) {
        let mut queue = self.shared.queue.lock();

        if queue.processing.contains_key(&tex.id()) || tex.is_loaded() {
            return;
        }

        if !queue.pending_ids.insert(tex.id()) {
            queue.pending.retain(|pending| pending.id() != tex.id());
        }
        queue.pending.push_front(tex.clone());
        self.shared.available.notify_one();
    }

    /// Cancel a pending request
    ///
    /// Returns false when the texture is not pending, including when a worker is
    /// already decoding it.
    pub fn remove(&self, tex: &TextureData) -> bool {
        let mut queue = self.shared.queue.lock();
        let removed = queue.remove_pending(tex.id());
        if removed {
            self.shared.notify_if_idle(&queue);
        }
        removed
    }

    /// Cancel every pending request
    pub fn clear_queue(&self) {
        let mut queue = self.shared.queue.lock();
        queue.pending.clear();
        queue.pending_ids.clear();
        self.shared.notify_if_idle(&queue);
    }

    /// Estimated bytes of every pending and processing texture once decoded
    pub fn queue_size(&self) -> usize {
        let queue = self.shared.queue.lock();
        queue
            .pending
            .iter()
            .chain(queue.processing.values())
            .map(|tex| tex.estimated_size())
            .sum()
    }

    /// Number of pending requests
    pub fn pending_count(&self) -> usize {
        self.shared.queue.lock().pending.len()
    }

    /// Pending textures, next to be decoded first
    pub fn pending_ids(&self) -> Vec<TextureDataId> {
        self.shared
            .queue
            .lock()
            .pending
            .iter()
            .map(|tex| tex.id())
            .collect()
    }

    /// True when the texture waits in the queue
    pub fn is_pending(&self, tex: &TextureData) -> bool {
        self.shared.queue.lock().pending_ids.contains(&tex.id())
    }

    /// True when a worker is decoding the texture
    pub fn is_processing(&self, tex: &TextureData) -> bool {
        self.shared.queue.lock().processing.contains_key(&tex.id())
    }

    /// Stop workers from picking up new requests
    pub fn pause(&self) {
        self.shared.queue.lock().paused = true;
    }

    /// Let workers pick up requests again
    pub fn resume(&self) {
        self.shared.queue.lock().paused = false;
        self.shared.available.notify_all();
    }

    /// Wait until nothing is pending or processing
    ///
    /// Returns false on timeout.
    pub fn wait_idle(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        let mut queue = self.shared.queue.lock();
        while !queue.is_idle() {
            if self.shared.idle.wait_until(&mut queue, deadline).timed_out() {
                return queue.is_idle();
            }
        }
        true
    }
}

impl Drop for TextureLoader {
    fn drop(&mut self) {
        {
            let mut queue = self.shared.queue.lock();
            queue.pending.clear();
            queue.pending_ids.clear();
            queue.exit = true;
        }
        self.shared.available.notify_all();

        for worker in self.workers.drain(..) {
            let name = worker.name().to_string();
            if worker.join().is_err() {
                log::error!("Texture loader {} panicked", name);
            }
        }
    }
}

fn worker_loop(shared: &LoaderShared) {
    let mut queue = shared.queue.lock();
    loop {
        while !queue.exit && (queue.paused || queue.pending.is_empty()) {
            shared.available.wait(&mut queue);
        }
        if queue.exit {
            break;
        }

        let Some(tex) = queue.pending.pop_front() else {
            continue;
        };
        queue.pending_ids.remove(&tex.id());
        queue.processing.insert(tex.id(), tex.clone());

        MutexGuard::unlocked(&mut queue, || {
            if !tex.is_loaded() {
                tex.load(true);
            }
        });

        queue.processing.remove(&tex.id());
        shared.notify_if_idle(&queue);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::decode::{DecodeRequest, DecodedImage, Decoder, DecoderRegistry};
    use crate::source::SourceKind;
    use crate::texture_data::tests::synthetic_context;
    use crate::{AssetResult, TextureContext};
    use crossbeam::channel::{Receiver, Sender, bounded, unbounded};
    use marquee_core::{SettingsHandle, Size2, TextureSettings};
    use marquee_platform::FileSystem;
    use marquee_renderer::HeadlessBackend;

    const TIMEOUT: Duration = Duration::from_secs(10);

    fn context() -> Arc<TextureContext> {
        synthetic_context(Arc::new(HeadlessBackend::new()), TextureSettings::default())
    }

    fn texture(ctx: &Arc<TextureContext>, path: &str) -> Arc<TextureData> {
        let tex = Arc::new(TextureData::new(ctx.clone(), false, false));
        tex.init_from_path(path);
        tex
    }

    /// Reports each decode start and waits for permission to finish
    struct BlockingDecoder {
        started: Sender<String>,
        release: Receiver<()>,
    }

    impl Decoder for BlockingDecoder {
        fn decode(&self, request: &DecodeRequest<'_>) -> AssetResult<DecodedImage> {
            let _ = self.started.send(request.path.to_string());
            let _ = self.release.recv_timeout(TIMEOUT);
            Ok(DecodedImage {
                pixels: vec![0; 4],
                width: 1,
                height: 1,
                source_width: 1.0,
                source_height: 1.0,
                base_size: Size2::new(1, 1),
                packed_size: Size2::ZERO,
                scalable: false,
                source_bytes: 0,
            })
        }
    }

    fn blocking_context() -> (Arc<TextureContext>, Receiver<String>, Sender<()>) {
        let (started_tx, started_rx) = unbounded();
        let (release_tx, release_rx) = bounded(16);
        let decoder = BlockingDecoder {
            started: started_tx,
            release: release_rx,
        };
        let dir = std::env::temp_dir();
        let ctx = TextureContext::new(
            Arc::new(HeadlessBackend::new()),
            SettingsHandle::default(),
            FileSystem::with_dirs(vec![dir.clone()], dir),
        )
        .with_decoders(DecoderRegistry::new().with_decoder(SourceKind::Raster, Arc::new(decoder)));
        (Arc::new(ctx), started_rx, release_tx)
    }

    #[test]
    fn test_background_decode() {
        let ctx = context();
        let loader = TextureLoader::with_workers(2);
        let textures: Vec<_> = (0..8)
            .map(|i| texture(&ctx, &format!("/roms/game{i}-8x8.png")))
            .collect();

        for tex in &textures {
            loader.load(tex);
        }

        assert!(loader.wait_idle(TIMEOUT));
        assert!(textures.iter().all(|tex| tex.is_loaded()));
        assert_eq!(loader.queue_size(), 0);
    }

    #[test]
    fn test_requeue_moves_to_front() {
        let ctx = context();
        let loader = TextureLoader::with_workers(1);
        loader.pause();

        let a = texture(&ctx, "/roms/a-4x4.png");
        let b = texture(&ctx, "/roms/b-4x4.png");
        loader.load(&a);
        loader.load(&b);
        assert_eq!(loader.pending_ids(), vec![b.id(), a.id()]);

        loader.load(&a);
        loader.load(&a);
        assert_eq!(loader.pending_ids(), vec![a.id(), b.id()]);
        assert_eq!(loader.pending_count(), 2);
    }

    #[test]
    fn test_cancelled_texture_never_loads() {
        let ctx = context();
        let loader = TextureLoader::with_workers(1);
        loader.pause();

        let a = texture(&ctx, "/roms/a-4x4.png");
        let b = texture(&ctx, "/roms/b-4x4.png");
        loader.load(&a);
        loader.load(&b);

        assert!(loader.remove(&a));
        assert!(!loader.remove(&a));
        assert!(!loader.is_pending(&a));

        loader.resume();
        assert!(loader.wait_idle(TIMEOUT));
        assert!(!a.is_loaded());
        assert!(b.is_loaded());
    }

    #[test]
    fn test_remove_while_processing() {
        let (ctx, started, release) = blocking_context();
        let loader = TextureLoader::with_workers(1);
        let a = texture(&ctx, "/roms/a.png");

        loader.load(&a);
        assert_eq!(started.recv_timeout(TIMEOUT).unwrap(), "/roms/a.png");
        assert!(loader.is_processing(&a));
        assert!(!loader.is_pending(&a));

        // Started decodes cannot be cancelled, and are not queued twice
        assert!(!loader.remove(&a));
        loader.load(&a);
        assert_eq!(loader.pending_count(), 0);

        release.send(()).unwrap();
        assert!(loader.wait_idle(TIMEOUT));
        assert!(a.is_loaded());
        assert!(!loader.is_processing(&a));
    }

    #[test]
    fn test_queue_size_counts_pending_and_processing() {
        let (ctx, started, release) = blocking_context();
        let loader = TextureLoader::with_workers(1);

        let a = texture(&ctx, "/roms/a.png");
        a.set_temporary_size(10, 10);
        let b = texture(&ctx, "/roms/b.png");
        b.set_temporary_size(20, 20);

        loader.load(&a);
        started.recv_timeout(TIMEOUT).unwrap();
        loader.pause();
        loader.load(&b);

        assert_eq!(loader.queue_size(), 400 + 1600);

        release.send(()).unwrap();
        loader.clear_queue();
        assert!(loader.wait_idle(TIMEOUT));
        assert!(!b.is_loaded());
        assert_eq!(loader.queue_size(), 0);
    }

    #[test]
    fn test_loaded_texture_not_queued() {
        let ctx = context();
        let loader = TextureLoader::with_workers(1);
        loader.pause();

        let a = texture(&ctx, "/roms/a-4x4.png");
        assert!(a.load(false));
        loader.load(&a);
        assert_eq!(loader.pending_count(), 0);
    }

    #[test]
    fn test_wait_idle_times_out_while_paused() {
        let ctx = context();
        let loader = TextureLoader::with_workers(1);
        loader.pause();
        loader.load(&texture(&ctx, "/roms/a-4x4.png"));

        assert!(!loader.wait_idle(Duration::from_millis(20)));
    }

    #[test]
    fn test_drop_joins_workers() {
        let ctx = context();
        let a = texture(&ctx, "/roms/a-4x4.png");
        {
            let loader = TextureLoader::with_workers(3);
            assert_eq!(loader.worker_count(), 3);
            loader.pause();
            loader.load(&a);
        }
        assert!(!a.is_loaded());
        assert_eq!(Arc::strong_count(&a), 1);
    }
}
