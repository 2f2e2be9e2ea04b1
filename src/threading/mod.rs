//! Background frame compression workers
//!
//! Frame caches hand raw ARGB frames to a [`CompressionPool`]. Workers convert
//! each frame to YUVA, compress it and send the result back over the reply
//! channel carried by the job. The owning cache applies results on its own
//! thread; if the cache is gone its receiver is dropped and the result is
//! discarded by the failed send.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, OnceLock};
use std::thread::{self, JoinHandle};

use crossbeam_channel::{unbounded, Receiver, Sender};
use parking_lot::Mutex;

use crate::codec;
use crate::convert::{self, FrameGeometry};
use crate::error::{Error, Result};

/// Worker count of the process-wide pool
pub const SHARED_POOL_THREADS: usize = 2;

/// A raw frame waiting to be compressed
pub struct CompressJob {
    /// Frame slot the result belongs to
    pub index: usize,

    /// Raw ARGB pixels, owned by the job
    pub argb: Vec<u8>,

    /// Geometry of `argb`
    pub geometry: FrameGeometry,

    /// Where the result goes
    pub reply: Sender<CompressedFrame>,
}

impl CompressJob {
    fn run(self) {
        let result = convert::argb_to_yuva(&self.argb, self.geometry)
            .ok_or_else(|| {
                Error::Compression(format!(
                    "frame {} does not match {}x{} geometry",
                    self.index, self.geometry.width, self.geometry.height
                ))
            })
            .and_then(|yuva| codec::compress(&yuva));

        if self
            .reply
            .send(CompressedFrame {
                index: self.index,
                result,
            })
            .is_err()
        {
            log::trace!("Frame {} compressed after its cache closed", self.index);
        }
    }
}

/// Outcome of a compression job
#[derive(Debug)]
pub struct CompressedFrame {
    pub index: usize,
    pub result: Result<Vec<u8>>,
}

enum WorkerCommand {
    Compress(CompressJob),
    Shutdown,
}

/// Fixed-size pool of compression threads
pub struct CompressionPool {
    thread_count: usize,
    command_tx: Sender<WorkerCommand>,
    workers: Mutex<Vec<JoinHandle<()>>>,
    submitted: AtomicUsize,
}

impl CompressionPool {
    /// Create a pool and start its workers
    pub fn new(thread_count: usize) -> Result<Arc<Self>> {
        let thread_count = thread_count.max(1);
        let (command_tx, command_rx) = unbounded();

        let mut workers = Vec::with_capacity(thread_count);
        for i in 0..thread_count {
            let command_rx: Receiver<WorkerCommand> = command_rx.clone();
            let handle = thread::Builder::new()
                .name(format!("vsticker-compress-{}", i))
                .spawn(move || Self::worker_loop(command_rx))?;
            workers.push(handle);
        }

        log::debug!("Compression pool started with {} workers", thread_count);

        Ok(Arc::new(Self {
            thread_count,
            command_tx,
            workers: Mutex::new(workers),
            submitted: AtomicUsize::new(0),
        }))
    }

    /// Process-wide pool shared by all frame sources
    pub fn shared() -> Result<Arc<Self>> {
        static SHARED: OnceLock<Arc<CompressionPool>> = OnceLock::new();

        if let Some(pool) = SHARED.get() {
            return Ok(pool.clone());
        }
        let pool = Self::new(SHARED_POOL_THREADS)?;
        Ok(SHARED.get_or_init(|| pool).clone())
    }

    /// Queue a job; never blocks
    pub fn submit(&self, job: CompressJob) -> Result<()> {
        self.command_tx.send(WorkerCommand::Compress(job))?;
        self.submitted.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    /// Number of worker threads
    pub fn thread_count(&self) -> usize {
        self.thread_count
    }

    /// Jobs accepted since creation
    pub fn submitted_jobs(&self) -> usize {
        self.submitted.load(Ordering::Relaxed)
    }

    fn worker_loop(command_rx: Receiver<WorkerCommand>) {
        log::debug!("Compression worker started");

        while let Ok(command) = command_rx.recv() {
            match command {
                WorkerCommand::Compress(job) => job.run(),
                WorkerCommand::Shutdown => break,
            }
        }

        log::debug!("Compression worker stopped");
    }
}

impl Drop for CompressionPool {
    fn drop(&mut self) {
        for _ in 0..self.thread_count {
            let _ = self.command_tx.send(WorkerCommand::Shutdown);
        }

        let mut workers = self.workers.lock();
        for handle in workers.drain(..) {
            let _ = handle.join();
        }
    }
}
