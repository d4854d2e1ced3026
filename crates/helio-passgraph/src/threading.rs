//! Render-thread plumbing
//!
//! The pass core itself is single threaded. These types move it onto a
//! dedicated render thread: the main thread pushes [`RenderCommand`]s into a
//! [`RenderCommandQueue`], then a [`FrameSync`] rendezvous hands each frame over
//! and waits for it to finish. Device access from either side goes through a
//! [`GpuContextLock`].

use crate::command::RenderCommand;
use crate::device::GpuDevice;
use crate::manager::RenderPassManager;
use crate::{Error, Result};
use parking_lot::{Condvar, Mutex, MutexGuard};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;

#[derive(Default)]
struct QueueState {
    commands: VecDeque<RenderCommand>,
    closed: bool,
}

/// Multi-producer command queue
#[derive(Default)]
pub struct RenderCommandQueue {
    state: Mutex<QueueState>,
    available: Condvar,
}

impl RenderCommandQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns false once the queue is closed; the command is dropped.
    pub fn push(&self, command: RenderCommand) -> bool {
        let mut state = self.state.lock();
        if state.closed {
            return false;
        }
        state.commands.push_back(command);
        drop(state);
        self.available.notify_one();
        true
    }

    pub fn push_batch(&self, commands: impl IntoIterator<Item = RenderCommand>) -> bool {
        let mut state = self.state.lock();
        if state.closed {
            return false;
        }
        let before = state.commands.len();
        state.commands.extend(commands);
        let pushed = state.commands.len() - before;
        drop(state);
        if pushed > 0 {
            self.available.notify_all();
        }
        true
    }

    /// Block until a command arrives. `None` once closed and empty.
    pub fn pop(&self) -> Option<RenderCommand> {
        let mut state = self.state.lock();
        loop {
            if let Some(command) = state.commands.pop_front() {
                return Some(command);
            }
            if state.closed {
                return None;
            }
            self.available.wait(&mut state);
        }
    }

    pub fn try_pop(&self) -> Option<RenderCommand> {
        self.state.lock().commands.pop_front()
    }

    /// Take everything queued so far
    pub fn drain(&self) -> Vec<RenderCommand> {
        self.state.lock().commands.drain(..).collect()
    }

    /// Refuse further pushes and wake every blocked `pop`
    pub fn close(&self) {
        self.state.lock().closed = true;
        self.available.notify_all();
    }

    pub fn is_closed(&self) -> bool {
        self.state.lock().closed
    }

    pub fn len(&self) -> usize {
        self.state.lock().commands.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// One ready/complete round trip per frame between the main and render threads
#[derive(Default)]
pub struct FrameSync {
    frame_ready: AtomicBool,
    render_complete: AtomicBool,
    stopped: AtomicBool,
    lock: Mutex<()>,
    ready_cv: Condvar,
    complete_cv: Condvar,
}

impl FrameSync {
    pub fn new() -> Self {
        Self::default()
    }

    /// Main thread: the frame's commands are queued
    pub fn signal_frame_ready(&self) {
        let _guard = self.lock.lock();
        self.render_complete.store(false, Ordering::Release);
        self.frame_ready.store(true, Ordering::Release);
        self.ready_cv.notify_one();
    }

    /// Render thread: false once stopped
    pub fn wait_frame_ready(&self) -> bool {
        let mut guard = self.lock.lock();
        while !self.frame_ready.load(Ordering::Acquire) && !self.stopped.load(Ordering::Acquire) {
            self.ready_cv.wait(&mut guard);
        }
        if self.stopped.load(Ordering::Acquire) {
            return false;
        }
        self.frame_ready.store(false, Ordering::Release);
        true
    }

    pub fn signal_render_complete(&self) {
        let _guard = self.lock.lock();
        self.render_complete.store(true, Ordering::Release);
        self.complete_cv.notify_all();
    }

    /// Main thread: true if the frame completed, false if stopped first
    pub fn wait_render_complete(&self) -> bool {
        let mut guard = self.lock.lock();
        while !self.render_complete.load(Ordering::Acquire) && !self.stopped.load(Ordering::Acquire) {
            self.complete_cv.wait(&mut guard);
        }
        self.render_complete.swap(false, Ordering::AcqRel)
    }

    /// Unblock both waits; the render loop exits after its current iteration
    pub fn stop(&self) {
        let _guard = self.lock.lock();
        self.stopped.store(true, Ordering::Release);
        self.ready_cv.notify_all();
        self.complete_cv.notify_all();
    }

    pub fn is_stopped(&self) -> bool {
        self.stopped.load(Ordering::Acquire)
    }
}

/// Exclusive ownership of the GPU device
///
/// Holding the guard means the context is current on this thread. Ownership
/// moves between threads by acquire/release; it is never shared.
pub struct GpuContextLock {
    device: Mutex<Box<dyn GpuDevice>>,
    acquisitions: AtomicU64,
}

impl GpuContextLock {
    pub fn new(device: Box<dyn GpuDevice>) -> Self {
        Self {
            device: Mutex::new(device),
            acquisitions: AtomicU64::new(0),
        }
    }

    pub fn acquire(&self) -> MutexGuard<'_, Box<dyn GpuDevice>> {
        let guard = self.device.lock();
        self.acquisitions.fetch_add(1, Ordering::Relaxed);
        guard
    }

    pub fn try_acquire(&self) -> Option<MutexGuard<'_, Box<dyn GpuDevice>>> {
        let guard = self.device.try_lock()?;
        self.acquisitions.fetch_add(1, Ordering::Relaxed);
        Some(guard)
    }

    pub fn acquisitions(&self) -> u64 {
        self.acquisitions.load(Ordering::Relaxed)
    }

    pub fn into_inner(self) -> Box<dyn GpuDevice> {
        self.device.into_inner()
    }
}

/// Dedicated thread driving a [`RenderPassManager`]
///
/// Per frame the thread waits for "frame ready", drains the queue, runs
/// `execute_all` with the context held, and signals "render complete". A frame
/// that fails is logged and counted; the loop keeps going.
pub struct RenderThread {
    queue: Arc<RenderCommandQueue>,
    sync: Arc<FrameSync>,
    context: Arc<GpuContextLock>,
    frames: Arc<AtomicU64>,
    failed_frames: Arc<AtomicU64>,
    handle: Option<JoinHandle<RenderPassManager>>,
}

impl RenderThread {
    pub fn spawn(mut manager: RenderPassManager, context: Arc<GpuContextLock>) -> Result<Self> {
        let queue = Arc::new(RenderCommandQueue::new());
        let sync = Arc::new(FrameSync::new());
        let frames = Arc::new(AtomicU64::new(0));
        let failed_frames = Arc::new(AtomicU64::new(0));

        let handle = {
            let queue = queue.clone();
            let sync = sync.clone();
            let context = context.clone();
            let frames = frames.clone();
            let failed_frames = failed_frames.clone();
            std::thread::Builder::new().name("render".to_string()).spawn(move || {
                log::info!("Render thread started");
                let initialized = {
                    let mut device = context.acquire();
                    manager.initialize_all(&mut **device)
                };
                if let Err(e) = initialized {
                    log::error!("Pass initialization failed: {}", e);
                    sync.stop();
                }

                while sync.wait_frame_ready() {
                    let commands = queue.drain();
                    let result = {
                        let mut device = context.acquire();
                        manager.execute_all(&mut **device, &commands)
                    };
                    if let Err(e) = result {
                        log::error!("Frame {} failed: {}", frames.load(Ordering::Relaxed), e);
                        failed_frames.fetch_add(1, Ordering::Relaxed);
                    }
                    frames.fetch_add(1, Ordering::Relaxed);
                    sync.signal_render_complete();
                }

                manager.shutdown(&mut **context.acquire());
                log::info!("Render thread stopped after {} frames", frames.load(Ordering::Relaxed));
                manager
            })?
        };

        Ok(Self {
            queue,
            sync,
            context,
            frames,
            failed_frames,
            handle: Some(handle),
        })
    }

    pub fn queue(&self) -> &Arc<RenderCommandQueue> {
        &self.queue
    }

    pub fn sync(&self) -> &Arc<FrameSync> {
        &self.sync
    }

    pub fn context(&self) -> &Arc<GpuContextLock> {
        &self.context
    }

    pub fn submit(&self, command: RenderCommand) -> bool {
        self.queue.push(command)
    }

    pub fn submit_batch(&self, commands: impl IntoIterator<Item = RenderCommand>) -> bool {
        self.queue.push_batch(commands)
    }

    /// Hand the queued commands over as one frame and wait for it.
    /// False if the thread stopped instead.
    pub fn render_frame(&self) -> bool {
        if self.sync.is_stopped() {
            return false;
        }
        self.sync.signal_frame_ready();
        self.sync.wait_render_complete()
    }

    pub fn frames_rendered(&self) -> u64 {
        self.frames.load(Ordering::Relaxed)
    }

    pub fn failed_frames(&self) -> u64 {
        self.failed_frames.load(Ordering::Relaxed)
    }

    pub fn stop(&self) {
        self.sync.stop();
        self.queue.close();
    }

    /// Stop, wait for the thread and take the manager back
    pub fn join(mut self) -> Result<RenderPassManager> {
        self.stop();
        let handle = self
            .handle
            .take()
            .ok_or_else(|| Error::Device("render thread already joined".to_string()))?;
        handle
            .join()
            .map_err(|_| Error::Device("render thread panicked".to_string()))
    }
}

impl Drop for RenderThread {
    fn drop(&mut self) {
        if let Some(handle) = self.handle.take() {
            self.stop();
            let _ = handle.join();
        }
    }
}
