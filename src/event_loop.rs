//! Cooperative task queue that every stream schedules its deferred work on.
//!
//! All stream state transitions happen on one thread. Work that must not run
//! re-entrantly (event emission after a push, write callbacks, `end`/`close`
//! delivery) is queued with [`EventLoop::next_tick`] and executed in FIFO
//! order by [`EventLoop::run_until_idle`].
//!
//! I/O completions from the platform enter through [`EventLoop::spawn_io`],
//! which runs a future on the current tokio `LocalSet` and queues its
//! completion handler as a regular task. [`EventLoop::run`] drives both.

use crate::error::{Result, StreamError};
use std::cell::{Cell, RefCell};
use std::collections::VecDeque;
use std::future::Future;
use std::rc::Rc;
use tokio::sync::Notify;

/// A deferred unit of work
pub type Task = Box<dyn FnOnce()>;

struct LoopInner {
    /// Next-tick queue, processed in FIFO order
    ticks: RefCell<VecDeque<Task>>,
    /// First error emitted with no `error` listener attached
    fatal: RefCell<Option<StreamError>>,
    /// Outstanding `spawn_io` futures
    pending_io: Cell<usize>,
    /// Woken whenever an I/O completion is queued
    io_ready: Notify,
}

/// Handle to a task queue. Cloning shares the queue.
#[derive(Clone)]
pub struct EventLoop {
    inner: Rc<LoopInner>,
}

impl Default for EventLoop {
    fn default() -> Self {
        Self::new()
    }
}

impl EventLoop {
    pub fn new() -> Self {
        Self {
            inner: Rc::new(LoopInner {
                ticks: RefCell::new(VecDeque::with_capacity(64)),
                fatal: RefCell::new(None),
                pending_io: Cell::new(0),
                io_ready: Notify::new(),
            }),
        }
    }

    /// Queue `task` to run after everything already queued.
    pub fn next_tick<F>(&self, task: F)
    where
        F: FnOnce() + 'static,
    {
        self.inner.ticks.borrow_mut().push_back(Box::new(task));
    }

    pub fn pending_ticks(&self) -> usize {
        self.inner.ticks.borrow().len()
    }

    pub fn pending_io(&self) -> usize {
        self.inner.pending_io.get()
    }

    pub fn has_pending_work(&self) -> bool {
        self.pending_ticks() > 0 || self.pending_io() > 0
    }

    /// Record an error nobody listened for. The driver returns it.
    pub fn report_unhandled(&self, err: StreamError) {
        tracing::error!(code = %err.code(), "unhandled stream error: {}", err);
        let mut fatal = self.inner.fatal.borrow_mut();
        if fatal.is_none() {
            *fatal = Some(StreamError::Unhandled(Box::new(err)));
        }
    }

    fn take_fatal(&self) -> Option<StreamError> {
        self.inner.fatal.borrow_mut().take()
    }

    /// Run one queued task. Returns false if the queue was empty.
    pub fn tick(&self) -> bool {
        // The borrow must end before the task runs: tasks queue more tasks.
        let task = self.inner.ticks.borrow_mut().pop_front();
        match task {
            Some(task) => {
                task();
                true
            }
            None => false,
        }
    }

    /// Run queued tasks, including ones queued along the way, until the
    /// queue is empty. Stops at the first unhandled error.
    pub fn run_until_idle(&self) -> Result<()> {
        loop {
            if let Some(err) = self.take_fatal() {
                return Err(err);
            }
            if !self.tick() {
                break;
            }
        }
        match self.take_fatal() {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    /// Run a future on the current `LocalSet` and queue `on_complete` with
    /// its output.
    ///
    /// Must be called from within a `tokio::task::LocalSet`.
    pub fn spawn_io<F, C>(&self, fut: F, on_complete: C)
    where
        F: Future + 'static,
        C: FnOnce(F::Output) + 'static,
    {
        self.inner.pending_io.set(self.inner.pending_io.get() + 1);
        let handle = self.clone();
        tokio::task::spawn_local(async move {
            let output = fut.await;
            handle.next_tick(move || on_complete(output));
            handle
                .inner
                .pending_io
                .set(handle.inner.pending_io.get().saturating_sub(1));
            handle.inner.io_ready.notify_one();
        });
    }

    /// Drive the loop until no ticks and no I/O remain.
    pub async fn run(&self) -> Result<()> {
        loop {
            self.run_until_idle()?;
            if self.pending_io() == 0 {
                return Ok(());
            }
            self.inner.io_ready.notified().await;
        }
    }
}
