//! Writable side: queueing writes against a single in-flight sink write.
//!
//! Every `write` lands in a [`BufferQueue`] and is handed to the [`Sink`] one
//! at a time (or as one batch via [`Sink::writev`] after `uncork`). The
//! total of queued and in-flight units is compared against the high-water
//! mark to produce the `write` return value and the `drain` event.
//!
//! Finishing runs in order: `end()` marks the stream ending, the queue
//! drains, [`Sink::finalize`] flushes, then `prefinish` and `finish` fire
//! and `end()` callbacks run.

use crate::chunk::Chunk;
use crate::config::WritableOptions;
use crate::error::{Result, StreamError};
use crate::event_loop::EventLoop;
use crate::events::{listener, Event, EventEmitter, Listener, ListenerId, Payload};
use crate::stream::buffer_queue::{BufferQueue, Measured};
use crate::stream::destroy::{self, Lifecycle, LifecycleState, Lifecycled};
use crate::stream::readable::DestroyHook;
use std::cell::{Cell, RefCell};
use std::rc::{Rc, Weak};

/// Called once with the outcome of a write or `end`.
pub type WriteCallback = Box<dyn FnOnce(Result<()>)>;

pub(crate) struct PendingWrite {
    chunk: Chunk,
    callback: Option<WriteCallback>,
}

impl Measured for PendingWrite {
    fn units(&self, object_mode: bool) -> usize {
        self.chunk.units(object_mode)
    }
}

/// The write (or batch) currently owned by the sink.
struct InFlight {
    units: usize,
    callbacks: Vec<Option<WriteCallback>>,
}

enum Job {
    Single(Chunk),
    Batch(Vec<Chunk>),
}

/// Completion handle for one [`Sink::write`] or [`Sink::writev`] call.
///
/// May be completed synchronously from inside the sink call or later from a
/// queued task. Dropping it without completing leaves the stream waiting.
#[must_use = "the stream stalls until the write is completed"]
pub struct WriteDone {
    stream: Weak<WritableShared>,
}

impl WriteDone {
    pub fn complete(self, result: Result<()>) {
        if let Some(shared) = self.stream.upgrade() {
            Writable { shared }.on_write(result);
        }
    }

    pub fn ok(self) {
        self.complete(Ok(()))
    }

    pub fn fail(self, err: StreamError) {
        self.complete(Err(err))
    }
}

/// Completion handle for [`Sink::finalize`].
#[must_use = "the stream never finishes until finalize completes"]
pub struct FinalDone {
    stream: Weak<WritableShared>,
}

impl FinalDone {
    pub fn complete(self, result: Result<()>) {
        if let Some(shared) = self.stream.upgrade() {
            Writable { shared }.on_final(result);
        }
    }

    pub fn ok(self) {
        self.complete(Ok(()))
    }

    pub fn fail(self, err: StreamError) {
        self.complete(Err(err))
    }
}

/// Consumer behind a writable stream.
pub trait Sink {
    /// Accept one chunk. Complete `done` when it has been handled.
    fn write(&mut self, chunk: Chunk, done: WriteDone);

    /// Accept several buffered chunks at once. Only called when
    /// [`Sink::supports_writev`] returns true.
    fn writev(&mut self, _chunks: Vec<Chunk>, done: WriteDone) {
        done.fail(StreamError::custom("sink does not support writev"));
    }

    fn supports_writev(&self) -> bool {
        false
    }

    /// Flush after the last write, before `finish`.
    fn finalize(&mut self, done: FinalDone) {
        done.ok();
    }

    fn destroy(&mut self, _err: Option<&StreamError>) {}
}

/// Sink backed by a closure.
pub struct FnSink<F>(F);

impl<F> FnSink<F>
where
    F: FnMut(Chunk, WriteDone),
{
    pub fn new(f: F) -> Self {
        Self(f)
    }
}

impl<F> Sink for FnSink<F>
where
    F: FnMut(Chunk, WriteDone),
{
    fn write(&mut self, chunk: Chunk, done: WriteDone) {
        (self.0)(chunk, done)
    }
}

pub struct WritableState {
    buffered: BufferQueue<PendingWrite>,
    in_flight: Option<InFlight>,
    pub(crate) high_water_mark: usize,
    /// A sink call is outstanding
    pub(crate) writing: bool,
    /// Inside the sink call that started the current write
    sync: bool,
    pub(crate) corked: u32,
    pub(crate) need_drain: bool,
    /// `end()` was called
    pub(crate) ending: bool,
    /// Writes are refused quietly; the read side of the duplex ended
    pub(crate) half_closed: bool,
    pub(crate) finished: bool,
    pub(crate) prefinished: bool,
    final_called: bool,
    /// Writes, finalize and finish not yet acknowledged
    pending_cb: usize,
    on_finished: Vec<WriteCallback>,
    has_writev: bool,
    pub(crate) life: LifecycleState,
}

impl WritableState {
    fn new(opts: &WritableOptions, has_writev: bool) -> Self {
        Self {
            buffered: BufferQueue::new(opts.object_mode),
            in_flight: None,
            high_water_mark: opts.effective_high_water_mark(),
            writing: false,
            sync: false,
            corked: 0,
            need_drain: false,
            ending: false,
            half_closed: false,
            finished: false,
            prefinished: false,
            final_called: false,
            pending_cb: 0,
            on_finished: Vec::new(),
            has_writev,
            life: LifecycleState::new(opts.auto_destroy, opts.emit_close),
        }
    }

    /// Queued plus in-flight units.
    pub fn length(&self) -> usize {
        self.buffered.length() + self.in_flight.as_ref().map_or(0, |f| f.units)
    }

    pub fn object_mode(&self) -> bool {
        self.buffered.is_object_mode()
    }

    fn need_finish(&self) -> bool {
        self.ending
            && !self.life.is_destroyed()
            && !self.life.is_errored()
            && self.length() == 0
            && self.buffered.is_empty()
            && !self.finished
            && !self.writing
            && !self
                .life
                .flags
                .intersects(Lifecycle::ERROR_EMITTED | Lifecycle::CLOSE_EMITTED)
    }

    /// Take every callback still waiting on the stream.
    fn take_waiting(&mut self) -> (Vec<WriteCallback>, Vec<WriteCallback>) {
        let writes: Vec<_> = self
            .buffered
            .drain_all()
            .into_iter()
            .filter_map(|w| {
                self.pending_cb = self.pending_cb.saturating_sub(1);
                w.callback
            })
            .collect();
        let ends = std::mem::take(&mut self.on_finished);
        (writes, ends)
    }
}

pub(crate) struct WritableShared {
    pub(crate) state: RefCell<WritableState>,
    pub(crate) events: EventEmitter,
    sink: RefCell<Box<dyn Sink>>,
    event_loop: EventLoop,
    dispatching: Cell<bool>,
    pub(crate) on_destroy: RefCell<Option<DestroyHook>>,
}

impl Lifecycled for WritableShared {
    fn lifecycle<R>(&self, f: impl FnOnce(&mut LifecycleState) -> R) -> R {
        f(&mut self.state.borrow_mut().life)
    }

    fn emitter(&self) -> &EventEmitter {
        &self.events
    }

    fn event_loop(&self) -> &EventLoop {
        &self.event_loop
    }
}

/// Handle to a writable stream. Clones share the same stream.
#[derive(Clone)]
pub struct Writable {
    pub(crate) shared: Rc<WritableShared>,
}

impl Writable {
    pub fn new<S>(event_loop: &EventLoop, opts: WritableOptions, sink: S) -> Self
    where
        S: Sink + 'static,
    {
        let has_writev = sink.supports_writev();
        Self {
            shared: Rc::new(WritableShared {
                state: RefCell::new(WritableState::new(&opts, has_writev)),
                events: EventEmitter::new(),
                sink: RefCell::new(Box::new(sink)),
                event_loop: event_loop.clone(),
                dispatching: Cell::new(false),
                on_destroy: RefCell::new(None),
            }),
        }
    }

    /// A writable whose sink is `f`.
    pub fn from_fn<F>(event_loop: &EventLoop, opts: WritableOptions, f: F) -> Self
    where
        F: FnMut(Chunk, WriteDone) + 'static,
    {
        Self::new(event_loop, opts, FnSink(f))
    }

    pub fn ptr_eq(&self, other: &Writable) -> bool {
        Rc::ptr_eq(&self.shared, &other.shared)
    }

    pub fn event_loop(&self) -> &EventLoop {
        &self.shared.event_loop
    }

    // =========================================================================
    // Writing
    // =========================================================================

    /// Queue a chunk. Returns false when the caller should wait for `drain`.
    pub fn write(&self, chunk: impl Into<Chunk>) -> bool {
        self.write_inner(chunk.into(), None)
    }

    /// Like [`Writable::write`], with a callback for this chunk's outcome.
    pub fn write_with<F>(&self, chunk: impl Into<Chunk>, cb: F) -> bool
    where
        F: FnOnce(Result<()>) + 'static,
    {
        self.write_inner(chunk.into(), Some(Box::new(cb)))
    }

    fn write_inner(&self, chunk: Chunk, cb: Option<WriteCallback>) -> bool {
        // (error, whether it is also raised on the stream)
        let rejected = {
            let st = self.shared.state.borrow();
            if st.half_closed {
                Some((StreamError::WriteAfterEnd, false))
            } else if !st.object_mode() && matches!(chunk, Chunk::Object(_)) {
                Some((
                    StreamError::InvalidChunk {
                        expected: "bytes in byte mode",
                    },
                    true,
                ))
            } else if st.ending {
                Some((StreamError::WriteAfterEnd, true))
            } else if st.life.is_destroyed() {
                Some((StreamError::Destroyed { op: "write" }, true))
            } else if st.life.is_errored() {
                // Already reported when it was recorded
                Some((StreamError::Destroyed { op: "write" }, false))
            } else {
                None
            }
        };
        if let Some((err, raise)) = rejected {
            tracing::debug!(code = %err.code(), raise, "write rejected");
            if let Some(cb) = cb {
                let e = err.clone();
                self.shared.event_loop.next_tick(move || cb(Err(e)));
            }
            if raise {
                self.error_or_destroy(err);
            }
            return false;
        }

        let ret = {
            let mut st = self.shared.state.borrow_mut();
            st.pending_cb += 1;
            st.buffered.push(PendingWrite {
                chunk,
                callback: cb,
            });
            let below = st.length() <= st.high_water_mark;
            if !below {
                st.need_drain = true;
            }
            tracing::trace!(length = st.length(), hwm = st.high_water_mark, "write queued");
            below && !st.life.is_errored() && !st.life.is_destroyed()
        };
        self.dispatch();
        ret
    }

    /// Hand buffered chunks to the sink until one stays in flight.
    fn dispatch(&self) {
        if self.shared.dispatching.replace(true) {
            return;
        }
        while let Some(job) = self.next_job() {
            let done = WriteDone {
                stream: Rc::downgrade(&self.shared),
            };
            {
                let mut sink = self.shared.sink.borrow_mut();
                match job {
                    Job::Single(chunk) => sink.write(chunk, done),
                    Job::Batch(chunks) => sink.writev(chunks, done),
                }
            }
            self.shared.state.borrow_mut().sync = false;
        }
        self.shared.dispatching.set(false);
    }

    fn next_job(&self) -> Option<Job> {
        let mut st = self.shared.state.borrow_mut();
        if st.writing
            || st.corked > 0
            || st.life.is_destroyed()
            || st.life.is_errored()
            || st.buffered.is_empty()
        {
            return None;
        }

        let object_mode = st.object_mode();
        let batch = st.has_writev && st.buffered.count() > 1;
        let items = if batch {
            st.buffered.drain_all()
        } else {
            st.buffered.shift().into_iter().collect()
        };
        let units = items.iter().map(|w| w.units(object_mode)).sum();
        let (mut chunks, callbacks): (Vec<_>, Vec<_>) =
            items.into_iter().map(|w| (w.chunk, w.callback)).unzip();

        st.in_flight = Some(InFlight { units, callbacks });
        st.writing = true;
        st.sync = true;

        if batch {
            tracing::trace!(count = chunks.len(), units, "writev");
            Some(Job::Batch(chunks))
        } else {
            chunks.pop().map(Job::Single)
        }
    }

    fn on_write(&self, result: Result<()>) {
        let (callbacks, sync) = {
            let mut st = self.shared.state.borrow_mut();
            let Some(flight) = st.in_flight.take() else {
                tracing::warn!("write completed with nothing in flight");
                return;
            };
            st.writing = false;

            if st.life.is_destroyed() {
                st.pending_cb = st.pending_cb.saturating_sub(flight.callbacks.len());
                drop(st);
                let err = StreamError::Destroyed { op: "write" };
                for cb in flight.callbacks.into_iter().flatten() {
                    let e = err.clone();
                    self.shared.event_loop.next_tick(move || cb(Err(e)));
                }
                return;
            }
            if let Err(err) = &result {
                st.life.set_errored(err);
            }
            (flight.callbacks, st.sync)
        };

        match result {
            Err(err) => {
                tracing::debug!(error = %err, "sink write failed");
                if sync {
                    let this = self.clone();
                    self.shared
                        .event_loop
                        .next_tick(move || this.on_write_error(callbacks, err));
                } else {
                    self.on_write_error(callbacks, err);
                }
            }
            Ok(()) => {
                if sync {
                    let this = self.clone();
                    self.shared
                        .event_loop
                        .next_tick(move || this.after_write(callbacks));
                } else {
                    self.dispatch();
                    self.after_write(callbacks);
                }
            }
        }
    }

    fn on_write_error(&self, callbacks: Vec<Option<WriteCallback>>, err: StreamError) {
        self.settle(callbacks.len());
        for cb in callbacks.into_iter().flatten() {
            cb(Err(err.clone()));
        }
        self.error_buffer();
        self.error_or_destroy(err);
    }

    fn after_write(&self, callbacks: Vec<Option<WriteCallback>>) {
        let drain = {
            let mut st = self.shared.state.borrow_mut();
            st.pending_cb = st.pending_cb.saturating_sub(callbacks.len());
            let drain = st.need_drain
                && !st.ending
                && !st.life.is_destroyed()
                && st.length() == 0;
            if drain {
                st.need_drain = false;
            }
            drain
        };
        if drain {
            tracing::debug!("drain");
            self.shared.events.emit(Event::Drain, &Payload::Empty);
        }
        for cb in callbacks.into_iter().flatten() {
            cb(Ok(()));
        }
        self.finish_maybe(false);
    }

    fn settle(&self, count: usize) {
        let mut st = self.shared.state.borrow_mut();
        st.pending_cb = st.pending_cb.saturating_sub(count);
    }

    /// Fail every buffered write and pending `end` callback.
    fn error_buffer(&self) {
        let (writes, ends, errored) = {
            let mut st = self.shared.state.borrow_mut();
            let (writes, ends) = st.take_waiting();
            (writes, ends, st.life.errored.clone())
        };
        let write_err = errored
            .clone()
            .unwrap_or(StreamError::Destroyed { op: "write" });
        for cb in writes {
            cb(Err(write_err.clone()));
        }
        let end_err = errored.unwrap_or(StreamError::Destroyed { op: "end" });
        for cb in ends {
            cb(Err(end_err.clone()));
        }
    }

    /// Hold writes in the buffer until the matching [`Writable::uncork`].
    pub fn cork(&self) {
        self.shared.state.borrow_mut().corked += 1;
    }

    pub fn uncork(&self) {
        let flush = {
            let mut st = self.shared.state.borrow_mut();
            if st.corked == 0 {
                return;
            }
            st.corked -= 1;
            st.corked == 0
        };
        if flush {
            self.dispatch();
        }
    }

    // =========================================================================
    // Ending
    // =========================================================================

    /// Signal that no more writes follow. Idempotent.
    pub fn end(&self) {
        self.end_inner(None, None);
    }

    /// Write a final chunk, then end.
    pub fn end_with(&self, chunk: impl Into<Chunk>) {
        self.end_inner(Some(chunk.into()), None);
    }

    /// End, calling `cb` once the stream has finished (or failed).
    pub fn end_then<F>(&self, cb: F)
    where
        F: FnOnce(Result<()>) + 'static,
    {
        self.end_inner(None, Some(Box::new(cb)));
    }

    fn end_inner(&self, chunk: Option<Chunk>, cb: Option<WriteCallback>) {
        if let Some(chunk) = chunk {
            self.write_inner(chunk, None);
        }

        let uncork = {
            let mut st = self.shared.state.borrow_mut();
            if st.corked > 0 {
                st.corked = 1;
                true
            } else {
                false
            }
        };
        if uncork {
            self.uncork();
        }

        let (first, err) = {
            let mut st = self.shared.state.borrow_mut();
            if !st.life.is_errored() && !st.ending {
                st.ending = true;
                (true, None)
            } else if st.finished {
                (false, Some(StreamError::AlreadyFinished { op: "end" }))
            } else if st.life.is_destroyed() {
                (false, Some(StreamError::Destroyed { op: "end" }))
            } else {
                (false, None)
            }
        };
        if first {
            tracing::debug!("end");
            self.finish_maybe(true);
        }

        if let Some(cb) = cb {
            let mut st = self.shared.state.borrow_mut();
            if err.is_some() || st.finished {
                drop(st);
                let result = err.map_or(Ok(()), Err);
                self.shared.event_loop.next_tick(move || cb(result));
            } else {
                st.on_finished.push(cb);
            }
        }
    }

    fn finish_maybe(&self, sync: bool) {
        if !self.shared.state.borrow().need_finish() {
            return;
        }
        self.prefinish();

        let finish = {
            let mut st = self.shared.state.borrow_mut();
            let finish = st.pending_cb == 0 && st.need_finish();
            if finish {
                st.pending_cb += 1;
            }
            finish
        };
        if !finish {
            return;
        }
        if sync {
            let this = self.clone();
            self.shared.event_loop.next_tick(move || {
                if this.shared.state.borrow().need_finish() {
                    this.finish();
                } else {
                    let mut st = this.shared.state.borrow_mut();
                    st.pending_cb = st.pending_cb.saturating_sub(1);
                }
            });
        } else {
            self.finish();
        }
    }

    fn prefinish(&self) {
        let call = {
            let mut st = self.shared.state.borrow_mut();
            let call = !st.prefinished && !st.final_called && !st.life.is_destroyed();
            if call {
                st.final_called = true;
                st.pending_cb += 1;
            }
            call
        };
        if call {
            let done = FinalDone {
                stream: Rc::downgrade(&self.shared),
            };
            self.with_sink(move |sink| sink.finalize(done));
        }
    }

    fn on_final(&self, result: Result<()>) {
        {
            let mut st = self.shared.state.borrow_mut();
            st.pending_cb = st.pending_cb.saturating_sub(1);
        }
        match result {
            Err(err) => {
                tracing::debug!(error = %err, "finalize failed");
                let callbacks = std::mem::take(&mut self.shared.state.borrow_mut().on_finished);
                for cb in callbacks {
                    cb(Err(err.clone()));
                }
                self.error_or_destroy(err);
            }
            Ok(()) => {
                let prefinish = {
                    let mut st = self.shared.state.borrow_mut();
                    let ready = st.need_finish();
                    if ready {
                        st.prefinished = true;
                        st.pending_cb += 1;
                    }
                    ready
                };
                if prefinish {
                    self.shared.events.emit(Event::Prefinish, &Payload::Empty);
                    let this = self.clone();
                    self.shared.event_loop.next_tick(move || this.finish());
                }
            }
        }
    }

    fn finish(&self) {
        let (callbacks, auto_destroy) = {
            let mut st = self.shared.state.borrow_mut();
            st.pending_cb = st.pending_cb.saturating_sub(1);
            if st.finished || st.life.is_destroyed() || st.life.is_errored() {
                return;
            }
            st.finished = true;
            let callbacks = std::mem::take(&mut st.on_finished);
            (callbacks, st.life.auto_destroy() && !st.life.is_coupled())
        };
        tracing::debug!("finish");
        for cb in callbacks {
            cb(Ok(()));
        }
        self.shared.events.emit(Event::Finish, &Payload::Empty);
        if auto_destroy {
            self.destroy(None);
        }
    }

    /// Run `f` against the sink, deferring it if the sink is mid-call.
    fn with_sink<F>(&self, f: F)
    where
        F: FnOnce(&mut dyn Sink) + 'static,
    {
        match self.shared.sink.try_borrow_mut() {
            Ok(mut sink) => f(sink.as_mut()),
            Err(_) => {
                let this = self.clone();
                self.shared.event_loop.next_tick(move || this.with_sink(f));
            }
        }
    }

    // =========================================================================
    // Listeners
    // =========================================================================

    pub fn on(&self, event: Event, listener: Listener) -> ListenerId {
        self.shared.events.on(event, listener)
    }

    pub fn once(&self, event: Event, listener: Listener) -> ListenerId {
        self.shared.events.once(event, listener)
    }

    pub(crate) fn prepend(&self, event: Event, listener: Listener) -> ListenerId {
        self.shared.events.prepend(event, listener)
    }

    pub fn off(&self, id: ListenerId) {
        self.shared.events.off(id);
    }

    pub fn listener_count(&self, event: Event) -> usize {
        self.shared.events.listener_count(event)
    }

    pub fn on_drain<F>(&self, f: F) -> ListenerId
    where
        F: Fn() + 'static,
    {
        self.on(Event::Drain, listener(move |_| f()))
    }

    pub fn on_finish<F>(&self, f: F) -> ListenerId
    where
        F: Fn() + 'static,
    {
        self.on(Event::Finish, listener(move |_| f()))
    }

    pub fn on_error<F>(&self, f: F) -> ListenerId
    where
        F: Fn(&StreamError) + 'static,
    {
        self.on(
            Event::Error,
            listener(move |payload| {
                if let Payload::Error(err) = payload {
                    f(err);
                }
            }),
        )
    }

    pub fn on_close<F>(&self, f: F) -> ListenerId
    where
        F: Fn() + 'static,
    {
        self.on(Event::Close, listener(move |_| f()))
    }

    // =========================================================================
    // Destroy
    // =========================================================================

    /// Tear the stream down. Queued writes and `end` callbacks fail with
    /// `err` (or `ERR_STREAM_DESTROYED`); `error` then `close` follow on the
    /// next tick.
    pub fn destroy(&self, err: Option<StreamError>) {
        let (writes, ends) = {
            let mut st = self.shared.state.borrow_mut();
            if !st.life.begin_destroy(err.as_ref()) {
                return;
            }
            st.take_waiting()
        };
        tracing::debug!(error = ?err, "destroy writable");

        if !writes.is_empty() || !ends.is_empty() {
            let write_err = err.clone().unwrap_or(StreamError::Destroyed { op: "write" });
            let end_err = err.clone().unwrap_or(StreamError::Destroyed { op: "end" });
            self.shared.event_loop.next_tick(move || {
                for cb in writes {
                    cb(Err(write_err.clone()));
                }
                for cb in ends {
                    cb(Err(end_err.clone()));
                }
            });
        }

        let sink_err = err.clone();
        self.with_sink(move |sink| sink.destroy(sink_err.as_ref()));
        destroy::schedule_error_and_close(self.shared.clone(), err.clone());

        let hook = self.shared.on_destroy.borrow().clone();
        if let Some(hook) = hook {
            hook(err.as_ref());
        }
    }

    /// Destroy as a consequence of the readable half failing.
    pub(crate) fn destroy_linked(&self, err: Option<&StreamError>) {
        {
            let mut st = self.shared.state.borrow_mut();
            if st.life.is_destroyed() {
                return;
            }
            st.life.flags.insert(Lifecycle::ERROR_EMITTED);
        }
        self.destroy(err.cloned());
    }

    pub(crate) fn error_or_destroy(&self, err: StreamError) {
        let auto_destroy = {
            let mut st = self.shared.state.borrow_mut();
            if st.life.is_destroyed() {
                return;
            }
            let auto = st.life.auto_destroy();
            if !auto {
                st.life.set_errored(&err);
            }
            auto
        };
        if auto_destroy {
            self.destroy(Some(err));
        } else {
            destroy::schedule_error(self.shared.clone(), err);
        }
    }

    // =========================================================================
    // Accessors
    // =========================================================================

    pub fn writable_length(&self) -> usize {
        self.shared.state.borrow().length()
    }

    pub fn writable_high_water_mark(&self) -> usize {
        self.shared.state.borrow().high_water_mark
    }

    pub fn writable_need_drain(&self) -> bool {
        self.shared.state.borrow().need_drain
    }

    pub fn writable_corked(&self) -> u32 {
        self.shared.state.borrow().corked
    }

    /// `end()` has been called.
    pub fn writable_ended(&self) -> bool {
        self.shared.state.borrow().ending
    }

    /// `finish` has been emitted.
    pub fn writable_finished(&self) -> bool {
        self.shared.state.borrow().finished
    }

    /// Still accepting writes.
    pub fn is_writable(&self) -> bool {
        let st = self.shared.state.borrow();
        !st.life.is_destroyed() && !st.life.is_errored() && !st.ending
    }

    pub fn is_object_mode(&self) -> bool {
        self.shared.state.borrow().object_mode()
    }

    pub fn destroyed(&self) -> bool {
        self.shared.state.borrow().life.is_destroyed()
    }

    pub fn errored(&self) -> Option<StreamError> {
        self.shared.state.borrow().life.errored.clone()
    }

    pub(crate) fn set_coupled(&self) {
        self.shared
            .state
            .borrow_mut()
            .life
            .flags
            .insert(Lifecycle::COUPLED);
    }

    /// Turn every later `write` into a no-op returning false. Used when the
    /// peer direction of a duplex ended.
    pub(crate) fn half_close(&self) {
        self.shared.state.borrow_mut().half_closed = true;
    }

    pub(crate) fn auto_destroy(&self) -> bool {
        self.shared.state.borrow().life.auto_destroy()
    }
}
