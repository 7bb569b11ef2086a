//! Readable side: buffering produced chunks and delivering them to consumers.
//!
//! A producer ([`Source`]) pushes chunks with [`Readable::push`] and signals
//! EOF with [`Readable::push_eof`]. Consumers either pull with
//! [`Readable::read`] or attach a `data` listener, which switches the stream
//! into flowing mode. `data` is always delivered from a queued task, never
//! from inside `push`, so listeners can call back into the stream freely.
//!
//! # Modes
//!
//! ```text
//! NotDecided --on_data/resume/pipe--> Flowing
//!     |                                  |
//!     +--read()/pause()/on_readable--> Paused <--pause()--+
//! ```

use crate::chunk::Chunk;
use crate::config::{ReadableOptions, MAX_HIGH_WATER_MARK};
use crate::error::StreamError;
use crate::event_loop::EventLoop;
use crate::events::{listener, Event, EventEmitter, Listener, ListenerId, Payload};
use crate::stream::buffer_queue::BufferQueue;
use crate::stream::destroy::{self, Lifecycle, LifecycleState, Lifecycled};
use crate::stream::pipe::PipeRegistry;
use std::cell::RefCell;
use std::rc::{Rc, Weak};

/// Whether chunks are pushed to listeners or pulled by `read()`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Flowing {
    /// No consumer has chosen a mode yet
    #[default]
    NotDecided,
    Flowing,
    Paused,
}

/// Producer behind a readable stream.
pub trait Source {
    /// Produce up to `size` units, by calling `stream.push` now or later.
    fn read(&mut self, size: usize, stream: &Readable);

    /// Release resources. Called once when the stream is destroyed.
    fn destroy(&mut self, _err: Option<&StreamError>) {}
}

/// Source for streams fed entirely by outside calls to `push`.
struct ExternalSource;

impl Source for ExternalSource {
    fn read(&mut self, _size: usize, _stream: &Readable) {}
}

/// Source that drains an iterator, pausing whenever `push` reports the
/// buffer is full.
pub struct IterSource<I> {
    iter: I,
}

impl<I> IterSource<I> {
    pub fn new(iter: I) -> Self {
        Self { iter }
    }
}

impl<I> Source for IterSource<I>
where
    I: Iterator,
    I::Item: Into<Chunk>,
{
    fn read(&mut self, _size: usize, stream: &Readable) {
        loop {
            match self.iter.next() {
                Some(item) => {
                    if !stream.push(item) {
                        break;
                    }
                }
                None => {
                    stream.push_eof();
                    break;
                }
            }
        }
    }
}

pub struct ReadableState {
    pub(crate) buffer: BufferQueue<Chunk>,
    pub(crate) high_water_mark: usize,
    pub(crate) flowing: Flowing,
    /// Set by `pause()`, cleared by `resume()`
    pub(crate) paused: bool,
    /// `pause()` or `resume()` was ever called
    pub(crate) has_paused: bool,
    pub(crate) ended: bool,
    pub(crate) end_emitted: bool,
    /// A `Source::read` call is outstanding
    pub(crate) reading: bool,
    pub(crate) need_readable: bool,
    pub(crate) emitted_readable: bool,
    pub(crate) readable_listening: bool,
    pub(crate) data_listening: bool,
    pub(crate) resume_scheduled: bool,
    pub(crate) reading_more: bool,
    pub(crate) data_emitted: bool,
    pub(crate) life: LifecycleState,
}

impl ReadableState {
    fn new(opts: &ReadableOptions) -> Self {
        Self {
            buffer: BufferQueue::new(opts.object_mode),
            high_water_mark: opts.effective_high_water_mark(),
            flowing: Flowing::NotDecided,
            paused: false,
            has_paused: false,
            ended: false,
            end_emitted: false,
            reading: false,
            need_readable: false,
            emitted_readable: false,
            readable_listening: false,
            data_listening: false,
            resume_scheduled: false,
            reading_more: false,
            data_emitted: false,
            life: LifecycleState::new(opts.auto_destroy, opts.emit_close),
        }
    }

    pub fn length(&self) -> usize {
        self.buffer.length()
    }

    pub fn object_mode(&self) -> bool {
        self.buffer.is_object_mode()
    }

    fn destroyed_or_errored(&self) -> bool {
        self.life.is_destroyed() || self.life.is_errored()
    }

    /// More data is welcome: below the mark, or nothing buffered at all.
    fn can_push_more(&self) -> bool {
        !self.ended && (self.length() < self.high_water_mark || self.length() == 0)
    }

    fn how_much_to_read(&self, requested: Option<usize>) -> usize {
        let length = self.length();
        if requested == Some(0) || (length == 0 && self.ended) {
            return 0;
        }
        if self.object_mode() {
            return 1;
        }
        match requested {
            // Only flow one chunk at a time
            None if self.flowing == Flowing::Flowing && length > 0 => {
                self.buffer.peek().map(Chunk::byte_len).unwrap_or(0)
            }
            None => length,
            Some(n) if n <= length => n,
            Some(_) if self.ended => length,
            Some(_) => 0,
        }
    }
}

pub(crate) type DestroyHook = Rc<dyn Fn(Option<&StreamError>)>;

pub(crate) struct ReadableShared {
    pub(crate) state: RefCell<ReadableState>,
    pub(crate) events: EventEmitter,
    pub(crate) pipes: RefCell<PipeRegistry>,
    source: RefCell<Box<dyn Source>>,
    event_loop: EventLoop,
    /// Duplex coupling: destroys the other half
    pub(crate) on_destroy: RefCell<Option<DestroyHook>>,
}

impl Lifecycled for ReadableShared {
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

/// Handle to a readable stream. Clones share the same stream.
#[derive(Clone)]
pub struct Readable {
    pub(crate) shared: Rc<ReadableShared>,
}

/// Non-owning handle, used by listeners that must not keep a stream alive.
#[derive(Clone)]
pub struct WeakReadable(Weak<ReadableShared>);

impl WeakReadable {
    pub fn upgrade(&self) -> Option<Readable> {
        self.0.upgrade().map(|shared| Readable { shared })
    }
}

impl Readable {
    /// A readable fed by outside calls to `push`.
    pub fn new(event_loop: &EventLoop, opts: ReadableOptions) -> Self {
        Self::with_source(event_loop, opts, ExternalSource)
    }

    pub fn with_source<S>(event_loop: &EventLoop, opts: ReadableOptions, source: S) -> Self
    where
        S: Source + 'static,
    {
        Self {
            shared: Rc::new(ReadableShared {
                state: RefCell::new(ReadableState::new(&opts)),
                events: EventEmitter::new(),
                pipes: RefCell::new(PipeRegistry::default()),
                source: RefCell::new(Box::new(source)),
                event_loop: event_loop.clone(),
                on_destroy: RefCell::new(None),
            }),
        }
    }

    /// A readable that yields every item of `iter`, then ends.
    pub fn from_iter<I, T>(event_loop: &EventLoop, opts: ReadableOptions, iter: I) -> Self
    where
        I: IntoIterator<Item = T>,
        I::IntoIter: 'static,
        T: Into<Chunk>,
    {
        Self::with_source(event_loop, opts, IterSource::new(iter.into_iter()))
    }

    pub fn downgrade(&self) -> WeakReadable {
        WeakReadable(Rc::downgrade(&self.shared))
    }

    pub fn ptr_eq(&self, other: &Readable) -> bool {
        Rc::ptr_eq(&self.shared, &other.shared)
    }

    pub fn event_loop(&self) -> &EventLoop {
        &self.shared.event_loop
    }

    // =========================================================================
    // Producer side
    // =========================================================================

    /// Buffer a chunk. Returns false once the producer should stop.
    pub fn push(&self, chunk: impl Into<Chunk>) -> bool {
        self.add_chunk(Some(chunk.into()), false)
    }

    /// Signal that no more data will be pushed.
    pub fn push_eof(&self) -> bool {
        self.add_chunk(None, false)
    }

    /// Put a chunk back at the front of the buffer.
    pub fn unshift(&self, chunk: impl Into<Chunk>) -> bool {
        self.add_chunk(Some(chunk.into()), true)
    }

    fn add_chunk(&self, chunk: Option<Chunk>, front: bool) -> bool {
        let mut st = self.shared.state.borrow_mut();

        let Some(chunk) = chunk else {
            st.reading = false;
            drop(st);
            self.on_eof();
            return false;
        };

        if !st.object_mode() {
            if matches!(chunk, Chunk::Object(_)) {
                drop(st);
                self.error_or_destroy(StreamError::InvalidChunk {
                    expected: "bytes in byte mode",
                });
                return false;
            }
            if chunk.is_empty() {
                st.reading = false;
                let more = st.can_push_more();
                drop(st);
                self.maybe_read_more();
                return more;
            }
        }

        if front {
            if st.end_emitted {
                drop(st);
                self.error_or_destroy(StreamError::UnshiftAfterEndEvent);
                return false;
            }
        } else if st.ended {
            drop(st);
            self.error_or_destroy(StreamError::PushAfterEof);
            return false;
        }
        if st.destroyed_or_errored() {
            return false;
        }

        if front {
            st.buffer.unshift(chunk);
        } else {
            st.reading = false;
            st.buffer.push(chunk);
        }
        tracing::trace!(length = st.length(), hwm = st.high_water_mark, "buffered chunk");

        let notify = st.need_readable || st.flowing == Flowing::Flowing;
        let more = st.can_push_more();
        drop(st);

        if notify {
            self.emit_readable();
        }
        self.maybe_read_more();
        more
    }

    fn on_eof(&self) {
        {
            let mut st = self.shared.state.borrow_mut();
            if st.ended {
                return;
            }
            st.ended = true;
            tracing::debug!(length = st.length(), "readable got EOF");
        }
        self.emit_readable();
    }

    /// Ended by the writable half of a duplex. Buffered data is still
    /// delivered before `end`.
    pub(crate) fn end_from_peer(&self) {
        let buffered = {
            let mut st = self.shared.state.borrow_mut();
            if st.ended {
                return;
            }
            st.ended = true;
            st.length() > 0
        };
        if buffered {
            self.emit_readable();
        } else {
            self.end_readable();
        }
    }

    // =========================================================================
    // Consumer side
    // =========================================================================

    /// Pull up to `n` units (`None` = everything buffered, one chunk at a
    /// time in object mode). Returns `None` when not enough data is
    /// buffered yet, or at EOF.
    ///
    /// An explicit read on an undecided stream puts it in paused mode.
    pub fn read(&self, n: Option<usize>) -> Option<Chunk> {
        {
            let mut st = self.shared.state.borrow_mut();
            if st.flowing == Flowing::NotDecided {
                st.flowing = Flowing::Paused;
            }
        }
        self.read_inner(n)
    }

    pub(crate) fn read_inner(&self, requested: Option<usize>) -> Option<Chunk> {
        let mut st = self.shared.state.borrow_mut();

        if let Some(n) = requested {
            if n > st.high_water_mark {
                if n > MAX_HIGH_WATER_MARK {
                    drop(st);
                    self.error_or_destroy(StreamError::OutOfRange { size: n });
                    return None;
                }
                st.high_water_mark = n.next_power_of_two();
            }
        }
        if requested != Some(0) {
            st.emitted_readable = false;
        }

        // read(0) with enough buffered only re-signals `readable`
        if requested == Some(0) && st.need_readable {
            let full = if st.high_water_mark != 0 {
                st.length() >= st.high_water_mark
            } else {
                st.length() > 0
            };
            if full || st.ended {
                let end = st.length() == 0 && st.ended;
                drop(st);
                if end {
                    self.end_readable();
                } else {
                    self.emit_readable();
                }
                return None;
            }
        }

        let mut n = st.how_much_to_read(requested);

        if n == 0 && st.ended {
            let end = st.length() == 0;
            drop(st);
            if end {
                self.end_readable();
            }
            return None;
        }

        let mut do_read = st.need_readable
            || st.length() == 0
            || st.length().saturating_sub(n) < st.high_water_mark;
        if st.reading || st.ended || st.destroyed_or_errored() {
            do_read = false;
        }
        if do_read {
            st.reading = true;
            if st.length() == 0 {
                st.need_readable = true;
            }
            let size = st.high_water_mark;
            drop(st);
            self.call_source(size);
            st = self.shared.state.borrow_mut();
            // A synchronous push may have changed what is available
            if !st.reading {
                n = st.how_much_to_read(requested);
            }
        }

        let ret = if n > 0 { st.buffer.take(n) } else { None };
        if ret.is_none() {
            st.need_readable = st.length() <= st.high_water_mark;
            n = 0;
        }

        let mut end = false;
        if st.length() == 0 {
            if !st.ended {
                st.need_readable = true;
            }
            // Reading past EOF
            if requested != Some(n) && st.ended {
                end = true;
            }
        }

        let emit = ret.is_some()
            && !st
                .life
                .flags
                .intersects(Lifecycle::ERROR_EMITTED | Lifecycle::CLOSE_EMITTED);
        if emit {
            st.data_emitted = true;
        }
        drop(st);

        if end {
            self.end_readable();
        }
        if emit {
            if let Some(chunk) = &ret {
                self.shared.events.emit(Event::Data, &Payload::Chunk(chunk));
            }
        }
        ret
    }

    fn call_source(&self, size: usize) {
        // A busy source means this is a nested read; the outer call handles it
        match self.shared.source.try_borrow_mut() {
            Ok(mut source) => source.read(size, self),
            Err(_) => self.shared.state.borrow_mut().reading = false,
        }
    }

    fn emit_readable(&self) {
        let schedule = {
            let mut st = self.shared.state.borrow_mut();
            st.need_readable = false;
            let schedule = !st.emitted_readable;
            st.emitted_readable = true;
            schedule
        };
        if schedule {
            let this = self.clone();
            self.shared.event_loop.next_tick(move || this.emit_readable_now());
        }
    }

    fn emit_readable_now(&self) {
        let emit = {
            let st = self.shared.state.borrow();
            !st.destroyed_or_errored() && (st.length() > 0 || st.ended)
        };
        if emit {
            self.shared.events.emit(Event::Readable, &Payload::Empty);
            self.shared.state.borrow_mut().emitted_readable = false;
        }

        {
            let mut st = self.shared.state.borrow_mut();
            if st.flowing != Flowing::Flowing && !st.ended && st.length() <= st.high_water_mark {
                st.need_readable = true;
            }
        }
        self.flow();
    }

    fn flow(&self) {
        while self.flowing() == Flowing::Flowing && self.read_inner(None).is_some() {}
    }

    fn maybe_read_more(&self) {
        let schedule = {
            let mut st = self.shared.state.borrow_mut();
            let schedule = !st.reading_more;
            st.reading_more = true;
            schedule
        };
        if schedule {
            let this = self.clone();
            self.shared.event_loop.next_tick(move || this.maybe_read_more_now());
        }
    }

    fn maybe_read_more_now(&self) {
        loop {
            let (more, len) = {
                let st = self.shared.state.borrow();
                let more = !st.reading
                    && !st.ended
                    && !st.destroyed_or_errored()
                    && (st.length() < st.high_water_mark
                        || (st.flowing == Flowing::Flowing && st.length() == 0));
                (more, st.length())
            };
            if !more {
                break;
            }
            self.read_inner(Some(0));
            if len == self.readable_length() {
                // Nothing arrived, stop spinning
                break;
            }
        }
        self.shared.state.borrow_mut().reading_more = false;
    }

    fn end_readable(&self) {
        let schedule = {
            let mut st = self.shared.state.borrow_mut();
            if st.end_emitted {
                false
            } else {
                st.ended = true;
                true
            }
        };
        if schedule {
            let this = self.clone();
            self.shared.event_loop.next_tick(move || this.end_readable_now());
        }
    }

    fn end_readable_now(&self) {
        let auto_destroy = {
            let mut st = self.shared.state.borrow_mut();
            let blocked = st.life.is_errored()
                || st.life.flags.contains(Lifecycle::CLOSE_EMITTED)
                || st.end_emitted
                || st.length() > 0;
            if blocked {
                return;
            }
            st.end_emitted = true;
            st.life.auto_destroy() && !st.life.is_coupled()
        };
        tracing::debug!("readable end");
        self.shared.events.emit(Event::End, &Payload::Empty);
        if auto_destroy {
            self.destroy(None);
        }
    }

    // =========================================================================
    // Flow control
    // =========================================================================

    /// Stop emitting `data`. Buffered and newly pushed chunks are held.
    pub fn pause(&self) {
        let emit = {
            let mut st = self.shared.state.borrow_mut();
            let emit = st.flowing != Flowing::Paused;
            st.flowing = Flowing::Paused;
            st.paused = true;
            st.has_paused = true;
            emit
        };
        if emit {
            tracing::debug!("pause");
            self.shared.events.emit(Event::Pause, &Payload::Empty);
        }
    }

    /// Switch to flowing mode. Buffered chunks are delivered from a queued
    /// task, in order.
    pub fn resume(&self) {
        let schedule = {
            let mut st = self.shared.state.borrow_mut();
            let mut schedule = false;
            if st.flowing != Flowing::Flowing {
                st.flowing = if st.readable_listening {
                    Flowing::Paused
                } else {
                    Flowing::Flowing
                };
                if !st.resume_scheduled {
                    st.resume_scheduled = true;
                    schedule = true;
                }
            }
            st.has_paused = true;
            st.paused = false;
            schedule
        };
        if schedule {
            tracing::debug!("resume");
            let this = self.clone();
            self.shared.event_loop.next_tick(move || this.resume_now());
        }
    }

    fn resume_now(&self) {
        if !self.shared.state.borrow().reading {
            self.read_inner(Some(0));
        }
        self.shared.state.borrow_mut().resume_scheduled = false;
        self.shared.events.emit(Event::Resume, &Payload::Empty);
        self.flow();
        let kick = {
            let st = self.shared.state.borrow();
            st.flowing == Flowing::Flowing && !st.reading
        };
        if kick {
            self.read_inner(Some(0));
        }
    }

    pub fn is_paused(&self) -> bool {
        let st = self.shared.state.borrow();
        st.paused || st.flowing == Flowing::Paused
    }

    // =========================================================================
    // Listeners
    // =========================================================================

    pub fn on(&self, event: Event, listener: Listener) -> ListenerId {
        let id = self.shared.events.on(event, listener);
        self.listener_added(event);
        id
    }

    pub fn once(&self, event: Event, listener: Listener) -> ListenerId {
        let id = self.shared.events.once(event, listener);
        self.listener_added(event);
        id
    }

    pub fn off(&self, id: ListenerId) {
        match self.shared.events.off(id) {
            Some(Event::Readable) => {
                let this = self.clone();
                self.shared
                    .event_loop
                    .next_tick(move || this.update_readable_listening());
            }
            Some(Event::Data) if self.shared.events.listener_count(Event::Data) == 0 => {
                self.shared.state.borrow_mut().data_listening = false;
            }
            _ => {}
        }
    }

    pub fn listener_count(&self, event: Event) -> usize {
        self.shared.events.listener_count(event)
    }

    fn listener_added(&self, event: Event) {
        match event {
            Event::Data => {
                let resume = {
                    let mut st = self.shared.state.borrow_mut();
                    st.data_listening = true;
                    st.readable_listening = self.shared.events.listener_count(Event::Readable) > 0;
                    st.flowing != Flowing::Paused
                };
                if resume {
                    self.resume();
                }
            }
            Event::Readable => {
                let (emit, kick) = {
                    let mut st = self.shared.state.borrow_mut();
                    if st.end_emitted || st.readable_listening {
                        return;
                    }
                    st.readable_listening = true;
                    st.need_readable = true;
                    st.flowing = Flowing::Paused;
                    st.emitted_readable = false;
                    tracing::debug!("on readable");
                    (st.length() > 0, st.length() == 0 && !st.reading)
                };
                if emit {
                    self.emit_readable();
                } else if kick {
                    let this = self.clone();
                    self.shared.event_loop.next_tick(move || {
                        this.read_inner(Some(0));
                    });
                }
            }
            _ => {}
        }
    }

    fn update_readable_listening(&self) {
        let resume = {
            let mut st = self.shared.state.borrow_mut();
            st.readable_listening = self.shared.events.listener_count(Event::Readable) > 0;
            if st.has_paused && !st.paused && st.resume_scheduled {
                st.flowing = Flowing::Flowing;
                false
            } else if st.data_listening {
                true
            } else {
                if !st.readable_listening {
                    st.flowing = Flowing::NotDecided;
                }
                false
            }
        };
        if resume {
            self.resume();
        }
    }

    pub fn on_data<F>(&self, f: F) -> ListenerId
    where
        F: Fn(&Chunk) + 'static,
    {
        self.on(
            Event::Data,
            listener(move |payload| {
                if let Payload::Chunk(chunk) = payload {
                    f(chunk);
                }
            }),
        )
    }

    pub fn on_readable<F>(&self, f: F) -> ListenerId
    where
        F: Fn() + 'static,
    {
        self.on(Event::Readable, listener(move |_| f()))
    }

    pub fn on_end<F>(&self, f: F) -> ListenerId
    where
        F: Fn() + 'static,
    {
        self.on(Event::End, listener(move |_| f()))
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

    /// Tear the stream down. Buffered chunks are dropped, `error` (if
    /// given) and then `close` are emitted on the next tick.
    pub fn destroy(&self, err: Option<StreamError>) {
        {
            let mut st = self.shared.state.borrow_mut();
            if !st.life.begin_destroy(err.as_ref()) {
                return;
            }
            st.buffer.clear();
        }
        tracing::debug!(error = ?err, "destroy readable");

        if let Ok(mut source) = self.shared.source.try_borrow_mut() {
            source.destroy(err.as_ref());
        }
        destroy::schedule_error_and_close(self.shared.clone(), err.clone());

        let hook = self.shared.on_destroy.borrow().clone();
        if let Some(hook) = hook {
            hook(err.as_ref());
        }
    }

    /// Destroy as a consequence of the other duplex half failing; that half
    /// already reports the error.
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

    pub fn readable_length(&self) -> usize {
        self.shared.state.borrow().length()
    }

    pub fn readable_high_water_mark(&self) -> usize {
        self.shared.state.borrow().high_water_mark
    }

    pub fn readable_flowing(&self) -> Flowing {
        self.flowing()
    }

    fn flowing(&self) -> Flowing {
        self.shared.state.borrow().flowing
    }

    /// `end` has been emitted.
    pub fn readable_ended(&self) -> bool {
        self.shared.state.borrow().end_emitted
    }

    /// EOF has been pushed (data may still be buffered).
    pub fn is_ended(&self) -> bool {
        self.shared.state.borrow().ended
    }

    /// Still able to deliver data.
    pub fn is_readable(&self) -> bool {
        let st = self.shared.state.borrow();
        !st.destroyed_or_errored() && !st.end_emitted
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

    pub(crate) fn auto_destroy(&self) -> bool {
        self.shared.state.borrow().life.auto_destroy()
    }
}
