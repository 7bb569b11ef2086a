//! Two-way streams built from one readable and one writable half.
//!
//! The halves keep independent buffers and flow control. The coordinator
//! only links their lifecycles:
//!
//! - with `allow_half_open = false`, `finish` on the writable ends the
//!   readable (after any buffered data is consumed) and `end` on the
//!   readable ends the writable
//! - destroying either half destroys the other, with one `error` event
//! - with auto-destroy, the duplex is destroyed once both `end` and
//!   `finish` have been emitted, and `close` fires once

use crate::chunk::Chunk;
use crate::config::DuplexOptions;
use crate::error::{Result, StreamError};
use crate::event_loop::EventLoop;
use crate::events::{listener, Event, Listener, ListenerId, Payload};
use crate::stream::readable::{Readable, Source, WeakReadable};
use crate::stream::writable::{FinalDone, Sink, Writable, WritableShared, WriteDone};
use std::cell::RefCell;
use std::rc::{Rc, Weak};

#[derive(Clone)]
pub struct Duplex {
    readable: Readable,
    writable: Writable,
    allow_half_open: bool,
}

impl Duplex {
    pub fn new<S, K>(event_loop: &EventLoop, opts: DuplexOptions, source: S, sink: K) -> Self
    where
        S: Source + 'static,
        K: Sink + 'static,
    {
        let readable = Readable::with_source(event_loop, opts.readable.clone(), source);
        let writable = Writable::new(event_loop, opts.writable.clone(), sink);
        Self::couple(readable, writable, opts.allow_half_open)
    }

    /// A duplex that hands every written chunk to its own readable side.
    ///
    /// A write completes only once its chunk fits under the readable's
    /// high-water mark, so a slow reader throttles the writer.
    pub fn pass_through(event_loop: &EventLoop, opts: DuplexOptions) -> Self {
        let held: Rc<RefCell<Option<WriteDone>>> = Rc::default();
        let readable = Readable::with_source(
            event_loop,
            opts.readable.clone(),
            PassThroughSource { held: held.clone() },
        );
        let sink = PassThroughSink {
            readable: readable.downgrade(),
            held,
        };
        let writable = Writable::new(event_loop, opts.writable.clone(), sink);
        Self::couple(readable, writable, opts.allow_half_open)
    }

    fn couple(readable: Readable, writable: Writable, allow_half_open: bool) -> Self {
        writable.shared.events.share_ids(&readable.shared.events);
        readable.set_coupled();
        // Duplex-level `close` listeners live on the readable half. The
        // writable half still closes for listeners attached to it directly,
        // such as a pipe feeding it.
        writable.set_coupled();

        let (weak_r, weak_w) = (readable.downgrade(), Rc::downgrade(&writable.shared));

        *readable.shared.on_destroy.borrow_mut() = Some({
            let weak_w = weak_w.clone();
            Rc::new(move |err: Option<&StreamError>| {
                if let Some(w) = upgrade_writable(&weak_w) {
                    w.destroy_linked(err);
                }
            })
        });
        *writable.shared.on_destroy.borrow_mut() = Some({
            let weak_r = weak_r.clone();
            Rc::new(move |err: Option<&StreamError>| {
                if let Some(r) = weak_r.upgrade() {
                    r.destroy_linked(err);
                }
            })
        });

        {
            let (weak_r, weak_w) = (weak_r.clone(), weak_w.clone());
            writable.on_finish(move || {
                let (Some(r), Some(w)) = (weak_r.upgrade(), upgrade_writable(&weak_w)) else {
                    return;
                };
                if !allow_half_open && !r.is_ended() {
                    tracing::debug!("writable finished, ending readable half");
                    r.end_from_peer();
                }
                destroy_if_done(&r, &w);
            });
        }
        {
            let (weak_r, weak_w) = (weak_r, weak_w);
            readable.on_end(move || {
                let (Some(r), Some(w)) = (weak_r.upgrade(), upgrade_writable(&weak_w)) else {
                    return;
                };
                if !allow_half_open && !w.writable_ended() {
                    tracing::debug!("readable ended, ending writable half");
                    // Refuse writes from now on, before `end` gets to run
                    w.half_close();
                    let w2 = w.clone();
                    w.event_loop().next_tick(move || w2.end());
                }
                destroy_if_done(&r, &w);
            });
        }

        Self {
            readable,
            writable,
            allow_half_open,
        }
    }

    pub fn readable(&self) -> &Readable {
        &self.readable
    }

    pub fn writable(&self) -> &Writable {
        &self.writable
    }

    pub fn allow_half_open(&self) -> bool {
        self.allow_half_open
    }

    // Writable half

    pub fn write(&self, chunk: impl Into<Chunk>) -> bool {
        self.writable.write(chunk)
    }

    pub fn write_with<F>(&self, chunk: impl Into<Chunk>, cb: F) -> bool
    where
        F: FnOnce(Result<()>) + 'static,
    {
        self.writable.write_with(chunk, cb)
    }

    pub fn end(&self) {
        self.writable.end()
    }

    pub fn end_with(&self, chunk: impl Into<Chunk>) {
        self.writable.end_with(chunk)
    }

    pub fn end_then<F>(&self, cb: F)
    where
        F: FnOnce(Result<()>) + 'static,
    {
        self.writable.end_then(cb)
    }

    pub fn cork(&self) {
        self.writable.cork()
    }

    pub fn uncork(&self) {
        self.writable.uncork()
    }

    // Readable half

    pub fn push(&self, chunk: impl Into<Chunk>) -> bool {
        self.readable.push(chunk)
    }

    pub fn push_eof(&self) -> bool {
        self.readable.push_eof()
    }

    pub fn read(&self, n: Option<usize>) -> Option<Chunk> {
        self.readable.read(n)
    }

    pub fn pause(&self) {
        self.readable.pause()
    }

    pub fn resume(&self) {
        self.readable.resume()
    }

    pub fn is_paused(&self) -> bool {
        self.readable.is_paused()
    }

    // Events

    /// Register on the half that emits `event`. `error` goes on both.
    pub fn on(&self, event: Event, listener: Listener) -> ListenerId {
        self.register(event, listener, false)
    }

    pub fn once(&self, event: Event, listener: Listener) -> ListenerId {
        self.register(event, listener, true)
    }

    fn register(&self, event: Event, listener: Listener, once: bool) -> ListenerId {
        match event {
            Event::Error => {
                let id = if once {
                    self.readable.once(event, listener.clone())
                } else {
                    self.readable.on(event, listener.clone())
                };
                self.writable
                    .shared
                    .events
                    .insert_as(id, event, listener, once, false);
                id
            }
            Event::Drain | Event::Prefinish | Event::Finish | Event::Pipe | Event::Unpipe => {
                if once {
                    self.writable.once(event, listener)
                } else {
                    self.writable.on(event, listener)
                }
            }
            _ => {
                if once {
                    self.readable.once(event, listener)
                } else {
                    self.readable.on(event, listener)
                }
            }
        }
    }

    pub fn off(&self, id: ListenerId) {
        self.readable.off(id);
        self.writable.off(id);
    }

    pub fn on_data<F>(&self, f: F) -> ListenerId
    where
        F: Fn(&Chunk) + 'static,
    {
        self.readable.on_data(f)
    }

    pub fn on_end<F>(&self, f: F) -> ListenerId
    where
        F: Fn() + 'static,
    {
        self.readable.on_end(f)
    }

    pub fn on_readable<F>(&self, f: F) -> ListenerId
    where
        F: Fn() + 'static,
    {
        self.readable.on_readable(f)
    }

    pub fn on_drain<F>(&self, f: F) -> ListenerId
    where
        F: Fn() + 'static,
    {
        self.writable.on_drain(f)
    }

    pub fn on_finish<F>(&self, f: F) -> ListenerId
    where
        F: Fn() + 'static,
    {
        self.writable.on_finish(f)
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
        self.readable.on_close(f)
    }

    /// Destroy both halves.
    pub fn destroy(&self, err: Option<StreamError>) {
        self.readable.destroy(err)
    }

    pub fn destroyed(&self) -> bool {
        self.readable.destroyed() && self.writable.destroyed()
    }
}

fn upgrade_writable(weak: &Weak<WritableShared>) -> Option<Writable> {
    weak.upgrade().map(|shared| Writable { shared })
}

fn destroy_if_done(r: &Readable, w: &Writable) {
    if r.readable_ended() && w.writable_finished() && r.auto_destroy() && w.auto_destroy() {
        r.destroy(None);
    }
}

struct PassThroughSink {
    readable: WeakReadable,
    /// Write waiting for the reader to make room
    held: Rc<RefCell<Option<WriteDone>>>,
}

impl Sink for PassThroughSink {
    fn write(&mut self, chunk: Chunk, done: WriteDone) {
        match self.readable.upgrade() {
            Some(readable) if !readable.push(chunk) => *self.held.borrow_mut() = Some(done),
            _ => done.ok(),
        }
    }

    fn finalize(&mut self, done: FinalDone) {
        if let Some(readable) = self.readable.upgrade() {
            readable.push_eof();
        }
        done.ok();
    }
}

struct PassThroughSource {
    held: Rc<RefCell<Option<WriteDone>>>,
}

impl Source for PassThroughSource {
    fn read(&mut self, _size: usize, _stream: &Readable) {
        let held = self.held.borrow_mut().take();
        if let Some(done) = held {
            done.ok();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{ReadableOptions, WritableOptions};
    use crate::error::ErrorCode;
    use crate::stream::readable::Flowing;
    use crate::stream::writable::FnSink;
    use std::cell::Cell;

    struct ExternalSource;

    impl Source for ExternalSource {
        fn read(&mut self, _size: usize, _stream: &Readable) {}
    }

    fn echo_duplex(
        event_loop: &EventLoop,
        allow_half_open: bool,
    ) -> (Duplex, Rc<RefCell<Vec<Chunk>>>) {
        let written = Rc::new(RefCell::new(Vec::new()));
        let w = written.clone();
        let sink = FnSink::new(move |chunk, done: WriteDone| {
            w.borrow_mut().push(chunk);
            done.ok();
        });
        let duplex = Duplex::new(
            event_loop,
            DuplexOptions::object_mode().allow_half_open(allow_half_open),
            ExternalSource,
            sink,
        );
        (duplex, written)
    }

    fn flag() -> (Rc<Cell<bool>>, impl Fn() + 'static) {
        let flag = Rc::new(Cell::new(false));
        let f = flag.clone();
        (flag, move || f.set(true))
    }

    #[test]
    fn test_half_open_keeps_sides_independent() {
        let event_loop = EventLoop::new();
        let (duplex, written) = echo_duplex(&event_loop, true);
        let (ended, on_end) = flag();
        duplex.on_end(on_end);
        let (finished, on_finish) = flag();
        duplex.on_finish(on_finish);

        duplex.write(Chunk::object("out"));
        duplex.end();
        event_loop.run_until_idle().unwrap();
        assert!(finished.get());
        assert!(!ended.get());
        assert!(!duplex.destroyed());

        // The read side still works after the write side finished
        duplex.push(Chunk::object("in"));
        assert_eq!(duplex.read(None), Some(Chunk::object("in")));
        assert_eq!(written.borrow().len(), 1);
    }

    #[test]
    fn test_readable_end_leaves_writable_open_when_half_open() {
        let event_loop = EventLoop::new();
        let (duplex, _) = echo_duplex(&event_loop, true);
        duplex.on_data(|_| {});
        duplex.push_eof();
        event_loop.run_until_idle().unwrap();
        assert!(duplex.readable().readable_ended());
        assert!(duplex.writable().is_writable());
        assert!(duplex.write(Chunk::object(1)));
    }

    #[test]
    fn test_finish_ends_empty_readable() {
        let event_loop = EventLoop::new();
        let (duplex, _) = echo_duplex(&event_loop, false);
        let (ended, on_end) = flag();
        duplex.on_end(on_end);
        let closes = Rc::new(Cell::new(0));
        let c = closes.clone();
        duplex.on_close(move || c.set(c.get() + 1));

        duplex.end();
        event_loop.run_until_idle().unwrap();
        assert!(ended.get());
        assert!(duplex.destroyed());
        assert_eq!(closes.get(), 1);
    }

    #[test]
    fn test_finish_keeps_buffered_readable_data() {
        let event_loop = EventLoop::new();
        let (duplex, _) = echo_duplex(&event_loop, false);
        let (ended, on_end) = flag();
        duplex.on_end(on_end);
        let readable_fired = Rc::new(Cell::new(0));
        let r = readable_fired.clone();
        duplex.on_readable(move || r.set(r.get() + 1));

        duplex.push(Chunk::object("pending"));
        event_loop.run_until_idle().unwrap();
        let before = readable_fired.get();

        duplex.end();
        event_loop.run_until_idle().unwrap();
        assert!(!ended.get(), "buffered data must be consumed first");
        assert!(readable_fired.get() > before);
        assert_eq!(duplex.readable().readable_length(), 1);

        assert_eq!(duplex.read(None), Some(Chunk::object("pending")));
        assert_eq!(duplex.read(None), None);
        event_loop.run_until_idle().unwrap();
        assert!(ended.get());
    }

    #[test]
    fn test_readable_end_ends_writable_without_half_open() {
        let event_loop = EventLoop::new();
        let (duplex, _) = echo_duplex(&event_loop, false);
        let (finished, on_finish) = flag();
        duplex.on_finish(on_finish);
        duplex.on_data(|_| {});

        duplex.push_eof();
        event_loop.run_until_idle().unwrap();
        assert!(duplex.writable().writable_ended());
        assert!(finished.get());
        assert!(duplex.destroyed());
    }

    /// Duplex whose sink holds every completion until the test releases it.
    fn parked_duplex(event_loop: &EventLoop) -> (Duplex, Rc<RefCell<Vec<WriteDone>>>) {
        let parked = Rc::new(RefCell::new(Vec::new()));
        let p = parked.clone();
        let sink = FnSink::new(move |_chunk, done: WriteDone| p.borrow_mut().push(done));
        let duplex = Duplex::new(
            event_loop,
            DuplexOptions::object_mode().allow_half_open(false),
            ExternalSource,
            sink,
        );
        (duplex, parked)
    }

    fn error_count(duplex: &Duplex) -> Rc<Cell<usize>> {
        let errors = Rc::new(Cell::new(0));
        let e = errors.clone();
        duplex.on_error(move |_| e.set(e.get() + 1));
        errors
    }

    #[test]
    fn test_write_from_end_listener_refused_without_half_open() {
        let event_loop = EventLoop::new();
        let (duplex, parked) = parked_duplex(&event_loop);
        let errors = error_count(&duplex);
        duplex.write(Chunk::object("in flight"));

        // (return value, callback ran before the write returned, callback code)
        let outcome = Rc::new(RefCell::new(None));
        let code = Rc::new(RefCell::new(None));
        let (d, o, c) = (duplex.clone(), outcome.clone(), code.clone());
        duplex.on_end(move || {
            let c2 = c.clone();
            let ret = d.write_with(Chunk::object("late"), move |res| {
                *c2.borrow_mut() = Some(res.unwrap_err().code())
            });
            *o.borrow_mut() = Some((ret, c.borrow().is_some()));
        });
        duplex.on_data(|_| {});

        duplex.push_eof();
        event_loop.run_until_idle().unwrap();
        assert_eq!(*outcome.borrow(), Some((false, false)));
        assert_eq!(*code.borrow(), Some(ErrorCode::WriteAfterEnd));
        assert_eq!(errors.get(), 0);
        assert!(!duplex.destroyed());
        assert!(duplex.writable().writable_ended());
        assert_eq!(duplex.writable().writable_length(), 1);

        // The write already in flight still lands and the half finishes
        let (finished, on_finish) = flag();
        duplex.on_finish(on_finish);
        parked.borrow_mut().remove(0).ok();
        event_loop.run_until_idle().unwrap();
        assert!(finished.get());
        assert!(duplex.destroyed());
        assert_eq!(errors.get(), 0);
    }

    #[test]
    fn test_write_after_read_side_ended_refused_without_half_open() {
        let event_loop = EventLoop::new();
        let (duplex, parked) = parked_duplex(&event_loop);
        let errors = error_count(&duplex);
        duplex.write(Chunk::object("in flight"));
        duplex.on_data(|_| {});
        duplex.push_eof();
        event_loop.run_until_idle().unwrap();
        assert!(duplex.readable().readable_ended());

        let code = Rc::new(RefCell::new(None));
        let c = code.clone();
        let ret = duplex.write_with(Chunk::object("late"), move |res| {
            *c.borrow_mut() = Some(res.unwrap_err().code())
        });
        assert!(!ret);
        assert!(code.borrow().is_none());
        event_loop.run_until_idle().unwrap();
        assert_eq!(*code.borrow(), Some(ErrorCode::WriteAfterEnd));
        assert_eq!(errors.get(), 0);
        assert!(!duplex.destroyed());

        parked.borrow_mut().remove(0).ok();
        event_loop.run_until_idle().unwrap();
        assert!(duplex.writable().writable_finished());
        assert!(parked.borrow().is_empty(), "refused chunk never reaches the sink");
        assert_eq!(errors.get(), 0);
    }

    #[test]
    fn test_error_destroys_both_halves_once() {
        let event_loop = EventLoop::new();
        let sink = FnSink::new(|_chunk, done: WriteDone| {
            done.fail(StreamError::custom("socket reset"))
        });
        let duplex = Duplex::new(&event_loop, DuplexOptions::default(), ExternalSource, sink);
        let errors = Rc::new(RefCell::new(Vec::new()));
        let e = errors.clone();
        duplex.on_error(move |err| e.borrow_mut().push(err.to_string()));
        let closes = Rc::new(Cell::new(0));
        let c = closes.clone();
        duplex.on_close(move || c.set(c.get() + 1));

        duplex.write("x");
        event_loop.run_until_idle().unwrap();
        assert_eq!(*errors.borrow(), vec!["socket reset".to_string()]);
        assert_eq!(closes.get(), 1);
        assert!(duplex.readable().destroyed());
        assert!(duplex.writable().destroyed());
        assert!(!duplex.push("late"));
    }

    #[test]
    fn test_off_removes_error_listener_from_both_halves() {
        let event_loop = EventLoop::new();
        let (duplex, _) = echo_duplex(&event_loop, true);
        let id = duplex.on_error(|_| {});
        assert_eq!(duplex.readable().listener_count(Event::Error), 1);
        assert_eq!(duplex.writable().listener_count(Event::Error), 1);
        duplex.off(id);
        assert_eq!(duplex.readable().listener_count(Event::Error), 0);
        assert_eq!(duplex.writable().listener_count(Event::Error), 0);
    }

    #[test]
    fn test_pass_through_throttles_writer() {
        let event_loop = EventLoop::new();
        let opts = DuplexOptions {
            allow_half_open: true,
            readable: ReadableOptions::object_mode().with_high_water_mark(2),
            writable: WritableOptions::object_mode().with_high_water_mark(2),
        };
        let pass = Duplex::pass_through(&event_loop, opts);

        let returns: Vec<bool> = (0..6).map(|i| pass.write(Chunk::object(i))).collect();
        assert_eq!(returns, vec![true, true, true, false, false, false]);
        // Readable is full, so one write is held and the rest are queued
        assert_eq!(pass.readable().readable_length(), 2);
        assert_eq!(pass.writable().writable_length(), 4);

        let seen = Rc::new(RefCell::new(Vec::new()));
        let s = seen.clone();
        pass.on_data(move |chunk| s.borrow_mut().push(chunk.as_object().cloned()));
        let (ended, on_end) = flag();
        pass.on_end(on_end);
        pass.end();

        event_loop.run_until_idle().unwrap();
        assert_eq!(seen.borrow().len(), 6);
        assert!(pass.writable().writable_finished());
        assert!(ended.get());
        assert_eq!(pass.readable().readable_flowing(), Flowing::Flowing);
        assert!(pass.destroyed());
    }

    #[test]
    fn test_write_after_end_through_duplex() {
        let event_loop = EventLoop::new();
        let (duplex, _) = echo_duplex(&event_loop, true);
        let code = Rc::new(RefCell::new(None));
        let c = code.clone();
        duplex.on_error(move |err| *c.borrow_mut() = Some(err.code()));
        duplex.end();
        duplex.write(Chunk::object(1));
        event_loop.run_until_idle().unwrap();
        assert_eq!(*code.borrow(), Some(ErrorCode::WriteAfterEnd));
        assert!(duplex.readable().destroyed());
    }
}
