//! Lifecycle flags and error/close delivery shared by both stream sides.

use crate::error::StreamError;
use crate::event_loop::EventLoop;
use crate::events::{Event, EventEmitter, Payload};
use std::rc::Rc;

bitflags::bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct Lifecycle: u8 {
        const DESTROYED = 1 << 0;
        const ERROR_EMITTED = 1 << 1;
        const CLOSE_EMITTED = 1 << 2;
        const AUTO_DESTROY = 1 << 3;
        const EMIT_CLOSE = 1 << 4;
        /// Half of a duplex; the coordinator decides when to auto-destroy
        const COUPLED = 1 << 5;
    }
}

#[derive(Debug)]
pub struct LifecycleState {
    pub flags: Lifecycle,
    pub errored: Option<StreamError>,
}

impl LifecycleState {
    pub fn new(auto_destroy: bool, emit_close: bool) -> Self {
        let mut flags = Lifecycle::empty();
        flags.set(Lifecycle::AUTO_DESTROY, auto_destroy);
        flags.set(Lifecycle::EMIT_CLOSE, emit_close);
        Self {
            flags,
            errored: None,
        }
    }

    pub fn is_destroyed(&self) -> bool {
        self.flags.contains(Lifecycle::DESTROYED)
    }

    pub fn is_errored(&self) -> bool {
        self.errored.is_some()
    }

    pub fn auto_destroy(&self) -> bool {
        self.flags.contains(Lifecycle::AUTO_DESTROY)
    }

    pub fn is_coupled(&self) -> bool {
        self.flags.contains(Lifecycle::COUPLED)
    }

    /// Record an error unless one is already recorded.
    pub fn set_errored(&mut self, err: &StreamError) {
        if self.errored.is_none() {
            self.errored = Some(err.clone());
        }
    }

    /// Mark destroyed. Returns false if it already was.
    pub fn begin_destroy(&mut self, err: Option<&StreamError>) -> bool {
        if self.is_destroyed() {
            return false;
        }
        self.flags.insert(Lifecycle::DESTROYED);
        if let Some(err) = err {
            self.set_errored(err);
        }
        true
    }
}

/// Implemented by each side's shared state so destroy logic is written once.
pub(crate) trait Lifecycled: 'static {
    fn lifecycle<R>(&self, f: impl FnOnce(&mut LifecycleState) -> R) -> R;
    fn emitter(&self) -> &EventEmitter;
    fn event_loop(&self) -> &EventLoop;
}

/// Emit `error`. With no listener attached the error is fatal to the loop.
pub(crate) fn emit_error<S: Lifecycled>(stream: &S, err: &StreamError) {
    if !stream.emitter().emit(Event::Error, &Payload::Error(err)) {
        stream.event_loop().report_unhandled(err.clone());
    }
}

fn emit_error_once<S: Lifecycled>(stream: &S, err: &StreamError) {
    let first = stream.lifecycle(|l| {
        let first = !l.flags.contains(Lifecycle::ERROR_EMITTED);
        l.flags.insert(Lifecycle::ERROR_EMITTED);
        first
    });
    if first {
        emit_error(stream, err);
    }
}

/// Queue `error` (if any) followed by `close`, each at most once.
pub(crate) fn schedule_error_and_close<S: Lifecycled>(stream: Rc<S>, err: Option<StreamError>) {
    let event_loop = stream.event_loop().clone();
    event_loop.next_tick(move || {
        if let Some(err) = err {
            emit_error_once(&*stream, &err);
        }
        let close = stream.lifecycle(|l| {
            let close = l.flags.contains(Lifecycle::EMIT_CLOSE)
                && !l.flags.contains(Lifecycle::CLOSE_EMITTED);
            if close {
                l.flags.insert(Lifecycle::CLOSE_EMITTED);
            }
            close
        });
        if close {
            stream.emitter().emit(Event::Close, &Payload::Empty);
        }
    });
}

/// Queue `error` without destroying (auto-destroy disabled).
pub(crate) fn schedule_error<S: Lifecycled>(stream: Rc<S>, err: StreamError) {
    let event_loop = stream.event_loop().clone();
    event_loop.next_tick(move || emit_error_once(&*stream, &err));
}
