#![allow(dead_code)]

use std::cell::RefCell;
use std::rc::Rc;
use streamflow::{Chunk, EventLoop, Writable, WritableOptions, WriteDone};
use tracing_subscriber::EnvFilter;

/// Route `tracing` output through the test harness. Set `RUST_LOG` to see it.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

pub type Log<T> = Rc<RefCell<Vec<T>>>;

pub fn log<T>() -> Log<T> {
    Rc::new(RefCell::new(Vec::new()))
}

/// Writable that records every chunk and parks its completion.
pub struct ParkedSink {
    pub stream: Writable,
    pub written: Log<Chunk>,
    pub parked: Log<WriteDone>,
}

impl ParkedSink {
    pub fn new(event_loop: &EventLoop, opts: WritableOptions) -> Self {
        let (written, parked) = (log(), log());
        let (w, p) = (written.clone(), parked.clone());
        let stream = Writable::from_fn(event_loop, opts, move |chunk, done| {
            w.borrow_mut().push(chunk);
            p.borrow_mut().push(done);
        });
        Self {
            stream,
            written,
            parked,
        }
    }

    /// Complete the oldest outstanding write. Returns false if none.
    pub fn release_one(&self) -> bool {
        let next = {
            let mut parked = self.parked.borrow_mut();
            if parked.is_empty() {
                None
            } else {
                Some(parked.remove(0))
            }
        };
        match next {
            Some(done) => {
                done.ok();
                true
            }
            None => false,
        }
    }

    pub fn in_flight(&self) -> usize {
        self.parked.borrow().len()
    }
}
