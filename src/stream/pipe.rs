//! Pipe controller: moves data from a readable into one or more writables.
//!
//! Each destination gets its own [`PipeLink`] holding the listener ids that
//! wire it up. A `false` from `write` pauses the source and records the link
//! in the await-drain set; the source resumes once every destination in the
//! set has emitted `drain`.

use crate::config::PipeOptions;
use crate::events::{listener, Event, Listener, ListenerId, Payload};
use crate::stream::readable::{Flowing, Readable};
use crate::stream::writable::Writable;
use std::cell::{Cell, RefCell};
use std::collections::HashSet;
use std::rc::{Rc, Weak};

/// Destinations of one readable.
#[derive(Default)]
pub(crate) struct PipeRegistry {
    next_id: u64,
    pipes: Vec<Rc<PipeLink>>,
    /// Links whose destination returned false and has not drained yet
    await_drain: HashSet<u64>,
}

impl PipeRegistry {
    fn position(&self, dest: &Writable) -> Option<usize> {
        self.pipes.iter().position(|link| link.dest.ptr_eq(dest))
    }
}

pub(crate) struct PipeLink {
    id: u64,
    dest: Writable,
    cleaned_up: Cell<bool>,
    /// `data` and `end` listeners on the source
    source_listeners: RefCell<Vec<ListenerId>>,
    /// `error`, `close` and `finish` listeners on the destination
    dest_listeners: RefCell<Vec<ListenerId>>,
    drain_listener: Cell<Option<ListenerId>>,
}

impl PipeLink {
    fn new(id: u64, dest: Writable) -> Self {
        Self {
            id,
            dest,
            cleaned_up: Cell::new(false),
            source_listeners: RefCell::new(Vec::new()),
            dest_listeners: RefCell::new(Vec::new()),
            drain_listener: Cell::new(None),
        }
    }

    fn detach_dest(&self) {
        for id in self.dest_listeners.take() {
            self.dest.off(id);
        }
        if let Some(id) = self.drain_listener.take() {
            self.dest.off(id);
        }
    }
}

impl Readable {
    /// Send everything this stream produces to `dest`, honouring its
    /// backpressure. Returns `dest` for chaining.
    pub fn pipe(&self, dest: &Writable, opts: PipeOptions) -> Writable {
        let link = {
            let mut registry = self.shared.pipes.borrow_mut();
            registry.next_id += 1;
            let link = Rc::new(PipeLink::new(registry.next_id, dest.clone()));
            registry.pipes.push(link.clone());
            link
        };
        tracing::debug!(pipe = link.id, end = opts.end, "pipe");

        // Source end
        let on_source_end: Rc<dyn Fn()> = {
            let (src, dest) = (self.downgrade(), dest.clone());
            if opts.end {
                Rc::new(move || dest.end())
            } else {
                Rc::new(move || {
                    if let Some(src) = src.upgrade() {
                        src.unpipe(Some(&dest));
                    }
                })
            }
        };
        if self.readable_ended() {
            // An unpipe before this tick wins over the late end
            let link = link.clone();
            self.event_loop().next_tick(move || {
                if !link.cleaned_up.get() {
                    on_source_end();
                }
            });
        } else {
            let id = self.once(Event::End, listener(move |_| on_source_end()));
            link.source_listeners.borrow_mut().push(id);
        }

        // Data
        let data_id = {
            let (src, link) = (self.downgrade(), link.clone());
            self.on(
                Event::Data,
                listener(move |payload| {
                    let Payload::Chunk(chunk) = payload else {
                        return;
                    };
                    // Emission snapshots listeners, so an unpipe earlier in
                    // this same emit does not remove us in time
                    if link.cleaned_up.get() {
                        return;
                    }
                    if !link.dest.write((*chunk).clone()) {
                        if let Some(src) = src.upgrade() {
                            src.pipe_backpressure(&link);
                        }
                    }
                }),
            )
        };
        link.source_listeners.borrow_mut().push(data_id);

        // Destination failure or completion
        let weak_link = Rc::downgrade(&link);
        let error_id = {
            let (src, link) = (self.downgrade(), weak_link.clone());
            dest.prepend(
                Event::Error,
                listener(move |payload| {
                    let (Payload::Error(err), Some(link)) = (payload, link.upgrade()) else {
                        return;
                    };
                    match src.upgrade() {
                        Some(src) => src.unpipe_inner(Some(&link.dest), false),
                        None => link.detach_dest(),
                    }
                    if link.dest.listener_count(Event::Error) == 0 {
                        tracing::warn!(pipe = link.id, "pipe destination error with no listener");
                        link.dest.event_loop().report_unhandled((*err).clone());
                    }
                }),
            )
        };
        let close_id = dest.once(Event::Close, unpipe_listener(self, &weak_link));
        let finish_id = dest.once(Event::Finish, unpipe_listener(self, &weak_link));
        link.dest_listeners
            .borrow_mut()
            .extend([error_id, close_id, finish_id]);

        dest.shared.events.emit(Event::Pipe, &Payload::Source(self));

        if dest.writable_need_drain() {
            self.pipe_backpressure(&link);
        } else if self.readable_flowing() != Flowing::Flowing {
            self.resume();
        }
        dest.clone()
    }

    /// Detach `dest`, or every destination with `None`. Removing the last
    /// destination pauses the source.
    pub fn unpipe(&self, dest: Option<&Writable>) {
        self.unpipe_inner(dest, true);
    }

    pub fn pipe_count(&self) -> usize {
        self.shared.pipes.borrow().pipes.len()
    }

    fn unpipe_inner(&self, dest: Option<&Writable>, manual: bool) {
        let (removed, now_empty) = {
            let mut registry = self.shared.pipes.borrow_mut();
            if registry.pipes.is_empty() {
                return;
            }
            match dest {
                None => (registry.pipes.drain(..).collect::<Vec<_>>(), true),
                Some(dest) => {
                    let Some(idx) = registry.position(dest) else {
                        return;
                    };
                    let link = registry.pipes.remove(idx);
                    (vec![link], registry.pipes.is_empty())
                }
            }
        };
        if now_empty {
            self.pause();
        }
        for link in removed {
            tracing::debug!(pipe = link.id, manual, "unpipe");
            self.cleanup_pipe(&link, manual);
            link.dest
                .shared
                .events
                .emit(Event::Unpipe, &Payload::Source(self));
        }
    }

    fn cleanup_pipe(&self, link: &PipeLink, manual: bool) {
        link.cleaned_up.set(true);
        for id in link.source_listeners.take() {
            self.off(id);
        }
        link.detach_dest();

        // A failed destination never releases the others' backpressure
        let resume = {
            let mut registry = self.shared.pipes.borrow_mut();
            let was_blocking = registry.await_drain.remove(&link.id);
            manual && was_blocking && registry.await_drain.is_empty() && !registry.pipes.is_empty()
        };
        if resume && self.listener_count(Event::Data) > 0 {
            self.resume();
        }
    }

    fn pipe_backpressure(&self, link: &Rc<PipeLink>) {
        if !link.cleaned_up.get() {
            self.shared.pipes.borrow_mut().await_drain.insert(link.id);
            tracing::debug!(pipe = link.id, "destination full, pausing source");
            self.pause();
        }
        if link.drain_listener.get().is_none() {
            let (src, id) = (self.downgrade(), link.id);
            let drain_id = link.dest.on(
                Event::Drain,
                listener(move |_| {
                    if let Some(src) = src.upgrade() {
                        src.pipe_on_drain(id);
                    }
                }),
            );
            link.drain_listener.set(Some(drain_id));
        }
    }

    fn pipe_on_drain(&self, id: u64) {
        let all_drained = {
            let mut registry = self.shared.pipes.borrow_mut();
            registry.await_drain.remove(&id);
            registry.await_drain.is_empty()
        };
        if all_drained && self.listener_count(Event::Data) > 0 {
            tracing::debug!(pipe = id, "destinations drained, resuming source");
            self.resume();
        }
    }
}

fn unpipe_listener(src: &Readable, link: &Weak<PipeLink>) -> Listener {
    let (src, link) = (src.downgrade(), link.clone());
    listener(move |_| {
        if let (Some(src), Some(link)) = (src.upgrade(), link.upgrade()) {
            src.unpipe_inner(Some(&link.dest), false);
        }
    })
}
