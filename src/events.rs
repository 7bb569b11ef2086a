//! Listener registry used by both stream sides.
//!
//! Listeners are snapshotted when an event is emitted, so adding or removing
//! listeners from inside a listener only affects later emissions.

use crate::chunk::Chunk;
use crate::error::StreamError;
use crate::stream::Readable;
use std::cell::{Cell, RefCell};
use std::rc::Rc;

/// Events a stream can emit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Event {
    // Readable side
    Data,
    End,
    Readable,
    Pause,
    Resume,
    // Writable side
    Drain,
    Prefinish,
    Finish,
    Pipe,
    Unpipe,
    // Both
    Error,
    Close,
}

/// Argument passed to listeners.
pub enum Payload<'a> {
    Empty,
    Chunk(&'a Chunk),
    Error(&'a StreamError),
    /// The source involved in a `pipe`/`unpipe`
    Source(&'a Readable),
}

pub type Listener = Rc<dyn Fn(&Payload<'_>)>;

/// Box a closure as a [`Listener`].
pub fn listener<F>(f: F) -> Listener
where
    F: Fn(&Payload<'_>) + 'static,
{
    Rc::new(f)
}

/// Handle returned by registration, used to remove the listener.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

struct Entry {
    id: ListenerId,
    event: Event,
    once: bool,
    listener: Listener,
}

#[derive(Default)]
pub struct EventEmitter {
    entries: RefCell<Vec<Entry>>,
    /// Id counter, shared between the two halves of a duplex
    ids: RefCell<Rc<Cell<u64>>>,
}

impl EventEmitter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Issue ids from `other`'s counter. Only valid before any listener
    /// is registered on `self`.
    pub(crate) fn share_ids(&self, other: &EventEmitter) {
        let counter = other.ids.borrow().clone();
        *self.ids.borrow_mut() = counter;
    }

    fn next_id(&self) -> ListenerId {
        let ids = self.ids.borrow();
        let id = ids.get() + 1;
        ids.set(id);
        ListenerId(id)
    }

    fn insert(&self, event: Event, listener: Listener, once: bool, front: bool) -> ListenerId {
        let id = self.next_id();
        self.insert_as(id, event, listener, once, front);
        id
    }

    /// Register under an id issued by an emitter sharing this one's counter.
    pub(crate) fn insert_as(
        &self,
        id: ListenerId,
        event: Event,
        listener: Listener,
        once: bool,
        front: bool,
    ) {
        let entry = Entry {
            id,
            event,
            once,
            listener,
        };
        let mut entries = self.entries.borrow_mut();
        if front {
            entries.insert(0, entry);
        } else {
            entries.push(entry);
        }
    }

    pub fn on(&self, event: Event, listener: Listener) -> ListenerId {
        self.insert(event, listener, false, false)
    }

    pub fn once(&self, event: Event, listener: Listener) -> ListenerId {
        self.insert(event, listener, true, false)
    }

    /// Register ahead of every existing listener for `event`.
    pub fn prepend(&self, event: Event, listener: Listener) -> ListenerId {
        self.insert(event, listener, false, true)
    }

    /// Remove a listener. Returns the event it was registered for.
    pub fn off(&self, id: ListenerId) -> Option<Event> {
        let mut entries = self.entries.borrow_mut();
        let pos = entries.iter().position(|e| e.id == id)?;
        Some(entries.remove(pos).event)
    }

    pub fn remove_all(&self, event: Event) {
        self.entries.borrow_mut().retain(|e| e.event != event);
    }

    pub fn listener_count(&self, event: Event) -> usize {
        self.entries
            .borrow()
            .iter()
            .filter(|e| e.event == event)
            .count()
    }

    /// Call every listener registered for `event`. Returns false if there
    /// were none.
    pub fn emit(&self, event: Event, payload: &Payload<'_>) -> bool {
        let snapshot: Vec<Listener> = {
            let mut entries = self.entries.borrow_mut();
            let snapshot = entries
                .iter()
                .filter(|e| e.event == event)
                .map(|e| e.listener.clone())
                .collect();
            entries.retain(|e| !(e.once && e.event == event));
            snapshot
        };

        if snapshot.is_empty() {
            return false;
        }
        for listener in snapshot {
            listener(payload);
        }
        true
    }
}
