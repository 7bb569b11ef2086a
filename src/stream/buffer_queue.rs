//! Ordered queue of pending chunks with an incrementally maintained length.
//!
//! Both stream sides use this to compare their backlog against the
//! high-water mark. The cached length always equals the sum of the queued
//! items' units, so `push`/`shift` stay O(1).

use crate::chunk::Chunk;
use bytes::BytesMut;
use std::collections::VecDeque;

/// Anything that can be counted toward a high-water mark.
pub trait Measured {
    fn units(&self, object_mode: bool) -> usize;
}

impl Measured for Chunk {
    fn units(&self, object_mode: bool) -> usize {
        Chunk::units(self, object_mode)
    }
}

#[derive(Debug)]
pub struct BufferQueue<T> {
    items: VecDeque<T>,
    length: usize,
    object_mode: bool,
}

impl<T: Measured> BufferQueue<T> {
    pub fn new(object_mode: bool) -> Self {
        Self {
            items: VecDeque::new(),
            length: 0,
            object_mode,
        }
    }

    pub fn push(&mut self, item: T) {
        self.length += item.units(self.object_mode);
        self.items.push_back(item);
    }

    /// Put an item back at the head of the queue.
    pub fn unshift(&mut self, item: T) {
        self.length += item.units(self.object_mode);
        self.items.push_front(item);
    }

    pub fn shift(&mut self) -> Option<T> {
        let item = self.items.pop_front()?;
        self.length -= item.units(self.object_mode);
        Some(item)
    }

    pub fn peek(&self) -> Option<&T> {
        self.items.front()
    }

    /// Total units queued.
    pub fn length(&self) -> usize {
        self.length
    }

    /// Number of queued items.
    pub fn count(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn is_object_mode(&self) -> bool {
        self.object_mode
    }

    /// Remove and return every queued item in order.
    pub fn drain_all(&mut self) -> Vec<T> {
        self.length = 0;
        self.items.drain(..).collect()
    }

    /// Drop every queued item.
    pub fn clear(&mut self) {
        self.items.clear();
        self.length = 0;
    }

    pub fn iter(&self) -> impl Iterator<Item = &T> {
        self.items.iter()
    }
}

impl BufferQueue<Chunk> {
    /// Take `n` units from the head.
    ///
    /// Object mode always yields one item. Byte mode yields exactly `n`
    /// bytes, splitting the head chunk without copying when it suffices and
    /// concatenating across chunks otherwise. Asking for at least everything
    /// buffered drains the queue. Callers pass `n <= length()`.
    pub fn take(&mut self, n: usize) -> Option<Chunk> {
        if self.items.is_empty() {
            return None;
        }
        if self.object_mode {
            return self.shift();
        }
        if n >= self.length {
            if self.items.len() == 1 {
                return self.shift();
            }
            return Some(Chunk::Bytes(self.concat(self.length)));
        }

        let head_len = self.items.front().map(|c| c.byte_len()).unwrap_or(0);
        if n == head_len {
            return self.shift();
        }
        if n < head_len {
            if let Some(Chunk::Bytes(head)) = self.items.front_mut() {
                let out = head.split_to(n);
                self.length -= n;
                return Some(Chunk::Bytes(out));
            }
        }
        Some(Chunk::Bytes(self.concat(n)))
    }

    fn concat(&mut self, n: usize) -> bytes::Bytes {
        let mut out = BytesMut::with_capacity(n);
        while out.len() < n {
            let remaining = n - out.len();
            let Some(front) = self.items.front_mut() else {
                break;
            };
            match front {
                Chunk::Bytes(b) if b.len() <= remaining => {
                    out.extend_from_slice(b);
                    self.shift();
                }
                Chunk::Bytes(b) => {
                    out.extend_from_slice(&b.split_to(remaining));
                    self.length -= remaining;
                }
                // Object chunks never share a byte-mode queue
                Chunk::Object(_) => {
                    self.shift();
                }
            }
        }
        out.freeze()
    }
}
