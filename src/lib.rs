//! Backpressure-aware readable, writable and duplex streams.
//!
//! Streams are single-threaded handles (`Rc`-shared) that schedule their
//! deferred work on an [`EventLoop`]. Producers push into a [`Readable`],
//! consumers write into a [`Writable`], and [`Readable::pipe`] connects the
//! two while honouring each side's high-water mark.
//!
//! ```no_run
//! use streamflow::{
//!     Chunk, EventLoop, PipeOptions, Readable, ReadableOptions, Writable, WritableOptions,
//! };
//!
//! let event_loop = EventLoop::new();
//! let items = (0..100).map(Chunk::object);
//! let src = Readable::from_iter(&event_loop, ReadableOptions::object_mode(), items);
//! let dst = Writable::from_fn(&event_loop, WritableOptions::object_mode(), |_chunk, done| {
//!     done.ok()
//! });
//! src.pipe(&dst, PipeOptions::default());
//! event_loop.run_until_idle().unwrap();
//! ```

pub mod chunk;
pub mod config;
pub mod error;
pub mod event_loop;
pub mod events;
pub mod io;
pub mod stream;

pub use chunk::Chunk;
pub use config::{DuplexOptions, PipeOptions, ReadableOptions, StreamConfig, WritableOptions};
pub use error::{ErrorCode, Result, StreamError};
pub use event_loop::EventLoop;
pub use events::{listener, Event, EventEmitter, Listener, ListenerId, Payload};
pub use stream::{
    BufferQueue, Duplex, FinalDone, Flowing, Readable, Sink, Source, Writable, WriteDone,
};
