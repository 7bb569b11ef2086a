//! Stream flow control.
//!
//! A [`Readable`] buffers what its [`Source`] produces, a [`Writable`]
//! feeds its [`Sink`] one write at a time, [`Duplex`] couples one of each,
//! and `Readable::pipe` connects them with backpressure.
//!
//! # Data flow
//!
//! ```text
//! +----------+ push  +----------+ data  +----------+ write +----------+
//! |  Source  | ----> | Readable | ----> |   pipe   | ----> | Writable | --> Sink
//! +----------+       +----------+       +----------+       +----------+
//!                         ^                                     |
//!                         +------- pause / drain -> resume -----+
//! ```

pub mod buffer_queue;
pub(crate) mod destroy;
pub mod duplex;
pub mod pipe;
pub mod readable;
pub mod writable;

pub use buffer_queue::{BufferQueue, Measured};
pub use destroy::{Lifecycle, LifecycleState};
pub use duplex::Duplex;
pub use readable::{Flowing, IterSource, Readable, ReadableState, Source, WeakReadable};
pub use writable::{FinalDone, FnSink, Sink, Writable, WritableState, WriteCallback, WriteDone};
