//! Adapters from tokio byte I/O to stream sources and sinks.
//!
//! The reader or writer is moved into the I/O future for the duration of
//! each operation and handed back on completion. The streams never have more
//! than one read or write outstanding, so the slot is always full when the
//! next operation starts.
//!
//! All adapters run their futures through [`EventLoop::spawn_io`] and must be
//! driven from inside a `tokio::task::LocalSet`.

use crate::chunk::Chunk;
use crate::config::{ReadableOptions, WritableOptions};
use crate::error::{Result, StreamError};
use crate::event_loop::EventLoop;
use crate::stream::{FinalDone, Readable, Sink, Source, Writable, WriteDone};
use bytes::{Bytes, BytesMut};
use std::cell::{Cell, RefCell};
use std::rc::Rc;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

/// Bytes to send for a chunk. Objects are written as one JSON line each.
fn encode(chunk: Chunk) -> Result<Bytes> {
    match chunk {
        Chunk::Bytes(b) => Ok(b),
        Chunk::Object(value) => {
            let mut line = serde_json::to_vec(&value)
                .map_err(|e| StreamError::custom(format!("encode object chunk: {e}")))?;
            line.push(b'\n');
            Ok(Bytes::from(line))
        }
    }
}

/// Sink writing every chunk to an `AsyncWrite`.
pub struct AsyncWriteSink<W> {
    writer: Rc<RefCell<Option<W>>>,
    event_loop: EventLoop,
}

impl<W> AsyncWriteSink<W>
where
    W: AsyncWrite + Unpin + 'static,
{
    pub fn new(event_loop: &EventLoop, writer: W) -> Self {
        Self {
            writer: Rc::new(RefCell::new(Some(writer))),
            event_loop: event_loop.clone(),
        }
    }

    fn run<F, Fut>(&self, op: F, on_done: impl FnOnce(Result<()>) + 'static)
    where
        F: FnOnce(W) -> Fut,
        Fut: std::future::Future<Output = (W, std::io::Result<()>)> + 'static,
    {
        let Some(writer) = self.writer.borrow_mut().take() else {
            on_done(Err(StreamError::custom("writer is busy or closed")));
            return;
        };
        let slot = self.writer.clone();
        self.event_loop.spawn_io(op(writer), move |(writer, result)| {
            *slot.borrow_mut() = Some(writer);
            on_done(result.map_err(StreamError::from));
        });
    }
}

impl<W> Sink for AsyncWriteSink<W>
where
    W: AsyncWrite + Unpin + 'static,
{
    fn write(&mut self, chunk: Chunk, done: WriteDone) {
        let data = match encode(chunk) {
            Ok(data) => data,
            Err(err) => return done.fail(err),
        };
        self.run(
            |mut w| async move {
                let result = w.write_all(&data).await;
                (w, result)
            },
            move |result| done.complete(result),
        );
    }

    fn writev(&mut self, chunks: Vec<Chunk>, done: WriteDone) {
        let data = match chunks.into_iter().map(encode).collect::<Result<Vec<_>>>() {
            Ok(data) => data,
            Err(err) => return done.fail(err),
        };
        tracing::trace!(count = data.len(), "vectored write");
        self.run(
            |mut w| async move {
                for buf in &data {
                    if let Err(e) = w.write_all(buf).await {
                        return (w, Err(e));
                    }
                }
                (w, Ok(()))
            },
            move |result| done.complete(result),
        );
    }

    fn supports_writev(&self) -> bool {
        true
    }

    fn finalize(&mut self, done: FinalDone) {
        self.run(
            |mut w| async move {
                let result = match w.flush().await {
                    Ok(()) => w.shutdown().await,
                    Err(e) => Err(e),
                };
                (w, result)
            },
            move |result| done.complete(result),
        );
    }

    fn destroy(&mut self, _err: Option<&StreamError>) {
        self.writer.borrow_mut().take();
    }
}

/// Source reading from an `AsyncRead`, one read per request.
pub struct AsyncReadSource<R> {
    reader: Rc<RefCell<Option<R>>>,
    in_flight: Rc<Cell<bool>>,
    event_loop: EventLoop,
}

impl<R> AsyncReadSource<R>
where
    R: AsyncRead + Unpin + 'static,
{
    pub fn new(event_loop: &EventLoop, reader: R) -> Self {
        Self {
            reader: Rc::new(RefCell::new(Some(reader))),
            in_flight: Rc::new(Cell::new(false)),
            event_loop: event_loop.clone(),
        }
    }
}

impl<R> Source for AsyncReadSource<R>
where
    R: AsyncRead + Unpin + 'static,
{
    fn read(&mut self, size: usize, stream: &Readable) {
        if self.in_flight.get() {
            return;
        }
        let Some(mut reader) = self.reader.borrow_mut().take() else {
            return;
        };
        self.in_flight.set(true);

        let (slot, in_flight) = (self.reader.clone(), self.in_flight.clone());
        let stream = stream.downgrade();
        self.event_loop.spawn_io(
            async move {
                let mut buf = BytesMut::with_capacity(size.max(1));
                let result = reader.read_buf(&mut buf).await;
                (reader, buf, result)
            },
            move |(reader, buf, result)| {
                *slot.borrow_mut() = Some(reader);
                in_flight.set(false);
                let Some(stream) = stream.upgrade() else {
                    return;
                };
                match result {
                    Ok(0) => {
                        stream.push_eof();
                    }
                    Ok(n) => {
                        tracing::trace!(bytes = n, "read");
                        stream.push(buf.freeze());
                    }
                    Err(e) => stream.destroy(Some(e.into())),
                }
            },
        );
    }

    fn destroy(&mut self, _err: Option<&StreamError>) {
        self.reader.borrow_mut().take();
    }
}

/// A byte-mode (unless configured otherwise) readable over `reader`.
pub fn readable_from<R>(event_loop: &EventLoop, opts: ReadableOptions, reader: R) -> Readable
where
    R: AsyncRead + Unpin + 'static,
{
    Readable::with_source(event_loop, opts, AsyncReadSource::new(event_loop, reader))
}

/// A writable over `writer`.
pub fn writable_from<W>(event_loop: &EventLoop, opts: WritableOptions, writer: W) -> Writable
where
    W: AsyncWrite + Unpin + 'static,
{
    Writable::new(event_loop, opts, AsyncWriteSink::new(event_loop, writer))
}
