mod common;

#[cfg(test)]
mod tests {
    use crate::common::{init_tracing, log, Log};
    use bytes::BytesMut;
    use std::cell::Cell;
    use std::rc::Rc;
    use streamflow::io::{AsyncReadSource, AsyncWriteSink};
    use streamflow::{Duplex, DuplexOptions, ErrorCode, EventLoop};
    use tokio::io::{AsyncRead, AsyncWrite};
    use tokio::task::LocalSet;

    /// Byte-mode duplex over both directions of an in-memory socket.
    fn socket<S>(event_loop: &EventLoop, io: S, allow_half_open: bool) -> Duplex
    where
        S: AsyncRead + AsyncWrite + 'static,
    {
        let (reader, writer) = tokio::io::split(io);
        Duplex::new(
            event_loop,
            DuplexOptions::default().allow_half_open(allow_half_open),
            AsyncReadSource::new(event_loop, reader),
            AsyncWriteSink::new(event_loop, writer),
        )
    }

    fn collect(duplex: &Duplex) -> Log<u8> {
        let received = log();
        let r = received.clone();
        duplex.on_data(move |chunk| {
            if let Some(bytes) = chunk.as_bytes() {
                r.borrow_mut().extend_from_slice(bytes);
            }
        });
        received
    }

    fn counter() -> (Rc<Cell<usize>>, impl Fn() + 'static) {
        let count = Rc::new(Cell::new(0));
        let c = count.clone();
        (count, move || c.set(c.get() + 1))
    }

    #[tokio::test]
    async fn test_half_open_reply_after_peer_ends() -> anyhow::Result<()> {
        init_tracing();
        LocalSet::new()
            .run_until(async {
                let event_loop = EventLoop::new();
                let (client_io, server_io) = tokio::io::duplex(64);
                let client = socket(&event_loop, client_io, true);
                let server = socket(&event_loop, server_io, true);

                let client_got = collect(&client);
                let server_got = collect(&server);
                let (client_closes, on_close) = counter();
                client.on_close(on_close);

                // The server answers only once the request side has ended
                let (reply, got) = (server.clone(), server_got.clone());
                server.on_end(move || {
                    assert!(reply.writable().is_writable());
                    let mut answer = BytesMut::from(&b"re: "[..]);
                    answer.extend_from_slice(&got.borrow());
                    reply.write(answer.freeze());
                    reply.end();
                });

                client.write("ping");
                client.end();
                event_loop.run().await?;

                assert_eq!(server_got.borrow().as_slice(), b"ping");
                assert_eq!(client_got.borrow().as_slice(), b"re: ping");
                assert!(client.destroyed());
                assert!(server.destroyed());
                assert_eq!(client_closes.get(), 1);
                Ok(())
            })
            .await
    }

    #[tokio::test]
    async fn test_without_half_open_end_closes_both_directions() -> anyhow::Result<()> {
        init_tracing();
        LocalSet::new()
            .run_until(async {
                let event_loop = EventLoop::new();
                let (client_io, server_io) = tokio::io::duplex(64);
                let client = socket(&event_loop, client_io, true);
                let server = socket(&event_loop, server_io, false);

                let client_got = collect(&client);
                let _server_got = collect(&server);
                let (client_ends, on_end) = counter();
                client.on_end(on_end);
                let (server_finishes, on_finish) = counter();
                server.on_finish(on_finish);

                client.end();
                event_loop.run().await?;

                // The server never wrote, but its write side ended with its read side
                assert_eq!(server_finishes.get(), 1);
                assert_eq!(client_ends.get(), 1);
                assert!(client_got.borrow().is_empty());
                assert!(server.destroyed());
                Ok(())
            })
            .await
    }

    #[tokio::test]
    async fn test_broken_pipe_destroys_both_halves() -> anyhow::Result<()> {
        init_tracing();
        LocalSet::new()
            .run_until(async {
                let event_loop = EventLoop::new();
                let (client_io, server_io) = tokio::io::duplex(64);
                drop(server_io);
                let client = socket(&event_loop, client_io, true);

                let errors = log();
                let e = errors.clone();
                client.on_error(move |err| e.borrow_mut().push(err.code()));
                let (closes, on_close) = counter();
                client.on_close(on_close);

                client.write("lost");
                event_loop.run().await?;

                assert_eq!(*errors.borrow(), vec![ErrorCode::Io]);
                assert_eq!(closes.get(), 1);
                assert!(client.readable().destroyed());
                assert!(client.writable().destroyed());
                Ok(())
            })
            .await
    }
}
