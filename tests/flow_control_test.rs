mod common;

#[cfg(test)]
mod tests {
    use crate::common::{init_tracing, log, ParkedSink};
    use std::cell::Cell;
    use std::rc::Rc;
    use std::time::Duration;
    use streamflow::{
        Chunk, ErrorCode, EventLoop, Readable, ReadableOptions, StreamError, Writable,
        WritableOptions,
    };
    use tokio::task::LocalSet;

    fn objects(items: &[&str]) -> Vec<Chunk> {
        items.iter().map(|s| Chunk::object(*s)).collect()
    }

    #[test]
    fn test_object_hwm_three_pull_mode() -> anyhow::Result<()> {
        init_tracing();
        let event_loop = EventLoop::new();
        let stream = Readable::new(
            &event_loop,
            ReadableOptions::object_mode().with_high_water_mark(3),
        );
        let ends = Rc::new(Cell::new(0));
        let e = ends.clone();
        stream.on_end(move || e.set(e.get() + 1));

        assert!(stream.push(Chunk::object("a")));
        assert!(stream.push(Chunk::object("b")));
        assert!(!stream.push(Chunk::object("c")));
        assert!(!stream.push(Chunk::object("d")));

        let mut got = Vec::new();
        while let Some(chunk) = stream.read(None) {
            got.push(chunk);
        }
        assert_eq!(got, objects(&["a", "b", "c", "d"]));

        stream.push_eof();
        assert_eq!(stream.read(None), None);
        event_loop.run_until_idle()?;
        assert_eq!(ends.get(), 1);
        Ok(())
    }

    #[test]
    fn test_object_hwm_three_flowing_mode() -> anyhow::Result<()> {
        init_tracing();
        let event_loop = EventLoop::new();
        let stream = Readable::new(
            &event_loop,
            ReadableOptions::object_mode().with_high_water_mark(3),
        );
        let seen = log();
        let s = seen.clone();
        stream.on_data(move |chunk| s.borrow_mut().push(chunk.clone()));
        let ends = Rc::new(Cell::new(0));
        let e = ends.clone();
        stream.on_end(move || e.set(e.get() + 1));

        let returns: Vec<bool> = ["a", "b", "c", "d"]
            .iter()
            .map(|s| stream.push(Chunk::object(*s)))
            .collect();
        assert_eq!(returns, vec![true, true, false, false]);
        stream.push_eof();
        event_loop.run_until_idle()?;

        assert_eq!(*seen.borrow(), objects(&["a", "b", "c", "d"]));
        assert_eq!(ends.get(), 1);
        Ok(())
    }

    #[tokio::test]
    async fn test_hwm_one_drain_with_delayed_sink() -> anyhow::Result<()> {
        init_tracing();
        let local = LocalSet::new();
        local
            .run_until(async {
                let event_loop = EventLoop::new();
                let io = event_loop.clone();
                let stream = Writable::from_fn(
                    &event_loop,
                    WritableOptions::default().with_high_water_mark(1),
                    move |_chunk, done| {
                        io.spawn_io(tokio::time::sleep(Duration::from_millis(2)), move |_| {
                            done.ok()
                        });
                    },
                );

                let drains = Rc::new(Cell::new(0));
                let d = drains.clone();
                stream.on_drain(move || d.set(d.get() + 1));

                // (chunk, writable length, drains so far) at each callback
                let observed = log();
                let (o, s, d) = (observed.clone(), stream.clone(), drains.clone());
                assert!(stream.write_with("x", move |res| {
                    assert!(res.is_ok());
                    o.borrow_mut().push(("x", s.writable_length(), d.get()));
                }));
                let (o, s, d) = (observed.clone(), stream.clone(), drains.clone());
                assert!(!stream.write_with("y", move |res| {
                    assert!(res.is_ok());
                    o.borrow_mut().push(("y", s.writable_length(), d.get()));
                }));

                event_loop.run().await?;
                assert_eq!(*observed.borrow(), vec![("x", 1, 0), ("y", 0, 1)]);
                assert_eq!(drains.get(), 1);
                Ok(())
            })
            .await
    }

    #[test]
    fn test_end_twice_finishes_once() -> anyhow::Result<()> {
        init_tracing();
        let event_loop = EventLoop::new();
        let stream = Writable::from_fn(&event_loop, WritableOptions::default(), |_, done| {
            done.ok()
        });
        let finishes = Rc::new(Cell::new(0));
        let f = finishes.clone();
        stream.on_finish(move || f.set(f.get() + 1));

        stream.write("payload");
        stream.end();
        stream.end();
        event_loop.run_until_idle()?;
        stream.end();
        event_loop.run_until_idle()?;
        assert_eq!(finishes.get(), 1);
        Ok(())
    }

    #[test]
    fn test_end_with_final_chunk_and_callback() -> anyhow::Result<()> {
        init_tracing();
        let event_loop = EventLoop::new();
        let sink = ParkedSink::new(&event_loop, WritableOptions::default());
        let result = log();
        let r = result.clone();

        sink.stream.write("head ");
        sink.stream.end_with("tail");
        sink.stream.end_then(move |res| r.borrow_mut().push(res.is_ok()));
        assert!(!sink.stream.is_writable());

        while sink.release_one() {
            event_loop.run_until_idle()?;
        }
        event_loop.run_until_idle()?;
        assert_eq!(
            *sink.written.borrow(),
            vec![Chunk::from("head "), Chunk::from("tail")]
        );
        assert_eq!(*result.borrow(), vec![true]);
        assert!(sink.stream.writable_finished());
        Ok(())
    }

    #[test]
    fn test_write_after_destroy() -> anyhow::Result<()> {
        init_tracing();
        let event_loop = EventLoop::new();
        let stream = Writable::from_fn(&event_loop, WritableOptions::default(), |_, done| {
            done.ok()
        });
        stream.destroy(None);

        let code = log();
        let c = code.clone();
        assert!(!stream.write_with("x", move |res| {
            c.borrow_mut().push(res.unwrap_err().code())
        }));
        event_loop.run_until_idle()?;
        assert_eq!(*code.borrow(), vec![ErrorCode::Destroyed]);
        Ok(())
    }

    #[test]
    fn test_destroy_with_error_reports_unhandled() {
        init_tracing();
        let event_loop = EventLoop::new();
        let stream = Readable::new(&event_loop, ReadableOptions::default());
        stream.destroy(Some(StreamError::custom("boom")));
        let err = event_loop.run_until_idle().unwrap_err();
        assert_eq!(err.code(), ErrorCode::Unhandled);
        assert_eq!(err.root().to_string(), "boom");
    }

    #[test]
    fn test_auto_destroy_disabled_keeps_stream_open() -> anyhow::Result<()> {
        init_tracing();
        let event_loop = EventLoop::new();
        let stream = Readable::new(
            &event_loop,
            ReadableOptions {
                auto_destroy: false,
                ..ReadableOptions::object_mode()
            },
        );
        let closes = Rc::new(Cell::new(0));
        let c = closes.clone();
        stream.on_close(move || c.set(c.get() + 1));
        stream.on_data(|_| {});
        stream.push(Chunk::object(1));
        stream.push_eof();
        event_loop.run_until_idle()?;

        assert!(stream.readable_ended());
        assert!(!stream.destroyed());
        assert_eq!(closes.get(), 0);

        stream.destroy(None);
        event_loop.run_until_idle()?;
        assert_eq!(closes.get(), 1);
        Ok(())
    }
}
