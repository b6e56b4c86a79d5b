//! Response body tee
//!
//! [`RecordingStream`] forwards every chunk to the consumer unchanged while
//! keeping a copy. When the body is complete (end of stream, or the declared
//! length has been delivered) the copy is handed over through a oneshot
//! channel. A body that errors or is dropped early is never handed over: the
//! receiver sees the sender go away and treats the capture as abandoned.

use std::pin::Pin;
use std::task::{Context, Poll};

use bytes::{Bytes, BytesMut};
use futures::stream::{BoxStream, Stream, StreamExt};
use tokio::sync::oneshot;

pub struct RecordingStream<E> {
    inner: BoxStream<'static, Result<Bytes, E>>,
    buffer: BytesMut,
    expected_len: Option<u64>,
    complete: Option<oneshot::Sender<Bytes>>,
}

impl<E> RecordingStream<E> {
    /// Wrap `inner`; the receiver gets the full body once it has been read
    pub fn new(
        inner: BoxStream<'static, Result<Bytes, E>>,
        expected_len: Option<u64>,
    ) -> (Self, oneshot::Receiver<Bytes>) {
        let (tx, rx) = oneshot::channel();
        let capacity = expected_len
            .and_then(|len| usize::try_from(len).ok())
            .unwrap_or(0);
        let stream = Self {
            inner,
            buffer: BytesMut::with_capacity(capacity),
            expected_len,
            complete: Some(tx),
        };
        (stream, rx)
    }

    fn finish(&mut self) {
        if let Some(tx) = self.complete.take() {
            let _ = tx.send(self.buffer.split().freeze());
        }
    }
}

impl<E> Stream for RecordingStream<E> {
    type Item = Result<Bytes, E>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = &mut *self;
        match this.inner.poll_next_unpin(cx) {
            Poll::Pending => Poll::Pending,
            Poll::Ready(Some(Ok(chunk))) => {
                if this.complete.is_some() {
                    this.buffer.extend_from_slice(&chunk);
                    if this
                        .expected_len
                        .is_some_and(|len| this.buffer.len() as u64 >= len)
                    {
                        this.finish();
                    }
                }
                Poll::Ready(Some(Ok(chunk)))
            }
            Poll::Ready(Some(Err(e))) => {
                this.complete = None;
                Poll::Ready(Some(Err(e)))
            }
            Poll::Ready(None) => {
                this.finish();
                Poll::Ready(None)
            }
        }
    }
}
