//! stdio transport for gRPC communication with plugins
//!
//! This module lets tonic speak HTTP/2 over a pair of pipes instead of a TCP
//! socket. The host wraps a child's stdin/stdout, the plugin wraps its own
//! stdin/stdout, and both sides see one bidirectional [`PipeChannel`].
//!
//! The plugin side also needs something that looks like a listener for
//! tonic's server loop; [`PipeListener`] hands out its single channel once and
//! then parks until it is closed.
use futures::Stream;
use futures::task::AtomicWaker;
use std::fmt;
use std::io;
use std::pin::Pin;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::task::{Context, Poll};
use tokio::io::{AsyncRead, AsyncWrite, ReadBuf};
use tokio::sync::{Notify, watch};
use tonic::transport::server::Connected;

/// Placeholder address for a channel that has no network endpoint
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PipeAddr;

impl PipeAddr {
    pub fn network(&self) -> &'static str {
        "pipe"
    }
}

impl fmt::Display for PipeAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("pipe")
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Both ends of a channel plus the wakers of whoever is parked on them
struct PipeEnds<R, W> {
    reader: Mutex<Option<R>>,
    writer: Mutex<Option<W>>,
    read_waker: AtomicWaker,
    write_waker: AtomicWaker,
    closed: watch::Sender<bool>,
}

impl<R, W> PipeEnds<R, W> {
    fn mark_closed(&self) {
        self.closed.send_replace(true);
    }
}

/// Type-erased control surface over [`PipeEnds`], so owners of a
/// [`PipeHandle`] do not carry the stream types around
trait PipeControl: Send + Sync {
    fn close_writer(&self) -> io::Result<()>;
    fn close_reader(&self) -> io::Result<()>;
    fn subscribe(&self) -> watch::Receiver<bool>;
}

impl<R: Send, W: Send> PipeControl for PipeEnds<R, W> {
    fn close_writer(&self) -> io::Result<()> {
        let writer = lock(&self.writer).take();
        self.write_waker.wake();
        match writer {
            // Dropping the stream closes the descriptor
            Some(writer) => {
                drop(writer);
                self.mark_closed();
                Ok(())
            }
            None => Err(io::Error::new(
                io::ErrorKind::NotConnected,
                "pipe write end already closed",
            )),
        }
    }

    fn close_reader(&self) -> io::Result<()> {
        let reader = lock(&self.reader).take();
        self.read_waker.wake();
        match reader {
            Some(reader) => {
                drop(reader);
                self.mark_closed();
                Ok(())
            }
            None => Err(io::Error::new(
                io::ErrorKind::NotConnected,
                "pipe read end already closed",
            )),
        }
    }

    fn subscribe(&self) -> watch::Receiver<bool> {
        self.closed.subscribe()
    }
}

/// A bidirectional channel over a read stream and a write stream
///
/// Reads come from `R` (a child's stdout, or our own stdin), writes go to `W`
/// (a child's stdin, or our own stdout). No framing is added; HTTP/2 frames the
/// byte stream itself.
pub struct PipeChannel<R, W> {
    ends: Arc<PipeEnds<R, W>>,
}

impl<R, W> PipeChannel<R, W>
where
    R: AsyncRead + Unpin + Send + 'static,
    W: AsyncWrite + Unpin + Send + 'static,
{
    /// Create a new channel reading from `reader` and writing to `writer`
    pub fn new(reader: R, writer: W) -> Self {
        let (closed, _) = watch::channel(false);
        Self {
            ends: Arc::new(PipeEnds {
                reader: Mutex::new(Some(reader)),
                writer: Mutex::new(Some(writer)),
                read_waker: AtomicWaker::new(),
                write_waker: AtomicWaker::new(),
                closed,
            }),
        }
    }

    /// A handle that can close this channel's ends from outside the transport
    pub fn handle(&self) -> PipeHandle {
        PipeHandle {
            ends: self.ends.clone(),
        }
    }
}

impl<R, W> PipeChannel<R, W> {
    pub fn local_addr(&self) -> PipeAddr {
        PipeAddr
    }

    pub fn peer_addr(&self) -> PipeAddr {
        PipeAddr
    }
}

impl<R, W> fmt::Debug for PipeChannel<R, W> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PipeChannel")
            .field("closed", &*self.ends.closed.borrow())
            .finish()
    }
}

impl<R: AsyncRead + Unpin, W> AsyncRead for PipeChannel<R, W> {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        let ends = &self.ends;
        ends.read_waker.register(cx.waker());

        let mut reader = lock(&ends.reader);
        let Some(reader) = reader.as_mut() else {
            // Closed locally: report EOF
            return Poll::Ready(Ok(()));
        };

        let before = buf.filled().len();
        let poll = Pin::new(reader).poll_read(cx, buf);
        if matches!(poll, Poll::Ready(Ok(()))) && buf.filled().len() == before && buf.remaining() > 0
        {
            ends.mark_closed();
        }
        poll
    }
}

impl<R, W: AsyncWrite + Unpin> AsyncWrite for PipeChannel<R, W> {
    fn poll_write(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<Result<usize, io::Error>> {
        let ends = &self.ends;
        ends.write_waker.register(cx.waker());

        match lock(&ends.writer).as_mut() {
            Some(writer) => Pin::new(writer).poll_write(cx, buf),
            None => Poll::Ready(Err(broken_pipe())),
        }
    }

    fn poll_flush(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Result<(), io::Error>> {
        let ends = &self.ends;
        ends.write_waker.register(cx.waker());

        match lock(&ends.writer).as_mut() {
            Some(writer) => Pin::new(writer).poll_flush(cx),
            None => Poll::Ready(Err(broken_pipe())),
        }
    }

    fn poll_shutdown(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Result<(), io::Error>> {
        match lock(&self.ends.writer).as_mut() {
            Some(writer) => Pin::new(writer).poll_shutdown(cx),
            None => Poll::Ready(Ok(())),
        }
    }
}

fn broken_pipe() -> io::Error {
    io::Error::new(io::ErrorKind::BrokenPipe, "pipe write end closed")
}

impl<R, W> Connected for PipeChannel<R, W> {
    type ConnectInfo = PipeAddr;

    fn connect_info(&self) -> Self::ConnectInfo {
        PipeAddr
    }
}

/// Out-of-band control over a [`PipeChannel`] that has been handed to tonic
#[derive(Clone)]
pub struct PipeHandle {
    ends: Arc<dyn PipeControl>,
}

impl PipeHandle {
    /// Close the write end (the child's stdin on the host side)
    pub fn close_writer(&self) -> io::Result<()> {
        self.ends.close_writer()
    }

    /// Close the read end (the child's stdout on the host side)
    pub fn close_reader(&self) -> io::Result<()> {
        self.ends.close_reader()
    }

    /// Whether either end was closed locally or the peer hung up
    pub fn is_closed(&self) -> bool {
        *self.ends.subscribe().borrow()
    }

    /// Resolves once either end is closed or the read side reaches EOF
    pub async fn closed(&self) {
        let mut closed = self.ends.subscribe();
        // The sender lives as long as the ends, which we hold
        let _ = closed.wait_for(|closed| *closed).await;
    }
}

impl fmt::Debug for PipeHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PipeHandle")
            .field("closed", &self.is_closed())
            .finish()
    }
}

struct ListenerState<C> {
    conn: Option<C>,
    sent: bool,
    closed: bool,
}

/// A listener that accepts exactly one, already established, connection
///
/// tonic's server keeps polling for new connections after the first one. The
/// second `accept` therefore parks until [`PipeListener::close`] is called
/// and then fails, which lets shutdown wake it instead of leaving it stuck.
pub struct PipeListener<C> {
    state: Mutex<ListenerState<C>>,
    wake: Notify,
}

impl<C> PipeListener<C> {
    pub fn new(conn: C) -> Self {
        Self {
            state: Mutex::new(ListenerState {
                conn: Some(conn),
                sent: false,
                closed: false,
            }),
            wake: Notify::new(),
        }
    }

    /// Yield the connection on the first call, then wait for the listener to close
    pub async fn accept(&self) -> io::Result<C> {
        loop {
            // Register before checking state so a concurrent close is not missed
            let woken = self.wake.notified();
            {
                let mut state = lock(&self.state);
                if state.closed {
                    return Err(io::Error::new(
                        io::ErrorKind::NotConnected,
                        "pipe listener closed",
                    ));
                }
                if !state.sent {
                    state.sent = true;
                    if let Some(conn) = state.conn.take() {
                        return Ok(conn);
                    }
                }
            }
            woken.await;
        }
    }

    /// Close the listener; idempotent
    pub fn close(&self) {
        {
            let mut state = lock(&self.state);
            if state.closed {
                return;
            }
            state.closed = true;
            // An unaccepted connection is released with the listener
            state.conn = None;
        }
        self.wake.notify_waiters();
    }

    pub fn is_closed(&self) -> bool {
        lock(&self.state).closed
    }

    pub fn local_addr(&self) -> PipeAddr {
        PipeAddr
    }
}

impl<C: Send + 'static> PipeListener<C> {
    /// The stream of accepted connections tonic's server consumes
    ///
    /// Yields the single connection, then ends once the listener is closed.
    pub fn incoming(self: Arc<Self>) -> impl Stream<Item = io::Result<C>> + Send + 'static {
        futures::stream::unfold(self, |listener| async move {
            match listener.accept().await {
                Ok(conn) => Some((Ok(conn), listener)),
                Err(_) => None,
            }
        })
    }
}
