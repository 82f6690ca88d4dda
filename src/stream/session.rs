//! Per-connection client sessions

use std::io;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::{Duration, Instant};

use bytes::Bytes;
use parking_lot::Mutex;
use tokio::sync::{mpsc, oneshot};
use uuid::Uuid;

use crate::error::ServerError;

/// Output side of a client connection. Every call must return without
/// waiting on the network.
pub trait Transport: Send + Sync {
    /// Send the stream-open response head
    fn open_stream(&self) -> io::Result<()>;

    /// Queue one chunk of the multipart body
    fn write(&self, chunk: Bytes) -> io::Result<()>;

    /// Close the connection; errors are not interesting at this point
    fn close(&self);

    fn remote_addr(&self) -> Option<SocketAddr>;
}

/// Transport feeding an HTTP response body through a bounded channel.
///
/// A full channel means the client has fallen a whole backlog behind and is
/// reported as a write failure.
pub struct ChannelTransport {
    opened: Mutex<Option<oneshot::Sender<()>>>,
    chunks: Mutex<Option<mpsc::Sender<Bytes>>>,
    peer: Option<SocketAddr>,
}

/// Receiving half of a [`ChannelTransport`], owned by the HTTP handler
pub struct ClientStream {
    /// Fires when the response head may be sent
    pub opened: oneshot::Receiver<()>,
    /// Body chunks in send order
    pub chunks: mpsc::Receiver<Bytes>,
}

impl ChannelTransport {
    /// Create a transport that buffers at most `backlog` chunks
    pub fn new(peer: Option<SocketAddr>, backlog: usize) -> (Self, ClientStream) {
        let (opened_tx, opened_rx) = oneshot::channel();
        let (chunks_tx, chunks_rx) = mpsc::channel(backlog.max(1));
        let transport = Self {
            opened: Mutex::new(Some(opened_tx)),
            chunks: Mutex::new(Some(chunks_tx)),
            peer,
        };
        let stream = ClientStream {
            opened: opened_rx,
            chunks: chunks_rx,
        };
        (transport, stream)
    }
}

impl Transport for ChannelTransport {
    fn open_stream(&self) -> io::Result<()> {
        let Some(opened) = self.opened.lock().take() else {
            return Ok(());
        };
        opened
            .send(())
            .map_err(|_| io::Error::new(io::ErrorKind::BrokenPipe, "client went away before the stream opened"))
    }

    fn write(&self, chunk: Bytes) -> io::Result<()> {
        let guard = self.chunks.lock();
        let Some(chunks) = guard.as_ref() else {
            return Err(io::Error::new(io::ErrorKind::NotConnected, "transport closed"));
        };
        chunks.try_send(chunk).map_err(|e| match e {
            mpsc::error::TrySendError::Full(_) => {
                io::Error::new(io::ErrorKind::TimedOut, "client backlog full")
            }
            mpsc::error::TrySendError::Closed(_) => {
                io::Error::new(io::ErrorKind::BrokenPipe, "client disconnected")
            }
        })
    }

    fn close(&self) {
        self.opened.lock().take();
        self.chunks.lock().take();
    }

    fn remote_addr(&self) -> Option<SocketAddr> {
        self.peer
    }
}

/// One connected `/stream` viewer
pub struct ClientSession {
    id: Uuid,
    transport: Box<dyn Transport>,
    remote_addr: Option<SocketAddr>,
    header_sent: AtomicBool,
    frames_sent: AtomicU64,
    bytes_sent: AtomicU64,
    connected_at: Instant,
}

impl ClientSession {
    pub fn new(transport: Box<dyn Transport>) -> Self {
        let remote_addr = transport.remote_addr();
        Self {
            id: Uuid::new_v4(),
            transport,
            remote_addr,
            header_sent: AtomicBool::new(false),
            frames_sent: AtomicU64::new(0),
            bytes_sent: AtomicU64::new(0),
            connected_at: Instant::now(),
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn remote_addr(&self) -> Option<SocketAddr> {
        self.remote_addr
    }

    pub fn header_sent(&self) -> bool {
        self.header_sent.load(Ordering::Acquire)
    }

    pub fn frames_sent(&self) -> u64 {
        self.frames_sent.load(Ordering::Relaxed)
    }

    pub fn bytes_sent(&self) -> u64 {
        self.bytes_sent.load(Ordering::Relaxed)
    }

    pub fn connected_for(&self) -> Duration {
        self.connected_at.elapsed()
    }

    /// Send one complete multipart part, opening the stream on first use
    pub fn send_part(&self, part: Bytes) -> Result<(), ServerError> {
        if !self.header_sent() {
            self.transport
                .open_stream()
                .map_err(|e| ServerError::ClientWriteFailed(e.to_string()))?;
            self.header_sent.store(true, Ordering::Release);
        }

        let len = part.len() as u64;
        self.transport
            .write(part)
            .map_err(|e| ServerError::ClientWriteFailed(e.to_string()))?;

        self.frames_sent.fetch_add(1, Ordering::Relaxed);
        self.bytes_sent.fetch_add(len, Ordering::Relaxed);
        Ok(())
    }

    /// Close the underlying transport
    pub fn close(&self) {
        self.transport.close();
    }
}

impl std::fmt::Debug for ClientSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClientSession")
            .field("id", &self.id)
            .field("remote_addr", &self.remote_addr)
            .field("header_sent", &self.header_sent())
            .field("frames_sent", &self.frames_sent())
            .finish()
    }
}
