//! MJPEG stream server
//!
//! Owns the listening socket and two threads:
//!
//! - **http**: a single-threaded tokio runtime serving the axum router. It
//!   answers the viewer page and parks each `/stream` request as a
//!   [`ClientSession`] in the live set.
//! - **broadcast**: at the target frame rate, queues the latest frame on
//!   every live client and drops the ones that fail or fall a full backlog
//!   behind. Queueing never blocks, so one slow viewer cannot hold up the
//!   others.
//!
//! The two only share the [`ClientSet`]; frames come from the capture loop
//! through the [`LatestFrameSlot`](crate::capture::LatestFrameSlot).

use std::future::IntoFuture;
use std::net::{SocketAddr, TcpListener};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{sync_channel, SyncSender};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use axum::Router;
use parking_lot::Mutex;
use socket2::{Domain, Protocol, Socket, Type};
use tokio::sync::oneshot;

use crate::capture::SharedFrameSlot;
use crate::config::ServerConfig;
use crate::constants::*;
use crate::error::ServerError;
use crate::stream::clients::ClientSet;
use crate::stream::http::{self, StreamState};
use crate::stream::multipart;

/// Threads and address of a running server
#[derive(Default)]
struct Lifecycle {
    http_thread: Option<JoinHandle<()>>,
    broadcast_thread: Option<JoinHandle<()>>,
    shutdown: Option<oneshot::Sender<()>>,
    local_addr: Option<SocketAddr>,
}

/// Multi-client MJPEG server
pub struct MjpegServer {
    config: ServerConfig,
    frames: SharedFrameSlot,
    clients: Arc<ClientSet>,
    running: Arc<AtomicBool>,
    /// Serializes start/stop so either may be called from any thread
    lifecycle: Mutex<Lifecycle>,
}

impl MjpegServer {
    /// Create a stopped server broadcasting frames from `frames`
    pub fn new(config: ServerConfig, frames: SharedFrameSlot) -> Self {
        Self {
            config,
            frames,
            clients: Arc::new(ClientSet::new()),
            running: Arc::new(AtomicBool::new(false)),
            lifecycle: Mutex::new(Lifecycle::default()),
        }
    }

    /// Create the server and start it if `auto_start_on_init` is set
    pub fn init(config: ServerConfig, frames: SharedFrameSlot) -> Result<Self, ServerError> {
        let server = Self::new(config, frames);
        if server.config.auto_start_on_init {
            server.start()?;
        }
        Ok(server)
    }

    /// Bind the listener and launch the http and broadcast threads
    pub fn start(&self) -> Result<(), ServerError> {
        let mut lifecycle = self.lifecycle.lock();
        if self.running.load(Ordering::SeqCst) {
            return Ok(());
        }

        let addr = self.config.bind_addr();
        let listener = bind_listener(addr).map_err(|source| ServerError::BindFailed { addr, source })?;
        let local_addr = listener
            .local_addr()
            .map_err(|source| ServerError::BindFailed { addr, source })?;

        let app = http::router(Arc::new(StreamState {
            clients: Arc::clone(&self.clients),
            backlog: self.config.client_backlog(),
        }));
        let (shutdown_tx, shutdown_rx) = oneshot::channel();
        let (ready_tx, ready_rx) = sync_channel(1);

        let http_thread = thread::Builder::new()
            .name("mjpeg-http".to_string())
            .spawn(move || serve(listener, app, shutdown_rx, ready_tx))
            .map_err(|e| ServerError::ThreadSpawn(e.to_string()))?;

        let ready = ready_rx
            .recv()
            .unwrap_or_else(|_| Err(ServerError::Runtime("HTTP thread exited during startup".into())));
        if let Err(e) = ready {
            let _ = http_thread.join();
            return Err(e);
        }

        self.running.store(true, Ordering::SeqCst);

        let broadcaster = Broadcaster {
            frames: Arc::clone(&self.frames),
            clients: Arc::clone(&self.clients),
            running: Arc::clone(&self.running),
            period: self.config.frame_interval(),
        };
        let broadcast_thread = match thread::Builder::new()
            .name("mjpeg-broadcast".to_string())
            .spawn(move || broadcaster.run())
        {
            Ok(handle) => handle,
            Err(e) => {
                self.running.store(false, Ordering::SeqCst);
                let _ = shutdown_tx.send(());
                let _ = http_thread.join();
                return Err(ServerError::ThreadSpawn(e.to_string()));
            }
        };

        lifecycle.http_thread = Some(http_thread);
        lifecycle.broadcast_thread = Some(broadcast_thread);
        lifecycle.shutdown = Some(shutdown_tx);
        lifecycle.local_addr = Some(local_addr);

        tracing::info!(addr = %local_addr, backlog = self.config.client_backlog(), "MJPEG server started");
        Ok(())
    }

    /// Stop serving: both threads exit, every client is closed and the
    /// listener is released. Idempotent and never fails.
    pub fn stop(&self) {
        let mut lifecycle = self.lifecycle.lock();
        let was_running = self.running.swap(false, Ordering::SeqCst);

        if let Some(shutdown) = lifecycle.shutdown.take() {
            let _ = shutdown.send(());
        }

        // The http thread owns the runtime; its exit closes the listener and
        // every connection
        for handle in [lifecycle.http_thread.take(), lifecycle.broadcast_thread.take()]
            .into_iter()
            .flatten()
        {
            if handle.join().is_err() {
                tracing::error!("MJPEG server thread panicked");
            }
        }

        let closed = self.clients.close_all();
        lifecycle.local_addr = None;

        if was_running {
            tracing::info!(clients_closed = closed, "MJPEG server stopped");
        }
    }

    /// Start a stopped server or stop a running one
    pub fn toggle(&self) -> Result<(), ServerError> {
        if self.is_running() {
            self.stop();
            Ok(())
        } else {
            self.start()
        }
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Bound address while running
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.lifecycle.lock().local_addr
    }

    /// Live `/stream` clients
    pub fn client_count(&self) -> usize {
        self.clients.len()
    }

    pub fn config(&self) -> &ServerConfig {
        &self.config
    }
}

impl Drop for MjpegServer {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Bind the listening socket. On unix `SO_REUSEADDR` lets a restart reclaim
/// the port while old connections sit in TIME_WAIT; on Windows it would let
/// a second server bind the same port, so it stays off there.
fn bind_listener(addr: SocketAddr) -> std::io::Result<TcpListener> {
    let socket = Socket::new(Domain::for_address(addr), Type::STREAM, Some(Protocol::TCP))?;
    #[cfg(unix)]
    socket.set_reuse_address(true)?;
    socket.bind(&addr.into())?;
    socket.listen(LISTEN_BACKLOG)?;
    socket.set_nonblocking(true)?;
    Ok(socket.into())
}

/// Body of the http thread: run the router until `shutdown` fires.
/// Reports startup success or failure through `ready` first.
fn serve(
    listener: TcpListener,
    app: Router,
    shutdown: oneshot::Receiver<()>,
    ready: SyncSender<Result<(), ServerError>>,
) {
    let runtime = match tokio::runtime::Builder::new_current_thread().enable_all().build() {
        Ok(runtime) => runtime,
        Err(e) => {
            let _ = ready.send(Err(ServerError::Runtime(e.to_string())));
            return;
        }
    };

    runtime.block_on(async move {
        let listener = match tokio::net::TcpListener::from_std(listener) {
            Ok(listener) => listener,
            Err(e) => {
                let _ = ready.send(Err(ServerError::Runtime(e.to_string())));
                return;
            }
        };
        let _ = ready.send(Ok(()));

        let service = app.into_make_service_with_connect_info::<SocketAddr>();
        tokio::select! {
            result = axum::serve(listener, service).into_future() => {
                if let Err(e) = result {
                    let err = ServerError::AcceptFailed(e.to_string());
                    tracing::error!(error = %err, "HTTP server exited");
                }
            }
            _ = shutdown => {}
        }
    });
}

struct Broadcaster {
    frames: SharedFrameSlot,
    clients: Arc<ClientSet>,
    running: Arc<AtomicBool>,
    period: Duration,
}

impl Broadcaster {
    fn run(self) {
        while self.running.load(Ordering::SeqCst) {
            let sweep_started = Instant::now();

            let Some(frame) = self.frames.latest().filter(|f| !f.is_empty()) else {
                thread::sleep(NO_FRAME_POLL_INTERVAL);
                continue;
            };

            self.sweep(&frame.bytes);

            let elapsed = sweep_started.elapsed();
            if elapsed < self.period {
                thread::sleep(self.period - elapsed);
            }
        }
    }

    /// Queue one frame on every live client, then drop the failed ones
    fn sweep(&self, jpeg: &[u8]) {
        let sessions = self.clients.snapshot();
        if sessions.is_empty() {
            return;
        }

        let part = multipart::encode_part(jpeg);
        let mut disconnected = Vec::new();

        for session in &sessions {
            if let Err(e) = session.send_part(part.clone()) {
                tracing::debug!(
                    session_id = %session.id(),
                    client = ?session.remote_addr(),
                    error = %e,
                    "Dropping MJPEG client"
                );
                disconnected.push(session.id());
            }
        }

        let removed = self.clients.remove_all(&disconnected);
        if removed > 0 {
            tracing::info!(
                disconnected = removed,
                remaining = self.clients.len(),
                "MJPEG clients disconnected"
            );
        }
    }
}
