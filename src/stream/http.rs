//! HTTP surface of the stream server
//!
//! | Path | Response |
//! |------|----------|
//! | `/stream` (any case, query ignored) | `multipart/x-mixed-replace` JPEG stream |
//! | anything else | viewer page embedding `/stream` |
//!
//! A `/stream` request registers a [`ClientSession`] and then waits: the
//! response head goes out together with the first part the broadcast thread
//! delivers, so a client connected before the first frame sees nothing.

use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::Arc;

use axum::{
    body::Body,
    extract::{ConnectInfo, State},
    http::{header, StatusCode, Uri},
    response::{Html, IntoResponse, Response},
    routing::any,
    Router,
};
use futures_util::stream;
use tower_http::trace::TraceLayer;

use crate::stream::clients::ClientSet;
use crate::stream::multipart::STREAM_CONTENT_TYPE;
use crate::stream::session::{ChannelTransport, ClientSession, ClientStream};

/// Path that upgrades a connection to an MJPEG stream
pub const STREAM_PATH: &str = "/stream";

/// Viewer page served for every other path
pub const VIEWER_HTML: &str =
    "<html><body><img src='/stream' style='width:100%'></body></html>";

/// State shared by the HTTP handlers
pub(crate) struct StreamState {
    pub clients: Arc<ClientSet>,
    /// Per-client queue length, see [`ServerConfig::client_backlog`](crate::config::ServerConfig::client_backlog)
    pub backlog: usize,
}

/// Whether a request path addresses the stream endpoint
pub fn is_stream_path(path: &str) -> bool {
    path.eq_ignore_ascii_case(STREAM_PATH)
}

pub(crate) fn router(state: Arc<StreamState>) -> Router {
    Router::new()
        .route(STREAM_PATH, any(stream_handler))
        .fallback(fallback)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Catches mixed-case stream paths; everything else gets the viewer
async fn fallback(
    State(state): State<Arc<StreamState>>,
    ConnectInfo(peer): ConnectInfo<SocketAddr>,
    uri: Uri,
) -> Response {
    if is_stream_path(uri.path()) {
        stream_handler(State(state), ConnectInfo(peer)).await
    } else {
        tracing::debug!(client = %peer, path = uri.path(), "Serving viewer page");
        viewer().into_response()
    }
}

fn viewer() -> impl IntoResponse {
    ([(header::CONNECTION, "close")], Html(VIEWER_HTML))
}

async fn stream_handler(
    State(state): State<Arc<StreamState>>,
    ConnectInfo(peer): ConnectInfo<SocketAddr>,
) -> Response {
    let (transport, ClientStream { opened, chunks }) = ChannelTransport::new(Some(peer), state.backlog);
    let session = Arc::new(ClientSession::new(Box::new(transport)));
    let session_id = session.id();
    let total = state.clients.add(session);
    tracing::info!(client = %peer, %session_id, total, "MJPEG client connected");

    // Closed without ever opening: the server stopped before a frame arrived
    if opened.await.is_err() {
        return StatusCode::SERVICE_UNAVAILABLE.into_response();
    }

    let body = Body::from_stream(stream::unfold(chunks, |mut chunks| async move {
        let chunk = chunks.recv().await?;
        Some((Ok::<_, Infallible>(chunk), chunks))
    }));

    (
        [
            (header::CONTENT_TYPE, STREAM_CONTENT_TYPE),
            (header::CACHE_CONTROL, "no-cache"),
        ],
        body,
    )
        .into_response()
}
