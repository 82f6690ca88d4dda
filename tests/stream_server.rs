//! End-to-end tests for the MJPEG server
//!
//! Real TCP clients against a running server fed by the test pattern source.
//!
//! Run: `cargo test --test stream_server`

use std::io::{Read, Write};
use std::net::{Ipv4Addr, SocketAddr, TcpListener, TcpStream};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use bytes::Bytes;
use passthrough_streamer::{
    capture::{create_shared_slot, CaptureSettings, EncodedFrame, FrameCapture, SharedFrameSlot, TestPatternSource},
    config::ServerConfig,
    error::{CalibrationError, ServerError},
    geometry::{CalibrationCache, CameraEye, FileCalibrationProvider},
    stream::{MjpegServer, STREAM_CONTENT_TYPE, VIEWER_HTML},
};

const READ_TIMEOUT: Duration = Duration::from_secs(5);

fn free_port() -> u16 {
    let listener = TcpListener::bind((Ipv4Addr::LOCALHOST, 0)).unwrap();
    listener.local_addr().unwrap().port()
}

fn local_config(port: u16) -> ServerConfig {
    ServerConfig::with_port(port)
        .bind(Ipv4Addr::LOCALHOST.into())
        .target_frame_rate(20)
        .auto_start(false)
}

fn sample_jpeg() -> Bytes {
    Bytes::from_static(&[0xFF, 0xD8, 0xFF, 0xE0, 0x00, 0x10, 0x4A, 0x46, 0x49, 0x46, 0xFF, 0xD9])
}

fn slot_with_frame() -> SharedFrameSlot {
    let slot = create_shared_slot();
    slot.publish(EncodedFrame::new(sample_jpeg(), 2, 2, 1));
    slot
}

fn send_get(addr: SocketAddr, path: &str) -> TcpStream {
    let mut stream = TcpStream::connect(addr).unwrap();
    stream.set_read_timeout(Some(READ_TIMEOUT)).unwrap();
    write!(stream, "GET {} HTTP/1.1\r\nHost: {}\r\n\r\n", path, addr).unwrap();
    stream
}

fn find(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack.windows(needle.len()).position(|w| w == needle)
}

/// Status line and headers, names lowercased
struct ResponseHead {
    status_line: String,
    headers: Vec<(String, String)>,
}

impl ResponseHead {
    fn parse(raw: &[u8]) -> Self {
        let text = std::str::from_utf8(raw).unwrap();
        let mut lines = text.split("\r\n");
        let status_line = lines.next().unwrap().to_string();
        let headers = lines
            .filter(|line| !line.is_empty())
            .filter_map(|line| line.split_once(':'))
            .map(|(name, value)| (name.trim().to_ascii_lowercase(), value.trim().to_string()))
            .collect();
        Self { status_line, headers }
    }

    fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, v)| v.as_str())
    }
}

/// Complete request/response for a non-streaming path
fn get(addr: SocketAddr, path: &str) -> (ResponseHead, Vec<u8>) {
    let mut stream = send_get(addr, path);
    let mut raw = Vec::new();
    stream.read_to_end(&mut raw).unwrap();

    let head_end = find(&raw, b"\r\n\r\n").unwrap();
    (ResponseHead::parse(&raw[..head_end]), raw[head_end + 4..].to_vec())
}

/// One JPEG part as seen on the wire
struct Part {
    content_length: usize,
    payload: Vec<u8>,
}

/// `/stream` client decoding the chunked multipart body incrementally
struct StreamClient {
    stream: TcpStream,
    /// Received, not yet de-chunked
    pending: Vec<u8>,
    /// De-chunked, not yet split into parts
    body: Vec<u8>,
    head: Option<ResponseHead>,
    chunked: bool,
}

impl StreamClient {
    fn open(addr: SocketAddr) -> Self {
        Self {
            stream: send_get(addr, "/stream"),
            pending: Vec::new(),
            body: Vec::new(),
            head: None,
            chunked: false,
        }
    }

    fn fill(&mut self) {
        let mut chunk = [0u8; 64 * 1024];
        let n = self.stream.read(&mut chunk).unwrap();
        assert!(n > 0, "server closed the stream early");
        self.pending.extend_from_slice(&chunk[..n]);
    }

    fn head(&mut self) -> &ResponseHead {
        while self.head.is_none() {
            match find(&self.pending, b"\r\n\r\n") {
                Some(end) => {
                    let head = ResponseHead::parse(&self.pending[..end]);
                    self.chunked = head.header("transfer-encoding") == Some("chunked");
                    self.pending.drain(..end + 4);
                    self.head = Some(head);
                }
                None => self.fill(),
            }
        }
        self.head.as_ref().unwrap()
    }

    /// Move every complete chunk from `pending` into `body`
    fn decode(&mut self) {
        if !self.chunked {
            self.body.append(&mut self.pending);
            return;
        }
        loop {
            let Some(line_end) = find(&self.pending, b"\r\n") else {
                return;
            };
            let size_line = std::str::from_utf8(&self.pending[..line_end]).unwrap();
            let size_hex = size_line.split(';').next().unwrap().trim();
            let size = usize::from_str_radix(size_hex, 16).unwrap();
            assert!(size > 0, "stream body ended");

            let data_start = line_end + 2;
            if self.pending.len() < data_start + size + 2 {
                return;
            }
            self.body.extend_from_slice(&self.pending[data_start..data_start + size]);
            self.pending.drain(..data_start + size + 2);
        }
    }

    fn take_part(&mut self) -> Option<Part> {
        // Part heads are short; never scan into a payload
        let window = &self.body[..self.body.len().min(256)];
        let head_end = find(window, b"\r\n\r\n")?;
        let head = std::str::from_utf8(&self.body[..head_end]).unwrap();
        let mut lines = head.split("\r\n");
        assert_eq!(lines.next(), Some("--boundary"));
        assert_eq!(lines.next(), Some("Content-Type: image/jpeg"));
        let content_length: usize = lines
            .next()
            .and_then(|l| l.strip_prefix("Content-Length: "))
            .unwrap()
            .parse()
            .unwrap();

        let body_start = head_end + 4;
        let body_end = body_start + content_length;
        if self.body.len() < body_end + 4 {
            return None;
        }
        assert_eq!(&self.body[body_end..body_end + 4], b"\r\n\r\n");
        let payload = self.body[body_start..body_end].to_vec();
        self.body.drain(..body_end + 4);
        Some(Part {
            content_length,
            payload,
        })
    }

    fn next_part(&mut self) -> Part {
        self.head();
        loop {
            self.decode();
            if let Some(part) = self.take_part() {
                return part;
            }
            self.fill();
        }
    }

    fn read_parts(&mut self, count: usize) -> Vec<Part> {
        (0..count).map(|_| self.next_part()).collect()
    }
}

fn wait_for(mut condition: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + READ_TIMEOUT;
    while Instant::now() < deadline {
        if condition() {
            return true;
        }
        thread::sleep(Duration::from_millis(10));
    }
    false
}

#[test]
fn clients_receive_header_once_then_parts() {
    let server = MjpegServer::new(local_config(free_port()), slot_with_frame());
    server.start().unwrap();
    let addr = server.local_addr().unwrap();

    let mut clients: Vec<_> = (0..3).map(|_| StreamClient::open(addr)).collect();
    for client in &mut clients {
        let head = client.head();
        assert_eq!(head.status_line, "HTTP/1.1 200 OK");
        assert_eq!(head.header("content-type"), Some(STREAM_CONTENT_TYPE));

        // Every part starts right at a boundary; no second response head
        for part in client.read_parts(3) {
            assert_eq!(part.content_length, sample_jpeg().len());
            assert_eq!(part.payload, sample_jpeg());
        }
    }
    assert_eq!(server.client_count(), 3);

    server.stop();
}

#[test]
fn disconnecting_client_does_not_affect_others() {
    let server = MjpegServer::new(local_config(free_port()), slot_with_frame());
    server.start().unwrap();
    let addr = server.local_addr().unwrap();

    let mut staying = StreamClient::open(addr);
    let mut leaving = StreamClient::open(addr);
    staying.read_parts(1);
    leaving.read_parts(1);
    assert!(wait_for(|| server.client_count() == 2));

    drop(leaving);
    assert!(wait_for(|| server.client_count() == 1));

    // The survivor keeps receiving frames after the removal
    assert_eq!(staying.read_parts(5).len(), 5);
    assert!(server.is_running());

    server.stop();
}

#[test]
fn stalled_client_is_dropped_while_others_keep_streaming() {
    let mut jpeg = vec![0x5Au8; 2 * 1024 * 1024];
    jpeg[..2].copy_from_slice(&[0xFF, 0xD8]);
    let tail = jpeg.len() - 2;
    jpeg[tail..].copy_from_slice(&[0xFF, 0xD9]);
    let frames = create_shared_slot();
    frames.publish(EncodedFrame::new(Bytes::from(jpeg), 1024, 1024, 1));

    let config = local_config(free_port())
        .target_frame_rate(10)
        .client_write_timeout(Duration::from_secs(1));
    let server = MjpegServer::new(config, frames);
    server.start().unwrap();
    let addr = server.local_addr().unwrap();

    let mut reading = StreamClient::open(addr);
    let stalled = send_get(addr, "/stream");
    reading.read_parts(1);
    assert!(wait_for(|| server.client_count() == 2));

    // Socket buffers absorb a few frames before the backlog starts to fill
    let deadline = Instant::now() + Duration::from_secs(20);
    while server.client_count() > 1 {
        assert!(Instant::now() < deadline, "stalled client was never dropped");
        let part = reading.next_part();
        assert_eq!(part.content_length, 2 * 1024 * 1024);
    }

    for part in reading.read_parts(3) {
        assert_eq!(&part.payload[..2], &[0xFF, 0xD8]);
    }
    assert_eq!(server.client_count(), 1);

    drop(stalled);
    server.stop();
}

#[test]
fn silent_connection_does_not_delay_other_clients() {
    let server = MjpegServer::new(local_config(free_port()), slot_with_frame());
    server.start().unwrap();
    let addr = server.local_addr().unwrap();

    // Connects and never sends a request
    let _silent = TcpStream::connect(addr).unwrap();
    thread::sleep(Duration::from_millis(50));

    let started = Instant::now();
    let (head, body) = get(addr, "/");
    assert!(started.elapsed() < Duration::from_millis(500));
    assert_eq!(head.status_line, "HTTP/1.1 200 OK");
    assert_eq!(body, VIEWER_HTML.as_bytes());

    let mut client = StreamClient::open(addr);
    client.read_parts(1);

    server.stop();
}

#[test]
fn restart_on_same_port() {
    let port = free_port();
    let server = MjpegServer::new(local_config(port), slot_with_frame());

    server.start().unwrap();
    let mut client = StreamClient::open(server.local_addr().unwrap());
    client.read_parts(1);

    server.stop();
    assert!(!server.is_running());
    assert_eq!(server.client_count(), 0);

    server.start().unwrap();
    assert_eq!(server.local_addr().unwrap().port(), port);
    let mut client = StreamClient::open(server.local_addr().unwrap());
    client.read_parts(1);

    server.stop();
}

#[test]
fn stop_closes_live_clients() {
    let server = MjpegServer::new(local_config(free_port()), slot_with_frame());
    server.start().unwrap();
    let mut client = StreamClient::open(server.local_addr().unwrap());
    client.read_parts(1);

    server.stop();

    // Drain whatever was in flight; the server side must then be closed
    let mut rest = Vec::new();
    match client.stream.read_to_end(&mut rest) {
        Ok(_) => {}
        Err(e) => assert_eq!(e.kind(), std::io::ErrorKind::ConnectionReset),
    }
}

#[test]
fn root_serves_viewer_page() {
    let server = MjpegServer::new(local_config(free_port()), slot_with_frame());
    server.start().unwrap();
    let addr = server.local_addr().unwrap();

    for path in ["/", "/index.html", "/favicon.ico", "/stream/extra"] {
        let (head, body) = get(addr, path);

        assert_eq!(head.status_line, "HTTP/1.1 200 OK");
        assert!(head.header("content-type").unwrap().starts_with("text/html"));
        assert_eq!(body, VIEWER_HTML.as_bytes());
    }
    assert_eq!(server.client_count(), 0);

    // Path matching ignores case and query
    let mut client = send_get(addr, "/STREAM?t=1");
    let mut head = vec![0u8; 256];
    let n = client.read(&mut head).unwrap();
    let text = String::from_utf8_lossy(&head[..n]).to_ascii_lowercase();
    assert!(text.contains("content-type: multipart/x-mixed-replace; boundary=--boundary"));
    assert!(!text.contains("text/html"));
    assert_eq!(server.client_count(), 1);

    server.stop();
}

#[test]
fn no_frame_yet_sends_nothing() {
    let server = MjpegServer::new(local_config(free_port()), create_shared_slot());
    server.start().unwrap();
    let mut client = send_get(server.local_addr().unwrap(), "/stream");
    assert!(wait_for(|| server.client_count() == 1));

    client.set_read_timeout(Some(Duration::from_millis(200))).unwrap();
    let mut byte = [0u8; 1];
    let err = client.read(&mut byte).unwrap_err();
    assert!(matches!(
        err.kind(),
        std::io::ErrorKind::WouldBlock | std::io::ErrorKind::TimedOut
    ));

    server.stop();
}

#[test]
fn captured_640x480_stream_at_quality_50() {
    let config = ServerConfig::with_port(free_port())
        .bind(Ipv4Addr::LOCALHOST.into())
        .jpeg_quality(50)
        .target_frame_rate(10)
        .auto_start(false);

    let frames = create_shared_slot();
    let mut capture = FrameCapture::new(
        Box::new(TestPatternSource::new(640, 480)),
        CaptureSettings::from(&config),
        Arc::clone(&frames),
    );
    capture.start().unwrap();

    let server = MjpegServer::new(config, Arc::clone(&frames));
    server.start().unwrap();
    let mut client = StreamClient::open(server.local_addr().unwrap());

    for part in client.read_parts(2) {
        assert_eq!(part.payload.len(), part.content_length);
        assert_eq!(&part.payload[..2], &[0xFF, 0xD8]);
        assert_eq!(&part.payload[part.payload.len() - 2..], &[0xFF, 0xD9]);
        // Well under the raw 640x480 RGB size
        assert!(part.content_length < 640 * 480 * 3 / 4);
    }

    let latest = frames.latest().unwrap();
    assert_eq!((latest.width, latest.height), (640, 480));

    server.stop();
    capture.stop();
}

#[test]
fn occupied_port_fails_with_bind_error() {
    let occupied = TcpListener::bind((Ipv4Addr::LOCALHOST, 0)).unwrap();
    let port = occupied.local_addr().unwrap().port();

    let server = MjpegServer::new(local_config(port), slot_with_frame());
    let err = server.start().unwrap_err();

    assert!(matches!(err, ServerError::BindFailed { addr, .. } if addr.port() == port));
    assert!(!server.is_running());
    server.stop();
}

#[test]
fn init_and_toggle() {
    let port = free_port();
    let server = MjpegServer::init(local_config(port).auto_start(true), slot_with_frame()).unwrap();
    assert!(server.is_running());

    server.toggle().unwrap();
    assert!(!server.is_running());
    server.toggle().unwrap();
    assert!(server.is_running());

    let mut client = StreamClient::open(server.local_addr().unwrap());
    client.read_parts(1);
    drop(client);

    drop(server);
    assert!(TcpListener::bind((Ipv4Addr::LOCALHOST, port)).is_ok());
}

#[test]
fn calibration_failure_leaves_stream_running() {
    let server = MjpegServer::new(local_config(free_port()), slot_with_frame());
    server.start().unwrap();

    let provider = FileCalibrationProvider::from_json(r#"{ "devices": [] }"#).unwrap();
    let cache = CalibrationCache::new(Arc::new(provider));
    assert_eq!(
        cache.intrinsics(CameraEye::Left).unwrap_err(),
        CalibrationError::Unavailable(CameraEye::Left)
    );

    let mut client = StreamClient::open(server.local_addr().unwrap());
    assert_eq!(client.read_parts(2).len(), 2);

    server.stop();
}
