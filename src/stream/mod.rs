//! MJPEG HTTP streaming

pub mod clients;
pub mod http;
pub mod multipart;
pub mod server;
pub mod session;

pub use clients::ClientSet;
pub use http::{is_stream_path, STREAM_PATH, VIEWER_HTML};
pub use multipart::{encode_part, part_header, BOUNDARY, STREAM_CONTENT_TYPE};
pub use server::MjpegServer;
pub use session::{ChannelTransport, ClientSession, ClientStream, Transport};
