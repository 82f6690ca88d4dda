//! `multipart/x-mixed-replace` framing
//!
//! The response carries `Content-Type: multipart/x-mixed-replace;
//! boundary=--boundary`; its body is a run of parts:
//!
//! ```text
//! --boundary\r\n                 ┐
//! Content-Type: image/jpeg\r\n   │ one part
//! Content-Length: <n>\r\n        │ per broadcast
//! \r\n                           │
//! <n JPEG bytes>\r\n\r\n         ┘
//! ```

use std::io::Write;

use bytes::{BufMut, Bytes, BytesMut};

pub const BOUNDARY: &str = "--boundary";

pub const STREAM_CONTENT_TYPE: &str = "multipart/x-mixed-replace; boundary=--boundary";

/// Terminator written after every part's payload
pub const PART_TRAILER: &[u8] = b"\r\n\r\n";

/// Header preceding a JPEG payload of `content_length` bytes
pub fn part_header(content_length: usize) -> Bytes {
    let mut header = BytesMut::with_capacity(80).writer();
    // Writing into memory cannot fail
    let _ = write!(
        header,
        "{}\r\nContent-Type: image/jpeg\r\nContent-Length: {}\r\n\r\n",
        BOUNDARY, content_length
    );
    header.into_inner().freeze()
}

/// Complete part (header, payload, trailer) as one buffer
pub fn encode_part(jpeg: &[u8]) -> Bytes {
    let header = part_header(jpeg.len());
    let mut part = BytesMut::with_capacity(header.len() + jpeg.len() + PART_TRAILER.len());
    part.put_slice(&header);
    part.put_slice(jpeg);
    part.put_slice(PART_TRAILER);
    part.freeze()
}
