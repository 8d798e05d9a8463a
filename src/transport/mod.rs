//! Output transports.
//!
//! The kernel writes a response as one [`Head`] followed by zero or more body
//! chunks. A [`Transport`] decides where those bytes go:
//!
//! - [`BufferTransport`] keeps everything in memory (tests, embedding).
//! - [`StreamTransport`] serializes HTTP/1.1 onto any [`Write`] sink.

use std::io::{self, Write};

use bytes::{BufMut, BytesMut};

pub mod throttle;

pub use throttle::{CHUNK_SIZE, Pacer};

/// Status line and grouped headers of a response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Head {
    pub protocol: String,
    pub code: u16,
    pub text: String,
    /// Headers grouped by canonical name, in first-seen order.
    pub headers: Vec<(String, Vec<String>)>,
}

impl Head {
    /// First value of header `name` (case-insensitive).
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .and_then(|(_, values)| values.first())
            .map(String::as_str)
    }

    /// Every value of header `name`.
    pub fn header_values(&self, name: &str) -> &[String] {
        self.headers
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map_or(&[], |(_, values)| values.as_slice())
    }

    /// Serializes the status line and header block, terminated by an empty line.
    pub fn to_bytes(&self) -> BytesMut {
        let mut buf = BytesMut::with_capacity(256);
        buf.put_slice(self.protocol.as_bytes());
        buf.put_slice(format!(" {} {}\r\n", self.code, self.text).as_bytes());
        for (name, values) in &self.headers {
            for value in values {
                buf.put_slice(name.as_bytes());
                buf.put_slice(b": ");
                buf.put_slice(value.as_bytes());
                buf.put_slice(b"\r\n");
            }
        }
        buf.put_slice(b"\r\n");
        buf
    }
}

/// Where a response is written.
pub trait Transport {
    /// Emits the status line and headers. Called at most once per response.
    fn send_head(&mut self, head: &Head) -> io::Result<()>;

    fn write(&mut self, chunk: &[u8]) -> io::Result<()>;

    fn flush(&mut self) -> io::Result<()>;

    /// `false` once the peer is gone; paced streaming stops early.
    fn is_connected(&self) -> bool;
}

/// Records the response in memory.
///
/// # Examples
///
/// ```
/// use rttp_dispatch::transport::{BufferTransport, Head, Transport};
///
/// let mut transport = BufferTransport::new();
/// transport.send_head(&Head {
///     protocol: "HTTP/1.1".into(),
///     code: 200,
///     text: "OK".into(),
///     headers: vec![("Content-Type".into(), vec!["text/plain".into()])],
/// }).unwrap();
/// transport.write(b"hello").unwrap();
///
/// assert_eq!(transport.code(), Some(200));
/// assert_eq!(transport.header("content-type"), Some("text/plain"));
/// assert_eq!(transport.body_str(), "hello");
/// ```
#[derive(Debug, Default)]
pub struct BufferTransport {
    head: Option<Head>,
    body: Vec<u8>,
    writes: usize,
    disconnect_after: Option<usize>,
}

impl BufferTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reports a dropped connection after `writes` body writes.
    #[must_use]
    pub fn disconnect_after(mut self, writes: usize) -> Self {
        self.disconnect_after = Some(writes);
        self
    }

    pub fn head(&self) -> Option<&Head> {
        self.head.as_ref()
    }

    pub fn code(&self) -> Option<u16> {
        self.head.as_ref().map(|h| h.code)
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.head.as_ref().and_then(|h| h.header(name))
    }

    pub fn body(&self) -> &[u8] {
        &self.body
    }

    /// The body as UTF-8, lossily.
    pub fn body_str(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }

    /// Number of body writes received.
    pub fn writes(&self) -> usize {
        self.writes
    }
}

impl Transport for BufferTransport {
    fn send_head(&mut self, head: &Head) -> io::Result<()> {
        self.head = Some(head.clone());
        Ok(())
    }

    fn write(&mut self, chunk: &[u8]) -> io::Result<()> {
        self.writes += 1;
        self.body.extend_from_slice(chunk);
        Ok(())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.disconnect_after.is_none_or(|limit| self.writes < limit)
    }
}

/// Writes HTTP/1.1 responses to a byte sink such as a `TcpStream`.
///
/// The first failed write marks the transport disconnected.
#[derive(Debug)]
pub struct StreamTransport<W: Write> {
    writer: W,
    connected: bool,
}

impl<W: Write> StreamTransport<W> {
    pub fn new(writer: W) -> Self {
        Self {
            writer,
            connected: true,
        }
    }

    pub fn get_ref(&self) -> &W {
        &self.writer
    }

    pub fn into_inner(self) -> W {
        self.writer
    }

    fn track<T>(&mut self, result: io::Result<T>) -> io::Result<T> {
        if result.is_err() {
            self.connected = false;
        }
        result
    }
}

impl<W: Write> Transport for StreamTransport<W> {
    fn send_head(&mut self, head: &Head) -> io::Result<()> {
        let bytes = head.to_bytes();
        let result = self.writer.write_all(&bytes);
        self.track(result)
    }

    fn write(&mut self, chunk: &[u8]) -> io::Result<()> {
        let result = self.writer.write_all(chunk);
        self.track(result)
    }

    fn flush(&mut self) -> io::Result<()> {
        let result = self.writer.flush();
        self.track(result)
    }

    fn is_connected(&self) -> bool {
        self.connected
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn head() -> Head {
        Head {
            protocol: "HTTP/1.1".into(),
            code: 206,
            text: "Partial Content".into(),
            headers: vec![
                ("Content-Range".into(), vec!["bytes 1-3/6".into()]),
                ("Set-Cookie".into(), vec!["a=1".into(), "b=2".into()]),
            ],
        }
    }

    #[test]
    fn head_serializes_every_value_on_its_own_line() {
        let bytes = head().to_bytes();
        assert_eq!(
            &bytes[..],
            b"HTTP/1.1 206 Partial Content\r\nContent-Range: bytes 1-3/6\r\nSet-Cookie: a=1\r\nSet-Cookie: b=2\r\n\r\n"
        );
    }

    #[test]
    fn stream_transport_writes_head_then_body() {
        let mut transport = StreamTransport::new(Vec::new());
        transport.send_head(&head()).unwrap();
        transport.write(b"oob").unwrap();
        transport.flush().unwrap();
        let out = String::from_utf8(transport.into_inner()).unwrap();
        assert!(out.starts_with("HTTP/1.1 206 Partial Content\r\n"));
        assert!(out.ends_with("\r\n\r\noob"));
    }

    #[test]
    fn failed_write_disconnects() {
        struct Broken;
        impl Write for Broken {
            fn write(&mut self, _: &[u8]) -> io::Result<usize> {
                Err(io::Error::from(io::ErrorKind::BrokenPipe))
            }
            fn flush(&mut self) -> io::Result<()> {
                Ok(())
            }
        }

        let mut transport = StreamTransport::new(Broken);
        assert!(transport.is_connected());
        assert!(transport.write(b"x").is_err());
        assert!(!transport.is_connected());
    }

    #[test]
    fn buffer_transport_values_and_disconnect() {
        let mut transport = BufferTransport::new().disconnect_after(1);
        transport.send_head(&head()).unwrap();
        assert_eq!(transport.head().unwrap().header_values("set-cookie").len(), 2);
        assert!(transport.is_connected());
        transport.write(b"a").unwrap();
        assert!(!transport.is_connected());
    }
}
