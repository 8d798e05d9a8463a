//! TCP server driving an [`App`] over HTTP/1.1.
//!
//! Connections are accepted on the Tokio runtime. Each one is then served on
//! a blocking worker: the kernel writes synchronously and paced streams sleep
//! between chunks, which must not stall the async executor.
//!
//! Persistent connections are honoured when the request asks for keep-alive
//! and the response is delimited: it carried a `Content-Length`, or its
//! status forbids a body.

use std::io::{self, Read};
use std::net::{SocketAddr, TcpStream};
use std::sync::Arc;

use bytes::{Buf, Bytes, BytesMut};
use thiserror::Error;
use tokio::net::TcpListener;
use tracing::{debug, error, info, warn};

use crate::http::request::{Request, RequestError};
use crate::http::{StatusCode, permits_body, status_text};
use crate::kernel::App;
use crate::transport::{Head, StreamTransport, Transport};

#[derive(Debug, Error)]
pub enum ServerError {
    #[error("cannot listen on {addr}: {source}")]
    Bind {
        addr: String,
        #[source]
        source: io::Error,
    },

    #[error(transparent)]
    Io(#[from] io::Error),
}

/// Largest request, head plus body, buffered for one connection.
const REQUEST_LIMIT: usize = 8 << 20;
const READ_CHUNK: usize = 4096;

/// Listens on a TCP socket and feeds each request to an [`App`].
///
/// # Examples
///
/// ```rust,no_run
/// use std::sync::Arc;
///
/// use rttp_dispatch::{App, Reply, Server};
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let mut app = App::default();
///     app.route_fn("GET /", |_ctx| Ok(Reply::from("Hello!")))?;
///
///     let server = Server::bind("127.0.0.1:8080").await?;
///     server.run(Arc::new(app)).await?;
///     Ok(())
/// }
/// ```
pub struct Server {
    listener: TcpListener,
    local_addr: SocketAddr,
}

impl Server {
    /// # Errors
    ///
    /// [`ServerError::Bind`] when the socket cannot be opened.
    pub async fn bind(addr: impl AsRef<str>) -> Result<Self, ServerError> {
        let addr = addr.as_ref();
        let bind_error = |source| ServerError::Bind { addr: addr.to_owned(), source };
        let listener = TcpListener::bind(addr).await.map_err(bind_error)?;
        let local_addr = listener.local_addr()?;
        Ok(Self { listener, local_addr })
    }

    /// Address actually bound, useful after binding port 0.
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Accepts connections forever; each one is served on the blocking pool.
    ///
    /// # Errors
    ///
    /// Accept failures are logged and skipped, so this only returns if the
    /// runtime shuts down.
    pub async fn run(self, app: Arc<App>) -> Result<(), ServerError> {
        info!(address = %self.local_addr, "rttp-dispatch listening");

        loop {
            let (socket, peer) = match self.listener.accept().await {
                Ok(accepted) => accepted,
                Err(e) => {
                    error!(error = %e, "accept failed");
                    continue;
                }
            };
            debug!(%peer, "accepted");

            let stream = match blocking(socket) {
                Ok(stream) => stream,
                Err(e) => {
                    warn!(%peer, error = %e, "could not hand the socket to a worker");
                    continue;
                }
            };
            let app = Arc::clone(&app);
            tokio::task::spawn_blocking(move || {
                if let Err(e) = serve_connection(stream, peer, &app) {
                    warn!(%peer, error = %e, "connection aborted");
                }
            });
        }
    }
}

fn blocking(socket: tokio::net::TcpStream) -> io::Result<TcpStream> {
    let stream = socket.into_std()?;
    stream.set_nonblocking(false)?;
    Ok(stream)
}

/// Serves one connection until the peer closes it or keep-alive ends.
fn serve_connection(mut stream: TcpStream, peer: SocketAddr, app: &App) -> io::Result<()> {
    let mut pending = BytesMut::with_capacity(READ_CHUNK);
    let mut chunk = [0u8; READ_CHUNK];

    loop {
        let request = match next_request(&pending) {
            Ok(Some((request, used))) => {
                pending.advance(used);
                request
            }
            Ok(None) => {
                let read = stream.read(&mut chunk)?;
                if read == 0 {
                    debug!(%peer, "peer hung up");
                    return Ok(());
                }
                pending.extend_from_slice(&chunk[..read]);
                if pending.len() > REQUEST_LIMIT {
                    warn!(%peer, "request over the buffer limit");
                    return reject(&mut stream, StatusCode::PayloadTooLarge, "Request entity too large");
                }
                continue;
            }
            Err(e) => {
                warn!(%peer, error = %e, "unparseable request");
                return reject(&mut stream, StatusCode::BadRequest, &format!("Bad Request: {e}"));
            }
        };

        let keep_alive = request.is_keep_alive();
        debug!(%peer, verb = request.verb(), path = request.path(), "dispatching");

        let mut transport = StreamTransport::new(&mut stream);
        let response = app.handle(request, &mut transport).map_err(io::Error::other)?;
        let framed = response.header("content-length").is_some() || !permits_body(response.code());
        if !(keep_alive && framed && transport.is_connected()) {
            return Ok(());
        }
    }
}

/// Parses the next complete request in `buf`, with its exact body.
///
/// Returns the request and the number of bytes it occupies, or `None` when
/// more data is needed.
fn next_request(buf: &[u8]) -> Result<Option<(Request, usize)>, RequestError> {
    let (mut request, head_len) = match Request::parse(buf) {
        Err(RequestError::Incomplete) => return Ok(None),
        parsed => parsed?,
    };

    let body_len = request.content_length().unwrap_or(0);
    if body_len > REQUEST_LIMIT {
        return Err(RequestError::BodyTooLarge { limit: REQUEST_LIMIT });
    }
    let Some(body) = buf.get(head_len..head_len + body_len) else {
        return Ok(None);
    };

    request.set_body(Bytes::copy_from_slice(body));
    Ok(Some((request, head_len + body_len)))
}

/// Answers a request the kernel never saw, then closes.
fn reject(stream: &mut TcpStream, status: StatusCode, message: &str) -> io::Result<()> {
    let code = status.as_u16();
    let head = Head {
        protocol: "HTTP/1.1".to_owned(),
        code,
        text: status_text(code).to_owned(),
        headers: vec![
            ("Content-Type".to_owned(), vec!["text/plain;charset=UTF-8".to_owned()]),
            ("Content-Length".to_owned(), vec![message.len().to_string()]),
            ("Connection".to_owned(), vec!["close".to_owned()]),
        ],
    };
    let mut transport = StreamTransport::new(stream);
    transport.send_head(&head)?;
    transport.write(message.as_bytes())?;
    transport.flush()
}
