use std::io::Write;
use std::path::PathBuf;
use std::time::{Duration, Instant};

use rttp_dispatch::kernel::FileOptions;
use rttp_dispatch::transport::BufferTransport;
use rttp_dispatch::{App, Method, Reply, Request};
use tempfile::TempDir;

fn fixture() -> (TempDir, PathBuf) {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("data.txt");
    let mut file = std::fs::File::create(&path).unwrap();
    file.write_all(b"foobar").unwrap();
    (dir, path)
}

fn serve(path: PathBuf, options: FileOptions, request: Request) -> BufferTransport {
    let mut app = App::default();
    app.route_fn("GET|HEAD /file", move |ctx| {
        ctx.kernel().send_file(&path, options.clone())?;
        Ok(Reply::Empty)
    })
    .unwrap();

    let mut transport = BufferTransport::new();
    app.handle(request, &mut transport).unwrap();
    transport
}

#[test]
fn range_request_gets_partial_content() {
    let (_dir, path) = fixture();
    let request = Request::new(Method::Get, "/file").with_header("Range", "bytes=1-3");
    let transport = serve(path, FileOptions::new().ranges(true), request);

    assert_eq!(transport.code(), Some(206));
    assert_eq!(transport.body(), b"oob");
    assert_eq!(transport.header("content-range"), Some("bytes 1-3/6"));
    assert_eq!(transport.header("content-length"), Some("3"));
    assert_eq!(transport.header("accept-ranges"), Some("bytes"));
}

#[test]
fn suffix_range_serves_the_tail() {
    let (_dir, path) = fixture();
    let request = Request::new(Method::Get, "/file").with_header("Range", "bytes=-2");
    let transport = serve(path, FileOptions::new().ranges(true), request);

    assert_eq!(transport.code(), Some(206));
    assert_eq!(transport.body(), b"ar");
    assert_eq!(transport.header("content-range"), Some("bytes 4-5/6"));
}

#[test]
fn malformed_range_is_416_without_body() {
    let (_dir, path) = fixture();
    let request = Request::new(Method::Get, "/file").with_header("Range", "bytes=1");
    let transport = serve(path, FileOptions::new().ranges(true), request);

    assert_eq!(transport.code(), Some(416));
    assert_eq!(transport.header("content-range"), Some("bytes */6"));
    assert_eq!(transport.header("content-length"), Some("0"));
    assert!(transport.body().is_empty());
}

#[test]
fn range_is_ignored_unless_enabled() {
    let (_dir, path) = fixture();
    let request = Request::new(Method::Get, "/file").with_header("Range", "bytes=1-3");
    let transport = serve(path, FileOptions::new(), request);

    assert_eq!(transport.code(), Some(200));
    assert_eq!(transport.body(), b"foobar");
    assert!(transport.header("content-range").is_none());
}

#[test]
fn head_request_sends_file_headers_only() {
    let (_dir, path) = fixture();
    let transport = serve(path, FileOptions::new(), Request::new(Method::Head, "/file"));

    assert_eq!(transport.code(), Some(200));
    assert_eq!(transport.header("content-length"), Some("6"));
    assert!(transport.header("expires").is_some());
    assert!(transport.body().is_empty());
}

#[test]
fn plain_download_disposition() {
    let (_dir, path) = fixture();
    let options = FileOptions::new().download(None).mime("application/x-demo");
    let transport = serve(path, options, Request::new(Method::Get, "/file"));

    assert_eq!(transport.header("content-disposition"), Some("attachment"));
    assert_eq!(transport.header("content-type"), Some("application/x-demo;charset=UTF-8"));
}

#[test]
fn file_rate_paces_the_stream() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("big.bin");
    std::fs::write(&path, vec![b'z'; 4096]).unwrap();

    let started = Instant::now();
    let transport = serve(path, FileOptions::new().rate(64), Request::new(Method::Get, "/file"));
    assert_eq!(transport.body().len(), 4096);
    assert_eq!(transport.header("content-type"), Some("application/octet-stream;charset=UTF-8"));
    assert!(started.elapsed() >= Duration::from_millis(500));
}

#[test]
fn missing_file_is_a_server_error() {
    let dir = tempfile::tempdir().unwrap();
    let transport = serve(dir.path().join("absent.txt"), FileOptions::new(), Request::new(Method::Get, "/file"));
    assert_eq!(transport.code(), Some(500));
}
