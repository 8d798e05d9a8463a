use std::sync::Arc;

use rttp_dispatch::{App, Reply, Server};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;

async fn start() -> std::net::SocketAddr {
    let mut app = App::default();
    app.route_fn("GET /hello/@name", |ctx| {
        let name = ctx.require("name")?.to_owned();
        Ok(Reply::from(format!("Hello, {name}!")))
    })
    .unwrap();
    app.route_fn("POST /echo", |ctx| {
        let body = String::from_utf8_lossy(ctx.request().body()).into_owned();
        Ok(Reply::from(body))
    })
    .unwrap();

    app.reroute("GET /old", "/hello/moved", true).unwrap();

    let server = Server::bind("127.0.0.1:0").await.unwrap();
    let addr = server.local_addr();
    tokio::spawn(server.run(Arc::new(app)));
    addr
}

async fn exchange(addr: std::net::SocketAddr, raw: &str) -> String {
    let mut stream = TcpStream::connect(addr).await.unwrap();
    stream.write_all(raw.as_bytes()).await.unwrap();
    let mut out = Vec::new();
    stream.read_to_end(&mut out).await.unwrap();
    String::from_utf8(out).unwrap()
}

#[tokio::test]
async fn serves_a_routed_request() {
    let addr = start().await;
    let response = exchange(addr, "GET /hello/world HTTP/1.1\r\nHost: localhost\r\nConnection: close\r\n\r\n").await;

    assert!(response.starts_with("HTTP/1.1 200 OK\r\n"));
    assert!(response.contains("Content-Length: 13\r\n"));
    assert!(response.ends_with("\r\n\r\nHello, world!"));
}

#[tokio::test]
async fn keeps_the_connection_alive_between_requests() {
    let addr = start().await;
    let raw = concat!(
        "POST /echo HTTP/1.1\r\nHost: localhost\r\nContent-Length: 4\r\n\r\nping",
        "GET /hello/again HTTP/1.1\r\nHost: localhost\r\nConnection: close\r\n\r\n",
    );
    let response = exchange(addr, raw).await;

    assert_eq!(response.matches("HTTP/1.1 200 OK").count(), 2);
    assert!(response.contains("\r\n\r\nping"));
    assert!(response.ends_with("Hello, again!"));
}

#[tokio::test]
async fn redirects_keep_the_connection_open() {
    let addr = start().await;
    let raw = concat!(
        "GET /old HTTP/1.1\r\nHost: localhost\r\n\r\n",
        "GET /hello/again HTTP/1.1\r\nHost: localhost\r\nConnection: close\r\n\r\n",
    );
    let response = exchange(addr, raw).await;

    assert!(response.starts_with("HTTP/1.1 301 Moved Permanently\r\n"));
    assert!(response.contains("Location: /hello/moved\r\n"));
    assert!(response.contains("Content-Length: 0\r\n"));
    assert!(response.ends_with("Hello, again!"));
}

#[tokio::test]
async fn unknown_paths_get_404() {
    let addr = start().await;
    let response = exchange(addr, "GET /nope HTTP/1.1\r\nHost: localhost\r\nConnection: close\r\n\r\n").await;
    assert!(response.starts_with("HTTP/1.1 404 Not Found\r\n"));
}

#[tokio::test]
async fn malformed_requests_get_400() {
    let addr = start().await;
    let response = exchange(addr, "\x01\x02 garbage\r\n\r\n").await;
    assert!(response.starts_with("HTTP/1.1 400 Bad Request\r\n"));
}
