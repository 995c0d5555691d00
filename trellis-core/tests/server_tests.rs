mod common;

use common::{app_handlers, app_root, write};
use std::sync::Arc;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::oneshot;
use trellis_core::Application;
use trellis_core::server::serve_listener;

async fn send(addr: std::net::SocketAddr, raw: &str) -> String {
    let mut stream = TcpStream::connect(addr).await.unwrap();
    stream.write_all(raw.as_bytes()).await.unwrap();
    let mut buf = Vec::new();
    stream.read_to_end(&mut buf).await.unwrap();
    String::from_utf8_lossy(&buf).into_owned()
}

#[tokio::test]
async fn test_serves_requests_until_shutdown() {
    let dir = app_root();
    write(
        dir.path(),
        "config/production/routes.toml",
        "[[routes]]\nmethods = \"GET\"\npath = \"/\"\nhandler = \"Home:index\"\n",
    );
    write(
        dir.path(),
        "config/production/middleware.toml",
        "[beforeMiddleware]\n0 = \"Missing:init\"\n",
    );
    let app = Arc::new(
        Application::builder(dir.path())
            .environment("production")
            .handlers(app_handlers)
            .build()
            .unwrap(),
    );

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let (stop, stopped) = oneshot::channel::<()>();
    let server = tokio::spawn(serve_listener(app, listener, async {
        stopped.await.ok();
    }));

    // The before pipeline references an unregistered middleware, so every
    // request fails inside the kernel and is reported as a 500.
    let reply = send(addr, "GET / HTTP/1.1\r\nHost: test\r\nConnection: close\r\n\r\n").await;
    assert!(reply.starts_with("HTTP/1.1 500"), "{}", reply);
    assert!(reply.ends_with("Internal Server Error"));

    stop.send(()).unwrap();
    server.await.unwrap().unwrap();
}

#[tokio::test]
async fn test_response_round_trip() {
    let dir = app_root();
    write(
        dir.path(),
        "config/production/routes.toml",
        "[[routes]]\nmethods = \"GET\"\npath = \"/posts/{id}\"\nhandler = \"Home:show\"\n",
    );
    let app = Arc::new(
        Application::builder(dir.path())
            .environment("production")
            .handlers(app_handlers)
            .build()
            .unwrap(),
    );

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let (stop, stopped) = oneshot::channel::<()>();
    let server = tokio::spawn(serve_listener(app, listener, async {
        stopped.await.ok();
    }));

    let reply = send(addr, "GET /posts/5?x=1 HTTP/1.1\r\nHost: test\r\nConnection: close\r\n\r\n").await;
    assert!(reply.starts_with("HTTP/1.1 200 OK"), "{}", reply);
    assert!(reply.to_ascii_lowercase().contains("content-length: 6"));
    assert!(reply.ends_with("post 5"));

    let reply = send(
        addr,
        "GET /nope HTTP/1.1\r\nHost: test\r\nAccept: application/json\r\nConnection: close\r\n\r\n",
    )
    .await;
    assert!(reply.starts_with("HTTP/1.1 404"), "{}", reply);
    assert!(reply.ends_with(r#"{"error":"Not Found","status":404}"#));

    stop.send(()).unwrap();
    server.await.unwrap().unwrap();
}
