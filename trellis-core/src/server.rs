// HTTP server adapter

use crate::{Application, Error, Request, Response};
use bytes::Bytes;
use http_body_util::{BodyExt, Full};
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{StatusCode, body::Incoming as IncomingBody};
use hyper_util::rt::TokioIo;
use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use trellis_log::{debug, error, info};

const INTERNAL_ERROR_BODY: &str = "Internal Server Error";

/// Serve `app` on `addr` until the process ends.
pub async fn serve(app: Arc<Application>, addr: SocketAddr) -> Result<(), Error> {
    let listener = TcpListener::bind(addr).await?;
    serve_listener(app, listener, std::future::pending()).await
}

/// Serve `app` on an already bound listener until `shutdown` completes.
///
/// Each request runs on a fresh kernel on the blocking pool, so requests
/// share nothing but the [`Application`].
pub async fn serve_listener<F>(app: Arc<Application>, listener: TcpListener, shutdown: F) -> Result<(), Error>
where
    F: Future<Output = ()>,
{
    info!(addr = %listener.local_addr()?, "Server listening");
    tokio::pin!(shutdown);

    loop {
        let (stream, peer) = tokio::select! {
            accepted = listener.accept() => accepted?,
            _ = &mut shutdown => {
                info!("Server shutting down");
                return Ok(());
            }
        };
        let io = TokioIo::new(stream);
        let app = app.clone();

        tokio::spawn(async move {
            let service = service_fn(move |req: hyper::Request<IncomingBody>| {
                let app = app.clone();
                async move { handle_request(req, app).await }
            });

            if let Err(err) = http1::Builder::new().serve_connection(io, service).await {
                debug!(peer = %peer, error = %err, "Error serving connection");
            }
        });
    }
}

async fn handle_request(
    req: hyper::Request<IncomingBody>,
    app: Arc<Application>,
) -> Result<hyper::Response<Full<Bytes>>, hyper::Error> {
    let uri = req
        .uri()
        .path_and_query()
        .map(|pq| pq.as_str().to_string())
        .unwrap_or_else(|| req.uri().path().to_string());
    let mut request = Request::new(req.method().as_str(), uri);

    for (name, value) in req.headers() {
        if let Ok(value) = value.to_str() {
            request = request.with_header(name.as_str(), value);
        }
    }

    let body = req.collect().await?.to_bytes();
    request.body = body.to_vec();

    let outcome = tokio::task::spawn_blocking(move || app.handle(request)).await;
    let response = match outcome {
        Ok(Ok(response)) => response,
        Ok(Err(err)) => {
            error!(error = %err, status = err.status_code(), "Unhandled error in request");
            internal_error()
        }
        Err(err) => {
            error!(error = %err, "Request task failed");
            internal_error()
        }
    };

    Ok(into_hyper(response))
}

fn internal_error() -> Response {
    Response::new(500)
        .with_header("Content-Type", "text/plain; charset=utf-8")
        .with_body(INTERNAL_ERROR_BODY)
}

fn into_hyper(response: Response) -> hyper::Response<Full<Bytes>> {
    let mut builder = hyper::Response::builder().status(response.status);
    for (key, value) in &response.headers {
        builder = builder.header(key.as_str(), value.as_str());
    }

    builder
        .body(Full::new(Bytes::from(response.body)))
        .unwrap_or_else(|err| {
            error!(error = %err, "Invalid response from kernel");
            let mut fallback = hyper::Response::new(Full::new(Bytes::from_static(
                INTERNAL_ERROR_BODY.as_bytes(),
            )));
            *fallback.status_mut() = StatusCode::INTERNAL_SERVER_ERROR;
            fallback
        })
}
