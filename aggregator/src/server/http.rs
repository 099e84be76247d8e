//! Admin HTTP server for health checks and metrics

use crate::metrics;
use crate::shutdown::{Shutdown, ShutdownState};
use hyper::service::{make_service_fn, service_fn};
use hyper::{Body, Method, Request, Response, Server, StatusCode};
use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::Arc;

/// Serve /healthz, /readyz and /metrics until shutdown is triggered.
pub async fn serve_admin(addr: SocketAddr, shutdown: Arc<Shutdown>) -> Result<(), hyper::Error> {
    let token = shutdown.token();
    let make_svc = make_service_fn(move |_| {
        let shutdown = shutdown.clone();
        async move {
            Ok::<_, Infallible>(service_fn(move |req: Request<Body>| {
                let state = shutdown.state();
                async move { Ok::<_, Infallible>(handle(&req, state)) }
            }))
        }
    });

    let server = Server::try_bind(&addr)?.serve(make_svc);
    tracing::info!("Admin HTTP server listening on {}", server.local_addr());
    server
        .with_graceful_shutdown(async move { token.cancelled().await })
        .await
}

fn handle(req: &Request<Body>, state: ShutdownState) -> Response<Body> {
    if req.method() != Method::GET {
        return text(StatusCode::METHOD_NOT_ALLOWED, "method not allowed\n");
    }
    let response = match req.uri().path() {
        "/healthz" => text(StatusCode::OK, "ok\n"),

        "/readyz" if state == ShutdownState::Running => text(StatusCode::OK, "ready\n"),
        "/readyz" => text(
            StatusCode::SERVICE_UNAVAILABLE,
            &format!("{}\n", state.as_str()),
        ),

        "/metrics" => {
            let mut resp = Response::new(Body::from(metrics::encode_metrics()));
            resp.headers_mut().insert(
                hyper::header::CONTENT_TYPE,
                hyper::header::HeaderValue::from_static("text/plain; version=0.0.4"),
            );
            resp
        }

        _ => text(StatusCode::NOT_FOUND, "not found\n"),
    };
    tracing::debug!(
        path = req.uri().path(),
        status = response.status().as_u16(),
        "Admin request"
    );
    response
}

fn text(status: StatusCode, body: &str) -> Response<Body> {
    let mut resp = Response::new(Body::from(body.to_string()));
    *resp.status_mut() = status;
    resp
}
