// src/server/handler.rs
use hyper::header::{HeaderValue, CONTENT_TYPE};
use hyper::{Body, Request, Response, StatusCode};
use std::convert::Infallible;
use std::sync::Arc;
use tower::Service;

use crate::metrics::MetricsRegistry;

const TEXT_FORMAT: &str = "text/plain; version=0.0.4";

/// Serves the telemetry path and a small landing page on `/`.
#[derive(Clone)]
pub struct MetricsHandler {
    registry: Arc<MetricsRegistry>,
    metrics_path: Arc<str>,
}

impl MetricsHandler {
    pub fn new(registry: Arc<MetricsRegistry>, metrics_path: &str) -> Self {
        Self {
            registry,
            metrics_path: Arc::from(metrics_path),
        }
    }

    pub fn respond(&self, req: &Request<Body>) -> Response<Body> {
        let path = req.uri().path();
        if path == &*self.metrics_path {
            self.metrics()
        } else if path == "/" {
            self.landing_page()
        } else {
            text_response(StatusCode::NOT_FOUND, "Not Found")
        }
    }

    fn metrics(&self) -> Response<Body> {
        match self.registry.gather() {
            Ok(buffer) => {
                let mut response = Response::new(Body::from(buffer));
                response
                    .headers_mut()
                    .insert(CONTENT_TYPE, HeaderValue::from_static(TEXT_FORMAT));
                response
            }
            Err(e) => {
                tracing::error!(%e, "failed to encode metrics");
                text_response(StatusCode::INTERNAL_SERVER_ERROR, "Failed to encode metrics")
            }
        }
    }

    fn landing_page(&self) -> Response<Body> {
        let html = format!(
            "<html>\n\
             <head><title>Varnishbackend Exporter</title></head>\n\
             <body>\n\
             <h1>Varnishbackend Exporter</h1>\n\
             <p><a href='{}'>Metrics</a></p>\n\
             </body>\n\
             </html>\n",
            self.metrics_path
        );
        let mut response = Response::new(Body::from(html));
        response
            .headers_mut()
            .insert(CONTENT_TYPE, HeaderValue::from_static("text/html; charset=utf-8"));
        response
    }
}

fn text_response(status: StatusCode, message: &'static str) -> Response<Body> {
    let mut response = Response::new(Body::from(message));
    *response.status_mut() = status;
    response
}

impl Service<Request<Body>> for MetricsHandler {
    type Response = Response<Body>;
    type Error = Infallible;
    type Future = futures::future::BoxFuture<'static, Result<Self::Response, Self::Error>>;

    fn poll_ready(
        &mut self,
        _cx: &mut std::task::Context<'_>,
    ) -> std::task::Poll<Result<(), Self::Error>> {
        std::task::Poll::Ready(Ok(()))
    }

    fn call(&mut self, req: Request<Body>) -> Self::Future {
        let handler = self.clone();
        Box::pin(async move { Ok(handler.respond(&req)) })
    }
}
