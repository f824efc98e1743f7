//! Request Logging Middleware
//!
//! Logs every gRPC call with its method, request id and duration. The
//! client flavour also stamps outgoing calls with a fresh `request-id`.

use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};
use std::time::Instant;

use tonic::codegen::http::{HeaderValue, Request, Response};
use tower::{Layer, Service};
use tracing::{error, info, Instrument};

use super::{grpc_code, grpc_message};
use crate::shared::{generate_request_id, REQUEST_ID_HEADER};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Side {
    Server,
    Client,
}

#[derive(Debug, Clone, Copy)]
pub struct LoggingLayer {
    side: Side,
}

impl LoggingLayer {
    /// Log incoming calls.
    pub fn server() -> Self {
        Self { side: Side::Server }
    }

    /// Log outgoing calls, adding a `request-id` when the caller set none.
    pub fn client() -> Self {
        Self { side: Side::Client }
    }
}

impl Default for LoggingLayer {
    fn default() -> Self {
        Self::server()
    }
}

impl<S> Layer<S> for LoggingLayer {
    type Service = LoggingService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        LoggingService {
            inner,
            side: self.side,
        }
    }
}

#[derive(Debug, Clone)]
pub struct LoggingService<S> {
    inner: S,
    side: Side,
}

impl<S, ReqBody, ResBody> Service<Request<ReqBody>> for LoggingService<S>
where
    S: Service<Request<ReqBody>, Response = Response<ResBody>> + Clone + Send + 'static,
    S::Future: Send + 'static,
    S::Error: std::fmt::Display + Send + 'static,
    ReqBody: Send + 'static,
    ResBody: Send + 'static,
{
    type Response = Response<ResBody>;
    type Error = S::Error;
    type Future = Pin<Box<dyn Future<Output = Result<Self::Response, Self::Error>> + Send>>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, mut request: Request<ReqBody>) -> Self::Future {
        let side = self.side;
        let method = request.uri().path().to_string();

        if side == Side::Client && !request.headers().contains_key(REQUEST_ID_HEADER) {
            if let Ok(value) = HeaderValue::from_str(&generate_request_id()) {
                request.headers_mut().insert(REQUEST_ID_HEADER, value);
            }
        }

        let request_id = request
            .headers()
            .get(REQUEST_ID_HEADER)
            .and_then(|v| v.to_str().ok())
            .unwrap_or("unknown")
            .to_string();

        let clone = self.inner.clone();
        let mut inner = std::mem::replace(&mut self.inner, clone);

        let span = match side {
            Side::Server => {
                tracing::info_span!("grpc_server", method = %method, request_id = %request_id)
            }
            Side::Client => {
                tracing::info_span!("grpc_client", method = %method, request_id = %request_id)
            }
        };

        Box::pin(
            async move {
                let start = Instant::now();
                info!("gRPC request started");

                let result = inner.call(request).await;
                let duration = start.elapsed();

                match &result {
                    Ok(response) => {
                        let code = grpc_code(response.headers());
                        if code == tonic::Code::Ok {
                            info!(duration_ms = duration.as_millis() as u64, "gRPC request completed");
                        } else {
                            error!(
                                duration_ms = duration.as_millis() as u64,
                                code = ?code,
                                message = %grpc_message(response.headers()).unwrap_or_default(),
                                "gRPC request failed"
                            );
                        }
                    }
                    Err(e) => {
                        error!(
                            duration_ms = duration.as_millis() as u64,
                            error = %e,
                            "gRPC transport error"
                        );
                    }
                }

                result
            }
            .instrument(span),
        )
    }
}
