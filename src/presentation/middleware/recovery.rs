//! Panic Recovery Middleware
//!
//! Turns a panic inside a gRPC handler into an `INTERNAL` status instead of
//! tearing down the connection.

use std::any::Any;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::pin::Pin;
use std::task::{Context, Poll};

use futures::FutureExt;
use tonic::codegen::http::{Request, Response};
use tonic::Status;
use tower::{Layer, Service};
use tracing::error;

#[derive(Debug, Clone, Copy, Default)]
pub struct RecoveryLayer;

impl RecoveryLayer {
    pub fn new() -> Self {
        Self
    }
}

impl<S> Layer<S> for RecoveryLayer {
    type Service = RecoveryService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        RecoveryService { inner }
    }
}

#[derive(Debug, Clone)]
pub struct RecoveryService<S> {
    inner: S,
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

fn panic_response<B: Default>(method: &str, panic: Box<dyn Any + Send>) -> Response<B> {
    error!(
        method = %method,
        panic = %panic_message(panic.as_ref()),
        "Recovered from panic in gRPC handler"
    );
    Status::internal("internal server error").into_http()
}

impl<S, ReqBody, ResBody> Service<Request<ReqBody>> for RecoveryService<S>
where
    S: Service<Request<ReqBody>, Response = Response<ResBody>> + Clone + Send + 'static,
    S::Future: Send + 'static,
    ReqBody: Send + 'static,
    ResBody: Default + Send + 'static,
{
    type Response = Response<ResBody>;
    type Error = S::Error;
    type Future = Pin<Box<dyn Future<Output = Result<Self::Response, Self::Error>> + Send>>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, request: Request<ReqBody>) -> Self::Future {
        let method = request.uri().path().to_string();
        let clone = self.inner.clone();
        let mut inner = std::mem::replace(&mut self.inner, clone);

        Box::pin(async move {
            let future = match std::panic::catch_unwind(AssertUnwindSafe(|| inner.call(request))) {
                Ok(future) => future,
                Err(panic) => return Ok(panic_response(&method, panic)),
            };

            match AssertUnwindSafe(future).catch_unwind().await {
                Ok(result) => result,
                Err(panic) => Ok(panic_response(&method, panic)),
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::presentation::middleware::{grpc_code, grpc_message};
    use std::convert::Infallible;
    use tonic::body::Body;
    use tower::{service_fn, ServiceBuilder, ServiceExt};

    fn request() -> Request<Body> {
        Request::builder()
            .uri("/demo.Greeter/SayHello")
            .body(Body::empty())
            .unwrap()
    }

    #[tokio::test]
    async fn test_panic_becomes_internal() {
        let svc = ServiceBuilder::new()
            .layer(RecoveryLayer::new())
            .service(service_fn(|_req: Request<Body>| async move {
                if true {
                    panic!("boom");
                }
                Ok::<_, Infallible>(Response::new(Body::empty()))
            }));

        let response = svc.oneshot(request()).await.unwrap();
        assert_eq!(grpc_code(response.headers()), tonic::Code::Internal);
        assert_eq!(
            grpc_message(response.headers()).as_deref(),
            Some("internal server error")
        );
    }

    #[tokio::test]
    async fn test_passthrough() {
        let svc = RecoveryLayer::new().layer(service_fn(|_req: Request<Body>| async move {
            Ok::<_, Infallible>(Response::new(Body::empty()))
        }));

        let response = svc.oneshot(request()).await.unwrap();
        assert_eq!(grpc_code(response.headers()), tonic::Code::Ok);
    }

    #[test]
    fn test_panic_message() {
        let boxed: Box<dyn Any + Send> = Box::new("static str");
        assert_eq!(panic_message(boxed.as_ref()), "static str");
        let boxed: Box<dyn Any + Send> = Box::new(String::from("owned"));
        assert_eq!(panic_message(boxed.as_ref()), "owned");
        let boxed: Box<dyn Any + Send> = Box::new(42);
        assert_eq!(panic_message(boxed.as_ref()), "unknown panic");
    }
}
