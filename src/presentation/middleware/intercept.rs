//! Tower adapter for tonic interceptors.
//!
//! Runs a [`tonic::service::Interceptor`] against the request metadata and
//! extensions without touching the response body type, so interceptors
//! compose with the other layers of the stack.

use std::task::{Context, Poll};

use futures::future::{self, Either, Ready};
use tonic::codegen::http::{Request, Response};
use tonic::metadata::MetadataMap;
use tonic::service::Interceptor;
use tower::{Layer, Service};

#[derive(Debug, Clone)]
pub struct InterceptLayer<I> {
    interceptor: I,
}

impl<I> InterceptLayer<I> {
    pub fn new(interceptor: I) -> Self {
        Self { interceptor }
    }
}

impl<S, I: Clone> Layer<S> for InterceptLayer<I> {
    type Service = InterceptService<S, I>;

    fn layer(&self, inner: S) -> Self::Service {
        InterceptService {
            inner,
            interceptor: self.interceptor.clone(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct InterceptService<S, I> {
    inner: S,
    interceptor: I,
}

impl<S, I, ReqBody, ResBody> Service<Request<ReqBody>> for InterceptService<S, I>
where
    S: Service<Request<ReqBody>, Response = Response<ResBody>>,
    I: Interceptor,
    ResBody: Default,
{
    type Response = Response<ResBody>;
    type Error = S::Error;
    type Future = Either<S::Future, Ready<Result<Self::Response, Self::Error>>>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, request: Request<ReqBody>) -> Self::Future {
        let (mut parts, body) = request.into_parts();
        let headers = std::mem::take(&mut parts.headers);
        let extensions = std::mem::take(&mut parts.extensions);

        let metadata = MetadataMap::from_headers(headers);
        let request = tonic::Request::from_parts(metadata, extensions, ());

        match self.interceptor.call(request) {
            Ok(request) => {
                let (metadata, extensions, ()) = request.into_parts();
                parts.headers = metadata.into_headers();
                parts.extensions = extensions;
                Either::Left(self.inner.call(Request::from_parts(parts, body)))
            }
            Err(status) => Either::Right(future::ok(status.into_http())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::presentation::middleware::grpc_code;
    use std::convert::Infallible;
    use tonic::body::Body;
    use tonic::metadata::MetadataValue;
    use tonic::Status;
    use tower::{service_fn, ServiceExt};

    #[derive(Clone)]
    struct RequireToken;

    impl Interceptor for RequireToken {
        fn call(&mut self, mut request: tonic::Request<()>) -> Result<tonic::Request<()>, Status> {
            if request.metadata().get("x-token").is_none() {
                return Err(Status::unauthenticated("missing token"));
            }
            request
                .metadata_mut()
                .insert("x-checked", MetadataValue::from_static("yes"));
            request.extensions_mut().insert(7u32);
            Ok(request)
        }
    }

    async fn echo(req: Request<Body>) -> Result<Response<Body>, Infallible> {
        let mut response = Response::new(Body::empty());
        if let Some(value) = req.headers().get("x-checked") {
            response.headers_mut().insert("x-checked", value.clone());
        }
        if let Some(n) = req.extensions().get::<u32>() {
            response.extensions_mut().insert(*n);
        }
        if let Some(peer) = req.extensions().get::<&'static str>() {
            response.extensions_mut().insert(*peer);
        }
        Ok(response)
    }

    #[tokio::test]
    async fn test_metadata_and_extensions_reach_inner_service() {
        let svc = InterceptLayer::new(RequireToken).layer(service_fn(echo));
        let request = Request::builder()
            .uri("/demo.Greeter/SayHello")
            .header("x-token", "abc")
            .body(Body::empty())
            .unwrap();

        let response = svc.oneshot(request).await.unwrap();
        assert_eq!(response.headers().get("x-checked").unwrap(), "yes");
        assert_eq!(response.extensions().get::<u32>(), Some(&7));
    }

    #[tokio::test]
    async fn test_rejection_short_circuits() {
        let svc = InterceptLayer::new(RequireToken).layer(service_fn(echo));
        let request = Request::builder()
            .uri("/demo.Greeter/SayHello")
            .body(Body::empty())
            .unwrap();

        let response = svc.oneshot(request).await.unwrap();
        assert_eq!(grpc_code(response.headers()), tonic::Code::Unauthenticated);
    }

    #[tokio::test]
    async fn test_existing_extensions_survive() {
        let svc = InterceptLayer::new(RequireToken).layer(service_fn(echo));
        let mut request = Request::builder()
            .uri("/demo.Greeter/SayHello")
            .header("x-token", "abc")
            .body(Body::empty())
            .unwrap();
        request.extensions_mut().insert("10.0.0.1:5000");

        let response = svc.oneshot(request).await.unwrap();
        assert_eq!(response.extensions().get::<&'static str>(), Some(&"10.0.0.1:5000"));
        assert_eq!(response.extensions().get::<u32>(), Some(&7));
    }
}
