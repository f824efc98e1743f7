//! gRPC Middleware
//!
//! Tower layers wrapped around the gRPC server (and optionally clients).
//! [`InterceptorOptions`] assembles them in a fixed order:
//!
//! ```text
//! recovery -> logging -> metrics -> rate limit -> language -> custom
//! ```
//!
//! Every layer passes the inner service's error type through and leaves the
//! response body type alone, so any subset of them composes.

pub mod intercept;
pub mod language;
pub mod logging;
pub mod metrics;
pub mod rate_limit;
pub mod recovery;

use std::sync::Arc;

use tonic::codegen::http::HeaderMap;
use tonic::service::Interceptor;
use tonic::{Code, Status};
use tower::layer::util::{Identity, Stack};
use tower::util::Either;
use tower::ServiceBuilder;

use crate::infrastructure::metrics::MetricsCollector;

pub use intercept::{InterceptLayer, InterceptService};
pub use language::{
    language_from_extensions, request_language, AcceptLanguageInterceptor, LanguageInterceptor,
};
pub use logging::{LoggingLayer, LoggingService};
pub use metrics::{MetricsLayer, MetricsService};
pub use rate_limit::{
    combined_key, method_key, never_skip, peer_ip_key, skip_health_checks, skip_methods, user_key,
    CallInfo, KeyFn, RateLimitLayer, RateLimitService, SkipFn,
};
pub use recovery::{RecoveryLayer, RecoveryService};

/// The gRPC status code carried by response headers; `Ok` when absent.
pub fn grpc_code(headers: &HeaderMap) -> Code {
    headers
        .get("grpc-status")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.parse::<i32>().ok())
        .map(Code::from_i32)
        .unwrap_or(Code::Ok)
}

/// The decoded `grpc-message` of a response, if any.
pub fn grpc_message(headers: &HeaderMap) -> Option<String> {
    Status::from_header_map(headers)
        .map(|status| status.message().to_string())
        .filter(|message| !message.is_empty())
}

/// A user-supplied interceptor function
pub type InterceptorFn =
    Arc<dyn Fn(tonic::Request<()>) -> Result<tonic::Request<()>, Status> + Send + Sync>;

/// Runs custom interceptors in registration order, stopping at the first error.
#[derive(Clone, Default)]
pub struct ChainedInterceptor {
    interceptors: Arc<[InterceptorFn]>,
}

impl ChainedInterceptor {
    pub fn new(interceptors: Vec<InterceptorFn>) -> Self {
        Self {
            interceptors: interceptors.into(),
        }
    }

    pub fn len(&self) -> usize {
        self.interceptors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.interceptors.is_empty()
    }
}

impl std::fmt::Debug for ChainedInterceptor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChainedInterceptor")
            .field("len", &self.interceptors.len())
            .finish()
    }
}

impl Interceptor for ChainedInterceptor {
    fn call(&mut self, request: tonic::Request<()>) -> Result<tonic::Request<()>, Status> {
        self.interceptors
            .iter()
            .try_fold(request, |request, interceptor| interceptor(request))
    }
}

/// Layer stack produced by [`InterceptorOptions::layer`]
pub type InterceptorStack = Stack<
    Either<InterceptLayer<ChainedInterceptor>, Identity>,
    Stack<
        Either<InterceptLayer<LanguageInterceptor>, Identity>,
        Stack<
            Either<RateLimitLayer, Identity>,
            Stack<
                Either<MetricsLayer, Identity>,
                Stack<
                    Either<LoggingLayer, Identity>,
                    Stack<Either<RecoveryLayer, Identity>, Identity>,
                >,
            >,
        >,
    >,
>;

/// Selects which middleware wrap the gRPC server.
#[derive(Clone, Default)]
pub struct InterceptorOptions {
    recovery: bool,
    logging: bool,
    metrics: Option<Arc<dyn MetricsCollector>>,
    rate_limit: Option<RateLimitLayer>,
    language: Option<LanguageInterceptor>,
    custom: Vec<InterceptorFn>,
}

impl std::fmt::Debug for InterceptorOptions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InterceptorOptions")
            .field("recovery", &self.recovery)
            .field("logging", &self.logging)
            .field("metrics", &self.metrics.is_some())
            .field("rate_limit", &self.rate_limit.is_some())
            .field("language", &self.language)
            .field("custom", &self.custom.len())
            .finish()
    }
}

impl InterceptorOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_recovery(mut self) -> Self {
        self.recovery = true;
        self
    }

    pub fn with_logging(mut self) -> Self {
        self.logging = true;
        self
    }

    pub fn with_metrics(mut self, collector: Arc<dyn MetricsCollector>) -> Self {
        self.metrics = Some(collector);
        self
    }

    pub fn with_rate_limit(mut self, layer: RateLimitLayer) -> Self {
        self.rate_limit = Some(layer);
        self
    }

    pub fn with_language(mut self, interceptor: LanguageInterceptor) -> Self {
        self.language = Some(interceptor);
        self
    }

    /// Append a custom interceptor; custom interceptors run last, in the
    /// order they were added.
    pub fn with_interceptor<F>(mut self, interceptor: F) -> Self
    where
        F: Fn(tonic::Request<()>) -> Result<tonic::Request<()>, Status> + Send + Sync + 'static,
    {
        self.custom.push(Arc::new(interceptor));
        self
    }

    /// Build the layer stack. Disabled entries become identity layers.
    pub fn layer(&self) -> InterceptorStack {
        let custom = (!self.custom.is_empty())
            .then(|| InterceptLayer::new(ChainedInterceptor::new(self.custom.clone())));

        ServiceBuilder::new()
            .option_layer(self.recovery.then(RecoveryLayer::new))
            .option_layer(self.logging.then(LoggingLayer::server))
            .option_layer(self.metrics.clone().map(MetricsLayer::new))
            .option_layer(self.rate_limit.clone())
            .option_layer(self.language.clone().map(InterceptLayer::new))
            .option_layer(custom)
            .into_inner()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::metrics::PrometheusMetrics;
    use crate::infrastructure::ratelimit::MemoryRateLimiter;
    use crate::i18n::Language;
    use std::convert::Infallible;
    use std::time::Duration;
    use tonic::body::Body;
    use tonic::codegen::http::{HeaderValue, Request, Response};
    use tower::{service_fn, Layer, ServiceExt};

    #[test]
    fn test_grpc_code_parsing() {
        let mut headers = HeaderMap::new();
        assert_eq!(grpc_code(&headers), Code::Ok);

        headers.insert("grpc-status", HeaderValue::from_static("5"));
        assert_eq!(grpc_code(&headers), Code::NotFound);

        headers.insert("grpc-status", HeaderValue::from_static("garbage"));
        assert_eq!(grpc_code(&headers), Code::Ok);
    }

    #[test]
    fn test_grpc_message() {
        let mut headers = HeaderMap::new();
        assert_eq!(grpc_message(&headers), None);
        headers.insert("grpc-status", HeaderValue::from_static("13"));
        headers.insert("grpc-message", HeaderValue::from_static("boom"));
        assert_eq!(grpc_message(&headers).as_deref(), Some("boom"));

        let status = Status::resource_exhausted("rate limit exceeded for key: ip:10.0.0.1");
        let response = status.into_http::<Body>();
        assert_ne!(
            response.headers().get("grpc-message").unwrap(),
            "rate limit exceeded for key: ip:10.0.0.1"
        );
        assert_eq!(
            grpc_message(response.headers()).as_deref(),
            Some("rate limit exceeded for key: ip:10.0.0.1")
        );
    }

    fn interceptor<F>(f: F) -> InterceptorFn
    where
        F: Fn(tonic::Request<()>) -> Result<tonic::Request<()>, Status> + Send + Sync + 'static,
    {
        Arc::new(f)
    }

    #[test]
    fn test_chained_interceptor_order_and_short_circuit() {
        let mut chain = ChainedInterceptor::new(vec![
            interceptor(|mut req| {
                req.extensions_mut().insert(vec!["first"]);
                Ok(req)
            }),
            interceptor(|mut req| {
                if let Some(seen) = req.extensions_mut().get_mut::<Vec<&'static str>>() {
                    seen.push("second");
                }
                Ok(req)
            }),
        ]);

        let request = chain.call(tonic::Request::new(())).unwrap();
        assert_eq!(
            request.extensions().get::<Vec<&'static str>>(),
            Some(&vec!["first", "second"])
        );

        let mut failing = ChainedInterceptor::new(vec![
            interceptor(|_req| Err(Status::permission_denied("no"))),
            interceptor(|_req| unreachable!("chain stops at the first error")),
        ]);
        let err = failing.call(tonic::Request::new(())).unwrap_err();
        assert_eq!(err.code(), Code::PermissionDenied);
    }

    async fn reply_language(req: Request<Body>) -> Result<Response<Body>, Infallible> {
        let language = req.extensions().get::<Language>().copied().unwrap_or_default();
        let mut response = Response::new(Body::empty());
        response
            .headers_mut()
            .insert("x-language", HeaderValue::from_static(language.code()));
        Ok(response)
    }

    fn request(lang: &'static str) -> Request<Body> {
        Request::builder()
            .uri("/users.Users/Get")
            .header("accept-language", lang)
            .header("user-id", "u1")
            .body(Body::empty())
            .unwrap()
    }

    #[tokio::test]
    async fn test_empty_options_are_transparent() {
        let svc = InterceptorOptions::new()
            .layer()
            .layer(service_fn(reply_language));

        let response = svc.oneshot(request("ja")).await.unwrap();
        assert_eq!(grpc_code(response.headers()), Code::Ok);
        assert_eq!(response.headers().get("x-language").unwrap(), "en");
    }

    #[tokio::test]
    async fn test_full_stack() {
        let metrics = Arc::new(PrometheusMetrics::new("stack").unwrap());
        let limiter = Arc::new(MemoryRateLimiter::new(2, Duration::from_secs(60)));

        let options = InterceptorOptions::new()
            .with_recovery()
            .with_logging()
            .with_metrics(metrics.clone())
            .with_rate_limit(RateLimitLayer::new(limiter).with_key_fn(user_key))
            .with_language(LanguageInterceptor::new("accept-language", Language::En))
            .with_interceptor(|req| {
                if req.metadata().get("user-id").is_some() {
                    Ok(req)
                } else {
                    Err(Status::unauthenticated("missing user-id"))
                }
            });
        let svc = options.layer().layer(service_fn(reply_language));

        let response = svc.clone().oneshot(request("ko")).await.unwrap();
        assert_eq!(response.headers().get("x-language").unwrap(), "ko");

        let response = svc.clone().oneshot(request("zh")).await.unwrap();
        assert_eq!(response.headers().get("x-language").unwrap(), "zh");

        let response = svc.oneshot(request("ja")).await.unwrap();
        assert_eq!(grpc_code(response.headers()), Code::ResourceExhausted);

        let text = metrics.gather();
        assert!(text.contains(
            r#"stack_grpc_requests_total{method="/users.Users/Get",status="success"} 2"#
        ));
        assert!(text.contains(
            r#"stack_grpc_requests_total{method="/users.Users/Get",status="error"} 1"#
        ));
    }

    #[tokio::test]
    async fn test_custom_interceptor_rejects() {
        let svc = InterceptorOptions::new()
            .with_interceptor(|_req| Err(Status::unauthenticated("nope")))
            .layer()
            .layer(service_fn(reply_language));

        let response = svc.oneshot(request("en")).await.unwrap();
        assert_eq!(grpc_code(response.headers()), Code::Unauthenticated);
    }
}
