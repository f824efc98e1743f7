//! Rate Limiting Middleware
//!
//! Applies a [`RateLimiter`] to incoming gRPC calls. A key function picks the
//! bucket a call counts against and a skip function exempts calls entirely.
//! Denied calls get `RESOURCE_EXHAUSTED`; limiter failures let the call
//! through.

use std::collections::HashSet;
use std::future::Future;
use std::net::SocketAddr;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use tonic::codegen::http::{HeaderMap, Request, Response};
use tonic::transport::server::{TcpConnectInfo, TlsConnectInfo};
use tonic::Status;
use tower::{Layer, Service};
use tracing::{error, warn};

use crate::infrastructure::ratelimit::RateLimiter;

/// What key and skip functions can see of a call.
#[derive(Debug, Clone, Copy)]
pub struct CallInfo<'a> {
    /// Full method path, e.g. `/users.Users/Get`
    pub method: &'a str,
    pub headers: &'a HeaderMap,
    pub remote_addr: Option<SocketAddr>,
}

impl<'a> CallInfo<'a> {
    pub fn header(&self, name: &str) -> Option<&'a str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }
}

pub type KeyFn = Arc<dyn Fn(&CallInfo<'_>) -> String + Send + Sync>;
pub type SkipFn = Arc<dyn Fn(&CallInfo<'_>) -> bool + Send + Sync>;

// ============================================================================
// Key Functions
// ============================================================================

/// Client address: the peer, then `x-forwarded-for` (first hop), then
/// `x-real-ip`, else `"unknown"`.
pub fn peer_ip_key(info: &CallInfo<'_>) -> String {
    if let Some(addr) = info.remote_addr {
        return format!("ip:{}", addr.ip());
    }

    if let Some(forwarded_for) = info.header("x-forwarded-for") {
        if let Some(first_ip) = forwarded_for.split(',').next() {
            let ip = first_ip.trim();
            if !ip.is_empty() {
                return format!("ip:{}", ip);
            }
        }
    }

    if let Some(real_ip) = info.header("x-real-ip") {
        return format!("ip:{}", real_ip.trim());
    }

    "unknown".to_string()
}

/// Caller identity: `user-id`, then the first 32 characters of
/// `authorization`, else the client address.
pub fn user_key(info: &CallInfo<'_>) -> String {
    if let Some(user_id) = info.header("user-id") {
        return format!("user:{}", user_id);
    }

    if let Some(authorization) = info.header("authorization") {
        let token: String = authorization.chars().take(32).collect();
        return format!("token:{}", token);
    }

    peer_ip_key(info)
}

pub fn method_key(info: &CallInfo<'_>) -> String {
    format!("method:{}", info.method)
}

/// Join the keys of several functions with `:`.
pub fn combined_key(fns: Vec<KeyFn>) -> KeyFn {
    Arc::new(move |info| {
        fns.iter()
            .map(|f| f(info))
            .collect::<Vec<_>>()
            .join(":")
    })
}

// ============================================================================
// Skip Functions
// ============================================================================

pub fn never_skip(_info: &CallInfo<'_>) -> bool {
    false
}

/// Exempt health checks (any method containing `Health`).
pub fn skip_health_checks(info: &CallInfo<'_>) -> bool {
    info.method.contains("Health")
}

/// Exempt the listed full method paths.
pub fn skip_methods<I, M>(methods: I) -> SkipFn
where
    I: IntoIterator<Item = M>,
    M: Into<String>,
{
    let methods: HashSet<String> = methods.into_iter().map(Into::into).collect();
    Arc::new(move |info| methods.contains(info.method))
}

// ============================================================================
// Layer
// ============================================================================

#[derive(Clone)]
pub struct RateLimitLayer {
    limiter: Arc<dyn RateLimiter>,
    key_fn: KeyFn,
    skip_fn: SkipFn,
}

impl std::fmt::Debug for RateLimitLayer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RateLimitLayer")
            .field("limiter", &self.limiter)
            .finish_non_exhaustive()
    }
}

impl RateLimitLayer {
    /// Limit by client address, skipping nothing.
    pub fn new(limiter: Arc<dyn RateLimiter>) -> Self {
        Self {
            limiter,
            key_fn: Arc::new(peer_ip_key),
            skip_fn: Arc::new(never_skip),
        }
    }

    pub fn with_key_fn<F>(mut self, key_fn: F) -> Self
    where
        F: Fn(&CallInfo<'_>) -> String + Send + Sync + 'static,
    {
        self.key_fn = Arc::new(key_fn);
        self
    }

    pub fn with_skip_fn<F>(mut self, skip_fn: F) -> Self
    where
        F: Fn(&CallInfo<'_>) -> bool + Send + Sync + 'static,
    {
        self.skip_fn = Arc::new(skip_fn);
        self
    }
}

impl<S> Layer<S> for RateLimitLayer {
    type Service = RateLimitService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        RateLimitService {
            inner,
            layer: self.clone(),
        }
    }
}

#[derive(Clone)]
pub struct RateLimitService<S> {
    inner: S,
    layer: RateLimitLayer,
}

fn remote_addr<B>(request: &Request<B>) -> Option<SocketAddr> {
    let extensions = request.extensions();
    extensions
        .get::<TcpConnectInfo>()
        .and_then(|info| info.remote_addr())
        .or_else(|| {
            extensions
                .get::<TlsConnectInfo<TcpConnectInfo>>()
                .and_then(|info| info.get_ref().remote_addr())
        })
}

impl<S, ReqBody, ResBody> Service<Request<ReqBody>> for RateLimitService<S>
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
        let clone = self.inner.clone();
        let mut inner = std::mem::replace(&mut self.inner, clone);

        let info = CallInfo {
            method: request.uri().path(),
            headers: request.headers(),
            remote_addr: remote_addr(&request),
        };

        if (self.layer.skip_fn)(&info) {
            return Box::pin(inner.call(request));
        }

        let key = (self.layer.key_fn)(&info);
        let limiter = self.layer.limiter.clone();

        Box::pin(async move {
            match limiter.allow(&key).await {
                Ok(true) => inner.call(request).await,
                Ok(false) => {
                    warn!(key = %key, method = %request.uri().path(), "Rate limit exceeded");
                    let status =
                        Status::resource_exhausted(format!("rate limit exceeded for key: {}", key));
                    Ok(status.into_http())
                }
                Err(e) => {
                    error!(key = %key, error = %e, "Rate limiter error, allowing request");
                    inner.call(request).await
                }
            }
        })
    }
}
