//! Hand-written unary service for server tests, shaped like tonic codegen.

use std::convert::Infallible;
use std::net::SocketAddr;
use std::task::{Context, Poll};
use std::time::Duration;

use tonic::body::Body;
use tonic::codec::ProstCodec;
use tonic::codegen::http::uri::PathAndQuery;
use tonic::codegen::http::{Request, Response};
use tonic::codegen::BoxFuture;
use tonic::server::NamedService;
use tonic::transport::{Channel, Endpoint};
use tonic::Status;
use tower::Service;

use crate::config::GrpcServerSettings;

pub(crate) const SAY: &str = "/kit.test.Echo/Say";

/// `kit.test.Echo/Say`: waits `delay`, then returns the request string.
#[derive(Clone)]
pub(crate) struct Echo {
    delay: Duration,
    limits: Option<GrpcServerSettings>,
}

impl Echo {
    pub(crate) fn slow(delay: Duration) -> Self {
        Self {
            delay,
            limits: None,
        }
    }

    pub(crate) fn limited(settings: GrpcServerSettings) -> Self {
        Self {
            delay: Duration::ZERO,
            limits: Some(settings),
        }
    }
}

impl NamedService for Echo {
    const NAME: &'static str = "kit.test.Echo";
}

impl Service<Request<Body>> for Echo {
    type Response = Response<Body>;
    type Error = Infallible;
    type Future = BoxFuture<Self::Response, Self::Error>;

    fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, req: Request<Body>) -> Self::Future {
        let delay = self.delay;
        let limits = self.limits.clone();

        Box::pin(async move {
            if req.uri().path() != SAY {
                return Ok(Status::unimplemented("").into_http());
            }

            let say = tower::service_fn(move |request: tonic::Request<String>| async move {
                tokio::time::sleep(delay).await;
                Ok::<_, Status>(tonic::Response::new(request.into_inner()))
            });

            let mut grpc = tonic::server::Grpc::new(ProstCodec::<String, String>::default());
            if let Some(limits) = limits {
                grpc = crate::with_message_limits!(grpc, limits);
            }
            Ok(grpc.unary(say, req).await)
        })
    }
}

pub(crate) fn channel(addr: SocketAddr) -> Channel {
    Endpoint::from_shared(format!("http://{addr}"))
        .unwrap()
        .connect_lazy()
}

/// Call `Say` with `text` through a plain client.
pub(crate) async fn say(channel: Channel, text: &str) -> Result<String, Status> {
    say_with(tonic::client::Grpc::new(channel), text).await
}

pub(crate) async fn say_with(
    mut grpc: tonic::client::Grpc<Channel>,
    text: &str,
) -> Result<String, Status> {
    grpc.ready()
        .await
        .map_err(|e| Status::unavailable(e.to_string()))?;
    grpc.unary::<String, String, _>(
        tonic::Request::new(text.to_string()),
        PathAndQuery::from_static(SAY),
        ProstCodec::default(),
    )
    .await
    .map(tonic::Response::into_inner)
}
