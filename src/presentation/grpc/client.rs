//! gRPC Client Manager
//!
//! Named client configurations with lazily created, cached channels.

use dashmap::DashMap;
use tonic::transport::{Certificate, Channel, ClientTlsConfig, Endpoint, Identity};
use tracing::info;

use super::server::read_pem;
use crate::config::{GrpcClientSettings, TlsSettings};
use crate::shared::{KitError, KitResult};

#[derive(Debug, Default)]
pub struct ClientManager {
    configs: DashMap<String, GrpcClientSettings>,
    channels: DashMap<String, Channel>,
}

/// Prefix a bare `host:port` target with the scheme matching `tls`.
pub fn normalize_target(target: &str, tls: bool) -> String {
    if target.contains("://") {
        target.to_string()
    } else if tls {
        format!("https://{}", target)
    } else {
        format!("http://{}", target)
    }
}

async fn load_client_tls(tls: &TlsSettings) -> KitResult<ClientTlsConfig> {
    if tls.insecure_skip_verify {
        return Err(KitError::Tls(
            "insecure_skip_verify is not supported; server certificates are always verified"
                .into(),
        ));
    }

    let mut config = ClientTlsConfig::new();

    if !tls.ca_file.is_empty() {
        let ca = read_pem("ca", &tls.ca_file).await?;
        config = config.ca_certificate(Certificate::from_pem(ca));
    }
    if !tls.cert_file.is_empty() && !tls.key_file.is_empty() {
        let cert = read_pem("cert", &tls.cert_file).await?;
        let key = read_pem("key", &tls.key_file).await?;
        config = config.identity(Identity::from_pem(cert, key));
    }
    if !tls.server_name.is_empty() {
        config = config.domain_name(tls.server_name.clone());
    }
    Ok(config)
}

/// Build the endpoint for a client configuration without connecting.
pub async fn build_endpoint(settings: &GrpcClientSettings) -> KitResult<Endpoint> {
    let tls = settings.tls.as_ref().filter(|t| t.enabled);
    let uri = normalize_target(&settings.target, tls.is_some());
    let keepalive = &settings.keepalive;

    let mut endpoint = Endpoint::from_shared(uri)?
        .connect_timeout(settings.connection_timeout())
        .http2_keep_alive_interval(keepalive.time())
        .keep_alive_timeout(keepalive.timeout())
        .keep_alive_while_idle(keepalive.permit_without_stream);

    if let Some(tls) = tls {
        endpoint = endpoint.tls_config(load_client_tls(tls).await?)?;
    }

    Ok(endpoint)
}

impl ClientManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store (or replace) the configuration for `name`. A replaced
    /// configuration takes effect on the next [`ClientManager::client`] call.
    pub fn add_client(&self, name: impl Into<String>, settings: GrpcClientSettings) {
        let name = name.into();
        info!(name = %name, target = %settings.target, "Added gRPC client config");
        self.channels.remove(&name);
        self.configs.insert(name, settings);
    }

    /// The channel for `name`, created on first use.
    ///
    /// Channels connect lazily, so an unreachable target surfaces on the
    /// first call rather than here.
    pub async fn client(&self, name: &str) -> KitResult<Channel> {
        if let Some(channel) = self.channels.get(name) {
            return Ok(channel.clone());
        }

        let settings = self
            .configs
            .get(name)
            .map(|entry| entry.value().clone())
            .ok_or_else(|| KitError::NotFound(format!("client config not found: {}", name)))?;

        let channel = build_endpoint(&settings).await?.connect_lazy();
        info!(name = %name, target = %settings.target, "Created gRPC client channel");

        Ok(self
            .channels
            .entry(name.to_string())
            .or_insert(channel)
            .value()
            .clone())
    }

    /// Drop the cached channel for `name`; its configuration stays.
    pub fn close_client(&self, name: &str) -> KitResult<()> {
        match self.channels.remove(name) {
            Some(_) => {
                info!(name = %name, "Closed gRPC client channel");
                Ok(())
            }
            None => Err(KitError::NotFound(format!("client not found: {}", name))),
        }
    }

    /// Forget a configuration, closing its channel if one is open.
    pub fn remove_config(&self, name: &str) -> bool {
        self.channels.remove(name);
        self.configs.remove(name).is_some()
    }

    /// Drop every channel and configuration.
    pub fn close_all(&self) {
        let closed = self.channels.len();
        self.channels.clear();
        self.configs.clear();
        info!(closed, "Closed all gRPC clients");
    }

    /// Configured client names, sorted.
    pub fn list_clients(&self) -> Vec<String> {
        let mut names: Vec<String> = self.configs.iter().map(|e| e.key().clone()).collect();
        names.sort();
        names
    }

    pub fn is_connected(&self, name: &str) -> bool {
        self.channels.contains_key(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_normalize_target() {
        assert_eq!(normalize_target("localhost:50051", false), "http://localhost:50051");
        assert_eq!(normalize_target("localhost:50051", true), "https://localhost:50051");
        assert_eq!(normalize_target("http://svc:80", true), "http://svc:80");
    }

    #[tokio::test]
    async fn test_unknown_client() {
        let manager = ClientManager::new();
        let err = manager.client("users").await.unwrap_err();
        assert_eq!(err.to_string(), "Not found: client config not found: users");

        let err = manager.close_client("users").unwrap_err();
        assert_eq!(err.to_string(), "Not found: client not found: users");
    }

    #[tokio::test]
    async fn test_lazy_channel_is_cached() {
        let manager = ClientManager::new();
        manager.add_client("users", GrpcClientSettings::with_target("127.0.0.1:1"));
        assert!(!manager.is_connected("users"));

        manager.client("users").await.unwrap();
        assert!(manager.is_connected("users"));

        manager.close_client("users").unwrap();
        assert!(!manager.is_connected("users"));
        assert_eq!(manager.list_clients(), vec!["users".to_string()]);
    }

    #[tokio::test]
    async fn test_list_and_close_all() {
        let manager = ClientManager::new();
        manager.add_client("orders", GrpcClientSettings::with_target("127.0.0.1:2"));
        manager.add_client("billing", GrpcClientSettings::with_target("127.0.0.1:3"));
        manager.client("orders").await.unwrap();

        assert_eq!(manager.list_clients(), vec!["billing", "orders"]);

        manager.close_all();
        assert!(manager.list_clients().is_empty());
        assert!(!manager.is_connected("orders"));
    }

    #[tokio::test]
    async fn test_insecure_skip_verify_is_refused() {
        let mut settings = GrpcClientSettings::with_target("billing:443");
        settings.tls = Some(TlsSettings {
            enabled: true,
            insecure_skip_verify: true,
            ..Default::default()
        });

        let err = build_endpoint(&settings).await.unwrap_err();
        assert!(matches!(err, KitError::Tls(_)));
    }

    #[tokio::test]
    async fn test_invalid_target() {
        let manager = ClientManager::new();
        manager.add_client("bad", GrpcClientSettings::with_target("http://bad host"));
        assert!(manager.client("bad").await.is_err());
    }
}
