//! Connection lifecycle.
//!
//! [`ConnectionManager`] owns the one [`Identity`] and the one live
//! [`Connection`] shared by every component of an agent. The connection is
//! established lazily on first use, reused afterwards, dropped when a
//! transport failure is observed, and re-established on the next call.

use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use alloy::primitives::Address;
use async_trait::async_trait;
use chzkit_core::{AgentConfig, AgentError, Result};
use chzkit_signer::Identity;
use tokio::sync::{Mutex, MutexGuard};
use tracing::{debug, info, warn};

use crate::client::{ChainClient, RpcChainClient};

/// Endpoint settings used to establish a connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionSettings {
    pub rpc_url: String,
    pub ws_url: Option<String>,
    pub expected_chain_id: u64,
    pub strict_chain_id: bool,
    /// Filter polling interval for log streams without a WebSocket.
    pub poll_interval: Duration,
}

impl ConnectionSettings {
    pub fn new(rpc_url: impl Into<String>, expected_chain_id: u64) -> Self {
        Self {
            rpc_url: rpc_url.into(),
            ws_url: None,
            expected_chain_id,
            strict_chain_id: false,
            poll_interval: Duration::from_secs(1),
        }
    }
}

impl From<&AgentConfig> for ConnectionSettings {
    fn from(config: &AgentConfig) -> Self {
        Self {
            rpc_url: config.active_rpc_url().to_string(),
            ws_url: config.ws_url.clone(),
            expected_chain_id: config.expected_chain_id,
            strict_chain_id: config.strict_chain_id,
            poll_interval: config.poll_interval,
        }
    }
}

/// Produces chain clients for a set of endpoint settings.
#[async_trait]
pub trait Connector: Send + Sync {
    async fn connect(&self, settings: &ConnectionSettings) -> Result<Arc<dyn ChainClient>>;
}

/// Connects to real JSON-RPC endpoints.
#[derive(Debug, Default, Clone, Copy)]
pub struct RpcConnector;

#[async_trait]
impl Connector for RpcConnector {
    async fn connect(&self, settings: &ConnectionSettings) -> Result<Arc<dyn ChainClient>> {
        let client = RpcChainClient::connect(&settings.rpc_url, settings.ws_url.as_deref())
            .await?
            .with_poll_interval(settings.poll_interval);
        Ok(Arc::new(client))
    }
}

/// A live connection and the chain id observed when it was established.
#[derive(Clone)]
pub struct Connection {
    client: Arc<dyn ChainClient>,
    chain_id: u64,
}

impl Connection {
    pub fn client(&self) -> &Arc<dyn ChainClient> {
        &self.client
    }

    pub fn chain_id(&self) -> u64 {
        self.chain_id
    }
}

impl std::fmt::Debug for Connection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Connection")
            .field("chain_id", &self.chain_id)
            .finish()
    }
}

/// Owner of the shared connection and signing identity.
pub struct ConnectionManager {
    settings: ConnectionSettings,
    identity: Arc<Identity>,
    connector: Arc<dyn Connector>,
    current: Mutex<Option<Connection>>,
    send_lock: Mutex<()>,
    closed: AtomicBool,
}

impl std::fmt::Debug for ConnectionManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionManager")
            .field("settings", &self.settings)
            .field("identity", &self.identity)
            .field("closed", &self.is_closed())
            .finish()
    }
}

impl ConnectionManager {
    pub fn new(settings: ConnectionSettings, identity: Identity, connector: Arc<dyn Connector>) -> Self {
        Self {
            settings,
            identity: Arc::new(identity),
            connector,
            current: Mutex::new(None),
            send_lock: Mutex::new(()),
            closed: AtomicBool::new(false),
        }
    }

    /// Builds the identity from the configured secret. Does not touch the network.
    pub fn from_config(config: &AgentConfig, connector: Arc<dyn Connector>) -> Result<Self> {
        let identity = Identity::from_secret(&config.private_key)?;
        Ok(Self::new(ConnectionSettings::from(config), identity, connector))
    }

    pub fn settings(&self) -> &ConnectionSettings {
        &self.settings
    }

    pub fn identity(&self) -> Arc<Identity> {
        self.identity.clone()
    }

    pub fn address(&self) -> Address {
        self.identity.address()
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    /// Returns the cached connection, establishing it first if needed.
    ///
    /// Establishing fetches the chain id; an unreachable endpoint is a
    /// `Network` error and nothing is cached.
    pub async fn connection(&self) -> Result<Connection> {
        if self.is_closed() {
            return Err(AgentError::Network("connection has been closed".into()));
        }

        let mut current = self.current.lock().await;
        if let Some(conn) = current.as_ref() {
            return Ok(conn.clone());
        }

        let client = self.connector.connect(&self.settings).await?;
        let chain_id = client.chain_id().await.map_err(|e| {
            AgentError::Network(format!("failed to reach {}: {e}", self.settings.rpc_url))
        })?;

        if chain_id != self.settings.expected_chain_id {
            if self.settings.strict_chain_id {
                return Err(AgentError::Network(format!(
                    "chain id mismatch: expected {}, node reports {chain_id}",
                    self.settings.expected_chain_id
                )));
            }
            warn!(
                expected = self.settings.expected_chain_id,
                observed = chain_id,
                "chain id mismatch, continuing"
            );
        }

        info!(rpc_url = %self.settings.rpc_url, chain_id, address = %self.address(), "connected");
        let conn = Connection { client, chain_id };
        *current = Some(conn.clone());
        Ok(conn)
    }

    /// Shorthand for `connection().await?.client()`.
    pub async fn client(&self) -> Result<Arc<dyn ChainClient>> {
        Ok(self.connection().await?.client)
    }

    /// Drops the cached connection; the next call reconnects.
    pub async fn invalidate(&self) {
        if self.current.lock().await.take().is_some() {
            debug!("connection invalidated");
        }
    }

    /// Passes `result` through, invalidating the connection on transport failures.
    pub async fn observe<T>(&self, result: Result<T>) -> Result<T> {
        if let Err(AgentError::Network(msg)) = &result {
            warn!(error = %msg, "transport failure, dropping connection");
            self.invalidate().await;
        }
        result
    }

    /// Runs `f` against the current client and observes its result.
    pub async fn with_client<T, F, Fut>(&self, f: F) -> Result<T>
    where
        F: FnOnce(Arc<dyn ChainClient>) -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let client = self.client().await?;
        let result = f(client).await;
        self.observe(result).await
    }

    /// Serializes nonce acquisition and broadcast for this identity.
    pub(crate) async fn send_guard(&self) -> MutexGuard<'_, ()> {
        self.send_lock.lock().await
    }

    /// Releases the connection. Idempotent; later calls fail with `Network`.
    pub async fn close(&self) {
        if self.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        self.current.lock().await.take();
        info!("connection closed");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{FakeChain, FakeConnector};

    const SECRET: &str = "0xac0974bec39a17e36ba4a6b4d238ff944bacb478cbed5efcae784d7bf4f2ff80";

    fn manager(chain_id: u64, expected: u64) -> (ConnectionManager, Arc<FakeConnector>) {
        let chain = Arc::new(FakeChain::new(chain_id));
        let connector = Arc::new(FakeConnector::new(chain));
        let identity = Identity::from_secret(SECRET).unwrap();
        let mgr = ConnectionManager::new(
            ConnectionSettings::new("http://fake", expected),
            identity,
            connector.clone(),
        );
        (mgr, connector)
    }

    #[tokio::test]
    async fn connects_lazily_once() {
        let (mgr, connector) = manager(88888, 88888);
        assert_eq!(connector.connect_count(), 0);

        let a = mgr.connection().await.unwrap();
        let b = mgr.connection().await.unwrap();
        assert_eq!(a.chain_id(), 88888);
        assert!(Arc::ptr_eq(a.client(), b.client()));
        assert_eq!(connector.connect_count(), 1);
    }

    #[tokio::test]
    async fn concurrent_first_use_connects_once() {
        let (mgr, connector) = manager(88888, 88888);
        let mgr = Arc::new(mgr);
        let tasks: Vec<_> = (0..8)
            .map(|_| {
                let mgr = mgr.clone();
                tokio::spawn(async move { mgr.connection().await.map(|c| c.chain_id()) })
            })
            .collect();
        for t in tasks {
            assert_eq!(t.await.unwrap().unwrap(), 88888);
        }
        assert_eq!(connector.connect_count(), 1);
    }

    #[tokio::test]
    async fn chain_id_mismatch_is_only_a_warning() {
        let (mgr, _) = manager(31337, 88888);
        let conn = mgr.connection().await.unwrap();
        assert_eq!(conn.chain_id(), 31337);
    }

    #[tokio::test]
    async fn strict_mismatch_is_network_error() {
        let chain = Arc::new(FakeChain::new(31337));
        let mut settings = ConnectionSettings::new("http://fake", 88888);
        settings.strict_chain_id = true;
        let mgr = ConnectionManager::new(
            settings,
            Identity::from_secret(SECRET).unwrap(),
            Arc::new(FakeConnector::new(chain)),
        );
        let err = mgr.connection().await.unwrap_err();
        assert!(matches!(err, AgentError::Network(_)));
    }

    #[tokio::test]
    async fn unreachable_endpoint_is_network_error_and_not_cached() {
        let (mgr, connector) = manager(88888, 88888);
        connector.set_refuse(true);
        assert!(matches!(mgr.connection().await, Err(AgentError::Network(_))));

        connector.set_refuse(false);
        assert!(mgr.connection().await.is_ok());
        assert_eq!(connector.connect_count(), 1);
    }

    #[tokio::test]
    async fn transport_failure_invalidates() {
        let (mgr, connector) = manager(88888, 88888);
        mgr.connection().await.unwrap();

        let failed: Result<()> = Err(AgentError::Network("reset".into()));
        assert!(mgr.observe(failed).await.is_err());
        mgr.connection().await.unwrap();
        assert_eq!(connector.connect_count(), 2);

        // Node-side errors keep the connection.
        let reverted: Result<()> = Err(AgentError::transaction("reverted"));
        assert!(mgr.observe(reverted).await.is_err());
        mgr.connection().await.unwrap();
        assert_eq!(connector.connect_count(), 2);
    }

    #[tokio::test]
    async fn close_is_idempotent() {
        let (mgr, _) = manager(88888, 88888);
        mgr.connection().await.unwrap();
        mgr.close().await;
        mgr.close().await;
        assert!(mgr.is_closed());
        assert!(matches!(mgr.connection().await, Err(AgentError::Network(_))));
    }

    #[test]
    fn bad_secret_is_configuration_error() {
        let mut config = AgentConfig::new("http://localhost:8545", SECRET);
        config.private_key = "0x1234".into();
        let chain = Arc::new(FakeChain::new(88888));
        let err = ConnectionManager::from_config(&config, Arc::new(FakeConnector::new(chain))).unwrap_err();
        assert!(matches!(err, AgentError::Configuration(_)));
    }

    #[test]
    fn settings_follow_active_endpoint() {
        let mut config = AgentConfig::new("https://rpc.example", SECRET)
            .with_network(chzkit_core::Network::Testnet);
        config.testnet_rpc_url = Some("https://spicy.example".into());
        let settings = ConnectionSettings::from(&config);
        assert_eq!(settings.rpc_url, "https://spicy.example");
        assert_eq!(settings.expected_chain_id, 88882);
    }
}
