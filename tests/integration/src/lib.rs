//! Integration tests for chzkit.
//!
//! Anvil-dependent tests use **testcontainers** to spin up a Docker-based
//! Anvil node automatically, so no local `anvil` process is needed.
//!
//! ```bash
//! # Run everything (Docker must be available):
//! cargo test -p chzkit-integration-tests -- --include-ignored
//! ```

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use alloy::consensus::Transaction as _;
    use alloy::network::TransactionResponse as _;
    use alloy::primitives::{Address, B256, U256};
    use alloy::providers::{Provider, ProviderBuilder};
    use chzkit_agent::{Agent, AgentConfig, AgentError};
    use chzkit_core::units::parse_ether;
    use testcontainers::{
        core::{IntoContainerPort, WaitFor},
        runners::SyncRunner,
        Container, GenericImage, ImageExt,
    };

    /// Anvil default account 0.
    const ANVIL_KEY: &str = "0xac0974bec39a17e36ba4a6b4d238ff944bacb478cbed5efcae784d7bf4f2ff80";
    const ANVIL_ADDRESS: &str = "0xf39Fd6e51aad88F6F4ce6aB8827279cffFb92266";
    const RECIPIENT: &str = "0x70997970C51812dc3A010C7d01b50e0d17dc79C8";
    const ANVIL_CHAIN_ID: u64 = 31337;

    /// Spins up a Docker Anvil container and returns `(container, rpc_url)`.
    /// The container is dropped (and removed) when it goes out of scope.
    fn start_anvil() -> (Container<GenericImage>, String) {
        let image = GenericImage::new("ghcr.io/foundry-rs/foundry", "latest")
            .with_exposed_port(8545.tcp())
            .with_wait_for(WaitFor::message_on_stdout("Listening on"))
            .with_entrypoint("anvil")
            .with_cmd(vec![
                "--host".to_string(),
                "0.0.0.0".to_string(),
                "--port".to_string(),
                "8545".to_string(),
                "--chain-id".to_string(),
                ANVIL_CHAIN_ID.to_string(),
            ]);

        let container = image.start().expect("Docker must be available to run Anvil tests");
        let host_port = container.get_host_port_ipv4(8545).expect("failed to get mapped port");
        let url = format!("http://127.0.0.1:{}", host_port);
        (container, url)
    }

    fn anvil_config(url: &str) -> AgentConfig {
        let mut config = AgentConfig::new(url, ANVIL_KEY);
        config.expected_chain_id = ANVIL_CHAIN_ID;
        config.poll_interval = Duration::from_millis(100);
        config.tx_timeout = Duration::from_secs(30);
        config
    }

    fn is_tx_hash(s: &str) -> bool {
        s.len() == 66
            && s.starts_with("0x")
            && s[2..].chars().all(|c| c.is_ascii_digit() || ('a'..='f').contains(&c))
    }

    // -----------------------------------------------------------------
    // no node needed
    // -----------------------------------------------------------------

    #[test]
    fn unreachable_endpoint_is_network_error() {
        let rt = tokio::runtime::Runtime::new().unwrap();
        rt.block_on(async {
            let err = Agent::create(AgentConfig::new("http://127.0.0.1:1", ANVIL_KEY))
                .await
                .unwrap_err();
            assert!(matches!(err, AgentError::Network(_)), "{err}");
        });
    }

    // -----------------------------------------------------------------
    // Anvil via testcontainers
    // -----------------------------------------------------------------

    #[test]
    #[ignore]
    fn test_send_native() {
        let (_anvil, url) = start_anvil();

        let rt = tokio::runtime::Runtime::new().unwrap();
        rt.block_on(async {
            let agent = Agent::create(anvil_config(&url)).await.unwrap();
            assert_eq!(agent.get_wallet_address(), ANVIL_ADDRESS);

            let hash = agent.send_native_chz(RECIPIENT, "1").await.unwrap();
            assert!(is_tx_hash(&format!("{hash:?}")), "{hash:?}");

            let receipt = agent
                .reader()
                .transaction_receipt(hash)
                .await
                .unwrap()
                .expect("receipt after confirmation");
            assert!(receipt.is_success());
            assert_eq!(receipt.gas_used, 21_000);

            let recipient: Address = RECIPIENT.parse().unwrap();
            let balance = agent.reader().balance(recipient).await.unwrap();
            assert_eq!(balance, parse_ether("10001").unwrap());

            agent.close().await;
        });
    }

    #[test]
    #[ignore]
    fn test_concurrent_sends_get_sequential_nonces() {
        let (_anvil, url) = start_anvil();

        let rt = tokio::runtime::Runtime::new().unwrap();
        rt.block_on(async {
            let agent = Arc::new(Agent::create(anvil_config(&url)).await.unwrap());
            let tasks: Vec<_> = (0..5)
                .map(|_| {
                    let agent = agent.clone();
                    tokio::spawn(async move { agent.send_native_chz(RECIPIENT, "0.01").await })
                })
                .collect();

            let mut hashes = Vec::new();
            for t in tasks {
                hashes.push(t.await.unwrap().unwrap());
            }

            let provider = ProviderBuilder::new().connect_http(url.parse().unwrap());
            let mut nonces = Vec::new();
            for hash in hashes {
                let tx = provider.get_transaction_by_hash(hash).await.unwrap().unwrap();
                assert_eq!(tx.from(), agent.address());
                nonces.push(tx.nonce());
            }
            nonces.sort_unstable();
            assert_eq!(nonces, vec![0, 1, 2, 3, 4]);
        });
    }

    #[test]
    #[ignore]
    fn test_wait_for_unknown_hash() {
        let (_anvil, url) = start_anvil();

        let rt = tokio::runtime::Runtime::new().unwrap();
        rt.block_on(async {
            let agent = Agent::create(anvil_config(&url)).await.unwrap();
            let started = std::time::Instant::now();
            let receipt = agent
                .executor()
                .wait_for_transaction(B256::repeat_byte(0x42), 1, Duration::from_secs(2))
                .await
                .unwrap();
            assert!(receipt.is_none());
            assert!(started.elapsed() < Duration::from_secs(10));
        });
    }

    #[test]
    #[ignore]
    fn test_chain_id_mismatch() {
        let (_anvil, url) = start_anvil();

        let rt = tokio::runtime::Runtime::new().unwrap();
        rt.block_on(async {
            // Default expectation is Chiliz mainnet; a mismatch only warns.
            let agent = Agent::create(AgentConfig::new(url.as_str(), ANVIL_KEY)).await.unwrap();
            assert_eq!(agent.get_chain_id().await.unwrap(), ANVIL_CHAIN_ID);

            let mut strict = AgentConfig::new(url.as_str(), ANVIL_KEY);
            strict.strict_chain_id = true;
            let err = Agent::create(strict).await.unwrap_err();
            assert!(matches!(err, AgentError::Network(_)));
        });
    }

    #[test]
    #[ignore]
    fn test_insufficient_native_funds_is_transaction_error() {
        let (_anvil, url) = start_anvil();

        let rt = tokio::runtime::Runtime::new().unwrap();
        rt.block_on(async {
            let agent = Agent::create(anvil_config(&url)).await.unwrap();
            let balance = agent.reader().balance(agent.address()).await.unwrap();
            assert!(balance > U256::ZERO);

            let err = agent.send_native_chz(RECIPIENT, "100000000").await.unwrap_err();
            assert!(matches!(err, AgentError::Transaction { .. }), "{err}");
            assert!(err.tx_hash().is_none());
        });
    }
}
