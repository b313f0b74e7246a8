//! `chzkit wait`: wait for a transaction receipt.

use std::time::Duration;

use alloy::primitives::B256;
use chzkit_agent::AgentConfig;

use super::{connect, CmdResult};

/// Run the `wait` subcommand.
pub async fn run(config: AgentConfig, hash: B256, confirmations: u64, timeout: Option<u64>) -> CmdResult {
    let timeout = timeout.map(Duration::from_secs).unwrap_or(config.tx_timeout);
    let agent = connect(config).await?;

    let receipt = agent
        .executor()
        .wait_for_transaction(hash, confirmations, timeout)
        .await;
    agent.close().await;

    match receipt? {
        Some(receipt) => {
            println!("{}", serde_json::to_string_pretty(&receipt)?);
            if receipt.is_success() {
                Ok(())
            } else {
                Err(format!("transaction {hash} failed on chain").into())
            }
        }
        None => Err(format!("transaction {hash} not found within {}s", timeout.as_secs()).into()),
    }
}
