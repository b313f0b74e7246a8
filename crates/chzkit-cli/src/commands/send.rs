//! `chzkit send` and `chzkit send-token`.
//!
//! Both wait for one confirmation. A failure after broadcast still prints
//! the transaction hash so it can be looked up.

use chzkit_agent::{Agent, AgentConfig, AgentError};
use tracing::{info, warn};

use super::{amount_string, confirm, connect, resolve_token, CmdResult};

fn print_summary(agent: &Agent, to: &str, amount: &str, asset: &str) {
    println!("\n=== Transfer Summary ===");
    println!("  From:     {}", agent.get_wallet_address());
    println!("  To:       {to}");
    println!("  Amount:   {amount} {asset}");
    println!("  Network:  {}", agent.config().network.name());
    println!("========================\n");
}

fn report(agent: &Agent, result: Result<alloy::primitives::B256, AgentError>) -> CmdResult {
    let network = agent.config().network;
    match result {
        Ok(hash) => {
            info!(%hash, "transfer confirmed");
            println!("Transaction confirmed! Hash: {hash}");
            println!("   {}", network.explorer_tx_url(&hash.to_string()));
            Ok(())
        }
        Err(e) => {
            warn!(error = %e, "transfer failed");
            if let Some(hash) = e.tx_hash() {
                eprintln!("Transaction {hash} was broadcast but did not succeed.");
                eprintln!("   {}", network.explorer_tx_url(&hash.to_string()));
            }
            Err(e.into())
        }
    }
}

/// Run the `send` subcommand.
pub async fn native(config: AgentConfig, to: String, amount: String, yes: bool) -> CmdResult {
    let amount = amount_string(&amount)?;
    let agent = connect(config).await?;
    print_summary(&agent, &to, &amount, "CHZ");

    if !confirm("Confirm transfer?", yes)? {
        println!("Transfer cancelled.");
        agent.close().await;
        return Ok(());
    }

    let result = agent.send_native_chz(&to, &amount).await;
    let outcome = report(&agent, result);
    agent.close().await;
    outcome
}

/// Run the `send-token` subcommand.
pub async fn token(
    config: AgentConfig,
    token: String,
    to: String,
    amount: String,
    decimals: Option<u8>,
    yes: bool,
) -> CmdResult {
    let amount = amount_string(&amount)?;
    let agent = connect(config).await?;
    let descriptor = resolve_token(&agent, &token)?;
    print_summary(&agent, &to, &amount, &token.to_ascii_uppercase());

    if !confirm("Confirm transfer?", yes)? {
        println!("Transfer cancelled.");
        agent.close().await;
        return Ok(());
    }

    let result = agent
        .executor()
        .send_token(descriptor.address, &to, &amount, decimals.or(descriptor.decimals))
        .await;
    let outcome = report(&agent, result);
    agent.close().await;
    outcome
}
