//! `chzkit balance`: native or token balance.

use alloy::primitives::Address;
use chzkit_agent::AgentConfig;
use chzkit_core::units::{format_ether, format_units};

use super::{connect, resolve_token, CmdResult};

/// Run the `balance` subcommand.
pub async fn run(config: AgentConfig, token: Option<String>, address: Option<Address>) -> CmdResult {
    let agent = connect(config).await?;
    let owner = address.unwrap_or_else(|| agent.address());

    match token {
        None => {
            let wei = agent.reader().balance(owner).await?;
            println!("{} CHZ", format_ether(wei));
        }
        Some(token) => {
            let descriptor = resolve_token(&agent, &token)?;
            let raw = agent.reader().token_balance(descriptor.address, owner).await?;
            let decimals = agent
                .executor()
                .resolve_decimals(descriptor.address, descriptor.decimals)
                .await;
            let symbol = match agent.reader().token_symbol(descriptor.address).await {
                Ok(symbol) => symbol,
                Err(_) => token.to_ascii_uppercase(),
            };
            println!("{} {symbol}", format_units(raw, decimals));
        }
    }

    agent.close().await;
    Ok(())
}
