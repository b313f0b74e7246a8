//! `chzkit info` and `chzkit address`.

use alloy::primitives::U256;
use chzkit_agent::AgentConfig;
use chzkit_core::units::format_units;
use chzkit_core::Network;
use chzkit_signer::Identity;

use super::{connect, CmdResult};

/// Run the `info` subcommand.
pub async fn run(config: AgentConfig) -> CmdResult {
    let agent = connect(config).await?;
    let chain_id = agent.get_chain_id().await?;
    let head = agent.reader().block_number().await?;
    let gas_price = agent.get_gas_price().await?;
    let network = Network::from_chain_id(chain_id)
        .map(|n| n.name().to_string())
        .unwrap_or_else(|| format!("unknown network ({chain_id})"));

    println!("\n=== Chain Info ===");
    println!("  Network:   {network}");
    println!("  Chain ID:  {chain_id}");
    println!("  Endpoint:  {}", agent.config().active_rpc_url());
    println!("  Head:      {head}");
    println!("  Gas price: {} gwei", format_units(U256::from(gas_price), 9));
    println!("  Wallet:    {}", agent.get_wallet_address());
    println!("==================\n");

    agent.close().await;
    Ok(())
}

/// Run the `address` subcommand. Does not touch the network.
pub fn address(config: AgentConfig) -> CmdResult {
    let identity = Identity::from_secret(&config.private_key)?;
    println!("{}", identity.address().to_checksum(None));
    Ok(())
}
