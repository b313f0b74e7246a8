//! `chzkit watch`: print a contract's events until Ctrl-C.

use std::path::PathBuf;

use alloy::primitives::Address;
use alloy::rpc::types::BlockNumberOrTag;
use chzkit_agent::{AgentConfig, ContractHandle, DecodedLog, EventFilter};
use serde_json::json;

use super::{connect, CmdResult};

fn print_log(log: &DecodedLog) {
    let line = json!({
        "event": log.event,
        "block": log.log.block_number,
        "tx": log.log.transaction_hash,
        "indexed": log.indexed.iter().map(|v| format!("{v:?}")).collect::<Vec<_>>(),
        "data": log.body.iter().map(|v| format!("{v:?}")).collect::<Vec<_>>(),
    });
    println!("{line}");
}

/// Run the `watch` subcommand.
pub async fn run(
    config: AgentConfig,
    contract: Address,
    event: String,
    abi: Option<PathBuf>,
    from_block: Option<u64>,
) -> CmdResult {
    let handle = match abi {
        Some(path) => {
            let json = std::fs::read_to_string(&path)
                .map_err(|e| format!("failed to read ABI {}: {e}", path.display()))?;
            ContractHandle::from_json(contract, &json)?
        }
        None => ContractHandle::erc20(contract),
    };
    let agent = connect(config).await?;

    if let Some(from) = from_block {
        let past = agent
            .events()
            .get_historical(&handle, &event, &EventFilter::new(), from, BlockNumberOrTag::Latest)
            .await?;
        past.iter().for_each(print_log);
    }

    agent
        .events()
        .subscribe(&handle, &event, |log| print_log(&log))
        .await?;
    eprintln!("Watching {event} on {contract}. Press Ctrl-C to stop.");

    tokio::signal::ctrl_c().await?;
    agent.close().await;
    Ok(())
}
