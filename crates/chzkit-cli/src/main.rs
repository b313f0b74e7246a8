//! # chzkit CLI
//!
//! Entry point for the `chzkit` binary: short scripts over one agent.
//!
//! Subcommands:
//! - `chzkit info`      : network, chain id, head block, gas price
//! - `chzkit address`   : the configured wallet address
//! - `chzkit balance`   : native or token balance
//! - `chzkit send`      : send CHZ and wait for confirmation
//! - `chzkit send-token`: send an ERC-20 token and wait for confirmation
//! - `chzkit wait`      : wait for a transaction receipt
//! - `chzkit watch`     : print a contract's events until Ctrl-C
//! - `chzkit sign` / `chzkit verify`: EIP-191 messages
//! - `chzkit tools` / `chzkit tool`: list or run the agent tools

use std::path::PathBuf;

use alloy::primitives::{Address, B256};
use chzkit_core::AgentConfig;
use clap::{Parser, Subcommand};
use tracing::debug;

mod commands;

/// chzkit: agent toolkit for Chiliz Chain.
#[derive(Parser)]
#[command(name = "chzkit", version, about)]
struct Cli {
    /// Environment file to load (default: ./.env, then ~/.chzkit/.env).
    #[arg(long, global = true)]
    env_file: Option<PathBuf>,

    /// Use the testnet endpoint and chain id.
    #[arg(long, global = true)]
    testnet: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show network, chain id, head block and gas price.
    Info,

    /// Print the wallet address.
    Address,

    /// Show the native balance, or a token balance with --token.
    Balance {
        /// Token ticker from the token map, or a token contract address.
        #[arg(long)]
        token: Option<String>,

        /// Address to query (default: the wallet).
        #[arg(long)]
        address: Option<Address>,
    },

    /// Send CHZ and wait for one confirmation.
    Send {
        /// Recipient address (0x...).
        #[arg(long)]
        to: String,

        /// Human-readable amount (e.g. "1.5" for 1.5 CHZ).
        #[arg(long)]
        amount: String,

        /// Skip the confirmation prompt.
        #[arg(long, short)]
        yes: bool,
    },

    /// Send an ERC-20 token and wait for one confirmation.
    SendToken {
        /// Token ticker from the token map, or a token contract address.
        #[arg(long)]
        token: String,

        /// Recipient address (0x...).
        #[arg(long)]
        to: String,

        /// Human-readable amount in token units.
        #[arg(long)]
        amount: String,

        /// Token decimals override (default: token map, then the contract).
        #[arg(long)]
        decimals: Option<u8>,

        /// Skip the confirmation prompt.
        #[arg(long, short)]
        yes: bool,
    },

    /// Wait for a transaction to be mined.
    Wait {
        /// Transaction hash (0x...).
        hash: B256,

        /// Blocks required on top of the transaction's own block, inclusive.
        #[arg(long, default_value_t = 1)]
        confirmations: u64,

        /// Give up after this many seconds (default: TX_TIMEOUT_SECS).
        #[arg(long)]
        timeout: Option<u64>,
    },

    /// Print events emitted by a contract until Ctrl-C.
    Watch {
        /// Contract address (0x...).
        #[arg(long)]
        contract: Address,

        /// Event name.
        #[arg(long, default_value = "Transfer")]
        event: String,

        /// JSON ABI file (default: the built-in ERC-20 ABI).
        #[arg(long)]
        abi: Option<PathBuf>,

        /// Also print matching events from this block up to the head first.
        #[arg(long)]
        from_block: Option<u64>,
    },

    /// Sign a message with the wallet key (EIP-191).
    Sign {
        message: String,
    },

    /// Recover the signer of a message.
    Verify {
        message: String,
        signature: String,
    },

    /// List the agent tools as JSON.
    Tools,

    /// Run one agent tool with a free-text input.
    Tool {
        name: String,

        #[arg(default_value = "")]
        input: String,
    },
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let (config, env_file) = match load_config(cli.env_file, cli.testnet) {
        Ok(loaded) => loaded,
        Err(e) => {
            eprintln!("Error: {e}");
            std::process::exit(1);
        }
    };
    chzkit_core::logging::init(&config.log);
    debug!(
        env_file = ?env_file,
        network = config.network.name(),
        rpc_url = %config.rpc_url,
        "configuration loaded"
    );

    let result = match cli.command {
        Commands::Info => commands::info::run(config).await,
        Commands::Address => commands::info::address(config),
        Commands::Balance { token, address } => commands::balance::run(config, token, address).await,
        Commands::Send { to, amount, yes } => commands::send::native(config, to, amount, yes).await,
        Commands::SendToken {
            token,
            to,
            amount,
            decimals,
            yes,
        } => commands::send::token(config, token, to, amount, decimals, yes).await,
        Commands::Wait {
            hash,
            confirmations,
            timeout,
        } => commands::wait::run(config, hash, confirmations, timeout).await,
        Commands::Watch {
            contract,
            event,
            abi,
            from_block,
        } => commands::watch::run(config, contract, event, abi, from_block).await,
        Commands::Sign { message } => commands::sign::sign(config, message),
        Commands::Verify { message, signature } => commands::sign::verify(config, message, signature),
        Commands::Tools => commands::tools::list(config).await,
        Commands::Tool { name, input } => commands::tools::run(config, name, input).await,
    };

    if let Err(e) = result {
        eprintln!("Error: {e}");
        std::process::exit(1);
    }
}

fn load_config(
    env_file: Option<PathBuf>,
    testnet: bool,
) -> Result<(AgentConfig, Option<PathBuf>), Box<dyn std::error::Error>> {
    let env_file = commands::resolve_env_file(env_file)?;
    if let Some(path) = &env_file {
        dotenvy::from_path(path).map_err(|e| format!("failed to load {}: {e}", path.display()))?;
    }
    let config = AgentConfig::from_env()?;
    let config = if testnet {
        config.with_network(chzkit_core::Network::Testnet)
    } else {
        config
    };
    Ok((config, env_file))
}
