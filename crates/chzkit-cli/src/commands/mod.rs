//! CLI subcommand implementations.

use std::path::PathBuf;

use chzkit_agent::{Agent, AgentConfig, TokenDescriptor};
use chzkit_core::units::{normalize_amount, parse_units};

pub mod balance;
pub mod info;
pub mod send;
pub mod sign;
pub mod tools;
pub mod wait;
pub mod watch;

pub(crate) type CmdResult = Result<(), Box<dyn std::error::Error>>;

/// The explicit file if given, else `./.env`, else `~/.chzkit/.env`.
///
/// An explicit path must exist; the defaults are skipped when absent.
pub(crate) fn resolve_env_file(
    env_file: Option<PathBuf>,
) -> Result<Option<PathBuf>, Box<dyn std::error::Error>> {
    if let Some(path) = env_file {
        if !path.exists() {
            return Err(format!("env file {} does not exist", path.display()).into());
        }
        return Ok(Some(path));
    }

    let local = PathBuf::from(".env");
    if local.exists() {
        return Ok(Some(local));
    }
    Ok(dirs::home_dir()
        .map(|home| home.join(".chzkit").join(".env"))
        .filter(|path| path.exists()))
}

pub(crate) async fn connect(config: AgentConfig) -> Result<Agent, Box<dyn std::error::Error>> {
    Ok(Agent::create(config).await?)
}

/// Checks a human-readable amount digit for digit and returns its canonical
/// spelling. Precision against the token's decimals is checked on send.
pub(crate) fn amount_string(amount: &str) -> Result<String, Box<dyn std::error::Error>> {
    let places = amount.trim().split_once('.').map_or(0, |(_, f)| f.len());
    let places = u8::try_from(places).map_err(|_| format!("too many decimal places in {amount}"))?;
    if parse_units(amount, places)?.is_zero() {
        return Err(format!("amount must be positive, got {amount}").into());
    }
    Ok(normalize_amount(amount))
}

/// A token given as a ticker from the token map or as a contract address.
pub(crate) fn resolve_token(
    agent: &Agent,
    token: &str,
) -> Result<TokenDescriptor, Box<dyn std::error::Error>> {
    if let Some(known) = agent.tokens().get(token) {
        return Ok(*known);
    }
    let address = token.parse().map_err(|_| {
        format!(
            "'{token}' is neither a known ticker ({}) nor a contract address",
            agent.tokens().tickers().join(", ")
        )
    })?;
    Ok(TokenDescriptor::new(address, None))
}

/// Asks for `y` on stdin unless `skip` is set.
pub(crate) fn confirm(prompt: &str, skip: bool) -> Result<bool, Box<dyn std::error::Error>> {
    if skip {
        return Ok(true);
    }
    eprint!("{prompt} [y/N] ");
    let mut input = String::new();
    std::io::stdin().read_line(&mut input)?;
    Ok(input.trim().eq_ignore_ascii_case("y"))
}
