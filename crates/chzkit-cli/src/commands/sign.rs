//! `chzkit sign` and `chzkit verify`: EIP-191 messages. No network access.

use chzkit_agent::AgentConfig;
use chzkit_signer::{parse_signature, signature_hex, Identity};

use super::CmdResult;

/// Run the `sign` subcommand.
pub fn sign(config: AgentConfig, message: String) -> CmdResult {
    let identity = Identity::from_secret(&config.private_key)?;
    let signature = identity.sign_message(message.as_bytes())?;
    println!("{}", signature_hex(&signature));
    Ok(())
}

/// Run the `verify` subcommand.
pub fn verify(config: AgentConfig, message: String, signature: String) -> CmdResult {
    let identity = Identity::from_secret(&config.private_key)?;
    let signature = parse_signature(&signature)?;
    let signer = Identity::verify_message(message.as_bytes(), &signature)?;
    println!("{}", signer.to_checksum(None));
    if signer == identity.address() {
        println!("Signed by this wallet.");
    } else {
        println!("Not signed by this wallet ({}).", identity.address().to_checksum(None));
    }
    Ok(())
}
