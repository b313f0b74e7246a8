//! `chzkit tools` and `chzkit tool`: the agent tool registry.

use std::sync::Arc;

use chzkit_agent::{AgentConfig, ToolRegistry};

use super::{connect, CmdResult};

/// Run the `tools` subcommand.
pub async fn list(config: AgentConfig) -> CmdResult {
    let agent = Arc::new(connect(config).await?);
    let registry = ToolRegistry::new(agent.clone());
    println!("{}", serde_json::to_string_pretty(&registry.specs_json())?);
    agent.close().await;
    Ok(())
}

/// Run the `tool` subcommand.
pub async fn run(config: AgentConfig, name: String, input: String) -> CmdResult {
    let agent = Arc::new(connect(config).await?);
    let registry = ToolRegistry::new(agent.clone());
    println!("{}", registry.invoke(&name, &input).await);
    agent.close().await;
    Ok(())
}
