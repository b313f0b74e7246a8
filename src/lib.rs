//! # chzkit
//!
//! Agent toolkit for Chiliz Chain and other EVM networks: a single
//! [`Agent`] that reads chain state, sends native and token transfers with
//! confirmation tracking, invokes contracts and subscribes to events.
//!
//! This crate re-exports [`chzkit_agent`]; the lower layers are available
//! as `chzkit-core`, `chzkit-signer` and `chzkit-evm`.

pub use chzkit_agent::*;

/// Returns the library version string.
pub fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn version_is_set() {
        assert!(!version().is_empty());
    }
}
