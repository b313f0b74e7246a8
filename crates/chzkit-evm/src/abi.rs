//! Built-in ERC-20 ABI using alloy's `sol!` macro.

use alloy::sol;

sol! {
    /// ERC-20 token interface.
    #[sol(rpc, abi)]
    interface IERC20 {
        function balanceOf(address owner) external view returns (uint256);
        function transfer(address to, uint256 amount) external returns (bool);
        function name() external view returns (string);
        function symbol() external view returns (string);
        function decimals() external view returns (uint8);

        event Transfer(address indexed from, address indexed to, uint256 value);
        event Approval(address indexed owner, address indexed spender, uint256 value);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy::primitives::{Address, U256};
    use alloy::sol_types::{SolCall, SolEvent};

    #[test]
    fn encode_balance_of() {
        let call = IERC20::balanceOfCall { owner: Address::ZERO };
        let encoded = call.abi_encode();
        // 4 bytes selector + 32 bytes address
        assert_eq!(encoded.len(), 36);
        // balanceOf(address) selector = 0x70a08231
        assert_eq!(&encoded[..4], &[0x70, 0xa0, 0x82, 0x31]);
    }

    #[test]
    fn encode_transfer() {
        let call = IERC20::transferCall {
            to: Address::ZERO,
            amount: U256::from(1000u64),
        };
        let encoded = call.abi_encode();
        assert_eq!(encoded.len(), 68);
        // transfer(address,uint256) selector = 0xa9059cbb
        assert_eq!(&encoded[..4], &[0xa9, 0x05, 0x9c, 0xbb]);
    }

    #[test]
    fn decode_decimals_return() {
        let mut data = vec![0u8; 32];
        data[31] = 6;
        let decoded: u8 = <IERC20::decimalsCall as SolCall>::abi_decode_returns(&data).unwrap();
        assert_eq!(decoded, 6);
    }

    #[test]
    fn transfer_event_signature() {
        // keccak256("Transfer(address,address,uint256)")
        assert_eq!(
            alloy::hex::encode(IERC20::Transfer::SIGNATURE_HASH),
            "ddf252ad1be2c89b69c2b068fc378daa952ba7f163c4a11628f55a4df523b3ef"
        );
    }
}
