//! Contract handles and ABI-resolved method calls.
//!
//! A [`MethodCall`] is resolved once against the caller's ABI; unknown
//! methods and argument mismatches are rejected with `Validation` before
//! anything is sent to the node.

use alloy::dyn_abi::{DynSolType, DynSolValue, FunctionExt, JsonAbiExt, Specifier};
use alloy::json_abi::{Event, Function, JsonAbi, StateMutability};
use alloy::primitives::{Address, Bytes, U256};
use chzkit_core::{AgentError, Result};

use crate::abi::IERC20;

/// A contract address together with its ABI.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContractHandle {
    address: Address,
    abi: JsonAbi,
}

impl ContractHandle {
    pub fn new(address: Address, abi: JsonAbi) -> Self {
        Self { address, abi }
    }

    /// From standard JSON ABI text.
    pub fn from_json(address: Address, json: &str) -> Result<Self> {
        let abi: JsonAbi = serde_json::from_str(json)
            .map_err(|e| AgentError::Validation(format!("invalid JSON ABI: {e}")))?;
        Ok(Self::new(address, abi))
    }

    /// From human-readable signatures such as
    /// `"function transfer(address to, uint256 amount) returns (bool)"`.
    pub fn from_human_readable(address: Address, signatures: &[&str]) -> Result<Self> {
        let abi = JsonAbi::parse(signatures.iter().copied())
            .map_err(|e| AgentError::Validation(format!("invalid ABI signature: {e}")))?;
        Ok(Self::new(address, abi))
    }

    /// The built-in ERC-20 ABI at `address`.
    pub fn erc20(address: Address) -> Self {
        Self::new(address, IERC20::abi::contract())
    }

    pub fn address(&self) -> Address {
        self.address
    }

    pub fn abi(&self) -> &JsonAbi {
        &self.abi
    }

    /// The first event declared under `name`.
    pub fn event(&self, name: &str) -> Result<&Event> {
        self.abi
            .event(name)
            .and_then(|overloads| overloads.first())
            .ok_or_else(|| {
                AgentError::Validation(format!("event '{name}' not found in contract ABI"))
            })
    }

    fn functions(&self, name: &str) -> Result<&[Function]> {
        self.abi
            .function(name)
            .map(Vec::as_slice)
            .filter(|overloads| !overloads.is_empty())
            .ok_or_else(|| {
                AgentError::Validation(format!("method '{name}' not found in contract ABI"))
            })
    }
}

/// Per-call overrides for write invocations.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CallOptions {
    /// Native value to attach, in wei.
    pub value: Option<U256>,
    pub gas_limit: Option<u64>,
    pub gas_price: Option<u128>,
    /// Explicit nonce. When unset the account's pending count is used.
    pub nonce: Option<u64>,
}

/// A method name and ABI-typed arguments, resolved against a contract ABI.
#[derive(Debug, Clone, PartialEq)]
pub struct MethodCall {
    function: Function,
    args: Vec<DynSolValue>,
}

fn input_types(function: &Function) -> Result<Vec<DynSolType>> {
    function
        .inputs
        .iter()
        .map(Specifier::<DynSolType>::resolve)
        .collect::<std::result::Result<Vec<_>, _>>()
        .map_err(|e| AgentError::Validation(format!("unsupported ABI type in {}: {e}", function.name)))
}

fn with_arity<'a>(contract: &'a ContractHandle, name: &str, arity: usize) -> Result<Vec<&'a Function>> {
    let overloads = contract.functions(name)?;
    let matching: Vec<&Function> = overloads.iter().filter(|f| f.inputs.len() == arity).collect();
    if matching.is_empty() {
        let expected: Vec<String> = overloads.iter().map(|f| f.inputs.len().to_string()).collect();
        return Err(AgentError::Validation(format!(
            "method '{name}' expects {} argument(s), got {arity}",
            expected.join(" or ")
        )));
    }
    Ok(matching)
}

impl MethodCall {
    /// Resolves `name` against `contract`'s ABI and type-checks `args`.
    pub fn resolve(contract: &ContractHandle, name: &str, args: Vec<DynSolValue>) -> Result<Self> {
        let mut last_err = None;
        for function in with_arity(contract, name, args.len())? {
            let types = input_types(function)?;
            let mismatch = types
                .iter()
                .zip(&args)
                .enumerate()
                .find(|(_, (ty, value))| !ty.matches(value));
            match mismatch {
                None => {
                    return Ok(Self {
                        function: function.clone(),
                        args,
                    })
                }
                Some((i, (ty, value))) => {
                    last_err = Some(AgentError::Validation(format!(
                        "argument {i} of '{name}': expected {ty}, got {}",
                        value
                            .sol_type_name()
                            .map(|n| n.into_owned())
                            .unwrap_or_else(|| "unknown".into())
                    )));
                }
            }
        }
        Err(last_err.unwrap_or_else(|| AgentError::Validation(format!("no overload of '{name}' matches"))))
    }

    /// Like [`MethodCall::resolve`], coercing string arguments to the ABI types.
    pub fn from_strings(contract: &ContractHandle, name: &str, args: &[&str]) -> Result<Self> {
        let mut last_err = None;
        for function in with_arity(contract, name, args.len())? {
            let types = input_types(function)?;
            let coerced: std::result::Result<Vec<DynSolValue>, String> = types
                .iter()
                .zip(args)
                .enumerate()
                .map(|(i, (ty, arg))| {
                    ty.coerce_str(arg)
                        .map_err(|e| format!("argument {i} of '{name}': cannot parse '{arg}' as {ty}: {e}"))
                })
                .collect();
            match coerced {
                Ok(values) => {
                    return Ok(Self {
                        function: function.clone(),
                        args: values,
                    })
                }
                Err(msg) => last_err = Some(AgentError::Validation(msg)),
            }
        }
        Err(last_err.unwrap_or_else(|| AgentError::Validation(format!("no overload of '{name}' matches"))))
    }

    pub fn function(&self) -> &Function {
        &self.function
    }

    pub fn name(&self) -> &str {
        &self.function.name
    }

    pub fn args(&self) -> &[DynSolValue] {
        &self.args
    }

    /// `view`/`pure` methods.
    pub fn is_read_only(&self) -> bool {
        matches!(
            self.function.state_mutability,
            StateMutability::View | StateMutability::Pure
        )
    }

    /// Selector followed by the ABI-encoded arguments.
    pub fn calldata(&self) -> Result<Bytes> {
        self.function
            .abi_encode_input(&self.args)
            .map(Bytes::from)
            .map_err(|e| AgentError::Validation(format!("cannot encode '{}': {e}", self.name())))
    }

    /// Decodes the return data of this method.
    pub fn decode_output(&self, data: &[u8]) -> Result<Vec<DynSolValue>> {
        self.function.abi_decode_output(data).map_err(|e| {
            AgentError::transaction(format!("cannot decode output of '{}': {e}", self.name()))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy::sol_types::SolCall;

    const TRANSFER_ABI: &str = r#"[
        {"type":"function","name":"transfer","stateMutability":"nonpayable",
         "inputs":[{"name":"to","type":"address"},{"name":"amount","type":"uint256"}],
         "outputs":[{"name":"","type":"bool"}]}
    ]"#;

    fn token() -> ContractHandle {
        ContractHandle::erc20(Address::repeat_byte(0x22))
    }

    #[test]
    fn resolves_and_encodes_like_sol_macro() {
        let to = Address::repeat_byte(0x11);
        let call = MethodCall::resolve(
            &token(),
            "transfer",
            vec![DynSolValue::Address(to), DynSolValue::Uint(U256::from(5u64), 256)],
        )
        .unwrap();
        let expected = IERC20::transferCall {
            to,
            amount: U256::from(5u64),
        }
        .abi_encode();
        assert_eq!(call.calldata().unwrap().as_ref(), expected.as_slice());
        assert!(!call.is_read_only());
    }

    #[test]
    fn decodes_return_values() {
        let call = MethodCall::resolve(
            &token(),
            "balanceOf",
            vec![DynSolValue::Address(Address::repeat_byte(0x11))],
        )
        .unwrap();
        let output = IERC20::balanceOfCall::abi_encode_returns(&U256::from(42u64));
        let values = call.decode_output(&output).unwrap();
        assert_eq!(values, vec![DynSolValue::Uint(U256::from(42u64), 256)]);

        let err = call.decode_output(&[0x01]).unwrap_err();
        assert!(matches!(err, AgentError::Transaction { .. }));
    }

    #[test]
    fn unknown_method_rejected() {
        let err = MethodCall::resolve(&token(), "mint", vec![]).unwrap_err();
        assert!(matches!(err, AgentError::Validation(_)));
        assert!(err.to_string().contains("mint"));
    }

    #[test]
    fn arity_mismatch_rejected() {
        let err = MethodCall::resolve(&token(), "transfer", vec![DynSolValue::Bool(true)]).unwrap_err();
        assert!(err.to_string().contains("expects 2"));
    }

    #[test]
    fn type_mismatch_rejected() {
        let err = MethodCall::resolve(
            &token(),
            "transfer",
            vec![DynSolValue::Bool(true), DynSolValue::Uint(U256::from(1u64), 256)],
        )
        .unwrap_err();
        assert!(matches!(err, AgentError::Validation(_)));
        assert!(err.to_string().contains("argument 0"));
    }

    #[test]
    fn string_arguments_coerced() {
        let call = MethodCall::from_strings(
            &token(),
            "balanceOf",
            &["0x1111111111111111111111111111111111111111"],
        )
        .unwrap();
        assert!(call.is_read_only());
        assert_eq!(call.args()[0], DynSolValue::Address(Address::repeat_byte(0x11)));

        let err = MethodCall::from_strings(&token(), "balanceOf", &["not-an-address"]).unwrap_err();
        assert!(matches!(err, AgentError::Validation(_)));
    }

    #[test]
    fn json_and_human_readable_handles() {
        let addr = Address::repeat_byte(0x33);
        let json = ContractHandle::from_json(addr, TRANSFER_ABI).unwrap();
        assert!(MethodCall::from_strings(&json, "transfer", &["0x3333333333333333333333333333333333333333", "10"]).is_ok());

        let human = ContractHandle::from_human_readable(
            addr,
            &[
                "function store(uint256 value)",
                "event Stored(address indexed by, uint256 value)",
            ],
        )
        .unwrap();
        assert!(human.event("Stored").is_ok());
        assert!(human.event("Missing").is_err());
        assert!(ContractHandle::from_json(addr, "{not json").is_err());
    }

    #[test]
    fn decodes_output() {
        let call = MethodCall::from_strings(&token(), "decimals", &[]).unwrap();
        let data = IERC20::decimalsCall::abi_encode_returns(&6u8);
        let out = call.decode_output(&data).unwrap();
        assert_eq!(out, vec![DynSolValue::Uint(U256::from(6u64), 8)]);
    }
}
