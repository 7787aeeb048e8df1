//! Human-readable contract interfaces.
//!
//! Accepts the signature forms commonly used for ERC-20 style ABIs:
//!   "function approve(address spender, uint256 amount) returns (bool)"
//!   "approve(address,uint256)"

use alloy_json_abi::Function;
use metabatch_types::{MetabatchError, Result};

/// Parse one human-readable function signature.
pub fn parse_function(signature: &str) -> Result<Function> {
    Function::parse(signature.trim()).map_err(|e| {
        MetabatchError::Encoding(format!("invalid function signature `{}`: {}", signature, e))
    })
}

/// The callable surface of a target contract.
#[derive(Debug, Clone, Default)]
pub struct ContractInterface {
    functions: Vec<Function>,
}

impl ContractInterface {
    pub fn parse(signatures: &[&str]) -> Result<Self> {
        let functions = signatures
            .iter()
            .map(|s| parse_function(s))
            .collect::<Result<Vec<_>>>()?;
        Ok(Self { functions })
    }

    pub fn functions(&self) -> &[Function] {
        &self.functions
    }

    /// Look up a function by name and argument count. Overloads are
    /// distinguished by arity only.
    pub fn function(&self, name: &str, arg_count: usize) -> Result<&Function> {
        let arities: Vec<usize> = self
            .functions
            .iter()
            .filter(|f| f.name == name)
            .map(|f| f.inputs.len())
            .collect();
        if arities.is_empty() {
            return Err(MetabatchError::Encoding(format!(
                "function `{}` not found in interface",
                name
            )));
        }
        self.functions
            .iter()
            .find(|f| f.name == name && f.inputs.len() == arg_count)
            .ok_or_else(|| {
                MetabatchError::Encoding(format!(
                    "function `{}` expects {:?} arguments, got {}",
                    name, arities, arg_count
                ))
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy_primitives::Selector;

    #[test]
    fn test_parse_human_readable() {
        let f = parse_function("function approve(address spender, uint256 amount) returns (bool)").unwrap();
        assert_eq!(f.name, "approve");
        assert_eq!(f.signature(), "approve(address,uint256)");
        assert_eq!(f.inputs[0].name, "spender");
        assert_eq!(f.selector(), Selector::from([0x09, 0x5e, 0xa7, 0xb3]));
    }

    #[test]
    fn test_parse_bare_signature_and_locations() {
        let f = parse_function("setData(uint256 x, bytes calldata payload, string memory label)").unwrap();
        assert_eq!(f.signature(), "setData(uint256,bytes,string)");
        assert_eq!(f.inputs[1].name, "payload");

        let bare = parse_function("approve(address,uint256)").unwrap();
        assert_eq!(bare.selector(), Selector::from([0x09, 0x5e, 0xa7, 0xb3]));
    }

    #[test]
    fn test_parse_rejects_garbage() {
        assert!(matches!(parse_function("no_parens"), Err(MetabatchError::Encoding(_))));
        assert!(ContractInterface::parse(&["function ok()", "function (uint256)"]).is_err());
    }

    #[test]
    fn test_lookup_by_arity() {
        let iface = ContractInterface::parse(&[
            "function transfer(address to, uint256 amount)",
            "function transfer(address to)",
        ])
        .unwrap();
        assert_eq!(iface.function("transfer", 2).unwrap().inputs.len(), 2);
        assert_eq!(iface.function("transfer", 1).unwrap().inputs.len(), 1);
        assert!(iface.function("transfer", 3).is_err());
        assert!(iface.function("mint", 1).is_err());
    }
}
