//! Call encoder: turns a call intent into a `CallDescriptor`.
//!
//! - Coerce textual arguments into the function's parameter types
//! - Solidity ABI encoding via `alloy-dyn-abi`
//! - Integers are handled as 256-bit values, never floating point

use alloy_dyn_abi::{DynSolType, DynSolValue, JsonAbiExt, Specifier};
use alloy_json_abi::{Function, Param};
use alloy_primitives::{Address, U256};
use metabatch_types::{CallDescriptor, MetabatchError, Result};

pub mod interface;

pub use interface::{parse_function, ContractInterface};

/// A high-level call: a named operation with its arguments on a target contract.
#[derive(Debug, Clone)]
pub struct CallIntent {
    pub target: Address,
    pub function: String,
    pub args: Vec<String>,
    pub value: Option<U256>,
}

impl CallIntent {
    pub fn new(target: Address, function: &str, args: &[&str]) -> Self {
        Self {
            target,
            function: function.to_string(),
            args: args.iter().map(|a| a.to_string()).collect(),
            value: None,
        }
    }

    pub fn with_value(mut self, value: U256) -> Self {
        self.value = Some(value);
        self
    }
}

/// Encode a call intent against the target's interface.
pub fn encode_call(interface: &ContractInterface, intent: &CallIntent) -> Result<CallDescriptor> {
    let function = interface.function(&intent.function, intent.args.len())?;
    let args: Vec<&str> = intent.args.iter().map(String::as_str).collect();
    let data = encode_function_data(function, &args)?;
    Ok(match intent.value {
        Some(value) => CallDescriptor::with_value(intent.target, data, value),
        None => CallDescriptor::new(intent.target, data),
    })
}

/// selector || abi.encode(args)
pub fn encode_function_data(function: &Function, args: &[&str]) -> Result<Vec<u8>> {
    if function.inputs.len() != args.len() {
        return Err(MetabatchError::Encoding(format!(
            "`{}` expects {} arguments, got {}",
            function.signature(),
            function.inputs.len(),
            args.len()
        )));
    }

    let values = function
        .inputs
        .iter()
        .zip(args.iter())
        .map(|(param, arg)| {
            coerce_arg(param, arg).map_err(|e| match e {
                MetabatchError::Encoding(msg) => MetabatchError::Encoding(format!(
                    "argument `{}` of {}: {}",
                    if param.name.is_empty() { "_" } else { param.name.as_str() },
                    function.name,
                    msg
                )),
                other => other,
            })
        })
        .collect::<Result<Vec<_>>>()?;

    function
        .abi_encode_input(&values)
        .map_err(|e| MetabatchError::Encoding(format!("{}: {}", function.signature(), e)))
}

/// Parse a textual argument into a value of the parameter's type.
pub fn coerce_arg(param: &Param, arg: &str) -> Result<DynSolValue> {
    let ty: DynSolType = param
        .resolve()
        .map_err(|e| MetabatchError::Encoding(format!("unsupported parameter type `{}`: {}", param.ty, e)))?;

    // strings are taken verbatim, commas and quotes included
    if ty == DynSolType::String {
        return Ok(DynSolValue::String(arg.to_string()));
    }

    let arg = arg.trim();
    let value = ty
        .coerce_str(arg)
        .map_err(|e| MetabatchError::Encoding(format!("expected {}, got {:?}: {}", ty.sol_type_name(), arg, e)))?;
    check_width(&value, &ty, arg)?;
    Ok(value)
}

/// Integers must fit the declared bit width; nothing is truncated.
fn check_width(value: &DynSolValue, ty: &DynSolType, arg: &str) -> Result<()> {
    let fits = match value {
        DynSolValue::Uint(v, bits) => v.bit_len() <= *bits,
        DynSolValue::Int(v, bits) => {
            // |min| = 2^(bits-1), max = 2^(bits-1) - 1
            let limit = U256::from(1u8) << (*bits - 1);
            if v.is_negative() {
                v.unsigned_abs() <= limit
            } else {
                v.unsigned_abs() < limit
            }
        }
        _ => true,
    };
    if fits {
        Ok(())
    } else {
        Err(MetabatchError::Encoding(format!(
            "{} does not fit in {}",
            arg,
            ty.sol_type_name()
        )))
    }
}
