//! Constructor argument encoding.

use alloy_core::{
    dyn_abi::{DynSolType, DynSolValue, Specifier},
    json_abi::JsonAbi,
    primitives::Bytes,
};
use serde_json::Value;

use crate::{
    artifact::ContractArtifact,
    error::{EngineError, Result},
};

/// Build the contract-creation payload: bytecode followed by the ABI-encoded
/// constructor arguments.
///
/// Arguments are JSON values coerced against the constructor's parameter
/// types. Large integers should be passed as strings.
pub fn deploy_data(artifact: &ContractArtifact, args: &[Value]) -> Result<Bytes> {
    let mut code = hex::decode(artifact.bytecode.trim_start_matches("0x")).map_err(|e| {
        EngineError::deployment(format!("invalid bytecode for {}: {}", artifact.name, e))
    })?;

    if code.is_empty() {
        return Err(EngineError::deployment(format!(
            "contract {} has no bytecode (abstract contract or interface?)",
            artifact.name
        )));
    }

    let abi: JsonAbi = serde_json::from_value(artifact.abi.clone())
        .map_err(|e| EngineError::deployment(format!("invalid ABI for {}: {}", artifact.name, e)))?;
    let params = abi
        .constructor
        .as_ref()
        .map(|constructor| constructor.inputs.as_slice())
        .unwrap_or_default();

    if params.len() != args.len() {
        return Err(EngineError::deployment(format!(
            "constructor of {} expects {} argument(s), got {}",
            artifact.name,
            params.len(),
            args.len()
        )));
    }

    let values = params
        .iter()
        .zip(args)
        .enumerate()
        .map(|(position, (param, arg))| {
            let ty = param.resolve().map_err(|e| {
                EngineError::deployment(format!("unsupported constructor parameter type: {}", e))
            })?;
            coerce(&ty, arg).map_err(|reason| {
                let name = if param.name.is_empty() {
                    format!("#{}", position)
                } else {
                    param.name.clone()
                };
                EngineError::deployment(format!(
                    "invalid constructor argument {} ({}): {}",
                    name, ty, reason
                ))
            })
        })
        .collect::<Result<Vec<_>>>()?;

    if !values.is_empty() {
        code.extend(DynSolValue::Tuple(values).abi_encode_params());
    }

    Ok(code.into())
}

fn coerce(ty: &DynSolType, arg: &Value) -> std::result::Result<DynSolValue, String> {
    let elements = |inner: &DynSolType, items: &[Value]| {
        items.iter().map(|item| coerce(inner, item)).collect::<std::result::Result<Vec<_>, _>>()
    };

    match (ty, arg) {
        (DynSolType::Array(inner), Value::Array(items)) => {
            elements(&**inner, items).map(DynSolValue::Array)
        }
        (DynSolType::FixedArray(inner, len), Value::Array(items)) if items.len() == *len => {
            elements(&**inner, items).map(DynSolValue::FixedArray)
        }
        (DynSolType::Tuple(types), Value::Array(items)) if items.len() == types.len() => types
            .iter()
            .zip(items)
            .map(|(ty, item)| coerce(ty, item))
            .collect::<std::result::Result<Vec<_>, _>>()
            .map(DynSolValue::Tuple),
        (_, Value::String(s)) => ty.coerce_str(s).map_err(|e| e.to_string()),
        (_, Value::Number(n)) => ty.coerce_str(&n.to_string()).map_err(|e| e.to_string()),
        (_, Value::Bool(b)) => ty
            .coerce_str(if *b { "true" } else { "false" })
            .map_err(|e| e.to_string()),
        (_, other) => Err(format!("cannot convert {} to {}", other, ty)),
    }
}
