// Generic object codec
//
// bincode over the serde-serializable child forms. Compiled units have no
// serde impls, so they cannot reach this codec.

use crate::codegen::state::ChildState;
use crate::core::error::{CodegenError, Result};

pub fn encode_object(value: &ChildState) -> Result<Vec<u8>> {
    bincode::serialize(value).map_err(|e| CodegenError::Encode(e.to_string()))
}

pub fn decode_object(bytes: &[u8]) -> Result<ChildState> {
    Ok(bincode::deserialize(bytes)?)
}
