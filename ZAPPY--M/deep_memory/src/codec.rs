//! MessagePack codec for record maps.
//!
//! Maps are written with named keys (`rmp_serde::to_vec_named`), so the bytes
//! are self-describing and `decode(encode(m)) == m` for any map of strings,
//! integers, floats, booleans, nulls, sequences and nested maps.

use crate::{
    error::DeepMemoryError,
    record::{RecordInput, RecordMap},
};

/// Encodes a record or plain map into MessagePack bytes.
pub fn encode(input: impl Into<RecordInput>) -> Result<Vec<u8>, DeepMemoryError> {
    encode_map(&input.into().into_map()?)
}

/// Encodes a plain map into MessagePack bytes.
pub fn encode_map(map: &RecordMap) -> Result<Vec<u8>, DeepMemoryError> {
    Ok(rmp_serde::to_vec_named(map)?)
}

/// Decodes MessagePack bytes back into a plain map.
pub fn decode(bytes: &[u8]) -> Result<RecordMap, DeepMemoryError> {
    rmp_serde::from_slice(bytes).map_err(|err| DeepMemoryError::integrity("msgpack decode", err))
}
