#![forbid(unsafe_code)]

//! Opaque tokenizer blobs (bincode).

use std::path::Path;

use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::error::{Result, TokenizerError};

/// Serialize `value` into a bincode blob.
pub fn to_bytes<T: Serialize>(value: &T) -> Result<Vec<u8>> {
    bincode::serialize(value).map_err(|e| TokenizerError::Serialization(e.to_string()))
}

/// Deserialize a blob produced by [`to_bytes`].
pub fn from_bytes<T: DeserializeOwned>(bytes: &[u8]) -> Result<T> {
    bincode::deserialize(bytes).map_err(|e| TokenizerError::Serialization(e.to_string()))
}

/// Write `value` to `path` as a single blob.
pub fn save<T: Serialize>(value: &T, path: impl AsRef<Path>) -> Result<()> {
    let bytes = to_bytes(value)?;
    std::fs::write(path, bytes)?;
    Ok(())
}

/// Read a blob written by [`save`].
pub fn load<T: DeserializeOwned>(path: impl AsRef<Path>) -> Result<T> {
    let bytes = std::fs::read(path)?;
    from_bytes(&bytes)
}
