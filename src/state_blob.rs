//! Versioned, opaque state blobs for unit serialization.
//!
//! A blob is the bincode encoding of `(version, model)`. Decoding checks the
//! version tag before touching the payload, so a blob from an incompatible
//! model revision is rejected instead of misinterpreted.

use serde::{de::DeserializeOwned, Serialize};

use crate::status::UnitError;

pub fn encode<T: Serialize>(version: u16, model: &T) -> Result<Vec<u8>, UnitError> {
    bincode::serialize(&(version, model)).map_err(|e| UnitError::InvalidStateBlob(e.to_string()))
}

pub fn decode<T: DeserializeOwned>(version: u16, bytes: &[u8]) -> Result<T, UnitError> {
    let (found, model): (u16, T) =
        bincode::deserialize(bytes).map_err(|e| UnitError::InvalidStateBlob(e.to_string()))?;
    if found != version {
        return Err(UnitError::InvalidStateBlob(format!(
            "state version {found} does not match expected {version}"
        )));
    }
    Ok(model)
}
