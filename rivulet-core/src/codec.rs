use serde::de::DeserializeOwned;
use serde::Serialize;
use std::fmt;
use std::sync::Arc;

use crate::error::CodecError;

/// Pluggable message-to-bytes conversion.
///
/// Every log remembers the codec name of its first writer; opening an
/// appender or tailer with a different codec on the same log is rejected by
/// the manager rather than producing undecodable bytes.
pub trait Codec<M>: Send + Sync + fmt::Debug
where
    M: Serialize + DeserializeOwned,
{
    fn name(&self) -> &'static str;

    fn encode(&self, message: &M) -> Result<Vec<u8>, CodecError>;

    fn decode(&self, data: &[u8]) -> Result<M, CodecError>;
}

/// Native binary encoding, the same framing the file backend uses.
#[derive(Debug, Clone, Copy, Default)]
pub struct BincodeCodec;

impl<M> Codec<M> for BincodeCodec
where
    M: Serialize + DeserializeOwned,
{
    fn name(&self) -> &'static str {
        "bin"
    }

    fn encode(&self, message: &M) -> Result<Vec<u8>, CodecError> {
        bincode::serialize(message).map_err(|e| CodecError::Encode(e.to_string()))
    }

    fn decode(&self, data: &[u8]) -> Result<M, CodecError> {
        bincode::deserialize(data).map_err(|e| CodecError::Decode(e.to_string()))
    }
}

/// Human readable JSON text encoding.
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonCodec;

impl<M> Codec<M> for JsonCodec
where
    M: Serialize + DeserializeOwned,
{
    fn name(&self) -> &'static str {
        "json"
    }

    fn encode(&self, message: &M) -> Result<Vec<u8>, CodecError> {
        serde_json::to_vec(message).map_err(|e| CodecError::Encode(e.to_string()))
    }

    fn decode(&self, data: &[u8]) -> Result<M, CodecError> {
        serde_json::from_slice(data).map_err(|e| CodecError::Decode(e.to_string()))
    }
}

/// Compact schema-driven binary encoding.
#[derive(Debug, Clone, Copy, Default)]
pub struct MsgpackCodec;

impl<M> Codec<M> for MsgpackCodec
where
    M: Serialize + DeserializeOwned,
{
    fn name(&self) -> &'static str {
        "msgpack"
    }

    fn encode(&self, message: &M) -> Result<Vec<u8>, CodecError> {
        rmp_serde::to_vec(message).map_err(|e| CodecError::Encode(e.to_string()))
    }

    fn decode(&self, data: &[u8]) -> Result<M, CodecError> {
        rmp_serde::from_slice(data).map_err(|e| CodecError::Decode(e.to_string()))
    }
}

/// Pass-through marker: no codec was chosen, the backend-native encoding is
/// used as-is.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoCodec;

impl<M> Codec<M> for NoCodec
where
    M: Serialize + DeserializeOwned,
{
    fn name(&self) -> &'static str {
        "legacy"
    }

    fn encode(&self, message: &M) -> Result<Vec<u8>, CodecError> {
        bincode::serialize(message).map_err(|e| CodecError::Encode(e.to_string()))
    }

    fn decode(&self, data: &[u8]) -> Result<M, CodecError> {
        bincode::deserialize(data).map_err(|e| CodecError::Decode(e.to_string()))
    }
}

/// Codec used when the caller does not pick one.
pub fn default_codec<M>() -> Arc<dyn Codec<M>>
where
    M: Serialize + DeserializeOwned + 'static,
{
    Arc::new(NoCodec)
}
