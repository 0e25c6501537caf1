use crate::api::error::ProtocolError;
use crate::api::schema::{Decode, Encode, Schema, SchemaType};

/// The shipped schema: JSON text frames via serde.
#[derive(Default)]
pub struct Json {}

impl Schema for Json {
    fn schema_type() -> SchemaType {
        SchemaType::Text
    }
}

impl<T> Encode<Json> for T
where
    T: serde::Serialize,
{
    fn encode(&self) -> Vec<u8> {
        serde_json::to_vec(self).expect("Should always be serializable")
    }
}

impl<T> Decode<Json> for T
where
    T: for<'de> serde::Deserialize<'de>,
{
    fn decode(buf: &[u8]) -> Result<Self, ProtocolError> {
        serde_json::from_slice(buf).map_err(|_| ProtocolError::DeserializationFailure)
    }
}
