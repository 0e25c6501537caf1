use crate::api::error::ProtocolError;

pub mod json;

/// Wire serialization scheme. Selects the transport framing and supplies
/// the blanket codec impls for everything serde can reach.
pub trait Schema {
    fn schema_type() -> SchemaType;
}

pub enum SchemaType {
    Text,
    Binary,
}

pub trait Decode<S>
where
    S: Schema,
    Self: Sized,
{
    fn decode(buf: &[u8]) -> Result<Self, ProtocolError>;
}

pub trait Encode<S>
where
    S: Schema,
{
    fn encode(&self) -> Vec<u8>;
}
