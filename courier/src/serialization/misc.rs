//! Built-in serializers.

use super::{
    DeserializationContext, SerializationContext, SerializationError, Serializer, Deserializer,
};
use crate::payload::SerializedPayload;

/// Plain-text passthrough for `String` payloads, covering `text/*`.
/// Collections join and split on newlines.
pub struct TextSerializer;

impl Serializer<String> for TextSerializer {
    fn media_types(&self) -> &[&'static str] {
        &["text/*"]
    }

    fn serialize(
        &self,
        value: &String,
        _ctx: &SerializationContext,
    ) -> Result<SerializedPayload, SerializationError> {
        Ok(SerializedPayload::from_text(value.clone()))
    }

    fn serialize_collection(
        &self,
        values: &[String],
        _ctx: &SerializationContext,
    ) -> Result<SerializedPayload, SerializationError> {
        Ok(SerializedPayload::from_text(values.join("\n")))
    }
}

impl Deserializer<String> for TextSerializer {
    fn media_types(&self) -> &[&'static str] {
        &["text/*"]
    }

    fn deserialize(
        &self,
        payload: &SerializedPayload,
        _ctx: &DeserializationContext,
    ) -> Result<String, SerializationError> {
        Ok(payload.as_text().to_owned())
    }

    fn deserialize_collection(
        &self,
        payload: &SerializedPayload,
        _ctx: &DeserializationContext,
    ) -> Result<Vec<String>, SerializationError> {
        if payload.is_empty() {
            return Ok(Vec::new());
        }
        Ok(payload.as_text().split('\n').map(str::to_owned).collect())
    }
}

/// Accepts any media type and produces nothing; lets callers fire
/// requests whose response body is irrelevant.
pub struct VoidSerializer;

impl Serializer<()> for VoidSerializer {
    fn media_types(&self) -> &[&'static str] {
        &["*/*"]
    }

    fn serialize(
        &self,
        _value: &(),
        _ctx: &SerializationContext,
    ) -> Result<SerializedPayload, SerializationError> {
        Ok(SerializedPayload::empty())
    }

    fn serialize_collection(
        &self,
        _values: &[()],
        _ctx: &SerializationContext,
    ) -> Result<SerializedPayload, SerializationError> {
        Ok(SerializedPayload::empty())
    }
}

impl Deserializer<()> for VoidSerializer {
    fn media_types(&self) -> &[&'static str] {
        &["*/*"]
    }

    fn deserialize(
        &self,
        _payload: &SerializedPayload,
        _ctx: &DeserializationContext,
    ) -> Result<(), SerializationError> {
        Ok(())
    }

    fn deserialize_collection(
        &self,
        _payload: &SerializedPayload,
        _ctx: &DeserializationContext,
    ) -> Result<Vec<()>, SerializationError> {
        Ok(Vec::new())
    }
}
