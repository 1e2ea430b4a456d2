//! JSON serialization for courier, backed by serde.
//!
//! [`JsonSerializer`] handles any `Serialize + DeserializeOwned` type and
//! registers for `application/json`, structured-syntax suffixes
//! (`application/*+json`), and the `*/json` wildcard. Collections map to
//! JSON arrays. When a request carries a field projection, top-level
//! object fields outside the projection are dropped before writing.

use std::marker::PhantomData;
use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde::Serialize;

use courier::serialization::{
    DeserializationContext, Deserializer, Registration, SerializationContext,
    SerializationError, Serializer, SerializerRegistry,
};
use courier::SerializedPayload;

pub const JSON_MEDIA_TYPES: &[&str] = &["application/json", "application/*+json", "*/json"];

pub struct JsonSerializer<T> {
    _marker: PhantomData<fn() -> T>,
}

impl<T> Default for JsonSerializer<T> {
    fn default() -> Self {
        Self { _marker: PhantomData }
    }
}

impl<T> JsonSerializer<T> {
    pub fn new() -> Self {
        Self::default()
    }
}

fn serialize_error<T>(error: serde_json::Error) -> SerializationError {
    SerializationError::Serialize {
        type_name: std::any::type_name::<T>(),
        reason: error.to_string(),
    }
}

fn deserialize_error<T>(error: serde_json::Error) -> SerializationError {
    SerializationError::Deserialize {
        type_name: std::any::type_name::<T>(),
        reason: error.to_string(),
    }
}

fn project_fields(value: serde_json::Value, fields: &[String]) -> serde_json::Value {
    match value {
        serde_json::Value::Object(map) => serde_json::Value::Object(
            map.into_iter()
                .filter(|(key, _)| fields.iter().any(|f| f == key))
                .collect(),
        ),
        other => other,
    }
}

fn to_payload<T: Serialize>(
    value: &T,
    ctx: &SerializationContext,
) -> Result<SerializedPayload, SerializationError> {
    let text = if ctx.fields().is_empty() {
        serde_json::to_string(value).map_err(serialize_error::<T>)?
    } else {
        let tree = serde_json::to_value(value).map_err(serialize_error::<T>)?;
        let projected = project_fields(tree, ctx.fields());
        serde_json::to_string(&projected).map_err(serialize_error::<T>)?
    };
    Ok(SerializedPayload::from_text(text))
}

impl<T> Serializer<T> for JsonSerializer<T>
where
    T: Serialize + Send + Sync + 'static,
{
    fn media_types(&self) -> &[&'static str] {
        JSON_MEDIA_TYPES
    }

    fn serialize(
        &self,
        value: &T,
        ctx: &SerializationContext,
    ) -> Result<SerializedPayload, SerializationError> {
        to_payload(value, ctx)
    }

    fn serialize_collection(
        &self,
        values: &[T],
        ctx: &SerializationContext,
    ) -> Result<SerializedPayload, SerializationError> {
        if ctx.fields().is_empty() {
            let text = serde_json::to_string(values).map_err(serialize_error::<T>)?;
            return Ok(SerializedPayload::from_text(text));
        }
        let mut projected = Vec::with_capacity(values.len());
        for value in values {
            let tree = serde_json::to_value(value).map_err(serialize_error::<T>)?;
            projected.push(project_fields(tree, ctx.fields()));
        }
        let text = serde_json::to_string(&projected).map_err(serialize_error::<T>)?;
        Ok(SerializedPayload::from_text(text))
    }
}

impl<T> Deserializer<T> for JsonSerializer<T>
where
    T: DeserializeOwned + Send + Sync + 'static,
{
    fn media_types(&self) -> &[&'static str] {
        JSON_MEDIA_TYPES
    }

    fn deserialize(
        &self,
        payload: &SerializedPayload,
        _ctx: &DeserializationContext,
    ) -> Result<T, SerializationError> {
        if payload.is_empty() {
            return Err(SerializationError::Deserialize {
                type_name: std::any::type_name::<T>(),
                reason: "empty payload".to_owned(),
            });
        }
        serde_json::from_str(payload.as_text()).map_err(deserialize_error::<T>)
    }

    fn deserialize_collection(
        &self,
        payload: &SerializedPayload,
        _ctx: &DeserializationContext,
    ) -> Result<Vec<T>, SerializationError> {
        if payload.is_empty() {
            return Ok(Vec::new());
        }
        serde_json::from_str(payload.as_text()).map_err(deserialize_error::<T>)
    }
}

/// Registers a JSON handler for `T` on the given registry.
pub fn register_json<T>(registry: &SerializerRegistry) -> Result<Registration, SerializationError>
where
    T: Serialize + DeserializeOwned + Send + Sync + 'static,
{
    registry.register::<T, _>(Arc::new(JsonSerializer::<T>::new()))
}
