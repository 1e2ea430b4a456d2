//! Registry resolving serializers by payload type and media type.

use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock, Weak};

use super::{
    Deserializer, MediaTypePattern, SerializationError, Serializer, TextSerializer, VoidSerializer,
};

struct Entry {
    pattern: MediaTypePattern,
    // Arc<dyn Serializer<T>> or Arc<dyn Deserializer<T>>, erased.
    handler: Arc<dyn Any + Send + Sync>,
    id: u64,
}

#[derive(Default)]
struct Inner {
    serializers: RwLock<HashMap<TypeId, Vec<Entry>>>,
    deserializers: RwLock<HashMap<TypeId, Vec<Entry>>>,
    next_id: AtomicU64,
}

/// Shared registry of serializers and deserializers.
///
/// Entries for a payload type are kept sorted most-specific-first, so a
/// lookup with a concrete media type prefers `application/json` over
/// `*/json` over `*/*` regardless of registration order. Registering
/// returns a [`Registration`] handle that can later unregister the entry.
#[derive(Clone, Default)]
pub struct SerializerRegistry {
    inner: Arc<Inner>,
}

impl SerializerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// A registry preloaded with the plain-text and void handlers every
    /// session needs.
    pub fn with_defaults() -> Self {
        let registry = Self::new();
        registry
            .register(Arc::new(TextSerializer))
            .expect("builtin media types are valid");
        registry
            .register(Arc::new(VoidSerializer))
            .expect("builtin media types are valid");
        registry
    }

    /// Registers a combined serializer/deserializer for `T`.
    pub fn register<T, S>(&self, handler: Arc<S>) -> Result<Registration, SerializationError>
    where
        T: 'static,
        S: Serializer<T> + Deserializer<T> + 'static,
    {
        let mut registration = self.register_serializer::<T>(handler.clone())?;
        let deser = self.register_deserializer::<T>(handler)?;
        registration.absorb(deser);
        Ok(registration)
    }

    pub fn register_serializer<T: 'static>(
        &self,
        serializer: Arc<dyn Serializer<T>>,
    ) -> Result<Registration, SerializationError> {
        let media_types = serializer.media_types().to_vec();
        let handler: Arc<dyn Any + Send + Sync> = Arc::new(serializer);
        self.insert(
            &self.inner.serializers,
            TypeId::of::<T>(),
            &media_types,
            handler,
            RegistrationSide::Serializer,
        )
    }

    pub fn register_deserializer<T: 'static>(
        &self,
        deserializer: Arc<dyn Deserializer<T>>,
    ) -> Result<Registration, SerializationError> {
        let media_types = deserializer.media_types().to_vec();
        let handler: Arc<dyn Any + Send + Sync> = Arc::new(deserializer);
        self.insert(
            &self.inner.deserializers,
            TypeId::of::<T>(),
            &media_types,
            handler,
            RegistrationSide::Deserializer,
        )
    }

    fn insert(
        &self,
        table: &RwLock<HashMap<TypeId, Vec<Entry>>>,
        type_id: TypeId,
        media_types: &[&str],
        handler: Arc<dyn Any + Send + Sync>,
        side: RegistrationSide,
    ) -> Result<Registration, SerializationError> {
        let mut patterns = Vec::with_capacity(media_types.len());
        for media_type in media_types {
            patterns.push(MediaTypePattern::parse(media_type)?);
        }
        let mut ids = Vec::with_capacity(patterns.len());
        let mut entries = table.write().unwrap();
        let slot = entries.entry(type_id).or_default();
        for pattern in patterns {
            let id = self.inner.next_id.fetch_add(1, Ordering::Relaxed);
            ids.push((type_id, id));
            let at = slot
                .binary_search_by(|e| e.pattern.cmp(&pattern))
                .unwrap_or_else(|i| i);
            slot.insert(at, Entry { pattern, handler: handler.clone(), id });
        }
        Ok(Registration {
            inner: Arc::downgrade(&self.inner),
            serializer_ids: if side == RegistrationSide::Serializer { ids.clone() } else { Vec::new() },
            deserializer_ids: if side == RegistrationSide::Deserializer { ids } else { Vec::new() },
        })
    }

    pub fn serializer_for<T: 'static>(
        &self,
        media_type: &str,
    ) -> Result<Arc<dyn Serializer<T>>, SerializationError> {
        let target = MediaTypePattern::parse(media_type)?;
        let entries = self.inner.serializers.read().unwrap();
        lookup::<Arc<dyn Serializer<T>>>(&entries, TypeId::of::<T>(), &target).ok_or_else(|| {
            SerializationError::NoSerializer {
                type_name: std::any::type_name::<T>(),
                media_type: media_type.to_owned(),
            }
        })
    }

    pub fn deserializer_for<T: 'static>(
        &self,
        media_type: &str,
    ) -> Result<Arc<dyn Deserializer<T>>, SerializationError> {
        let target = MediaTypePattern::parse(media_type)?;
        let entries = self.inner.deserializers.read().unwrap();
        lookup::<Arc<dyn Deserializer<T>>>(&entries, TypeId::of::<T>(), &target).ok_or_else(|| {
            SerializationError::NoDeserializer {
                type_name: std::any::type_name::<T>(),
                media_type: media_type.to_owned(),
            }
        })
    }
}

fn lookup<H: Clone + 'static>(
    entries: &HashMap<TypeId, Vec<Entry>>,
    type_id: TypeId,
    target: &MediaTypePattern,
) -> Option<H> {
    entries
        .get(&type_id)?
        .iter()
        .find(|entry| entry.pattern.matches(target))
        .and_then(|entry| entry.handler.downcast_ref::<H>().cloned())
}

#[derive(PartialEq, Eq)]
enum RegistrationSide {
    Serializer,
    Deserializer,
}

/// Handle to one or more registry entries; [`cancel`](Registration::cancel)
/// removes them.
pub struct Registration {
    inner: Weak<Inner>,
    serializer_ids: Vec<(TypeId, u64)>,
    deserializer_ids: Vec<(TypeId, u64)>,
}

impl Registration {
    fn absorb(&mut self, other: Registration) {
        self.serializer_ids.extend(other.serializer_ids);
        self.deserializer_ids.extend(other.deserializer_ids);
    }

    pub fn cancel(self) {
        let Some(inner) = self.inner.upgrade() else {
            return;
        };
        remove_ids(&inner.serializers, &self.serializer_ids);
        remove_ids(&inner.deserializers, &self.deserializer_ids);
    }
}

fn remove_ids(table: &RwLock<HashMap<TypeId, Vec<Entry>>>, ids: &[(TypeId, u64)]) {
    let mut entries = table.write().unwrap();
    for (type_id, id) in ids {
        if let Some(slot) = entries.get_mut(type_id) {
            slot.retain(|entry| entry.id != *id);
        }
    }
}
