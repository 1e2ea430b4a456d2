//! Contextual state handed to serializers.

use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::sync::{Arc, RwLock};

/// Factories for auxiliary instances a deserializer may need, keyed by
/// type. Registered once per session, consulted through the contexts.
#[derive(Default)]
pub struct Providers {
    factories: RwLock<HashMap<TypeId, Arc<dyn Fn() -> Box<dyn Any> + Send + Sync>>>,
}

impl Providers {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register<T: Any>(&self, factory: impl Fn() -> T + Send + Sync + 'static) {
        self.factories
            .write()
            .unwrap()
            .insert(TypeId::of::<T>(), Arc::new(move || Box::new(factory())));
    }

    pub fn instance<T: Any>(&self) -> Option<T> {
        let factory = self.factories.read().unwrap().get(&TypeId::of::<T>()).cloned()?;
        factory().downcast::<T>().ok().map(|boxed| *boxed)
    }

    pub fn has<T: Any>(&self) -> bool {
        self.factories.read().unwrap().contains_key(&TypeId::of::<T>())
    }
}

/// What a serializer needs to know about the request being written.
#[derive(Clone)]
pub struct SerializationContext {
    media_type: String,
    charset: String,
    fields: Vec<String>,
    providers: Arc<Providers>,
}

impl SerializationContext {
    pub fn new(
        media_type: impl Into<String>,
        charset: impl Into<String>,
        fields: Vec<String>,
        providers: Arc<Providers>,
    ) -> Self {
        Self {
            media_type: media_type.into(),
            charset: charset.into(),
            fields,
            providers,
        }
    }

    pub fn media_type(&self) -> &str {
        &self.media_type
    }

    pub fn charset(&self) -> &str {
        &self.charset
    }

    /// Requested field projection; empty means all fields.
    pub fn fields(&self) -> &[String] {
        &self.fields
    }

    pub fn providers(&self) -> &Providers {
        &self.providers
    }
}

/// What a deserializer needs to know about the response being read.
#[derive(Clone)]
pub struct DeserializationContext {
    media_type: String,
    charset: String,
    providers: Arc<Providers>,
}

impl DeserializationContext {
    pub fn new(
        media_type: impl Into<String>,
        charset: impl Into<String>,
        providers: Arc<Providers>,
    ) -> Self {
        Self {
            media_type: media_type.into(),
            charset: charset.into(),
            providers,
        }
    }

    pub fn media_type(&self) -> &str {
        &self.media_type
    }

    pub fn charset(&self) -> &str {
        &self.charset
    }

    pub fn providers(&self) -> &Providers {
        &self.providers
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn providers_build_fresh_instances() {
        let providers = Providers::new();
        providers.register(|| Vec::<u8>::with_capacity(16));
        let a = providers.instance::<Vec<u8>>().unwrap();
        let b = providers.instance::<Vec<u8>>().unwrap();
        assert_eq!(a, b);
        assert!(providers.has::<Vec<u8>>());
        assert!(!providers.has::<String>());
        assert!(providers.instance::<String>().is_none());
    }
}
