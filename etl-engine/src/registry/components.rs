//! Component catalogs mapping type names to constructors.

use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::debug;

use super::Registry;
use crate::pipeline::destinations::{InternalApiConfig, InternalApiDestination};
use crate::pipeline::sources::{self, RestSourceConfig};
use crate::pipeline::traits::{DataSource, Destination, Transformer};
use crate::pipeline::transformers::{FieldMapper, MapperConfig};
use crate::{Error, Result};

/// Opaque component configuration as read from a pipeline definition.
pub type ComponentConfig = Value;

pub type SourceFactory = Arc<dyn Fn(&ComponentConfig) -> Result<Arc<dyn DataSource>> + Send + Sync>;
pub type TransformerFactory =
    Arc<dyn Fn(&ComponentConfig) -> Result<Arc<dyn Transformer>> + Send + Sync>;
pub type DestinationFactory =
    Arc<dyn Fn(&ComponentConfig) -> Result<Arc<dyn Destination>> + Send + Sync>;

/// Deserialize a component's typed configuration.
fn typed_config<C: DeserializeOwned>(
    kind: &'static str,
    name: &str,
    config: &ComponentConfig,
) -> Result<C> {
    let config = if config.is_null() {
        Value::Object(Default::default())
    } else {
        config.clone()
    };
    serde_json::from_value(config)
        .map_err(|e| Error::config(format!("invalid config for {} '{}': {}", kind, name, e)))
}

macro_rules! component_registry {
    ($(#[$meta:meta])* $name:ident, $factory:ident, $component:ident, $kind:literal) => {
        $(#[$meta])*
        #[derive(Default)]
        pub struct $name {
            factories: Registry<$factory>,
        }

        impl $name {
            pub fn new() -> Self {
                Self::default()
            }

            /// Register a constructor taking the raw configuration value.
            pub fn register<F>(&self, name: impl Into<String>, factory: F) -> Result<()>
            where
                F: Fn(&ComponentConfig) -> Result<Arc<dyn $component>> + Send + Sync + 'static,
            {
                self.factories.register(name, Arc::new(factory) as $factory)
            }

            /// Register a constructor taking a strongly typed configuration.
            ///
            /// The configuration is deserialized into `C` before the
            /// constructor runs; deserialization failures are reported as
            /// configuration errors.
            pub fn register_typed<C, F>(&self, name: impl Into<String>, ctor: F) -> Result<()>
            where
                C: DeserializeOwned + 'static,
                F: Fn(C) -> Result<Arc<dyn $component>> + Send + Sync + 'static,
            {
                let name = name.into();
                let label = name.clone();
                self.register(name, move |config: &ComponentConfig| {
                    ctor(typed_config::<C>($kind, &label, config)?)
                })
            }

            /// Construct the component registered under `type_name`.
            pub fn create(
                &self,
                type_name: &str,
                config: &ComponentConfig,
            ) -> Result<Arc<dyn $component>> {
                let factory = self
                    .factories
                    .get(type_name)
                    .ok_or_else(|| Error::unknown_component($kind, type_name))?;
                debug!(kind = $kind, type_name, "Creating component");
                factory(config)
            }

            pub fn contains(&self, type_name: &str) -> bool {
                self.factories.contains(type_name)
            }

            pub fn remove(&self, type_name: &str) -> bool {
                self.factories.delete(type_name)
            }

            /// Registered type names, sorted.
            pub fn names(&self) -> Vec<String> {
                self.factories.get_all()
            }
        }
    };
}

component_registry!(
    /// Catalog of data source constructors.
    SourceRegistry,
    SourceFactory,
    DataSource,
    "source"
);

component_registry!(
    /// Catalog of transformer constructors.
    TransformerRegistry,
    TransformerFactory,
    Transformer,
    "transformer"
);

component_registry!(
    /// Catalog of destination constructors.
    DestinationRegistry,
    DestinationFactory,
    Destination,
    "destination"
);

/// The three component catalogs used to assemble pipelines.
#[derive(Default)]
pub struct ComponentRegistry {
    pub sources: SourceRegistry,
    pub transformers: TransformerRegistry,
    pub destinations: DestinationRegistry,
}

impl ComponentRegistry {
    /// Empty catalogs.
    pub fn new() -> Self {
        Self::default()
    }

    /// Catalogs with the built-in `rest_api`, `field_mapper` and
    /// `internal_api` components registered.
    pub fn with_defaults() -> Result<Self> {
        let registry = Self::new();

        registry
            .sources
            .register_typed::<RestSourceConfig, _>("rest_api", sources::rest_api)?;

        registry
            .transformers
            .register_typed("field_mapper", |config: MapperConfig| {
                Ok(Arc::new(FieldMapper::new(config)?) as Arc<dyn Transformer>)
            })?;

        registry
            .destinations
            .register_typed("internal_api", |config: InternalApiConfig| {
                Ok(Arc::new(InternalApiDestination::new(config)?) as Arc<dyn Destination>)
            })?;

        Ok(registry)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_defaults_registered() {
        let registry = ComponentRegistry::with_defaults().unwrap();
        assert_eq!(registry.sources.names(), vec!["rest_api"]);
        assert_eq!(registry.transformers.names(), vec!["field_mapper"]);
        assert_eq!(registry.destinations.names(), vec!["internal_api"]);
    }

    #[test]
    fn test_create_unknown_type() {
        let registry = ComponentRegistry::with_defaults().unwrap();
        let err = registry
            .sources
            .create("graphql", &json!({}))
            .err()
            .unwrap();
        assert!(matches!(
            err,
            Error::UnknownComponent {
                kind: "source",
                ..
            }
        ));
    }

    #[test]
    fn test_create_validates_config() {
        let registry = ComponentRegistry::with_defaults().unwrap();

        let err = registry
            .transformers
            .create("field_mapper", &json!({"mappings": "nope"}))
            .err()
            .unwrap();
        assert!(matches!(err, Error::Configuration(_)));

        let err = registry
            .destinations
            .create("internal_api", &json!({}))
            .err()
            .unwrap();
        assert!(matches!(err, Error::Configuration(_)));
    }

    #[test]
    fn test_create_builds_components() {
        let registry = ComponentRegistry::with_defaults().unwrap();

        let source = registry
            .sources
            .create(
                "rest_api",
                &json!({
                    "url": "https://api.example.com/users",
                    "pagination": {"type": "page", "page_size": 50}
                }),
            )
            .unwrap();
        assert_eq!(source.component_type(), "rest_api");
        assert_eq!(source.source_config()["max_pages"], 1000);

        let mapper = registry
            .transformers
            .create(
                "field_mapper",
                &json!({"mappings": [{"source": "id", "target": "user_id"}]}),
            )
            .unwrap();
        assert_eq!(
            mapper.transform(br#"{"id": 7, "x": 1}"#).unwrap(),
            br#"{"user_id":7}"#.to_vec()
        );
    }

    #[test]
    fn test_custom_registration_overrides() {
        let registry = ComponentRegistry::new();
        registry
            .transformers
            .register("identity", |_config: &ComponentConfig| {
                Err(Error::config("first"))
            })
            .unwrap();
        registry
            .transformers
            .register("identity", |_config: &ComponentConfig| {
                Err(Error::config("second"))
            })
            .unwrap();

        let err = registry
            .transformers
            .create("identity", &Value::Null)
            .err()
            .unwrap();
        assert_eq!(err.to_string(), "Configuration error: second");
        assert!(
            registry
                .transformers
                .register("", |_config: &ComponentConfig| Err(Error::config("x")))
                .is_err()
        );
    }
}
