//! Type registry and resolver
//!
//! Maps element type tags to implementation locations and materializes
//! element factories on demand. Resolution is the loader's only
//! suspension point: all requested implementations are fetched
//! concurrently as one batch, then re-keyed by each factory's own
//! declared type tag (which may differ from the lookup key in edge
//! cases) before the resolved set is returned.
//!
//! The location table is additive: callers may register further
//! tag-to-location mappings at any time without clearing previously
//! registered ones. Resolved factories are cached for the lifetime of
//! the registry; partially resolved batches are never exposed.

use async_trait::async_trait;
use futures::future::try_join_all;
use serde_json::{Map, Value};
use std::collections::{BTreeSet, HashMap};
use std::sync::{Arc, Mutex, MutexGuard};

use crate::error::{LoaderError, Result};
use crate::types::{Capability, TypedElement};

/// Resolved factories, keyed by their declared type tag.
pub type ResolvedTypes = HashMap<String, Arc<ElementFactory>>;

/// A loadable element implementation: declared type tag, capability
/// set, and attribute defaults.
#[derive(Debug, Clone, PartialEq)]
pub struct ElementFactory {
    type_tag: String,
    capabilities: BTreeSet<Capability>,
    defaults: Map<String, Value>,
}

impl ElementFactory {
    /// Create a factory for a type tag with the given capabilities.
    #[must_use]
    pub fn new(
        type_tag: impl Into<String>,
        capabilities: impl IntoIterator<Item = Capability>,
    ) -> Self {
        Self {
            type_tag: type_tag.into(),
            capabilities: capabilities.into_iter().collect(),
            defaults: Map::new(),
        }
    }

    /// Add declared attribute defaults (merged under explicit values
    /// during hydration).
    #[must_use]
    pub fn with_defaults(mut self, defaults: Value) -> Self {
        if let Value::Object(map) = defaults {
            self.defaults = map;
        }
        self
    }

    /// The type tag this implementation declares for itself.
    #[must_use]
    pub fn type_tag(&self) -> &str {
        &self.type_tag
    }

    /// Declared attribute defaults.
    #[must_use]
    pub fn defaults(&self) -> &Map<String, Value> {
        &self.defaults
    }

    /// Check whether instances carry a capability.
    #[must_use]
    pub fn has(&self, capability: Capability) -> bool {
        self.capabilities.contains(&capability)
    }

    /// Instantiate an empty element with this factory's tag and
    /// capabilities.
    #[must_use]
    pub fn instantiate(&self, id: &str) -> TypedElement {
        TypedElement::new(id, &self.type_tag, self.capabilities.clone())
    }
}

/// Materializes element implementations from their locations.
///
/// The loader is injected into the registry so tests and embedders can
/// supply their own source of implementations.
#[async_trait]
pub trait FactoryLoader: Send + Sync {
    /// Fetch the implementation stored at a location.
    ///
    /// # Errors
    /// Returns `FactoryUnavailable` if the location cannot be
    /// materialized. The registry propagates this unchanged.
    async fn fetch(&self, location: &str) -> Result<Arc<ElementFactory>>;
}

/// In-memory factory source keyed by location.
#[derive(Default)]
pub struct MemoryFactoryLoader {
    factories: HashMap<String, Arc<ElementFactory>>,
}

impl MemoryFactoryLoader {
    /// Create an empty in-memory source.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Store a factory at a location.
    pub fn insert(&mut self, location: impl Into<String>, factory: ElementFactory) {
        self.factories.insert(location.into(), Arc::new(factory));
    }
}

#[async_trait]
impl FactoryLoader for MemoryFactoryLoader {
    async fn fetch(&self, location: &str) -> Result<Arc<ElementFactory>> {
        self.factories
            .get(location)
            .cloned()
            .ok_or_else(|| LoaderError::FactoryUnavailable {
                location: location.to_string(),
                reason: "not present in the in-memory set".to_string(),
            })
    }
}

/// Registry mapping type tags to implementation locations, with an
/// injected factory source and a process-lifetime resolution cache.
pub struct TypeRegistry {
    locations: HashMap<String, String>,
    loader: Arc<dyn FactoryLoader>,
    cache: Mutex<HashMap<String, Arc<ElementFactory>>>,
}

impl TypeRegistry {
    /// Create a registry with an empty location table.
    #[must_use]
    pub fn new(loader: Arc<dyn FactoryLoader>) -> Self {
        Self {
            locations: HashMap::new(),
            loader,
            cache: Mutex::new(HashMap::new()),
        }
    }

    /// Create a registry pre-wired with the standard element set.
    #[must_use]
    pub fn with_standard_set() -> Self {
        let mut source = MemoryFactoryLoader::new();
        let mut registry_locations = HashMap::new();
        for factory in standard_factories() {
            let location = format!("elements/{}", factory.type_tag());
            registry_locations.insert(factory.type_tag().to_string(), location.clone());
            source.insert(location, factory);
        }
        Self {
            locations: registry_locations,
            loader: Arc::new(source),
            cache: Mutex::new(HashMap::new()),
        }
    }

    /// Register a tag-to-location mapping. Additive: existing mappings
    /// for other tags are kept.
    pub fn register(&mut self, type_tag: impl Into<String>, location: impl Into<String>) {
        self.locations.insert(type_tag.into(), location.into());
    }

    /// Register several tag-to-location mappings at once.
    pub fn register_all<T, L>(&mut self, mappings: impl IntoIterator<Item = (T, L)>)
    where
        T: Into<String>,
        L: Into<String>,
    {
        for (tag, location) in mappings {
            self.register(tag, location);
        }
    }

    /// Look up the implementation location for a type tag.
    #[must_use]
    pub fn location(&self, type_tag: &str) -> Option<&str> {
        self.locations.get(type_tag).map(String::as_str)
    }

    /// Resolve the implementations for a set of type tags.
    ///
    /// All uncached implementations are fetched concurrently as one
    /// batch. The result is keyed by each factory's own declared type
    /// tag.
    ///
    /// # Errors
    /// Returns `UnknownType` if any tag has no registered location
    /// (a configuration defect, surfaced immediately and never
    /// retried); fetch failures propagate unchanged.
    pub async fn resolve(&self, type_tags: &BTreeSet<String>) -> Result<ResolvedTypes> {
        let mut locations = Vec::with_capacity(type_tags.len());
        for tag in type_tags {
            let location = self
                .locations
                .get(tag)
                .ok_or_else(|| LoaderError::UnknownType(tag.clone()))?;
            locations.push(location.clone());
        }
        locations.sort();
        locations.dedup();

        let mut factories: Vec<Arc<ElementFactory>> = Vec::with_capacity(locations.len());
        let mut missing: Vec<String> = Vec::new();
        {
            let cache = self.lock_cache();
            for location in &locations {
                match cache.get(location) {
                    Some(factory) => factories.push(Arc::clone(factory)),
                    None => missing.push(location.clone()),
                }
            }
        }

        if !missing.is_empty() {
            let fetched =
                try_join_all(missing.iter().map(|location| self.loader.fetch(location))).await?;
            let mut cache = self.lock_cache();
            for (location, factory) in missing.iter().zip(&fetched) {
                cache.insert(location.clone(), Arc::clone(factory));
            }
            factories.extend(fetched);
        }

        tracing::debug!(
            requested = type_tags.len(),
            fetched = factories.len(),
            "resolved element types"
        );

        let mut resolved = ResolvedTypes::with_capacity(factories.len());
        for factory in factories {
            resolved.insert(factory.type_tag().to_string(), factory);
        }
        Ok(resolved)
    }

    fn lock_cache(&self) -> MutexGuard<'_, HashMap<String, Arc<ElementFactory>>> {
        match self.cache.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

/// The standard element set: factories for the common element kinds
/// with their capabilities and attribute defaults.
#[must_use]
pub fn standard_factories() -> Vec<ElementFactory> {
    use Capability::*;
    use serde_json::json;

    vec![
        ElementFactory::new("assessmentItem", [Container])
            .with_defaults(json!({ "adaptive": false, "timeDependent": false })),
        ElementFactory::new("responseDeclaration", [])
            .with_defaults(json!({ "cardinality": "single" })),
        ElementFactory::new("outcomeDeclaration", [])
            .with_defaults(json!({ "cardinality": "single", "baseType": "float" })),
        ElementFactory::new("modalFeedback", [Container]),
        ElementFactory::new("stylesheet", [])
            .with_defaults(json!({ "media": "screen", "type": "text/css" })),
        ElementFactory::new("rubricBlock", [Container]),
        // Interactions
        ElementFactory::new("choiceInteraction", [Interaction, BlockInteraction])
            .with_defaults(json!({ "shuffle": false, "maxChoices": 1 })),
        ElementFactory::new("orderInteraction", [Interaction, BlockInteraction])
            .with_defaults(json!({ "shuffle": false })),
        ElementFactory::new(
            "matchInteraction",
            [Interaction, BlockInteraction, MatchGroup],
        )
        .with_defaults(json!({ "shuffle": false, "maxAssociations": 1 })),
        ElementFactory::new("gapMatchInteraction", [Interaction, BlockInteraction]),
        ElementFactory::new(
            "graphicGapMatchInteraction",
            [Interaction, BlockInteraction, GapImageGroup, MediaObject],
        ),
        ElementFactory::new(
            "hotspotInteraction",
            [Interaction, BlockInteraction, MediaObject],
        )
        .with_defaults(json!({ "maxChoices": 1 })),
        ElementFactory::new("textEntryInteraction", [Interaction])
            .with_defaults(json!({ "base": 10 })),
        ElementFactory::new("extendedTextInteraction", [Interaction]),
        ElementFactory::new("inlineChoiceInteraction", [Interaction])
            .with_defaults(json!({ "shuffle": false })),
        ElementFactory::new("customInteraction", [Interaction, CustomInteraction]),
        ElementFactory::new("infoControl", [InfoControl]),
        // Choices
        ElementFactory::new("simpleChoice", [Choice, Container]),
        ElementFactory::new("simpleAssociableChoice", [Choice, Container])
            .with_defaults(json!({ "matchMax": 1 })),
        ElementFactory::new("inlineChoice", [Choice, Container]),
        ElementFactory::new("hotspotChoice", [Choice]),
        ElementFactory::new("associableHotspot", [Choice])
            .with_defaults(json!({ "matchMax": 1 })),
        ElementFactory::new("gap", [Choice]),
        ElementFactory::new("gapText", [Choice, GapTextChoice, Container])
            .with_defaults(json!({ "matchMax": 1 })),
        ElementFactory::new("gapImg", [Choice, MediaObject]),
        ElementFactory::new("textVariable", [Choice, TextVariableChoice]),
        // Standalone body elements
        ElementFactory::new("math", [Math]),
        ElementFactory::new("tooltip", [Tooltip]),
        ElementFactory::new("img", []),
        ElementFactory::new("table", [Container]),
    ]
}
