//! Element builder
//!
//! Instantiates one typed element from one serialized record and
//! recursively hydrates its substructure. The caller must have resolved
//! the required type set first; building dispatches on capability
//! presence, so an element may take any combination of the hydration
//! paths (body container, media object, choice sets, portable payload,
//! math, tooltip).

use serde_json::{Map, Value};

use crate::config::MAX_BUILD_DEPTH;
use crate::container;
use crate::error::{LoaderError, Result};
use crate::registry::{ElementFactory, ResolvedTypes};
use crate::types::{
    AlternateContent, Capability, Container, MathElement, MediaObject, PortableElement,
    TypedElement,
};

/// Builds typed elements against a resolved type set.
pub struct ElementBuilder<'a> {
    types: &'a ResolvedTypes,
}

impl<'a> ElementBuilder<'a> {
    /// Create a builder over a resolved type set.
    #[must_use]
    pub fn new(types: &'a ResolvedTypes) -> Self {
        Self { types }
    }

    /// Build one element from one serialized record.
    ///
    /// # Errors
    /// * `MalformedRecord` if `typeTag` or `id` is missing
    /// * `UnresolvedType` if the tag is absent from the resolved set
    pub fn build(&self, data: &Value) -> Result<TypedElement> {
        self.build_at(data, 0)
    }

    pub(crate) fn build_at(&self, data: &Value, depth: usize) -> Result<TypedElement> {
        if depth > MAX_BUILD_DEPTH {
            return Err(LoaderError::NestingTooDeep {
                limit: MAX_BUILD_DEPTH,
            });
        }
        let record = data
            .as_object()
            .ok_or_else(|| LoaderError::MalformedRecord("element record is not an object".into()))?;
        let type_tag = record
            .get("typeTag")
            .and_then(Value::as_str)
            .ok_or_else(|| LoaderError::MalformedRecord("record has no typeTag".into()))?;
        let id = record
            .get("id")
            .and_then(Value::as_str)
            .ok_or_else(|| {
                LoaderError::MalformedRecord(format!("'{type_tag}' record has no id"))
            })?;
        let factory = self
            .types
            .get(type_tag)
            .ok_or_else(|| LoaderError::UnresolvedType(type_tag.to_string()))?;

        let mut element = factory.instantiate(id);
        self.hydrate(&mut element, factory, record, depth)?;
        Ok(element)
    }

    fn hydrate(
        &self,
        element: &mut TypedElement,
        factory: &ElementFactory,
        record: &Map<String, Value>,
        depth: usize,
    ) -> Result<()> {
        merge_attributes(element, factory, record);

        if element.has(Capability::Container) {
            if let Some(body) = record.get("body") {
                container::load_container(self, element, body, depth)?;
            }
        }
        if element.has(Capability::MediaObject) {
            if let Some(object) = record.get("object") {
                element.object = Some(build_media_object(object, depth)?);
            }
        }
        if element.has(Capability::Interaction) {
            if element.has(Capability::BlockInteraction) {
                if let Some(prompt) = record.get("prompt") {
                    let mut prompt_container = Container::default();
                    container::hydrate(self, &mut prompt_container, prompt, depth)?;
                    element.prompt = Some(prompt_container);
                }
            }
            self.build_choice_sets(element, record, depth)?;
            if element.has(Capability::CustomInteraction) {
                element.portable = Some(hydrate_portable(record));
            }
        }
        if element.has(Capability::Choice) {
            if element.has(Capability::TextVariableChoice) {
                element.value = record.get("value").filter(|v| !v.is_null()).cloned();
            }
            if element.has(Capability::GapTextChoice) {
                // Back-compat: older documents carry the gap text as a
                // plain field instead of a body container.
                if let Some(text) = record.get("text").and_then(Value::as_str) {
                    let body = element.body.get_or_insert_with(Container::default);
                    if body.markup.is_empty() {
                        body.markup = text.to_string();
                    }
                }
            }
        }
        if element.has(Capability::Math) {
            element.math = Some(hydrate_math(record));
        }
        if element.has(Capability::InfoControl) {
            element.portable = Some(hydrate_portable(record));
        }
        if element.has(Capability::Tooltip) {
            element.content = record
                .get("content")
                .and_then(Value::as_str)
                .map(ToString::to_string);
        }
        Ok(())
    }

    fn build_choice_sets(
        &self,
        element: &mut TypedElement,
        record: &Map<String, Value>,
        depth: usize,
    ) -> Result<()> {
        if element.has(Capability::MatchGroup) {
            // Both parallel pools are required and built independently.
            let pools = record.get("choices").and_then(Value::as_array);
            for index in 0..2 {
                let pool = pools
                    .and_then(|p| p.get(index))
                    .and_then(Value::as_object)
                    .ok_or(LoaderError::MissingMatchSet { index })?;
                element.match_groups.push(self.build_pool(pool, depth)?);
            }
        } else if let Some(choices) = record.get("choices").and_then(Value::as_object) {
            element.choices = self.build_pool(choices, depth)?;
        }
        if element.has(Capability::GapImageGroup) {
            if let Some(pool) = record.get("gapImgs").and_then(Value::as_object) {
                element.gap_images = self.build_pool(pool, depth)?;
            }
        }
        Ok(())
    }

    fn build_pool(&self, pool: &Map<String, Value>, depth: usize) -> Result<Vec<TypedElement>> {
        pool.values()
            .map(|record| self.build_at(record, depth + 1))
            .collect()
    }
}

/// Merge declared defaults under explicit attributes: explicit values
/// always win, defaults only fill gaps.
fn merge_attributes(
    element: &mut TypedElement,
    factory: &ElementFactory,
    record: &Map<String, Value>,
) {
    if let Some(attributes) = record.get("attributes").and_then(Value::as_object) {
        element.attributes = attributes.clone();
    }
    for (key, value) in factory.defaults() {
        element
            .attributes
            .entry(key.clone())
            .or_insert_with(|| value.clone());
    }
}

fn build_media_object(data: &Value, depth: usize) -> Result<MediaObject> {
    if depth > MAX_BUILD_DEPTH {
        return Err(LoaderError::NestingTooDeep {
            limit: MAX_BUILD_DEPTH,
        });
    }
    let mut object = MediaObject::default();
    if let Some(attributes) = data.get("attributes").and_then(Value::as_object) {
        object.attributes = attributes.clone();
    }
    if let Some(alternate) = data.get("alternate").filter(|v| !v.is_null()) {
        let content = if looks_like_media_object(alternate) {
            AlternateContent::Object(build_media_object(alternate, depth + 1)?)
        } else {
            AlternateContent::Raw(alternate.clone())
        };
        object.alternate = Some(Box::new(content));
    }
    Ok(object)
}

fn looks_like_media_object(value: &Value) -> bool {
    value.get("attributes").is_some_and(Value::is_object)
}

fn hydrate_portable(record: &Map<String, Value>) -> PortableElement {
    let text = |name: &str| {
        record
            .get(name)
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string()
    };
    let mut portable = PortableElement {
        type_identifier: text("typeIdentifier"),
        markup: text("markup"),
        entry_point: text("entryPoint"),
        xmlns: text("xmlns"),
        libraries: record
            .get("libraries")
            .and_then(Value::as_array)
            .map(|libraries| {
                libraries
                    .iter()
                    .filter_map(Value::as_str)
                    .map(ToString::to_string)
                    .collect()
            })
            .unwrap_or_default(),
        properties: Map::new(),
    };
    if let Some(properties) = record.get("properties").and_then(Value::as_object) {
        for (key, value) in properties {
            // Property values arrive as strings; parse them as JSON
            // where possible and keep the raw string otherwise.
            let parsed = match value {
                Value::String(raw) => serde_json::from_str(raw).unwrap_or_else(|_| value.clone()),
                other => other.clone(),
            };
            portable.properties.insert(key.clone(), parsed);
        }
    }
    portable
}

fn hydrate_math(record: &Map<String, Value>) -> MathElement {
    let string_map = |name: &str| {
        record
            .get(name)
            .and_then(Value::as_object)
            .map(|map| {
                map.iter()
                    .filter_map(|(key, value)| {
                        value.as_str().map(|s| (key.clone(), s.to_string()))
                    })
                    .collect()
            })
            .unwrap_or_default()
    };
    MathElement {
        namespaces: string_map("namespaces"),
        markup: record
            .get("mathML")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string(),
        annotations: string_map("annotations"),
    }
}
