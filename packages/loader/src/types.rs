//! Core data model for the item loader
//!
//! Live counterparts of the serialized records: typed elements with
//! capability sets, rich-text containers with anchored sub-elements,
//! and the declaration types (responses, outcomes, modal feedback) that
//! make up a loaded [`Item`] graph.
//!
//! Capabilities replace ad-hoc type-hierarchy checks: hydration and
//! dispatch test for capability presence, never for a concrete type
//! tag.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::{BTreeSet, HashMap};
use strum::{Display, EnumString};

/// Capability of an element kind.
///
/// An element may carry any number of these; the builder dispatches
/// hydration steps on capability presence.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum Capability {
    /// Hosts a body of rich markup with anchored sub-elements.
    Container,
    /// Carries an embedded media object descriptor.
    MediaObject,
    /// Interactive control bound to a response declaration.
    Interaction,
    /// Block-level interaction with a prompt container and choices.
    BlockInteraction,
    /// Portable custom interaction with an external payload.
    CustomInteraction,
    /// Interaction with two parallel choice pools (match shape).
    MatchGroup,
    /// Interaction with an auxiliary gap-image choice pool.
    GapImageGroup,
    /// Selectable choice inside an interaction.
    Choice,
    /// Choice carrying a scalar value.
    TextVariableChoice,
    /// Gap-text choice with the legacy plain-text body field.
    GapTextChoice,
    /// Mathematical markup element.
    Math,
    /// Portable info control with an external payload.
    InfoControl,
    /// Tooltip with a plain content string.
    Tooltip,
}

/// Rich-text container: an ordered markup string plus a map from anchor
/// id to the element attached at that anchor.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Container {
    /// Markup with `{{id}}` anchor placeholders.
    pub markup: String,
    /// Elements attached at their anchors.
    pub elements: HashMap<String, TypedElement>,
}

impl Container {
    /// Attach an element at its anchor.
    pub fn set_element(&mut self, anchor: impl Into<String>, element: TypedElement) {
        self.elements.insert(anchor.into(), element);
    }

    /// Look up the element attached at an anchor.
    #[must_use]
    pub fn element(&self, anchor: &str) -> Option<&TypedElement> {
        self.elements.get(anchor)
    }
}

/// Alternate content of a media object: either a nested media object or
/// opaque serialized data.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum AlternateContent {
    Object(MediaObject),
    Raw(Value),
}

/// Embedded media object descriptor.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct MediaObject {
    pub attributes: Map<String, Value>,
    pub alternate: Option<Box<AlternateContent>>,
}

/// Portable payload of a custom interaction or info control.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct PortableElement {
    pub type_identifier: String,
    pub markup: String,
    pub entry_point: String,
    pub libraries: Vec<String>,
    pub xmlns: String,
    /// Property values are opportunistically JSON-parsed; values that
    /// fail to parse stay as their raw string.
    pub properties: Map<String, Value>,
}

/// Mathematical markup element.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct MathElement {
    pub namespaces: HashMap<String, String>,
    pub markup: String,
    pub annotations: HashMap<String, String>,
}

/// A live, typed element of the item graph.
///
/// The `id` is globally unique within one item graph. Which of the
/// optional components are populated depends on the element's
/// capabilities.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct TypedElement {
    pub id: String,
    pub type_tag: String,
    pub capabilities: BTreeSet<Capability>,
    /// Attribute map; declared defaults merged under explicit values.
    pub attributes: Map<String, Value>,
    pub body: Option<Container>,
    pub object: Option<MediaObject>,
    pub prompt: Option<Container>,
    /// Primary choice set, in document order.
    pub choices: Vec<TypedElement>,
    /// The two parallel pools of a match-shape interaction.
    pub match_groups: Vec<Vec<TypedElement>>,
    /// Auxiliary gap-image pool.
    pub gap_images: Vec<TypedElement>,
    pub portable: Option<PortableElement>,
    pub math: Option<MathElement>,
    /// Scalar value of a text-variable choice.
    pub value: Option<Value>,
    /// Content string of a tooltip.
    pub content: Option<String>,
}

impl TypedElement {
    /// Create an element shell with a type tag and capabilities.
    #[must_use]
    pub fn new(
        id: impl Into<String>,
        type_tag: impl Into<String>,
        capabilities: BTreeSet<Capability>,
    ) -> Self {
        Self {
            id: id.into(),
            type_tag: type_tag.into(),
            capabilities,
            ..Self::default()
        }
    }

    /// Check whether this element carries a capability.
    #[must_use]
    pub fn has(&self, capability: Capability) -> bool {
        self.capabilities.contains(&capability)
    }

    /// Get an attribute value.
    #[must_use]
    pub fn attr(&self, name: &str) -> Option<&Value> {
        self.attributes.get(name)
    }

    /// Get a string attribute value.
    #[must_use]
    pub fn attr_str(&self, name: &str) -> Option<&str> {
        self.attributes.get(name).and_then(Value::as_str)
    }

    /// Find an element by id in this element's subtree (including
    /// itself).
    #[must_use]
    pub fn find(&self, id: &str) -> Option<&TypedElement> {
        if self.id == id {
            return Some(self);
        }
        let containers = self.body.iter().chain(self.prompt.iter());
        for container in containers {
            for element in container.elements.values() {
                if let Some(found) = element.find(id) {
                    return Some(found);
                }
            }
        }
        let pools = self
            .choices
            .iter()
            .chain(self.match_groups.iter().flatten())
            .chain(self.gap_images.iter());
        for element in pools {
            if let Some(found) = element.find(id) {
                return Some(found);
            }
        }
        None
    }
}

/// Cardinality of a response declaration.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, EnumString, Default,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum Cardinality {
    #[default]
    Single,
    Multiple,
    Ordered,
}

/// Canonical scoring pattern names.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, EnumString)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum ScoringTemplate {
    MatchCorrect,
    MapResponse,
    MapResponsePoint,
}

impl ScoringTemplate {
    /// Parse a legacy compatibility value.
    ///
    /// Older documents reference templates by lowercase name or by a
    /// full template URI; both map onto the canonical pattern.
    #[must_use]
    pub fn from_legacy(value: &str) -> Option<Self> {
        let name = value.rsplit('/').next().unwrap_or(value);
        match name.to_ascii_uppercase().as_str() {
            "MATCH_CORRECT" => Some(Self::MatchCorrect),
            "MAP_RESPONSE" => Some(Self::MapResponse),
            "MAP_RESPONSE_POINT" => Some(Self::MapResponsePoint),
            _ => None,
        }
    }
}

/// How the item's outcomes are computed from its responses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, EnumString)]
#[serde(rename_all = "camelCase")]
#[strum(serialize_all = "camelCase")]
pub enum ProcessingType {
    /// Scoring is regenerable from the declarations by convention.
    TemplateDriven,
    /// Scoring logic is opaque and preserved verbatim.
    Custom,
}

/// Response processing descriptor of a loaded item.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ResponseProcessing {
    pub processing_type: ProcessingType,
    /// Raw rule markup, retained byte-for-byte iff processing is
    /// custom.
    pub custom_markup: Option<String>,
}

/// Comparison kind of a simple feedback rule condition.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, EnumString,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum FeedbackConditionKind {
    Correct,
    Incorrect,
    Equal,
    Lt,
    Lte,
    Gt,
    Gte,
    Choices,
}

/// Condition of a simple feedback rule.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FeedbackCondition {
    pub kind: FeedbackConditionKind,
    pub compared_value: Option<Value>,
}

/// Simple feedback rule bound to a response declaration.
///
/// Holds references by identifier, never by containment: the outcome
/// and modal feedbacks live in the item's own collections.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FeedbackRule {
    pub id: String,
    pub condition: FeedbackCondition,
    /// Identifier of the outcome declaration this rule writes.
    pub outcome: String,
    /// Id of the modal feedback shown when the condition holds.
    pub feedback_then: Option<String>,
    /// Id of the modal feedback shown otherwise.
    pub feedback_else: Option<String>,
}

/// Expected-answer and scoring-shape metadata for one interactive
/// control.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ResponseDeclaration {
    pub id: String,
    pub identifier: String,
    pub cardinality: Cardinality,
    pub base_type: Option<String>,
    pub template: Option<ScoringTemplate>,
    pub correct_responses: Vec<Value>,
    pub default_value: Option<Value>,
    /// Value-mapping entries if non-empty, else area-mapping entries,
    /// else empty.
    pub map_entries: Map<String, Value>,
    pub mapping_attributes: Map<String, Value>,
    pub feedback_rules: Vec<FeedbackRule>,
    pub attributes: Map<String, Value>,
}

/// A named scoring variable of the item.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OutcomeDeclaration {
    pub id: String,
    pub identifier: String,
    pub default_value: Option<Value>,
    pub attributes: Map<String, Value>,
}

impl OutcomeDeclaration {
    /// Convert a built element into an outcome declaration.
    #[must_use]
    pub fn from_element(element: TypedElement, data: &Value) -> Self {
        let identifier = element.attr_str("identifier").unwrap_or_default().to_string();
        Self {
            id: element.id,
            identifier,
            default_value: data.get("defaultValue").filter(|v| !v.is_null()).cloned(),
            attributes: element.attributes,
        }
    }
}

/// A conditionally shown feedback panel.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ModalFeedback {
    pub id: String,
    pub identifier: String,
    pub body: Option<Container>,
    pub attributes: Map<String, Value>,
    /// Identifier of the outcome that gates this feedback's display.
    /// Display correlation only, never an ownership edge.
    pub related_outcome: Option<String>,
}

impl ModalFeedback {
    /// Convert a built element into a modal feedback.
    #[must_use]
    pub fn from_element(element: TypedElement) -> Self {
        let identifier = element.attr_str("identifier").unwrap_or_default().to_string();
        Self {
            id: element.id,
            identifier,
            body: element.body,
            attributes: element.attributes,
            related_outcome: None,
        }
    }
}

/// Stylesheet reference of an item.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Stylesheet {
    pub id: String,
    pub href: String,
    pub attributes: Map<String, Value>,
}

impl Stylesheet {
    /// Convert a built element into a stylesheet reference.
    #[must_use]
    pub fn from_element(element: TypedElement) -> Self {
        let href = element.attr_str("href").unwrap_or_default().to_string();
        Self {
            id: element.id,
            href,
            attributes: element.attributes,
        }
    }
}

/// One loaded assessment item: the root of the element graph.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Item {
    pub id: String,
    pub identifier: Option<String>,
    pub attributes: Map<String, Value>,
    pub body: Container,
    pub outcomes: Vec<OutcomeDeclaration>,
    pub feedbacks: Vec<ModalFeedback>,
    pub responses: Vec<ResponseDeclaration>,
    pub stylesheets: Vec<Stylesheet>,
    pub response_processing: ResponseProcessing,
    /// Pass-through serializer metadata, copied verbatim.
    pub namespaces: Map<String, Value>,
    pub schema_locations: Map<String, Value>,
    pub apip_accessibility: Option<String>,
}

impl Item {
    /// Find an element by id anywhere in the item's body graph.
    #[must_use]
    pub fn find_element(&self, id: &str) -> Option<&TypedElement> {
        self.body.elements.values().find_map(|e| e.find(id))
    }

    /// Look up a response declaration by its identifier.
    #[must_use]
    pub fn response(&self, identifier: &str) -> Option<&ResponseDeclaration> {
        self.responses.iter().find(|r| r.identifier == identifier)
    }

    /// Look up an outcome declaration by its identifier.
    #[must_use]
    pub fn outcome(&self, identifier: &str) -> Option<&OutcomeDeclaration> {
        self.outcomes.iter().find(|o| o.identifier == identifier)
    }

    /// Look up a modal feedback by its id.
    #[must_use]
    pub fn feedback(&self, id: &str) -> Option<&ModalFeedback> {
        self.feedbacks.iter().find(|f| f.id == id)
    }
}
