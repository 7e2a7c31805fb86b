//! Item assembler
//!
//! Top-level orchestration of one item load. The order is load-bearing:
//! scan and resolve the required types, retire any previously loaded
//! item under the same id, build the body, then outcomes, modal
//! feedbacks and stylesheets, then reconcile the responses (feedback
//! resolution depends on the outcome and feedback collections already
//! existing), and finally classify the response processing.
//!
//! A failed load aborts the whole item; partial graphs are never
//! stored or returned.

use serde_json::Value;
use std::collections::HashMap;

use crate::element::ElementBuilder;
use crate::error::{LoaderError, Result};
use crate::registry::TypeRegistry;
use crate::response::ResponseReconciler;
use crate::scan;
use crate::types::{
    Item, ModalFeedback, OutcomeDeclaration, ProcessingType, ResponseProcessing, Stylesheet,
};

/// Loads serialized item documents into typed element graphs.
///
/// The loader owns the type registry and the store of loaded items.
/// Reloading a document under an already-used id first retires the
/// previous graph, so a reload is idempotent and leaves no duplicate
/// entry.
pub struct ItemLoader {
    registry: TypeRegistry,
    items: HashMap<String, Item>,
}

impl ItemLoader {
    /// Create a loader over a type registry.
    #[must_use]
    pub fn new(registry: TypeRegistry) -> Self {
        Self {
            registry,
            items: HashMap::new(),
        }
    }

    /// Create a loader pre-wired with the standard element set.
    #[must_use]
    pub fn with_standard_set() -> Self {
        Self::new(TypeRegistry::with_standard_set())
    }

    /// The underlying type registry.
    #[must_use]
    pub fn registry(&self) -> &TypeRegistry {
        &self.registry
    }

    /// Mutable access to the registry, e.g. to register additional
    /// element types between loads.
    pub fn registry_mut(&mut self) -> &mut TypeRegistry {
        &mut self.registry
    }

    /// A previously loaded item.
    #[must_use]
    pub fn item(&self, id: &str) -> Option<&Item> {
        self.items.get(id)
    }

    /// Number of currently loaded items.
    #[must_use]
    pub fn len(&self) -> usize {
        self.items.len()
    }

    /// Whether no item is currently loaded.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Load one serialized item document into a typed graph.
    ///
    /// # Errors
    /// Any error aborts the whole load: the item store is left without
    /// an entry for the document's id.
    pub async fn load(&mut self, data: &Value) -> Result<&Item> {
        let record = data
            .as_object()
            .ok_or_else(|| LoaderError::MalformedRecord("item record is not an object".into()))?;
        let id = record
            .get("id")
            .and_then(Value::as_str)
            .ok_or_else(|| LoaderError::MalformedRecord("item record has no id".into()))?
            .to_string();

        let required = scan::required_types(data)?;
        let resolved = self.registry.resolve(&required).await?;

        // Idempotent reload: retire the previous graph before building
        if self.items.remove(&id).is_some() {
            tracing::debug!(item = %id, "retired previously loaded item");
        }

        let builder = ElementBuilder::new(&resolved);
        let mut root = builder.build(data)?;
        let identifier = root.attr_str("identifier").map(ToString::to_string);
        let body = root.body.take().unwrap_or_default();

        let mut outcomes = Vec::new();
        if let Some(records) = record.get("outcomes").and_then(Value::as_object) {
            for outcome_record in records.values() {
                let element = builder.build(outcome_record)?;
                outcomes.push(OutcomeDeclaration::from_element(element, outcome_record));
            }
        }

        let mut feedbacks = Vec::new();
        if let Some(records) = record.get("feedbacks").and_then(Value::as_object) {
            for feedback_record in records.values() {
                feedbacks.push(ModalFeedback::from_element(builder.build(feedback_record)?));
            }
        }

        let mut stylesheets = Vec::new();
        if let Some(records) = record.get("stylesheets").and_then(Value::as_object) {
            for stylesheet_record in records.values() {
                stylesheets.push(Stylesheet::from_element(builder.build(stylesheet_record)?));
            }
        }

        let mut reconciler = ResponseReconciler::from_item_data(data);
        let mut responses = Vec::new();
        if let Some(records) = record.get("responses").and_then(Value::as_object) {
            for response_record in records.values() {
                responses.push(reconciler.reconcile(
                    &builder,
                    response_record,
                    &outcomes,
                    &mut feedbacks,
                )?);
            }
        }

        let processing_type = reconciler.classify(&responses);
        // Custom processing round-trips the raw markup byte-for-byte;
        // template-driven scoring is regenerable and keeps none.
        let custom_markup = match processing_type {
            ProcessingType::Custom => record
                .get("responseProcessing")
                .and_then(|p| p.get("xml"))
                .and_then(Value::as_str)
                .map(ToString::to_string),
            ProcessingType::TemplateDriven => None,
        };

        let item = Item {
            id: id.clone(),
            identifier,
            attributes: root.attributes,
            body,
            outcomes,
            feedbacks,
            responses,
            stylesheets,
            response_processing: ResponseProcessing {
                processing_type,
                custom_markup,
            },
            namespaces: object_field(record.get("namespaces")),
            schema_locations: object_field(record.get("schemaLocations")),
            apip_accessibility: record
                .get("apipAccessibility")
                .and_then(Value::as_str)
                .map(ToString::to_string),
        };

        tracing::info!(
            item = %id,
            processing = %item.response_processing.processing_type,
            responses = item.responses.len(),
            "loaded assessment item"
        );

        Ok(self.items.entry(id).or_insert(item))
    }
}

fn object_field(value: Option<&Value>) -> serde_json::Map<String, Value> {
    value
        .and_then(Value::as_object)
        .cloned()
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::ScoringTemplate;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    /// A single-choice item with one match-correct scoring rule and one
    /// simple feedback rule.
    fn choice_item() -> Value {
        json!({
            "typeTag": "assessmentItem",
            "id": "item_1",
            "attributes": { "identifier": "colour-question", "title": "Colours" },
            "namespaces": { "m": "http://www.w3.org/1998/Math/MathML" },
            "schemaLocations": {},
            "body": {
                "body": "<p>{{int_1}}</p>",
                "elements": {
                    "int_1": {
                        "typeTag": "choiceInteraction",
                        "id": "int_1",
                        "attributes": { "responseIdentifier": "R1" },
                        "prompt": { "body": "Pick the warm colour", "elements": {} },
                        "choices": {
                            "choice_1": {
                                "typeTag": "simpleChoice",
                                "id": "choice_1",
                                "attributes": { "identifier": "RED" },
                                "body": { "body": "Red", "elements": {} }
                            },
                            "choice_2": {
                                "typeTag": "simpleChoice",
                                "id": "choice_2",
                                "attributes": { "identifier": "BLUE" },
                                "body": { "body": "Blue", "elements": {} }
                            }
                        }
                    }
                }
            },
            "outcomes": {
                "out_1": {
                    "typeTag": "outcomeDeclaration",
                    "id": "out_1",
                    "attributes": { "identifier": "SCORE" },
                    "defaultValue": 0
                },
                "out_2": {
                    "typeTag": "outcomeDeclaration",
                    "id": "out_2",
                    "attributes": { "identifier": "FEEDBACK_1" }
                }
            },
            "feedbacks": {
                "fb_1": {
                    "typeTag": "modalFeedback",
                    "id": "fb_1",
                    "attributes": { "identifier": "wellDone" },
                    "body": { "body": "Well done!", "elements": {} }
                }
            },
            "stylesheets": {
                "style_1": {
                    "typeTag": "stylesheet",
                    "id": "style_1",
                    "attributes": { "href": "style/custom.css" }
                }
            },
            "responses": {
                "resp_1": {
                    "typeTag": "responseDeclaration",
                    "id": "resp_1",
                    "attributes": {
                        "identifier": "R1",
                        "cardinality": "single",
                        "baseType": "identifier"
                    },
                    "correctResponses": ["RED"],
                    "feedbackRules": {
                        "rule_1": {
                            "condition": "correct",
                            "feedbackOutcome": "FEEDBACK_1",
                            "feedbackThen": "fb_1"
                        }
                    }
                }
            },
            "responseProcessing": {
                "processingType": "templateDriven",
                "responseRules": [
                    {
                        "typeTag": "responseCondition",
                        "responseIf": {
                            "expression": {
                                "typeTag": "match",
                                "expressions": [
                                    { "typeTag": "variable", "attributes": { "identifier": "R1" } },
                                    { "typeTag": "correct", "attributes": { "identifier": "R1" } }
                                ]
                            },
                            "responseRules": [
                                {
                                    "typeTag": "setOutcomeValue",
                                    "attributes": { "identifier": "SCORE_R1" },
                                    "expression": { "typeTag": "baseValue", "value": 1 }
                                }
                            ]
                        }
                    },
                    {
                        "typeTag": "responseCondition",
                        "responseIf": {
                            "expression": {
                                "typeTag": "equal",
                                "expressions": [
                                    { "typeTag": "variable", "attributes": { "identifier": "R_NONE" } },
                                    { "typeTag": "baseValue", "value": "X" }
                                ]
                            },
                            "responseRules": [
                                {
                                    "typeTag": "setOutcomeValue",
                                    "attributes": { "identifier": "FEEDBACK_1" },
                                    "expression": { "typeTag": "baseValue", "value": true }
                                }
                            ]
                        }
                    }
                ],
                "xml": "<responseProcessing>original</responseProcessing>"
            }
        })
    }

    #[tokio::test]
    async fn test_load_assembles_full_graph() {
        let mut loader = ItemLoader::with_standard_set();
        let item = loader.load(&choice_item()).await.unwrap();

        assert_eq!(item.id, "item_1");
        assert_eq!(item.identifier.as_deref(), Some("colour-question"));
        assert_eq!(item.body.markup, "<p>{{int_1}}</p>");
        assert_eq!(item.outcomes.len(), 2);
        assert_eq!(item.feedbacks.len(), 1);
        assert_eq!(item.stylesheets.len(), 1);
        assert_eq!(item.stylesheets[0].href, "style/custom.css");
        assert_eq!(item.responses.len(), 1);
        assert_eq!(
            item.responses[0].template,
            Some(ScoringTemplate::MatchCorrect)
        );
        assert_eq!(
            item.namespaces.get("m"),
            Some(&json!("http://www.w3.org/1998/Math/MathML"))
        );
    }

    #[tokio::test]
    async fn test_load_classifies_template_driven_and_drops_raw_markup() {
        let mut loader = ItemLoader::with_standard_set();
        let item = loader.load(&choice_item()).await.unwrap();

        // The match rule is claimed by R1, the trigger rule by its
        // feedback: nothing is left, so scoring is regenerable.
        assert_eq!(
            item.response_processing.processing_type,
            ProcessingType::TemplateDriven
        );
        assert_eq!(item.response_processing.custom_markup, None);
    }

    #[tokio::test]
    async fn test_load_preserves_raw_markup_for_custom_processing() {
        let mut data = choice_item();
        data["responseProcessing"]["responseRules"]
            .as_array_mut()
            .unwrap()
            .push(json!({
                "typeTag": "setOutcomeValue",
                "attributes": { "identifier": "BONUS" },
                "expression": { "typeTag": "baseValue", "value": 5 }
            }));

        let mut loader = ItemLoader::with_standard_set();
        let item = loader.load(&data).await.unwrap();

        assert_eq!(
            item.response_processing.processing_type,
            ProcessingType::Custom
        );
        assert_eq!(
            item.response_processing.custom_markup.as_deref(),
            Some("<responseProcessing>original</responseProcessing>")
        );
    }

    #[tokio::test]
    async fn test_reload_is_idempotent() {
        let mut loader = ItemLoader::with_standard_set();
        let data = choice_item();

        let first = loader.load(&data).await.unwrap().clone();
        let second = loader.load(&data).await.unwrap().clone();

        assert_eq!(first, second);
        assert_eq!(loader.len(), 1);
    }

    #[tokio::test]
    async fn test_feedback_back_reference_is_set() {
        let mut loader = ItemLoader::with_standard_set();
        let item = loader.load(&choice_item()).await.unwrap();

        let feedback = item.feedback("fb_1").unwrap();
        assert_eq!(feedback.related_outcome.as_deref(), Some("FEEDBACK_1"));
    }

    #[tokio::test]
    async fn test_find_element_resolves_nested_ids() {
        let mut loader = ItemLoader::with_standard_set();
        let item = loader.load(&choice_item()).await.unwrap();

        assert_eq!(item.find_element("int_1").map(|e| e.type_tag.as_str()), Some("choiceInteraction"));
        assert_eq!(item.find_element("choice_2").map(|e| e.id.as_str()), Some("choice_2"));
        assert!(item.find_element("nope").is_none());
    }

    #[tokio::test]
    async fn test_load_fails_on_unknown_type_without_storing() {
        let mut data = choice_item();
        data["body"]["elements"]["int_1"]["typeTag"] = json!("holographicInteraction");

        let mut loader = ItemLoader::with_standard_set();
        let result = loader.load(&data).await;

        assert!(matches!(result, Err(LoaderError::UnknownType(_))));
        assert!(loader.is_empty());
    }

    #[tokio::test]
    async fn test_load_requires_item_id() {
        let mut loader = ItemLoader::with_standard_set();
        let result = loader.load(&json!({ "typeTag": "assessmentItem" })).await;
        assert!(matches!(result, Err(LoaderError::MalformedRecord(_))));
    }
}
