//! Response/feedback reconciler
//!
//! Matches each response declaration against its fragment of the
//! generic scoring-rule tree, derives the canonical scoring template
//! where one applies, extracts simple feedback rules, and finally
//! classifies the item's response processing as template-driven or
//! custom.
//!
//! The reconciler owns the pending rule list for one item load. Rule
//! nodes are claimed by position and removed exactly once, so a node
//! can never be counted both as a template match and as leftover custom
//! logic. Matching goes through small named matchers; the two
//! recognized nesting shapes for the tested identifier are tried in a
//! fixed order.

use serde_json::{json, Map, Value};
use std::collections::BTreeSet;

use crate::config::{MAX_BUILD_DEPTH, RESPONSE_RULES_FIELD};
use crate::element::ElementBuilder;
use crate::error::{LoaderError, Result};
use crate::types::{
    Cardinality, FeedbackCondition, FeedbackConditionKind, FeedbackRule, ModalFeedback,
    OutcomeDeclaration, ProcessingType, ResponseDeclaration, ScoringTemplate,
};

/// Identifier of the conventional total-score outcome.
pub const TOTAL_OUTCOME_IDENTIFIER: &str = "SCORE";

/// Prefix of the conventional per-response correctness outcomes.
pub const RESPONSE_OUTCOME_PREFIX: &str = "SCORE_";

/// Reconciles response declarations against the raw scoring-rule tree.
pub struct ResponseReconciler {
    pending: Vec<Value>,
}

impl ResponseReconciler {
    /// Create a reconciler over the top-level rule sequence.
    #[must_use]
    pub fn new(rules: Vec<Value>) -> Self {
        Self { pending: rules }
    }

    /// Create a reconciler from a serialized item record.
    #[must_use]
    pub fn from_item_data(data: &Value) -> Self {
        let rules = data
            .get("responseProcessing")
            .and_then(|p| p.get(RESPONSE_RULES_FIELD))
            .and_then(Value::as_array)
            .cloned()
            .unwrap_or_default();
        Self::new(rules)
    }

    /// Rule nodes not yet claimed by a response or feedback rule.
    #[must_use]
    pub fn pending(&self) -> &[Value] {
        &self.pending
    }

    /// Build one response declaration, claiming its scoring-rule
    /// fragment and extracting its simple feedback rules.
    ///
    /// Outcomes and modal feedbacks must be fully built before this is
    /// called: feedback resolution reads both collections.
    ///
    /// # Errors
    /// Returns `MalformedRecord` if the declaration has no identifier;
    /// build errors propagate from the element builder.
    pub fn reconcile(
        &mut self,
        builder: &ElementBuilder<'_>,
        data: &Value,
        outcomes: &[OutcomeDeclaration],
        feedbacks: &mut [ModalFeedback],
    ) -> Result<ResponseDeclaration> {
        let identifier = data
            .get("attributes")
            .and_then(|a| a.get("identifier"))
            .and_then(Value::as_str)
            .ok_or_else(|| {
                LoaderError::MalformedRecord("response declaration has no identifier".into())
            })?
            .to_string();

        // First match wins; a claimed node leaves the pending list.
        let claimed = response_rule_position(&self.pending, &identifier)
            .map(|position| self.pending.remove(position));
        if claimed.is_some() {
            tracing::debug!(response = %identifier, "claimed scoring rule for response");
        }

        let element = builder.build(data)?;

        let template = claimed.as_ref().and_then(derive_template).or_else(|| {
            data.get("howMatch")
                .and_then(Value::as_str)
                .and_then(ScoringTemplate::from_legacy)
        });

        let cardinality = element
            .attr_str("cardinality")
            .and_then(|c| c.parse::<Cardinality>().ok())
            .unwrap_or_default();
        let base_type = element.attr_str("baseType").map(ToString::to_string);
        let correct_responses = data
            .get("correctResponses")
            .and_then(Value::as_array)
            .cloned()
            .unwrap_or_default();
        let default_value = data.get("defaultValue").filter(|v| !v.is_null()).cloned();
        let map_entries = non_empty_object(data.get("mapEntries"))
            .or_else(|| non_empty_object(data.get("areaMapEntries")))
            .unwrap_or_default();
        let mapping_attributes = data
            .get("mappingAttributes")
            .and_then(Value::as_object)
            .cloned()
            .unwrap_or_default();

        let mut feedback_rules = Vec::new();
        if let Some(descriptors) = data.get("feedbackRules").and_then(Value::as_object) {
            for (rule_id, descriptor) in descriptors {
                if let Some(rule) =
                    self.build_feedback_rule(rule_id, descriptor, outcomes, feedbacks)
                {
                    feedback_rules.push(rule);
                }
            }
        }

        Ok(ResponseDeclaration {
            id: element.id.clone(),
            identifier,
            cardinality,
            base_type,
            template,
            correct_responses,
            default_value,
            map_entries,
            mapping_attributes,
            feedback_rules,
            attributes: element.attributes,
        })
    }

    fn build_feedback_rule(
        &mut self,
        rule_id: &str,
        descriptor: &Value,
        outcomes: &[OutcomeDeclaration],
        feedbacks: &mut [ModalFeedback],
    ) -> Option<FeedbackRule> {
        let kind_raw = descriptor.get("condition").and_then(Value::as_str)?;
        let kind: FeedbackConditionKind = match kind_raw.parse() {
            Ok(kind) => kind,
            Err(_) => {
                tracing::warn!(
                    rule = %rule_id,
                    condition = %kind_raw,
                    "skipping feedback rule with unknown condition"
                );
                return None;
            }
        };
        let outcome_reference = descriptor.get("feedbackOutcome").and_then(Value::as_str)?;
        let Some(outcome) = outcomes.iter().find(|o| o.identifier == outcome_reference) else {
            tracing::warn!(
                rule = %rule_id,
                outcome = %outcome_reference,
                "skipping feedback rule with unresolved outcome"
            );
            return None;
        };

        let feedback_then = resolve_feedback(
            descriptor.get("feedbackThen"),
            feedbacks,
            &outcome.identifier,
        );
        let feedback_else = resolve_feedback(
            descriptor.get("feedbackElse"),
            feedbacks,
            &outcome.identifier,
        );

        // Claim the generated set-outcome rule so it is not later
        // misclassified as unmatched custom logic.
        if let Some(position) = feedback_rule_position(&self.pending, &outcome.identifier) {
            self.pending.remove(position);
        }

        Some(FeedbackRule {
            id: rule_id.to_string(),
            condition: FeedbackCondition {
                kind,
                compared_value: descriptor
                    .get("comparedValue")
                    .filter(|v| !v.is_null())
                    .cloned(),
            },
            outcome: outcome.identifier.clone(),
            feedback_then,
            feedback_else,
        })
    }

    /// Classify the item's response processing once every response has
    /// been reconciled.
    ///
    /// Custom when any rule remains unclaimed (unless it is exactly the
    /// canonical total-score rule) or when any response has no resolved
    /// template.
    #[must_use]
    pub fn classify(&self, responses: &[ResponseDeclaration]) -> ProcessingType {
        if responses.iter().any(|r| r.template.is_none()) {
            return ProcessingType::Custom;
        }
        if self.pending.is_empty() {
            return ProcessingType::TemplateDriven;
        }
        let identifiers: Vec<&str> = responses.iter().map(|r| r.identifier.as_str()).collect();
        if self.pending.len() == 1 && self.pending[0] == total_score_rule(&identifiers) {
            ProcessingType::TemplateDriven
        } else {
            ProcessingType::Custom
        }
    }
}

/// Resolve a modal-feedback reference and attach the display
/// back-reference to the gating outcome. Unresolved references are
/// simply dropped.
fn resolve_feedback(
    reference: Option<&Value>,
    feedbacks: &mut [ModalFeedback],
    outcome_identifier: &str,
) -> Option<String> {
    let id = reference?.as_str()?;
    let feedback = feedbacks.iter_mut().find(|f| f.id == id)?;
    feedback.related_outcome = Some(outcome_identifier.to_string());
    Some(feedback.id.clone())
}

fn non_empty_object(value: Option<&Value>) -> Option<Map<String, Value>> {
    value
        .and_then(Value::as_object)
        .filter(|map| !map.is_empty())
        .cloned()
}

fn is_condition(rule: &Value) -> bool {
    rule.get("typeTag").and_then(Value::as_str) == Some("responseCondition")
}

fn condition_expression(rule: &Value) -> Option<&Value> {
    if !is_condition(rule) {
        return None;
    }
    rule.get("responseIf").and_then(|r| r.get("expression"))
}

/// Identifier tested by a condition expression.
///
/// Two equivalent nesting shapes exist: the identifier sits directly on
/// the tested expression, or on its first wrapped sub-expression. Both
/// are tried, in that order.
fn tested_identifier(expression: &Value) -> Option<&str> {
    if let Some(identifier) = expression
        .get("attributes")
        .and_then(|a| a.get("identifier"))
        .and_then(Value::as_str)
    {
        return Some(identifier);
    }
    expression
        .get("expressions")
        .and_then(Value::as_array)
        .and_then(|e| e.first())
        .and_then(|inner| inner.get("attributes"))
        .and_then(|a| a.get("identifier"))
        .and_then(Value::as_str)
}

/// Position of the first condition node testing the given response
/// identifier.
pub(crate) fn response_rule_position(rules: &[Value], identifier: &str) -> Option<usize> {
    rules.iter().position(|rule| {
        condition_expression(rule).and_then(tested_identifier) == Some(identifier)
    })
}

/// Position of the first condition node whose single consequence sets
/// the given outcome.
pub(crate) fn feedback_rule_position(rules: &[Value], outcome_identifier: &str) -> Option<usize> {
    rules.iter().position(|rule| {
        if !is_condition(rule) {
            return false;
        }
        let Some(consequences) = rule
            .get("responseIf")
            .and_then(|r| r.get(RESPONSE_RULES_FIELD))
            .and_then(Value::as_array)
        else {
            return false;
        };
        let [consequence] = consequences.as_slice() else {
            return false;
        };
        consequence.get("typeTag").and_then(Value::as_str) == Some("setOutcomeValue")
            && consequence
                .get("attributes")
                .and_then(|a| a.get("identifier"))
                .and_then(Value::as_str)
                == Some(outcome_identifier)
    })
}

/// Derive the canonical scoring template from a claimed rule node.
fn derive_template(rule: &Value) -> Option<ScoringTemplate> {
    let expression = condition_expression(rule)?;
    let mut tags = BTreeSet::new();
    collect_expression_tags(expression, &mut tags, 0);
    if tags.contains("mapResponsePoint") {
        Some(ScoringTemplate::MapResponsePoint)
    } else if tags.contains("mapResponse") {
        Some(ScoringTemplate::MapResponse)
    } else if tags.contains("match") {
        Some(ScoringTemplate::MatchCorrect)
    } else {
        None
    }
}

fn collect_expression_tags<'a>(
    expression: &'a Value,
    tags: &mut BTreeSet<&'a str>,
    depth: usize,
) {
    if depth > MAX_BUILD_DEPTH {
        return;
    }
    if let Some(tag) = expression.get("typeTag").and_then(Value::as_str) {
        tags.insert(tag);
    }
    if let Some(children) = expression.get("expressions").and_then(Value::as_array) {
        for child in children {
            collect_expression_tags(child, tags, depth + 1);
        }
    }
    if let Some(inner) = expression.get("expression") {
        collect_expression_tags(inner, tags, depth + 1);
    }
}

/// The canonical rule summing the per-response correctness outcomes
/// into the total outcome, synthesized in declaration order.
#[must_use]
pub fn total_score_rule<S: AsRef<str>>(response_identifiers: &[S]) -> Value {
    let terms: Vec<Value> = response_identifiers
        .iter()
        .map(|identifier| {
            json!({
                "typeTag": "variable",
                "attributes": {
                    "identifier": format!("{RESPONSE_OUTCOME_PREFIX}{}", identifier.as_ref())
                }
            })
        })
        .collect();
    json!({
        "typeTag": "setOutcomeValue",
        "attributes": { "identifier": TOTAL_OUTCOME_IDENTIFIER },
        "expression": {
            "typeTag": "sum",
            "expressions": terms
        }
    })
}
