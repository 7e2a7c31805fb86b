//! Required-type scanner
//!
//! Walks a serialized document and computes the minimal, deduplicated
//! set of type tags needed to instantiate it. The virtual-container
//! marker is excluded (containers have no loadable implementation) and
//! the raw scoring-rule subtree is opaque at this stage: the walk never
//! descends into a `responseRules` field.

use serde_json::Value;
use std::collections::BTreeSet;

use crate::config::{MAX_SCAN_DEPTH, RESPONSE_RULES_FIELD, VIRTUAL_CONTAINER_TAG};
use crate::error::{LoaderError, Result};

/// Compute the set of type tags required to instantiate a serialized
/// document.
///
/// # Errors
/// Returns `NestingTooDeep` if the document nests beyond
/// [`MAX_SCAN_DEPTH`] levels.
pub fn required_types(node: &Value) -> Result<BTreeSet<String>> {
    let mut found = BTreeSet::new();
    walk(node, &mut found, 0)?;
    Ok(found)
}

fn walk(node: &Value, found: &mut BTreeSet<String>, depth: usize) -> Result<()> {
    if depth > MAX_SCAN_DEPTH {
        return Err(LoaderError::NestingTooDeep {
            limit: MAX_SCAN_DEPTH,
        });
    }
    match node {
        Value::Object(map) => {
            for (key, value) in map {
                if key == RESPONSE_RULES_FIELD {
                    continue;
                }
                if key == "typeTag" {
                    if let Some(tag) = value.as_str() {
                        if tag != VIRTUAL_CONTAINER_TAG {
                            found.insert(tag.to_string());
                        }
                    }
                    continue;
                }
                walk(value, found, depth + 1)?;
            }
        }
        Value::Array(entries) => {
            for entry in entries {
                walk(entry, found, depth + 1)?;
            }
        }
        _ => {}
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn names(set: &BTreeSet<String>) -> Vec<&str> {
        set.iter().map(String::as_str).collect()
    }

    #[test]
    fn test_scan_collects_nested_tags() {
        let doc = json!({
            "typeTag": "assessmentItem",
            "id": "item_1",
            "body": {
                "body": "{{int_1}}",
                "elements": {
                    "int_1": {
                        "typeTag": "choiceInteraction",
                        "id": "int_1",
                        "choices": {
                            "choice_1": { "typeTag": "simpleChoice", "id": "choice_1" }
                        }
                    }
                }
            }
        });

        let found = required_types(&doc).unwrap();
        assert_eq!(
            names(&found),
            vec!["assessmentItem", "choiceInteraction", "simpleChoice"]
        );
    }

    #[test]
    fn test_scan_excludes_virtual_container_marker() {
        let doc = json!({
            "typeTag": "assessmentItem",
            "id": "item_1",
            "body": { "typeTag": "_container", "body": "", "elements": {} }
        });

        let found = required_types(&doc).unwrap();
        assert_eq!(names(&found), vec!["assessmentItem"]);
    }

    #[test]
    fn test_scan_never_descends_into_response_rules() {
        let doc = json!({
            "typeTag": "assessmentItem",
            "id": "item_1",
            "responseProcessing": {
                "processingType": "custom",
                "responseRules": [
                    { "typeTag": "responseCondition" },
                    { "typeTag": "setOutcomeValue" }
                ]
            }
        });

        let found = required_types(&doc).unwrap();
        assert_eq!(names(&found), vec!["assessmentItem"]);
    }

    #[test]
    fn test_scan_deduplicates() {
        let doc = json!([
            { "typeTag": "simpleChoice", "id": "a" },
            { "typeTag": "simpleChoice", "id": "b" }
        ]);

        let found = required_types(&doc).unwrap();
        assert_eq!(found.len(), 1);
    }

    #[test]
    fn test_scan_rejects_pathological_nesting() {
        let mut doc = json!({ "typeTag": "leaf" });
        for _ in 0..(MAX_SCAN_DEPTH + 2) {
            doc = json!({ "nested": doc });
        }

        let result = required_types(&doc);
        assert!(matches!(result, Err(LoaderError::NestingTooDeep { .. })));
    }
}
