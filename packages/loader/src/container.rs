//! Container loader
//!
//! Hydrates a rich-text container: validates the serialized shape,
//! builds every anchored sub-element, attaches it at its anchor, then
//! installs the markup string with serializer namespace prefixes
//! stripped.
//!
//! Hydration is best-effort for optional pieces: a sub-element whose
//! type is not in the resolved set is skipped with a warning instead of
//! failing the whole container. Malformed records still abort.

use regex::Regex;
use serde_json::Value;
use std::sync::LazyLock;

use crate::element::ElementBuilder;
use crate::error::{LoaderError, Result};
use crate::types::{Capability, Container, TypedElement};

static NAMESPACE_PREFIX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(</?)[A-Za-z][\w.-]*:").expect("valid regex"));

/// Load container data into an element's body.
///
/// # Errors
/// * `NotAContainer` if the element lacks container capability
/// * `MalformedContainer` if the data shape is wrong
pub fn load_container(
    builder: &ElementBuilder<'_>,
    element: &mut TypedElement,
    data: &Value,
    depth: usize,
) -> Result<()> {
    if !element.has(Capability::Container) {
        return Err(LoaderError::NotAContainer(element.id.clone()));
    }
    let mut container = element.body.take().unwrap_or_default();
    hydrate(builder, &mut container, data, depth)?;
    element.body = Some(container);
    Ok(())
}

/// Hydrate a container from its serialized data.
///
/// # Errors
/// Returns `MalformedContainer` if `body` is not a string or `elements`
/// is not an object.
pub(crate) fn hydrate(
    builder: &ElementBuilder<'_>,
    container: &mut Container,
    data: &Value,
    depth: usize,
) -> Result<()> {
    let markup = data
        .get("body")
        .and_then(Value::as_str)
        .ok_or_else(|| LoaderError::MalformedContainer("body must be a string".into()))?;
    let elements = data
        .get("elements")
        .and_then(Value::as_object)
        .ok_or_else(|| LoaderError::MalformedContainer("elements must be an object".into()))?;

    for (anchor, record) in elements {
        match builder.build_at(record, depth + 1) {
            Ok(element) => container.set_element(anchor.clone(), element),
            Err(LoaderError::UnresolvedType(type_tag)) => {
                tracing::warn!(
                    anchor = %anchor,
                    type_tag = %type_tag,
                    "skipping container element with unresolved type"
                );
            }
            Err(err) => return Err(err),
        }
    }
    container.markup = strip_namespace_prefixes(markup);
    Ok(())
}

/// Strip namespace-prefix decoration (`ns1:tag` -> `tag`) introduced by
/// the serializer.
#[must_use]
pub fn strip_namespace_prefixes(markup: &str) -> String {
    NAMESPACE_PREFIX.replace_all(markup, "$1").into_owned()
}
