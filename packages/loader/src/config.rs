//! Configuration constants for the item loader
//!
//! Centralized marker tags and recursion limits used throughout the
//! loader. The limits guard the recursive walks (type scanning, element
//! building) against pathological documents:
//! - Deeply nested serialized trees (stack overflow)
//! - Self-referential container payloads produced by buggy serializers
//!
//! Currently these are compile-time constants. Future versions may
//! support runtime configuration.

/// Type tag of the virtual container pseudo-element.
///
/// Containers are serialized with this tag but are not real element
/// types: they have no loadable implementation and must never be
/// requested from the type registry.
pub const VIRTUAL_CONTAINER_TAG: &str = "_container";

/// Field name of the raw scoring-rule subtree.
///
/// The scoring rules are a generic rule language, not typed elements.
/// The required-type scanner treats this field as opaque and never
/// descends into it.
pub const RESPONSE_RULES_FIELD: &str = "responseRules";

/// Maximum nesting depth when scanning a serialized document for
/// required types.
///
/// Real item documents nest a handful of levels (item -> body ->
/// interaction -> choices -> choice body). 64 is far beyond any
/// legitimate document.
pub const MAX_SCAN_DEPTH: usize = 64;

/// Maximum nesting depth when building the element graph.
///
/// Containers can hold elements that themselves hold containers; 32
/// levels is far beyond what any authoring tool produces.
pub const MAX_BUILD_DEPTH: usize = 32;
