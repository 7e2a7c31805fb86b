//! Loader for serialized assessment-item documents.
//!
//! Turns loosely-typed item records into typed element graphs: a type
//! registry resolves the element kinds a document needs (asynchronously,
//! in one batch), the element builder instantiates and hydrates each
//! record by capability, containers attach their anchored sub-elements,
//! and the response reconciler matches declarations against the raw
//! scoring-rule tree to decide whether scoring is template-driven or
//! must be preserved verbatim.
//!
//! The usual entry point is [`ItemLoader`]:
//!
//! ```no_run
//! # async fn demo(document: serde_json::Value) -> itemgraph_loader::Result<()> {
//! use itemgraph_loader::ItemLoader;
//!
//! let mut loader = ItemLoader::with_standard_set();
//! let item = loader.load(&document).await?;
//! println!("{} responses", item.responses.len());
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod container;
pub mod element;
pub mod error;
pub mod item;
pub mod registry;
pub mod response;
pub mod scan;
pub mod types;

pub use element::ElementBuilder;
pub use error::{LoaderError, Result};
pub use item::ItemLoader;
pub use registry::{ElementFactory, FactoryLoader, MemoryFactoryLoader, ResolvedTypes, TypeRegistry};
pub use response::ResponseReconciler;
pub use scan::required_types;
pub use types::{
    Capability, Container, Item, ModalFeedback, OutcomeDeclaration, ProcessingType,
    ResponseDeclaration, ResponseProcessing, ScoringTemplate, Stylesheet, TypedElement,
};

/// Crate version, for diagnostics.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version() {
        assert_eq!(VERSION, "0.2.0");
    }

    #[test]
    fn test_reexports() {
        // The entry-point types are reachable from the crate root
        let _loader: fn() -> ItemLoader = ItemLoader::with_standard_set;
        let _registry: fn() -> TypeRegistry = TypeRegistry::with_standard_set;
    }
}
