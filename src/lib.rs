pub mod catalog;
pub mod host;
pub mod markdown;
pub mod model;
pub mod registry;

pub use catalog::{CatalogError, CatalogEvent, ExtensionCatalog};
pub use model::extension::{ExtensionId, ExtensionPatch, ExtensionRecord};
