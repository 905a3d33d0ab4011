use extcat::{CatalogError, CatalogEvent, ExtensionId, ExtensionRecord};

/// All possible messages that drive state transitions.
#[derive(Debug)]
pub enum Msg {
    /// One line typed by the user.
    Input(String),
    Catalog(CatalogEvent),
    Resolved(ExtensionId, Result<ExtensionRecord, CatalogError>),
    Quit,
}
