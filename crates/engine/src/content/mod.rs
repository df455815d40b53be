mod catalog;
mod compiler;
mod discovery;
mod loader;

pub use catalog::{CharacterCatalog, CharacterDefinition, DEFAULT_MOVE_SPEED};
pub use compiler::{compile_character_catalog, CatalogError, CatalogErrorCode, SourceLocation};
pub use discovery::CatalogRequest;
pub use loader::{
    CatalogLoader, CatalogLoaderConfig, CharacterLoader, LoadError, LoadPoll, LoadResult,
    PendingCharacter,
};
