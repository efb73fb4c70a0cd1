//! Catalog persistence boundary.
//!
//! The engine talks to storage through repository ports grouped under a
//! unit of work. Writes go through [`CatalogUnitOfWorkFactory::begin`],
//! which serializes writers behind a process-wide lock; reads use
//! [`CatalogUnitOfWorkFactory::begin_read`] and never block writers.

mod memory;
mod ports;

pub use memory::MemoryCatalog;
pub use ports::{
    AlbumRepository, CatalogUnitOfWork, CatalogUnitOfWorkFactory, FolderRepository,
    ImageRepository, RuleRepository,
};
