//! # Lumex Core
//!
//! Folder-rule resolution and change-reconciliation engine for the Lumex
//! photo catalog.
//!
//! ## Overview
//!
//! `lumex-core` keeps a photo collection's catalog in step with the
//! filesystem folders its rules cover:
//!
//! - **Folder Rules**: `Always`, `Once`, and `Remove` rules resolved into
//!   a non-overlapping set of watch roots, longest match wins
//! - **Filesystem Watching**: One recursive watcher per watched root with
//!   debounced event batching
//! - **Reconciliation**: Directory listings diffed against the catalog so
//!   every create, delete, and rename lands exactly once
//! - **Scan Pipeline**: A fixed worker pool that extracts metadata,
//!   persists transactionally, and requests thumbnails
//! - **Container Index**: Lock-free snapshot reads of folder and album
//!   containers, keyed for direct path lookup
//! - **Catalog Abstraction**: Trait-based unit-of-work ports with an
//!   in-memory reference store
//!
//! ## Architecture
//!
//! - [`rules`]: Rule resolution, event classification, reset planning
//! - [`engine`]: The [`CollectionEngine`] facade and its lifecycle
//! - [`watch`]: Watcher attachment and the debounce loop
//! - [`index`]: The in-memory container index
//! - [`catalog`]: Persistence ports and [`catalog::MemoryCatalog`]
//! - [`events`]: Catalog change events broadcast to subscribers
//!
//! ## Examples
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use lumex_core::catalog::MemoryCatalog;
//! use lumex_core::{CollectionEngine, EngineConfig};
//! use lumex_model::{FolderRule, RuleAction};
//!
//! async fn bring_up() -> Result<(), lumex_core::EngineError> {
//!     let engine = CollectionEngine::builder()
//!         .with_config(EngineConfig::default())
//!         .with_catalog(Arc::new(MemoryCatalog::new()))
//!         .build()?;
//!
//!     engine.start().await?;
//!     engine
//!         .reset_rules(&[FolderRule::new("/photos", RuleAction::Always)])
//!         .await?;
//!     engine.scan_folder("/photos/2024").await?;
//!     engine.stop().await?;
//!     Ok(())
//! }
//! ```

#![cfg_attr(docsrs, feature(doc_cfg))]
#![allow(missing_docs)]

/// Catalog persistence ports and the in-memory reference store
pub mod catalog;

/// Engine configuration
pub mod config;

/// Engine facade and lifecycle
pub mod engine;

/// Error types
pub mod error;

/// Catalog change events and the broadcast bus
pub mod events;

/// Image metadata extraction
pub mod extract;

/// In-memory container index with derived path lookups
pub mod index;

/// Directory listings and listing fingerprints
pub mod listing;

/// Folder rules: resolution into watch roots and reset planning
pub mod rules;

/// Thumbnail generation port
pub mod thumbs;

/// Filesystem watching and debounce
pub mod watch;

mod reconcile;
mod scan;

pub use config::EngineConfig;
pub use engine::{CollectionEngine, CollectionEngineBuilder, EngineState};
pub use error::{EngineError, Result};
