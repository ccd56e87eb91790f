//! The Meilisearch tool catalogue.
//!
//! Each submodule registers one resource area. Handlers validate nothing
//! the registry already checked against the schema; they only convert
//! arguments into typed values and format the upstream answer as text.

use std::sync::Arc;

use crate::context::ContextHandle;
use crate::registry::{RegistryError, ToolRegistry};

mod chat;
mod connection;
mod documents;
mod indexes;
mod keys;
mod monitoring;
mod search;
mod settings;
mod tasks;

/// A registry holding every Meilisearch tool, in catalogue order.
pub fn build_registry(session: Arc<ContextHandle>) -> Result<ToolRegistry, RegistryError> {
    let mut registry = ToolRegistry::new(session);
    connection::register(&mut registry)?;
    monitoring::register(&mut registry)?;
    indexes::register(&mut registry)?;
    documents::register(&mut registry)?;
    settings::register(&mut registry)?;
    search::register(&mut registry)?;
    tasks::register(&mut registry)?;
    keys::register(&mut registry)?;
    chat::register(&mut registry)?;
    Ok(registry)
}
