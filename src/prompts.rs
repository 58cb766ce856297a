//! Prompt catalog: the fixed set of processing profiles a client may select.

use crate::error::AppError;
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::info;

/// One selectable processing profile.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PromptDescriptor {
    pub id: String,
    pub name: String,
    pub description: String,
}

/// Immutable catalog loaded once at startup. Lookups after that never fail
/// for operational reasons, only for unknown ids.
#[derive(Debug)]
pub struct PromptCatalog {
    prompts: Vec<PromptDescriptor>,
}

impl PromptCatalog {
    /// Load the definitions file. Any read or parse failure is a hard
    /// operational fault: the service refuses to start without a catalog.
    pub fn load(path: &Path) -> Result<Self, AppError> {
        let raw = std::fs::read_to_string(path).map_err(|e| {
            AppError::CatalogUnavailable(format!(
                "failed to read prompt definitions {:?}: {}",
                path, e
            ))
        })?;

        let catalog = Self::parse(&raw)?;
        info!("loaded {} prompt definitions from {:?}", catalog.prompts.len(), path);
        Ok(catalog)
    }

    pub(crate) fn parse(raw: &str) -> Result<Self, AppError> {
        let prompts: Vec<PromptDescriptor> = serde_json::from_str(raw).map_err(|e| {
            AppError::CatalogUnavailable(format!("failed to parse prompt definitions: {}", e))
        })?;

        Ok(Self { prompts })
    }

    /// All prompts, in file order.
    pub fn list(&self) -> &[PromptDescriptor] {
        &self.prompts
    }

    /// Whether a prompt id is known.
    pub fn exists(&self, id: &str) -> bool {
        self.prompts.iter().any(|p| p.id == id)
    }
}

// ============================================================================
// Tests
// ============================================================================
