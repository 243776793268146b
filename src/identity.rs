use crate::schema::MappingRow;
use crate::utils::digits_only;
use log::{debug, warn};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ResolutionMode {
    /// Mapped documents use the canonical name, the rest their own specifier.
    Mapped,
    /// No usable mapping: every transaction is keyed by its cleaned document.
    DocumentOnly,
}

#[derive(Debug, Clone)]
pub struct IdentityResolver {
    lookup: HashMap<String, String>,
    mode: ResolutionMode,
    warning: Option<String>,
}

impl IdentityResolver {
    /// Builds the resolver from the mapping sheet, if one was loaded.
    ///
    /// The first row wins when a document is mapped twice. A missing sheet, or
    /// one in which no row carries a canonical name, degrades to
    /// [`ResolutionMode::DocumentOnly`] with a warning.
    pub fn from_mapping(rows: Option<&[MappingRow]>) -> Self {
        let Some(rows) = rows else {
            return Self::degraded("identity mapping table not available".to_string());
        };

        if !rows.iter().any(|r| r.canonical_name.is_some()) {
            return Self::degraded(
                "identity mapping table has no canonical name column".to_string(),
            );
        }

        let mut lookup = HashMap::new();
        let mut conflicts = 0usize;
        for row in rows {
            let Some(name) = row.canonical_name.as_deref().map(str::trim) else {
                continue;
            };
            let document = digits_only(&row.document);
            if document.is_empty() || name.is_empty() {
                continue;
            }
            if lookup.contains_key(&document) {
                conflicts += 1;
                continue;
            }
            lookup.insert(document, name.to_string());
        }

        debug!(
            "Identity mapping loaded: {} documents, {} duplicate rows ignored",
            lookup.len(),
            conflicts
        );

        Self {
            lookup,
            mode: ResolutionMode::Mapped,
            warning: None,
        }
    }

    fn degraded(reason: String) -> Self {
        let warning = format!(
            "{}; consolidating entities by cleaned document instead",
            reason
        );
        warn!("{}", warning);
        Self {
            lookup: HashMap::new(),
            mode: ResolutionMode::DocumentOnly,
            warning: Some(warning),
        }
    }

    pub fn mode(&self) -> ResolutionMode {
        self.mode
    }

    /// Set when the resolver fell back to document-only keys.
    pub fn warning(&self) -> Option<&str> {
        self.warning.as_deref()
    }

    pub fn mapped_documents(&self) -> usize {
        self.lookup.len()
    }

    /// Consolidated key for a transaction's cleaned document and display name.
    pub fn resolve(&self, document_clean: &str, specifier: &str) -> String {
        match self.mode {
            ResolutionMode::DocumentOnly => document_clean.to_string(),
            ResolutionMode::Mapped => self
                .lookup
                .get(document_clean)
                .cloned()
                .unwrap_or_else(|| specifier.to_string()),
        }
    }
}
