//! Saved query templates
//!
//! Templates live in `query_templates.json` next to the history file. A
//! first run seeds the file with a few administration queries.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::PersistenceError;
use crate::json_file::{self, Loaded};

/// A named, reusable query
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueryTemplate {
    pub name: String,
    #[serde(default)]
    pub description: String,
    /// Grouping shown in template pickers, e.g. "System" or "Maintenance"
    #[serde(default)]
    pub category: String,
    pub query: String,
}

impl QueryTemplate {
    pub fn new(name: impl Into<String>, query: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: String::new(),
            category: String::new(),
            query: query.into(),
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn with_category(mut self, category: impl Into<String>) -> Self {
        self.category = category.into();
        self
    }
}

/// Templates written on first run
pub fn default_templates() -> Vec<QueryTemplate> {
    vec![
        QueryTemplate::new(
            "Database size",
            "SELECT\n    DB_NAME(database_id) AS DatabaseName,\n    name AS LogicalName,\n    physical_name AS PhysicalName,\n    (size * 8) / 1024 AS SizeMB\nFROM sys.master_files\nORDER BY DB_NAME(database_id)",
        )
        .with_description("Size of every database file")
        .with_category("System"),
        QueryTemplate::new(
            "Active connections",
            "SELECT\n    DB_NAME(dbid) AS DatabaseName,\n    COUNT(dbid) AS NumberOfConnections,\n    loginame AS LoginName\nFROM sys.sysprocesses\nWHERE dbid > 0\nGROUP BY dbid, loginame",
        )
        .with_description("Open sessions per database and login")
        .with_category("Performance"),
        QueryTemplate::new(
            "Index fragmentation",
            "SELECT\n    OBJECT_NAME(ind.object_id) AS TableName,\n    ind.name AS IndexName,\n    ips.avg_fragmentation_in_percent\nFROM sys.dm_db_index_physical_stats(DB_ID(), NULL, NULL, NULL, NULL) ips\nINNER JOIN sys.indexes ind\n    ON ind.object_id = ips.object_id\n    AND ind.index_id = ips.index_id\nWHERE ips.avg_fragmentation_in_percent > 30\nORDER BY ips.avg_fragmentation_in_percent DESC",
        )
        .with_description("Indexes more than 30% fragmented")
        .with_category("Maintenance"),
    ]
}

/// Saved templates in insertion order, with write-through persistence
pub struct TemplateStore {
    templates: Vec<QueryTemplate>,
    path: Option<PathBuf>,
}

impl TemplateStore {
    /// A store seeded with the defaults that is never persisted
    pub fn in_memory() -> Self {
        Self {
            templates: default_templates(),
            path: None,
        }
    }

    /// Open the store backed by `path`
    ///
    /// A missing file is created with the default templates. An unreadable
    /// one is logged and the store starts empty, leaving the file untouched
    /// until the next save.
    #[tracing::instrument(skip(path), fields(path = %path.as_ref().display()))]
    pub async fn open(path: impl AsRef<Path>) -> Self {
        let path = path.as_ref().to_path_buf();
        match json_file::load::<Vec<QueryTemplate>>(&path).await {
            Loaded::Found(templates) => {
                tracing::debug!(count = templates.len(), "templates loaded");
                Self {
                    templates,
                    path: Some(path),
                }
            }
            Loaded::Missing => {
                let store = Self {
                    templates: default_templates(),
                    path: Some(path),
                };
                tracing::info!("no template file, writing defaults");
                store.persist().await;
                store
            }
            Loaded::Unusable => {
                tracing::error!("templates unreadable, starting empty");
                Self {
                    templates: Vec::new(),
                    path: Some(path),
                }
            }
        }
    }

    pub fn templates(&self) -> &[QueryTemplate] {
        &self.templates
    }

    /// Look a template up by name, case-insensitively
    pub fn find(&self, name: &str) -> Option<&QueryTemplate> {
        self.templates
            .iter()
            .find(|t| t.name.eq_ignore_ascii_case(name))
    }

    /// Add a template, replacing any existing one with the same name
    pub async fn save_template(&mut self, template: QueryTemplate) {
        match self
            .templates
            .iter_mut()
            .find(|t| t.name.eq_ignore_ascii_case(&template.name))
        {
            Some(existing) => {
                tracing::debug!(name = %template.name, "replacing template");
                *existing = template;
            }
            None => {
                tracing::debug!(name = %template.name, "adding template");
                self.templates.push(template);
            }
        }
        self.persist().await;
    }

    /// Remove a template by name; returns whether one was removed
    pub async fn remove(&mut self, name: &str) -> bool {
        let before = self.templates.len();
        self.templates.retain(|t| !t.name.eq_ignore_ascii_case(name));
        let removed = self.templates.len() != before;
        if removed {
            tracing::debug!(name, "removed template");
            self.persist().await;
        }
        removed
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    async fn persist(&self) {
        if let Err(e) = self.save().await {
            tracing::error!(error = %e, "failed to persist query templates");
        }
    }

    pub async fn save(&self) -> Result<(), PersistenceError> {
        match &self.path {
            Some(path) => json_file::save(path, &self.templates).await,
            None => Ok(()),
        }
    }
}

impl std::fmt::Debug for TemplateStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TemplateStore")
            .field("len", &self.templates.len())
            .field("path", &self.path)
            .finish()
    }
}
