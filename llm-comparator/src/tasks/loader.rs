//! Task loading from JSON definition files

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::Path;

use super::{Category, Evaluation, Task, TaskCatalog};
use crate::analysis::schema::check_schema;

/// Error type for task loading
#[derive(Debug, thiserror::Error)]
pub enum LoadError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Parse error: {0}")]
    Parse(String),

    #[error("Missing field: {0}")]
    MissingField(String),

    #[error("Duplicate task id: {0}")]
    DuplicateId(String),
}

/// On-disk shape of a task definition file
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TaskDefinitionFile {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub version: String,
    /// Relative share of each category when the catalog is truncated
    #[serde(default, skip_serializing_if = "IndexMap::is_empty")]
    pub category_weights: IndexMap<Category, f64>,
    pub tasks: Vec<Task>,
}

/// Load a catalog from a JSON file, or from every `*.json` file in a directory
pub fn load_catalog_from_file(path: impl AsRef<Path>) -> Result<TaskCatalog, LoadError> {
    let path = path.as_ref();
    if path.is_dir() {
        return load_catalog_from_directory(path);
    }
    let content = std::fs::read_to_string(path)?;
    load_catalog_from_string(&content)
}

/// Load a catalog from a JSON string
pub fn load_catalog_from_string(content: &str) -> Result<TaskCatalog, LoadError> {
    let file: TaskDefinitionFile =
        serde_json::from_str(content).map_err(|e| LoadError::Parse(e.to_string()))?;
    build_catalog(vec![file])
}

/// Merge all definition files in a directory, in file-name order
fn load_catalog_from_directory(dir: &Path) -> Result<TaskCatalog, LoadError> {
    let mut paths: Vec<_> = std::fs::read_dir(dir)?
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|p| p.extension().map(|ext| ext == "json").unwrap_or(false))
        .collect();
    paths.sort();

    let mut files = Vec::new();
    for path in &paths {
        let content = std::fs::read_to_string(path)?;
        let file: TaskDefinitionFile = serde_json::from_str(&content)
            .map_err(|e| LoadError::Parse(format!("{}: {}", path.display(), e)))?;
        tracing::debug!("Loaded {} tasks from {}", file.tasks.len(), path.display());
        files.push(file);
    }
    build_catalog(files)
}

fn build_catalog(files: Vec<TaskDefinitionFile>) -> Result<TaskCatalog, LoadError> {
    let mut seen = HashSet::new();
    let mut tasks = Vec::new();
    let mut weights = IndexMap::new();

    for file in files {
        for (category, weight) in file.category_weights {
            if !weight.is_finite() || weight < 0.0 {
                return Err(LoadError::Parse(format!(
                    "category weight for {} must be a non-negative number",
                    category
                )));
            }
            weights.insert(category, weight);
        }
        for task in file.tasks {
            validate_task(&task)?;
            if !seen.insert(task.id.clone()) {
                return Err(LoadError::DuplicateId(task.id));
            }
            tasks.push(task);
        }
    }

    Ok(TaskCatalog::new(tasks).with_category_weights(weights))
}

fn validate_task(task: &Task) -> Result<(), LoadError> {
    if task.id.trim().is_empty() {
        return Err(LoadError::MissingField("id".to_string()));
    }
    if task.prompt.trim().is_empty() {
        return Err(LoadError::MissingField(format!("{}: prompt", task.id)));
    }
    if task.max_tokens == 0 {
        return Err(LoadError::Parse(format!("{}: max_tokens must be positive", task.id)));
    }
    match &task.evaluation {
        Evaluation::Regex { pattern } => {
            regex::Regex::new(pattern)
                .map_err(|e| LoadError::Parse(format!("{}: {}", task.id, e)))?;
        }
        Evaluation::JsonSchema { schema } => {
            check_schema(schema).map_err(|e| LoadError::Parse(format!("{}: {}", task.id, e)))?;
        }
        _ => {}
    }
    Ok(())
}
