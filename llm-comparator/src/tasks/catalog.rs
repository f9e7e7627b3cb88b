//! Ordered, read-only task collection with proportional truncation

use indexmap::IndexMap;
use std::collections::HashMap;

use super::loader::{load_catalog_from_string, LoadError};
use super::{Category, Task};

const BUILTIN_SUITE: &str = include_str!("../../tasks/suite.json");

/// Task count used by `--quick`
pub const QUICK_TASK_COUNT: usize = 5;

/// Immutable task list plus optional category weights
#[derive(Debug, Clone, Default)]
pub struct TaskCatalog {
    tasks: Vec<Task>,
    category_weights: IndexMap<Category, f64>,
}

impl TaskCatalog {
    pub fn new(tasks: Vec<Task>) -> Self {
        Self {
            tasks,
            category_weights: IndexMap::new(),
        }
    }

    pub fn with_category_weights(mut self, weights: IndexMap<Category, f64>) -> Self {
        self.category_weights = weights;
        self
    }

    /// The suite compiled into the binary
    pub fn builtin() -> Result<Self, LoadError> {
        load_catalog_from_string(BUILTIN_SUITE)
    }

    pub fn tasks(&self) -> &[Task] {
        &self.tasks
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    pub fn get(&self, id: &str) -> Option<&Task> {
        self.tasks.iter().find(|t| t.id == id)
    }

    pub fn category_weights(&self) -> &IndexMap<Category, f64> {
        &self.category_weights
    }

    /// Distinct categories in first-appearance order
    pub fn categories(&self) -> Vec<Category> {
        let mut out = Vec::new();
        for task in &self.tasks {
            if !out.contains(&task.category) {
                out.push(task.category);
            }
        }
        out
    }

    /// Keep only tasks in the given categories
    pub fn filter_categories(&self, categories: &[Category]) -> Self {
        self.retain(|t| categories.contains(&t.category))
    }

    /// Keep only the given task ids
    pub fn filter_ids<S: AsRef<str>>(&self, ids: &[S]) -> Self {
        self.retain(|t| ids.iter().any(|id| id.as_ref() == t.id))
    }

    fn retain(&self, keep: impl Fn(&Task) -> bool) -> Self {
        Self {
            tasks: self.tasks.iter().filter(|t| keep(t)).cloned().collect(),
            category_weights: self.category_weights.clone(),
        }
    }

    /// Truncate to at most `limit` tasks.
    ///
    /// With category weights, each category gets a share proportional to its
    /// weight (largest remainder), filled from that category's stable prefix.
    /// Without weights this is a plain stable prefix. Catalog order is kept.
    pub fn truncate(&self, limit: usize) -> Self {
        if limit >= self.tasks.len() {
            return self.clone();
        }

        let quotas = match self.category_quotas(limit) {
            Some(quotas) => quotas,
            None => {
                return Self {
                    tasks: self.tasks[..limit].to_vec(),
                    category_weights: self.category_weights.clone(),
                }
            }
        };

        let mut taken: HashMap<Category, usize> = HashMap::new();
        let tasks = self
            .tasks
            .iter()
            .filter(|t| {
                let count = taken.entry(t.category).or_insert(0);
                let quota = quotas.get(&t.category).copied().unwrap_or(0);
                if *count < quota {
                    *count += 1;
                    true
                } else {
                    false
                }
            })
            .cloned()
            .collect();

        Self {
            tasks,
            category_weights: self.category_weights.clone(),
        }
    }

    /// Per-category task counts summing to `limit`, or None when no weights apply
    fn category_quotas(&self, limit: usize) -> Option<IndexMap<Category, usize>> {
        let mut available: IndexMap<Category, usize> = IndexMap::new();
        for task in &self.tasks {
            *available.entry(task.category).or_insert(0) += 1;
        }

        let weighted: Vec<(Category, f64)> = available
            .keys()
            .map(|c| (*c, self.category_weights.get(c).copied().unwrap_or(0.0)))
            .filter(|(_, w)| *w > 0.0)
            .collect();
        let total_weight: f64 = weighted.iter().map(|(_, w)| w).sum();
        if weighted.is_empty() || total_weight <= 0.0 {
            return None;
        }

        let mut quotas: IndexMap<Category, usize> = IndexMap::new();
        let mut remainders: Vec<(Category, f64)> = Vec::new();
        for (category, weight) in &weighted {
            let exact = limit as f64 * weight / total_weight;
            let floor = (exact.floor() as usize).min(available[category]);
            quotas.insert(*category, floor);
            remainders.push((*category, exact - exact.floor()));
        }

        let mut remaining = limit.saturating_sub(quotas.values().sum());

        // Largest remainder first; stable sort keeps catalog order on ties
        remainders.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
        for (category, _) in &remainders {
            if remaining == 0 {
                break;
            }
            if quotas[category] < available[category] {
                quotas[category] += 1;
                remaining -= 1;
            }
        }

        // Capacity-capped categories spill over to the heaviest remaining ones
        let mut by_weight = weighted.clone();
        by_weight.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
        while remaining > 0 {
            let mut progressed = false;
            for (category, _) in &by_weight {
                if remaining == 0 {
                    break;
                }
                if quotas[category] < available[category] {
                    quotas[category] += 1;
                    remaining -= 1;
                    progressed = true;
                }
            }
            if !progressed {
                break;
            }
        }

        Some(quotas)
    }
}
