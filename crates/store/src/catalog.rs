use std::collections::{HashMap, HashSet};
use std::fs;
use std::path::Path;

use protocol::{all_tasks, Annotation, Category, Task, TaskStatus};
use tracing::info;

use crate::{AnnotationDb, Result};

/// Coverage-based status: how many of the task's glosses have at least one
/// annotation.
pub fn derive_status(task: &Task, annotations: &[Annotation]) -> TaskStatus {
    let annotated: HashSet<&str> = annotations
        .iter()
        .filter(|a| a.task_id == task.id)
        .map(|a| a.label.as_str())
        .collect();

    if annotated.len() >= task.glosses.len() {
        TaskStatus::Complete
    } else if annotated.is_empty() {
        TaskStatus::Pending
    } else {
        TaskStatus::Partial
    }
}

/// The static task list, read once from a JSON file of categories.
#[derive(Debug, Clone, Default)]
pub struct TaskCatalog {
    categories: Vec<Category>,
}

impl TaskCatalog {
    pub fn new(categories: Vec<Category>) -> Self {
        Self { categories }
    }

    pub fn load(path: &Path) -> Result<Self> {
        let raw = fs::read_to_string(path)?;
        let categories: Vec<Category> = serde_json::from_str(&raw)?;
        let catalog = Self::new(categories);
        info!(
            "loaded {} tasks from {}",
            catalog.len(),
            path.display()
        );
        Ok(catalog)
    }

    pub fn len(&self) -> usize {
        all_tasks(&self.categories).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn categories(&self) -> &[Category] {
        &self.categories
    }

    pub fn find_task(&self, task_id: &str) -> Option<&Task> {
        all_tasks(&self.categories).find(|t| t.id == task_id)
    }

    /// Catalog with live statuses. A stored status wins over the one derived
    /// from annotation coverage.
    pub fn with_statuses(&self, db: &AnnotationDb) -> Result<Vec<Category>> {
        let annotations = db.list_annotations()?;
        let stored: HashMap<String, TaskStatus> = db.task_statuses()?.into_iter().collect();

        Ok(self
            .categories
            .iter()
            .map(|category| Category {
                category_name: category.category_name.clone(),
                tasks: category
                    .tasks
                    .iter()
                    .map(|task| Task {
                        status: stored
                            .get(&task.id)
                            .copied()
                            .unwrap_or_else(|| derive_status(task, &annotations)),
                        ..task.clone()
                    })
                    .collect(),
            })
            .collect())
    }
}
