//! Board-wide view of running tasks.

use serde::{Deserialize, Serialize};

/// One entry of `active_task_details`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActiveTaskDetail {
    pub task_id: String,
    pub task_type: String,
    #[serde(alias = "duration", default)]
    pub duration_seconds: f64,
    #[serde(default)]
    pub description: String,
}

/// Full (never incremental) read of the active tasks of a board.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ConcurrentTaskSnapshot {
    #[serde(default)]
    pub active_tasks: u32,
    #[serde(default)]
    pub available_slots: u32,
    #[serde(alias = "active_task_details", default)]
    pub details: Vec<ActiveTaskDetail>,
}

impl ConcurrentTaskSnapshot {
    /// Returned when the status endpoint cannot be read.
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn has_active(&self) -> bool {
        self.active_tasks > 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn decodes_backend_shape() {
        let snap: ConcurrentTaskSnapshot = serde_json::from_value(json!({
            "active_tasks": 2,
            "available_slots": 1,
            "active_task_details": [
                {"task_id": "t1", "task_type": "generate_annotation", "duration": 12.5, "description": "page 3"},
                {"task_id": "t2", "task_type": "generate_pdf_note", "duration": 40}
            ]
        }))
        .unwrap();

        assert_eq!(snap.active_tasks, 2);
        assert_eq!(snap.details.len(), 2);
        assert_eq!(snap.details[0].duration_seconds, 12.5);
        assert_eq!(snap.details[1].description, "");
        assert!(snap.has_active());
    }

    #[test]
    fn empty_snapshot_has_no_activity() {
        assert!(!ConcurrentTaskSnapshot::empty().has_active());
    }
}
