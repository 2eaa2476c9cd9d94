//! Result data types.

use crate::{ResultsError, ResultsResult};
use serde::{Deserialize, Serialize};

pub type RunId = String;

/// How a controller run ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Converged,
    MaxIterations,
    Aborted,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunManifest {
    pub run_id: RunId,
    pub project_name: String,
    pub timestamp: String,
    pub solver_version: String,
    pub status: RunStatus,
    pub iterations: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub best_iteration: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub best_objective: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub best_minlp_iteration: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub best_minlp_objective: Option<f64>,
    /// Names of the metric tables saved with the run.
    #[serde(default)]
    pub tables: Vec<String>,
}

/// One table per metric, one row per iteration.
#[derive(Debug, Clone, PartialEq)]
pub struct MetricTable {
    pub name: String,
    pub columns: Vec<String>,
    pub rows: Vec<MetricRow>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct MetricRow {
    pub iteration: usize,
    pub values: Vec<f64>,
}

impl MetricTable {
    pub fn new(name: impl Into<String>, columns: Vec<String>) -> Self {
        Self {
            name: name.into(),
            columns,
            rows: Vec::new(),
        }
    }

    /// Single-column table whose column is named after the table.
    pub fn scalar(name: impl Into<String>) -> Self {
        let name = name.into();
        Self::new(name.clone(), vec![name])
    }

    pub fn push(&mut self, iteration: usize, values: Vec<f64>) -> ResultsResult<()> {
        if values.len() != self.columns.len() {
            return Err(ResultsError::RowShape {
                table: self.name.clone(),
                iteration,
                expected: self.columns.len(),
                got: values.len(),
            });
        }
        self.rows.push(MetricRow { iteration, values });
        Ok(())
    }

    pub fn column(&self, name: &str) -> Option<Vec<(usize, f64)>> {
        let idx = self.columns.iter().position(|c| c == name)?;
        Some(
            self.rows
                .iter()
                .map(|r| (r.iteration, r.values[idx]))
                .collect(),
        )
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

pub fn timestamp_now() -> String {
    chrono::Utc::now().to_rfc3339()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn push_checks_row_width() {
        let mut table = MetricTable::new("capcost", vec!["shell".into(), "packing".into()]);
        table.push(0, vec![1.0, 2.0]).unwrap();
        let err = table.push(1, vec![1.0]).unwrap_err();
        assert!(matches!(err, ResultsError::RowShape { expected: 2, got: 1, .. }));
        assert_eq!(table.column("packing"), Some(vec![(0, 2.0)]));
        assert_eq!(table.column("missing"), None);
    }

    #[test]
    fn status_serializes_snake_case() {
        let json = serde_json::to_string(&RunStatus::MaxIterations).unwrap();
        assert_eq!(json, "\"max_iterations\"");
    }
}
