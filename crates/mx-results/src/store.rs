//! Run storage API.
//!
//! Layout: `<root>/<run_id>/manifest.json` plus `<root>/<run_id>/<table>.csv`
//! for every metric table. Each CSV starts with an `iteration` column.

use crate::types::{MetricRow, MetricTable, RunManifest};
use crate::{ResultsError, ResultsResult};
use std::fs;
use std::path::{Path, PathBuf};

const ITERATION_COLUMN: &str = "iteration";

#[derive(Clone)]
pub struct RunStore {
    root_dir: PathBuf,
}

impl RunStore {
    pub fn new(root_dir: PathBuf) -> ResultsResult<Self> {
        if !root_dir.exists() {
            fs::create_dir_all(&root_dir)?;
        }
        Ok(Self { root_dir })
    }

    /// Store kept next to a project file, under `.mexsyn/runs`.
    pub fn for_project(project_path: &Path) -> ResultsResult<Self> {
        let project_dir = project_path
            .parent()
            .ok_or_else(|| ResultsError::InvalidPath {
                message: "project path has no parent directory".to_string(),
            })?;
        Self::new(project_dir.join(".mexsyn").join("runs"))
    }

    pub fn root_dir(&self) -> &Path {
        &self.root_dir
    }

    fn run_dir(&self, run_id: &str) -> PathBuf {
        self.root_dir.join(run_id)
    }

    fn table_path(&self, run_id: &str, table: &str) -> ResultsResult<PathBuf> {
        let valid = !table.is_empty()
            && table
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-');
        if !valid {
            return Err(ResultsError::InvalidTableName {
                name: table.to_string(),
            });
        }
        Ok(self.run_dir(run_id).join(format!("{table}.csv")))
    }

    pub fn has_run(&self, run_id: &str) -> bool {
        self.run_dir(run_id).join("manifest.json").exists()
    }

    /// Write the manifest and one CSV per table. The manifest's table list
    /// is taken from `tables`.
    pub fn save_run(&self, manifest: &RunManifest, tables: &[MetricTable]) -> ResultsResult<()> {
        let run_dir = self.run_dir(&manifest.run_id);
        fs::create_dir_all(&run_dir)?;

        let mut manifest = manifest.clone();
        manifest.tables = tables.iter().map(|t| t.name.clone()).collect();

        for table in tables {
            let path = self.table_path(&manifest.run_id, &table.name)?;
            write_table(&path, table)?;
        }

        let manifest_json = serde_json::to_string_pretty(&manifest)?;
        fs::write(run_dir.join("manifest.json"), manifest_json)?;

        Ok(())
    }

    pub fn load_manifest(&self, run_id: &str) -> ResultsResult<RunManifest> {
        let manifest_path = self.run_dir(run_id).join("manifest.json");

        if !manifest_path.exists() {
            return Err(ResultsError::RunNotFound {
                run_id: run_id.to_string(),
            });
        }

        let content = fs::read_to_string(manifest_path)?;
        let manifest = serde_json::from_str(&content)?;
        Ok(manifest)
    }

    pub fn load_table(&self, run_id: &str, table: &str) -> ResultsResult<MetricTable> {
        if !self.has_run(run_id) {
            return Err(ResultsError::RunNotFound {
                run_id: run_id.to_string(),
            });
        }
        let path = self.table_path(run_id, table)?;
        if !path.exists() {
            return Err(ResultsError::TableNotFound {
                run_id: run_id.to_string(),
                table: table.to_string(),
            });
        }
        read_table(&path, table)
    }

    /// All saved runs, oldest first. `project_name` filters by project.
    pub fn list_runs(&self, project_name: Option<&str>) -> ResultsResult<Vec<RunManifest>> {
        let mut runs = Vec::new();

        if !self.root_dir.exists() {
            return Ok(runs);
        }

        for entry in fs::read_dir(&self.root_dir)? {
            let entry = entry?;
            if !entry.path().is_dir() {
                continue;
            }
            let run_id = entry.file_name().to_string_lossy().to_string();
            if let Ok(manifest) = self.load_manifest(&run_id) {
                if project_name.is_none_or(|name| manifest.project_name == name) {
                    runs.push(manifest);
                }
            }
        }

        runs.sort_by(|a, b| a.timestamp.cmp(&b.timestamp));
        Ok(runs)
    }

    pub fn delete_run(&self, run_id: &str) -> ResultsResult<()> {
        let run_dir = self.run_dir(run_id);
        if run_dir.exists() {
            fs::remove_dir_all(run_dir)?;
        }
        Ok(())
    }
}

fn write_table(path: &Path, table: &MetricTable) -> ResultsResult<()> {
    let mut wtr = csv::Writer::from_path(path)?;

    let mut header = Vec::with_capacity(table.columns.len() + 1);
    header.push(ITERATION_COLUMN.to_string());
    header.extend(table.columns.iter().cloned());
    wtr.write_record(&header)?;

    for row in &table.rows {
        let mut record = Vec::with_capacity(row.values.len() + 1);
        record.push(row.iteration.to_string());
        record.extend(row.values.iter().map(|v| v.to_string()));
        wtr.write_record(&record)?;
    }

    wtr.flush()?;
    Ok(())
}

fn read_table(path: &Path, name: &str) -> ResultsResult<MetricTable> {
    let malformed = |what: String| ResultsError::Malformed {
        table: name.to_string(),
        what,
    };

    let mut reader = csv::Reader::from_path(path)?;
    let headers = reader.headers()?.clone();
    let mut fields = headers.iter();
    if fields.next() != Some(ITERATION_COLUMN) {
        return Err(malformed(format!("first column must be '{ITERATION_COLUMN}'")));
    }
    let mut table = MetricTable::new(name, fields.map(str::to_string).collect());

    for record in reader.records() {
        let record = record?;
        let mut cells = record.iter();
        let iteration = cells
            .next()
            .and_then(|s| s.trim().parse::<usize>().ok())
            .ok_or_else(|| malformed("bad iteration index".to_string()))?;
        let values = cells
            .map(|s| {
                s.trim()
                    .parse::<f64>()
                    .map_err(|_| malformed(format!("bad value '{s}' at iteration {iteration}")))
            })
            .collect::<ResultsResult<Vec<f64>>>()?;
        if values.len() != table.columns.len() {
            return Err(malformed(format!("row {iteration} has the wrong width")));
        }
        table.rows.push(MetricRow { iteration, values });
    }

    Ok(table)
}
