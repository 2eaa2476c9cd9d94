//! Run reports and their conversion into stored metric tables.

use crate::controller::{BestNetwork, ControllerState};
use crate::convergence::{Authority, BestSolution, BestTopology, IterationRecord};
use crate::cuts::TopologyCut;
use crate::error::{HybridError, HybridResult};
use mx_core::{Coefficient, CorrectionMap, Match, Real};
use mx_results::{MetricTable, RunManifest, RunStatus, RunStore, timestamp_now};

#[derive(Clone, Debug)]
pub struct RunReport {
    pub status: RunStatus,
    /// Completed iterations.
    pub iterations: usize,
    pub records: Vec<IterationRecord>,
    pub best: Option<BestSolution>,
    pub best_topology: Option<BestTopology>,
    pub best_network: Option<BestNetwork>,
    pub cuts: Vec<TopologyCut>,
    /// Corrections after the last completed iteration.
    pub corrections: CorrectionMap,
}

fn flag(b: bool) -> Real {
    if b { 1.0 } else { 0.0 }
}

impl RunReport {
    pub(crate) fn from_state(status: RunStatus, state: ControllerState) -> Self {
        let cuts = state.cuts.cuts().into_iter().cloned().collect();
        Self {
            status,
            iterations: state.iteration,
            records: state.checker.records().to_vec(),
            best: state.checker.best(),
            best_topology: state.checker.best_topology(),
            best_network: state.best_network,
            cuts,
            corrections: state.corrections,
        }
    }

    /// The best accepted network, or `RunAborted` when no iteration produced one.
    pub fn outcome(&self) -> HybridResult<BestSolution> {
        self.best.ok_or(HybridError::RunAborted {
            iteration: self.iterations,
        })
    }

    pub fn is_converged(&self) -> bool {
        self.status == RunStatus::Converged
    }

    pub fn manifest(&self, run_id: &str, project_name: &str, solver_version: &str) -> RunManifest {
        RunManifest {
            run_id: run_id.to_string(),
            project_name: project_name.to_string(),
            timestamp: timestamp_now(),
            solver_version: solver_version.to_string(),
            status: self.status,
            iterations: self.iterations,
            best_iteration: self.best.map(|b| b.iteration),
            best_objective: self.best.map(|b| b.real_objective),
            best_minlp_iteration: self.best_topology.map(|b| b.iteration),
            best_minlp_objective: self.best_topology.map(|b| b.minlp_objective),
            tables: Vec::new(),
        }
    }

    /// One table per logged quantity, one row per recorded iteration.
    pub fn metric_tables(&self) -> HybridResult<Vec<MetricTable>> {
        let mut tables = vec![self.correction_log()?];

        let scalars: [(&str, fn(&IterationRecord) -> Real); 6] = [
            ("solution_log", |r| r.real_objective),
            ("minlp_tac_log", |r| r.minlp_objective),
            ("gap_percent", |r| r.gap_percent.unwrap_or(Real::NAN)),
            ("exchanger_log", |r| r.unit_count as Real),
            ("fixed_cost", |r| r.costs.fixed),
            ("utility_cost", |r| r.costs.utility),
        ];
        for (name, value) in scalars {
            let mut table = MetricTable::scalar(name);
            for r in &self.records {
                table.push(r.iteration, vec![value(r)])?;
            }
            tables.push(table);
        }

        let capital_columns = || vec!["shell".to_string(), "packing".to_string(), "total".to_string()];
        let mut minlp_capital = MetricTable::new("capcost_log_minlp", capital_columns());
        let mut detailed_capital = MetricTable::new("capcost_log_nlp", capital_columns());
        let mut failed = MetricTable::new(
            "failed_exchanger",
            vec!["discarded".to_string(), "failed_units".to_string()],
        );
        let mut convergence = MetricTable::new(
            "convergence",
            vec![
                "gap_met".to_string(),
                "stable".to_string(),
                "converged".to_string(),
                "refined".to_string(),
            ],
        );
        for r in &self.records {
            let m = r.costs.minlp_capital;
            minlp_capital.push(r.iteration, vec![m.shell, m.packing, m.total()])?;
            let d = r.costs.detailed_capital;
            detailed_capital.push(r.iteration, vec![d.shell, d.packing, d.total()])?;
            let failed_units = r.unit_success.values().filter(|ok| !**ok).count();
            failed.push(r.iteration, vec![flag(r.discarded), failed_units as Real])?;
            convergence.push(
                r.iteration,
                vec![
                    flag(r.gap_met),
                    flag(r.stable),
                    flag(r.converged),
                    flag(r.authority == Authority::Refinement),
                ],
            )?;
        }
        tables.extend([minlp_capital, detailed_capital, failed, convergence]);

        Ok(tables)
    }

    /// Columns are `<match>/<coefficient>`, e.g. `R1:S2:1/kw`.
    fn correction_log(&self) -> HybridResult<MetricTable> {
        let keys: Vec<(Match, Coefficient)> = self
            .records
            .first()
            .map(|r| {
                r.corrections
                    .iter()
                    .flat_map(|(m, _)| Coefficient::ALL.into_iter().map(move |c| (m.clone(), c)))
                    .collect()
            })
            .unwrap_or_default();
        let columns = keys.iter().map(|(m, c)| format!("{m}/{}", c.key())).collect();

        let mut table = MetricTable::new("correction_log", columns);
        for r in &self.records {
            let values = keys
                .iter()
                .map(|(m, c)| r.corrections.factor(m).get(*c))
                .collect();
            table.push(r.iteration, values)?;
        }
        Ok(table)
    }
}

/// Persist `report` as run `run_id` and return the stored manifest.
pub fn save_report(
    store: &RunStore,
    run_id: &str,
    project_name: &str,
    solver_version: &str,
    report: &RunReport,
) -> HybridResult<RunManifest> {
    let tables = report.metric_tables()?;
    let mut manifest = report.manifest(run_id, project_name, solver_version);
    store.save_run(&manifest, &tables)?;
    manifest.tables = tables.into_iter().map(|t| t.name).collect();
    Ok(manifest)
}
