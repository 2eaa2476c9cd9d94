use mx_core::{Coefficient, CorrectionFactor, CorrectionMap, Match, Real, Superstructure};
use mx_hybrid::*;
use mx_project::{HybridConfig, ProblemDef, ProjectFile, RetryPolicy, SolverDef, StreamDef};
use mx_results::{RunStatus, RunStore};
use mx_solver::{
    EngineFault, EngineStage, EscalationLadder, OptionSet, RawSolve, SolverGateway, SolverService,
    Termination,
};
use std::collections::BTreeMap;

fn built() -> Match {
    Match::new("R1", "S1", 1)
}

fn idle() -> Match {
    Match::new("R1", "S1", 2)
}

struct Builder {
    matches: Vec<Match>,
}

impl Builder {
    fn new() -> Self {
        Self {
            matches: vec![built(), idle()],
        }
    }
}

struct InitModel;

struct TopoModel {
    height_factor: Real,
    min_height: Option<Real>,
    big_m_scale: Real,
    cuts: usize,
    warm_started: bool,
}

struct SplitModel;

struct UnitModel {
    elements: u32,
}

impl NetworkBuilder for Builder {
    type Initialization = InitModel;
    type Topology = TopoModel;
    type Redistribution = SplitModel;
    type Detailed = UnitModel;

    fn matches(&self) -> &[Match] {
        &self.matches
    }

    fn build_initialization(&self, _: &InitializationRequest<'_>) -> HybridResult<InitModel> {
        Ok(InitModel)
    }

    fn build_topology(&self, request: &TopologyRequest<'_>) -> HybridResult<TopoModel> {
        Ok(TopoModel {
            height_factor: request.corrections.factor(&built()).height,
            min_height: request.min_height,
            big_m_scale: request.big_m_scale,
            cuts: request.cuts.len(),
            warm_started: request.initial.is_some(),
        })
    }

    fn build_redistribution(&self, _: &TopologySolution) -> HybridResult<SplitModel> {
        Ok(SplitModel)
    }

    fn build_detailed(&self, request: &DetailedRequest<'_>) -> HybridResult<UnitModel> {
        assert_eq!(request.boundary.unit, built());
        Ok(UnitModel {
            elements: request.elements,
        })
    }
}

fn estimate(selection: Real, mass: Real, shell: Real) -> UnitEstimate {
    UnitEstimate {
        selection,
        mass_exchanged: mass,
        mass_transfer: 1.0,
        diameter: 1.0,
        height: 1.0,
        packing_cost: 1.0,
        specific_area: 1.0,
        capital: CapitalCost {
            shell,
            packing: 0.0,
        },
    }
}

/// One active unit whose simplified capital is `100 * height_factor`.
fn network(height_factor: Real) -> TopologySolution {
    let shell = 100.0 * height_factor;
    TopologySolution {
        objective: shell,
        units: BTreeMap::from([
            (built(), estimate(1.0, 0.02, shell)),
            (idle(), estimate(0.0, 0.0, 0.0)),
        ]),
        rich_profile: BTreeMap::from([
            (("R1".to_string(), 1), 0.07),
            (("R1".to_string(), 2), 0.03),
            (("R1".to_string(), 3), 0.03),
        ]),
        lean_profile: BTreeMap::from([
            (("S1".to_string(), 1), 0.03),
            (("S1".to_string(), 2), 0.01),
            (("S1".to_string(), 3), 0.01),
        ]),
        split: None,
        fixed_cost_per_unit: 0.0,
        utility_cost: 0.0,
    }
}

/// Scripted engine: detailed coefficients are `detailed_factor` times the
/// simplified ones.
struct Plant {
    detailed_factor: Real,
    fail_topology: bool,
    /// Topology solves that succeed before every later one fails.
    topology_budget: Option<usize>,
    fail_detailed: bool,
    min_elements: u32,
    refined_objective: Option<Real>,
    init_calls: usize,
    topology_calls: Vec<(Option<Real>, Real, usize, bool)>,
    detailed_calls: Vec<u32>,
}

impl Default for Plant {
    fn default() -> Self {
        Self {
            detailed_factor: 1.2,
            fail_topology: false,
            topology_budget: None,
            fail_detailed: false,
            min_elements: 0,
            refined_objective: None,
            init_calls: 0,
            topology_calls: Vec::new(),
            detailed_calls: Vec::new(),
        }
    }
}

impl SolverService<InitModel> for Plant {
    type Solution = TopologySolution;

    fn invoke(&mut self, _: &InitModel, _: &str, _: &OptionSet) -> Result<RawSolve<TopologySolution>, EngineFault> {
        self.init_calls += 1;
        Ok(RawSolve::solved(Termination::LocallyOptimal, network(1.0)))
    }
}

impl SolverService<TopoModel> for Plant {
    type Solution = TopologySolution;

    fn invoke(&mut self, model: &TopoModel, _: &str, _: &OptionSet) -> Result<RawSolve<TopologySolution>, EngineFault> {
        self.topology_calls
            .push((model.min_height, model.big_m_scale, model.cuts, model.warm_started));
        let over_budget = self
            .topology_budget
            .is_some_and(|n| self.topology_calls.len() > n);
        if self.fail_topology || over_budget {
            return Ok(RawSolve::failed(Termination::Infeasible));
        }
        Ok(RawSolve::solved(Termination::Optimal, network(model.height_factor)))
    }
}

impl SolverService<SplitModel> for Plant {
    type Solution = TopologySolution;

    fn invoke(&mut self, _: &SplitModel, _: &str, _: &OptionSet) -> Result<RawSolve<TopologySolution>, EngineFault> {
        let Some(objective) = self.refined_objective else {
            return Err(EngineFault::new("no split model"));
        };
        let mut refined = network(1.0);
        refined.objective = objective;
        refined.split = Some(SplitProfile {
            lean_outlet: BTreeMap::from([(built(), 0.025)]),
            rich_outlet: BTreeMap::from([(built(), 0.035)]),
        });
        Ok(RawSolve::solved(Termination::LocallyOptimal, refined))
    }
}

impl SolverService<UnitModel> for Plant {
    type Solution = UnitDesign;

    fn invoke(&mut self, model: &UnitModel, _: &str, _: &OptionSet) -> Result<RawSolve<UnitDesign>, EngineFault> {
        self.detailed_calls.push(model.elements);
        if self.fail_detailed || model.elements < self.min_elements {
            return Ok(RawSolve::failed(Termination::Infeasible));
        }
        let f = self.detailed_factor;
        Ok(RawSolve::solved(
            Termination::LocallyOptimal,
            UnitDesign {
                mass_transfer: f,
                diameter: f,
                height: f,
                packing_cost: f,
                specific_area: f,
                capital: CapitalCost {
                    shell: 100.0 * f,
                    packing: 0.0,
                },
            },
        ))
    }
}

fn config() -> HybridConfig {
    HybridConfig {
        max_iter: 10,
        non_iso: false,
        ..HybridConfig::default()
    }
}

fn single_rung() -> SolverGateway {
    let ladder = EscalationLadder::new(vec![EngineStage::new("fake", vec![OptionSet::new()])]).unwrap();
    SolverGateway::new(ladder.clone(), ladder)
}

fn close(a: Real, b: Real) -> bool {
    (a - b).abs() < 1e-9
}

#[test]
fn corrections_close_the_gap() {
    let mut controller = IterationController::new(Builder::new(), Plant::default(), config()).unwrap();
    let report = controller.run();

    assert_eq!(report.status, RunStatus::Converged);
    assert_eq!(report.iterations, 2);
    assert_eq!(report.records.len(), 2);

    let first = &report.records[0];
    assert!(close(first.minlp_objective, 100.0));
    assert!(close(first.real_objective, 120.0));
    assert!(close(first.gap_percent.unwrap(), 20.0 / 120.0 * 100.0));
    assert!(!first.gap_met);
    assert_eq!(first.unit_count, 1);

    let second = &report.records[1];
    assert!(close(second.minlp_objective, 120.0));
    assert!(second.gap_met);
    assert!(second.converged);

    // Equal real objective is not an improvement.
    let best = report.outcome().unwrap();
    assert_eq!(best.iteration, 0);
    assert!(close(best.real_objective, 120.0));
    assert_eq!(report.best_network.as_ref().map(|b| b.designs.len()), Some(1));

    let f = report.corrections.factor(&built());
    for (_, v) in f.iter() {
        assert!(close(v, 1.2));
    }
    assert_eq!(report.corrections.factor(&idle()), CorrectionFactor::IDENTITY);
}

#[test]
fn seeded_corrections_converge_immediately() {
    let seed: CorrectionMap = [(built(), CorrectionFactor::from_fn(|_| 1.2))].into_iter().collect();
    let mut controller = IterationController::new(Builder::new(), Plant::default(), config())
        .unwrap()
        .with_initial_corrections(seed);

    let state = controller.initial_state();
    assert_eq!(state.corrections.len(), 2);

    let report = controller.run();
    assert_eq!(report.status, RunStatus::Converged);
    assert_eq!(report.iterations, 1);
}

#[test]
fn topology_failure_walks_the_retry_schedule_then_aborts() {
    let retry = RetryPolicy {
        threshold_steps: 2,
        big_m_steps: 3,
        ..RetryPolicy::default()
    };
    let cfg = HybridConfig { retry, ..config() };
    let plant = Plant {
        fail_topology: true,
        ..Plant::default()
    };
    let mut controller = IterationController::new(Builder::new(), plant, cfg)
        .unwrap()
        .with_gateways(single_rung(), single_rung());

    let mut events = Vec::new();
    let mut record = |e: ProgressEvent| events.push(e);
    let sink: &mut dyn FnMut(ProgressEvent) = &mut record;
    let report = controller.run_with_progress(Some(sink));

    assert_eq!(report.status, RunStatus::Aborted);
    assert_eq!(report.iterations, 0);
    assert!(report.records.is_empty());
    assert!(matches!(report.outcome(), Err(HybridError::RunAborted { iteration: 0 })));

    let plant = controller.service();
    assert_eq!(retry.max_attempts(), 9);
    assert_eq!(plant.topology_calls.len(), 9);
    assert_eq!(plant.init_calls, 9);

    let mut expected = vec![(Some(retry.initial_min_height), 1.0)];
    for step in 0..2 {
        let h = retry.min_height(step);
        expected.push((Some(h), 1.0));
        for k in 0..3 {
            expected.push((Some(h), retry.big_m_scale(k)));
        }
    }
    let seen: Vec<_> = plant.topology_calls.iter().map(|(h, m, _, _)| (*h, *m)).collect();
    assert_eq!(seen, expected);
    assert!(plant.topology_calls.iter().all(|(_, _, _, warm)| *warm));

    let retries: Vec<_> = events.iter().filter_map(|e| e.retry.clone()).collect();
    assert_eq!(retries.len(), 8);
    assert_eq!(retries.last().map(|r| (r.attempt, r.max_attempts)), Some((9, 9)));
    assert_eq!(events.last().map(|e| e.phase), Some(IterationPhase::Aborted));
}

#[test]
fn abort_after_a_solved_iteration_keeps_the_best_network() {
    let cfg = HybridConfig {
        retry: RetryPolicy {
            threshold_steps: 1,
            big_m_steps: 1,
            ..RetryPolicy::default()
        },
        ..config()
    };
    let plant = Plant {
        topology_budget: Some(1),
        ..Plant::default()
    };
    let mut controller = IterationController::new(Builder::new(), plant, cfg)
        .unwrap()
        .with_gateways(single_rung(), single_rung());
    let report = controller.run();

    assert_eq!(report.status, RunStatus::Aborted);
    assert_eq!(report.iterations, 1);
    assert_eq!(report.records.len(), 1);
    // One solved attempt, then 1 + 1 * (1 + 1) failed ones.
    assert_eq!(controller.service().topology_calls.len(), 4);

    let best = report.outcome().unwrap();
    assert_eq!(best.iteration, 0);
    assert!(close(best.real_objective, 120.0));
    let network = report.best_network.as_ref().unwrap();
    assert_eq!(network.iteration, 0);
    assert!(network.designs.contains_key(&built()));
    assert_eq!(report.best_topology.map(|b| b.iteration), Some(0));
}

#[test]
fn failed_detailed_unit_discards_iteration() {
    let cfg = HybridConfig {
        max_iter: 3,
        ..config()
    };
    let plant = Plant {
        fail_detailed: true,
        ..Plant::default()
    };
    let mut controller = IterationController::new(Builder::new(), plant, cfg)
        .unwrap()
        .with_gateways(single_rung(), single_rung());
    let report = controller.run();

    // Corrections never move, so they are stable from iteration 2, but there
    // is no accepted network to stop on.
    assert_eq!(report.status, RunStatus::MaxIterations);
    assert_eq!(report.iterations, 3);
    assert!(report.records.iter().all(|r| r.discarded && !r.gap_met));
    assert!(report.records[2].stable);
    assert!(report.best.is_none());
    assert!(report.best_network.is_none());
    assert!(report.outcome().is_err());
    assert_eq!(report.corrections, CorrectionMap::identity(&[built(), idle()]));

    let plant = controller.service();
    assert_eq!(plant.detailed_calls, [20u32, 50, 100, 200].repeat(3));
}

#[test]
fn element_schedule_stops_at_first_success() {
    let plant = Plant {
        min_elements: 100,
        ..Plant::default()
    };
    let mut controller = IterationController::new(Builder::new(), plant, config())
        .unwrap()
        .with_gateways(single_rung(), single_rung());
    let state = controller.initial_state();
    let StepOutcome::Continue(state) = controller.step(state) else {
        panic!("first iteration should not stop");
    };
    assert_eq!(state.iteration, 1);
    assert_eq!(controller.service().detailed_calls, vec![20, 50, 100]);
    assert!(!state.checker.records()[0].discarded);
}

#[test]
fn binary_cuts_accumulate_across_iterations() {
    let cfg = HybridConfig {
        max_iter: 3,
        bin_cuts: true,
        ..config()
    };
    let plant = Plant {
        detailed_factor: 3.0,
        ..Plant::default()
    };
    let mut controller = IterationController::new(Builder::new(), plant, cfg).unwrap();
    let report = controller.run();

    assert_eq!(report.status, RunStatus::MaxIterations);
    assert_eq!(report.cuts.len(), 3);
    let cuts_seen: Vec<_> = controller
        .service()
        .topology_calls
        .iter()
        .map(|(_, _, cuts, _)| *cuts)
        .collect();
    assert_eq!(cuts_seen, vec![0, 1, 2]);

    let cut = &report.cuts[0];
    assert_eq!(cut.pattern.get(&built()), Some(&true));
    assert_eq!(cut.pattern.get(&idle()), Some(&false));
    assert_eq!(cut.shift, ShiftInvariance { earlier: false, later: true });

    // 3.0 / 1.0 and 3.0 / 1.5 clip to 1.5, then 3.0 / 2.25 lies inside the band.
    let h: Vec<_> = report
        .records
        .iter()
        .map(|r| r.corrections.factor(&built()).get(Coefficient::Height))
        .collect();
    assert!(close(h[0], 1.5));
    assert!(close(h[1], 2.25));
    assert!(close(h[2], 3.0));
}

#[test]
fn refinement_is_authoritative_only_when_cheaper() {
    let cfg = HybridConfig {
        max_iter: 1,
        non_iso: true,
        ..config()
    };

    let plant = Plant {
        refined_objective: Some(90.0),
        ..Plant::default()
    };
    let report = IterationController::new(Builder::new(), plant, cfg.clone()).unwrap().run();
    assert_eq!(report.records[0].authority, Authority::Refinement);
    assert!(close(report.records[0].minlp_objective, 90.0));

    let plant = Plant {
        refined_objective: Some(100.0),
        ..Plant::default()
    };
    let report = IterationController::new(Builder::new(), plant, cfg.clone()).unwrap().run();
    assert_eq!(report.records[0].authority, Authority::Topology);

    let report = IterationController::new(Builder::new(), Plant::default(), cfg).unwrap().run();
    assert_eq!(report.records[0].authority, Authority::Topology);
    assert_eq!(report.status, RunStatus::MaxIterations);
}

#[test]
fn invalid_configuration_is_rejected_up_front() {
    let cfg = HybridConfig {
        cor_filter_size: 0.0,
        ..config()
    };
    let err = IterationController::new(Builder::new(), Plant::default(), cfg).err();
    assert!(matches!(err, Some(HybridError::Configuration(_))));

    let empty = Builder { matches: vec![] };
    let err = IterationController::new(empty, Plant::default(), config()).err();
    assert!(matches!(err, Some(HybridError::Setup { .. })));
}

fn project() -> ProjectFile {
    let stream = |name: &str, c_in, c_out, flow| StreamDef {
        name: name.to_string(),
        c_in,
        c_out,
        flow,
    };
    ProjectFile {
        version: 1,
        name: "controller test".to_string(),
        problem: ProblemDef {
            rich: vec![stream("R1", 0.07, 0.0003, 2.0), stream("R2", 0.051, 0.0001, 1.0)],
            lean: vec![stream("S1", 0.0006, 0.031, 1.8)],
        },
        hybrid: HybridConfig {
            superstruct: Superstructure::StageWise,
            stages: Some(3),
            ..config()
        },
        solvers: SolverDef::default(),
    }
}

#[test]
fn superstructure_matches_cover_every_stage() {
    let matches = superstructure_matches(&project()).unwrap();
    assert_eq!(matches.len(), 2 * 3);
    assert!(matches.contains(&Match::new("R2", "S1", 3)));
}

#[test]
fn report_tables_are_saved_with_the_run() {
    let project = project();
    let mut controller =
        IterationController::from_project(&project, Builder::new(), Plant::default()).unwrap();
    let report = controller.run();

    let tables = report.metric_tables().unwrap();
    let names: Vec<_> = tables.iter().map(|t| t.name.as_str()).collect();
    for expected in ["correction_log", "solution_log", "gap_percent", "capcost_log_nlp", "failed_exchanger"] {
        assert!(names.contains(&expected), "missing {expected}");
    }
    let corrections = tables.iter().find(|t| t.name == "correction_log").unwrap();
    assert_eq!(corrections.columns.len(), 2 * Coefficient::ALL.len());
    assert!(corrections.columns.contains(&"R1:S1:1/height".to_string()));

    let temp_dir = std::env::temp_dir().join("mx_hybrid_report_test");
    let _ = std::fs::remove_dir_all(&temp_dir);
    let store = RunStore::new(temp_dir.clone()).unwrap();
    let run_id = mx_results::compute_run_id(&project, "test");
    let manifest = save_report(&store, &run_id, &project.name, "test", &report).unwrap();

    let loaded = store.load_manifest(&run_id).unwrap();
    assert_eq!(loaded.status, RunStatus::Converged);
    assert_eq!(loaded.tables, manifest.tables);
    assert_eq!(loaded.best_iteration, Some(0));
    let solution = store.load_table(&run_id, "solution_log").unwrap();
    assert_eq!(solution.rows.len(), report.records.len());

    let _ = std::fs::remove_dir_all(&temp_dir);
}
