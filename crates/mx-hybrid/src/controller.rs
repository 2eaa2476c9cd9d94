//! The iteration controller.
//!
//! Each iteration runs through
//! `BuildMinlp -> SolveMinlp -> [MinlpRetry] -> MinlpSolved -> [Refine] ->
//! DeriveBoundaries -> SolveDetailed -> CorrectAndCheck` and ends in
//! `Continue`, `Converged` or `Aborted`. State is threaded explicitly: a
//! [`ControllerState`] goes into [`IterationController::step`] and comes back
//! inside the [`StepOutcome`].

use crate::boundary::derive_boundary;
use crate::convergence::{Authority, ConvergenceChecker};
use crate::correction::{CorrectionFactorEngine, CorrectionFilter, DetailedOutcome};
use crate::cuts::{BinaryCutGenerator, CutRegistry};
use crate::error::{HybridError, HybridResult};
use crate::network::{
    DetailedRequest, InitializationRequest, NetworkBuilder, NetworkSolver, TopologyRequest,
    TopologySolution, UnitBoundary, UnitDesign, UnitEstimate,
};
use crate::progress::{IterationPhase, ProgressEvent, RetryProgress};
use crate::report::RunReport;
use mx_core::{CorrectionFactor, CorrectionMap, Match, Real};
use mx_project::{HybridConfig, ProjectFile, validate_config, validate_project};
use mx_results::RunStatus;
use mx_solver::{SolveOutcome, SolveTier, SolverGateway};
use std::collections::BTreeMap;
use std::time::Instant;
use tracing::{debug, info, warn};

/// Lowest accepted network so far, kept with its detailed designs.
#[derive(Clone, Debug, PartialEq)]
pub struct BestNetwork {
    pub iteration: usize,
    pub topology: TopologySolution,
    pub designs: BTreeMap<Match, UnitDesign>,
}

/// Everything a run carries from one iteration to the next.
#[derive(Clone, Debug)]
pub struct ControllerState {
    /// Index of the next iteration to run.
    pub iteration: usize,
    pub corrections: CorrectionMap,
    pub cuts: CutRegistry,
    pub checker: ConvergenceChecker,
    pub best_network: Option<BestNetwork>,
    started: Instant,
}

impl ControllerState {
    pub fn elapsed_s(&self) -> f64 {
        self.started.elapsed().as_secs_f64()
    }
}

#[derive(Debug)]
pub enum StepOutcome {
    Continue(ControllerState),
    Converged(ControllerState),
    /// Topology retries exhausted.
    Aborted(ControllerState),
}

/// Threshold handed to a topology attempt.
#[derive(Clone, Copy, Debug)]
enum Threshold {
    /// Policy default when the initialization solved, builder default otherwise.
    Default,
    Fixed(Real),
}

fn emit(progress: &mut Option<&mut dyn FnMut(ProgressEvent)>, event: ProgressEvent) {
    if let Some(cb) = progress.as_deref_mut() {
        cb(event);
    }
}

fn phase(
    progress: &mut Option<&mut dyn FnMut(ProgressEvent)>,
    state: &ControllerState,
    phase: IterationPhase,
    message: Option<String>,
) {
    emit(
        progress,
        ProgressEvent::phase(state.iteration, phase, state.elapsed_s(), message),
    );
}

fn retry_event(
    state: &ControllerState,
    attempt: u64,
    max_attempts: u64,
    min_height: Real,
    big_m_scale: Real,
) -> ProgressEvent {
    let mut event = ProgressEvent::phase(
        state.iteration,
        IterationPhase::MinlpRetry,
        state.elapsed_s(),
        None,
    );
    event.retry = Some(RetryProgress {
        attempt,
        max_attempts,
        min_height: Some(min_height),
        big_m_scale,
    });
    event
}

pub struct IterationController<B, S> {
    builder: B,
    service: S,
    config: HybridConfig,
    nlp: SolverGateway,
    minlp: SolverGateway,
    engine: CorrectionFactorEngine,
    cut_generator: BinaryCutGenerator,
    seed: Option<CorrectionMap>,
}

impl<B, S> IterationController<B, S>
where
    B: NetworkBuilder,
    S: NetworkSolver<B>,
{
    /// Validate `config` and set up a controller with the built-in ladders.
    pub fn new(builder: B, service: S, config: HybridConfig) -> HybridResult<Self> {
        validate_config(&config)?;
        let stage_count = builder
            .matches()
            .iter()
            .map(|m| m.stage)
            .max()
            .ok_or_else(|| HybridError::Setup {
                what: "builder offers no candidate matches".to_string(),
            })?;
        let engine = CorrectionFactorEngine::new(CorrectionFilter::new(config.cor_filter_size)?);

        Ok(Self {
            builder,
            service,
            config,
            nlp: SolverGateway::for_nlp(),
            minlp: SolverGateway::for_minlp(),
            engine,
            cut_generator: BinaryCutGenerator::new(stage_count),
            seed: None,
        })
    }

    /// Controller configured from a project file, ladder overrides included.
    pub fn from_project(project: &ProjectFile, builder: B, service: S) -> HybridResult<Self> {
        validate_project(project)?;
        Ok(Self::new(builder, service, project.hybrid.clone())?
            .with_gateways(project.solvers.nlp_gateway(), project.solvers.minlp_gateway()))
    }

    pub fn with_gateways(mut self, nlp: SolverGateway, minlp: SolverGateway) -> Self {
        self.nlp = nlp;
        self.minlp = minlp;
        self
    }

    /// Start from known corrections instead of identity. Matches missing
    /// from `corrections` start at identity.
    pub fn with_initial_corrections(mut self, corrections: CorrectionMap) -> Self {
        self.seed = Some(corrections);
        self
    }

    pub fn config(&self) -> &HybridConfig {
        &self.config
    }

    pub fn builder(&self) -> &B {
        &self.builder
    }

    pub fn service(&self) -> &S {
        &self.service
    }

    pub fn initial_state(&self) -> ControllerState {
        let matches = self.builder.matches();
        let corrections = match &self.seed {
            Some(seed) => seed.covering(matches),
            None => CorrectionMap::identity(matches),
        };
        ControllerState {
            iteration: 0,
            corrections,
            cuts: CutRegistry::default(),
            checker: ConvergenceChecker::new(self.config.tol),
            best_network: None,
            started: Instant::now(),
        }
    }

    pub fn run(&mut self) -> RunReport {
        self.run_with_progress(None)
    }

    /// Iterate until convergence, abort, or `max_iter` iterations.
    pub fn run_with_progress(
        &mut self,
        mut progress: Option<&mut dyn FnMut(ProgressEvent)>,
    ) -> RunReport {
        let mut state = self.initial_state();
        info!(
            matches = state.corrections.len(),
            max_iter = self.config.max_iter,
            tol = self.config.tol,
            "starting hybrid iterations"
        );
        phase(&mut progress, &state, IterationPhase::Init, None);

        loop {
            match self.step_with_progress(state, &mut progress) {
                StepOutcome::Continue(next) => {
                    if next.iteration >= self.config.max_iter as usize {
                        info!(iterations = next.iteration, best = ?next.checker.best(), "iteration limit reached");
                        phase(&mut progress, &next, IterationPhase::MaxIterations, None);
                        return RunReport::from_state(RunStatus::MaxIterations, next);
                    }
                    state = next;
                }
                StepOutcome::Converged(done) => {
                    return RunReport::from_state(RunStatus::Converged, done);
                }
                StepOutcome::Aborted(done) => {
                    return RunReport::from_state(RunStatus::Aborted, done);
                }
            }
        }
    }

    pub fn step(&mut self, state: ControllerState) -> StepOutcome {
        self.step_with_progress(state, &mut None)
    }

    /// Run one full iteration.
    pub fn step_with_progress(
        &mut self,
        mut state: ControllerState,
        progress: &mut Option<&mut dyn FnMut(ProgressEvent)>,
    ) -> StepOutcome {
        let iteration = state.iteration;
        info!(iteration, "iteration started");
        phase(progress, &state, IterationPhase::BuildMinlp, None);

        let Some(topology) = self.solve_topology(&state, progress) else {
            warn!(iteration, best = ?state.checker.best(), "topology retries exhausted, aborting");
            phase(
                progress,
                &state,
                IterationPhase::Aborted,
                Some("topology retries exhausted".to_string()),
            );
            return StepOutcome::Aborted(state);
        };
        phase(
            progress,
            &state,
            IterationPhase::MinlpSolved,
            Some(format!("objective {}", topology.objective)),
        );

        if self.config.bin_cuts {
            let pattern = topology.selection_pattern(self.builder.matches());
            state
                .cuts
                .insert(self.cut_generator.generate_cut(&pattern, iteration));
        }

        let (authoritative, authority) = if self.config.non_iso {
            phase(progress, &state, IterationPhase::Refine, None);
            self.refine(iteration, topology)
        } else {
            (topology, Authority::Topology)
        };

        phase(progress, &state, IterationPhase::DeriveBoundaries, None);
        let detailed = self.solve_detailed_units(&state, &authoritative, progress);

        phase(progress, &state, IterationPhase::CorrectAndCheck, None);
        let corrections =
            self.engine
                .compute_corrections(&detailed, &authoritative, &state.corrections);
        let decision = state.checker.check_convergence(
            iteration,
            &authoritative,
            &detailed,
            &corrections,
            &state.corrections,
            authority,
        );

        if decision.improved {
            let designs = detailed
                .iter()
                .filter_map(|(m, outcome)| outcome.design().map(|d| (m.clone(), *d)))
                .collect();
            state.best_network = Some(BestNetwork {
                iteration,
                topology: authoritative,
                designs,
            });
        }
        state.corrections = corrections;
        state.iteration += 1;

        if decision.converged {
            info!(iteration, best = ?state.checker.best(), "converged");
            phase(progress, &state, IterationPhase::Converged, None);
            StepOutcome::Converged(state)
        } else {
            phase(progress, &state, IterationPhase::Continue, None);
            StepOutcome::Continue(state)
        }
    }

    /// First attempt, then the nested threshold / big-M retry schedule.
    fn solve_topology(
        &mut self,
        state: &ControllerState,
        progress: &mut Option<&mut dyn FnMut(ProgressEvent)>,
    ) -> Option<TopologySolution> {
        let retry = self.config.retry;
        let max_attempts = retry.max_attempts();
        let mut attempt = 1u64;

        phase(progress, state, IterationPhase::SolveMinlp, None);
        if let Some(solution) = self.attempt_topology(state, Threshold::Default, 1.0) {
            return Some(solution);
        }

        for step in 0..retry.threshold_steps {
            let min_height = retry.min_height(step);
            info!(iteration = state.iteration, step, min_height, "retrying topology with lower height threshold");
            attempt += 1;
            emit(progress, retry_event(state, attempt, max_attempts, min_height, 1.0));
            if let Some(solution) = self.attempt_topology(state, Threshold::Fixed(min_height), 1.0) {
                return Some(solution);
            }

            // Big-M scale restarts from 1 at every threshold step, and the
            // step's height threshold stays in force for the big-M attempts.
            for k in 0..retry.big_m_steps {
                let big_m_scale = retry.big_m_scale(k);
                debug!(iteration = state.iteration, step, k, big_m_scale, "retrying topology with smaller big-M");
                attempt += 1;
                emit(
                    progress,
                    retry_event(state, attempt, max_attempts, min_height, big_m_scale),
                );
                if let Some(solution) =
                    self.attempt_topology(state, Threshold::Fixed(min_height), big_m_scale)
                {
                    return Some(solution);
                }
            }
        }
        None
    }

    /// Fresh initialization solve, then a fresh topology build and solve.
    fn attempt_topology(
        &mut self,
        state: &ControllerState,
        threshold: Threshold,
        big_m_scale: Real,
    ) -> Option<TopologySolution> {
        let initial = self.initialize(&state.corrections, big_m_scale);
        let min_height = match threshold {
            Threshold::Default => initial
                .as_ref()
                .map(|_| self.config.retry.initial_min_height),
            Threshold::Fixed(h) => Some(h),
        };

        let request = TopologyRequest {
            corrections: &state.corrections,
            cuts: state.cuts.cuts(),
            min_height,
            big_m_scale,
            initial: initial.as_ref(),
        };
        let model = match self.builder.build_topology(&request) {
            Ok(model) => model,
            Err(e) => {
                warn!(error = %e, "topology model build failed");
                return None;
            }
        };

        match self
            .minlp
            .solve(&mut self.service, &model, self.config.minlp_tier)
        {
            SolveOutcome::Solved(solved) => {
                info!(
                    engine = %solved.engine,
                    objective = solved.solution.objective,
                    attempts = solved.attempts.len(),
                    "topology solved"
                );
                Some(solved.solution)
            }
            SolveOutcome::Exhausted { attempts } => {
                warn!(attempts = attempts.len(), ?min_height, big_m_scale, "topology solve failed");
                None
            }
        }
    }

    fn initialize(&mut self, corrections: &CorrectionMap, big_m_scale: Real) -> Option<TopologySolution> {
        let request = InitializationRequest {
            corrections,
            big_m_scale,
        };
        let model = match self.builder.build_initialization(&request) {
            Ok(model) => model,
            Err(e) => {
                warn!(error = %e, "initialization model build failed");
                return None;
            }
        };
        match self.nlp.solve(&mut self.service, &model, SolveTier::Local) {
            SolveOutcome::Solved(solved) => Some(solved.solution),
            SolveOutcome::Exhausted { attempts } => {
                warn!(attempts = attempts.len(), "initialization solve failed");
                None
            }
        }
    }

    /// Non-isocompositional refinement. Authoritative only when it solves
    /// with a strictly lower objective.
    fn refine(&mut self, iteration: usize, topology: TopologySolution) -> (TopologySolution, Authority) {
        let model = match self.builder.build_redistribution(&topology) {
            Ok(model) => model,
            Err(e) => {
                warn!(iteration, error = %e, "refinement model build failed, keeping topology solution");
                return (topology, Authority::Topology);
            }
        };
        match self.nlp.solve(&mut self.service, &model, SolveTier::Local) {
            SolveOutcome::Solved(solved) if solved.solution.objective < topology.objective => {
                info!(
                    iteration,
                    refined = solved.solution.objective,
                    unrefined = topology.objective,
                    "refined network is better"
                );
                (solved.solution, Authority::Refinement)
            }
            SolveOutcome::Solved(solved) => {
                info!(
                    iteration,
                    refined = solved.solution.objective,
                    unrefined = topology.objective,
                    "topology solution kept"
                );
                (topology, Authority::Topology)
            }
            SolveOutcome::Exhausted { .. } => {
                warn!(iteration, "refinement failed, keeping topology solution");
                (topology, Authority::Topology)
            }
        }
    }

    fn solve_detailed_units(
        &mut self,
        state: &ControllerState,
        topology: &TopologySolution,
        progress: &mut Option<&mut dyn FnMut(ProgressEvent)>,
    ) -> BTreeMap<Match, DetailedOutcome> {
        let mut outcomes = BTreeMap::new();
        for (unit, estimate) in topology.active_units() {
            let outcome = match derive_boundary(topology, unit) {
                Ok(boundary) => {
                    phase(progress, state, IterationPhase::SolveDetailed, Some(unit.to_string()));
                    self.solve_unit(&boundary, estimate, state.corrections.factor(unit))
                }
                Err(e) => {
                    warn!(%unit, error = %e, "no boundary conditions, unit failed");
                    DetailedOutcome::Failed {
                        reason: e.to_string(),
                    }
                }
            };
            outcomes.insert(unit.clone(), outcome);
        }
        outcomes
    }

    /// Walk the element schedule until the detailed model solves.
    fn solve_unit(
        &mut self,
        boundary: &UnitBoundary,
        estimate: &UnitEstimate,
        correction: CorrectionFactor,
    ) -> DetailedOutcome {
        for &elements in &self.config.element_schedule {
            let request = DetailedRequest {
                boundary,
                initial: estimate,
                correction,
                elements,
            };
            let model = match self.builder.build_detailed(&request) {
                Ok(model) => model,
                Err(e) => {
                    warn!(unit = %boundary.unit, elements, error = %e, "detailed model build failed");
                    continue;
                }
            };
            match self.nlp.solve(&mut self.service, &model, SolveTier::Local) {
                SolveOutcome::Solved(solved) => return DetailedOutcome::Solved(solved.solution),
                SolveOutcome::Exhausted { .. } => {
                    debug!(unit = %boundary.unit, elements, "detailed solve failed, refining discretization");
                }
            }
        }
        warn!(unit = %boundary.unit, "detailed solve failed at every element count");
        DetailedOutcome::Failed {
            reason: format!(
                "no solution with element counts {:?}",
                self.config.element_schedule
            ),
        }
    }
}
