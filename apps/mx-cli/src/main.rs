use clap::{Parser, Subcommand};
use mx_hybrid::{HybridError, superstructure_matches};
use mx_project::{ProjectError, ProjectFile};
use mx_results::{MetricTable, ResultsError, RunStore};
use mx_solver::{EscalationLadder, SolveTier};
use std::io;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

#[derive(thiserror::Error, Debug)]
enum CliError {
    #[error("Project error: {0}")]
    Project(#[from] ProjectError),

    #[error("Results error: {0}")]
    Results(#[from] ResultsError),

    #[error("Controller error: {0}")]
    Hybrid(#[from] HybridError),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

type CliResult<T> = Result<T, CliError>;

#[derive(Parser)]
#[command(name = "mx-cli")]
#[command(about = "MexSyn CLI - mass-exchanger network synthesis runs", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Validate project file syntax, streams and controller settings
    Validate {
        /// Path to the project file (YAML or JSON)
        project_path: PathBuf,
    },
    /// List candidate matches of the project's superstructure
    Matches {
        /// Path to the project file
        project_path: PathBuf,
    },
    /// Show the solver escalation ladders the project resolves to
    Ladders {
        /// Path to the project file
        project_path: PathBuf,
    },
    /// List stored runs for a project
    Runs {
        /// Path to the project file
        project_path: PathBuf,
        /// Only show runs with this project name
        #[arg(long)]
        name: Option<String>,
    },
    /// Show details of a stored run
    ShowRun {
        /// Path to the project file
        project_path: PathBuf,
        /// Run ID to display
        run_id: String,
    },
    /// Export one metric table of a run as CSV
    ExportTable {
        /// Path to the project file
        project_path: PathBuf,
        /// Run ID
        run_id: String,
        /// Table name (e.g. correction_log, solution_log, gap_percent)
        table: String,
        /// Output CSV file path (optional, defaults to stdout)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
}

fn main() -> CliResult<()> {
    tracing_subscriber::fmt::init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Validate { project_path } => cmd_validate(&project_path),
        Commands::Matches { project_path } => cmd_matches(&project_path),
        Commands::Ladders { project_path } => cmd_ladders(&project_path),
        Commands::Runs { project_path, name } => cmd_runs(&project_path, name.as_deref()),
        Commands::ShowRun {
            project_path,
            run_id,
        } => cmd_show_run(&project_path, &run_id),
        Commands::ExportTable {
            project_path,
            run_id,
            table,
            output,
        } => cmd_export_table(&project_path, &run_id, &table, output.as_deref()),
    }
}

fn load_project(project_path: &Path) -> CliResult<ProjectFile> {
    debug!(path = %project_path.display(), "loading project");
    let project = mx_project::load(project_path)?;
    info!(name = %project.name, version = project.version, "project loaded");
    Ok(project)
}

fn open_store(project_path: &Path) -> CliResult<RunStore> {
    let store = RunStore::for_project(project_path)?;
    debug!(root = %store.root_dir().display(), "opened run store");
    Ok(store)
}

fn cmd_validate(project_path: &Path) -> CliResult<()> {
    println!("Validating project: {}", project_path.display());
    let project = load_project(project_path)?;
    let matches = superstructure_matches(&project)?;
    let hybrid = &project.hybrid;

    println!("✓ Project is valid");
    println!("  Name: {}", project.name);
    println!(
        "  Streams: {} rich, {} lean",
        project.problem.rich.len(),
        project.problem.lean.len()
    );
    println!(
        "  Superstructure: {} ({} candidate matches)",
        hybrid.superstruct,
        matches.len()
    );
    println!(
        "  max_iter={}  tol={}  cor_filter_size={}  non_iso={}  bin_cuts={}",
        hybrid.max_iter, hybrid.tol, hybrid.cor_filter_size, hybrid.non_iso, hybrid.bin_cuts
    );
    println!(
        "  Topology retries: up to {} attempts per iteration",
        hybrid.retry.max_attempts()
    );
    Ok(())
}

fn cmd_matches(project_path: &Path) -> CliResult<()> {
    let project = load_project(project_path)?;
    let matches = superstructure_matches(&project)?;

    println!("Candidate matches ({}):", matches.len());
    for m in matches {
        println!("  {m}");
    }
    Ok(())
}

fn print_ladder(label: &str, ladder: &EscalationLadder) {
    println!("{label} ({} rungs):", ladder.rung_count());
    for (engine, rung, options) in ladder.rungs() {
        let opts: Vec<String> = options.iter().map(|(k, v)| format!("{k}={v}")).collect();
        if opts.is_empty() {
            println!("  {engine}[{rung}]  defaults");
        } else {
            println!("  {engine}[{rung}]  {}", opts.join(" "));
        }
    }
}

fn cmd_ladders(project_path: &Path) -> CliResult<()> {
    let project = load_project(project_path)?;
    let nlp = project.solvers.nlp_gateway();
    let minlp = project.solvers.minlp_gateway();

    print_ladder("NLP", nlp.ladder(SolveTier::Local));
    print_ladder("MINLP local", minlp.ladder(SolveTier::Local));
    print_ladder("MINLP global", minlp.ladder(SolveTier::Global));
    println!(
        "Topology solves use the {:?} tier",
        project.hybrid.minlp_tier
    );
    Ok(())
}

fn cmd_runs(project_path: &Path, name: Option<&str>) -> CliResult<()> {
    let store = open_store(project_path)?;
    let runs = store.list_runs(name)?;

    if runs.is_empty() {
        println!("No stored runs found");
    } else {
        println!("Stored runs:");
        for manifest in runs {
            println!(
                "  {} ({})  {:?}  {} iterations",
                manifest.run_id, manifest.timestamp, manifest.status, manifest.iterations
            );
        }
    }
    Ok(())
}

fn cmd_show_run(project_path: &Path, run_id: &str) -> CliResult<()> {
    println!("Loading run: {}", run_id);

    let store = open_store(project_path)?;
    let manifest = store.load_manifest(run_id)?;

    println!("\nRun Summary:");
    println!("  Project: {}", manifest.project_name);
    println!("  Solver version: {}", manifest.solver_version);
    println!("  Status: {:?}", manifest.status);
    println!("  Iterations: {}", manifest.iterations);
    match (manifest.best_iteration, manifest.best_objective) {
        (Some(it), Some(obj)) => println!("  Best network: iteration {it}, objective {obj:.6}"),
        _ => println!("  Best network: none"),
    }
    if let (Some(it), Some(obj)) = (manifest.best_minlp_iteration, manifest.best_minlp_objective) {
        println!("  Best topology objective: iteration {it}, {obj:.6}");
    }

    if manifest.tables.iter().any(|t| t == "gap_percent") {
        let gap = store.load_table(run_id, "gap_percent")?;
        println!("\nObjective gap:");
        for row in &gap.rows {
            println!("  {:>4}  {:>10.4}%", row.iteration, row.values[0]);
        }
    }

    println!("\nTables:");
    for table in &manifest.tables {
        println!("  {}", table);
    }

    Ok(())
}

fn write_table<W: io::Write>(writer: W, table: &MetricTable) -> CliResult<()> {
    let mut csv = csv::Writer::from_writer(writer);
    let mut header = vec!["iteration".to_string()];
    header.extend(table.columns.iter().cloned());
    csv.write_record(&header)?;
    for row in &table.rows {
        let mut record = vec![row.iteration.to_string()];
        record.extend(row.values.iter().map(|v| v.to_string()));
        csv.write_record(&record)?;
    }
    csv.flush()?;
    Ok(())
}

fn cmd_export_table(
    project_path: &Path,
    run_id: &str,
    table: &str,
    output: Option<&Path>,
) -> CliResult<()> {
    let store = open_store(project_path)?;
    let data = store.load_table(run_id, table)?;

    if let Some(path) = output {
        write_table(std::fs::File::create(path)?, &data)?;
        println!(
            "✓ Exported {} rows of '{}' to {}",
            data.rows.len(),
            table,
            path.display()
        );
    } else {
        write_table(io::stdout().lock(), &data)?;
    }

    Ok(())
}
