use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context};
use clap::{Parser, Subcommand, ValueEnum};
use serde::Serialize;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use specflow::config::Config;
use specflow::db::Database;
use specflow::engine::TaskGraph;
use specflow::markdown::TasksDocument;
use specflow::models::{CreateProjectInput, DocKind, TaskInput};
use specflow::store::{AuditLog, DocumentStore, FileStore, StoreError};
use specflow::workflow::{self, RetryPolicy, TaskOp};
use specflow::report;

#[derive(Parser)]
#[command(name = "specflow")]
#[command(about = "Task workflow engine for spec-driven development")]
struct Cli {
    /// Project directory (file store) or project name or id (sqlite store)
    #[arg(short, long, global = true, default_value = ".")]
    project: String,

    /// Where documents are kept
    #[arg(long, global = true, value_enum, default_value_t = StoreKind::File)]
    store: StoreKind,

    /// SQLite database file, overrides the configured one
    #[arg(long, global = true)]
    db: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Copy, PartialEq, Eq, ValueEnum)]
enum StoreKind {
    File,
    Sqlite,
}

#[derive(Subcommand)]
enum Commands {
    /// Show ready tasks, phases, critical path and checklist results
    Schedule {
        #[arg(long)]
        json: bool,
    },
    /// Verify one task's checklist against the stored document
    Verify {
        task: String,
        #[arg(long)]
        json: bool,
    },
    /// Claim a task (NotStarted → InProgress)
    Start { task: String },
    /// Mark a task Done
    Complete { task: String },
    /// Send a task back to NotStarted
    Reset { task: String },
    /// Toggle one acceptance criterion
    Check {
        task: String,
        /// 1-based position of the criterion
        index: usize,
    },
    /// Append an unchecked acceptance criterion
    AddCriterion { task: String, text: String },
    /// Replace a task's "blocked by" list; pass no ids to clear it
    Depend { task: String, dependencies: Vec<String> },
    /// Apply a JSON array of operations with a single write
    Batch { file: PathBuf },
    /// Create the Tasks document from a JSON array of tasks
    CreateTasks { file: PathBuf },
    /// Show which documents exist and their versions
    Steering,
    /// Check requirement coverage and EARS form
    Trace,
    /// Show the audit history of the project or one task
    History { task: Option<String> },
    /// Store a document from a file
    Put {
        /// product, tech, structure, plan or tasks
        kind: String,
        file: PathBuf,
    },
    /// Print a stored document
    Get { kind: String },
    /// Manage projects in the SQLite store
    Project {
        #[command(subcommand)]
        command: ProjectCommands,
    },
}

#[derive(Subcommand)]
enum ProjectCommands {
    Create {
        name: String,
        #[arg(short, long)]
        description: Option<String>,
    },
    List,
}

/// Initialize tracing with output to stderr so stdout stays clean for
/// reports and JSON.
fn init_tracing() {
    let filter = tracing_subscriber::EnvFilter::new(
        std::env::var("RUST_LOG").unwrap_or_else(|_| "specflow=info".into()),
    );

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing();

    let config = Config::load();
    let policy = config.retry_policy();

    match cli.store {
        StoreKind::File => {
            if let Commands::Project { .. } = cli.command {
                bail!("projects are only managed in the sqlite store");
            }
            let store = FileStore::new();
            let label = FileStore::document_path(&cli.project, DocKind::Tasks)
                .display()
                .to_string();
            run(&store, &cli.project, &label, cli.command, policy)
        }
        StoreKind::Sqlite => {
            let path = match cli.db {
                Some(path) => path,
                None => config.database_path()?,
            };
            let db = Database::open(path)?;
            db.migrate()?;

            if let Commands::Project { command } = cli.command {
                return run_project(&db, command);
            }

            let project = db
                .resolve_project(&cli.project)?
                .with_context(|| format!("Project {} not found", cli.project))?;
            let id = project.id.to_string();
            let label = format!("{}:tasks", project.name);
            run(&db, &id, &label, cli.command, policy)
        }
    }
}

fn run_project(db: &Database, command: ProjectCommands) -> anyhow::Result<()> {
    match command {
        ProjectCommands::Create { name, description } => {
            let project = db.create_project(CreateProjectInput { name, description })?;
            print_json(&project)
        }
        ProjectCommands::List => {
            for project in db.get_all_projects()? {
                println!("{}  {}", project.id, project.name);
            }
            Ok(())
        }
    }
}

fn run<S>(store: &S, project: &str, label: &str, command: Commands, policy: RetryPolicy) -> anyhow::Result<()>
where
    S: DocumentStore + AuditLog,
{
    match command {
        Commands::Schedule { json } => {
            let schedule = workflow::schedule(store, project)?;
            if json {
                print_json(&schedule)?;
            } else {
                print!("{}", report::render_schedule(&schedule));
            }
        }
        Commands::Verify { task, json } => {
            let verification = workflow::verify_task(store, project, &task)?;
            if json {
                print_json(&verification)?;
            } else {
                print!("{}", report::render_verification(&verification, label));
            }
        }
        Commands::Start { task } => print_json(&workflow::claim_task(store, project, &task, policy)?)?,
        Commands::Complete { task } => print_json(&workflow::complete_task(store, project, &task, policy)?)?,
        Commands::Reset { task } => print_json(&workflow::reset_task(store, project, &task, policy)?)?,
        Commands::Check { task, index } => {
            let Some(index) = index.checked_sub(1) else {
                bail!("criterion positions start at 1");
            };
            print_json(&workflow::toggle_criterion(store, project, &task, index, policy)?)?;
        }
        Commands::AddCriterion { task, text } => {
            print_json(&workflow::add_criterion(store, project, &task, &text, policy)?)?;
        }
        Commands::Depend { task, dependencies } => {
            let dependencies = dependencies.into_iter().map(Into::into).collect();
            print_json(&workflow::set_dependencies(store, project, &task, dependencies, policy)?)?;
        }
        Commands::Batch { file } => {
            let ops: Vec<TaskOp> = read_json(&file)?;
            print_json(&workflow::apply_batch(store, project, &ops, policy)?)?;
        }
        Commands::CreateTasks { file } => {
            let tasks: Vec<TaskInput> = read_json(&file)?;
            let version = workflow::create_tasks(store, project, tasks)?;
            println!("{}", version.as_str());
        }
        Commands::Steering => print_json(&workflow::steering_status(store, project)?)?,
        Commands::Trace => print_json(&workflow::traceability(store, project)?)?,
        Commands::History { task } => {
            print_json(&workflow::history(store, project, task.as_deref())?)?;
        }
        Commands::Put { kind, file } => {
            let kind = parse_kind(&kind)?;
            let content = fs::read_to_string(&file)
                .with_context(|| format!("Failed to read {}", file.display()))?;
            if kind == DocKind::Tasks {
                let document = TasksDocument::parse(&content)?;
                TaskGraph::build(document.into_tasks())?;
            }
            let expected = match store.read(project, kind) {
                Ok(current) => Some(current.version),
                Err(StoreError::NotFound { .. }) => None,
                Err(e) => return Err(e.into()),
            };
            let version = store.write(project, kind, &content, expected.as_ref())?;
            tracing::info!(project, kind = %kind, version = %version, "Document stored");
            println!("{}", version.as_str());
        }
        Commands::Get { kind } => {
            let document = store.read(project, parse_kind(&kind)?)?;
            print!("{}", document.content);
        }
        Commands::Project { .. } => bail!("projects are only managed in the sqlite store"),
    }
    Ok(())
}

fn parse_kind(kind: &str) -> anyhow::Result<DocKind> {
    DocKind::from_str(kind).with_context(|| format!("Unknown document kind {:?}", kind))
}

fn read_json<T: serde::de::DeserializeOwned>(path: &Path) -> anyhow::Result<T> {
    let content =
        fs::read_to_string(path).with_context(|| format!("Failed to read {}", path.display()))?;
    serde_json::from_str(&content).with_context(|| format!("Failed to parse {}", path.display()))
}

fn print_json(value: &impl Serialize) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
