// AutoFlow — build, store and replay automation workflows
// License: Apache-2.0

use autoflow::config::Config;
use autoflow::executor::ActionExecutor;
use autoflow::sequencer::{ChannelObserver, ProgressEvent, RunReport, RunStatus, Sequencer};
use autoflow::storage::{FileStore, KeyValueStore};
use autoflow::theme::{Theme, ThemeStore};
use autoflow::workflow::draft::Draft;
use autoflow::workflow::parser::{read_import_file, write_export_file};
use autoflow::workflow::store::{SavedDraft, WorkflowFormat, WorkflowStore};
use autoflow::workflow::{Step, StepKind, Workflow};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

const LOGO: &str = "⚡";

// ---------------------------------------------------------------------------
// CLI definition
// ---------------------------------------------------------------------------

#[derive(Parser)]
#[command(
    name = "autoflow",
    about = "AutoFlow — build, store and replay automation workflows",
    version
)]
struct Cli {
    /// Config file path
    #[arg(short, long, global = true)]
    config: Option<String>,
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// List saved workflows
    List,
    /// Show one workflow and its steps
    Show { id: String },
    /// Save a new workflow built from step kinds
    Create {
        #[arg(short, long)]
        name: String,
        #[arg(short, long)]
        description: Option<String>,
        /// Step kind to append (repeatable), e.g. fill-form
        #[arg(short, long = "step", required = true)]
        steps: Vec<String>,
    },
    /// Change a saved workflow
    Update {
        id: String,
        #[arg(short, long)]
        name: Option<String>,
        #[arg(short, long)]
        description: Option<String>,
        /// Replace the steps with these kinds (repeatable)
        #[arg(short, long = "step")]
        steps: Vec<String>,
    },
    /// Delete a saved workflow
    Delete { id: String },
    /// Export a workflow as JSON (or YAML)
    Export {
        id: String,
        /// Write to this file instead of stdout
        #[arg(short, long)]
        output: Option<PathBuf>,
        #[arg(long)]
        yaml: bool,
    },
    /// Import a workflow from a JSON or YAML file
    Import { path: PathBuf },
    /// Replay a saved workflow
    Run {
        id: String,
        /// Override the pause before each step
        #[arg(long)]
        delay_ms: Option<u64>,
    },
    /// Show or change the colour theme (light, dark, toggle)
    Theme { action: Option<String> },
    /// Assemble a workflow interactively
    Build,
    /// Show configuration and storage status
    Status,
    /// Show version information
    Version,
}

// ---------------------------------------------------------------------------
// Entry point
// ---------------------------------------------------------------------------

#[tokio::main]
async fn main() {
    autoflow::logger::init();

    let cli = Cli::parse();
    let config_path = cli.config.as_deref();

    let result = match cli.command {
        Some(Commands::List) => list_cmd(config_path).await,
        Some(Commands::Show { id }) => show_cmd(config_path, &id).await,
        Some(Commands::Create {
            name,
            description,
            steps,
        }) => create_cmd(config_path, &name, description, &steps).await,
        Some(Commands::Update {
            id,
            name,
            description,
            steps,
        }) => update_cmd(config_path, &id, name, description, &steps).await,
        Some(Commands::Delete { id }) => delete_cmd(config_path, &id).await,
        Some(Commands::Export { id, output, yaml }) => {
            export_cmd(config_path, &id, output, yaml).await
        }
        Some(Commands::Import { path }) => import_cmd(config_path, &path).await,
        Some(Commands::Run { id, delay_ms }) => run_cmd(config_path, &id, delay_ms).await,
        Some(Commands::Theme { action }) => theme_cmd(config_path, action.as_deref()).await,
        Some(Commands::Status) => status_cmd(config_path).await,
        Some(Commands::Version) => {
            version_cmd();
            Ok(())
        }
        Some(Commands::Build) | None => build_cmd(config_path).await,
    };

    if let Err(e) = result {
        eprintln!("{} Error: {:#}", LOGO, e);
        std::process::exit(1);
    }
}

// ---------------------------------------------------------------------------
// Application wiring
// ---------------------------------------------------------------------------

struct App {
    cfg: Config,
    kv: Arc<FileStore>,
    store: WorkflowStore,
}

impl App {
    async fn open(config_path: Option<&str>) -> anyhow::Result<Self> {
        let cfg = load_config(config_path);
        cfg.validate()?;

        let kv = Arc::new(FileStore::new(cfg.data_dir()?));
        let store = WorkflowStore::open(kv.clone(), cfg.storage.workflows_key.clone()).await;
        Ok(Self { cfg, kv, store })
    }

    fn theme_store(&self) -> ThemeStore {
        ThemeStore::new(self.kv.clone(), self.cfg.storage.theme_key.clone())
    }

    fn sequencer(&self, delay_ms: Option<u64>) -> Sequencer {
        let delay = delay_ms
            .map(Duration::from_millis)
            .unwrap_or_else(|| self.cfg.execution.step_delay());
        Sequencer::new(Arc::new(ActionExecutor::logging())).with_step_delay(delay)
    }

    async fn require(&self, id: &str) -> anyhow::Result<Workflow> {
        self.store
            .get(id)
            .await
            .ok_or_else(|| anyhow::anyhow!("no workflow with id '{}'", id))
    }
}

fn load_config(path: Option<&str>) -> Config {
    let config_path = if let Some(p) = path {
        PathBuf::from(p)
    } else {
        Config::default_path().unwrap_or_else(|_| PathBuf::from("config.json"))
    };

    Config::load(&config_path).unwrap_or_else(|e| {
        tracing::warn!("Failed to load config: {}, using defaults", e);
        Config::default()
    })
}

fn build_steps(kinds: &[String]) -> Vec<Step> {
    kinds
        .iter()
        .map(|tag| {
            let kind = StepKind::parse(tag);
            if !kind.is_known() {
                tracing::warn!(kind = %tag, "Unknown step kind, it will be skipped when run");
            }
            Step::new(kind)
        })
        .collect()
}

// ---------------------------------------------------------------------------
// CRUD commands
// ---------------------------------------------------------------------------

async fn list_cmd(config_path: Option<&str>) -> anyhow::Result<()> {
    let app = App::open(config_path).await?;
    let workflows = app.store.list().await;

    if workflows.is_empty() {
        println!("No workflows saved yet. Create one with `autoflow build` or `autoflow create`.");
        return Ok(());
    }

    for wf in workflows {
        println!(
            "{}  {}  ({} steps, created {})",
            wf.id,
            wf.name,
            wf.steps.len(),
            wf.created.format("%Y-%m-%d")
        );
        println!(
            "    {}",
            wf.description.as_deref().filter(|d| !d.is_empty()).unwrap_or("No description")
        );
    }
    Ok(())
}

async fn show_cmd(config_path: Option<&str>, id: &str) -> anyhow::Result<()> {
    let app = App::open(config_path).await?;
    let wf = app.require(id).await?;

    println!("{} {}", LOGO, wf.name);
    if let Some(description) = wf.description.as_deref().filter(|d| !d.is_empty()) {
        println!("  {}", description);
    }
    println!("  id:      {}", wf.id);
    println!("  created: {}", wf.created.to_rfc3339());
    if let Some(updated) = wf.updated {
        println!("  updated: {}", updated.to_rfc3339());
    }
    print_steps(&wf.steps);
    Ok(())
}

fn print_steps(steps: &[Step]) {
    if steps.is_empty() {
        println!("  (no steps)");
    }
    for (i, step) in steps.iter().enumerate() {
        println!("  {}. {} [{}] id={} {}", i + 1, step.name, step.kind, step.id, step.data);
    }
}

async fn create_cmd(
    config_path: Option<&str>,
    name: &str,
    description: Option<String>,
    kinds: &[String],
) -> anyhow::Result<()> {
    let app = App::open(config_path).await?;
    let wf = app.store.add(name, description, build_steps(kinds)).await?;
    println!("{} Workflow saved: {} ({})", LOGO, wf.name, wf.id);
    Ok(())
}

async fn update_cmd(
    config_path: Option<&str>,
    id: &str,
    name: Option<String>,
    description: Option<String>,
    kinds: &[String],
) -> anyhow::Result<()> {
    let app = App::open(config_path).await?;
    let current = app.require(id).await?;

    let name = name.unwrap_or(current.name);
    let description = description.or(current.description);
    let steps = if kinds.is_empty() {
        current.steps
    } else {
        build_steps(kinds)
    };

    match app.store.update(id, &name, description, steps).await {
        Some(wf) => println!("{} Workflow updated: {} ({})", LOGO, wf.name, wf.id),
        None => anyhow::bail!("no workflow with id '{}'", id),
    }
    Ok(())
}

async fn delete_cmd(config_path: Option<&str>, id: &str) -> anyhow::Result<()> {
    let app = App::open(config_path).await?;
    if app.store.delete(id).await {
        println!("{} Workflow deleted", LOGO);
    } else {
        println!("Nothing to delete: no workflow with id '{}'", id);
    }
    Ok(())
}

async fn export_cmd(
    config_path: Option<&str>,
    id: &str,
    output: Option<PathBuf>,
    yaml: bool,
) -> anyhow::Result<()> {
    let app = App::open(config_path).await?;
    let wf = app.require(id).await?;
    let format = if yaml {
        WorkflowFormat::Yaml
    } else {
        WorkflowFormat::Json
    };
    let text = WorkflowStore::export_to_format(&wf, format)?;

    match output {
        Some(path) => {
            write_export_file(&path, &text).await?;
            println!("{} Exported to {}", LOGO, path.display());
        }
        None => println!("{}", text),
    }
    Ok(())
}

async fn import_cmd(config_path: Option<&str>, path: &std::path::Path) -> anyhow::Result<()> {
    let app = App::open(config_path).await?;
    let (text, format) = read_import_file(path).await?;
    let wf = app.store.import_from_format(&text, format).await?;
    println!("{} Workflow imported: {} ({})", LOGO, wf.name, wf.id);
    Ok(())
}

// ---------------------------------------------------------------------------
// Run command
// ---------------------------------------------------------------------------

async fn run_cmd(config_path: Option<&str>, id: &str, delay_ms: Option<u64>) -> anyhow::Result<()> {
    let app = App::open(config_path).await?;
    let wf = app.require(id).await?;
    let sequencer = app.sequencer(delay_ms);

    println!("{} Running '{}' ({} steps)", LOGO, wf.name, wf.steps.len());
    let report = run_steps(&sequencer, &wf.steps).await?;
    if !report.is_success() {
        std::process::exit(2);
    }
    Ok(())
}

/// Run steps while printing progress; Ctrl-C cancels between steps.
async fn run_steps(sequencer: &Sequencer, steps: &[Step]) -> anyhow::Result<RunReport> {
    let (observer, mut rx) = ChannelObserver::new();
    let total = steps.len();

    let printer = tokio::spawn(async move {
        while let Some(event) = rx.recv().await {
            match event {
                ProgressEvent::StepStarted { index, name } => {
                    println!("  ▶ Step {}/{}: {}", index + 1, total, name);
                }
                ProgressEvent::StepFailed { index, name, error } => {
                    eprintln!("  ✖ Error executing step {}: {} ({})", index + 1, name, error);
                }
                ProgressEvent::ClearMarkers => {}
                ProgressEvent::Finished(report) => {
                    print_summary(&report);
                    break;
                }
            }
        }
    });

    let cancel = CancellationToken::new();
    let ctrl_c = {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                tracing::info!("Interrupt received, cancelling run");
                cancel.cancel();
            }
        })
    };

    let result = sequencer.run(steps, &observer, &cancel).await;
    ctrl_c.abort();
    drop(observer);
    let _ = printer.await;

    Ok(result?)
}

fn print_summary(report: &RunReport) {
    let secs = report.elapsed.as_secs_f64();
    match &report.status {
        RunStatus::Completed => {
            println!("{} Workflow execution completed in {:.1}s", LOGO, secs)
        }
        RunStatus::Failed { index, step_name, .. } => println!(
            "{} Workflow halted at step {} ({}) after {:.1}s",
            LOGO,
            index + 1,
            step_name,
            secs
        ),
        RunStatus::Cancelled { at } => {
            println!("{} Workflow cancelled before step {}", LOGO, at + 1)
        }
    }
}

// ---------------------------------------------------------------------------
// Theme / status / version
// ---------------------------------------------------------------------------

async fn theme_cmd(config_path: Option<&str>, action: Option<&str>) -> anyhow::Result<()> {
    let app = App::open(config_path).await?;
    let themes = app.theme_store();

    let theme = match action {
        None => themes.load().await,
        Some("toggle") => themes.toggle().await,
        Some(value) => {
            let theme: Theme = value.parse().map_err(anyhow::Error::msg)?;
            themes.save(theme).await;
            theme
        }
    };
    println!("Theme: {}", theme);
    Ok(())
}

async fn status_cmd(config_path: Option<&str>) -> anyhow::Result<()> {
    println!("{} AutoFlow Status\n", LOGO);

    let config_path_buf = match config_path {
        Some(p) => PathBuf::from(p),
        None => Config::default_path().unwrap_or_default(),
    };
    if config_path_buf.exists() {
        println!("  Config:    ✅ {}", config_path_buf.display());
    } else {
        println!("  Config:    ⏭️  Not found, using defaults");
    }

    let app = App::open(config_path).await?;
    let dir = app.kv.dir();
    if dir.exists() {
        println!("  Data:      ✅ {}", dir.display());
    } else {
        println!("  Data:      ❌ {} (created on first save)", dir.display());
    }

    let raw = app.kv.get(&app.cfg.storage.workflows_key).await;
    let stored = app.store.len().await;
    match raw {
        Ok(Some(_)) => println!("  Workflows: {} stored", stored),
        Ok(None) => println!("  Workflows: none yet"),
        Err(e) => println!("  Workflows: ❌ unreadable ({})", e),
    }

    println!("  Theme:     {}", app.theme_store().load().await);
    println!("  Delay:     {} ms per step", app.cfg.execution.step_delay_ms);
    Ok(())
}

fn version_cmd() {
    println!("{} AutoFlow v{}", LOGO, autoflow::VERSION);
    println!("  Built with Rust 🦀");
}

// ---------------------------------------------------------------------------
// Interactive builder
// ---------------------------------------------------------------------------

const BUILD_HELP: &str = "Commands:
  kinds                        — List available step kinds
  add <kind>                   — Append a step
  rm <step-id>                 — Remove a step
  rename <step-id> <name>      — Rename a step
  list                         — Show the current steps
  clear                        — Start over
  load <workflow-id>           — Edit a saved workflow
  save [name] [| description]  — Save (updates the loaded workflow)
  run                          — Replay the current steps
  help                         — Show this help
  exit                         — Quit";

async fn build_cmd(config_path: Option<&str>) -> anyhow::Result<()> {
    let app = App::open(config_path).await?;
    let sequencer = app.sequencer(None);
    let mut draft = Draft::new();

    println!("{} AutoFlow v{} — Workflow builder", LOGO, autoflow::VERSION);
    println!("Type 'help' for commands, 'exit' or Ctrl+D to quit.\n");

    let mut rl = rustyline::DefaultEditor::new()?;

    loop {
        let line = match rl.readline(&format!("{} [{}] > ", LOGO, draft.len())) {
            Ok(line) => line,
            Err(rustyline::error::ReadlineError::Eof) => break,
            Err(rustyline::error::ReadlineError::Interrupted) => {
                println!("Use 'exit' to quit or Ctrl+D to exit.");
                continue;
            }
            Err(e) => return Err(e.into()),
        };

        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }
        let _ = rl.add_history_entry(trimmed);

        let (cmd, rest) = trimmed
            .split_once(' ')
            .map(|(c, r)| (c, r.trim()))
            .unwrap_or((trimmed, ""));

        match cmd {
            "exit" | "quit" => break,
            "help" => println!("{}\n", BUILD_HELP),
            "kinds" => {
                for kind in StepKind::KNOWN {
                    println!("  {:<18} {}", kind.tag(), kind.default_name());
                }
            }
            "add" if !rest.is_empty() => {
                let kind = StepKind::parse(rest);
                if !kind.is_known() {
                    println!("⚠️  '{}' is not a known kind; it will be skipped when run", rest);
                }
                let step = draft.push(kind);
                println!("  + {} (id {})", step.name, step.id);
            }
            "rm" => match rest.parse::<u64>() {
                Ok(id) if draft.remove(id) => println!("  - removed {}", id),
                _ => println!("No step with id '{}'", rest),
            },
            "rename" => {
                let renamed = rest
                    .split_once(' ')
                    .and_then(|(id, name)| Some((id.parse::<u64>().ok()?, name)))
                    .map(|(id, name)| draft.rename(id, name))
                    .unwrap_or(false);
                if !renamed {
                    println!("Usage: rename <step-id> <name>");
                }
            }
            "list" => print_steps(draft.steps()),
            "clear" => {
                draft.clear();
                println!("  Draft cleared");
            }
            "load" => match app.store.get(rest).await {
                Some(wf) => {
                    draft.load(&wf);
                    println!("  Loaded '{}' ({} steps)", wf.name, wf.steps.len());
                }
                None => println!("No workflow with id '{}'", rest),
            },
            "save" => {
                if draft.is_empty() {
                    println!("Please add at least one action to your workflow before saving.");
                    continue;
                }
                let (name, description) = parse_save_args(rest);
                match app.store.save_draft(&mut draft, name, description).await {
                    Ok(SavedDraft::Added(wf)) => {
                        println!("  Workflow saved: {} ({})", wf.name, wf.id)
                    }
                    Ok(SavedDraft::Updated(wf)) => {
                        println!("  Workflow updated: {} ({})", wf.name, wf.id)
                    }
                    Err(e) => println!("Cannot save: {}", e),
                }
            }
            "run" => {
                if draft.is_empty() {
                    println!("Please add at least one action to your workflow.");
                    continue;
                }
                if let Err(e) = run_steps(&sequencer, draft.steps()).await {
                    eprintln!("{} Error: {}", LOGO, e);
                }
            }
            _ => println!("Unknown command: {} (try help)", trimmed),
        }
    }

    println!("Goodbye! 👋");
    Ok(())
}

/// Split `save` arguments of the form `[name] [| description]`.
fn parse_save_args(rest: &str) -> (Option<&str>, Option<String>) {
    let (name, description) = match rest.split_once('|') {
        Some((n, d)) => (n, Some(d.trim().to_string())),
        None => (rest, None),
    };
    let name = Some(name.trim()).filter(|n| !n.is_empty());
    (name, description)
}
