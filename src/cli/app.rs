//! Main CLI application

use crate::config::{
    dependency_map, load_project_auto, load_project_file, validate_config, Config, Environment,
    Project,
};
use crate::error::{ConfigError, PipeworkError, SequenceError};
use crate::pipeline::build_graph;
use crate::runner::{Context, Sequencer};
use crate::ui::{self, Verbosity};
use clap::builder::PossibleValuesParser;
use clap::{Arg, ArgAction, ArgMatches, Command};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::mpsc;

/// CLI application
pub struct App {
    /// The clap command
    command: Command,
    /// Loaded project (config plus root directory)
    project: Project,
}

impl App {
    /// Create a new app, discovering pipework.yml from the current directory
    pub fn new() -> Result<Self, PipeworkError> {
        Self::from_project(load_project_auto()?)
    }

    /// Create app with a specific config file
    pub fn with_config_file(path: PathBuf) -> Result<Self, PipeworkError> {
        Self::from_project(load_project_file(&path)?)
    }

    /// Create app for an already loaded project
    pub fn from_project(project: Project) -> Result<Self, PipeworkError> {
        validate_config(&project.config)?;
        let command = build_command(&project.config);
        Ok(App { command, project })
    }

    /// Run the application with the process arguments
    pub async fn run(self) -> Result<(), PipeworkError> {
        let matches = self.command.clone().get_matches();
        self.run_matches(matches).await
    }

    /// Run the application with explicit arguments
    pub async fn run_from<I, T>(self, args: I) -> Result<(), PipeworkError>
    where
        I: IntoIterator<Item = T>,
        T: Into<std::ffi::OsString> + Clone,
    {
        let matches = self.command.clone().get_matches_from(args);
        self.run_matches(matches).await
    }

    async fn run_matches(self, matches: ArgMatches) -> Result<(), PipeworkError> {
        let verbosity = get_verbosity(&matches);
        ui::set_verbosity(verbosity);
        init_tracing(verbosity);

        let config = &self.project.config;
        let env = Environment::from_env(&config.env_var, &self.project.root.join(".env"))?;

        if matches.get_flag("list") {
            print_list(&self.project, env)?;
            return Ok(());
        }

        let targets: Vec<String> = matches
            .get_many::<String>("targets")
            .map(|values| values.cloned().collect())
            .unwrap_or_default();
        let phases = select_phases(config, &targets)?;

        let ctx = Arc::new(Context::for_project(&self.project, env));
        let graph = Arc::new(build_graph(&self.project, env)?);
        let sequencer = Sequencer::new(graph, Arc::clone(&ctx));

        tracing::info!(
            env = %env,
            root = %self.project.root.display(),
            phases = phases.len(),
            "starting build"
        );
        let result = sequencer.run_phases(&phases).await;

        if !ctx.has_background() {
            return result.map_err(PipeworkError::from);
        }

        // With the server or watcher up, only fatal failures end the process
        let failed = match result {
            Err(e) if e.is_fatal() => return Err(e.into()),
            Err(e) => {
                ui::print_error(&e);
                Some(e)
            }
            Ok(()) => None,
        };
        keep_alive(sequencer, failed).await
    }
}

/// Serve re-run requests until Ctrl-C or a fatal failure
///
/// A failure that is not fatal is reported and remembered; the process still
/// exits non-zero on Ctrl-C when any run failed.
async fn keep_alive(
    sequencer: Sequencer,
    mut failed: Option<SequenceError>,
) -> Result<(), PipeworkError> {
    let interrupted = |failed: Option<SequenceError>| -> Result<(), PipeworkError> {
        tracing::info!("interrupted; shutting down");
        failed.map_or(Ok(()), |e| Err(e.into()))
    };

    let Some(mut requests) = sequencer.context().take_rerun_requests() else {
        tokio::signal::ctrl_c().await?;
        return interrupted(failed);
    };
    let (failure_tx, mut failure_rx) = mpsc::unbounded_channel::<SequenceError>();

    loop {
        tokio::select! {
            Some(tasks) = requests.recv() => {
                let sequencer = sequencer.clone();
                let failure_tx = failure_tx.clone();
                tokio::spawn(async move {
                    if let Err(e) = sequencer.run_tasks(&tasks).await {
                        let _ = failure_tx.send(e);
                    }
                });
            }
            Some(err) = failure_rx.recv() => {
                if err.is_fatal() {
                    return Err(err.into());
                }
                ui::print_error(&err);
                failed = Some(err);
            }
            signal = tokio::signal::ctrl_c() => {
                signal?;
                return interrupted(failed);
            }
        }
    }
}

/// Resolve command-line targets into phases
///
/// No target runs the `default` sequence; a single sequence name runs that
/// sequence; anything else runs the named tasks as one phase.
pub fn select_phases(config: &Config, targets: &[String]) -> Result<Vec<Vec<String>>, ConfigError> {
    if targets.is_empty() {
        return config
            .sequences
            .get("default")
            .cloned()
            .ok_or_else(|| ConfigError::SequenceNotFound("default".to_string()));
    }

    if let [single] = targets {
        if let Some(phases) = config.sequences.get(single) {
            return Ok(phases.clone());
        }
    }

    let tasks = dependency_map(config);
    for target in targets {
        if config.sequences.contains_key(target) {
            return Err(ConfigError::Invalid(format!(
                "sequence '{}' cannot be combined with other targets",
                target
            )));
        }
        if !tasks.contains_key(target) {
            return Err(ConfigError::TaskNotFound(target.clone()));
        }
    }
    Ok(vec![targets.to_vec()])
}

/// Build the clap command from configuration
fn build_command(config: &Config) -> Command {
    let mut targets: Vec<String> = config.sequences.keys().cloned().collect();
    for task in dependency_map(config).into_keys() {
        if !targets.contains(&task) {
            targets.push(task);
        }
    }

    Command::new("pipework")
        .version(env!("CARGO_PKG_VERSION"))
        .about("Build front-end assets in dependency-ordered phases")
        .arg(
            Arg::new("targets")
                .value_name("SEQUENCE_OR_TASK")
                .help("Sequence to run, or tasks to run as one phase (default: the `default` sequence)")
                .num_args(0..)
                .value_parser(PossibleValuesParser::new(targets)),
        )
        .arg(
            Arg::new("file")
                .short('f')
                .long("file")
                .value_name("FILE")
                .help("Path to pipework.yml config file"),
        )
        .arg(
            Arg::new("list")
                .long("list")
                .help("List sequences, tasks and watch rules")
                .action(ArgAction::SetTrue),
        )
        .arg(
            Arg::new("quiet")
                .short('q')
                .long("quiet")
                .help("Only print errors")
                .action(ArgAction::SetTrue)
                .conflicts_with("verbose"),
        )
        .arg(
            Arg::new("verbose")
                .short('v')
                .long("verbose")
                .help("Print debug output")
                .action(ArgAction::SetTrue),
        )
}

/// Get verbosity level from matches
fn get_verbosity(matches: &ArgMatches) -> Verbosity {
    if matches.get_flag("quiet") {
        Verbosity::Quiet
    } else if matches.get_flag("verbose") {
        Verbosity::Verbose
    } else {
        Verbosity::Normal
    }
}

/// Install the tracing subscriber; `RUST_LOG` overrides the verbosity level
fn init_tracing(verbosity: Verbosity) {
    let fallback = match verbosity {
        Verbosity::Quiet => "error",
        Verbosity::Normal => "info",
        Verbosity::Verbose => "debug",
    };
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .or_else(|_| tracing_subscriber::EnvFilter::try_new(fallback))
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));

    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .try_init();
}

fn print_list(project: &Project, env: Environment) -> Result<(), PipeworkError> {
    let config = &project.config;
    let graph = build_graph(project, env)?;

    println!("Sequences:");
    for (name, phases) in &config.sequences {
        let phases: Vec<String> = phases.iter().map(|phase| phase.join(", ")).collect();
        println!("  {:<12} {}", name, phases.join(" -> "));
    }

    println!("\nTasks:");
    for entry in graph.entries() {
        let deps = if entry.deps.is_empty() {
            String::new()
        } else {
            format!(" (after {})", entry.deps.join(", "))
        };
        println!("  {:<12} {}{}", entry.name, entry.task.describe(), deps);
    }

    if !config.watch.is_empty() {
        println!("\nWatch:");
        for rule in &config.watch {
            println!("  {:<40} {}", rule.pattern, rule.tasks.join(", "));
        }
    }
    Ok(())
}

/// Run the CLI application with the process arguments
pub async fn run() -> Result<(), PipeworkError> {
    // --file decides which config (and thus which targets) clap knows about
    let args: Vec<String> = std::env::args().collect();

    let app = if let Some(path) = extract_file_arg(&args) {
        App::with_config_file(path)?
    } else {
        App::new()?
    };

    app.run().await
}

/// Extract --file argument before clap parsing
fn extract_file_arg(args: &[String]) -> Option<PathBuf> {
    for i in 0..args.len() {
        if (args[i] == "--file" || args[i] == "-f") && i + 1 < args.len() {
            return Some(PathBuf::from(&args[i + 1]));
        }
        if let Some(path) = args[i].strip_prefix("--file=") {
            return Some(PathBuf::from(path));
        }
    }
    None
}
