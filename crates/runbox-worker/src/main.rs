//! Runbox worker CLI
//!
//! Serves one language over HTTP, or runs a single job locally.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use runbox::config::Toolchain;
use runbox::sandbox::resolve_command;
use runbox::{Config, EXAMPLE_CONFIG, ExecutionRequest, Language, Runner, TestCase};
use tokio::net::TcpListener;
use tracing::{Level, debug, info, warn};
use tracing_subscriber::EnvFilter;

mod routes;

#[derive(Parser)]
#[command(name = "runbox-worker")]
#[command(about = "Run submitted code against test cases in a sandbox")]
#[command(version)]
struct Cli {
    /// Path to configuration file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Language to serve (overrides the configuration)
    #[arg(short, long, global = true)]
    language: Option<Language>,

    /// Address to listen on (overrides the configuration)
    #[arg(short, long, global = true)]
    bind: Option<String>,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the HTTP worker (default)
    Serve,

    /// Run one job locally and print the result as JSON
    Exec {
        /// Source file to run
        #[arg(value_name = "FILE")]
        source: PathBuf,

        /// JSON file with the list of test cases
        #[arg(short, long, value_name = "JSON")]
        tests: PathBuf,

        /// Function to call with each test's input
        #[arg(short, long)]
        entry_point: Option<String>,

        /// Per-test wall clock budget in milliseconds
        #[arg(long)]
        timeout_ms: Option<u64>,
    },

    /// Initialize a new configuration file
    Init {
        /// Output path (default: runbox.toml)
        #[arg(short, long, default_value = "runbox.toml")]
        output: PathBuf,

        /// Overwrite existing file
        #[arg(short, long)]
        force: bool,
    },

    /// Show the effective configuration
    ShowConfig,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = if cli.verbose {
        EnvFilter::from_default_env().add_directive(Level::DEBUG.into())
    } else {
        EnvFilter::from_default_env().add_directive(Level::INFO.into())
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let overrides = ConfigOverrides {
        path: cli.config,
        language: cli.language,
        bind: cli.bind,
    };

    match cli.command.unwrap_or(Commands::Serve) {
        Commands::Init { output, force } => init_config(&output, force).await,
        Commands::Serve => serve(overrides.load()?).await,
        Commands::Exec {
            source,
            tests,
            entry_point,
            timeout_ms,
        } => run_exec(overrides.load()?, &source, &tests, entry_point, timeout_ms).await,
        Commands::ShowConfig => {
            show_config(&overrides.load()?);
            Ok(())
        }
    }
}

/// Global flags layered over the loaded configuration
struct ConfigOverrides {
    path: Option<PathBuf>,
    language: Option<Language>,
    bind: Option<String>,
}

impl ConfigOverrides {
    fn load(&self) -> Result<Config> {
        if let Some(ref path) = self.path {
            info!(?path, "loading configuration");
        } else {
            debug!("using default configuration");
        }
        let mut config =
            Config::load(self.path.as_deref()).context("failed to load configuration")?;

        if let Some(language) = self.language {
            config.language = language;
        }
        if let Some(ref bind) = self.bind {
            config.server.bind = bind.clone();
        }
        config.validate().context("invalid configuration")?;
        Ok(config)
    }
}

async fn serve(config: Config) -> Result<()> {
    let bind = config.server.bind.clone();
    let language = config.language;

    check_toolchain(&config.toolchain());

    let app = routes::router(Runner::new(config));
    let listener = TcpListener::bind(&bind)
        .await
        .with_context(|| format!("failed to bind to {bind}"))?;

    info!(%bind, %language, "worker listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server error")?;

    info!("worker shut down");
    Ok(())
}

/// Warn at startup if the compiler or interpreter is not installed
fn check_toolchain(toolchain: &Toolchain) {
    let mut program = match toolchain.compile {
        Some(ref compile) => compile.command.clone(),
        None => toolchain.run.command.clone(),
    };
    if let Err(e) = resolve_command(&mut program, &toolchain.run.path) {
        warn!(error = %e, "toolchain unavailable, every job will fail");
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    let terminate = async {
        use tokio::signal::unix::{SignalKind, signal};
        match signal(SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    tokio::select! {
        _ = ctrl_c => info!("received Ctrl+C, shutting down"),
        _ = terminate => info!("received SIGTERM, shutting down"),
    }
}

async fn run_exec(
    config: Config,
    source: &Path,
    tests: &Path,
    entry_point: Option<String>,
    timeout_ms: Option<u64>,
) -> Result<()> {
    let code = tokio::fs::read_to_string(source)
        .await
        .context("failed to read source file")?;
    let tests = tokio::fs::read_to_string(tests)
        .await
        .context("failed to read test file")?;
    let test_cases: Vec<TestCase> =
        serde_json::from_str(&tests).context("failed to parse test cases")?;

    let request = ExecutionRequest {
        code,
        test_cases,
        entry_point,
        timeout_ms,
        ..Default::default()
    };

    info!(language = %config.language, tests = request.test_cases.len(), "running job");

    let runner = Runner::new(config);
    let result = runner
        .execute(&request)
        .await
        .context("invalid request")?;

    // Print the result on stdout, keeping logs on stderr for piping
    println!("{}", serde_json::to_string_pretty(&result)?);

    if result.all_passed() {
        Ok(())
    } else {
        std::process::exit(1);
    }
}

fn show_config(config: &Config) {
    let toolchain = config.toolchain();

    println!("Language: {}", config.language);
    println!("Bind address: {}", config.server.bind);
    println!("Max body size: {} bytes", config.server.max_body_bytes);
    match config.scratch_root {
        Some(ref root) => println!("Scratch root: {}", root.display()),
        None => println!("Scratch root: {}", std::env::temp_dir().display()),
    }
    println!();
    println!("Default resource limits:");
    print_limits(&config.default_limits);
    println!();
    println!("Maximum resource limits:");
    print_limits(&config.max_limits);
    println!();
    println!(
        "Concurrency: {} tests per job, {} processes total",
        config.concurrency.per_job, config.concurrency.max_processes
    );
    println!();
    println!("Toolchain:");
    println!("  Source file: {}", toolchain.source_name);
    if let Some(ref compile) = toolchain.compile {
        println!("  Compile: {}", compile.command.join(" "));
    }
    println!("  Executes: {}", toolchain.artifact_name());
    println!("  Run: {}", toolchain.run.command.join(" "));
    println!("  PATH: {}", toolchain.run.path);
    println!("  Memory rlimit: {:?}", toolchain.run.memory_rlimit);
}

fn print_limits(limits: &runbox::ResourceLimits) {
    println!("  Timeout: {:?} ms", limits.timeout_ms);
    println!("  CPU time limit: {:?} s", limits.cpu_time_limit);
    println!("  Memory limit: {:?} MB", limits.memory_limit);
    println!("  Max processes: {:?}", limits.max_processes);
    println!("  Max open files: {:?}", limits.max_open_files);
    println!("  Max output: {:?} KB", limits.max_output);
}

async fn init_config(output: &Path, force: bool) -> Result<()> {
    if output.exists() && !force {
        anyhow::bail!(
            "Configuration file already exists at '{}'. Use --force to overwrite.",
            output.display()
        );
    }

    tokio::fs::write(output, EXAMPLE_CONFIG)
        .await
        .context("failed to write configuration file")?;

    println!("Created configuration file at '{}'", output.display());
    Ok(())
}
