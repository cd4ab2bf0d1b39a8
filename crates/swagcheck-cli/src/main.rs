//! swagcheck CLI - check a live API against its own Swagger/OpenAPI contract

mod progress;

use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand, ValueEnum};
use tracing::info;
use tracing_subscriber::EnvFilter;

use swagcheck_core::{Config, RecordSink, RunLog};
use swagcheck_runner::engine::entropy_seed;
use swagcheck_runner::loader::{self, SchemaSource};
use swagcheck_runner::{
    Auth, ClientSettings, ConformanceEngine, DEFAULT_TRIALS, HttpClient, RunSummary, Url,
};

use progress::ConsoleProgress;

const DEFAULT_TIMEOUT_SECS: u64 = 30;
const CONFIG_FILE: &str = ".swagcheck.toml";

#[derive(Parser)]
#[command(name = "swagcheck")]
#[command(about = "Check a live HTTP API against its own Swagger/OpenAPI contract")]
#[command(version, args_conflicts_with_subcommands = true)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    #[command(flatten)]
    check: CheckArgs,

    /// Output format
    #[arg(long, global = true, default_value = "terminal")]
    output: OutputFormat,

    /// Debug logging on stderr
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Write an example .swagcheck.toml
    Init,

    /// Print the JSON Schema of `--output json`
    Schema,
}

#[derive(Args)]
struct CheckArgs {
    /// Schema location: local path or http(s) URL
    schema: Option<String>,

    /// Trials per operation [default: 20]
    #[arg(short = 'n', long)]
    trials: Option<u32>,

    /// Keep testing after a conformance failure
    #[arg(short, long)]
    continue_on_error: bool,

    /// Basic auth user (needs --password)
    #[arg(long)]
    username: Option<String>,

    /// Basic auth password
    #[arg(long)]
    password: Option<String>,

    /// apiKey token
    #[arg(long)]
    token: Option<String>,

    /// apiKey security scheme to use instead of the schema default
    #[arg(long)]
    security_name: Option<String>,

    /// Server to test instead of the one the schema declares
    #[arg(long)]
    base_url: Option<String>,

    /// Sampling seed, to reproduce a run
    #[arg(long)]
    seed: Option<u64>,

    /// Write the run log to this file
    #[arg(long = "log")]
    log_file: Option<PathBuf>,

    /// Extra header sent with every request (repeatable)
    #[arg(long = "header", value_name = "NAME:VALUE", value_parser = parse_header)]
    headers: Vec<(String, String)>,

    /// Per-request timeout in seconds [default: 30]
    #[arg(long)]
    timeout: Option<u64>,

    /// Retries for transient connection errors [default: 2]
    #[arg(long)]
    retries: Option<u32>,

    /// Config file (default: .swagcheck.toml)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Show the test plan without sending requests
    #[arg(long)]
    dry_run: bool,
}

impl CheckArgs {
    /// Flags as a config layer; unset flags leave the file's values alone.
    fn to_config(&self) -> Config {
        Config {
            schema: self.schema.clone(),
            base_url: self.base_url.clone(),
            trials: self.trials,
            continue_on_error: self.continue_on_error.then_some(true),
            username: self.username.clone(),
            password: self.password.clone(),
            token: self.token.clone(),
            security_name: self.security_name.clone(),
            headers: self.headers.iter().cloned().collect(),
            seed: self.seed,
            log_file: self.log_file.clone(),
            timeout_secs: self.timeout,
            retries: self.retries,
        }
    }
}

fn parse_header(raw: &str) -> Result<(String, String), String> {
    let (name, value) = raw
        .split_once(':')
        .ok_or_else(|| format!("expected NAME:VALUE, got {raw:?}"))?;
    let name = name.trim();
    if name.is_empty() {
        return Err(format!("empty header name in {raw:?}"));
    }
    Ok((name.to_string(), value.trim().to_string()))
}

#[derive(Clone, Copy, ValueEnum, PartialEq, Eq)]
enum OutputFormat {
    Terminal,
    Json,
    Silent,
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    match run(cli) {
        Ok(code) => ExitCode::from(code),
        Err(e) => {
            eprintln!("Error: {e:#}");
            ExitCode::from(1)
        }
    }
}

fn init_tracing(verbose: bool) {
    let filter = if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"))
    };
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init();
}

fn run(cli: Cli) -> Result<u8> {
    match cli.command {
        Some(Commands::Init) => {
            let path = std::path::Path::new(CONFIG_FILE);
            if path.exists() {
                eprintln!("{CONFIG_FILE} already exists");
                return Ok(1);
            }
            std::fs::write(path, Config::example())
                .with_context(|| format!("writing {CONFIG_FILE}"))?;
            println!("Created {CONFIG_FILE}");
            println!("\nEdit the file to configure:");
            println!("  - schema: path or URL of your Swagger/OpenAPI document");
            println!("  - base_url: server to test");
            println!("  - token / username + password: credentials");
            Ok(0)
        }

        Some(Commands::Schema) => {
            println!("{}", swagcheck_core::schema::generate_schema()?);
            Ok(0)
        }

        None => check(&cli.check, cli.output),
    }
}

fn check(args: &CheckArgs, output: OutputFormat) -> Result<u8> {
    let file_config = match &args.config {
        Some(path) => Config::load(path)?,
        None => Config::load_default(&std::env::current_dir()?)?,
    };
    let cfg = file_config.overlay(args.to_config());
    let terminal = output == OutputFormat::Terminal;

    let location = cfg
        .schema
        .clone()
        .context("no schema location: pass one or set `schema` in .swagcheck.toml")?;
    let timeout = Duration::from_secs(cfg.timeout_secs.unwrap_or(DEFAULT_TIMEOUT_SECS));

    if terminal {
        println!("Connecting to {location}");
    }
    let schema = match SchemaSource::parse(&location).and_then(|s| loader::load(&s, timeout)) {
        Ok(schema) => schema,
        Err(e) => {
            eprintln!("Unable to connect Swagger client: {e}");
            return Ok(1);
        }
    };

    let mode = cfg.credentials().resolve();
    info!(auth = %mode.label(), "authentication resolved");
    let auth = Auth::resolve(&mode, &schema.security_schemes)?;

    let seed = cfg.seed.unwrap_or_else(entropy_seed);
    let engine = ConformanceEngine::new(seed)
        .with_trials(cfg.trials.unwrap_or(DEFAULT_TRIALS))
        .with_fail_fast(!cfg.continue_on_error.unwrap_or(false));

    if args.dry_run {
        let plan = engine.plan(&schema.operations);
        match output {
            OutputFormat::Terminal => println!("{}", plan.to_terminal()),
            OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&plan)?),
            OutputFormat::Silent => {}
        }
        return Ok(u8::from(plan.has_errors()));
    }

    let base = cfg
        .base_url
        .clone()
        .or_else(|| schema.base_url.clone())
        .context("the schema declares no server; pass --base-url")?;
    let mut settings =
        ClientSettings::new(Url::parse(&base).with_context(|| format!("invalid base URL {base}"))?);
    settings.auth = auth;
    settings.headers = cfg.headers.clone();
    settings.timeout = timeout;
    if let Some(retries) = cfg.retries {
        settings.retry.retries = retries;
    }
    let mut client = HttpClient::new(settings)?;

    info!(seed, base_url = %base, "starting run");
    if terminal {
        println!("Seed: {seed} (rerun with --seed {seed})");
        println!();
    }

    let mut progress = ConsoleProgress::new(terminal);
    let mut log = cfg.log_file.as_deref().map(RunLog::create).transpose()?;
    let mut sinks: Vec<&mut dyn RecordSink> = vec![&mut progress];
    if let Some(log) = log.as_mut() {
        sinks.push(log);
    }

    let summary = engine.run(&schema.operations, &mut client, &mut sinks)?;
    print_summary(&summary, output)?;
    Ok(summary.exit_code())
}

fn print_summary(summary: &RunSummary, output: OutputFormat) -> Result<()> {
    match output {
        OutputFormat::Terminal => {
            if !summary.report.is_empty() {
                println!("\n{}", summary.report.to_terminal().trim_end());
            }
            let skipped: Vec<_> = summary.skipped().collect();
            if !skipped.is_empty() {
                println!("\nSkipped ({}):", skipped.len());
                for (label, parameter) in skipped {
                    println!("  {label}: unsupported input type for '{parameter}'");
                }
            }
            println!(
                "\n{} passed, {} failed (seed {})",
                summary.report.total_passes(),
                summary.report.total_failures(),
                summary.seed
            );
            if summary.aborted {
                println!("Stopping after first failure (use -c to keep going)");
            }
        }
        OutputFormat::Json => {
            println!("{}", serde_json::to_string_pretty(&summary.report)?);
        }
        OutputFormat::Silent => {}
    }
    Ok(())
}
