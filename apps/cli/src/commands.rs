//! CLI command definitions, routing, and tracing setup.

use std::io::Read;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::Utc;
use clap::{Parser, Subcommand};
use color_eyre::eyre::{Result, WrapErr, eyre};
use indicatif::{ProgressBar, ProgressStyle};
use serde_json::json;
use tracing::info;

use stagegate_artifacts::{ArtifactStore, FsArtifactStore};
use stagegate_core::import::{self, ImportSummary, ProgressReporter};
use stagegate_core::{LibsqlSources, MatchingStage, RankingStage, ValidationStage, run_status};
use stagegate_shared::{
    AppConfig, PipelineConfig, expand_home, init_config, load_config, load_config_from,
    new_run_name,
};
use stagegate_storage::{CompanyRecord, PressReleaseRecord, Storage};

// ---------------------------------------------------------------------------
// CLI structure
// ---------------------------------------------------------------------------

/// stagegate: gated, resumable stage tools for agent-driven screening runs.
#[derive(Parser)]
#[command(
    name = "stagegate",
    version,
    about = "Gated, crash-resumable stage tools for an agent-driven company screening pipeline.",
    long_about = None,
)]
pub(crate) struct Cli {
    /// Run to operate on (create one with `stagegate run new`).
    #[arg(long = "run", env = "STAGEGATE_RUN", global = true)]
    pub run_name: Option<String>,

    /// Config file to use instead of ~/.stagegate/stagegate.toml.
    #[arg(long = "config", global = true)]
    pub config_path: Option<PathBuf>,

    /// Log format: text (default) or json.
    #[arg(long, default_value = "text", global = true)]
    pub log_format: LogFormat,

    /// Verbosity level (-v, -vv, -vvv).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Command,
}

/// Log output format.
#[derive(Clone, Debug, clap::ValueEnum)]
pub(crate) enum LogFormat {
    Text,
    Json,
}

/// Top-level CLI subcommands.
#[derive(Subcommand)]
pub(crate) enum Command {
    /// Run management.
    Run {
        #[command(subcommand)]
        action: RunAction,
    },

    /// Query the next batch of companies (gated by the batch cursor).
    Companies {
        /// Row offset; must be the next expected multiple of the batch size.
        #[arg(long)]
        offset: u64,

        /// Rows to return; must equal the configured batch size (the default).
        #[arg(long)]
        limit: Option<u64>,
    },

    /// Query press releases for the next company in the validation queue.
    PressReleases {
        /// Exactly one ticker symbol.
        #[arg(long)]
        symbols: String,

        /// Must be 0; each company is fetched in a single call.
        #[arg(long, default_value_t = 0)]
        skip: u64,

        /// Documents to return (defaults to the configured page size).
        #[arg(long)]
        limit: Option<u64>,
    },

    /// Write an artifact into the run.
    Write {
        /// Artifact path relative to the run.
        #[arg(long)]
        path: String,

        /// Read content from this file instead of stdin.
        #[arg(long)]
        file: Option<PathBuf>,
    },

    /// Print an artifact with line numbers.
    Read {
        /// Artifact path relative to the run.
        #[arg(long)]
        path: String,

        /// First line to print (0-based).
        #[arg(long, default_value_t = 0)]
        offset: usize,

        /// Maximum number of lines.
        #[arg(long, default_value_t = 2000)]
        limit: usize,
    },

    /// Replace a string inside an artifact.
    Edit {
        /// Artifact path relative to the run.
        #[arg(long)]
        path: String,

        /// Text to find.
        #[arg(long)]
        old: String,

        /// Replacement text.
        #[arg(long)]
        new: String,

        /// Replace every occurrence instead of only the first.
        #[arg(long)]
        replace_all: bool,
    },

    /// List one level of a run directory.
    Ls {
        /// Directory relative to the run (defaults to the run root).
        #[arg(long, default_value = "")]
        path: String,
    },

    /// Fold stage artifacts into their aggregate.
    Consolidate {
        #[command(subcommand)]
        target: ConsolidateTarget,
    },

    /// Merge matches with validations into the final rankings.
    Rank,

    /// Show how far the run has progressed.
    Status,

    /// Initialize the validation queue and show what remains.
    Queue,

    /// Seed the reference source database from JSON exports.
    Import {
        #[command(subcommand)]
        target: ImportTarget,
    },

    /// Configuration management.
    Config {
        /// Config subcommand.
        #[command(subcommand)]
        action: ConfigAction,
    },
}

/// Run subcommands.
#[derive(Subcommand)]
pub(crate) enum RunAction {
    /// Create a fresh run namespace and print its name.
    New,
}

/// Aggregates that can be consolidated.
#[derive(Subcommand)]
pub(crate) enum ConsolidateTarget {
    /// Company match batches into matched_companies.json.
    Matches,
    /// Per-company validations into validated_results.json.
    Validations,
}

/// Import subcommands.
#[derive(Subcommand)]
pub(crate) enum ImportTarget {
    /// Upsert companies from a JSON array.
    Companies {
        #[arg(long)]
        file: PathBuf,
    },
    /// Append press releases from a JSON array.
    PressReleases {
        #[arg(long)]
        file: PathBuf,
    },
}

/// Config subcommands.
#[derive(Subcommand)]
pub(crate) enum ConfigAction {
    /// Initialize config file with defaults.
    Init,
    /// Show resolved configuration.
    Show,
}

// ---------------------------------------------------------------------------
// Tracing setup
// ---------------------------------------------------------------------------

/// Initialize tracing based on CLI flags. Logs go to stderr so stdout stays
/// machine-readable.
pub(crate) fn init_tracing(cli: &Cli) {
    use tracing_subscriber::{EnvFilter, fmt};

    let filter = match cli.verbose {
        0 => "stagegate=info",
        1 => "stagegate=debug",
        _ => "stagegate=trace",
    };

    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter));

    match cli.log_format {
        LogFormat::Text => {
            fmt()
                .with_env_filter(env_filter)
                .with_writer(std::io::stderr)
                .with_target(false)
                .init();
        }
        LogFormat::Json => {
            fmt()
                .json()
                .with_env_filter(env_filter)
                .with_writer(std::io::stderr)
                .init();
        }
    }
}

// ---------------------------------------------------------------------------
// Command context
// ---------------------------------------------------------------------------

/// Resolved config plus the selected run.
struct Context {
    config: AppConfig,
    run_name: Option<String>,
}

impl Context {
    fn load(cli: &Cli) -> Result<Self> {
        let config = match &cli.config_path {
            Some(path) => load_config_from(path)?,
            None => load_config()?,
        };
        Ok(Self {
            config,
            run_name: cli.run_name.clone(),
        })
    }

    fn pipeline(&self) -> PipelineConfig {
        PipelineConfig::from(&self.config)
    }

    fn store(&self) -> Result<Arc<dyn ArtifactStore>> {
        let run = self.run_name.as_deref().ok_or_else(|| {
            eyre!("no run selected: pass --run or set STAGEGATE_RUN (create one with `stagegate run new`)")
        })?;
        let store: Arc<dyn ArtifactStore> =
            Arc::new(FsArtifactStore::from_config(&self.config.storage, run)?);
        Ok(store)
    }

    fn database(&self) -> PathBuf {
        expand_home(&self.config.storage.database)
    }

    fn sources(&self) -> Arc<LibsqlSources> {
        Arc::new(LibsqlSources::open_lazily(
            self.database(),
            self.config.sources.company_sector.clone(),
        ))
    }
}

// ---------------------------------------------------------------------------
// Command dispatch
// ---------------------------------------------------------------------------

/// Run the CLI command.
pub(crate) async fn run(cli: Cli) -> Result<()> {
    let ctx = Context::load(&cli)?;

    match cli.command {
        Command::Run { action } => match action {
            RunAction::New => cmd_run_new(&ctx),
        },
        Command::Companies { offset, limit } => cmd_companies(&ctx, offset, limit).await,
        Command::PressReleases {
            symbols,
            skip,
            limit,
        } => cmd_press_releases(&ctx, &symbols, skip, limit).await,
        Command::Write { path, file } => cmd_write(&ctx, &path, file.as_deref()),
        Command::Read {
            path,
            offset,
            limit,
        } => cmd_read(&ctx, &path, offset, limit),
        Command::Edit {
            path,
            old,
            new,
            replace_all,
        } => cmd_edit(&ctx, &path, &old, &new, replace_all),
        Command::Ls { path } => cmd_ls(&ctx, &path),
        Command::Consolidate { target } => cmd_consolidate(&ctx, target),
        Command::Rank => cmd_rank(&ctx),
        Command::Status => cmd_status(&ctx),
        Command::Queue => cmd_queue(&ctx),
        Command::Import { target } => match target {
            ImportTarget::Companies { file } => cmd_import_companies(&ctx, &file).await,
            ImportTarget::PressReleases { file } => cmd_import_press_releases(&ctx, &file).await,
        },
        Command::Config { action } => match action {
            ConfigAction::Init => cmd_config_init(),
            ConfigAction::Show => cmd_config_show(&ctx),
        },
    }
}

// ---------------------------------------------------------------------------
// Stage commands
// ---------------------------------------------------------------------------

fn cmd_run_new(ctx: &Context) -> Result<()> {
    let name = new_run_name(&ctx.config.model.model_id, Utc::now());
    let store = FsArtifactStore::from_config(&ctx.config.storage, &name)?;
    info!(run = %name, "created run");

    let out = json!({
        "run": name,
        "path": store.run_dir().display().to_string(),
    });
    println!("{}", serde_json::to_string_pretty(&out)?);
    Ok(())
}

async fn cmd_companies(ctx: &Context, offset: u64, limit: Option<u64>) -> Result<()> {
    let pipeline = ctx.pipeline();
    let limit = limit.unwrap_or(pipeline.batch_size);
    let mut stage = MatchingStage::new(ctx.store()?, ctx.sources(), pipeline)?;
    println!("{}", stage.query_companies(offset, limit).await);
    Ok(())
}

async fn cmd_press_releases(
    ctx: &Context,
    symbols: &str,
    skip: u64,
    limit: Option<u64>,
) -> Result<()> {
    let pipeline = ctx.pipeline();
    let limit = limit.unwrap_or(pipeline.press_release_limit);
    let mut stage = ValidationStage::new(ctx.store()?, ctx.sources(), pipeline);

    let queue = stage.init_queue();
    if !stage.gate().is_initialized() {
        println!("{queue}");
        return Ok(());
    }
    println!("{}", stage.query_press_releases(symbols, skip, limit).await);
    Ok(())
}

fn cmd_write(ctx: &Context, path: &str, file: Option<&Path>) -> Result<()> {
    let content = match file {
        Some(file) => std::fs::read_to_string(file)
            .wrap_err_with(|| format!("failed to read {}", file.display()))?,
        None => {
            let mut buf = String::new();
            std::io::stdin()
                .read_to_string(&mut buf)
                .wrap_err("failed to read artifact content from stdin")?;
            buf
        }
    };

    let mut stage = ValidationStage::new(ctx.store()?, ctx.sources(), ctx.pipeline());
    println!("{}", stage.write_artifact(path, &content));
    Ok(())
}

fn cmd_read(ctx: &Context, path: &str, offset: usize, limit: usize) -> Result<()> {
    let store = ctx.store()?;
    println!(
        "{}",
        stagegate_core::stage::read_artifact(store.as_ref(), path, offset, limit)
    );
    Ok(())
}

fn cmd_edit(ctx: &Context, path: &str, old: &str, new: &str, replace_all: bool) -> Result<()> {
    let mut stage = ValidationStage::new(ctx.store()?, ctx.sources(), ctx.pipeline());
    println!("{}", stage.edit_artifact(path, old, new, replace_all));
    Ok(())
}

fn cmd_ls(ctx: &Context, path: &str) -> Result<()> {
    let store = ctx.store()?;
    println!(
        "{}",
        stagegate_core::stage::list_directory(store.as_ref(), path)
    );
    Ok(())
}

fn cmd_consolidate(ctx: &Context, target: ConsolidateTarget) -> Result<()> {
    let out = match target {
        ConsolidateTarget::Matches => {
            MatchingStage::new(ctx.store()?, ctx.sources(), ctx.pipeline())?.consolidate()
        }
        ConsolidateTarget::Validations => {
            ValidationStage::new(ctx.store()?, ctx.sources(), ctx.pipeline()).consolidate()
        }
    };
    println!("{out}");
    Ok(())
}

fn cmd_rank(ctx: &Context) -> Result<()> {
    let stage = RankingStage::new(ctx.store()?, ctx.pipeline());
    println!("{}", stage.merge_and_rank());
    Ok(())
}

fn cmd_status(ctx: &Context) -> Result<()> {
    let store = ctx.store()?;
    let status = run_status(store.as_ref(), ctx.pipeline().batch_size)?;
    let out = json!({
        "run": ctx.run_name,
        "status": status,
    });
    println!("{}", serde_json::to_string_pretty(&out)?);
    Ok(())
}

fn cmd_queue(ctx: &Context) -> Result<()> {
    let mut stage = ValidationStage::new(ctx.store()?, ctx.sources(), ctx.pipeline());
    println!("{}", stage.init_queue());
    Ok(())
}

// ---------------------------------------------------------------------------
// Import commands
// ---------------------------------------------------------------------------

async fn open_database(ctx: &Context) -> Result<Storage> {
    let path = ctx.database();
    info!(path = %path.display(), "opening source database");
    Ok(Storage::open(&path).await?)
}

fn read_records<T: serde::de::DeserializeOwned>(file: &Path) -> Result<Vec<T>> {
    let content = std::fs::read_to_string(file)
        .wrap_err_with(|| format!("failed to read {}", file.display()))?;
    Ok(import::parse_records(&content)?)
}

async fn cmd_import_companies(ctx: &Context, file: &Path) -> Result<()> {
    let records: Vec<CompanyRecord> = read_records(file)?;
    let storage = open_database(ctx).await?;
    let summary = import::import_companies(&storage, &records, &CliProgress::new()).await?;
    print_import_summary("companies", &summary);
    Ok(())
}

async fn cmd_import_press_releases(ctx: &Context, file: &Path) -> Result<()> {
    let records: Vec<PressReleaseRecord> = read_records(file)?;
    let storage = open_database(ctx).await?;
    let summary = import::import_press_releases(&storage, &records, &CliProgress::new()).await?;
    print_import_summary("press releases", &summary);
    Ok(())
}

fn print_import_summary(what: &str, summary: &ImportSummary) {
    println!();
    println!("  Imported {what}");
    println!("  Records:  {}", summary.imported);
    println!("  Skipped:  {}", summary.skipped);
    println!("  Time:     {:.1}s", summary.elapsed.as_secs_f64());
    println!();
}

// ---------------------------------------------------------------------------
// CLI progress reporter
// ---------------------------------------------------------------------------

/// CLI progress reporter using an indicatif bar.
struct CliProgress {
    bar: ProgressBar,
}

impl CliProgress {
    fn new() -> Self {
        let bar = ProgressBar::new(0);
        bar.set_style(
            ProgressStyle::with_template("{spinner:.cyan} {msg} [{bar:30.cyan/blue}] {pos}/{len}")
                .unwrap_or_else(|_| ProgressStyle::default_bar())
                .progress_chars("=> "),
        );
        bar.enable_steady_tick(std::time::Duration::from_millis(80));
        Self { bar }
    }
}

impl ProgressReporter for CliProgress {
    fn start(&self, what: &str, total: usize) {
        self.bar.set_length(total as u64);
        self.bar.set_message(format!("Importing {what}"));
    }

    fn record_done(&self, current: usize, _total: usize) {
        self.bar.set_position(current as u64);
    }

    fn done(&self, _summary: &ImportSummary) {
        self.bar.finish_and_clear();
    }
}

// ---------------------------------------------------------------------------
// Config commands
// ---------------------------------------------------------------------------

fn cmd_config_init() -> Result<()> {
    let path = init_config()?;
    println!("Config initialized at: {}", path.display());
    Ok(())
}

fn cmd_config_show(ctx: &Context) -> Result<()> {
    let toml_str = toml::to_string_pretty(&ctx.config)?;
    println!("{toml_str}");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn parses_gated_queries() {
        let cli = Cli::try_parse_from([
            "stagegate",
            "--run",
            "run_2025_01_01_000000_m",
            "companies",
            "--offset",
            "200",
        ])
        .unwrap();
        assert_eq!(cli.run_name.as_deref(), Some("run_2025_01_01_000000_m"));
        assert!(matches!(
            cli.command,
            Command::Companies {
                offset: 200,
                limit: None
            }
        ));

        let cli =
            Cli::try_parse_from(["stagegate", "press-releases", "--symbols", "NVDA"]).unwrap();
        match cli.command {
            Command::PressReleases {
                symbols,
                skip,
                limit,
            } => {
                assert_eq!(symbols, "NVDA");
                assert_eq!(skip, 0);
                assert_eq!(limit, None);
            }
            _ => panic!("expected press-releases"),
        }
    }

    #[test]
    fn parses_nested_subcommands() {
        let cli = Cli::try_parse_from(["stagegate", "consolidate", "validations"]).unwrap();
        assert!(matches!(
            cli.command,
            Command::Consolidate {
                target: ConsolidateTarget::Validations
            }
        ));

        let cli = Cli::try_parse_from(["stagegate", "run", "new", "-vv"]).unwrap();
        assert_eq!(cli.verbose, 2);
        assert!(matches!(
            cli.command,
            Command::Run {
                action: RunAction::New
            }
        ));
    }

    #[test]
    fn parses_edit_and_ls() {
        let cli = Cli::try_parse_from([
            "stagegate",
            "edit",
            "--path",
            "validations/company_A.json",
            "--old",
            "0.9",
            "--new",
            "0.8",
            "--replace-all",
        ])
        .unwrap();
        match cli.command {
            Command::Edit {
                path,
                old,
                new,
                replace_all,
            } => {
                assert_eq!(path, "validations/company_A.json");
                assert_eq!((old.as_str(), new.as_str()), ("0.9", "0.8"));
                assert!(replace_all);
            }
            _ => panic!("expected edit"),
        }

        let cli = Cli::try_parse_from(["stagegate", "ls"]).unwrap();
        assert!(matches!(cli.command, Command::Ls { path } if path.is_empty()));
    }

    #[test]
    fn store_requires_a_run() {
        let ctx = Context {
            config: AppConfig::default(),
            run_name: None,
        };
        let err = ctx.store().err().unwrap();
        assert!(err.to_string().contains("no run selected"));
    }
}
