use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};
use railsync::client::http::HttpClient;
use railsync::commands::migrate::{MigrateArgs, Target};
use railsync::config::{Config, Overrides};
use railsync::error::Result;
use railsync::logging;
use railsync::migrate::Locations;
use railsync::model::EntityKind;
use railsync::output::Format;

#[derive(Parser)]
#[command(
    name = "railsync",
    version,
    about = "Copy suites, sections, shared steps and cases between TestRail projects"
)]
struct Cli {
    /// Output format
    #[arg(long, global = true, value_enum, default_value = "json")]
    format: Format,
    /// Shorthand for --format pretty
    #[arg(long, global = true, hide = true)]
    pretty: bool,
    /// Config file (JSON or YAML); defaults to ./railsync.json or ./railsync.yaml
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    /// TestRail host
    #[arg(long, global = true, env = "RAILSYNC_HOST")]
    host: Option<String>,
    /// TestRail user (email)
    #[arg(long, global = true, env = "RAILSYNC_USER")]
    user: Option<String>,
    /// TestRail API key
    #[arg(long, global = true, env = "RAILSYNC_API_KEY", hide_env_values = true)]
    api_key: Option<String>,
    /// Directory for logs, snapshots and mapping files
    #[arg(long, global = true)]
    log_dir: Option<PathBuf>,
    /// Log level for stderr and the log file (RUST_LOG overrides)
    #[arg(long, global = true, default_value = "info")]
    log_level: String,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Args)]
struct LocationArgs {
    /// Source project ID
    #[arg(long)]
    src_project: u64,
    /// Source suite ID
    #[arg(long)]
    src_suite: u64,
    /// Destination project ID
    #[arg(long)]
    dst_project: u64,
    /// Destination suite ID
    #[arg(long)]
    dst_suite: u64,
    /// Destination section for cases whose source section is unmapped
    #[arg(long)]
    dst_section: Option<u64>,
    /// Field compared to detect duplicates (default: title)
    #[arg(long)]
    compare_field: Option<String>,
}

impl LocationArgs {
    fn locations(&self) -> Locations {
        Locations {
            src_project: self.src_project,
            src_suite: self.src_suite,
            dst_project: self.dst_project,
            dst_suite: self.dst_suite,
            dst_section: self.dst_section,
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Migrate one entity type, or everything in dependency order
    Migrate {
        /// What to migrate
        #[arg(value_enum)]
        target: Target,
        #[command(flatten)]
        location: LocationArgs,
        /// Fetch and filter only; create nothing
        #[arg(long)]
        dry_run: bool,
        /// Skip the confirmation prompt
        #[arg(long, short)]
        yes: bool,
        /// Write snapshots and the mapping index to the log directory
        #[arg(long)]
        export: bool,
        /// Mapping file to resume from; updated after a real run
        #[arg(long)]
        mapping: Option<PathBuf>,
        /// Concurrent create calls per stage (0 = one per item)
        #[arg(long)]
        concurrency: Option<usize>,
    },
    /// Fetch and filter one entity type and export snapshots, without importing
    Fetch {
        /// Entity type to fetch
        #[arg(value_enum)]
        kind: EntityKind,
        #[command(flatten)]
        location: LocationArgs,
    },
    /// Inspect persisted mapping files
    Mapping {
        #[command(subcommand)]
        action: MappingAction,
    },
}

#[derive(Subcommand)]
enum MappingAction {
    /// Print the entries of a mapping file
    Show {
        /// Path to a mapping JSON file
        file: PathBuf,
    },
}

fn load_config(cli: &Cli, compare_field: Option<String>, concurrency: Option<usize>) -> Result<Config> {
    let cwd = std::env::current_dir()?;
    Config::load(cli.config.as_deref(), &cwd)?.with_overrides(Overrides {
        host: cli.host.clone(),
        user: cli.user.clone(),
        api_key: cli.api_key.clone(),
        log_dir: cli.log_dir.clone(),
        concurrency,
        compare_field,
    })
}

fn run(cli: Cli, format: Format) -> Result<()> {
    match &cli.command {
        Commands::Migrate {
            target,
            location,
            dry_run,
            yes,
            export,
            mapping,
            concurrency,
        } => {
            let config = load_config(&cli, location.compare_field.clone(), *concurrency)?;
            let client = HttpClient::new(&config)?;
            let log = logging::init(&cli.log_level, Some(config.log_dir.as_path()))?;
            railsync::commands::migrate::run(
                &client,
                &config,
                log,
                *target,
                MigrateArgs {
                    locations: location.locations(),
                    dry_run: *dry_run,
                    yes: *yes,
                    export: *export,
                    mapping: mapping.clone(),
                },
                format,
            )
        }
        Commands::Fetch { kind, location } => {
            let config = load_config(&cli, location.compare_field.clone(), None)?;
            let client = HttpClient::new(&config)?;
            let log = logging::init(&cli.log_level, Some(config.log_dir.as_path()))?;
            railsync::commands::fetch::run(
                &client,
                &config,
                log,
                *kind,
                location.locations(),
                format,
            )
        }
        Commands::Mapping { action } => {
            let _log = logging::init(&cli.log_level, None)?;
            match action {
                MappingAction::Show { file } => railsync::commands::mapping::show(file, format),
            }
        }
    }
}

fn main() {
    let cli = Cli::parse();
    let format = if cli.pretty {
        Format::Pretty
    } else {
        cli.format
    };
    if let Err(e) = run(cli, format) {
        match format {
            Format::Json => {
                eprintln!(
                    "{}",
                    serde_json::json!({
                        "error": e.code(),
                        "message": e.to_string()
                    })
                );
            }
            _ => eprintln!("error: {e}"),
        }
        std::process::exit(1);
    }
}
