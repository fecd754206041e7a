use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use std::io::Write;
use tracing::{debug, info};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use orgaudit::auth::discover_token;
use orgaudit::{AuditOutcome, AuditSummary, Auditor, Check, Config, Finding};

#[derive(Parser)]
#[command(name = "orgaudit")]
#[command(about = "Audit all repositories of a GitHub user or organization")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Configuration file path (defaults to XDG config location)
    #[arg(short, long, global = true)]
    config: Option<std::path::PathBuf>,

    /// Verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Use this github user
    #[arg(long, global = true)]
    user: Option<String>,

    /// Use this github organization
    #[arg(long, global = true)]
    organization: Option<String>,

    /// Use this github token
    #[arg(long, global = true)]
    token: Option<String>,

    /// Ignore given repo name or url or name /regexp/ (use multiple times)
    #[arg(long = "ignore", value_name = "REPO", global = true)]
    ignore: Vec<String>,

    /// Ignore public repos
    #[arg(long, global = true)]
    ignore_public: bool,

    /// Stop listing repositories after this many pages
    #[arg(long, global = true)]
    max_pages: Option<u32>,
}

#[derive(Subcommand)]
enum Commands {
    /// List repositories
    List {
        /// Show the last committer of each repository
        #[arg(long)]
        details: bool,
    },

    /// List repositories that contain a gemspec
    Gems,

    /// Print a file from a repository
    Cat {
        /// Repository name or url
        repo: String,

        /// Path of the file on the default branch
        path: String,
    },

    /// List the files of a repository directory
    Ls {
        /// Repository name or url
        repo: String,

        /// Directory to list
        #[arg(default_value = ".")]
        dir: String,
    },

    /// Show configuration
    Config {
        #[command(subcommand)]
        config_command: ConfigCommands,
    },
}

#[derive(Subcommand)]
enum ConfigCommands {
    /// Print the default configuration file path
    Path,

    /// Print the effective configuration
    Show,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut config = load_config(cli.config.as_deref())?;
    init_logging(cli.verbose, &config.logging.level)?;
    debug!("Starting orgaudit v{}", env!("CARGO_PKG_VERSION"));

    apply_overrides(&cli, &mut config);

    match cli.command {
        Commands::List { details } => cmd_list(details, &config).await,
        Commands::Gems => cmd_gems(&config).await,
        Commands::Cat { repo, path } => cmd_cat(&repo, &path, &config).await,
        Commands::Ls { repo, dir } => cmd_ls(&repo, &dir, &config).await,
        Commands::Config { config_command } => cmd_config(config_command, &config),
    }
}

/// Initialize logging; `RUST_LOG` wins over the flag and the config
fn init_logging(verbose: bool, level: &str) -> Result<()> {
    let default_level = if verbose { "debug" } else { level };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(filter)
        .init();

    Ok(())
}

/// Load configuration from specified path or default location
fn load_config(config_path: Option<&std::path::Path>) -> Result<Config> {
    match config_path {
        Some(path) => Config::load(path),
        None => Config::load_or_default(),
    }
}

/// Command-line flags take precedence over the configuration file
fn apply_overrides(cli: &Cli, config: &mut Config) {
    if cli.organization.is_some() {
        config.github.organization = cli.organization.clone();
    }
    if cli.user.is_some() {
        config.github.user = cli.user.clone();
    }
    if cli.token.is_some() {
        config.github.token = cli.token.clone();
    }
    if cli.max_pages.is_some() {
        config.github.max_pages = cli.max_pages;
    }
    config.audit.ignore.extend(cli.ignore.iter().cloned());
    config.audit.ignore_public |= cli.ignore_public;
}

fn auditor(config: &Config) -> Result<Auditor> {
    let (source, token) = discover_token(config.github.token.as_deref());
    info!("Using token source: {:?}", source);
    Auditor::new(config, token)
}

/// Print failures to stderr and turn them into a non-zero exit
fn report_failures(summary: &AuditSummary) -> Result<()> {
    for outcome in &summary.outcomes {
        if let AuditOutcome::Failed { url, error } = outcome {
            eprintln!("{} -- failed: {}", url, error);
        }
    }

    if summary.failed > 0 {
        bail!(
            "{} of {} repositories could not be audited",
            summary.failed,
            summary.total_repositories
        );
    }
    Ok(())
}

async fn cmd_list(details: bool, config: &Config) -> Result<()> {
    let auditor = auditor(config)?;

    if !details {
        for repo in auditor.repositories().await? {
            println!("{}", repo.url());
        }
        return Ok(());
    }

    let summary = auditor.run(&Check::Committer).await?;
    for outcome in &summary.outcomes {
        if let AuditOutcome::Completed {
            url,
            finding: Finding::Committer(committer),
        } = outcome
        {
            println!("{} -- {}", url, committer);
        }
    }
    report_failures(&summary)
}

async fn cmd_gems(config: &Config) -> Result<()> {
    let summary = auditor(config)?.run(&Check::Gem).await?;

    for outcome in &summary.outcomes {
        if let AuditOutcome::Completed {
            url,
            finding: Finding::Gem(Some(gemspec)),
        } = outcome
        {
            println!("{} ({})", url, gemspec);
        }
    }
    report_failures(&summary)
}

async fn cmd_cat(name: &str, path: &str, config: &Config) -> Result<()> {
    let mut repo = auditor(config)?.repository(name).await?;
    let url = repo.url().to_string();

    let content = repo
        .content(path)
        .await?
        .with_context(|| format!("{} not found in {}", path, url))?;
    std::io::stdout()
        .write_all(content)
        .context("Failed to write file to stdout")?;
    Ok(())
}

async fn cmd_ls(name: &str, dir: &str, config: &Config) -> Result<()> {
    let mut repo = auditor(config)?.repository(name).await?;

    if dir != "." && !repo.is_directory(dir).await? {
        bail!("{} is not a directory in {}", dir, repo.url());
    }

    for file in repo.file_list(dir).await? {
        println!("{}", file);
    }
    Ok(())
}

fn cmd_config(command: ConfigCommands, config: &Config) -> Result<()> {
    match command {
        ConfigCommands::Path => {
            println!("{}", Config::default_config_path()?.display());
        }
        ConfigCommands::Show => {
            let mut shown = config.clone();
            if shown.github.token.is_some() {
                shown.github.token = Some("<redacted>".to_string());
            }
            let yaml =
                serde_yaml::to_string(&shown).context("Failed to serialize configuration")?;
            print!("{}", yaml);
        }
    }
    Ok(())
}
