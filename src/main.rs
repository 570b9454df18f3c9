use std::io::Read;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use clap::{CommandFactory, Parser, Subcommand};
use miette::{Context, IntoDiagnostic, Result};
use tracing_subscriber::EnvFilter;

use quill_core::{Action, QuillConfig, QuillError};
use quill_difflens::filter::IgnoreFilter;
use quill_review::github::{GitHubClient, PullRequestRef};
use quill_review::llm::LlmClient;
use quill_review::pipeline::{build_pipeline, publications, Services};
use quill_review::services::TicketTracker;
use quill_review::tracker::JiraClient;
use quill_review::workflow::WorkflowState;

const CONFIG_FILE: &str = ".quill.toml";

#[derive(Parser)]
#[command(
    name = "quill",
    version,
    about = "Pull request summaries and reviews, published idempotently",
    long_about = "Quill turns a pull request into a generated summary and review and publishes\n\
                   them back to the pull request. Re-running updates the earlier output in place\n\
                   instead of piling up duplicates.\n\n\
                   Examples:\n  \
                     quill run --pr owner/repo#42            Summarize and review a pull request\n  \
                     quill run --pr owner/repo#42 --only review\n  \
                     git diff main | quill diff              Preview what the model would see\n  \
                     quill init                              Create a .quill.toml config file"
)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Path to configuration file (default: .quill.toml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Enable debug logging (overridden by RUST_LOG)
    #[arg(long, short, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Command {
    /// Run the pipeline against a GitHub pull request
    #[command(long_about = "Run the pipeline against a GitHub pull request.\n\n\
        Fetches the pull request, optionally looks up the linked ticket, filters and\n\
        truncates the diff, then generates and publishes the enabled actions.\n\
        The summary goes into the description between sentinel comments; the\n\
        review is a single comment that later runs edit in place.\n\n\
        Examples:\n  quill run --pr octocat/hello-world#42\n  quill run --pr octocat/hello-world#42 --only summary")]
    Run {
        /// Pull request reference (owner/repo#123)
        #[arg(long)]
        pr: String,
        /// Run only these actions, overriding [pipeline] actions
        #[arg(long, value_parser = parse_action)]
        only: Vec<Action>,
    },
    /// Filter and truncate a unified diff locally
    #[command(long_about = "Filter and truncate a unified diff locally.\n\n\
        Applies the configured ignore patterns and character budget and prints the\n\
        text the model would receive. Statistics go to stderr.\n\n\
        Examples:\n  git diff main | quill diff\n  quill diff --file change.patch --max-chars 2000 --ignore 'docs/**'")]
    Diff {
        /// Read diff from file instead of stdin
        #[arg(long)]
        file: Option<PathBuf>,
        /// Character budget (default: diff.max_chars from config)
        #[arg(long)]
        max_chars: Option<usize>,
        /// Extra ignore pattern, in addition to the configured ones
        #[arg(long)]
        ignore: Vec<String>,
        /// Print the result and report as JSON
        #[arg(long)]
        json: bool,
    },
    /// Create a default .quill.toml configuration file
    #[command(long_about = "Create a default .quill.toml configuration file.\n\n\
        Fails if .quill.toml already exists.")]
    Init,
    /// Generate shell completion scripts
    #[command(hide = true)]
    Completions {
        /// Shell to generate completions for
        #[arg(value_enum)]
        shell: clap_complete::Shell,
    },
}

fn parse_action(s: &str) -> std::result::Result<Action, String> {
    s.parse()
}

const DEFAULT_CONFIG: &str = r#"# Quill configuration
# See https://github.com/quill-rs/quill for documentation

[pipeline]
# Actions to run: "summary" writes into the PR description,
# "review" posts (or updates) a single review comment.
actions = ["summary", "review"]

[diff]
# Files whose path matches any glob are left out of the prompt.
# `*` also matches across directories.
ignore_patterns = [
    "package-lock.json",
    "yarn.lock",
    "Cargo.lock",
    "pnpm-lock.yaml",
    "poetry.lock",
    "Gemfile.lock",
    "composer.lock",
    "go.sum",
    "*.min.js",
    "*.min.css",
]
# Character budget for the diff sent to the model
max_chars = 60000

[ticket]
# Look up the Jira ticket named in the branch (e.g. feature/PAY-42-refunds)
enabled = false
branch_pattern = "([A-Z][A-Z0-9]+-\\d+)"
# base_url = "https://example.atlassian.net"
# email = "bot@example.com"
# api_token = "..."  # or set JIRA_API_TOKEN

[llm]
provider = "openai"
model = "gpt-4o"
temperature = 0.2
# provider = "gemini" uses Google's OpenAI-compatible endpoint
# api_key = "sk-..."  # or set OPENAI_API_KEY / ANTHROPIC_API_KEY / GEMINI_API_KEY
# base_url = "https://api.openai.com"

[github]
# token = "ghp_..."  # or set GITHUB_TOKEN / GH_TOKEN
# App and Actions tokens cannot look up their own user; name it here
# login = "github-actions[bot]"
# api_url = "https://ghe.example.com/api/v3"
"#;

fn init_tracing(verbose: bool) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(if verbose { "debug" } else { "info" }));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

fn load_config(path: Option<&Path>) -> Result<QuillConfig> {
    let config = match path {
        Some(path) => QuillConfig::from_file(path)?,
        None => {
            let default_path = Path::new(CONFIG_FILE);
            if default_path.exists() {
                QuillConfig::from_file(default_path)?
            } else {
                QuillConfig::default()
            }
        }
    };
    Ok(config)
}

fn read_diff_input(file: Option<&Path>) -> Result<String> {
    match file {
        Some(path) => std::fs::read_to_string(path)
            .into_diagnostic()
            .wrap_err(format!("reading {}", path.display())),
        None => {
            let mut input = String::new();
            std::io::stdin()
                .read_to_string(&mut input)
                .into_diagnostic()
                .wrap_err("reading stdin")?;
            Ok(input)
        }
    }
}

async fn run_pipeline(mut config: QuillConfig, pr: &str, only: Vec<Action>) -> Result<()> {
    let pr: PullRequestRef = pr.parse()?;
    if !only.is_empty() {
        config.pipeline.actions = only;
    }
    config.validate()?;

    if config.llm.provider != "ollama" && config.llm.resolved_api_key().is_none() {
        miette::bail!(miette::miette!(
            help = format!(
                "Set {} or add api_key under [llm] in {CONFIG_FILE}",
                config.llm.api_key_env_var()
            ),
            "No API key configured for provider '{}'",
            config.llm.provider
        ));
    }

    let tracker: Option<Arc<dyn TicketTracker>> = if config.ticket.enabled {
        Some(Arc::new(JiraClient::new(&config.ticket)?))
    } else {
        None
    };
    let services = Services {
        host: Arc::new(GitHubClient::new(&config.github, pr.clone())?),
        tracker,
        model: Arc::new(LlmClient::new(&config.llm)?),
    };

    let workflow = build_pipeline(&config, services)?;
    tracing::info!(pr = %pr, actions = ?config.pipeline.actions, "starting run");

    match workflow.run(WorkflowState::new()).await {
        Ok(report) => {
            eprintln!("{}", report.trace);
            for (target, publication) in publications(&report.state) {
                println!("{target}: {publication}");
            }
            Ok(())
        }
        Err(failure) => {
            eprintln!("{}", failure.trace);
            Err(QuillError::from(failure).into())
        }
    }
}

fn run_diff(
    config: &QuillConfig,
    file: Option<&Path>,
    max_chars: Option<usize>,
    extra_ignores: Vec<String>,
    json: bool,
) -> Result<()> {
    let raw = read_diff_input(file)?;
    let mut patterns = config.diff.ignore_patterns.clone();
    patterns.extend(extra_ignores);
    let filter = IgnoreFilter::new(&patterns)?;
    let budget = max_chars.unwrap_or(config.diff.max_chars);
    if budget == 0 {
        miette::bail!("--max-chars must be greater than zero");
    }

    let processed = quill_difflens::process(&raw, &filter, budget);
    if json {
        println!(
            "{}",
            serde_json::to_string_pretty(&processed).into_diagnostic()?
        );
        return Ok(());
    }

    print!("{}", processed.text);
    let report = &processed.report;
    eprintln!(
        "{} section(s), {} ignored, {} omitted; {} -> {} chars{}",
        report.total_sections,
        report.ignored.len(),
        report.omitted_sections,
        report.input_chars,
        report.output_chars,
        if processed.was_truncated {
            " (truncated)"
        } else {
            ""
        }
    );
    for skipped in &report.ignored {
        eprintln!("  ignored {} (matched {})", skipped.path, skipped.pattern);
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    miette::set_hook(Box::new(|_| {
        Box::new(
            miette::MietteHandlerOpts::new()
                .terminal_links(true)
                .build(),
        )
    }))
    .expect("miette handler");
    human_panic::setup_panic!();

    let cli = Cli::parse();
    init_tracing(cli.verbose);

    match cli.command {
        Command::Run { pr, only } => {
            let config = load_config(cli.config.as_deref())?;
            run_pipeline(config, &pr, only).await?;
        }
        Command::Diff {
            file,
            max_chars,
            ignore,
            json,
        } => {
            let config = load_config(cli.config.as_deref())?;
            run_diff(&config, file.as_deref(), max_chars, ignore, json)?;
        }
        Command::Init => {
            let path = Path::new(CONFIG_FILE);
            if path.exists() {
                miette::bail!("{CONFIG_FILE} already exists");
            }
            std::fs::write(path, DEFAULT_CONFIG).into_diagnostic()?;
            println!("Created {CONFIG_FILE} with default configuration");
        }
        Command::Completions { shell } => {
            let mut cmd = Cli::command();
            clap_complete::generate(shell, &mut cmd, "quill", &mut std::io::stdout());
        }
    }

    Ok(())
}
