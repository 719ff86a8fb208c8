use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand, ValueEnum};

use promptloop_agent::AgentType;
use promptloop_critic::DEFAULT_SYSTEM_PROMPT;
use promptloop_logging::{init_tracing, LogFormat};

mod chat;
mod config;
mod driver;
mod init;
mod ledger;
mod output;
mod train;

#[derive(Parser, Debug)]
#[command(
    name = "promptloop",
    about = "Self-improving system prompt trainer",
    version,
    author,
    args_conflicts_with_subcommands = true
)]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,

    #[command(flatten)]
    train: TrainArgs,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run training cycles (the default)
    Train(TrainArgs),

    /// Talk to the agent under the trained prompt
    Chat(ChatArgs),

    /// Show the history of accepted prompts
    Ledger(LedgerArgs),

    /// Write a promptloop.toml for this directory
    Init,
}

#[derive(Args, Debug, Clone)]
pub struct TrainArgs {
    /// Number of training cycles (default: 5)
    #[arg(short = 'c', long)]
    pub cycles: Option<usize>,

    /// Queries answered per cycle before evaluation (default: 2)
    #[arg(short = 'q', long)]
    pub queries_per_cycle: Option<usize>,

    /// Extra evaluation criteria appended to the rubric
    #[arg(long)]
    pub criteria: Option<String>,

    #[command(flatten)]
    pub prompt: PromptArgs,

    #[command(flatten)]
    pub agents: AgentArgs,

    /// Directory holding interactions.json, new_prompt.json and session.json
    #[arg(short = 'd', long)]
    pub state_dir: Option<PathBuf>,

    /// File with one query per line, used instead of asking interactively
    #[arg(long)]
    pub queries_file: Option<PathBuf>,

    /// Log output format
    #[arg(long, value_enum, default_value = "pretty")]
    pub log_format: LogFormatChoice,

    /// Also write log events as JSON lines to this file
    #[arg(long)]
    pub log_file: Option<PathBuf>,

    /// Stream evaluator and rewriter output while they run
    #[arg(long)]
    pub stream: bool,

    /// Output final result as JSON
    #[arg(long)]
    pub json_output: bool,

    /// Continue the run checkpointed in the state directory
    #[arg(long)]
    pub resume: bool,

    /// Dry run: show what would happen without executing
    #[arg(long)]
    pub dry_run: bool,
}

#[derive(Args, Debug, Clone)]
pub struct PromptArgs {
    /// Initial system prompt (default: built-in customer support prompt)
    #[arg(short, long)]
    pub prompt: Option<String>,

    /// Read the initial system prompt from a file
    #[arg(long, conflicts_with = "prompt")]
    pub prompt_file: Option<PathBuf>,
}

#[derive(Args, Debug, Clone)]
pub struct AgentArgs {
    /// Agent to use for every role
    #[arg(short, long, value_enum)]
    pub agent: Option<AgentChoice>,

    /// Agent for the responder role
    #[arg(long, value_enum)]
    pub responder_agent: Option<AgentChoice>,

    /// Agent for the evaluator role
    #[arg(long, value_enum)]
    pub evaluator_agent: Option<AgentChoice>,

    /// Agent for the rewriter role
    #[arg(long, value_enum)]
    pub rewriter_agent: Option<AgentChoice>,

    /// Model to use (if agent supports it)
    #[arg(short, long)]
    pub model: Option<String>,
}

#[derive(Args, Debug)]
pub struct ChatArgs {
    /// System prompt to chat under (default: latest ledger entry)
    #[arg(short, long)]
    pub prompt: Option<String>,

    /// Agent to answer with
    #[arg(short, long, value_enum)]
    pub agent: Option<AgentChoice>,

    /// Model to use (if agent supports it)
    #[arg(short, long)]
    pub model: Option<String>,

    /// Directory holding new_prompt.json
    #[arg(short = 'd', long)]
    pub state_dir: Option<PathBuf>,
}

#[derive(Args, Debug)]
pub struct LedgerArgs {
    /// Directory holding new_prompt.json
    #[arg(short = 'd', long)]
    pub state_dir: Option<PathBuf>,

    /// Only show the most recent entry
    #[arg(long)]
    pub latest: bool,

    /// Output as JSON
    #[arg(long)]
    pub json: bool,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum AgentChoice {
    Claude,
    Opencode,
}

impl From<AgentChoice> for AgentType {
    fn from(choice: AgentChoice) -> Self {
        match choice {
            AgentChoice::Claude => AgentType::ClaudeCode,
            AgentChoice::Opencode => AgentType::OpenCode,
        }
    }
}

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum LogFormatChoice {
    Pretty,
    Json,
    Compact,
}

impl From<LogFormatChoice> for LogFormat {
    fn from(choice: LogFormatChoice) -> Self {
        match choice {
            LogFormatChoice::Pretty => LogFormat::Pretty,
            LogFormatChoice::Json => LogFormat::Json,
            LogFormatChoice::Compact => LogFormat::Compact,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let code = match cli.command {
        Some(Command::Init) => {
            init_tracing("warn", LogFormat::Pretty);
            init::handle_init().await?;
            0
        }
        Some(Command::Ledger(args)) => {
            init_tracing("warn", LogFormat::Pretty);
            ledger::handle_ledger(args)?;
            0
        }
        Some(Command::Chat(args)) => {
            init_tracing("warn", LogFormat::Pretty);
            chat::handle_chat(args).await?;
            0
        }
        Some(Command::Train(args)) => run_train(args).await?,
        None => run_train(cli.train).await?,
    };

    std::process::exit(code);
}

async fn run_train(args: TrainArgs) -> Result<i32> {
    let format: LogFormat = args.log_format.into();
    init_tracing("warn", format);
    train::handle_train(args, format).await
}

/// Working directory for config lookup
pub fn working_dir() -> Result<PathBuf> {
    std::env::current_dir().context("Failed to get current directory")
}

/// State directory: the flag if given, else the working directory
pub fn state_dir(flag: Option<&Path>, working_dir: &Path) -> PathBuf {
    match flag {
        Some(dir) if dir.is_absolute() => dir.to_path_buf(),
        Some(dir) => working_dir.join(dir),
        None => working_dir.to_path_buf(),
    }
}

/// Initial prompt: `--prompt`, then `--prompt-file`, then the built-in prompt
pub fn initial_prompt(args: &PromptArgs, working_dir: &Path) -> Result<String> {
    if let Some(ref prompt) = args.prompt {
        return Ok(prompt.clone());
    }

    let Some(ref prompt_file) = args.prompt_file else {
        return Ok(DEFAULT_SYSTEM_PROMPT.to_string());
    };

    let prompt_path = if prompt_file.is_absolute() {
        prompt_file.clone()
    } else {
        working_dir.join(prompt_file)
    };

    let content = std::fs::read_to_string(&prompt_path)
        .with_context(|| format!("Failed to read prompt file {}", prompt_path.display()))?;
    let content = content.trim();
    if content.is_empty() {
        anyhow::bail!("Prompt file {} is empty", prompt_path.display());
    }
    Ok(content.to_string())
}
