//! Interactive initialization for promptloop.
//!
//! Writes a `promptloop.toml` in the working directory with user-selected
//! defaults.

use anyhow::{Context, Result};
use colored::Colorize;
use dialoguer::{Input, Select};
use std::fs;

use promptloop_agent::{create_agent, AgentType};
use promptloop_core::{DEFAULT_CYCLES, DEFAULT_QUERIES_PER_CYCLE};

use crate::config::CONFIG_FILE_NAME;
use crate::working_dir;

/// Agent info for display and config
struct AgentInfo {
    display_name: &'static str,
    config_name: &'static str,
    agent_type: AgentType,
}

const AGENTS: &[AgentInfo] = &[
    AgentInfo {
        display_name: "Claude Code",
        config_name: "claude",
        agent_type: AgentType::ClaudeCode,
    },
    AgentInfo {
        display_name: "Opencode",
        config_name: "opencode",
        agent_type: AgentType::OpenCode,
    },
];

pub async fn handle_init() -> Result<()> {
    eprintln!("{}", "Setting up promptloop...".bold());
    eprintln!();

    // Step 1: Detect available agents
    eprintln!("{}", "Checking for available agents...".dimmed());

    let mut available: Vec<&AgentInfo> = Vec::new();

    for info in AGENTS {
        let agent = create_agent(info.agent_type);
        if agent.is_available().await {
            eprintln!(
                "  {} {} ({})",
                "✓".bright_green(),
                info.display_name,
                info.config_name
            );
            available.push(info);
        } else {
            eprintln!("  {} {} (not found)", "✗".dimmed(), info.display_name);
        }
    }

    eprintln!();

    if available.is_empty() {
        eprintln!(
            "{} No agents found in PATH. Install at least one:",
            "⚠".bright_yellow()
        );
        eprintln!("  Claude Code: https://docs.anthropic.com/claude-code");
        eprintln!("  Opencode:    https://opencode.ai/docs/#install");
        eprintln!();
        eprintln!(
            "After installing, run {} again.",
            "promptloop init".bright_cyan()
        );
        return Ok(());
    }

    // Step 2: Pick default agent
    let selection = if available.len() == 1 {
        eprintln!(
            "Using {} as your default agent (only one available).",
            available[0].display_name.bright_cyan()
        );
        0
    } else {
        let items: Vec<&str> = available.iter().map(|a| a.display_name).collect();
        Select::new()
            .with_prompt("Select your default agent")
            .items(&items)
            .default(0)
            .interact()?
    };

    let agent_info = available[selection];

    // Step 3: Training defaults
    let cycles: usize = Input::new()
        .with_prompt("Training cycles")
        .default(DEFAULT_CYCLES)
        .validate_with(|n: &usize| if *n >= 1 { Ok(()) } else { Err("must be at least 1") })
        .interact_text()?;
    let queries_per_cycle: usize = Input::new()
        .with_prompt("Queries per cycle")
        .default(DEFAULT_QUERIES_PER_CYCLE)
        .validate_with(|n: &usize| if *n >= 1 { Ok(()) } else { Err("must be at least 1") })
        .interact_text()?;

    let config_path = working_dir()?.join(CONFIG_FILE_NAME);
    let config_content = render_config(agent_info.config_name, cycles, queries_per_cycle);

    // Check if config already exists
    if config_path.exists() {
        eprintln!(
            "{} Config already exists at {}",
            "⚠".bright_yellow(),
            config_path.display()
        );

        let overwrite = Select::new()
            .with_prompt("Overwrite existing config?")
            .items(&["No, keep existing", "Yes, replace it"])
            .default(0)
            .interact()?;

        if overwrite == 0 {
            eprintln!();
            eprintln!("Keeping existing config. Edit it manually if needed:");
            eprintln!("  {}", config_path.display().to_string().dimmed());
            return Ok(());
        }
    }

    fs::write(&config_path, &config_content)
        .with_context(|| format!("Failed to write {}", config_path.display()))?;

    eprintln!();
    eprintln!(
        "{} Config saved to {}",
        "✓".bright_green(),
        config_path.display()
    );

    // Step 4: Quick-start tips
    print_getting_started();

    Ok(())
}

fn render_config(agent: &str, cycles: usize, queries_per_cycle: usize) -> String {
    format!(
        r#"agent = "{agent}"
# model = ""  # Optional: set a default model

# Override per-role:
# [responder]
# model = "sonnet"

# [evaluator]
# model = "opus"

# [rewriter]
# agent = "claude"

[training]
cycles = {cycles}
queries_per_cycle = {queries_per_cycle}
# criteria = "Always confirm the order number before answering"
"#
    )
}

/// Print the getting started guide
pub fn print_getting_started() {
    eprintln!();
    eprintln!("{}", "Getting started:".bold());
    eprintln!(
        "  {} Write your starting system prompt to a file (or use the built-in one)",
        "1.".dimmed()
    );
    eprintln!(
        "  {} Run: {}",
        "2.".dimmed(),
        "promptloop --prompt-file prompt.md".bright_cyan()
    );
    eprintln!(
        "  {} Review accepted prompts: {}",
        "3.".dimmed(),
        "promptloop ledger".bright_cyan()
    );
    eprintln!(
        "  {} Try the result: {}",
        "4.".dimmed(),
        "promptloop chat".bright_cyan()
    );
}
