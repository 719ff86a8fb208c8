use std::io::{BufRead, IsTerminal};

use anyhow::{Context, Result};
use colored::Colorize;
use dialoguer::Input;

use promptloop_agent::{create_agent, AgentConfig};
use promptloop_critic::{Collaborator, GenerationCollaborator, RoleKind, DEFAULT_SYSTEM_PROMPT};
use promptloop_store::PromptLedger;

use crate::config::{ProjectConfig, RoleSettings};
use crate::{state_dir, working_dir, ChatArgs};

const EXIT_COMMANDS: &[&str] = &["/exit", "/quit", "exit", "quit"];

/// Chat with the responder under the trained prompt.
///
/// Without a terminal every stdin line is answered in turn.
pub async fn handle_chat(args: ChatArgs) -> Result<()> {
    let working_dir = working_dir()?;
    let project = ProjectConfig::load(&working_dir)?.unwrap_or_default();
    let settings = RoleSettings::resolve(
        RoleKind::Responder,
        args.agent.map(Into::into),
        args.model.as_deref(),
        &project,
    )?;

    let prompt = match args.prompt {
        Some(prompt) => prompt,
        None => {
            let ledger = PromptLedger::in_dir(&state_dir(args.state_dir.as_deref(), &working_dir));
            match ledger.latest()? {
                Some(entry) => entry.new_prompt,
                None => {
                    eprintln!(
                        "{}",
                        "No trained prompt found, using the built-in prompt.".dimmed()
                    );
                    DEFAULT_SYSTEM_PROMPT.to_string()
                }
            }
        }
    };

    let agent = create_agent(settings.agent);
    if !agent.is_available().await {
        anyhow::bail!(
            "Agent '{}' is not available. Make sure it's installed and in PATH.",
            agent.name()
        );
    }

    let mut config = AgentConfig::new(working_dir);
    if let Some(model) = settings.model {
        config = config.with_model(model);
    }
    let responder = Collaborator::new(RoleKind::Responder, agent.as_ref(), config);

    if !std::io::stdin().is_terminal() {
        for line in std::io::stdin().lock().lines() {
            let line = line.context("Failed to read stdin")?;
            let query = line.trim();
            if query.is_empty() {
                continue;
            }
            let reply = responder.respond(&prompt, query).await?;
            println!("{}", reply);
        }
        return Ok(());
    }

    eprintln!(
        "{} {}",
        "Chatting with".bold(),
        format!("{} ({} to leave)", agent.name(), EXIT_COMMANDS[0]).dimmed()
    );
    loop {
        let query: String = Input::new()
            .with_prompt("You")
            .interact_text()
            .context("Failed to read message")?;
        let query = query.trim();
        if EXIT_COMMANDS.contains(&query) {
            break;
        }

        match responder.respond(&prompt, query).await {
            Ok(reply) => {
                println!("{} {}", "Agent:".bright_cyan().bold(), reply);
                println!();
            }
            Err(e) => eprintln!("{} {}", "✗".bright_red(), e),
        }
    }

    Ok(())
}
