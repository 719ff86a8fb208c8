use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use anyhow::{Context, Result};
use tracing::warn;

use promptloop_agent::{create_agent, Agent, AgentConfig, AgentType, OutputCallback, OutputType};
use promptloop_core::{CycleConfig, CycleController, TrainingSession};
use promptloop_critic::{Collaborator, RoleKind};
use promptloop_logging::{AgentRole, LogEvent, LogFormat, Logger, RunWriter, StreamType};
use promptloop_store::{CheckpointFile, InteractionLog, PromptLedger};

use crate::config::{ProjectConfig, RoleSettings, TrainingSettings};
use crate::driver::{Driver, QuerySource};
use crate::output::{print_dry_run, print_outcome};
use crate::{initial_prompt, state_dir, working_dir, AgentArgs, TrainArgs};

/// Resolved settings for the three roles
pub struct RolePlan {
    pub responder: RoleSettings,
    pub evaluator: RoleSettings,
    pub rewriter: RoleSettings,
}

impl RolePlan {
    pub fn resolve(args: &AgentArgs, project: &ProjectConfig) -> Result<Self> {
        let global: Option<AgentType> = args.agent.map(Into::into);
        let model = args.model.as_deref();
        let pick = |role: RoleKind, specific: Option<crate::AgentChoice>| {
            RoleSettings::resolve(role, specific.map(Into::into).or(global), model, project)
        };
        Ok(Self {
            responder: pick(RoleKind::Responder, args.responder_agent)?,
            evaluator: pick(RoleKind::Evaluator, args.evaluator_agent)?,
            rewriter: pick(RoleKind::Rewriter, args.rewriter_agent)?,
        })
    }
}

pub async fn handle_train(args: TrainArgs, log_format: LogFormat) -> Result<i32> {
    let working_dir = working_dir()?;
    let state_dir = state_dir(args.state_dir.as_deref(), &working_dir);
    let project = ProjectConfig::load(&working_dir)?.unwrap_or_default();

    let training = TrainingSettings::resolve(
        args.cycles,
        args.queries_per_cycle,
        args.criteria.as_deref(),
        &project,
    );
    let roles = RolePlan::resolve(&args.agents, &project)?;
    let prompt = initial_prompt(&args.prompt, &working_dir)?;

    let config = CycleConfig::new(training.cycles, training.queries_per_cycle)?
        .with_custom_criteria(training.criteria.clone());

    if args.dry_run {
        print_dry_run(&prompt, &state_dir, &config, &roles, args.resume);
        return Ok(0);
    }

    let responder_agent = create_agent(roles.responder.agent);
    let evaluator_agent = create_agent(roles.evaluator.agent);
    let rewriter_agent = create_agent(roles.rewriter.agent);

    for agent in [&responder_agent, &evaluator_agent, &rewriter_agent] {
        ensure_available(&**agent).await?;
    }

    let logger = Arc::new(match &args.log_file {
        Some(path) => Logger::with_file(log_format, path)
            .with_context(|| format!("Failed to open log file {}", path.display()))?,
        None => Logger::new(log_format),
    });

    let current_cycle = Arc::new(AtomicUsize::new(1));
    let agent_config = |settings: &RoleSettings| {
        let config = AgentConfig::new(working_dir.clone());
        match &settings.model {
            Some(model) => config.with_model(model.clone()),
            None => config,
        }
    };

    let responder = Collaborator::new(
        RoleKind::Responder,
        responder_agent.as_ref(),
        agent_config(&roles.responder),
    );
    let mut evaluator = Collaborator::new(
        RoleKind::Evaluator,
        evaluator_agent.as_ref(),
        agent_config(&roles.evaluator),
    );
    let mut rewriter = Collaborator::new(
        RoleKind::Rewriter,
        rewriter_agent.as_ref(),
        agent_config(&roles.rewriter),
    );
    if args.stream {
        evaluator = evaluator.with_output(create_output_callback(
            &logger,
            &current_cycle,
            AgentRole::Evaluator,
        ));
        rewriter = rewriter.with_output(create_output_callback(
            &logger,
            &current_cycle,
            AgentRole::Rewriter,
        ));
    }

    let controller = CycleController::new(
        &responder,
        &evaluator,
        &rewriter,
        InteractionLog::in_dir(&state_dir),
        PromptLedger::in_dir(&state_dir),
    )
    .with_logger(logger.clone());

    let checkpoint = CheckpointFile::in_dir(&state_dir);
    let session = if args.resume {
        let saved: TrainingSession = checkpoint
            .load()?
            .with_context(|| format!("No checkpoint found at {}", checkpoint.path().display()))?;
        controller.resume(saved)?
    } else {
        controller.start(config, prompt)?
    };

    let run_prompt = session.current_prompt().text().to_string();
    let run_writer = match RunWriter::new(&run_prompt) {
        Ok(writer) => Some(writer),
        Err(e) => {
            warn!(error = %e, "Failed to create run file");
            None
        }
    };
    if let Some(writer) = &run_writer {
        writer.write_start(
            &run_prompt,
            &state_dir,
            responder_agent.name(),
            evaluator_agent.name(),
            rewriter_agent.name(),
            session.config().total_cycles(),
            session.config().queries_per_cycle(),
            session.config().custom_criteria(),
        );
    }

    logger.log(&LogEvent::RunStarted {
        state_dir: state_dir.clone(),
        agent: responder_agent.name().to_string(),
        total_cycles: session.config().total_cycles(),
        queries_per_cycle: session.config().queries_per_cycle(),
    });

    // Handle Ctrl+C gracefully
    let interrupted = Arc::new(AtomicBool::new(false));
    let interrupt_handle = interrupted.clone();
    ctrlc::set_handler(move || {
        eprintln!("\nInterrupted. Stopping after the current step...");
        interrupt_handle.store(true, Ordering::SeqCst);
    })
    .context("Failed to set Ctrl+C handler")?;

    let mut driver = Driver {
        controller: &controller,
        source: QuerySource::detect(args.queries_file.as_deref())?,
        checkpoint: &checkpoint,
        logger: logger.clone(),
        run_writer: run_writer.as_ref(),
        interrupted,
        current_cycle,
    };
    let outcome = driver.run(session).await?;

    let summary = outcome.summary();
    logger.log(&LogEvent::RunCompleted {
        cycles: summary.cycles_completed,
        final_score: summary.final_score.map(|s| s.value()),
        best_score: summary.best_score.map(|s| s.value()),
        duration_secs: outcome.duration_secs(),
    });
    if let Some(writer) = &run_writer {
        writer.write_end(
            outcome.label(),
            summary.cycles_completed,
            &summary.score_history.values(),
            &summary.final_prompt,
            outcome.duration_secs(),
        );
    }

    if args.json_output {
        println!("{}", serde_json::to_string_pretty(&outcome)?);
    } else {
        print_outcome(&outcome, &checkpoint);
    }

    Ok(outcome.exit_code())
}

async fn ensure_available(agent: &dyn Agent) -> Result<()> {
    if !agent.is_available().await {
        anyhow::bail!(
            "Agent '{}' is not available. Make sure it's installed and in PATH.",
            agent.name()
        );
    }
    Ok(())
}

/// Create an output callback for streaming agent output
fn create_output_callback(
    logger: &Arc<Logger>,
    current_cycle: &Arc<AtomicUsize>,
    role: AgentRole,
) -> OutputCallback {
    let logger = logger.clone();
    let current_cycle = current_cycle.clone();
    Arc::new(move |line: &str, output_type: OutputType| {
        let stream = match output_type {
            OutputType::Stdout => StreamType::Stdout,
            OutputType::Stderr => StreamType::Stderr,
        };
        logger.log(&LogEvent::AgentStreamLine {
            cycle: current_cycle.load(Ordering::SeqCst),
            role,
            stream,
            line: line.to_string(),
        });
    })
}
