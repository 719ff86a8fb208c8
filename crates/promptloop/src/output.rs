use std::path::Path;

use colored::Colorize;

use promptloop_core::{CycleConfig, RunOutcome, TrainingSummary};
use promptloop_logging::Logger;
use promptloop_store::CheckpointFile;

use crate::train::RolePlan;

pub fn print_dry_run(
    prompt: &str,
    state_dir: &Path,
    config: &CycleConfig,
    roles: &RolePlan,
    resume: bool,
) {
    println!("=== Dry Run ===");
    println!("Prompt: {}", Logger::truncate(prompt, 100));
    println!("State dir: {}", state_dir.display());
    println!("Cycles: {}", config.total_cycles());
    println!("Queries per cycle: {}", config.queries_per_cycle());
    println!(
        "Custom criteria: {}",
        config.custom_criteria().unwrap_or("none")
    );
    for (role, settings) in [
        ("Responder", &roles.responder),
        ("Evaluator", &roles.evaluator),
        ("Rewriter", &roles.rewriter),
    ] {
        println!(
            "{}: {}{}",
            role,
            settings.agent,
            settings
                .model
                .as_deref()
                .map(|m| format!(" ({})", m))
                .unwrap_or_default()
        );
    }
    if resume {
        println!("Resume: from checkpoint in state dir");
    }
}

pub fn print_outcome(outcome: &RunOutcome, checkpoint: &CheckpointFile) {
    match outcome {
        RunOutcome::Completed {
            summary,
            total_duration_secs,
        } => {
            eprintln!();
            eprintln!("{}", "=== TRAINING COMPLETE ===".bright_green().bold());
            print_summary(summary);
            eprintln!("Duration: {:.1}s", total_duration_secs);
            eprintln!();
            eprintln!("{}", "Final prompt:".bold());
            println!("{}", summary.final_prompt);
        }
        RunOutcome::Interrupted {
            cycle,
            collected,
            summary,
            total_duration_secs,
        } => {
            eprintln!();
            eprintln!("{}", "=== INTERRUPTED ===".bright_yellow().bold());
            eprintln!(
                "Stopped in cycle {} with {} queries collected",
                cycle, collected
            );
            print_summary(summary);
            eprintln!("Duration: {:.1}s", total_duration_secs);
            print_resume_hint(checkpoint);
        }
        RunOutcome::Failed {
            cycle,
            error,
            summary,
            total_duration_secs,
        } => {
            eprintln!();
            eprintln!("{}", "=== FAILED ===".bright_red().bold());
            eprintln!("Error in cycle {}: {}", cycle, error);
            print_summary(summary);
            eprintln!("Duration: {:.1}s", total_duration_secs);
            print_resume_hint(checkpoint);
        }
    }
}

fn print_summary(summary: &TrainingSummary) {
    let score = |s: Option<promptloop_critic::Score>| {
        s.map(|s| s.to_string()).unwrap_or_else(|| "-".into())
    };
    eprintln!("Cycles completed: {}", summary.cycles_completed);
    eprintln!("Final score: {}", score(summary.final_score));
    eprintln!("Best score: {}", score(summary.best_score));
    eprintln!(
        "Improvement: {}",
        summary
            .improvement
            .map(|i| format!("{:+}", i))
            .unwrap_or_else(|| "-".into())
    );
    eprintln!(
        "Score history: {}",
        summary
            .score_history
            .values()
            .iter()
            .map(|v| v.to_string())
            .collect::<Vec<_>>()
            .join(" → ")
    );
    eprintln!("Total interactions: {}", summary.total_interactions);
    eprintln!("Total improvements: {}", summary.total_improvements);
}

fn print_resume_hint(checkpoint: &CheckpointFile) {
    if checkpoint.exists() {
        eprintln!(
            "Resume with {} (checkpoint: {})",
            "promptloop --resume".bright_cyan(),
            checkpoint.path().display().to_string().dimmed()
        );
    }
}
