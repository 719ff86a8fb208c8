//! Drives a [`TrainingSession`] to completion one step at a time.

use std::io::IsTerminal;
use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Instant;

use anyhow::{Context, Result};
use dialoguer::{Confirm, Input};
use tracing::warn;

use promptloop_core::{
    CycleAdvance, CycleController, CyclePhase, LoopError, RunOutcome, TrainingSession,
    TrainingSummary,
};
use promptloop_logging::{CycleRecord, LogEvent, Logger, RunWriter};
use promptloop_store::CheckpointFile;

/// Typed at the query prompt to stop and keep the run resumable
pub const STOP_COMMAND: &str = "/stop";

/// Where the queries for each cycle come from.
#[derive(Debug)]
pub enum QuerySource {
    /// Ask on the terminal
    Interactive,
    /// Lines of a file, reused from the top once exhausted
    Scripted { queries: Vec<String>, next: usize },
    /// Fixed placeholder text, for runs without a terminal or a file
    Placeholder,
}

impl QuerySource {
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read queries file {}", path.display()))?;
        Self::scripted(&content)
            .with_context(|| format!("Queries file {} has no queries", path.display()))
    }

    /// One query per non-blank line
    pub fn scripted(content: &str) -> Option<Self> {
        let queries: Vec<String> = content
            .lines()
            .map(str::trim)
            .filter(|l| !l.is_empty())
            .map(String::from)
            .collect();
        (!queries.is_empty()).then_some(QuerySource::Scripted { queries, next: 0 })
    }

    /// Pick a source: a file if given, else the terminal, else placeholders.
    pub fn detect(queries_file: Option<&Path>) -> Result<Self> {
        match queries_file {
            Some(path) => Self::from_file(path),
            None if std::io::stdin().is_terminal() => Ok(QuerySource::Interactive),
            None => Ok(QuerySource::Placeholder),
        }
    }

    pub fn is_interactive(&self) -> bool {
        matches!(self, QuerySource::Interactive)
    }

    /// The next query, or `None` when the user asked to stop.
    pub fn next_query(
        &mut self,
        cycle: usize,
        total_cycles: usize,
        index: usize,
        required: usize,
    ) -> Result<Option<String>> {
        match self {
            QuerySource::Interactive => {
                let query: String = Input::new()
                    .with_prompt(format!(
                        "Cycle {}/{} query {}/{} ({} to stop)",
                        cycle, total_cycles, index, required, STOP_COMMAND
                    ))
                    .interact_text()
                    .context("Failed to read query")?;
                let query = query.trim().to_string();
                Ok((query != STOP_COMMAND).then_some(query))
            }
            QuerySource::Scripted { queries, next } => {
                let query = queries[*next % queries.len()].clone();
                *next += 1;
                Ok(Some(query))
            }
            QuerySource::Placeholder => {
                Ok(Some(format!("Default query {} for cycle {}", index, cycle)))
            }
        }
    }
}

/// Everything the step loop needs besides the session itself.
pub struct Driver<'a> {
    pub controller: &'a CycleController<'a>,
    pub source: QuerySource,
    pub checkpoint: &'a CheckpointFile,
    pub logger: Arc<Logger>,
    pub run_writer: Option<&'a RunWriter>,
    pub interrupted: Arc<AtomicBool>,
    /// Cycle in progress, read by the streaming output callbacks
    pub current_cycle: Arc<AtomicUsize>,
}

impl Driver<'_> {
    /// Run steps until the session is done, the user stops, or a step fails
    /// and is not retried. The checkpoint is saved after every completed step.
    pub async fn run(&mut self, mut session: TrainingSession) -> Result<RunOutcome> {
        let started = Instant::now();

        loop {
            if self.interrupted.load(Ordering::SeqCst) {
                return Ok(RunOutcome::interrupted(&session, started.elapsed()));
            }
            self.current_cycle.store(session.cycle(), Ordering::SeqCst);

            let step = match session.phase() {
                CyclePhase::Done => {
                    let summary = TrainingSummary::from_session(&session);
                    return Ok(RunOutcome::completed(summary, started.elapsed()));
                }
                CyclePhase::AwaitingQueries {
                    collected,
                    required,
                } => {
                    let query = match self.source.next_query(
                        session.cycle(),
                        session.config().total_cycles(),
                        collected + 1,
                        required,
                    ) {
                        Ok(query) => query,
                        // Ctrl+C while the terminal prompt is open
                        Err(_) if self.interrupted.load(Ordering::SeqCst) => None,
                        Err(e) => return Err(e),
                    };
                    let Some(query) = query else {
                        return Ok(RunOutcome::interrupted(&session, started.elapsed()));
                    };
                    self.controller
                        .submit_query(&mut session, &query)
                        .await
                        .map(|_| ())
                }
                CyclePhase::ReadyToEvaluate => self.advance(&mut session).await,
            };

            match step {
                Ok(()) => self.save(&session),
                Err(e) => {
                    self.logger.log(&LogEvent::ErrorEncountered {
                        cycle: session.cycle(),
                        error: e.to_string(),
                    });
                    // Keeps a decision already written to the ledger resumable
                    self.save(&session);
                    // Ctrl+C kills a running agent, so its error is really an interrupt
                    if self.interrupted.load(Ordering::SeqCst) {
                        return Ok(RunOutcome::interrupted(&session, started.elapsed()));
                    }
                    if !self.should_retry(&e)? {
                        return Ok(RunOutcome::failed(&session, e.to_string(), started.elapsed()));
                    }
                }
            }
        }
    }

    async fn advance(&self, session: &mut TrainingSession) -> Result<(), LoopError> {
        let prompt = session.current_prompt().text().to_string();
        let interactions = session.collected();

        let advance = self.controller.advance_cycle(session).await?;
        let outcome = advance.outcome();

        if let Some(writer) = self.run_writer {
            writer.write_cycle(&CycleRecord {
                cycle: outcome.cycle,
                prompt: &prompt,
                interactions,
                score: outcome.score.value(),
                improvement_instructions: &outcome.improvement_instructions,
                accepted: outcome.accepted(),
                new_prompt: outcome.ledger_entry.as_ref().map(|e| e.new_prompt.as_str()),
                status: &outcome.status_text(),
            });
        }

        if let CycleAdvance::Done { .. } = advance {
            if let Err(e) = self.checkpoint.clear() {
                warn!(error = %e, "Failed to remove checkpoint");
            }
        }
        Ok(())
    }

    fn save(&self, session: &TrainingSession) {
        if session.is_done() {
            return;
        }
        if let Err(e) = self.checkpoint.save(session) {
            warn!(error = %e, "Failed to save checkpoint");
        }
    }

    fn should_retry(&self, error: &LoopError) -> Result<bool> {
        if !error.is_retryable() || !self.source.is_interactive() {
            return Ok(false);
        }
        Confirm::new()
            .with_prompt("Retry this step?")
            .default(true)
            .interact()
            .context("Failed to read answer")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use promptloop_core::CycleConfig;
    use promptloop_critic::{
        EvaluationCollaborator, EvaluationError, EvaluationResult, GenerationCollaborator,
        GenerationError, RewriteCollaborator, RewriteError, RewriteResult,
    };
    use promptloop_logging::LogFormat;
    use promptloop_store::{InteractionLog, PromptLedger};
    use tempfile::TempDir;

    /// Behaves like an agent killed by Ctrl+C: the flag is set and the call fails.
    struct KilledGenerator {
        interrupted: Arc<AtomicBool>,
    }

    #[async_trait]
    impl GenerationCollaborator for KilledGenerator {
        async fn respond(&self, _prompt: &str, _query: &str) -> Result<String, GenerationError> {
            self.interrupted.store(true, Ordering::SeqCst);
            Err(GenerationError::AgentFailed("terminated by signal".into()))
        }
    }

    struct UnusedCritic;

    #[async_trait]
    impl EvaluationCollaborator for UnusedCritic {
        async fn evaluate(
            &self,
            _transcript: &str,
            _rubric: &str,
            _custom_criteria: Option<&str>,
        ) -> Result<EvaluationResult, EvaluationError> {
            Err(EvaluationError::AgentFailed("not expected".into()))
        }
    }

    #[async_trait]
    impl RewriteCollaborator for UnusedCritic {
        async fn rewrite(
            &self,
            _old_prompt: &str,
            _improvement_instructions: &[String],
        ) -> Result<RewriteResult, RewriteError> {
            Err(RewriteError::AgentFailed("not expected".into()))
        }
    }

    #[tokio::test]
    async fn test_interrupt_during_agent_call_is_an_interruption() {
        let dir = TempDir::new().unwrap();
        let interrupted = Arc::new(AtomicBool::new(false));
        let generator = KilledGenerator {
            interrupted: interrupted.clone(),
        };
        let critic = UnusedCritic;
        let controller = CycleController::new(
            &generator,
            &critic,
            &critic,
            InteractionLog::in_dir(dir.path()),
            PromptLedger::in_dir(dir.path()),
        );
        let session = controller
            .start(CycleConfig::new(2, 1).unwrap(), "P0")
            .unwrap();
        let checkpoint = CheckpointFile::in_dir(dir.path());

        let mut driver = Driver {
            controller: &controller,
            source: QuerySource::Placeholder,
            checkpoint: &checkpoint,
            logger: Arc::new(Logger::new(LogFormat::Compact)),
            run_writer: None,
            interrupted,
            current_cycle: Arc::new(AtomicUsize::new(1)),
        };
        let outcome = driver.run(session).await.unwrap();

        assert!(matches!(
            outcome,
            RunOutcome::Interrupted {
                cycle: 1,
                collected: 0,
                ..
            }
        ));
        assert_eq!(outcome.exit_code(), 130);
        assert!(checkpoint.exists());
    }

    #[test]
    fn test_scripted_queries_wrap_around() {
        let mut source = QuerySource::scripted("first\n\n  second  \n").unwrap();
        assert_eq!(source.next_query(1, 2, 1, 2).unwrap().as_deref(), Some("first"));
        assert_eq!(source.next_query(1, 2, 2, 2).unwrap().as_deref(), Some("second"));
        assert_eq!(source.next_query(2, 2, 1, 2).unwrap().as_deref(), Some("first"));
    }

    #[test]
    fn test_blank_queries_file_is_rejected() {
        assert!(QuerySource::scripted(" \n\n").is_none());
    }

    #[test]
    fn test_placeholder_queries() {
        let mut source = QuerySource::Placeholder;
        assert_eq!(
            source.next_query(3, 5, 2, 2).unwrap().as_deref(),
            Some("Default query 2 for cycle 3")
        );
        assert!(!source.is_interactive());
    }
}
