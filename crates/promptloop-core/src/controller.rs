use std::sync::Arc;
use tracing::{debug, info, warn};

use promptloop_critic::{EvaluationCollaborator, GenerationCollaborator, RewriteCollaborator};
use promptloop_logging::{LogEvent, Logger};
use promptloop_store::{InteractionLog, InteractionRecord, LedgerEntry, PromptLedger, ReadState};

use crate::outcome::{CycleAdvance, CycleOutcome, CycleStatus, TrainingSummary};
use crate::{CycleConfig, LoopError, TrainingSession};

/// Sequences query collection, evaluation, rewriting and the
/// accept/backtrack decision for a [`TrainingSession`].
///
/// The controller owns no run state. Each step takes the session by mutable
/// reference and either completes or returns an error with the session left
/// as it was, so the driver can retry the step or stop. The one exception is
/// an accepted cycle whose ledger entry was written before the interaction
/// log reset failed: the session keeps that decision and the retry only
/// finishes the cycle.
pub struct CycleController<'a> {
    generator: &'a dyn GenerationCollaborator,
    evaluator: &'a dyn EvaluationCollaborator,
    rewriter: &'a dyn RewriteCollaborator,
    interactions: InteractionLog,
    ledger: PromptLedger,
    logger: Option<Arc<Logger>>,
}

impl<'a> CycleController<'a> {
    pub fn new(
        generator: &'a dyn GenerationCollaborator,
        evaluator: &'a dyn EvaluationCollaborator,
        rewriter: &'a dyn RewriteCollaborator,
        interactions: InteractionLog,
        ledger: PromptLedger,
    ) -> Self {
        Self {
            generator,
            evaluator,
            rewriter,
            interactions,
            ledger,
            logger: None,
        }
    }

    pub fn with_logger(mut self, logger: Arc<Logger>) -> Self {
        self.logger = Some(logger);
        self
    }

    pub fn interactions(&self) -> &InteractionLog {
        &self.interactions
    }

    pub fn ledger(&self) -> &PromptLedger {
        &self.ledger
    }

    fn emit(&self, event: LogEvent) {
        if let Some(logger) = &self.logger {
            logger.log(&event);
        }
    }

    fn emit_cycle_started(&self, session: &TrainingSession) {
        self.emit(LogEvent::CycleStarted {
            cycle: session.cycle(),
            total_cycles: session.config().total_cycles(),
            prompt_preview: session.current_prompt().preview(),
        });
    }

    /// Begin a fresh run. The durable interaction log is emptied.
    pub fn start(
        &self,
        config: CycleConfig,
        initial_prompt: impl Into<String>,
    ) -> Result<TrainingSession, LoopError> {
        let initial_prompt = initial_prompt.into();
        if initial_prompt.trim().is_empty() {
            return Err(LoopError::Configuration(
                "initial prompt must not be empty".into(),
            ));
        }

        self.interactions.reset()?;
        let session = TrainingSession::new(config, initial_prompt);

        info!(
            total_cycles = session.config().total_cycles(),
            queries_per_cycle = session.required(),
            "Training run started"
        );
        self.emit_cycle_started(&session);
        Ok(session)
    }

    /// Continue a checkpointed run.
    ///
    /// The cycle log is rebuilt from the durable interaction log, which is
    /// authoritative for how many queries the current cycle has collected.
    pub fn resume(&self, mut session: TrainingSession) -> Result<TrainingSession, LoopError> {
        if session.is_done() {
            return Err(LoopError::InvalidState(
                "the checkpointed run has already finished".into(),
            ));
        }

        let read = self.interactions.read()?;
        if read.state == ReadState::Corrupt {
            warn!("Interaction log is corrupt, resuming the cycle with no queries");
        }
        let checkpointed = session.collected();
        session.reconcile_cycle_log(read.records);

        info!(
            cycle = session.cycle(),
            checkpointed,
            collected = session.collected(),
            "Resumed training run"
        );
        self.emit_cycle_started(&session);
        Ok(session)
    }

    /// Answer one query under the current prompt and record it.
    pub async fn submit_query(
        &self,
        session: &mut TrainingSession,
        query: &str,
    ) -> Result<InteractionRecord, LoopError> {
        if session.is_done() {
            return Err(LoopError::InvalidState("training is finished".into()));
        }
        if session.is_cycle_complete() {
            return Err(LoopError::InvalidState(format!(
                "cycle {} already has {} queries; advance the cycle first",
                session.cycle(),
                session.required()
            )));
        }

        debug!(cycle = session.cycle(), "Generating response");
        let response = self
            .generator
            .respond(session.current_prompt().text(), query)
            .await?;

        let record = InteractionRecord::new(query, response);
        self.interactions.append(&record)?;
        session.record_interaction(record.clone());

        self.emit(LogEvent::QueryAnswered {
            cycle: session.cycle(),
            collected: session.collected(),
            required: session.required(),
            query: record.query.clone(),
            response: record.response.clone(),
        });
        Ok(record)
    }

    pub fn is_cycle_complete(&self, session: &TrainingSession) -> bool {
        session.is_cycle_complete()
    }

    /// Evaluate the finished cycle, accept or backtrack, and move on.
    pub async fn advance_cycle(
        &self,
        session: &mut TrainingSession,
    ) -> Result<CycleAdvance, LoopError> {
        if session.is_done() {
            return Err(LoopError::InvalidState("training is finished".into()));
        }
        if !session.is_cycle_complete() {
            return Err(LoopError::CycleIncomplete {
                collected: session.collected(),
                required: session.required(),
            });
        }

        let cycle = session.cycle();
        let outcome = match session.decided_outcome() {
            Some(decided) => {
                debug!(cycle, "Ledger already holds this cycle's entry, finishing the cycle");
                decided.clone()
            }
            None => self.decide(session).await?,
        };

        if let Err(e) = self.interactions.reset() {
            // The ledger entry is durable; a retry must not write it twice
            if outcome.ledger_entry.is_some() {
                session.set_decided_outcome(outcome);
            }
            return Err(e.into());
        }

        let mut next = session.clone();
        match &outcome.ledger_entry {
            Some(entry) => next.accept(outcome.score, entry.clone()),
            None => next.backtrack(),
        }
        next.next_cycle();
        *session = next;
        let score = outcome.score;

        match &outcome.status {
            CycleStatus::Backtracked { from, .. } => self.emit(LogEvent::CycleBacktracked {
                cycle,
                score: score.value(),
                previous_score: from.value(),
                status: outcome.status_text(),
            }),
            _ => self.emit(LogEvent::CycleAccepted {
                cycle,
                score: score.value(),
                status: outcome.status_text(),
            }),
        }

        if session.is_done() {
            let summary = TrainingSummary::from_session(session);
            info!(
                cycles = summary.cycles_completed,
                retained = summary.score_history.len(),
                "Training finished"
            );
            return Ok(CycleAdvance::Done {
                last: outcome,
                summary,
            });
        }

        self.emit_cycle_started(session);
        Ok(CycleAdvance::Continue(outcome))
    }

    /// Evaluate the cycle log and settle accept or backtrack. An accepted
    /// rewrite is appended to the ledger before this returns.
    async fn decide(&self, session: &TrainingSession) -> Result<CycleOutcome, LoopError> {
        let cycle = session.cycle();
        let transcript = self.interactions.transcript()?;

        self.emit(LogEvent::EvaluationStarted {
            cycle,
            interactions: session.collected(),
        });
        let evaluation = self
            .evaluator
            .evaluate(
                &transcript,
                session.config().rubric(),
                session.config().custom_criteria(),
            )
            .await?;
        self.emit(LogEvent::EvaluationCompleted {
            cycle,
            score: evaluation.score.value(),
            instructions: evaluation.improvement_instructions.clone(),
        });

        let score = evaluation.score;
        let status = match session.scores().last() {
            Some(previous) if score < previous => {
                info!(cycle, %score, %previous, "Cycle backtracked");
                return Ok(CycleOutcome {
                    cycle,
                    score,
                    status: CycleStatus::Backtracked {
                        from: previous,
                        to: score,
                    },
                    improvement_instructions: evaluation.improvement_instructions,
                    ledger_entry: None,
                });
            }
            Some(previous) if score == previous => CycleStatus::Unchanged { score },
            Some(previous) => CycleStatus::Improved {
                from: previous,
                to: score,
            },
            None => CycleStatus::FirstMeasurement { score },
        };

        let rewrite = self
            .rewriter
            .rewrite(
                session.current_prompt().text(),
                &evaluation.improvement_instructions,
            )
            .await?;
        self.emit(LogEvent::PromptRewritten {
            cycle,
            improvements: rewrite.improvements.clone(),
        });

        let entry = LedgerEntry::new(rewrite.new_prompt, rewrite.improvements);
        self.ledger.append(&entry)?;
        info!(cycle, %score, "Cycle accepted");
        Ok(CycleOutcome {
            cycle,
            score,
            status,
            improvement_instructions: evaluation.improvement_instructions,
            ledger_entry: Some(entry),
        })
    }

    /// Final prompt, scores and ledger of a session, finished or not
    pub fn summary(&self, session: &TrainingSession) -> TrainingSummary {
        TrainingSummary::from_session(session)
    }
}
