use serde::{Deserialize, Serialize};

use promptloop_store::{InteractionRecord, LedgerEntry};

use crate::config::validate_queries;
use crate::outcome::CycleOutcome;
use crate::{CycleConfig, LoopError, Prompt, ScoreHistory};

/// Where a session stands between driver calls.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CyclePhase {
    AwaitingQueries { collected: usize, required: usize },
    ReadyToEvaluate,
    Done,
}

/// All state of one training run.
///
/// The driver holds this value between calls and hands it back to the
/// controller for every step; it serializes to the checkpoint file as-is.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrainingSession {
    config: CycleConfig,
    pending_queries_per_cycle: Option<usize>,
    cycle: usize,
    current_prompt: Prompt,
    previous_prompt: Option<Prompt>,
    scores: ScoreHistory,
    cycle_log: Vec<InteractionRecord>,
    accepted_interactions: Vec<InteractionRecord>,
    accepted_entries: Vec<LedgerEntry>,
    total_interactions: usize,
    /// Accepted outcome already written to the ledger, awaiting the cycle reset
    #[serde(default)]
    decided: Option<CycleOutcome>,
    done: bool,
}

impl TrainingSession {
    pub fn new(config: CycleConfig, initial_prompt: impl Into<String>) -> Self {
        Self {
            config,
            pending_queries_per_cycle: None,
            cycle: 1,
            current_prompt: Prompt::initial(initial_prompt),
            previous_prompt: None,
            scores: ScoreHistory::new(),
            cycle_log: Vec::new(),
            accepted_interactions: Vec::new(),
            accepted_entries: Vec::new(),
            total_interactions: 0,
            decided: None,
            done: false,
        }
    }

    pub fn config(&self) -> &CycleConfig {
        &self.config
    }

    /// 1-based index of the cycle in progress
    pub fn cycle(&self) -> usize {
        self.cycle
    }

    pub fn current_prompt(&self) -> &Prompt {
        &self.current_prompt
    }

    pub fn previous_prompt(&self) -> Option<&Prompt> {
        self.previous_prompt.as_ref()
    }

    pub fn scores(&self) -> &ScoreHistory {
        &self.scores
    }

    pub fn cycle_log(&self) -> &[InteractionRecord] {
        &self.cycle_log
    }

    /// Records of every accepted cycle, in order
    pub fn accepted_interactions(&self) -> &[InteractionRecord] {
        &self.accepted_interactions
    }

    /// Ledger entries appended during this run
    pub fn accepted_entries(&self) -> &[LedgerEntry] {
        &self.accepted_entries
    }

    pub fn total_interactions(&self) -> usize {
        self.total_interactions
    }

    pub fn collected(&self) -> usize {
        self.cycle_log.len()
    }

    pub fn required(&self) -> usize {
        self.config.queries_per_cycle()
    }

    pub fn is_cycle_complete(&self) -> bool {
        !self.done && self.collected() >= self.required()
    }

    pub fn is_done(&self) -> bool {
        self.done
    }

    pub fn phase(&self) -> CyclePhase {
        if self.done {
            CyclePhase::Done
        } else if self.is_cycle_complete() {
            CyclePhase::ReadyToEvaluate
        } else {
            CyclePhase::AwaitingQueries {
                collected: self.collected(),
                required: self.required(),
            }
        }
    }

    /// Change the number of queries per cycle from the next cycle on.
    pub fn set_queries_per_cycle(&mut self, queries_per_cycle: usize) -> Result<(), LoopError> {
        validate_queries(queries_per_cycle)?;
        self.pending_queries_per_cycle = Some(queries_per_cycle);
        Ok(())
    }

    pub fn pending_queries_per_cycle(&self) -> Option<usize> {
        self.pending_queries_per_cycle
    }

    /// The decision of a cycle whose ledger write succeeded but whose
    /// boundary reset did not
    pub fn decided_outcome(&self) -> Option<&CycleOutcome> {
        self.decided.as_ref()
    }

    pub(crate) fn set_decided_outcome(&mut self, outcome: CycleOutcome) {
        self.decided = Some(outcome);
    }

    pub(crate) fn record_interaction(&mut self, record: InteractionRecord) {
        self.cycle_log.push(record);
        self.total_interactions += 1;
    }

    /// Replace the in-memory cycle log with what the durable log holds.
    pub(crate) fn reconcile_cycle_log(&mut self, mut durable: Vec<InteractionRecord>) {
        durable.truncate(self.required());
        let before = self.cycle_log.len();
        self.total_interactions = (self.total_interactions + durable.len()).saturating_sub(before);
        self.cycle_log = durable;
    }

    pub(crate) fn accept(&mut self, score: promptloop_critic::Score, entry: LedgerEntry) {
        self.scores.push(score);
        let next = Prompt::accepted(entry.new_prompt.clone(), self.cycle);
        self.previous_prompt = Some(std::mem::replace(&mut self.current_prompt, next));
        self.accepted_interactions.append(&mut self.cycle_log);
        self.accepted_entries.push(entry);
    }

    pub(crate) fn backtrack(&mut self) {
        if let Some(previous) = &self.previous_prompt {
            self.current_prompt = previous.clone();
        }
    }

    /// Clear the cycle log and move to the next cycle, or finish.
    pub(crate) fn next_cycle(&mut self) {
        self.cycle_log.clear();
        self.decided = None;
        if let Some(queries) = self.pending_queries_per_cycle.take() {
            self.config.set_queries_per_cycle(queries);
        }
        if self.cycle >= self.config.total_cycles() {
            self.done = true;
        } else {
            self.cycle += 1;
        }
    }
}
