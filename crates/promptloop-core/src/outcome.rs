use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

use promptloop_critic::Score;
use promptloop_store::{InteractionRecord, LedgerEntry};

use crate::{ScoreHistory, TrainingSession};

/// How a cycle's score compared with the last retained one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum CycleStatus {
    FirstMeasurement { score: Score },
    Improved { from: Score, to: Score },
    /// A tie; accepted like an improvement
    Unchanged { score: Score },
    Backtracked { from: Score, to: Score },
}

impl CycleStatus {
    pub fn is_accepted(&self) -> bool {
        !matches!(self, CycleStatus::Backtracked { .. })
    }
}

impl fmt::Display for CycleStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CycleStatus::FirstMeasurement { score } => {
                write!(f, "score is {} (first measurement)", score)
            }
            CycleStatus::Improved { from, to } => {
                write!(f, "score improved from {} to {}", from, to)
            }
            CycleStatus::Unchanged { score } => write!(f, "score unchanged at {}", score),
            CycleStatus::Backtracked { from, to } => write!(
                f,
                "backtracked: score dropped from {} to {}, reverted to prior prompt",
                from, to
            ),
        }
    }
}

/// Result of one evaluated cycle.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CycleOutcome {
    pub cycle: usize,
    pub score: Score,
    pub status: CycleStatus,
    pub improvement_instructions: Vec<String>,
    /// Present only when the cycle was accepted
    pub ledger_entry: Option<LedgerEntry>,
}

impl CycleOutcome {
    pub fn accepted(&self) -> bool {
        self.status.is_accepted()
    }

    pub fn status_text(&self) -> String {
        self.status.to_string()
    }
}

/// What `advance_cycle` leads to.
#[derive(Debug, Clone)]
pub enum CycleAdvance {
    /// More cycles remain; the session awaits queries again
    Continue(CycleOutcome),
    /// The last cycle was evaluated
    Done {
        last: CycleOutcome,
        summary: TrainingSummary,
    },
}

impl CycleAdvance {
    pub fn outcome(&self) -> &CycleOutcome {
        match self {
            CycleAdvance::Continue(outcome) => outcome,
            CycleAdvance::Done { last, .. } => last,
        }
    }

    pub fn is_done(&self) -> bool {
        matches!(self, CycleAdvance::Done { .. })
    }
}

/// Everything a finished run produced.
#[derive(Debug, Clone, Serialize)]
pub struct TrainingSummary {
    pub cycles_completed: usize,
    pub final_prompt: String,
    pub score_history: ScoreHistory,
    pub ledger: Vec<LedgerEntry>,
    pub accepted_interactions: Vec<InteractionRecord>,
    pub total_interactions: usize,
    pub total_improvements: usize,
    pub final_score: Option<Score>,
    pub best_score: Option<Score>,
    pub improvement: Option<i16>,
}

impl TrainingSummary {
    pub fn from_session(session: &TrainingSession) -> Self {
        let scores = session.scores();
        let cycles_completed = if session.is_done() {
            session.cycle()
        } else {
            session.cycle() - 1
        };
        Self {
            cycles_completed,
            final_prompt: session.current_prompt().text().to_string(),
            score_history: scores.clone(),
            ledger: session.accepted_entries().to_vec(),
            accepted_interactions: session.accepted_interactions().to_vec(),
            total_interactions: session.total_interactions(),
            total_improvements: session
                .accepted_entries()
                .iter()
                .map(|e| e.improvements.len())
                .sum(),
            final_score: scores.last(),
            best_score: scores.best(),
            improvement: scores.improvement(),
        }
    }
}

/// The final outcome of a training run
#[derive(Debug, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum RunOutcome {
    /// All cycles were evaluated
    Completed {
        summary: TrainingSummary,
        total_duration_secs: f64,
    },
    /// User requested stop (e.g., Ctrl+C); the checkpoint stays resumable
    Interrupted {
        cycle: usize,
        collected: usize,
        summary: TrainingSummary,
        total_duration_secs: f64,
    },
    /// A step failed and the driver gave up
    Failed {
        cycle: usize,
        error: String,
        summary: TrainingSummary,
        total_duration_secs: f64,
    },
}

impl RunOutcome {
    pub fn completed(summary: TrainingSummary, duration: Duration) -> Self {
        Self::Completed {
            summary,
            total_duration_secs: duration.as_secs_f64(),
        }
    }

    pub fn interrupted(session: &TrainingSession, duration: Duration) -> Self {
        Self::Interrupted {
            cycle: session.cycle(),
            collected: session.collected(),
            summary: TrainingSummary::from_session(session),
            total_duration_secs: duration.as_secs_f64(),
        }
    }

    pub fn failed(session: &TrainingSession, error: String, duration: Duration) -> Self {
        Self::Failed {
            cycle: session.cycle(),
            error,
            summary: TrainingSummary::from_session(session),
            total_duration_secs: duration.as_secs_f64(),
        }
    }

    pub fn summary(&self) -> &TrainingSummary {
        match self {
            Self::Completed { summary, .. } => summary,
            Self::Interrupted { summary, .. } => summary,
            Self::Failed { summary, .. } => summary,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Self::Completed { .. } => "completed",
            Self::Interrupted { .. } => "interrupted",
            Self::Failed { .. } => "failed",
        }
    }

    pub fn duration_secs(&self) -> f64 {
        match self {
            Self::Completed {
                total_duration_secs,
                ..
            }
            | Self::Interrupted {
                total_duration_secs,
                ..
            }
            | Self::Failed {
                total_duration_secs,
                ..
            } => *total_duration_secs,
        }
    }

    pub fn exit_code(&self) -> i32 {
        match self {
            Self::Completed { .. } => 0,
            Self::Interrupted { .. } => 130,
            Self::Failed { .. } => 2,
        }
    }
}
