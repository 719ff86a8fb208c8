use async_trait::async_trait;
use std::collections::VecDeque;
use std::path::PathBuf;
use std::sync::Mutex;
use tempfile::TempDir;

use promptloop_core::{
    CycleAdvance, CycleConfig, CycleController, CyclePhase, CycleStatus, LoopError,
    TrainingSession,
};
use promptloop_critic::{
    EvaluationCollaborator, EvaluationError, EvaluationResult, GenerationCollaborator,
    GenerationError, RewriteCollaborator, RewriteError, RewriteResult, Score,
};
use promptloop_store::{InteractionLog, PromptLedger};

/// Answers every query by echoing it with the prompt it ran under.
#[derive(Default)]
struct EchoGenerator {
    prompts_seen: Mutex<Vec<String>>,
    fail: Mutex<bool>,
}

#[async_trait]
impl GenerationCollaborator for EchoGenerator {
    async fn respond(&self, prompt: &str, query: &str) -> Result<String, GenerationError> {
        if *self.fail.lock().unwrap() {
            return Err(GenerationError::AgentFailed("offline".into()));
        }
        self.prompts_seen.lock().unwrap().push(prompt.to_string());
        Ok(format!("[{}] {}", prompt, query))
    }
}

/// Returns scripted scores in order, repeating the last one.
struct ScriptedEvaluator {
    scores: Mutex<VecDeque<i64>>,
    last: Mutex<i64>,
    transcripts: Mutex<Vec<String>>,
    criteria: Mutex<Vec<Option<String>>>,
    fail_next: Mutex<bool>,
}

impl ScriptedEvaluator {
    fn new(scores: &[i64]) -> Self {
        Self {
            scores: Mutex::new(scores.iter().copied().collect()),
            last: Mutex::new(50),
            transcripts: Mutex::new(Vec::new()),
            criteria: Mutex::new(Vec::new()),
            fail_next: Mutex::new(false),
        }
    }
}

#[async_trait]
impl EvaluationCollaborator for ScriptedEvaluator {
    async fn evaluate(
        &self,
        transcript: &str,
        _rubric: &str,
        custom_criteria: Option<&str>,
    ) -> Result<EvaluationResult, EvaluationError> {
        {
            let mut fail = self.fail_next.lock().unwrap();
            if *fail {
                *fail = false;
                return Err(EvaluationError::AgentFailed("timeout".into()));
            }
        }
        self.transcripts.lock().unwrap().push(transcript.to_string());
        self.criteria
            .lock()
            .unwrap()
            .push(custom_criteria.map(String::from));

        let value = {
            let mut last = self.last.lock().unwrap();
            if let Some(next) = self.scores.lock().unwrap().pop_front() {
                *last = next;
            }
            *last
        };
        let score = Score::new(value).map_err(EvaluationError::from)?;
        Ok(EvaluationResult::new(score, vec![format!("fix {}", value)]))
    }
}

/// Produces P1, P2, ... and records what it was asked to rewrite.
#[derive(Default)]
struct CountingRewriter {
    calls: Mutex<Vec<(String, Vec<String>)>>,
    fail_next: Mutex<bool>,
    /// Replaced by a directory during the next call so the log reset fails
    block_path: Mutex<Option<PathBuf>>,
}

#[async_trait]
impl RewriteCollaborator for CountingRewriter {
    async fn rewrite(
        &self,
        old_prompt: &str,
        improvement_instructions: &[String],
    ) -> Result<RewriteResult, RewriteError> {
        {
            let mut fail = self.fail_next.lock().unwrap();
            if *fail {
                *fail = false;
                return Err(RewriteError::AgentFailed("rate limited".into()));
            }
        }
        if let Some(path) = self.block_path.lock().unwrap().take() {
            std::fs::remove_file(&path).unwrap();
            std::fs::create_dir_all(path.join("occupied")).unwrap();
        }
        let mut calls = self.calls.lock().unwrap();
        calls.push((old_prompt.to_string(), improvement_instructions.to_vec()));
        let n = calls.len();
        Ok(RewriteResult::new(
            format!("P{}", n),
            vec![format!("change {}", n)],
        ))
    }
}

struct Harness {
    dir: TempDir,
    generator: EchoGenerator,
    evaluator: ScriptedEvaluator,
    rewriter: CountingRewriter,
}

impl Harness {
    fn new(scores: &[i64]) -> Self {
        Self {
            dir: TempDir::new().unwrap(),
            generator: EchoGenerator::default(),
            evaluator: ScriptedEvaluator::new(scores),
            rewriter: CountingRewriter::default(),
        }
    }

    fn controller(&self) -> CycleController<'_> {
        CycleController::new(
            &self.generator,
            &self.evaluator,
            &self.rewriter,
            InteractionLog::in_dir(self.dir.path()),
            PromptLedger::in_dir(self.dir.path()),
        )
    }
}

async fn run_cycle(
    controller: &CycleController<'_>,
    session: &mut TrainingSession,
) -> Result<CycleAdvance, LoopError> {
    while !controller.is_cycle_complete(session) {
        let query = format!("query {}", session.collected() + 1);
        controller.submit_query(session, &query).await?;
    }
    controller.advance_cycle(session).await
}

#[tokio::test]
async fn test_accept_backtrack_accept_scenario() {
    let harness = Harness::new(&[50, 40, 60]);
    let controller = harness.controller();
    let mut session = controller
        .start(CycleConfig::new(3, 1).unwrap(), "P0")
        .unwrap();

    let first = run_cycle(&controller, &mut session).await.unwrap();
    assert!(first.outcome().accepted());
    assert_eq!(
        first.outcome().status,
        CycleStatus::FirstMeasurement {
            score: Score::new(50).unwrap()
        }
    );
    assert_eq!(session.scores().values(), vec![50]);
    assert_eq!(session.current_prompt().text(), "P1");

    let second = run_cycle(&controller, &mut session).await.unwrap();
    assert!(!second.outcome().accepted());
    assert!(second.outcome().ledger_entry.is_none());
    assert_eq!(
        second.outcome().status_text(),
        "backtracked: score dropped from 50 to 40, reverted to prior prompt"
    );
    assert_eq!(session.scores().values(), vec![50]);
    assert_eq!(session.current_prompt().text(), "P0");

    let third = run_cycle(&controller, &mut session).await.unwrap();
    assert_eq!(third.outcome().status_text(), "score improved from 50 to 60");
    assert_eq!(session.scores().values(), vec![50, 60]);

    let CycleAdvance::Done { summary, .. } = third else {
        panic!("expected the run to be done");
    };
    assert_eq!(summary.cycles_completed, 3);
    assert_eq!(summary.final_prompt, "P2");
    assert_eq!(summary.ledger.len(), 2);
    assert_eq!(summary.final_score.map(|s| s.value()), Some(60));
    assert_eq!(summary.best_score.map(|s| s.value()), Some(60));
    assert_eq!(summary.improvement, Some(10));
    assert_eq!(summary.total_interactions, 3);
    assert_eq!(summary.accepted_interactions.len(), 2);

    let ledger = controller.ledger().read_all().unwrap();
    assert_eq!(ledger.len(), 2);
    assert_eq!(ledger[0].new_prompt, "P1");
    assert_eq!(ledger[1].new_prompt, "P2");

    // The third cycle ran under the restored prompt
    let prompts = harness.generator.prompts_seen.lock().unwrap().clone();
    assert_eq!(prompts, vec!["P0", "P1", "P0"]);
    let rewrites = harness.rewriter.calls.lock().unwrap();
    assert_eq!(rewrites[1].0, "P0");
}

#[tokio::test]
async fn test_equal_scores_always_accept() {
    let harness = Harness::new(&[70]);
    let controller = harness.controller();
    let mut session = controller
        .start(CycleConfig::new(4, 2).unwrap(), "P0")
        .unwrap();

    for cycle in 1..=4 {
        let advance = run_cycle(&controller, &mut session).await.unwrap();
        assert!(advance.outcome().accepted());
        if cycle > 1 {
            assert_eq!(advance.outcome().status_text(), "score unchanged at 70");
        }
    }

    assert!(session.is_done());
    assert_eq!(session.scores().len(), 4);
    assert_eq!(controller.ledger().read_all().unwrap().len(), 4);
}

#[tokio::test]
async fn test_first_cycle_never_backtracks() {
    let harness = Harness::new(&[1]);
    let controller = harness.controller();
    let mut session = controller
        .start(CycleConfig::new(1, 1).unwrap(), "P0")
        .unwrap();

    let advance = run_cycle(&controller, &mut session).await.unwrap();
    assert!(advance.outcome().accepted());
    assert!(advance.is_done());
}

#[tokio::test]
async fn test_backtrack_restores_prompt_from_two_cycles_back() {
    let harness = Harness::new(&[60, 70, 50]);
    let controller = harness.controller();
    let mut session = controller
        .start(CycleConfig::new(3, 1).unwrap(), "P0")
        .unwrap();

    run_cycle(&controller, &mut session).await.unwrap();
    let after_first = session.current_prompt().clone();
    run_cycle(&controller, &mut session).await.unwrap();
    run_cycle(&controller, &mut session).await.unwrap();

    assert_eq!(session.current_prompt(), &after_first);
    assert!(session.scores().len() < 3);
    assert_eq!(controller.ledger().read_all().unwrap().len(), 2);
}

#[tokio::test]
async fn test_consecutive_backtracks_restore_same_prompt() {
    let harness = Harness::new(&[50, 40, 30]);
    let controller = harness.controller();
    let mut session = controller
        .start(CycleConfig::new(3, 1).unwrap(), "P0")
        .unwrap();

    run_cycle(&controller, &mut session).await.unwrap();
    run_cycle(&controller, &mut session).await.unwrap();
    assert_eq!(session.current_prompt().text(), "P0");
    run_cycle(&controller, &mut session).await.unwrap();
    assert_eq!(session.current_prompt().text(), "P0");
    assert_eq!(session.scores().values(), vec![50]);
}

#[tokio::test]
async fn test_interaction_log_is_empty_after_cycle_boundary() {
    let harness = Harness::new(&[50, 55]);
    let controller = harness.controller();
    let mut session = controller
        .start(CycleConfig::new(2, 2).unwrap(), "P0")
        .unwrap();

    controller.submit_query(&mut session, "a").await.unwrap();
    controller.submit_query(&mut session, "b").await.unwrap();
    assert_eq!(controller.interactions().read_all().unwrap().len(), 2);

    controller.advance_cycle(&mut session).await.unwrap();
    assert!(controller.interactions().read_all().unwrap().is_empty());
    assert!(session.cycle_log().is_empty());
    assert_eq!(session.cycle(), 2);

    let transcripts = harness.evaluator.transcripts.lock().unwrap();
    assert!(transcripts[0].contains("\"user_input\": \"a\""));
    assert!(transcripts[0].contains("\"agent_output\": \"[P0] b\""));
}

#[tokio::test]
async fn test_step_order_is_enforced() {
    let harness = Harness::new(&[50]);
    let controller = harness.controller();
    let mut session = controller
        .start(CycleConfig::new(1, 2).unwrap(), "P0")
        .unwrap();

    controller.submit_query(&mut session, "a").await.unwrap();
    let early = controller.advance_cycle(&mut session).await;
    assert!(matches!(
        early,
        Err(LoopError::CycleIncomplete {
            collected: 1,
            required: 2
        })
    ));

    controller.submit_query(&mut session, "b").await.unwrap();
    let extra = controller.submit_query(&mut session, "c").await;
    assert!(matches!(extra, Err(LoopError::InvalidState(_))));
    assert_eq!(session.phase(), CyclePhase::ReadyToEvaluate);

    controller.advance_cycle(&mut session).await.unwrap();
    assert_eq!(session.phase(), CyclePhase::Done);
    assert!(matches!(
        controller.advance_cycle(&mut session).await,
        Err(LoopError::InvalidState(_))
    ));
    assert!(matches!(
        controller.submit_query(&mut session, "d").await,
        Err(LoopError::InvalidState(_))
    ));
}

#[tokio::test]
async fn test_generation_failure_records_nothing() {
    let harness = Harness::new(&[50]);
    let controller = harness.controller();
    let mut session = controller
        .start(CycleConfig::new(1, 1).unwrap(), "P0")
        .unwrap();

    *harness.generator.fail.lock().unwrap() = true;
    let result = controller.submit_query(&mut session, "a").await;
    assert!(matches!(result, Err(LoopError::Generation(_))));
    assert_eq!(session.collected(), 0);
    assert!(controller.interactions().read_all().unwrap().is_empty());
}

#[tokio::test]
async fn test_failed_evaluation_can_be_retried() {
    let harness = Harness::new(&[50]);
    let controller = harness.controller();
    let mut session = controller
        .start(CycleConfig::new(2, 1).unwrap(), "P0")
        .unwrap();
    controller.submit_query(&mut session, "a").await.unwrap();

    *harness.evaluator.fail_next.lock().unwrap() = true;
    let err = controller.advance_cycle(&mut session).await.unwrap_err();
    assert!(matches!(err, LoopError::Evaluation(_)));
    assert!(err.is_retryable());
    assert_eq!(session.cycle(), 1);
    assert_eq!(session.collected(), 1);
    assert_eq!(controller.interactions().read_all().unwrap().len(), 1);

    let advance = controller.advance_cycle(&mut session).await.unwrap();
    assert!(advance.outcome().accepted());
    assert_eq!(session.cycle(), 2);
}

#[tokio::test]
async fn test_failed_rewrite_leaves_session_and_ledger_unchanged() {
    let harness = Harness::new(&[50, 50]);
    let controller = harness.controller();
    let mut session = controller
        .start(CycleConfig::new(2, 1).unwrap(), "P0")
        .unwrap();
    controller.submit_query(&mut session, "a").await.unwrap();

    *harness.rewriter.fail_next.lock().unwrap() = true;
    let err = controller.advance_cycle(&mut session).await.unwrap_err();
    assert!(matches!(err, LoopError::Rewrite(_)));
    assert!(session.scores().is_empty());
    assert_eq!(session.current_prompt().text(), "P0");
    assert!(controller.ledger().read_all().unwrap().is_empty());

    controller.advance_cycle(&mut session).await.unwrap();
    assert_eq!(session.scores().values(), vec![50]);
    assert_eq!(controller.ledger().read_all().unwrap().len(), 1);
}

#[tokio::test]
async fn test_retry_after_failed_reset_does_not_duplicate_ledger_entry() {
    let harness = Harness::new(&[50, 60]);
    let controller = harness.controller();
    let mut session = controller
        .start(CycleConfig::new(2, 1).unwrap(), "P0")
        .unwrap();
    controller.submit_query(&mut session, "a").await.unwrap();

    let log_path = controller.interactions().path().to_path_buf();
    *harness.rewriter.block_path.lock().unwrap() = Some(log_path.clone());
    let err = controller.advance_cycle(&mut session).await.unwrap_err();
    assert!(matches!(err, LoopError::Storage(_)));
    assert!(err.is_retryable());
    assert_eq!(controller.ledger().read_all().unwrap().len(), 1);
    assert_eq!(session.cycle(), 1);
    assert!(session.scores().is_empty());
    assert!(session.decided_outcome().is_some());

    std::fs::remove_dir_all(&log_path).unwrap();
    let advance = controller.advance_cycle(&mut session).await.unwrap();
    assert_eq!(advance.outcome().status_text(), "score is 50 (first measurement)");

    assert_eq!(controller.ledger().read_all().unwrap().len(), 1);
    assert_eq!(harness.evaluator.transcripts.lock().unwrap().len(), 1);
    assert_eq!(harness.rewriter.calls.lock().unwrap().len(), 1);
    assert_eq!(session.cycle(), 2);
    assert_eq!(session.scores().values(), vec![50]);
    assert_eq!(session.current_prompt().text(), "P1");
    assert!(session.decided_outcome().is_none());
    assert!(controller.interactions().read_all().unwrap().is_empty());
}

#[tokio::test]
async fn test_out_of_range_score_is_evaluation_error() {
    let harness = Harness::new(&[0]);
    let controller = harness.controller();
    let mut session = controller
        .start(CycleConfig::new(1, 1).unwrap(), "P0")
        .unwrap();
    controller.submit_query(&mut session, "a").await.unwrap();

    let err = controller.advance_cycle(&mut session).await.unwrap_err();
    assert!(matches!(
        err,
        LoopError::Evaluation(EvaluationError::ScoreOutOfRange(0))
    ));
    assert!(session.scores().is_empty());
}

#[tokio::test]
async fn test_queries_per_cycle_change_applies_next_cycle() {
    let harness = Harness::new(&[50, 60]);
    let controller = harness.controller();
    let mut session = controller
        .start(CycleConfig::new(2, 1).unwrap(), "P0")
        .unwrap();

    session.set_queries_per_cycle(3).unwrap();
    controller.submit_query(&mut session, "a").await.unwrap();
    assert!(controller.is_cycle_complete(&session));

    controller.advance_cycle(&mut session).await.unwrap();
    assert_eq!(session.required(), 3);
    controller.submit_query(&mut session, "b").await.unwrap();
    assert!(!controller.is_cycle_complete(&session));
}

#[tokio::test]
async fn test_custom_criteria_reach_evaluator() {
    let harness = Harness::new(&[50]);
    let controller = harness.controller();
    let config = CycleConfig::new(1, 1)
        .unwrap()
        .with_custom_criteria(Some("Offer a refund".into()));
    let mut session = controller.start(config, "P0").unwrap();

    run_cycle(&controller, &mut session).await.unwrap();
    let criteria = harness.evaluator.criteria.lock().unwrap();
    assert_eq!(criteria[0].as_deref(), Some("Offer a refund"));
}

#[tokio::test]
async fn test_corrupt_log_is_evaluated_as_empty() {
    let harness = Harness::new(&[50]);
    let controller = harness.controller();
    let mut session = controller
        .start(CycleConfig::new(1, 1).unwrap(), "P0")
        .unwrap();
    controller.submit_query(&mut session, "a").await.unwrap();

    std::fs::write(controller.interactions().path(), "{ not json").unwrap();
    controller.advance_cycle(&mut session).await.unwrap();

    let transcripts = harness.evaluator.transcripts.lock().unwrap();
    assert_eq!(transcripts[0], "[]");
}

#[tokio::test]
async fn test_start_resets_log_and_rejects_blank_prompt() {
    let harness = Harness::new(&[50]);
    std::fs::write(
        harness.dir.path().join("interactions.json"),
        r#"[{"user_input": "old", "agent_output": "stale"}]"#,
    )
    .unwrap();
    let controller = harness.controller();

    assert!(matches!(
        controller.start(CycleConfig::new(1, 1).unwrap(), "   "),
        Err(LoopError::Configuration(_))
    ));

    controller
        .start(CycleConfig::new(1, 1).unwrap(), "P0")
        .unwrap();
    assert!(controller.interactions().read_all().unwrap().is_empty());
}

#[tokio::test]
async fn test_resume_uses_durable_interaction_count() {
    let harness = Harness::new(&[50, 60]);
    let controller = harness.controller();
    let mut session = controller
        .start(CycleConfig::new(2, 3).unwrap(), "P0")
        .unwrap();
    controller.submit_query(&mut session, "a").await.unwrap();
    let checkpoint = serde_json::to_string(&session).unwrap();

    // A second answer reached the durable log after the checkpoint was taken
    controller.submit_query(&mut session, "b").await.unwrap();

    let restored: TrainingSession = serde_json::from_str(&checkpoint).unwrap();
    assert_eq!(restored.collected(), 1);
    let mut resumed = controller.resume(restored).unwrap();
    assert_eq!(resumed.collected(), 2);
    assert_eq!(resumed.cycle_log()[1].query, "b");

    controller.submit_query(&mut resumed, "c").await.unwrap();
    let advance = controller.advance_cycle(&mut resumed).await.unwrap();
    assert!(advance.outcome().accepted());
}

#[tokio::test]
async fn test_resume_finished_session_is_rejected() {
    let harness = Harness::new(&[50]);
    let controller = harness.controller();
    let mut session = controller
        .start(CycleConfig::new(1, 1).unwrap(), "P0")
        .unwrap();
    run_cycle(&controller, &mut session).await.unwrap();

    assert!(matches!(
        controller.resume(session),
        Err(LoopError::InvalidState(_))
    ));
}
