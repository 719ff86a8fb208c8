use async_trait::async_trait;
use std::fmt;
use thiserror::Error;
use tracing::{debug, info};

use promptloop_agent::{Agent, AgentConfig, AgentError, OutputCallback};

use crate::prompts::CollabPrompts;
use crate::shape::{OutputShape, Reply, ShapeError};
use crate::{EvaluationError, EvaluationResult, RewriteError, RewriteResult};

/// Answers a user query under a candidate prompt.
#[async_trait]
pub trait GenerationCollaborator: Send + Sync {
    async fn respond(&self, prompt: &str, query: &str) -> Result<String, GenerationError>;
}

/// Scores a transcript against a rubric.
#[async_trait]
pub trait EvaluationCollaborator: Send + Sync {
    async fn evaluate(
        &self,
        transcript: &str,
        rubric: &str,
        custom_criteria: Option<&str>,
    ) -> Result<EvaluationResult, EvaluationError>;
}

/// Applies improvement instructions to a prompt.
#[async_trait]
pub trait RewriteCollaborator: Send + Sync {
    async fn rewrite(
        &self,
        old_prompt: &str,
        improvement_instructions: &[String],
    ) -> Result<RewriteResult, RewriteError>;
}

#[derive(Error, Debug)]
pub enum GenerationError {
    #[error("Responder agent failed: {0}")]
    AgentFailed(String),

    #[error("Responder output was unusable: {0}")]
    Malformed(#[from] ShapeError),
}

/// The part a collaborator plays in the loop
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RoleKind {
    Responder,
    Evaluator,
    Rewriter,
}

impl fmt::Display for RoleKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RoleKind::Responder => write!(f, "responder"),
            RoleKind::Evaluator => write!(f, "evaluator"),
            RoleKind::Rewriter => write!(f, "rewriter"),
        }
    }
}

/// Failure of a single agent invocation, before it is attributed to a role.
#[derive(Error, Debug)]
enum InvokeError {
    #[error(transparent)]
    Agent(#[from] AgentError),

    #[error("agent exited with code {code}: {stderr}")]
    Exit { code: i32, stderr: String },

    #[error(transparent)]
    Shape(#[from] ShapeError),
}

impl From<InvokeError> for GenerationError {
    fn from(error: InvokeError) -> Self {
        match error {
            InvokeError::Shape(shape) => GenerationError::Malformed(shape),
            other => GenerationError::AgentFailed(other.to_string()),
        }
    }
}

impl From<InvokeError> for EvaluationError {
    fn from(error: InvokeError) -> Self {
        match error {
            InvokeError::Shape(shape) => shape.into(),
            other => EvaluationError::AgentFailed(other.to_string()),
        }
    }
}

impl From<InvokeError> for RewriteError {
    fn from(error: InvokeError) -> Self {
        match error {
            InvokeError::Shape(shape) => RewriteError::Malformed(shape),
            other => RewriteError::AgentFailed(other.to_string()),
        }
    }
}

/// An agent bound to one role.
///
/// Every call runs the agent with role-specific instructions as its system
/// prompt and parses stdout into the role's output shape.
pub struct Collaborator<'a> {
    role: RoleKind,
    agent: &'a dyn Agent,
    config: AgentConfig,
    on_output: Option<OutputCallback>,
}

impl<'a> Collaborator<'a> {
    pub fn new(role: RoleKind, agent: &'a dyn Agent, config: AgentConfig) -> Self {
        Self {
            role,
            agent,
            config,
            on_output: None,
        }
    }

    /// Stream the agent's output lines while it runs
    pub fn with_output(mut self, on_output: OutputCallback) -> Self {
        self.on_output = Some(on_output);
        self
    }

    pub fn role(&self) -> RoleKind {
        self.role
    }

    pub fn agent_name(&self) -> &str {
        self.agent.name()
    }

    async fn invoke<T: OutputShape>(
        &self,
        instructions: &str,
        request: &str,
    ) -> Result<T, InvokeError> {
        let config = self.config.clone().with_system_prompt(instructions);

        debug!(
            role = %self.role,
            agent = self.agent.name(),
            request_len = request.len(),
            "Invoking collaborator"
        );

        let output = self
            .agent
            .execute_with_callback(request, &config, self.on_output.clone())
            .await?;

        info!(
            role = %self.role,
            exit_code = output.exit_code,
            duration_secs = output.duration.as_secs_f64(),
            "Collaborator completed"
        );

        if !output.success() {
            let stderr = output.stderr.lines().last().unwrap_or_default().to_string();
            return Err(InvokeError::Exit {
                code: output.exit_code,
                stderr,
            });
        }

        Ok(T::parse(&output.stdout)?)
    }
}

#[async_trait]
impl GenerationCollaborator for Collaborator<'_> {
    async fn respond(&self, prompt: &str, query: &str) -> Result<String, GenerationError> {
        let Reply(text) = self.invoke(prompt, query).await?;
        Ok(text)
    }
}

#[async_trait]
impl EvaluationCollaborator for Collaborator<'_> {
    async fn evaluate(
        &self,
        transcript: &str,
        rubric: &str,
        custom_criteria: Option<&str>,
    ) -> Result<EvaluationResult, EvaluationError> {
        let instructions = CollabPrompts::build_evaluator_instructions(rubric, custom_criteria);
        let request = CollabPrompts::build_evaluation_request(transcript);
        Ok(self.invoke(&instructions, &request).await?)
    }
}

#[async_trait]
impl RewriteCollaborator for Collaborator<'_> {
    async fn rewrite(
        &self,
        old_prompt: &str,
        improvement_instructions: &[String],
    ) -> Result<RewriteResult, RewriteError> {
        let request = CollabPrompts::build_rewrite_request(old_prompt, improvement_instructions);
        Ok(self
            .invoke(CollabPrompts::rewriter_instructions(), &request)
            .await?)
    }
}
