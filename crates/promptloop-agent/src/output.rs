use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;

/// Which stream a captured line came from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputType {
    Stdout,
    Stderr,
}

/// Callback invoked for every line an agent prints while it runs
pub type OutputCallback = Arc<dyn Fn(&str, OutputType) + Send + Sync>;

/// Output captured from an agent execution
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentOutput {
    /// Combined stdout output
    pub stdout: String,
    /// Combined stderr output
    pub stderr: String,
    /// Exit code from the process
    pub exit_code: i32,
    /// Duration of execution
    #[serde(with = "duration_secs")]
    pub duration: Duration,
}

impl AgentOutput {
    pub fn new(stdout: String, stderr: String, exit_code: i32, duration: Duration) -> Self {
        Self {
            stdout,
            stderr,
            exit_code,
            duration,
        }
    }

    /// Check if the agent exited successfully
    pub fn success(&self) -> bool {
        self.exit_code == 0
    }

    /// Stdout with surrounding whitespace removed
    pub fn text(&self) -> &str {
        self.stdout.trim()
    }

    /// Count lines in stdout
    pub fn stdout_lines(&self) -> usize {
        self.stdout.lines().count()
    }
}

mod duration_secs {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        duration.as_secs_f64().serialize(serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let secs = f64::deserialize(deserializer)?;
        Ok(Duration::from_secs_f64(secs))
    }
}
