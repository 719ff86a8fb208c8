use std::fs::{self, File};
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use serde::Serialize;
use sha2::{Digest, Sha256};

/// Each line type in a run's JSONL file.
#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RunLine {
    RunStart {
        timestamp: DateTime<Utc>,
        initial_prompt: String,
        state_dir: PathBuf,
        responder_agent: String,
        evaluator_agent: String,
        rewriter_agent: String,
        total_cycles: usize,
        queries_per_cycle: usize,
        custom_criteria: Option<String>,
    },
    Cycle {
        cycle: usize,
        prompt: String,
        interactions: usize,
        score: u8,
        improvement_instructions: Vec<String>,
        accepted: bool,
        new_prompt: Option<String>,
        status: String,
        timestamp: DateTime<Utc>,
    },
    RunEnd {
        outcome: String,
        cycles: usize,
        score_history: Vec<u8>,
        final_prompt: String,
        duration_secs: f64,
        timestamp: DateTime<Utc>,
    },
}

/// What one cycle produced, as recorded in the run file.
#[derive(Debug, Clone)]
pub struct CycleRecord<'a> {
    pub cycle: usize,
    pub prompt: &'a str,
    pub interactions: usize,
    pub score: u8,
    pub improvement_instructions: &'a [String],
    pub accepted: bool,
    pub new_prompt: Option<&'a str>,
    pub status: &'a str,
}

/// Writes one training run as JSONL to a file in ~/.local/share/promptloop/runs/.
pub struct RunWriter {
    file: Mutex<BufWriter<File>>,
    path: PathBuf,
}

impl RunWriter {
    /// Create a writer under the user's data directory. The file name is the
    /// current UTC timestamp plus a short hash of the initial prompt.
    pub fn new(initial_prompt: &str) -> io::Result<Self> {
        Self::in_dir(&Self::runs_dir()?, initial_prompt)
    }

    pub fn in_dir(dir: &Path, initial_prompt: &str) -> io::Result<Self> {
        fs::create_dir_all(dir)?;

        let now = Utc::now();
        let timestamp_str = now.format("%Y-%m-%dT%H-%M-%SZ").to_string();

        let mut hasher = Sha256::new();
        hasher.update(initial_prompt.as_bytes());
        let hash = hex::encode(hasher.finalize());
        let short_hash = &hash[..6];

        let path = dir.join(format!("{}_{}.jsonl", timestamp_str, short_hash));
        let file = fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)?;

        Ok(Self {
            file: Mutex::new(BufWriter::new(file)),
            path,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    #[allow(clippy::too_many_arguments)]
    pub fn write_start(
        &self,
        initial_prompt: &str,
        state_dir: &Path,
        responder_agent: &str,
        evaluator_agent: &str,
        rewriter_agent: &str,
        total_cycles: usize,
        queries_per_cycle: usize,
        custom_criteria: Option<&str>,
    ) {
        let line = RunLine::RunStart {
            timestamp: Utc::now(),
            initial_prompt: initial_prompt.to_string(),
            state_dir: state_dir.to_path_buf(),
            responder_agent: responder_agent.to_string(),
            evaluator_agent: evaluator_agent.to_string(),
            rewriter_agent: rewriter_agent.to_string(),
            total_cycles,
            queries_per_cycle,
            custom_criteria: custom_criteria.map(String::from),
        };
        self.write_line(&line);
    }

    pub fn write_cycle(&self, record: &CycleRecord<'_>) {
        let line = RunLine::Cycle {
            cycle: record.cycle,
            prompt: record.prompt.to_string(),
            interactions: record.interactions,
            score: record.score,
            improvement_instructions: record.improvement_instructions.to_vec(),
            accepted: record.accepted,
            new_prompt: record.new_prompt.map(String::from),
            status: record.status.to_string(),
            timestamp: Utc::now(),
        };
        self.write_line(&line);
    }

    pub fn write_end(
        &self,
        outcome: &str,
        cycles: usize,
        score_history: &[u8],
        final_prompt: &str,
        duration_secs: f64,
    ) {
        let line = RunLine::RunEnd {
            outcome: outcome.to_string(),
            cycles,
            score_history: score_history.to_vec(),
            final_prompt: final_prompt.to_string(),
            duration_secs,
            timestamp: Utc::now(),
        };
        self.write_line(&line);
    }

    fn write_line(&self, line: &RunLine) {
        if let Ok(json) = serde_json::to_string(line) {
            if let Ok(mut writer) = self.file.lock() {
                let _ = writeln!(writer, "{}", json);
                let _ = writer.flush();
            }
        }
    }

    fn runs_dir() -> io::Result<PathBuf> {
        let data_dir = dirs::data_dir().ok_or_else(|| {
            io::Error::new(
                io::ErrorKind::NotFound,
                "Could not determine data directory",
            )
        })?;
        Ok(data_dir.join("promptloop").join("runs"))
    }
}
