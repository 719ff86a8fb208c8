use colored::Colorize;
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

/// Role of the agent producing output
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AgentRole {
    Responder,
    Evaluator,
    Rewriter,
}

/// Type of output stream
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StreamType {
    Stdout,
    Stderr,
}

/// Structured log events for the training loop
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum LogEvent {
    RunStarted {
        state_dir: PathBuf,
        agent: String,
        total_cycles: usize,
        queries_per_cycle: usize,
    },
    CycleStarted {
        cycle: usize,
        total_cycles: usize,
        prompt_preview: String,
    },
    QueryAnswered {
        cycle: usize,
        collected: usize,
        required: usize,
        query: String,
        response: String,
    },
    /// Streaming output line from an agent
    AgentStreamLine {
        cycle: usize,
        role: AgentRole,
        stream: StreamType,
        line: String,
    },
    EvaluationStarted {
        cycle: usize,
        interactions: usize,
    },
    EvaluationCompleted {
        cycle: usize,
        score: u8,
        instructions: Vec<String>,
    },
    PromptRewritten {
        cycle: usize,
        improvements: Vec<String>,
    },
    CycleAccepted {
        cycle: usize,
        score: u8,
        status: String,
    },
    CycleBacktracked {
        cycle: usize,
        score: u8,
        previous_score: u8,
        status: String,
    },
    RunCompleted {
        cycles: usize,
        final_score: Option<u8>,
        best_score: Option<u8>,
        duration_secs: f64,
    },
    ErrorEncountered {
        cycle: usize,
        error: String,
    },
}

impl LogEvent {
    /// Add a timestamp to serialize with the event
    fn with_timestamp(&self) -> serde_json::Value {
        let mut value = serde_json::to_value(self).unwrap_or_default();
        if let Some(obj) = value.as_object_mut() {
            obj.insert(
                "timestamp".to_string(),
                serde_json::Value::String(chrono::Utc::now().to_rfc3339()),
            );
        }
        value
    }
}

/// Log output format
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum LogFormat {
    /// Human-readable format with colors and visual structure
    #[default]
    Pretty,
    /// JSON lines format for machine consumption
    Json,
    /// Compact single-line format
    Compact,
}

impl std::str::FromStr for LogFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "pretty" => Ok(LogFormat::Pretty),
            "json" => Ok(LogFormat::Json),
            "compact" => Ok(LogFormat::Compact),
            _ => Err(format!("Unknown log format: {}", s)),
        }
    }
}

const RULE_WIDTH: usize = 69;

/// Logger for training events - handles both console output and file logging
pub struct Logger {
    format: LogFormat,
    file_writer: Option<Mutex<File>>,
}

impl Logger {
    pub fn new(format: LogFormat) -> Self {
        Self {
            format,
            file_writer: None,
        }
    }

    /// Create a logger with file output in addition to console
    pub fn with_file(format: LogFormat, log_path: &Path) -> std::io::Result<Self> {
        if let Some(parent) = log_path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let file = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(log_path)?;

        Ok(Self {
            format,
            file_writer: Some(Mutex::new(file)),
        })
    }

    pub fn format(&self) -> LogFormat {
        self.format
    }

    pub fn log(&self, event: &LogEvent) {
        // File output is always JSON
        if let Some(ref writer) = self.file_writer {
            if let Ok(mut file) = writer.lock() {
                let json = event.with_timestamp();
                let _ = writeln!(file, "{}", json);
            }
        }

        match self.format {
            LogFormat::Json => self.log_json(event),
            LogFormat::Pretty => self.log_pretty(event),
            LogFormat::Compact => self.log_compact(event),
        }
    }

    fn log_json(&self, event: &LogEvent) {
        if let Ok(json) = serde_json::to_string(event) {
            let _ = writeln!(std::io::stderr(), "{}", json);
        }
    }

    fn log_pretty(&self, event: &LogEvent) {
        let mut stderr = std::io::stderr();
        match event {
            LogEvent::RunStarted {
                state_dir,
                agent,
                total_cycles,
                queries_per_cycle,
            } => {
                let _ = writeln!(stderr);
                let _ = writeln!(
                    stderr,
                    "{}",
                    format!("╭{}╮", "─".repeat(RULE_WIDTH)).bright_blue()
                );
                let _ = writeln!(
                    stderr,
                    "{}  {}{}",
                    "│".bright_blue(),
                    "promptloop".bold().bright_white(),
                    " ".repeat(57) + &"│".bright_blue().to_string()
                );
                let plan = format!(
                    "{} cycles x {} queries, agent {}",
                    total_cycles, queries_per_cycle, agent
                );
                let _ = writeln!(
                    stderr,
                    "{}  {} {}",
                    "│".bright_blue(),
                    "Plan:".dimmed(),
                    Self::truncate_with_padding(&plan, 60, 62).dimmed()
                );
                let _ = writeln!(
                    stderr,
                    "{}  {} {}",
                    "│".bright_blue(),
                    "State:".dimmed(),
                    Self::truncate_with_padding(&state_dir.display().to_string(), 59, 61)
                        .dimmed()
                );
                let _ = writeln!(
                    stderr,
                    "{}",
                    format!("╰{}╯", "─".repeat(RULE_WIDTH)).bright_blue()
                );
                let _ = writeln!(stderr);
            }
            LogEvent::CycleStarted {
                cycle,
                total_cycles,
                prompt_preview,
            } => {
                let cycle_text = format!("─ Cycle {}/{} ", cycle, total_cycles);
                let padding = "─".repeat(RULE_WIDTH.saturating_sub(cycle_text.chars().count()));
                let _ = writeln!(
                    stderr,
                    "{}{}{}",
                    "┌".bright_blue(),
                    cycle_text.bright_blue().bold(),
                    padding.bright_blue()
                );
                let _ = writeln!(
                    stderr,
                    "  {} {}",
                    "Prompt:".dimmed(),
                    Self::truncate(prompt_preview, 60).dimmed()
                );
                let _ = writeln!(stderr);
            }
            LogEvent::QueryAnswered {
                collected,
                required,
                query,
                response,
                ..
            } => {
                let _ = writeln!(
                    stderr,
                    "  {} {} {}",
                    "▶".bright_cyan(),
                    format!("QUERY {}/{}", collected, required).bright_cyan().bold(),
                    Self::truncate(query, 56)
                );
                for line in response.lines() {
                    let _ = writeln!(stderr, "    {} {}", "│".dimmed(), line);
                }
                let _ = writeln!(stderr);
            }
            LogEvent::AgentStreamLine { line, stream, .. } => {
                let prefix = "    │".dimmed();
                let styled_line = match stream {
                    StreamType::Stdout => line.normal(),
                    StreamType::Stderr => line.dimmed(),
                };
                let _ = writeln!(stderr, "{} {}", prefix, styled_line);
            }
            LogEvent::EvaluationStarted { interactions, .. } => {
                let _ = writeln!(
                    stderr,
                    "  {} {} {}",
                    "▶".bright_magenta(),
                    "EVALUATOR".bright_magenta().bold(),
                    format!("({} interactions)", interactions).dimmed()
                );
            }
            LogEvent::EvaluationCompleted {
                score,
                instructions,
                ..
            } => {
                let _ = writeln!(stderr, "    {} Score: {}", "✓".bright_green(), score);
                for instruction in instructions {
                    let _ = writeln!(stderr, "    {} {}", "•".dimmed(), instruction);
                }
                let _ = writeln!(stderr);
            }
            LogEvent::PromptRewritten { improvements, .. } => {
                let _ = writeln!(
                    stderr,
                    "  {} {}",
                    "▶".bright_yellow(),
                    "REWRITER".bright_yellow().bold()
                );
                for improvement in improvements {
                    let _ = writeln!(stderr, "    {} {}", "+".bright_green(), improvement);
                }
                let _ = writeln!(stderr);
            }
            LogEvent::CycleAccepted { status, .. } => {
                let _ = writeln!(
                    stderr,
                    "    {}",
                    format!("✓ {}", status).bright_green()
                );
                Self::close_cycle(&mut stderr);
            }
            LogEvent::CycleBacktracked { status, .. } => {
                let _ = writeln!(
                    stderr,
                    "    {}",
                    format!("↺ {}", status).bright_yellow()
                );
                Self::close_cycle(&mut stderr);
            }
            LogEvent::RunCompleted { .. } => {
                // Rendered by the binary's summary output
            }
            LogEvent::ErrorEncountered { cycle, error } => {
                let _ = writeln!(stderr);
                let _ = writeln!(
                    stderr,
                    "{} Error in cycle {}: {}",
                    "✗".bright_red(),
                    cycle,
                    error.bright_red()
                );
            }
        }
    }

    fn log_compact(&self, event: &LogEvent) {
        let mut stderr = std::io::stderr();
        let timestamp = chrono::Utc::now().format("%H:%M:%S");
        let msg = match event {
            LogEvent::RunStarted {
                total_cycles,
                queries_per_cycle,
                ..
            } => format!(
                "[{}] run:start cycles={} queries={}",
                timestamp, total_cycles, queries_per_cycle
            ),
            LogEvent::CycleStarted { cycle, .. } => {
                format!("[{}] cycle:start:{}", timestamp, cycle)
            }
            LogEvent::QueryAnswered {
                cycle,
                collected,
                required,
                ..
            } => format!(
                "[{}] query:{}:{}/{}",
                timestamp, cycle, collected, required
            ),
            LogEvent::AgentStreamLine { role, line, .. } => {
                let role_str = match role {
                    AgentRole::Responder => "R",
                    AgentRole::Evaluator => "E",
                    AgentRole::Rewriter => "W",
                };
                format!("[{}] {}:{}", timestamp, role_str, line)
            }
            LogEvent::EvaluationStarted { cycle, .. } => {
                format!("[{}] eval:start:{}", timestamp, cycle)
            }
            LogEvent::EvaluationCompleted { cycle, score, .. } => {
                format!("[{}] eval:done:{} score={}", timestamp, cycle, score)
            }
            LogEvent::PromptRewritten {
                cycle,
                improvements,
            } => format!(
                "[{}] rewrite:{} improvements={}",
                timestamp,
                cycle,
                improvements.len()
            ),
            LogEvent::CycleAccepted { cycle, score, .. } => {
                format!("[{}] cycle:accept:{} score={}", timestamp, cycle, score)
            }
            LogEvent::CycleBacktracked {
                cycle,
                score,
                previous_score,
                ..
            } => format!(
                "[{}] cycle:backtrack:{} {}<{}",
                timestamp, cycle, score, previous_score
            ),
            LogEvent::RunCompleted {
                cycles,
                duration_secs,
                ..
            } => format!("[{}] run:done:{} {:.1}s", timestamp, cycles, duration_secs),
            LogEvent::ErrorEncountered { cycle, error } => {
                format!("[{}] error:{}:{}", timestamp, cycle, error)
            }
        };
        let _ = writeln!(stderr, "{}", msg);
    }

    fn close_cycle(stderr: &mut std::io::Stderr) {
        let _ = writeln!(stderr);
        let _ = writeln!(
            stderr,
            "{}",
            format!("└{}┘", "─".repeat(RULE_WIDTH)).bright_blue()
        );
        let _ = writeln!(stderr);
    }

    /// Shorten to `max_chars` characters, ending in "..." when cut
    pub fn truncate(s: &str, max_chars: usize) -> String {
        let flat = s.replace('\n', " ");
        if flat.chars().count() <= max_chars {
            return flat;
        }
        let kept: String = flat.chars().take(max_chars.saturating_sub(3)).collect();
        format!("{}...", kept)
    }

    /// Truncate a string and pad to exact width
    fn truncate_with_padding(s: &str, max_len: usize, total_width: usize) -> String {
        let truncated = Self::truncate(s, max_len);
        let padding_needed = total_width.saturating_sub(truncated.chars().count() + 1);
        format!("{}{}│", truncated, " ".repeat(padding_needed))
    }
}
