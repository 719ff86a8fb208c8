use std::path::Path;
use std::process::Stdio;
use std::time::Instant;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::{Child, Command};
use tracing::{debug, trace};

use crate::{AgentConfig, AgentError, AgentOutput, OutputCallback, OutputType};

/// Utility for spawning agent processes
pub struct ProcessSpawner;

impl ProcessSpawner {
    /// Spawn a process and capture its output
    pub async fn spawn(
        binary: &Path,
        args: &[&str],
        config: &AgentConfig,
    ) -> Result<AgentOutput, AgentError> {
        Self::spawn_with_callback(binary, args, config, None).await
    }

    /// Spawn a process, forwarding each output line to `on_output` as it arrives
    pub async fn spawn_with_callback(
        binary: &Path,
        args: &[&str],
        config: &AgentConfig,
        on_output: Option<OutputCallback>,
    ) -> Result<AgentOutput, AgentError> {
        let start = Instant::now();

        debug!(
            binary = %binary.display(),
            arg_count = args.len(),
            working_dir = %config.working_dir.display(),
            "Spawning agent process"
        );

        let mut cmd = Command::new(binary);
        cmd.args(args)
            .current_dir(&config.working_dir)
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .stdin(Stdio::null())
            .kill_on_drop(true);

        for (key, value) in &config.env_vars {
            cmd.env(key, value);
        }

        let child = cmd.spawn().map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                AgentError::NotFound(binary.display().to_string())
            } else {
                AgentError::SpawnFailed(e)
            }
        })?;

        let (stdout, stderr, exit_code) = match config.timeout {
            Some(limit) => tokio::time::timeout(limit, Self::collect(child, on_output))
                .await
                .map_err(|_| AgentError::Timeout(limit))??,
            None => Self::collect(child, on_output).await?,
        };
        let duration = start.elapsed();

        debug!(
            exit_code,
            duration_ms = duration.as_millis(),
            "Agent process completed"
        );

        Ok(AgentOutput::new(stdout, stderr, exit_code, duration))
    }

    async fn collect(
        mut child: Child,
        on_output: Option<OutputCallback>,
    ) -> Result<(String, String, i32), AgentError> {
        let stdout_handle = child
            .stdout
            .take()
            .ok_or_else(|| AgentError::ExecutionFailed("stdout not captured".into()))?;
        let stderr_handle = child
            .stderr
            .take()
            .ok_or_else(|| AgentError::ExecutionFailed("stderr not captured".into()))?;

        let mut stdout_reader = BufReader::new(stdout_handle).lines();
        let mut stderr_reader = BufReader::new(stderr_handle).lines();

        let mut stdout = String::new();
        let mut stderr = String::new();
        let mut stderr_open = true;

        let emit = |line: &str, output_type: OutputType| {
            if let Some(ref callback) = on_output {
                callback(line, output_type);
            }
        };

        loop {
            tokio::select! {
                biased;

                result = stdout_reader.next_line() => {
                    match result {
                        Ok(Some(line)) => {
                            trace!(line = %line, "stdout");
                            emit(&line, OutputType::Stdout);
                            push_line(&mut stdout, &line);
                        }
                        Ok(None) => {
                            // stdout closed, drain whatever stderr still has
                            while stderr_open {
                                match stderr_reader.next_line().await {
                                    Ok(Some(line)) => {
                                        trace!(line = %line, "stderr");
                                        emit(&line, OutputType::Stderr);
                                        push_line(&mut stderr, &line);
                                    }
                                    _ => stderr_open = false,
                                }
                            }
                            break;
                        }
                        Err(e) => {
                            return Err(AgentError::ExecutionFailed(format!(
                                "Failed to read stdout: {}",
                                e
                            )));
                        }
                    }
                }
                result = stderr_reader.next_line(), if stderr_open => {
                    match result {
                        Ok(Some(line)) => {
                            trace!(line = %line, "stderr");
                            emit(&line, OutputType::Stderr);
                            push_line(&mut stderr, &line);
                        }
                        Ok(None) => stderr_open = false,
                        Err(e) => {
                            return Err(AgentError::ExecutionFailed(format!(
                                "Failed to read stderr: {}",
                                e
                            )));
                        }
                    }
                }
            }
        }

        let status = child.wait().await?;
        Ok((stdout, stderr, status.code().unwrap_or(-1)))
    }
}

fn push_line(buffer: &mut String, line: &str) {
    if !buffer.is_empty() {
        buffer.push('\n');
    }
    buffer.push_str(line);
}
