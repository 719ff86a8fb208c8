use serde::{Deserialize, Serialize};

use promptloop_critic::DEFAULT_RUBRIC;

use crate::LoopError;

pub const DEFAULT_CYCLES: usize = 5;
pub const DEFAULT_QUERIES_PER_CYCLE: usize = 2;

/// Shape of a training run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CycleConfig {
    total_cycles: usize,
    queries_per_cycle: usize,
    custom_criteria: Option<String>,
    rubric: String,
}

impl CycleConfig {
    pub fn new(total_cycles: usize, queries_per_cycle: usize) -> Result<Self, LoopError> {
        validate_cycles(total_cycles)?;
        validate_queries(queries_per_cycle)?;
        Ok(Self {
            total_cycles,
            queries_per_cycle,
            custom_criteria: None,
            rubric: DEFAULT_RUBRIC.to_string(),
        })
    }

    /// Extra evaluation criteria; blank text means none
    pub fn with_custom_criteria(mut self, criteria: Option<String>) -> Self {
        self.custom_criteria = criteria
            .map(|c| c.trim().to_string())
            .filter(|c| !c.is_empty());
        self
    }

    pub fn with_rubric(mut self, rubric: impl Into<String>) -> Self {
        self.rubric = rubric.into();
        self
    }

    pub fn total_cycles(&self) -> usize {
        self.total_cycles
    }

    pub fn queries_per_cycle(&self) -> usize {
        self.queries_per_cycle
    }

    pub fn custom_criteria(&self) -> Option<&str> {
        self.custom_criteria.as_deref()
    }

    pub fn rubric(&self) -> &str {
        &self.rubric
    }

    pub(crate) fn set_queries_per_cycle(&mut self, queries_per_cycle: usize) {
        self.queries_per_cycle = queries_per_cycle;
    }
}

impl Default for CycleConfig {
    fn default() -> Self {
        Self {
            total_cycles: DEFAULT_CYCLES,
            queries_per_cycle: DEFAULT_QUERIES_PER_CYCLE,
            custom_criteria: None,
            rubric: DEFAULT_RUBRIC.to_string(),
        }
    }
}

fn validate_cycles(total_cycles: usize) -> Result<(), LoopError> {
    if total_cycles == 0 {
        return Err(LoopError::Configuration(
            "total cycles must be at least 1".into(),
        ));
    }
    Ok(())
}

pub(crate) fn validate_queries(queries_per_cycle: usize) -> Result<(), LoopError> {
    if queries_per_cycle == 0 {
        return Err(LoopError::Configuration(
            "queries per cycle must be at least 1".into(),
        ));
    }
    Ok(())
}
