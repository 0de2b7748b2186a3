//! Execution metadata reported by the agent.
//!
//! Each provider has its own adapter from raw container output to the
//! uniform [`ExecutionMetadata`] shape. Providers that report nothing yield
//! explicit "unsupported" values rather than failing.

use crate::error::{PatchstormError, Result};
use crate::run_config::AgentProvider;
use serde::Deserialize;
use std::fmt;

/// A value the provider may or may not report.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Reported<T> {
    Value(T),
    Unsupported,
}

/// Duration and cost of one agent run.
#[derive(Debug, Clone, PartialEq)]
pub struct ExecutionMetadata {
    pub agent: AgentProvider,
    pub duration_ms: Reported<u64>,
    pub cost_usd: Reported<f64>,
}

/// The fields patchstorm needs from Claude Code's final `result` message.
#[derive(Debug, Deserialize)]
struct ClaudeResult {
    total_cost_usd: f64,
    duration_ms: u64,
}

const MAX_QUOTED_LINE: usize = 200;

impl ExecutionMetadata {
    /// Extract metadata from the agent's combined output.
    pub fn from_output(agent: AgentProvider, output: &str) -> Result<Self> {
        match agent {
            // Codex prints no usage summary.
            AgentProvider::Codex => Ok(Self {
                agent,
                duration_ms: Reported::Unsupported,
                cost_usd: Reported::Unsupported,
            }),
            AgentProvider::ClaudeCode => {
                let line = output
                    .lines()
                    .rev()
                    .map(str::trim)
                    .find(|l| !l.is_empty())
                    .ok_or_else(|| {
                        PatchstormError::AgentOutput("claude_code produced no output".to_string())
                    })?;

                let result: ClaudeResult = serde_json::from_str(line).map_err(|e| {
                    PatchstormError::AgentOutput(format!(
                        "expected a JSON result line with total_cost_usd and duration_ms ({}): {}",
                        e,
                        truncate(line)
                    ))
                })?;

                Ok(Self {
                    agent,
                    duration_ms: Reported::Value(result.duration_ms),
                    cost_usd: Reported::Value(result.total_cost_usd),
                })
            }
        }
    }

    /// Pull request body describing the run.
    pub fn pr_body(&self) -> String {
        format!(
            "This is an AI generated PR.\n\nAgent: {}\nExecution time: {}\nCost: {}",
            self.agent,
            DurationDisplay(self),
            CostDisplay(self)
        )
    }
}

struct DurationDisplay<'a>(&'a ExecutionMetadata);

impl fmt::Display for DurationDisplay<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.0.duration_ms {
            Reported::Value(ms) => write!(f, "{} ms", ms),
            Reported::Unsupported => write!(f, "unsupported ({} does not report duration)", self.0.agent),
        }
    }
}

struct CostDisplay<'a>(&'a ExecutionMetadata);

impl fmt::Display for CostDisplay<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.0.cost_usd {
            Reported::Value(usd) => write!(f, "${:.2}", usd),
            Reported::Unsupported => write!(f, "unsupported ({} does not report cost)", self.0.agent),
        }
    }
}

fn truncate(line: &str) -> String {
    match line.char_indices().nth(MAX_QUOTED_LINE) {
        Some((idx, _)) => format!("{}...", &line[..idx]),
        None => line.to_string(),
    }
}
