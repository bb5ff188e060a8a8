//! Engine settings
//!
//! Every knob has a default matching production behaviour. `from_env` reads a
//! `.env` file (if any) and then overrides from process environment variables
//! named after the setting (`MAX_RETRIES`, `VISUALIZER_CONCURRENCY`, ...).

use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{EngineError, EngineResult};

pub const DEFAULT_RESPONSE_FORMAT: &str =
    "Response from {role}:\n\n<response>\n{content}\n</response>\n\n*Step completed.*";

/// What the Reviewer does when the critic call itself fails
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CriticFailurePolicy {
    /// Approve with a neutral score so the pipeline keeps moving
    #[default]
    FailOpen,
    /// Treat as a rejection; counts toward the retry budget
    FailClosed,
}

impl FromStr for CriticFailurePolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "fail_open" | "open" => Ok(Self::FailOpen),
            "fail_closed" | "closed" => Ok(Self::FailClosed),
            other => Err(format!("expected fail_open or fail_closed, got `{}`", other)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EngineSettings {
    pub max_retries: u32,
    pub max_replanning: u32,
    pub visualizer_concurrency: usize,
    pub research_concurrency: usize,
    /// Stage transitions allowed per run
    pub recursion_limit_workflow: usize,
    /// Model turns allowed per research worker
    pub recursion_limit_researcher: usize,
    pub critic_failure_policy: CriticFailurePolicy,
    /// Score recorded when the critic fails open
    pub fail_open_score: f64,
    /// Template with `{role}` and `{content}` placeholders
    pub response_format: String,
    /// Start every new turn at the Coordinator instead of the Planner
    pub enable_coordinator: bool,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            max_retries: 3,
            max_replanning: 3,
            visualizer_concurrency: 5,
            research_concurrency: 4,
            recursion_limit_workflow: 50,
            recursion_limit_researcher: 7,
            critic_failure_policy: CriticFailurePolicy::FailOpen,
            fail_open_score: 0.5,
            response_format: DEFAULT_RESPONSE_FORMAT.to_string(),
            enable_coordinator: true,
        }
    }
}

impl EngineSettings {
    /// Load `.env` and apply environment overrides on top of the defaults
    pub fn from_env() -> EngineResult<Self> {
        dotenv::dotenv().ok();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Apply overrides from an arbitrary key lookup
    pub fn from_lookup<F>(lookup: F) -> EngineResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut settings = Self::default();

        if let Some(v) = lookup("MAX_RETRIES") {
            settings.max_retries = parse_setting("MAX_RETRIES", &v)?;
        }
        if let Some(v) = lookup("MAX_REPLANNING") {
            settings.max_replanning = parse_setting("MAX_REPLANNING", &v)?;
        }
        if let Some(v) = lookup("VISUALIZER_CONCURRENCY") {
            settings.visualizer_concurrency = parse_setting("VISUALIZER_CONCURRENCY", &v)?;
        }
        if let Some(v) = lookup("RESEARCH_CONCURRENCY") {
            settings.research_concurrency = parse_setting("RESEARCH_CONCURRENCY", &v)?;
        }
        if let Some(v) = lookup("RECURSION_LIMIT_WORKFLOW") {
            settings.recursion_limit_workflow = parse_setting("RECURSION_LIMIT_WORKFLOW", &v)?;
        }
        if let Some(v) = lookup("RECURSION_LIMIT_RESEARCHER") {
            settings.recursion_limit_researcher =
                parse_setting("RECURSION_LIMIT_RESEARCHER", &v)?;
        }
        if let Some(v) = lookup("CRITIC_FAILURE_POLICY") {
            settings.critic_failure_policy = parse_setting("CRITIC_FAILURE_POLICY", &v)?;
        }
        if let Some(v) = lookup("ENABLE_COORDINATOR") {
            settings.enable_coordinator = parse_setting("ENABLE_COORDINATOR", &v)?;
        }
        if let Some(v) = lookup("RESPONSE_FORMAT") {
            settings.response_format = v;
        }

        settings.validate()?;
        Ok(settings)
    }

    /// Reject values that would stall the engine
    pub fn validate(&self) -> EngineResult<()> {
        let positive = [
            ("VISUALIZER_CONCURRENCY", self.visualizer_concurrency),
            ("RESEARCH_CONCURRENCY", self.research_concurrency),
            ("RECURSION_LIMIT_WORKFLOW", self.recursion_limit_workflow),
            ("RECURSION_LIMIT_RESEARCHER", self.recursion_limit_researcher),
        ];
        for (key, value) in positive {
            if value == 0 {
                return Err(EngineError::InvalidSetting {
                    key,
                    value: value.to_string(),
                    reason: "must be at least 1".to_string(),
                });
            }
        }
        if !(0.0..=1.0).contains(&self.fail_open_score) {
            return Err(EngineError::InvalidSetting {
                key: "FAIL_OPEN_SCORE",
                value: self.fail_open_score.to_string(),
                reason: "must be within 0.0..=1.0".to_string(),
            });
        }
        Ok(())
    }

    /// Render a worker's conversation entry
    pub fn format_response(&self, role: &str, content: &str) -> String {
        self.response_format
            .replace("{role}", role)
            .replace("{content}", content)
    }
}

fn parse_setting<T>(key: &'static str, value: &str) -> EngineResult<T>
where
    T: FromStr,
    T::Err: ToString,
{
    value
        .trim()
        .parse::<T>()
        .map_err(|e| EngineError::InvalidSetting {
            key,
            value: value.to_string(),
            reason: e.to_string(),
        })
}
