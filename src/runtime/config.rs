use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::warn;

/// Coarse effort knob exposed through the submission surface.
///
/// Each level maps to a preset pair: how many initial queries the run
/// seeds, and how many passes the bounded search loop may take before it
/// must conclude.
#[derive(Clone, Copy, Debug, Default, Hash, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EffortLevel {
    Low,
    #[default]
    Medium,
    High,
}

impl EffortLevel {
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "low" => Some(EffortLevel::Low),
            "medium" => Some(EffortLevel::Medium),
            "high" => Some(EffortLevel::High),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            EffortLevel::Low => "low",
            EffortLevel::Medium => "medium",
            EffortLevel::High => "high",
        }
    }

    /// Preset `(query_count, max_search_passes)` for this level.
    fn presets(&self) -> (u32, u32) {
        match self {
            EffortLevel::Low => (1, 1),
            EffortLevel::Medium => (3, 3),
            EffortLevel::High => (5, 10),
        }
    }
}

impl fmt::Display for EffortLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Per-run configuration threaded into routers, planners, and stages.
///
/// Routers and planners receive a borrow of this on every evaluation, so
/// values like `max_search_passes` are read fresh each pass rather than
/// baked into the graph.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RunConfig {
    pub effort: EffortLevel,
    /// How many initial queries or sub-topics the run seeds.
    pub query_count: u32,
    /// Ceiling for the bounded search loop, consulted once per pass.
    pub max_search_passes: u32,
    /// Model override handed to the generation service.
    pub model: Option<String>,
    /// Cap on concurrently running fan-out tasks. `None` means unbounded.
    pub task_concurrency: Option<usize>,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self::for_effort(EffortLevel::default())
    }
}

impl RunConfig {
    pub fn for_effort(effort: EffortLevel) -> Self {
        let (query_count, max_search_passes) = effort.presets();
        Self {
            effort,
            query_count,
            max_search_passes,
            model: None,
            task_concurrency: None,
        }
    }

    #[must_use]
    pub fn with_query_count(mut self, query_count: u32) -> Self {
        self.query_count = query_count;
        self
    }

    #[must_use]
    pub fn with_max_search_passes(mut self, max_search_passes: u32) -> Self {
        self.max_search_passes = max_search_passes;
        self
    }

    #[must_use]
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }

    #[must_use]
    pub fn with_task_concurrency(mut self, task_concurrency: usize) -> Self {
        self.task_concurrency = Some(task_concurrency);
        self
    }

    /// Build a configuration from `DELVE_*` environment variables, with
    /// `.env` support. Unset variables fall back to the effort presets;
    /// unparseable values are warned about and ignored.
    pub fn from_env() -> Self {
        dotenvy::dotenv().ok();

        let effort = match std::env::var("DELVE_EFFORT") {
            Ok(raw) => EffortLevel::parse(&raw).unwrap_or_else(|| {
                warn!(value = %raw, "unrecognized DELVE_EFFORT, using medium");
                EffortLevel::default()
            }),
            Err(_) => EffortLevel::default(),
        };
        let mut config = Self::for_effort(effort);

        if let Some(count) = env_u32("DELVE_QUERY_COUNT") {
            config.query_count = count;
        }
        if let Some(passes) = env_u32("DELVE_MAX_SEARCH_PASSES") {
            config.max_search_passes = passes;
        }
        if let Ok(model) = std::env::var("DELVE_MODEL")
            && !model.trim().is_empty()
        {
            config.model = Some(model);
        }
        if let Some(cap) = env_u32("DELVE_TASK_CONCURRENCY") {
            config.task_concurrency = Some(cap as usize);
        }
        config
    }
}

fn env_u32(name: &str) -> Option<u32> {
    let raw = std::env::var(name).ok()?;
    match raw.trim().parse::<u32>() {
        Ok(value) => Some(value),
        Err(_) => {
            warn!(var = name, value = %raw, "ignoring unparseable value");
            None
        }
    }
}
