//! Runner configuration and tracing setup

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Default filter when `RUST_LOG` is unset
pub const DEFAULT_LOG_DIRECTIVE: &str = "agent_runner=info,agentrun_core=info";

/// Whether raw error text may reach clients
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum RunMode {
    Debug,
    #[default]
    Release,
}

impl RunMode {
    /// Parse the value of `RUN_MODE`
    pub fn parse(raw: &str) -> Self {
        if raw.trim().eq_ignore_ascii_case("debug") {
            Self::Debug
        } else {
            Self::Release
        }
    }

    pub fn from_env() -> Self {
        std::env::var("RUN_MODE")
            .map(|raw| Self::parse(&raw))
            .unwrap_or_default()
    }
}

/// Configuration shared by every run of a service
#[derive(Debug, Clone)]
pub struct RunnerConfig {
    pub run_mode: RunMode,
    /// History rounds used when the agent does not configure its own
    pub default_history_rounds: usize,
    /// Capacity of the queue between the pull and push tasks
    pub pump_capacity: usize,
    /// Capacity of the client event stream
    pub output_capacity: usize,
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            run_mode: RunMode::Release,
            default_history_rounds: 3,
            pump_capacity: 100,
            output_capacity: 20,
        }
    }
}

impl RunnerConfig {
    /// Build a config from the environment, falling back to defaults
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            run_mode: RunMode::from_env(),
            default_history_rounds: env_usize(
                "AGENT_RUN_HISTORY_ROUNDS",
                defaults.default_history_rounds,
            ),
            pump_capacity: env_usize("AGENT_RUN_PUMP_CAPACITY", defaults.pump_capacity),
            output_capacity: env_usize("AGENT_RUN_OUTPUT_CAPACITY", defaults.output_capacity),
        }
    }
}

fn env_usize(name: &str, default: usize) -> usize {
    match std::env::var(name) {
        Ok(raw) => parse_positive(&raw).unwrap_or(default),
        Err(_) => default,
    }
}

fn parse_positive(raw: &str) -> Option<usize> {
    raw.trim().parse::<usize>().ok().filter(|value| *value > 0)
}

/// Install a global fmt subscriber honouring `RUST_LOG`
///
/// Safe to call more than once; later calls are no-ops.
pub fn init_tracing(default_directive: &str) {
    let _ = tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| default_directive.into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .try_init();
}
