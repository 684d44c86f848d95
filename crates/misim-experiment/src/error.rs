//! Experiment-layer errors.

use misim_engine::SimulationError;

/// Errors raised while assembling or running an experiment.
#[derive(Debug, thiserror::Error)]
pub enum ExperimentError {
    #[error(transparent)]
    Simulation(#[from] SimulationError),

    /// A description referenced a service or operation that does not
    /// exist in the architecture.
    #[error("unknown {kind} `{name}` referenced by {referrer}")]
    UnknownReference {
        kind: &'static str,
        name: String,
        referrer: String,
    },

    /// A description carried an out-of-range or inconsistent value.
    #[error("invalid description: {0}")]
    InvalidDescription(String),

    /// A scenario stimulus or faultload string did not parse.
    #[error("cannot parse scenario clause `{clause}`: {message}")]
    ScenarioParse { clause: String, message: String },

    /// Preparing the report directory failed.
    #[error("report directory error")]
    Io(#[from] std::io::Error),
}
