pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("`stages` must be a non-empty list of {{ duration, target }}")]
    EmptyStages,

    #[error("stage {index} must have a positive duration")]
    ZeroStageDuration { index: usize },

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error(transparent)]
    Metric(#[from] surge_metrics::Error),

    #[error("invalid threshold `{expression}` on `{selector}`: {reason}")]
    Threshold {
        selector: String,
        expression: String,
        reason: String,
    },

    #[error("setup failed: {0}")]
    Setup(String),
}

impl Error {
    /// Configuration problems detected before any load is generated.
    #[must_use]
    pub fn is_config(&self) -> bool {
        matches!(
            self,
            Self::EmptyStages
                | Self::ZeroStageDuration { .. }
                | Self::Config(_)
                | Self::Metric(_)
                | Self::Threshold { .. }
        )
    }
}
