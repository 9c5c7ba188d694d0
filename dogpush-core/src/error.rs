use dogpush_metrics::GaugeError;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to serialize `{metric}`: {source}")]
    Serialize {
        metric: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("value of `{metric}` is not a finite number: {value}")]
    NonFiniteValue { metric: String, value: f64 },

    #[error("gauge `{metric}` failed: {source}")]
    Gauge {
        metric: String,
        #[source]
        source: GaugeError,
    },

    #[error("transport error: {0}")]
    Transport(#[source] Box<dyn std::error::Error + Send + Sync>),

    #[error("failed to read config: {0}")]
    ConfigRead(#[source] std::io::Error),

    #[error("failed to parse config: {0}")]
    ConfigParse(#[from] serde_yaml::Error),

    #[error("invalid config: {0}")]
    InvalidConfig(String),

    #[error("runtime statistics unavailable: {0}")]
    RuntimeStats(String),
}

impl Error {
    pub fn transport(err: impl std::error::Error + Send + Sync + 'static) -> Self {
        Self::Transport(Box::new(err))
    }
}
