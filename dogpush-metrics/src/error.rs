use crate::metrics::MetricKind;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("metric `group` must not be empty")]
    EmptyGroup,

    #[error("metric `type` must not be empty")]
    EmptyType,

    #[error("metric `{name}` is already registered as a {existing}, not a {requested}")]
    KindMismatch {
        name: String,
        existing: MetricKind,
        requested: MetricKind,
    },
}
