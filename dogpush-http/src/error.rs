use std::time::Duration;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, strum::Display, strum::EnumString)]
#[strum(serialize_all = "snake_case")]
pub enum HttpErrorKind {
    InvalidUrl,
    UnsupportedScheme,
    MissingApiKey,
    RequestBuild,
    HeaderName,
    HeaderValue,
    Request,
    Timeout,
    BodyRead,
    Status,
}

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("invalid url: {0}")]
    InvalidUrl(String),

    #[error("only http:// and https:// URLs are supported: {0}")]
    UnsupportedScheme(String),

    #[error("an api key is required to send series")]
    MissingApiKey,

    #[error("http request build failed: {0}")]
    RequestBuild(#[from] http::Error),

    #[error("invalid http header name: {0}")]
    HeaderName(#[from] http::header::InvalidHeaderName),

    #[error("invalid http header value: {0}")]
    HeaderValue(#[from] http::header::InvalidHeaderValue),

    #[error("http request failed: {0}")]
    Request(#[from] hyper_util::client::legacy::Error),

    #[error("http request timed out after {0:?}")]
    Timeout(Duration),

    #[error("failed to read response body: {0}")]
    BodyRead(#[from] hyper::Error),

    #[error("unexpected http status {status}: {body}")]
    Status { status: u16, body: String },
}

impl Error {
    #[must_use]
    pub fn kind(&self) -> HttpErrorKind {
        match self {
            Self::InvalidUrl(_) => HttpErrorKind::InvalidUrl,
            Self::UnsupportedScheme(_) => HttpErrorKind::UnsupportedScheme,
            Self::MissingApiKey => HttpErrorKind::MissingApiKey,
            Self::RequestBuild(_) => HttpErrorKind::RequestBuild,
            Self::HeaderName(_) => HttpErrorKind::HeaderName,
            Self::HeaderValue(_) => HttpErrorKind::HeaderValue,
            Self::Request(_) => HttpErrorKind::Request,
            Self::Timeout(_) => HttpErrorKind::Timeout,
            Self::BodyRead(_) => HttpErrorKind::BodyRead,
            Self::Status { .. } => HttpErrorKind::Status,
        }
    }
}

impl From<Error> for dogpush_core::Error {
    fn from(err: Error) -> Self {
        dogpush_core::Error::transport(err)
    }
}
