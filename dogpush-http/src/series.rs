use std::time::Duration;

use dogpush_core::{ReporterConfig, Request, Transport};

use crate::{Error, HttpClient, HttpRequest, Result};

pub const SERIES_PATH: &str = "/api/v1/series";

/// Delivers series payloads to a Datadog-compatible intake.
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: HttpClient,
    url: String,
    request_timeout: Option<Duration>,
}

impl HttpTransport {
    pub fn new(
        endpoint: &str,
        api_key: &str,
        application_key: Option<&str>,
        connect_timeout: Option<Duration>,
        request_timeout: Option<Duration>,
    ) -> Result<Self> {
        if api_key.is_empty() {
            return Err(Error::MissingApiKey);
        }

        let mut url = url::Url::parse(endpoint).map_err(|_| Error::InvalidUrl(endpoint.into()))?;
        if url.scheme() != "http" && url.scheme() != "https" {
            return Err(Error::UnsupportedScheme(endpoint.into()));
        }
        let path = format!("{}{SERIES_PATH}", url.path().trim_end_matches('/'));
        url.set_path(&path);
        {
            let mut query = url.query_pairs_mut();
            query.append_pair("api_key", api_key);
            if let Some(app) = application_key.filter(|k| !k.is_empty()) {
                query.append_pair("application_key", app);
            }
        }

        Ok(Self {
            client: HttpClient::new(connect_timeout),
            url: url.into(),
            request_timeout,
        })
    }

    pub fn from_config(cfg: &ReporterConfig) -> Result<Self> {
        let api_key = cfg.api_key.as_deref().ok_or(Error::MissingApiKey)?;
        Self::new(
            &cfg.endpoint,
            api_key,
            cfg.application_key.as_deref(),
            Some(cfg.connect_timeout),
            Some(cfg.request_timeout),
        )
    }

    /// Full series URL, including credentials.
    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn client(&self) -> &HttpClient {
        &self.client
    }
}

impl Transport for HttpTransport {
    type Request = HttpSeriesRequest;

    fn prepare(&self) -> dogpush_core::Result<HttpSeriesRequest> {
        Ok(HttpSeriesRequest {
            client: self.client.clone(),
            url: self.url.clone(),
            timeout: self.request_timeout,
            body: Vec::with_capacity(16 * 1024),
        })
    }
}

/// A series payload being written for one pass.
#[derive(Debug)]
pub struct HttpSeriesRequest {
    client: HttpClient,
    url: String,
    timeout: Option<Duration>,
    body: Vec<u8>,
}

impl Request for HttpSeriesRequest {
    type Writer = Vec<u8>;

    fn body_writer(&mut self) -> &mut Vec<u8> {
        &mut self.body
    }

    async fn send(self) -> dogpush_core::Result<()> {
        let bytes = self.body.len();
        let req = HttpRequest::post(self.url, self.body)
            .header("content-type", "application/json")
            .timeout(self.timeout);

        let res = self.client.request(req).await?;
        if !res.is_success() {
            return Err(Error::Status {
                status: res.status,
                body: res.body_utf8().unwrap_or_default().trim().to_string(),
            }
            .into());
        }

        tracing::trace!(status = res.status, bytes, "series accepted");
        Ok(())
    }
}
