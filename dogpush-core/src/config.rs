use serde::{Deserialize, Deserializer};
use std::path::Path;
use std::time::Duration;

use crate::error::{Error, Result};

pub const DEFAULT_ENDPOINT: &str = "https://app.datadoghq.com";

/// How the reporting host label is chosen when `host` is not set explicitly.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, strum::Display, strum::EnumString,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum HostDiscovery {
    /// Points are sent without a host.
    #[default]
    None,
    /// The local hostname.
    Hostname,
    /// The EC2 instance id from the instance metadata service.
    Ec2,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ReporterConfig {
    pub api_key: Option<String>,
    pub application_key: Option<String>,
    pub endpoint: String,
    pub host: Option<String>,
    pub host_discovery: HostDiscovery,
    #[serde(deserialize_with = "deserialize_duration")]
    pub interval: Duration,
    pub report_runtime: bool,
    #[serde(deserialize_with = "deserialize_duration")]
    pub connect_timeout: Duration,
    #[serde(deserialize_with = "deserialize_duration")]
    pub request_timeout: Duration,
}

impl Default for ReporterConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            application_key: None,
            endpoint: DEFAULT_ENDPOINT.to_string(),
            host: None,
            host_discovery: HostDiscovery::None,
            interval: Duration::from_secs(60),
            report_runtime: true,
            connect_timeout: Duration::from_secs(3),
            request_timeout: Duration::from_secs(10),
        }
    }
}

fn deserialize_duration<'de, D>(deserializer: D) -> std::result::Result<Duration, D::Error>
where
    D: Deserializer<'de>,
{
    let s = String::deserialize(deserializer)?;
    humantime::parse_duration(s.trim()).map_err(serde::de::Error::custom)
}

impl ReporterConfig {
    pub fn from_yaml_str(s: &str) -> Result<Self> {
        // An empty document means "all defaults".
        if s.trim().is_empty() {
            return Ok(Self::default());
        }
        Ok(serde_yaml::from_str(s)?)
    }

    pub fn load(path: &Path) -> Result<Self> {
        let s = std::fs::read_to_string(path).map_err(Error::ConfigRead)?;
        Self::from_yaml_str(&s)
    }

    /// Applies `DD_API_KEY`, `DD_APP_KEY` and `DD_HOST` from `vars`; empty values are ignored.
    pub fn apply_env<I, K, V>(&mut self, vars: I)
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: Into<String>,
    {
        for (k, v) in vars {
            let v: String = v.into();
            if v.is_empty() {
                continue;
            }
            match k.as_ref() {
                "DD_API_KEY" => self.api_key = Some(v),
                "DD_APP_KEY" => self.application_key = Some(v),
                "DD_HOST" => self.host = Some(v),
                _ => {}
            }
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.interval.is_zero() {
            return Err(Error::InvalidConfig("`interval` must be positive".to_string()));
        }
        if !(self.endpoint.starts_with("http://") || self.endpoint.starts_with("https://")) {
            return Err(Error::InvalidConfig(format!(
                "`endpoint` must be an http:// or https:// URL: `{}`",
                self.endpoint
            )));
        }
        if self.api_key.as_deref().is_some_and(str::is_empty) {
            return Err(Error::InvalidConfig("`api_key` must not be empty".to_string()));
        }
        Ok(())
    }

    /// Host label that can be resolved without network access.
    ///
    /// An explicit `host` always wins. Returns `None` for [`HostDiscovery::Ec2`],
    /// which needs the metadata service.
    pub fn local_host(&self) -> Option<String> {
        if let Some(host) = &self.host {
            return Some(host.clone());
        }
        match self.host_discovery {
            HostDiscovery::None | HostDiscovery::Ec2 => None,
            HostDiscovery::Hostname => sysinfo::System::host_name(),
        }
    }
}
