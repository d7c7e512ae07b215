use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use reqwest::header::CONTENT_TYPE;
use reqwest::Method;
use serde_json::Value;
use tracing::{debug, trace};

use crate::logger::{MessageLogMode, MessageLogger};
use crate::protocol::{
    config_section_path, normalize_devices, parse_body, restart_required, API_CONFIG,
    API_DEVICES, API_KEY_HEADER, API_RELOAD, API_RESTART, API_STATUS, API_SYSTEM_INFO,
};
use crate::types::ConfigSection;
use crate::{Error, Result};

pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Result of replacing a configuration section.
#[derive(Debug, Clone, PartialEq)]
pub struct SectionUpdate {
    /// The device needs a service restart before the change takes effect.
    pub restart_required: bool,
    pub response: Value,
}

pub struct AkariClientBuilder {
    api_url: String,
    api_key: String,
    timeout: Duration,
    http: Option<reqwest::Client>,
    log_mode: Option<MessageLogMode>,
    log_path: Option<PathBuf>,
}

impl AkariClientBuilder {
    pub fn new(api_url: impl Into<String>) -> Self {
        Self {
            api_url: api_url.into(),
            api_key: String::new(),
            timeout: DEFAULT_REQUEST_TIMEOUT,
            http: None,
            log_mode: None,
            log_path: None,
        }
    }

    /// Shared secret sent as `X-API-Key`. Empty means no-auth mode.
    pub fn api_key(mut self, key: impl Into<String>) -> Self {
        self.api_key = key.into();
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Reuse an existing session. The client never closes it.
    pub fn http_client(mut self, http: reqwest::Client) -> Self {
        self.http = Some(http);
        self
    }

    pub fn message_log(mut self, mode: MessageLogMode, path: impl Into<PathBuf>) -> Self {
        self.log_mode = Some(mode);
        self.log_path = Some(path.into());
        self
    }

    pub fn build(self) -> Result<AkariClient> {
        let http = match self.http {
            Some(http) => http,
            None => reqwest::Client::builder()
                .build()
                .map_err(|e| Error::Config(format!("failed to build HTTP client: {e}")))?,
        };

        let logger = match (self.log_mode, self.log_path) {
            (Some(mode), Some(path)) => {
                let logger = MessageLogger::new(mode, &path).map_err(|e| {
                    Error::Config(format!("failed to open message log {}: {e}", path.display()))
                })?;
                Some(Arc::new(Mutex::new(logger)))
            }
            _ => None,
        };

        Ok(AkariClient {
            http,
            base_url: self.api_url.trim_end_matches('/').to_string(),
            api_key: self.api_key,
            timeout: self.timeout,
            logger,
        })
    }
}

/// Async client for the Akari REST API.
///
/// Stateless apart from the endpoint it was built for; cloning shares the
/// underlying session and message log.
#[derive(Clone)]
pub struct AkariClient {
    http: reqwest::Client,
    base_url: String,
    api_key: String,
    timeout: Duration,
    logger: Option<Arc<Mutex<MessageLogger>>>,
}

impl AkariClient {
    pub fn builder(api_url: impl Into<String>) -> AkariClientBuilder {
        AkariClientBuilder::new(api_url)
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Perform one request and parse the body as JSON.
    ///
    /// 401/403 map to [`Error::Auth`]; transport failures, timeouts and any
    /// other non-2xx status map to [`Error::Connection`].
    pub async fn request(&self, method: Method, path: &str, body: Option<&Value>) -> Result<Value> {
        let url = format!("{}{path}", self.base_url);
        trace!(%method, %url, "sending request");
        self.with_logger(|l| l.log_request(method.as_str(), path, body));

        let mut req = self
            .http
            .request(method.clone(), &url)
            .timeout(self.timeout)
            .header(CONTENT_TYPE, "application/json");
        if !self.api_key.is_empty() {
            req = req.header(API_KEY_HEADER, &self.api_key);
        }
        if let Some(body) = body {
            req = req.json(body);
        }

        let resp = match req.send().await {
            Ok(resp) => resp,
            Err(e) => return Err(self.fail(&method, path, self.transport_error(&url, &e))),
        };

        let status = resp.status();
        match status.as_u16() {
            401 => return Err(self.fail(&method, path, Error::Auth("Invalid API key".into()))),
            403 => {
                return Err(self.fail(
                    &method,
                    path,
                    Error::Auth("Forbidden: check API key permissions".into()),
                ));
            }
            s if !status.is_success() => {
                return Err(self.fail(
                    &method,
                    path,
                    Error::Connection(format!("Unexpected response {s} from {url}")),
                ));
            }
            _ => {}
        }

        let text = match resp.text().await {
            Ok(text) => text,
            Err(e) => return Err(self.fail(&method, path, self.transport_error(&url, &e))),
        };
        let value = parse_body(&text).map_err(|e| self.fail(&method, path, e))?;

        debug!(%method, %url, status = status.as_u16(), "request complete");
        self.with_logger(|l| l.log_response(method.as_str(), path, status.as_u16(), &value));
        Ok(value)
    }

    /// Module/device status.
    pub async fn get_status(&self) -> Result<Value> {
        self.request(Method::GET, API_STATUS, None).await
    }

    /// CPU temperature, memory, uptime, version.
    pub async fn get_system_info(&self) -> Result<Value> {
        self.request(Method::GET, API_SYSTEM_INFO, None).await
    }

    pub async fn get_config(&self) -> Result<Value> {
        self.request(Method::GET, API_CONFIG, None).await
    }

    pub async fn get_config_section(&self, section: ConfigSection) -> Result<Value> {
        self.request(Method::GET, &config_section_path(section), None).await
    }

    /// Replace one configuration section.
    pub async fn update_config_section(
        &self,
        section: ConfigSection,
        data: &Value,
    ) -> Result<SectionUpdate> {
        let response = self
            .request(Method::PUT, &config_section_path(section), Some(data))
            .await?;
        Ok(SectionUpdate {
            restart_required: restart_required(&response),
            response,
        })
    }

    /// Hot-reload the device configuration without restarting.
    pub async fn reload_config(&self) -> Result<Value> {
        self.request(Method::POST, API_RELOAD, None).await
    }

    /// Restart the device service. The device drops off the network shortly after.
    pub async fn restart(&self) -> Result<Value> {
        self.request(Method::POST, API_RESTART, None).await
    }

    pub async fn get_devices(&self) -> Result<Vec<Value>> {
        let body = self.request(Method::GET, API_DEVICES, None).await?;
        Ok(normalize_devices(body))
    }

    // -- Helpers --

    fn transport_error(&self, url: &str, e: &reqwest::Error) -> Error {
        if e.is_timeout() {
            Error::Connection(format!(
                "Timed out after {}s talking to Akari at {url}",
                self.timeout.as_secs()
            ))
        } else {
            Error::Connection(format!("Cannot connect to Akari at {url}: {e}"))
        }
    }

    fn fail(&self, method: &Method, path: &str, error: Error) -> Error {
        debug!(%method, path, error = %error, "request failed");
        self.with_logger(|l| l.log_failure(method.as_str(), path, &error.to_string()));
        error
    }

    fn with_logger(&self, f: impl FnOnce(&mut MessageLogger)) {
        if let Some(logger) = &self.logger
            && let Ok(mut logger) = logger.lock()
        {
            f(&mut logger);
        }
    }
}
