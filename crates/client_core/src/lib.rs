use std::time::Duration;

use reqwest::{Client, Method, StatusCode};
use serde::{de::DeserializeOwned, Serialize};
use serde_json::Value;
use shared::error::ApiError;
use tracing::{debug, warn};
use url::Url;

pub mod cluster_view;
mod clusters;
mod costs;
mod environment;
pub mod error;
pub mod feature_flags;
mod images;
pub mod notifications;
pub mod poller;
pub mod reducers;
mod scheduler;
pub mod store;
pub mod template;
mod users;
pub mod validation;
pub mod wizard;

pub use clusters::{CreateCluster, UpdateCluster};
pub use error::{ClientError, ErrorKind, Result};
pub use notifications::{Notification, Notifier, Severity};
pub use poller::{ClusterPoller, ClusterSource};
pub use store::{paths, Lens, StatePath, StateTree};
pub use wizard::{Route, SubmitOutcome, WizardController};

const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);
/// Login user assumed by the scheduler bridge when none is given.
pub const DEFAULT_CLUSTER_USER: &str = "ec2-user";

/// One outbound call: method, relative endpoint, query pairs, optional body.
#[derive(Debug, Clone)]
pub struct ApiRequest {
    method: Method,
    endpoint: String,
    query: Vec<(String, String)>,
    body: Option<Value>,
}

impl ApiRequest {
    pub fn new(method: Method, endpoint: impl Into<String>) -> Self {
        Self {
            method,
            endpoint: endpoint.into(),
            query: Vec::new(),
            body: None,
        }
    }

    /// A call to the cluster management API through the `api?path=` proxy.
    pub fn api(method: Method, backend_path: impl Into<String>) -> Self {
        Self::new(method, "api").query("path", backend_path)
    }

    pub fn query(mut self, key: &str, value: impl Into<String>) -> Self {
        self.query.push((key.to_string(), value.into()));
        self
    }

    pub fn query_opt(self, key: &str, value: Option<impl Into<String>>) -> Self {
        match value {
            Some(value) => self.query(key, value),
            None => self,
        }
    }

    pub fn flag(self, key: &str, enabled: bool) -> Self {
        if enabled {
            self.query(key, "true")
        } else {
            self
        }
    }

    pub fn json<T: Serialize>(mut self, body: &T) -> Result<Self> {
        self.body = Some(serde_json::to_value(body)?);
        Ok(self)
    }

    pub fn has_query(&self, key: &str) -> bool {
        self.query.iter().any(|(existing, _)| existing == key)
    }

    pub fn method(&self) -> &Method {
        &self.method
    }
}

#[derive(Debug, Clone)]
pub struct ApiResponse {
    pub status: StatusCode,
    pub body: Value,
}

impl ApiResponse {
    pub fn decode<T: DeserializeOwned>(self) -> Result<T> {
        Ok(serde_json::from_value(self.body)?)
    }
}

/// Request glue between console state and the backend.
///
/// Every call threads the selected region, merges successful responses into
/// the [`StateTree`], and turns structured backend failures into error
/// notifications.
#[derive(Debug, Clone)]
pub struct ConsoleClient {
    http: Client,
    base_url: Url,
    store: StateTree,
    notifier: Notifier,
}

impl ConsoleClient {
    pub fn new(base_url: &str, store: StateTree) -> Result<Self> {
        let http = Client::builder().timeout(DEFAULT_REQUEST_TIMEOUT).build()?;
        Self::with_http(base_url, store, http)
    }

    pub fn with_http(base_url: &str, store: StateTree, http: Client) -> Result<Self> {
        let base_url = if base_url.ends_with('/') {
            Url::parse(base_url)?
        } else {
            Url::parse(&format!("{base_url}/"))?
        };
        Ok(Self {
            http,
            base_url,
            notifier: Notifier::new(store.clone()),
            store,
        })
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Result<Self> {
        self.http = Client::builder().timeout(timeout).build()?;
        Ok(self)
    }

    pub fn store(&self) -> &StateTree {
        &self.store
    }

    pub fn notifier(&self) -> &Notifier {
        &self.notifier
    }

    pub fn selected_region(&self) -> Option<String> {
        paths::selected_region().get(&self.store)
    }

    /// `selectedRegion ?? aws.region`.
    pub fn effective_region(&self) -> Option<String> {
        self.selected_region()
            .or_else(|| paths::default_region().get(&self.store))
    }

    fn url_for(&self, request: &ApiRequest) -> Result<Url> {
        let mut url = self.base_url.join(&request.endpoint)?;
        {
            let mut pairs = url.query_pairs_mut();
            for (key, value) in &request.query {
                pairs.append_pair(key, value);
            }
            if !request.has_query("region") {
                if let Some(region) = self.selected_region() {
                    pairs.append_pair("region", &region);
                }
            }
        }
        if url.query() == Some("") {
            url.set_query(None);
        }
        Ok(url)
    }

    /// Sends `request`; non-2xx answers become [`ClientError::Backend`] when
    /// the body carries a `message`, otherwise [`ClientError::UnexpectedStatus`].
    pub async fn execute(&self, request: ApiRequest) -> Result<ApiResponse> {
        let url = self.url_for(&request)?;
        debug!(method = %request.method, %url, "api: request");

        let mut builder = self.http.request(request.method.clone(), url);
        if let Some(body) = &request.body {
            builder = builder.json(body);
        }
        let response = builder.send().await?;
        let status = response.status();
        let text = response.text().await?;

        if !status.is_success() {
            return Err(match ApiError::from_body(&text) {
                Some(body) => ClientError::Backend {
                    status: status.as_u16(),
                    body,
                },
                None => ClientError::UnexpectedStatus {
                    status: status.as_u16(),
                    body: text,
                },
            });
        }

        // Configuration endpoints answer with raw YAML rather than JSON.
        let body = if text.trim().is_empty() {
            Value::Null
        } else {
            serde_json::from_str(&text).unwrap_or(Value::String(text))
        };
        debug!(status = status.as_u16(), "api: response");
        Ok(ApiResponse { status, body })
    }

    /// Logs every failure; failures with a backend message also become an
    /// error notification, prefixed with `subject` when there is one.
    pub(crate) fn report(&self, subject: Option<&str>, err: &ClientError) {
        warn!(subject = subject.unwrap_or("-"), kind = ?err.kind(), "api: request failed: {err}");
        if let Some(message) = err.backend_message() {
            let content = match subject {
                Some(subject) => format!("Error ({subject}): {message}"),
                None => format!("Error: {message}"),
            };
            self.notifier.error(content);
        }
    }

    /// Rethrowing policy for reads: report, then hand the error back.
    pub(crate) fn rethrow<T>(&self, subject: Option<&str>, result: Result<T>) -> Result<T> {
        result.map_err(|err| {
            self.report(subject, &err);
            err
        })
    }

    /// Swallowing policy for fire-and-forget mutations.
    pub(crate) fn swallow<T>(&self, subject: Option<&str>, result: Result<T>) -> Option<T> {
        match result {
            Ok(value) => Some(value),
            Err(err) => {
                self.report(subject, &err);
                None
            }
        }
    }
}

#[cfg(test)]
#[path = "tests/support.rs"]
pub(crate) mod test_support;

#[cfg(test)]
#[path = "tests/lib_tests.rs"]
mod tests;
