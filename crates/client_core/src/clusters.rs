use reqwest::{Method, StatusCode};
use serde_json::{json, Value};
use shared::{
    domain::FleetStatusRequest,
    protocol::{
        ClusterSummary, CreateClusterRequest, InstancesResponse, ListClustersResponse, LogEvent,
        LogEventsResponse, LogStreamView, LogStreamsResponse, UpdateClusterRequest,
        UpdateComputeFleetRequest,
    },
};
use tracing::info;

use crate::{
    error::{ClientError, Result},
    reducers::{merge_record, to_log_stream_view},
    store::paths,
    template::map_and_apply_tags,
    ApiRequest, ApiResponse, ConsoleClient,
};

#[derive(Debug, Clone, Default)]
pub struct CreateCluster {
    pub name: String,
    /// YAML configuration document.
    pub configuration: String,
    pub region: Option<String>,
    pub version: Option<String>,
    pub dry_run: bool,
}

#[derive(Debug, Clone, Default)]
pub struct UpdateCluster {
    pub name: String,
    pub configuration: String,
    pub version: Option<String>,
    pub dry_run: bool,
    pub force_update: bool,
}

/// Fragment of the message the backend answers a successful dry run with.
const DRY_RUN_PASSED: &str = "DryRun flag is set";

fn cluster_path(name: &str) -> String {
    format!("/v3/clusters/{name}")
}

pub(crate) fn encode_segment(segment: &str) -> String {
    url::form_urlencoded::byte_serialize(segment.as_bytes()).collect()
}

impl ConsoleClient {
    fn merge_cluster(&self, name: &str, fields: Value) {
        self.store
            .update(paths::cluster(name), move |existing| merge_record(existing, fields));
    }

    /// Answers with the non-202 body as a backend error and notifies it.
    fn reject_unexpected(&self, name: &str, status: StatusCode, body: &Value) -> ClientError {
        let message = body
            .get("message")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();
        let err = ClientError::Backend {
            status: status.as_u16(),
            body: shared::error::ApiError::new(message),
        };
        self.report(Some(name), &err);
        err
    }

    /// Maps a create/update answer: 202 is success, and so is the backend
    /// refusing a dry run only because the dry-run flag was set. Anything
    /// else is reported against `name`.
    fn settle_submission(
        &self,
        name: &str,
        dry_run: bool,
        result: Result<ApiResponse>,
    ) -> Result<Value> {
        match result {
            Ok(response) if response.status == StatusCode::ACCEPTED => Ok(response.body),
            Ok(response) => Err(self.reject_unexpected(name, response.status, &response.body)),
            Err(err)
                if dry_run
                    && err
                        .backend_message()
                        .is_some_and(|message| message.contains(DRY_RUN_PASSED)) =>
            {
                Ok(json!({ "message": err.backend_message() }))
            }
            Err(err) => {
                self.report(Some(name), &err);
                Err(err)
            }
        }
    }

    /// Submits a new cluster. The product tag is injected into the
    /// configuration. Only a real (non dry-run) creation in the selected
    /// region is merged into `clusters.index`.
    pub async fn create_cluster(&self, request: CreateCluster) -> Result<Value> {
        let configuration =
            self.rethrow(Some(&request.name), map_and_apply_tags(&request.configuration))?;
        let api = ApiRequest::api(Method::POST, "/v3/clusters")
            .flag("dryrun", request.dry_run)
            .query_opt("region", request.region.clone())
            .query_opt("version", request.version.clone())
            .json(&CreateClusterRequest {
                cluster_name: request.name.clone(),
                cluster_configuration: configuration,
            })?;

        let result = self.execute(api).await;
        let body = self.settle_submission(&request.name, request.dry_run, result)?;

        if !request.dry_run && request.region == self.selected_region() {
            self.merge_cluster(&request.name, body.clone());
        }
        info!(cluster = %request.name, dry_run = request.dry_run, "clusters: create accepted");
        Ok(body)
    }

    pub async fn update_cluster(&self, request: UpdateCluster) -> Result<Value> {
        let api = ApiRequest::api(Method::PUT, cluster_path(&request.name))
            .flag("dryrun", request.dry_run)
            .flag("forceUpdate", request.force_update)
            .query_opt("version", request.version.clone())
            .json(&UpdateClusterRequest {
                cluster_configuration: request.configuration.clone(),
            })?;

        let result = self.execute(api).await;
        let body = self.settle_submission(&request.name, request.dry_run, result)?;

        if !request.dry_run {
            self.notifier
                .success(format!("Successfully Updated: {}", request.name));
            self.merge_cluster(&request.name, body.clone());
        }
        info!(cluster = %request.name, dry_run = request.dry_run, "clusters: update accepted");
        Ok(body)
    }

    /// Follows `nextToken` until exhausted and replaces `clusters.list`
    /// with the concatenated pages.
    pub async fn list_clusters(&self) -> Result<Vec<ClusterSummary>> {
        let result = async {
            let mut clusters: Vec<Value> = Vec::new();
            let mut next_token: Option<String> = None;
            loop {
                let request = ApiRequest::api(Method::GET, "/v3/clusters")
                    .query_opt("nextToken", next_token.take());
                let page: ListClustersResponse = self.execute(request).await?.decode()?;
                clusters.extend(page.clusters);
                match page.next_token {
                    Some(token) => next_token = Some(token),
                    None => break,
                }
            }
            Ok::<_, ClientError>(clusters)
        }
        .await;

        let clusters = self.rethrow(None, result)?;
        self.store
            .set(paths::cluster_list(), Value::Array(clusters.clone()));
        Ok(clusters
            .into_iter()
            .filter_map(|cluster| serde_json::from_value(cluster).ok())
            .collect())
    }

    pub async fn describe_cluster(&self, name: &str) -> Result<Value> {
        let result = self
            .execute(ApiRequest::api(Method::GET, cluster_path(name)))
            .await;
        let response = self.rethrow(Some(name), result)?;
        if response.status == StatusCode::OK {
            self.merge_cluster(name, response.body.clone());
        }
        Ok(response.body)
    }

    /// Raw YAML configuration of a cluster.
    pub async fn get_configuration(&self, name: &str) -> Option<String> {
        let request = ApiRequest::new(Method::GET, "manager/get_cluster_configuration")
            .query("cluster_name", name);
        let response = self.swallow(Some(name), self.execute(request).await)?;
        match response.body {
            Value::String(yaml) => Some(yaml),
            Value::Null => None,
            other => serde_yaml::to_string(&other).ok(),
        }
    }

    pub async fn delete_cluster(&self, name: &str) -> Option<Value> {
        let result = self
            .execute(ApiRequest::api(Method::DELETE, cluster_path(name)))
            .await;
        let response = self.swallow(Some(name), result)?;
        info!(cluster = %name, "clusters: delete requested");
        Some(response.body)
    }

    /// Patches the compute-fleet status, then refreshes the description.
    pub async fn update_compute_fleet(
        &self,
        name: &str,
        status: FleetStatusRequest,
    ) -> Option<Value> {
        let result = async {
            let request = ApiRequest::api(Method::PATCH, format!("{}/computefleet", cluster_path(name)))
                .json(&UpdateComputeFleetRequest { status })?;
            self.execute(request).await
        }
        .await;
        let response = self.swallow(Some(name), result)?;
        if response.status == StatusCode::OK {
            // Failures are already reported by describe.
            let _ = self.describe_cluster(name).await;
        }
        Some(response.body)
    }

    pub async fn get_cluster_instances(&self, name: &str) -> Option<Vec<Value>> {
        let result = async {
            self.execute(ApiRequest::api(
                Method::GET,
                format!("{}/instances", cluster_path(name)),
            ))
            .await?
            .decode::<InstancesResponse>()
        }
        .await;
        let instances = self.swallow(Some(name), result)?.instances;
        self.store.set(
            paths::cluster(name).join("instances"),
            Value::Array(instances.clone()),
        );
        Some(instances)
    }

    pub async fn get_cluster_stack_events(&self, name: &str) -> Option<Value> {
        let result = self
            .execute(ApiRequest::api(
                Method::GET,
                format!("{}/stackevents", cluster_path(name)),
            ))
            .await;
        let events = self.swallow(Some(name), result)?.body;
        self.store
            .set(paths::cluster(name).join("stackevents"), events.clone());
        Some(events)
    }

    pub async fn list_cluster_log_streams(&self, name: &str) -> Result<Vec<LogStreamView>> {
        let result = async {
            self.execute(ApiRequest::api(
                Method::GET,
                format!("{}/logstreams", cluster_path(name)),
            ))
            .await?
            .decode::<LogStreamsResponse>()
        }
        .await;
        let streams = self.rethrow(None, result)?;
        Ok(streams.log_streams.iter().map(to_log_stream_view).collect())
    }

    pub async fn list_cluster_log_events(
        &self,
        name: &str,
        log_stream_name: &str,
    ) -> Result<Vec<LogEvent>> {
        let result = async {
            self.execute(ApiRequest::api(
                Method::GET,
                format!(
                    "{}/logstreams/{}",
                    cluster_path(name),
                    encode_segment(log_stream_name)
                ),
            ))
            .await?
            .decode::<LogEventsResponse>()
        }
        .await;
        Ok(self.rethrow(None, result)?.events)
    }
}

#[cfg(test)]
#[path = "tests/clusters_tests.rs"]
mod tests;
