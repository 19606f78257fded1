use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::domain::{ClusterStatus, ComputeFleetStatus, FleetStatusRequest};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClusterSummary {
    pub cluster_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub region: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cluster_status: Option<ClusterStatus>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cloudformation_stack_status: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cloudformation_stack_arn: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClusterDescription {
    pub cluster_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub region: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cluster_status: Option<ClusterStatus>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub compute_fleet_status: Option<ComputeFleetStatus>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub head_node: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub creation_time: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_updated_time: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failure_reason: Option<String>,
}

impl ClusterDescription {
    /// No provisioning or fleet transition is underway.
    pub fn is_settled(&self) -> bool {
        let cluster_busy = self.cluster_status.is_some_and(ClusterStatus::is_in_progress);
        let fleet_busy = self
            .compute_fleet_status
            .is_some_and(ComputeFleetStatus::is_transitional);
        !cluster_busy && !fleet_busy
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListClustersResponse {
    #[serde(default)]
    pub clusters: Vec<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub next_token: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateClusterRequest {
    pub cluster_name: String,
    pub cluster_configuration: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateClusterRequest {
    pub cluster_configuration: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpdateComputeFleetRequest {
    pub status: FleetStatusRequest,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BuildImageRequest {
    pub image_id: String,
    pub image_configuration: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InstancesResponse {
    #[serde(default)]
    pub instances: Vec<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub next_token: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LogStream {
    pub log_stream_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_event_timestamp: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LogStreamsResponse {
    #[serde(default)]
    pub log_streams: Vec<LogStream>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub next_token: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum LogNodeType {
    HeadNode,
    ComputeNode,
}

/// A log stream name split into `hostname.instanceId.logIdentifier`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LogStreamView {
    pub log_stream_name: String,
    pub hostname: String,
    pub instance_id: String,
    pub log_identifier: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_event_timestamp: Option<DateTime<Utc>>,
    pub node_type: Option<LogNodeType>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogEvent {
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LogEventsResponse {
    #[serde(default)]
    pub events: Vec<LogEvent>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ImagesResponse {
    #[serde(default)]
    pub images: Vec<Value>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UsersResponse {
    #[serde(default)]
    pub users: Vec<Value>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct InstanceTypesResponse {
    #[serde(default)]
    pub instance_types: Vec<Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VersionResponse {
    pub version: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct QueueStatusResponse {
    #[serde(default)]
    pub jobs: Vec<Value>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UserIdentity {
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub user_roles: Vec<String>,
    #[serde(default)]
    pub attributes: Value,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CostMonitoringStatusResponse {
    #[serde(default)]
    pub active: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CostPeriod {
    pub start: String,
    pub end: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CostMonitoringData {
    pub period: CostPeriod,
    pub amount: f64,
    pub unit: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CostMonitoringDataResponse {
    #[serde(default)]
    pub costs: Vec<CostMonitoringData>,
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn description_settles_once_fleet_stops() {
        let mut cluster: ClusterDescription = serde_json::from_value(json!({
            "clusterName": "demo",
            "clusterStatus": "UPDATE_COMPLETE",
            "computeFleetStatus": "STOP_REQUESTED"
        }))
        .expect("decode");
        assert!(!cluster.is_settled());

        cluster.compute_fleet_status = Some(ComputeFleetStatus::Stopped);
        assert!(cluster.is_settled());
    }

    #[test]
    fn list_response_without_token_is_last_page() {
        let page: ListClustersResponse =
            serde_json::from_value(json!({"clusters": [{"clusterName": "a"}]})).expect("decode");
        assert_eq!(page.clusters.len(), 1);
        assert!(page.next_token.is_none());
    }
}
