//! Derived values for the cluster detail view.

use serde_json::Value;

use crate::{store::get_at, DEFAULT_CLUSTER_USER};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClusterTab {
    Details,
    Instances,
    Storage,
    Scheduling,
    Accounting,
    StackEvents,
    CostMonitoring,
}

impl ClusterTab {
    pub fn id(self) -> &'static str {
        match self {
            Self::Details => "details",
            Self::Instances => "instances",
            Self::Storage => "storage",
            Self::Scheduling => "scheduling",
            Self::Accounting => "accounting",
            Self::StackEvents => "stack-events",
            Self::CostMonitoring => "cost-monitoring",
        }
    }
}

/// Accounting is shown only for clusters with a Slurm database configured.
pub fn accounting_enabled(cluster: &Value) -> bool {
    get_at(cluster, &["config", "Scheduling", "SlurmSettings", "Database"])
        .is_some_and(|database| !database.is_null())
}

pub fn cluster_tabs(cluster: &Value, cost_monitoring_active: bool) -> Vec<ClusterTab> {
    let mut tabs = vec![
        ClusterTab::Details,
        ClusterTab::Instances,
        ClusterTab::Storage,
        ClusterTab::Scheduling,
    ];
    if accounting_enabled(cluster) {
        tabs.push(ClusterTab::Accounting);
    }
    tabs.push(ClusterTab::StackEvents);
    if cost_monitoring_active {
        tabs.push(ClusterTab::CostMonitoring);
    }
    tabs
}

/// True when the cluster was built by a release the running API does not
/// match; editing such a cluster is discouraged.
pub fn version_mismatch(api_version: &str, cluster_version: &str) -> bool {
    !api_version.contains(cluster_version)
}

pub fn partition(region: &str) -> &'static str {
    if region.starts_with("cn-") {
        "aws-cn"
    } else if region.starts_with("us-gov-") {
        "aws-us-gov"
    } else {
        "aws"
    }
}

pub fn ssm_policy(region: &str) -> String {
    format!(
        "arn:{}:iam::aws:policy/AmazonSSMManagedInstanceCore",
        partition(region)
    )
}

/// Session Manager access is possible when the head node carries the
/// managed SSM policy.
pub fn ssm_enabled(cluster: &Value, region: &str) -> bool {
    let policy = ssm_policy(region);
    get_at(cluster, &["config", "HeadNode", "Iam", "AdditionalIamPolicies"])
        .and_then(Value::as_array)
        .is_some_and(|policies| {
            policies
                .iter()
                .any(|entry| entry.get("Policy").and_then(Value::as_str) == Some(policy.as_str()))
        })
}

/// Login user of the cluster's operating system image.
pub fn cluster_default_user(cluster: &Value) -> &'static str {
    let os = get_at(cluster, &["config", "Image", "Os"])
        .and_then(Value::as_str)
        .unwrap_or_default();
    if os.starts_with("ubuntu") {
        "ubuntu"
    } else if os.starts_with("centos") {
        "centos"
    } else {
        DEFAULT_CLUSTER_USER
    }
}

pub fn ssh_command(cluster: &Value) -> Option<String> {
    let address = get_at(cluster, &["headNode", "publicIpAddress"])
        .and_then(Value::as_str)
        .filter(|address| !address.is_empty())?;
    Some(format!("ssh {}@{address}", cluster_default_user(cluster)))
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn optional_tabs_follow_cluster_and_cost_state() {
        let plain = json!({"clusterName": "c1"});
        assert_eq!(
            cluster_tabs(&plain, false),
            [
                ClusterTab::Details,
                ClusterTab::Instances,
                ClusterTab::Storage,
                ClusterTab::Scheduling,
                ClusterTab::StackEvents,
            ]
        );

        let accounting = json!({"config": {"Scheduling": {"SlurmSettings": {"Database": {"Uri": "db:3306"}}}}});
        let tabs = cluster_tabs(&accounting, true);
        assert_eq!(tabs[4], ClusterTab::Accounting);
        assert_eq!(tabs.last().map(|tab| tab.id()), Some("cost-monitoring"));
    }

    #[test]
    fn version_mismatch_uses_containment() {
        assert!(!version_mismatch("3.9.0", "3.9.0"));
        assert!(version_mismatch("3.9.0", "3.8.0"));
    }

    #[test]
    fn ssm_policy_is_partition_aware() {
        assert_eq!(
            ssm_policy("eu-west-1"),
            "arn:aws:iam::aws:policy/AmazonSSMManagedInstanceCore"
        );
        assert!(ssm_policy("cn-north-1").starts_with("arn:aws-cn:"));
        assert!(ssm_policy("us-gov-west-1").starts_with("arn:aws-us-gov:"));
    }

    #[test]
    fn ssm_enabled_needs_matching_policy() {
        let cluster = json!({"config": {"HeadNode": {"Iam": {"AdditionalIamPolicies": [
            {"Policy": "arn:aws:iam::aws:policy/AmazonS3ReadOnlyAccess"},
            {"Policy": "arn:aws:iam::aws:policy/AmazonSSMManagedInstanceCore"},
        ]}}}});
        assert!(ssm_enabled(&cluster, "us-east-1"));
        assert!(!ssm_enabled(&cluster, "cn-north-1"));
        assert!(!ssm_enabled(&json!({}), "us-east-1"));
    }

    #[test]
    fn ssh_command_uses_os_user() {
        let cluster = json!({
            "config": {"Image": {"Os": "ubuntu2204"}},
            "headNode": {"publicIpAddress": "203.0.113.7"},
        });
        assert_eq!(ssh_command(&cluster).as_deref(), Some("ssh ubuntu@203.0.113.7"));
        assert_eq!(ssh_command(&json!({"headNode": {"publicIpAddress": ""}})), None);
    }
}
