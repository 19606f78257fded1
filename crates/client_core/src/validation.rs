//! Per-page wizard validators.
//!
//! Validators only read a [`WizardSnapshot`]; recording the errors in the
//! store is the controller's job.

use serde_json::Value;
use shared::{domain::Page, error::PageErrors};

use crate::{
    feature_flags::ResourceLimits,
    store::{get_at, paths, StateTree},
};

/// Regions the cluster management API is available in.
pub const SUPPORTED_REGIONS: &[&str] = &[
    "us-east-2",
    "us-east-1",
    "us-west-1",
    "us-west-2",
    "af-south-1",
    "ap-east-1",
    "ap-south-1",
    "ap-northeast-2",
    "ap-southeast-1",
    "ap-southeast-2",
    "ap-northeast-1",
    "ca-central-1",
    "cn-north-1",
    "cn-northwest-1",
    "eu-central-1",
    "eu-west-1",
    "eu-west-2",
    "eu-south-1",
    "eu-west-3",
    "eu-north-1",
    "me-south-1",
    "sa-east-1",
    "us-gov-east-1",
    "us-gov-west-1",
];

pub const MAX_CLUSTER_NAME_LENGTH: usize = 60;
pub const MAX_QUEUE_NAME_LENGTH: usize = 25;

/// The slice of wizard state the validators look at.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct WizardSnapshot {
    pub version: Option<String>,
    pub cluster_name: Option<String>,
    pub editing: bool,
    pub vpc: Option<String>,
    pub config: Value,
    pub config_yaml: Option<String>,
    /// `aws.region`, used when the configuration names no region.
    pub default_region: Option<String>,
}

impl WizardSnapshot {
    pub fn from_store(store: &StateTree) -> Self {
        Self {
            version: store.get_str(paths::wizard_key("version")),
            cluster_name: store.get_str(paths::wizard_key("clusterName")),
            editing: store.get_bool(paths::wizard_key("editing")),
            vpc: store.get_str(paths::wizard_key("vpc")),
            config: store.get(paths::wizard_config()).unwrap_or(Value::Null),
            config_yaml: store.get_str(paths::wizard_key("clusterConfigYaml")),
            default_region: paths::default_region().get(store),
        }
    }

    fn region(&self) -> Option<&str> {
        self.config_str(&["Region"])
            .or(self.default_region.as_deref())
    }

    pub fn resource_limits(&self) -> ResourceLimits {
        ResourceLimits::for_release(self.version.as_deref(), self.region())
    }

    fn config_str(&self, path: &[&str]) -> Option<&str> {
        get_at(&self.config, path)
            .and_then(Value::as_str)
            .filter(|value| !value.is_empty())
    }
}

/// Starts with a letter, then letters, digits or hyphens; at least two characters.
pub fn is_valid_cluster_name(name: &str) -> bool {
    let mut chars = name.chars();
    let Some(first) = chars.next() else {
        return false;
    };
    let rest = chars.as_str();
    first.is_ascii_alphabetic()
        && !rest.is_empty()
        && rest.chars().all(|c| c.is_ascii_alphanumeric() || c == '-')
}

pub fn is_valid_queue_name(name: &str) -> bool {
    !name.is_empty()
        && name.len() <= MAX_QUEUE_NAME_LENGTH
        && name
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-')
}

pub fn is_supported_region(region: &str) -> bool {
    SUPPORTED_REGIONS.contains(&region)
}

/// False when the path contains a `../` or `..\` traversal.
pub fn is_safe_path(path: &str) -> bool {
    !(path.contains("../") || path.contains("..\\"))
}

pub fn validate_page(page: Page, snapshot: &WizardSnapshot) -> Result<(), PageErrors> {
    let mut errors = PageErrors::default();
    match page {
        Page::Version => validate_version(snapshot, &mut errors),
        Page::Cluster => validate_cluster(snapshot, &mut errors),
        Page::HeadNode => validate_head_node(snapshot, &mut errors),
        Page::Queues => validate_queues(snapshot, &mut errors),
        Page::Storage => validate_storage(snapshot, &mut errors),
        Page::Create => validate_create(snapshot, &mut errors),
    }
    errors.into_result()
}

fn validate_version(snapshot: &WizardSnapshot, errors: &mut PageErrors) {
    if snapshot.version.as_deref().map_or(true, str::is_empty) {
        errors.push("version", "A version must be selected.");
    }
}

fn validate_cluster(snapshot: &WizardSnapshot, errors: &mut PageErrors) {
    if !snapshot.editing {
        match snapshot.cluster_name.as_deref() {
            None | Some("") => errors.push("clusterName", "Cluster name is required."),
            Some(name) if name.len() > MAX_CLUSTER_NAME_LENGTH => errors.push(
                "clusterName",
                format!("Cluster name must be at most {MAX_CLUSTER_NAME_LENGTH} characters."),
            ),
            Some(name) if !is_valid_cluster_name(name) => errors.push(
                "clusterName",
                "Cluster name must start with a letter and contain only letters, digits and hyphens.",
            ),
            Some(_) => {}
        }
    }
    if let Some(region) = snapshot.config_str(&["Region"]) {
        if !is_supported_region(region) {
            errors.push("Region", format!("Region {region} is not supported."));
        }
    }
    if snapshot.vpc.as_deref().map_or(true, str::is_empty) {
        errors.push("vpc", "A VPC must be selected.");
    }
}

fn validate_head_node(snapshot: &WizardSnapshot, errors: &mut PageErrors) {
    if snapshot.config_str(&["HeadNode", "InstanceType"]).is_none() {
        errors.push("HeadNode.InstanceType", "An instance type must be selected.");
    }
    if snapshot
        .config_str(&["HeadNode", "Networking", "SubnetId"])
        .is_none()
    {
        errors.push("HeadNode.Networking.SubnetId", "A subnet must be selected.");
    }
}

fn count(resource: &Value, key: &str) -> Option<u64> {
    resource.get(key).and_then(Value::as_u64)
}

fn validate_queues(snapshot: &WizardSnapshot, errors: &mut PageErrors) {
    let queues = get_at(&snapshot.config, &["Scheduling", "SlurmQueues"])
        .and_then(Value::as_array)
        .map(Vec::as_slice)
        .unwrap_or_default();
    if queues.is_empty() {
        errors.push("Scheduling.SlurmQueues", "At least one queue is required.");
        return;
    }

    let limits = snapshot.resource_limits();
    if queues.len() > limits.max_queues {
        errors.push(
            "Scheduling.SlurmQueues",
            format!("At most {} queues are allowed.", limits.max_queues),
        );
    }
    let mut total_resources = 0;

    for (q, queue) in queues.iter().enumerate() {
        let prefix = format!("Scheduling.SlurmQueues[{q}]");
        match queue.get("Name").and_then(Value::as_str) {
            Some(name) if is_valid_queue_name(name) => {}
            _ => errors.push(
                format!("{prefix}.Name"),
                format!(
                    "Queue names use lower-case letters, digits and hyphens, at most {MAX_QUEUE_NAME_LENGTH} characters."
                ),
            ),
        }

        let has_subnet = get_at(queue, &["Networking", "SubnetIds"])
            .and_then(Value::as_array)
            .is_some_and(|subnets| !subnets.is_empty());
        if !has_subnet {
            errors.push(
                format!("{prefix}.Networking.SubnetIds"),
                "A subnet must be selected.",
            );
        }

        let resources = queue
            .get("ComputeResources")
            .and_then(Value::as_array)
            .map(Vec::as_slice)
            .unwrap_or_default();
        if resources.is_empty() {
            errors.push(
                format!("{prefix}.ComputeResources"),
                "At least one compute resource is required.",
            );
        } else if resources.len() > limits.max_compute_resources_per_queue {
            errors.push(
                format!("{prefix}.ComputeResources"),
                format!(
                    "At most {} compute resources are allowed per queue.",
                    limits.max_compute_resources_per_queue
                ),
            );
        }
        total_resources += resources.len();
        for (r, resource) in resources.iter().enumerate() {
            let resource_prefix = format!("{prefix}.ComputeResources[{r}]");
            let has_instance_type = resource
                .get("InstanceType")
                .and_then(Value::as_str)
                .is_some_and(|t| !t.is_empty())
                || resource
                    .get("Instances")
                    .and_then(Value::as_array)
                    .is_some_and(|instances| !instances.is_empty());
            if !has_instance_type {
                errors.push(
                    format!("{resource_prefix}.InstanceType"),
                    "An instance type must be selected.",
                );
            }
            if let (Some(min), Some(max)) = (count(resource, "MinCount"), count(resource, "MaxCount")) {
                if min > max {
                    errors.push(
                        format!("{resource_prefix}.MinCount"),
                        "MinCount must not exceed MaxCount.",
                    );
                }
            }
        }
    }

    if total_resources > limits.max_compute_resources_per_cluster {
        errors.push(
            "Scheduling.SlurmQueues",
            format!(
                "At most {} compute resources are allowed per cluster.",
                limits.max_compute_resources_per_cluster
            ),
        );
    }
}

fn validate_storage(snapshot: &WizardSnapshot, errors: &mut PageErrors) {
    let storages = snapshot
        .config
        .get("SharedStorage")
        .and_then(Value::as_array)
        .map(Vec::as_slice)
        .unwrap_or_default();
    for (i, storage) in storages.iter().enumerate() {
        let prefix = format!("SharedStorage[{i}]");
        for key in ["Name", "StorageType"] {
            if storage
                .get(key)
                .and_then(Value::as_str)
                .map_or(true, str::is_empty)
            {
                errors.push(format!("{prefix}.{key}"), format!("{key} is required."));
            }
        }
        match storage.get("MountDir").and_then(Value::as_str) {
            None | Some("") => errors.push(format!("{prefix}.MountDir"), "MountDir is required."),
            Some(dir) if !dir.starts_with('/') => errors.push(
                format!("{prefix}.MountDir"),
                "MountDir must be an absolute path.",
            ),
            Some(dir) if !is_safe_path(dir) => errors.push(
                format!("{prefix}.MountDir"),
                "MountDir must not traverse parent directories.",
            ),
            Some(_) => {}
        }
    }
}

fn validate_create(snapshot: &WizardSnapshot, errors: &mut PageErrors) {
    let Some(yaml) = snapshot.config_yaml.as_deref() else {
        return;
    };
    if yaml.trim().is_empty() {
        errors.push("clusterConfigYaml", "The configuration must not be empty.");
    } else if let Err(err) = serde_yaml::from_str::<serde_yaml::Value>(yaml) {
        errors.push("clusterConfigYaml", format!("Invalid YAML: {err}"));
    }
}

#[cfg(test)]
#[path = "tests/validation_tests.rs"]
mod tests;
