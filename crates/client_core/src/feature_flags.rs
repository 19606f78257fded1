//! Console features gated by the target release and region.
//!
//! A feature introduced in a release stays enabled for every later one.
//! Some features are additionally unavailable in isolated partitions.

use std::collections::HashSet;

use serde_json::Value;
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Feature {
    MultiuserCluster,
    FsxOntap,
    FsxOpenZfs,
    LustrePersistent2,
    MemoryBasedScheduling,
    SlurmQueueUpdateStrategy,
    SlurmAccounting,
    QueuesMultipleInstanceTypes,
    DynamicFsMount,
    MultiAz,
    NewResourcesLimits,
    CostMonitoring,
}

impl Feature {
    pub fn key(self) -> &'static str {
        match self {
            Self::MultiuserCluster => "multiuser_cluster",
            Self::FsxOntap => "fsx_ontap",
            Self::FsxOpenZfs => "fsx_openzsf",
            Self::LustrePersistent2 => "lustre_persistent2",
            Self::MemoryBasedScheduling => "memory_based_scheduling",
            Self::SlurmQueueUpdateStrategy => "slurm_queue_update_strategy",
            Self::SlurmAccounting => "slurm_accounting",
            Self::QueuesMultipleInstanceTypes => "queues_multiple_instance_types",
            Self::DynamicFsMount => "dynamic_fs_mount",
            Self::MultiAz => "multi_az",
            Self::NewResourcesLimits => "new_resources_limits",
            Self::CostMonitoring => "cost_monitoring",
        }
    }
}

/// First release shipping each group of features.
const RELEASE_FEATURES: &[((u32, u32, u32), &[Feature])] = &[
    ((3, 1, 0), &[Feature::MultiuserCluster]),
    (
        (3, 2, 0),
        &[
            Feature::FsxOntap,
            Feature::FsxOpenZfs,
            Feature::LustrePersistent2,
            Feature::MemoryBasedScheduling,
            Feature::SlurmQueueUpdateStrategy,
        ],
    ),
    (
        (3, 3, 0),
        &[
            Feature::SlurmAccounting,
            Feature::QueuesMultipleInstanceTypes,
            Feature::DynamicFsMount,
        ],
    ),
    ((3, 4, 0), &[Feature::MultiAz]),
    ((3, 6, 0), &[Feature::NewResourcesLimits]),
];

/// Enabled regardless of release.
const ALWAYS_ON: &[Feature] = &[Feature::CostMonitoring];

/// Partitions without the billing services cost monitoring relies on.
const ISOLATED_REGION_PREFIXES: &[&str] = &["us-iso-", "us-isob-"];

/// Parses `major.minor.patch`, tolerating a leading `v` and suffixes such
/// as `3.10.0b1`.
pub fn parse_release(version: &str) -> Option<(u32, u32, u32)> {
    let mut parts = version.trim().trim_start_matches('v').split('.').map(|part| {
        let digits: String = part.chars().take_while(char::is_ascii_digit).collect();
        digits.parse::<u32>().ok()
    });
    let major = parts.next()??;
    let minor = parts.next().flatten().unwrap_or(0);
    let patch = parts.next().flatten().unwrap_or(0);
    Some((major, minor, patch))
}

pub fn enabled_features(version: Option<&str>, region: Option<&str>) -> HashSet<Feature> {
    let mut features: HashSet<Feature> = ALWAYS_ON.iter().copied().collect();
    if let Some(release) = version.and_then(parse_release) {
        features.extend(
            RELEASE_FEATURES
                .iter()
                .filter(|(since, _)| release >= *since)
                .flat_map(|(_, added)| added.iter().copied()),
        );
    }
    let isolated = region.is_some_and(|region| {
        ISOLATED_REGION_PREFIXES
            .iter()
            .any(|prefix| region.starts_with(prefix))
    });
    if isolated {
        features.remove(&Feature::CostMonitoring);
    }
    features
}

pub fn is_feature_enabled(version: Option<&str>, region: Option<&str>, feature: Feature) -> bool {
    let enabled = enabled_features(version, region).contains(&feature);
    if !enabled {
        debug!(
            feature = feature.key(),
            version = version.unwrap_or("-"),
            region = region.unwrap_or("-"),
            "feature flags: disabled"
        );
    }
    enabled
}

/// Queue and compute resource ceilings the wizard enforces.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResourceLimits {
    pub max_queues: usize,
    pub max_compute_resources_per_queue: usize,
    pub max_compute_resources_per_cluster: usize,
}

impl ResourceLimits {
    pub const LEGACY: Self = Self {
        max_queues: 10,
        max_compute_resources_per_queue: 5,
        max_compute_resources_per_cluster: 50,
    };

    pub const EXTENDED: Self = Self {
        max_queues: 50,
        max_compute_resources_per_queue: 50,
        max_compute_resources_per_cluster: 50,
    };

    pub fn for_release(version: Option<&str>, region: Option<&str>) -> Self {
        if is_feature_enabled(version, region, Feature::NewResourcesLimits) {
            Self::EXTENDED
        } else {
            Self::LEGACY
        }
    }
}

/// Rewrites single-type compute resources into the flexible `Instances`
/// list when the release accepts several instance types per resource.
pub fn map_compute_resources(
    version: Option<&str>,
    region: Option<&str>,
    resources: &mut [Value],
) {
    if !is_feature_enabled(version, region, Feature::QueuesMultipleInstanceTypes) {
        return;
    }
    for resource in resources {
        let Some(fields) = resource.as_object_mut() else {
            continue;
        };
        if fields.contains_key("Instances") {
            continue;
        }
        if let Some(instance_type) = fields.remove("InstanceType") {
            fields.insert(
                "Instances".into(),
                Value::Array(vec![serde_json::json!({ "InstanceType": instance_type })]),
            );
        }
    }
}
