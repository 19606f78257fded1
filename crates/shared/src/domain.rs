use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ClusterStatus {
    CreateInProgress,
    CreateFailed,
    CreateComplete,
    DeleteInProgress,
    DeleteFailed,
    DeleteComplete,
    UpdateInProgress,
    UpdateComplete,
    UpdateFailed,
    #[serde(other)]
    Unknown,
}

impl ClusterStatus {
    pub fn is_in_progress(self) -> bool {
        matches!(
            self,
            Self::CreateInProgress | Self::DeleteInProgress | Self::UpdateInProgress
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ComputeFleetStatus {
    StartRequested,
    Starting,
    Running,
    Protected,
    StopRequested,
    Stopping,
    Stopped,
    Enabled,
    Disabled,
    #[serde(other)]
    Unknown,
}

impl ComputeFleetStatus {
    /// Fleet is moving between running and stopped.
    pub fn is_transitional(self) -> bool {
        matches!(
            self,
            Self::StartRequested | Self::Starting | Self::StopRequested | Self::Stopping
        )
    }

    pub fn can_stop(self) -> bool {
        matches!(self, Self::Running | Self::StopRequested | Self::Stopping)
    }
}

/// Statuses accepted by the compute-fleet PATCH endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FleetStatusRequest {
    StartRequested,
    StopRequested,
    Enabled,
    Disabled,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ImageStatus {
    Available,
    Pending,
    Failed,
}

impl ImageStatus {
    pub fn as_query(self) -> &'static str {
        match self {
            Self::Available => "AVAILABLE",
            Self::Pending => "PENDING",
            Self::Failed => "FAILED",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InstanceAction {
    StartInstances,
    StopInstances,
}

impl InstanceAction {
    pub fn as_query(self) -> &'static str {
        match self {
            Self::StartInstances => "start_instances",
            Self::StopInstances => "stop_instances",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Page {
    Version,
    Cluster,
    HeadNode,
    Queues,
    Storage,
    Create,
}

impl Page {
    pub const ALL: [Page; 6] = [
        Page::Version,
        Page::Cluster,
        Page::HeadNode,
        Page::Queues,
        Page::Storage,
        Page::Create,
    ];

    pub fn index(self) -> usize {
        match self {
            Self::Version => 0,
            Self::Cluster => 1,
            Self::HeadNode => 2,
            Self::Queues => 3,
            Self::Storage => 4,
            Self::Create => 5,
        }
    }

    pub fn from_index(index: usize) -> Option<Self> {
        Self::ALL.get(index).copied()
    }

    pub fn key(self) -> &'static str {
        match self {
            Self::Version => "version",
            Self::Cluster => "cluster",
            Self::HeadNode => "headNode",
            Self::Queues => "queues",
            Self::Storage => "storage",
            Self::Create => "create",
        }
    }

    pub fn from_key(key: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|page| page.key() == key)
    }

    pub fn next(self) -> Option<Self> {
        Self::from_index(self.index() + 1)
    }

    pub fn previous(self) -> Option<Self> {
        self.index().checked_sub(1).and_then(Self::from_index)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn page_order_is_fixed() {
        assert_eq!(Page::Version.next(), Some(Page::Cluster));
        assert_eq!(Page::Create.next(), None);
        assert_eq!(Page::Version.previous(), None);
        assert_eq!(Page::from_key("headNode"), Some(Page::HeadNode));
        assert_eq!(
            serde_json::to_value(Page::HeadNode).expect("serialize"),
            serde_json::json!("headNode")
        );
    }

    #[test]
    fn unknown_statuses_do_not_fail_decoding() {
        let status: ComputeFleetStatus =
            serde_json::from_value(serde_json::json!("SOMETHING_NEW")).expect("decode");
        assert_eq!(status, ComputeFleetStatus::Unknown);
        let status: ClusterStatus =
            serde_json::from_value(serde_json::json!("UPDATE_IN_PROGRESS")).expect("decode");
        assert!(status.is_in_progress());
    }
}
