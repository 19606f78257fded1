//! Scheduler commands relayed to a cluster's head node.

use reqwest::Method;
use serde_json::Value;
use shared::protocol::QueueStatusResponse;
use tracing::debug;

use crate::{error::Result, store::paths, ApiRequest, ConsoleClient, DEFAULT_CLUSTER_USER};

impl ConsoleClient {
    /// Every head-node call names the instance, the login user and the
    /// region the instance lives in.
    fn head_node_request(
        &self,
        method: Method,
        endpoint: &str,
        instance_id: &str,
        user: Option<&str>,
    ) -> ApiRequest {
        ApiRequest::new(method, endpoint)
            .query("instance_id", instance_id)
            .query("user", user.unwrap_or(DEFAULT_CLUSTER_USER))
            .query_opt("region", self.effective_region())
    }

    /// Stores the job list at `clusters.index.<name>.jobs`.
    pub async fn queue_status(
        &self,
        cluster_name: &str,
        instance_id: &str,
        user: Option<&str>,
    ) -> Option<Vec<Value>> {
        let request =
            self.head_node_request(Method::GET, "manager/queue_status", instance_id, user);
        let result = async {
            self.execute(request)
                .await?
                .decode::<QueueStatusResponse>()
        }
        .await;
        let jobs = self.swallow(None, result)?.jobs;
        debug!(cluster = %cluster_name, jobs = jobs.len(), "scheduler: queue status");
        self.store.set(
            paths::cluster(cluster_name).join("jobs"),
            Value::Array(jobs.clone()),
        );
        Some(jobs)
    }

    pub async fn cancel_job(
        &self,
        instance_id: &str,
        user: Option<&str>,
        job_id: &str,
    ) -> Option<Value> {
        let request = self
            .head_node_request(Method::GET, "manager/cancel_job", instance_id, user)
            .query("job_id", job_id);
        Some(self.swallow(None, self.execute(request).await)?.body)
    }

    /// `scontrol show job` output for one job.
    pub async fn job_info(
        &self,
        instance_id: &str,
        user: Option<&str>,
        job_id: &str,
    ) -> Result<Value> {
        let request = self
            .head_node_request(Method::GET, "manager/scontrol_job", instance_id, user)
            .query("job_id", job_id);
        Ok(self.rethrow(None, self.execute(request).await)?.body)
    }

    /// Runs `sacct` with `args` as the JSON body.
    pub async fn slurm_accounting(
        &self,
        cluster_name: &str,
        instance_id: &str,
        user: Option<&str>,
        args: &Value,
    ) -> Result<Value> {
        let result = async {
            let request = self
                .head_node_request(Method::POST, "manager/sacct", instance_id, user)
                .query("cluster_name", cluster_name)
                .json(args)?;
            self.execute(request).await
        }
        .await;
        Ok(self.rethrow(None, result)?.body)
    }
}
