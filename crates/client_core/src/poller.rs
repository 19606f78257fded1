//! Keyed background refresh of cluster descriptions.
//!
//! A poll task runs per cluster name while the cluster is provisioning or
//! its compute fleet is transitioning, and stops on its own once the cluster
//! settles or a refresh fails.

use std::{
    collections::HashMap,
    sync::{Arc, Mutex, MutexGuard, PoisonError},
    time::Duration,
};

use async_trait::async_trait;
use serde_json::Value;
use shared::protocol::ClusterDescription;
use tokio::task::JoinHandle;
use tokio_stream::{wrappers::IntervalStream, StreamExt};
use tracing::{debug, info};

use crate::{error::Result, ConsoleClient};

pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(5);

#[async_trait]
pub trait ClusterSource: Send + Sync + 'static {
    /// Refreshes one cluster and returns its latest description.
    async fn poll_cluster(&self, name: &str) -> Result<Value>;
}

#[async_trait]
impl ClusterSource for ConsoleClient {
    async fn poll_cluster(&self, name: &str) -> Result<Value> {
        self.describe_cluster(name).await
    }
}

fn is_settled(description: &Value) -> bool {
    serde_json::from_value::<ClusterDescription>(description.clone())
        .map(|description| description.is_settled())
        .unwrap_or(true)
}

struct PollTask {
    generation: u64,
    handle: JoinHandle<()>,
}

#[derive(Default)]
struct Registry {
    next_generation: u64,
    tasks: HashMap<String, PollTask>,
}

pub struct ClusterPoller<S: ClusterSource> {
    source: Arc<S>,
    interval: Duration,
    registry: Arc<Mutex<Registry>>,
}

impl<S: ClusterSource> Clone for ClusterPoller<S> {
    fn clone(&self) -> Self {
        Self {
            source: Arc::clone(&self.source),
            interval: self.interval,
            registry: Arc::clone(&self.registry),
        }
    }
}

fn lock(registry: &Mutex<Registry>) -> MutexGuard<'_, Registry> {
    registry.lock().unwrap_or_else(PoisonError::into_inner)
}

impl<S: ClusterSource> ClusterPoller<S> {
    pub fn new(source: Arc<S>) -> Self {
        Self::with_interval(source, DEFAULT_POLL_INTERVAL)
    }

    pub fn with_interval(source: Arc<S>, interval: Duration) -> Self {
        Self {
            source,
            interval,
            registry: Arc::new(Mutex::new(Registry::default())),
        }
    }

    /// Starts polling `name`. A running poll for the same name is left alone.
    pub fn start(&self, name: &str) {
        let mut registry = lock(&self.registry);
        if registry
            .tasks
            .get(name)
            .is_some_and(|task| !task.handle.is_finished())
        {
            return;
        }

        registry.next_generation += 1;
        let generation = registry.next_generation;
        let source = Arc::clone(&self.source);
        let shared_registry = Arc::clone(&self.registry);
        let key = name.to_string();
        let period = self.interval;

        let handle = tokio::spawn(async move {
            let mut ticks = IntervalStream::new(tokio::time::interval(period));
            while ticks.next().await.is_some() {
                match source.poll_cluster(&key).await {
                    Ok(description) if is_settled(&description) => {
                        debug!(cluster = %key, "poller: cluster settled");
                        break;
                    }
                    Ok(_) => {}
                    Err(err) => {
                        debug!(cluster = %key, "poller: refresh failed, stopping: {err}");
                        break;
                    }
                }
            }
            let mut registry = lock(&shared_registry);
            if registry
                .tasks
                .get(&key)
                .is_some_and(|task| task.generation == generation)
            {
                registry.tasks.remove(&key);
            }
        });

        info!(cluster = %name, interval_ms = period.as_millis() as u64, "poller: started");
        registry
            .tasks
            .insert(name.to_string(), PollTask { generation, handle });
    }

    /// Stops polling `name`; unknown names are ignored.
    pub fn stop(&self, name: &str) {
        if let Some(task) = lock(&self.registry).tasks.remove(name) {
            task.handle.abort();
            info!(cluster = %name, "poller: stopped");
        }
    }

    pub fn stop_all(&self) {
        let tasks: Vec<_> = lock(&self.registry).tasks.drain().collect();
        for (_, task) in tasks {
            task.handle.abort();
        }
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    pub fn is_polling(&self, name: &str) -> bool {
        lock(&self.registry)
            .tasks
            .get(name)
            .is_some_and(|task| !task.handle.is_finished())
    }
}

#[cfg(test)]
#[path = "tests/poller_tests.rs"]
mod tests;
