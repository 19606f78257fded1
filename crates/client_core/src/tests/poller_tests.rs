use std::{
    collections::VecDeque,
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc, Mutex,
    },
    time::Duration,
};

use async_trait::async_trait;
use serde_json::{json, Value};

use super::*;
use crate::error::ClientError;

/// Replays scripted descriptions; the last one repeats.
struct ScriptedSource {
    script: Mutex<VecDeque<Value>>,
    calls: AtomicUsize,
}

impl ScriptedSource {
    fn new(script: Vec<Value>) -> Arc<Self> {
        Arc::new(Self {
            script: Mutex::new(script.into()),
            calls: AtomicUsize::new(0),
        })
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ClusterSource for ScriptedSource {
    async fn poll_cluster(&self, _name: &str) -> Result<Value> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let mut script = self.script.lock().expect("script");
        let next = if script.len() > 1 {
            script.pop_front()
        } else {
            script.front().cloned()
        };
        match next {
            Some(Value::Null) | None => Err(ClientError::UnexpectedStatus {
                status: 500,
                body: String::new(),
            }),
            Some(description) => Ok(description),
        }
    }
}

fn busy() -> Value {
    json!({"clusterName": "c1", "clusterStatus": "CREATE_IN_PROGRESS", "computeFleetStatus": "STARTING"})
}

fn settled() -> Value {
    json!({"clusterName": "c1", "clusterStatus": "CREATE_COMPLETE", "computeFleetStatus": "RUNNING"})
}

async fn wait_until_stopped<S: ClusterSource>(poller: &ClusterPoller<S>, name: &str) {
    for _ in 0..200 {
        if !poller.is_polling(name) {
            return;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    panic!("poller for {name} never stopped");
}

#[tokio::test]
async fn stops_once_cluster_settles() {
    let source = ScriptedSource::new(vec![busy(), busy(), settled()]);
    let poller = ClusterPoller::with_interval(source.clone(), Duration::from_millis(5));

    poller.start("c1");
    assert!(poller.is_polling("c1"));
    wait_until_stopped(&poller, "c1").await;

    assert_eq!(source.calls(), 3);
}

#[tokio::test]
async fn stops_when_refresh_fails() {
    let source = ScriptedSource::new(vec![busy(), Value::Null]);
    let poller = ClusterPoller::with_interval(source.clone(), Duration::from_millis(5));

    poller.start("c1");
    wait_until_stopped(&poller, "c1").await;

    assert_eq!(source.calls(), 2);
}

#[tokio::test]
async fn starting_twice_keeps_one_task() {
    let source = ScriptedSource::new(vec![busy()]);
    let poller = ClusterPoller::with_interval(source.clone(), Duration::from_secs(60));

    poller.start("c1");
    poller.start("c1");
    tokio::time::sleep(Duration::from_millis(20)).await;

    // The first tick fires immediately; a second task would double it.
    assert_eq!(source.calls(), 1);
    assert!(poller.is_polling("c1"));
    poller.stop("c1");
    assert!(!poller.is_polling("c1"));
}

#[tokio::test]
async fn stop_of_unknown_key_is_a_no_op() {
    let poller = ClusterPoller::new(ScriptedSource::new(vec![busy()]));
    poller.stop("nope");
    assert!(!poller.is_polling("nope"));
}

#[tokio::test]
async fn keys_are_independent() {
    let source = ScriptedSource::new(vec![busy()]);
    let poller = ClusterPoller::with_interval(source, Duration::from_secs(60));

    poller.start("a");
    poller.start("b");
    poller.stop("a");

    assert!(!poller.is_polling("a"));
    assert!(poller.is_polling("b"));
    poller.stop_all();
    assert!(!poller.is_polling("b"));
}

#[test]
fn undecodable_description_counts_as_settled() {
    assert!(is_settled(&json!({"unexpected": true})));
    assert!(!is_settled(&busy()));
    assert!(is_settled(&settled()));
}
