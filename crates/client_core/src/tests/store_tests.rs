use std::sync::atomic::AtomicUsize;

use serde_json::json;

use super::*;

fn counter(store: &StateTree, path: impl Into<StatePath>) -> Arc<AtomicUsize> {
    let hits = Arc::new(AtomicUsize::new(0));
    let seen = Arc::clone(&hits);
    store.subscribe(path, move |_| {
        seen.fetch_add(1, Ordering::SeqCst);
    });
    hits
}

#[test]
fn get_returns_what_set_stored() {
    let store = StateTree::new();
    store.set(["app", "wizard", "page"], json!("queues"));
    assert_eq!(store.get(["app", "wizard", "page"]), Some(json!("queues")));
    assert_eq!(store.get(["app", "wizard"]), Some(json!({"page": "queues"})));
}

#[test]
fn missing_and_wrong_shaped_paths_read_as_none() {
    let store = StateTree::new();
    assert_eq!(store.get(["nothing", "here"]), None);

    store.set(["app", "selectedRegion"], json!("us-east-1"));
    assert_eq!(store.get(["app", "selectedRegion", "deeper"]), None);
}

#[test]
fn set_overwrites_containers_without_merging() {
    let store = StateTree::new();
    store.set(["clusters", "index", "a"], json!({"x": 1, "y": 2}));
    store.set(["clusters", "index", "a"], json!({"z": 3}));
    assert_eq!(store.get(["clusters", "index", "a"]), Some(json!({"z": 3})));

    store.set(["clusters", "index", "a", "z", "deep"], json!(true));
    assert_eq!(
        store.get(["clusters", "index", "a"]),
        Some(json!({"z": {"deep": true}}))
    );
}

#[test]
fn update_on_absent_path_receives_none() {
    let store = StateTree::new();
    let mut received = Some(json!("sentinel"));
    store.update(["app", "messages"], |current| {
        received = current;
        json!([1])
    });
    assert_eq!(received, None);
    assert_eq!(store.get(["app", "messages"]), Some(json!([1])));
}

#[test]
fn update_sees_current_value() {
    let store = StateTree::new();
    store.set(["count"], json!(1));
    store.update(["count"], |current| {
        json!(current.and_then(|value| value.as_i64()).unwrap_or(0) + 1)
    });
    assert_eq!(store.get(["count"]), Some(json!(2)));
}

#[test]
fn clear_removes_subtree_and_keeps_siblings() {
    let store = StateTree::new();
    store.set(["app", "wizard", "config"], json!({"Region": "eu-west-1"}));
    store.set(["app", "wizard", "page"], json!("storage"));

    store.clear(["app", "wizard", "config"]);

    assert_eq!(store.get(["app", "wizard", "config"]), None);
    assert_eq!(store.get(["app", "wizard", "page"]), Some(json!("storage")));
}

#[test]
fn numeric_segments_index_existing_arrays() {
    let store = StateTree::new();
    store.set(
        ["config", "Scheduling", "SlurmQueues"],
        json!([{"Name": "q0"}, {"Name": "q1"}]),
    );
    store.set(["config", "Scheduling", "SlurmQueues", "1", "Name"], json!("gpu"));
    assert_eq!(
        store.get(["config", "Scheduling", "SlurmQueues", "1", "Name"]),
        Some(json!("gpu"))
    );
    assert_eq!(
        store.get(["config", "Scheduling", "SlurmQueues"]),
        Some(json!([{"Name": "q0"}, {"Name": "gpu"}]))
    );
}

#[test]
fn ancestor_and_descendant_subscribers_are_notified() {
    let store = StateTree::new();
    let ancestor = counter(&store, ["app"]);
    let exact = counter(&store, ["app", "wizard", "page"]);
    let descendant = counter(&store, ["app", "wizard", "page", "extra"]);
    let unrelated = counter(&store, ["clusters"]);
    let sibling = counter(&store, ["app", "messages"]);

    store.set(["app", "wizard", "page"], json!("cluster"));

    assert_eq!(ancestor.load(Ordering::SeqCst), 1);
    assert_eq!(exact.load(Ordering::SeqCst), 1);
    assert_eq!(descendant.load(Ordering::SeqCst), 1);
    assert_eq!(unrelated.load(Ordering::SeqCst), 0);
    assert_eq!(sibling.load(Ordering::SeqCst), 0);
}

#[test]
fn subscribe_returns_current_value_and_delivers_new_one() {
    let store = StateTree::new();
    store.set(["app", "selectedRegion"], json!("us-east-1"));

    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&seen);
    let (current, id) = store.subscribe(["app", "selectedRegion"], move |change| {
        sink.lock().expect("lock").push(change.value.clone());
    });
    assert_eq!(current, Some(json!("us-east-1")));

    store.set(["app", "selectedRegion"], json!("eu-west-1"));
    assert!(store.unsubscribe(id));
    store.set(["app", "selectedRegion"], json!("ap-south-1"));

    assert_eq!(*seen.lock().expect("lock"), vec![Some(json!("eu-west-1"))]);
}

#[test]
fn listeners_may_read_the_store() {
    let store = StateTree::new();
    let reader = store.clone();
    let seen = Arc::new(Mutex::new(None));
    let sink = Arc::clone(&seen);
    store.subscribe(["a"], move |_| {
        *sink.lock().expect("lock") = reader.get(["a", "b"]);
    });
    store.set(["a", "b"], json!(5));
    assert_eq!(*seen.lock().expect("lock"), Some(json!(5)));
}

#[test]
fn clearing_missing_path_does_not_notify() {
    let store = StateTree::new();
    let hits = counter(&store, ["app"]);
    store.clear(["app", "wizard"]);
    assert_eq!(hits.load(Ordering::SeqCst), 0);
}

#[test]
fn lens_reads_typed_values() {
    let store = StateTree::new();
    let page = paths::wizard_page();
    assert_eq!(page.get(&store), None);

    page.set(&store, &shared::domain::Page::HeadNode);
    assert_eq!(store.get(["app", "wizard", "page"]), Some(json!("headNode")));
    assert_eq!(page.get(&store), Some(shared::domain::Page::HeadNode));

    store.set(["app", "wizard", "page"], json!(42));
    assert_eq!(page.get(&store), None);
}

#[test]
fn separate_instances_do_not_share_state() {
    let first = StateTree::new();
    let second = StateTree::new();
    first.set(["a"], json!(1));
    assert_eq!(second.get(["a"]), None);
    assert_eq!(first.clone().get(["a"]), Some(json!(1)));
}

#[test]
fn state_path_macro_accepts_mixed_segments() {
    let index = 3;
    let path = crate::state_path!["Scheduling", "SlurmQueues", index];
    assert_eq!(path.to_string(), "Scheduling.SlurmQueues.3");
}

#[test]
fn clearing_an_array_element_keeps_sibling_positions() {
    let store = StateTree::new();
    store.set(["q"], json!(["a", "b", "c"]));

    store.clear(["q", "0"]);

    assert_eq!(store.get(["q", "0"]), None);
    assert_eq!(store.get(["q", "1"]), Some(json!("b")));
    assert_eq!(store.get(["q", "2"]), Some(json!("c")));
    assert_eq!(store.get(["q"]), Some(json!([null, "b", "c"])));
}

#[test]
fn clearing_a_cleared_element_does_not_notify() {
    let store = StateTree::new();
    store.set(["q"], json!(["a", "b"]));
    store.clear(["q", "0"]);
    let hits = counter(&store, ["q"]);

    store.clear(["q", "0"]);

    assert_eq!(hits.load(Ordering::SeqCst), 0);
}

#[test]
fn writing_past_the_end_pads_the_array() {
    let store = StateTree::new();
    store.set(["q"], json!(["a", "b"]));

    store.set(["q", "4"], json!("z"));

    assert_eq!(store.get(["q", "0"]), Some(json!("a")));
    assert_eq!(store.get(["q", "2"]), None);
    assert_eq!(store.get(["q", "4"]), Some(json!("z")));
    assert_eq!(store.get(["q"]), Some(json!(["a", "b", null, null, "z"])));
}

#[test]
fn non_numeric_segment_leaves_array_intact() {
    let store = StateTree::new();
    store.set(["q"], json!(["a", "b"]));
    let hits = counter(&store, ["q"]);

    store.set(["q", "name"], json!("z"));
    store.set(["q", "1", "deep"], json!(1));

    assert_eq!(store.get(["q", "0"]), Some(json!("a")));
    assert_eq!(store.get(["q", "1", "deep"]), Some(json!(1)));
    assert_eq!(hits.load(Ordering::SeqCst), 1);
}

#[test]
fn detached_set_reports_skipped_writes() {
    let mut document = json!({"list": [1, 2]});

    assert!(!set_at(&mut document, &["list", "x"], json!(3)));
    assert!(set_at(&mut document, &["list", "3"], json!(4)));

    assert_eq!(document, json!({"list": [1, 2, null, 4]}));
}
