//! Path-addressed state tree shared by every console component.
//!
//! Values are JSON documents addressed by ordered string segments. Reads of
//! missing or wrong-shaped paths yield `None`; writes create intermediate
//! objects on demand. Listeners registered on a path are invoked after any
//! write to that path, one of its ancestors, or one of its descendants.

use std::{
    fmt,
    marker::PhantomData,
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc, Mutex, MutexGuard, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard,
    },
};

use serde::{de::DeserializeOwned, Serialize};
use serde_json::{Map, Value};
use tracing::{trace, warn};

#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct StatePath(Vec<String>);

impl StatePath {
    pub fn root() -> Self {
        Self(Vec::new())
    }

    pub fn from_segments(segments: Vec<String>) -> Self {
        Self(segments)
    }

    pub fn segments(&self) -> &[String] {
        &self.0
    }

    pub fn is_root(&self) -> bool {
        self.0.is_empty()
    }

    pub fn join(&self, segment: impl Into<String>) -> Self {
        let mut segments = self.0.clone();
        segments.push(segment.into());
        Self(segments)
    }

    pub fn extend<I, S>(&self, segments: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut joined = self.0.clone();
        joined.extend(segments.into_iter().map(Into::into));
        Self(joined)
    }

    pub fn starts_with(&self, prefix: &StatePath) -> bool {
        self.0.starts_with(&prefix.0)
    }

    /// True when one path is a prefix of (or equal to) the other.
    pub fn overlaps(&self, other: &StatePath) -> bool {
        self.starts_with(other) || other.starts_with(self)
    }
}

impl fmt::Display for StatePath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0.join("."))
    }
}

impl<const N: usize> From<[&str; N]> for StatePath {
    fn from(value: [&str; N]) -> Self {
        Self(value.iter().map(|segment| segment.to_string()).collect())
    }
}

impl From<&[&str]> for StatePath {
    fn from(value: &[&str]) -> Self {
        Self(value.iter().map(|segment| segment.to_string()).collect())
    }
}

impl From<Vec<String>> for StatePath {
    fn from(value: Vec<String>) -> Self {
        Self(value)
    }
}

impl From<&StatePath> for StatePath {
    fn from(value: &StatePath) -> Self {
        value.clone()
    }
}

/// Builds a [`StatePath`] from any `ToString` segments.
#[macro_export]
macro_rules! state_path {
    ($($segment:expr),* $(,)?) => {
        $crate::store::StatePath::from_segments(vec![$(($segment).to_string()),*])
    };
}

/// Array slots holding `null` read as absent; they mark cleared elements.
fn child<'a>(node: &'a Value, segment: &str) -> Option<&'a Value> {
    match node {
        Value::Object(map) => map.get(segment),
        Value::Array(items) => segment
            .parse::<usize>()
            .ok()
            .and_then(|index| items.get(index))
            .filter(|item| !item.is_null()),
        _ => None,
    }
}

fn child_mut<'a>(node: &'a mut Value, segment: &str) -> Option<&'a mut Value> {
    match node {
        Value::Object(map) => map.get_mut(segment),
        Value::Array(items) => segment
            .parse::<usize>()
            .ok()
            .and_then(move |index| items.get_mut(index)),
        _ => None,
    }
}

/// Returns the child slot for `segment`, creating it when missing. Arrays
/// are padded with `null` up to a numeric index; a non-numeric segment
/// cannot address an array and yields `None`. Other non-container nodes
/// are replaced by an empty object first.
fn slot<'a>(node: &'a mut Value, segment: &str) -> Option<&'a mut Value> {
    match node {
        Value::Array(items) => {
            let index = segment.parse::<usize>().ok()?;
            if index >= items.len() {
                items.resize(index + 1, Value::Null);
            }
            items.get_mut(index)
        }
        other => {
            if !other.is_object() {
                *other = Value::Object(Map::new());
            }
            Some(&mut other[segment])
        }
    }
}

pub fn get_in<'a>(root: &'a Value, path: &[String]) -> Option<&'a Value> {
    path.iter().try_fold(root, |node, segment| child(node, segment))
}

/// Writes `value` at `path`. Returns `false`, leaving the document
/// untouched, when a segment cannot address an existing array.
pub fn set_in(root: &mut Value, path: &[String], value: Value) -> bool {
    write_at(root, path.iter().map(String::as_str), value)
}

fn write_at<'s>(root: &mut Value, path: impl Iterator<Item = &'s str> + Clone, value: Value) -> bool {
    if !addressable(root, path.clone()) {
        warn!(
            path = %path.collect::<Vec<_>>().join("."),
            "store: non-numeric segment addresses an array, write skipped"
        );
        return false;
    }
    let mut node = root;
    for segment in path {
        match slot(node, segment) {
            Some(next) => node = next,
            None => return false,
        }
    }
    *node = value;
    true
}

/// True when every existing array on `path` is addressed by a numeric
/// segment, so a write will not need to drop any element.
fn addressable<'s>(root: &Value, path: impl Iterator<Item = &'s str>) -> bool {
    let mut node = Some(root);
    for segment in path {
        let Some(current) = node else {
            return true;
        };
        if current.is_array() && segment.parse::<usize>().is_err() {
            return false;
        }
        node = match current {
            Value::Object(map) => map.get(segment),
            Value::Array(items) => segment.parse::<usize>().ok().and_then(|index| items.get(index)),
            _ => None,
        };
    }
    true
}

/// Removes the value at `path`. Array elements are nulled in place so
/// sibling indices keep their values. Returns whether anything was removed.
pub fn clear_in(root: &mut Value, path: &[String]) -> bool {
    let Some((last, parents)) = path.split_last() else {
        *root = Value::Object(Map::new());
        return true;
    };
    let Some(parent) = parents
        .iter()
        .try_fold(root, |node, segment| child_mut(node, segment))
    else {
        return false;
    };
    match parent {
        Value::Object(map) => map.remove(last.as_str()).is_some(),
        Value::Array(items) => match last.parse::<usize>().ok().and_then(|index| items.get_mut(index)) {
            Some(item) if !item.is_null() => {
                *item = Value::Null;
                true
            }
            _ => false,
        },
        _ => false,
    }
}

/// Convenience for string-literal paths over detached documents.
pub fn get_at<'a>(root: &'a Value, path: &[&str]) -> Option<&'a Value> {
    path.iter().try_fold(root, |node, segment| child(node, segment))
}

pub fn set_at(root: &mut Value, path: &[&str], value: Value) -> bool {
    write_at(root, path.iter().copied(), value)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

/// Delivered to a listener after a write that touched its path.
#[derive(Debug, Clone, PartialEq)]
pub struct StateChange {
    /// Path that was written.
    pub written: StatePath,
    /// Value at the subscribed path after the write.
    pub value: Option<Value>,
}

pub type Listener = Arc<dyn Fn(&StateChange) + Send + Sync>;

struct Subscriber {
    id: SubscriptionId,
    path: StatePath,
    listener: Listener,
}

struct StoreInner {
    root: RwLock<Value>,
    subscribers: Mutex<Vec<Subscriber>>,
    next_subscription: AtomicU64,
}

/// Cheaply clonable handle; clones share the same tree.
#[derive(Clone)]
pub struct StateTree {
    inner: Arc<StoreInner>,
}

impl Default for StateTree {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for StateTree {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StateTree")
            .field("root", &*self.read_root())
            .finish()
    }
}

impl StateTree {
    pub fn new() -> Self {
        Self::with_value(Value::Object(Map::new()))
    }

    pub fn with_value(root: Value) -> Self {
        Self {
            inner: Arc::new(StoreInner {
                root: RwLock::new(root),
                subscribers: Mutex::new(Vec::new()),
                next_subscription: AtomicU64::new(1),
            }),
        }
    }

    fn read_root(&self) -> RwLockReadGuard<'_, Value> {
        self.inner.root.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write_root(&self) -> RwLockWriteGuard<'_, Value> {
        self.inner.root.write().unwrap_or_else(PoisonError::into_inner)
    }

    fn subscribers(&self) -> MutexGuard<'_, Vec<Subscriber>> {
        self.inner
            .subscribers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    pub fn get(&self, path: impl Into<StatePath>) -> Option<Value> {
        let path = path.into();
        get_in(&self.read_root(), path.segments()).cloned()
    }

    /// Typed read; absent or wrong-shaped values yield `None`.
    pub fn get_as<T: DeserializeOwned>(&self, path: impl Into<StatePath>) -> Option<T> {
        self.get(path)
            .and_then(|value| serde_json::from_value(value).ok())
    }

    pub fn get_str(&self, path: impl Into<StatePath>) -> Option<String> {
        self.get(path)
            .and_then(|value| value.as_str().map(str::to_owned))
    }

    pub fn get_bool(&self, path: impl Into<StatePath>) -> bool {
        self.get(path)
            .and_then(|value| value.as_bool())
            .unwrap_or(false)
    }

    pub fn snapshot(&self) -> Value {
        self.read_root().clone()
    }

    pub fn set(&self, path: impl Into<StatePath>, value: Value) {
        let path = path.into();
        {
            let mut root = self.write_root();
            if !set_in(&mut root, path.segments(), value) {
                return;
            }
        }
        trace!(path = %path, "store: set");
        self.notify(&path);
    }

    /// Serialises `value` and stores it; a value that cannot be represented
    /// as JSON is logged and skipped.
    pub fn set_as<T: Serialize>(&self, path: impl Into<StatePath>, value: &T) {
        let path = path.into();
        match serde_json::to_value(value) {
            Ok(value) => self.set(path, value),
            Err(err) => warn!(path = %path, "store: value not representable: {err}"),
        }
    }

    /// Reads, applies `f`, and writes under one lock. `f` must not access
    /// this store.
    pub fn update<F>(&self, path: impl Into<StatePath>, f: F)
    where
        F: FnOnce(Option<Value>) -> Value,
    {
        let path = path.into();
        {
            let mut root = self.write_root();
            let current = get_in(&root, path.segments()).cloned();
            let next = f(current);
            if !set_in(&mut root, path.segments(), next) {
                return;
            }
        }
        trace!(path = %path, "store: update");
        self.notify(&path);
    }

    pub fn clear(&self, path: impl Into<StatePath>) {
        let path = path.into();
        let removed = {
            let mut root = self.write_root();
            clear_in(&mut root, path.segments())
        };
        if removed {
            trace!(path = %path, "store: clear");
            self.notify(&path);
        }
    }

    /// Registers `listener` on `path` and returns the current value there.
    pub fn subscribe<F>(
        &self,
        path: impl Into<StatePath>,
        listener: F,
    ) -> (Option<Value>, SubscriptionId)
    where
        F: Fn(&StateChange) + Send + Sync + 'static,
    {
        let path = path.into();
        let id = SubscriptionId(
            self.inner
                .next_subscription
                .fetch_add(1, Ordering::Relaxed),
        );
        let current = self.get(&path);
        self.subscribers().push(Subscriber {
            id,
            path,
            listener: Arc::new(listener),
        });
        (current, id)
    }

    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let mut subscribers = self.subscribers();
        let before = subscribers.len();
        subscribers.retain(|subscriber| subscriber.id != id);
        subscribers.len() != before
    }

    fn notify(&self, written: &StatePath) {
        let interested: Vec<(StatePath, Listener)> = self
            .subscribers()
            .iter()
            .filter(|subscriber| subscriber.path.overlaps(written))
            .map(|subscriber| (subscriber.path.clone(), Arc::clone(&subscriber.listener)))
            .collect();

        for (path, listener) in interested {
            let change = StateChange {
                written: written.clone(),
                value: self.get(&path),
            };
            listener(&change);
        }
    }
}

/// A [`StatePath`] paired with the type stored there.
pub struct Lens<T> {
    path: StatePath,
    _marker: PhantomData<fn() -> T>,
}

impl<T> Clone for Lens<T> {
    fn clone(&self) -> Self {
        Self {
            path: self.path.clone(),
            _marker: PhantomData,
        }
    }
}

impl<T> fmt::Debug for Lens<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Lens").field(&self.path).finish()
    }
}

impl<T: Serialize + DeserializeOwned> Lens<T> {
    pub fn new(path: impl Into<StatePath>) -> Self {
        Self {
            path: path.into(),
            _marker: PhantomData,
        }
    }

    pub fn path(&self) -> &StatePath {
        &self.path
    }

    pub fn get(&self, store: &StateTree) -> Option<T> {
        store.get_as(&self.path)
    }

    pub fn set(&self, store: &StateTree, value: &T) {
        store.set_as(&self.path, value);
    }

    pub fn clear(&self, store: &StateTree) {
        store.clear(&self.path);
    }
}

/// Well-known locations in the tree.
pub mod paths {
    use shared::domain::Page;

    use super::{Lens, StatePath};

    pub fn selected_region() -> Lens<String> {
        Lens::new(["app", "selectedRegion"])
    }

    pub fn default_region() -> Lens<String> {
        Lens::new(["aws", "region"])
    }

    pub fn messages() -> StatePath {
        StatePath::from(["app", "messages"])
    }

    pub fn app_version() -> StatePath {
        StatePath::from(["app", "version"])
    }

    pub fn selected_cluster() -> Lens<String> {
        Lens::new(["app", "clusters", "selected"])
    }

    pub fn cluster_list() -> StatePath {
        StatePath::from(["clusters", "list"])
    }

    pub fn clusters_index() -> StatePath {
        StatePath::from(["clusters", "index"])
    }

    pub fn cluster(name: &str) -> StatePath {
        clusters_index().join(name)
    }

    pub fn custom_images_list() -> StatePath {
        StatePath::from(["customImages", "list"])
    }

    pub fn custom_image(image_id: &str) -> StatePath {
        StatePath::from(["customImages", "index"]).join(image_id)
    }

    pub fn official_images() -> StatePath {
        StatePath::from(["officialImages", "list"])
    }

    pub fn users_index() -> StatePath {
        StatePath::from(["users", "index"])
    }

    pub fn identity() -> StatePath {
        StatePath::from(["identity"])
    }

    pub fn aws() -> StatePath {
        StatePath::from(["aws"])
    }

    pub fn wizard() -> StatePath {
        StatePath::from(["app", "wizard"])
    }

    pub fn wizard_key(key: &str) -> StatePath {
        wizard().join(key)
    }

    pub fn wizard_page() -> Lens<Page> {
        Lens::new(wizard_key("page"))
    }

    pub fn wizard_editing() -> Lens<bool> {
        Lens::new(wizard_key("editing"))
    }

    pub fn wizard_config() -> StatePath {
        wizard_key("config")
    }

    pub fn wizard_errors() -> StatePath {
        wizard_key("errors")
    }

    pub fn wizard_page_errors(page: Page) -> StatePath {
        wizard_errors().join(page.key())
    }

    pub fn wizard_source_loading() -> StatePath {
        wizard().extend(["source", "loading"])
    }

    pub fn wizard_submit_loading() -> StatePath {
        wizard().extend(["submit", "loading"])
    }
}

#[cfg(test)]
#[path = "tests/store_tests.rs"]
mod tests;
