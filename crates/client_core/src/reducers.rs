//! Merge rules applied to the state tree after successful backend calls.

use serde_json::{json, Map, Value};
use shared::protocol::{LogStream, LogStreamView};

/// Shallow merge: named fields of `incoming` overwrite those of `existing`.
/// A missing or non-object `existing` is replaced outright.
pub fn merge_record(existing: Option<Value>, incoming: Value) -> Value {
    match (existing, incoming) {
        (Some(Value::Object(mut current)), Value::Object(fields)) => {
            current.extend(fields);
            Value::Object(current)
        }
        (_, incoming) => incoming,
    }
}

/// Builds `{record[key]: record}`; records without a string key are dropped.
pub fn index_by(records: &[Value], key: &str) -> Value {
    let index: Map<String, Value> = records
        .iter()
        .filter_map(|record| {
            record
                .get(key)
                .and_then(Value::as_str)
                .map(|id| (id.to_string(), record.clone()))
        })
        .collect();
    Value::Object(index)
}

fn name_tag(resource: &Value) -> String {
    resource
        .get("Tags")
        .and_then(Value::as_array)
        .and_then(|tags| {
            tags.iter()
                .find(|tag| tag.get("Key").and_then(Value::as_str) == Some("Name"))
        })
        .and_then(|tag| tag.get("Value"))
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string()
}

fn str_field(resource: &Value, field: &str) -> String {
    resource
        .get(field)
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string()
}

fn display_entry(id: String, name: String, kind: String) -> Value {
    let display_name = format!("{id} {name}");
    json!({
        "id": id,
        "name": name,
        "type": kind,
        "displayName": display_name,
    })
}

fn group_by_type(entries: Vec<Value>, groups: &[(&str, &str)]) -> Value {
    let mut grouped = Map::new();
    for (group, kind) in groups {
        let members: Vec<Value> = entries
            .iter()
            .filter(|entry| entry.get("type").and_then(Value::as_str) == Some(kind))
            .cloned()
            .collect();
        grouped.insert(group.to_string(), Value::Array(members));
    }
    Value::Object(grouped)
}

fn as_list(value: Option<&Value>) -> &[Value] {
    value
        .and_then(Value::as_array)
        .map(Vec::as_slice)
        .unwrap_or_default()
}

pub fn extract_fsx_filesystems(filesystems: Option<&Value>) -> Value {
    let entries = as_list(filesystems)
        .iter()
        .map(|fs| {
            display_entry(
                str_field(fs, "FileSystemId"),
                name_tag(fs),
                str_field(fs, "FileSystemType"),
            )
        })
        .collect();
    group_by_type(
        entries,
        &[("lustre", "LUSTRE"), ("zfs", "OPENZFS"), ("ontap", "ONTAP")],
    )
}

pub fn extract_fsx_volumes(volumes: Option<&Value>) -> Value {
    let entries = as_list(volumes)
        .iter()
        .map(|volume| {
            display_entry(
                str_field(volume, "VolumeId"),
                str_field(volume, "Name"),
                str_field(volume, "VolumeType"),
            )
        })
        .collect();
    group_by_type(entries, &[("zfs", "OPENZFS"), ("ontap", "ONTAP")])
}

pub fn extract_file_caches(file_caches: Option<&Value>) -> Value {
    let entries = as_list(file_caches)
        .iter()
        .map(|cache| {
            display_entry(
                str_field(cache, "FileCacheId"),
                name_tag(cache),
                str_field(cache, "FileCacheType"),
            )
        })
        .collect();
    group_by_type(entries, &[("lustre", "LUSTRE")])
}

/// Reshapes a `get_aws_configuration` payload for the `aws` subtree.
pub fn aws_inventory(mut payload: Value) -> Value {
    let Some(fields) = payload.as_object_mut() else {
        return payload;
    };
    let filesystems = fields.remove("fsx_filesystems");
    let volumes = fields.remove("fsx_volumes");
    let caches = fields.remove("file_caches");

    let mut inventory = fields.clone();
    inventory.insert(
        "fsxFilesystems".into(),
        extract_fsx_filesystems(filesystems.as_ref()),
    );
    inventory.insert("fsxVolumes".into(), extract_fsx_volumes(volumes.as_ref()));
    inventory.insert("fileCaches".into(), extract_file_caches(caches.as_ref()));
    Value::Object(inventory)
}

pub fn to_log_stream_view(stream: &LogStream) -> LogStreamView {
    let mut parts = stream.log_stream_name.splitn(3, '.');
    let mut next = || parts.next().unwrap_or_default().to_string();
    let hostname = next();
    let instance_id = next();
    let log_identifier = next();
    LogStreamView {
        log_stream_name: stream.log_stream_name.clone(),
        hostname,
        instance_id,
        log_identifier,
        last_event_timestamp: stream.last_event_timestamp,
        node_type: None,
    }
}
