//! Importing external configuration documents into the wizard.
//!
//! [`normalize`] is pure: it fills fixed defaults and derives the values
//! the wizard displays alongside the document. [`apply`] writes the result
//! into the `app.wizard` subtree.

use serde_json::{json, Value};
use tracing::{debug, info};

use crate::{
    error::Result,
    feature_flags::map_compute_resources,
    store::{get_at, paths, set_at, StateTree},
    ConsoleClient,
};

pub const PRODUCT_TAG_KEY: &str = "parallelcluster-ui";
pub const DEFAULT_OS: &str = "alinux2";
pub const DEFAULT_SCHEDULER: &str = "slurm";
pub const DEFAULT_HEAD_NODE_INSTANCE_TYPE: &str = "t2.micro";

const KEY_NAME_PATH: [&str; 3] = ["HeadNode", "Ssh", "KeyName"];

/// Decodes a YAML configuration document. An empty document is an empty map.
pub fn decode_config(yaml: &str) -> Result<Value> {
    let config: Value = serde_yaml::from_str(yaml)?;
    Ok(match config {
        Value::Null => json!({}),
        other => other,
    })
}

pub fn encode_config(config: &Value) -> Result<String> {
    Ok(serde_yaml::to_string(config)?)
}

/// Adds the `parallelcluster-ui` tag unless one is already present.
pub fn apply_product_tags(config: Value) -> Value {
    let mut config = match config {
        Value::Object(_) => config,
        _ => json!({}),
    };
    let mut tags = config
        .get("Tags")
        .and_then(Value::as_array)
        .cloned()
        .unwrap_or_default();
    let tagged = tags
        .iter()
        .any(|tag| tag.get("Key").and_then(Value::as_str) == Some(PRODUCT_TAG_KEY));
    if !tagged {
        tags.push(json!({"Key": PRODUCT_TAG_KEY, "Value": "true"}));
    }
    config["Tags"] = Value::Array(tags);
    config
}

/// YAML in, tagged YAML out.
pub fn map_and_apply_tags(yaml: &str) -> Result<String> {
    encode_config(&apply_product_tags(decode_config(yaml)?))
}

fn is_truthy(value: Option<&Value>) -> bool {
    match value {
        None | Some(Value::Null) => false,
        Some(Value::Bool(flag)) => *flag,
        Some(Value::String(text)) => !text.is_empty(),
        Some(Value::Number(number)) => number.as_f64().is_some_and(|n| n != 0.0),
        Some(Value::Array(_)) | Some(Value::Object(_)) => true,
    }
}

/// Inventory the defaults depend on.
#[derive(Debug, Clone, Default)]
pub struct TemplateContext {
    pub subnets: Vec<Value>,
    pub keypairs: Vec<Value>,
    pub version: Option<String>,
    pub default_region: Option<String>,
}

impl TemplateContext {
    pub fn from_store(store: &StateTree) -> Self {
        let list = |path: [&str; 2]| -> Vec<Value> {
            store
                .get(path)
                .and_then(|value| value.as_array().cloned())
                .unwrap_or_default()
        };
        Self {
            subnets: list(["aws", "subnets"]),
            keypairs: list(["aws", "keypairs"]),
            version: store.get_str(paths::wizard_key("version")),
            default_region: paths::default_region().get(store),
        }
    }

    fn vpc_of_subnet(&self, subnet_id: &str) -> Option<String> {
        self.subnets
            .iter()
            .find(|subnet| subnet.get("SubnetId").and_then(Value::as_str) == Some(subnet_id))
            .and_then(|subnet| subnet.get("VpcId"))
            .and_then(Value::as_str)
            .map(str::to_owned)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct NormalizedTemplate {
    pub config: Value,
    pub vpc: Option<String>,
    pub custom_ami: bool,
    pub multi_user: bool,
    pub storage_ui: Value,
}

/// Settings block and id field that reference an existing resource, per
/// shared storage type.
fn existing_resource_field(storage_type: &str) -> Option<(&'static str, &'static str)> {
    match storage_type {
        "Ebs" => Some(("EbsSettings", "VolumeId")),
        "Efs" => Some(("EfsSettings", "FileSystemId")),
        "FsxLustre" => Some(("FsxLustreSettings", "FileSystemId")),
        "FsxOpenZfs" => Some(("FsxOpenZfsSettings", "VolumeId")),
        "FsxOntap" => Some(("FsxOntapSettings", "VolumeId")),
        "FileCache" => Some(("FileCacheSettings", "FileCacheId")),
        _ => None,
    }
}

pub fn storage_ui_settings(storages: &[Value]) -> Value {
    storages
        .iter()
        .map(|storage| {
            let use_existing = storage
                .get("StorageType")
                .and_then(Value::as_str)
                .and_then(existing_resource_field)
                .is_some_and(|(settings, id)| {
                    is_truthy(storage.get(settings).and_then(|block| block.get(id)))
                });
            json!({"useExisting": use_existing})
        })
        .collect()
}

/// EFA-enabled compute resources without an explicit GDR flag get one.
fn normalize_compute_resource(resource: &mut Value) {
    if !is_truthy(get_at(resource, &["Efa", "Enabled"])) {
        return;
    }
    let gdr_is_bool = get_at(resource, &["Efa", "GdrSupport"]).is_some_and(Value::is_boolean);
    if !gdr_is_bool {
        set_at(resource, &["Efa", "GdrSupport"], Value::Bool(true));
    }
}

pub fn normalize(mut config: Value, ctx: &TemplateContext) -> NormalizedTemplate {
    if !config.is_object() {
        config = json!({});
    }

    let custom_ami = is_truthy(get_at(&config, &["Image", "CustomAmi"]));
    if !is_truthy(get_at(&config, &["Image", "Os"])) && !custom_ami {
        set_at(&mut config, &["Image", "Os"], json!(DEFAULT_OS));
    }
    if !is_truthy(get_at(&config, &["Scheduling", "Scheduler"])) {
        set_at(&mut config, &["Scheduling", "Scheduler"], json!(DEFAULT_SCHEDULER));
    }
    if !is_truthy(get_at(&config, &["HeadNode", "InstanceType"])) {
        set_at(
            &mut config,
            &["HeadNode", "InstanceType"],
            json!(DEFAULT_HEAD_NODE_INSTANCE_TYPE),
        );
    }

    let vpc = get_at(&config, &["HeadNode", "Networking", "SubnetId"])
        .and_then(Value::as_str)
        .and_then(|subnet| ctx.vpc_of_subnet(subnet));

    let multi_user = is_truthy(config.get("DirectoryService"));

    let storage_ui = storage_ui_settings(
        config
            .get("SharedStorage")
            .and_then(Value::as_array)
            .map(Vec::as_slice)
            .unwrap_or_default(),
    );

    if let Some(queues) = config
        .get_mut("Scheduling")
        .and_then(|scheduling| scheduling.get_mut("SlurmQueues"))
        .and_then(Value::as_array_mut)
    {
        for queue in queues {
            if let Some(resources) = queue
                .get_mut("ComputeResources")
                .and_then(Value::as_array_mut)
            {
                map_compute_resources(
                    ctx.version.as_deref(),
                    ctx.default_region.as_deref(),
                    resources,
                );
                resources.iter_mut().for_each(normalize_compute_resource);
            }
        }
    }

    if let Some(first) = ctx.keypairs.first() {
        let configured = get_at(&config, &KEY_NAME_PATH).and_then(Value::as_str);
        let known = ctx.keypairs.iter().any(|keypair| {
            configured.is_some() && keypair.get("KeyName").and_then(Value::as_str) == configured
        });
        if !known {
            if let Some(name) = first.get("KeyName").cloned() {
                set_at(&mut config, &KEY_NAME_PATH, name);
            }
        }
    }

    NormalizedTemplate {
        config,
        vpc,
        custom_ami,
        multi_user,
        storage_ui,
    }
}

/// Writes a normalized template into the wizard and rewinds to the first page.
pub fn apply(store: &StateTree, template: NormalizedTemplate) {
    if template.custom_ami {
        store.set(paths::wizard().extend(["customAMI", "enabled"]), json!(true));
    }
    if let Some(vpc) = template.vpc {
        store.set(paths::wizard_key("vpc"), json!(vpc));
    }
    if template.multi_user {
        store.set(paths::wizard_key("multiUser"), json!(true));
    } else {
        store.clear(paths::wizard_key("multiUser"));
    }
    store.set(paths::wizard().extend(["storage", "ui"]), template.storage_ui);
    store.set(paths::wizard_key("loaded"), json!(true));
    store.set(paths::wizard_config(), template.config);
    store.set(paths::wizard_key("page"), json!("version"));
    store.set(paths::wizard_source_loading(), json!(false));
}

/// Imports `config` into the wizard. A document targeting another region
/// refreshes the AWS inventory for that region first.
pub async fn load_template(client: &ConsoleClient, mut config: Value) {
    let store = client.store();
    store.set(paths::wizard_source_loading(), json!(true));

    let region = client.effective_region();
    let config_region = config
        .get("Region")
        .and_then(Value::as_str)
        .filter(|region| !region.is_empty())
        .map(str::to_owned);

    match config_region {
        Some(chosen) if Some(&chosen) != region.as_ref() => {
            info!(region = %chosen, "template: loading inventory for configuration region");
            store.set(paths::wizard_config().join("Region"), json!(chosen));
            client.load_aws_config(Some(&chosen)).await;
        }
        _ => {
            if let (Some(region), Some(fields)) = (region, config.as_object_mut()) {
                fields.insert("Region".into(), json!(region));
            }
        }
    }

    let template = normalize(config, &TemplateContext::from_store(store));
    debug!(config = %template.config, "template: loaded");
    apply(store, template);
}

/// Loads an existing cluster's configuration into the wizard. Returns
/// `false` when the configuration could not be fetched.
pub async fn load_template_from_cluster(client: &ConsoleClient, name: &str) -> Result<bool> {
    let store = client.store();
    store.set(paths::wizard_source_loading(), json!(true));

    let description = match client.describe_cluster(name).await {
        Ok(description) => description,
        Err(err) => {
            store.set(paths::wizard_source_loading(), json!(false));
            return Err(err);
        }
    };

    let Some(yaml) = client.get_configuration(name).await else {
        store.set(paths::wizard_source_loading(), json!(false));
        return Ok(false);
    };

    if let Some(version) = description.get("version").cloned() {
        store.set(paths::wizard_key("version"), version);
    }
    let config = match decode_config(&yaml) {
        Ok(config) => config,
        Err(err) => {
            store.set(paths::wizard_source_loading(), json!(false));
            return Err(err);
        }
    };
    load_template(client, config).await;
    Ok(true)
}

#[cfg(test)]
#[path = "tests/template_tests.rs"]
mod tests;
