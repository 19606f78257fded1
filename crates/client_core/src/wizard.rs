//! Cluster create/update wizard over the `app.wizard` subtree.
//!
//! The controller owns navigation between the fixed [`Page`] sequence. Each
//! transition that leaves a page forward is gated by that page's validator;
//! failures are written to `app.wizard.errors.<page>` and the pointer stays.

use std::sync::Arc;

use serde_json::{json, Map, Value};
use shared::{
    domain::{ComputeFleetStatus, FleetStatusRequest, Page},
    error::PageErrors,
};
use tracing::{debug, info};

use crate::{
    error::{ClientError, Result},
    poller::ClusterPoller,
    store::{paths, StateTree},
    template,
    validation::{validate_page, WizardSnapshot},
    ConsoleClient, CreateCluster, UpdateCluster,
};

/// Where the console should go after a wizard action.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Route {
    ClusterList,
    ClusterDetail(String),
    Configure,
}

#[derive(Debug)]
pub enum SubmitOutcome {
    /// The cluster was accepted; wizard state has been cleared.
    Submitted(Route),
    /// A dry run passed; wizard state is kept.
    DryRunPassed,
    /// The configuration failed local validation and was not sent.
    Invalid(PageErrors),
    /// The backend refused the submission; wizard state is kept.
    Failed(ClientError),
}

/// Keys dropped when the wizard is closed.
const WIZARD_KEYS: &[&str] = &[
    "version",
    "config",
    "clusterConfigYaml",
    "clusterName",
    "loaded",
    "page",
    "vpc",
    "multiUser",
    "validated",
];

fn errors_value(errors: &PageErrors) -> Value {
    let fields: Map<String, Value> = errors
        .fields
        .iter()
        .map(|error| (error.field.clone(), json!(error.message)))
        .collect();
    Value::Object(fields)
}

pub struct WizardController {
    client: ConsoleClient,
    poller: ClusterPoller<ConsoleClient>,
}

impl WizardController {
    pub fn new(client: ConsoleClient) -> Self {
        let poller = ClusterPoller::new(Arc::new(client.clone()));
        Self::with_poller(client, poller)
    }

    pub fn with_poller(client: ConsoleClient, poller: ClusterPoller<ConsoleClient>) -> Self {
        Self { client, poller }
    }

    fn store(&self) -> &StateTree {
        self.client.store()
    }

    pub fn poller(&self) -> &ClusterPoller<ConsoleClient> {
        &self.poller
    }

    pub fn current_page(&self) -> Page {
        paths::wizard_page()
            .get(self.store())
            .unwrap_or(Page::Version)
    }

    fn set_page(&self, page: Page) {
        paths::wizard_page().set(self.store(), &page);
    }

    pub fn is_editing(&self) -> bool {
        paths::wizard_editing().get(self.store()).unwrap_or(false)
    }

    pub fn cluster_name(&self) -> Option<String> {
        self.store().get_str(paths::wizard_key("clusterName"))
    }

    /// Validates `page` and records the outcome under `errors.<page>`.
    pub fn check_page(&self, page: Page) -> std::result::Result<(), PageErrors> {
        let result = validate_page(page, &WizardSnapshot::from_store(self.store()));
        match &result {
            Ok(()) => self.store().clear(paths::wizard_page_errors(page)),
            Err(errors) => {
                debug!(page = page.key(), errors = errors.fields.len(), "wizard: page invalid");
                self.store()
                    .set(paths::wizard_page_errors(page), errors_value(errors));
            }
        }
        result
    }

    /// Validates every page and returns the failing ones in page order.
    pub fn check_all(&self) -> Vec<(Page, PageErrors)> {
        Page::ALL
            .into_iter()
            .filter_map(|page| self.check_page(page).err().map(|errors| (page, errors)))
            .collect()
    }

    /// Starts a create flow from an imported configuration document. The
    /// normalized configuration is what `submit` sends, never the raw text.
    pub async fn import_template(&self, name: &str, version: &str, config: Value) {
        self.show();
        let store = self.store();
        store.set(paths::wizard_key("version"), json!(version));
        template::load_template(&self.client, config).await;
        store.set(paths::wizard_key("clusterName"), json!(name));
        store.clear(paths::wizard_key("clusterConfigYaml"));
    }

    /// Opens the wizard. A wizard left in editing mode is reset to a blank
    /// create flow first.
    pub fn show(&self) -> Route {
        if self.is_editing() {
            for key in ["config", "clusterConfigYaml", "loaded"] {
                self.store().clear(paths::wizard_key(key));
            }
            paths::wizard_editing().set(self.store(), &false);
            self.set_page(Page::Version);
        }
        if paths::wizard_page().get(self.store()).is_none() {
            self.set_page(Page::Version);
        }
        Route::Configure
    }

    pub fn next(&self) -> std::result::Result<Page, PageErrors> {
        let current = self.current_page();
        self.check_page(current)?;
        let target = current.next().unwrap_or(current);
        self.set_page(target);
        Ok(target)
    }

    /// Always allowed; pending errors are dropped, the configuration is kept.
    pub fn back(&self) -> Page {
        let target = self.current_page().previous().unwrap_or(Page::Version);
        self.clear_errors();
        self.set_page(target);
        target
    }

    /// Backward jumps always succeed. Forward jumps require every page from
    /// the current one up to, but not including, `target` to validate.
    pub fn jump(&self, target: Page) -> std::result::Result<Page, PageErrors> {
        let current = self.current_page();
        if target.index() > current.index() {
            for page in &Page::ALL[current.index()..target.index()] {
                self.check_page(*page)?;
            }
        }
        self.set_page(target);
        Ok(target)
    }

    pub fn clear_errors(&self) {
        self.store().clear(paths::wizard_errors());
    }

    /// Drops every wizard key so the next visit starts from scratch.
    pub fn clear_state(&self) {
        for key in WIZARD_KEYS {
            self.store().clear(paths::wizard_key(key));
        }
        self.store().clear(paths::wizard_source_loading());
        self.clear_errors();
    }

    pub fn cancel(&self) -> Route {
        self.clear_state();
        Route::ClusterList
    }

    /// Loads an existing cluster into the wizard in editing mode.
    pub async fn edit_cluster(&self, name: &str) -> Result<Route> {
        for key in ["config", "clusterConfigYaml", "loaded"] {
            self.store().clear(paths::wizard_key(key));
        }
        paths::wizard_editing().set(self.store(), &true);
        self.store()
            .set(paths::wizard_key("clusterName"), json!(name));
        self.set_page(Page::Version);

        let loaded = template::load_template_from_cluster(&self.client, name).await?;
        if !loaded {
            debug!(cluster = %name, "wizard: configuration unavailable");
        }
        self.sync_fleet_poll();
        Ok(Route::Configure)
    }

    /// Refreshes the inventory for the region the configuration targets.
    pub async fn refresh_inventory(&self) {
        let region = self
            .store()
            .get_str(paths::wizard_config().join("Region"))
            .filter(|region| region != "Default");
        self.client.load_aws_config(region.as_deref()).await;
    }

    fn fleet_status(&self, name: &str) -> Option<ComputeFleetStatus> {
        self.store()
            .get_as(paths::cluster(name).join("computeFleetStatus"))
    }

    /// Keeps the edited cluster refreshing while a fleet stop is pending.
    pub fn sync_fleet_poll(&self) {
        let Some(name) = self.cluster_name() else {
            return;
        };
        match self.fleet_status(&name) {
            Some(ComputeFleetStatus::StopRequested) => self.poller.start(&name),
            Some(ComputeFleetStatus::Stopped) => self.poller.stop(&name),
            _ => {}
        }
    }

    /// Stops the compute fleet of the cluster being edited.
    pub async fn stop_compute_fleet(&self) -> Option<Value> {
        let name = self.cluster_name()?;
        if !self.fleet_status(&name).is_some_and(ComputeFleetStatus::can_stop) {
            return None;
        }
        let response = self
            .client
            .update_compute_fleet(&name, FleetStatusRequest::StopRequested)
            .await?;
        self.sync_fleet_poll();
        Some(response)
    }

    fn configuration_yaml(&self) -> Result<String> {
        match self.store().get_str(paths::wizard_key("clusterConfigYaml")) {
            Some(yaml) => Ok(yaml),
            None => {
                let config = self.store().get(paths::wizard_config()).unwrap_or(json!({}));
                template::encode_config(&config)
            }
        }
    }

    /// Sends the configuration for creation (or update when editing).
    pub async fn submit(&self, dry_run: bool) -> SubmitOutcome {
        if let Err(errors) = self.check_page(Page::Create) {
            return SubmitOutcome::Invalid(errors);
        }
        let Some(name) = self.cluster_name() else {
            let mut errors = PageErrors::default();
            errors.push("clusterName", "Cluster name is required.");
            self.store()
                .set(paths::wizard_page_errors(Page::Cluster), errors_value(&errors));
            return SubmitOutcome::Invalid(errors);
        };

        let loading = paths::wizard_submit_loading();
        self.store().set(loading.clone(), json!(true));
        let result = self.send(&name, dry_run).await;
        self.store().set(loading, json!(false));

        let create_errors = paths::wizard_page_errors(Page::Create);
        match result {
            Ok(body) if dry_run => {
                self.store().clear(create_errors);
                let message = body
                    .get("message")
                    .and_then(Value::as_str)
                    .unwrap_or("Dry run succeeded.")
                    .to_string();
                self.client.notifier().success(message);
                SubmitOutcome::DryRunPassed
            }
            Ok(_) => {
                info!(cluster = %name, editing = self.is_editing(), "wizard: submitted");
                self.clear_state();
                paths::selected_cluster().set(self.store(), &name);
                self.poller.start(&name);
                SubmitOutcome::Submitted(Route::ClusterDetail(name))
            }
            Err(err) => {
                let message = err
                    .backend_message()
                    .map(str::to_owned)
                    .unwrap_or_else(|| err.to_string());
                self.store()
                    .set(create_errors, json!({ "submit": message }));
                SubmitOutcome::Failed(err)
            }
        }
    }

    async fn send(&self, name: &str, dry_run: bool) -> Result<Value> {
        let configuration = self.configuration_yaml()?;
        let version = self.store().get_str(paths::wizard_key("version"));
        if self.is_editing() {
            self.client
                .update_cluster(UpdateCluster {
                    name: name.to_string(),
                    configuration,
                    version,
                    dry_run,
                    force_update: false,
                })
                .await
        } else {
            let region = self
                .store()
                .get_str(paths::wizard_config().join("Region"))
                .or_else(|| self.client.effective_region());
            self.client
                .create_cluster(CreateCluster {
                    name: name.to_string(),
                    configuration,
                    region,
                    version,
                    dry_run,
                })
                .await
        }
    }
}

#[cfg(test)]
#[path = "tests/wizard_tests.rs"]
mod tests;
