use reqwest::{Method, StatusCode};
use serde_json::{json, Value};
use shared::{
    domain::{ImageStatus, InstanceAction},
    protocol::{InstanceTypesResponse, UserIdentity, VersionResponse},
};
use tracing::{debug, info};

use crate::{
    error::Result,
    reducers::aws_inventory,
    store::paths,
    ApiRequest, ConsoleClient, DEFAULT_CLUSTER_USER,
};

impl ConsoleClient {
    pub async fn get_instance_types(&self, region: Option<&str>) -> Option<Vec<Value>> {
        let request =
            ApiRequest::new(Method::GET, "manager/get_instance_types").query_opt("region", region);
        let result = async {
            self.execute(request)
                .await?
                .decode::<InstanceTypesResponse>()
        }
        .await;
        let instance_types = self.swallow(None, result)?.instance_types;
        self.store.set(
            paths::aws().join("instanceTypes"),
            Value::Array(instance_types.clone()),
        );
        Some(instance_types)
    }

    /// Refreshes the `aws` inventory for `region` along with the image lists
    /// the wizard offers, then the instance types.
    pub async fn load_aws_config(&self, region: Option<&str>) {
        let inventory_request = ApiRequest::new(Method::GET, "manager/get_aws_configuration")
            .query_opt("region", region);
        let (custom_images, official_images, inventory) = futures::join!(
            self.list_custom_images(Some(ImageStatus::Available), region),
            self.list_official_images(region, None),
            self.execute(inventory_request),
        );

        if let Some(images) = custom_images {
            self.store
                .set(paths::wizard_key("customImages"), Value::Array(images));
        }
        if let Ok(images) = official_images {
            self.store
                .set(paths::wizard_key("officialImages"), Value::Array(images));
        }

        let Some(response) = self.swallow(None, inventory) else {
            return;
        };
        if response.status == StatusCode::OK {
            debug!(region = region.unwrap_or("-"), "environment: inventory loaded");
            self.store.set(paths::aws(), aws_inventory(response.body));
            self.get_instance_types(region).await;
        }
    }

    pub async fn get_version(&self) -> Result<String> {
        let result = async {
            self.execute(ApiRequest::new(Method::GET, "manager/get_version"))
                .await?
                .decode::<VersionResponse>()
        }
        .await;
        let version = self.rethrow(None, result)?.version;
        self.store
            .set(paths::app_version(), json!({ "full": version }));
        Ok(version)
    }

    pub async fn get_identity(&self) -> Result<UserIdentity> {
        let result = self
            .execute(ApiRequest::new(Method::GET, "manager/get_identity"))
            .await;
        let identity = self.rethrow(None, result)?.body;
        self.store.set(paths::identity(), identity.clone());
        Ok(serde_json::from_value(identity)?)
    }

    pub async fn ec2_action(&self, instance_id: &str, action: InstanceAction) -> Option<Value> {
        let request = ApiRequest::new(Method::POST, "manager/ec2_action")
            .query("instance_id", instance_id)
            .query("action", action.as_query());
        let response = self.swallow(None, self.execute(request).await)?;
        info!(instance = %instance_id, action = action.as_query(), "environment: ec2 action sent");
        Some(response.body)
    }

    pub async fn get_dcv_session(&self, instance_id: &str, user: Option<&str>) -> Option<Value> {
        let request = ApiRequest::new(Method::GET, "manager/get_dcv_session")
            .query("instance_id", instance_id)
            .query("user", user.unwrap_or(DEFAULT_CLUSTER_USER))
            .query_opt("region", self.effective_region());
        Some(self.swallow(None, self.execute(request).await)?.body)
    }

    /// Resets the inventory and fetches everything the landing views need.
    pub async fn load_initial_state(&self) {
        let region = self.selected_region();
        self.store.clear(paths::aws());

        let (_, _, custom_images, official_images, _) = futures::join!(
            self.list_users(),
            self.list_clusters(),
            self.list_custom_images(None, None),
            self.list_official_images(None, None),
            self.load_aws_config(region.as_deref()),
        );

        if let Some(images) = custom_images {
            self.store
                .set(paths::custom_images_list(), Value::Array(images));
        }
        if let Ok(images) = official_images {
            self.store
                .set(paths::official_images(), Value::Array(images));
        }
        info!(region = region.as_deref().unwrap_or("-"), "environment: initial state loaded");
    }
}
