use reqwest::{Method, StatusCode};
use serde_json::Value;
use shared::{
    domain::ImageStatus,
    protocol::{BuildImageRequest, ImagesResponse},
};
use tracing::{info, warn};

use crate::{
    clusters::encode_segment,
    error::Result,
    reducers::merge_record,
    store::paths,
    ApiRequest, ConsoleClient,
};

fn image_path(image_id: &str) -> String {
    format!("/v3/images/custom/{image_id}")
}

impl ConsoleClient {
    fn merge_image(&self, image_id: &str, fields: Value) {
        self.store.update(paths::custom_image(image_id), move |existing| {
            merge_record(existing, fields)
        });
    }

    /// Custom images with `status` (default `AVAILABLE`). The caller decides
    /// where the list is kept.
    pub async fn list_custom_images(
        &self,
        status: Option<ImageStatus>,
        region: Option<&str>,
    ) -> Option<Vec<Value>> {
        let status = status.unwrap_or(ImageStatus::Available);
        let request = ApiRequest::api(Method::GET, "/v3/images/custom")
            .query("imageStatus", status.as_query())
            .query_opt("region", region);
        let result = async { self.execute(request).await?.decode::<ImagesResponse>() }.await;
        match result {
            Ok(response) => Some(response.images),
            Err(err) => {
                warn!(kind = ?err.kind(), "images: list failed: {err}");
                if let Some(message) = err.backend_message() {
                    self.notifier
                        .error(format!("Error retrieving images: {message}"));
                }
                None
            }
        }
    }

    pub async fn describe_custom_image(&self, image_id: &str) -> Option<Value> {
        let result = self
            .execute(ApiRequest::api(Method::GET, image_path(image_id)))
            .await;
        let response = self.swallow(Some(image_id), result)?;
        if response.status == StatusCode::OK {
            self.merge_image(image_id, response.body.clone());
        }
        Some(response.body)
    }

    pub async fn get_custom_image_configuration(&self, image_id: &str) -> Option<Value> {
        let request = ApiRequest::new(Method::GET, "manager/get_custom_image_configuration")
            .query("image_id", image_id);
        let configuration = self.swallow(Some(image_id), self.execute(request).await)?.body;
        self.store.set(
            paths::custom_image(image_id).join("configuration"),
            configuration.clone(),
        );
        Some(configuration)
    }

    /// Queues an image build and records the accepted image.
    pub async fn build_image(
        &self,
        image_id: &str,
        configuration: &str,
        version: Option<&str>,
    ) -> Result<Value> {
        let request = ApiRequest::api(Method::POST, "/v3/images/custom")
            .query_opt("version", version)
            .json(&BuildImageRequest {
                image_id: image_id.to_string(),
                image_configuration: configuration.to_string(),
            })?;
        let response = self.rethrow(Some(image_id), self.execute(request).await)?;

        self.notifier
            .success(format!("Successfully queued build for {image_id}."));
        self.merge_image(image_id, response.body.clone());
        info!(image = %image_id, "images: build queued");
        Ok(response.body)
    }

    pub async fn get_custom_image_stack_events(&self, image_id: &str) -> Option<Value> {
        let result = self
            .execute(ApiRequest::api(
                Method::GET,
                format!("{}/stackevents", image_path(image_id)),
            ))
            .await;
        let events = self.swallow(Some(image_id), result)?.body;
        self.store.set(
            paths::custom_image(image_id).join("stackevents"),
            events.clone(),
        );
        Some(events)
    }

    pub async fn list_custom_image_log_streams(&self, image_id: &str) -> Option<Value> {
        let result = self
            .execute(ApiRequest::api(
                Method::GET,
                format!("{}/logstreams", image_path(image_id)),
            ))
            .await;
        let streams = self.swallow(Some(image_id), result)?.body;
        self.store.set(
            paths::custom_image(image_id).join("logstreams"),
            streams.clone(),
        );
        Some(streams)
    }

    /// Stored at `customImages.index.<id>.logEventIndex.<stream>`.
    pub async fn get_custom_image_log_events(
        &self,
        image_id: &str,
        log_stream_name: &str,
    ) -> Option<Value> {
        let result = self
            .execute(ApiRequest::api(
                Method::GET,
                format!(
                    "{}/logstreams/{}",
                    image_path(image_id),
                    encode_segment(log_stream_name)
                ),
            ))
            .await;
        let subject = format!("{image_id}/{log_stream_name}");
        let events = self.swallow(Some(&subject), result)?.body;
        self.store.set(
            paths::custom_image(image_id).extend(["logEventIndex", log_stream_name]),
            events.clone(),
        );
        Some(events)
    }

    pub async fn list_official_images(
        &self,
        region: Option<&str>,
        version: Option<&str>,
    ) -> Result<Vec<Value>> {
        let request = ApiRequest::api(Method::GET, "/v3/images/official")
            .query_opt("region", region)
            .query_opt("version", version);
        let result = async { self.execute(request).await?.decode::<ImagesResponse>() }.await;
        Ok(self.rethrow(None, result)?.images)
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::{store::StateTree, test_support::MockBackend};

    async fn client() -> (MockBackend, ConsoleClient) {
        let (backend, url) = MockBackend::start().await;
        let client = ConsoleClient::new(&url, StateTree::new()).expect("client");
        (backend, client)
    }

    #[tokio::test]
    async fn custom_images_default_to_available() {
        let (backend, client) = client().await;
        backend.respond("GET", "/v3/images/custom", 200, json!({"images": [{"imageId": "img"}]}));

        let images = client.list_custom_images(None, None).await.expect("images");

        assert_eq!(images, vec![json!({"imageId": "img"})]);
        let request = &backend.requests()[0];
        assert_eq!(request.query.get("imageStatus").map(String::as_str), Some("AVAILABLE"));
        assert!(client.store().get(paths::custom_images_list()).is_none());
    }

    #[tokio::test]
    async fn custom_image_failure_has_its_own_wording() {
        let (backend, client) = client().await;
        backend.respond("GET", "/v3/images/custom", 403, json!({"message": "denied"}));

        assert!(client
            .list_custom_images(Some(ImageStatus::Failed), Some("eu-west-1"))
            .await
            .is_none());

        assert_eq!(
            client.notifier().messages()[0].content,
            "Error retrieving images: denied"
        );
    }

    #[tokio::test]
    async fn build_notifies_and_merges() {
        let (backend, client) = client().await;
        backend.respond(
            "POST",
            "/v3/images/custom",
            202,
            json!({"image": {"imageId": "img", "imageBuildStatus": "BUILD_IN_PROGRESS"}}),
        );

        client
            .build_image("img", "Build:\n  InstanceType: c5.xlarge\n", Some("3.9.0"))
            .await
            .expect("build");

        let messages = client.notifier().messages();
        assert_eq!(messages[0].content, "Successfully queued build for img.");
        assert!(client.store().get(paths::custom_image("img").join("image")).is_some());
        let request = &backend.requests()[0];
        assert_eq!(request.body["imageId"], json!("img"));
        assert_eq!(request.query.get("version").map(String::as_str), Some("3.9.0"));
    }

    #[tokio::test]
    async fn log_events_are_keyed_by_stream() {
        let (backend, client) = client().await;
        backend.respond(
            "GET",
            "/v3/images/custom/img/logstreams/3.9.0%2F1",
            200,
            json!({"events": [{"message": "hello"}]}),
        );

        client
            .get_custom_image_log_events("img", "3.9.0/1")
            .await
            .expect("events");

        assert_eq!(
            client.store().get(
                paths::custom_image("img").extend(["logEventIndex", "3.9.0/1", "events", "0", "message"])
            ),
            Some(json!("hello"))
        );
    }

    #[tokio::test]
    async fn official_images_failure_is_rethrown() {
        let (backend, client) = client().await;
        backend.respond("GET", "/v3/images/official", 500, json!({"message": "down"}));

        assert!(client.list_official_images(None, None).await.is_err());
        assert_eq!(client.notifier().messages()[0].content, "Error: down");
    }
}
