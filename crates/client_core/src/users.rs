use reqwest::Method;
use serde_json::Value;
use shared::protocol::UsersResponse;
use tracing::info;

use crate::{reducers::index_by, store::paths, ApiRequest, ConsoleClient};

impl ConsoleClient {
    /// Replaces `users.index` with the users keyed by `Username`.
    pub async fn list_users(&self) -> Option<Vec<Value>> {
        let result = async {
            self.execute(ApiRequest::new(Method::GET, "manager/list_users"))
                .await?
                .decode::<UsersResponse>()
        }
        .await;
        let users = self.swallow(None, result)?.users;
        self.store
            .set(paths::users_index(), index_by(&users, "Username"));
        Some(users)
    }

    pub async fn create_user(&self, user: &Value) -> Option<Value> {
        let result = async {
            let request = ApiRequest::new(Method::POST, "manager/create_user").json(user)?;
            self.execute(request).await
        }
        .await;
        let created = self.swallow(None, result)?.body;
        if let Some(username) = created.get("Username").and_then(Value::as_str) {
            info!(user = %username, "users: created");
            self.store
                .set(paths::users_index().join(username), created.clone());
        }
        Some(created)
    }

    /// The index is left as is; callers refresh it with [`Self::list_users`].
    pub async fn delete_user(&self, username: &str) -> Option<Value> {
        let request =
            ApiRequest::new(Method::DELETE, "manager/delete_user").query("username", username);
        let response = self.swallow(None, self.execute(request).await)?;
        info!(user = %username, "users: deleted");
        Some(response.body)
    }
}
