use chrono::NaiveDate;
use reqwest::Method;
use shared::protocol::{CostMonitoringData, CostMonitoringDataResponse, CostMonitoringStatusResponse};
use tracing::{info, warn};

use crate::{error::Result, ApiRequest, ConsoleClient};

const COST_DATE_FORMAT: &str = "%Y-%m-%d";

impl ConsoleClient {
    /// Failures are logged but never notified; the cost tab simply stays hidden.
    pub async fn get_cost_monitoring_status(&self) -> Result<bool> {
        let result = async {
            self.execute(ApiRequest::new(Method::GET, "cost-monitoring"))
                .await?
                .decode::<Option<CostMonitoringStatusResponse>>()
        }
        .await;
        match result {
            Ok(status) => Ok(status.is_some_and(|status| status.active)),
            Err(err) => {
                warn!(kind = ?err.kind(), "costs: status check failed: {err}");
                Err(err)
            }
        }
    }

    pub async fn activate_cost_monitoring(&self) -> Result<()> {
        self.execute(ApiRequest::new(Method::PUT, "cost-monitoring"))
            .await?;
        info!("costs: monitoring activated");
        Ok(())
    }

    pub async fn get_cost_monitoring_data(
        &self,
        cluster_name: &str,
        from: NaiveDate,
        to: NaiveDate,
    ) -> Result<Vec<CostMonitoringData>> {
        let request = ApiRequest::new(
            Method::GET,
            format!("cost-monitoring/clusters/{cluster_name}"),
        )
        .query("start", from.format(COST_DATE_FORMAT).to_string())
        .query("end", to.format(COST_DATE_FORMAT).to_string());
        let response = self
            .execute(request)
            .await?
            .decode::<Option<CostMonitoringDataResponse>>()?;
        Ok(response.map(|data| data.costs).unwrap_or_default())
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
    async fn status_defaults_to_inactive() {
        let (backend, client) = client().await;
        backend.respond("GET", "cost-monitoring", 200, json!({}));

        assert!(!client.get_cost_monitoring_status().await.expect("status"));
    }

    #[tokio::test]
    async fn status_failure_is_not_notified() {
        let (backend, client) = client().await;
        backend.respond("GET", "cost-monitoring", 403, json!({"message": "not allowed"}));

        assert!(client.get_cost_monitoring_status().await.is_err());
        assert!(client.notifier().messages().is_empty());
    }

    #[tokio::test]
    async fn data_query_uses_iso_dates() {
        let (backend, client) = client().await;
        backend.respond(
            "GET",
            "cost-monitoring/clusters/c1",
            200,
            json!({"costs": [{
                "period": {"start": "2026-09-01", "end": "2026-09-02"},
                "amount": 12.5,
                "unit": "USD",
            }]}),
        );
        let from = NaiveDate::from_ymd_opt(2026, 9, 1).expect("date");
        let to = NaiveDate::from_ymd_opt(2026, 9, 30).expect("date");

        let costs = client
            .get_cost_monitoring_data("c1", from, to)
            .await
            .expect("costs");

        assert_eq!(costs.len(), 1);
        assert_eq!(costs[0].amount, 12.5);
        let request = &backend.requests()[0];
        assert_eq!(request.query.get("start").map(String::as_str), Some("2026-09-01"));
        assert_eq!(request.query.get("end").map(String::as_str), Some("2026-09-30"));
    }

    #[tokio::test]
    async fn activation_uses_put() {
        let (backend, client) = client().await;
        backend.respond("PUT", "cost-monitoring", 200, json!({}));

        client.activate_cost_monitoring().await.expect("activate");

        assert_eq!(backend.requests_to("PUT", "cost-monitoring").len(), 1);
    }
}
