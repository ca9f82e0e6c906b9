//! Shared request plumbing for the Gemini REST endpoints

use reqwest::Client;
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::time::Duration;
use tokio::time::timeout;

use charter_core::{Error, Result};

/// POST `body` as JSON and decode the JSON reply.
///
/// The whole exchange is bounded by `limit`; exceeding it yields
/// [`Error::Timeout`]. Every other failure is reported through `fail` so
/// callers pick the error category that fits their capability.
pub(crate) async fn post_json<B, R>(
    client: &Client,
    url: &str,
    api_key: &str,
    body: &B,
    limit: Duration,
    fail: fn(String) -> Error,
) -> Result<R>
where
    B: Serialize + ?Sized,
    R: DeserializeOwned,
{
    let exchange = async {
        let response = client
            .post(url)
            .header("Content-Type", "application/json")
            .header("x-goog-api-key", api_key)
            .json(body)
            .send()
            .await
            .map_err(|e| fail(format!("request to Gemini failed: {}", e)))?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(fail(format!(
                "Gemini API request failed with status {}: {}",
                status, error_text
            )));
        }

        let text = response
            .text()
            .await
            .map_err(|e| fail(format!("reading Gemini response failed: {}", e)))?;

        serde_json::from_str::<R>(&text)
            .map_err(|e| fail(format!("unexpected Gemini response ({}): {}", e, text)))
    };

    match timeout(limit, exchange).await {
        Ok(result) => result,
        Err(_) => Err(Error::Timeout(format!(
            "Gemini did not answer within {}s",
            limit.as_secs_f32()
        ))),
    }
}
