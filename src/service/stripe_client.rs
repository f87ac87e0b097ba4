// service/stripe_client.rs
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use thiserror::Error;

use crate::config::StripeConfig;

#[derive(Error, Debug)]
pub enum StripeError {
    #[error("Stripe secret key is not configured")]
    NotConfigured,

    #[error("Stripe request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Stripe returned {status}: {message}")]
    Api { status: u16, message: String },
}

/// The subset of a Stripe subscription the activation flow needs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubscriptionSnapshot {
    pub id: String,
    pub status: String,
    pub customer_id: Option<String>,
    pub price_id: Option<String>,
}

impl SubscriptionSnapshot {
    pub fn from_json(value: &Value) -> Option<Self> {
        Some(Self {
            id: extract_str(value, &["id"])?,
            status: extract_str(value, &["status"]).unwrap_or_default(),
            customer_id: extract_id(value, &["customer"]),
            price_id: first_item_price(value),
        })
    }
}

/// Read-only Stripe lookups.
#[async_trait]
pub trait StripeApi: Send + Sync {
    async fn retrieve_subscription(&self, subscription_id: &str) -> Result<SubscriptionSnapshot, StripeError>;

    async fn retrieve_customer_email(&self, customer_id: &str) -> Result<Option<String>, StripeError>;
}

pub struct StripeClient {
    http: reqwest::Client,
    secret_key: String,
    api_base: String,
}

impl StripeClient {
    pub fn new(config: &StripeConfig) -> Result<Self, StripeError> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(15))
            .build()?;

        Ok(Self {
            http,
            secret_key: config.secret_key.clone(),
            api_base: config.api_base.trim_end_matches('/').to_string(),
        })
    }

    async fn get(&self, path: &str) -> Result<Value, StripeError> {
        if self.secret_key.is_empty() {
            return Err(StripeError::NotConfigured);
        }

        let response = self
            .http
            .get(format!("{}/{}", self.api_base, path))
            .bearer_auth(&self.secret_key)
            .send()
            .await?;

        let status = response.status();
        let body: Value = response.json().await?;
        if !status.is_success() {
            let message = extract_str(&body, &["error", "message"])
                .unwrap_or_else(|| "unknown error".to_string());
            return Err(StripeError::Api {
                status: status.as_u16(),
                message,
            });
        }

        Ok(body)
    }
}

#[async_trait]
impl StripeApi for StripeClient {
    async fn retrieve_subscription(&self, subscription_id: &str) -> Result<SubscriptionSnapshot, StripeError> {
        let body = self.get(&format!("subscriptions/{}", subscription_id)).await?;
        SubscriptionSnapshot::from_json(&body).ok_or_else(|| StripeError::Api {
            status: 200,
            message: "subscription payload without id".to_string(),
        })
    }

    async fn retrieve_customer_email(&self, customer_id: &str) -> Result<Option<String>, StripeError> {
        let body = self.get(&format!("customers/{}", customer_id)).await?;
        if body.get("deleted").and_then(Value::as_bool).unwrap_or(false) {
            return Ok(None);
        }
        Ok(extract_str(&body, &["email"]))
    }
}

/// Walks `path` through nested objects.
pub fn jget<'a>(value: &'a Value, path: &[&str]) -> Option<&'a Value> {
    path.iter().try_fold(value, |current, key| current.get(*key))
}

/// Non-empty string at `path`.
pub fn extract_str(value: &Value, path: &[&str]) -> Option<String> {
    jget(value, path)
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

/// Stripe fields like `customer` or `subscription` are either an id or an expanded object.
pub fn extract_id(value: &Value, path: &[&str]) -> Option<String> {
    let field = jget(value, path)?;
    match field {
        Value::String(_) => extract_str(field, &[]),
        Value::Object(_) => extract_str(field, &["id"]),
        _ => None,
    }
}

/// `items.data[0].price.id`
pub fn first_item_price(value: &Value) -> Option<String> {
    jget(value, &["items", "data"])
        .and_then(Value::as_array)
        .and_then(|items| items.first())
        .and_then(|item| extract_str(item, &["price", "id"]))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_extract_helpers() {
        let payload = json!({
            "customer_details": { "email": " ana@example.com " },
            "subscription": "sub_123",
            "customer": { "id": "cus_9", "object": "customer" },
            "blank": ""
        });

        assert_eq!(extract_str(&payload, &["customer_details", "email"]).as_deref(), Some("ana@example.com"));
        assert_eq!(extract_id(&payload, &["subscription"]).as_deref(), Some("sub_123"));
        assert_eq!(extract_id(&payload, &["customer"]).as_deref(), Some("cus_9"));
        assert_eq!(extract_str(&payload, &["blank"]), None);
        assert_eq!(extract_str(&payload, &["missing", "path"]), None);
    }

    #[test]
    fn test_subscription_snapshot_from_json() {
        let subscription = json!({
            "id": "sub_123",
            "status": "active",
            "customer": "cus_1",
            "items": { "data": [ { "price": { "id": "price_vip" } }, { "price": { "id": "price_other" } } ] }
        });

        let snapshot = SubscriptionSnapshot::from_json(&subscription).unwrap();
        assert_eq!(
            snapshot,
            SubscriptionSnapshot {
                id: "sub_123".to_string(),
                status: "active".to_string(),
                customer_id: Some("cus_1".to_string()),
                price_id: Some("price_vip".to_string()),
            }
        );

        assert_eq!(SubscriptionSnapshot::from_json(&json!({ "status": "active" })), None);
    }
}
