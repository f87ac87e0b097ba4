// handler/stripe_webhook.rs
use std::sync::Arc;

use axum::{
    body::Bytes,
    http::HeaderMap,
    response::IntoResponse,
    Extension, Json,
};
use chrono::Utc;
use hmac::{Hmac, Mac};
use serde_json::{json, Value};
use sha2::Sha256;
use subtle::ConstantTimeEq;

use crate::{
    error::{ErrorMessage, HttpError},
    service::{
        error::ServiceError,
        stripe_client::{extract_id, extract_str, first_item_price, jget, SubscriptionSnapshot},
        subscription_service::{FailedPayment, SubscriptionActivation},
    },
    AppState,
};

/// Maximum age of a signed webhook, in seconds.
const SIGNATURE_TOLERANCE_SECS: i64 = 300;

pub async fn stripe_webhook(
    Extension(app_state): Extension<Arc<AppState>>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<impl IntoResponse, HttpError> {
    let secret = app_state.env.stripe.webhook_secret.as_str();
    if secret.is_empty() {
        tracing::error!("Stripe webhook received but STRIPE_WEBHOOK_SECRET is empty");
        return Err(HttpError::server_error(ErrorMessage::WebhookNotConfigured.to_string()));
    }

    let signature = headers
        .get("stripe-signature")
        .and_then(|h| h.to_str().ok())
        .ok_or_else(|| HttpError::bad_request(ErrorMessage::MissingSignature.to_string()))?;

    if !verify_stripe_signature(&body, signature, secret, Utc::now().timestamp()) {
        tracing::warn!("Rejected Stripe webhook with invalid signature");
        return Err(HttpError::bad_request(ErrorMessage::InvalidSignature.to_string()));
    }

    let event: Value = serde_json::from_slice(&body)
        .map_err(|e| HttpError::bad_request(format!("Invalid webhook payload: {}", e)))?;

    let event_id = extract_str(&event, &["id"])
        .ok_or_else(|| HttpError::bad_request("Webhook event has no id"))?;
    let event_type = extract_str(&event, &["type"]).unwrap_or_default();

    let claimed = app_state
        .db_client
        .claim_webhook_event(&event_id, &event_type)
        .await
        .map_err(|e| {
            tracing::error!("Failed to record webhook event {}: {}", event_id, e);
            HttpError::server_error(ErrorMessage::ServerError.to_string())
        })?;

    if !claimed {
        tracing::info!(event_id = %event_id, event_type = %event_type, "duplicate Stripe event ignored");
        return Ok(Json(json!({ "received": true, "duplicate": true })));
    }

    let object = jget(&event, &["data", "object"]).cloned().unwrap_or(Value::Null);

    match handle_event(&app_state, &event_type, &object).await {
        Ok(()) => {
            if let Err(e) = app_state.db_client.mark_webhook_event_processed(&event_id).await {
                tracing::error!("Failed to mark webhook event {} processed: {}", event_id, e);
            }
            Ok(Json(json!({ "received": true })))
        }
        Err(err) => {
            tracing::error!(event_id = %event_id, event_type = %event_type, "webhook processing failed: {}", err);
            if let Err(e) = app_state
                .db_client
                .mark_webhook_event_failed(&event_id, &err.to_string())
                .await
            {
                tracing::error!("Failed to mark webhook event {} failed: {}", event_id, e);
            }
            Err(HttpError::server_error("Webhook processing failed").with_code(err.code()))
        }
    }
}

async fn handle_event(app_state: &AppState, event_type: &str, object: &Value) -> Result<(), ServiceError> {
    match event_type {
        "checkout.session.completed" => {
            let Some(email) = event_email(app_state, object).await? else {
                tracing::warn!("checkout.session.completed without a customer email");
                return Ok(());
            };
            let Some(subscription) = subscription_for(app_state, object).await? else {
                tracing::info!(email = %email, "checkout session has no subscription, nothing to activate");
                return Ok(());
            };

            let outcome = app_state
                .subscription_service
                .activate_subscription(SubscriptionActivation {
                    email,
                    stripe_subscription_id: Some(subscription.id),
                    stripe_price_id: subscription.price_id,
                    stripe_customer_id: subscription
                        .customer_id
                        .or_else(|| extract_id(object, &["customer"])),
                    ..Default::default()
                })
                .await?;
            tracing::info!("checkout.session.completed handled: {:?}", outcome);
        }
        "invoice.paid" => {
            let Some(email) = event_email(app_state, object).await? else {
                tracing::warn!("invoice.paid without a customer email");
                return Ok(());
            };
            let subscription = subscription_for(app_state, object).await?;

            let price_id = subscription
                .as_ref()
                .and_then(|s| s.price_id.clone())
                .or_else(|| {
                    jget(object, &["lines", "data"])
                        .and_then(Value::as_array)
                        .and_then(|lines| lines.first())
                        .and_then(|line| extract_str(line, &["price", "id"]))
                });

            let outcome = app_state
                .subscription_service
                .activate_subscription(SubscriptionActivation {
                    email,
                    stripe_subscription_id: subscription.as_ref().map(|s| s.id.clone()),
                    stripe_price_id: price_id,
                    stripe_customer_id: extract_id(object, &["customer"]),
                    stripe_invoice_id: extract_str(object, &["id"]),
                    amount_paid: jget(object, &["amount_paid"]).and_then(Value::as_i64),
                    currency: extract_str(object, &["currency"]),
                })
                .await?;
            tracing::info!("invoice.paid handled: {:?}", outcome);
        }
        "customer.subscription.created" | "customer.subscription.updated" => {
            let status = extract_str(object, &["status"]).unwrap_or_default();
            if status != "active" {
                tracing::info!(status = %status, event_type, "subscription is not active, ignoring");
                return Ok(());
            }
            let Some(email) = event_email(app_state, object).await? else {
                tracing::warn!("{} for a customer without email", event_type);
                return Ok(());
            };

            app_state
                .subscription_service
                .activate_subscription(SubscriptionActivation {
                    email,
                    stripe_subscription_id: extract_str(object, &["id"]),
                    stripe_price_id: first_item_price(object),
                    stripe_customer_id: extract_id(object, &["customer"]),
                    ..Default::default()
                })
                .await?;
        }
        "customer.subscription.deleted" => {
            let Some(email) = event_email(app_state, object).await? else {
                tracing::warn!("customer.subscription.deleted for a customer without email");
                return Ok(());
            };
            let cancelled = app_state.subscription_service.cancel_subscription(&email).await?;
            tracing::info!(email = %email, cancelled, "subscription cancelled");
        }
        "invoice.payment_failed" => {
            let Some(email) = event_email(app_state, object).await? else {
                tracing::warn!("invoice.payment_failed without a customer email");
                return Ok(());
            };
            app_state
                .subscription_service
                .record_failed_payment(FailedPayment {
                    email,
                    stripe_invoice_id: extract_str(object, &["id"]),
                    amount_due: jget(object, &["amount_due"]).and_then(Value::as_i64).unwrap_or(0),
                    currency: extract_str(object, &["currency"]),
                })
                .await?;
        }
        _ => {
            tracing::info!("Unhandled Stripe webhook event: {}", event_type);
        }
    }

    Ok(())
}

/// Email carried on the event object, falling back to a customer lookup.
async fn event_email(app_state: &AppState, object: &Value) -> Result<Option<String>, ServiceError> {
    let inline = extract_str(object, &["customer_details", "email"])
        .or_else(|| extract_str(object, &["customer_email"]))
        .or_else(|| extract_str(object, &["customer", "email"]));
    if let Some(email) = inline {
        return Ok(Some(email));
    }

    match extract_id(object, &["customer"]) {
        Some(customer_id) => Ok(app_state.stripe.retrieve_customer_email(&customer_id).await?),
        None => Ok(None),
    }
}

/// The subscription referenced by a checkout session or invoice.
async fn subscription_for(
    app_state: &AppState,
    object: &Value,
) -> Result<Option<SubscriptionSnapshot>, ServiceError> {
    if let Some(expanded) = jget(object, &["subscription"]).filter(|v| v.is_object()) {
        if let Some(snapshot) = SubscriptionSnapshot::from_json(expanded) {
            return Ok(Some(snapshot));
        }
    }

    let subscription_id = extract_id(object, &["subscription"])
        .or_else(|| extract_str(object, &["parent", "subscription_details", "subscription"]));

    match subscription_id {
        Some(id) => Ok(Some(app_state.stripe.retrieve_subscription(&id).await?)),
        None => Ok(None),
    }
}

/// Checks a `Stripe-Signature` header (`t=<unix>,v1=<hex>[,v1=...]`) against
/// the raw request body.
pub fn verify_stripe_signature(payload: &[u8], header: &str, secret: &str, now: i64) -> bool {
    let mut timestamp: Option<&str> = None;
    let mut signatures: Vec<&str> = Vec::new();

    for part in header.split(',') {
        match part.trim().split_once('=') {
            Some(("t", value)) => timestamp = Some(value),
            Some(("v1", value)) => signatures.push(value),
            _ => {}
        }
    }

    let Some(timestamp) = timestamp else {
        return false;
    };
    let Ok(signed_at) = timestamp.parse::<i64>() else {
        return false;
    };
    if (now - signed_at).abs() > SIGNATURE_TOLERANCE_SECS || signatures.is_empty() {
        return false;
    }

    let mut mac = match Hmac::<Sha256>::new_from_slice(secret.as_bytes()) {
        Ok(mac) => mac,
        Err(_) => return false,
    };
    mac.update(timestamp.as_bytes());
    mac.update(b".");
    mac.update(payload);
    let expected_hex = hex::encode(mac.finalize().into_bytes());

    signatures
        .iter()
        .any(|sig| ConstantTimeEq::ct_eq(sig.as_bytes(), expected_hex.as_bytes()).into())
}

#[cfg(test)]
pub fn sign_payload(payload: &[u8], secret: &str, timestamp: i64) -> String {
    let mut mac = Hmac::<Sha256>::new_from_slice(secret.as_bytes()).unwrap();
    mac.update(format!("{}.", timestamp).as_bytes());
    mac.update(payload);
    format!("t={},v1={}", timestamp, hex::encode(mac.finalize().into_bytes()))
}
