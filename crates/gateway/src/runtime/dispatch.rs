//! Event-subscription filter and webhook dispatch.
//!
//! Each session task calls `plan` with the tenant's *latest* cached
//! snapshot, then `deliver` for the events that match.  Delivery is
//! sequential within a session and at-most-once: a failed POST is logged
//! and dropped, never retried and never surfaced to any caller.  Adding
//! retries would change the delivery contract to at-least-once and break
//! same-kind ordering, so it is deliberately absent.

use std::time::Duration;

use cg_domain::config::WebhookConfig;
use cg_domain::events::{subscription_matches, EventKind};
use cg_domain::user::UserContext;

/// One matching event on its way to a tenant webhook. Ephemeral — built,
/// posted, dropped.
#[derive(Debug, Clone)]
pub struct WebhookDelivery {
    pub user_id: i64,
    pub kind: EventKind,
    pub payload: serde_json::Value,
    pub url: String,
}

pub struct Dispatcher {
    http: reqwest::Client,
    user_agent: String,
}

impl Dispatcher {
    pub fn new(config: &WebhookConfig) -> Self {
        // Builder input is static config; a failure here is a startup
        // bug, not a runtime condition to fall back from.
        let http = reqwest::Client::builder()
            .timeout(Duration::from_millis(config.timeout_ms))
            .build()
            .expect("building webhook HTTP client");
        Self {
            http,
            user_agent: config.user_agent.clone(),
        }
    }

    /// Decide whether `kind` reaches this tenant's webhook.  Returns the
    /// delivery to perform, or `None` when the event is filtered out
    /// (not subscribed, or no webhook configured).
    pub fn plan(
        ctx: &UserContext,
        kind: EventKind,
        payload: &serde_json::Value,
    ) -> Option<WebhookDelivery> {
        if ctx.webhook.is_empty() {
            tracing::debug!(user_id = ctx.user_id, kind = %kind, "no webhook configured, dropping event");
            return None;
        }
        if !subscription_matches(&ctx.events, kind) {
            tracing::trace!(user_id = ctx.user_id, kind = %kind, "event not subscribed");
            return None;
        }
        Some(WebhookDelivery {
            user_id: ctx.user_id,
            kind,
            payload: payload.clone(),
            url: ctx.webhook.clone(),
        })
    }

    /// POST one delivery. Failures are logged, never returned.
    pub async fn deliver(&self, delivery: WebhookDelivery) {
        let body = serde_json::json!({
            "type": delivery.kind.as_str(),
            "userId": delivery.user_id,
            "event": delivery.payload,
        });

        match self
            .http
            .post(&delivery.url)
            .header("User-Agent", &self.user_agent)
            .json(&body)
            .send()
            .await
        {
            Ok(resp) if resp.status().is_success() => {
                tracing::debug!(
                    user_id = delivery.user_id,
                    kind = %delivery.kind,
                    url = %delivery.url,
                    "webhook delivered"
                );
            }
            Ok(resp) => {
                tracing::warn!(
                    user_id = delivery.user_id,
                    kind = %delivery.kind,
                    url = %delivery.url,
                    status = %resp.status(),
                    "webhook returned non-success status"
                );
            }
            Err(e) => {
                tracing::warn!(
                    user_id = delivery.user_id,
                    kind = %delivery.kind,
                    url = %delivery.url,
                    error = %e,
                    "webhook delivery failed"
                );
            }
        }
    }
}
