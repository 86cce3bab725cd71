//! Subscription boundary
//!
//! Checkout and customer-portal sessions are created by the payment
//! provider; this module only requests them and derives premium access
//! from `premium_until`.

use crate::config::BillingConfig;
use crate::errors::{AppError, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Checkout mode requested from the payment provider
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CheckoutMode {
    Payment,
    Subscription,
}

/// Premium access is active while `premium_until` lies in the future
pub fn is_premium(premium_until: Option<DateTime<Utc>>, now: DateTime<Utc>) -> bool {
    premium_until.is_some_and(|until| until > now)
}

/// Trait for subscription providers
#[async_trait]
pub trait SubscriptionProvider: Send + Sync {
    /// Create a checkout session and return the redirect URL.
    /// `access_token` is the agent's session token, forwarded as is.
    async fn create_checkout_session(
        &self,
        access_token: &str,
        price_id: &str,
        mode: CheckoutMode,
    ) -> Result<String>;

    /// URL of the customer portal
    async fn create_portal_session(&self) -> Result<String>;
}

#[derive(Serialize)]
struct CheckoutRequest<'a> {
    price_id: &'a str,
    mode: CheckoutMode,
    success_url: &'a str,
    cancel_url: &'a str,
}

#[derive(Deserialize)]
struct CheckoutResponse {
    url: Option<String>,
    error: Option<String>,
}

/// Calls the hosted checkout function over HTTP
pub struct HttpSubscriptionProvider {
    client: reqwest::Client,
    config: BillingConfig,
}

impl HttpSubscriptionProvider {
    pub fn new(config: BillingConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()?;
        Ok(Self { client, config })
    }
}

#[async_trait]
impl SubscriptionProvider for HttpSubscriptionProvider {
    async fn create_checkout_session(
        &self,
        access_token: &str,
        price_id: &str,
        mode: CheckoutMode,
    ) -> Result<String> {
        let endpoint = self
            .config
            .checkout_url
            .as_deref()
            .ok_or_else(|| AppError::Configuration {
                message: "billing.checkout_url is not set".to_string(),
            })?;

        tracing::info!(price_id, mode = ?mode, "Creating checkout session");

        let response = self
            .client
            .post(endpoint)
            .bearer_auth(access_token)
            .json(&CheckoutRequest {
                price_id,
                mode,
                success_url: &self.config.return_url,
                cancel_url: &self.config.return_url,
            })
            .send()
            .await?;

        let status = response.status();
        let body: CheckoutResponse = response.json().await?;

        if !status.is_success() {
            return Err(AppError::Upstream {
                message: body
                    .error
                    .unwrap_or_else(|| format!("Checkout failed with status {}", status)),
            });
        }

        body.url.ok_or_else(|| AppError::Upstream {
            message: "No checkout URL returned".to_string(),
        })
    }

    async fn create_portal_session(&self) -> Result<String> {
        Ok(self.config.portal_url.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration as ChronoDuration;

    #[test]
    fn test_is_premium() {
        let now = Utc::now();
        assert!(is_premium(Some(now + ChronoDuration::days(1)), now));
        assert!(!is_premium(Some(now - ChronoDuration::seconds(1)), now));
        assert!(!is_premium(Some(now), now));
        assert!(!is_premium(None, now));
    }

    #[test]
    fn test_portal_uses_configured_url() {
        let provider = HttpSubscriptionProvider::new(BillingConfig::default()).unwrap();
        let url = tokio_test::assert_ok!(tokio_test::block_on(provider.create_portal_session()));
        assert_eq!(url, BillingConfig::default().portal_url);
    }

    #[tokio::test]
    async fn test_checkout_requires_endpoint() {
        let provider = HttpSubscriptionProvider::new(BillingConfig::default()).unwrap();
        let res = provider
            .create_checkout_session("token", "price_1", CheckoutMode::Subscription)
            .await;
        assert!(matches!(res, Err(AppError::Configuration { .. })));
    }
}
