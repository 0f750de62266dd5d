use anyhow::Context as _;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::app::model::Order;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Checkout {
    pub checkout_id: String,
    pub checkout_url: String,
}

/// Hosted-checkout provider. Payment confirmation arrives out of band.
#[async_trait]
pub trait PaymentGateway: Send + Sync {
    async fn create_checkout(&self, order: &Order) -> anyhow::Result<Checkout>;
}

#[derive(Debug, Serialize)]
struct CreateCheckoutRequest<'a> {
    reference: &'a str,
    order_number: &'a str,
    amount_cents: u64,
    currency: &'a str,
    customer_email: &'a str,
    description: String,
    success_url: String,
    cancel_url: String,
}

#[derive(Debug, Deserialize)]
struct CreateCheckoutResponse {
    id: String,
    url: String,
}

#[derive(Clone)]
pub struct HttpPaymentGateway {
    client: reqwest::Client,
    api_url: String,
    api_token: String,
    public_base_url: String,
}

impl HttpPaymentGateway {
    pub fn new(api_url: &str, api_token: &str, public_base_url: &str) -> Self {
        Self {
            client: reqwest::Client::new(),
            api_url: api_url.trim_end_matches('/').to_string(),
            api_token: api_token.to_string(),
            public_base_url: public_base_url.trim_end_matches('/').to_string(),
        }
    }
}

#[async_trait]
impl PaymentGateway for HttpPaymentGateway {
    async fn create_checkout(&self, order: &Order) -> anyhow::Result<Checkout> {
        let body = CreateCheckoutRequest {
            reference: &order.order_id,
            order_number: &order.order_number,
            amount_cents: order.total_cents,
            currency: &order.currency,
            customer_email: &order.delivery.email,
            description: format!(
                "Personalized book for {}",
                order.book_data.spec.child_name.trim()
            ),
            success_url: format!(
                "{}/orders/{}/confirmation",
                self.public_base_url, order.order_id
            ),
            cancel_url: format!("{}/cart", self.public_base_url),
        };

        let resp = self
            .client
            .post(format!("{}/checkouts", self.api_url))
            .bearer_auth(&self.api_token)
            .json(&body)
            .send()
            .await
            .context("send create checkout request")?;
        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            anyhow::bail!("create checkout failed ({status}): {body}");
        }
        let created: CreateCheckoutResponse =
            resp.json().await.context("parse checkout response json")?;
        Ok(Checkout {
            checkout_id: created.id,
            checkout_url: created.url,
        })
    }
}

/// Local development gateway: every checkout succeeds and points straight at
/// the confirmation page.
#[derive(Debug, Clone)]
pub struct NoopPaymentGateway {
    public_base_url: String,
}

impl NoopPaymentGateway {
    pub fn new(public_base_url: &str) -> Self {
        Self {
            public_base_url: public_base_url.trim_end_matches('/').to_string(),
        }
    }
}

#[async_trait]
impl PaymentGateway for NoopPaymentGateway {
    async fn create_checkout(&self, order: &Order) -> anyhow::Result<Checkout> {
        tracing::info!(order_id = %order.order_id, "noop payment gateway: skipping checkout");
        Ok(Checkout {
            checkout_id: format!("noop_{}", order.order_id),
            checkout_url: format!(
                "{}/orders/{}/confirmation",
                self.public_base_url, order.order_id
            ),
        })
    }
}
