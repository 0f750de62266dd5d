use std::sync::Arc;

use anyhow::Context as _;
use chrono::Utc;

use crate::app::model::{
    DeliveryOption, Order, OrderStatus, SubmitOrderRequest, SubmittedOrder, order_number,
};
use crate::app::order_store::OrderStore;
use crate::app::payment::PaymentGateway;
use crate::config::BookConfig;
use crate::pages::{name_letters, physical_page_count};
use crate::pdf::layout_dedication;

const MAX_NAME_CHARS: usize = 40;
const MAX_MESSAGE_CHARS: usize = 600;
const MAX_SIGNATURE_CHARS: usize = 80;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Pricing {
    pub book_price_cents: u64,
    pub standard_delivery_cents: u64,
    pub express_delivery_cents: u64,
    pub currency: String,
}

impl Pricing {
    pub fn delivery_cents(&self, option: DeliveryOption) -> u64 {
        match option {
            DeliveryOption::Standard => self.standard_delivery_cents,
            DeliveryOption::Express => self.express_delivery_cents,
        }
    }

    pub fn total_cents(&self, option: DeliveryOption) -> u64 {
        self.book_price_cents + self.delivery_cents(option)
    }
}

/// Checks a submission before anything is persisted. The error is a
/// customer-facing message.
pub fn validate_submission(req: &SubmitOrderRequest) -> Result<(), String> {
    let name = req.book_data.spec.child_name.trim();
    if name.chars().count() > MAX_NAME_CHARS {
        return Err(format!("child_name must be at most {MAX_NAME_CHARS} characters"));
    }
    if name_letters(name).is_empty() {
        return Err("child_name must contain at least one letter A-Z".to_string());
    }

    let free_text = [
        ("dedication_message", &req.book_data.dedication_message, MAX_MESSAGE_CHARS),
        ("personal_message", &req.book_data.personal_message, MAX_MESSAGE_CHARS),
        ("from_signature", &req.book_data.from_signature, MAX_SIGNATURE_CHARS),
    ];
    for (field, value, max) in free_text {
        if value.chars().count() > max {
            return Err(format!("{field} must be at most {max} characters"));
        }
    }

    let d = &req.delivery;
    let required = [
        ("recipient_name", &d.recipient_name),
        ("email", &d.email),
        ("address_line1", &d.address_line1),
        ("city", &d.city),
        ("postal_code", &d.postal_code),
        ("country", &d.country),
    ];
    for (field, value) in required {
        if value.trim().is_empty() {
            return Err(format!("delivery.{field} is required"));
        }
    }
    if !d.email.contains('@') {
        return Err("delivery.email is invalid".to_string());
    }
    Ok(())
}

#[derive(Debug)]
pub enum SubmitError {
    Invalid(String),
    Gateway(anyhow::Error),
    Internal(anyhow::Error),
}

impl std::fmt::Display for SubmitError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Invalid(msg) => write!(f, "invalid order: {msg}"),
            Self::Gateway(err) => write!(f, "checkout failed: {err:#}"),
            Self::Internal(err) => write!(f, "{err:#}"),
        }
    }
}

impl std::error::Error for SubmitError {}

pub struct CheckoutService {
    store: Arc<dyn OrderStore>,
    gateway: Arc<dyn PaymentGateway>,
    pricing: Pricing,
    page_size: (f32, f32),
}

impl CheckoutService {
    pub fn new(
        store: Arc<dyn OrderStore>,
        gateway: Arc<dyn PaymentGateway>,
        pricing: Pricing,
    ) -> Self {
        let defaults = BookConfig::default();
        Self {
            store,
            gateway,
            pricing,
            page_size: (defaults.page_width_pt, defaults.page_height_pt),
        }
    }

    /// Print page size used to check that the dedication text fits.
    pub fn with_page_size(mut self, width_pt: f32, height_pt: f32) -> Self {
        self.page_size = (width_pt, height_pt);
        self
    }

    /// Creates the order row, asks the gateway for a hosted checkout, then
    /// records the checkout on the row. A gateway failure is not retried.
    pub async fn submit(&self, req: SubmitOrderRequest) -> Result<SubmittedOrder, SubmitError> {
        validate_submission(&req).map_err(SubmitError::Invalid)?;
        let (width, height) = self.page_size;
        if !layout_dedication(&req.book_data, width, height).fits() {
            return Err(SubmitError::Invalid(
                "dedication_message and personal_message do not fit on the dedication page"
                    .to_string(),
            ));
        }

        let id = uuid::Uuid::new_v4();
        let now = Utc::now();
        let mut book_data = req.book_data;
        book_data.spec.child_name = book_data.spec.child_name.trim().to_string();
        let letters = name_letters(&book_data.spec.child_name).len();

        let mut order = Order {
            order_id: id.to_string(),
            order_number: order_number(&id, now),
            status: OrderStatus::PendingPayment,
            physical_page_count: physical_page_count(letters),
            total_cents: self.pricing.total_cents(req.delivery.option),
            currency: self.pricing.currency.clone(),
            book_data,
            delivery: req.delivery,
            checkout_id: None,
            checkout_url: None,
            message: "awaiting checkout".to_string(),
            pdf_sha256: None,
            created_at: now,
            updated_at: now,
            delivered_at: None,
        };
        self.store
            .create(&order)
            .await
            .context("create order")
            .map_err(SubmitError::Internal)?;
        tracing::info!(
            order_id = %order.order_id,
            order_number = %order.order_number,
            total_cents = order.total_cents,
            "order created"
        );

        let checkout = match self.gateway.create_checkout(&order).await {
            Ok(checkout) => checkout,
            Err(err) => {
                tracing::error!(order_id = %order.order_id, ?err, "create checkout failed");
                order.status = OrderStatus::CheckoutFailed;
                order.message = format!("{err:#}");
                order.updated_at = Utc::now();
                if let Err(put_err) = self.store.put(&order).await {
                    tracing::error!(order_id = %order.order_id, ?put_err, "save order failed");
                }
                return Err(SubmitError::Gateway(err));
            }
        };

        order.status = OrderStatus::CheckoutCreated;
        order.checkout_id = Some(checkout.checkout_id);
        order.checkout_url = Some(checkout.checkout_url.clone());
        order.message = "checkout created".to_string();
        order.updated_at = Utc::now();
        self.store
            .put(&order)
            .await
            .context("save order")
            .map_err(SubmitError::Internal)?;

        Ok(SubmittedOrder {
            order_id: order.order_id,
            order_number: order.order_number,
            checkout_url: checkout.checkout_url,
            total_cents: order.total_cents,
            currency: order.currency,
        })
    }
}
