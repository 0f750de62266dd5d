use chrono::{DateTime, TimeDelta, Utc};
use serde::{Deserialize, Serialize};

use crate::pages::BookData;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum OrderStatus {
    PendingPayment,
    CheckoutCreated,
    CheckoutFailed,
    Delivering,
    Delivered,
    DeliveryFailed,
}

impl OrderStatus {
    /// Paid orders, plus delivered or failed ones being sent again.
    pub fn is_deliverable(self) -> bool {
        matches!(
            self,
            Self::CheckoutCreated | Self::Delivered | Self::DeliveryFailed
        )
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum DeliveryOption {
    Standard,
    Express,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct DeliveryDetails {
    pub option: DeliveryOption,
    pub recipient_name: String,
    pub email: String,
    pub address_line1: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub address_line2: Option<String>,
    pub city: String,
    pub postal_code: String,
    pub country: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Order {
    pub order_id: String,
    pub order_number: String,
    pub status: OrderStatus,
    pub book_data: BookData,
    pub delivery: DeliveryDetails,
    pub physical_page_count: usize,
    pub total_cents: u64,
    pub currency: String,
    pub checkout_id: Option<String>,
    pub checkout_url: Option<String>,
    pub message: String,
    pub pdf_sha256: Option<String>,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub delivered_at: Option<DateTime<Utc>>,
}

/// A `Delivering` row untouched for this many minutes belongs to a run that
/// died.
pub const STALE_DELIVERY_MINUTES: i64 = 30;

impl Order {
    /// Deliverable status, or a delivery that stalled before recording an
    /// outcome.
    pub fn is_deliverable_at(&self, now: DateTime<Utc>) -> bool {
        self.status.is_deliverable()
            || (self.status == OrderStatus::Delivering && now - self.updated_at >= TimeDelta::minutes(STALE_DELIVERY_MINUTES))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubmitOrderRequest {
    pub book_data: BookData,
    pub delivery: DeliveryDetails,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SubmittedOrder {
    pub order_id: String,
    pub order_number: String,
    pub checkout_url: String,
    pub total_cents: u64,
    pub currency: String,
}

/// Short customer-facing reference, e.g. `NB-20261019-3FA2C1`.
pub fn order_number(order_id: &uuid::Uuid, now: DateTime<Utc>) -> String {
    let hex = order_id.simple().to_string().to_ascii_uppercase();
    format!("NB-{}-{}", now.format("%Y%m%d"), &hex[..6])
}
