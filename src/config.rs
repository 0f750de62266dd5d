use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::Context as _;
use serde::{Deserialize, Serialize};

use crate::theme::ThemeOrders;

/// Knobs for page assembly and PDF rendering. Loaded from YAML; every field
/// has a default so a partial file is fine.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct BookConfig {
    pub theme_orders: ThemeOrders,
    pub remote_asset_base_url: String,
    pub local_asset_prefix: String,
    pub page_width_pt: f32,
    pub page_height_pt: f32,
    pub asset_timeout_ms: u64,
    pub assembly_deadline_ms: u64,
    pub max_concurrent_fetches: usize,
    pub fallback_font_size: f32,
}

impl Default for BookConfig {
    fn default() -> Self {
        Self {
            theme_orders: ThemeOrders::default(),
            remote_asset_base_url: "https://assets.namebook.invalid/books".to_string(),
            local_asset_prefix: "/assets".to_string(),
            page_width_pt: 524.0,
            page_height_pt: 595.0,
            asset_timeout_ms: 15_000,
            assembly_deadline_ms: 120_000,
            max_concurrent_fetches: 6,
            fallback_font_size: 320.0,
        }
    }
}

impl BookConfig {
    pub fn from_yaml_file(path: &Path) -> anyhow::Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("read config: {}", path.display()))?;
        Self::from_yaml_str(&raw).with_context(|| format!("parse config: {}", path.display()))
    }

    pub fn from_yaml_str(raw: &str) -> anyhow::Result<Self> {
        let config: Self = serde_yaml::from_str(raw).context("parse yaml")?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: Option<&Path>) -> anyhow::Result<Self> {
        match path {
            Some(path) => Self::from_yaml_file(path),
            None => Ok(Self::default()),
        }
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        if !(self.page_width_pt > 0.0 && self.page_height_pt > 0.0) {
            anyhow::bail!("page size must be positive");
        }
        if self.remote_asset_base_url.trim().is_empty() {
            anyhow::bail!("remote_asset_base_url is empty");
        }
        url::Url::parse(&self.remote_asset_base_url).with_context(|| {
            format!(
                "invalid remote_asset_base_url: {}",
                self.remote_asset_base_url
            )
        })?;
        if self.asset_timeout_ms == 0 || self.assembly_deadline_ms == 0 {
            anyhow::bail!("timeouts must be > 0");
        }
        Ok(())
    }

    pub fn asset_timeout(&self) -> Duration {
        Duration::from_millis(self.asset_timeout_ms)
    }

    pub fn assembly_deadline(&self) -> Duration {
        Duration::from_millis(self.assembly_deadline_ms)
    }
}

#[derive(Debug, Clone)]
pub enum MailTransport {
    Http { api_url: String, api_token: String },
    Outbox { dir: PathBuf },
}

#[derive(Debug, Clone)]
pub enum PaymentTransport {
    Http { api_url: String, api_token: String },
    Noop,
}

/// Service settings read from `NAMEBOOK_*` environment variables.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub data_dir: PathBuf,
    pub book_config_path: Option<PathBuf>,
    pub production_email: String,
    pub sender_email: String,
    pub mail: MailTransport,
    pub payment: PaymentTransport,
    pub internal_auth_token: Option<String>,
    pub public_base_url: String,
    pub book_price_cents: u64,
    pub standard_delivery_cents: u64,
    pub express_delivery_cents: u64,
    pub currency: String,
}

impl AppConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> anyhow::Result<Self> {
        let get = |key: &str| {
            lookup(key)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };
        let cents = |key: &str, default: u64| -> anyhow::Result<u64> {
            match get(key) {
                None => Ok(default),
                Some(raw) => raw
                    .parse::<u64>()
                    .with_context(|| format!("invalid {key}={raw:?}")),
            }
        };

        let data_dir = PathBuf::from(get("NAMEBOOK_DATA_DIR").unwrap_or_else(|| "workspace-app".to_string()));

        let mail = match get("NAMEBOOK_MAIL_API_URL") {
            Some(api_url) => {
                let api_token = get("NAMEBOOK_MAIL_API_TOKEN")
                    .context("NAMEBOOK_MAIL_API_TOKEN is required when NAMEBOOK_MAIL_API_URL is set")?;
                MailTransport::Http { api_url, api_token }
            }
            None => MailTransport::Outbox {
                dir: get("NAMEBOOK_OUTBOX_DIR")
                    .map(PathBuf::from)
                    .unwrap_or_else(|| data_dir.join("outbox")),
            },
        };

        let payment = match get("NAMEBOOK_PAYMENT_API_URL") {
            Some(api_url) => {
                let api_token = get("NAMEBOOK_PAYMENT_API_TOKEN").context(
                    "NAMEBOOK_PAYMENT_API_TOKEN is required when NAMEBOOK_PAYMENT_API_URL is set",
                )?;
                PaymentTransport::Http { api_url, api_token }
            }
            None => PaymentTransport::Noop,
        };

        Ok(Self {
            book_config_path: get("NAMEBOOK_BOOK_CONFIG").map(PathBuf::from),
            production_email: get("NAMEBOOK_PRODUCTION_EMAIL")
                .unwrap_or_else(|| "production@namebook.invalid".to_string()),
            sender_email: get("NAMEBOOK_SENDER_EMAIL")
                .unwrap_or_else(|| "orders@namebook.invalid".to_string()),
            mail,
            payment,
            internal_auth_token: get("NAMEBOOK_INTERNAL_AUTH_TOKEN"),
            public_base_url: get("NAMEBOOK_PUBLIC_BASE_URL")
                .unwrap_or_else(|| "http://127.0.0.1:8080".to_string())
                .trim_end_matches('/')
                .to_string(),
            book_price_cents: cents("NAMEBOOK_BOOK_PRICE_CENTS", 2999)?,
            standard_delivery_cents: cents("NAMEBOOK_STANDARD_DELIVERY_CENTS", 499)?,
            express_delivery_cents: cents("NAMEBOOK_EXPRESS_DELIVERY_CENTS", 1299)?,
            currency: get("NAMEBOOK_CURRENCY").unwrap_or_else(|| "usd".to_string()),
            data_dir,
        })
    }
}
