pub mod checkout;
pub mod delivery;
pub mod mailer;
pub mod model;
pub mod order_store;
pub mod payment;
pub mod queue;
pub mod server;

use std::sync::Arc;

use anyhow::Context as _;

use crate::config::{AppConfig, BookConfig, MailTransport, PaymentTransport};
use crate::pdf::{HttpImageFetcher, PrintRenderer};

use self::checkout::{CheckoutService, Pricing};
use self::delivery::{DeliveryAddresses, DeliveryRunner};
use self::mailer::{HttpMailer, Mailer, OutboxMailer};
use self::order_store::{LocalFsOrderStore, OrderStore};
use self::payment::{HttpPaymentGateway, NoopPaymentGateway, PaymentGateway};

/// Collaborators shared by the server and the one-shot `deliver` command.
pub struct Services {
    pub book_config: BookConfig,
    pub store: Arc<dyn OrderStore>,
    pub checkout: Arc<CheckoutService>,
    pub runner: Arc<DeliveryRunner>,
}

impl Services {
    pub fn from_config(config: &AppConfig) -> anyhow::Result<Self> {
        let book_config =
            BookConfig::load(config.book_config_path.as_deref()).context("load book config")?;
        let store: Arc<dyn OrderStore> = Arc::new(LocalFsOrderStore::new(&config.data_dir));

        let gateway: Arc<dyn PaymentGateway> = match &config.payment {
            PaymentTransport::Http { api_url, api_token } => {
                tracing::info!(api_url = %api_url, "using http payment gateway");
                Arc::new(HttpPaymentGateway::new(
                    api_url,
                    api_token,
                    &config.public_base_url,
                ))
            }
            PaymentTransport::Noop => {
                tracing::warn!("no payment api configured; checkouts are not charged");
                Arc::new(NoopPaymentGateway::new(&config.public_base_url))
            }
        };
        let mailer: Arc<dyn Mailer> = match &config.mail {
            MailTransport::Http { api_url, api_token } => {
                tracing::info!(api_url = %api_url, "using http mailer");
                Arc::new(HttpMailer::new(api_url, api_token))
            }
            MailTransport::Outbox { dir } => {
                tracing::info!(dir = %dir.display(), "writing mail to local outbox");
                Arc::new(OutboxMailer::new(dir.clone()))
            }
        };

        let checkout = CheckoutService::new(
            Arc::clone(&store),
            gateway,
            Pricing {
                book_price_cents: config.book_price_cents,
                standard_delivery_cents: config.standard_delivery_cents,
                express_delivery_cents: config.express_delivery_cents,
                currency: config.currency.clone(),
            },
        )
        .with_page_size(book_config.page_width_pt, book_config.page_height_pt);
        let fetcher = HttpImageFetcher::new(book_config.asset_timeout())?;
        let runner = DeliveryRunner::new(
            Arc::clone(&store),
            PrintRenderer::new(book_config.clone(), Arc::new(fetcher)),
            mailer,
            DeliveryAddresses {
                production_email: config.production_email.clone(),
                sender_email: config.sender_email.clone(),
            },
        );

        Ok(Self {
            book_config,
            store,
            checkout: Arc::new(checkout),
            runner: Arc::new(runner),
        })
    }
}
