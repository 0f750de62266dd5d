use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context as _;
use chrono::Utc;
use serde::Serialize;
use sha2::{Digest as _, Sha256};

use crate::app::mailer::{Attachment, Mailer, OutgoingMail};
use crate::app::model::{Order, OrderStatus};
use crate::app::order_store::OrderStore;
use crate::cli::DeliverArgs;
use crate::config::AppConfig;
use crate::pdf::{PageOutcome, PrintRenderer, RenderedBook};

#[derive(Debug, Clone, Serialize)]
pub struct DeliveryReport {
    pub order_id: String,
    pub order_number: String,
    pub pdf_path: PathBuf,
    pub pdf_sha256: String,
    pub page_count: usize,
    pub fallback_pages: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct DeliveryAddresses {
    pub production_email: String,
    pub sender_email: String,
}

pub struct DeliveryRunner {
    store: Arc<dyn OrderStore>,
    renderer: PrintRenderer,
    mailer: Arc<dyn Mailer>,
    addresses: DeliveryAddresses,
}

impl DeliveryRunner {
    pub fn new(
        store: Arc<dyn OrderStore>,
        renderer: PrintRenderer,
        mailer: Arc<dyn Mailer>,
        addresses: DeliveryAddresses,
    ) -> Self {
        Self {
            store,
            renderer,
            mailer,
            addresses,
        }
    }

    /// Background entry point: failures are logged and recorded on the order.
    pub async fn run_order(&self, order_id: &str) {
        match self.deliver(order_id).await {
            Ok(report) => tracing::info!(
                order_id,
                sha256 = %report.pdf_sha256,
                fallback_pages = report.fallback_pages.len(),
                "order delivered"
            ),
            Err(err) => tracing::error!(order_id, ?err, "delivery failed"),
        }
    }

    pub async fn deliver(&self, order_id: &str) -> anyhow::Result<DeliveryReport> {
        let mut order = self
            .store
            .get(order_id)
            .await
            .context("load order")?
            .ok_or_else(|| anyhow::anyhow!("order not found: {order_id}"))?;
        if !order.is_deliverable_at(Utc::now()) {
            anyhow::bail!(
                "order {order_id} cannot be delivered in state {:?}",
                order.status
            );
        }

        self.mark_delivering(&mut order).await.context("mark delivering")?;
        match self.try_deliver(&mut order).await {
            Ok(report) => Ok(report),
            Err(err) => {
                if let Err(mark_err) = self.mark_failed(&mut order, format!("{err:#}")).await {
                    tracing::error!(order_id, ?mark_err, "failed to record delivery failure");
                }
                Err(err)
            }
        }
    }

    async fn try_deliver(&self, order: &mut Order) -> anyhow::Result<DeliveryReport> {
        let rendered = self
            .renderer
            .render(&order.book_data)
            .await
            .context("render pdf")?;
        let fallback_pages = fallback_labels(&rendered);
        if !fallback_pages.is_empty() {
            tracing::warn!(
                order_id = %order.order_id,
                pages = ?fallback_pages,
                "some pages printed without artwork"
            );
        }

        let pdf_sha256 = hex::encode(Sha256::digest(&rendered.pdf));
        let pdf_path = self
            .store
            .put_pdf(&order.order_id, &rendered.pdf)
            .await
            .context("store pdf")?;

        let mail = production_mail(order, &self.addresses, &rendered, &fallback_pages);
        self.mailer
            .send(&mail)
            .await
            .context("email pdf to production")?;

        let now = Utc::now();
        order.status = OrderStatus::Delivered;
        order.pdf_sha256 = Some(pdf_sha256.clone());
        order.message = "sent to production".to_string();
        order.updated_at = now;
        order.delivered_at = Some(now);
        self.store.put(order).await.context("save order")?;

        Ok(DeliveryReport {
            order_id: order.order_id.clone(),
            order_number: order.order_number.clone(),
            pdf_path,
            pdf_sha256,
            page_count: rendered.pages.len(),
            fallback_pages,
        })
    }

    async fn mark_delivering(&self, order: &mut Order) -> anyhow::Result<()> {
        order.status = OrderStatus::Delivering;
        order.message = "rendering".to_string();
        order.updated_at = Utc::now();
        self.store.put(order).await.context("save order")?;
        Ok(())
    }

    async fn mark_failed(&self, order: &mut Order, message: String) -> anyhow::Result<()> {
        order.status = OrderStatus::DeliveryFailed;
        order.message = message;
        order.updated_at = Utc::now();
        self.store.put(order).await?;
        Ok(())
    }
}

/// `namebook deliver`: runs one delivery in the foreground and prints the
/// report as JSON.
pub async fn run(args: DeliverArgs) -> anyhow::Result<()> {
    let mut config = AppConfig::from_env().context("read environment config")?;
    if let Some(data_dir) = args.data_dir {
        config.data_dir = data_dir;
    }
    let services = crate::app::Services::from_config(&config)?;
    let report = services.runner.deliver(args.order_id.trim()).await?;
    let json = serde_json::to_string_pretty(&report).context("serialize report")?;
    println!("{json}");
    Ok(())
}

fn fallback_labels(rendered: &RenderedBook) -> Vec<String> {
    rendered
        .pages
        .iter()
        .filter(|p| matches!(p.outcome, PageOutcome::Fallback { .. }))
        .map(|p| p.label.clone())
        .collect()
}

fn production_mail(
    order: &Order,
    addresses: &DeliveryAddresses,
    rendered: &RenderedBook,
    fallback_pages: &[String],
) -> OutgoingMail {
    let d = &order.delivery;
    let mut text = format!(
        "Order {number}\nChild name: {name}\nPages: {pages} ({spreads} spreads)\nDelivery: {option:?}\n\nShip to:\n{recipient}\n{line1}\n",
        number = order.order_number,
        name = order.book_data.spec.child_name,
        pages = order.physical_page_count,
        spreads = rendered.pages.len(),
        option = d.option,
        recipient = d.recipient_name,
        line1 = d.address_line1,
    );
    if let Some(line2) = d.address_line2.as_deref().filter(|l| !l.trim().is_empty()) {
        text.push_str(line2);
        text.push('\n');
    }
    text.push_str(&format!("{} {}\n{}\n", d.postal_code, d.city, d.country));
    if !fallback_pages.is_empty() {
        text.push_str(&format!(
            "\nPrinted without artwork: {}\n",
            fallback_pages.join(", ")
        ));
    }

    OutgoingMail {
        from: addresses.sender_email.clone(),
        to: vec![addresses.production_email.clone()],
        subject: format!(
            "Print order {} for {}",
            order.order_number, order.book_data.spec.child_name
        ),
        text,
        attachments: vec![Attachment {
            filename: format!("{}.pdf", order.order_number),
            content_type: "application/pdf".to_string(),
            data: rendered.pdf.clone(),
        }],
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use async_trait::async_trait;
    use sha2::Digest as _;

    use super::*;
    use crate::app::model::fixtures::sample_order;
    use crate::app::order_store::LocalFsOrderStore;
    use crate::config::BookConfig;
    use crate::pdf::ImageFetcher;

    struct NoArtwork;

    #[async_trait]
    impl ImageFetcher for NoArtwork {
        async fn fetch(&self, url: &str) -> anyhow::Result<Vec<u8>> {
            anyhow::bail!("not found: {url}")
        }
    }

    #[derive(Default)]
    struct RecordingMailer {
        sent: Mutex<Vec<OutgoingMail>>,
    }

    #[async_trait]
    impl Mailer for RecordingMailer {
        async fn send(&self, mail: &OutgoingMail) -> anyhow::Result<()> {
            self.sent.lock().unwrap().push(mail.clone());
            Ok(())
        }
    }

    struct BrokenMailer;

    #[async_trait]
    impl Mailer for BrokenMailer {
        async fn send(&self, _mail: &OutgoingMail) -> anyhow::Result<()> {
            anyhow::bail!("smtp relay down")
        }
    }

    fn runner(store: Arc<dyn OrderStore>, mailer: Arc<dyn Mailer>) -> DeliveryRunner {
        DeliveryRunner::new(
            store,
            PrintRenderer::new(BookConfig::default(), Arc::new(NoArtwork)),
            mailer,
            DeliveryAddresses {
                production_email: "print@example.com".to_string(),
                sender_email: "orders@example.com".to_string(),
            },
        )
    }

    async fn paid_order(store: &dyn OrderStore) -> anyhow::Result<String> {
        let id = uuid::Uuid::new_v4().to_string();
        let mut order = sample_order(&id);
        order.status = OrderStatus::CheckoutCreated;
        store.create(&order).await?;
        Ok(id)
    }

    #[tokio::test]
    async fn delivers_pdf_even_when_artwork_is_missing() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let store: Arc<dyn OrderStore> = Arc::new(LocalFsOrderStore::new(dir.path()));
        let mailer = Arc::new(RecordingMailer::default());
        let id = paid_order(store.as_ref()).await?;

        let report = runner(Arc::clone(&store), mailer.clone()).deliver(&id).await?;
        // Noah: cover, dedication, 2 intro, 4 letters, 2 ending.
        assert_eq!(report.page_count, 10);
        assert_eq!(report.fallback_pages.len(), 9);

        let pdf = std::fs::read(&report.pdf_path)?;
        assert!(pdf.starts_with(b"%PDF"));
        assert_eq!(report.pdf_sha256, hex::encode(Sha256::digest(&pdf)));

        let sent = mailer.sent.lock().unwrap();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].to, vec!["print@example.com".to_string()]);
        assert_eq!(sent[0].attachments[0].filename, "NB-20261019-ABCDEF.pdf");
        assert!(sent[0].text.contains("Springfield"));
        drop(sent);

        let order = store.get(&id).await?.expect("order");
        assert_eq!(order.status, OrderStatus::Delivered);
        assert_eq!(order.pdf_sha256.as_deref(), Some(report.pdf_sha256.as_str()));
        assert!(order.delivered_at.is_some());
        Ok(())
    }

    #[tokio::test]
    async fn mail_failure_marks_delivery_failed() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let store: Arc<dyn OrderStore> = Arc::new(LocalFsOrderStore::new(dir.path()));
        let id = paid_order(store.as_ref()).await?;

        let err = runner(Arc::clone(&store), Arc::new(BrokenMailer))
            .deliver(&id)
            .await
            .unwrap_err();
        assert!(format!("{err:#}").contains("smtp relay down"));

        let order = store.get(&id).await?.expect("order");
        assert_eq!(order.status, OrderStatus::DeliveryFailed);
        assert!(order.message.contains("smtp relay down"));
        Ok(())
    }

    #[tokio::test]
    async fn unpaid_order_is_left_untouched() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let store: Arc<dyn OrderStore> = Arc::new(LocalFsOrderStore::new(dir.path()));
        let id = uuid::Uuid::new_v4().to_string();
        store.create(&sample_order(&id)).await?;

        let mailer = Arc::new(RecordingMailer::default());
        assert!(runner(Arc::clone(&store), mailer).deliver(&id).await.is_err());
        let order = store.get(&id).await?.expect("order");
        assert_eq!(order.status, OrderStatus::PendingPayment);
        Ok(())
    }

    #[tokio::test]
    async fn stalled_delivery_is_resumed() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let store: Arc<dyn OrderStore> = Arc::new(LocalFsOrderStore::new(dir.path()));
        let fresh = uuid::Uuid::new_v4().to_string();
        let stalled = uuid::Uuid::new_v4().to_string();
        for (id, age) in [(&fresh, 1), (&stalled, 120)] {
            let mut order = sample_order(id);
            order.status = OrderStatus::Delivering;
            order.updated_at = Utc::now() - chrono::TimeDelta::minutes(age);
            store.create(&order).await?;
        }

        let mailer = Arc::new(RecordingMailer::default());
        let runner = runner(Arc::clone(&store), mailer.clone());
        assert!(runner.deliver(&fresh).await.is_err());
        runner.deliver(&stalled).await?;

        assert_eq!(mailer.sent.lock().unwrap().len(), 1);
        let order = store.get(&stalled).await?.expect("order");
        assert_eq!(order.status, OrderStatus::Delivered);
        Ok(())
    }
}
