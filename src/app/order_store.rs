use std::path::{Path, PathBuf};

use anyhow::Context as _;
use async_trait::async_trait;
use tokio::fs;

use crate::app::model::Order;

#[async_trait]
pub trait OrderStore: Send + Sync {
    async fn create(&self, order: &Order) -> anyhow::Result<()>;
    async fn get(&self, order_id: &str) -> anyhow::Result<Option<Order>>;
    async fn put(&self, order: &Order) -> anyhow::Result<()>;
    async fn list_ids(&self) -> anyhow::Result<Vec<String>>;
    async fn put_pdf(&self, order_id: &str, pdf: &[u8]) -> anyhow::Result<PathBuf>;
    fn pdf_path(&self, order_id: &str) -> PathBuf;
}

#[derive(Debug, Clone)]
pub struct LocalFsOrderStore {
    base_dir: PathBuf,
}

impl LocalFsOrderStore {
    pub fn new(base_dir: impl Into<PathBuf>) -> Self {
        Self {
            base_dir: base_dir.into(),
        }
    }

    fn orders_dir(&self) -> PathBuf {
        self.base_dir.join("orders")
    }

    pub fn order_dir(&self, order_id: &str) -> PathBuf {
        self.orders_dir().join(order_id)
    }

    fn order_json_path(&self, order_id: &str) -> PathBuf {
        self.order_dir(order_id).join("order.json")
    }
}

#[async_trait]
impl OrderStore for LocalFsOrderStore {
    async fn create(&self, order: &Order) -> anyhow::Result<()> {
        let path = self.order_json_path(&order.order_id);
        if fs::try_exists(&path).await.unwrap_or(false) {
            anyhow::bail!("order already exists: {}", order.order_id);
        }
        write_json_atomic(&path, order)
            .await
            .context("write order.json")?;
        Ok(())
    }

    async fn get(&self, order_id: &str) -> anyhow::Result<Option<Order>> {
        let path = self.order_json_path(order_id);
        read_json(&path)
            .await
            .with_context(|| format!("read: {}", path.display()))
    }

    async fn put(&self, order: &Order) -> anyhow::Result<()> {
        write_json_atomic(&self.order_json_path(&order.order_id), order)
            .await
            .context("write order.json")?;
        Ok(())
    }

    async fn list_ids(&self) -> anyhow::Result<Vec<String>> {
        let mut dir = match fs::read_dir(self.orders_dir()).await {
            Ok(dir) => dir,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(err) => return Err(err.into()),
        };

        let mut ids = Vec::new();
        while let Some(entry) = dir.next_entry().await? {
            if !entry.file_type().await?.is_dir() {
                continue;
            }
            let name = entry.file_name();
            let name = name.to_string_lossy();
            if uuid::Uuid::parse_str(name.as_ref()).is_ok() {
                ids.push(name.to_string());
            }
        }
        ids.sort();
        Ok(ids)
    }

    async fn put_pdf(&self, order_id: &str, pdf: &[u8]) -> anyhow::Result<PathBuf> {
        let path = self.pdf_path(order_id);
        write_bytes_atomic(&path, pdf)
            .await
            .context("write book.pdf")?;
        Ok(path)
    }

    fn pdf_path(&self, order_id: &str) -> PathBuf {
        self.order_dir(order_id).join("book.pdf")
    }
}

async fn read_json<T: serde::de::DeserializeOwned>(path: &Path) -> anyhow::Result<Option<T>> {
    let bytes = match fs::read(path).await {
        Ok(bytes) => bytes,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(err) => return Err(err.into()),
    };
    let value = serde_json::from_slice(&bytes).context("parse json")?;
    Ok(Some(value))
}

pub(crate) async fn write_json_atomic<T: serde::Serialize>(
    path: &Path,
    value: &T,
) -> anyhow::Result<()> {
    let data = serde_json::to_vec_pretty(value).context("serialize json")?;
    write_bytes_atomic(path, &data).await
}

pub(crate) async fn write_bytes_atomic(path: &Path, data: &[u8]) -> anyhow::Result<()> {
    let parent = path
        .parent()
        .ok_or_else(|| anyhow::anyhow!("path has no parent: {}", path.display()))?;
    fs::create_dir_all(parent)
        .await
        .with_context(|| format!("create parent dir: {}", parent.display()))?;

    let tmp_path = path.with_extension(format!("tmp.{}", uuid::Uuid::new_v4().simple()));
    fs::write(&tmp_path, data)
        .await
        .with_context(|| format!("write tmp: {}", tmp_path.display()))?;
    fs::rename(&tmp_path, path)
        .await
        .with_context(|| format!("rename tmp to final: {}", path.display()))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::app::model::OrderStatus;
    use crate::app::model::fixtures::sample_order;

    #[tokio::test]
    async fn create_get_put_round_trip() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let store = LocalFsOrderStore::new(dir.path());
        let id = uuid::Uuid::new_v4().to_string();

        assert!(store.get(&id).await?.is_none());
        let mut order = sample_order(&id);
        store.create(&order).await?;
        assert!(store.create(&order).await.is_err());

        order.status = OrderStatus::Delivered;
        store.put(&order).await?;
        let loaded = store.get(&id).await?.expect("order exists");
        assert_eq!(loaded.status, OrderStatus::Delivered);
        assert_eq!(loaded.book_data, order.book_data);
        Ok(())
    }

    #[tokio::test]
    async fn list_ids_skips_non_uuid_dirs() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let store = LocalFsOrderStore::new(dir.path());
        assert!(store.list_ids().await?.is_empty());

        let id = uuid::Uuid::new_v4().to_string();
        store.create(&sample_order(&id)).await?;
        std::fs::create_dir_all(dir.path().join("orders").join("scratch"))?;
        assert_eq!(store.list_ids().await?, vec![id]);
        Ok(())
    }

    #[tokio::test]
    async fn put_pdf_writes_next_to_order_json() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let store = LocalFsOrderStore::new(dir.path());
        let id = uuid::Uuid::new_v4().to_string();

        let path = store.put_pdf(&id, b"%PDF-1.7").await?;
        assert_eq!(path, store.pdf_path(&id));
        assert_eq!(path, dir.path().join("orders").join(&id).join("book.pdf"));
        assert_eq!(std::fs::read(&path)?, b"%PDF-1.7");
        Ok(())
    }
}
