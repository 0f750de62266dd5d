use std::path::PathBuf;

use anyhow::Context as _;
use async_trait::async_trait;
use base64::Engine as _;
use serde::Serialize;

use crate::app::order_store::{write_bytes_atomic, write_json_atomic};

#[derive(Debug, Clone)]
pub struct Attachment {
    pub filename: String,
    pub content_type: String,
    pub data: Vec<u8>,
}

#[derive(Debug, Clone)]
pub struct OutgoingMail {
    pub from: String,
    pub to: Vec<String>,
    pub subject: String,
    pub text: String,
    pub attachments: Vec<Attachment>,
}

#[async_trait]
pub trait Mailer: Send + Sync {
    async fn send(&self, mail: &OutgoingMail) -> anyhow::Result<()>;
}

#[derive(Debug, Serialize)]
struct SendMailRequest<'a> {
    from: &'a str,
    to: &'a [String],
    subject: &'a str,
    text: &'a str,
    attachments: Vec<SendMailAttachment<'a>>,
}

#[derive(Debug, Serialize)]
struct SendMailAttachment<'a> {
    filename: &'a str,
    content_type: &'a str,
    content: String,
}

/// Transactional-email JSON API with base64 attachments.
#[derive(Clone)]
pub struct HttpMailer {
    client: reqwest::Client,
    api_url: String,
    api_token: String,
}

impl HttpMailer {
    pub fn new(api_url: &str, api_token: &str) -> Self {
        Self {
            client: reqwest::Client::new(),
            api_url: api_url.to_string(),
            api_token: api_token.to_string(),
        }
    }
}

#[async_trait]
impl Mailer for HttpMailer {
    async fn send(&self, mail: &OutgoingMail) -> anyhow::Result<()> {
        let attachments = mail
            .attachments
            .iter()
            .map(|a| SendMailAttachment {
                filename: &a.filename,
                content_type: &a.content_type,
                content: base64::engine::general_purpose::STANDARD.encode(&a.data),
            })
            .collect();
        let body = SendMailRequest {
            from: &mail.from,
            to: &mail.to,
            subject: &mail.subject,
            text: &mail.text,
            attachments,
        };

        let resp = self
            .client
            .post(&self.api_url)
            .bearer_auth(&self.api_token)
            .json(&body)
            .send()
            .await
            .context("send mail api request")?;
        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            anyhow::bail!("mail api failed ({status}): {body}");
        }
        tracing::info!(to = ?mail.to, subject = %mail.subject, "mail sent");
        Ok(())
    }
}

#[derive(Debug, Serialize)]
struct OutboxEnvelope<'a> {
    from: &'a str,
    to: &'a [String],
    subject: &'a str,
    text: &'a str,
    attachments: Vec<&'a str>,
}

/// Writes each message to `{dir}/{uuid}/` instead of sending it.
#[derive(Debug, Clone)]
pub struct OutboxMailer {
    dir: PathBuf,
}

impl OutboxMailer {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }
}

#[async_trait]
impl Mailer for OutboxMailer {
    async fn send(&self, mail: &OutgoingMail) -> anyhow::Result<()> {
        let message_dir = self.dir.join(uuid::Uuid::new_v4().to_string());
        for attachment in &mail.attachments {
            let name = std::path::Path::new(&attachment.filename)
                .file_name()
                .ok_or_else(|| anyhow::anyhow!("invalid attachment name: {}", attachment.filename))?;
            write_bytes_atomic(&message_dir.join(name), &attachment.data)
                .await
                .with_context(|| format!("write attachment: {}", attachment.filename))?;
        }
        let envelope = OutboxEnvelope {
            from: &mail.from,
            to: &mail.to,
            subject: &mail.subject,
            text: &mail.text,
            attachments: mail.attachments.iter().map(|a| a.filename.as_str()).collect(),
        };
        write_json_atomic(&message_dir.join("mail.json"), &envelope)
            .await
            .context("write mail.json")?;
        tracing::info!(dir = %message_dir.display(), subject = %mail.subject, "mail written to outbox");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn outbox_writes_envelope_and_attachments() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let mailer = OutboxMailer::new(dir.path());
        mailer
            .send(&OutgoingMail {
                from: "orders@example.com".to_string(),
                to: vec!["print@example.com".to_string()],
                subject: "Order NB-1".to_string(),
                text: "attached".to_string(),
                attachments: vec![Attachment {
                    filename: "NB-1.pdf".to_string(),
                    content_type: "application/pdf".to_string(),
                    data: b"%PDF-1.7".to_vec(),
                }],
            })
            .await?;

        let messages: Vec<_> = std::fs::read_dir(dir.path())?.collect::<Result<_, _>>()?;
        assert_eq!(messages.len(), 1);
        let message_dir = messages[0].path();
        assert_eq!(std::fs::read(message_dir.join("NB-1.pdf"))?, b"%PDF-1.7");
        let envelope: serde_json::Value =
            serde_json::from_slice(&std::fs::read(message_dir.join("mail.json"))?)?;
        assert_eq!(envelope["subject"], "Order NB-1");
        assert_eq!(envelope["attachments"][0], "NB-1.pdf");
        Ok(())
    }
}
