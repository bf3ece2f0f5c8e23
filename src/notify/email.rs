use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use serde::Serialize;

use super::NotificationError;
use crate::artifact::Artifact;
use crate::config::MailConfig;
use crate::models::{Channel, NotificationOutcome};

/// A fully addressed message handed to the transport.
#[derive(Debug, Clone)]
pub struct MailEnvelope {
    pub to: String,
    pub subject: String,
    pub body: String,
    pub attachment_name: String,
    pub attachment: Vec<u8>,
}

#[async_trait]
pub trait EmailTransport: Send + Sync {
    async fn send(&self, envelope: &MailEnvelope) -> Result<(), NotificationError>;
}

/// Email request from the orchestrator.
#[derive(Debug, Clone)]
pub struct EmailMessage {
    pub address: String,
    pub subject: String,
    pub body: String,
    pub artifact: Artifact,
}

// ─── Artifact store ───────────────────────────────────────────────────────────

/// Local copy of the latest artifact per patient (`<dir>/<patientId>.pdf`).
#[derive(Debug, Clone)]
pub struct ArtifactStore {
    dir: PathBuf,
}

impl ArtifactStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn path_for(&self, artifact: &Artifact) -> PathBuf {
        self.dir.join(artifact.file_name())
    }

    /// Write the artifact, replacing any earlier one for the same patient.
    ///
    /// Each save stages into its own file, so concurrent saves for one
    /// patient never share a temp path. The last rename wins.
    pub async fn save(&self, artifact: &Artifact) -> std::io::Result<PathBuf> {
        tokio::fs::create_dir_all(&self.dir).await?;
        let path = self.path_for(artifact);
        let staging = self.dir.join(format!(
            ".{}.{:016x}.tmp",
            artifact.file_name(),
            rand::random::<u64>()
        ));
        let written = match tokio::fs::write(&staging, &artifact.bytes).await {
            Ok(()) => tokio::fs::rename(&staging, &path).await,
            Err(e) => Err(e),
        };
        if let Err(e) = written {
            let _ = tokio::fs::remove_file(&staging).await;
            return Err(e);
        }
        Ok(path)
    }
}

// ─── Channel ──────────────────────────────────────────────────────────────────

/// Email delivery channel. `transport` is `None` when mail is unconfigured.
#[derive(Clone)]
pub struct EmailChannel {
    transport: Option<Arc<dyn EmailTransport>>,
    store: ArtifactStore,
}

impl EmailChannel {
    pub fn new(transport: Option<Arc<dyn EmailTransport>>, store: ArtifactStore) -> Self {
        Self { transport, store }
    }

    pub fn from_config(config: Option<&MailConfig>, store: ArtifactStore) -> Self {
        let transport: Option<Arc<dyn EmailTransport>> = match config {
            Some(config) => match HttpEmailTransport::new(config.clone()) {
                Ok(transport) => {
                    tracing::info!("Email transport initialized");
                    Some(Arc::new(transport))
                }
                Err(e) => {
                    tracing::error!(
                        error = %e,
                        "Email transport initialization failed, email disabled"
                    );
                    None
                }
            },
            None => {
                tracing::warn!("Mail relay not configured, email disabled");
                None
            }
        };
        Self::new(transport, store)
    }

    pub fn is_enabled(&self) -> bool {
        self.transport.is_some()
    }

    /// Persist the artifact, then send. Never raises.
    pub async fn send(&self, message: EmailMessage) -> NotificationOutcome {
        let patient_id = message.artifact.patient_id.as_str();

        let path = match self.store.save(&message.artifact).await {
            Ok(path) => path,
            Err(e) => {
                tracing::error!(patient_id, error = %e, "Failed to store artifact, email not sent");
                return NotificationOutcome::dropped(Channel::Email);
            }
        };
        tracing::debug!(patient_id, path = %path.display(), "Artifact stored");

        let Some(transport) = &self.transport else {
            tracing::warn!(patient_id, "Email not sent, transport not configured");
            return NotificationOutcome::dropped(Channel::Email);
        };

        if message.address.is_empty() {
            tracing::warn!(patient_id, "Email not sent, no address on record");
            return NotificationOutcome::dropped(Channel::Email);
        }

        let envelope = MailEnvelope {
            to: message.address,
            subject: message.subject,
            body: message.body,
            attachment_name: message.artifact.file_name(),
            attachment: message.artifact.bytes,
        };

        match transport.send(&envelope).await {
            Ok(()) => {
                tracing::info!(patient_id, "Email sent");
                NotificationOutcome::delivered(Channel::Email)
            }
            Err(e) => {
                tracing::error!(patient_id, error = %e, "Email delivery failed");
                NotificationOutcome::dropped(Channel::Email)
            }
        }
    }
}

// ─── HTTP mail relay transport ────────────────────────────────────────────────

/// Sends mail through an HTTP relay accepting JSON messages with base64
/// attachments.
pub struct HttpEmailTransport {
    client: reqwest::Client,
    config: MailConfig,
}

#[derive(Serialize)]
struct RelayMessage<'a> {
    from: &'a str,
    to: &'a str,
    subject: &'a str,
    text: &'a str,
    attachments: Vec<RelayAttachment<'a>>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct RelayAttachment<'a> {
    filename: &'a str,
    content_type: &'a str,
    content: String,
}

impl HttpEmailTransport {
    pub fn new(config: MailConfig) -> Result<Self, NotificationError> {
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(30))
            .build()
            .map_err(|e| NotificationError::Transport(e.to_string()))?;
        Ok(Self { client, config })
    }

    fn relay_message<'a>(&'a self, envelope: &'a MailEnvelope) -> RelayMessage<'a> {
        RelayMessage {
            from: &self.config.from,
            to: &envelope.to,
            subject: &envelope.subject,
            text: &envelope.body,
            attachments: vec![RelayAttachment {
                filename: &envelope.attachment_name,
                content_type: "application/pdf",
                content: STANDARD.encode(&envelope.attachment),
            }],
        }
    }
}

#[async_trait]
impl EmailTransport for HttpEmailTransport {
    async fn send(&self, envelope: &MailEnvelope) -> Result<(), NotificationError> {
        let mut request = self
            .client
            .post(&self.config.relay_url)
            .json(&self.relay_message(envelope));
        if let Some(key) = &self.config.api_key {
            request = request.bearer_auth(key);
        }

        let response = request
            .send()
            .await
            .map_err(|e| NotificationError::Transport(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(NotificationError::Rejected {
                status: status.as_u16(),
                body,
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::notify::testing::RecordingEmail;

    fn artifact(patient_id: &str, bytes: &[u8]) -> Artifact {
        Artifact {
            patient_id: patient_id.into(),
            document_id: "EHR-1".into(),
            verification_url: "https://verify.example".into(),
            bytes: bytes.to_vec(),
        }
    }

    fn message(address: &str, artifact: Artifact) -> EmailMessage {
        EmailMessage {
            address: address.into(),
            subject: "New Health Record Created".into(),
            body: "Hello".into(),
            artifact,
        }
    }

    #[tokio::test]
    async fn store_overwrites_previous_artifact() {
        let tmp = tempfile::tempdir().unwrap();
        let store = ArtifactStore::new(tmp.path().join("pdfs"));
        store.save(&artifact("P1", b"first")).await.unwrap();
        let path = store.save(&artifact("P1", b"second")).await.unwrap();
        assert_eq!(std::fs::read(&path).unwrap(), b"second");
        assert_eq!(path.file_name().unwrap(), "P1.pdf");
        assert_eq!(std::fs::read_dir(store.dir()).unwrap().count(), 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 8)]
    async fn concurrent_saves_for_one_patient_all_succeed() {
        let tmp = tempfile::tempdir().unwrap();
        let store = ArtifactStore::new(tmp.path().join("pdfs"));

        let handles: Vec<_> = (0..64u8)
            .map(|i| {
                let store = store.clone();
                tokio::spawn(async move { store.save(&artifact("P1", &[i; 256])).await })
            })
            .collect();
        for handle in handles {
            handle.await.unwrap().unwrap();
        }

        let entries: Vec<_> = std::fs::read_dir(store.dir())
            .unwrap()
            .map(|entry| entry.unwrap().file_name())
            .collect();
        assert_eq!(entries, vec![std::ffi::OsString::from("P1.pdf")]);
        let bytes = std::fs::read(store.dir().join("P1.pdf")).unwrap();
        assert_eq!(bytes.len(), 256);
        assert!(bytes.iter().all(|b| *b == bytes[0]));
    }

    #[tokio::test]
    async fn sends_with_attachment_after_storing() {
        let tmp = tempfile::tempdir().unwrap();
        let mail = RecordingEmail::new();
        let channel = EmailChannel::new(Some(mail.clone()), ArtifactStore::new(tmp.path()));

        let outcome = channel.send(message("asha@example.com", artifact("P1", b"%PDF"))).await;

        assert!(outcome.delivered);
        assert!(tmp.path().join("P1.pdf").exists());
        let sent = mail.sent();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].to, "asha@example.com");
        assert_eq!(sent[0].attachment_name, "P1.pdf");
        assert_eq!(sent[0].attachment, b"%PDF");
    }

    #[tokio::test]
    async fn transport_failure_is_undelivered() {
        let tmp = tempfile::tempdir().unwrap();
        let channel = EmailChannel::new(
            Some(RecordingEmail::failing()),
            ArtifactStore::new(tmp.path()),
        );
        let outcome = channel.send(message("a@b.c", artifact("P1", b"x"))).await;
        assert!(!outcome.delivered);
        assert_eq!(outcome.channel, Channel::Email);
    }

    #[tokio::test]
    async fn unconfigured_transport_still_stores_artifact() {
        let tmp = tempfile::tempdir().unwrap();
        let channel = EmailChannel::new(None, ArtifactStore::new(tmp.path()));
        let outcome = channel.send(message("a@b.c", artifact("P1", b"x"))).await;
        assert!(!outcome.delivered);
        assert!(tmp.path().join("P1.pdf").exists());
    }

    #[tokio::test]
    async fn empty_address_not_attempted() {
        let tmp = tempfile::tempdir().unwrap();
        let mail = RecordingEmail::new();
        let channel = EmailChannel::new(Some(mail.clone()), ArtifactStore::new(tmp.path()));
        let outcome = channel.send(message("", artifact("P1", b"x"))).await;
        assert!(!outcome.delivered);
        assert!(mail.sent().is_empty());
    }

    #[tokio::test]
    async fn unwritable_store_is_undelivered() {
        let tmp = tempfile::tempdir().unwrap();
        let blocker = tmp.path().join("file");
        std::fs::write(&blocker, b"not a dir").unwrap();
        let mail = RecordingEmail::new();
        let store = ArtifactStore::new(blocker.join("pdfs"));
        let channel = EmailChannel::new(Some(mail.clone()), store);
        let outcome = channel.send(message("a@b.c", artifact("P1", b"x"))).await;
        assert!(!outcome.delivered);
        assert!(mail.sent().is_empty());
    }

    #[test]
    fn relay_message_encodes_attachment() {
        let transport = HttpEmailTransport::new(MailConfig {
            relay_url: "http://127.0.0.1:1/send".into(),
            api_key: None,
            from: "ehr@example.com".into(),
        })
        .unwrap();
        let envelope = MailEnvelope {
            to: "a@b.c".into(),
            subject: "s".into(),
            body: "b".into(),
            attachment_name: "P1.pdf".into(),
            attachment: b"%PDF".to_vec(),
        };
        let json = serde_json::to_value(transport.relay_message(&envelope)).unwrap();
        assert_eq!(json["from"], "ehr@example.com");
        assert_eq!(json["attachments"][0]["filename"], "P1.pdf");
        assert_eq!(json["attachments"][0]["contentType"], "application/pdf");
        assert_eq!(json["attachments"][0]["content"], "JVBERg==");
    }
}
