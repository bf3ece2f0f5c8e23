use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use super::{LedgerError, LedgerGateway, LedgerSession, Transaction};
use crate::config::LedgerConfig;

/// Ledger client speaking to a REST gateway in front of the peer network.
pub struct HttpLedgerGateway {
    client: reqwest::Client,
    config: LedgerConfig,
}

impl HttpLedgerGateway {
    pub fn new(config: LedgerConfig) -> Result<Self, LedgerError> {
        let client = reqwest::Client::builder()
            .connect_timeout(config.timeout)
            .build()
            .map_err(|e| LedgerError::Connection(e.to_string()))?;

        Ok(Self {
            client,
            config: LedgerConfig {
                gateway_url: config.gateway_url.trim_end_matches('/').to_string(),
                ..config
            },
        })
    }

    pub fn identity(&self) -> &str {
        &self.config.identity
    }
}

/// Request body for POST /sessions
#[derive(Serialize)]
struct OpenSessionRequest<'a> {
    identity: &'a str,
    channel: &'a str,
    chaincode: &'a str,
}

/// Response body from POST /sessions
#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct OpenSessionResponse {
    session_id: String,
}

/// Request body for POST /sessions/{id}/submit and /evaluate
#[derive(Serialize)]
struct TransactionRequest<'a> {
    transaction: &'a str,
    args: &'a [String],
}

#[async_trait]
impl LedgerGateway for HttpLedgerGateway {
    async fn acquire(&self) -> Result<Box<dyn LedgerSession>, LedgerError> {
        let url = format!("{}/sessions", self.config.gateway_url);
        let body = OpenSessionRequest {
            identity: &self.config.identity,
            channel: &self.config.channel,
            chaincode: &self.config.chaincode,
        };

        let response = self
            .client
            .post(&url)
            .json(&body)
            .send()
            .await
            .map_err(|e| LedgerError::Connection(format!("{}: {e}", self.config.gateway_url)))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(LedgerError::Connection(format!(
                "gateway refused identity {} ({}): {body}",
                self.config.identity,
                status.as_u16()
            )));
        }

        let opened: OpenSessionResponse = response
            .json()
            .await
            .map_err(|e| LedgerError::MalformedResult(e.to_string()))?;

        tracing::debug!(
            session_id = opened.session_id.as_str(),
            identity = self.config.identity.as_str(),
            "Ledger session opened"
        );

        Ok(Box::new(HttpLedgerSession {
            client: self.client.clone(),
            session_url: format!("{}/sessions/{}", self.config.gateway_url, opened.session_id),
        }))
    }
}

struct HttpLedgerSession {
    client: reqwest::Client,
    session_url: String,
}

impl HttpLedgerSession {
    async fn invoke(
        &self,
        mode: &str,
        tx: Transaction,
        args: &[String],
    ) -> Result<Vec<u8>, LedgerError> {
        let url = format!("{}/{mode}", self.session_url);
        let body = TransactionRequest {
            transaction: tx.as_str(),
            args,
        };

        let failed = |reason: String| LedgerError::Transaction {
            transaction: tx.to_string(),
            reason,
        };

        let response = self
            .client
            .post(&url)
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                if e.is_connect() {
                    LedgerError::Connection(e.to_string())
                } else {
                    failed(e.to_string())
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(failed(format!("status {}: {body}", status.as_u16())));
        }

        let bytes = response.bytes().await.map_err(|e| failed(e.to_string()))?;
        Ok(bytes.to_vec())
    }
}

#[async_trait]
impl LedgerSession for HttpLedgerSession {
    async fn submit(&self, tx: Transaction, args: &[String]) -> Result<Vec<u8>, LedgerError> {
        self.invoke("submit", tx, args).await
    }

    async fn evaluate(&self, tx: Transaction, args: &[String]) -> Result<Vec<u8>, LedgerError> {
        self.invoke("evaluate", tx, args).await
    }

    async fn release(self: Box<Self>) {
        match self.client.delete(&self.session_url).send().await {
            Ok(response) if response.status().is_success() => {}
            Ok(response) => {
                tracing::warn!(
                    status = response.status().as_u16(),
                    "Failed to disconnect ledger session"
                );
            }
            Err(e) => {
                tracing::warn!(error = %e, "Failed to disconnect ledger session");
            }
        }
    }
}
