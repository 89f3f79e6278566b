//! Ledger client
//!
//! The orchestrator reaches the ledger through `LedgerApi`. In production
//! that is `HttpLedgerClient`, talking to the ledger service's REST API.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Method;
use rust_decimal::Decimal;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::{AccountStatus, Amount};

use super::DownstreamError;

pub const LEDGER_SERVICE: &str = "ledger-service";

/// Account as seen from outside the ledger
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AccountView {
    pub id: Uuid,
    pub owner_id: Uuid,
    pub balance: Decimal,
    pub currency: String,
    pub status: AccountStatus,
}

/// Committed transfer as reported by the ledger
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransferView {
    pub transfer_id: Uuid,
    pub from: AccountView,
    pub to: AccountView,
    pub amount: Decimal,
}

#[async_trait]
pub trait LedgerApi: Send + Sync {
    async fn deposit(&self, account_id: Uuid, amount: Amount) -> Result<AccountView, DownstreamError>;

    async fn withdraw(&self, account_id: Uuid, amount: Amount) -> Result<AccountView, DownstreamError>;

    async fn transfer(
        &self,
        from_account_id: Uuid,
        to_account_id: Uuid,
        amount: Amount,
    ) -> Result<TransferView, DownstreamError>;

    async fn get_account(&self, account_id: Uuid) -> Result<AccountView, DownstreamError>;
}

#[derive(Debug, Serialize)]
struct AmountBody {
    amount: Amount,
}

#[derive(Debug, Serialize)]
struct TransferBody {
    from_account_id: Uuid,
    to_account_id: Uuid,
    amount: Amount,
}

/// `LedgerApi` over HTTP
#[derive(Debug, Clone)]
pub struct HttpLedgerClient {
    client: reqwest::Client,
    base_url: String,
}

impl HttpLedgerClient {
    pub fn new(base_url: impl Into<String>, request_timeout: Duration) -> Result<Self, DownstreamError> {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        let client = reqwest::Client::builder()
            .timeout(request_timeout)
            .build()
            .map_err(|e| DownstreamError::unreachable(LEDGER_SERVICE, &base_url, e.to_string()))?;
        Ok(Self { client, base_url })
    }

    async fn call<B, T>(&self, method: Method, path: &str, body: Option<&B>) -> Result<T, DownstreamError>
    where
        B: Serialize + Sync,
        T: DeserializeOwned,
    {
        let endpoint = format!("{} {}", method, path);
        let mut request = self
            .client
            .request(method, format!("{}{}", self.base_url, path));
        if let Some(body) = body {
            request = request.json(body);
        }

        let response = request.send().await.map_err(|e| {
            tracing::warn!(endpoint = %endpoint, error = %e, "Ledger service unreachable");
            DownstreamError::unreachable(LEDGER_SERVICE, &endpoint, e.to_string())
        })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let error = DownstreamError::from_response(LEDGER_SERVICE, &endpoint, status.as_u16(), body);
            tracing::debug!(
                endpoint = %endpoint,
                status = status.as_u16(),
                code = ?error.code,
                "Ledger service returned an error"
            );
            return Err(error);
        }

        response
            .json::<T>()
            .await
            .map_err(|e| DownstreamError::malformed(LEDGER_SERVICE, &endpoint, e.to_string()))
    }
}

#[async_trait]
impl LedgerApi for HttpLedgerClient {
    async fn deposit(&self, account_id: Uuid, amount: Amount) -> Result<AccountView, DownstreamError> {
        let path = format!("/api/v1/accounts/{}/deposit", account_id);
        self.call(Method::POST, &path, Some(&AmountBody { amount })).await
    }

    async fn withdraw(&self, account_id: Uuid, amount: Amount) -> Result<AccountView, DownstreamError> {
        let path = format!("/api/v1/accounts/{}/withdraw", account_id);
        self.call(Method::POST, &path, Some(&AmountBody { amount })).await
    }

    async fn transfer(
        &self,
        from_account_id: Uuid,
        to_account_id: Uuid,
        amount: Amount,
    ) -> Result<TransferView, DownstreamError> {
        let body = TransferBody {
            from_account_id,
            to_account_id,
            amount,
        };
        self.call(Method::POST, "/api/v1/transfers", Some(&body)).await
    }

    async fn get_account(&self, account_id: Uuid) -> Result<AccountView, DownstreamError> {
        let path = format!("/api/v1/accounts/{}", account_id);
        self.call::<(), _>(Method::GET, &path, None).await
    }
}
