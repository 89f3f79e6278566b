//! In-process ledger
//!
//! `LedgerApi` bound directly to a `LedgerService` in the same process.
//! Ledger failures are rendered exactly as the HTTP layer would render them,
//! so the orchestrator sees the same status and error code either way.

use async_trait::async_trait;
use uuid::Uuid;

use crate::domain::{Account, Amount};
use crate::error::AppError;
use crate::ledger::{LedgerError, TransferReceipt};
use crate::service::LedgerService;

use super::{AccountView, DownstreamError, LedgerApi, TransferView, LEDGER_SERVICE};

#[derive(Clone)]
pub struct InProcessLedger {
    service: LedgerService,
}

impl InProcessLedger {
    pub fn new(service: LedgerService) -> Self {
        Self { service }
    }
}

impl From<&Account> for AccountView {
    fn from(account: &Account) -> Self {
        Self {
            id: account.id(),
            owner_id: account.owner_id(),
            balance: account.balance().value(),
            currency: account.currency().to_string(),
            status: account.status(),
        }
    }
}

impl From<&TransferReceipt> for TransferView {
    fn from(receipt: &TransferReceipt) -> Self {
        Self {
            transfer_id: receipt.transfer_id,
            from: AccountView::from(&receipt.from),
            to: AccountView::from(&receipt.to),
            amount: receipt.amount.value(),
        }
    }
}

fn downstream(endpoint: String, error: LedgerError) -> DownstreamError {
    let error = AppError::from(error);
    let (status, body) = error.to_status_and_body();
    let body = serde_json::to_string(&body).unwrap_or_default();
    DownstreamError::from_response(LEDGER_SERVICE, endpoint, status.as_u16(), body)
}

#[async_trait]
impl LedgerApi for InProcessLedger {
    async fn deposit(&self, account_id: Uuid, amount: Amount) -> Result<AccountView, DownstreamError> {
        self.service
            .deposit(account_id, amount)
            .await
            .map(|account| AccountView::from(&account))
            .map_err(|e| downstream(format!("POST /api/v1/accounts/{}/deposit", account_id), e))
    }

    async fn withdraw(&self, account_id: Uuid, amount: Amount) -> Result<AccountView, DownstreamError> {
        self.service
            .withdraw(account_id, amount)
            .await
            .map(|account| AccountView::from(&account))
            .map_err(|e| downstream(format!("POST /api/v1/accounts/{}/withdraw", account_id), e))
    }

    async fn transfer(
        &self,
        from_account_id: Uuid,
        to_account_id: Uuid,
        amount: Amount,
    ) -> Result<TransferView, DownstreamError> {
        self.service
            .transfer(from_account_id, to_account_id, amount)
            .await
            .map(|receipt| TransferView::from(&receipt))
            .map_err(|e| downstream("POST /api/v1/transfers".to_string(), e))
    }

    async fn get_account(&self, account_id: Uuid) -> Result<AccountView, DownstreamError> {
        self.service
            .get_account(account_id)
            .await
            .map(|account| AccountView::from(&account))
            .map_err(|e| downstream(format!("GET /api/v1/accounts/{}", account_id), e))
    }
}
