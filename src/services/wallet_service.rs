//! Wallet funding, payouts, and balance queries.
//!
//! Funding is two-phase: a pending ledger row is created up front with the
//! gateway reference, and the balance only moves once the gateway verifies
//! the charge. Re-delivered confirmations hit the same reference and fall
//! through the idempotent credit. Payouts debit first; if the outbound
//! transfer then fails, the debit is reversed through a refund credit so
//! the ledger tells the whole story.

use crate::auth::{Claims, Role};
use crate::error::{AppError, AppResult};
use crate::gateway::{InitializedCharge, PaymentGateway};
use crate::models::{AppWallet, OwnerType, Transaction, TransactionType, Wallet};
use crate::notifier::{Notifier, WsMessage};
use crate::repositories::{DebitParams, DriverRepository, UserRepository, WalletRepository};
use crate::services::activity::ActivityLog;
use serde_json::json;
use std::sync::Arc;
use tracing::{info, warn};
use uuid::Uuid;

pub struct WalletService {
    wallets: Arc<WalletRepository>,
    users: Arc<UserRepository>,
    drivers: Arc<DriverRepository>,
    gateway: Arc<PaymentGateway>,
    notifier: Arc<Notifier>,
    activity: Arc<ActivityLog>,
}

impl WalletService {
    pub fn new(
        wallets: Arc<WalletRepository>,
        users: Arc<UserRepository>,
        drivers: Arc<DriverRepository>,
        gateway: Arc<PaymentGateway>,
        notifier: Arc<Notifier>,
        activity: Arc<ActivityLog>,
    ) -> Self {
        Self {
            wallets,
            users,
            drivers,
            gateway,
            notifier,
            activity,
        }
    }

    fn owner_type_for(claims: &Claims) -> AppResult<OwnerType> {
        match claims.role {
            Role::Rider => Ok(OwnerType::Rider),
            Role::Driver => Ok(OwnerType::Driver),
            Role::Admin => Err(AppError::Validation(
                "Admins do not hold a personal wallet".to_string(),
            )),
        }
    }

    async fn owner_email(&self, claims: &Claims) -> AppResult<String> {
        let email = match claims.role {
            Role::Rider => self
                .users
                .find_by_id(claims.id)
                .await?
                .map(|u| u.email),
            Role::Driver => self
                .drivers
                .find_by_id(claims.id)
                .await?
                .map(|d| d.email),
            Role::Admin => None,
        };
        email.ok_or_else(|| AppError::NotFound(format!("Account {} not found", claims.id)))
    }

    /// Start a card funding flow. Returns the pending ledger entry and the
    /// gateway authorization URL for the payer.
    pub async fn initialize_funding(
        &self,
        claims: &Claims,
        amount: i64,
    ) -> AppResult<(Transaction, InitializedCharge)> {
        let owner_type = Self::owner_type_for(claims)?;
        let email = self.owner_email(claims).await?;

        let wallet = self
            .wallets
            .get_or_create_wallet(claims.id, owner_type)
            .await?;

        let reference = format!("fund_{}", Uuid::new_v4());
        let pending = self
            .wallets
            .create_pending_transaction(
                wallet.id,
                TransactionType::Funding,
                amount,
                "card",
                None,
                &reference,
                json!({ "owner_id": claims.id }),
            )
            .await?;

        let charge = self
            .gateway
            .initialize_transaction(&email, amount, &reference)
            .await?;

        info!("Funding initialized: {} for {}", reference, amount);
        Ok((pending, charge))
    }

    /// Confirm a funding charge by reference, typically from a gateway
    /// webhook. Idempotent: a replayed confirmation credits nothing.
    pub async fn confirm_funding(&self, reference: &str) -> AppResult<Wallet> {
        let verification = self.gateway.verify_transaction(reference).await?;
        if !verification.is_successful() {
            return Err(AppError::UpstreamFailure(format!(
                "Charge {} is not successful (status: {})",
                reference, verification.status
            )));
        }

        let (wallet, tx) = self.wallets.credit_wallet(reference).await?;

        self.activity
            .wallet_funded(wallet.owner_id, tx.amount, reference)
            .await;
        self.notifier
            .emit(
                &format!(
                    "{}:{}",
                    if wallet.owner_type == "driver" { "driver" } else { "user" },
                    wallet.owner_id
                ),
                WsMessage::WalletCredited {
                    amount: tx.amount,
                    balance: wallet.balance,
                },
            )
            .await;

        Ok(wallet)
    }

    /// Pay a driver's wallet balance out to their settlement account.
    /// The wallet is debited first; a failed transfer reverses the debit.
    pub async fn request_payout(
        &self,
        claims: &Claims,
        amount: i64,
        recipient: &str,
    ) -> AppResult<Transaction> {
        claims.require_role(Role::Driver)?;

        let reference = format!("payout_{}", Uuid::new_v4());
        let (_, debit) = self
            .wallets
            .debit_wallet(DebitParams {
                owner_id: claims.id,
                owner_type: OwnerType::Driver,
                amount,
                tx_type: TransactionType::Payout,
                channel: "transfer".to_string(),
                trip_id: None,
                reference: reference.clone(),
                metadata: json!({ "recipient": recipient }),
            })
            .await?;

        match self
            .gateway
            .initiate_transfer(recipient, amount, &reference)
            .await
        {
            Ok(transfer) => {
                info!(
                    "Payout {} initiated for driver {}: {}",
                    transfer.transfer_code, claims.id, amount
                );
                self.activity
                    .payout_initiated(claims.id, amount, &reference)
                    .await;
                Ok(debit)
            }
            Err(e) => {
                warn!("Transfer failed for {}, refunding: {}", reference, e);
                let refund_reference = format!("{}_refund", reference);
                self.wallets
                    .create_pending_transaction(
                        debit.wallet_id,
                        TransactionType::Funding,
                        amount,
                        "refund",
                        None,
                        &refund_reference,
                        json!({ "reverses": reference }),
                    )
                    .await?;
                self.wallets.credit_wallet(&refund_reference).await?;
                Err(e)
            }
        }
    }

    pub async fn balance(&self, claims: &Claims) -> AppResult<Wallet> {
        let owner_type = Self::owner_type_for(claims)?;
        Ok(self
            .wallets
            .get_or_create_wallet(claims.id, owner_type)
            .await?)
    }

    pub async fn history(&self, claims: &Claims, limit: i64) -> AppResult<Vec<Transaction>> {
        let owner_type = Self::owner_type_for(claims)?;
        let wallet = self
            .wallets
            .get_or_create_wallet(claims.id, owner_type)
            .await?;
        Ok(self
            .wallets
            .get_wallet_transactions(wallet.id, limit)
            .await?)
    }

    /// Platform commission balance; admin only
    pub async fn app_balance(&self, claims: &Claims) -> AppResult<AppWallet> {
        claims.require_admin()?;
        Ok(self.wallets.app_wallet().await?)
    }
}
