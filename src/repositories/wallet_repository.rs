//! Repository for wallet balances and the transaction ledger.
//!
//! Every balance mutation happens inside a database transaction that also
//! writes (or settles) a ledger Transaction record. The unique `reference`
//! column is the idempotency key: re-processing a settled reference is a
//! no-op, never a double-credit.

use crate::error::RepositoryError;
use crate::models::{AppWallet, Commission, OwnerType, Transaction, TransactionType, Wallet};
use sqlx::PgPool;
use uuid::Uuid;

/// Fixed id of the singleton platform wallet row
const APP_WALLET_ID: Uuid = Uuid::from_u128(1);

/// Parameters for a wallet debit
#[derive(Debug, Clone)]
pub struct DebitParams {
    pub owner_id: Uuid,
    pub owner_type: OwnerType,
    pub amount: i64,
    pub tx_type: TransactionType,
    pub channel: String,
    pub trip_id: Option<Uuid>,
    pub reference: String,
    pub metadata: serde_json::Value,
}

pub struct WalletRepository {
    pool: PgPool,
}

impl WalletRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    // =========================================================================
    // Wallet lookup / creation
    // =========================================================================

    /// Get or create the wallet for an owner
    pub async fn get_or_create_wallet(
        &self,
        owner_id: Uuid,
        owner_type: OwnerType,
    ) -> Result<Wallet, RepositoryError> {
        let wallet = sqlx::query_as::<_, Wallet>(
            r#"
            INSERT INTO wallets (owner_id, owner_type)
            VALUES ($1, $2)
            ON CONFLICT (owner_id, owner_type) DO UPDATE SET updated_at = NOW()
            RETURNING id, owner_id, owner_type, balance, created_at, updated_at
            "#,
        )
        .bind(owner_id)
        .bind(owner_type.as_str())
        .fetch_one(&self.pool)
        .await?;

        Ok(wallet)
    }

    /// Find the wallet for an owner
    pub async fn find_by_owner(
        &self,
        owner_id: Uuid,
        owner_type: OwnerType,
    ) -> Result<Option<Wallet>, RepositoryError> {
        let wallet = sqlx::query_as::<_, Wallet>(
            "SELECT id, owner_id, owner_type, balance, created_at, updated_at
             FROM wallets WHERE owner_id = $1 AND owner_type = $2",
        )
        .bind(owner_id)
        .bind(owner_type.as_str())
        .fetch_optional(&self.pool)
        .await?;

        Ok(wallet)
    }

    /// Find a wallet by id
    pub async fn find_by_id(&self, id: Uuid) -> Result<Option<Wallet>, RepositoryError> {
        let wallet = sqlx::query_as::<_, Wallet>(
            "SELECT id, owner_id, owner_type, balance, created_at, updated_at
             FROM wallets WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(wallet)
    }

    // =========================================================================
    // Ledger primitives
    // =========================================================================

    /// Create a `pending` transaction for a reference, or return the existing
    /// transaction if the reference was already recorded (idempotent)
    pub async fn create_pending_transaction(
        &self,
        wallet_id: Uuid,
        tx_type: TransactionType,
        amount: i64,
        channel: &str,
        trip_id: Option<Uuid>,
        reference: &str,
        metadata: serde_json::Value,
    ) -> Result<Transaction, RepositoryError> {
        if amount <= 0 {
            return Err(RepositoryError::InvalidInput(
                "Transaction amount must be positive".to_string(),
            ));
        }

        let inserted = sqlx::query_as::<_, Transaction>(
            r#"
            INSERT INTO transactions (wallet_id, tx_type, amount, channel, trip_id, reference, metadata)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            ON CONFLICT (reference) DO NOTHING
            RETURNING id, wallet_id, tx_type, amount, status, channel, trip_id, reference, metadata, created_at
            "#,
        )
        .bind(wallet_id)
        .bind(tx_type.as_str())
        .bind(amount)
        .bind(channel)
        .bind(trip_id)
        .bind(reference)
        .bind(&metadata)
        .fetch_optional(&self.pool)
        .await?;

        match inserted {
            Some(tx) => Ok(tx),
            // Reference already recorded; hand back the existing row untouched
            None => self
                .find_transaction_by_reference(reference)
                .await?
                .ok_or_else(|| {
                    RepositoryError::NotFound(format!("Transaction {} not found", reference))
                }),
        }
    }

    /// Find a transaction by its idempotency reference
    pub async fn find_transaction_by_reference(
        &self,
        reference: &str,
    ) -> Result<Option<Transaction>, RepositoryError> {
        let tx = sqlx::query_as::<_, Transaction>(
            "SELECT id, wallet_id, tx_type, amount, status, channel, trip_id, reference, metadata, created_at
             FROM transactions WHERE reference = $1",
        )
        .bind(reference)
        .fetch_optional(&self.pool)
        .await?;

        Ok(tx)
    }

    /// Settle a pending transaction: add its amount to the wallet balance and
    /// mark it `success`, atomically.
    ///
    /// If the transaction is already non-pending this returns the existing
    /// record without touching the balance — the primary defense against
    /// duplicate webhook delivery and retried job execution.
    pub async fn credit_wallet(
        &self,
        reference: &str,
    ) -> Result<(Wallet, Transaction), RepositoryError> {
        let mut db_tx = self.pool.begin().await?;

        // Flip the status first, conditionally; the row lock this takes
        // serializes concurrent settlements of the same reference
        let settled = sqlx::query_as::<_, Transaction>(
            r#"
            UPDATE transactions
            SET status = 'success'
            WHERE reference = $1 AND status = 'pending'
            RETURNING id, wallet_id, tx_type, amount, status, channel, trip_id, reference, metadata, created_at
            "#,
        )
        .bind(reference)
        .fetch_optional(&mut *db_tx)
        .await?;

        let settled = match settled {
            Some(tx) => tx,
            None => {
                // Already settled (or unknown): return current state, no mutation
                drop(db_tx);
                let existing = self
                    .find_transaction_by_reference(reference)
                    .await?
                    .ok_or_else(|| {
                        RepositoryError::NotFound(format!("Transaction {} not found", reference))
                    })?;
                let wallet = self.find_by_id(existing.wallet_id).await?.ok_or_else(|| {
                    RepositoryError::NotFound("Wallet not found".to_string())
                })?;
                return Ok((wallet, existing));
            }
        };

        let wallet = sqlx::query_as::<_, Wallet>(
            r#"
            UPDATE wallets
            SET balance = balance + $2, updated_at = NOW()
            WHERE id = $1
            RETURNING id, owner_id, owner_type, balance, created_at, updated_at
            "#,
        )
        .bind(settled.wallet_id)
        .bind(settled.amount)
        .fetch_optional(&mut *db_tx)
        .await?
        .ok_or_else(|| RepositoryError::NotFound("Wallet not found".to_string()))?;

        db_tx.commit().await?;

        Ok((wallet, settled))
    }

    /// Debit a wallet and record a `success` transaction, atomically.
    ///
    /// Idempotent per reference: if a successful transaction already exists
    /// for `params.reference`, it is returned unchanged and the balance is
    /// not touched. Fails with `InsufficientFunds` when the balance cannot
    /// cover the amount.
    pub async fn debit_wallet(
        &self,
        params: DebitParams,
    ) -> Result<(Wallet, Transaction), RepositoryError> {
        if params.amount <= 0 {
            return Err(RepositoryError::InvalidInput(
                "Debit amount must be positive".to_string(),
            ));
        }

        let mut db_tx = self.pool.begin().await?;

        // Lock the wallet first; concurrent debits with the same reference
        // serialize here and the second sees the first's ledger entry
        let wallet = sqlx::query_as::<_, Wallet>(
            "SELECT id, owner_id, owner_type, balance, created_at, updated_at
             FROM wallets WHERE owner_id = $1 AND owner_type = $2
             FOR UPDATE",
        )
        .bind(params.owner_id)
        .bind(params.owner_type.as_str())
        .fetch_optional(&mut *db_tx)
        .await?
        .ok_or_else(|| RepositoryError::NotFound("Wallet not found".to_string()))?;

        let existing = sqlx::query_as::<_, Transaction>(
            "SELECT id, wallet_id, tx_type, amount, status, channel, trip_id, reference, metadata, created_at
             FROM transactions WHERE reference = $1",
        )
        .bind(&params.reference)
        .fetch_optional(&mut *db_tx)
        .await?;

        if let Some(tx) = existing {
            if tx.is_success() {
                db_tx.commit().await?;
                return Ok((wallet, tx));
            }
        }

        if wallet.balance < params.amount {
            return Err(RepositoryError::InsufficientFunds {
                available: wallet.balance,
                required: params.amount,
            });
        }

        let updated = sqlx::query_as::<_, Wallet>(
            r#"
            UPDATE wallets
            SET balance = balance - $2, updated_at = NOW()
            WHERE id = $1
            RETURNING id, owner_id, owner_type, balance, created_at, updated_at
            "#,
        )
        .bind(wallet.id)
        .bind(params.amount)
        .fetch_one(&mut *db_tx)
        .await?;

        let tx = sqlx::query_as::<_, Transaction>(
            r#"
            INSERT INTO transactions (wallet_id, tx_type, amount, status, channel, trip_id, reference, metadata)
            VALUES ($1, $2, $3, 'success', $4, $5, $6, $7)
            RETURNING id, wallet_id, tx_type, amount, status, channel, trip_id, reference, metadata, created_at
            "#,
        )
        .bind(wallet.id)
        .bind(params.tx_type.as_str())
        .bind(params.amount)
        .bind(&params.channel)
        .bind(params.trip_id)
        .bind(&params.reference)
        .bind(&params.metadata)
        .fetch_one(&mut *db_tx)
        .await?;

        db_tx.commit().await?;

        Ok((updated, tx))
    }

    // =========================================================================
    // Platform wallet / commission
    // =========================================================================

    /// Get the singleton platform wallet
    pub async fn app_wallet(&self) -> Result<AppWallet, RepositoryError> {
        let wallet = sqlx::query_as::<_, AppWallet>(
            "SELECT id, balance, updated_at FROM app_wallet WHERE id = $1",
        )
        .bind(APP_WALLET_ID)
        .fetch_one(&self.pool)
        .await?;

        Ok(wallet)
    }

    /// Credit the platform wallet with a trip's commission and append the
    /// Commission record — both writes succeed together or not at all.
    /// Idempotent per trip: a second call for the same trip returns the
    /// existing record without incrementing the balance again.
    pub async fn fund_app_wallet(
        &self,
        trip_id: Uuid,
        amount: i64,
    ) -> Result<(AppWallet, Commission), RepositoryError> {
        let mut db_tx = self.pool.begin().await?;

        let inserted = sqlx::query_as::<_, Commission>(
            r#"
            INSERT INTO commissions (trip_id, amount, credited)
            VALUES ($1, $2, TRUE)
            ON CONFLICT (trip_id) DO NOTHING
            RETURNING id, trip_id, amount, credited, created_at
            "#,
        )
        .bind(trip_id)
        .bind(amount)
        .fetch_optional(&mut *db_tx)
        .await?;

        let commission = match inserted {
            Some(commission) => commission,
            None => {
                // Commission for this trip already exists; nothing to credit
                drop(db_tx);
                let existing = sqlx::query_as::<_, Commission>(
                    "SELECT id, trip_id, amount, credited, created_at
                     FROM commissions WHERE trip_id = $1",
                )
                .bind(trip_id)
                .fetch_one(&self.pool)
                .await?;
                let app_wallet = self.app_wallet().await?;
                return Ok((app_wallet, existing));
            }
        };

        let app_wallet = sqlx::query_as::<_, AppWallet>(
            r#"
            UPDATE app_wallet
            SET balance = balance + $2, updated_at = NOW()
            WHERE id = $1
            RETURNING id, balance, updated_at
            "#,
        )
        .bind(APP_WALLET_ID)
        .bind(amount)
        .fetch_one(&mut *db_tx)
        .await?;

        db_tx.commit().await?;

        Ok((app_wallet, commission))
    }

    /// Find the commission record for a trip
    pub async fn find_commission_by_trip(
        &self,
        trip_id: Uuid,
    ) -> Result<Option<Commission>, RepositoryError> {
        let commission = sqlx::query_as::<_, Commission>(
            "SELECT id, trip_id, amount, credited, created_at
             FROM commissions WHERE trip_id = $1",
        )
        .bind(trip_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(commission)
    }

    // =========================================================================
    // Transaction history
    // =========================================================================

    /// Most recent transactions for a wallet
    pub async fn get_wallet_transactions(
        &self,
        wallet_id: Uuid,
        limit: i64,
    ) -> Result<Vec<Transaction>, RepositoryError> {
        let transactions = sqlx::query_as::<_, Transaction>(
            "SELECT id, wallet_id, tx_type, amount, status, channel, trip_id, reference, metadata, created_at
             FROM transactions
             WHERE wallet_id = $1
             ORDER BY created_at DESC
             LIMIT $2",
        )
        .bind(wallet_id)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        Ok(transactions)
    }
}
