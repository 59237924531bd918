//! Driver reward tasks.
//!
//! Progress is advanced by settlement as trips complete; this service owns
//! task administration and the claim flow. Claiming flips the progress row
//! exactly once, then pays the reward through the ledger under a per
//! task-and-driver reference, so neither step can double-pay.

use crate::auth::{Claims, Role};
use crate::error::{AppError, AppResult};
use crate::models::{OwnerType, RewardTask, TaskProgress, TransactionType, Wallet};
use crate::notifier::{Notifier, WsMessage};
use crate::repositories::{TaskRepository, WalletRepository};
use crate::services::activity::ActivityLog;
use serde_json::json;
use std::sync::Arc;
use tracing::info;
use uuid::Uuid;

pub struct RewardService {
    tasks: Arc<TaskRepository>,
    wallets: Arc<WalletRepository>,
    notifier: Arc<Notifier>,
    activity: Arc<ActivityLog>,
}

impl RewardService {
    pub fn new(
        tasks: Arc<TaskRepository>,
        wallets: Arc<WalletRepository>,
        notifier: Arc<Notifier>,
        activity: Arc<ActivityLog>,
    ) -> Self {
        Self {
            tasks,
            wallets,
            notifier,
            activity,
        }
    }

    /// Admin creates a new reward task
    pub async fn create_task(
        &self,
        claims: &Claims,
        title: &str,
        kind: &str,
        goal: i32,
        reward: i64,
    ) -> AppResult<RewardTask> {
        claims.require_admin()?;
        if goal <= 0 {
            return Err(AppError::Validation("Goal must be positive".to_string()));
        }
        if reward <= 0 {
            return Err(AppError::Validation("Reward must be positive".to_string()));
        }
        Ok(self.tasks.create_task(title, kind, goal, reward).await?)
    }

    pub async fn get_progress(
        &self,
        claims: &Claims,
        task_id: Uuid,
    ) -> AppResult<Option<TaskProgress>> {
        claims.require_role(Role::Driver)?;
        Ok(self.tasks.find_progress(task_id, claims.id).await?)
    }

    /// Claim a completed task's reward. Exactly one claim succeeds; any
    /// repeat surfaces as an informational already-processed error.
    pub async fn claim(&self, claims: &Claims, task_id: Uuid) -> AppResult<Wallet> {
        claims.require_role(Role::Driver)?;

        let task = self
            .tasks
            .find_task(task_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Task {} not found", task_id)))?;

        let claimed = self.tasks.claim_if_completed(task_id, claims.id).await?;
        if claimed.is_none() {
            let progress = self.tasks.find_progress(task_id, claims.id).await?;
            return match progress {
                Some(p) if p.claimed => Err(AppError::AlreadyProcessed(format!(
                    "Reward for task {} already claimed",
                    task_id
                ))),
                Some(_) => Err(AppError::Validation("Task is not completed".to_string())),
                None => Err(AppError::Validation(
                    "No progress recorded for this task".to_string(),
                )),
            };
        }

        let wallet = self
            .wallets
            .get_or_create_wallet(claims.id, OwnerType::Driver)
            .await?;

        let reference = format!("task_{}_{}", task_id, claims.id);
        self.wallets
            .create_pending_transaction(
                wallet.id,
                TransactionType::Reward,
                task.reward,
                "reward",
                None,
                &reference,
                json!({ "task_id": task_id }),
            )
            .await?;
        let (wallet, _) = self.wallets.credit_wallet(&reference).await?;

        info!(
            "Driver {} claimed task {} for {}",
            claims.id, task_id, task.reward
        );
        self.activity
            .reward_claimed(task_id, claims.id, task.reward)
            .await;
        self.notifier
            .emit_to_driver(
                claims.id,
                WsMessage::WalletCredited {
                    amount: task.reward,
                    balance: wallet.balance,
                },
            )
            .await;

        Ok(wallet)
    }
}
