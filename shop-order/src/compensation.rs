//! Bookkeeping for the remote side effects of an order creation run.
//!
//! Creation decrements inventory and deletes basket lines in other services
//! before the local order row exists. When a later step fails, the log is
//! unwound: the units taken are handed back on top of a fresh read of the
//! current balances (when enabled) and the run is recorded so it can be
//! reconciled. Basket lines cannot be recreated through the basket contract;
//! they are recorded as lost.
//!
//! The inventory contract only accepts absolute balances, so a sale landing
//! between the re-read and the restoring patch is still overwritten.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use shop_catalog::{BalancePatch, StockDemand};
use std::collections::HashMap;
use shop_core::InventoryClient;
use uuid::Uuid;

#[derive(Debug, Clone)]
pub enum AppliedStep {
    InventoryDecremented { demand: StockDemand },
    BasketsDeleted { basket_ids: Vec<Uuid> },
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CompensationOutcome {
    Restored,
    RestoreFailed,
    NotAttempted,
}

impl CompensationOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            CompensationOutcome::Restored => "RESTORED",
            CompensationOutcome::RestoreFailed => "RESTORE_FAILED",
            CompensationOutcome::NotAttempted => "NOT_ATTEMPTED",
        }
    }
}

/// Persisted trace of an aborted creation run that had already touched
/// inventory.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CompensationRecord {
    pub id: Uuid,
    pub user_id: Uuid,
    /// Units taken from each product by the aborted run.
    pub quantities: StockDemand,
    /// Balances written back, when a restore was sent.
    pub restore: Option<BalancePatch>,
    pub lost_basket_ids: Vec<Uuid>,
    pub outcome: CompensationOutcome,
    pub reason: String,
    pub error: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Default)]
pub struct CompensationLog {
    steps: Vec<AppliedStep>,
}

impl CompensationLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, step: AppliedStep) {
        self.steps.push(step);
    }

    /// Reverses what can be reversed. Returns `None` when no inventory
    /// change was applied, i.e. there is nothing to reconcile.
    pub async fn unwind(
        self,
        user_id: Uuid,
        inventory: &dyn InventoryClient,
        restore_inventory: bool,
        reason: &str,
    ) -> Option<CompensationRecord> {
        let mut taken = None;
        let mut lost_basket_ids = Vec::new();

        for step in self.steps.into_iter().rev() {
            match step {
                AppliedStep::BasketsDeleted { basket_ids } => lost_basket_ids.extend(basket_ids),
                AppliedStep::InventoryDecremented { demand } => taken = Some(demand),
            }
        }

        let quantities = taken?;
        let (outcome, restore, error) = if !restore_inventory {
            tracing::error!(
                "Order creation for user {} aborted after inventory decrement; restore disabled, {} product balances left stranded",
                user_id,
                quantities.0.len()
            );
            (CompensationOutcome::NotAttempted, None, None)
        } else {
            match give_back(inventory, &quantities).await {
                Ok(patch) => {
                    tracing::info!(
                        "Restored balances of {} products after aborted order creation for user {}",
                        patch.0.len(),
                        user_id
                    );
                    (CompensationOutcome::Restored, Some(patch), None)
                }
                Err((patch, e)) => {
                    tracing::error!(
                        "Failed to restore balances after aborted order creation for user {}: {}",
                        user_id,
                        e
                    );
                    (CompensationOutcome::RestoreFailed, patch, Some(e))
                }
            }
        };

        Some(CompensationRecord {
            id: Uuid::new_v4(),
            user_id,
            quantities,
            restore,
            lost_basket_ids,
            outcome,
            reason: reason.to_string(),
            error,
            created_at: Utc::now(),
        })
    }
}

/// Re-reads the live balances and patches `current + taken`. On failure the
/// patch that was sent, if any, comes back with the error.
async fn give_back(
    inventory: &dyn InventoryClient,
    quantities: &StockDemand,
) -> Result<BalancePatch, (Option<BalancePatch>, String)> {
    let current: HashMap<Uuid, _> = inventory
        .get_live_products(&quantities.product_ids())
        .await
        .map_err(|e| (None, e.to_string()))?
        .into_iter()
        .map(|p| (p.id, p))
        .collect();

    let patch = quantities.restoring(&current);
    if !patch.0.is_empty() {
        if let Err(e) = inventory.batch_patch_products(&patch).await {
            return Err((Some(patch), e.to_string()));
        }
    }

    let missing: Vec<String> = quantities
        .product_ids()
        .into_iter()
        .filter(|id| !current.contains_key(id))
        .map(|id| id.to_string())
        .collect();
    if !missing.is_empty() {
        return Err((Some(patch), format!("products missing on re-read: {}", missing.join(", "))));
    }
    Ok(patch)
}
