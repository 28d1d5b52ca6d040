//! One reconciliation cycle: new reading → bucket → compare with held → act.
//!
//! Ordering guarantees:
//!   - the reading is marked processed as soon as it is seen as new, before
//!     the catalog is fetched, so a reading is never evaluated twice;
//!   - the held bucket only changes after the executor reports success, so a
//!     failed order leaves the mismatch in place for the next cycle.

use rust_decimal::Decimal;
use tracing::{error, info, warn};

use crate::clob::{OrderExecutor, OrderRequest, OrderSide};
use crate::error::BotError;
use crate::market::CatalogSource;
use crate::reading::ReadingSource;
use crate::resolver;
use crate::state::{PositionState, StateStore};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepOutcome {
    /// Reading fetch failed, or nothing newer than the last processed reading.
    NoNewData,
    /// Catalog unavailable/empty, or no bucket matched the reading.
    SkippedNoMarket,
    /// Resolved bucket is already held.
    Held,
    ActionAttempted { success: bool },
}

/// Fixed order parameters.
#[derive(Debug, Clone)]
pub struct OrderPolicy {
    pub notional: Decimal,
    pub limit_price: Decimal,
}

pub struct Reconciler {
    readings: Box<dyn ReadingSource>,
    catalog: Box<dyn CatalogSource>,
    executor: Box<dyn OrderExecutor>,
    store: Box<dyn StateStore>,
    market_slug: String,
    policy: OrderPolicy,
    state: PositionState,
}

impl Reconciler {
    /// Loads the starting state from `store`.
    pub fn new(
        readings: Box<dyn ReadingSource>,
        catalog: Box<dyn CatalogSource>,
        executor: Box<dyn OrderExecutor>,
        store: Box<dyn StateStore>,
        market_slug: String,
        policy: OrderPolicy,
    ) -> anyhow::Result<Self> {
        let state = store.load()?;
        Ok(Self {
            readings,
            catalog,
            executor,
            store,
            market_slug,
            policy,
            state,
        })
    }

    pub fn state(&self) -> &PositionState {
        &self.state
    }

    /// Persist after a change. A failing store is logged, never fatal:
    /// the in-memory state stays authoritative for this process.
    fn persist(&self) {
        if let Err(e) = self.store.save(&self.state) {
            error!(error = %format!("{e:#}"), "failed to save state");
        }
    }

    pub async fn step(&mut self) -> StepOutcome {
        // 1. Reading
        let reading = match self.readings.latest().await {
            Ok(r) => r,
            Err(e) => {
                warn!("{}", BotError::data_source("readings", &e));
                return StepOutcome::NoNewData;
            }
        };
        let reading = match reading {
            Some(r) if self.state.is_new_reading(r.id) => r,
            _ => {
                info!("no new reading");
                return StepOutcome::NoNewData;
            }
        };
        info!(
            id = reading.id,
            value = reading.value,
            observed_at = %reading.observed_at,
            "new reading"
        );

        // 2. Mark processed before anything can fail.
        self.state.mark_processed(reading.id);
        self.persist();

        // 3. Catalog
        let buckets = match self.catalog.buckets(&self.market_slug).await {
            Ok(b) if !b.is_empty() => b,
            Ok(_) => {
                warn!(slug = %self.market_slug, "market catalog is empty");
                return StepOutcome::SkippedNoMarket;
            }
            Err(e) => {
                warn!("{}", BotError::data_source("market catalog", &e));
                return StepOutcome::SkippedNoMarket;
            }
        };

        // 4. Resolve
        let Some(target) = resolver::resolve(reading.value, &buckets) else {
            info!(
                value = reading.value,
                buckets = buckets.len(),
                "no bucket matches reading"
            );
            return StepOutcome::SkippedNoMarket;
        };
        info!(target = %target, "strategy target");

        // 5. Compare with held
        if self.state.is_held(&target.id) {
            info!(bucket = %target, "holding position");
            return StepOutcome::Held;
        }

        // 6. Transition
        info!(
            from = ?self.state.held_bucket_id,
            to = %target,
            "bucket changed, placing order"
        );
        let Some(instrument_id) = target.instrument_id.clone() else {
            error!(bucket = %target, "market closed/invalid: no tradable token id");
            return StepOutcome::ActionAttempted { success: false };
        };

        let order = OrderRequest {
            instrument_id,
            notional: self.policy.notional,
            limit_price: self.policy.limit_price,
            side: OrderSide::Buy,
            label: target.title.clone(),
        };

        match self.executor.submit(&order).await {
            Ok(receipt) if receipt.success => {
                info!(
                    order_id = ?receipt.order_id,
                    simulated = self.executor.is_simulated(),
                    "order accepted"
                );
                self.state.set_held(&target.id);
                self.persist();
                StepOutcome::ActionAttempted { success: true }
            }
            Ok(receipt) => {
                let reason = receipt
                    .error_msg
                    .unwrap_or_else(|| "order rejected".to_string());
                warn!("{}", BotError::execution(&order.instrument_id, reason));
                StepOutcome::ActionAttempted { success: false }
            }
            Err(e) => {
                warn!(
                    "{}",
                    BotError::execution(&order.instrument_id, format!("{e:#}"))
                );
                StepOutcome::ActionAttempted { success: false }
            }
        }
    }
}
