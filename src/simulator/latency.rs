//! Latency-only checkout activities.
//!
//! [`LatencySimulator`] has no store behind it. Every activity charges disk
//! accesses and CPU cycles following a fixed per-activity profile and never
//! fails, so a run measures orchestration cost under latency and contention
//! alone.

use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;
use futures::future::join_all;
use serde::{Deserialize, Serialize};

use super::Simulator;
use crate::config::RunConfiguration;
use crate::error::ActivityError;
use crate::rng::SimRng;
use crate::workload::{simulate_cpu_load, DiskAccess};

/// Percent of applied offers that are limited-use and need a usage lookup.
pub const LIMITED_USE_OFFER_PERCENT: u8 = 50;
/// Percent of payments that are active and need a payment transaction.
pub const ACTIVE_PAYMENT_PERCENT: u8 = 40;

/// How the repeated units inside one activity are issued.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LatencyMode {
    /// One unit after another.
    Sequential,
    /// All units in flight together, joined before the activity continues.
    #[default]
    FanOut,
}

pub struct LatencySimulator {
    config: RunConfiguration,
    disk: Arc<dyn DiskAccess>,
    mode: LatencyMode,
    rng: SimRng,
    limited_use_offer_percent: u8,
    active_payment_percent: u8,
}

impl LatencySimulator {
    pub fn new(config: RunConfiguration, disk: Arc<dyn DiskAccess>, mode: LatencyMode, rng: SimRng) -> Self {
        Self {
            config,
            disk,
            mode,
            rng,
            limited_use_offer_percent: LIMITED_USE_OFFER_PERCENT,
            active_payment_percent: ACTIVE_PAYMENT_PERCENT,
        }
    }

    /// Override the limited-use offer and active payment draw percentages.
    pub fn with_draw_percentages(mut self, limited_use_offer: u8, active_payment: u8) -> Self {
        self.limited_use_offer_percent = limited_use_offer;
        self.active_payment_percent = active_payment;
        self
    }

    pub fn mode(&self) -> LatencyMode {
        self.mode
    }

    async fn repeat<F, Fut>(&self, units: u64, unit: F)
    where
        F: Fn() -> Fut,
        Fut: Future<Output = ()>,
    {
        match self.mode {
            LatencyMode::Sequential => {
                for _ in 0..units {
                    unit().await;
                }
            }
            LatencyMode::FanOut => {
                join_all((0..units).map(|_| unit())).await;
            }
        }
    }

    async fn load(&self, cycles: u64) {
        self.disk.access().await;
        simulate_cpu_load(cycles);
    }

    async fn offer_usage(&self) {
        if self.rng.chance(self.limited_use_offer_percent) {
            self.load(1_000).await;
        }
    }

    async fn payment_transaction(&self) {
        if self.rng.chance(self.active_payment_percent) {
            self.load(10_000).await;
            self.disk.access().await;
            self.disk.access().await;
        }
    }

    async fn inventory_update(&self) {
        self.load(1_000).await;
        self.disk.access().await;
    }
}

#[async_trait]
impl Simulator for LatencySimulator {
    async fn validate_checkout(&self) -> Result<(), ActivityError> {
        Ok(())
    }

    async fn validate_availability(&self) -> Result<(), ActivityError> {
        self.repeat(self.config.order_items, move || self.load(100)).await;
        self.repeat(self.config.sku_items, move || self.load(100)).await;
        if self.mode == LatencyMode::FanOut {
            // merge of the joined lookups
            simulate_cpu_load(10_000);
        }
        Ok(())
    }

    async fn verify_customer(&self) -> Result<(), ActivityError> {
        self.load(100).await;
        self.repeat(self.config.applied_offers, move || self.offer_usage()).await;
        Ok(())
    }

    async fn validate_payment(&self) -> Result<(), ActivityError> {
        self.disk.access().await;
        self.repeat(self.config.payments, move || self.payment_transaction()).await;
        Ok(())
    }

    async fn validate_product_option(&self) -> Result<(), ActivityError> {
        Ok(())
    }

    async fn record_offer(&self) -> Result<(), ActivityError> {
        self.load(10_000).await;
        Ok(())
    }

    async fn commit_tax(&self) -> Result<(), ActivityError> {
        self.disk.access().await;
        self.disk.access().await;
        Ok(())
    }

    async fn decrement_inventory(&self) -> Result<(), ActivityError> {
        self.disk.access().await;
        self.repeat(self.config.order_items, move || self.inventory_update()).await;
        Ok(())
    }

    async fn complete_order(&self) -> Result<(), ActivityError> {
        self.disk.access().await;
        Ok(())
    }
}
