use std::ops::Range;
use std::sync::Arc;

use async_trait::async_trait;
use tracing::debug;

use super::{payment_split, Activity, Simulator, TableAccess};
use crate::config::{RunConfiguration, TableAccessKeys};
use crate::error::ActivityError;
use crate::rng::SimRng;
use crate::store::Table;
use crate::workload::simulate_cpu_load;

/// Where an activity's keys come from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum KeySource {
    /// Fresh uniform draw from `1..=key_space` on every call.
    Random { key_space: u64 },
    /// Keys drawn once per simulator; activities touching the same table hit
    /// the same rows.
    Planned(TableAccessKeys),
}

/// Checkout activities issued against a transactional store.
///
/// One instance serves exactly one transaction attempt: its configuration,
/// keys and access capability are fixed at construction.
pub struct StoreSimulator {
    access: Arc<dyn TableAccess>,
    config: RunConfiguration,
    keys: KeySource,
    business_error_probability: u8,
    checkout_cpu_cycles: u64,
    rng: SimRng,
}

impl StoreSimulator {
    pub fn new(access: Arc<dyn TableAccess>, config: RunConfiguration, keys: KeySource, rng: SimRng) -> Self {
        Self {
            access,
            config,
            keys,
            business_error_probability: 0,
            checkout_cpu_cycles: 100,
            rng,
        }
    }

    /// Percent chance (0-100) that each validating activity rejects the order.
    pub fn with_business_error_probability(mut self, percent: u8) -> Self {
        self.business_error_probability = percent;
        self
    }

    pub fn with_checkout_cpu_cycles(mut self, cycles: u64) -> Self {
        self.checkout_cpu_cycles = cycles;
        self
    }

    pub fn config(&self) -> &RunConfiguration {
        &self.config
    }

    fn keys(&self, table: Table, range: Range<u64>) -> Vec<u64> {
        match &self.keys {
            KeySource::Random { key_space } => {
                let key_space = (*key_space).max(1);
                range.map(|_| self.rng.in_range(1, key_space)).collect()
            }
            KeySource::Planned(planned) => {
                let planned = planned.get(table);
                let end = (range.end as usize).min(planned.len());
                let start = (range.start as usize).min(end);
                planned[start..end].to_vec()
            }
        }
    }

    async fn read(&self, activity: Activity, table: Table, range: Range<u64>) -> Result<(), ActivityError> {
        let keys = self.keys(table, range);
        self.access
            .read_n(table, &keys)
            .await
            .map_err(|source| ActivityError::System { activity, source })
    }

    async fn write(&self, activity: Activity, table: Table, range: Range<u64>) -> Result<(), ActivityError> {
        let keys = self.keys(table, range);
        self.access
            .write_n(table, &keys)
            .await
            .map_err(|source| ActivityError::System { activity, source })
    }

    fn business_check(&self, activity: Activity) -> Result<(), ActivityError> {
        if self.rng.chance(self.business_error_probability) {
            debug!(activity = %activity, "business rule rejected order");
            return Err(ActivityError::Business { activity });
        }
        Ok(())
    }
}

#[async_trait]
impl Simulator for StoreSimulator {
    async fn validate_checkout(&self) -> Result<(), ActivityError> {
        let activity = Activity::ValidateCheckout;
        simulate_cpu_load(self.checkout_cpu_cycles);
        // order completion flag
        self.read(activity, Table::Orders, 0..1).await?;
        self.business_check(activity)
    }

    async fn validate_availability(&self) -> Result<(), ActivityError> {
        let activity = Activity::ValidateAvailability;
        let items = self.config.order_items;
        self.read(activity, Table::Items, 0..items).await?;
        // one SKU per order item
        self.read(activity, Table::StockKeepingUnits, 0..items).await?;
        self.business_check(activity)
    }

    async fn verify_customer(&self) -> Result<(), ActivityError> {
        let activity = Activity::VerifyCustomer;
        self.read(activity, Table::Customers, 0..1).await?;
        self.read(activity, Table::ItemOffers, 0..self.config.order_items).await?;
        self.business_check(activity)
    }

    async fn validate_payment(&self) -> Result<(), ActivityError> {
        let activity = Activity::ValidatePayment;
        let (confirmed, unconfirmed) = payment_split(self.config.payments);
        self.read(activity, Table::OrderPayments, 0..confirmed).await?;
        self.write(activity, Table::OrderPayments, confirmed..confirmed + unconfirmed)
            .await?;
        self.business_check(activity)
    }

    async fn validate_product_option(&self) -> Result<(), ActivityError> {
        let activity = Activity::ValidateProductOption;
        self.read(activity, Table::ItemOptions, 0..self.config.order_items).await?;
        self.business_check(activity)
    }

    async fn record_offer(&self) -> Result<(), ActivityError> {
        self.write(Activity::RecordOffer, Table::CustomerOffersUsage, 0..self.config.order_items)
            .await
    }

    async fn commit_tax(&self) -> Result<(), ActivityError> {
        let activity = Activity::CommitTax;
        self.read(activity, Table::Items, 0..self.config.order_items).await?;
        self.write(activity, Table::OrderTaxes, 0..1).await
    }

    async fn decrement_inventory(&self) -> Result<(), ActivityError> {
        let activity = Activity::DecrementInventory;
        let items = self.config.order_items;
        self.read(activity, Table::Items, 0..items).await?;
        self.write(activity, Table::StockKeepingUnits, 0..items).await
    }

    async fn complete_order(&self) -> Result<(), ActivityError> {
        self.write(Activity::CompleteOrder, Table::Orders, 0..1).await
    }
}
