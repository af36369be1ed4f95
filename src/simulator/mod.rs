//! The nine checkout activities and the capabilities they run on.
//!
//! An activity is a fixed protocol of table reads and writes issued through a
//! [`TableAccess`], followed (for validating activities) by a probabilistic
//! business-rule check. [`StoreSimulator`] implements the protocols against a
//! transactional store, [`LatencySimulator`] replaces the store with charged
//! disk and CPU time, and [`ContentionSimulator`] decorates any simulator
//! with lock-pool contention.

use std::fmt;

use async_trait::async_trait;

use crate::error::ActivityError;

mod access;
mod contention;
mod latency;
mod store_simulator;

pub use access::{AccessStrategy, ConcurrentAccess, SequentialAccess, TableAccess};
pub use contention::ContentionSimulator;
pub use latency::{LatencyMode, LatencySimulator, ACTIVE_PAYMENT_PERCENT, LIMITED_USE_OFFER_PERCENT};
pub use store_simulator::{KeySource, StoreSimulator};

/// One discrete step of the checkout process.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Activity {
    ValidateCheckout,
    ValidateAvailability,
    VerifyCustomer,
    ValidatePayment,
    ValidateProductOption,
    RecordOffer,
    CommitTax,
    DecrementInventory,
    CompleteOrder,
}

impl Activity {
    /// All activities in checkout order.
    pub const ALL: [Activity; 9] = [
        Activity::ValidateCheckout,
        Activity::ValidateAvailability,
        Activity::VerifyCustomer,
        Activity::ValidatePayment,
        Activity::ValidateProductOption,
        Activity::RecordOffer,
        Activity::CommitTax,
        Activity::DecrementInventory,
        Activity::CompleteOrder,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Activity::ValidateCheckout => "ValidateCheckout",
            Activity::ValidateAvailability => "ValidateAvailability",
            Activity::VerifyCustomer => "VerifyCustomer",
            Activity::ValidatePayment => "ValidatePayment",
            Activity::ValidateProductOption => "ValidateProductOption",
            Activity::RecordOffer => "RecordOffer",
            Activity::CommitTax => "CommitTax",
            Activity::DecrementInventory => "DecrementInventory",
            Activity::CompleteOrder => "CompleteOrder",
        }
    }

    /// Whether the activity ends with a business-rule check.
    pub fn validates(&self) -> bool {
        matches!(
            self,
            Activity::ValidateCheckout
                | Activity::ValidateAvailability
                | Activity::VerifyCustomer
                | Activity::ValidatePayment
                | Activity::ValidateProductOption
        )
    }
}

impl fmt::Display for Activity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// The checkout activities.
#[async_trait]
pub trait Simulator: Send + Sync {
    async fn validate_checkout(&self) -> Result<(), ActivityError>;
    async fn validate_availability(&self) -> Result<(), ActivityError>;
    async fn verify_customer(&self) -> Result<(), ActivityError>;
    async fn validate_payment(&self) -> Result<(), ActivityError>;
    async fn validate_product_option(&self) -> Result<(), ActivityError>;
    async fn record_offer(&self) -> Result<(), ActivityError>;
    async fn commit_tax(&self) -> Result<(), ActivityError>;
    async fn decrement_inventory(&self) -> Result<(), ActivityError>;
    async fn complete_order(&self) -> Result<(), ActivityError>;

    /// Dispatch by activity.
    async fn run(&self, activity: Activity) -> Result<(), ActivityError> {
        match activity {
            Activity::ValidateCheckout => self.validate_checkout().await,
            Activity::ValidateAvailability => self.validate_availability().await,
            Activity::VerifyCustomer => self.verify_customer().await,
            Activity::ValidatePayment => self.validate_payment().await,
            Activity::ValidateProductOption => self.validate_product_option().await,
            Activity::RecordOffer => self.record_offer().await,
            Activity::CommitTax => self.commit_tax().await,
            Activity::DecrementInventory => self.decrement_inventory().await,
            Activity::CompleteOrder => self.complete_order().await,
        }
    }
}

/// Split of `payments` into (confirmed, unconfirmed). At most two are unconfirmed.
pub fn payment_split(payments: u64) -> (u64, u64) {
    let unconfirmed = payments.min(2);
    (payments - unconfirmed, unconfirmed)
}
