//! Redeem code ledger.

pub mod bind;
pub mod hash;
pub mod ledger;
pub mod outcome;

pub use hash::{hash_code, normalize_code, normalize_email};
pub use ledger::CodeLedger;
pub use outcome::{BindResult, GeneratedBatch, RedeemOutcome, RedeemStatus};
