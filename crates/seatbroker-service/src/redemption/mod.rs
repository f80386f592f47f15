//! Rate-limited entry points for redeem, switch and refresh.

pub mod service;

pub use service::RedemptionService;
