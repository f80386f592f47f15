//! Redeem code domain entities.

pub mod event;
pub mod model;
pub mod status;

pub use event::{CodeEvent, CodeEventKind};
pub use model::{CodeBinding, NewRedeemCode, RedeemCode, SkuDefaults};
pub use status::CodeStatus;
