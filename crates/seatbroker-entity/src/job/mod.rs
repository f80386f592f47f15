//! Background job domain entities.

pub mod model;
pub mod payload;
pub mod status;

pub use model::{BatchJob, NewBatchJob};
pub use payload::{InviteTarget, JobPayload};
pub use status::{JobStatus, JobType};
