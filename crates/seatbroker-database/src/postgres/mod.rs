//! PostgreSQL repository implementations.
//!
//! Status transitions are single conditional `UPDATE ... WHERE status = ...
//! RETURNING` statements; the row lock taken by the update serializes
//! concurrent callers on the same row, so only one of them matches.

pub mod code;
pub mod job;
pub mod mother;
pub mod seat;
pub mod switch;

pub use code::PgCodeRepository;
pub use job::PgJobRepository;
pub use mother::PgMotherRepository;
pub use seat::PgSeatRepository;
pub use switch::PgSwitchRepository;
