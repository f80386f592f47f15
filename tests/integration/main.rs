//! Integration tests for the Seatbroker engine and background worker.

mod helpers;

mod capacity_test;
mod pool_test;
mod redeem_test;
mod refresh_test;
mod switch_test;
mod worker_test;
