//! Seat pool management.

pub mod allocator;

pub use allocator::SeatAllocator;
