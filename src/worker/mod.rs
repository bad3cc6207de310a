//! Workers and the pool that supervises them.

mod pool;
mod runner;

pub use pool::{Pool, PoolStats};
pub use runner::{shutdown_signal, wait_for_shutdown_signal, Worker};
