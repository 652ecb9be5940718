//! Open-loop load testing
//!
//! [`LoadTester`] paces requests at a target rate with a bounded number in
//! flight; [`run_k6_load`] does the same through k6.

pub mod k6_load;
pub mod pacer;
pub mod tester;

pub use k6_load::{load_scenario, run_k6_load};
pub use pacer::{Pacer, TICK};
pub use tester::{LoadResult, LoadTester, QueryLoadStats};
