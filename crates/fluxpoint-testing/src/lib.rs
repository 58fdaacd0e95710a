//! Test support for the dispatch worker.
//!
//! Provides a controllable clock so backoff timing runs instantly in
//! tests, and builders for leased events so tests state only what they
//! care about.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod fixtures;
pub mod time;

pub use fixtures::LeasedEventBuilder;
pub use time::TestClock;
