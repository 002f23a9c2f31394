//! Autotriage — bulk listing-triage pipeline.
//!
//! A driver scans a listing view, filters candidates, and dispatches them
//! one at a time to short-lived worker contexts. Driver and workers share
//! nothing but a persisted key-value store, over which a single-slot
//! coordination channel with fencing tokens is layered.

pub mod board;
pub mod channel;
pub mod config;
pub mod dispatcher;
pub mod error;
pub mod filter;
pub mod growth;
pub mod ledger;
pub mod model;
pub mod scanner;
pub mod store;
pub mod util;
pub mod worker;
