//! A priority-ordered, rate-limited batch ingestion dispatcher.
//!
//! Callers submit lists of identifiers with a priority. Each submission is
//! split into fixed-size batches which a single background dispatcher drains
//! in priority order, leaving a minimum interval between batches.
pub mod aggregate;
pub mod batching;
pub mod config;
pub mod dispatcher;
pub mod error;
pub mod line_reader;
pub mod parser;
pub mod processor;
pub mod queue;
pub mod server;
pub mod service;
pub mod store;
pub mod types;
pub mod util;
