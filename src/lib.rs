#![warn(missing_docs)]

//! Apex ladder and ranked match ingestion from the Riot API.
//!
//! Each run fetches the Challenger, Grandmaster and Master ladders, resolves new players'
//! identities, collects their match IDs, then fetches outstanding match details in bounded
//! batches, checkpointing each stored match. Storage, HTTP and sleeping sit behind the
//! [`store::Store`], [`riot::Upstream`] and [`rate_gate::Sleeper`] traits.

pub mod audit;
pub mod backoff;
pub mod config;
pub mod error;
pub mod identity;
pub mod ingest;
pub mod ladder;
pub mod match_ids;
pub mod model;
pub mod pipeline;
pub mod rate_gate;
pub mod riot;
pub mod stats;
pub mod store;

#[cfg(test)]
mod testutil;

pub use error::{Error, Result};
