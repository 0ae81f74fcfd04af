//! Copies playlists from Spotify into TIDAL.
//!
//! Every source track is resolved against the target catalog with a ranked set
//! of searches and a weighted similarity score, and every remote call goes
//! through one retry policy.

pub mod batch;
pub mod catalog;
pub mod config;
pub mod error;
pub mod logging;
pub mod model;
pub mod planner;
pub mod ports;
pub mod query;
pub mod resolver;
pub mod retry;
pub mod similarity;
pub mod sync;

#[cfg(test)]
mod test_utils;
