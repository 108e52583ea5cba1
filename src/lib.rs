// Clippy: deny unwrap_used in production code — use expect() or ? instead
#![cfg_attr(not(test), deny(clippy::unwrap_used))]
#![allow(clippy::too_many_arguments)]
#![allow(clippy::type_complexity)]

//! Local-first code quality scanner and issue-graph reconciler.
//!
//! `wv-quality` mines git history and static structure into a persisted,
//! incrementally-rescanned hotspot score. `wv-gh` keeps a local issue graph
//! in sync with a remote tracker. Both share the persistence, analysis and
//! history-mining machinery in this crate.

pub mod analysis;
pub mod config;
pub mod db;
pub mod error;
pub mod githist;
pub mod graphclient;
pub mod hotspot;
pub mod models;
pub mod reconciler;
pub mod scanner;
pub mod util;
