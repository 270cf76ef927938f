//! bsdash: live progress dashboard for BrainSuite pipeline runs.
//!
//! Re-exports the status interpreter, view model and engine from
//! `bsdash-core`, and the web server as [`server`].

pub use bsdash_core::*;
pub use bsdash_server as server;
