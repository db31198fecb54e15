//! Protocol layer.
//!
//! JSON-RPC 2.0 over line-delimited stdio.

pub mod messages;
pub mod stdio;
pub mod types;
