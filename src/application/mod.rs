//! Application layer: the dispatch orchestrator and its background queue.
//!
//! `GatewayEngine` is the entry point for creating and querying orders. Side
//! effects that must not hold up a response are handed to a `BackgroundQueue`.

pub mod background;
pub mod engine;
