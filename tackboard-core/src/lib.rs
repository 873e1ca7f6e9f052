//! Tackboard core: board model, reducer, identifier mapping, local mirror,
//! relay wire types and the client sync agent state machine.
pub mod agent;
pub mod authority;
pub mod config;
pub mod mapping;
pub mod reconcile;
pub mod reducer;
pub mod sse;
pub mod storage;
pub mod sync;
pub mod types;
