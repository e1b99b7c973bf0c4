//! # Relay Module
//!
//! Everything between a decoded telephony event and a decoded upstream event.
//!
//! ## Key Components:
//! - **Protocol**: JSON event vocabularies of both sides
//! - **Batching**: when to commit appended audio upstream
//! - **Pair**: per-call state machine joining the two sides
//! - **Upstream**: realtime service connection and its send queue

pub mod batching;
pub mod pair;
pub mod protocol;
pub mod upstream;
