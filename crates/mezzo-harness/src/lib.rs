//! Deterministic testing harness for the Mezzo session client.
//!
//! In-process implementations of every seam the client depends on: an
//! in-memory signaling link, a scripted SFU router with a request log, a
//! serve loop that can delay or reject individual methods, and a loopback
//! media engine that drives the real negotiation paths without touching a
//! network or a codec.
//!
//! Tests compose these to replay whole session flows (connect, publish,
//! subscribe, push-triggered subscribe, induced transport failure) and
//! assert on the router's observable state afterwards.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod engine;
pub mod link;
pub mod router;
pub mod server;

pub use engine::{LoopbackEngine, LoopbackSource};
pub use link::{MemoryConnection, memory_link};
pub use router::{RequestRecord, SimRouter};
pub use server::{SharedRouter, SimServer, SimServerConfig, serve_tcp, shared_router};
