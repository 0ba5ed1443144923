//! Room and hub layer for the Parlor chat hub.
//!
//! A [`Room`] is one isolated conversation: an append-only history with
//! monotonic sequence numbers, player and agent registries, the set of live
//! connections, and an optional assigned agent. The [`Hub`] owns all rooms,
//! creates them lazily on first join, dispatches inbound envelopes, and
//! fans broadcasts out to every live client with drop-on-full backpressure.
//!
//! Locking is one lock per aggregate: the hub guards its room map, each
//! room guards its own state, and no lock is ever held across I/O.
//! Broadcast copies the live-client list under the room lock, releases,
//! and then enqueues without blocking.

mod error;
mod handle;
mod hub;
mod room;

pub use error::HubError;
pub use handle::ClientHandle;
pub use hub::Hub;
pub use room::Room;
