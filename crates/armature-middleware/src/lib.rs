//! `armature-middleware` – data channels between components.
//!
//! # Modules
//!
//! - [`port`] – typed, non-blocking, latest-value ports built on Tokio
//!   `watch` cells.  Components declare [`OutputPort`]s and [`InputPort`]s and
//!   the host wires them together with [`PortLink`]s.

pub mod port;

pub use port::{FlowStatus, InputPort, OutputPort, PortLink, connect};
