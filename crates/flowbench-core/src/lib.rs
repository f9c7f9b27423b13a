//! # Flowbench Core
//!
//! Serial command/telemetry engine for the waterflow test bench.
//!
//! This library provides:
//! - Serial connection management for the bench link
//! - A background telemetry reader sharing one bus lock with all writers
//! - Toggle commands and timed preset sessions (toggle, wait, toggle back)
//! - Classification of incoming telemetry lines into valve and pressure readings
//!
//! The operator-facing UI is deliberately not part of this crate: it drives
//! the engine through [`engine::SerialEngine`] and consumes
//! [`engine::EngineEvent`]s from the subscription channel.
//!
//! ## Example
//!
//! ```rust,ignore
//! use flowbench_core::prelude::*;
//!
//! let mut conn = Connection::new(ConnectionConfig {
//!     port_name: "/dev/ttyUSB0".into(),
//!     ..Default::default()
//! });
//! flowbench_core::engine::handshake(&mut conn, 20)?;
//!
//! let (engine, events) = SerialEngine::start(conn);
//! engine.start_preset("135", "2.5")?;
//! for event in events {
//!     println!("{event:?}");
//! }
//! ```

#![warn(missing_docs)]

pub mod clock;
pub mod engine;
pub mod protocol;
pub mod telemetry;

/// Re-export commonly used types
pub mod prelude {
    pub use crate::clock::SessionClock;
    pub use crate::engine::{EngineEvent, EngineState, SerialEngine, ValidationError};
    pub use crate::protocol::{Connection, ConnectionConfig, ConnectionState, ProtocolError};
    pub use crate::telemetry::Telemetry;
}

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
