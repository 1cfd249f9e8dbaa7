//! Simulated trading venue.
//!
//! An exchange replays historical tick tapes and matches orders against
//! them; a broker keeps client books over the exchange streams; a console
//! front-end talks to the broker. The binaries in `src/bin` wire the three
//! together.
//!
//! - **config**: YAML configuration shared by the binaries
//! - **logging**: tracing initialization
//! - **console**: the client front-end
//! - **exchange** / **broker**: core services (re-exported from workspace)

// Re-export workspace libraries for convenience
pub use broker;
pub use exchange;
pub use venue_proto;

pub mod config;
pub mod console;
pub mod logging;
