//! Line-framed RPC message transport over text streams.
//!
//! linewire carves RPC messages out of a byte stream (and places them back
//! into one) using newline-terminated lines, optionally grouped by a
//! sentinel delimiter line. Endpoints share one sink safely across tasks
//! and tear down through a single, idempotent disposal.
//!
//! # Crate Structure
//!
//! - [`frame`] — Line/delimiter framing, endpoints and their lifecycle
//! - [`transport`] — Unix domain socket streams to build endpoints over

/// Re-export frame types.
pub mod frame {
    pub use linewire_frame::*;
}

/// Re-export transport types.
pub mod transport {
    pub use linewire_transport::*;
}
