//! Transport module - endpoints and socket dialing.
//!
//! Provides abstraction over:
//! - TCP streams (`tcp`, `tcp4`, `tcp6`)
//! - Unix Domain Sockets (`unix`, unix only)
//! - Any bidirectional stream via a custom [`Dialer`]

mod socket;

pub use socket::{
    is_transient, BoxFuture, BoxedReader, BoxedWriter, Dialer, Endpoint, Family, NetDialer,
    Transport,
};
