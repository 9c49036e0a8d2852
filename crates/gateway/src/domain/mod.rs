pub mod backoff;
pub mod frames;
pub mod state;
pub mod traits;

pub use backoff::{BackoffConfig, BackoffPolicy};
pub use frames::{DecodeError, DecodedFrame, Handshake};
pub use state::ConnectionState;
pub use traits::{EventCallback, ProtocolAdapter};
