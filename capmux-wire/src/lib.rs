//! The wire protocol: a fixed CBOR frame set, length-prefixed framing with
//! negotiated size caps, and the `HELLO` handshake that establishes them.

mod codec;
mod error;
mod frame;
mod framer;
mod handshake;
mod ordering;

pub use codec::{decode, encode};
pub use error::{Error, Result};
pub use frame::{Frame, MessageId};
pub use framer::{read_frame, write_frame, UNBOUNDED};
pub use handshake::{handshake, NegotiatedLimits};
pub use ordering::ChunkTracker;
