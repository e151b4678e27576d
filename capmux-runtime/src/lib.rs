//! Plugin-side runtime: registers capability handlers by URN, assembles argument
//! payloads from the invocation environment, and drives each handler with a lazy
//! frame-stream input and an [`Emitter`] output (§4.4).

mod args;
mod emitter;
mod error;
mod frame_stream;
mod handler;
mod peer;
mod registry;
mod runtime;

pub use args::{assemble, ResolvedArgs};
pub use emitter::Emitter;
pub use error::{Error, Result};
pub use frame_stream::{FrameStream, InputFrame};
pub use handler::{CapHandler, HandlerError, HandlerResult};
pub use peer::{NoPeer, PeerInvoker};
pub use registry::HandlerRegistry;
pub use runtime::PluginRuntime;
