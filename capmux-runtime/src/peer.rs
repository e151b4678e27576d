//! `PeerInvoker`: the optional capability-invocation service handlers may use to
//! call another capability (possibly on another plugin) from within their own
//! handler. Handlers running in a context that doesn't grant peer access receive
//! [`NoPeer`], which fails every call with `PEER_NOT_SUPPORTED`.

use crate::error::{Error, Result};
use async_trait::async_trait;

/// A capability invocation service exposed to a handler.
#[async_trait]
pub trait PeerInvoker: Send + Sync {
    /// Invokes `cap_urn` with a raw `payload` and `content_type`, returning the
    /// peer's response payload.
    async fn invoke(&self, cap_urn: &str, content_type: &str, payload: &[u8]) -> Result<Vec<u8>>;
}

/// A `PeerInvoker` that refuses every call. Used wherever the runtime grants no
/// peer-invocation access.
pub struct NoPeer;

#[async_trait]
impl PeerInvoker for NoPeer {
    async fn invoke(&self, _cap_urn: &str, _content_type: &str, _payload: &[u8]) -> Result<Vec<u8>> {
        Err(Error::Handler {
            code: "PEER_NOT_SUPPORTED".to_string(),
            message: "this handler context grants no peer-invocation access".to_string(),
        })
    }
}
