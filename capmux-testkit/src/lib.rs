//! Shared test tooling for capmux's own test suites: an in-memory duplex
//! transport standing in for a real socket, plus small `Cap`/`Urn` fixture
//! builders. Grounded on the teacher's in-memory IPC transport
//! (`nyx-stream::plugin_ipc`), simplified to a single `tokio::io::duplex`
//! pair per connection since every test here owns both ends directly rather
//! than looking a peer up by name in a shared registry.

use capmux_urn::{Cap, CapArg, CapOutput, ResolvedMediaSpec, Urn, UrnBuilder};
use tokio::io::DuplexStream;

/// Default buffer size for [`duplex_pair`], generous enough that a test's
/// frames never block on backpressure unless it is deliberately exercising it.
pub const DEFAULT_DUPLEX_BUFFER: usize = 64 * 1024;

/// Returns a connected pair of in-memory streams, each end readable/writable
/// independently — the transport two ends of a test wiring (e.g. a host and a
/// plugin runtime) talk over instead of a real socket.
pub fn duplex_pair() -> (DuplexStream, DuplexStream) {
    tokio::io::duplex(DEFAULT_DUPLEX_BUFFER)
}

/// Same as [`duplex_pair`] with an explicit buffer size, for tests that want
/// to exercise backpressure or very large payloads.
pub fn duplex_pair_with_capacity(capacity: usize) -> (DuplexStream, DuplexStream) {
    tokio::io::duplex(capacity)
}

/// Builds the capability URN `cap:op=<op>`, the shape used by most scenario
/// tests that only care about dispatch, not richer tag sets.
pub fn cap_urn(op: &str) -> Urn {
    UrnBuilder::cap()
        .tag("op", op)
        .expect("fixture op tag is a valid unquoted value")
        .build()
}

/// Builds a minimal `Cap` for `op`: a single required `media:bytes` stdin
/// argument, a `media:bytes` output, no inherent validation rules. Enough to
/// drive the echo-style handlers most scenario tests register.
pub fn echo_cap(op: &str) -> Cap {
    Cap {
        urn: cap_urn(op),
        command: format!("{op}-plugin"),
        args: vec![CapArg {
            media_urn: "media:bytes".to_string(),
            required: true,
            sources: vec![capmux_urn::ArgSource::Stdin("media:bytes".to_string())],
            description: "input bytes".to_string(),
        }],
        output: CapOutput {
            media_urn: "media:bytes".to_string(),
            description: "output bytes".to_string(),
        },
        media_specs: vec![(
            "media:bytes".to_string(),
            ResolvedMediaSpec {
                mime_type: "application/octet-stream".to_string(),
                profile_uri: None,
                schema: None,
                rules: vec![],
            },
        )],
    }
}
