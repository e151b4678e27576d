//! Host-side supervisor: attaches plugins, keeps the cap and request tables
//! current, and routes frames between one upstream engine connection and the
//! set of attached plugin connections (§4.5). Also carries the composite
//! capability registry and directed capability graph (§4.6).

pub mod cap_table;
pub mod error;
pub mod graph;
pub mod plugin;
pub mod process;
pub mod request_table;
pub mod router;

pub use cap_table::CapTable;
pub use error::{Error, Result};
pub use graph::{CapCaller, CapCube, CapExecutor, CapGraph, CapMatrix, GraphStats};
pub use plugin::{BoxedReader, BoxedWriter, PluginLauncher, PluginRecord, PluginState};
pub use process::ProcessLauncher;
pub use request_table::{RequestEntry, RequestTable};
pub use router::Host;
