//! Transparent relay pair (§4.7): a slave bridges a local protocol endpoint to
//! a remote connection toward the master, intercepting `RELAY_NOTIFY`/
//! `RELAY_STATE` frames rather than forwarding them; the master blocks for
//! the opening notify and exposes the slave's view through plain accessors.

mod error;
mod master;
mod slave;

pub use error::{Error, Result};
pub use master::RelayMaster;
pub use slave::{spawn_slave, NotifyHandle, NotifyUpdate};
