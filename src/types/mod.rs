//! Target and port types.
//!
//! These turn operator input into the concrete address list and port set a
//! scan enumerates. Both are validated before any probe is sent.

mod port;
mod target;

pub use port::{
    NamedRange, PortError, PortExclusion, PortRange, PortSelection, PortSpec, DEFAULT_PORT,
};
pub use target::{expand_network, AddressSet, TargetError, TargetSpec};
