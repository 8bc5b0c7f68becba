// rev-proto: Control-plane wire protocol types.
//
// The frame format, the protocol verb space, and the static endpoint
// topology. Everything here is plain data — transport and runtime live in
// rev-mq and rev-core.

pub mod message;
pub mod space;
pub mod topology;

pub use message::{FrameError, Message};
pub use space::{HeaderSpace, KeySpace};
pub use topology::{Endpoint, Topology, TopologyError, is_valid_name};
