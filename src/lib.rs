// revolution: Distributed control-plane runtime for a multi-process
// embedded robotics platform.
//
// A fixed set of named endpoints — one marshal (coordinator), one replica
// (persistent mirror), and several peripheral controllers — communicate over
// host-local POSIX message queues, maintain a replicated key-value state,
// and correlate request/response pairs over an otherwise fire-and-forget
// transport.
//
// This crate is a facade over the workspace members; the integration suites
// under `tests/` exercise the whole protocol through it.

pub use rev_core as runtime;
pub use rev_mq as transport;
pub use rev_proto as proto;
