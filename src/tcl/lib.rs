//! Shared types and helpers used by both the `server` and `client` binaries:
//! the wire protocol, the error types it returns, the signal catalog, and a
//! small hand-rolled libc binding used by the interactive shell's raw
//! terminal mode.

pub mod error;
pub mod message;
pub mod mylibc;
pub mod signal;

/// Default address the server binds and the client connects to.
pub const SOCKET_ADDRESS: &str = "127.0.0.1:4242";

/// Largest single wire-protocol frame accepted, in bytes. A `Status`
/// response listing every program is the biggest payload in practice;
/// this bound exists purely to stop a corrupt length prefix from causing
/// an unbounded allocation.
pub const MAX_MESSAGE_SIZE: u32 = 1 << 20;
