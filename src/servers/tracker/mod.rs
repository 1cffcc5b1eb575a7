//! The tracker server: the delivery layer in front of the record store.
//!
//! Each accepted connection carries exactly one request: the handler reads
//! one bounded request line, dispatches on the command, writes the response
//! frames and closes the connection. Connections run concurrently; write
//! discipline per record is enforced by the store itself
//! (see [`crate::core`]).
pub mod handlers;
pub mod server;
