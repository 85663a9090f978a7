//! # palaver-shared
//!
//! Protocol definitions shared between the palaver relay server and its
//! clients: the pipe-delimited wire format, its record kinds, and the
//! protocol error type. No I/O lives here.

pub mod constants;
pub mod error;
pub mod protocol;

pub use error::ProtocolError;
pub use protocol::{Frame, MessageKind};
