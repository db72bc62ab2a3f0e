//! memsync wire protocols
//!
//! Two formats live here:
//!
//! ## Peer frames
//! Replicas exchange MessagePack-encoded [`Frame`]s. On byte streams each
//! frame is prefixed with its length as a 4-byte big-endian integer; on
//! WebSocket every binary message carries exactly one frame body.
//!
//! ## Operator commands
//! A line-oriented text protocol inspired by Redis RESP:
//! ```text
//! COMMAND [KEY] [ARGS]
//! ```
//!
//! Responses:
//! ```text
//! +OK [message]            # Success
//! -ERR <code> <message>    # Error
//! $<length>\r\n<data>      # Bulk data
//! *<count>\r\n<items>      # Array
//! :<integer>               # Integer
//! ```

pub mod command;
pub mod error;
pub mod frame;
pub mod parser;
pub mod response;

pub use command::{Command, CommandKind};
pub use error::{ProtocolError, ProtocolResult};
pub use frame::{Frame, FrameCodec, MAX_FRAME_SIZE, PROTOCOL_VERSION};
pub use parser::Parser;
pub use response::Response;
