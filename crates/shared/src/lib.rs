extern crate self as taleforge_shared;

pub mod errors;
pub mod messages;

pub use errors::ErrorCode;
pub use messages::{ClientMessage, ServerMessage, ToolStatusState};
