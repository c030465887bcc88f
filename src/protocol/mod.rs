//! AMPS protocol types: command kinds, inbound messages and topic metadata

pub mod command;
pub mod messages;
pub mod topics;

pub use command::*;
pub use messages::*;
pub use topics::*;
