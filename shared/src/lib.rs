pub mod errors;
pub mod hash;
pub mod log;
pub mod message;

pub use message::{Message, MessageType};
