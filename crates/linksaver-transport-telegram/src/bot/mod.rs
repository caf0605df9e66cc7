/// Bot API implementation of the messaging gateway
pub mod gateway;
/// Command, button and link handlers
pub mod handlers;

pub use gateway::TelegramGateway;
