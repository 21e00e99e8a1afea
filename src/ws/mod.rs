pub mod actor;
pub mod connection;
pub mod events;
pub mod handler;
pub mod hub;
pub mod registry;

pub use connection::{ConnectionHandle, ConnectionSender, ConnectionStatus, SendFailure};
pub use events::ChatEvent;
pub use handler::ConnectError;
pub use hub::FanoutHub;
pub use registry::ChatRegistry;
