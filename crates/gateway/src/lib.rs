pub mod connection;
pub mod protocol;
pub mod server;

pub use connection::{Connection, ConnectionRegistry};
pub use protocol::{ProtocolRequest, StreamEvent};
pub use server::{router, serve, GatewayState};
