pub mod clock;
pub mod connection;
pub mod error;
pub mod presence;
pub mod router;
pub mod session;

pub use error::RouterError;
pub use presence::{ConnectionHandle, Outbound, PresenceDirectory};
pub use router::EventRouter;
pub use session::Session;
