//! Row types and their queries, one module per table.

pub mod browse_session;
pub mod chat_message;
pub mod payment;
pub mod settings;
pub mod threat;
pub mod user;
pub mod vpn_location;

pub use browse_session::*;
pub use chat_message::*;
pub use payment::*;
pub use settings::*;
pub use threat::*;
pub use user::*;
pub use vpn_location::*;
