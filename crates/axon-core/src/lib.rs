pub mod agents;
pub mod config;
pub mod event_bus;
pub mod permission_defaults;
pub mod permissions;

pub use agents::*;
pub use config::*;
pub use event_bus::*;
pub use permission_defaults::*;
pub use permissions::*;
