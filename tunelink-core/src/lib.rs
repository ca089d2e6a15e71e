mod config;
mod dispatch;
mod events;

pub use config::*;
pub use dispatch::*;
pub use events::*;
