pub mod task;
pub mod filter;
pub mod theme;
pub mod config;

pub use task::*;
pub use filter::*;
pub use theme::*;
pub use config::*;
