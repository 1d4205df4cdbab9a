pub mod consolidate;
pub mod duration;
pub mod error;
pub mod export;
pub mod io;
pub mod model;
pub mod remote;
pub mod watch;
pub mod workflow;

pub use error::{Result, ToolError};
