//! Configuration parsing and types.
//!
//! - `types` - The `relaunch.yaml` structure (`Config`)
//! - `duration` - Human duration strings used by the timeout fields
//! - `parser` - Config discovery and YAML parsing

mod duration;
mod parser;
mod types;

pub use duration::*;
pub use parser::*;
pub use types::*;
