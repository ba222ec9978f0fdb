//! Project plumbing around the supervisor: which package manager invoked the
//! build, where the project root is, and what command starts the app.

mod launch;
mod package_manager;
mod root;

pub use launch::*;
pub use package_manager::*;
pub use root::*;
