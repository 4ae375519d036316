//! CLI command implementations.
//!
//! Each submodule keeps its decision logic separate from IO so it can be
//! tested without Docker or a terminal.

pub mod clean;
pub mod image;
pub mod init;
pub mod run;
pub mod serve;
