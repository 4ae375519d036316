//! Sandboxed execution of untrusted scripts.
//!
//! Each request gets a private workspace holding the script, a fresh
//! container with that workspace mounted, input delivered over the attach
//! stream, and a bounded wait. The container and the workspace are removed
//! on every exit path.

mod backend;
mod collect;
mod docker;
mod error;
mod executor;
mod lifecycle;
#[cfg(test)]
pub(crate) mod mock;
mod stdin;
mod workspace;

pub(crate) use collect::ExecutionResult;
pub(crate) use docker::DockerBackend;
pub(crate) use error::SandboxError;
pub(crate) use executor::{ExecutionRequest, Executor};

#[cfg(test)]
pub(crate) use backend::BackendHandle;
#[cfg(test)]
pub(crate) use error::UNAVAILABLE_MESSAGE;
