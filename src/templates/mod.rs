//! Embedded templates written by `coderun init`.

/// Default `coderun.toml` configuration.
pub(crate) const CODERUN_TOML: &str = include_str!("coderun.toml");
