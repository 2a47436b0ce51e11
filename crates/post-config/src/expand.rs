//! `${VAR}` references in import map targets.
//!
//! A project can pick its CDN per environment:
//! `"react": "https://${POST_CDN:-esm.sh}/react@17.0.1"`. Only the braced
//! form is recognized; a bare `$` is literal text.

use std::borrow::Cow;
use std::env::{self, VarError};

use crate::ConfigError;

/// Substitute environment variables into `target`.
///
/// `${VAR:-fallback}` uses `fallback` when `VAR` is unset. An unset `VAR`
/// without fallback is an error naming `field`.
pub(crate) fn expand_env(target: &str, field: &str) -> Result<String, ConfigError> {
    if !target.contains("${") {
        return Ok(target.to_owned());
    }

    shellexpand::env_with_context(target, |var| env::var(var).map(Some))
        .map(Cow::into_owned)
        .map_err(|e| {
            let message = match e.cause {
                VarError::NotPresent => format!("${{{}}} not set", e.var_name),
                VarError::NotUnicode(_) => format!("${{{}}} is not valid UTF-8", e.var_name),
            };
            ConfigError::EnvVar {
                field: field.to_owned(),
                message,
            }
        })
}
