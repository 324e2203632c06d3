//! Fault-site identity.

use std::fmt;

use benchmix_error::{BenchmixError, Result};
use serde::{Deserialize, Serialize};

/// A fully qualified source method plus the line where a fault lands.
///
/// The method is held in raw source form, with the `$` nested-class
/// separator intact. Directory names, git branch names, and artifact
/// keys rewrite `$` to `-` because `$` is hostile to shells and build
/// tools; `-` never appears inside a qualified Java name, so the
/// rewrite round-trips. [`SourceMethodKey::encoded_token`] produces the
/// rewritten `{method}_{line}` form and [`SourceMethodKey::parse_encoded`]
/// reverses it.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct SourceMethodKey {
    method: String,
    line: u32,
}

impl SourceMethodKey {
    #[must_use]
    pub fn new(method: impl Into<String>, line: u32) -> Self {
        Self { method: method.into(), line }
    }

    /// Raw method name as it appears in coverage reports.
    #[must_use]
    pub fn method(&self) -> &str {
        &self.method
    }

    #[must_use]
    pub fn line(&self) -> u32 {
        self.line
    }

    /// Method name with `$` rewritten to `-`.
    #[must_use]
    pub fn encoded_method(&self) -> String {
        self.method.replace('$', "-")
    }

    /// `{encoded_method}_{line}` token used in branch names and artifact keys.
    #[must_use]
    pub fn encoded_token(&self) -> String {
        format!("{}_{}", self.encoded_method(), self.line)
    }

    /// Parses an encoded `{method}_{line}` token back into a key.
    ///
    /// The split is on the last underscore, so method names that
    /// themselves contain underscores survive the round trip.
    ///
    /// # Errors
    ///
    /// Returns [`BenchmixError::InvalidBranchToken`] when the token has
    /// no underscore or the trailing field is not a line number.
    pub fn parse_encoded(token: &str) -> Result<Self> {
        let (method, line) = token.rsplit_once('_').ok_or_else(|| {
            BenchmixError::InvalidBranchToken {
                token: token.to_owned(),
                reason: "expected `{method}_{line}`".to_owned(),
            }
        })?;
        let line: u32 = line.parse().map_err(|_| BenchmixError::InvalidBranchToken {
            token: token.to_owned(),
            reason: format!("line field `{line}` is not a number"),
        })?;
        Ok(Self { method: method.replace('-', "$"), line })
    }
}

impl fmt::Display for SourceMethodKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}_{}", self.method, self.line)
    }
}
