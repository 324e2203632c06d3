//! Branch identity for experiment subjects.
//!
//! A branch token names either a clean benchmark suite checkout
//! (`llm2jmh`) or a buggy variant produced by planting one synthetic
//! fault in one source method
//! (`llm2jmh_HWO_zipkin2.Endpoint-Builder.ip_227`). The buggy form
//! carries four underscore-separated fields: base suite, fault kind,
//! fault-site method in encoded form, and line number. Tokens arrive
//! from the command line and from directory scans; they are parsed once
//! here and flow through the rest of the pipeline as [`BranchSpec`]
//! values.

use std::fmt;
use std::str::FromStr;

use benchmix_error::{BenchmixError, Result};
use serde::{Deserialize, Serialize};

use crate::method::SourceMethodKey;

/// Synthetic fault kinds the injector can plant at a method site.
///
/// Each kind is a small localized perturbation: `HWO` busy-waits,
/// `PTW` sleeps the thread, `STS` forces a thread-safe collection,
/// `EFL` adds redundant float arithmetic, `SOC` layers string
/// concatenation onto the hot path.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum BugKind {
    Hwo,
    Ptw,
    Sts,
    Efl,
    Soc,
}

impl BugKind {
    pub const ALL: [Self; 5] = [Self::Hwo, Self::Ptw, Self::Sts, Self::Efl, Self::Soc];

    #[must_use]
    pub fn code(self) -> &'static str {
        match self {
            Self::Hwo => "HWO",
            Self::Ptw => "PTW",
            Self::Sts => "STS",
            Self::Efl => "EFL",
            Self::Soc => "SOC",
        }
    }
}

impl fmt::Display for BugKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

impl FromStr for BugKind {
    type Err = BenchmixError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "HWO" => Ok(Self::Hwo),
            "PTW" => Ok(Self::Ptw),
            "STS" => Ok(Self::Sts),
            "EFL" => Ok(Self::Efl),
            "SOC" => Ok(Self::Soc),
            other => Err(BenchmixError::config(format!(
                "unknown bug kind `{other}`, expected one of HWO, PTW, STS, EFL, SOC"
            ))),
        }
    }
}

/// A fault planted at a specific method site.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BugInjection {
    pub kind: BugKind,
    /// Fault site in raw source form.
    pub site: SourceMethodKey,
}

/// Parsed branch identity: a base suite plus an optional injected fault.
///
/// Construction goes through [`BranchSpec::parse`] or the typed
/// constructors, so any `BranchSpec` in hand is well formed and
/// [`BranchSpec::dir_name`] reproduces the exact on-disk token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BranchSpec {
    base: String,
    bug: Option<BugInjection>,
}

impl BranchSpec {
    #[must_use]
    pub fn clean(base: impl Into<String>) -> Self {
        Self { base: base.into(), bug: None }
    }

    #[must_use]
    pub fn buggy(base: impl Into<String>, kind: BugKind, site: SourceMethodKey) -> Self {
        Self { base: base.into(), bug: Some(BugInjection { kind, site }) }
    }

    /// Parses a branch token.
    ///
    /// One field means a clean suite branch. Four fields mean a buggy
    /// variant; the method field is decoded back to raw source form.
    ///
    /// # Errors
    ///
    /// Returns [`BenchmixError::InvalidBranchToken`] for an empty
    /// token, a field count that is neither 1 nor 4, an unknown fault
    /// kind, or a non-numeric line field.
    pub fn parse(token: &str) -> Result<Self> {
        if token.is_empty() {
            return Err(BenchmixError::InvalidBranchToken {
                token: String::new(),
                reason: "empty token".to_owned(),
            });
        }
        let fields: Vec<&str> = token.split('_').collect();
        match fields.as_slice() {
            [base] => Ok(Self::clean(*base)),
            [base, kind, method, line] => {
                let kind = BugKind::from_str(kind).map_err(|_| {
                    BenchmixError::InvalidBranchToken {
                        token: token.to_owned(),
                        reason: format!("unknown bug kind `{kind}`"),
                    }
                })?;
                let line: u32 = line.parse().map_err(|_| BenchmixError::InvalidBranchToken {
                    token: token.to_owned(),
                    reason: format!("line field `{line}` is not a number"),
                })?;
                let site = SourceMethodKey::new(method.replace('-', "$"), line);
                Ok(Self::buggy(*base, kind, site))
            }
            fields => Err(BenchmixError::InvalidBranchToken {
                token: token.to_owned(),
                reason: format!(
                    "expected 1 or 4 underscore-separated fields, found {}",
                    fields.len()
                ),
            }),
        }
    }

    /// Base suite branch this spec was derived from.
    #[must_use]
    pub fn base(&self) -> &str {
        &self.base
    }

    #[must_use]
    pub fn bug(&self) -> Option<&BugInjection> {
        self.bug.as_ref()
    }

    #[must_use]
    pub fn is_buggy(&self) -> bool {
        self.bug.is_some()
    }

    /// On-disk token for this branch, identical to the parsed input.
    #[must_use]
    pub fn dir_name(&self) -> String {
        match &self.bug {
            None => self.base.clone(),
            Some(bug) => format!("{}_{}_{}", self.base, bug.kind, bug.site.encoded_token()),
        }
    }
}

impl fmt::Display for BranchSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.dir_name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clean_token_parses_to_a_branch_without_a_bug() {
        let spec = BranchSpec::parse("llm2jmh").expect("clean token should parse");
        assert_eq!(spec.base(), "llm2jmh");
        assert!(!spec.is_buggy());
        assert_eq!(spec.dir_name(), "llm2jmh");
    }

    #[test]
    fn buggy_token_parses_and_decodes_the_method_field() {
        let spec = BranchSpec::parse("llm2jmh_HWO_zipkin2.Endpoint-Builder.ip_227")
            .expect("buggy token should parse");
        assert_eq!(spec.base(), "llm2jmh");
        let bug = spec.bug().expect("bug should be present");
        assert_eq!(bug.kind, BugKind::Hwo);
        assert_eq!(bug.site.method(), "zipkin2.Endpoint$Builder.ip");
        assert_eq!(bug.site.line(), 227);
    }

    #[test]
    fn dir_name_round_trips_the_original_token() {
        let token = "ju2jmh_SOC_org.example.Outer-Inner.call_42";
        let spec = BranchSpec::parse(token).expect("token should parse");
        assert_eq!(spec.dir_name(), token);
    }

    #[test]
    fn wrong_field_count_is_rejected() {
        let error = BranchSpec::parse("a_b_c").expect_err("3 fields must fail");
        assert!(matches!(error, BenchmixError::InvalidBranchToken { .. }));
        assert!(BranchSpec::parse("").is_err());
        assert!(BranchSpec::parse("a_b_c_d_e").is_err());
    }

    #[test]
    fn unknown_bug_kind_is_rejected() {
        let error =
            BranchSpec::parse("llm2jmh_XYZ_m_1").expect_err("unknown kind must fail");
        let message = error.to_string();
        assert!(message.contains("XYZ"), "message should name the kind: {message}");
    }

    #[test]
    fn non_numeric_line_is_rejected() {
        assert!(BranchSpec::parse("llm2jmh_HWO_m_line").is_err());
    }

    #[test]
    fn bug_kind_codes_round_trip_through_from_str() {
        for kind in BugKind::ALL {
            assert_eq!(kind.code().parse::<BugKind>().expect("code parses"), kind);
        }
    }
}
