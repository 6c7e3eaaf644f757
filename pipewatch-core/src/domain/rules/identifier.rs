// pipewatch-core/src/domain/rules/identifier.rs
//
// Table and column names come from configuration and end up inside SQL text,
// so they are validated once here and quoted by the query builder.

use regex::Regex;
use serde::Serialize;
use std::fmt;
use std::sync::OnceLock;

fn re_identifier() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"^[A-Za-z_][A-Za-z0-9_]{0,127}$")
            .unwrap_or_else(|_| Regex::new("$^").unwrap_or_else(|_| unreachable!()))
    })
}

/// A bare SQL identifier: letters, digits and underscores, not starting with a digit.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(transparent)]
pub struct SqlIdentifier(String);

impl SqlIdentifier {
    pub fn parse(raw: &str) -> Result<Self, String> {
        if re_identifier().is_match(raw) {
            Ok(Self(raw.to_string()))
        } else {
            Err(format!(
                "'{}' is not a valid identifier (letters, digits and '_' only)",
                raw
            ))
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Double-quoted form for interpolation into SQL text.
    pub fn quoted(&self) -> String {
        format!("\"{}\"", self.0)
    }
}

impl fmt::Display for SqlIdentifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for SqlIdentifier {
    fn as_ref(&self) -> &str {
        &self.0
    }
}
