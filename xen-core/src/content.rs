//! The `CATEGORY:SERIAL:TEXT` envelope carried inside a text-mode frame
//! payload.
//!
//! This is deliberately not a `serde` structure: the wire format is a flat,
//! hand-delimited string (`spec` §3/§6), not JSON, so parsing is a single
//! pass over the bytes looking for the first two colons.

use std::fmt;
use std::str::FromStr;

use crate::errors::XenError;

/// The four message categories Xen dispatches.
///
/// Named `Okay`/`Fail` rather than `Ok`/`Err` so they don't shadow
/// `Result::Ok`/`Result::Err` at every call site; `Display`/`FromStr` still
/// round-trip through the wire literals `OK`/`ERR`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Category {
    /// A remote command to evaluate.
    Cmd,
    /// An asynchronous event.
    Evt,
    /// A successful result for a prior `Cmd`.
    Okay,
    /// A failed result, or an unsolicited error when `serial == 0`.
    Fail,
}

impl Category {
    pub const fn as_wire_str(self) -> &'static str {
        match self {
            Category::Cmd => "CMD",
            Category::Evt => "EVT",
            Category::Okay => "OK",
            Category::Fail => "ERR",
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_wire_str())
    }
}

impl FromStr for Category {
    type Err = UnknownCategory;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "CMD" => Ok(Category::Cmd),
            "EVT" => Ok(Category::Evt),
            "OK" => Ok(Category::Okay),
            "ERR" => Ok(Category::Fail),
            other => Err(UnknownCategory(other.to_string())),
        }
    }
}

/// A category literal that didn't match one of the four known wire
/// categories. Category validity is enforced at dispatch time, not parse
/// time (`spec` §4.3) — `content::parse` succeeds and hands this back so
/// the dispatcher can take its own "unknown category" path instead of
/// erroring out of the parser.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownCategory(pub String);

impl fmt::Display for UnknownCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unknown category {:?}", self.0)
    }
}

/// A decoded envelope, category validity not yet checked.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Envelope {
    pub category: Result<Category, UnknownCategory>,
    pub serial: u64,
    pub text: String,
}

/// Format a `CATEGORY:SERIAL:TEXT` envelope string.
pub fn format(category: Category, serial: u64, text: &str) -> String {
    format!("{category}:{serial}:{text}")
}

/// Parse a `CATEGORY:SERIAL:TEXT` envelope.
///
/// Splits on the first two colons only — `text` may itself contain colons
/// and they are preserved verbatim. Fails with `XenError::Format` if fewer
/// than two colons exist, or the serial field isn't a non-negative decimal
/// integer.
pub fn parse(s: &str) -> Result<Envelope, XenError> {
    let first = s
        .find(':')
        .ok_or_else(|| XenError::Format(format!("missing ':' in envelope {s:?}")))?;
    let (category_part, rest) = s.split_at(first);
    let rest = &rest[1..]; // skip the colon itself

    let second = rest
        .find(':')
        .ok_or_else(|| XenError::Format(format!("missing second ':' in envelope {s:?}")))?;
    let (serial_part, text_part) = rest.split_at(second);
    let text_part = &text_part[1..];

    let serial: u64 = serial_part
        .parse()
        .map_err(|_| XenError::Format(format!("invalid serial {serial_part:?}")))?;

    Ok(Envelope {
        category: Category::from_str(category_part).map_err(|e| e),
        serial,
        text: text_part.to_string(),
    })
}
