//! The host-supplied contract a `Channel` calls into to give `CMD` text
//! meaning.
//!
//! `xen-core` knows nothing about any particular scripting language; a host
//! plugs in an `Evaluator` the same way `termihub_core::session::traits`
//! has the session manager hold a generic `ProcessSpawner`/`OutputSink`
//! instead of hardcoding a PTY backend.

/// Executes `CMD` text and returns its stringified result.
///
/// `evaluate` must capture the host's own evaluation errors and return
/// them as `Err(error_text)` rather than panicking or propagating an
/// exception — the channel turns that `Err` into an `ERR` reply and keeps
/// running (`spec` §4.7, §7).
pub trait Evaluator: Send + Sync {
    /// Compile and run `text`, returning a text representation of the
    /// result that round-trips through the host (full precision for
    /// floating point, a canonical representation for void/empty).
    fn evaluate(&self, text: &str) -> Result<String, String>;
}

/// An `Evaluator` with nothing plugged in. Every command fails; useful as
/// a `Channel`'s default before a host installs a real one.
#[derive(Debug, Default)]
pub struct NullEvaluator;

impl Evaluator for NullEvaluator {
    fn evaluate(&self, _text: &str) -> Result<String, String> {
        Err("no evaluator configured".to_string())
    }
}

/// Returns its input unchanged. Used by tests and by the `xen-agent` demo
/// binary in place of a real scripting host.
#[derive(Debug, Default)]
pub struct EchoEvaluator;

impl Evaluator for EchoEvaluator {
    fn evaluate(&self, text: &str) -> Result<String, String> {
        Ok(text.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn null_evaluator_always_fails() {
        assert!(NullEvaluator.evaluate("1+1").is_err());
    }

    #[test]
    fn echo_evaluator_returns_input() {
        assert_eq!(EchoEvaluator.evaluate("1+1").unwrap(), "1+1");
    }
}
