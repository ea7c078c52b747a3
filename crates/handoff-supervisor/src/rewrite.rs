//! Single-line command rewriting.
//!
//! A line is replaced only when its whitespace-trimmed text equals the
//! trigger exactly. Everything else, including lines that merely contain the
//! trigger and lines that are not valid UTF-8, is forwarded byte-for-byte.

pub const DEFAULT_TRIGGER: &str = "/compact";
pub const DEFAULT_REPLACEMENT: &str = "/clear";

/// An exact trigger and the line that replaces it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RewriteRule {
    trigger: String,
    replacement: String,
}

impl RewriteRule {
    pub fn new(trigger: impl Into<String>, replacement: impl Into<String>) -> Self {
        let trigger: String = trigger.into();
        Self {
            trigger: trigger.trim().to_string(),
            replacement: replacement.into(),
        }
    }

    pub fn trigger(&self) -> &str {
        &self.trigger
    }

    pub fn replacement(&self) -> &str {
        &self.replacement
    }
}

impl Default for RewriteRule {
    fn default() -> Self {
        Self::new(DEFAULT_TRIGGER, DEFAULT_REPLACEMENT)
    }
}

/// Outcome of running one line through the rewriter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rewritten<'a> {
    Unchanged(&'a [u8]),
    Replaced(&'a str),
}

impl<'a> Rewritten<'a> {
    pub fn as_bytes(&self) -> &'a [u8] {
        match *self {
            Rewritten::Unchanged(bytes) => bytes,
            Rewritten::Replaced(text) => text.as_bytes(),
        }
    }

    pub fn is_replaced(&self) -> bool {
        matches!(self, Rewritten::Replaced(_))
    }
}

/// Applies a [`RewriteRule`] to input lines. A rewriter without a rule
/// passes every line through untouched.
#[derive(Debug, Clone, Default)]
pub struct LineRewriter {
    rule: Option<RewriteRule>,
}

impl LineRewriter {
    pub fn new(rule: Option<RewriteRule>) -> Self {
        Self { rule }
    }

    pub fn rule(&self) -> Option<&RewriteRule> {
        self.rule.as_ref()
    }

    /// Decide what to forward for `line` (without its newline).
    ///
    /// `terminated` only records whether the caller will re-append a newline;
    /// it never affects the decision.
    pub fn rewrite<'a>(&'a self, line: &'a [u8], terminated: bool) -> Rewritten<'a> {
        let Some(rule) = &self.rule else {
            return Rewritten::Unchanged(line);
        };

        let text = match std::str::from_utf8(line) {
            Ok(text) => text,
            Err(e) => {
                log::debug!("forwarding undecodable input line unchanged: {e}");
                return Rewritten::Unchanged(line);
            }
        };

        if text.trim() == rule.trigger {
            log::debug!(
                "rewriting {} line {:?} -> {:?}",
                if terminated { "complete" } else { "trailing" },
                rule.trigger,
                rule.replacement
            );
            Rewritten::Replaced(&rule.replacement)
        } else {
            Rewritten::Unchanged(line)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rewriter() -> LineRewriter {
        LineRewriter::new(Some(RewriteRule::default()))
    }

    #[test]
    fn test_exact_trigger_is_replaced() {
        let rw = rewriter();
        assert_eq!(rw.rewrite(b"/compact", true), Rewritten::Replaced("/clear"));
    }

    #[test]
    fn test_surrounding_whitespace_is_ignored() {
        let rw = rewriter();
        assert_eq!(rw.rewrite(b"  /compact\t", true), Rewritten::Replaced("/clear"));
        assert_eq!(rw.rewrite(b"/compact\r", true), Rewritten::Replaced("/clear"));
    }

    #[test]
    fn test_substring_is_not_replaced() {
        let rw = rewriter();
        for line in [&b"foo /compact"[..], b"/compact bar", b"/compactx", b"//compact"] {
            assert_eq!(rw.rewrite(line, true), Rewritten::Unchanged(line));
        }
    }

    #[test]
    fn test_match_is_case_sensitive() {
        let rw = rewriter();
        assert_eq!(rw.rewrite(b"/Compact", true), Rewritten::Unchanged(b"/Compact"));
    }

    #[test]
    fn test_newline_flag_does_not_change_decision() {
        let rw = rewriter();
        assert_eq!(rw.rewrite(b"/compact", false), Rewritten::Replaced("/clear"));
        assert_eq!(rw.rewrite(b"hello", false), Rewritten::Unchanged(b"hello"));
    }

    #[test]
    fn test_disabled_passes_everything() {
        let rw = LineRewriter::new(None);
        assert_eq!(rw.rewrite(b"/compact", true), Rewritten::Unchanged(b"/compact"));
        assert!(rw.rule().is_none());
    }

    #[test]
    fn test_invalid_utf8_is_forwarded_unchanged() {
        let rw = rewriter();
        let line = b"/compact\xff";
        let out = rw.rewrite(line, true);
        assert!(!out.is_replaced());
        assert_eq!(out.as_bytes(), line);
    }

    #[test]
    fn test_custom_rule_trims_trigger() {
        let rw = LineRewriter::new(Some(RewriteRule::new(" /reset ", "/clear")));
        assert_eq!(rw.rule().unwrap().trigger(), "/reset");
        assert_eq!(rw.rewrite(b"/reset", true).as_bytes(), b"/clear");
    }
}
