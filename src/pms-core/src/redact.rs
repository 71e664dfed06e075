//! Log redaction for protocol traffic.
//!
//! Raw MPD command lines are traced at `trace` level. The `password` command
//! carries the server password in clear text, so every traced line goes
//! through [`redact_secrets`] first.

use std::borrow::Cow;

const REDACTED: &str = "[REDACTED]";

/// Commands whose whole argument list is sensitive.
const SENSITIVE_COMMANDS: &[&str] = &["password"];

/// Redact sensitive information from a protocol line.
///
/// # Examples
/// ```
/// use pms_core::redact::redact_secrets;
///
/// let output = redact_secrets("password \"hunter2\"");
/// assert!(!output.contains("hunter2"));
/// assert_eq!(output, "password [REDACTED]");
/// ```
pub fn redact_secrets(line: &str) -> Cow<'_, str> {
    let trimmed = line.trim_start();
    for command in SENSITIVE_COMMANDS {
        if let Some(rest) = trimmed.strip_prefix(command) {
            if rest.is_empty() || !rest.starts_with(char::is_whitespace) {
                continue;
            }
            let indent = &line[..line.len() - trimmed.len()];
            return Cow::Owned(format!("{indent}{command} {REDACTED}"));
        }
    }

    Cow::Borrowed(line)
}
