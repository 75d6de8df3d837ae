//! Date header parsing.

use chrono::{DateTime, FixedOffset};

use crate::error::{Result, TriageError};

/// Parse a `Date:` header value into an offset-aware timestamp.
///
/// Provider dates often carry a trailing zone comment such as
/// `"Wed, 02 Jun 2021 06:00:00 +0000 (UTC)"`. The comment is stripped and
/// the rest must be valid RFC 2822.
pub fn parse_header_date(value: &str) -> Result<DateTime<FixedOffset>> {
    let trimmed = strip_zone_comment(value.trim());
    if trimmed.is_empty() {
        return Err(TriageError::DateParse {
            value: value.to_string(),
            reason: "empty date".into(),
        });
    }

    DateTime::parse_from_rfc2822(trimmed).map_err(|e| TriageError::DateParse {
        value: value.to_string(),
        reason: e.to_string(),
    })
}

/// Remove a trailing parenthesized comment: `"... +0000 (UTC)"` → `"... +0000"`.
fn strip_zone_comment(s: &str) -> &str {
    if s.ends_with(')') {
        if let Some(open) = s.rfind('(') {
            return s[..open].trim_end();
        }
    }
    s
}
