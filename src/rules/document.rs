//! Rule document loading and validation.
//!
//! A rule document is a JSON file:
//!
//! ```json
//! {
//!   "predicate": "all",
//!   "rules": [
//!     {"field": "from_mail", "predicate": "contains", "value": "google"},
//!     {"field": "date", "predicate": "less_than", "value": "1 days"}
//!   ],
//!   "actions": [
//!     {"name": "mark_as_read"},
//!     {"name": "move", "folder_name": "HappyFox"}
//!   ]
//! }
//! ```
//!
//! The JSON is first read into loose `Raw*` structures and then compiled
//! into typed [`RuleDocument`] form, so that every structural problem is
//! reported at load time, before any mail provider call is made.

use std::path::Path;

use serde::Deserialize;
use tracing::{debug, warn};

use super::interval::Interval;
use crate::error::{Result, TriageError};
use crate::model::Record;

// ── Raw JSON shape ──────────────────────────────────────────────

#[derive(Debug, Deserialize)]
struct RawDocument {
    predicate: String,
    #[serde(default)]
    rules: Vec<RawClause>,
    #[serde(default)]
    actions: Vec<RawAction>,
}

#[derive(Debug, Deserialize)]
struct RawClause {
    #[serde(default)]
    name: Option<String>,
    field: String,
    predicate: String,
    value: String,
}

#[derive(Debug, Deserialize)]
struct RawAction {
    name: String,
    #[serde(default)]
    folder_name: Option<String>,
}

// ── Typed document ──────────────────────────────────────────────

/// How clause results combine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Combinator {
    /// Every clause must match (empty rule list matches).
    All,
    /// At least one clause must match (empty rule list never matches).
    Any,
}

/// A record field a clause can inspect.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Field {
    FromMail,
    ToMail,
    Subject,
    Date,
    Message,
}

impl Field {
    /// Resolve a field name (case-insensitive).
    pub fn from_name(name: &str) -> Option<Self> {
        match name.to_ascii_lowercase().as_str() {
            "from_mail" => Some(Self::FromMail),
            "to_mail" => Some(Self::ToMail),
            "subject" => Some(Self::Subject),
            "date" => Some(Self::Date),
            "message" => Some(Self::Message),
            _ => None,
        }
    }

    /// Canonical field name as written in rule documents.
    pub fn name(self) -> &'static str {
        match self {
            Self::FromMail => "from_mail",
            Self::ToMail => "to_mail",
            Self::Subject => "subject",
            Self::Date => "date",
            Self::Message => "message",
        }
    }

    /// Read this field from a record.
    pub fn value(self, record: &Record) -> &str {
        match self {
            Self::FromMail => &record.from_mail,
            Self::ToMail => &record.to_mail,
            Self::Subject => &record.subject,
            Self::Date => &record.date,
            Self::Message => &record.message,
        }
    }
}

/// A clause predicate together with its operand.
///
/// Text operands are stored lowercased; matching is case-insensitive.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Predicate {
    Contains(String),
    NotContains(String),
    Equals(String),
    NotEquals(String),
    /// Record date is more recent than the interval ago.
    LessThan(Interval),
    /// Record date is older than the interval ago.
    GreaterThan(Interval),
    /// Unrecognized predicate name. Never matches.
    Unsupported { name: String },
}

impl Predicate {
    /// Predicate name as written in rule documents.
    pub fn name(&self) -> &str {
        match self {
            Self::Contains(_) => "contains",
            Self::NotContains(_) => "not_contains",
            Self::Equals(_) => "equals",
            Self::NotEquals(_) => "not_equals",
            Self::LessThan(_) => "less_than",
            Self::GreaterThan(_) => "greater_than",
            Self::Unsupported { name } => name,
        }
    }

    fn is_date(&self) -> bool {
        matches!(self, Self::LessThan(_) | Self::GreaterThan(_))
    }
}

/// One `field predicate value` condition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuleClause {
    /// Optional label used in logs.
    pub name: Option<String>,
    pub field: Field,
    pub predicate: Predicate,
}

/// A mutating action run on every matching record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
    MarkAsRead,
    MarkAsUnread,
    Move { folder_name: String },
}

impl std::fmt::Display for Action {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::MarkAsRead => f.write_str("mark_as_read"),
            Self::MarkAsUnread => f.write_str("mark_as_unread"),
            Self::Move { folder_name } => write!(f, "move({folder_name})"),
        }
    }
}

/// A validated rule document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuleDocument {
    pub combinator: Combinator,
    pub rules: Vec<RuleClause>,
    pub actions: Vec<Action>,
}

impl RuleDocument {
    /// Load and validate a rule document from a JSON file.
    pub fn load(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path).map_err(|e| TriageError::io(path, e))?;
        let raw: RawDocument =
            serde_json::from_str(&contents).map_err(|source| TriageError::RulesSyntax {
                path: path.to_path_buf(),
                source,
            })?;
        let document = compile(raw)?;
        debug!(
            path = %path.display(),
            rules = document.rules.len(),
            actions = document.actions.len(),
            "Loaded rule document"
        );
        Ok(document)
    }

    /// Parse and validate a rule document held in memory.
    pub fn from_json(json: &str) -> Result<Self> {
        let raw: RawDocument =
            serde_json::from_str(json).map_err(|source| TriageError::RulesSyntax {
                path: "<inline>".into(),
                source,
            })?;
        compile(raw)
    }
}

// ── Compilation ─────────────────────────────────────────────────

fn compile(raw: RawDocument) -> Result<RuleDocument> {
    let combinator = match raw.predicate.to_ascii_lowercase().as_str() {
        "all" => Combinator::All,
        "any" => Combinator::Any,
        other => {
            return Err(TriageError::invalid_rules(
                "predicate",
                format!("expected 'all' or 'any', got '{other}'"),
            ))
        }
    };

    let rules = raw
        .rules
        .into_iter()
        .enumerate()
        .map(|(i, clause)| compile_clause(i, clause))
        .collect::<Result<Vec<_>>>()?;

    let actions = raw
        .actions
        .into_iter()
        .enumerate()
        .map(|(i, action)| compile_action(i, action))
        .collect::<Result<Vec<_>>>()?;

    if actions.is_empty() {
        warn!("Rule document has no actions; matches will be counted but nothing is changed");
    }

    Ok(RuleDocument {
        combinator,
        rules,
        actions,
    })
}

fn compile_clause(index: usize, raw: RawClause) -> Result<RuleClause> {
    let location = format!("rules[{index}]");

    let field = Field::from_name(&raw.field).ok_or_else(|| {
        TriageError::invalid_rules(
            &location,
            format!(
                "unknown field '{}' (expected from_mail, to_mail, subject, date or message)",
                raw.field
            ),
        )
    })?;

    let value = raw.value;
    let predicate = match raw.predicate.as_str() {
        "contains" => Predicate::Contains(value.to_lowercase()),
        "not_contains" => Predicate::NotContains(value.to_lowercase()),
        "equals" => Predicate::Equals(value.to_lowercase()),
        "not_equals" => Predicate::NotEquals(value.to_lowercase()),
        "less_than" => Predicate::LessThan(
            Interval::parse(&value).map_err(|reason| TriageError::invalid_rules(&location, reason))?,
        ),
        "greater_than" => Predicate::GreaterThan(
            Interval::parse(&value).map_err(|reason| TriageError::invalid_rules(&location, reason))?,
        ),
        other => {
            warn!(
                location = %location,
                predicate = other,
                "Unknown predicate; this clause will never match"
            );
            Predicate::Unsupported {
                name: other.to_string(),
            }
        }
    };

    if predicate.is_date() && field != Field::Date {
        return Err(TriageError::invalid_rules(
            &location,
            format!(
                "'{}' compares dates and can only be used on the 'date' field, not '{}'",
                predicate.name(),
                field.name()
            ),
        ));
    }

    if let Predicate::LessThan(Interval::Unsupported { unit, .. })
    | Predicate::GreaterThan(Interval::Unsupported { unit, .. }) = &predicate
    {
        warn!(
            location = %location,
            unit = %unit,
            "Unsupported interval unit; this clause will never match"
        );
    }

    Ok(RuleClause {
        name: raw.name,
        field,
        predicate,
    })
}

fn compile_action(index: usize, raw: RawAction) -> Result<Action> {
    let location = format!("actions[{index}]");
    match raw.name.as_str() {
        "mark_as_read" => Ok(Action::MarkAsRead),
        "mark_as_unread" => Ok(Action::MarkAsUnread),
        "move" => match raw.folder_name {
            Some(folder_name) if !folder_name.trim().is_empty() => Ok(Action::Move { folder_name }),
            _ => Err(TriageError::invalid_rules(
                location,
                "'move' requires a non-empty 'folder_name'",
            )),
        },
        other => Err(TriageError::invalid_rules(
            location,
            format!("unknown action '{other}' (expected mark_as_read, mark_as_unread or move)"),
        )),
    }
}
