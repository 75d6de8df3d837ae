//! Rule engine: document loading, interval parsing and record evaluation.

pub mod document;
pub mod evaluate;
pub mod interval;

pub use document::{Action, Combinator, Field, Predicate, RuleClause, RuleDocument};
pub use evaluate::{evaluate, matches};
pub use interval::Interval;
