//! Runtime predicates for conditional dependencies and conditional passes
//!
//! Conditions are plain data evaluated against named boolean flags, so a
//! dependency can be printed, compared and exported to the graph dump.

use std::collections::HashMap;
use std::fmt;

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum Condition {
    #[default]
    Always,
    /// True when the flag is set. Unknown flags read as false.
    Flag(String),
    Not(String),
    All(Vec<Condition>),
    Any(Vec<Condition>),
}

impl Condition {
    pub fn flag(name: impl Into<String>) -> Self {
        Condition::Flag(name.into())
    }

    pub fn not(name: impl Into<String>) -> Self {
        Condition::Not(name.into())
    }

    pub fn evaluate(&self, ctx: &ConditionContext) -> bool {
        match self {
            Condition::Always => true,
            Condition::Flag(name) => ctx.get(name),
            Condition::Not(name) => !ctx.get(name),
            Condition::All(all) => all.iter().all(|c| c.evaluate(ctx)),
            Condition::Any(any) => any.iter().any(|c| c.evaluate(ctx)),
        }
    }

    pub fn is_always(&self) -> bool {
        matches!(self, Condition::Always)
    }
}

fn write_list(f: &mut fmt::Formatter<'_>, list: &[Condition], sep: &str) -> fmt::Result {
    write!(f, "(")?;
    for (i, c) in list.iter().enumerate() {
        if i > 0 {
            write!(f, " {} ", sep)?;
        }
        write!(f, "{}", c)?;
    }
    write!(f, ")")
}

impl fmt::Display for Condition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Condition::Always => write!(f, "always"),
            Condition::Flag(name) => write!(f, "{}", name),
            Condition::Not(name) => write!(f, "!{}", name),
            Condition::All(all) => write_list(f, all, "&&"),
            Condition::Any(any) => write_list(f, any, "||"),
        }
    }
}

/// Named flags conditions read from
#[derive(Debug, Clone, Default)]
pub struct ConditionContext {
    flags: HashMap<String, bool>,
}

impl ConditionContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&mut self, name: impl Into<String>, value: bool) {
        self.flags.insert(name.into(), value);
    }

    pub fn get(&self, name: &str) -> bool {
        self.flags.get(name).copied().unwrap_or(false)
    }

    pub fn remove(&mut self, name: &str) {
        self.flags.remove(name);
    }
}
