//! First-order terms
//!
//! A term is a domain constant, a universally quantified variable, or an
//! application. Rule bodies only ever contain constants and variables;
//! applications appear as the encoded atoms inside `@atleast`/`@atmost`/`@xor`
//! meta literals, e.g. the `a(x)` in `@atleast(2,a(x),b(x),c(x))`.

use std::collections::HashSet;
use std::fmt;

use serde::{Deserialize, Serialize};

/// A first-order term.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Term {
    /// A domain constant such as `id1` or `2`.
    Constant(String),
    /// A universally quantified variable, written with a leading uppercase letter.
    Variable(String),
    /// An application `f(t1,...,tn)`; used for atoms embedded in meta literals.
    App(String, Vec<Term>),
}

impl Term {
    /// Create a constant term.
    pub fn constant(name: impl Into<String>) -> Self {
        Term::Constant(name.into())
    }

    /// Create a variable term.
    pub fn variable(name: impl Into<String>) -> Self {
        Term::Variable(name.into())
    }

    /// Create an application term.
    pub fn app(name: impl Into<String>, args: Vec<Term>) -> Self {
        Term::App(name.into(), args)
    }

    /// Classify a bare name by the textual convention: a leading uppercase
    /// letter (or underscore) makes a variable, anything else a constant.
    pub fn from_name(name: &str) -> Self {
        let first = name.chars().next();
        match first {
            Some(c) if c.is_uppercase() || c == '_' => Term::Variable(name.to_string()),
            _ => Term::Constant(name.to_string()),
        }
    }

    /// The symbol at the root of this term.
    pub fn name(&self) -> &str {
        match self {
            Term::Constant(n) | Term::Variable(n) | Term::App(n, _) => n,
        }
    }

    pub fn is_variable(&self) -> bool {
        matches!(self, Term::Variable(_))
    }

    pub fn is_constant(&self) -> bool {
        matches!(self, Term::Constant(_))
    }

    /// Check if this term contains no variables.
    pub fn is_ground(&self) -> bool {
        match self {
            Term::Constant(_) => true,
            Term::Variable(_) => false,
            Term::App(_, args) => args.iter().all(|a| a.is_ground()),
        }
    }

    /// Collect the names of all variables occurring in this term.
    pub fn collect_variables<'a>(&'a self, out: &mut HashSet<&'a str>) {
        match self {
            Term::Constant(_) => {}
            Term::Variable(v) => {
                out.insert(v.as_str());
            }
            Term::App(_, args) => {
                for arg in args {
                    arg.collect_variables(out);
                }
            }
        }
    }

    /// Collect all constants occurring in this term.
    pub fn collect_constants<'a>(&'a self, out: &mut HashSet<&'a Term>) {
        match self {
            Term::Constant(_) => {
                out.insert(self);
            }
            Term::Variable(_) => {}
            Term::App(_, args) => {
                for arg in args {
                    arg.collect_constants(out);
                }
            }
        }
    }
}

impl fmt::Display for Term {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Term::Constant(n) | Term::Variable(n) => write!(f, "{}", n),
            Term::App(n, args) => {
                write!(f, "{}(", n)?;
                for (i, arg) in args.iter().enumerate() {
                    if i > 0 {
                        write!(f, ",")?;
                    }
                    write!(f, "{}", arg)?;
                }
                write!(f, ")")
            }
        }
    }
}
