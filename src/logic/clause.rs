//! Clauses: unordered sets of literals
//!
//! A clause is interpreted as the disjunction of its literals when used as a
//! rule, or as a conjunction of ground facts when representing evidence or a
//! state; the two uses are disambiguated by context. Set semantics make two
//! clauses structurally equal iff they hold the same literals, independent of
//! the order they were written in.

use std::collections::BTreeSet;
use std::fmt;

use serde::{Deserialize, Serialize};

use super::literal::Literal;
use super::term::Term;
use super::Substitution;

/// A clause: an unordered set of literals.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Clause {
    literals: BTreeSet<Literal>,
}

impl Clause {
    /// Build a clause from any collection of literals; duplicates collapse.
    pub fn new(literals: impl IntoIterator<Item = Literal>) -> Self {
        Clause {
            literals: literals.into_iter().collect(),
        }
    }

    /// The empty clause (contradiction when read as a disjunction).
    pub fn empty() -> Self {
        Clause {
            literals: BTreeSet::new(),
        }
    }

    /// A unit clause holding a single literal.
    pub fn unit(literal: Literal) -> Self {
        Clause::new([literal])
    }

    pub fn is_empty(&self) -> bool {
        self.literals.is_empty()
    }

    pub fn len(&self) -> usize {
        self.literals.len()
    }

    pub fn is_unit(&self) -> bool {
        self.literals.len() == 1
    }

    pub fn contains(&self, literal: &Literal) -> bool {
        self.literals.contains(literal)
    }

    pub fn literals(&self) -> impl Iterator<Item = &Literal> {
        self.literals.iter()
    }

    /// Check if this clause contains no variables.
    pub fn is_ground(&self) -> bool {
        self.literals.iter().all(|l| l.is_ground())
    }

    /// Names of all variables occurring in this clause, in sorted order.
    pub fn variables(&self) -> BTreeSet<String> {
        let mut vars = BTreeSet::new();
        for lit in &self.literals {
            vars.extend(lit.variables());
        }
        vars
    }

    /// All constants occurring in this clause.
    pub fn constants(&self) -> BTreeSet<Term> {
        let mut consts = BTreeSet::new();
        for lit in &self.literals {
            consts.extend(lit.constants());
        }
        consts
    }

    /// Names of all predicates occurring in this clause.
    pub fn predicates(&self) -> BTreeSet<&str> {
        self.literals.iter().map(|l| l.predicate.as_str()).collect()
    }

    /// Negate every literal. Flipping the signs of a disjunction yields the
    /// conjunction checked by the matching oracle when searching for
    /// violations.
    pub fn flip_signs(&self) -> Clause {
        Clause::new(self.literals.iter().map(|l| l.negated()))
    }

    /// Apply a substitution to every literal.
    pub fn apply(&self, subst: &Substitution) -> Clause {
        Clause::new(self.literals.iter().map(|l| l.apply(subst)))
    }

    /// Keep only the literals satisfying the predicate.
    pub fn retain_literals(&self, keep: impl Fn(&Literal) -> bool) -> Clause {
        Clause::new(self.literals.iter().filter(|l| keep(l)).cloned())
    }
}

impl FromIterator<Literal> for Clause {
    fn from_iter<I: IntoIterator<Item = Literal>>(iter: I) -> Self {
        Clause::new(iter)
    }
}

impl fmt::Display for Clause {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.literals.is_empty() {
            return write!(f, "$false");
        }
        for (i, lit) in self.literals.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{}", lit)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn p(name: &str, arg: &str) -> Literal {
        Literal::positive(name, vec![Term::from_name(arg)])
    }

    #[test]
    fn test_set_semantics_equality() {
        let a = Clause::new([p("p", "a"), p("q", "b")]);
        let b = Clause::new([p("q", "b"), p("p", "a")]);
        assert_eq!(a, b);
        let c = Clause::new([p("p", "a"), p("p", "a")]);
        assert_eq!(c.len(), 1);
    }

    #[test]
    fn test_empty_clause() {
        let e = Clause::empty();
        assert!(e.is_empty());
        assert!(e.is_ground());
        assert_eq!(e.to_string(), "$false");
    }

    #[test]
    fn test_flip_signs() {
        let c = Clause::new([p("p", "a"), Literal::negative("q", vec![Term::constant("b")])]);
        let flipped = c.flip_signs();
        assert!(flipped.contains(&Literal::negative("p", vec![Term::constant("a")])));
        assert!(flipped.contains(&p("q", "b")));
        assert_eq!(flipped.flip_signs(), c);
    }

    #[test]
    fn test_variables_and_constants() {
        let c = Clause::new([p("p", "X"), p("q", "a"), p("r", "Y")]);
        let vars = c.variables();
        assert_eq!(vars.len(), 2);
        assert!(vars.contains("X"));
        assert!(vars.contains("Y"));
        assert!(c.constants().contains(&Term::constant("a")));
        assert!(!c.is_ground());
    }

    #[test]
    fn test_apply_grounds_clause() {
        let c = Clause::new([p("p", "X"), Literal::negative("q", vec![Term::variable("X")])]);
        let mut subst = Substitution::new();
        subst.insert("X".to_string(), Term::constant("a"));
        let ground = c.apply(&subst);
        assert!(ground.is_ground());
        assert_eq!(ground.len(), 2);
    }

    #[test]
    fn test_retain_literals() {
        let c = Clause::new([p("p", "a"), p("@alldiff", "a")]);
        let kept = c.retain_literals(|l| l.structural().is_none());
        assert_eq!(kept.len(), 1);
        assert!(kept.contains(&p("p", "a")));
    }
}
