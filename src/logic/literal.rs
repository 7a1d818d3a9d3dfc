//! Literals: signed atoms, plus the reserved predicate vocabulary
//!
//! Two groups of reserved names exist. *Structural* predicates (`@alldiff`,
//! `@neq`, `@true`) are evaluated directly on ground terms and are stripped
//! before anything reaches the boolean backend. *Meta* predicates
//! (`@atleast`, `@atmost`, `@xor`) are compiled into native constraints by
//! the ground solver and must appear alone in their clause. Both are
//! classified once into enums here rather than re-compared as strings at
//! every use site.

use std::collections::{BTreeSet, HashSet};
use std::fmt;

use serde::{Deserialize, Serialize};

use super::term::Term;
use super::Substitution;

/// Reserved predicates evaluated structurally on ground terms.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StructuralPredicate {
    /// `@alldiff(t1,...,tn)`: all terms pairwise distinct.
    AllDiff,
    /// `@neq(s,t)`: the two terms differ.
    Neq,
    /// `@true(v1,...,vn)`: vararg marker, always true; used by rule stubs
    /// purely to enumerate variable bindings.
    True,
}

impl StructuralPredicate {
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "@alldiff" => Some(StructuralPredicate::AllDiff),
            "@neq" => Some(StructuralPredicate::Neq),
            "@true" => Some(StructuralPredicate::True),
            _ => None,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            StructuralPredicate::AllDiff => "@alldiff",
            StructuralPredicate::Neq => "@neq",
            StructuralPredicate::True => "@true",
        }
    }
}

/// Reserved predicates compiled into native ground-solver constraints.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MetaPredicate {
    /// `@atleast(k,l1,...,ln)`
    AtLeast,
    /// `@atmost(k,l1,...,ln)`
    AtMost,
    /// `@xor(l1,...,ln)`
    Xor,
}

impl MetaPredicate {
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "@atleast" => Some(MetaPredicate::AtLeast),
            "@atmost" => Some(MetaPredicate::AtMost),
            "@xor" => Some(MetaPredicate::Xor),
            _ => None,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            MetaPredicate::AtLeast => "@atleast",
            MetaPredicate::AtMost => "@atmost",
            MetaPredicate::Xor => "@xor",
        }
    }
}

/// A literal is a possibly negated predicate application.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Literal {
    /// Predicate name.
    pub predicate: String,
    /// Ordered argument tuple.
    pub args: Vec<Term>,
    /// Whether this literal is negated.
    pub negated: bool,
}

impl Literal {
    pub fn new(predicate: impl Into<String>, args: Vec<Term>, negated: bool) -> Self {
        Literal {
            predicate: predicate.into(),
            args,
            negated,
        }
    }

    /// Create a positive literal.
    pub fn positive(predicate: impl Into<String>, args: Vec<Term>) -> Self {
        Literal::new(predicate, args, false)
    }

    /// Create a negative literal.
    pub fn negative(predicate: impl Into<String>, args: Vec<Term>) -> Self {
        Literal::new(predicate, args, true)
    }

    pub fn arity(&self) -> usize {
        self.args.len()
    }

    /// Predicate name and arity, the key deterministic predicates are
    /// declared under.
    pub fn signature(&self) -> (&str, usize) {
        (self.predicate.as_str(), self.args.len())
    }

    /// Return the negation of this literal. Negation is a pure structural
    /// operation producing a flipped copy; literals are never mutated in place.
    pub fn negated(&self) -> Literal {
        Literal {
            predicate: self.predicate.clone(),
            args: self.args.clone(),
            negated: !self.negated,
        }
    }

    /// The positive literal over the same atom.
    pub fn atom(&self) -> Literal {
        Literal {
            predicate: self.predicate.clone(),
            args: self.args.clone(),
            negated: false,
        }
    }

    pub fn is_positive(&self) -> bool {
        !self.negated
    }

    /// Check if this literal contains no variables.
    pub fn is_ground(&self) -> bool {
        self.args.iter().all(|a| a.is_ground())
    }

    /// Names of all variables occurring in this literal, in sorted order.
    pub fn variables(&self) -> BTreeSet<String> {
        let mut set = HashSet::new();
        for arg in &self.args {
            arg.collect_variables(&mut set);
        }
        set.into_iter().map(|v| v.to_string()).collect()
    }

    /// All constants occurring in this literal.
    pub fn constants(&self) -> BTreeSet<Term> {
        let mut set = HashSet::new();
        for arg in &self.args {
            arg.collect_constants(&mut set);
        }
        set.into_iter().cloned().collect()
    }

    /// Apply a substitution, replacing bound variables by their values.
    pub fn apply(&self, subst: &Substitution) -> Literal {
        Literal {
            predicate: self.predicate.clone(),
            args: self.args.iter().map(|a| apply_term(a, subst)).collect(),
            negated: self.negated,
        }
    }

    /// Classify this literal's predicate as structural, if reserved.
    pub fn structural(&self) -> Option<StructuralPredicate> {
        StructuralPredicate::from_name(&self.predicate)
    }

    /// Classify this literal's predicate as a meta constraint, if reserved.
    pub fn meta(&self) -> Option<MetaPredicate> {
        MetaPredicate::from_name(&self.predicate)
    }

    /// Evaluate a ground structural literal, honoring the sign.
    /// Returns `None` for non-structural predicates and for literals that
    /// still contain variables.
    pub fn eval_structural_ground(&self) -> Option<bool> {
        if !self.is_ground() {
            return None;
        }
        let truth = match self.structural()? {
            StructuralPredicate::True => true,
            StructuralPredicate::Neq => self.args.len() == 2 && self.args[0] != self.args[1],
            StructuralPredicate::AllDiff => {
                let distinct: HashSet<&Term> = self.args.iter().collect();
                distinct.len() == self.args.len()
            }
        };
        Some(truth != self.negated)
    }
}

/// Convert a term into the atom literal it encodes: `a(x)` becomes the
/// positive literal `a(x)`, a bare constant becomes a 0-ary proposition.
/// Used when unpacking the arguments of meta literals.
pub fn term_to_literal(term: &Term) -> Option<Literal> {
    match term {
        Term::Constant(name) => Some(Literal::positive(name.clone(), vec![])),
        Term::App(name, args) => Some(Literal::positive(name.clone(), args.clone())),
        Term::Variable(_) => None,
    }
}

fn apply_term(term: &Term, subst: &Substitution) -> Term {
    match term {
        Term::Constant(_) => term.clone(),
        Term::Variable(v) => subst.get(v.as_str()).cloned().unwrap_or_else(|| term.clone()),
        Term::App(name, args) => Term::App(
            name.clone(),
            args.iter().map(|a| apply_term(a, subst)).collect(),
        ),
    }
}

impl fmt::Display for Literal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.negated {
            write!(f, "!")?;
        }
        if self.args.is_empty() {
            write!(f, "{}()", self.predicate)
        } else {
            write!(f, "{}(", self.predicate)?;
            for (i, arg) in self.args.iter().enumerate() {
                if i > 0 {
                    write!(f, ",")?;
                }
                write!(f, "{}", arg)?;
            }
            write!(f, ")")
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lit(s: &str, args: Vec<Term>) -> Literal {
        Literal::positive(s, args)
    }

    #[test]
    fn test_negation_is_a_flipped_copy() {
        let l = lit("p", vec![Term::constant("a")]);
        let n = l.negated();
        assert!(n.negated);
        assert!(!l.negated);
        assert_eq!(n.negated().clone(), l);
    }

    #[test]
    fn test_structural_classification() {
        assert_eq!(
            lit("@alldiff", vec![]).structural(),
            Some(StructuralPredicate::AllDiff)
        );
        assert_eq!(lit("@atleast", vec![]).meta(), Some(MetaPredicate::AtLeast));
        assert_eq!(lit("bond", vec![]).structural(), None);
        assert_eq!(lit("bond", vec![]).meta(), None);
    }

    #[test]
    fn test_alldiff_evaluation() {
        let distinct = lit(
            "@alldiff",
            vec![Term::constant("a"), Term::constant("b")],
        );
        assert_eq!(distinct.eval_structural_ground(), Some(true));

        let repeated = lit(
            "@alldiff",
            vec![Term::constant("a"), Term::constant("a")],
        );
        assert_eq!(repeated.eval_structural_ground(), Some(false));
        assert_eq!(repeated.negated().eval_structural_ground(), Some(true));
    }

    #[test]
    fn test_neq_and_true_evaluation() {
        let neq = lit("@neq", vec![Term::constant("a"), Term::constant("b")]);
        assert_eq!(neq.eval_structural_ground(), Some(true));
        let tr = lit("@true", vec![Term::constant("a")]);
        assert_eq!(tr.eval_structural_ground(), Some(true));
        assert_eq!(tr.negated().eval_structural_ground(), Some(false));
    }

    #[test]
    fn test_structural_eval_requires_ground() {
        let open = lit("@alldiff", vec![Term::variable("X"), Term::constant("a")]);
        assert_eq!(open.eval_structural_ground(), None);
    }

    #[test]
    fn test_apply_substitution() {
        let l = Literal::negative("p", vec![Term::variable("X"), Term::constant("a")]);
        let mut subst = Substitution::new();
        subst.insert("X".to_string(), Term::constant("b"));
        let applied = l.apply(&subst);
        assert_eq!(applied.args[0], Term::constant("b"));
        assert!(applied.negated);
        assert!(applied.is_ground());
    }

    #[test]
    fn test_term_to_literal() {
        let t = Term::app("a", vec![Term::constant("x")]);
        let l = term_to_literal(&t).unwrap();
        assert_eq!(l.predicate, "a");
        assert_eq!(l.args.len(), 1);
        assert!(term_to_literal(&Term::variable("X")).is_none());
    }

    #[test]
    fn test_display_round_trip_shape() {
        let l = Literal::negative("bond", vec![Term::constant("id1"), Term::variable("Y")]);
        assert_eq!(l.to_string(), "!bond(id1,Y)");
    }
}
