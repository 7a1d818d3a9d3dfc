//! First-order clausal logic: terms, literals, clauses and their text syntax.

pub mod clause;
pub mod literal;
pub mod parse;
pub mod term;

use std::collections::{BTreeSet, HashMap};

pub use clause::Clause;
pub use literal::{term_to_literal, Literal, MetaPredicate, StructuralPredicate};
pub use parse::{parse_clause, parse_literal};
pub use term::Term;

/// A binding of variable names to terms.
pub type Substitution = HashMap<String, Term>;

/// A candidate model: the set of ground literals held true. Everything not in
/// the set is false (closed world). Stored sorted so iteration order, and
/// therefore solver behaviour, is deterministic.
pub type GroundState = BTreeSet<Literal>;
