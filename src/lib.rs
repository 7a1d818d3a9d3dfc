//! lazyground - lazy-grounding first-order theory solver
//!
//! Answers satisfiability queries over first-order clausal theories with a
//! finite constant universe by reduction to ground boolean solving. Rather
//! than instantiating every rule over every constant combination, the solver
//! lazily grounds only the rule instances a candidate model violates and
//! iterates to a fixpoint (cutting planes).
//!
//! # Architecture
//!
//! - [`logic`] - terms, literals, clauses and their text syntax
//! - [`matching`] - substitution search against a ground state (exact and
//!   randomized bounded sampling)
//! - [`solver::TheorySolver`] - the cutting-planes controller
//! - [`solver::GroundSolver`] - compiles ground clauses, cardinality and
//!   parity constraints for the boolean engine; doubles as the default
//!   pluggable backend
//! - [`sat`] - the DPLL-style boolean constraint engine
//!
//! # Example
//!
//! ```rust
//! use lazyground::{parse_clause, TheorySolver};
//!
//! let rules = vec![
//!     parse_clause("bond(id1,id2)").unwrap(),
//!     parse_clause("!bond(X,Y), bond(Y,X)").unwrap(),
//! ];
//!
//! let model = TheorySolver::new().solve_rules(&rules).unwrap().unwrap();
//! assert!(model.contains(&lazyground::parse_literal("bond(id2,id1)").unwrap()));
//! ```

pub mod error;
pub mod logic;
pub mod matching;
pub mod sat;
pub mod solver;

pub use error::{SolverError, SolverResult};
pub use logic::{
    parse_clause, parse_literal, Clause, GroundState, Literal, MetaPredicate,
    StructuralPredicate, Substitution, Term,
};
pub use matching::{Matcher, SubsumptionMode};
pub use solver::{
    GroundBackend, GroundSolver, GroundingMode, RestartSchedule, SatBackend, SolverConfig,
    TheorySolver,
};
