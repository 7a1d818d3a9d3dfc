//! Substitution search against a ground state
//!
//! The violation detector works by negating a rule and asking: under which
//! bindings of its variables does every literal of the negation hold in the
//! current candidate state? This module answers that question, either
//! exhaustively or with a bounded randomized search when the grounding space
//! is too large to sweep.
//!
//! The query clause is read as a *conjunction*. Positive literals are matched
//! against the atoms present in the state (they drive variable binding),
//! negated literals hold when their atom is absent (closed world), and the
//! reserved structural predicates are evaluated directly on ground terms.

use std::collections::{BTreeSet, HashMap};

use rand::seq::SliceRandom;
use rand::{Rng, RngCore};

use crate::logic::{Clause, GroundState, Literal, Substitution, Term};

/// How variable bindings relate to the ground terms they range over.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SubsumptionMode {
    /// Plain theta-subsumption: distinct variables may share a value.
    #[default]
    Theta,
    /// Object identity: distinct variables must bind distinct constants.
    ObjectIdentity,
}

/// Result of a substitution search: the variable order the tuples are keyed
/// by, the binding tuples themselves, and an estimate of how much of the
/// search space was covered (always `1.0` for exact search).
#[derive(Debug, Clone)]
pub struct SubstitutionSet {
    pub variables: Vec<String>,
    pub tuples: Vec<Vec<Term>>,
    pub coverage: f64,
}

impl SubstitutionSet {
    /// Rebuild the substitution maps from the tuple representation.
    pub fn substitutions(&self) -> impl Iterator<Item = Substitution> + '_ {
        self.tuples.iter().map(move |tuple| {
            self.variables
                .iter()
                .cloned()
                .zip(tuple.iter().cloned())
                .collect()
        })
    }

    pub fn is_empty(&self) -> bool {
        self.tuples.is_empty()
    }
}

/// A matching session over one candidate state and one constant universe.
/// The atom index is built once per session and shared by every query.
pub struct Matcher<'a> {
    state: &'a GroundState,
    domain: Vec<Term>,
    mode: SubsumptionMode,
    index: HashMap<(&'a str, usize), Vec<&'a Literal>>,
}

impl<'a> Matcher<'a> {
    pub fn new(state: &'a GroundState, domain: Vec<Term>, mode: SubsumptionMode) -> Self {
        let mut index: HashMap<(&str, usize), Vec<&Literal>> = HashMap::new();
        for lit in state.iter().filter(|l| l.is_positive()) {
            index.entry(lit.signature()).or_default().push(lit);
        }
        Matcher {
            state,
            domain,
            mode,
            index,
        }
    }

    /// Exhaustively enumerate substitutions under which every literal of
    /// `query` holds, stopping after `limit` tuples.
    pub fn all_substitutions(&self, query: &Clause, limit: usize) -> SubstitutionSet {
        let mut search = Search::new(self, query, limit, None);
        search.run();
        search.into_result()
    }

    /// Randomized bounded search: explores at most `level_step` branches per
    /// choice point and stops after `budget` completed descents. Coverage is
    /// the estimated fraction of the space visited; `1.0` means the search
    /// happened to be exhaustive and no violation was missed.
    pub fn sample_substitutions<R: Rng>(
        &self,
        query: &Clause,
        budget: usize,
        level_step: usize,
        rng: &mut R,
    ) -> SubstitutionSet {
        let mut search =
            Search::new(self, query, budget, Some((level_step.max(1), rng as &mut dyn RngCore)));
        search.run();
        search.into_result()
    }

    /// Existential test: does any substitution make `query` hold?
    pub fn matches(&self, query: &Clause) -> bool {
        !self.all_substitutions(query, 1).is_empty()
    }

    /// Evaluate one ground literal against the state.
    fn holds_ground(&self, lit: &Literal) -> bool {
        if let Some(truth) = lit.eval_structural_ground() {
            return truth;
        }
        let present = self.state.contains(&lit.atom());
        present != lit.negated
    }
}

/// One backtracking descent, exact or randomized. Positive non-reserved
/// literals are matched first against indexed state atoms; any variables left
/// over afterwards (those occurring only under negation or in structural
/// literals) range over the constant universe.
struct Search<'m, 'a, 'r> {
    matcher: &'m Matcher<'a>,
    positives: Vec<&'m Literal>,
    residual: Vec<&'m Literal>,
    variables: Vec<String>,
    limit: usize,
    sampling: Option<(usize, &'r mut dyn RngCore)>,
    subst: Substitution,
    found: BTreeSet<Vec<Term>>,
    truncated: bool,
    coverage: f64,
    path_fraction: f64,
    coverage_sum: f64,
}

impl<'m, 'a, 'r> Search<'m, 'a, 'r> {
    fn new(
        matcher: &'m Matcher<'a>,
        query: &'m Clause,
        limit: usize,
        sampling: Option<(usize, &'r mut dyn RngCore)>,
    ) -> Search<'m, 'a, 'r> {
        let mut positives = Vec::new();
        let mut residual = Vec::new();
        for lit in query.literals() {
            if lit.is_positive() && lit.structural().is_none() && lit.meta().is_none() {
                positives.push(lit);
            } else {
                residual.push(lit);
            }
        }
        Search {
            matcher,
            positives,
            residual,
            variables: query.variables().into_iter().collect(),
            limit,
            sampling,
            subst: Substitution::new(),
            found: BTreeSet::new(),
            truncated: false,
            coverage: 1.0,
            path_fraction: 1.0,
            coverage_sum: 0.0,
        }
    }

    fn run(&mut self) {
        self.descend(0);
    }

    fn into_result(self) -> SubstitutionSet {
        let coverage = if !self.truncated {
            1.0
        } else if self.found.is_empty() {
            self.coverage
        } else {
            self.coverage_sum / self.found.len() as f64
        };
        SubstitutionSet {
            variables: self.variables,
            tuples: self.found.into_iter().collect(),
            coverage,
        }
    }

    fn descend(&mut self, depth: usize) -> bool {
        if self.found.len() >= self.limit {
            return false;
        }
        if depth < self.positives.len() {
            self.match_positive(depth)
        } else {
            self.bind_free_variables()
        }
    }

    /// Match `self.positives[depth]` against every compatible state atom.
    fn match_positive(&mut self, depth: usize) -> bool {
        let pattern = self.positives[depth];
        let candidates = self
            .matcher
            .index
            .get(&pattern.signature())
            .map(|v| v.as_slice())
            .unwrap_or(&[]);
        let mut order: Vec<usize> = (0..candidates.len()).collect();
        let fraction = self.subselect(&mut order);
        let saved_fraction = self.path_fraction;
        self.path_fraction *= fraction;
        for idx in order {
            let ground = candidates[idx];
            let Some(added) = self.try_match(pattern, ground) else {
                continue;
            };
            if self.residuals_consistent() && !self.descend(depth + 1) {
                self.unbind(&added);
                self.path_fraction = saved_fraction;
                return false;
            }
            self.unbind(&added);
        }
        self.path_fraction = saved_fraction;
        true
    }

    /// Bind every still-free variable to a constant from the universe, then
    /// verify the residual literals and record the tuple.
    fn bind_free_variables(&mut self) -> bool {
        let free: Vec<String> = self
            .variables
            .iter()
            .filter(|v| !self.subst.contains_key(*v))
            .cloned()
            .collect();
        self.enumerate_free(&free, 0)
    }

    fn enumerate_free(&mut self, free: &[String], pos: usize) -> bool {
        if self.found.len() >= self.limit {
            return false;
        }
        if pos == free.len() {
            if self.residuals_hold() {
                let tuple: Vec<Term> = self
                    .variables
                    .iter()
                    .map(|v| self.subst[v].clone())
                    .collect();
                if self.found.insert(tuple) {
                    self.coverage_sum += self.path_fraction;
                }
            }
            return true;
        }
        let var = free[pos].clone();
        let mut order: Vec<usize> = (0..self.matcher.domain.len()).collect();
        let fraction = self.subselect(&mut order);
        let saved_fraction = self.path_fraction;
        self.path_fraction *= fraction;
        for idx in order {
            let value = self.matcher.domain[idx].clone();
            if self.matcher.mode == SubsumptionMode::ObjectIdentity
                && self.subst.values().any(|bound| *bound == value)
            {
                continue;
            }
            self.subst.insert(var.clone(), value);
            if self.residuals_consistent() && !self.enumerate_free(free, pos + 1) {
                self.subst.remove(&var);
                self.path_fraction = saved_fraction;
                return false;
            }
            self.subst.remove(&var);
        }
        self.path_fraction = saved_fraction;
        true
    }

    /// Truncate a choice list to the sampling step, returning the fraction
    /// kept. Exact search keeps everything.
    fn subselect(&mut self, order: &mut Vec<usize>) -> f64 {
        let Some((step, rng)) = self.sampling.as_mut() else {
            return 1.0;
        };
        if order.len() <= *step {
            return 1.0;
        }
        let fraction = *step as f64 / order.len() as f64;
        order.shuffle(rng);
        order.truncate(*step);
        self.truncated = true;
        self.coverage = self.coverage.min(fraction);
        fraction
    }

    /// Unify a pattern literal with a ground state atom, inserting the new
    /// bindings. Returns the variables bound by this step, or `None` on
    /// mismatch (in which case no bindings were kept).
    fn try_match(&mut self, pattern: &Literal, ground: &Literal) -> Option<Vec<String>> {
        let mut added = Vec::new();
        for (p, g) in pattern.args.iter().zip(ground.args.iter()) {
            if !self.match_term(p, g, &mut added) {
                self.unbind(&added);
                return None;
            }
        }
        Some(added)
    }

    fn match_term(&mut self, pattern: &Term, ground: &Term, added: &mut Vec<String>) -> bool {
        match pattern {
            Term::Constant(_) => pattern == ground,
            Term::Variable(v) => {
                if let Some(bound) = self.subst.get(v.as_str()) {
                    return bound == ground;
                }
                if self.matcher.mode == SubsumptionMode::ObjectIdentity
                    && self.subst.values().any(|bound| bound == ground)
                {
                    return false;
                }
                self.subst.insert(v.clone(), ground.clone());
                added.push(v.clone());
                true
            }
            Term::App(name, args) => match ground {
                Term::App(g_name, g_args) if name == g_name && args.len() == g_args.len() => args
                    .iter()
                    .zip(g_args.iter())
                    .all(|(p, g)| self.match_term(p, g, added)),
                _ => false,
            },
        }
    }

    fn unbind(&mut self, added: &[String]) {
        for v in added {
            self.subst.remove(v);
        }
    }

    /// Prune as soon as any residual literal is ground and false.
    fn residuals_consistent(&self) -> bool {
        self.residual.iter().all(|lit| {
            let applied = lit.apply(&self.subst);
            !applied.is_ground() || self.matcher.holds_ground(&applied)
        })
    }

    /// Final check: every residual literal must be ground and true.
    fn residuals_hold(&self) -> bool {
        self.residual.iter().all(|lit| {
            let applied = lit.apply(&self.subst);
            applied.is_ground() && self.matcher.holds_ground(&applied)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::logic::parse_clause;

    fn state_of(atoms: &[&str]) -> GroundState {
        atoms
            .iter()
            .map(|s| crate::logic::parse_literal(s).unwrap())
            .collect()
    }

    fn consts(names: &[&str]) -> Vec<Term> {
        names.iter().map(|n| Term::constant(*n)).collect()
    }

    #[test]
    fn test_positive_literal_binds_from_state() {
        let state = state_of(&["bond(a,b)", "bond(b,c)"]);
        let m = Matcher::new(&state, consts(&["a", "b", "c"]), SubsumptionMode::Theta);
        let q = parse_clause("bond(X,Y)").unwrap();
        let found = m.all_substitutions(&q, usize::MAX);
        assert_eq!(found.variables, vec!["X".to_string(), "Y".to_string()]);
        assert_eq!(found.tuples.len(), 2);
        assert!((found.coverage - 1.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_negated_literal_is_closed_world() {
        let state = state_of(&["p(a)"]);
        let m = Matcher::new(&state, consts(&["a", "b"]), SubsumptionMode::Theta);
        let q = parse_clause("!p(X)").unwrap();
        let found = m.all_substitutions(&q, usize::MAX);
        assert_eq!(found.tuples, vec![vec![Term::constant("b")]]);
    }

    #[test]
    fn test_conjunction_joins_bindings() {
        let state = state_of(&["bond(a,b)", "bond(b,a)", "bond(b,c)"]);
        let m = Matcher::new(&state, consts(&["a", "b", "c"]), SubsumptionMode::Theta);
        // where does a bond go only one way?
        let q = parse_clause("bond(X,Y), !bond(Y,X)").unwrap();
        let found = m.all_substitutions(&q, usize::MAX);
        assert_eq!(
            found.tuples,
            vec![vec![Term::constant("b"), Term::constant("c")]]
        );
    }

    #[test]
    fn test_structural_literals_prune() {
        let state = state_of(&["edge(a,a)", "edge(a,b)"]);
        let m = Matcher::new(&state, consts(&["a", "b"]), SubsumptionMode::Theta);
        let q = parse_clause("edge(X,Y), @alldiff(X,Y)").unwrap();
        let found = m.all_substitutions(&q, usize::MAX);
        assert_eq!(
            found.tuples,
            vec![vec![Term::constant("a"), Term::constant("b")]]
        );
    }

    #[test]
    fn test_object_identity_forbids_shared_values() {
        let state = state_of(&["edge(a,a)", "edge(a,b)"]);
        let m = Matcher::new(&state, consts(&["a", "b"]), SubsumptionMode::ObjectIdentity);
        let q = parse_clause("edge(X,Y)").unwrap();
        let found = m.all_substitutions(&q, usize::MAX);
        assert_eq!(
            found.tuples,
            vec![vec![Term::constant("a"), Term::constant("b")]]
        );
    }

    #[test]
    fn test_free_variables_range_over_domain() {
        let state = state_of(&[]);
        let m = Matcher::new(&state, consts(&["a", "b"]), SubsumptionMode::Theta);
        let q = parse_clause("@true(X)").unwrap();
        let found = m.all_substitutions(&q, usize::MAX);
        assert_eq!(found.tuples.len(), 2);
    }

    #[test]
    fn test_limit_stops_enumeration() {
        let state = state_of(&[]);
        let m = Matcher::new(&state, consts(&["a", "b", "c"]), SubsumptionMode::Theta);
        let q = parse_clause("@true(X,Y)").unwrap();
        let found = m.all_substitutions(&q, 4);
        assert_eq!(found.tuples.len(), 4);
    }

    #[test]
    fn test_matches_existential() {
        let state = state_of(&["p(a)"]);
        let m = Matcher::new(&state, consts(&["a"]), SubsumptionMode::Theta);
        assert!(m.matches(&parse_clause("p(X)").unwrap()));
        assert!(!m.matches(&parse_clause("q(X)").unwrap()));
    }

    #[test]
    fn test_sampler_finds_subset_and_reports_coverage() {
        use rand::rngs::StdRng;
        use rand::SeedableRng;

        let state = state_of(&[]);
        let domain: Vec<Term> = (0..20).map(|i| Term::constant(format!("c{i}"))).collect();
        let m = Matcher::new(&state, domain, SubsumptionMode::Theta);
        let q = parse_clause("@true(X,Y)").unwrap();
        let mut rng = StdRng::seed_from_u64(7);
        let found = m.sample_substitutions(&q, 16, 4, &mut rng);
        assert!(!found.is_empty());
        assert!(found.tuples.len() <= 16);
        assert!(found.coverage <= 1.0 && found.coverage > 0.0);

        // a tiny space is swept completely even when sampling
        let m2 = Matcher::new(&state, consts(&["a", "b"]), SubsumptionMode::Theta);
        let exact = m2.sample_substitutions(&q, 100, 10, &mut rng);
        assert_eq!(exact.tuples.len(), 4);
        assert!((exact.coverage - 1.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_ground_query_yields_empty_tuple() {
        let state = state_of(&["p(a)"]);
        let m = Matcher::new(&state, consts(&["a"]), SubsumptionMode::Theta);
        let found = m.all_substitutions(&parse_clause("p(a)").unwrap(), usize::MAX);
        assert_eq!(found.tuples, vec![Vec::<Term>::new()]);
        let none = m.all_substitutions(&parse_clause("p(b)").unwrap(), usize::MAX);
        assert!(none.is_empty());
    }
}
