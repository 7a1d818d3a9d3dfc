//! Lazy-grounding theory solver
//!
//! The controller reduces first-order satisfiability over a finite constant
//! universe to ground boolean solving. Instead of instantiating every rule
//! over every constant combination up front, it solves the currently active
//! ground rules, asks the matcher which full rules the candidate model still
//! violates, grounds exactly those instances, and iterates to a fixpoint
//! (the cutting-planes scheme). Evidence and a deterministic fact oracle
//! constrain the search; reserved structural predicates are evaluated during
//! filtering and never reach the boolean backend.

pub mod ground;

use std::collections::{BTreeSet, HashSet};

use rand::rngs::StdRng;
use rand::SeedableRng;

use crate::error::SolverResult;
use crate::logic::{Clause, GroundState, Literal, MetaPredicate, Term};
use crate::matching::{Matcher, SubsumptionMode};

pub use ground::GroundSolver;

/// How rules are turned into ground instances.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum GroundingMode {
    /// Lazily ground only violated instances.
    #[default]
    CuttingPlanes,
    /// Instantiate every rule over the constant universe up front.
    GroundAll,
}

/// Iteration threshold after which the active rule set is reset, as a
/// function of how many restarts already happened.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RestartSchedule {
    /// Never restart.
    #[default]
    Never,
    /// Restart every `n` iterations. The threshold must leave room to reach
    /// a fixpoint between restarts; a growing schedule always does.
    Constant(usize),
    /// Threshold `base * factor^restart`.
    Geometric { base: usize, factor: usize },
}

impl RestartSchedule {
    fn threshold(&self, restart: usize) -> usize {
        match *self {
            RestartSchedule::Never => usize::MAX,
            RestartSchedule::Constant(n) => n,
            RestartSchedule::Geometric { base, factor } => {
                let restart = u32::try_from(restart).unwrap_or(u32::MAX);
                factor
                    .checked_pow(restart)
                    .and_then(|f| base.checked_mul(f))
                    .unwrap_or(usize::MAX)
            }
        }
    }
}

/// Solver configuration
#[derive(Debug, Clone)]
pub struct SolverConfig {
    /// Grounding strategy.
    pub mode: GroundingMode,
    /// How substitutions treat distinct variables.
    pub subsumption_mode: SubsumptionMode,
    /// Per-rule cap on violations gathered per iteration; `usize::MAX`
    /// means exact enumeration.
    pub active_rule_subsample: usize,
    /// Branch cap per level of the randomized sampler.
    pub subsample_level_step: usize,
    /// When to reset the active rule set.
    pub restart_schedule: RestartSchedule,
    /// Seed for the sampling RNG; random when absent.
    pub seed: Option<u64>,
    /// Verbose output
    pub verbose: bool,
}

impl Default for SolverConfig {
    fn default() -> Self {
        SolverConfig {
            mode: GroundingMode::CuttingPlanes,
            subsumption_mode: SubsumptionMode::Theta,
            active_rule_subsample: usize::MAX,
            subsample_level_step: 1,
            restart_schedule: RestartSchedule::Never,
            seed: None,
            verbose: false,
        }
    }
}

/// A pluggable ground boolean backend. `ground_atoms` widens the atom
/// universe models must be total over.
pub trait SatBackend {
    fn solve(&mut self, clauses: &[Clause]) -> SolverResult<Option<GroundState>>;

    fn solve_all(
        &mut self,
        clauses: &[Clause],
        ground_atoms: Option<&BTreeSet<Literal>>,
        max_count: usize,
    ) -> SolverResult<Vec<GroundState>>;
}

/// The default backend: a fresh ground compiler per query.
#[derive(Debug, Default)]
pub struct GroundBackend;

impl SatBackend for GroundBackend {
    fn solve(&mut self, clauses: &[Clause]) -> SolverResult<Option<GroundState>> {
        Ok(GroundSolver::new(clauses.to_vec())?.solve())
    }

    fn solve_all(
        &mut self,
        clauses: &[Clause],
        ground_atoms: Option<&BTreeSet<Literal>>,
        max_count: usize,
    ) -> SolverResult<Vec<GroundState>> {
        let mut solver = match ground_atoms {
            Some(atoms) => GroundSolver::with_ground_atoms(clauses.to_vec(), atoms.clone())?,
            None => GroundSolver::new(clauses.to_vec())?,
        };
        Ok(solver.solve_all(Some(max_count)))
    }
}

/// Progress of one cutting-planes run.
struct LoopState {
    iteration: usize,
    restart: usize,
    active: BTreeSet<Clause>,
}

impl LoopState {
    fn new(init: &BTreeSet<Clause>) -> Self {
        LoopState {
            iteration: 1,
            restart: 0,
            active: init.clone(),
        }
    }

    fn active_vec(&self) -> Vec<Clause> {
        self.active.iter().cloned().collect()
    }

    /// Reset the active set back to the initial rules when the schedule says
    /// so. Correctness is unaffected: real violations resurface against the
    /// next candidate state.
    fn maybe_restart(&mut self, schedule: &RestartSchedule, init: &BTreeSet<Clause>) {
        if self.iteration >= schedule.threshold(self.restart) {
            self.active = init.clone();
            self.iteration = 0;
            self.restart += 1;
        }
    }
}

/// The controller.
pub struct TheorySolver {
    config: SolverConfig,
    backend: Box<dyn SatBackend>,
    rng: StdRng,
}

impl TheorySolver {
    pub fn new() -> Self {
        Self::with_config(SolverConfig::default())
    }

    pub fn with_config(config: SolverConfig) -> Self {
        let rng = match config.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        TheorySolver {
            config,
            backend: Box::new(GroundBackend),
            rng,
        }
    }

    pub fn set_backend(&mut self, backend: Box<dyn SatBackend>) {
        self.backend = backend;
    }

    pub fn set_mode(&mut self, mode: GroundingMode) {
        self.config.mode = mode;
    }

    pub fn set_subsumption_mode(&mut self, mode: SubsumptionMode) {
        self.config.subsumption_mode = mode;
    }

    pub fn set_active_rule_subsampling(&mut self, num_samples: usize) {
        self.config.active_rule_subsample = num_samples;
    }

    pub fn set_subsampling_level_step(&mut self, level_step: usize) {
        self.config.subsample_level_step = level_step;
    }

    pub fn set_restart_schedule(&mut self, schedule: RestartSchedule) {
        self.config.restart_schedule = schedule;
    }

    /// Solve with no evidence and no deterministic facts.
    pub fn solve_rules(&mut self, rules: &[Clause]) -> SolverResult<Option<GroundState>> {
        self.solve(rules, &BTreeSet::new(), &BTreeSet::new())
    }

    /// Find one state satisfying every rule under the evidence and the
    /// deterministic oracle. `None` means unsatisfiable (including evidence
    /// contradicting the oracle). The returned state contains the
    /// deterministic facts.
    pub fn solve(
        &mut self,
        rules: &[Clause],
        evidence: &BTreeSet<Literal>,
        deterministic: &BTreeSet<Literal>,
    ) -> SolverResult<Option<GroundState>> {
        let mut session = Session::new(&self.config, &mut *self.backend, &mut self.rng, deterministic);

        let Some((mut state, mut init)) = session.ingest_evidence(evidence) else {
            return Ok(None);
        };
        state.extend(deterministic.iter().cloned());

        let (ground_rules, lifted) = partition_ground(rules);
        init.extend(ground_rules);
        let (meta_rules, lifted) = partition_meta(lifted);
        // The matcher cannot check constraint rules lazily, so their
        // instances are grounded up front in every mode. Evidence constants
        // reach the universe through the unit rules in `init`.
        let universe_input: Vec<Clause> = rules.iter().chain(init.iter()).cloned().collect();
        let universe = constant_universe(&universe_input, &state, None);
        if !meta_rules.is_empty() {
            init.extend(session.ground_all(&meta_rules, &state, universe.clone()));
        }
        if session.config.mode == GroundingMode::GroundAll {
            init.extend(session.ground_all(&lifted, &state, universe));
        }
        let init = session.filter_rules(init);
        let check_rules: Vec<Clause> = lifted.iter().chain(init.iter()).cloned().collect();

        let mut run = LoopState::new(&init);
        loop {
            if session.config.verbose {
                eprintln!(
                    "active rules: {}, iteration: {}",
                    run.active.len(),
                    run.iteration
                );
            }
            let Some(mut candidate) = session.backend.solve(&run.active_vec())? else {
                return Ok(None);
            };
            candidate.extend(deterministic.iter().cloned());

            let found = session.find_violated(&check_rules, &candidate, false);
            let violated = session.filter_rules(found);
            run.iteration += 1;

            if violated.is_empty() {
                session.recheck_exact(&lifted, &candidate);
                return Ok(Some(candidate));
            }
            run.active.extend(violated);
            run.maybe_restart(&session.config.restart_schedule, &init);
        }
    }

    /// Enumerate up to `max_returned` distinct models, trying at most
    /// `max_tried` candidates per backend batch. Batch sizes double
    /// geometrically from 1.
    pub fn solve_all(
        &mut self,
        rules: &[Clause],
        evidence: &BTreeSet<Literal>,
        deterministic: &BTreeSet<Literal>,
        ground_atoms: Option<&BTreeSet<Literal>>,
        max_returned: usize,
        max_tried: usize,
    ) -> SolverResult<Vec<GroundState>> {
        let mut session = Session::new(&self.config, &mut *self.backend, &mut self.rng, deterministic);

        let Some((mut state, mut init)) = session.ingest_evidence(evidence) else {
            return Ok(Vec::new());
        };
        state.extend(deterministic.iter().cloned());

        if rules.iter().any(|r| r.is_empty()) {
            return Ok(Vec::new());
        }
        let (ground_rules, lifted) = partition_ground(rules);
        init.extend(ground_rules);
        let (meta_rules, lifted) = partition_meta(lifted);
        let universe_input: Vec<Clause> = rules.iter().chain(init.iter()).cloned().collect();
        let universe = constant_universe(&universe_input, &state, ground_atoms);
        if !meta_rules.is_empty() {
            init.extend(session.ground_all(&meta_rules, &state, universe.clone()));
        }
        let init = session.filter_rules(init);
        let check_rules: Vec<Clause> = lifted.iter().chain(init.iter()).cloned().collect();

        if session.config.mode == GroundingMode::GroundAll {
            let mut active = init;
            active.extend(session.ground_all(&lifted, &state, universe));
            let active = session.filter_rules(active);
            let active_vec: Vec<Clause> = active.into_iter().collect();
            return session.backend.solve_all(&active_vec, ground_atoms, max_returned);
        }

        let mut active = init.clone();
        let mut accepted: BTreeSet<GroundState> = BTreeSet::new();
        let mut mc = 1usize;
        loop {
            mc = (2 * mc).min(max_tried);
            let mut iteration = 1usize;
            loop {
                if session.config.verbose {
                    eprintln!("active rules: {}, iteration: {}", active.len(), iteration);
                }
                let active_vec: Vec<Clause> = active.iter().cloned().collect();
                let candidates = session.backend.solve_all(&active_vec, ground_atoms, mc)?;
                if candidates.is_empty() {
                    return Ok(Vec::new());
                }

                let mut num_violated = 0;
                for candidate in candidates {
                    let mut merged = candidate;
                    merged.extend(deterministic.iter().cloned());
                    let found = session.find_violated(&check_rules, &merged, false);
                    let violated = session.filter_rules(found);
                    if violated.is_empty() {
                        accepted.insert(merged);
                    } else {
                        num_violated += violated.len();
                        active.extend(violated);
                    }
                }
                iteration += 1;

                if num_violated == 0 || accepted.len() >= max_returned {
                    for model in &accepted {
                        session.recheck_exact(&lifted, model);
                    }
                    break;
                }
            }
            // A batch already as large as the try budget cannot grow further.
            if mc >= max_tried || mc >= max_returned || accepted.len() < mc {
                break;
            }
        }
        Ok(accepted.into_iter().take(max_returned).collect())
    }

    /// Every currently broken ground instance of `rules` against `state`,
    /// exact or sampled per the configuration.
    pub fn find_violated_rules(&mut self, rules: &[Clause], state: &GroundState) -> Vec<Clause> {
        let empty = BTreeSet::new();
        let mut session = Session::new(&self.config, &mut *self.backend, &mut self.rng, &empty);
        session.find_violated(rules, state, false)
    }

    /// Ground every rule over the constants of the evidence, the
    /// deterministic oracle and `ground_atoms`, via per-rule stubs.
    pub fn ground_all(
        &mut self,
        rules: &[Clause],
        evidence: &BTreeSet<Literal>,
        deterministic: &BTreeSet<Literal>,
        ground_atoms: &BTreeSet<Literal>,
    ) -> Vec<Clause> {
        let mut session = Session::new(&self.config, &mut *self.backend, &mut self.rng, deterministic);
        let mut matching_state: GroundState = evidence
            .iter()
            .filter(|l| l.is_positive())
            .cloned()
            .collect();
        matching_state.extend(deterministic.iter().cloned());
        let universe = constant_universe(rules, &matching_state, Some(ground_atoms));
        session.ground_all(rules, &matching_state, universe)
    }
}

impl Default for TheorySolver {
    fn default() -> Self {
        Self::new()
    }
}

fn partition_ground(rules: &[Clause]) -> (Vec<Clause>, Vec<Clause>) {
    let mut ground = Vec::new();
    let mut lifted = Vec::new();
    for rule in rules {
        if rule.is_ground() {
            ground.push(rule.clone());
        } else {
            lifted.push(rule.clone());
        }
    }
    (ground, lifted)
}

fn partition_meta(rules: Vec<Clause>) -> (Vec<Clause>, Vec<Clause>) {
    rules
        .into_iter()
        .partition(|r| r.literals().any(|l| l.meta().is_some()))
}

/// Per-solve context: configuration snapshot, backend and RNG handles, and
/// the deterministic oracle with its predicate signatures.
struct Session<'a> {
    config: SolverConfig,
    backend: &'a mut dyn SatBackend,
    rng: &'a mut StdRng,
    deterministic: &'a BTreeSet<Literal>,
    det_signatures: HashSet<(String, usize)>,
}

impl<'a> Session<'a> {
    fn new(
        config: &SolverConfig,
        backend: &'a mut dyn SatBackend,
        rng: &'a mut StdRng,
        deterministic: &'a BTreeSet<Literal>,
    ) -> Self {
        let det_signatures = deterministic
            .iter()
            .map(|l| (l.predicate.clone(), l.arity()))
            .collect();
        Session {
            config: config.clone(),
            backend,
            rng,
            deterministic,
            det_signatures,
        }
    }

    fn is_deterministic(&self, lit: &Literal) -> bool {
        self.det_signatures
            .contains(&(lit.predicate.clone(), lit.arity()))
    }

    /// Does the oracle satisfy this (signed, deterministic-predicate)
    /// literal? Positive literals need the fact present; negated ones need
    /// the atom absent.
    fn oracle_satisfies(&self, lit: &Literal) -> bool {
        if lit.negated {
            !self.deterministic.contains(&lit.atom())
        } else {
            self.deterministic.contains(lit)
        }
    }

    /// Split evidence into the positive fixed state and unit rules. `None`
    /// when a deterministic-predicate evidence literal contradicts the
    /// oracle.
    fn ingest_evidence(
        &self,
        evidence: &BTreeSet<Literal>,
    ) -> Option<(GroundState, BTreeSet<Clause>)> {
        let mut state = GroundState::new();
        let mut init = BTreeSet::new();
        for e in evidence {
            if self.is_deterministic(e) {
                if !self.oracle_satisfies(e) {
                    return None;
                }
            } else {
                if e.is_positive() {
                    state.insert(e.clone());
                }
                init.insert(Clause::unit(e.clone()));
            }
        }
        Some((state, init))
    }

    /// Drop clauses already true courtesy of a structural literal, the
    /// oracle, or a complementary literal pair, and strip
    /// structural/deterministic literals from the rest.
    fn filter_rules(&self, rules: impl IntoIterator<Item = Clause>) -> BTreeSet<Clause> {
        rules
            .into_iter()
            .filter_map(|c| self.filter_clause(c))
            .collect()
    }

    fn filter_clause(&self, clause: Clause) -> Option<Clause> {
        let vacuous = clause.literals().any(|l| {
            l.eval_structural_ground() == Some(true)
                || (self.is_deterministic(l) && self.oracle_satisfies(l))
                || clause.contains(&l.negated())
        });
        if vacuous {
            return None;
        }
        Some(clause.retain_literals(|l| l.structural().is_none() && !self.is_deterministic(l)))
    }

    /// Ground instances of `rules` whose negation holds in `state`. With
    /// `exact` set the sampling cap is ignored.
    fn find_violated(&mut self, rules: &[Clause], state: &GroundState, exact: bool) -> Vec<Clause> {
        let domain = constant_universe(rules, state, None);
        let matcher = Matcher::new(state, domain, self.config.subsumption_mode);
        let cap = if exact {
            usize::MAX
        } else {
            self.config.active_rule_subsample
        };

        let mut violated = Vec::new();
        for rule in rules {
            // Constraint rules are grounded up front and enforced natively
            // by the ground backend; the matcher cannot decide them.
            if rule.literals().any(|l| l.meta().is_some()) {
                continue;
            }
            let query = rule.flip_signs();
            let found = matcher.all_substitutions(&query, cap);
            if cap == usize::MAX || found.tuples.len() < cap {
                for subst in found.substitutions() {
                    violated.push(rule.apply(&subst));
                }
            } else {
                let sampled = matcher.sample_substitutions(
                    &query,
                    cap,
                    self.config.subsample_level_step,
                    self.rng,
                );
                // The capped search proved violations exist, so an unlucky
                // empty sample must not look like convergence.
                let picked = if sampled.is_empty() { found } else { sampled };
                for subst in picked.substitutions() {
                    violated.push(rule.apply(&subst));
                }
            }
        }
        violated
    }

    /// Post-convergence sanity pass: with sampling disabled, no violation
    /// may remain. A residual violation means the grounding or filtering
    /// logic lost an instance, which is a defect worth failing loudly over.
    fn recheck_exact(&mut self, rules: &[Clause], state: &GroundState) {
        if self.config.active_rule_subsample == usize::MAX {
            return;
        }
        let residual = self.find_violated(rules, state, true);
        if !self
            .filter_rules(residual)
            .is_empty()
        {
            panic!("sampled grounding converged on a state that still violates rules");
        }
    }

    /// Instantiate every rule over `domain`. The stub keeps only the
    /// literals the matcher can decide up front (structural and
    /// deterministic ones) plus a `@true` marker forcing every rule variable
    /// to range over the universe.
    fn ground_all(
        &mut self,
        rules: &[Clause],
        matching_state: &GroundState,
        domain: Vec<Term>,
    ) -> Vec<Clause> {
        let matcher = Matcher::new(matching_state, domain, self.config.subsumption_mode);

        let mut grounded = Vec::new();
        for rule in rules {
            let stub = rule_stub(rule, &self.det_signatures);
            let found = matcher.all_substitutions(&stub.flip_signs(), usize::MAX);
            for subst in found.substitutions() {
                grounded.push(rule.apply(&subst));
            }
        }
        grounded
    }
}

fn rule_stub(rule: &Clause, det_signatures: &HashSet<(String, usize)>) -> Clause {
    let mut literals: Vec<Literal> = rule
        .literals()
        .filter(|l| {
            l.structural().is_some()
                || det_signatures.contains(&(l.predicate.clone(), l.arity()))
        })
        .cloned()
        .collect();
    let vars: Vec<Term> = rule.variables().into_iter().map(Term::variable).collect();
    literals.push(Literal::negative("@true", vars));
    Clause::new(literals)
}

fn constant_universe(
    rules: &[Clause],
    state: &GroundState,
    ground_atoms: Option<&BTreeSet<Literal>>,
) -> Vec<Term> {
    let mut constants: BTreeSet<Term> = BTreeSet::new();
    for rule in rules {
        constants.extend(domain_constants(rule));
    }
    for lit in state.iter().chain(ground_atoms.into_iter().flatten()) {
        constants.extend(lit.constants());
    }
    constants.into_iter().collect()
}

/// Constants a rule's variables may range over. The numeric bound of a
/// cardinality literal names a count, not a domain individual.
fn domain_constants(clause: &Clause) -> BTreeSet<Term> {
    let mut found: HashSet<&Term> = HashSet::new();
    for lit in clause.literals() {
        let args = match lit.meta() {
            Some(MetaPredicate::AtLeast | MetaPredicate::AtMost) => {
                lit.args.get(1..).unwrap_or(&[])
            }
            _ => &lit.args[..],
        };
        for arg in args {
            arg.collect_constants(&mut found);
        }
    }
    found.into_iter().cloned().collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::logic::{parse_clause, parse_literal};

    fn clauses(inputs: &[&str]) -> Vec<Clause> {
        inputs.iter().map(|s| parse_clause(s).unwrap()).collect()
    }

    fn lits(inputs: &[&str]) -> BTreeSet<Literal> {
        inputs.iter().map(|s| parse_literal(s).unwrap()).collect()
    }

    #[test]
    fn test_symmetry_closure() {
        let rules = clauses(&["bond(id1,id2)", "e(id1,id2)", "!bond(X,Y), bond(Y,X)"]);
        let model = TheorySolver::new().solve_rules(&rules).unwrap().unwrap();
        assert!(model.contains(&parse_literal("bond(id1,id2)").unwrap()));
        assert!(model.contains(&parse_literal("bond(id2,id1)").unwrap()));
        assert!(model.contains(&parse_literal("e(id1,id2)").unwrap()));
    }

    #[test]
    fn test_unsatisfiable_theory() {
        let rules = clauses(&["p(a)", "!p(X)"]);
        assert!(TheorySolver::new().solve_rules(&rules).unwrap().is_none());
    }

    #[test]
    fn test_evidence_drives_rules() {
        let rules = clauses(&["!p(X), q(X)"]);
        let model = TheorySolver::new()
            .solve(&rules, &lits(&["p(a)"]), &BTreeSet::new())
            .unwrap()
            .unwrap();
        assert!(model.contains(&parse_literal("p(a)").unwrap()));
        assert!(model.contains(&parse_literal("q(a)").unwrap()));
    }

    #[test]
    fn test_negative_evidence_blocks_atom() {
        let rules = clauses(&["p(a), q(a)"]);
        let model = TheorySolver::new()
            .solve(&rules, &lits(&["!q(a)"]), &BTreeSet::new())
            .unwrap()
            .unwrap();
        assert!(model.contains(&parse_literal("p(a)").unwrap()));
        assert!(!model.contains(&parse_literal("q(a)").unwrap()));
    }

    #[test]
    fn test_evidence_contradicting_oracle() {
        let det = lits(&["d(a)"]);
        let mut solver = TheorySolver::new();
        // Denying a deterministic fact.
        assert!(solver.solve(&[], &lits(&["!d(a)"]), &det).unwrap().is_none());
        // Asserting a deterministic atom the oracle does not hold.
        assert!(solver.solve(&[], &lits(&["d(b)"]), &det).unwrap().is_none());
        // Consistent evidence passes.
        assert!(solver.solve(&[], &lits(&["d(a)"]), &det).unwrap().is_some());
    }

    #[test]
    fn test_deterministic_facts_fire_rules() {
        let rules = clauses(&["!d(X), p(X)"]);
        let det = lits(&["d(a)"]);
        let model = TheorySolver::new()
            .solve(&rules, &BTreeSet::new(), &det)
            .unwrap()
            .unwrap();
        assert!(model.contains(&parse_literal("d(a)").unwrap()));
        assert!(model.contains(&parse_literal("p(a)").unwrap()));
    }

    #[test]
    fn test_rules_satisfied_by_oracle_are_dropped() {
        // d(a) holds deterministically, so the disjunct is already true and
        // p(a) must stay open.
        let rules = clauses(&["d(a), p(a)"]);
        let det = lits(&["d(a)"]);
        let model = TheorySolver::new()
            .solve(&rules, &BTreeSet::new(), &det)
            .unwrap()
            .unwrap();
        assert!(!model.contains(&parse_literal("p(a)").unwrap()));
    }

    #[test]
    fn test_alldiff_guard() {
        // Symmetry only between distinct constants.
        let rules = clauses(&["bond(id1,id1)", "!bond(X,Y), !@alldiff(X,Y), bond(Y,X)"]);
        let model = TheorySolver::new().solve_rules(&rules).unwrap().unwrap();
        assert!(model.contains(&parse_literal("bond(id1,id1)").unwrap()));
        assert_eq!(model.len(), 1);
    }

    #[test]
    fn test_cardinality_rule() {
        let rules = clauses(&["@atleast(2, a, b, c)", "!a"]);
        let model = TheorySolver::new().solve_rules(&rules).unwrap().unwrap();
        assert!(model.len() >= 2);
        assert!(!model.contains(&parse_literal("a").unwrap()));
    }

    #[test]
    fn test_lifted_cardinality_rule_is_enforced() {
        // A variable in a constraint rule ranges over the constant universe;
        // here @atmost(0, p(X)) instantiates to @atmost(0, p(a)).
        let rules = clauses(&["p(a)", "@atmost(0, p(X))"]);
        assert!(TheorySolver::new().solve_rules(&rules).unwrap().is_none());
    }

    #[test]
    fn test_lifted_cardinality_rule_is_enforced_when_grounding_all() {
        let mut config = SolverConfig::default();
        config.mode = GroundingMode::GroundAll;
        let rules = clauses(&["p(a)", "@atmost(0, p(X))"]);
        assert!(TheorySolver::with_config(config)
            .solve_rules(&rules)
            .unwrap()
            .is_none());
    }

    #[test]
    fn test_lifted_at_least_rule_instantiates_per_constant() {
        let rules = clauses(&["e(id1)", "e(id2)", "@atleast(1, p(X), q(X))"]);
        let model = TheorySolver::new().solve_rules(&rules).unwrap().unwrap();
        for c in ["id1", "id2"] {
            let p = parse_literal(&format!("p({c})")).unwrap();
            let q = parse_literal(&format!("q({c})")).unwrap();
            assert!(model.contains(&p) || model.contains(&q));
        }
    }

    #[test]
    fn test_lifted_xor_rule_is_enforced() {
        let rules = clauses(&["e(id1)", "@xor(p(X), q(X))"]);
        let model = TheorySolver::new().solve_rules(&rules).unwrap().unwrap();
        let p = parse_literal("p(id1)").unwrap();
        let q = parse_literal("q(id1)").unwrap();
        assert_ne!(model.contains(&p), model.contains(&q));
    }

    #[test]
    fn test_solve_all_enforces_lifted_cardinality() {
        let rules = clauses(&["p(a), q(a)", "@atmost(1, p(X), q(X))"]);
        let mut solver = TheorySolver::new();
        let models = solver
            .solve_all(&rules, &BTreeSet::new(), &BTreeSet::new(), None, 10, 10)
            .unwrap();
        assert_eq!(models.len(), 2);
        for model in models {
            assert_eq!(model.len(), 1);
        }
    }

    #[test]
    fn test_parity_rule() {
        let rules = clauses(&["@xor(a, b)", "a"]);
        let model = TheorySolver::new().solve_rules(&rules).unwrap().unwrap();
        assert!(model.contains(&parse_literal("a").unwrap()));
        assert!(!model.contains(&parse_literal("b").unwrap()));
    }

    #[test]
    fn test_solve_all_enumerates_distinct_models() {
        let rules = clauses(&["p(a), q(a)"]);
        let mut solver = TheorySolver::new();
        let models = solver
            .solve_all(&rules, &BTreeSet::new(), &BTreeSet::new(), None, 10, 10)
            .unwrap();
        assert_eq!(models.len(), 3);
        let distinct: BTreeSet<&GroundState> = models.iter().collect();
        assert_eq!(distinct.len(), models.len());
    }

    #[test]
    fn test_solve_all_respects_max_returned() {
        let rules = clauses(&["p(a), q(a)"]);
        let mut solver = TheorySolver::new();
        let models = solver
            .solve_all(&rules, &BTreeSet::new(), &BTreeSet::new(), None, 2, 10)
            .unwrap();
        assert_eq!(models.len(), 2);
    }

    #[test]
    fn test_solve_all_validates_lifted_rules() {
        let rules = clauses(&["bond(id1,id2)", "!bond(X,Y), bond(Y,X)"]);
        let mut solver = TheorySolver::new();
        let ground_atoms = lits(&["bond(id1,id2)", "bond(id2,id1)"]);
        let models = solver
            .solve_all(
                &rules,
                &BTreeSet::new(),
                &BTreeSet::new(),
                Some(&ground_atoms),
                10,
                10,
            )
            .unwrap();
        assert!(!models.is_empty());
        for model in models {
            assert!(model.contains(&parse_literal("bond(id2,id1)").unwrap()));
        }
    }

    #[test]
    fn test_solve_all_empty_clause_has_no_models() {
        let rules = vec![Clause::empty()];
        let mut solver = TheorySolver::new();
        let models = solver
            .solve_all(&rules, &BTreeSet::new(), &BTreeSet::new(), None, 10, 10)
            .unwrap();
        assert!(models.is_empty());
    }

    #[test]
    fn test_restart_schedule_preserves_soundness() {
        let mut config = SolverConfig::default();
        config.restart_schedule = RestartSchedule::Geometric { base: 2, factor: 2 };
        let rules = clauses(&[
            "bond(id1,id2)",
            "!bond(X,Y), bond(Y,X)",
            "!bond(X,Y), linked(X,Y)",
        ]);
        let model = TheorySolver::with_config(config)
            .solve_rules(&rules)
            .unwrap()
            .unwrap();
        assert!(model.contains(&parse_literal("bond(id2,id1)").unwrap()));
        assert!(model.contains(&parse_literal("linked(id2,id1)").unwrap()));
    }

    #[test]
    fn test_solve_all_model_set_invariant_under_restarts() {
        let rules = clauses(&["bond(id1,id2)", "!bond(X,Y), bond(Y,X)"]);
        let atoms = lits(&["bond(id1,id2)", "bond(id2,id1)"]);
        let baseline: BTreeSet<GroundState> = TheorySolver::new()
            .solve_all(&rules, &BTreeSet::new(), &BTreeSet::new(), Some(&atoms), 10, 10)
            .unwrap()
            .into_iter()
            .collect();
        let mut config = SolverConfig::default();
        config.restart_schedule = RestartSchedule::Geometric { base: 2, factor: 2 };
        let restarted: BTreeSet<GroundState> = TheorySolver::with_config(config)
            .solve_all(&rules, &BTreeSet::new(), &BTreeSet::new(), Some(&atoms), 10, 10)
            .unwrap()
            .into_iter()
            .collect();
        assert_eq!(baseline, restarted);
    }

    #[test]
    fn test_sampled_grounding_converges() {
        let config = SolverConfig {
            active_rule_subsample: 2,
            subsample_level_step: 1,
            seed: Some(42),
            ..SolverConfig::default()
        };
        let rules = clauses(&[
            "bond(id1,id2)",
            "bond(id2,id3)",
            "!bond(X,Y), bond(Y,X)",
        ]);
        let model = TheorySolver::with_config(config)
            .solve_rules(&rules)
            .unwrap()
            .unwrap();
        assert!(model.contains(&parse_literal("bond(id2,id1)").unwrap()));
        assert!(model.contains(&parse_literal("bond(id3,id2)").unwrap()));
    }

    #[test]
    fn test_ground_all_mode_matches_lazy_mode() {
        let rules = clauses(&["bond(id1,id2)", "!bond(X,Y), bond(Y,X)"]);
        let mut config = SolverConfig::default();
        config.mode = GroundingMode::GroundAll;
        let eager = TheorySolver::with_config(config)
            .solve_rules(&rules)
            .unwrap()
            .unwrap();
        let lazy = TheorySolver::new().solve_rules(&rules).unwrap().unwrap();
        assert_eq!(eager, lazy);
    }

    #[test]
    fn test_find_violated_rules() {
        let rules = clauses(&["!bond(X,Y), bond(Y,X)"]);
        let state: GroundState = lits(&["bond(id1,id2)"]);
        let mut solver = TheorySolver::new();
        let violated = solver.find_violated_rules(&rules, &state);
        assert_eq!(violated, clauses(&["!bond(id1,id2), bond(id2,id1)"]));
    }

    #[test]
    fn test_find_violated_rules_none_when_satisfied() {
        let rules = clauses(&["!bond(X,Y), bond(Y,X)"]);
        let state: GroundState = lits(&["bond(id1,id2)", "bond(id2,id1)"]);
        let mut solver = TheorySolver::new();
        assert!(solver.find_violated_rules(&rules, &state).is_empty());
    }

    #[test]
    fn test_ground_all_instantiates_over_universe() {
        let rules = clauses(&["!p(X), q(X)"]);
        let mut solver = TheorySolver::new();
        let grounded = solver.ground_all(
            &rules,
            &lits(&["p(a)", "p(b)"]),
            &BTreeSet::new(),
            &BTreeSet::new(),
        );
        let grounded: BTreeSet<Clause> = grounded.into_iter().collect();
        assert_eq!(
            grounded,
            clauses(&["!p(a), q(a)", "!p(b), q(b)"]).into_iter().collect()
        );
    }

    #[test]
    fn test_object_identity_subsumption() {
        // Under object identity the rule only fires for distinct constants.
        let mut config = SolverConfig::default();
        config.subsumption_mode = SubsumptionMode::ObjectIdentity;
        let rules = clauses(&["bond(id1,id1)", "!bond(X,Y), sym(X,Y)"]);
        let model = TheorySolver::with_config(config)
            .solve_rules(&rules)
            .unwrap()
            .unwrap();
        assert!(!model.contains(&parse_literal("sym(id1,id1)").unwrap()));
    }

    #[test]
    fn test_custom_backend_is_used() {
        struct CountingBackend {
            inner: GroundBackend,
            calls: std::rc::Rc<std::cell::Cell<usize>>,
        }
        impl SatBackend for CountingBackend {
            fn solve(&mut self, clauses: &[Clause]) -> SolverResult<Option<GroundState>> {
                self.calls.set(self.calls.get() + 1);
                self.inner.solve(clauses)
            }
            fn solve_all(
                &mut self,
                clauses: &[Clause],
                ground_atoms: Option<&BTreeSet<Literal>>,
                max_count: usize,
            ) -> SolverResult<Vec<GroundState>> {
                self.calls.set(self.calls.get() + 1);
                self.inner.solve_all(clauses, ground_atoms, max_count)
            }
        }

        let calls = std::rc::Rc::new(std::cell::Cell::new(0));
        let mut solver = TheorySolver::new();
        solver.set_backend(Box::new(CountingBackend {
            inner: GroundBackend,
            calls: calls.clone(),
        }));
        solver.solve_rules(&clauses(&["p(a)"])).unwrap().unwrap();
        assert!(calls.get() > 0);
    }
}
