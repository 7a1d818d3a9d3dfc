//! Boolean constraint engine
//!
//! A DPLL-style solver extended with two native constraint forms the clause
//! compiler emits alongside plain disjunctions: cardinality bounds
//! ("at least / at most k of these variables") and parity gates (a gate
//! variable equivalent to the xor of its inputs).
//!
//! Features:
//! - Unit propagation over clauses, cardinality bounds and parity gates
//! - Pure literal elimination (plain-clause problems only)
//! - Chronological backtracking
//! - Total models: every registered variable is assigned, so model
//!   enumeration via blocking clauses yields distinct candidate states
//! - Branch-and-bound weighted soft-clause minimization with a deadline

use std::collections::{HashMap, HashSet};
use std::time::Instant;

/// A propositional variable (positive integer)
pub type Var = u32;

/// A literal is a variable with a sign (positive or negative)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Lit {
    /// The variable (1-indexed)
    var: Var,
    /// True if positive, false if negated
    sign: bool,
}

impl Lit {
    pub fn new(var: Var, sign: bool) -> Self {
        Lit { var, sign }
    }

    pub fn positive(var: Var) -> Self {
        Lit { var, sign: true }
    }

    pub fn negative(var: Var) -> Self {
        Lit { var, sign: false }
    }

    pub fn var(&self) -> Var {
        self.var
    }

    pub fn sign(&self) -> bool {
        self.sign
    }

    pub fn negated(&self) -> Self {
        Lit { var: self.var, sign: !self.sign }
    }
}

impl std::fmt::Display for Lit {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.sign {
            write!(f, "{}", self.var)
        } else {
            write!(f, "-{}", self.var)
        }
    }
}

/// A clause is a disjunction of literals
#[derive(Debug, Clone)]
pub struct SatClause {
    pub literals: Vec<Lit>,
}

impl SatClause {
    pub fn new(literals: Vec<Lit>) -> Self {
        SatClause { literals }
    }

    pub fn is_empty(&self) -> bool {
        self.literals.is_empty()
    }
}

impl std::fmt::Display for SatClause {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let lits: Vec<String> = self.literals.iter().map(|l| l.to_string()).collect();
        write!(f, "({})", lits.join(" ∨ "))
    }
}

/// "At least `bound` of `lits` are true." At-most bounds are stored in this
/// form too, over the negated literals.
#[derive(Debug, Clone)]
struct AtLeast {
    lits: Vec<Lit>,
    bound: usize,
}

/// `gate` is true exactly when an odd number of `inputs` are true.
#[derive(Debug, Clone)]
struct XorGate {
    gate: Var,
    inputs: Vec<Var>,
}

/// Assignment of truth values to variables
#[derive(Debug, Clone, Default)]
pub struct Assignment {
    values: HashMap<Var, bool>,
}

impl Assignment {
    pub fn new() -> Self {
        Assignment { values: HashMap::new() }
    }

    pub fn assign(&mut self, var: Var, value: bool) {
        self.values.insert(var, value);
    }

    pub fn unassign(&mut self, var: Var) {
        self.values.remove(&var);
    }

    pub fn get(&self, var: Var) -> Option<bool> {
        self.values.get(&var).copied()
    }

    pub fn is_assigned(&self, var: Var) -> bool {
        self.values.contains_key(&var)
    }

    pub fn eval_literal(&self, lit: Lit) -> Option<bool> {
        self.get(lit.var()).map(|v| if lit.sign() { v } else { !v })
    }

    /// Variables assigned true, in increasing order.
    pub fn true_vars(&self) -> Vec<Var> {
        let mut result: Vec<Var> = self
            .values
            .iter()
            .filter(|(_, &b)| b)
            .map(|(&v, _)| v)
            .collect();
        result.sort_unstable();
        result
    }

    pub fn to_vec(&self) -> Vec<(Var, bool)> {
        let mut result: Vec<_> = self.values.iter().map(|(&v, &b)| (v, b)).collect();
        result.sort_by_key(|(v, _)| *v);
        result
    }
}

/// Result of boolean solving
#[derive(Debug, Clone)]
pub enum SatResult {
    /// Satisfiable with the given (total) assignment
    Sat(Assignment),
    /// Unsatisfiable
    Unsat,
    /// Unknown (resource limit reached)
    Unknown(String),
}

/// Engine configuration
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Maximum number of decisions
    pub max_decisions: usize,
    /// Use pure literal elimination
    pub pure_literal_elimination: bool,
    /// Verbose output
    pub verbose: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        EngineConfig {
            max_decisions: 1_000_000,
            pure_literal_elimination: true,
            verbose: false,
        }
    }
}

/// The constraint engine. Variables are registered up front so that models
/// are total over the intended universe even when a variable never occurs in
/// a constraint.
pub struct Engine {
    clauses: Vec<SatClause>,
    cards: Vec<AtLeast>,
    xors: Vec<XorGate>,
    /// Number of variables
    num_vars: Var,
    /// Current assignment
    assignment: Assignment,
    config: EngineConfig,
    /// Decision count
    decisions: usize,
    /// Propagation count
    propagations: usize,
}

impl Engine {
    pub fn new() -> Self {
        Self::with_config(EngineConfig::default())
    }

    pub fn with_config(config: EngineConfig) -> Self {
        Engine {
            clauses: Vec::new(),
            cards: Vec::new(),
            xors: Vec::new(),
            num_vars: 0,
            assignment: Assignment::new(),
            config,
            decisions: 0,
            propagations: 0,
        }
    }

    /// Make `var` part of the model universe.
    pub fn register_var(&mut self, var: Var) {
        if var > self.num_vars {
            self.num_vars = var;
        }
    }

    pub fn num_vars(&self) -> Var {
        self.num_vars
    }

    /// Add a clause to the engine
    pub fn add_clause(&mut self, clause: SatClause) {
        for lit in &clause.literals {
            self.register_var(lit.var());
        }
        self.clauses.push(clause);
    }

    /// Require at least `bound` of `vars` to be true.
    pub fn add_at_least(&mut self, vars: &[Var], bound: usize) {
        for &v in vars {
            self.register_var(v);
        }
        if bound > vars.len() {
            // Impossible bound, equivalent to the empty clause.
            self.clauses.push(SatClause::new(Vec::new()));
            return;
        }
        self.cards.push(AtLeast {
            lits: vars.iter().map(|&v| Lit::positive(v)).collect(),
            bound,
        });
    }

    /// Require at most `bound` of `vars` to be true.
    pub fn add_at_most(&mut self, vars: &[Var], bound: usize) {
        for &v in vars {
            self.register_var(v);
        }
        if bound >= vars.len() {
            return; // Vacuous.
        }
        self.cards.push(AtLeast {
            lits: vars.iter().map(|&v| Lit::negative(v)).collect(),
            bound: vars.len() - bound,
        });
    }

    /// Constrain `gate` to equal the parity of `inputs`.
    pub fn add_xor_gate(&mut self, gate: Var, inputs: &[Var]) {
        self.register_var(gate);
        for &v in inputs {
            self.register_var(v);
        }
        self.xors.push(XorGate {
            gate,
            inputs: inputs.to_vec(),
        });
    }

    /// Solve and return a total assignment over all registered variables.
    pub fn solve(&mut self) -> SatResult {
        self.assignment = Assignment::new();
        self.decisions = 0;
        self.propagations = 0;

        match self.dpll() {
            Some(true) => SatResult::Sat(self.assignment.clone()),
            Some(false) => SatResult::Unsat,
            None => SatResult::Unknown(format!(
                "Resource limit: {} decisions",
                self.decisions
            )),
        }
    }

    /// Enumerate up to `max_count` distinct total models via blocking
    /// clauses. The engine is restored to its incoming constraint set on
    /// return.
    pub fn solve_all(&mut self, max_count: usize) -> Vec<Assignment> {
        // Pure literal elimination fixes a polarity and would hide the
        // models with the opposite one.
        let saved_ple = self.config.pure_literal_elimination;
        self.config.pure_literal_elimination = false;
        let base_len = self.clauses.len();

        let mut models = Vec::new();
        while models.len() < max_count {
            let assignment = match self.solve() {
                SatResult::Sat(a) => a,
                _ => break,
            };
            let blocking = SatClause::new(
                assignment
                    .to_vec()
                    .into_iter()
                    .map(|(v, b)| Lit::new(v, !b))
                    .collect(),
            );
            models.push(assignment);
            if blocking.is_empty() {
                break; // Zero variables: the empty model is the only one.
            }
            self.clauses.push(blocking);
        }

        self.clauses.truncate(base_len);
        self.config.pure_literal_elimination = saved_ple;
        models
    }

    /// Find a total model of the hard constraints minimizing the summed
    /// weight of violated soft clauses. Returns `None` when the hard part is
    /// unsatisfiable or the deadline expires first.
    pub fn optimize(
        &mut self,
        soft: &[(SatClause, u64)],
        deadline: Option<Instant>,
    ) -> Option<(Assignment, u64)> {
        self.assignment = Assignment::new();
        self.decisions = 0;
        let mut best: Option<(Assignment, u64)> = None;
        if !self.branch_and_bound(soft, deadline, &mut best) {
            return None; // Deadline expired.
        }
        best
    }

    /// Core DPLL recursion. `Some(true)` leaves the satisfying assignment in
    /// place; on any other outcome every variable assigned in this frame has
    /// been rolled back.
    fn dpll(&mut self) -> Option<bool> {
        if self.decisions > self.config.max_decisions {
            return None;
        }

        let mut trail: Vec<Var> = Vec::new();

        if !self.propagate(&mut trail) {
            self.rollback(&trail);
            return Some(false);
        }

        if self.config.pure_literal_elimination && self.cards.is_empty() && self.xors.is_empty() {
            self.eliminate_pure_literals(&mut trail);
        }

        let var = match self.choose_variable() {
            Some(v) => v,
            None => {
                // Total assignment reached.
                if self.consistent_total() {
                    return Some(true);
                }
                self.rollback(&trail);
                return Some(false);
            }
        };

        self.decisions += 1;
        if self.config.verbose {
            eprintln!("Decision {}: trying {} = true", self.decisions, var);
        }

        for value in [true, false] {
            self.assignment.assign(var, value);
            match self.dpll() {
                Some(true) => return Some(true),
                Some(false) => self.assignment.unassign(var),
                None => {
                    self.assignment.unassign(var);
                    self.rollback(&trail);
                    return None;
                }
            }
        }

        self.rollback(&trail);
        Some(false)
    }

    fn rollback(&mut self, trail: &[Var]) {
        for &var in trail {
            self.assignment.unassign(var);
        }
    }

    fn assign_tracked(&mut self, var: Var, value: bool, trail: &mut Vec<Var>) {
        self.propagations += 1;
        self.assignment.assign(var, value);
        trail.push(var);
    }

    /// Fixpoint propagation over clauses, cardinality bounds and xor gates.
    /// Returns false on conflict; everything assigned here is recorded in
    /// `trail`.
    fn propagate(&mut self, trail: &mut Vec<Var>) -> bool {
        loop {
            let mut changed = false;

            for i in 0..self.clauses.len() {
                match self.propagate_clause(i) {
                    ClauseState::Conflict => return false,
                    ClauseState::Forced(lit) => {
                        if self.config.verbose {
                            eprintln!("Unit propagation: {} = {}", lit.var(), lit.sign());
                        }
                        self.assign_tracked(lit.var(), lit.sign(), trail);
                        changed = true;
                    }
                    ClauseState::Open => {}
                }
            }

            for i in 0..self.cards.len() {
                match self.propagate_card(i, trail) {
                    Some(true) => changed = true,
                    Some(false) => {}
                    None => return false,
                }
            }

            for i in 0..self.xors.len() {
                match self.propagate_xor(i, trail) {
                    Some(true) => changed = true,
                    Some(false) => {}
                    None => return false,
                }
            }

            if !changed {
                return true;
            }
        }
    }

    fn propagate_clause(&self, idx: usize) -> ClauseState {
        let clause = &self.clauses[idx];
        let mut unassigned = None;
        let mut unassigned_count = 0;
        for &lit in &clause.literals {
            match self.assignment.eval_literal(lit) {
                Some(true) => return ClauseState::Open, // Satisfied.
                Some(false) => {}
                None => {
                    unassigned = Some(lit);
                    unassigned_count += 1;
                }
            }
        }
        match (unassigned, unassigned_count) {
            (None, _) => ClauseState::Conflict,
            (Some(lit), 1) => ClauseState::Forced(lit),
            _ => ClauseState::Open,
        }
    }

    /// `Some(true)` propagated something, `Some(false)` nothing to do,
    /// `None` conflict.
    fn propagate_card(&mut self, idx: usize, trail: &mut Vec<Var>) -> Option<bool> {
        let (sat, open): (usize, Vec<Lit>) = {
            let card = &self.cards[idx];
            let mut sat = 0;
            let mut open = Vec::new();
            for &lit in &card.lits {
                match self.assignment.eval_literal(lit) {
                    Some(true) => sat += 1,
                    Some(false) => {}
                    None => open.push(lit),
                }
            }
            (sat, open)
        };
        let bound = self.cards[idx].bound;
        if sat >= bound {
            return Some(false);
        }
        if sat + open.len() < bound {
            return None;
        }
        if sat + open.len() == bound {
            // Every open literal is needed.
            for lit in open {
                self.assign_tracked(lit.var(), lit.sign(), trail);
            }
            return Some(true);
        }
        Some(false)
    }

    fn propagate_xor(&mut self, idx: usize, trail: &mut Vec<Var>) -> Option<bool> {
        let (gate, inputs) = {
            let x = &self.xors[idx];
            (x.gate, x.inputs.clone())
        };
        let mut parity = false;
        let mut open: Vec<Var> = Vec::new();
        for &v in &inputs {
            match self.assignment.get(v) {
                Some(true) => parity = !parity,
                Some(false) => {}
                None => open.push(v),
            }
        }
        match (self.assignment.get(gate), open.len()) {
            (Some(g), 0) => {
                if g == parity {
                    Some(false)
                } else {
                    None // Parity mismatch.
                }
            }
            (None, 0) => {
                self.assign_tracked(gate, parity, trail);
                Some(true)
            }
            (Some(g), 1) => {
                // The last open input must complete the parity.
                self.assign_tracked(open[0], g != parity, trail);
                Some(true)
            }
            _ => Some(false),
        }
    }

    /// Pure literal elimination
    fn eliminate_pure_literals(&mut self, trail: &mut Vec<Var>) {
        let mut positive: HashSet<Var> = HashSet::new();
        let mut negative: HashSet<Var> = HashSet::new();

        for clause in &self.clauses {
            if self.is_clause_satisfied(clause) {
                continue;
            }
            for lit in &clause.literals {
                if self.assignment.is_assigned(lit.var()) {
                    continue;
                }
                if lit.sign() {
                    positive.insert(lit.var());
                } else {
                    negative.insert(lit.var());
                }
            }
        }

        // Pure literals appear only positive or only negative
        for var in 1..=self.num_vars {
            if self.assignment.is_assigned(var) {
                continue;
            }
            let is_positive = positive.contains(&var);
            let is_negative = negative.contains(&var);
            if is_positive && !is_negative {
                if self.config.verbose {
                    eprintln!("Pure literal: {} = true", var);
                }
                self.assignment.assign(var, true);
                trail.push(var);
            } else if is_negative && !is_positive {
                if self.config.verbose {
                    eprintln!("Pure literal: {} = false", var);
                }
                self.assignment.assign(var, false);
                trail.push(var);
            }
        }
    }

    /// Choose next variable to branch on (DLIS-like heuristic over
    /// unsatisfied clauses, then the first unassigned variable).
    fn choose_variable(&self) -> Option<Var> {
        let mut counts: HashMap<Var, usize> = HashMap::new();

        for clause in &self.clauses {
            if self.is_clause_satisfied(clause) {
                continue;
            }
            for lit in &clause.literals {
                if !self.assignment.is_assigned(lit.var()) {
                    *counts.entry(lit.var()).or_insert(0) += 1;
                }
            }
        }

        if let Some(var) = counts.into_iter().max_by_key(|(_, c)| *c).map(|(v, _)| v) {
            return Some(var);
        }
        (1..=self.num_vars).find(|&v| !self.assignment.is_assigned(v))
    }

    fn is_clause_satisfied(&self, clause: &SatClause) -> bool {
        clause
            .literals
            .iter()
            .any(|l| self.assignment.eval_literal(*l) == Some(true))
    }

    /// Verify a total assignment against every constraint.
    fn consistent_total(&self) -> bool {
        if !self.clauses.iter().all(|c| self.is_clause_satisfied(c)) {
            return false;
        }
        for card in &self.cards {
            let sat = card
                .lits
                .iter()
                .filter(|&&l| self.assignment.eval_literal(l) == Some(true))
                .count();
            if sat < card.bound {
                return false;
            }
        }
        for xor in &self.xors {
            let parity = xor
                .inputs
                .iter()
                .filter(|&&v| self.assignment.get(v) == Some(true))
                .count()
                % 2
                == 1;
            if self.assignment.get(xor.gate) != Some(parity) {
                return false;
            }
        }
        true
    }

    /// Conflict check usable on partial assignments: only reports constraints
    /// that can no longer be satisfied.
    fn partial_conflict(&self) -> bool {
        for clause in &self.clauses {
            if clause
                .literals
                .iter()
                .all(|&l| self.assignment.eval_literal(l) == Some(false))
            {
                return true;
            }
        }
        for card in &self.cards {
            let mut sat = 0;
            let mut open = 0;
            for &lit in &card.lits {
                match self.assignment.eval_literal(lit) {
                    Some(true) => sat += 1,
                    Some(false) => {}
                    None => open += 1,
                }
            }
            if sat + open < card.bound {
                return true;
            }
        }
        for xor in &self.xors {
            let mut parity = false;
            let mut open = 0;
            for &v in &xor.inputs {
                match self.assignment.get(v) {
                    Some(true) => parity = !parity,
                    Some(false) => {}
                    None => open += 1,
                }
            }
            if open == 0 {
                match self.assignment.get(xor.gate) {
                    Some(g) if g != parity => return true,
                    _ => {}
                }
            }
        }
        false
    }

    /// Weight of soft clauses already fully falsified; a lower bound on the
    /// final cost of any extension.
    fn falsified_weight(&self, soft: &[(SatClause, u64)]) -> u64 {
        soft.iter()
            .filter(|(clause, _)| {
                clause
                    .literals
                    .iter()
                    .all(|&l| self.assignment.eval_literal(l) == Some(false))
            })
            .map(|(_, w)| *w)
            .sum()
    }

    fn branch_and_bound(
        &mut self,
        soft: &[(SatClause, u64)],
        deadline: Option<Instant>,
        best: &mut Option<(Assignment, u64)>,
    ) -> bool {
        if let Some(d) = deadline {
            if Instant::now() >= d {
                return false;
            }
        }
        if self.partial_conflict() {
            return true;
        }
        let lower = self.falsified_weight(soft);
        if let Some((_, cost)) = best {
            if lower >= *cost {
                return true;
            }
        }

        let var = (1..=self.num_vars).find(|&v| !self.assignment.is_assigned(v));
        let Some(var) = var else {
            // Total; partial_conflict found nothing, but cards and xors
            // still need the full check.
            if self.consistent_total() {
                match best {
                    Some((_, cost)) if lower >= *cost => {}
                    _ => *best = Some((self.assignment.clone(), lower)),
                }
            }
            return true;
        };

        for value in [true, false] {
            self.assignment.assign(var, value);
            if !self.branch_and_bound(soft, deadline, best) {
                self.assignment.unassign(var);
                return false;
            }
            self.assignment.unassign(var);
        }
        true
    }

    /// Get statistics
    pub fn stats(&self) -> (usize, usize) {
        (self.decisions, self.propagations)
    }
}

impl Default for Engine {
    fn default() -> Self {
        Self::new()
    }
}

enum ClauseState {
    Open,
    Forced(Lit),
    Conflict,
}
