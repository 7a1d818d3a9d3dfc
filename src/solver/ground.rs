//! Ground clause compiler
//!
//! Takes fully ground clauses and compiles them for the boolean engine:
//! ordinary disjunctions become clauses over interned atom variables, the
//! reserved meta predicates become native cardinality and parity
//! constraints, and each `@xor` occurrence gets a fresh gate variable whose
//! forced polarity encodes the literal's sign. Gate variables live past the
//! end of the atom table and are never part of a returned state.

use std::collections::BTreeSet;
use std::time::{Duration, Instant};

use indexmap::IndexSet;

use crate::error::{SolverError, SolverResult};
use crate::logic::{term_to_literal, Clause, GroundState, Literal, MetaPredicate};
use crate::sat::{Engine, Lit, SatClause, SatResult, Var};

/// A hard rule, classified once at ingestion so compilation is an exhaustive
/// match instead of repeated predicate-name comparisons.
#[derive(Debug, Clone)]
enum GroundRule {
    Disjunction(Clause),
    AtLeast { bound: usize, atoms: Vec<Literal> },
    AtMost { bound: usize, atoms: Vec<Literal> },
    /// `negated` records the sign the constraint appeared under: a positive
    /// `@xor` forces odd parity, a negated one forces even parity.
    Xor { atoms: Vec<Literal>, negated: bool },
}

/// Compiler and default boolean backend for ground theories.
///
/// The engine is built lazily on the first query and reused afterwards, so
/// repeated `solve` / `solve_all` calls on the same instance pay the
/// compilation cost once.
pub struct GroundSolver {
    rules: Vec<GroundRule>,
    hard: Vec<Clause>,
    soft: Vec<(Clause, u64)>,
    atoms: IndexSet<Literal>,
    xor_count: usize,
    engine: Option<Engine>,
    optimization_timeout: Option<Duration>,
}

impl GroundSolver {
    pub fn new(hard: Vec<Clause>) -> SolverResult<Self> {
        Self::with_all(hard, None, None)
    }

    /// `ground_atoms` widens the atom universe beyond the atoms occurring in
    /// the clauses; models are total over the widened universe.
    pub fn with_ground_atoms(
        hard: Vec<Clause>,
        ground_atoms: BTreeSet<Literal>,
    ) -> SolverResult<Self> {
        Self::with_all(hard, Some(ground_atoms), None)
    }

    /// Soft clauses carry optional weights; a weight of `None` means the
    /// clause is actually hard.
    pub fn with_soft_clauses(
        hard: Vec<Clause>,
        soft: Vec<(Clause, Option<u64>)>,
    ) -> SolverResult<Self> {
        Self::with_all(hard, None, Some(soft))
    }

    pub fn with_all(
        hard: Vec<Clause>,
        ground_atoms: Option<BTreeSet<Literal>>,
        soft: Option<Vec<(Clause, Option<u64>)>>,
    ) -> SolverResult<Self> {
        let mut solver = GroundSolver {
            rules: Vec::new(),
            hard: Vec::new(),
            soft: Vec::new(),
            atoms: IndexSet::new(),
            xor_count: 0,
            engine: None,
            optimization_timeout: None,
        };

        for (clause, weight) in soft.unwrap_or_default() {
            for lit in clause.literals() {
                solver.intern(&lit.atom());
            }
            match weight {
                None => {
                    solver.hard.push(clause.clone());
                    solver.rules.push(GroundRule::Disjunction(clause));
                }
                Some(w) => {
                    if clause.literals().any(|l| {
                        matches!(l.meta(), Some(MetaPredicate::AtLeast | MetaPredicate::AtMost))
                    }) {
                        return Err(SolverError::config(
                            "soft clauses with @atleast and @atmost are not supported",
                        ));
                    }
                    solver.soft.push((clause, w));
                }
            }
        }

        for clause in hard {
            let rule = classify(clause)?;
            if let GroundRule::Disjunction(ref c) = rule {
                solver.hard.push(c.clone());
                for lit in c.literals() {
                    solver.intern(&lit.atom());
                }
            }
            solver.rules.push(rule);
        }

        for atom in ground_atoms.unwrap_or_default() {
            solver.intern(&atom.atom());
        }

        // Cardinality and parity atoms are interned after everything else,
        // then counted so gate variables can be placed past the table.
        let rules = solver.rules.clone();
        for rule in &rules {
            match rule {
                GroundRule::Disjunction(_) => {}
                GroundRule::AtLeast { atoms, .. } | GroundRule::AtMost { atoms, .. } => {
                    for atom in atoms {
                        solver.intern(atom);
                    }
                }
                GroundRule::Xor { atoms, .. } => {
                    solver.xor_count += 1;
                    for atom in atoms {
                        solver.intern(atom);
                    }
                }
            }
        }

        Ok(solver)
    }

    pub fn hard_clauses(&self) -> &[Clause] {
        &self.hard
    }

    pub fn soft_clauses(&self) -> &[(Clause, u64)] {
        &self.soft
    }

    pub fn set_optimization_timeout(&mut self, timeout: Duration) {
        self.optimization_timeout = Some(timeout);
    }

    /// Find one model, total over the atom universe. `None` means the hard
    /// constraints are unsatisfiable.
    pub fn solve(&mut self) -> Option<GroundState> {
        let atom_count = self.atoms.len();
        let engine = self.build_engine();
        match engine.solve() {
            SatResult::Sat(assignment) => {
                Some(project(&self.atoms, atom_count, assignment.true_vars()))
            }
            _ => None,
        }
    }

    /// Enumerate up to `limit` distinct models (all of them for `None`).
    pub fn solve_all(&mut self, limit: Option<usize>) -> Vec<GroundState> {
        let atom_count = self.atoms.len();
        let engine = self.build_engine();
        engine
            .solve_all(limit.unwrap_or(usize::MAX))
            .into_iter()
            .map(|a| project(&self.atoms, atom_count, a.true_vars()))
            .collect()
    }

    /// Minimize the summed weight of violated soft clauses subject to the
    /// hard constraints. `None` on unsatisfiable hard constraints or when
    /// the configured timeout runs out first.
    pub fn optimize(&mut self) -> Option<GroundState> {
        let soft: Vec<(SatClause, u64)> = self
            .soft
            .clone()
            .into_iter()
            .map(|(clause, weight)| (compile_clause(&mut self.atoms, &clause), weight))
            .collect();
        let deadline = self.optimization_timeout.map(|t| Instant::now() + t);
        let atom_count = self.atoms.len();
        let engine = self.build_engine();
        let (assignment, _cost) = engine.optimize(&soft, deadline)?;
        Some(project(&self.atoms, atom_count, assignment.true_vars()))
    }

    fn intern(&mut self, atom: &Literal) -> Var {
        let (index, _) = self.atoms.insert_full(atom.clone());
        (index + 1) as Var
    }

    fn build_engine(&mut self) -> &mut Engine {
        if self.engine.is_none() {
            let mut engine = Engine::new();
            // Register the whole atom table so models are total even over
            // atoms no constraint mentions.
            engine.register_var(self.atoms.len() as Var);

            let mut next_gate = self.atoms.len() as Var;
            for rule in &self.rules {
                match rule {
                    GroundRule::Disjunction(clause) => {
                        engine.add_clause(compile_clause(&mut self.atoms, clause));
                    }
                    GroundRule::AtLeast { bound, atoms } => {
                        let vars = compile_atoms(&mut self.atoms, atoms);
                        engine.add_at_least(&vars, *bound);
                    }
                    GroundRule::AtMost { bound, atoms } => {
                        let vars = compile_atoms(&mut self.atoms, atoms);
                        engine.add_at_most(&vars, *bound);
                    }
                    GroundRule::Xor { atoms, negated } => {
                        let vars = compile_atoms(&mut self.atoms, atoms);
                        next_gate += 1;
                        engine.add_xor_gate(next_gate, &vars);
                        // The gate's forced polarity is the constraint sign.
                        engine.add_clause(SatClause::new(vec![Lit::new(next_gate, !negated)]));
                    }
                }
            }
            self.engine = Some(engine);
        }
        self.engine.as_mut().unwrap()
    }

    /// Is `clause` entailed by the rest of `theory`? Decided by refutation:
    /// assert the negation of the clause's ordinary literals and check that
    /// the theory becomes unsatisfiable.
    pub fn is_implied(clause: &Clause, theory: &[Clause]) -> SolverResult<bool> {
        let mut rest: Vec<Clause> = theory.iter().filter(|c| *c != clause).cloned().collect();
        for lit in clause.flip_signs().literals() {
            if lit.structural().is_none() && lit.meta().is_none() {
                rest.push(Clause::unit(lit.clone()));
            }
        }
        Ok(GroundSolver::new(rest)?.solve().is_none())
    }

    /// Drop clauses implied by the remainder of the theory, longest first.
    pub fn remove_implied(theory: &[Clause]) -> SolverResult<Vec<Clause>> {
        let mut keep: Vec<Clause> = theory.to_vec();
        keep.sort_by_key(|c| std::cmp::Reverse(c.len()));
        let mut i = 0;
        while i < keep.len() {
            let candidate = keep[i].clone();
            let rest: Vec<Clause> = keep
                .iter()
                .enumerate()
                .filter(|(j, _)| *j != i)
                .map(|(_, c)| c.clone())
                .collect();
            if Self::is_implied(&candidate, &rest)? {
                keep.remove(i);
            } else {
                i += 1;
            }
        }
        Ok(keep)
    }

    /// Shrink each clause literal by literal while the shorter version is
    /// still implied, after first dropping whole implied clauses.
    pub fn simplify(theory: &[Clause]) -> SolverResult<Vec<Clause>> {
        let mut clauses = Self::remove_implied(theory)?;
        for i in 0..clauses.len() {
            let mut changed = true;
            while changed {
                changed = false;
                if clauses[i].len() <= 1 {
                    break;
                }
                let literals: Vec<Literal> = clauses[i].literals().cloned().collect();
                for lit in literals {
                    let shorter = clauses[i].retain_literals(|l| *l != lit);
                    let mut with_shorter = clauses.clone();
                    with_shorter[i] = shorter.clone();
                    if Self::is_implied(&shorter, &with_shorter)? {
                        clauses[i] = shorter;
                        changed = true;
                        break;
                    }
                }
            }
        }
        Ok(clauses)
    }
}

/// Classify a hard clause, validating the meta-predicate usage rules.
fn classify(clause: Clause) -> SolverResult<GroundRule> {
    let meta = clause.literals().find(|l| l.meta().is_some()).cloned();
    let Some(lit) = meta else {
        return Ok(GroundRule::Disjunction(clause));
    };
    if clause.len() > 1 {
        return Err(SolverError::config(format!(
            "{} can only be used on its own, not mixed into a clause",
            lit.predicate
        )));
    }
    match lit.meta().unwrap() {
        MetaPredicate::AtLeast => {
            if lit.negated {
                return Err(SolverError::config("negated @atleast is not supported"));
            }
            let (bound, atoms) = cardinality_args(&lit)?;
            Ok(GroundRule::AtLeast { bound, atoms })
        }
        MetaPredicate::AtMost => {
            if lit.negated {
                return Err(SolverError::config("negated @atmost is not supported"));
            }
            let (bound, atoms) = cardinality_args(&lit)?;
            Ok(GroundRule::AtMost { bound, atoms })
        }
        MetaPredicate::Xor => {
            let atoms = lit
                .args
                .iter()
                .map(|t| {
                    term_to_literal(t).ok_or_else(|| {
                        SolverError::config(format!("non-ground argument in {}", lit))
                    })
                })
                .collect::<SolverResult<Vec<Literal>>>()?;
            Ok(GroundRule::Xor {
                atoms,
                negated: lit.negated,
            })
        }
    }
}

/// Split `@atleast(k, a1, ..., an)` into the numeric bound and the atoms.
fn cardinality_args(lit: &Literal) -> SolverResult<(usize, Vec<Literal>)> {
    let Some(first) = lit.args.first() else {
        return Err(SolverError::config(format!("{} needs a bound", lit.predicate)));
    };
    let bound: usize = first
        .name()
        .parse()
        .map_err(|_| SolverError::config(format!("invalid bound {} in {}", first, lit)))?;
    let atoms = lit.args[1..]
        .iter()
        .map(|t| {
            term_to_literal(t)
                .ok_or_else(|| SolverError::config(format!("non-ground argument in {}", lit)))
        })
        .collect::<SolverResult<Vec<Literal>>>()?;
    Ok((bound, atoms))
}

fn compile_clause(atoms: &mut IndexSet<Literal>, clause: &Clause) -> SatClause {
    SatClause::new(
        clause
            .literals()
            .map(|lit| {
                let (index, _) = atoms.insert_full(lit.atom());
                Lit::new((index + 1) as Var, !lit.negated)
            })
            .collect(),
    )
}

fn compile_atoms(atoms: &mut IndexSet<Literal>, list: &[Literal]) -> Vec<Var> {
    list.iter()
        .map(|atom| {
            let (index, _) = atoms.insert_full(atom.atom());
            (index + 1) as Var
        })
        .collect()
}

/// Project a boolean model back to ground literals, skipping gate variables.
fn project(atoms: &IndexSet<Literal>, atom_count: usize, true_vars: Vec<Var>) -> GroundState {
    true_vars
        .into_iter()
        .filter(|&v| v as usize <= atom_count)
        .filter_map(|v| atoms.get_index(v as usize - 1).cloned())
        .collect()
}
