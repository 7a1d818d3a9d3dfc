//! Textual clause syntax
//!
//! The format used throughout tests and by collaborators: positive literals
//! are written `pred(t1,...,tn)`, negated literals `!pred(t1,...,tn)`, and a
//! clause is a comma-separated literal list, e.g. `!bond(X,Y), bond(Y,X)`.
//! Uppercase-initial names are variables, everything else is a constant.
//! Reserved predicates carry an `@` prefix: `@alldiff(X,Y)`,
//! `@atleast(2,a(x),b(x),c(x))`, `@xor(a(x),b(x))`.

use nom::{
    branch::alt,
    bytes::complete::{tag, take_while1},
    character::complete::{char, multispace0},
    combinator::{opt, recognize},
    multi::separated_list0,
    sequence::{pair, preceded},
    IResult,
};

use crate::error::{SolverError, SolverResult};

use super::clause::Clause;
use super::literal::Literal;
use super::term::Term;

/// Parse a single clause. An empty (or whitespace-only) input yields the
/// empty clause.
pub fn parse_clause(input: &str) -> SolverResult<Clause> {
    let trimmed = input.trim();
    if trimmed.is_empty() || trimmed == "$false" {
        return Ok(Clause::empty());
    }
    match clause(trimmed) {
        Ok((rest, clause)) if rest.trim().is_empty() => Ok(clause),
        Ok((rest, _)) => Err(syntax_error(input, rest, "trailing input after clause")),
        Err(_) => Err(SolverError::Syntax {
            position: 0,
            message: format!("malformed clause: {}", trimmed),
        }),
    }
}

/// Parse a single literal.
pub fn parse_literal(input: &str) -> SolverResult<Literal> {
    match literal(input.trim()) {
        Ok((rest, lit)) if rest.trim().is_empty() => Ok(lit),
        Ok((rest, _)) => Err(syntax_error(input, rest, "trailing input after literal")),
        Err(_) => Err(SolverError::Syntax {
            position: 0,
            message: format!("malformed literal: {}", input.trim()),
        }),
    }
}

fn syntax_error(input: &str, rest: &str, message: &str) -> SolverError {
    SolverError::Syntax {
        position: input.len() - rest.len(),
        message: message.to_string(),
    }
}

fn name(input: &str) -> IResult<&str, &str> {
    take_while1(|c: char| c.is_alphanumeric() || c == '_' || c == '-')(input)
}

fn predicate_name(input: &str) -> IResult<&str, &str> {
    recognize(pair(opt(char('@')), name))(input)
}

fn term(input: &str) -> IResult<&str, Term> {
    let (input, symbol) = name(input)?;
    let (input, args) = opt(arg_list)(input)?;
    let term = match args {
        Some(args) => Term::app(symbol, args),
        None => Term::from_name(symbol),
    };
    Ok((input, term))
}

fn arg_list(input: &str) -> IResult<&str, Vec<Term>> {
    let (input, _) = char('(')(input)?;
    let (input, args) = separated_list0(ws(char(',')), ws_term)(input)?;
    let (input, _) = preceded(multispace0, char(')'))(input)?;
    Ok((input, args))
}

fn ws_term(input: &str) -> IResult<&str, Term> {
    preceded(multispace0, term)(input)
}

fn ws<'a, O>(
    mut inner: impl FnMut(&'a str) -> IResult<&'a str, O>,
) -> impl FnMut(&'a str) -> IResult<&'a str, O> {
    move |input| {
        let (input, _) = multispace0(input)?;
        inner(input)
    }
}

fn literal(input: &str) -> IResult<&str, Literal> {
    let (input, _) = multispace0(input)?;
    let (input, bang) = opt(alt((tag("!"), tag("~"))))(input)?;
    let (input, pred) = predicate_name(input)?;
    let (input, args) = opt(arg_list)(input)?;
    Ok((
        input,
        Literal::new(pred, args.unwrap_or_default(), bang.is_some()),
    ))
}

fn clause(input: &str) -> IResult<&str, Clause> {
    let (input, literals) = separated_list0(ws(char(',')), literal)(input)?;
    Ok((input, Clause::new(literals)))
}
