//! Expression syntax.
//!
//! ```text
//! expr  := term (('+' | '-') term)*
//! term  := unary (('*' | '/') unary)*
//! unary := ('-' | '+') unary | power
//! power := atom (('**' | '^') unary)?
//! atom  := number | name '(' expr (',' expr)* ')' | name | '(' expr ')'
//! ```
//!
//! Parsing yields an untyped [`Ast`]; names are resolved afterwards.

use nom::IResult;
use nom::Parser;
use nom::branch::alt;
use nom::bytes::complete::{tag, take_while1};
use nom::character::complete::{char, multispace0};
use nom::number::complete::double;
use nom::sequence::preceded;

#[derive(Clone, Debug, PartialEq)]
pub(crate) enum Ast {
    Num(f64),
    Name(String),
    Call(String, Vec<Ast>),
    Neg(Box<Ast>),
    Bin(char, Box<Ast>, Box<Ast>),
}

/// Parse `src` completely.
pub(crate) fn parse(src: &str) -> Result<Ast, String> {
    let (rest, ast) = expr(src).map_err(|e| match e {
        nom::Err::Error(e) | nom::Err::Failure(e) => near(e.input),
        nom::Err::Incomplete(_) => "unexpected end of input".to_owned(),
    })?;
    let (rest, _) = ws(rest);
    if rest.is_empty() {
        Ok(ast)
    } else {
        Err(near(rest))
    }
}

fn near(rest: &str) -> String {
    if rest.trim().is_empty() {
        "unexpected end of input".to_owned()
    } else {
        format!("syntax error near `{}`", rest.trim())
    }
}

fn ws(i: &str) -> (&str, &str) {
    // multispace0 on complete input cannot fail
    multispace0::<&str, nom::error::Error<&str>>(i).unwrap_or((i, ""))
}

fn sym<'a>(c: char) -> impl FnMut(&'a str) -> IResult<&'a str, char> {
    move |i| preceded(multispace0, char(c)).parse(i)
}

fn expr(i: &str) -> IResult<&str, Ast> {
    let (mut i, mut lhs) = term(i)?;
    loop {
        match alt((sym('+'), sym('-'))).parse(i) {
            Ok((rest, op)) => {
                let (rest, rhs) = term(rest)?;
                lhs = Ast::Bin(op, Box::new(lhs), Box::new(rhs));
                i = rest;
            }
            Err(nom::Err::Error(_)) => return Ok((i, lhs)),
            Err(e) => return Err(e),
        }
    }
}

fn term(i: &str) -> IResult<&str, Ast> {
    let (mut i, mut lhs) = unary(i)?;
    loop {
        match alt((sym('*'), sym('/'))).parse(i) {
            Ok((rest, op)) => {
                let (rest, rhs) = unary(rest)?;
                lhs = Ast::Bin(op, Box::new(lhs), Box::new(rhs));
                i = rest;
            }
            Err(nom::Err::Error(_)) => return Ok((i, lhs)),
            Err(e) => return Err(e),
        }
    }
}

fn unary(i: &str) -> IResult<&str, Ast> {
    if let Ok((rest, _)) = sym('-')(i) {
        let (rest, inner) = unary(rest)?;
        return Ok((rest, Ast::Neg(Box::new(inner))));
    }
    if let Ok((rest, _)) = sym('+')(i) {
        return unary(rest);
    }
    power(i)
}

fn power(i: &str) -> IResult<&str, Ast> {
    let (i, base) = atom(i)?;
    let op = alt((
        preceded(multispace0, tag("**")),
        preceded(multispace0, tag("^")),
    ))
    .parse(i);
    match op {
        Ok((rest, _)) => {
            let (rest, exp) = unary(rest)?;
            Ok((rest, Ast::Bin('^', Box::new(base), Box::new(exp))))
        }
        Err(nom::Err::Error(_)) => Ok((i, base)),
        Err(e) => Err(e),
    }
}

fn name(i: &str) -> IResult<&str, &str> {
    let (i, _) = multispace0(i)?;
    match i.chars().next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {
            take_while1(|c: char| c.is_ascii_alphanumeric() || c == '_').parse(i)
        }
        _ => Err(nom::Err::Error(nom::error::Error::new(
            i,
            nom::error::ErrorKind::Alpha,
        ))),
    }
}

fn number(i: &str) -> IResult<&str, f64> {
    let (i, _) = multispace0(i)?;
    match i.chars().next() {
        Some(c) if c.is_ascii_digit() || c == '.' => double(i),
        _ => Err(nom::Err::Error(nom::error::Error::new(
            i,
            nom::error::ErrorKind::Float,
        ))),
    }
}

fn atom(i: &str) -> IResult<&str, Ast> {
    if let Ok((rest, v)) = number(i) {
        return Ok((rest, Ast::Num(v)));
    }
    if let Ok((rest, id)) = name(i) {
        if let Ok((mut rest, _)) = sym('(')(rest) {
            let mut args = Vec::new();
            loop {
                let (r, arg) = expr(rest)?;
                args.push(arg);
                if let Ok((r, _)) = sym(',')(r) {
                    rest = r;
                    continue;
                }
                let (r, _) = sym(')')(r).map_err(to_failure)?;
                return Ok((r, Ast::Call(id.to_owned(), args)));
            }
        }
        return Ok((rest, Ast::Name(id.to_owned())));
    }
    let (rest, _) = sym('(')(i)?;
    let (rest, inner) = expr(rest)?;
    let (rest, _) = sym(')')(rest).map_err(to_failure)?;
    Ok((rest, inner))
}

fn to_failure<E>(e: nom::Err<E>) -> nom::Err<E> {
    match e {
        nom::Err::Error(e) => nom::Err::Failure(e),
        other => other,
    }
}
