//! SQL classifier (design component C1).
//!
//! Decides whether a statement mutates the database. Everything except a
//! top-level `SELECT` is treated as mutating, including statements this
//! lightweight scanner cannot make sense of: per the conservative policy,
//! failure to find a recognizable leading keyword counts as mutating.

use nom::bytes::complete::{tag, take_until, take_while1};
use nom::character::complete::multispace1;
use nom::combinator::value;
use nom::multi::many0;
use nom::IResult;

/// Returns `true` unless `statement`'s top-level verb is `SELECT`.
pub fn mutates(statement: &str) -> bool {
    leading_keyword(statement)
        .map(|keyword| !keyword.eq_ignore_ascii_case("select"))
        .unwrap_or(true)
}

fn leading_keyword(statement: &str) -> Option<&str> {
    let (rest, _) = skip_trivia(statement).ok()?;
    let (_, word) = take_while1::<_, _, nom::error::Error<&str>>(|c: char| c.is_ascii_alphabetic())(rest).ok()?;
    Some(word)
}

/// Consumes leading whitespace, `-- line` comments, and `/* block */`
/// comments, the way a real SQL tokenizer would before looking at the
/// first keyword.
fn skip_trivia(input: &str) -> IResult<&str, ()> {
    value((), many0(trivia_piece))(input)
}

fn trivia_piece(input: &str) -> IResult<&str, ()> {
    nom::branch::alt((
        value((), multispace1),
        value((), line_comment),
        value((), block_comment),
    ))(input)
}

fn line_comment(input: &str) -> IResult<&str, &str> {
    let (input, _) = tag("--")(input)?;
    nom::bytes::complete::take_till(|c| c == '\n')(input)
}

fn block_comment(input: &str) -> IResult<&str, &str> {
    let (input, _) = tag("/*")(input)?;
    let (input, body) = take_until("*/")(input)?;
    let (input, _) = tag("*/")(input)?;
    Ok((input, body))
}
