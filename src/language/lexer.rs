use crate::language::{
    span::Span,
    token::{Token, TokenKind},
};
use nom::{
    branch::alt,
    bytes::complete::{tag, take_until, take_while},
    character::complete::{char, digit1, multispace1, not_line_ending, satisfy},
    combinator::{map_res, recognize, value},
    error::{Error as NomError, ErrorKind},
    sequence::{delimited, pair},
    IResult, Parser as NomParser,
};

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LexError {
    pub message: String,
    pub span: Span,
}

pub fn lex(source: &str) -> Result<Vec<Token>, Vec<LexError>> {
    let mut tokens = Vec::new();
    let mut errors = Vec::new();
    let mut remaining = source;

    while !remaining.is_empty() {
        let offset = source.len() - remaining.len();

        if let Ok((rest, _)) = trivia(remaining) {
            remaining = rest;
            continue;
        }

        if remaining.starts_with("(*") {
            errors.push(LexError {
                message: "Unterminated block comment".into(),
                span: Span::new(offset, source.len()),
            });
            break;
        }

        if remaining.starts_with('"') {
            match string_literal(remaining) {
                Ok((rest, text)) => {
                    let end = source.len() - rest.len();
                    tokens.push(Token {
                        kind: TokenKind::String(text),
                        span: Span::new(offset, end),
                    });
                    remaining = rest;
                }
                Err(_) => {
                    errors.push(LexError {
                        message: "Unterminated string literal".into(),
                        span: Span::new(offset, source.len()),
                    });
                    break;
                }
            }
            continue;
        }

        let result = word(remaining)
            .or_else(|_| integer(remaining))
            .or_else(|_| symbol(remaining));

        match result {
            Ok((rest, kind)) => {
                let end = source.len() - rest.len();
                tokens.push(Token {
                    kind,
                    span: Span::new(offset, end),
                });
                remaining = rest;
            }
            Err(_) => {
                let ch = remaining.chars().next().unwrap_or_default();
                let width = ch.len_utf8().max(1);
                let message = if ch.is_ascii_digit() {
                    "Integer literal is out of range".to_string()
                } else {
                    format!("Unexpected character `{ch}`")
                };
                let consumed = if ch.is_ascii_digit() {
                    remaining
                        .find(|c: char| !c.is_ascii_digit())
                        .unwrap_or(remaining.len())
                } else {
                    width
                };
                errors.push(LexError {
                    message,
                    span: Span::new(offset, offset + consumed),
                });
                remaining = &remaining[consumed..];
            }
        }
    }

    tokens.push(Token {
        kind: TokenKind::Eof,
        span: Span::new(source.len(), source.len()),
    });

    if errors.is_empty() {
        Ok(tokens)
    } else {
        Err(errors)
    }
}

fn trivia(input: &str) -> IResult<&str, &str> {
    alt((
        multispace1,
        recognize(pair(tag("--"), not_line_ending)),
        recognize(delimited(tag("(*"), take_until("*)"), tag("*)"))),
    ))
    .parse(input)
}

fn word(input: &str) -> IResult<&str, TokenKind> {
    let (input, text) = recognize(pair(
        satisfy(|ch| ch.is_ascii_alphabetic()),
        take_while(|ch: char| ch.is_ascii_alphanumeric() || ch == '_'),
    ))
    .parse(input)?;
    let kind = TokenKind::keyword(text).unwrap_or_else(|| {
        if text.starts_with(|ch: char| ch.is_ascii_uppercase()) {
            TokenKind::TypeName(text.to_string())
        } else {
            TokenKind::Identifier(text.to_string())
        }
    });
    Ok((input, kind))
}

fn integer(input: &str) -> IResult<&str, TokenKind> {
    let (input, number) = map_res(digit1, |digits: &str| digits.parse::<i64>()).parse(input)?;
    Ok((input, TokenKind::Integer(number)))
}

fn symbol(input: &str) -> IResult<&str, TokenKind> {
    alt((
        alt((
            value(TokenKind::Assign, tag("<-")),
            value(TokenKind::LtEq, tag("<=")),
            value(TokenKind::DArrow, tag("=>")),
            value(TokenKind::DArrow, tag("->")),
            value(TokenKind::Lt, tag("<")),
            value(TokenKind::Eq, tag("=")),
            value(TokenKind::Plus, tag("+")),
            value(TokenKind::Minus, tag("-")),
            value(TokenKind::Star, tag("*")),
            value(TokenKind::Slash, tag("/")),
        )),
        alt((
            value(TokenKind::Tilde, tag("~")),
            value(TokenKind::At, tag("@")),
            value(TokenKind::Dot, tag(".")),
            value(TokenKind::Comma, tag(",")),
            value(TokenKind::Colon, tag(":")),
            value(TokenKind::Semi, tag(";")),
            value(TokenKind::LBrace, tag("{")),
            value(TokenKind::RBrace, tag("}")),
            value(TokenKind::LParen, tag("(")),
            value(TokenKind::RParen, tag(")")),
        )),
    ))
    .parse(input)
}

fn string_literal(input: &str) -> IResult<&str, String> {
    let (mut rest, _) = char('"')(input)?;
    let mut text = String::new();
    loop {
        let mut chars = rest.chars();
        match chars.next() {
            Some('"') => return Ok((chars.as_str(), text)),
            Some('\\') => match chars.next() {
                Some('n') => text.push('\n'),
                Some('t') => text.push('\t'),
                Some('b') => text.push('\u{8}'),
                Some('f') => text.push('\u{c}'),
                Some(other) => text.push(other),
                None => break,
            },
            Some('\n') | None => break,
            Some(ch) => text.push(ch),
        }
        rest = chars.as_str();
    }
    Err(nom::Err::Failure(NomError::new(input, ErrorKind::Char)))
}
