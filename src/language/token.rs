use crate::language::span::Span;
use std::fmt;

#[derive(Clone, Debug, PartialEq)]
pub struct Token {
    pub kind: TokenKind,
    pub span: Span,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum TokenKind {
    TypeName(String),
    Identifier(String),
    Integer(i64),
    String(String),

    Class,
    Inherits,
    If,
    Then,
    Else,
    Fi,
    While,
    Loop,
    Pool,
    Let,
    In,
    Case,
    Of,
    Esac,
    New,
    IsVoid,
    Not,
    True,
    False,

    Assign,
    DArrow,
    LtEq,
    Lt,
    Eq,
    Plus,
    Minus,
    Star,
    Slash,
    Tilde,
    At,
    Dot,
    Comma,
    Colon,
    Semi,
    LBrace,
    RBrace,
    LParen,
    RParen,

    Eof,
}

impl TokenKind {
    pub fn keyword(word: &str) -> Option<TokenKind> {
        let kind = match word {
            "class" => TokenKind::Class,
            "inherits" => TokenKind::Inherits,
            "if" => TokenKind::If,
            "then" => TokenKind::Then,
            "else" => TokenKind::Else,
            "fi" => TokenKind::Fi,
            "while" => TokenKind::While,
            "loop" => TokenKind::Loop,
            "pool" => TokenKind::Pool,
            "let" => TokenKind::Let,
            "in" => TokenKind::In,
            "case" => TokenKind::Case,
            "of" => TokenKind::Of,
            "esac" => TokenKind::Esac,
            "new" => TokenKind::New,
            "isvoid" => TokenKind::IsVoid,
            "not" => TokenKind::Not,
            "true" => TokenKind::True,
            "false" => TokenKind::False,
            _ => return None,
        };
        Some(kind)
    }
}

impl fmt::Display for TokenKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            TokenKind::TypeName(name) => return write!(f, "type `{name}`"),
            TokenKind::Identifier(name) => return write!(f, "identifier `{name}`"),
            TokenKind::Integer(value) => return write!(f, "integer `{value}`"),
            TokenKind::String(_) => "string literal",
            TokenKind::Class => "`class`",
            TokenKind::Inherits => "`inherits`",
            TokenKind::If => "`if`",
            TokenKind::Then => "`then`",
            TokenKind::Else => "`else`",
            TokenKind::Fi => "`fi`",
            TokenKind::While => "`while`",
            TokenKind::Loop => "`loop`",
            TokenKind::Pool => "`pool`",
            TokenKind::Let => "`let`",
            TokenKind::In => "`in`",
            TokenKind::Case => "`case`",
            TokenKind::Of => "`of`",
            TokenKind::Esac => "`esac`",
            TokenKind::New => "`new`",
            TokenKind::IsVoid => "`isvoid`",
            TokenKind::Not => "`not`",
            TokenKind::True => "`true`",
            TokenKind::False => "`false`",
            TokenKind::Assign => "`<-`",
            TokenKind::DArrow => "`=>`",
            TokenKind::LtEq => "`<=`",
            TokenKind::Lt => "`<`",
            TokenKind::Eq => "`=`",
            TokenKind::Plus => "`+`",
            TokenKind::Minus => "`-`",
            TokenKind::Star => "`*`",
            TokenKind::Slash => "`/`",
            TokenKind::Tilde => "`~`",
            TokenKind::At => "`@`",
            TokenKind::Dot => "`.`",
            TokenKind::Comma => "`,`",
            TokenKind::Colon => "`:`",
            TokenKind::Semi => "`;`",
            TokenKind::LBrace => "`{`",
            TokenKind::RBrace => "`}`",
            TokenKind::LParen => "`(`",
            TokenKind::RParen => "`)`",
            TokenKind::Eof => "end of input",
        };
        f.write_str(text)
    }
}
