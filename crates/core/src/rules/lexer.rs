//! Tokenizer for rule conditions, built on logos.

use logos::Logos;
use std::fmt;

/// Token types of the condition language.
#[derive(Logos, Debug, Clone, PartialEq)]
#[logos(skip r"[ \t\r\n]+")]
pub enum Token {
    #[token("(")]
    LParen,

    #[token(")")]
    RParen,

    #[token("[")]
    LBracket,

    #[token("]")]
    RBracket,

    #[token(",")]
    Comma,

    #[token("&&")]
    #[token("and", ignore(ascii_case))]
    And,

    #[token("||")]
    #[token("or", ignore(ascii_case))]
    Or,

    #[token("!")]
    #[token("not", ignore(ascii_case))]
    Not,

    #[token("in", ignore(ascii_case))]
    In,

    #[token("true", ignore(ascii_case))]
    True,

    #[token("false", ignore(ascii_case))]
    False,

    // JavaScript-style strict operators are accepted as plain equality.
    #[token("==")]
    #[token("===")]
    Eq,

    #[token("!=")]
    #[token("!==")]
    Ne,

    #[token("<")]
    Lt,

    #[token("<=")]
    Le,

    #[token(">")]
    Gt,

    #[token(">=")]
    Ge,

    #[regex(r"-?[0-9]+(\.[0-9]+)?", |lex| lex.slice().parse::<f64>().ok())]
    Number(f64),

    #[regex(r#""[^"]*""#, unquote)]
    #[regex(r"'[^']*'", unquote)]
    Text(String),

    #[regex(r"[A-Za-z_][A-Za-z0-9_]*(\.[A-Za-z_][A-Za-z0-9_]*)*", |lex| lex.slice().to_owned())]
    Ident(String),
}

fn unquote(lex: &mut logos::Lexer<'_, Token>) -> String {
    let s = lex.slice();
    s[1..s.len() - 1].to_owned()
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Token::LParen => f.write_str("'('"),
            Token::RParen => f.write_str("')'"),
            Token::LBracket => f.write_str("'['"),
            Token::RBracket => f.write_str("']'"),
            Token::Comma => f.write_str("','"),
            Token::And => f.write_str("'&&'"),
            Token::Or => f.write_str("'||'"),
            Token::Not => f.write_str("'!'"),
            Token::In => f.write_str("'in'"),
            Token::True => f.write_str("'true'"),
            Token::False => f.write_str("'false'"),
            Token::Eq => f.write_str("'=='"),
            Token::Ne => f.write_str("'!='"),
            Token::Lt => f.write_str("'<'"),
            Token::Le => f.write_str("'<='"),
            Token::Gt => f.write_str("'>'"),
            Token::Ge => f.write_str("'>='"),
            Token::Number(n) => write!(f, "number {n}"),
            Token::Text(s) => write!(f, "string '{s}'"),
            Token::Ident(name) => write!(f, "'{name}'"),
        }
    }
}

/// A token with the byte offset it starts at.
#[derive(Debug, Clone, PartialEq)]
pub struct Spanned {
    pub token: Token,
    pub offset: usize,
}

/// Splits `source` into tokens.
///
/// # Errors
///
/// Returns the byte offset of the first character that does not start a token.
pub fn tokenize(source: &str) -> Result<Vec<Spanned>, usize> {
    let mut tokens = Vec::new();
    for (token, span) in Token::lexer(source).spanned() {
        match token {
            Ok(token) => tokens.push(Spanned {
                token,
                offset: span.start,
            }),
            Err(()) => return Err(span.start),
        }
    }
    Ok(tokens)
}
