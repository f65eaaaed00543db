//! Tokens for the inline expression language

use crate::ExprError;
use logos::Logos;

/// Expression token
#[derive(Logos, Debug, Clone, PartialEq)]
#[logos(skip r"([ \t\r\f]+|//[^\n]*)")]
pub enum Token {
    /// Line break (statement separator at top level)
    #[token("\n")]
    Newline,

    /// `true`
    #[token("true")]
    True,
    /// `false`
    #[token("false")]
    False,
    /// `null`
    #[token("null")]
    Null,

    /// Numeric literal, kept as source text
    #[regex(r"[0-9]+(\.[0-9]+)?([eE][+-]?[0-9]+)?", |lex| lex.slice().to_string())]
    Number(String),

    /// Quoted string literal, unescaped
    #[regex(r#""([^"\\]|\\.)*""#, |lex| unescape(lex.slice()))]
    #[regex(r"'([^'\\]|\\.)*'", |lex| unescape(lex.slice()))]
    Str(String),

    /// Identifier
    #[regex(r"[A-Za-z_$][A-Za-z0-9_$]*", |lex| lex.slice().to_string())]
    Ident(String),

    // Operators
    /// `+`
    #[token("+")]
    Plus,
    /// `-`
    #[token("-")]
    Minus,
    /// `*`
    #[token("*")]
    Star,
    /// `/`
    #[token("/")]
    Slash,
    /// `%`
    #[token("%")]
    Percent,
    /// `==`
    #[token("==")]
    #[token("===")]
    EqEq,
    /// `!=`
    #[token("!=")]
    #[token("!==")]
    NotEq,
    /// `<`
    #[token("<")]
    Lt,
    /// `<=`
    #[token("<=")]
    LtEq,
    /// `>`
    #[token(">")]
    Gt,
    /// `>=`
    #[token(">=")]
    GtEq,
    /// `&&`
    #[token("&&")]
    AndAnd,
    /// `||`
    #[token("||")]
    OrOr,
    /// `??`
    #[token("??")]
    Coalesce,
    /// `!`
    #[token("!")]
    Bang,
    /// `?`
    #[token("?")]
    Question,
    /// `:`
    #[token(":")]
    Colon,
    /// `=`
    #[token("=")]
    Assign,

    // Punctuation
    /// `.`
    #[token(".")]
    Dot,
    /// `,`
    #[token(",")]
    Comma,
    /// `;`
    #[token(";")]
    Semicolon,
    /// `(`
    #[token("(")]
    LParen,
    /// `)`
    #[token(")")]
    RParen,
    /// `[`
    #[token("[")]
    LBracket,
    /// `]`
    #[token("]")]
    RBracket,
    /// `{`
    #[token("{")]
    LBrace,
    /// `}`
    #[token("}")]
    RBrace,
}

/// Token with its byte span
#[derive(Debug, Clone, PartialEq)]
pub struct Spanned {
    /// Token
    pub token: Token,
    /// Byte range in the source
    pub span: std::ops::Range<usize>,
}

/// Split `source` into tokens
///
/// # Errors
/// Returns [`ExprError::Lex`] at the first unrecognised character.
pub fn tokenize(source: &str) -> Result<Vec<Spanned>, ExprError> {
    let mut tokens = Vec::new();
    let mut lexer = Token::lexer(source);

    while let Some(result) = lexer.next() {
        let span = lexer.span();
        match result {
            Ok(token) => tokens.push(Spanned { token, span }),
            Err(()) => {
                return Err(ExprError::Lex {
                    offset: span.start,
                    text: source[span].to_string(),
                })
            }
        }
    }

    Ok(tokens)
}

fn unescape(quoted: &str) -> String {
    let inner = &quoted[1..quoted.len() - 1];
    let mut out = String::with_capacity(inner.len());
    let mut chars = inner.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('n') => out.push('\n'),
            Some('t') => out.push('\t'),
            Some('r') => out.push('\r'),
            Some(other) => out.push(other),
            None => out.push('\\'),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(source: &str) -> Vec<Token> {
        tokenize(source).unwrap().into_iter().map(|t| t.token).collect()
    }

    #[test]
    fn test_assignment_tokens() {
        assert_eq!(
            kinds("x = x + 1"),
            vec![
                Token::Ident("x".into()),
                Token::Assign,
                Token::Ident("x".into()),
                Token::Plus,
                Token::Number("1".into()),
            ]
        );
    }

    #[test]
    fn test_string_literals() {
        assert_eq!(kinds(r#"'a\'b' "c""#), vec![Token::Str("a'b".into()), Token::Str("c".into())]);
    }

    #[test]
    fn test_keywords_beat_identifiers() {
        assert_eq!(kinds("true nullish"), vec![Token::True, Token::Ident("nullish".into())]);
    }

    #[test]
    fn test_unknown_character() {
        assert!(matches!(tokenize("a # b"), Err(ExprError::Lex { offset: 2, .. })));
    }
}
