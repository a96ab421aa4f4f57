//! Tokenizer for formula text
//!
//! Tokens for member access, subscripts, braces, assignment and string
//! literals are recognised only so the parser can reject them with a
//! security violation instead of a generic syntax error.

use logos::Logos;
use std::fmt;
use std::ops::Range;

use crate::error::FormulaError;

#[derive(Logos, Debug, Clone, PartialEq)]
#[logos(skip r"[ \t\r\n]+")]
pub enum Token {
    /// Decimal literal, kept as text so it is parsed straight into `Money`
    #[regex(r"[0-9]+(\.[0-9]*)?", |lex| lex.slice().to_string())]
    #[regex(r"\.[0-9]+", |lex| lex.slice().to_string())]
    Number(String),

    #[regex(r"[A-Za-z_][A-Za-z0-9_]*", |lex| lex.slice().to_string())]
    Ident(String),

    #[token("if")]
    If,
    #[token("else")]
    Else,

    #[token("+")]
    Plus,
    #[token("-")]
    Minus,
    #[token("*")]
    Star,
    #[token("/")]
    Slash,
    #[token("%")]
    Percent,
    #[token("**")]
    StarStar,
    #[token("^")]
    Caret,

    #[token("<")]
    Lt,
    #[token("<=")]
    LtEq,
    #[token(">")]
    Gt,
    #[token(">=")]
    GtEq,
    #[token("==")]
    EqEq,
    #[token("!=")]
    BangEq,

    #[token("(")]
    LParen,
    #[token(")")]
    RParen,
    #[token(",")]
    Comma,

    // Rejected constructs
    #[token(".")]
    Dot,
    #[token("[")]
    LBracket,
    #[token("]")]
    RBracket,
    #[token("{")]
    LBrace,
    #[token("}")]
    RBrace,
    #[token("=")]
    Assign,
    #[token(":")]
    Colon,
    #[token(";")]
    Semicolon,
    #[token("@")]
    At,
    #[regex(r#""([^"\\]|\\.)*""#)]
    #[regex(r#"'([^'\\]|\\.)*'"#)]
    StringLiteral,
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            Token::Number(n) => return write!(f, "number {}", n),
            Token::Ident(name) => return write!(f, "name '{}'", name),
            Token::If => "'if'",
            Token::Else => "'else'",
            Token::Plus => "'+'",
            Token::Minus => "'-'",
            Token::Star => "'*'",
            Token::Slash => "'/'",
            Token::Percent => "'%'",
            Token::StarStar => "'**'",
            Token::Caret => "'^'",
            Token::Lt => "'<'",
            Token::LtEq => "'<='",
            Token::Gt => "'>'",
            Token::GtEq => "'>='",
            Token::EqEq => "'=='",
            Token::BangEq => "'!='",
            Token::LParen => "'('",
            Token::RParen => "')'",
            Token::Comma => "','",
            Token::Dot => "'.'",
            Token::LBracket => "'['",
            Token::RBracket => "']'",
            Token::LBrace => "'{'",
            Token::RBrace => "'}'",
            Token::Assign => "'='",
            Token::Colon => "':'",
            Token::Semicolon => "';'",
            Token::At => "'@'",
            Token::StringLiteral => "string literal",
        };
        f.write_str(text)
    }
}

/// Split formula text into tokens with their byte spans
pub fn tokenize(source: &str) -> Result<Vec<(Token, Range<usize>)>, FormulaError> {
    let mut tokens = Vec::new();
    for (result, span) in Token::lexer(source).spanned() {
        match result {
            Ok(token) => tokens.push((token, span)),
            Err(()) => {
                let found = source.get(span.clone()).unwrap_or("");
                return Err(FormulaError::syntax(
                    source,
                    Some(span.start),
                    format!("unexpected character '{}'", found),
                ));
            }
        }
    }
    Ok(tokens)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(source: &str) -> Vec<Token> {
        tokenize(source).unwrap().into_iter().map(|(t, _)| t).collect()
    }

    #[test]
    fn test_operators_prefer_longest_match() {
        assert_eq!(
            kinds("a ** 2 <= b == c"),
            vec![
                Token::Ident("a".into()),
                Token::StarStar,
                Token::Number("2".into()),
                Token::LtEq,
                Token::Ident("b".into()),
                Token::EqEq,
                Token::Ident("c".into()),
            ]
        );
    }

    #[test]
    fn test_keywords_and_identifiers() {
        assert_eq!(
            kinds("x if ifx else y"),
            vec![
                Token::Ident("x".into()),
                Token::If,
                Token::Ident("ifx".into()),
                Token::Else,
                Token::Ident("y".into()),
            ]
        );
    }

    #[test]
    fn test_numbers() {
        assert_eq!(
            kinds("5000.00 .5 7."),
            vec![
                Token::Number("5000.00".into()),
                Token::Number(".5".into()),
                Token::Number("7.".into()),
            ]
        );
    }

    #[test]
    fn test_rejected_constructs_still_lex() {
        assert_eq!(
            kinds("os.path['x']"),
            vec![
                Token::Ident("os".into()),
                Token::Dot,
                Token::Ident("path".into()),
                Token::LBracket,
                Token::StringLiteral,
                Token::RBracket,
            ]
        );
    }

    #[test]
    fn test_unknown_character_is_syntax_error() {
        let err = tokenize("salary $ 2").unwrap_err();
        assert!(matches!(err, FormulaError::Syntax { position: Some(7), .. }));
    }

    #[test]
    fn test_spans_are_byte_offsets() {
        let tokens = tokenize("ab + 12").unwrap();
        assert_eq!(tokens[0].1, 0..2);
        assert_eq!(tokens[1].1, 3..4);
        assert_eq!(tokens[2].1, 5..7);
    }
}
