//! Tokenization using logos.

use std::ops::Range;

use logos::Logos;

use crate::SyntaxError;

#[derive(Logos, Debug, Clone, PartialEq)]
#[logos(skip r"[ \t\r\n]+")]
pub enum Tok {
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
    #[token(".")]
    Dot,
    #[token("?")]
    Question,
    #[token(":")]
    Colon,
    #[token("!")]
    Bang,
    #[token("+")]
    Plus,
    #[token("-")]
    Minus,
    #[token("==")]
    EqEq,
    #[token("!=")]
    Ne,
    #[token("<")]
    Lt,
    #[token("<=")]
    Le,
    #[token(">")]
    Gt,
    #[token(">=")]
    Ge,
    #[token("&&")]
    AndAnd,
    #[token("||")]
    OrOr,
    #[token("in")]
    In,
    #[token("true")]
    True,
    #[token("false")]
    False,
    #[token("null")]
    Null,
    #[regex(r"[A-Za-z_][A-Za-z0-9_]*", |lex| lex.slice().to_string())]
    Ident(String),
    /// Magnitude only; the parser applies a leading `-` and range-checks.
    #[regex(r"[0-9]+", |lex| lex.slice().parse::<u64>().ok())]
    Int(u64),
    #[regex(r"[0-9]+\.[0-9]+([eE][+-]?[0-9]+)?", |lex| lex.slice().parse::<f64>().ok())]
    #[regex(r"[0-9]+[eE][+-]?[0-9]+", |lex| lex.slice().parse::<f64>().ok())]
    Float(f64),
    #[regex(r#""([^"\\\n]|\\.)*""#, |lex| unquote(lex.slice()))]
    #[regex(r"'([^'\\\n]|\\.)*'", |lex| unquote(lex.slice()))]
    Str(String),
}

impl Tok {
    pub fn describe(&self) -> String {
        match self {
            Tok::Ident(s) => format!("identifier '{s}'"),
            Tok::Int(n) => format!("integer {n}"),
            Tok::Float(f) => format!("number {f}"),
            Tok::Str(s) => format!("string {s:?}"),
            other => format!("{other:?}"),
        }
    }
}

/// Strip the surrounding quotes and resolve escapes.
fn unquote(lit: &str) -> Option<String> {
    let body = lit.get(1..lit.len().checked_sub(1)?)?;
    let mut out = String::with_capacity(body.len());
    let mut chars = body.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next()? {
            '\\' => out.push('\\'),
            '"' => out.push('"'),
            '\'' => out.push('\''),
            'n' => out.push('\n'),
            't' => out.push('\t'),
            'r' => out.push('\r'),
            _ => return None,
        }
    }
    Some(out)
}

pub fn tokenize(source: &str) -> Result<Vec<(Tok, Range<usize>)>, SyntaxError> {
    let mut lexer = Tok::lexer(source);
    let mut out = Vec::new();
    while let Some(res) = lexer.next() {
        let span = lexer.span();
        match res {
            Ok(tok) => out.push((tok, span)),
            Err(()) => {
                return Err(SyntaxError {
                    offset: span.start,
                    message: format!("unexpected input {:?}", lexer.slice()),
                })
            }
        }
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(src: &str) -> Vec<Tok> {
        tokenize(src).unwrap().into_iter().map(|(t, _)| t).collect()
    }

    #[test]
    fn keywords_win_over_identifiers_only_on_exact_match() {
        assert_eq!(kinds("in index"), vec![Tok::In, Tok::Ident("index".into())]);
        assert_eq!(kinds("true nullable"), vec![Tok::True, Tok::Ident("nullable".into())]);
    }

    #[test]
    fn strings_resolve_escapes_in_both_quote_styles() {
        assert_eq!(kinds(r#""a\"b""#), vec![Tok::Str("a\"b".into())]);
        assert_eq!(kinds(r"'it\'s'"), vec![Tok::Str("it's".into())]);
        assert_eq!(kinds(r#""kueue.x-k8s.io/queue-name""#), vec![Tok::Str("kueue.x-k8s.io/queue-name".into())]);
    }

    #[test]
    fn two_char_operators() {
        assert_eq!(
            kinds("<= >= == != && ||"),
            vec![Tok::Le, Tok::Ge, Tok::EqEq, Tok::Ne, Tok::AndAnd, Tok::OrOr]
        );
    }

    #[test]
    fn numbers() {
        assert_eq!(kinds("42 1.5"), vec![Tok::Int(42), Tok::Float(1.5)]);
        assert_eq!(kinds("1e3 2.5E-2"), vec![Tok::Float(1000.0), Tok::Float(0.025)]);
        assert_eq!(kinds("9223372036854775808"), vec![Tok::Int(1 << 63)]);
    }

    #[test]
    fn rejects_stray_characters_and_bad_escapes() {
        assert_eq!(tokenize("a # b").unwrap_err().offset, 2);
        assert!(tokenize(r#""\q""#).is_err());
        assert!(tokenize("\"unterminated").is_err());
    }
}
