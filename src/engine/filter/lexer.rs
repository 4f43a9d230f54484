//! Filter tokenizer

use crate::engine::error::{ConnectorError, Result};

#[derive(Debug, Clone, PartialEq)]
pub enum TokenKind {
    LParen,
    RParen,
    Comma,
    /// Operator punctuation: `=`, `==`, `!=`, `<>`, `>=`, `<=`, `>`, `<`, `&&`, `||`
    Symbol(&'static str),
    /// Identifier, number, keyword or sigil-prefixed parameter
    Word(String),
    /// Quoted string, raw text including the quotes
    Str(String),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Token {
    pub kind: TokenKind,
    pub start: usize,
    pub end: usize,
}

impl Token {
    /// Case-insensitive keyword check
    pub fn is_keyword(&self, keyword: &str) -> bool {
        matches!(&self.kind, TokenKind::Word(w) if w.eq_ignore_ascii_case(keyword))
    }
}

const SYMBOLS: [&str; 10] = ["==", "!=", "<>", ">=", "<=", "&&", "||", "=", ">", "<"];

fn is_word_char(c: char) -> bool {
    c.is_alphanumeric() || matches!(c, '_' | '.' | ':' | '@' | '-' | '+' | '%' | '$' | '*')
}

pub fn tokenize(src: &str) -> Result<Vec<Token>> {
    let mut tokens = Vec::new();
    let mut chars = src.char_indices().peekable();

    while let Some(&(start, c)) = chars.peek() {
        if c.is_whitespace() {
            chars.next();
            continue;
        }

        let single = match c {
            '(' => Some(TokenKind::LParen),
            ')' => Some(TokenKind::RParen),
            ',' => Some(TokenKind::Comma),
            _ => None,
        };
        if let Some(kind) = single {
            chars.next();
            tokens.push(Token { kind, start, end: start + 1 });
            continue;
        }

        if c == '\'' || c == '"' {
            let end = scan_string(src, start, c)?;
            // advance past the consumed string
            while let Some(&(i, _)) = chars.peek() {
                if i >= end {
                    break;
                }
                chars.next();
            }
            tokens.push(Token {
                kind: TokenKind::Str(src[start..end].to_string()),
                start,
                end,
            });
            continue;
        }

        if let Some(&symbol) = SYMBOLS.iter().find(|s| src[start..].starts_with(**s)) {
            for _ in 0..symbol.len() {
                chars.next();
            }
            tokens.push(Token {
                kind: TokenKind::Symbol(symbol),
                start,
                end: start + symbol.len(),
            });
            continue;
        }

        if is_word_char(c) {
            let mut end = start;
            while let Some(&(i, ch)) = chars.peek() {
                if !is_word_char(ch) {
                    break;
                }
                end = i + ch.len_utf8();
                chars.next();
            }
            tokens.push(Token {
                kind: TokenKind::Word(src[start..end].to_string()),
                start,
                end,
            });
            continue;
        }

        return Err(ConnectorError::BadFilter(format!(
            "unexpected character '{}' at position {}",
            c, start
        )));
    }

    Ok(tokens)
}

/// Returns the byte offset just past the closing quote. A doubled quote is an escaped quote.
fn scan_string(src: &str, start: usize, quote: char) -> Result<usize> {
    let bytes = src.as_bytes();
    let q = quote as u8;
    let mut i = start + 1;
    while i < bytes.len() {
        if bytes[i] == q {
            if i + 1 < bytes.len() && bytes[i + 1] == q {
                i += 2;
                continue;
            }
            return Ok(i + 1);
        }
        i += 1;
    }
    Err(ConnectorError::BadFilter(format!(
        "unterminated string starting at position {}",
        start
    )))
}
