//! Tokenizer for formula expressions.

use super::ExprError;

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Token {
    Int(i64),
    Float(f64),
    Str(String),
    Ident(String),
    /// Operators and punctuation, e.g. `+`, `//`, `**`, `<=`, `(`.
    Symbol(&'static str),
}

/// A token plus its byte offset in the source, for error reporting.
#[derive(Debug, Clone)]
pub(crate) struct Spanned {
    pub token: Token,
    pub offset: usize,
}

/// Longest symbols first so `**` wins over `*`.
const SYMBOLS: &[&str] = &[
    "**", "//", "==", "!=", "<=", ">=", "+", "-", "*", "/", "%", "<", ">", "(", ")", "[", "]",
    ",", ".",
];

pub(crate) fn tokenize(source: &str) -> Result<Vec<Spanned>, ExprError> {
    let mut tokens = Vec::new();
    let bytes = source.as_bytes();
    let mut pos = 0;

    while pos < source.len() {
        let rest = &source[pos..];
        let Some(ch) = rest.chars().next() else {
            break;
        };

        if ch.is_whitespace() {
            pos += ch.len_utf8();
            continue;
        }

        if ch.is_ascii_digit() || (ch == '.' && bytes.get(pos + 1).is_some_and(u8::is_ascii_digit))
        {
            let (token, len) = lex_number(rest, pos)?;
            tokens.push(Spanned { token, offset: pos });
            pos += len;
            continue;
        }

        if ch == '"' || ch == '\'' {
            let (value, len) = lex_string(rest, ch, pos)?;
            tokens.push(Spanned {
                token: Token::Str(value),
                offset: pos,
            });
            pos += len;
            continue;
        }

        if ch.is_alphabetic() || ch == '_' {
            let len = rest
                .char_indices()
                .find(|(_, c)| !(c.is_alphanumeric() || *c == '_'))
                .map_or(rest.len(), |(i, _)| i);
            tokens.push(Spanned {
                token: Token::Ident(rest[..len].to_string()),
                offset: pos,
            });
            pos += len;
            continue;
        }

        if let Some(sym) = SYMBOLS.iter().find(|s| rest.starts_with(**s)) {
            tokens.push(Spanned {
                token: Token::Symbol(*sym),
                offset: pos,
            });
            pos += sym.len();
            continue;
        }

        return Err(ExprError::Syntax {
            offset: pos,
            message: format!("unexpected character '{ch}'"),
        });
    }

    Ok(tokens)
}

fn lex_number(rest: &str, offset: usize) -> Result<(Token, usize), ExprError> {
    let bytes = rest.as_bytes();
    let mut len = 0;
    let mut is_float = false;

    while len < bytes.len() && (bytes[len].is_ascii_digit() || bytes[len] == b'_') {
        len += 1;
    }
    if len < bytes.len() && bytes[len] == b'.' {
        is_float = true;
        len += 1;
        while len < bytes.len() && bytes[len].is_ascii_digit() {
            len += 1;
        }
    }
    if len < bytes.len() && (bytes[len] == b'e' || bytes[len] == b'E') {
        let mut exp_len = len + 1;
        if exp_len < bytes.len() && (bytes[exp_len] == b'+' || bytes[exp_len] == b'-') {
            exp_len += 1;
        }
        if exp_len < bytes.len() && bytes[exp_len].is_ascii_digit() {
            while exp_len < bytes.len() && bytes[exp_len].is_ascii_digit() {
                exp_len += 1;
            }
            is_float = true;
            len = exp_len;
        }
    }

    let text: String = rest[..len].chars().filter(|c| *c != '_').collect();
    let invalid = || ExprError::Syntax {
        offset,
        message: format!("invalid number literal '{}'", &rest[..len]),
    };

    let token = if is_float {
        Token::Float(text.parse().map_err(|_| invalid())?)
    } else {
        Token::Int(text.parse().map_err(|_| invalid())?)
    };
    Ok((token, len))
}

fn lex_string(rest: &str, quote: char, offset: usize) -> Result<(String, usize), ExprError> {
    let mut value = String::new();
    let mut chars = rest.char_indices().skip(1);

    while let Some((i, c)) = chars.next() {
        if c == quote {
            return Ok((value, i + c.len_utf8()));
        }
        if c == '\\' {
            match chars.next() {
                Some((_, 'n')) => value.push('\n'),
                Some((_, 't')) => value.push('\t'),
                Some((_, escaped)) => value.push(escaped),
                None => break,
            }
            continue;
        }
        value.push(c);
    }

    Err(ExprError::Syntax {
        offset,
        message: "unterminated string literal".to_string(),
    })
}
