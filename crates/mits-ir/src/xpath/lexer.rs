//! XPath tokenizer

use crate::{Error, Result};

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Token {
    Slash,
    DoubleSlash,
    LBracket,
    RBracket,
    LParen,
    RParen,
    At,
    Dot,
    DotDot,
    Comma,
    Pipe,
    Plus,
    Minus,
    Star,
    Eq,
    NotEq,
    Lt,
    LtEq,
    Gt,
    GtEq,
    DoubleColon,
    Literal(String),
    Number(f64),
    /// NCName, QName or `prefix:*`
    Name(String),
}

/// Token plus the byte offset where it starts.
pub(crate) type Spanned = (Token, usize);

fn is_name_start(c: char) -> bool {
    c.is_alphabetic() || c == '_'
}

fn is_name_char(c: char) -> bool {
    c.is_alphanumeric() || matches!(c, '_' | '-' | '.')
}

pub(crate) fn tokenize(expr: &str) -> Result<Vec<Spanned>> {
    let chars: Vec<(usize, char)> = expr.char_indices().collect();
    let mut tokens = Vec::new();
    let mut i = 0;

    let peek = |i: usize| chars.get(i).map(|&(_, c)| c);

    while i < chars.len() {
        let (start, c) = chars[i];
        if c.is_whitespace() {
            i += 1;
            continue;
        }

        let two = |t: Token, n: &mut usize| {
            *n += 2;
            t
        };

        let token = match c {
            '/' if peek(i + 1) == Some('/') => two(Token::DoubleSlash, &mut i),
            '/' => {
                i += 1;
                Token::Slash
            }
            '[' => {
                i += 1;
                Token::LBracket
            }
            ']' => {
                i += 1;
                Token::RBracket
            }
            '(' => {
                i += 1;
                Token::LParen
            }
            ')' => {
                i += 1;
                Token::RParen
            }
            '@' => {
                i += 1;
                Token::At
            }
            ',' => {
                i += 1;
                Token::Comma
            }
            '|' => {
                i += 1;
                Token::Pipe
            }
            '+' => {
                i += 1;
                Token::Plus
            }
            '-' => {
                i += 1;
                Token::Minus
            }
            '*' => {
                i += 1;
                Token::Star
            }
            '=' => {
                i += 1;
                Token::Eq
            }
            '!' if peek(i + 1) == Some('=') => two(Token::NotEq, &mut i),
            '<' if peek(i + 1) == Some('=') => two(Token::LtEq, &mut i),
            '<' => {
                i += 1;
                Token::Lt
            }
            '>' if peek(i + 1) == Some('=') => two(Token::GtEq, &mut i),
            '>' => {
                i += 1;
                Token::Gt
            }
            ':' if peek(i + 1) == Some(':') => two(Token::DoubleColon, &mut i),
            '.' if peek(i + 1) == Some('.') => two(Token::DotDot, &mut i),
            '.' if peek(i + 1).is_some_and(|d| d.is_ascii_digit()) => {
                let (n, next) = read_number(expr, &chars, i)?;
                i = next;
                Token::Number(n)
            }
            '.' => {
                i += 1;
                Token::Dot
            }
            '"' | '\'' => {
                let quote = c;
                let mut j = i + 1;
                while j < chars.len() && chars[j].1 != quote {
                    j += 1;
                }
                if j >= chars.len() {
                    return Err(Error::xpath_syntax(expr, start, "unterminated string literal"));
                }
                let body_start = chars[i].0 + 1;
                let body_end = chars[j].0;
                i = j + 1;
                Token::Literal(expr[body_start..body_end].to_string())
            }
            d if d.is_ascii_digit() => {
                let (n, next) = read_number(expr, &chars, i)?;
                i = next;
                Token::Number(n)
            }
            n if is_name_start(n) => {
                let mut j = i + 1;
                while j < chars.len() && is_name_char(chars[j].1) {
                    j += 1;
                }
                // prefix:local or prefix:* (but not axis::)
                if peek(j) == Some(':') && peek(j + 1) != Some(':') {
                    match peek(j + 1) {
                        Some('*') => j += 2,
                        Some(ch) if is_name_start(ch) => {
                            j += 2;
                            while j < chars.len() && is_name_char(chars[j].1) {
                                j += 1;
                            }
                        }
                        _ => {}
                    }
                }
                let end = chars.get(j).map_or(expr.len(), |&(o, _)| o);
                i = j;
                Token::Name(expr[start..end].to_string())
            }
            '$' => {
                return Err(Error::xpath_syntax(expr, start, "variables are not supported"));
            }
            other => {
                return Err(Error::xpath_syntax(
                    expr,
                    start,
                    format!("unexpected character '{other}'"),
                ));
            }
        };
        tokens.push((token, start));
    }

    Ok(tokens)
}

fn read_number(expr: &str, chars: &[(usize, char)], from: usize) -> Result<(f64, usize)> {
    let mut j = from;
    let mut seen_dot = false;
    while j < chars.len() {
        match chars[j].1 {
            d if d.is_ascii_digit() => j += 1,
            '.' if !seen_dot && chars.get(j + 1).is_none_or(|&(_, c)| c != '.') => {
                seen_dot = true;
                j += 1;
            }
            _ => break,
        }
    }
    let start = chars[from].0;
    let end = chars.get(j).map_or(expr.len(), |&(o, _)| o);
    expr[start..end]
        .parse::<f64>()
        .map(|n| (n, j))
        .map_err(|_| Error::xpath_syntax(expr, start, "invalid number"))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(expr: &str) -> Vec<Token> {
        tokenize(expr).unwrap().into_iter().map(|(t, _)| t).collect()
    }

    #[test]
    fn test_path_tokens() {
        assert_eq!(
            kinds("//mits:Property/@id"),
            vec![
                Token::DoubleSlash,
                Token::Name("mits:Property".into()),
                Token::Slash,
                Token::At,
                Token::Name("id".into()),
            ]
        );
    }

    #[test]
    fn test_operators_and_literals() {
        assert_eq!(
            kinds("string-length(normalize-space(.)) >= 1.5 and 'a' != \"b\""),
            vec![
                Token::Name("string-length".into()),
                Token::LParen,
                Token::Name("normalize-space".into()),
                Token::LParen,
                Token::Dot,
                Token::RParen,
                Token::RParen,
                Token::GtEq,
                Token::Number(1.5),
                Token::Name("and".into()),
                Token::Literal("a".into()),
                Token::NotEq,
                Token::Literal("b".into()),
            ]
        );
    }

    #[test]
    fn test_axis_and_wildcards() {
        assert_eq!(
            kinds("following-sibling::*[1] | p:*"),
            vec![
                Token::Name("following-sibling".into()),
                Token::DoubleColon,
                Token::Star,
                Token::LBracket,
                Token::Number(1.0),
                Token::RBracket,
                Token::Pipe,
                Token::Name("p:*".into()),
            ]
        );
    }

    #[test]
    fn test_parent_and_number_with_leading_dot() {
        assert_eq!(kinds("../.5"), vec![Token::DotDot, Token::Slash, Token::Number(0.5)]);
    }

    #[test]
    fn test_errors() {
        assert!(tokenize("'open").is_err());
        assert!(tokenize("$var").is_err());
        assert!(tokenize("a # b").is_err());
    }
}
