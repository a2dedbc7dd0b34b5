//! Tokenizer and recursive-descent parser for target expressions.
//!
//! ```text
//! target     := call | seriesList
//! call       := IDENT "(" arg ("," arg)* ")"
//! arg        := call | seriesList | number | string | bool
//! ```
//!
//! A series list is any run of characters other than `(`, `)`, `,`, quotes
//! and whitespace; commas are allowed inside `{...}` alternation.

use crate::error::{Error, Result};

/// A parsed target expression.
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    /// Metric name pattern, possibly with `{a,b}` alternation.
    SeriesList(String),
    Call { function: String, args: Vec<Expr> },
    Number(f64),
    String(String),
    Bool(bool),
}

#[derive(Debug, Clone, PartialEq)]
enum Token {
    LParen,
    RParen,
    Comma,
    Word(String),
    Str(String),
    Number(f64),
    Bool(bool),
}

/// A token with the source text it was read from, for error reporting.
#[derive(Debug, Clone, PartialEq)]
struct Lexeme {
    token: Token,
    text: String,
}

fn tokenize(input: &str) -> Result<Vec<Lexeme>> {
    let mut lexemes = Vec::new();
    let mut chars = input.char_indices().peekable();

    while let Some(&(pos, c)) = chars.peek() {
        let punct = match c {
            '(' => Some(Token::LParen),
            ')' => Some(Token::RParen),
            ',' => Some(Token::Comma),
            _ => None,
        };
        if let Some(token) = punct {
            chars.next();
            lexemes.push(Lexeme {
                token,
                text: c.to_string(),
            });
            continue;
        }
        if c.is_whitespace() {
            chars.next();
            continue;
        }

        if c == '"' || c == '\'' {
            chars.next();
            let mut value = String::new();
            let mut end = None;
            while let Some((i, ch)) = chars.next() {
                if ch == '\\' {
                    match chars.next() {
                        Some((_, escaped)) => value.push(escaped),
                        None => break,
                    }
                } else if ch == c {
                    end = Some(i + 1);
                    break;
                } else {
                    value.push(ch);
                }
            }
            let Some(end) = end else {
                return Err(Error::parse("unterminated string literal", &input[pos..]));
            };
            lexemes.push(Lexeme {
                token: Token::Str(value),
                text: input[pos..end].to_string(),
            });
            continue;
        }

        let mut depth = 0usize;
        let mut end = pos;
        while let Some(&(i, ch)) = chars.peek() {
            match ch {
                '{' => depth += 1,
                '}' if depth == 0 => {
                    return Err(Error::parse("unbalanced '}'", &input[pos..=i]));
                }
                '}' => depth -= 1,
                '(' | ')' | ',' | '"' | '\'' if depth == 0 => break,
                ch if ch.is_whitespace() && depth == 0 => break,
                _ => {}
            }
            end = i + ch.len_utf8();
            chars.next();
        }
        if depth > 0 {
            return Err(Error::parse("unterminated '{'", &input[pos..]));
        }

        let word = &input[pos..end];
        let token = match word {
            "true" => Token::Bool(true),
            "false" => Token::Bool(false),
            w if is_number(w) => match w.parse::<f64>() {
                Ok(n) => Token::Number(n),
                Err(_) => return Err(Error::parse("invalid number", w)),
            },
            w => Token::Word(w.to_string()),
        };
        lexemes.push(Lexeme {
            token,
            text: word.to_string(),
        });
    }

    Ok(lexemes)
}

/// Optional sign, digits, at most one decimal point.
fn is_number(word: &str) -> bool {
    let unsigned = word.strip_prefix(['+', '-']).unwrap_or(word);
    let mut seen_digit = false;
    let mut seen_dot = false;
    for c in unsigned.chars() {
        match c {
            '0'..='9' => seen_digit = true,
            '.' if !seen_dot => seen_dot = true,
            _ => return false,
        }
    }
    seen_digit
}

fn is_identifier(word: &str) -> bool {
    let mut chars = word.chars();
    matches!(chars.next(), Some(c) if c.is_ascii_alphabetic() || c == '_')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

/// Deepest call nesting a target may use.
pub const MAX_NESTING: usize = 512;

struct Parser {
    lexemes: Vec<Lexeme>,
    pos: usize,
    depth: usize,
}

impl Parser {
    fn peek(&self) -> Option<&Lexeme> {
        self.lexemes.get(self.pos)
    }

    fn next(&mut self) -> Option<Lexeme> {
        let lexeme = self.lexemes.get(self.pos).cloned();
        self.pos += 1;
        lexeme
    }

    fn parse_target(&mut self) -> Result<Expr> {
        match self.peek() {
            Some(Lexeme {
                token: Token::Word(_),
                ..
            }) => self.parse_word(),
            Some(lexeme) => Err(Error::parse(
                "target must be a series list or function call",
                lexeme.text.clone(),
            )),
            None => Err(Error::parse("empty target", "")),
        }
    }

    fn parse_arg(&mut self) -> Result<Expr> {
        let Some(lexeme) = self.peek().cloned() else {
            return Err(Error::parse("expected argument", "end of input"));
        };
        match lexeme.token {
            Token::Word(_) => self.parse_word(),
            Token::Number(n) => {
                self.pos += 1;
                Ok(Expr::Number(n))
            }
            Token::Str(s) => {
                self.pos += 1;
                Ok(Expr::String(s))
            }
            Token::Bool(b) => {
                self.pos += 1;
                Ok(Expr::Bool(b))
            }
            Token::LParen | Token::RParen | Token::Comma => {
                Err(Error::parse("expected argument", lexeme.text))
            }
        }
    }

    fn parse_word(&mut self) -> Result<Expr> {
        let Some(Lexeme {
            token: Token::Word(word),
            ..
        }) = self.next()
        else {
            return Err(Error::Internal("parse_word called on non-word".to_string()));
        };

        if !matches!(self.peek().map(|l| &l.token), Some(Token::LParen)) {
            return Ok(Expr::SeriesList(word));
        }
        if !is_identifier(&word) {
            return Err(Error::parse("invalid function name", word));
        }
        self.pos += 1;
        if self.depth == MAX_NESTING {
            return Err(Error::parse(
                "expression nested too deeply",
                format!("{}(", word),
            ));
        }
        self.depth += 1;

        let mut args = vec![self.parse_arg()?];
        loop {
            match self.next() {
                Some(Lexeme {
                    token: Token::Comma,
                    ..
                }) => args.push(self.parse_arg()?),
                Some(Lexeme {
                    token: Token::RParen,
                    ..
                }) => break,
                Some(lexeme) => return Err(Error::parse("expected ',' or ')'", lexeme.text)),
                None => return Err(Error::parse("unclosed call", format!("{}(", word))),
            }
        }

        self.depth -= 1;
        Ok(Expr::Call {
            function: word,
            args,
        })
    }
}

/// Parses a target expression into an [`Expr`] tree.
pub fn parse(input: &str) -> Result<Expr> {
    let mut parser = Parser {
        lexemes: tokenize(input)?,
        pos: 0,
        depth: 0,
    };
    let expr = parser.parse_target()?;
    if let Some(extra) = parser.peek() {
        return Err(Error::parse("unexpected trailing input", extra.text.clone()));
    }
    Ok(expr)
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;
    use rstest::rstest;

    use super::*;

    fn series(pattern: &str) -> Expr {
        Expr::SeriesList(pattern.to_string())
    }

    fn call(function: &str, args: Vec<Expr>) -> Expr {
        Expr::Call {
            function: function.to_string(),
            args,
        }
    }

    #[rstest]
    #[case("server1.loadavg5", series("server1.loadavg5"))]
    #[case("server{1,2}.loadavg5", series("server{1,2}.loadavg5"))]
    #[case("servers.*.cpu-[0-3]", series("servers.*.cpu-[0-3]"))]
    #[case(
        r#"alias(server1.loadavg5,"server01.loadavg5")"#,
        call("alias", vec![series("server1.loadavg5"), Expr::String("server01.loadavg5".into())])
    )]
    #[case(
        "alias(alias(a.b, 'x'), \"y\")",
        call("alias", vec![
            call("alias", vec![series("a.b"), Expr::String("x".into())]),
            Expr::String("y".into()),
        ])
    )]
    #[case(
        "scale(role.{a,b}.metric, -1.5)",
        call("scale", vec![series("role.{a,b}.metric"), Expr::Number(-1.5)])
    )]
    #[case(
        "group(a.b, c.d, true, 3)",
        call("group", vec![series("a.b"), series("c.d"), Expr::Bool(true), Expr::Number(3.0)])
    )]
    #[case(
        r#"alias(a, "with \"quote\"")"#,
        call("alias", vec![series("a"), Expr::String("with \"quote\"".into())])
    )]
    fn should_parse_target(#[case] input: &str, #[case] expected: Expr) {
        assert_eq!(parse(input).unwrap(), expected);
    }

    #[rstest]
    #[case("", "")]
    #[case("alias(a.b", "alias(")]
    #[case("alias(a.b, \"x)", "\"x)")]
    #[case("alias()", ")")]
    #[case("alias(a.b,)", ")")]
    #[case("a.b)", ")")]
    #[case("42", "42")]
    #[case("server{1,2.cpu", "server{1,2.cpu")]
    #[case("a.b}", "a.b}")]
    #[case("a.b(c)", "a.b")]
    #[case("alias(a b)", "b")]
    fn should_report_offending_fragment(#[case] input: &str, #[case] fragment: &str) {
        // when
        let err = parse(input).unwrap_err();

        // then
        match err {
            Error::Parse { fragment: got, .. } => assert_eq!(got, fragment),
            other => panic!("expected parse error, got {:?}", other),
        }
    }

    fn nested(depth: usize) -> String {
        format!("{}a.b{}", "group(".repeat(depth), ")".repeat(depth))
    }

    #[test]
    fn should_parse_target_at_nesting_limit() {
        // when
        let expr = parse(&nested(MAX_NESTING)).unwrap();

        // then
        let mut depth = 0;
        let mut node = &expr;
        while let Expr::Call { args, .. } = node {
            depth += 1;
            node = &args[0];
        }
        assert_eq!(depth, MAX_NESTING);
        assert_eq!(node, &series("a.b"));
    }

    #[rstest]
    #[case(MAX_NESTING + 1)]
    #[case(100_000)]
    fn should_reject_target_nested_past_limit(#[case] depth: usize) {
        // when
        let err = parse(&nested(depth)).unwrap_err();

        // then
        assert_eq!(err, Error::parse("expression nested too deeply", "group("));
        assert!(err.is_client_error());
    }

    #[rstest]
    #[case("1", true)]
    #[case("-2.5", true)]
    #[case("+.5", true)]
    #[case("1.2.3", false)]
    #[case("1m", false)]
    #[case("-", false)]
    #[case(".", false)]
    fn should_recognize_numbers(#[case] word: &str, #[case] expected: bool) {
        assert_eq!(is_number(word), expected);
    }

    proptest! {
        #[test]
        fn should_tokenize_integers_as_numbers(n in -1_000_000i64..1_000_000) {
            let lexemes = tokenize(&n.to_string()).unwrap();
            prop_assert_eq!(lexemes.len(), 1);
            prop_assert_eq!(&lexemes[0].token, &Token::Number(n as f64));
        }

        #[test]
        fn should_tokenize_dotted_paths_as_single_word(
            parts in prop::collection::vec("[a-z][a-z0-9_]{0,8}", 1..5)
        ) {
            let path = parts.join(".");
            let lexemes = tokenize(&path).unwrap();
            prop_assert_eq!(lexemes.len(), 1);
            let expected = match path.as_str() {
                "true" => Token::Bool(true),
                "false" => Token::Bool(false),
                _ => Token::Word(path.clone()),
            };
            prop_assert_eq!(&lexemes[0].token, &expected);
        }
    }
}
