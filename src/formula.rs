//! Parser for additive formula strings such as `"count ~ -1 + temp + square(temp)"`.

use crate::error::ResolutionError;
use crate::formulation::{Arg, Term};

/// A formula after parsing: target, intercept flag and de-duplicated terms.
#[derive(Clone, Debug, PartialEq)]
pub struct ParsedFormula {
    pub target: Term,
    pub intercept: bool,
    pub terms: Vec<Term>,
}

#[derive(Clone, Debug, PartialEq)]
enum Token {
    Name(String),
    Number(f64),
    LParen,
    RParen,
    Comma,
    Plus,
    Minus,
    Tilde,
}

type Spanned = (usize, Token);

fn tokenize(input: &str) -> Result<Vec<Spanned>, ResolutionError> {
    let mut tokens = Vec::new();
    let mut chars = input.char_indices().peekable();

    while let Some(&(start, c)) = chars.peek() {
        let token = match c {
            c if c.is_whitespace() => {
                chars.next();
                continue;
            }
            '(' => Token::LParen,
            ')' => Token::RParen,
            ',' => Token::Comma,
            '+' => Token::Plus,
            '-' => Token::Minus,
            '~' => Token::Tilde,
            '`' => {
                chars.next();
                let mut name = String::new();
                loop {
                    match chars.next() {
                        // A doubled backtick stands for a literal one.
                        Some((_, '`')) if matches!(chars.peek(), Some((_, '`'))) => {
                            chars.next();
                            name.push('`');
                        }
                        Some((_, '`')) => break,
                        Some((_, c)) => name.push(c),
                        None => return Err(ResolutionError::syntax(start, "unterminated `")),
                    }
                }
                if name.is_empty() {
                    return Err(ResolutionError::syntax(start, "empty quoted name"));
                }
                tokens.push((start, Token::Name(name)));
                continue;
            }
            c if c.is_ascii_digit() || c == '.' => {
                let mut end = start;
                let mut previous = ' ';
                while let Some(&(index, c)) = chars.peek() {
                    let exponent_sign = (c == '+' || c == '-') && matches!(previous, 'e' | 'E');
                    if c.is_ascii_alphanumeric() || c == '.' || exponent_sign {
                        end = index + c.len_utf8();
                        previous = c;
                        chars.next();
                    } else {
                        break;
                    }
                }
                let raw = &input[start..end];
                let value = raw.parse::<f64>().map_err(|_| {
                    ResolutionError::syntax(start, format!("invalid number `{raw}`"))
                })?;
                tokens.push((start, Token::Number(value)));
                continue;
            }
            c if c.is_ascii_alphabetic() || c == '_' => {
                let mut name = String::new();
                while let Some(&(_, c)) = chars.peek() {
                    if c.is_ascii_alphanumeric() || c == '_' || c == '.' {
                        name.push(c);
                        chars.next();
                    } else {
                        break;
                    }
                }
                tokens.push((start, Token::Name(name)));
                continue;
            }
            other => {
                return Err(ResolutionError::syntax(
                    start,
                    format!("unexpected character `{other}`"),
                ))
            }
        };
        chars.next();
        tokens.push((start, token));
    }

    Ok(tokens)
}

struct Parser {
    tokens: Vec<Spanned>,
    cursor: usize,
    end: usize,
}

impl Parser {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.cursor).map(|(_, token)| token)
    }

    fn position(&self) -> usize {
        self.tokens
            .get(self.cursor)
            .map_or(self.end, |(position, _)| *position)
    }

    fn next(&mut self) -> Option<Token> {
        let token = self.tokens.get(self.cursor).map(|(_, token)| token.clone());
        if token.is_some() {
            self.cursor += 1;
        }
        token
    }

    fn expect(&mut self, expected: Token, what: &str) -> Result<(), ResolutionError> {
        let position = self.position();
        match self.next() {
            Some(token) if token == expected => Ok(()),
            _ => Err(ResolutionError::syntax(position, format!("expected {what}"))),
        }
    }

    fn name(&mut self, what: &str) -> Result<String, ResolutionError> {
        let position = self.position();
        match self.next() {
            Some(Token::Name(name)) => Ok(name),
            _ => Err(ResolutionError::syntax(position, format!("expected {what}"))),
        }
    }

    fn term(&mut self) -> Result<Term, ResolutionError> {
        let name = self.name("a column or function name")?;
        if self.peek() != Some(&Token::LParen) {
            return Ok(Term::Column { name });
        }
        self.next();

        let column = self.name("a column name as the first argument")?;
        let mut args = Vec::new();
        while self.peek() == Some(&Token::Comma) {
            self.next();
            args.push(self.arg()?);
        }
        self.expect(Token::RParen, "`)`")?;

        Ok(Term::Call {
            function: name,
            column,
            args,
        })
    }

    fn arg(&mut self) -> Result<Arg, ResolutionError> {
        let position = self.position();
        match self.next() {
            Some(Token::Name(name)) => Ok(Arg::Column(name)),
            Some(Token::Number(value)) => Ok(Arg::Value(value)),
            Some(Token::Minus) => match self.next() {
                Some(Token::Number(value)) => Ok(Arg::Value(-value)),
                _ => Err(ResolutionError::syntax(position, "expected a number after `-`")),
            },
            _ => Err(ResolutionError::syntax(position, "expected an argument")),
        }
    }
}

/// Parses `target ~ rhs` into its target, intercept flag and terms.
pub fn parse(formula: &str) -> Result<ParsedFormula, ResolutionError> {
    let mut parser = Parser {
        tokens: tokenize(formula)?,
        cursor: 0,
        end: formula.len(),
    };

    let target = parser.term()?;
    parser.expect(Token::Tilde, "`~`")?;

    let mut intercept = true;
    let mut terms: Vec<Term> = Vec::new();
    let mut first = true;

    while parser.peek().is_some() || first {
        let position = parser.position();
        let add = match parser.peek() {
            Some(Token::Plus) => {
                parser.next();
                true
            }
            Some(Token::Minus) => {
                parser.next();
                false
            }
            _ if first => true,
            _ => return Err(ResolutionError::syntax(position, "expected `+` or `-`")),
        };
        first = false;

        let item_position = parser.position();
        match parser.peek() {
            Some(Token::Number(value)) if *value == 1.0 || *value == 0.0 => {
                let one = *value == 1.0;
                parser.next();
                intercept = add == one;
            }
            Some(Token::Number(_)) => {
                return Err(ResolutionError::syntax(
                    item_position,
                    "only 0 and 1 may appear as bare numbers",
                ))
            }
            _ => {
                let term = parser.term()?;
                if add {
                    if !terms.contains(&term) {
                        terms.push(term);
                    }
                } else {
                    terms.retain(|existing| existing != &term);
                }
            }
        }
    }

    Ok(ParsedFormula {
        target,
        intercept,
        terms,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_generated_formula() {
        let parsed = parse("count ~ -1 + temp + power(temp, 2) + interact(temp, season, -1.5)")
            .expect("valid formula");
        assert_eq!(parsed.target, Term::column("count"));
        assert!(!parsed.intercept);
        assert_eq!(
            parsed.terms,
            vec![
                Term::column("temp"),
                Term::call("power", "temp", vec![Arg::Value(2.0)]),
                Term::call(
                    "interact",
                    "temp",
                    vec![Arg::Column("season".into()), Arg::Value(-1.5)]
                ),
            ]
        );
    }

    #[test]
    fn intercept_markers_and_term_removal() {
        assert!(parse("y ~ x").unwrap().intercept);
        assert!(parse("y ~ 1 + x").unwrap().intercept);
        assert!(!parse("y ~ 0 + x").unwrap().intercept);
        assert!(parse("y ~ -1 + x - 0").unwrap().intercept);

        let parsed = parse("y ~ a + b + a - b").unwrap();
        assert_eq!(parsed.terms, vec![Term::column("a")]);
    }

    #[test]
    fn quoted_names_round_trip() {
        let parsed = parse("`total count` ~ `wind speed`").unwrap();
        assert_eq!(parsed.target, Term::column("total count"));
        assert_eq!(parsed.terms, vec![Term::column("wind speed")]);
    }

    #[test]
    fn doubled_backticks_escape_a_backtick() {
        let parsed = parse("y ~ `te``mp` + f(`a``b`, 1)").unwrap();
        assert_eq!(
            parsed.terms,
            vec![
                Term::column("te`mp"),
                Term::call("f", "a`b", vec![Arg::Value(1.0)]),
            ]
        );

        let rendered = format!("y ~ {}", Term::column("te`mp"));
        assert_eq!(rendered, "y ~ `te``mp`");
        assert_eq!(parse(&rendered).unwrap().terms, vec![Term::column("te`mp")]);
    }

    #[test]
    fn reports_syntax_errors_with_position() {
        let missing_tilde = parse("y + x").unwrap_err();
        assert_eq!(missing_tilde, ResolutionError::syntax(2, "expected `~`"));

        assert!(matches!(parse("y ~"), Err(ResolutionError::Syntax { position: 3, .. })));
        assert!(matches!(parse("y ~ x +"), Err(ResolutionError::Syntax { .. })));
        assert!(matches!(parse("y ~ x z"), Err(ResolutionError::Syntax { .. })));
        assert!(matches!(parse("y ~ 2 + x"), Err(ResolutionError::Syntax { .. })));
        assert!(matches!(parse("y ~ f(x"), Err(ResolutionError::Syntax { .. })));
        assert!(matches!(parse("y ~ f(2)"), Err(ResolutionError::Syntax { .. })));
        assert!(matches!(parse("y ~ x$"), Err(ResolutionError::Syntax { .. })));
    }
}
