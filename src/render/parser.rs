//! Template parser - text to a tagged directive tree.
//!
//! Two delimiter pairs: `{{ expr }}` for output and `{% stmt %}` for control
//! flow. Everything else is literal text, passed through byte-for-byte.

use super::RenderError;

/// One piece of a parsed template, in document order.
#[derive(Debug, Clone, PartialEq)]
pub enum Segment {
    /// Literal text copied to the output unchanged.
    Literal(String),
    /// `{{ expr }}` - evaluate and substitute.
    Output(Expr),
    /// `{% if %}...{% elif %}...{% else %}...{% endif %}`.
    If {
        /// (condition, body) pairs: the `if` arm then any `elif` arms.
        branches: Vec<(Expr, Vec<Segment>)>,
        otherwise: Vec<Segment>,
    },
    /// `{% for var in expr %}...{% endfor %}`.
    For {
        var: String,
        iterable: Expr,
        body: Vec<Segment>,
    },
}

/// Expression grammar: literals, dotted variable paths, negation, equality.
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    /// Dotted variable reference, e.g. `vpc.cidr`. Stored segmented, the
    /// original spelling is reconstructed for error messages.
    Var(Vec<String>),
    Str(String),
    Int(i64),
    Bool(bool),
    Not(Box<Expr>),
    Eq(Box<Expr>, Box<Expr>),
    Ne(Box<Expr>, Box<Expr>),
}

impl Expr {
    /// Source spelling for diagnostics.
    pub fn display(&self) -> String {
        match self {
            Expr::Var(path) => path.join("."),
            Expr::Str(s) => format!("\"{}\"", s),
            Expr::Int(i) => i.to_string(),
            Expr::Bool(b) => b.to_string(),
            Expr::Not(inner) => format!("not {}", inner.display()),
            Expr::Eq(a, b) => format!("{} == {}", a.display(), b.display()),
            Expr::Ne(a, b) => format!("{} != {}", a.display(), b.display()),
        }
    }
}

/// Raw lexer token: literal text or one tag with its line number.
#[derive(Debug)]
enum Token {
    Literal(String),
    /// `{{ ... }}`
    Output(String, usize),
    /// `{% ... %}`
    Statement(String, usize),
}

/// Parse template text into a segment tree.
pub fn parse(text: &str) -> Result<Vec<Segment>, RenderError> {
    let tokens = lex(text)?;
    let mut stream = tokens.into_iter().peekable();
    let segments = parse_block(&mut stream, None)?;
    if let Some(token) = stream.next() {
        let (name, line) = match token {
            Token::Statement(s, line) => (s, line),
            _ => unreachable!("parse_block only stops at statements"),
        };
        return Err(RenderError::Syntax {
            line,
            message: format!("unexpected `{{% {} %}}`", name),
        });
    }
    Ok(segments)
}

fn lex(text: &str) -> Result<Vec<Token>, RenderError> {
    let mut tokens = Vec::new();
    let mut rest = text;
    let mut line = 1;

    while !rest.is_empty() {
        match (rest.find("{{"), rest.find("{%")) {
            (None, None) => {
                tokens.push(Token::Literal(rest.to_string()));
                break;
            }
            (out, stmt) => {
                let (pos, closer, is_output) = match (out, stmt) {
                    (Some(o), Some(s)) if o < s => (o, "}}", true),
                    (Some(o), None) => (o, "}}", true),
                    (_, Some(s)) => (s, "%}", false),
                    (None, None) => unreachable!(),
                };

                if pos > 0 {
                    let literal = &rest[..pos];
                    line += literal.matches('\n').count();
                    tokens.push(Token::Literal(literal.to_string()));
                }

                let after = &rest[pos + 2..];
                let end = after.find(closer).ok_or_else(|| RenderError::Syntax {
                    line,
                    message: format!(
                        "unterminated directive (missing `{}`)",
                        closer
                    ),
                })?;

                let inner = after[..end].trim().to_string();
                if is_output {
                    tokens.push(Token::Output(inner, line));
                } else {
                    tokens.push(Token::Statement(inner, line));
                }
                line += after[..end].matches('\n').count();
                rest = &after[end + 2..];
            }
        }
    }

    Ok(tokens)
}

/// Statement keywords that close the enclosing block.
fn closes_block(stmt: &str) -> bool {
    let keyword = stmt.split_whitespace().next().unwrap_or("");
    matches!(keyword, "elif" | "else" | "endif" | "endfor")
}

fn parse_block(
    stream: &mut std::iter::Peekable<std::vec::IntoIter<Token>>,
    open_line: Option<usize>,
) -> Result<Vec<Segment>, RenderError> {
    let mut segments = Vec::new();

    loop {
        // A closing statement is left in the stream for the caller.
        if let Some(Token::Statement(stmt, _)) = stream.peek() {
            if closes_block(stmt) {
                return Ok(segments);
            }
        }

        let token = match stream.next() {
            Some(token) => token,
            None => {
                if let Some(line) = open_line {
                    return Err(RenderError::Syntax {
                        line,
                        message: "unclosed block (expected `endif` or `endfor`)".into(),
                    });
                }
                return Ok(segments);
            }
        };

        match token {
            Token::Literal(text) => segments.push(Segment::Literal(text)),
            Token::Output(expr, line) => {
                segments.push(Segment::Output(parse_expr(&expr, line)?));
            }
            Token::Statement(stmt, line) => {
                let keyword = stmt.split_whitespace().next().unwrap_or("");
                match keyword {
                    "if" => segments.push(parse_if(&stmt, line, stream)?),
                    "for" => segments.push(parse_for(&stmt, line, stream)?),
                    other => {
                        return Err(RenderError::Syntax {
                            line,
                            message: format!("unknown directive `{}`", other),
                        })
                    }
                }
            }
        }
    }
}

fn parse_if(
    stmt: &str,
    line: usize,
    stream: &mut std::iter::Peekable<std::vec::IntoIter<Token>>,
) -> Result<Segment, RenderError> {
    let cond_src = stmt.strip_prefix("if").unwrap().trim();
    let mut branches = vec![(parse_expr(cond_src, line)?, parse_block(stream, Some(line))?)];
    let mut otherwise = Vec::new();

    loop {
        let (stmt, stmt_line) = match stream.next() {
            Some(Token::Statement(s, l)) => (s, l),
            _ => {
                return Err(RenderError::Syntax {
                    line,
                    message: "unclosed `if` (expected `endif`)".into(),
                })
            }
        };
        let keyword = stmt.split_whitespace().next().unwrap_or("");
        match keyword {
            "elif" => {
                let cond_src = stmt.strip_prefix("elif").unwrap().trim();
                branches.push((
                    parse_expr(cond_src, stmt_line)?,
                    parse_block(stream, Some(stmt_line))?,
                ));
            }
            "else" => {
                otherwise = parse_block(stream, Some(stmt_line))?;
            }
            "endif" => break,
            other => {
                return Err(RenderError::Syntax {
                    line: stmt_line,
                    message: format!("expected `elif`, `else` or `endif`, found `{}`", other),
                })
            }
        }
    }

    Ok(Segment::If {
        branches,
        otherwise,
    })
}

fn parse_for(
    stmt: &str,
    line: usize,
    stream: &mut std::iter::Peekable<std::vec::IntoIter<Token>>,
) -> Result<Segment, RenderError> {
    let rest = stmt.strip_prefix("for").unwrap().trim();
    let (var, iterable_src) = rest.split_once(" in ").ok_or_else(|| RenderError::Syntax {
        line,
        message: "expected `for <var> in <expr>`".into(),
    })?;

    let var = var.trim();
    if !is_identifier(var) {
        return Err(RenderError::Syntax {
            line,
            message: format!("invalid loop variable `{}`", var),
        });
    }

    let iterable = parse_expr(iterable_src.trim(), line)?;
    let body = parse_block(stream, Some(line))?;

    match stream.next() {
        Some(Token::Statement(stmt, _)) if stmt.trim() == "endfor" => {}
        _ => {
            return Err(RenderError::Syntax {
                line,
                message: "unclosed `for` (expected `endfor`)".into(),
            })
        }
    }

    Ok(Segment::For {
        var: var.to_string(),
        iterable,
        body,
    })
}

fn parse_expr(src: &str, line: usize) -> Result<Expr, RenderError> {
    let src = src.trim();
    if src.is_empty() {
        return Err(RenderError::Syntax {
            line,
            message: "empty expression".into(),
        });
    }

    // Binary comparisons bind loosest.
    if let Some((lhs, rhs)) = split_binary(src, "==") {
        return Ok(Expr::Eq(
            Box::new(parse_expr(lhs, line)?),
            Box::new(parse_expr(rhs, line)?),
        ));
    }
    if let Some((lhs, rhs)) = split_binary(src, "!=") {
        return Ok(Expr::Ne(
            Box::new(parse_expr(lhs, line)?),
            Box::new(parse_expr(rhs, line)?),
        ));
    }

    if let Some(inner) = src.strip_prefix("not ") {
        return Ok(Expr::Not(Box::new(parse_expr(inner, line)?)));
    }

    if (src.starts_with('"') && src.ends_with('"') && src.len() >= 2)
        || (src.starts_with('\'') && src.ends_with('\'') && src.len() >= 2)
    {
        return Ok(Expr::Str(src[1..src.len() - 1].to_string()));
    }

    if src == "true" || src == "True" {
        return Ok(Expr::Bool(true));
    }
    if src == "false" || src == "False" {
        return Ok(Expr::Bool(false));
    }

    if let Ok(int) = src.parse::<i64>() {
        return Ok(Expr::Int(int));
    }

    let path: Vec<String> = src.split('.').map(str::to_string).collect();
    if path.iter().all(|seg| is_identifier(seg)) {
        return Ok(Expr::Var(path));
    }

    Err(RenderError::Syntax {
        line,
        message: format!("cannot parse expression `{}`", src),
    })
}

/// Split on a binary operator that is not inside a string literal.
fn split_binary<'a>(src: &'a str, op: &str) -> Option<(&'a str, &'a str)> {
    let mut quote: Option<char> = None;
    for (i, c) in src.char_indices() {
        match quote {
            Some(q) if c == q => quote = None,
            Some(_) => continue,
            None if c == '"' || c == '\'' => quote = Some(c),
            None if src[i..].starts_with(op) => {
                return Some((&src[..i], &src[i + op.len()..]));
            }
            None => {}
        }
    }
    None
}

fn is_identifier(s: &str) -> bool {
    !s.is_empty()
        && s.chars().next().is_some_and(|c| c.is_ascii_alphabetic() || c == '_')
        && s.chars().all(|c| c.is_ascii_alphanumeric() || c == '_')
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_literal_only() {
        let segments = parse("Resources: {}\n").unwrap();
        assert_eq!(segments, vec![Segment::Literal("Resources: {}\n".into())]);
    }

    #[test]
    fn test_output_with_dotted_path() {
        let segments = parse("{{ vpc.cidr }}").unwrap();
        assert_eq!(
            segments,
            vec![Segment::Output(Expr::Var(vec![
                "vpc".into(),
                "cidr".into()
            ]))]
        );
    }

    #[test]
    fn test_if_elif_else() {
        let segments = parse("{% if a %}1{% elif b %}2{% else %}3{% endif %}").unwrap();
        match &segments[0] {
            Segment::If {
                branches,
                otherwise,
            } => {
                assert_eq!(branches.len(), 2);
                assert_eq!(otherwise, &vec![Segment::Literal("3".into())]);
            }
            other => panic!("expected if, got {:?}", other),
        }
    }

    #[test]
    fn test_nested_for_in_if() {
        let segments =
            parse("{% if xs %}{% for x in xs %}{{ x }}{% endfor %}{% endif %}").unwrap();
        assert_eq!(segments.len(), 1);
    }

    #[test]
    fn test_unterminated_output_errors_with_line() {
        let err = parse("line one\nbad: {{ env \n").unwrap_err();
        assert_eq!(
            err,
            RenderError::Syntax {
                line: 2,
                message: "unterminated directive (missing `}}`)".into()
            }
        );
    }

    #[test]
    fn test_unclosed_for_errors() {
        let err = parse("{% for x in xs %}{{ x }}").unwrap_err();
        assert!(matches!(err, RenderError::Syntax { line: 1, .. }));
    }

    #[test]
    fn test_dangling_endif_errors() {
        let err = parse("text {% endif %}").unwrap_err();
        assert!(matches!(err, RenderError::Syntax { .. }));
    }

    #[test]
    fn test_comparison_expr() {
        let segments = parse("{% if env == \"prod\" %}x{% endif %}").unwrap();
        match &segments[0] {
            Segment::If { branches, .. } => {
                assert_eq!(
                    branches[0].0,
                    Expr::Eq(
                        Box::new(Expr::Var(vec!["env".into()])),
                        Box::new(Expr::Str("prod".into()))
                    )
                );
            }
            other => panic!("expected if, got {:?}", other),
        }
    }
}
