//! Directive evaluation against the render context.
//!
//! Evaluation is side-effect-free: no I/O, and the context is only ever read.
//! Loop variables live in a child scope layered over the caller's context, so
//! a loop cannot shadow-then-leak bindings.

use crate::core::{Mapping, Node};

use super::parser::{Expr, Segment};
use super::{RenderContext, RenderError};

/// One lookup scope; loops push children onto the chain.
struct Scope<'a> {
    vars: &'a Mapping,
    parent: Option<&'a Scope<'a>>,
}

impl<'a> Scope<'a> {
    fn lookup(&self, name: &str) -> Option<&'a Node> {
        self.vars
            .get(name)
            .or_else(|| self.parent.and_then(|p| p.lookup(name)))
    }
}

/// Evaluate a parsed template into output text.
pub fn evaluate(segments: &[Segment], context: &RenderContext) -> Result<String, RenderError> {
    let scope = Scope {
        vars: context,
        parent: None,
    };
    let mut out = String::new();
    eval_block(segments, &scope, &mut out)?;
    Ok(out)
}

fn eval_block(segments: &[Segment], scope: &Scope<'_>, out: &mut String) -> Result<(), RenderError> {
    for segment in segments {
        match segment {
            Segment::Literal(text) => out.push_str(text),
            Segment::Output(expr) => {
                let value = eval_expr(expr, scope)?;
                let text = value
                    .scalar_to_string()
                    .ok_or_else(|| RenderError::NotScalar {
                        name: expr.display(),
                        type_name: value.type_name().to_string(),
                    })?;
                out.push_str(&text);
            }
            Segment::If {
                branches,
                otherwise,
            } => {
                let mut taken = false;
                for (cond, body) in branches {
                    if is_truthy(&eval_expr(cond, scope)?) {
                        eval_block(body, scope, out)?;
                        taken = true;
                        break;
                    }
                }
                if !taken {
                    eval_block(otherwise, scope, out)?;
                }
            }
            Segment::For {
                var,
                iterable,
                body,
            } => {
                let value = eval_expr(iterable, scope)?;
                let items: Vec<Node> = match &value {
                    Node::Sequence(items) => items.clone(),
                    // Iterating a mapping yields its keys, in document order.
                    Node::Mapping(map) => {
                        map.keys().map(|k| Node::String(k.to_string())).collect()
                    }
                    other => {
                        return Err(RenderError::NotIterable {
                            expr: iterable.display(),
                            type_name: other.type_name().to_string(),
                        })
                    }
                };

                for item in items {
                    let mut bindings = Mapping::new();
                    bindings.insert(var.clone(), item);
                    let child = Scope {
                        vars: &bindings,
                        parent: Some(scope),
                    };
                    eval_block(body, &child, out)?;
                }
            }
        }
    }
    Ok(())
}

fn eval_expr(expr: &Expr, scope: &Scope<'_>) -> Result<Node, RenderError> {
    match expr {
        Expr::Var(path) => {
            let mut current = scope.lookup(&path[0]).ok_or_else(|| {
                RenderError::UndefinedVariable {
                    name: path.join("."),
                }
            })?;
            for key in &path[1..] {
                current = current
                    .as_mapping()
                    .and_then(|m| m.get(key))
                    .ok_or_else(|| RenderError::UndefinedVariable {
                        name: path.join("."),
                    })?;
            }
            Ok(current.clone())
        }
        Expr::Str(s) => Ok(Node::String(s.clone())),
        Expr::Int(i) => Ok(Node::Int(*i)),
        Expr::Bool(b) => Ok(Node::Bool(*b)),
        Expr::Not(inner) => Ok(Node::Bool(!is_truthy(&eval_expr(inner, scope)?))),
        Expr::Eq(a, b) => Ok(Node::Bool(eval_expr(a, scope)? == eval_expr(b, scope)?)),
        Expr::Ne(a, b) => Ok(Node::Bool(eval_expr(a, scope)? != eval_expr(b, scope)?)),
    }
}

/// Jinja-style truthiness: empty/zero/null are false.
fn is_truthy(node: &Node) -> bool {
    match node {
        Node::Null => false,
        Node::Bool(b) => *b,
        Node::Int(i) => *i != 0,
        Node::Float(f) => *f != 0.0,
        Node::String(s) => !s.is_empty(),
        Node::Sequence(items) => !items.is_empty(),
        Node::Mapping(map) => !map.is_empty(),
    }
}
