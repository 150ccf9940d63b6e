//! tree-sitter → top-level syntax
//!
//! Uses tree-sitter-python for the concrete parse. Any error or missing
//! node fails the whole parse, matching what the interpreter would reject
//! at compile time.

use tree_sitter::Node;

use crate::ast::{CmpOp, Expr, Module, Stmt, StmtKind};
use crate::error::{HostError, HostResult};

const MAX_DEPTH: usize = 200;

/// Parse Python source into a [`Module`]
pub(crate) fn parse_module(source: &str) -> HostResult<Module> {
    let mut parser = tree_sitter::Parser::new();
    parser
        .set_language(&tree_sitter_python::LANGUAGE.into())
        .map_err(|e| HostError::ParserInit(e.to_string()))?;

    let tree = parser
        .parse(source, None)
        .ok_or_else(|| HostError::ParserInit("parser returned no tree".to_string()))?;
    let root = tree.root_node();

    if root.has_error() {
        let (line, column) = first_error(root)
            .map(|n| (n.start_position().row + 1, n.start_position().column + 1))
            .unwrap_or((1, 1));
        return Err(HostError::Syntax { line, column });
    }

    let lower = Lower {
        src: source.as_bytes(),
    };
    let body = named_children(root)
        .into_iter()
        .map(|node| lower.stmt(node))
        .collect::<HostResult<Vec<_>>>()?;
    Ok(Module::new(source, body))
}

/// Regenerate source from the statements' original spans
pub(crate) fn unparse_module(module: &Module) -> HostResult<String> {
    let mut out = String::with_capacity(module.source().len());
    for stmt in &module.body {
        let text = module.text_of(stmt).ok_or_else(|| {
            HostError::Unparse(format!("statement at line {} has no source span", stmt.line))
        })?;
        out.push_str(text);
        out.push('\n');
    }
    Ok(out)
}

fn first_error(node: Node<'_>) -> Option<Node<'_>> {
    if node.is_error() || node.is_missing() {
        return Some(node);
    }
    for i in 0..node.child_count() {
        if let Some(child) = node.child(i) {
            if child.has_error() || child.is_missing() {
                if let Some(found) = first_error(child) {
                    return Some(found);
                }
            }
        }
    }
    None
}

fn named_children(node: Node<'_>) -> Vec<Node<'_>> {
    let mut cursor = node.walk();
    let children = node
        .named_children(&mut cursor)
        .filter(|c| c.kind() != "comment")
        .collect();
    children
}

fn all_children(node: Node<'_>) -> Vec<Node<'_>> {
    let mut cursor = node.walk();
    let children = node
        .children(&mut cursor)
        .filter(|c| c.kind() != "comment")
        .collect();
    children
}

fn line_of(node: Node<'_>) -> usize {
    node.start_position().row + 1
}

struct Lower<'s> {
    src: &'s [u8],
}

impl Lower<'_> {
    fn text(&self, node: Node<'_>) -> String {
        node.utf8_text(self.src).unwrap_or("").to_string()
    }

    fn stmt(&self, node: Node<'_>) -> HostResult<Stmt> {
        let kind = match node.kind() {
            "expression_statement" => match named_children(node).as_slice() {
                [single] if single.kind() != "assignment"
                    && single.kind() != "augmented_assignment" =>
                {
                    StmtKind::Expr(self.expr(*single, 0)?)
                }
                _ => StmtKind::Other(node.kind().to_string()),
            },
            "if_statement" => match node.child_by_field_name("condition") {
                Some(test) => StmtKind::If {
                    test: self.expr(test, 0)?,
                },
                None => StmtKind::Other(node.kind().to_string()),
            },
            other => StmtKind::Other(other.to_string()),
        };
        Ok(Stmt {
            kind,
            span: Some(node.byte_range()),
            line: line_of(node),
        })
    }

    fn expr(&self, node: Node<'_>, depth: usize) -> HostResult<Expr> {
        if depth > MAX_DEPTH {
            return Err(HostError::TooDeep {
                line: line_of(node),
            });
        }
        let depth = depth + 1;
        let expr = match node.kind() {
            "identifier" => Expr::Name(self.text(node)),
            "string" => self.string(node),
            "parenthesized_expression" => match named_children(node).as_slice() {
                [inner] => self.expr(*inner, depth)?,
                _ => Expr::Other(node.kind().to_string()),
            },
            "call" => match node.child_by_field_name("function") {
                Some(func) => Expr::Call {
                    func: Box::new(self.expr(func, depth)?),
                },
                None => Expr::Other(node.kind().to_string()),
            },
            "comparison_operator" => self.comparison(node, depth)?,
            other => Expr::Other(other.to_string()),
        };
        Ok(expr)
    }

    fn comparison(&self, node: Node<'_>, depth: usize) -> HostResult<Expr> {
        let mut operands = Vec::new();
        let mut ops = Vec::new();
        for child in all_children(node) {
            if child.is_named() {
                operands.push(self.expr(child, depth)?);
            } else {
                // `not in` / `is not` arrive either aliased or as two tokens
                let token = child.kind();
                match (ops.last(), token) {
                    (Some(CmpOp::Is), "not") if ops.len() == operands.len() => {
                        if let Some(last) = ops.last_mut() {
                            *last = CmpOp::IsNot;
                        }
                    }
                    (_, "not") => ops.push(CmpOp::NotIn),
                    (Some(CmpOp::NotIn), "in") if ops.len() == operands.len() => {}
                    _ => match CmpOp::from_token(token) {
                        Some(op) => ops.push(op),
                        None => return Ok(Expr::Other(format!("comparison {token}"))),
                    },
                }
            }
        }
        if operands.len() != ops.len() + 1 {
            return Ok(Expr::Other(node.kind().to_string()));
        }
        let mut operands = operands.into_iter();
        let Some(left) = operands.next() else {
            return Ok(Expr::Other(node.kind().to_string()));
        };
        Ok(Expr::Compare {
            left: Box::new(left),
            rest: ops.into_iter().zip(operands).collect(),
        })
    }

    /// Plain literals only; f-strings and bytes stay `Other`
    fn string(&self, node: Node<'_>) -> Expr {
        let mut prefix = String::new();
        let mut literal = String::new();
        for child in all_children(node) {
            match child.kind() {
                "string_start" => {
                    prefix = self
                        .text(child)
                        .chars()
                        .take_while(char::is_ascii_alphabetic)
                        .collect::<String>()
                        .to_ascii_lowercase();
                    if prefix.contains('f') || prefix.contains('b') {
                        return Expr::Other(format!("{prefix}-string"));
                    }
                }
                "string_content" | "escape_sequence" => {
                    let text = self.text(child);
                    if prefix.contains('r') {
                        literal.push_str(&text);
                    } else {
                        literal.push_str(&decode_escapes(&text));
                    }
                }
                "interpolation" => return Expr::Other("interpolation".to_string()),
                _ => {}
            }
        }
        Expr::Str(literal)
    }
}

/// Decode Python backslash escapes in a non-raw string body
fn decode_escapes(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut chars = text.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        let Some(next) = chars.next() else {
            out.push('\\');
            break;
        };
        match next {
            'n' => out.push('\n'),
            't' => out.push('\t'),
            'r' => out.push('\r'),
            '0' => out.push('\0'),
            'a' => out.push('\u{7}'),
            'b' => out.push('\u{8}'),
            'f' => out.push('\u{c}'),
            'v' => out.push('\u{b}'),
            '\\' => out.push('\\'),
            '\'' => out.push('\''),
            '"' => out.push('"'),
            '\n' => {}
            'x' | 'u' | 'U' => {
                let width = match next {
                    'x' => 2,
                    'u' => 4,
                    _ => 8,
                };
                let hex: String = (0..width).filter_map(|_| chars.next()).collect();
                match u32::from_str_radix(&hex, 16).ok().and_then(char::from_u32) {
                    Some(decoded) => out.push(decoded),
                    None => {
                        out.push('\\');
                        out.push(next);
                        out.push_str(&hex);
                    }
                }
            }
            other => {
                out.push('\\');
                out.push(other);
            }
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(src: &str) -> Module {
        parse_module(src).expect("source should parse")
    }

    fn bare_expr(src: &str) -> Expr {
        match &parse(src).body[0].kind {
            StmtKind::Expr(expr) => expr.clone(),
            other => panic!("expected an expression statement, got {other:?}"),
        }
    }

    #[test]
    fn keeps_one_statement_per_top_level_node() {
        let module = parse("x = 1\n\ndef set_optics(a, b=2):\n    return a\nmain()\n");
        assert_eq!(module.body.len(), 3);
        assert!(matches!(&module.body[0].kind, StmtKind::Other(k) if k == "expression_statement"));
        assert!(matches!(&module.body[1].kind, StmtKind::Other(k) if k == "function_definition"));
        assert_eq!(module.body[2].line, 5);
    }

    #[test]
    fn syntax_errors_are_reported() {
        let err = parse_module("def broken(:\n    pass\n").unwrap_err();
        assert!(matches!(err, HostError::Syntax { line: 1, .. }));
    }

    #[test]
    fn calls_keep_their_callee() {
        match bare_expr("epilogue(x, fast=True)\n") {
            Expr::Call { func } => assert_eq!(func.as_name(), Some("epilogue")),
            other => panic!("unexpected {other:?}"),
        }
        match bare_expr("app.main()\n") {
            Expr::Call { func } => assert!(func.as_name().is_none()),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn strings_decode_escapes_unless_raw() {
        assert_eq!(bare_expr("'x\\ty'\n").as_str_literal(), Some("x\ty"));
        assert_eq!(bare_expr("r'x\\ty'\n").as_str_literal(), Some("x\\ty"));
        assert!(bare_expr("f'{x}'\n").as_str_literal().is_none());
        assert!(bare_expr("b'x'\n").as_str_literal().is_none());
    }

    #[test]
    fn main_guard_lowers_to_if_with_string_comparison() {
        let module = parse("if __name__ == '__main__':\n    main()\nelse:\n    pass\n");
        assert_eq!(module.body.len(), 1);
        match &module.body[0].kind {
            StmtKind::If {
                test: Expr::Compare { left, rest },
            } => {
                assert_eq!(left.as_name(), Some("__name__"));
                assert_eq!(rest[0].0, CmpOp::Eq);
                assert_eq!(rest[0].1.as_str_literal(), Some("__main__"));
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn negated_comparisons_fold_into_one_operator() {
        let module = parse("if a is not b:\n    pass\nif a not in b:\n    pass\n");
        let ops: Vec<CmpOp> = module
            .body
            .iter()
            .map(|stmt| match &stmt.kind {
                StmtKind::If {
                    test: Expr::Compare { rest, .. },
                } => rest[0].0,
                other => panic!("unexpected {other:?}"),
            })
            .collect();
        assert_eq!(ops, vec![CmpOp::IsNot, CmpOp::NotIn]);
    }

    #[test]
    fn unparse_keeps_statement_text() {
        let module = parse("a = 1  # one\nb = [\n    2,\n]\n");
        let text = unparse_module(&module).unwrap();
        assert_eq!(text, "a = 1\nb = [\n    2,\n]\n");
    }

    #[test]
    fn decode_escapes_handles_unicode_and_unknown() {
        assert_eq!(decode_escapes("\\u00e9\\q"), "é\\q");
    }
}
