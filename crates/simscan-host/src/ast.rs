//! Top-level syntax of a Python module
//!
//! Produced by [`crate::PythonHost`] from a tree-sitter concrete syntax
//! tree. Only top-level statements are kept, each with its byte span in the
//! original source so a (possibly filtered) module can be regenerated
//! verbatim. Expressions are lowered just far enough to recognise calls,
//! names, string literals and comparisons; everything else is `Other`.

use std::ops::Range;
use std::sync::Arc;

/// A parsed module: the source it came from plus its top-level statements
#[derive(Debug, Clone)]
pub struct Module {
    source: Arc<str>,
    /// Top-level statements in source order
    pub body: Vec<Stmt>,
}

impl Module {
    /// Create a module over `source`
    #[inline]
    #[must_use]
    pub fn new(source: impl Into<Arc<str>>, body: Vec<Stmt>) -> Self {
        Self {
            source: source.into(),
            body,
        }
    }

    /// Original source text
    #[inline]
    #[must_use]
    pub fn source(&self) -> &str {
        &self.source
    }

    /// Source text covered by a statement, if it still maps onto the source
    #[must_use]
    pub fn text_of(&self, stmt: &Stmt) -> Option<&str> {
        stmt.span.as_ref().and_then(|span| self.source.get(span.clone()))
    }
}

/// A top-level statement with its location
#[derive(Debug, Clone)]
pub struct Stmt {
    pub kind: StmtKind,
    /// Byte range in the source (None for synthesized statements)
    pub span: Option<Range<usize>>,
    /// 1-based line number
    pub line: usize,
}

#[derive(Debug, Clone)]
pub enum StmtKind {
    /// Bare expression (`main()`)
    Expr(Expr),
    /// `if` statement, with the test of its first branch
    If { test: Expr },
    /// Any other statement, by tree-sitter node kind
    Other(String),
}

#[derive(Debug, Clone)]
pub enum Expr {
    Name(String),
    /// Plain (non f-) string literal, escapes decoded
    Str(String),
    /// `func(...)`; arguments are not lowered
    Call { func: Box<Expr> },
    /// Chained comparison `a < b <= c`
    Compare {
        left: Box<Expr>,
        rest: Vec<(CmpOp, Expr)>,
    },
    /// Any other expression, by tree-sitter node kind
    Other(String),
}

impl Expr {
    /// The identifier if this is a plain name
    #[inline]
    #[must_use]
    pub fn as_name(&self) -> Option<&str> {
        match self {
            Expr::Name(name) => Some(name),
            _ => None,
        }
    }

    /// The value if this is a plain string literal
    #[inline]
    #[must_use]
    pub fn as_str_literal(&self) -> Option<&str> {
        match self {
            Expr::Str(s) => Some(s),
            _ => None,
        }
    }
}

/// Comparison operators
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CmpOp {
    Eq,
    NotEq,
    Lt,
    LtE,
    Gt,
    GtE,
    In,
    NotIn,
    Is,
    IsNot,
}

impl CmpOp {
    /// Map an operator token to a comparison
    #[must_use]
    pub fn from_token(token: &str) -> Option<Self> {
        let op = match token {
            "==" => CmpOp::Eq,
            "!=" | "<>" => CmpOp::NotEq,
            "<" => CmpOp::Lt,
            "<=" => CmpOp::LtE,
            ">" => CmpOp::Gt,
            ">=" => CmpOp::GtE,
            "in" => CmpOp::In,
            "not in" => CmpOp::NotIn,
            "is" => CmpOp::Is,
            "is not" => CmpOp::IsNot,
            _ => return None,
        };
        Some(op)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn comparison_tokens() {
        assert_eq!(CmpOp::from_token("=="), Some(CmpOp::Eq));
        assert_eq!(CmpOp::from_token("is not"), Some(CmpOp::IsNot));
        assert_eq!(CmpOp::from_token("+"), None);
    }

    #[test]
    fn module_text_of_uses_span() {
        let module = Module::new(
            "x = 1\ny = 2\n",
            vec![Stmt {
                kind: StmtKind::Other("expression_statement".to_string()),
                span: Some(6..11),
                line: 2,
            }],
        );
        assert_eq!(module.text_of(&module.body[0]), Some("y = 2"));
    }
}
