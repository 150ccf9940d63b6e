//! Top-level source filtering applied before a script is executed
//!
//! Two kinds of top-level statement are dropped:
//! - bare calls of a denylisted plain name (`main()`, `epilogue(x)`)
//! - `if __name__ == "__main__":` blocks (either operand order), including
//!   their `elif`/`else` arms
//!
//! Nested statements are never inspected.

use simscan_host::ast::CmpOp;
use simscan_host::{Expr, Module, Stmt, StmtKind};

const MAIN_NAME: &str = "__name__";
const MAIN_VALUE: &str = "__main__";

/// Copy of `module` without stripped top-level statements
#[must_use]
pub fn sanitize<S: AsRef<str>>(module: &Module, stripped_calls: &[S]) -> Module {
    let body = module
        .body
        .iter()
        .filter(|stmt| !is_stripped(stmt, stripped_calls))
        .cloned()
        .collect();
    Module::new(module.source(), body)
}

/// Whether a top-level statement is removed
#[must_use]
pub fn is_stripped<S: AsRef<str>>(stmt: &Stmt, stripped_calls: &[S]) -> bool {
    match &stmt.kind {
        StmtKind::Expr(Expr::Call { func }) => func
            .as_name()
            .is_some_and(|name| stripped_calls.iter().any(|c| c.as_ref() == name)),
        StmtKind::If { test } => is_main_guard(test),
        _ => false,
    }
}

/// `__name__ == "__main__"` or `"__main__" == __name__`, nothing else
#[must_use]
pub fn is_main_guard(test: &Expr) -> bool {
    let Expr::Compare { left, rest } = test else {
        return false;
    };
    let [(CmpOp::Eq, right)] = rest.as_slice() else {
        return false;
    };
    let left: &Expr = left;
    let is_name = |e: &Expr| e.as_name() == Some(MAIN_NAME);
    let is_value = |e: &Expr| e.as_str_literal() == Some(MAIN_VALUE);
    (is_name(left) && is_value(right)) || (is_value(left) && is_name(right))
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use simscan_host::{CodeHost, PythonHost};

    const DENY: &[&str] = &["main", "epilogue"];

    fn sanitized(source: &str) -> String {
        let host = PythonHost::new();
        let module = host.parse(source).unwrap();
        host.unparse(&sanitize(&module, DENY)).unwrap()
    }

    #[test]
    fn strips_denylisted_calls_and_guards() {
        let out = sanitized(concat!(
            "import os\n",
            "def main():\n    raise SystemExit(1)\n",
            "x = 1\n",
            "main()\n",
            "epilogue(x, fast=True)\n",
            "if __name__ == '__main__':\n    main()\nelse:\n    x = 2\n",
            "if \"__main__\" == __name__:\n    main()\n",
        ));
        assert_eq!(
            out,
            "import os\ndef main():\n    raise SystemExit(1)\nx = 1\n"
        );
    }

    #[test]
    fn keeps_lookalikes() {
        let source = concat!(
            "app.main()\n",
            "run = main\n",
            "result = main()\n",
            "other()\n",
            "if __name__ != '__main__':\n    pass\n",
            "if __name__ == '__main__' and fast:\n    pass\n",
            "if x:\n    pass\nelif __name__ == '__main__':\n    main()\n",
            "def f():\n    main()\n",
        );
        assert_eq!(sanitized(source), source);
    }

    #[test]
    fn guard_shapes() {
        let host = PythonHost::new();
        let test_of = |src: &str| match &host.parse(src).unwrap().body[0].kind {
            StmtKind::If { test } => test.clone(),
            other => panic!("not an if: {other:?}"),
        };
        assert!(is_main_guard(&test_of("if __name__ == \"__main__\":\n    pass\n")));
        assert!(is_main_guard(&test_of("if '__main__' == __name__:\n    pass\n")));
        assert!(is_main_guard(&test_of("if (__name__ == '__main__'):\n    pass\n")));
        assert!(!is_main_guard(&test_of("if __name__ == '__main__' == x:\n    pass\n")));
        assert!(!is_main_guard(&test_of("if __name__ is '__main__':\n    pass\n")));
        assert!(!is_main_guard(&test_of("if name == '__main__':\n    pass\n")));
    }

    #[derive(Debug, Clone, Copy)]
    enum Line {
        Kept(&'static str),
        Dropped(&'static str),
    }

    fn line() -> impl Strategy<Value = Line> {
        prop_oneof![
            Just(Line::Kept("x = 1")),
            Just(Line::Kept("print(x)")),
            Just(Line::Kept("def set_optics():\n    return 1")),
            Just(Line::Kept("helper()")),
            Just(Line::Kept("if x:\n    main()")),
            Just(Line::Dropped("main()")),
            Just(Line::Dropped("epilogue(1, 2)")),
            Just(Line::Dropped("if __name__ == '__main__':\n    main()")),
        ]
    }

    proptest! {
        #[test]
        fn preserves_everything_else_in_order(lines in prop::collection::vec(line(), 0..12)) {
            let source: String = lines
                .iter()
                .map(|l| match l { Line::Kept(s) | Line::Dropped(s) => format!("{s}\n") })
                .collect();
            let expected: String = lines
                .iter()
                .filter_map(|l| match l { Line::Kept(s) => Some(format!("{s}\n")), Line::Dropped(_) => None })
                .collect();
            prop_assert_eq!(sanitized(&source), expected);
        }
    }
}
