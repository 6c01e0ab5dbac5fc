use crate::{parser, util::fmt::tree};

/// Each variant contains the input.
pub enum Test {
    ParserProgram(&'static str),
    ParserExpr(&'static str),
}

pub enum Assertion {
    TreeOk(&'static str),
    ExpectedError(&'static str),
}

/// Runs the parser over the input, returning the printed tree (empty on
/// failure) and the formatted error, if any.
#[track_caller]
pub fn run_pipeline(test: Test) -> (String, Option<String>) {
    let tokens_buf = &mut Vec::with_capacity(1024);

    match test {
        Test::ParserProgram(input) => match parser::parse_program(input, tokens_buf) {
            Ok(prog) => (tree::print_program_string(&prog), None),
            Err(error) => (String::new(), Some(error.to_string())),
        },
        Test::ParserExpr(input) => match parser::parse_expr(input, tokens_buf) {
            Ok(expr) => (tree::print_expr_string(&expr), None),
            Err(error) => (String::new(), Some(error.to_string())),
        },
    }
}

#[track_caller]
pub fn run_assertion(
    assertion: Assertion,
    formatted_actual_tree: &str,
    formatted_actual_error: Option<&str>,
) {
    match assertion {
        Assertion::TreeOk(expected_tree) => {
            ::pretty_assertions::assert_eq!(formatted_actual_error, None);
            ::pretty_assertions::assert_eq!(formatted_actual_tree.trim(), expected_tree.trim());
        }
        Assertion::ExpectedError(expected_error) => {
            ::pretty_assertions::assert_eq!(formatted_actual_error, Some(expected_error));
        }
    }
}

macro_rules! tree_tests {
    (
        use $test_kind:ident;

        $(
            fn $test_name:ident() {
                let $source_kind:ident = $source:expr;
                $($assertions_tt:tt)*
            }
        )*
    ) => {
        $(
            #[test]
            fn $test_name() {
                let test: crate::util::test_utils::Test =
                    tree_tests!(@@get_test($test_kind, $source_kind), $source);
                let (formatted_actual_tree, formatted_actual_error) =
                    crate::util::test_utils::run_pipeline(test);
                let ctx = (&formatted_actual_tree, formatted_actual_error.as_deref());
                tree_tests!(@@expand_assertions, ctx, [$($assertions_tt)*]);
            }
        )*
    };

    (@@expand_assertions, $ctx:expr, []) => {};
    (@@expand_assertions, $ctx:expr, [
        let $assertion:ident = $assertion_expected:expr;
        $($rest_assertions_tt:tt)*
    ]) => {
        crate::util::test_utils::run_assertion(
            tree_tests!(@@assertion, $assertion, $assertion_expected),
            $ctx.0,
            $ctx.1,
        );
        tree_tests!(@@expand_assertions, $ctx, [$($rest_assertions_tt)*]);
    };

    (@@assertion, tree_ok, $expected:expr) => {
        crate::util::test_utils::Assertion::TreeOk(::indoc::indoc! { $expected })
    };
    (@@assertion, expected_error, $expected:expr) => {
        crate::util::test_utils::Assertion::ExpectedError($expected)
    };

    (@@get_test(parser, program), $source:expr) => {
        crate::util::test_utils::Test::ParserProgram($source)
    };
    (@@get_test(parser, expr), $source:expr) => {
        crate::util::test_utils::Test::ParserExpr($source)
    };
}
pub(crate) use tree_tests;
