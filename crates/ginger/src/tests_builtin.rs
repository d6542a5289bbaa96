/*
 * tests_builtin.rs
 * Copyright (c) 2025 Posit, PBC
 */

//! Built-in tests for the `is` operator.
//!
//! Tests share the callable protocol with filters: the tested value is
//! prepended as the first positional argument and the result is coerced
//! to Bool by the dispatcher.

use std::collections::HashMap;

use crate::callable::{ArgSpec, Callable};
use crate::error::{Error, ErrorKind, TemplateResult};
use crate::value::{compare_values, Value};

pub(crate) fn register_builtin_tests(tests: &mut HashMap<String, Callable>) {
    tests.insert("boolean".into(), predicate(|v| matches!(v, Value::Bool(_))));
    tests.insert(
        "callable".into(),
        predicate(|v| matches!(v, Value::Callable(_))),
    );
    tests.insert("defined".into(), predicate(|v| !v.is_empty_value()));
    tests.insert("undefined".into(), predicate(Value::is_empty_value));
    tests.insert("none".into(), predicate(Value::is_empty_value));
    tests.insert("divisibleby".into(), divisibleby_test());
    let eq = comparison(|o| o == std::cmp::Ordering::Equal);
    tests.insert("eq".into(), eq.clone());
    tests.insert("equalto".into(), eq);
    tests.insert("ne".into(), comparison(|o| o != std::cmp::Ordering::Equal));
    let gt = comparison(std::cmp::Ordering::is_gt);
    tests.insert("gt".into(), gt.clone());
    tests.insert("greaterthan".into(), gt);
    tests.insert("ge".into(), comparison(std::cmp::Ordering::is_ge));
    let lt = comparison(std::cmp::Ordering::is_lt);
    tests.insert("lt".into(), lt.clone());
    tests.insert("lessthan".into(), lt);
    tests.insert("le".into(), comparison(std::cmp::Ordering::is_le));
    tests.insert("even".into(), parity_test(0));
    tests.insert("odd".into(), parity_test(1));
    tests.insert("false".into(), predicate(|v| v == &Value::Bool(false)));
    tests.insert("true".into(), predicate(|v| v == &Value::Bool(true)));
    tests.insert("float".into(), predicate(|v| matches!(v, Value::Double(_))));
    tests.insert("integer".into(), predicate(|v| matches!(v, Value::Int(_))));
    tests.insert(
        "number".into(),
        predicate(|v| matches!(v, Value::Int(_) | Value::Double(_))),
    );
    tests.insert("in".into(), in_test());
    tests.insert(
        "iterable".into(),
        predicate(|v| v.iteration_items().is_some()),
    );
    tests.insert(
        "lower".into(),
        predicate(|v| match v.as_str() {
            Some(s) => !s.chars().any(char::is_uppercase),
            None => false,
        }),
    );
    tests.insert(
        "upper".into(),
        predicate(|v| match v.as_str() {
            Some(s) => !s.chars().any(char::is_lowercase),
            None => false,
        }),
    );
    tests.insert(
        "mapping".into(),
        predicate(|v| matches!(v, Value::Map(_) | Value::DynMap(_))),
    );
    tests.insert(
        "sequence".into(),
        predicate(|v| {
            matches!(
                v,
                Value::List(_) | Value::DynList(_) | Value::String(_, _)
            )
        }),
    );
    tests.insert(
        "string".into(),
        predicate(|v| matches!(v, Value::String(_, _))),
    );
}

/// A one-argument test from a plain predicate.
fn predicate(check: impl Fn(&Value) -> bool + Send + Sync + 'static) -> Callable {
    Callable::host(vec![ArgSpec::required("value")], move |params| {
        Ok(Value::Bool(check(&params.get("value"))))
    })
}

/// A two-argument test comparing the value against an operand.
fn comparison(check: impl Fn(std::cmp::Ordering) -> bool + Send + Sync + 'static) -> Callable {
    Callable::host(
        vec![ArgSpec::required("value"), ArgSpec::required("other")],
        move |params| {
            let value = params.get("value");
            let other = params.get("other");
            let ordering = compare_values(&value, &other).ok_or_else(|| {
                Error::new(ErrorKind::InvalidOperation)
                    .with_extra(value.clone())
                    .with_extra(other.clone())
            })?;
            Ok(Value::Bool(check(ordering)))
        },
    )
}

fn divisibleby_test() -> Callable {
    Callable::host(
        vec![ArgSpec::required("value"), ArgSpec::required("num")],
        |params| {
            let (value, num) = (params.get("value"), params.get("num"));
            match (&value, &num) {
                (Value::Int(a), Value::Int(b)) if *b != 0 => Ok(Value::Bool(a % b == 0)),
                _ => Err(Error::new(ErrorKind::InvalidOperation)
                    .with_extra(value.clone())
                    .with_extra(num.clone())),
            }
        },
    )
}

fn parity_test(remainder: i64) -> Callable {
    Callable::host(vec![ArgSpec::required("value")], move |params| {
        match params.get("value") {
            Value::Int(n) => Ok(Value::Bool(n.rem_euclid(2) == remainder)),
            other => Err(Error::new(ErrorKind::InvalidOperation).with_extra(other)),
        }
    })
}

fn in_test() -> Callable {
    Callable::host(
        vec![ArgSpec::required("value"), ArgSpec::required("seq")],
        |params| -> TemplateResult<Value> {
            let (value, seq) = (params.get("value"), params.get("seq"));
            let contained = seq
                .contains(&value)
                .ok_or_else(|| Error::new(ErrorKind::InvalidOperation).with_extra(seq.clone()))?;
            Ok(Value::Bool(contained))
        },
    )
}
