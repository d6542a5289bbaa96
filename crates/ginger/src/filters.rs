/*
 * filters.rs
 * Copyright (c) 2025 Posit, PBC
 */

//! Built-in filters.
//!
//! Filters are ordinary [`Callable`]s registered by name; dispatch
//! prepends the piped value as the first positional argument, so host
//! applications can replace or extend any of these through
//! `Environment::add_filter`.

use std::cmp::Ordering;
use std::collections::HashMap;

use crate::callable::{ArgSpec, Callable};
use crate::error::{Error, ErrorKind, TemplateResult};
use crate::output::html_escape;
use crate::value::{compare_values, StrKind, Value, ValueList};

pub(crate) fn register_builtin_filters(filters: &mut HashMap<String, Callable>) {
    filters.insert("abs".into(), abs_filter());
    filters.insert("capitalize".into(), capitalize_filter());
    filters.insert("center".into(), center_filter());
    let default = default_filter();
    filters.insert("default".into(), default.clone());
    filters.insert("d".into(), default);
    let escape = escape_filter();
    filters.insert("escape".into(), escape.clone());
    filters.insert("e".into(), escape);
    filters.insert("first".into(), first_filter());
    filters.insert("float".into(), float_filter());
    filters.insert("int".into(), int_filter());
    filters.insert("join".into(), join_filter());
    filters.insert("last".into(), last_filter());
    let length = length_filter();
    filters.insert("length".into(), length.clone());
    filters.insert("count".into(), length);
    filters.insert("list".into(), list_filter());
    filters.insert("lower".into(), lower_filter());
    filters.insert("replace".into(), replace_filter());
    filters.insert("reverse".into(), reverse_filter());
    filters.insert("round".into(), round_filter());
    filters.insert("safe".into(), safe_filter());
    filters.insert("sort".into(), sort_filter());
    filters.insert("string".into(), string_filter());
    filters.insert("sum".into(), sum_filter());
    filters.insert("title".into(), title_filter());
    filters.insert("trim".into(), trim_filter());
    filters.insert("truncate".into(), truncate_filter());
    filters.insert("unique".into(), unique_filter());
    filters.insert("upper".into(), upper_filter());
    filters.insert("wordcount".into(), wordcount_filter());
}

fn invalid(message: &str) -> Error {
    Error::new(ErrorKind::InvalidOperation).with_extra(message)
}

fn items_of(value: &Value) -> TemplateResult<ValueList> {
    value
        .iteration_items()
        .ok_or_else(|| invalid("value is not iterable"))
}

fn int_arg(value: &Value) -> TemplateResult<i64> {
    match value {
        Value::Int(n) => Ok(*n),
        other => Err(invalid(&format!(
            "expected an integer, got {}",
            other.to_output_string()
        ))),
    }
}

fn abs_filter() -> Callable {
    Callable::host(vec![ArgSpec::required("value")], |params| {
        match params.get("value") {
            Value::Int(n) => Ok(n
                .checked_abs()
                .map(Value::Int)
                .unwrap_or_else(|| Value::Double((n as f64).abs()))),
            Value::Double(d) => Ok(Value::Double(d.abs())),
            other => Err(invalid(&format!(
                "cannot take the absolute value of {}",
                other.to_output_string()
            ))),
        }
    })
}

fn capitalize_filter() -> Callable {
    Callable::host(vec![ArgSpec::required("value")], |params| {
        let text = params.get("value").to_output_string();
        let mut chars = text.chars();
        let out = match chars.next() {
            Some(first) => first.to_uppercase().collect::<String>() + &chars.as_str().to_lowercase(),
            None => String::new(),
        };
        Ok(Value::from(out))
    })
}

fn center_filter() -> Callable {
    Callable::host(
        vec![
            ArgSpec::required("value"),
            ArgSpec::optional("width", Value::Int(80)),
        ],
        |params| {
            let text = params.get("value").to_output_string();
            let width = int_arg(&params.get("width"))?.max(0) as usize;
            let len = text.chars().count();
            if len >= width {
                return Ok(Value::from(text));
            }
            let total = width - len;
            let left = total / 2;
            let mut out = " ".repeat(left);
            out.push_str(&text);
            out.push_str(&" ".repeat(total - left));
            Ok(Value::from(out))
        },
    )
}

fn default_filter() -> Callable {
    Callable::host(
        vec![
            ArgSpec::required("value"),
            ArgSpec::optional("default_value", ""),
            ArgSpec::optional("boolean", false),
        ],
        |params| {
            let value = params.get("value");
            let fallback = params.get("default_value");
            let use_truthiness = params.get("boolean").is_truthy();
            let keep = if use_truthiness {
                value.is_truthy()
            } else {
                !value.is_empty_value()
            };
            Ok(if keep { value } else { fallback })
        },
    )
}

fn escape_filter() -> Callable {
    Callable::host(vec![ArgSpec::required("value")], |params| {
        match params.get("value") {
            // Already safe: escaping again would double-escape.
            Value::String(text, StrKind::Safe) => Ok(Value::String(text, StrKind::Safe)),
            other => Ok(Value::safe(html_escape(&other.to_output_string()))),
        }
    })
}

fn first_filter() -> Callable {
    Callable::host(vec![ArgSpec::required("value")], |params| {
        let items = items_of(&params.get("value"))?;
        Ok(items.into_iter().next().unwrap_or_default())
    })
}

fn float_filter() -> Callable {
    Callable::host(
        vec![
            ArgSpec::required("value"),
            ArgSpec::optional("default", Value::Double(0.0)),
        ],
        |params| match params.get("value") {
            Value::Int(n) => Ok(Value::Double(n as f64)),
            Value::Double(d) => Ok(Value::Double(d)),
            Value::String(s, _) => Ok(s
                .trim()
                .parse::<f64>()
                .map(Value::Double)
                .unwrap_or_else(|_| params.get("default"))),
            _ => Ok(params.get("default")),
        },
    )
}

fn int_filter() -> Callable {
    Callable::host(
        vec![
            ArgSpec::required("value"),
            ArgSpec::optional("default", Value::Int(0)),
        ],
        |params| match params.get("value") {
            Value::Int(n) => Ok(Value::Int(n)),
            Value::Double(d) => Ok(Value::Int(d as i64)),
            Value::Bool(b) => Ok(Value::Int(b as i64)),
            Value::String(s, _) => Ok(s
                .trim()
                .parse::<i64>()
                .map(Value::Int)
                .unwrap_or_else(|_| params.get("default"))),
            _ => Ok(params.get("default")),
        },
    )
}

fn join_filter() -> Callable {
    Callable::host(
        vec![ArgSpec::required("value"), ArgSpec::optional("d", "")],
        |params| {
            let items = items_of(&params.get("value"))?;
            let separator = params.get("d").to_output_string();
            let joined: Vec<String> = items.iter().map(|v| v.to_output_string()).collect();
            Ok(Value::from(joined.join(&separator)))
        },
    )
}

fn last_filter() -> Callable {
    Callable::host(vec![ArgSpec::required("value")], |params| {
        let items = items_of(&params.get("value"))?;
        Ok(items.into_iter().next_back().unwrap_or_default())
    })
}

fn length_filter() -> Callable {
    Callable::host(vec![ArgSpec::required("value")], |params| {
        match params.get("value").len() {
            Some(n) => Ok(Value::from(n)),
            None => Err(invalid("value has no length")),
        }
    })
}

fn list_filter() -> Callable {
    Callable::host(vec![ArgSpec::required("value")], |params| {
        Ok(Value::from(items_of(&params.get("value"))?))
    })
}

fn lower_filter() -> Callable {
    Callable::host(vec![ArgSpec::required("value")], |params| {
        Ok(Value::from(
            params.get("value").to_output_string().to_lowercase(),
        ))
    })
}

fn replace_filter() -> Callable {
    Callable::host(
        vec![
            ArgSpec::required("value"),
            ArgSpec::required("old"),
            ArgSpec::required("new"),
            ArgSpec::optional("count", Value::Empty),
        ],
        |params| {
            let text = params.get("value").to_output_string();
            let old = params.get("old");
            let new = params.get("new");
            let (Some(old), Some(new)) = (old.as_str(), new.as_str()) else {
                return Err(invalid("replace expects string arguments"));
            };
            let replaced = match params.get("count") {
                Value::Int(n) if n >= 0 => text.replacen(old, new, n as usize),
                Value::Empty => text.replace(old, new),
                other => {
                    return Err(invalid(&format!(
                        "invalid replace count {}",
                        other.to_output_string()
                    )));
                }
            };
            Ok(Value::from(replaced))
        },
    )
}

fn reverse_filter() -> Callable {
    Callable::host(vec![ArgSpec::required("value")], |params| {
        match params.get("value") {
            Value::String(s, _) => Ok(Value::from(s.chars().rev().collect::<String>())),
            other => {
                let mut items = items_of(&other)?;
                items.reverse();
                Ok(Value::from(items))
            }
        }
    })
}

fn round_filter() -> Callable {
    Callable::host(
        vec![
            ArgSpec::required("value"),
            ArgSpec::optional("precision", Value::Int(0)),
            ArgSpec::optional("method", "common"),
        ],
        |params| {
            let value = match params.get("value") {
                Value::Int(n) => n as f64,
                Value::Double(d) => d,
                other => {
                    return Err(invalid(&format!(
                        "cannot round {}",
                        other.to_output_string()
                    )));
                }
            };
            let precision = int_arg(&params.get("precision"))?;
            let method = params.get("method").to_output_string();
            let factor = 10f64.powi(precision as i32);
            let scaled = value * factor;
            let rounded = match method.as_str() {
                "common" => scaled.round(),
                "ceil" => scaled.ceil(),
                "floor" => scaled.floor(),
                _ => return Err(invalid(&format!("unknown rounding method '{}'", method))),
            };
            Ok(Value::Double(rounded / factor))
        },
    )
}

fn safe_filter() -> Callable {
    Callable::host(vec![ArgSpec::required("value")], |params| {
        Ok(Value::safe(params.get("value").to_output_string()))
    })
}

fn sort_filter() -> Callable {
    Callable::host(
        vec![
            ArgSpec::required("value"),
            ArgSpec::optional("reverse", false),
            ArgSpec::optional("case_sensitive", false),
        ],
        |params| {
            let mut items = items_of(&params.get("value"))?;
            let reverse = params.get("reverse").is_truthy();
            let case_sensitive = params.get("case_sensitive").is_truthy();

            items.sort_by(|a, b| {
                let ordering = match (a, b) {
                    (Value::String(x, _), Value::String(y, _)) if !case_sensitive => {
                        x.to_lowercase().cmp(&y.to_lowercase())
                    }
                    _ => compare_values(a, b).unwrap_or(Ordering::Equal),
                };
                if reverse {
                    ordering.reverse()
                } else {
                    ordering
                }
            });
            Ok(Value::from(items))
        },
    )
}

fn string_filter() -> Callable {
    Callable::host(vec![ArgSpec::required("value")], |params| {
        Ok(Value::from(params.get("value").to_output_string()))
    })
}

fn sum_filter() -> Callable {
    Callable::host(
        vec![
            ArgSpec::required("value"),
            ArgSpec::optional("start", Value::Int(0)),
        ],
        |params| {
            let items = items_of(&params.get("value"))?;
            let mut int_total = match params.get("start") {
                Value::Int(n) => Some(n),
                _ => None,
            };
            let mut total = match params.get("start") {
                Value::Int(n) => n as f64,
                Value::Double(d) => d,
                other => {
                    return Err(invalid(&format!(
                        "invalid sum start {}",
                        other.to_output_string()
                    )));
                }
            };
            for item in &items {
                match item {
                    Value::Int(n) => {
                        int_total = int_total.and_then(|acc| acc.checked_add(*n));
                        total += *n as f64;
                    }
                    Value::Double(d) => {
                        int_total = None;
                        total += d;
                    }
                    other => {
                        return Err(invalid(&format!(
                            "cannot sum {}",
                            other.to_output_string()
                        )));
                    }
                }
            }
            Ok(match int_total {
                Some(n) => Value::Int(n),
                None => Value::Double(total),
            })
        },
    )
}

fn title_filter() -> Callable {
    Callable::host(vec![ArgSpec::required("value")], |params| {
        let text = params.get("value").to_output_string();
        let mut out = String::with_capacity(text.len());
        let mut word_start = true;
        for ch in text.chars() {
            if ch.is_alphanumeric() {
                if word_start {
                    out.extend(ch.to_uppercase());
                } else {
                    out.extend(ch.to_lowercase());
                }
                word_start = false;
            } else {
                word_start = true;
                out.push(ch);
            }
        }
        Ok(Value::from(out))
    })
}

fn trim_filter() -> Callable {
    Callable::host(vec![ArgSpec::required("value")], |params| {
        Ok(Value::from(
            params.get("value").to_output_string().trim().to_string(),
        ))
    })
}

fn truncate_filter() -> Callable {
    Callable::host(
        vec![
            ArgSpec::required("value"),
            ArgSpec::optional("length", Value::Int(255)),
            ArgSpec::optional("killwords", false),
            ArgSpec::optional("end", "..."),
        ],
        |params| {
            let text = params.get("value").to_output_string();
            let length = int_arg(&params.get("length"))?.max(0) as usize;
            let killwords = params.get("killwords").is_truthy();
            let end = params.get("end").to_output_string();

            if text.chars().count() <= length {
                return Ok(Value::from(text));
            }
            let mut cut: String = text.chars().take(length).collect();
            if !killwords {
                if let Some(space) = cut.rfind(' ') {
                    cut.truncate(space);
                }
            }
            cut.push_str(&end);
            Ok(Value::from(cut))
        },
    )
}

fn unique_filter() -> Callable {
    Callable::host(vec![ArgSpec::required("value")], |params| {
        let items = items_of(&params.get("value"))?;
        let mut out: ValueList = Vec::new();
        for item in items {
            if !out.contains(&item) {
                out.push(item);
            }
        }
        Ok(Value::from(out))
    })
}

fn upper_filter() -> Callable {
    Callable::host(vec![ArgSpec::required("value")], |params| {
        Ok(Value::from(
            params.get("value").to_output_string().to_uppercase(),
        ))
    })
}

fn wordcount_filter() -> Callable {
    Callable::host(vec![ArgSpec::required("value")], |params| {
        let text = params.get("value").to_output_string();
        Ok(Value::from(text.split_whitespace().count()))
    })
}

#[cfg(test)]
mod tests {
    use crate::environment::Environment;
    use crate::value::{Value, ValueMap};

    fn render(source: &str) -> String {
        render_with(source, ValueMap::new())
    }

    fn render_with(source: &str, params: ValueMap) -> String {
        let env = Environment::new();
        let template = env.template_from_str(source, "<filters>").unwrap();
        template.render(params).unwrap()
    }

    #[test]
    fn test_string_filters() {
        assert_eq!(render("{{ 'hello'|upper }}"), "HELLO");
        assert_eq!(render("{{ 'HELLO'|lower }}"), "hello");
        assert_eq!(render("{{ 'hello world'|capitalize }}"), "Hello world");
        assert_eq!(render("{{ 'hello world'|title }}"), "Hello World");
        assert_eq!(render("{{ '  x  '|trim }}"), "x");
        assert_eq!(render("{{ 'ab'|center(6) }}"), "  ab  ");
        assert_eq!(render("{{ 'a,b'|replace(',', '-') }}"), "a-b");
        assert_eq!(render("{{ 'abc'|reverse }}"), "cba");
        assert_eq!(render("{{ 'one two three'|wordcount }}"), "3");
    }

    #[test]
    fn test_numeric_filters() {
        assert_eq!(render("{{ -3|abs }}"), "3");
        assert_eq!(render("{{ -2.5|abs }}"), "2.5");
        assert_eq!(render("{{ 2.1234|round(2) }}"), "2.12");
        assert_eq!(render("{{ 2.5|round }}"), "3");
        assert_eq!(render("{{ 2.9|round(0, 'floor') }}"), "2");
        assert_eq!(render("{{ '42'|int }}"), "42");
        assert_eq!(render("{{ 'x'|int(7) }}"), "7");
        assert_eq!(render("{{ '2.5'|float }}"), "2.5");
    }

    #[test]
    fn test_sequence_filters() {
        assert_eq!(render("{{ [3, 1, 2]|sort|join(',') }}"), "1,2,3");
        assert_eq!(
            render("{{ ['b', 'A']|sort|join(',') }}"),
            "A,b" // case-insensitive by default
        );
        assert_eq!(render("{{ [3, 1, 2]|sort(reverse=true)|join(',') }}"), "3,2,1");
        assert_eq!(render("{{ [1, 2, 3]|first }}"), "1");
        assert_eq!(render("{{ [1, 2, 3]|last }}"), "3");
        assert_eq!(render("{{ [1, 2, 3]|length }}"), "3");
        assert_eq!(render("{{ 'abcd'|count }}"), "4");
        assert_eq!(render("{{ [1, 2, 2, 3, 1]|unique|join(',') }}"), "1,2,3");
        assert_eq!(render("{{ [1, 2, 3]|sum }}"), "6");
        assert_eq!(render("{{ [1.5, 2]|sum }}"), "3.5");
        assert_eq!(render("{{ 'ab'|list|join('-') }}"), "a-b");
    }

    #[test]
    fn test_default_filter() {
        assert_eq!(render("{{ missing|default('fallback') }}"), "fallback");
        assert_eq!(render("{{ 'present'|default('fallback') }}"), "present");
        // Falsy but defined values pass through unless boolean=true.
        assert_eq!(render("{{ ''|default('fallback') }}"), "");
        assert_eq!(render("{{ ''|default('fallback', true) }}"), "fallback");
        assert_eq!(render("{{ missing|d('short form') }}"), "short form");
    }

    #[test]
    fn test_escape_filter() {
        assert_eq!(render("{{ '<b>'|escape }}"), "&lt;b&gt;");
        // Escaping twice must not double-escape.
        assert_eq!(render("{{ '<b>'|e|e }}"), "&lt;b&gt;");
    }

    #[test]
    fn test_truncate_filter() {
        assert_eq!(render("{{ 'short'|truncate(10) }}"), "short");
        assert_eq!(render("{{ 'hello big world'|truncate(9) }}"), "hello...");
        assert_eq!(
            render("{{ 'hello big world'|truncate(7, true, '!') }}"),
            "hello b!"
        );
    }

    #[test]
    fn test_filter_with_named_args() {
        assert_eq!(
            render("{{ ['B', 'a']|sort(case_sensitive=true)|join(',') }}"),
            "B,a"
        );
    }

    #[test]
    fn test_unknown_filter_error() {
        let env = Environment::new();
        let template = env.template_from_str("{{ 1|frobnicate }}", "t").unwrap();
        let err = template.render(ValueMap::new()).unwrap_err();
        assert_eq!(err.kind, crate::error::ErrorKind::UnknownFilter);
        assert_eq!(err.extra, vec![Value::from("frobnicate")]);
    }
}
