/*
 * jinja_equiv_tests.rs
 * Copyright (c) 2025 Posit, PBC
 *
 * Checks against Jinja2 reference behavior: literal forms, operator
 * precedence, scoping, whitespace control, undefined handling and the
 * callable binding protocol.
 */

use ginger::{
    ArgSpec, AutoEscape, Callable, Environment, ErrorKind, Settings, Value, ValueMap,
};

fn render(source: &str) -> String {
    render_with(source, ValueMap::new())
}

fn render_with(source: &str, params: ValueMap) -> String {
    let env = Environment::new();
    let template = env.template_from_str(source, "<equiv>").unwrap();
    template.render(params).unwrap()
}

#[test]
fn test_literal_round_trips() {
    // Every scalar literal shape renders its canonical string form.
    assert_eq!(render("{{ 42 }}"), "42");
    assert_eq!(render("{{ -17 }}"), "-17");
    assert_eq!(render("{{ 2.5 }}"), "2.5");
    assert_eq!(render("{{ 1e3 }}"), "1000");
    assert_eq!(render("{{ 'single' }}"), "single");
    assert_eq!(render(r#"{{ "double" }}"#), "double");
    assert_eq!(render(r#"{{ "tab\there" }}"#), "tab\there");
    assert_eq!(render(r#"{{ 'quote\'s' }}"#), "quote's");
    assert_eq!(render("{{ true }}"), "true");
    assert_eq!(render("{{ false }}"), "false");
    assert_eq!(render("{{ none }}"), "");
}

#[test]
fn test_collection_literals() {
    assert_eq!(render("{{ [1, 'a', none] }}"), "[1, 'a', none]");
    assert_eq!(render("{{ {'k': 1, 'l': [2]} }}"), "{'k': 1, 'l': [2]}");
    assert_eq!(render("{{ (1, 2) }}"), "[1, 2]");
}

#[test]
fn test_arithmetic_reference_values() {
    assert_eq!(render("{{ 1 + 1 }}"), "2");
    assert_eq!(render("{{ 3 - 2 }}"), "1");
    assert_eq!(render("{{ 2 * 2 }}"), "4");
    assert_eq!(render("{{ 1 / 2 }}"), "0.5");
    assert_eq!(render("{{ 5 // 3 }}"), "1");
    assert_eq!(render("{{ -7 // 2 }}"), "-4");
    assert_eq!(render("{{ 11 % 7 }}"), "4");
    assert_eq!(render("{{ 7 % -3 }}"), "-2");
    assert_eq!(render("{{ 2 ** 3 }}"), "8");
    assert_eq!(render("{{ 2 ** -1 }}"), "0.5");
    assert_eq!(render("{{ 1 + 2.5 }}"), "3.5");
}

#[test]
fn test_precedence_reference_values() {
    // Multiplication over addition, power over unary minus.
    assert_eq!(render("{{ 2 + 3 * 4 }}"), "14");
    assert_eq!(render("{{ (2 + 3) * 4 }}"), "20");
    assert_eq!(render("{{ -2 ** 2 }}"), "-4");
    assert_eq!(render("{{ 2 ** 3 ** 2 }}"), "512");
    // Concat binds looser than additive arithmetic.
    assert_eq!(render("{{ 1 + 2 ~ '!' }}"), "3!");
    // Comparisons bind looser than filters.
    assert_eq!(render("{{ 'a' ~ 'b' == 'ab' }}"), "true");
    // Logic binds loosest.
    assert_eq!(render("{{ 1 == 1 and 2 > 1 or false }}"), "true");
    assert_eq!(render("{{ not 1 == 2 }}"), "true");
    // Conditional expression sits above everything.
    assert_eq!(render("{{ 1 + 1 if false else 2 + 2 }}"), "4");
}

#[test]
fn test_logic_returns_operands() {
    assert_eq!(render("{{ 0 or 'fallback' }}"), "fallback");
    assert_eq!(render("{{ 'first' and 'second' }}"), "second");
    assert_eq!(render("{{ '' and 'never' }}"), "");
}

#[test]
fn test_string_comparison_is_lexicographic() {
    assert_eq!(render("{{ 'apple' < 'banana' }}"), "true");
    assert_eq!(render("{{ 'b' < 'ab' }}"), "false");
}

#[test]
fn test_cross_type_ordering_fails() {
    let env = Environment::new();
    let template = env.template_from_str("{{ 1 < 'x' }}", "t").unwrap();
    let err = template.render(ValueMap::new()).unwrap_err();
    assert_eq!(err.kind, ErrorKind::InvalidOperation);
}

#[test]
fn test_in_operator() {
    assert_eq!(render("{{ 2 in [1, 2, 3] }}"), "true");
    assert_eq!(render("{{ 'k' in {'k': 1} }}"), "true");
    assert_eq!(render("{{ 'ell' in 'hello' }}"), "true");
    assert_eq!(render("{{ 4 not in [1, 2, 3] }}"), "true");
}

#[test]
fn test_subscript_and_slice() {
    assert_eq!(render("{{ [10, 20, 30][1] }}"), "20");
    assert_eq!(render("{{ [10, 20, 30][-1] }}"), "30");
    assert_eq!(render("{{ [10, 20, 30][99] }}"), "");
    assert_eq!(render("{{ [0, 1, 2, 3, 4][1:4] }}"), "[1, 2, 3]");
    assert_eq!(render("{{ [0, 1, 2, 3, 4][::2] }}"), "[0, 2, 4]");
    assert_eq!(render("{{ 'hello'[::-1] }}"), "olleh");
    assert_eq!(render("{{ 'hello'[1:3] }}"), "el");
}

#[test]
fn test_scope_hygiene_for_loop() {
    // Names introduced by a for body are gone after it ends; shadowed
    // names regain their prior bindings.
    let out = render(
        "{% set x = 'outer' %}\
         {% for x in [1, 2] %}{{ x }}{% endfor %}\
         {{ x }}{{ inner_only }}",
    );
    assert_eq!(out, "12outer");
}

#[test]
fn test_scope_hygiene_with_and_macro() {
    let out = render(
        "{% with x = 'scoped' %}{{ x }}{% endwith %}{{ x }}\
         {% macro m() %}{% set y = 'macro' %}{{ y }}{% endmacro %}{{ m() }}{{ y }}",
    );
    assert_eq!(out, "scopedmacro");
}

#[test]
fn test_set_inside_for_does_not_leak() {
    let out = render("{% for i in [1] %}{% set leaked = 'x' %}{% endfor %}{{ leaked }}");
    assert_eq!(out, "");
}

#[test]
fn test_undefined_propagation_non_strict() {
    // Chained access on a missing name renders as empty and does not
    // fault.
    assert_eq!(render("{{ missing.attr[0] }}"), "");
    assert_eq!(render("{{ missing if missing else 'no' }}"), "no");
}

#[test]
fn test_undefined_raises_in_strict_mode() {
    let settings = Settings {
        strict_undefined: true,
        ..Default::default()
    };
    let env = Environment::with_settings(settings);
    let template = env
        .template_from_str("{{ missing.attr[0] }}", "strict.txt")
        .unwrap();
    let err = template.render(ValueMap::new()).unwrap_err();
    assert_eq!(err.kind, ErrorKind::UndefinedValue);
    assert_eq!(err.extra, vec![Value::from("missing")]);
}

#[test]
fn test_autoescape_escapes_exactly_once() {
    let settings = Settings {
        autoescape: AutoEscape::Html,
        ..Default::default()
    };
    let env = Environment::with_settings(settings);
    for (source, expected) in [
        (r#"{{ '<>&"\''}}"#, "&lt;&gt;&amp;&#34;&#39;"),
        // A safe value passes through even when it contains specials.
        (r#"{{ '<i>'|safe }}"#, "<i>"),
        // escape then emit under autoescape must not double-escape.
        (r#"{{ '<i>'|escape }}"#, "&lt;i&gt;"),
    ] {
        let template = env.template_from_str(source, "esc.html").unwrap();
        assert_eq!(template.render(ValueMap::new()).unwrap(), expected);
    }
}

fn binding_env() -> Environment {
    let mut env = Environment::new();
    // Callable with descriptors [a mandatory, b default=7]; returns a
    // readable summary of the bound arguments.
    env.add_global(
        "f",
        Value::Callable(Callable::host(
            vec![ArgSpec::required("a"), ArgSpec::optional("b", 7)],
            |params| {
                let extra_pos = Value::from(params.extra_pos.clone());
                let extra_named: Vec<String> = params
                    .extra_named
                    .iter()
                    .map(|(k, v)| format!("{}:{}", k, v.to_output_string()))
                    .collect();
                Ok(Value::from(format!(
                    "a={} b={} pos={} named={{{}}}",
                    params.get("a").to_output_string(),
                    params.get("b").to_output_string(),
                    extra_pos.to_output_string(),
                    extra_named.join(",")
                )))
            },
        )),
    );
    env
}

#[test]
fn test_callable_binding_equivalent_forms() {
    let env = binding_env();
    // Every equivalent call form binds identically.
    for (source, b) in [
        ("{{ f(1) }}", 7),
        ("{{ f(1, 2) }}", 2),
        ("{{ f(a=1) }}", 7),
        ("{{ f(a=1, b=2) }}", 2),
        ("{{ f(1, b=2) }}", 2),
    ] {
        let template = env.template_from_str(source, "t").unwrap();
        assert_eq!(
            template.render(ValueMap::new()).unwrap(),
            format!("a=1 b={} pos=[] named={{}}", b),
            "for {source}"
        );
    }
}

#[test]
fn test_callable_binding_missing_argument() {
    let env = binding_env();
    let template = env.template_from_str("{{ f() }}", "t").unwrap();
    let err = template.render(ValueMap::new()).unwrap_err();
    assert_eq!(err.kind, ErrorKind::MissingArgument);
    assert_eq!(err.extra, vec![Value::from("a")]);
}

#[test]
fn test_callable_binding_extra_args() {
    let env = binding_env();
    let template = env.template_from_str("{{ f(1, 2, 3, x=4) }}", "t").unwrap();
    assert_eq!(
        template.render(ValueMap::new()).unwrap(),
        "a=1 b=2 pos=[3] named={x:4}"
    );
}

#[test]
fn test_whitespace_control_markers() {
    assert_eq!(render("a \n {{- 'b' -}} \n c"), "abc");
    assert_eq!(
        render("1\n{%- if true %}2{% endif -%}\n3"),
        "123"
    );
}

#[test]
fn test_trim_blocks_and_lstrip_blocks() {
    let settings = Settings {
        trim_blocks: true,
        lstrip_blocks: true,
        ..Default::default()
    };
    let env = Environment::with_settings(settings);
    let template = env
        .template_from_str(
            "<ul>\n{% for x in [1, 2] %}\n  <li>{{ x }}</li>\n{% endfor %}\n</ul>",
            "list.html",
        )
        .unwrap();
    assert_eq!(
        template.render(ValueMap::new()).unwrap(),
        "<ul>\n  <li>1</li>\n  <li>2</li>\n</ul>"
    );
}

#[test]
fn test_trailing_newline_removed_by_default() {
    assert_eq!(render("line\n"), "line");

    let settings = Settings {
        keep_trailing_newline: true,
        ..Default::default()
    };
    let env = Environment::with_settings(settings);
    let template = env.template_from_str("line\n", "t").unwrap();
    assert_eq!(template.render(ValueMap::new()).unwrap(), "line\n");
}

#[test]
fn test_comments_produce_no_output() {
    assert_eq!(render("a{# comment with {{ tags }} inside #}b"), "ab");
}

#[test]
fn test_large_int_double_comparison_policy() {
    // When variants differ both sides convert to f64; beyond 2^53 the
    // comparison tolerates the precision loss.
    let out = render("{{ 9007199254740993 == 9007199254740992.0 }}");
    assert_eq!(out, "true");
    // Same-variant comparison keeps full integer precision.
    assert_eq!(render("{{ 9007199254740993 == 9007199254740992 }}"), "false");
}

#[test]
fn test_map_iteration_and_attr_access() {
    let mut user = ValueMap::new();
    user.insert("name".to_string(), Value::from("Ada"));
    user.insert("admin".to_string(), Value::Bool(true));
    let mut params = ValueMap::new();
    params.insert("user".to_string(), Value::from(user));

    assert_eq!(
        render_with("{{ user.name }}/{{ user['name'] }}", params.clone()),
        "Ada/Ada"
    );
    // Iterating a map yields its keys in insertion order.
    assert_eq!(
        render_with("{% for k in user %}{{ k }} {% endfor %}", params),
        "name admin "
    );
}

#[test]
fn test_conditional_expression_without_else() {
    assert_eq!(render("{{ 'x' if false }}"), "");
    assert_eq!(render("{{ 'x' if true }}"), "x");
}
