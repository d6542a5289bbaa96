/*
 * integration_tests.rs
 * Copyright (c) 2025 Posit, PBC
 *
 * End-to-end tests for ginger through the public API.
 */

use std::sync::Arc;

use ginger::{
    AutoEscape, Environment, ErrorKind, MemoryLoader, Settings, Value, ValueMap,
};

fn env_with_templates(templates: &[(&str, &str)]) -> Environment {
    let mut env = Environment::new();
    env.set_loader(MemoryLoader::with_templates(templates.iter().copied()).into_arc());
    env
}

fn render(env: &Environment, source: &str, params: ValueMap) -> String {
    let template = env.template_from_str(source, "<inline>").unwrap();
    template.render(params).unwrap()
}

fn params(pairs: &[(&str, Value)]) -> ValueMap {
    let mut map = ValueMap::new();
    for (name, value) in pairs {
        map.insert(name.to_string(), value.clone());
    }
    map
}

#[test]
fn test_hello_world() {
    let env = Environment::new();
    let out = render(
        &env,
        "Hello {{ name }}!",
        params(&[("name", Value::from("World"))]),
    );
    assert_eq!(out, "Hello World!");
}

#[test]
fn test_loop_with_index_and_last() {
    let env = Environment::new();
    let items = Value::from(vec![
        Value::from("a"),
        Value::from("b"),
        Value::from("c"),
    ]);
    let out = render(
        &env,
        "{% for i in items %}{{ loop.index }}:{{ i }}{% if not loop.last %},{% endif %}{% endfor %}",
        params(&[("items", items)]),
    );
    assert_eq!(out, "1:a,2:b,3:c");
}

#[test]
fn test_string_repeat_and_concat() {
    let env = Environment::new();
    let out = render(&env, r#"{{ "x" * 3 ~ "-" ~ 1+2 }}"#, ValueMap::new());
    assert_eq!(out, "xxx-3");
}

#[test]
fn test_inheritance_block_override() {
    let env = env_with_templates(&[("base", "<<{% block body %}BASE{% endblock %}>>")]);
    let child = env
        .template_from_str(
            r#"{% extends "base" %}{% block body %}CHILD{% endblock %}"#,
            "child",
        )
        .unwrap();
    assert_eq!(child.render(ValueMap::new()).unwrap(), "<<CHILD>>");
}

#[test]
fn test_inheritance_super() {
    let env = env_with_templates(&[("base", "<<{% block body %}BASE{% endblock %}>>")]);
    let child = env
        .template_from_str(
            r#"{% extends "base" %}{% block body %}{{ super() }}CHILD{% endblock %}"#,
            "child",
        )
        .unwrap();
    assert_eq!(child.render(ValueMap::new()).unwrap(), "<<BASECHILD>>");
}

#[test]
fn test_three_level_inheritance() {
    let env = env_with_templates(&[
        ("root", "[{% block a %}R{% endblock %}]"),
        ("mid", "{% extends 'root' %}{% block a %}{{ super() }}M{% endblock %}"),
        ("leaf", "{% extends 'mid' %}{% block a %}{{ super() }}L{% endblock %}"),
    ]);
    let template = env.get_template("leaf").unwrap();
    assert_eq!(template.render(ValueMap::new()).unwrap(), "[RML]");
}

#[test]
fn test_default_filter_for_missing_name() {
    let env = Environment::new();
    let out = render(&env, r#"{{ undef|default("fallback") }}"#, ValueMap::new());
    assert_eq!(out, "fallback");
}

#[test]
fn test_autoescape_and_safe() {
    let settings = Settings {
        autoescape: AutoEscape::Html,
        ..Default::default()
    };
    let env = Environment::with_settings(settings);
    assert_eq!(
        render(&env, r#"{{ "<b>x</b>" }}"#, ValueMap::new()),
        "&lt;b&gt;x&lt;/b&gt;"
    );
    assert_eq!(
        render(&env, r#"{{ "<b>x</b>"|safe }}"#, ValueMap::new()),
        "<b>x</b>"
    );
}

#[test]
fn test_text_runs_are_never_escaped() {
    let settings = Settings {
        autoescape: AutoEscape::Html,
        ..Default::default()
    };
    let env = Environment::with_settings(settings);
    assert_eq!(
        render(&env, "<p>{{ 'a&b' }}</p>", ValueMap::new()),
        "<p>a&amp;b</p>"
    );
}

#[test]
fn test_include_with_context() {
    let env = env_with_templates(&[("partial", "Hello {{ name }}")]);
    let out = render(
        &env,
        "[{% include 'partial' %}]",
        params(&[("name", Value::from("ctx"))]),
    );
    assert_eq!(out, "[Hello ctx]");
}

#[test]
fn test_include_without_context() {
    let env = env_with_templates(&[("partial", "Hello {{ name }}")]);
    let out = render(
        &env,
        "[{% include 'partial' without context %}]",
        params(&[("name", Value::from("ctx"))]),
    );
    assert_eq!(out, "[Hello ]");
}

#[test]
fn test_include_ignore_missing() {
    let env = env_with_templates(&[]);
    let out = render(&env, "a{% include 'nope' ignore missing %}b", ValueMap::new());
    assert_eq!(out, "ab");
}

#[test]
fn test_include_missing_is_error() {
    let env = env_with_templates(&[]);
    let template = env
        .template_from_str("{% include 'nope' %}", "t")
        .unwrap();
    let err = template.render(ValueMap::new()).unwrap_err();
    assert_eq!(err.kind, ErrorKind::TemplateNotFound);
}

#[test]
fn test_include_candidate_list() {
    let env = env_with_templates(&[("second", "found")]);
    let out = render(
        &env,
        "{% include ['first', 'second'] %}",
        ValueMap::new(),
    );
    assert_eq!(out, "found");
}

#[test]
fn test_macro_definition_and_call() {
    let env = Environment::new();
    let out = render(
        &env,
        concat!(
            "{% macro input(name, type='text') %}",
            "<input name=\"{{ name }}\" type=\"{{ type }}\">",
            "{% endmacro %}",
            "{{ input('user') }}{{ input('pw', type='password') }}",
        ),
        ValueMap::new(),
    );
    assert_eq!(
        out,
        "<input name=\"user\" type=\"text\"><input name=\"pw\" type=\"password\">"
    );
}

#[test]
fn test_macro_varargs_and_kwargs() {
    let env = Environment::new();
    let out = render(
        &env,
        concat!(
            "{% macro m(a) %}{{ a }}|{{ varargs|join(',') }}|{{ kwargs['x'] }}{% endmacro %}",
            "{{ m(1, 2, 3, x=4) }}",
        ),
        ValueMap::new(),
    );
    assert_eq!(out, "1|2,3|4");
}

#[test]
fn test_call_block_with_caller() {
    let env = Environment::new();
    let out = render(
        &env,
        concat!(
            "{% macro dialog(title) %}<h1>{{ title }}</h1>{{ caller() }}{% endmacro %}",
            "{% call dialog('Hi') %}body{% endcall %}",
        ),
        ValueMap::new(),
    );
    assert_eq!(out, "<h1>Hi</h1>body");
}

#[test]
fn test_call_block_with_parameters() {
    let env = Environment::new();
    let out = render(
        &env,
        concat!(
            "{% macro each(items) %}",
            "{% for item in items %}{{ caller(item) }}{% endfor %}",
            "{% endmacro %}",
            "{% call(thing) each([1, 2]) %}[{{ thing }}]{% endcall %}",
        ),
        ValueMap::new(),
    );
    assert_eq!(out, "[1][2]");
}

#[test]
fn test_import_as_namespace() {
    let env = env_with_templates(&[(
        "forms",
        "{% macro input(name) %}<input name=\"{{ name }}\">{% endmacro %}",
    )]);
    let out = render(
        &env,
        "{% import 'forms' as forms %}{{ forms.input('q') }}",
        ValueMap::new(),
    );
    assert_eq!(out, "<input name=\"q\">");
}

#[test]
fn test_from_import_with_alias() {
    let env = env_with_templates(&[(
        "forms",
        concat!(
            "{% macro input(name) %}<input name=\"{{ name }}\">{% endmacro %}",
            "{% set brand = 'acme' %}",
            "{% set _private = 'hidden' %}",
        ),
    )]);
    let out = render(
        &env,
        "{% from 'forms' import input as field, brand %}{{ field('q') }}/{{ brand }}",
        ValueMap::new(),
    );
    assert_eq!(out, "<input name=\"q\">/acme");
}

#[test]
fn test_from_import_private_names_not_exported() {
    let env = env_with_templates(&[("m", "{% set _private = 1 %}")]);
    let template = env
        .template_from_str("{% from 'm' import _private %}", "t")
        .unwrap();
    let err = template.render(ValueMap::new()).unwrap_err();
    assert_eq!(err.kind, ErrorKind::UndefinedValue);
}

#[test]
fn test_set_expression_and_block_form() {
    let env = Environment::new();
    assert_eq!(
        render(&env, "{% set x = 2 + 3 %}{{ x }}", ValueMap::new()),
        "5"
    );
    assert_eq!(
        render(
            &env,
            "{% set greeting %}Hello {{ 'there'|upper }}{% endset %}{{ greeting }}",
            ValueMap::new()
        ),
        "Hello THERE"
    );
}

#[test]
fn test_set_tuple_unpacking() {
    let env = Environment::new();
    assert_eq!(
        render(&env, "{% set a, b = [1, 2] %}{{ a }}{{ b }}", ValueMap::new()),
        "12"
    );
}

#[test]
fn test_filter_block() {
    let env = Environment::new();
    assert_eq!(
        render(
            &env,
            "{% filter upper %}shout {{ 'it' }}{% endfilter %}",
            ValueMap::new()
        ),
        "SHOUT IT"
    );
}

#[test]
fn test_with_scope() {
    let env = Environment::new();
    assert_eq!(
        render(
            &env,
            "{% with a = 1, b = a + 1 %}{{ a }}{{ b }}{% endwith %}{{ a }}",
            ValueMap::new()
        ),
        "12"
    );
}

#[test]
fn test_raw_block() {
    let env = Environment::new();
    assert_eq!(
        render(
            &env,
            "{% raw %}{{ not evaluated }}{% endraw %}",
            ValueMap::new()
        ),
        "{{ not evaluated }}"
    );
}

#[test]
fn test_do_statement() {
    let mut env = Environment::new();
    env.add_global(
        "push",
        Value::Callable(ginger::Callable::host(
            vec![ginger::ArgSpec::required("v")],
            |params| Ok(params.get("v")),
        )),
    );
    assert_eq!(
        render(&env, "{% do push(1) %}done", ValueMap::new()),
        "done"
    );
}

#[test]
fn test_for_else_on_empty() {
    let env = Environment::new();
    let out = render(
        &env,
        "{% for x in items %}{{ x }}{% else %}nothing{% endfor %}",
        params(&[("items", Value::from(Vec::<Value>::new()))]),
    );
    assert_eq!(out, "nothing");
}

#[test]
fn test_for_inline_condition() {
    let env = Environment::new();
    let items = Value::from((1..=6).map(Value::from).collect::<Vec<_>>());
    let out = render(
        &env,
        "{% for x in items if x % 2 == 0 %}{{ x }}{{ ' ' if not loop.last }}{% endfor %}",
        params(&[("items", items)]),
    );
    assert_eq!(out, "2 4 6");
}

#[test]
fn test_recursive_loop() {
    let env = Environment::new();
    let leaf = |name: &str| {
        let mut map = ValueMap::new();
        map.insert("name".to_string(), Value::from(name));
        Value::from(map)
    };
    let mut a = ValueMap::new();
    a.insert("name".to_string(), Value::from("a"));
    a.insert("children".to_string(), Value::from(vec![leaf("b")]));
    let tree = Value::from(vec![Value::from(a), leaf("c")]);

    let out = render(
        &env,
        concat!(
            "{% for item in tree recursive %}{{ item.name }}",
            "{% if item.children %}({{ loop(item.children) }}){% endif %}",
            "{% endfor %}",
        ),
        params(&[("tree", tree)]),
    );
    assert_eq!(out, "a(b)c");
}

#[test]
fn test_loop_cycle() {
    let env = Environment::new();
    let items = Value::from(vec![Value::Int(1), Value::Int(2), Value::Int(3)]);
    let out = render(
        &env,
        "{% for x in items %}{{ loop.cycle('odd', 'even') }} {% endfor %}",
        params(&[("items", items)]),
    );
    assert_eq!(out, "odd even odd ");
}

#[test]
fn test_host_callable_reads_scope() {
    let mut env = Environment::new();
    env.add_global(
        "fetch",
        Value::Callable(ginger::Callable::host(
            vec![ginger::ArgSpec::required("name")],
            |params| {
                let name = params.get("name");
                let name = name.as_str().unwrap_or("");
                let scope = params.scope.expect("called from a template");
                Ok(scope.lookup(name).unwrap_or_default())
            },
        )),
    );
    let out = render(
        &env,
        "{% set hidden = 'found' %}{{ fetch('hidden') }}",
        ValueMap::new(),
    );
    assert_eq!(out, "found");
}

#[test]
fn test_dyn_map_host_container() {
    struct Config;
    impl ginger::MappingAccessor for Config {
        fn len(&self) -> Option<usize> {
            Some(2)
        }
        fn contains(&self, key: &str) -> bool {
            matches!(key, "host" | "port")
        }
        fn get(&self, key: &str) -> Option<Value> {
            match key {
                "host" => Some(Value::from("localhost")),
                "port" => Some(Value::Int(8080)),
                _ => None,
            }
        }
        fn keys(&self) -> Vec<String> {
            vec!["host".to_string(), "port".to_string()]
        }
    }

    let env = Environment::new();
    let config = Value::DynMap(ginger::DynMap::new(Arc::new(Config)));
    let out = render(
        &env,
        "{{ config.host }}:{{ config.port }}{{ config.missing }}",
        params(&[("config", config)]),
    );
    assert_eq!(out, "localhost:8080");
}

#[test]
fn test_dyn_list_host_container() {
    struct Squares;
    impl ginger::SequenceAccessor for Squares {
        fn len(&self) -> Option<usize> {
            Some(4)
        }
        fn item(&self, index: usize) -> Option<Value> {
            (index < 4).then(|| Value::Int((index * index) as i64))
        }
    }

    let env = Environment::new();
    let squares = Value::DynList(ginger::DynList::new(Arc::new(Squares)));
    let out = render(
        &env,
        "{{ squares|join(',') }}|{{ squares[2] }}|{{ squares|length }}",
        params(&[("squares", squares)]),
    );
    assert_eq!(out, "0,1,4,9|4|4");
}

#[test]
fn test_error_renders_single_line() {
    let env = Environment::new();
    let template = env
        .template_from_str("line one\n{{ 1 | nosuch }}", "page.txt")
        .unwrap();
    let err = template.render(ValueMap::new()).unwrap_err();
    let line = err.to_string();
    assert!(
        line.starts_with("page.txt:2:"),
        "unexpected error line: {line}"
    );
    assert!(line.contains("UnknownFilter"));
    assert!(line.contains("nosuch"));
}

#[test]
fn test_partial_output_not_rolled_back() {
    let env = Environment::new();
    let template = env
        .template_from_str("before{{ 1|nosuch }}after", "t")
        .unwrap();
    let mut sink = ginger::StringSink::new();
    let result = template.render_to(ValueMap::new(), &mut sink);
    assert!(result.is_err());
    assert_eq!(sink.into_string(), "before");
}

#[test]
fn test_template_cache_reuse() {
    let env = env_with_templates(&[("page", "cached {{ v }}")]);
    let first = env.get_template("page").unwrap();
    assert_eq!(
        first.render(params(&[("v", Value::Int(1))])).unwrap(),
        "cached 1"
    );
    // Second lookup hits the cache; renders stay independent.
    let second = env.get_template("page").unwrap();
    assert_eq!(
        second.render(params(&[("v", Value::Int(2))])).unwrap(),
        "cached 2"
    );
}

#[test]
fn test_concurrent_renders_share_environment() {
    let env = env_with_templates(&[("page", "{% for i in range(100) %}{{ v }}{% endfor %}")]);
    let env = Arc::new(env);

    let handles: Vec<_> = (0..4)
        .map(|worker| {
            let env = Arc::clone(&env);
            std::thread::spawn(move || {
                let template = env.get_template("page").unwrap();
                let out = template
                    .render(params(&[("v", Value::Int(worker))]))
                    .unwrap();
                assert_eq!(out, worker.to_string().repeat(100));
            })
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }
}

#[test]
fn test_filesystem_loader_end_to_end() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(
        dir.path().join("base.html"),
        "<title>{% block title %}default{% endblock %}</title>",
    )
    .unwrap();
    std::fs::write(
        dir.path().join("page.html"),
        "{% extends 'base.html' %}{% block title %}{{ name }}{% endblock %}",
    )
    .unwrap();

    let mut env = Environment::new();
    env.set_loader(Arc::new(ginger::FileSystemLoader::new(dir.path())));
    let template = env.get_template("page.html").unwrap();
    let out = template
        .render(params(&[("name", Value::from("Docs"))]))
        .unwrap();
    assert_eq!(out, "<title>Docs</title>");
}
