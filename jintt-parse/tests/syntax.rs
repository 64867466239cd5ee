use jintt_ast::{BinOp, ExprKind, IfBranch, Stmt};
use jintt_parse::parse_source;

#[test]
fn plain_text_parses_to_a_single_text_node() {
    let tpl = parse_source("Hello World").expect("text should parse");
    assert_eq!(tpl.body.len(), 1);
    assert!(matches!(&tpl.body[0], Stmt::Text(t) if t.value == "Hello World"));
}

#[test]
fn if_branches_keep_order_elifs_then_else() {
    let tpl = parse_source("{% if a %}1{% elif b %}2{% elif c %}3{% else %}4{% endif %}")
        .expect("if chain should parse");
    let Stmt::If(stmt) = &tpl.body[0] else {
        panic!("expected if statement");
    };
    assert_eq!(stmt.branches.len(), 3);
    assert!(matches!(stmt.branches[0], IfBranch::Elif { .. }));
    assert!(matches!(stmt.branches[1], IfBranch::Elif { .. }));
    assert!(matches!(stmt.branches[2], IfBranch::Else { .. }));
}

#[test]
fn for_destructuring_filter_and_else_parse() {
    let tpl = parse_source(
        "{% for k, v in items if v recursive %}x{% else %}none{% endfor %}",
    )
    .expect("for should parse");
    let Stmt::For(stmt) = &tpl.body[0] else {
        panic!("expected for statement");
    };
    assert_eq!(stmt.loop_vars, vec!["k".to_string(), "v".to_string()]);
    assert!(stmt.filter.is_some());
    assert!(stmt.recursive);
    assert_eq!(stmt.else_body.len(), 1);
}

#[test]
fn set_has_exactly_one_of_value_or_body() {
    let tpl = parse_source("{% set a = 1 %}{% set b %}text{% endset %}").unwrap();
    let Stmt::Set(inline) = &tpl.body[0] else {
        panic!("expected set statement");
    };
    assert!(inline.value.is_some() && inline.body.is_empty());
    let Stmt::Set(block) = &tpl.body[1] else {
        panic!("expected set statement");
    };
    assert!(block.value.is_none() && !block.body.is_empty());
}

#[test]
fn raw_reproduces_the_source_slice_verbatim() {
    let tpl = parse_source("{% raw %} {{ not a tag }} {% endraw %}").unwrap();
    let Stmt::Raw(stmt) = &tpl.body[0] else {
        panic!("expected raw statement");
    };
    assert_eq!(stmt.value, " {{ not a tag }} ");
}

#[test]
fn include_context_clauses_have_jinja_defaults() {
    let tpl = parse_source(
        "{% include 'a.html' %}{% include 'b.html' ignore missing without context %}\
         {% import 'c.html' as c %}{% from 'd.html' import x as y, z with context %}",
    )
    .unwrap();
    let Stmt::Include(a) = &tpl.body[0] else {
        panic!("expected include");
    };
    assert!(a.with_context && !a.ignore_missing);
    let Stmt::Include(b) = &tpl.body[1] else {
        panic!("expected include");
    };
    assert!(b.ignore_missing && !b.with_context);
    let Stmt::Import(c) = &tpl.body[2] else {
        panic!("expected import");
    };
    assert_eq!(c.alias, "c");
    assert!(!c.with_context);
    let Stmt::FromImport(d) = &tpl.body[3] else {
        panic!("expected from-import");
    };
    assert_eq!(d.imports.len(), 2);
    assert_eq!(d.imports[0].alias.as_deref(), Some("y"));
    assert!(d.with_context);
}

#[test]
fn macro_defaults_are_recorded_as_written() {
    let tpl = parse_source("{% macro input(name, value='') %}x{% endmacro input %}").unwrap();
    let Stmt::Macro(stmt) = &tpl.body[0] else {
        panic!("expected macro");
    };
    assert_eq!(stmt.args.len(), 2);
    assert!(stmt.args[0].default.is_none());
    assert!(stmt.args[1].default.is_some());
}

#[test]
fn filter_chains_nest_right() {
    let tpl = parse_source("{{ a|f|g }}").unwrap();
    let Stmt::Output(out) = &tpl.body[0] else {
        panic!("expected output");
    };
    let ExprKind::Filter { name, base, .. } = &out.expr.kind else {
        panic!("expected filter");
    };
    assert_eq!(name, "g");
    assert!(matches!(&base.kind, ExprKind::Filter { name, .. } if name == "f"));
}

#[test]
fn two_word_operators_fold() {
    let tpl = parse_source("{{ a is not b }}{{ a not in b }}").unwrap();
    let Stmt::Output(first) = &tpl.body[0] else {
        panic!("expected output");
    };
    assert!(matches!(
        &first.expr.kind,
        ExprKind::Binary {
            op: BinOp::IsNot,
            ..
        }
    ));
    let Stmt::Output(second) = &tpl.body[1] else {
        panic!("expected output");
    };
    assert!(matches!(
        &second.expr.kind,
        ExprKind::Binary {
            op: BinOp::NotIn,
            ..
        }
    ));
}

#[test]
fn ternary_without_else_is_accepted() {
    let tpl = parse_source("{{ x if c }}").unwrap();
    let Stmt::Output(out) = &tpl.body[0] else {
        panic!("expected output");
    };
    assert!(matches!(
        &out.expr.kind,
        ExprKind::Ternary {
            otherwise: None,
            ..
        }
    ));
}

#[test]
fn string_literals_are_decoded_at_parse_time() {
    let tpl = parse_source(r#"{{ "a\n\t\"b\"" }}"#).unwrap();
    let Stmt::Output(out) = &tpl.body[0] else {
        panic!("expected output");
    };
    assert!(matches!(&out.expr.kind, ExprKind::StrLit(s) if s == "a\n\t\"b\""));
}

#[test]
fn literal_keywords_map_to_literals() {
    let tpl = parse_source("{{ True }}{{ false }}{{ None }}").unwrap();
    let kinds: Vec<_> = tpl
        .body
        .iter()
        .map(|s| match s {
            Stmt::Output(o) => &o.expr.kind,
            _ => panic!("expected output"),
        })
        .collect();
    assert!(matches!(kinds[0], ExprKind::BoolLit(true)));
    assert!(matches!(kinds[1], ExprKind::BoolLit(false)));
    assert!(matches!(kinds[2], ExprKind::NoneLit));
}

#[test]
fn unmatched_endif_is_rejected() {
    let err = parse_source("{% endif %}").expect_err("expected parse error");
    let msg = err.to_string();
    assert!(
        msg.contains("without a matching opening statement"),
        "unexpected error message: {msg}"
    );
}

#[test]
fn for_without_in_is_rejected() {
    let err = parse_source("{% for x items %}{% endfor %}").expect_err("expected parse error");
    let msg = err.to_string();
    assert!(msg.contains("expected 'in'"), "unexpected error message: {msg}");
}

#[test]
fn unknown_statement_keyword_is_rejected() {
    let err = parse_source("{% frobnicate %}").expect_err("expected parse error");
    let msg = err.to_string();
    assert!(
        msg.contains("unknown statement"),
        "unexpected error message: {msg}"
    );
}

#[test]
fn unterminated_block_is_rejected() {
    let err = parse_source("{% if user %}Hi").expect_err("expected parse error");
    let msg = err.to_string();
    assert!(msg.contains("end of input"), "unexpected error message: {msg}");
}

#[test]
fn mismatched_endblock_name_is_rejected() {
    let err = parse_source("{% block head %}x{% endblock body %}")
        .expect_err("expected parse error");
    let msg = err.to_string();
    assert!(msg.contains("'head'"), "unexpected error message: {msg}");
}
