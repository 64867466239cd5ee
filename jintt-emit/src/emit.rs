#![forbid(unsafe_code)]

use jintt_ast::{
    BinOp, Expr, ExprKind, FilterApply, IfBranch, Stmt, Template, UnaryOp,
};

use crate::filters::{FilterRule, FilterTable};

/// Walks a parsed template and renders target-dialect text.
///
/// Total on parser output: both walkers match exhaustively over the node
/// enums, so a forgotten node kind fails compilation instead of surfacing as
/// a runtime error.
pub struct Emitter {
    filters: FilterTable,
}

impl Emitter {
    pub fn new() -> Self {
        Self {
            filters: FilterTable::new(),
        }
    }

    pub fn with_filters(filters: FilterTable) -> Self {
        Self { filters }
    }

    pub fn emit(&self, template: &Template) -> String {
        let mut out = String::new();
        for stmt in &template.body {
            self.emit_stmt(&mut out, stmt);
        }
        out
    }

    fn emit_body(&self, out: &mut String, body: &[Stmt]) {
        for stmt in body {
            self.emit_stmt(out, stmt);
        }
    }

    fn emit_stmt(&self, out: &mut String, stmt: &Stmt) {
        match stmt {
            Stmt::Text(s) => out.push_str(&s.value),
            Stmt::Raw(s) => out.push_str(&s.value),

            Stmt::Comment(s) => {
                out.push_str("[%# ");
                out.push_str(&s.value);
                out.push_str(" %]");
            }

            Stmt::Output(s) => {
                open_tag(out, s.strip_before);
                self.emit_expr(out, &s.expr);
                close_tag(out, s.strip_after);
            }

            Stmt::If(s) => {
                open_tag(out, s.strip_before);
                out.push_str("IF ");
                self.emit_expr(out, &s.cond);
                close_tag(out, s.strip_after);
                self.emit_body(out, &s.body);
                for branch in &s.branches {
                    match branch {
                        IfBranch::Elif { cond, body } => {
                            out.push_str("[% ELSIF ");
                            self.emit_expr(out, cond);
                            out.push_str(" %]");
                            self.emit_body(out, body);
                        }
                        IfBranch::Else { body } => {
                            out.push_str("[% ELSE %]");
                            self.emit_body(out, body);
                        }
                    }
                }
                out.push_str("[% END %]");
            }

            Stmt::For(s) => {
                if let Some(filter) = &s.filter {
                    out.push_str("[%# loop filter: if ");
                    self.emit_expr(out, filter);
                    out.push_str(" %]");
                }
                if s.recursive {
                    out.push_str("[%# recursive loop %]");
                }

                let iterable = self.expr_to_string(&s.iterable);
                let vars = s.loop_vars.join(", ");

                if s.else_body.is_empty() {
                    open_tag(out, s.strip_before);
                    out.push_str("FOREACH ");
                    out.push_str(&vars);
                    out.push_str(" IN ");
                    out.push_str(&iterable);
                    out.push_str(" %]");
                    self.emit_body(out, &s.body);
                    out.push_str("[% END %]");
                } else {
                    // The target has no loop-else; guard on emptiness instead.
                    open_tag(out, s.strip_before);
                    out.push_str("IF ");
                    out.push_str(&iterable);
                    out.push_str(".size %][% FOREACH ");
                    out.push_str(&vars);
                    out.push_str(" IN ");
                    out.push_str(&iterable);
                    out.push_str(" %]");
                    self.emit_body(out, &s.body);
                    out.push_str("[% END %][% ELSE %]");
                    self.emit_body(out, &s.else_body);
                    out.push_str("[% END %]");
                }
            }

            Stmt::Block(s) => {
                open_tag(out, s.strip_before);
                out.push_str("BLOCK ");
                out.push_str(&s.name);
                out.push_str(" %]");
                self.emit_body(out, &s.body);
                out.push_str("[% END %]");
            }

            Stmt::Extends(s) => {
                out.push_str("[%# extends ");
                self.emit_expr(out, &s.template);
                out.push_str(": inheritance approximated with PROCESS %]");
                out.push_str("[% PROCESS ");
                out.push_str(&self.template_name(&s.template));
                out.push_str(" %]");
            }

            Stmt::Include(s) => {
                if s.ignore_missing || !s.with_context {
                    out.push_str("[%# include");
                    if s.ignore_missing {
                        out.push_str(" ignore missing");
                    }
                    if !s.with_context {
                        out.push_str(" without context");
                    }
                    out.push_str(" %]");
                }
                out.push_str("[% INCLUDE ");
                out.push_str(&self.template_name(&s.template));
                out.push_str(" %]");
            }

            Stmt::Import(s) => {
                out.push_str("[%# import ");
                self.emit_expr(out, &s.template);
                out.push_str(" as ");
                out.push_str(&s.alias);
                if s.with_context {
                    out.push_str(" with context");
                }
                out.push_str(" %]");
                out.push_str("[% USE ");
                out.push_str(&s.alias);
                out.push_str(" = ");
                out.push_str(&self.template_name(&s.template));
                out.push_str(" %]");
            }

            Stmt::FromImport(s) => {
                out.push_str("[%# from ");
                self.emit_expr(out, &s.template);
                out.push_str(" import ");
                for (i, import) in s.imports.iter().enumerate() {
                    if i > 0 {
                        out.push_str(", ");
                    }
                    out.push_str(&import.name);
                    if let Some(alias) = &import.alias {
                        out.push_str(" as ");
                        out.push_str(alias);
                    }
                }
                if s.with_context {
                    out.push_str(" with context");
                }
                out.push_str(" %]");
            }

            Stmt::Set(s) => {
                if let Some(value) = &s.value {
                    out.push_str("[% ");
                    out.push_str(&s.names.join(", "));
                    out.push_str(" = ");
                    self.emit_expr(out, value);
                    out.push_str(" %]");
                } else {
                    // Block form: capture through a FILTER, then assign.
                    let name = &s.names[0];
                    out.push_str("[% FILTER set_");
                    out.push_str(name);
                    out.push_str(" %]");
                    self.emit_body(out, &s.body);
                    out.push_str("[% END %][% ");
                    out.push_str(name);
                    out.push_str(" = set_");
                    out.push_str(name);
                    out.push_str(" %]");
                }
            }

            Stmt::Macro(s) => {
                let defaults: Vec<&jintt_ast::MacroArg> =
                    s.args.iter().filter(|a| a.default.is_some()).collect();
                if !defaults.is_empty() {
                    out.push_str("[%# macro defaults: ");
                    for (i, arg) in defaults.iter().enumerate() {
                        if i > 0 {
                            out.push_str(", ");
                        }
                        out.push_str(&arg.name);
                        out.push_str(" = ");
                        self.emit_expr(out, arg.default.as_ref().unwrap());
                    }
                    out.push_str(" %]");
                }
                out.push_str("[% MACRO ");
                out.push_str(&s.name);
                out.push('(');
                for (i, arg) in s.args.iter().enumerate() {
                    if i > 0 {
                        out.push_str(", ");
                    }
                    out.push_str(&arg.name);
                }
                out.push_str(") BLOCK %]");
                self.emit_body(out, &s.body);
                out.push_str("[% END %]");
            }

            Stmt::CallBlock(s) => {
                out.push_str("[%# call");
                if !s.args.is_empty() {
                    out.push('(');
                    out.push_str(&s.args.join(", "));
                    out.push(')');
                }
                out.push(' ');
                self.emit_expr(out, &s.call);
                out.push_str(": block invocation approximated with WRAPPER %]");
                out.push_str("[% WRAPPER ");
                match &s.call.kind {
                    ExprKind::Call { callee, .. } => self.emit_expr(out, callee),
                    _ => self.emit_expr(out, &s.call),
                }
                out.push_str(" %]");
                self.emit_body(out, &s.body);
                out.push_str("[% END %]");
            }

            Stmt::FilterBlock(s) => {
                out.push_str("[% FILTER ");
                for (i, apply) in s.filters.iter().enumerate() {
                    if i > 0 {
                        out.push_str(" | ");
                    }
                    self.emit_filter_chain_link(out, apply);
                }
                out.push_str(" %]");
                self.emit_body(out, &s.body);
                out.push_str("[% END %]");
            }

            Stmt::With(s) => {
                // The target has no scoped-with; plain assignments instead.
                for (name, value) in &s.assignments {
                    out.push_str("[% SET ");
                    out.push_str(name);
                    out.push_str(" = ");
                    self.emit_expr(out, value);
                    out.push_str(" %]");
                }
                self.emit_body(out, &s.body);
            }

            Stmt::Autoescape(s) => {
                out.push_str(if s.enabled {
                    "[%# autoescape on %]"
                } else {
                    "[%# autoescape off %]"
                });
                self.emit_body(out, &s.body);
                out.push_str("[%# end autoescape %]");
            }
        }
    }

    /// One link of a `FILTER a | b(...)` chain. Named target filters keep the
    /// mapped name; everything else keeps the source name.
    fn emit_filter_chain_link(&self, out: &mut String, apply: &FilterApply) {
        let name = match self.filters.get(&apply.name) {
            Some(FilterRule::Vmethod(tt)) | Some(FilterRule::Filter(tt)) => tt.as_str(),
            _ => apply.name.as_str(),
        };
        out.push_str(name);
        if !apply.args.is_empty() {
            out.push('(');
            for (i, arg) in apply.args.iter().enumerate() {
                if i > 0 {
                    out.push_str(", ");
                }
                self.emit_expr(out, arg);
            }
            out.push(')');
        }
    }

    /// Template references emit bare (quotes stripped) in INCLUDE/PROCESS/USE
    /// position; non-literal references emit as expressions.
    fn template_name(&self, template: &Expr) -> String {
        match &template.kind {
            ExprKind::StrLit(s) => s.clone(),
            _ => self.expr_to_string(template),
        }
    }

    fn expr_to_string(&self, expr: &Expr) -> String {
        let mut out = String::new();
        self.emit_expr(&mut out, expr);
        out
    }

    fn emit_expr(&self, out: &mut String, expr: &Expr) {
        match &expr.kind {
            ExprKind::Name(name) => out.push_str(name),

            ExprKind::StrLit(s) => {
                out.push('\'');
                for ch in s.chars() {
                    match ch {
                        '\\' => out.push_str("\\\\"),
                        '\'' => out.push_str("\\'"),
                        other => out.push(other),
                    }
                }
                out.push('\'');
            }

            ExprKind::NumLit(lexeme) => {
                out.push_str(&lexeme.replace('_', ""));
            }

            ExprKind::BoolLit(value) => out.push_str(if *value { "1" } else { "0" }),
            ExprKind::NoneLit => out.push_str("undef"),

            ExprKind::Binary { op, left, right } => {
                out.push('(');
                self.emit_expr(out, left);
                out.push(' ');
                out.push_str(map_binop(*op));
                out.push(' ');
                self.emit_expr(out, right);
                out.push(')');
            }

            ExprKind::Unary { op, operand } => match op {
                UnaryOp::Not => {
                    out.push_str("NOT ");
                    self.emit_expr(out, operand);
                }
                UnaryOp::Neg => {
                    out.push('-');
                    self.emit_expr(out, operand);
                }
                UnaryOp::Pos => {
                    out.push('+');
                    self.emit_expr(out, operand);
                }
            },

            ExprKind::Ternary {
                then,
                cond,
                otherwise,
            } => {
                out.push('(');
                self.emit_expr(out, cond);
                out.push_str(" ? ");
                self.emit_expr(out, then);
                out.push_str(" : ");
                match otherwise {
                    Some(expr) => self.emit_expr(out, expr),
                    None => out.push_str("''"),
                }
                out.push(')');
            }

            ExprKind::GetAttr { base, attr } => {
                self.emit_expr(out, base);
                if matches!(&base.kind, ExprKind::Name(n) if n == "loop") {
                    match attr.as_str() {
                        "index" => out.push_str(".count"),
                        "index0" => out.push_str(".index"),
                        "revindex" => out.push_str(".max - loop.index + 1"),
                        "length" => out.push_str(".size"),
                        other => {
                            out.push('.');
                            out.push_str(other);
                        }
                    }
                } else {
                    out.push('.');
                    out.push_str(attr);
                }
            }

            ExprKind::GetItem { base, index } => {
                self.emit_expr(out, base);
                match &index.kind {
                    ExprKind::NumLit(n) => {
                        out.push('.');
                        out.push_str(&n.replace('_', ""));
                    }
                    ExprKind::StrLit(key) => {
                        out.push('.');
                        out.push_str(key);
                    }
                    // Variable dereference; only faithful for simple names.
                    _ => {
                        out.push_str(".$");
                        self.emit_expr(out, index);
                    }
                }
            }

            ExprKind::Call {
                callee,
                args,
                kwargs,
            } => {
                if let ExprKind::Name(name) = &callee.kind {
                    if name == "range" && kwargs.is_empty() && matches!(args.len(), 1 | 2) {
                        let (lo, hi) = match args.len() {
                            1 => ("0".to_string(), self.expr_to_string(&args[0])),
                            _ => (self.expr_to_string(&args[0]), self.expr_to_string(&args[1])),
                        };
                        out.push('[');
                        out.push_str(&lo);
                        out.push_str(" .. ");
                        out.push_str(&hi);
                        out.push_str(" - 1]");
                        return;
                    }
                    if name == "super" && args.is_empty() && kwargs.is_empty() {
                        out.push_str("content");
                        return;
                    }
                }

                self.emit_expr(out, callee);
                out.push('(');
                let mut first = true;
                for arg in args {
                    if !first {
                        out.push_str(", ");
                    }
                    first = false;
                    self.emit_expr(out, arg);
                }
                for (name, value) in kwargs {
                    if !first {
                        out.push_str(", ");
                    }
                    first = false;
                    out.push_str(name);
                    out.push_str(" = ");
                    self.emit_expr(out, value);
                }
                out.push(')');
            }

            ExprKind::Filter { name, base, args } => {
                let base_str = self.expr_to_string(base);
                let arg_strs: Vec<String> =
                    args.iter().map(|a| self.expr_to_string(a)).collect();

                match self.filters.get(name) {
                    Some(FilterRule::Vmethod(tt)) => {
                        out.push_str(&base_str);
                        out.push('.');
                        out.push_str(tt);
                        if !arg_strs.is_empty() {
                            out.push('(');
                            out.push_str(&arg_strs.join(", "));
                            out.push(')');
                        }
                    }
                    Some(FilterRule::Filter(tt)) => {
                        out.push_str(&base_str);
                        out.push_str(" | ");
                        out.push_str(tt);
                        if !arg_strs.is_empty() {
                            out.push('(');
                            out.push_str(&arg_strs.join(", "));
                            out.push(')');
                        }
                    }
                    Some(FilterRule::Custom(format)) => {
                        out.push_str(&format(&base_str, &arg_strs));
                    }
                    Some(FilterRule::Drop) => out.push_str(&base_str),
                    None => {
                        out.push_str(&base_str);
                        out.push_str(" | ");
                        out.push_str(name);
                        if !arg_strs.is_empty() {
                            out.push('(');
                            out.push_str(&arg_strs.join(", "));
                            out.push(')');
                        }
                    }
                }
            }

            ExprKind::List(elements) | ExprKind::Tuple(elements) => {
                out.push('[');
                for (i, element) in elements.iter().enumerate() {
                    if i > 0 {
                        out.push_str(", ");
                    }
                    self.emit_expr(out, element);
                }
                out.push(']');
            }

            ExprKind::Dict(pairs) => {
                if pairs.is_empty() {
                    out.push_str("{}");
                    return;
                }
                out.push_str("{ ");
                for (i, (key, value)) in pairs.iter().enumerate() {
                    if i > 0 {
                        out.push_str(", ");
                    }
                    self.emit_expr(out, key);
                    out.push_str(" => ");
                    self.emit_expr(out, value);
                }
                out.push_str(" }");
            }

            ExprKind::NamedArg { name, value } => {
                out.push_str(name);
                out.push_str(" = ");
                self.emit_expr(out, value);
            }
        }
    }
}

impl Default for Emitter {
    fn default() -> Self {
        Self::new()
    }
}

fn open_tag(out: &mut String, strip: bool) {
    out.push_str(if strip { "[%- " } else { "[% " });
}

fn close_tag(out: &mut String, strip: bool) {
    out.push_str(if strip { " -%]" } else { " %]" });
}

fn map_binop(op: BinOp) -> &'static str {
    match op {
        BinOp::Add => "+",
        BinOp::Sub => "-",
        BinOp::Mul => "*",
        BinOp::Div => "/",
        BinOp::FloorDiv => "div",
        BinOp::Mod => "%",
        BinOp::Pow => "**",
        BinOp::Concat => "_",

        BinOp::Eq => "==",
        BinOp::Ne => "!=",
        BinOp::Lt => "<",
        BinOp::Gt => ">",
        BinOp::Le => "<=",
        BinOp::Ge => ">=",
        BinOp::In => "IN",
        BinOp::NotIn => "NOT IN",
        BinOp::Is => "is",
        BinOp::IsNot => "is not",

        BinOp::And => "AND",
        BinOp::Or => "OR",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn transpile(src: &str) -> String {
        let template = jintt_parse::parse_source(src).unwrap();
        Emitter::new().emit(&template)
    }

    #[test]
    fn filter_chain_emits_vmethods_left_to_right() {
        assert_eq!(transpile("{{ a|upper|lower }}"), "[% a.upper.lower %]");
    }

    #[test]
    fn filter_disposition_filter_keeps_pipe() {
        assert_eq!(transpile("{{ a|striptags }}"), "[% a | html_strip %]");
    }

    #[test]
    fn filter_disposition_drop_keeps_base() {
        assert_eq!(transpile("{{ a|safe }}"), "[% a %]");
    }

    #[test]
    fn unknown_filter_passes_through() {
        assert_eq!(transpile("{{ a|frobnify(1) }}"), "[% a | frobnify(1) %]");
    }

    #[test]
    fn custom_filter_dispositions_format() {
        assert_eq!(transpile("{{ n|abs }}"), "[% (n >= 0 ? n : -n) %]");
        assert_eq!(transpile("{{ n|round(2) }}"), "[% format(n, '%.2f') %]");
        assert_eq!(transpile("{{ n|default('x') }}"), "[% (n || 'x') %]");
        assert_eq!(transpile("{{ n|min }}"), "[% n.sort.first %]");
        assert_eq!(transpile("{{ s|wordcount }}"), "[% s.split.size %]");
        assert_eq!(transpile("{{ o|attr('k') }}"), "[% o.k %]");
    }

    #[test]
    fn runtime_filter_entries_shadow_builtins() {
        let template = jintt_parse::parse_source("{{ a|upper }}").unwrap();
        let mut table = FilterTable::new();
        table.insert("upper", FilterRule::Filter("shout".to_string()));
        let out = Emitter::with_filters(table).emit(&template);
        assert_eq!(out, "[% a | shout %]");
    }

    #[test]
    fn operators_map_to_target_keywords() {
        assert_eq!(transpile("{{ a and b or c }}"), "[% ((a AND b) OR c) %]");
        assert_eq!(transpile("{{ a ~ b }}"), "[% (a _ b) %]");
        assert_eq!(transpile("{{ a // b }}"), "[% (a div b) %]");
        assert_eq!(transpile("{{ a not in b }}"), "[% (a NOT IN b) %]");
        assert_eq!(transpile("{{ not a }}"), "[% NOT a %]");
    }

    #[test]
    fn loop_pseudo_variables_map() {
        assert_eq!(transpile("{{ loop.index }}"), "[% loop.count %]");
        assert_eq!(transpile("{{ loop.index0 }}"), "[% loop.index %]");
        assert_eq!(transpile("{{ loop.length }}"), "[% loop.size %]");
        assert_eq!(
            transpile("{{ loop.revindex }}"),
            "[% loop.max - loop.index + 1 %]"
        );
        assert_eq!(transpile("{{ loop.first }}"), "[% loop.first %]");
    }

    #[test]
    fn item_access_uses_dot_forms() {
        assert_eq!(transpile("{{ xs[0] }}"), "[% xs.0 %]");
        assert_eq!(transpile("{{ xs['key'] }}"), "[% xs.key %]");
        assert_eq!(transpile("{{ xs[k] }}"), "[% xs.$k %]");
    }

    #[test]
    fn range_calls_become_ranges() {
        assert_eq!(transpile("{{ range(10) }}"), "[% [0 .. 10 - 1] %]");
        assert_eq!(transpile("{{ range(2, 8) }}"), "[% [2 .. 8 - 1] %]");
        // No stepped range in the target; the call stays greppable.
        assert_eq!(transpile("{{ range(0, 10, 2) }}"), "[% range(0, 10, 2) %]");
    }

    #[test]
    fn super_call_becomes_content() {
        assert_eq!(transpile("{{ super() }}"), "[% content %]");
    }

    #[test]
    fn literals_emit_target_forms() {
        assert_eq!(transpile("{{ true }}"), "[% 1 %]");
        assert_eq!(transpile("{{ False }}"), "[% 0 %]");
        assert_eq!(transpile("{{ none }}"), "[% undef %]");
        assert_eq!(transpile("{{ 1_000 }}"), "[% 1000 %]");
        assert_eq!(transpile("{{ 'it\\'s' }}"), r"[% 'it\'s' %]");
    }

    #[test]
    fn collections_emit_target_forms() {
        assert_eq!(transpile("{{ [1, 2, 3] }}"), "[% [1, 2, 3] %]");
        assert_eq!(transpile("{{ {'a': 1} }}"), "[% { 'a' => 1 } %]");
        assert_eq!(transpile("{{ (1, 2) }}"), "[% [1, 2] %]");
    }

    #[test]
    fn kwargs_emit_as_assignments() {
        assert_eq!(
            transpile("{{ f(1, x=2) }}"),
            "[% f(1, x = 2) %]"
        );
        assert_eq!(
            transpile("{{ s|replace('a', count=2) }}"),
            "[% s.replace('a', count = 2) %]"
        );
    }
}
