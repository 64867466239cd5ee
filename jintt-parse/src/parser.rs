#![forbid(unsafe_code)]

use std::mem;

use jintt_ast::{
    join, span_between, AutoescapeStmt, BinOp, BlockStmt, CallBlockStmt, CommentStmt, Expr,
    ExprKind, ExtendsStmt, FilterApply, FilterBlockStmt, ForStmt, FromImportStmt, IfBranch, IfStmt,
    ImportName, ImportStmt, IncludeStmt, MacroArg, MacroStmt, OutputStmt, RawStmt, SetStmt, Span,
    Stmt, Template, TextStmt, UnaryOp, WithStmt,
};
use jintt_lex::{Token, TokenKind};

use crate::error::ParseError;

pub struct Parser<'a> {
    src: &'a str,
    tokens: &'a [Token],
    idx: usize,
}

impl<'a> Parser<'a> {
    /// The parser keeps the source text alongside the tokens so `raw` blocks
    /// can reproduce their region verbatim from the original input.
    pub fn new(src: &'a str, tokens: &'a [Token]) -> Self {
        Self {
            src,
            tokens,
            idx: 0,
        }
    }

    pub fn parse_template(&mut self) -> Result<Template, ParseError> {
        let mut body = Vec::new();
        while !self.at(&TokenKind::Eof) && self.peek_kind().is_some() {
            body.push(self.parse_stmt()?);
        }
        Ok(Template { body })
    }

    fn parse_stmt(&mut self) -> Result<Stmt, ParseError> {
        match self.peek_kind() {
            Some(TokenKind::Text(_)) => {
                let tok = self.next().unwrap();
                let TokenKind::Text(value) = tok.kind else {
                    unreachable!()
                };
                Ok(Stmt::Text(TextStmt {
                    span: tok.span,
                    value,
                }))
            }
            Some(TokenKind::Comment(_)) => {
                let tok = self.next().unwrap();
                let TokenKind::Comment(value) = tok.kind else {
                    unreachable!()
                };
                Ok(Stmt::Comment(CommentStmt {
                    span: tok.span,
                    value,
                }))
            }
            Some(TokenKind::VarStart { .. }) => self.parse_output(),
            Some(TokenKind::StmtStart { .. }) => self.parse_statement_tag(),
            _ => {
                let (found, span) = self.found_here();
                Err(ParseError::UnexpectedToken {
                    expected: "template content".to_string(),
                    found,
                    span,
                })
            }
        }
    }

    fn parse_output(&mut self) -> Result<Stmt, ParseError> {
        let start = self.next().unwrap();
        let TokenKind::VarStart {
            strip: strip_before,
        } = start.kind
        else {
            unreachable!()
        };

        let expr = self.parse_expr()?;

        let end = self.expect(TokenKind::VarEnd { strip: false })?;
        let TokenKind::VarEnd { strip: strip_after } = end.kind else {
            unreachable!()
        };

        Ok(Stmt::Output(OutputStmt {
            span: join(start.span, end.span),
            expr,
            strip_before,
            strip_after,
        }))
    }

    fn parse_statement_tag(&mut self) -> Result<Stmt, ParseError> {
        let start = self.next().unwrap();
        let TokenKind::StmtStart { strip } = start.kind else {
            unreachable!()
        };

        let (keyword, kw_span) = self.expect_name()?;
        match keyword.as_str() {
            "if" => return self.parse_if(start.span, strip),
            "for" => return self.parse_for(start.span, strip),
            "block" => return self.parse_block(start.span, strip),
            "extends" => return self.parse_extends(start.span),
            "include" => return self.parse_include(start.span),
            "import" => return self.parse_import(start.span),
            "from" => return self.parse_from_import(start.span),
            "set" => return self.parse_set(start.span),
            "macro" => return self.parse_macro(start.span),
            "call" => return self.parse_call_block(start.span),
            "filter" => return self.parse_filter_block(start.span),
            "raw" => return self.parse_raw(start.span),
            "with" => return self.parse_with(start.span),
            "autoescape" => return self.parse_autoescape(start.span),
            _ => {}
        }

        if keyword == "elif" || keyword == "else" || keyword.starts_with("end") {
            return Err(ParseError::UnmatchedClosure {
                keyword,
                span: kw_span,
            });
        }
        Err(ParseError::UnknownStatement {
            keyword,
            span: kw_span,
        })
    }

    /// Collects statements until `{% <terminator> %}`. The cursor is left on
    /// the terminator's `StmtStart` so the caller can consume its tag.
    fn parse_body(&mut self, terminators: &[&str]) -> Result<Vec<Stmt>, ParseError> {
        let mut body = Vec::new();
        loop {
            match self.peek_kind() {
                None | Some(TokenKind::Eof) => {
                    let (found, span) = self.found_here();
                    return Err(ParseError::UnexpectedToken {
                        expected: format!("'{{% {} %}}'", terminators.join(" %}' or '{% ")),
                        found,
                        span,
                    });
                }
                Some(TokenKind::StmtStart { .. }) => {
                    if let Some(TokenKind::Name(kw)) = self.peek_kind_n(1) {
                        if terminators.iter().any(|t| t == kw) {
                            return Ok(body);
                        }
                    }
                    body.push(self.parse_stmt()?);
                }
                _ => body.push(self.parse_stmt()?),
            }
        }
    }

    /// Peeks the keyword of the terminator tag the cursor rests on.
    fn terminator_keyword(&self) -> String {
        match self.peek_kind_n(1) {
            Some(TokenKind::Name(kw)) => kw.clone(),
            _ => String::new(),
        }
    }

    /// Consumes a bare `{% keyword %}` tag, returning its closing token.
    fn eat_stmt(&mut self, keyword: &str) -> Result<Token, ParseError> {
        self.expect(TokenKind::StmtStart { strip: false })?;
        self.expect_keyword(keyword)?;
        self.expect(TokenKind::StmtEnd { strip: false })
    }

    /// Consumes `{% keyword [name] %}` where the optional trailing name must
    /// repeat `name` when present (`endblock`, `endmacro`).
    fn eat_stmt_named(&mut self, keyword: &str, name: &str) -> Result<Token, ParseError> {
        self.expect(TokenKind::StmtStart { strip: false })?;
        self.expect_keyword(keyword)?;
        if let Some(TokenKind::Name(_)) = self.peek_kind() {
            let (trailing, span) = self.expect_name()?;
            if trailing != name {
                return Err(ParseError::UnexpectedToken {
                    expected: format!("'{name}'"),
                    found: format!("'{trailing}'"),
                    span,
                });
            }
        }
        self.expect(TokenKind::StmtEnd { strip: false })
    }

    fn parse_if(&mut self, start_span: Span, strip_before: bool) -> Result<Stmt, ParseError> {
        let cond = self.parse_expr()?;
        let open_end = self.expect(TokenKind::StmtEnd { strip: false })?;
        let TokenKind::StmtEnd { strip: strip_after } = open_end.kind else {
            unreachable!()
        };

        let body = self.parse_body(&["elif", "else", "endif"])?;

        let mut branches = Vec::new();
        let end = loop {
            match self.terminator_keyword().as_str() {
                "elif" => {
                    self.expect(TokenKind::StmtStart { strip: false })?;
                    self.expect_keyword("elif")?;
                    let cond = self.parse_expr()?;
                    self.expect(TokenKind::StmtEnd { strip: false })?;
                    let body = self.parse_body(&["elif", "else", "endif"])?;
                    branches.push(IfBranch::Elif { cond, body });
                }
                "else" => {
                    self.eat_stmt("else")?;
                    let body = self.parse_body(&["endif"])?;
                    branches.push(IfBranch::Else { body });
                    break self.eat_stmt("endif")?;
                }
                _ => break self.eat_stmt("endif")?,
            }
        };

        Ok(Stmt::If(IfStmt {
            span: join(start_span, end.span),
            cond,
            body,
            branches,
            strip_before,
            strip_after,
        }))
    }

    fn parse_for(&mut self, start_span: Span, strip_before: bool) -> Result<Stmt, ParseError> {
        let mut loop_vars = vec![self.expect_name()?.0];
        while self.at(&TokenKind::Comma) {
            self.next();
            loop_vars.push(self.expect_name()?.0);
        }

        self.expect(TokenKind::KwIn)?;

        // Parsed below the ternary level so a trailing `if` starts the loop
        // filter clause instead of a conditional expression.
        let iterable = self.parse_or_expr()?;

        let filter = if self.at_name("if") {
            self.next();
            Some(self.parse_expr()?)
        } else {
            None
        };

        let recursive = if self.at_name("recursive") {
            self.next();
            true
        } else {
            false
        };

        self.expect(TokenKind::StmtEnd { strip: false })?;

        let body = self.parse_body(&["else", "endfor"])?;
        let (else_body, end) = if self.terminator_keyword() == "else" {
            self.eat_stmt("else")?;
            let else_body = self.parse_body(&["endfor"])?;
            (else_body, self.eat_stmt("endfor")?)
        } else {
            (Vec::new(), self.eat_stmt("endfor")?)
        };

        Ok(Stmt::For(ForStmt {
            span: join(start_span, end.span),
            loop_vars,
            iterable,
            filter,
            recursive,
            body,
            else_body,
            strip_before,
        }))
    }

    fn parse_block(&mut self, start_span: Span, strip_before: bool) -> Result<Stmt, ParseError> {
        let (name, _) = self.expect_name()?;
        let scoped = if self.at_name("scoped") {
            self.next();
            true
        } else {
            false
        };
        self.expect(TokenKind::StmtEnd { strip: false })?;

        let body = self.parse_body(&["endblock"])?;
        let end = self.eat_stmt_named("endblock", &name)?;

        Ok(Stmt::Block(BlockStmt {
            span: join(start_span, end.span),
            name,
            scoped,
            body,
            strip_before,
        }))
    }

    fn parse_extends(&mut self, start_span: Span) -> Result<Stmt, ParseError> {
        let template = self.parse_expr()?;
        let end = self.expect(TokenKind::StmtEnd { strip: false })?;
        Ok(Stmt::Extends(ExtendsStmt {
            span: join(start_span, end.span),
            template,
        }))
    }

    fn parse_include(&mut self, start_span: Span) -> Result<Stmt, ParseError> {
        let template = self.parse_expr()?;

        let mut ignore_missing = false;
        if self.at_name("ignore") {
            self.next();
            self.expect_keyword("missing")?;
            ignore_missing = true;
        }

        let with_context = self.parse_context_clause(true)?;
        let end = self.expect(TokenKind::StmtEnd { strip: false })?;

        Ok(Stmt::Include(IncludeStmt {
            span: join(start_span, end.span),
            template,
            ignore_missing,
            with_context,
        }))
    }

    fn parse_import(&mut self, start_span: Span) -> Result<Stmt, ParseError> {
        let template = self.parse_expr()?;
        self.expect_keyword("as")?;
        let (alias, _) = self.expect_name()?;
        let with_context = self.parse_context_clause(false)?;
        let end = self.expect(TokenKind::StmtEnd { strip: false })?;

        Ok(Stmt::Import(ImportStmt {
            span: join(start_span, end.span),
            template,
            alias,
            with_context,
        }))
    }

    fn parse_from_import(&mut self, start_span: Span) -> Result<Stmt, ParseError> {
        let template = self.parse_expr()?;
        self.expect_keyword("import")?;

        let mut imports = Vec::new();
        loop {
            let (name, _) = self.expect_name()?;
            let alias = if self.at_name("as") {
                self.next();
                Some(self.expect_name()?.0)
            } else {
                None
            };
            imports.push(ImportName { name, alias });
            if self.at(&TokenKind::Comma) {
                self.next();
                continue;
            }
            break;
        }

        let with_context = self.parse_context_clause(false)?;
        let end = self.expect(TokenKind::StmtEnd { strip: false })?;

        Ok(Stmt::FromImport(FromImportStmt {
            span: join(start_span, end.span),
            template,
            imports,
            with_context,
        }))
    }

    /// `with context` / `without context`, when the next two names spell one.
    fn parse_context_clause(&mut self, default: bool) -> Result<bool, ParseError> {
        for (lead, value) in [("with", true), ("without", false)] {
            if self.at_name(lead) && matches!(self.peek_kind_n(1), Some(TokenKind::Name(n)) if n == "context")
            {
                self.next();
                self.next();
                return Ok(value);
            }
        }
        Ok(default)
    }

    fn parse_set(&mut self, start_span: Span) -> Result<Stmt, ParseError> {
        let mut names = vec![self.expect_name()?.0];
        while self.at(&TokenKind::Comma) {
            self.next();
            names.push(self.expect_name()?.0);
        }

        if self.at(&TokenKind::Assign) {
            self.next();
            let mut value = self.parse_expr()?;
            if self.at(&TokenKind::Comma) {
                let mut elements = vec![value];
                while self.at(&TokenKind::Comma) {
                    self.next();
                    elements.push(self.parse_expr()?);
                }
                let span = join(elements[0].span, elements[elements.len() - 1].span);
                value = Expr {
                    span,
                    kind: ExprKind::Tuple(elements),
                };
            }
            let end = self.expect(TokenKind::StmtEnd { strip: false })?;
            return Ok(Stmt::Set(SetStmt {
                span: join(start_span, end.span),
                names,
                value: Some(value),
                body: Vec::new(),
            }));
        }

        self.expect(TokenKind::StmtEnd { strip: false })?;
        let body = self.parse_body(&["endset"])?;
        let end = self.eat_stmt("endset")?;

        Ok(Stmt::Set(SetStmt {
            span: join(start_span, end.span),
            names,
            value: None,
            body,
        }))
    }

    fn parse_macro(&mut self, start_span: Span) -> Result<Stmt, ParseError> {
        let (name, _) = self.expect_name()?;
        self.expect(TokenKind::LParen)?;

        let mut args = Vec::new();
        if !self.at(&TokenKind::RParen) {
            loop {
                let (arg_name, _) = self.expect_name()?;
                let default = if self.at(&TokenKind::Assign) {
                    self.next();
                    Some(self.parse_expr()?)
                } else {
                    None
                };
                args.push(MacroArg {
                    name: arg_name,
                    default,
                });
                if self.at(&TokenKind::Comma) {
                    self.next();
                    if self.at(&TokenKind::RParen) {
                        break;
                    }
                    continue;
                }
                break;
            }
        }
        self.expect(TokenKind::RParen)?;
        self.expect(TokenKind::StmtEnd { strip: false })?;

        let body = self.parse_body(&["endmacro"])?;
        let end = self.eat_stmt_named("endmacro", &name)?;

        Ok(Stmt::Macro(MacroStmt {
            span: join(start_span, end.span),
            name,
            args,
            body,
        }))
    }

    fn parse_call_block(&mut self, start_span: Span) -> Result<Stmt, ParseError> {
        // `{% call(a, b) caller_args() %}` passes names into the block.
        let mut args = Vec::new();
        if self.at(&TokenKind::LParen) {
            self.next();
            if !self.at(&TokenKind::RParen) {
                loop {
                    args.push(self.expect_name()?.0);
                    if self.at(&TokenKind::Comma) {
                        self.next();
                        continue;
                    }
                    break;
                }
            }
            self.expect(TokenKind::RParen)?;
        }

        let call = self.parse_expr()?;
        self.expect(TokenKind::StmtEnd { strip: false })?;

        let body = self.parse_body(&["endcall"])?;
        let end = self.eat_stmt("endcall")?;

        Ok(Stmt::CallBlock(CallBlockStmt {
            span: join(start_span, end.span),
            args,
            call,
            body,
        }))
    }

    fn parse_filter_block(&mut self, start_span: Span) -> Result<Stmt, ParseError> {
        let mut filters = Vec::new();
        loop {
            let (name, _) = self.expect_name()?;
            let args = if self.at(&TokenKind::LParen) {
                self.parse_filter_args()?
            } else {
                Vec::new()
            };
            filters.push(FilterApply { name, args });
            if self.at(&TokenKind::Pipe) {
                self.next();
                continue;
            }
            break;
        }
        self.expect(TokenKind::StmtEnd { strip: false })?;

        let body = self.parse_body(&["endfilter"])?;
        let end = self.eat_stmt("endfilter")?;

        Ok(Stmt::FilterBlock(FilterBlockStmt {
            span: join(start_span, end.span),
            filters,
            body,
        }))
    }

    fn parse_raw(&mut self, start_span: Span) -> Result<Stmt, ParseError> {
        let open_end = self.expect(TokenKind::StmtEnd { strip: false })?;
        let slice_start = open_end.span.offset() + open_end.span.len();

        // The raw region is reproduced by slicing the input between the tags,
        // not by gluing lexemes back together.
        let mut j = self.idx;
        let close_at = loop {
            match self.tokens.get(j).map(|t| &t.kind) {
                None | Some(TokenKind::Eof) => {
                    return Err(ParseError::UnexpectedToken {
                        expected: "'{% endraw %}'".to_string(),
                        found: "end of input".to_string(),
                        span: span_between(self.src.len(), self.src.len()),
                    });
                }
                Some(TokenKind::StmtStart { .. }) => {
                    if matches!(self.tokens.get(j + 1).map(|t| &t.kind), Some(TokenKind::Name(kw)) if kw == "endraw")
                    {
                        break j;
                    }
                    j += 1;
                }
                _ => j += 1,
            }
        };

        let slice_end = self.tokens[close_at].span.offset();
        let value = self.src[slice_start..slice_end].to_string();

        self.idx = close_at;
        let end = self.eat_stmt("endraw")?;

        Ok(Stmt::Raw(RawStmt {
            span: join(start_span, end.span),
            value,
        }))
    }

    fn parse_with(&mut self, start_span: Span) -> Result<Stmt, ParseError> {
        let mut assignments = Vec::new();
        loop {
            let (name, _) = self.expect_name()?;
            self.expect(TokenKind::Assign)?;
            let value = self.parse_expr()?;
            assignments.push((name, value));
            if self.at(&TokenKind::Comma) {
                self.next();
                continue;
            }
            break;
        }
        self.expect(TokenKind::StmtEnd { strip: false })?;

        let body = self.parse_body(&["endwith"])?;
        let end = self.eat_stmt("endwith")?;

        Ok(Stmt::With(WithStmt {
            span: join(start_span, end.span),
            assignments,
            body,
        }))
    }

    fn parse_autoescape(&mut self, start_span: Span) -> Result<Stmt, ParseError> {
        let arg = self.parse_expr()?;
        // Annotation-only construct: anything but a literal false reads as on.
        let enabled = !matches!(arg.kind, ExprKind::BoolLit(false));
        self.expect(TokenKind::StmtEnd { strip: false })?;

        let body = self.parse_body(&["endautoescape"])?;
        let end = self.eat_stmt("endautoescape")?;

        Ok(Stmt::Autoescape(AutoescapeStmt {
            span: join(start_span, end.span),
            enabled,
            body,
        }))
    }

    // ---- Expressions ----

    pub fn parse_expr(&mut self) -> Result<Expr, ParseError> {
        self.parse_ternary_expr()
    }

    fn parse_ternary_expr(&mut self) -> Result<Expr, ParseError> {
        let then = self.parse_or_expr()?;
        if !self.at_name("if") {
            return Ok(then);
        }
        self.next();
        let cond = self.parse_or_expr()?;
        let otherwise = if self.at_name("else") {
            self.next();
            Some(Box::new(self.parse_ternary_expr()?))
        } else {
            None
        };
        let end_span = otherwise.as_ref().map(|e| e.span).unwrap_or(cond.span);
        Ok(Expr {
            span: join(then.span, end_span),
            kind: ExprKind::Ternary {
                then: Box::new(then),
                cond: Box::new(cond),
                otherwise,
            },
        })
    }

    fn parse_or_expr(&mut self) -> Result<Expr, ParseError> {
        let mut left = self.parse_and_expr()?;
        while self.at(&TokenKind::KwOr) {
            self.next();
            let right = self.parse_and_expr()?;
            let span = join(left.span, right.span);
            left = Expr {
                span,
                kind: ExprKind::Binary {
                    op: BinOp::Or,
                    left: Box::new(left),
                    right: Box::new(right),
                },
            };
        }
        Ok(left)
    }

    fn parse_and_expr(&mut self) -> Result<Expr, ParseError> {
        let mut left = self.parse_not_expr()?;
        while self.at(&TokenKind::KwAnd) {
            self.next();
            let right = self.parse_not_expr()?;
            let span = join(left.span, right.span);
            left = Expr {
                span,
                kind: ExprKind::Binary {
                    op: BinOp::And,
                    left: Box::new(left),
                    right: Box::new(right),
                },
            };
        }
        Ok(left)
    }

    fn parse_not_expr(&mut self) -> Result<Expr, ParseError> {
        // `not` folds into `not in` one level down; only a bare `not` is a
        // prefix here.
        if self.at(&TokenKind::KwNot)
            && !matches!(self.peek_kind_n(1), Some(TokenKind::KwIn))
        {
            let tok = self.next().unwrap();
            let operand = self.parse_not_expr()?;
            let span = join(tok.span, operand.span);
            return Ok(Expr {
                span,
                kind: ExprKind::Unary {
                    op: UnaryOp::Not,
                    operand: Box::new(operand),
                },
            });
        }
        self.parse_cmp_expr()
    }

    fn parse_cmp_expr(&mut self) -> Result<Expr, ParseError> {
        let mut left = self.parse_add_expr()?;
        loop {
            let op = match self.peek_kind() {
                Some(TokenKind::EqEq) => {
                    self.next();
                    BinOp::Eq
                }
                Some(TokenKind::NotEq) => {
                    self.next();
                    BinOp::Ne
                }
                Some(TokenKind::Lt) => {
                    self.next();
                    BinOp::Lt
                }
                Some(TokenKind::Gt) => {
                    self.next();
                    BinOp::Gt
                }
                Some(TokenKind::LtEq) => {
                    self.next();
                    BinOp::Le
                }
                Some(TokenKind::GtEq) => {
                    self.next();
                    BinOp::Ge
                }
                Some(TokenKind::KwIn) => {
                    self.next();
                    BinOp::In
                }
                Some(TokenKind::KwIs) => {
                    // One-token lookahead folds the two-word form.
                    self.next();
                    if self.at(&TokenKind::KwNot) {
                        self.next();
                        BinOp::IsNot
                    } else {
                        BinOp::Is
                    }
                }
                Some(TokenKind::KwNot)
                    if matches!(self.peek_kind_n(1), Some(TokenKind::KwIn)) =>
                {
                    self.next();
                    self.next();
                    BinOp::NotIn
                }
                _ => break,
            };
            let right = self.parse_add_expr()?;
            let span = join(left.span, right.span);
            left = Expr {
                span,
                kind: ExprKind::Binary {
                    op,
                    left: Box::new(left),
                    right: Box::new(right),
                },
            };
        }
        Ok(left)
    }

    fn parse_add_expr(&mut self) -> Result<Expr, ParseError> {
        let mut left = self.parse_mul_expr()?;
        loop {
            let op = match self.peek_kind() {
                Some(TokenKind::Plus) => BinOp::Add,
                Some(TokenKind::Minus) => BinOp::Sub,
                Some(TokenKind::Tilde) => BinOp::Concat,
                _ => break,
            };
            self.next();
            let right = self.parse_mul_expr()?;
            let span = join(left.span, right.span);
            left = Expr {
                span,
                kind: ExprKind::Binary {
                    op,
                    left: Box::new(left),
                    right: Box::new(right),
                },
            };
        }
        Ok(left)
    }

    fn parse_mul_expr(&mut self) -> Result<Expr, ParseError> {
        let mut left = self.parse_unary_expr()?;
        loop {
            let op = match self.peek_kind() {
                Some(TokenKind::Star) => BinOp::Mul,
                Some(TokenKind::Slash) => BinOp::Div,
                Some(TokenKind::Percent) => BinOp::Mod,
                Some(TokenKind::FloorDiv) => BinOp::FloorDiv,
                Some(TokenKind::Pow) => BinOp::Pow,
                _ => break,
            };
            self.next();
            let right = self.parse_unary_expr()?;
            let span = join(left.span, right.span);
            left = Expr {
                span,
                kind: ExprKind::Binary {
                    op,
                    left: Box::new(left),
                    right: Box::new(right),
                },
            };
        }
        Ok(left)
    }

    fn parse_unary_expr(&mut self) -> Result<Expr, ParseError> {
        let op = match self.peek_kind() {
            Some(TokenKind::Plus) => Some(UnaryOp::Pos),
            Some(TokenKind::Minus) => Some(UnaryOp::Neg),
            _ => None,
        };
        let Some(op) = op else {
            return self.parse_filter_expr();
        };
        let tok = self.next().unwrap();
        let operand = self.parse_unary_expr()?;
        let span = join(tok.span, operand.span);
        Ok(Expr {
            span,
            kind: ExprKind::Unary {
                op,
                operand: Box::new(operand),
            },
        })
    }

    fn parse_filter_expr(&mut self) -> Result<Expr, ParseError> {
        let mut expr = self.parse_postfix_expr()?;
        while self.at(&TokenKind::Pipe) {
            self.next();
            let (name, name_span) = self.expect_name()?;
            let args = if self.at(&TokenKind::LParen) {
                self.parse_filter_args()?
            } else {
                Vec::new()
            };
            let end_span = args.last().map(|a| a.span).unwrap_or(name_span);
            let span = join(expr.span, end_span);
            expr = Expr {
                span,
                kind: ExprKind::Filter {
                    name,
                    base: Box::new(expr),
                    args,
                },
            };
        }
        Ok(expr)
    }

    fn parse_postfix_expr(&mut self) -> Result<Expr, ParseError> {
        let mut expr = self.parse_primary_expr()?;
        loop {
            match self.peek_kind() {
                Some(TokenKind::Dot) => {
                    self.next();
                    let (attr, attr_span) = self.expect_name()?;
                    let span = join(expr.span, attr_span);
                    expr = Expr {
                        span,
                        kind: ExprKind::GetAttr {
                            base: Box::new(expr),
                            attr,
                        },
                    };
                }
                Some(TokenKind::LBracket) => {
                    self.next();
                    let index = self.parse_expr()?;
                    let rb = self.expect(TokenKind::RBracket)?;
                    let span = join(expr.span, rb.span);
                    expr = Expr {
                        span,
                        kind: ExprKind::GetItem {
                            base: Box::new(expr),
                            index: Box::new(index),
                        },
                    };
                }
                Some(TokenKind::LParen) => {
                    let (args, kwargs, rp_span) = self.parse_call_args()?;
                    let span = join(expr.span, rp_span);
                    expr = Expr {
                        span,
                        kind: ExprKind::Call {
                            callee: Box::new(expr),
                            args,
                            kwargs,
                        },
                    };
                }
                _ => break,
            }
        }
        Ok(expr)
    }

    /// Call arguments: positional and `name=value` keyword arguments.
    fn parse_call_args(&mut self) -> Result<(Vec<Expr>, Vec<(String, Expr)>, Span), ParseError> {
        self.expect(TokenKind::LParen)?;
        let mut args = Vec::new();
        let mut kwargs = Vec::new();
        if !self.at(&TokenKind::RParen) {
            loop {
                if matches!(self.peek_kind(), Some(TokenKind::Name(_)))
                    && matches!(self.peek_kind_n(1), Some(TokenKind::Assign))
                {
                    let (name, _) = self.expect_name()?;
                    self.next();
                    kwargs.push((name, self.parse_expr()?));
                } else {
                    args.push(self.parse_expr()?);
                }
                if self.at(&TokenKind::Comma) {
                    self.next();
                    if self.at(&TokenKind::RParen) {
                        break;
                    }
                    continue;
                }
                break;
            }
        }
        let rp = self.expect(TokenKind::RParen)?;
        Ok((args, kwargs, rp.span))
    }

    /// Filter arguments keep `name=value` pairs inline as `NamedArg` nodes.
    fn parse_filter_args(&mut self) -> Result<Vec<Expr>, ParseError> {
        self.expect(TokenKind::LParen)?;
        let mut args = Vec::new();
        if !self.at(&TokenKind::RParen) {
            loop {
                if matches!(self.peek_kind(), Some(TokenKind::Name(_)))
                    && matches!(self.peek_kind_n(1), Some(TokenKind::Assign))
                {
                    let (name, name_span) = self.expect_name()?;
                    self.next();
                    let value = self.parse_expr()?;
                    let span = join(name_span, value.span);
                    args.push(Expr {
                        span,
                        kind: ExprKind::NamedArg {
                            name,
                            value: Box::new(value),
                        },
                    });
                } else {
                    args.push(self.parse_expr()?);
                }
                if self.at(&TokenKind::Comma) {
                    self.next();
                    if self.at(&TokenKind::RParen) {
                        break;
                    }
                    continue;
                }
                break;
            }
        }
        self.expect(TokenKind::RParen)?;
        Ok(args)
    }

    fn parse_primary_expr(&mut self) -> Result<Expr, ParseError> {
        let Some(tok) = self.next() else {
            return Err(ParseError::MalformedExpression {
                found: "end of input".to_string(),
                span: span_between(self.src.len(), self.src.len()),
            });
        };

        match tok.kind {
            TokenKind::Name(name) => {
                let kind = match name.as_str() {
                    "true" | "True" => ExprKind::BoolLit(true),
                    "false" | "False" => ExprKind::BoolLit(false),
                    "none" | "None" => ExprKind::NoneLit,
                    _ => ExprKind::Name(name),
                };
                Ok(Expr {
                    span: tok.span,
                    kind,
                })
            }
            TokenKind::Number(lexeme) => Ok(Expr {
                span: tok.span,
                kind: ExprKind::NumLit(lexeme),
            }),
            TokenKind::Str(lexeme) => Ok(Expr {
                span: tok.span,
                kind: ExprKind::StrLit(decode_string(&lexeme)),
            }),
            TokenKind::LParen => {
                if self.at(&TokenKind::RParen) {
                    let rp = self.next().unwrap();
                    return Ok(Expr {
                        span: join(tok.span, rp.span),
                        kind: ExprKind::Tuple(Vec::new()),
                    });
                }
                let first = self.parse_expr()?;
                if self.at(&TokenKind::Comma) {
                    let mut elements = vec![first];
                    while self.at(&TokenKind::Comma) {
                        self.next();
                        if self.at(&TokenKind::RParen) {
                            break;
                        }
                        elements.push(self.parse_expr()?);
                    }
                    let rp = self.expect(TokenKind::RParen)?;
                    return Ok(Expr {
                        span: join(tok.span, rp.span),
                        kind: ExprKind::Tuple(elements),
                    });
                }
                self.expect(TokenKind::RParen)?;
                Ok(first)
            }
            TokenKind::LBracket => {
                let mut elements = Vec::new();
                if !self.at(&TokenKind::RBracket) {
                    loop {
                        elements.push(self.parse_expr()?);
                        if self.at(&TokenKind::Comma) {
                            self.next();
                            if self.at(&TokenKind::RBracket) {
                                break;
                            }
                            continue;
                        }
                        break;
                    }
                }
                let rb = self.expect(TokenKind::RBracket)?;
                Ok(Expr {
                    span: join(tok.span, rb.span),
                    kind: ExprKind::List(elements),
                })
            }
            TokenKind::LBrace => {
                let mut pairs = Vec::new();
                if !self.at(&TokenKind::RBrace) {
                    loop {
                        let key = self.parse_expr()?;
                        self.expect(TokenKind::Colon)?;
                        let value = self.parse_expr()?;
                        pairs.push((key, value));
                        if self.at(&TokenKind::Comma) {
                            self.next();
                            if self.at(&TokenKind::RBrace) {
                                break;
                            }
                            continue;
                        }
                        break;
                    }
                }
                let rb = self.expect(TokenKind::RBrace)?;
                Ok(Expr {
                    span: join(tok.span, rb.span),
                    kind: ExprKind::Dict(pairs),
                })
            }
            other => Err(ParseError::MalformedExpression {
                found: other.describe().to_string(),
                span: tok.span,
            }),
        }
    }

    // ---- Cursor helpers ----

    fn at(&self, kind: &TokenKind) -> bool {
        self.peek_kind()
            .is_some_and(|k| mem::discriminant(k) == mem::discriminant(kind))
    }

    fn at_name(&self, name: &str) -> bool {
        matches!(self.peek_kind(), Some(TokenKind::Name(n)) if n == name)
    }

    fn next(&mut self) -> Option<Token> {
        let tok = self.tokens.get(self.idx).cloned();
        if tok.is_some() {
            self.idx += 1;
        }
        tok
    }

    fn peek_kind(&self) -> Option<&TokenKind> {
        self.tokens.get(self.idx).map(|t| &t.kind)
    }

    fn peek_kind_n(&self, n: usize) -> Option<&TokenKind> {
        self.tokens.get(self.idx + n).map(|t| &t.kind)
    }

    fn found_here(&self) -> (String, Span) {
        match self.tokens.get(self.idx) {
            Some(tok) => (tok.kind.describe().to_string(), tok.span),
            None => (
                "end of input".to_string(),
                span_between(self.src.len(), self.src.len()),
            ),
        }
    }

    fn expect(&mut self, expected: TokenKind) -> Result<Token, ParseError> {
        if self.at(&expected) {
            return Ok(self.next().unwrap());
        }
        let (found, span) = self.found_here();
        Err(ParseError::UnexpectedToken {
            expected: expected.describe().to_string(),
            found,
            span,
        })
    }

    fn expect_name(&mut self) -> Result<(String, Span), ParseError> {
        match self.peek_kind() {
            Some(TokenKind::Name(_)) => {
                let tok = self.next().unwrap();
                let TokenKind::Name(name) = tok.kind else {
                    unreachable!()
                };
                Ok((name, tok.span))
            }
            _ => {
                let (found, span) = self.found_here();
                Err(ParseError::UnexpectedToken {
                    expected: "name".to_string(),
                    found,
                    span,
                })
            }
        }
    }

    fn expect_keyword(&mut self, keyword: &str) -> Result<(), ParseError> {
        if self.at_name(keyword) {
            self.next();
            return Ok(());
        }
        let (found, span) = self.found_here();
        Err(ParseError::UnexpectedToken {
            expected: format!("'{keyword}'"),
            found,
            span,
        })
    }
}

/// Strips the quotes and resolves escapes. Runs at parse time so the lexer
/// keeps the original lexeme for diagnostics.
fn decode_string(lexeme: &str) -> String {
    let inner = &lexeme[1..lexeme.len().saturating_sub(1)];
    let mut out = String::with_capacity(inner.len());
    let mut chars = inner.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('n') => out.push('\n'),
            Some('t') => out.push('\t'),
            Some(esc) => out.push(esc),
            None => out.push('\\'),
        }
    }
    out
}
