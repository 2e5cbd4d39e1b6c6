use crate::language::{
    ast::*,
    errors::{SyntaxError, SyntaxErrors},
    lexer::lex,
    span::Span,
    token::{Token, TokenKind},
};

pub fn parse_program(source: &str) -> Result<Program, SyntaxErrors> {
    let tokens = match lex(source) {
        Ok(tokens) => tokens,
        Err(errors) => {
            let errs = errors
                .into_iter()
                .map(|err| SyntaxError::new(err.message, err.span))
                .collect();
            return Err(SyntaxErrors::new(errs));
        }
    };
    Parser::new(tokens).parse()
}

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
    next_id: u32,
    last_end: usize,
    errors: Vec<SyntaxError>,
}

impl Parser {
    fn new(mut tokens: Vec<Token>) -> Self {
        if !matches!(tokens.last(), Some(token) if token.kind == TokenKind::Eof) {
            let end = tokens.last().map(|token| token.span.end).unwrap_or(0);
            tokens.push(Token {
                kind: TokenKind::Eof,
                span: Span::new(end, end),
            });
        }
        Self {
            tokens,
            pos: 0,
            next_id: 0,
            last_end: 0,
            errors: Vec::new(),
        }
    }

    fn parse(mut self) -> Result<Program, SyntaxErrors> {
        let mut classes = Vec::new();

        while !self.is_eof() {
            match self.parse_class() {
                Ok(class) => classes.push(class),
                Err(err) => {
                    self.report(err);
                    self.synchronize_class();
                }
            }
        }

        if classes.is_empty() && self.errors.is_empty() {
            let err = self
                .error_here("Expected a class declaration")
                .with_help("A program is a sequence of `class Name { ... };` declarations");
            self.report(err);
        }

        if self.errors.is_empty() {
            Ok(Program { classes })
        } else {
            Err(SyntaxErrors::new(self.errors))
        }
    }

    fn parse_class(&mut self) -> Result<Class, SyntaxError> {
        let start = self.expect(TokenKind::Class, "Expected `class`")?.span.start;
        let id = self.fresh_id();
        let (name, _) = self.expect_type_name("Expected a class name")?;
        let parent = if self.matches(TokenKind::Inherits) {
            Some(self.expect_type_name("Expected a parent class name after `inherits`")?.0)
        } else {
            None
        };
        self.expect(TokenKind::LBrace, "Expected `{` to open the class body")?;

        let mut features = Vec::new();
        while !self.check(&TokenKind::RBrace) && !self.is_eof() {
            features.push(self.parse_feature()?);
            self.expect(TokenKind::Semi, "Expected `;` after feature")
                .map_err(|err| err.with_help("Every attribute and method ends with `;`"))?;
        }
        self.expect(TokenKind::RBrace, "Expected `}` to close the class body")?;
        self.expect(TokenKind::Semi, "Expected `;` after class")
            .map_err(|err| err.with_help(format!("Try: class {name} {{ ... }};")))?;

        Ok(Class {
            id,
            name,
            parent,
            features,
            span: self.span_from(start),
        })
    }

    fn parse_feature(&mut self) -> Result<Feature, SyntaxError> {
        let (name, name_span) = self.expect_identifier("Expected an attribute or method name")?;
        let start = name_span.start;

        if self.matches(TokenKind::LParen) {
            let id = self.fresh_id();
            let mut params = Vec::new();
            if !self.check(&TokenKind::RParen) {
                loop {
                    params.push(self.parse_param()?);
                    if !self.matches(TokenKind::Comma) {
                        break;
                    }
                }
            }
            self.expect(TokenKind::RParen, "Expected `)` after parameters")?;
            self.expect(TokenKind::Colon, "Expected `:` before the return type")?;
            let (return_type, _) = self.expect_type_name("Expected a return type")?;
            self.expect(TokenKind::LBrace, "Expected `{` to open the method body")?;
            let body = self.parse_expr()?;
            self.expect(TokenKind::RBrace, "Expected `}` to close the method body")?;
            return Ok(Feature::Method(MethodDecl {
                id,
                name,
                params,
                return_type,
                body,
                span: self.span_from(start),
            }));
        }

        self.expect(TokenKind::Colon, "Expected `:` after attribute name")?;
        let (ty, _) = self.expect_type_name("Expected an attribute type")?;
        let init = if self.matches(TokenKind::Assign) {
            Some(self.parse_expr()?)
        } else {
            None
        };
        Ok(Feature::Attribute(AttrDecl {
            name,
            ty,
            init,
            span: self.span_from(start),
        }))
    }

    fn parse_param(&mut self) -> Result<Param, SyntaxError> {
        let (name, span) = self.expect_identifier("Expected a parameter name")?;
        self.expect(TokenKind::Colon, "Expected `:` after parameter name")?;
        let (ty, _) = self.expect_type_name("Expected a parameter type")?;
        Ok(Param {
            name,
            ty,
            span: self.span_from(span.start),
        })
    }

    fn parse_expr(&mut self) -> Result<Expr, SyntaxError> {
        if let (Some(TokenKind::Identifier(name)), Some(TokenKind::Assign)) =
            (self.peek_kind(), self.peek_kind_n(1))
        {
            let start = self.advance().span.start;
            self.advance();
            let value = self.parse_expr()?;
            return Ok(Expr::new(
                ExprKind::Assign {
                    name,
                    value: Box::new(value),
                },
                self.span_from(start),
            ));
        }
        self.parse_not()
    }

    fn parse_not(&mut self) -> Result<Expr, SyntaxError> {
        if self.check(&TokenKind::Not) {
            let start = self.advance().span.start;
            let expr = self.parse_not()?;
            return Ok(self.unary(UnaryOp::Not, expr, start));
        }
        self.parse_comparison()
    }

    fn parse_comparison(&mut self) -> Result<Expr, SyntaxError> {
        let left = self.parse_arith()?;
        let op = match self.peek_kind() {
            Some(TokenKind::LtEq) => BinaryOp::LtEq,
            Some(TokenKind::Lt) => BinaryOp::Lt,
            Some(TokenKind::Eq) => BinaryOp::Eq,
            _ => return Ok(left),
        };
        self.advance();
        let right = self.parse_arith()?;
        Ok(self.binary(op, left, right))
    }

    fn parse_arith(&mut self) -> Result<Expr, SyntaxError> {
        let mut expr = self.parse_term()?;
        loop {
            let op = match self.peek_kind() {
                Some(TokenKind::Plus) => BinaryOp::Add,
                Some(TokenKind::Minus) => BinaryOp::Sub,
                _ => break,
            };
            self.advance();
            let right = self.parse_term()?;
            expr = self.binary(op, expr, right);
        }
        Ok(expr)
    }

    fn parse_term(&mut self) -> Result<Expr, SyntaxError> {
        let mut expr = self.parse_factor()?;
        loop {
            let op = match self.peek_kind() {
                Some(TokenKind::Star) => BinaryOp::Mul,
                Some(TokenKind::Slash) => BinaryOp::Div,
                _ => break,
            };
            self.advance();
            let right = self.parse_factor()?;
            expr = self.binary(op, expr, right);
        }
        Ok(expr)
    }

    fn parse_factor(&mut self) -> Result<Expr, SyntaxError> {
        if self.check(&TokenKind::IsVoid) {
            let start = self.advance().span.start;
            let expr = self.parse_factor()?;
            return Ok(self.unary(UnaryOp::IsVoid, expr, start));
        }
        self.parse_tilde()
    }

    fn parse_tilde(&mut self) -> Result<Expr, SyntaxError> {
        if self.check(&TokenKind::Tilde) {
            let start = self.advance().span.start;
            let expr = self.parse_tilde()?;
            return Ok(self.unary(UnaryOp::Negate, expr, start));
        }
        self.parse_postfix()
    }

    fn parse_postfix(&mut self) -> Result<Expr, SyntaxError> {
        let mut expr = self.parse_atom()?;
        loop {
            let start = expr.span.start;
            if self.matches(TokenKind::Dot) {
                let (method, _) = self.expect_identifier("Expected a method name after `.`")?;
                let args = self.parse_args()?;
                expr = Expr::new(
                    ExprKind::Dispatch {
                        receiver: Some(Box::new(expr)),
                        method,
                        args,
                    },
                    self.span_from(start),
                );
            } else if self.matches(TokenKind::At) {
                let (ancestor, _) = self.expect_type_name("Expected a type name after `@`")?;
                self.expect(TokenKind::Dot, "Expected `.` after static dispatch type")?;
                let (method, _) = self.expect_identifier("Expected a method name after `.`")?;
                let args = self.parse_args()?;
                expr = Expr::new(
                    ExprKind::StaticDispatch {
                        receiver: Box::new(expr),
                        ancestor,
                        method,
                        args,
                    },
                    self.span_from(start),
                );
            } else {
                return Ok(expr);
            }
        }
    }

    fn parse_atom(&mut self) -> Result<Expr, SyntaxError> {
        let token = self.peek().clone();
        let start = token.span.start;
        match token.kind {
            TokenKind::If => {
                self.advance();
                let cond = self.parse_expr()?;
                self.expect(TokenKind::Then, "Expected `then` after the condition")?;
                let then_branch = self.parse_expr()?;
                self.expect(TokenKind::Else, "Expected `else` branch")?;
                let else_branch = self.parse_expr()?;
                self.expect(TokenKind::Fi, "Expected `fi` to close `if`")?;
                Ok(Expr::new(
                    ExprKind::If {
                        cond: Box::new(cond),
                        then_branch: Box::new(then_branch),
                        else_branch: Box::new(else_branch),
                    },
                    self.span_from(start),
                ))
            }
            TokenKind::While => {
                self.advance();
                let cond = self.parse_expr()?;
                self.expect(TokenKind::Loop, "Expected `loop` after the condition")?;
                let body = self.parse_expr()?;
                self.expect(TokenKind::Pool, "Expected `pool` to close `while`")?;
                Ok(Expr::new(
                    ExprKind::While {
                        cond: Box::new(cond),
                        body: Box::new(body),
                    },
                    self.span_from(start),
                ))
            }
            TokenKind::Let => {
                self.advance();
                self.parse_let(start)
            }
            TokenKind::Case => {
                self.advance();
                self.parse_case(start)
            }
            TokenKind::New => {
                self.advance();
                let (ty, _) = self.expect_type_name("Expected a type name after `new`")?;
                Ok(Expr::new(ExprKind::New(ty), self.span_from(start)))
            }
            TokenKind::LParen => {
                self.advance();
                let inner = self.parse_expr()?;
                self.expect(TokenKind::RParen, "Expected `)` after expression")?;
                Ok(Expr::new(
                    ExprKind::Paren(Box::new(inner)),
                    self.span_from(start),
                ))
            }
            TokenKind::LBrace => {
                self.advance();
                let mut exprs = Vec::new();
                loop {
                    exprs.push(self.parse_expr()?);
                    self.expect(TokenKind::Semi, "Expected `;` after block expression")?;
                    if self.matches(TokenKind::RBrace) {
                        break;
                    }
                }
                Ok(Expr::new(ExprKind::Block(exprs), self.span_from(start)))
            }
            TokenKind::Identifier(name) => {
                self.advance();
                if self.check(&TokenKind::LParen) {
                    let args = self.parse_args()?;
                    return Ok(Expr::new(
                        ExprKind::Dispatch {
                            receiver: None,
                            method: name,
                            args,
                        },
                        self.span_from(start),
                    ));
                }
                Ok(Expr::new(ExprKind::Identifier(name), token.span))
            }
            TokenKind::Integer(value) => {
                self.advance();
                Ok(Expr::new(ExprKind::Integer(value), token.span))
            }
            TokenKind::String(value) => {
                self.advance();
                Ok(Expr::new(ExprKind::String(value), token.span))
            }
            TokenKind::True | TokenKind::False => {
                self.advance();
                Ok(Expr::new(
                    ExprKind::Bool(token.kind == TokenKind::True),
                    token.span,
                ))
            }
            _ => Err(self.error_here("Expected an expression")),
        }
    }

    fn parse_let(&mut self, start: usize) -> Result<Expr, SyntaxError> {
        let mut bindings = Vec::new();
        loop {
            let (name, span) = self.expect_identifier("Expected a name in `let` binding")?;
            self.expect(TokenKind::Colon, "Expected `:` after `let` binding name")?;
            let (ty, _) = self.expect_type_name("Expected a type in `let` binding")?;
            let init = if self.matches(TokenKind::Assign) {
                Some(self.parse_expr()?)
            } else {
                None
            };
            bindings.push(LetBinding {
                id: self.fresh_id(),
                name,
                ty,
                init,
                span: self.span_from(span.start),
            });
            if !self.matches(TokenKind::Comma) {
                break;
            }
        }
        self.expect(TokenKind::In, "Expected `in` after `let` bindings")?;
        let body = self.parse_expr()?;
        Ok(Expr::new(
            ExprKind::Let {
                bindings,
                body: Box::new(body),
            },
            self.span_from(start),
        ))
    }

    fn parse_case(&mut self, start: usize) -> Result<Expr, SyntaxError> {
        let scrutinee = self.parse_expr()?;
        self.expect(TokenKind::Of, "Expected `of` after `case` expression")?;
        let mut arms = Vec::new();
        loop {
            let (name, span) = self.expect_identifier("Expected a name in `case` arm")?;
            self.expect(TokenKind::Colon, "Expected `:` after `case` arm name")?;
            let (ty, _) = self.expect_type_name("Expected a type in `case` arm")?;
            self.expect(TokenKind::DArrow, "Expected `=>` in `case` arm")?;
            let body = self.parse_expr()?;
            self.expect(TokenKind::Semi, "Expected `;` after `case` arm")?;
            arms.push(CaseArm {
                id: self.fresh_id(),
                name,
                ty,
                body,
                span: self.span_from(span.start),
            });
            if self.matches(TokenKind::Esac) {
                break;
            }
        }
        Ok(Expr::new(
            ExprKind::Case {
                scrutinee: Box::new(scrutinee),
                arms,
            },
            self.span_from(start),
        ))
    }

    fn parse_args(&mut self) -> Result<Vec<Expr>, SyntaxError> {
        self.expect(TokenKind::LParen, "Expected `(` before arguments")?;
        let mut args = Vec::new();
        if !self.check(&TokenKind::RParen) {
            loop {
                args.push(self.parse_expr()?);
                if !self.matches(TokenKind::Comma) {
                    break;
                }
            }
        }
        self.expect(TokenKind::RParen, "Expected `)` after arguments")?;
        Ok(args)
    }

    fn binary(&self, op: BinaryOp, left: Expr, right: Expr) -> Expr {
        let span = left.span.join(right.span);
        Expr::new(
            ExprKind::Binary {
                op,
                left: Box::new(left),
                right: Box::new(right),
            },
            span,
        )
    }

    fn unary(&self, op: UnaryOp, expr: Expr, start: usize) -> Expr {
        let span = Span::new(start, expr.span.end);
        Expr::new(
            ExprKind::Unary {
                op,
                expr: Box::new(expr),
            },
            span,
        )
    }

    fn fresh_id(&mut self) -> NodeId {
        let id = NodeId(self.next_id);
        self.next_id += 1;
        id
    }

    fn expect_identifier(&mut self, msg: &str) -> Result<(String, Span), SyntaxError> {
        match self.peek_kind() {
            Some(TokenKind::Identifier(name)) => {
                let span = self.advance().span;
                Ok((name, span))
            }
            _ => Err(self.error_here(msg)),
        }
    }

    fn expect_type_name(&mut self, msg: &str) -> Result<(String, Span), SyntaxError> {
        match self.peek_kind() {
            Some(TokenKind::TypeName(name)) => {
                let span = self.advance().span;
                Ok((name, span))
            }
            Some(TokenKind::Identifier(name)) => Err(self
                .error_here(msg)
                .with_help(format!("Type names start with an uppercase letter, not `{name}`"))),
            _ => Err(self.error_here(msg)),
        }
    }

    fn expect(&mut self, kind: TokenKind, msg: &str) -> Result<Token, SyntaxError> {
        if self.check(&kind) {
            Ok(self.advance())
        } else {
            Err(self.error_here(msg))
        }
    }

    fn matches(&mut self, kind: TokenKind) -> bool {
        if self.check(&kind) {
            self.advance();
            true
        } else {
            false
        }
    }

    fn check(&self, kind: &TokenKind) -> bool {
        matches!(self.peek_kind(), Some(tk) if &tk == kind)
    }

    fn peek(&self) -> &Token {
        let idx = self.pos.min(self.tokens.len() - 1);
        &self.tokens[idx]
    }

    fn peek_kind(&self) -> Option<TokenKind> {
        self.tokens.get(self.pos).map(|t| t.kind.clone())
    }

    fn peek_kind_n(&self, n: usize) -> Option<TokenKind> {
        self.tokens.get(self.pos + n).map(|t| t.kind.clone())
    }

    fn advance(&mut self) -> Token {
        let token = self.peek().clone();
        self.pos = (self.pos + 1).min(self.tokens.len());
        self.last_end = token.span.end;
        token
    }

    fn is_eof(&self) -> bool {
        matches!(self.peek_kind(), Some(TokenKind::Eof) | None)
    }

    fn span_from(&self, start: usize) -> Span {
        Span::new(start, self.last_end.max(start))
    }

    fn error_here(&self, message: &str) -> SyntaxError {
        let token = self.peek();
        SyntaxError::new(format!("{message}, found {}", token.kind), token.span)
            .with_label(message.to_string())
    }

    fn report(&mut self, err: SyntaxError) {
        self.errors.push(err);
    }

    fn synchronize_class(&mut self) {
        if !self.is_eof() {
            self.advance();
        }
        while !self.is_eof() {
            if self.check(&TokenKind::Class) {
                return;
            }
            self.advance();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use indoc::indoc;

    fn parse(source: &str) -> Program {
        parse_program(source).expect("parse")
    }

    fn method_body(program: &Program, class: usize, method: &str) -> Expr {
        program.classes[class]
            .methods()
            .find(|m| m.name == method)
            .map(|m| m.body.clone())
            .expect("method")
    }

    #[test]
    fn parses_classes_and_features() {
        let program = parse(indoc! {"
            class A inherits IO {
                d : Int <- 0;
                a : AUTO_TYPE;
                init(e : String, f : AUTO_TYPE) : Bool { true };
            };
        "});
        let class = &program.classes[0];
        assert_eq!(class.name, "A");
        assert_eq!(class.parent.as_deref(), Some("IO"));
        assert_eq!(class.attributes().count(), 2);
        let method = class.methods().next().expect("method");
        assert_eq!(method.params.len(), 2);
        assert_eq!(method.params[1].ty, AUTO_TYPE);
        assert_eq!(method.return_type, "Bool");
    }

    #[test]
    fn arithmetic_binds_tighter_than_comparison() {
        let program = parse("class A { f() : Bool { 1 + 2 * 3 <= 7 }; };");
        let body = method_body(&program, 0, "f");
        let ExprKind::Binary { op, left, .. } = body.kind else {
            panic!("expected comparison");
        };
        assert_eq!(op, BinaryOp::LtEq);
        let ExprKind::Binary { op, right, .. } = left.kind else {
            panic!("expected addition");
        };
        assert_eq!(op, BinaryOp::Add);
        assert!(matches!(right.kind, ExprKind::Binary { op: BinaryOp::Mul, .. }));
    }

    #[test]
    fn assignment_is_right_associative() {
        let program = parse("class A { a : Int; b : Int; f() : Int { a <- b <- 3 }; };");
        let body = method_body(&program, 0, "f");
        let ExprKind::Assign { name, value } = body.kind else {
            panic!("expected assignment");
        };
        assert_eq!(name, "a");
        assert!(matches!(value.kind, ExprKind::Assign { ref name, .. } if name == "b"));
    }

    #[test]
    fn dispatch_chains_and_implicit_self() {
        let program = parse("class A { f() : Object { (new B)@A.copy().g(init(1), 2) }; };");
        let body = method_body(&program, 0, "f");
        let ExprKind::Dispatch {
            receiver,
            method,
            args,
        } = body.kind
        else {
            panic!("expected dispatch");
        };
        assert_eq!(method, "g");
        assert_eq!(args.len(), 2);
        assert!(matches!(
            args[0].kind,
            ExprKind::Dispatch { receiver: None, .. }
        ));
        let receiver = receiver.expect("explicit receiver");
        assert!(matches!(
            receiver.kind,
            ExprKind::StaticDispatch { ref ancestor, .. } if ancestor == "A"
        ));
    }

    #[test]
    fn scope_nodes_get_distinct_ids() {
        let program = parse(indoc! {"
            class A {
                f(x : Int) : Object {
                    let y : Int <- x, z : AUTO_TYPE in
                        case y of
                            i : Int => i;
                            o : Object => o;
                        esac
                };
            };
        "});
        let mut ids = vec![program.classes[0].id];
        let method = program.classes[0].methods().next().expect("method");
        ids.push(method.id);
        method.body.walk(&mut |expr| match &expr.kind {
            ExprKind::Let { bindings, .. } => ids.extend(bindings.iter().map(|b| b.id)),
            ExprKind::Case { arms, .. } => ids.extend(arms.iter().map(|a| a.id)),
            _ => {}
        });
        let mut unique = ids.clone();
        unique.sort();
        unique.dedup();
        assert_eq!(ids.len(), 6);
        assert_eq!(unique.len(), ids.len());
    }

    #[test]
    fn reports_missing_semicolon_with_help() {
        let errors = parse_program("class A { a : Int } ;").expect_err("should fail");
        assert_eq!(errors.errors.len(), 1);
        assert!(errors.errors[0].message.contains("Expected `;` after feature"));
        assert!(errors.errors[0].help.is_some());
    }

    #[test]
    fn recovers_at_next_class() {
        let errors = parse_program(indoc! {"
            class A { f() : Int { + }; };
            class B { g() : Int { ) }; };
        "})
        .expect_err("should fail");
        assert_eq!(errors.errors.len(), 2);
    }

    #[test]
    fn empty_source_is_rejected() {
        assert!(parse_program("  -- nothing here\n").is_err());
    }
}
