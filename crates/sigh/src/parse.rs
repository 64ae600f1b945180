use crate::{
    ast::{Ast, BinaryOp, CodeRange, NodeId, NodeKind, UnaryOp},
    errors::ParseError,
    lexer::{lex, Spanned, Token},
};

/// Parses a whole Sigh program into an AST arena.
pub fn parse(source: &str) -> Result<Ast, ParseError> {
    let tokens = lex(source)?;
    let mut parser = Parser {
        tokens,
        pos: 0,
        ast: Ast::new(vec![], NodeId::new(0)),
    };
    let root = parser.program()?;
    parser.ast.root = root;
    Ok(parser.ast)
}

/// Recursive-descent parser over the token stream.
///
/// Newlines and semicolons are soft separators: they are skipped wherever a
/// statement or a nested expression may start, but binary operators and
/// postfix forms only continue an expression when they appear on the same
/// line, so `a()` followed by `-x` on the next line stays two statements.
struct Parser {
    tokens: Vec<Spanned>,
    pos: usize,
    ast: Ast,
}

impl Parser {
    fn skip_separators(&mut self) {
        while matches!(
            self.tokens.get(self.pos).map(|s| &s.token),
            Some(Token::Newline | Token::Semicolon)
        ) {
            self.pos += 1;
        }
    }

    /// Next token, skipping separators.
    fn peek(&mut self) -> Option<&Token> {
        self.skip_separators();
        self.tokens.get(self.pos).map(|s| &s.token)
    }

    /// Next token without skipping separators.
    fn peek_raw(&self) -> Option<&Token> {
        self.tokens.get(self.pos).map(|s| &s.token)
    }

    fn bump(&mut self) -> Option<Spanned> {
        self.skip_separators();
        let spanned = self.tokens.get(self.pos).cloned();
        if spanned.is_some() {
            self.pos += 1;
        }
        spanned
    }

    fn bump_raw(&mut self) -> Option<Spanned> {
        let spanned = self.tokens.get(self.pos).cloned();
        if spanned.is_some() {
            self.pos += 1;
        }
        spanned
    }

    /// Range of the upcoming token, or of the end of input.
    fn here(&mut self) -> CodeRange {
        self.skip_separators();
        self.tokens
            .get(self.pos)
            .or_else(|| self.tokens.last())
            .map(|s| s.range)
            .unwrap_or_default()
    }

    fn unexpected(&mut self, expected: &str) -> ParseError {
        let range = self.here();
        let found = self
            .peek()
            .map_or_else(|| "end of input".to_owned(), Token::describe);
        ParseError::new(format!("expected {expected}, found {found}"), range)
    }

    fn expect(&mut self, token: &Token, expected: &str) -> Result<CodeRange, ParseError> {
        let matched = matches!(self.peek(), Some(tok) if tok == token);
        if matched {
            Ok(self.bump().expect("peeked token").range)
        } else {
            Err(self.unexpected(expected))
        }
    }

    fn ident(&mut self, expected: &str) -> Result<(String, CodeRange), ParseError> {
        match self.peek() {
            Some(Token::Ident(_)) => {
                let spanned = self.bump().expect("peeked token");
                match spanned.token {
                    Token::Ident(name) => Ok((name, spanned.range)),
                    _ => unreachable!(),
                }
            }
            _ => Err(self.unexpected(expected)),
        }
    }

    // --- statements ---

    fn program(&mut self) -> Result<NodeId, ParseError> {
        let start = self.here();
        let mut statements = Vec::new();
        while self.peek().is_some() {
            statements.push(self.statement()?);
        }
        let end = self.tokens.last().map(|s| s.range).unwrap_or(start);
        Ok(self.ast.push(start.to(end), NodeKind::Root { statements }))
    }

    fn statement(&mut self) -> Result<NodeId, ParseError> {
        match self.peek() {
            Some(Token::Var) => self.var_decl(),
            Some(Token::Fun) => self.fun_decl(),
            Some(Token::Struct) => self.struct_decl(),
            Some(Token::Class) => self.class_decl(),
            Some(Token::If) => self.if_stmt(),
            Some(Token::While) => self.while_stmt(),
            Some(Token::Return) => self.return_stmt(),
            Some(Token::Born) => self.born_stmt(),
            Some(Token::LBrace) => self.block(),
            Some(_) => {
                let expr = self.expression()?;
                let range = self.ast.range(expr);
                Ok(self.ast.push(range, NodeKind::ExprStmt { expr }))
            }
            None => Err(self.unexpected("a statement")),
        }
    }

    fn block(&mut self) -> Result<NodeId, ParseError> {
        let start = self.expect(&Token::LBrace, "`{`")?;
        let mut statements = Vec::new();
        loop {
            match self.peek() {
                Some(Token::RBrace) => break,
                Some(_) => statements.push(self.statement()?),
                None => return Err(self.unexpected("`}`")),
            }
        }
        let end = self.expect(&Token::RBrace, "`}`")?;
        Ok(self.ast.push(start.to(end), NodeKind::Block { statements }))
    }

    fn var_decl(&mut self) -> Result<NodeId, ParseError> {
        let start = self.expect(&Token::Var, "`var`")?;
        let (name, _) = self.ident("a variable name")?;
        self.expect(&Token::Colon, "`:`")?;
        let declared_type = self.type_expr()?;
        self.expect(&Token::Eq, "`=`")?;
        let initializer = self.expression()?;
        let range = start.to(self.ast.range(initializer));
        Ok(self.ast.push(
            range,
            NodeKind::VarDecl {
                name,
                declared_type,
                initializer,
            },
        ))
    }

    fn fun_decl(&mut self) -> Result<NodeId, ParseError> {
        let start = self.expect(&Token::Fun, "`fun`")?;
        let (name, name_range) = self.ident("a function name")?;
        self.expect(&Token::LParen, "`(`")?;
        let mut params = Vec::new();
        if !matches!(self.peek(), Some(Token::RParen)) {
            loop {
                let (param_name, param_range) = self.ident("a parameter name")?;
                self.expect(&Token::Colon, "`:`")?;
                let declared_type = self.type_expr()?;
                let range = param_range.to(self.ast.range(declared_type));
                params.push(self.ast.push(
                    range,
                    NodeKind::Param {
                        name: param_name,
                        declared_type,
                    },
                ));
                if matches!(self.peek(), Some(Token::Comma)) {
                    self.bump();
                } else {
                    break;
                }
            }
        }
        self.expect(&Token::RParen, "`)`")?;
        let return_type = if matches!(self.peek(), Some(Token::Colon)) {
            self.bump();
            self.type_expr()?
        } else {
            // omitted return type means Void
            self.ast.push(
                name_range,
                NodeKind::SimpleType {
                    name: "Void".to_owned(),
                },
            )
        };
        let body = self.block()?;
        let range = start.to(self.ast.range(body));
        Ok(self.ast.push(
            range,
            NodeKind::FunDecl {
                name,
                params,
                return_type,
                body,
            },
        ))
    }

    fn struct_decl(&mut self) -> Result<NodeId, ParseError> {
        let start = self.expect(&Token::Struct, "`struct`")?;
        let (name, _) = self.ident("a struct name")?;
        self.expect(&Token::LBrace, "`{`")?;
        let mut fields = Vec::new();
        while !matches!(self.peek(), Some(Token::RBrace) | None) {
            let field_start = self.expect(&Token::Var, "`var` or `}`")?;
            let (field_name, _) = self.ident("a field name")?;
            self.expect(&Token::Colon, "`:`")?;
            let declared_type = self.type_expr()?;
            let range = field_start.to(self.ast.range(declared_type));
            fields.push(self.ast.push(
                range,
                NodeKind::FieldDecl {
                    name: field_name,
                    declared_type,
                },
            ));
        }
        let end = self.expect(&Token::RBrace, "`}`")?;
        Ok(self.ast.push(start.to(end), NodeKind::StructDecl { name, fields }))
    }

    fn class_decl(&mut self) -> Result<NodeId, ParseError> {
        let start = self.expect(&Token::Class, "`class`")?;
        let (name, _) = self.ident("a class name")?;
        let parent = if matches!(self.peek(), Some(Token::SonOf)) {
            self.bump();
            Some(self.ident("a parent class name")?.0)
        } else {
            None
        };
        self.expect(&Token::LBrace, "`{`")?;
        let mut members = Vec::new();
        loop {
            match self.peek() {
                Some(Token::RBrace) => break,
                Some(Token::Var) => members.push(self.var_decl()?),
                Some(Token::Fun) => members.push(self.fun_decl()?),
                _ => return Err(self.unexpected("`var`, `fun` or `}` in class body")),
            }
        }
        let end = self.expect(&Token::RBrace, "`}`")?;
        Ok(self
            .ast
            .push(start.to(end), NodeKind::ClassDecl { name, parent, members }))
    }

    fn if_stmt(&mut self) -> Result<NodeId, ParseError> {
        let start = self.expect(&Token::If, "`if`")?;
        let condition = self.expression()?;
        let then_branch = self.statement()?;
        let mut range = start.to(self.ast.range(then_branch));
        let else_branch = if matches!(self.peek(), Some(Token::Else)) {
            self.bump();
            let branch = self.statement()?;
            range = start.to(self.ast.range(branch));
            Some(branch)
        } else {
            None
        };
        Ok(self.ast.push(
            range,
            NodeKind::If {
                condition,
                then_branch,
                else_branch,
            },
        ))
    }

    fn while_stmt(&mut self) -> Result<NodeId, ParseError> {
        let start = self.expect(&Token::While, "`while`")?;
        let condition = self.expression()?;
        let body = self.statement()?;
        let range = start.to(self.ast.range(body));
        Ok(self.ast.push(range, NodeKind::While { condition, body }))
    }

    fn return_stmt(&mut self) -> Result<NodeId, ParseError> {
        let range = self.expect(&Token::Return, "`return`")?;
        // a value must start on the same line; a newline or `}` means a bare return
        let value = match self.peek_raw() {
            None | Some(Token::Newline | Token::Semicolon | Token::RBrace) => None,
            Some(_) => Some(self.expression()?),
        };
        let range = value.map_or(range, |v| range.to(self.ast.range(v)));
        Ok(self.ast.push(range, NodeKind::Return { value }))
    }

    fn born_stmt(&mut self) -> Result<NodeId, ParseError> {
        let start = self.expect(&Token::Born, "`born`")?;
        self.expect(&Token::LParen, "`(`")?;
        let fun_ref = self.reference()?;
        let var_ref = if matches!(self.peek(), Some(Token::Comma)) {
            self.bump();
            Some(self.reference()?)
        } else {
            None
        };
        let end = self.expect(&Token::RParen, "`)`")?;
        Ok(self.ast.push(start.to(end), NodeKind::Born { fun_ref, var_ref }))
    }

    fn reference(&mut self) -> Result<NodeId, ParseError> {
        let (name, range) = self.ident("a variable or function name")?;
        Ok(self.ast.push(range, NodeKind::Reference { name }))
    }

    // --- types ---

    fn type_expr(&mut self) -> Result<NodeId, ParseError> {
        let mut ty = match self.peek() {
            Some(Token::Unborn) => {
                let start = self.bump().expect("peeked token").range;
                self.expect(&Token::Lt, "`<`")?;
                let inner = self.type_expr()?;
                let end = self.expect(&Token::Gt, "`>`")?;
                self.ast.push(start.to(end), NodeKind::UnbornType { inner })
            }
            Some(Token::Ident(_)) => {
                let (name, range) = self.ident("a type name")?;
                self.ast.push(range, NodeKind::SimpleType { name })
            }
            _ => return Err(self.unexpected("a type")),
        };
        while matches!(self.peek_raw(), Some(Token::LBracket)) {
            self.bump_raw();
            let end = self.expect(&Token::RBracket, "`]`")?;
            let range = self.ast.range(ty).to(end);
            ty = self.ast.push(range, NodeKind::ArrayType { element: ty });
        }
        Ok(ty)
    }

    // --- expressions, lowest precedence first ---

    fn expression(&mut self) -> Result<NodeId, ParseError> {
        let lhs = self.or_expr()?;
        if matches!(self.peek_raw(), Some(Token::Eq)) {
            self.bump_raw();
            let rhs = self.expression()?;
            let range = self.ast.range(lhs).to(self.ast.range(rhs));
            return Ok(self.ast.push(range, NodeKind::Assignment { lhs, rhs }));
        }
        Ok(lhs)
    }

    fn or_expr(&mut self) -> Result<NodeId, ParseError> {
        let mut left = self.and_expr()?;
        while matches!(self.peek_raw(), Some(Token::OrOr)) {
            self.bump_raw();
            let right = self.and_expr()?;
            left = self.binary(BinaryOp::Or, left, right);
        }
        Ok(left)
    }

    fn and_expr(&mut self) -> Result<NodeId, ParseError> {
        let mut left = self.equality_expr()?;
        while matches!(self.peek_raw(), Some(Token::AndAnd)) {
            self.bump_raw();
            let right = self.equality_expr()?;
            left = self.binary(BinaryOp::And, left, right);
        }
        Ok(left)
    }

    fn equality_expr(&mut self) -> Result<NodeId, ParseError> {
        let mut left = self.comparison_expr()?;
        loop {
            let op = match self.peek_raw() {
                Some(Token::EqEq) => BinaryOp::Eq,
                Some(Token::BangEq) => BinaryOp::NotEq,
                _ => break,
            };
            self.bump_raw();
            let right = self.comparison_expr()?;
            left = self.binary(op, left, right);
        }
        Ok(left)
    }

    fn comparison_expr(&mut self) -> Result<NodeId, ParseError> {
        let mut left = self.additive_expr()?;
        loop {
            let op = match self.peek_raw() {
                Some(Token::Lt) => BinaryOp::Lt,
                Some(Token::LtEq) => BinaryOp::LtEq,
                Some(Token::Gt) => BinaryOp::Gt,
                Some(Token::GtEq) => BinaryOp::GtEq,
                Some(Token::CiblingsOf) => BinaryOp::Ciblings,
                _ => break,
            };
            self.bump_raw();
            let right = self.additive_expr()?;
            left = self.binary(op, left, right);
        }
        Ok(left)
    }

    fn additive_expr(&mut self) -> Result<NodeId, ParseError> {
        let mut left = self.multiplicative_expr()?;
        loop {
            let op = match self.peek_raw() {
                Some(Token::Plus) => BinaryOp::Add,
                Some(Token::Minus) => BinaryOp::Sub,
                _ => break,
            };
            self.bump_raw();
            let right = self.multiplicative_expr()?;
            left = self.binary(op, left, right);
        }
        Ok(left)
    }

    fn multiplicative_expr(&mut self) -> Result<NodeId, ParseError> {
        let mut left = self.unary_expr()?;
        loop {
            let op = match self.peek_raw() {
                Some(Token::Star) => BinaryOp::Mul,
                Some(Token::Slash) => BinaryOp::Div,
                Some(Token::Percent) => BinaryOp::Rem,
                _ => break,
            };
            self.bump_raw();
            let right = self.unary_expr()?;
            left = self.binary(op, left, right);
        }
        Ok(left)
    }

    fn binary(&mut self, op: BinaryOp, left: NodeId, right: NodeId) -> NodeId {
        let range = self.ast.range(left).to(self.ast.range(right));
        self.ast.push(range, NodeKind::Binary { op, left, right })
    }

    fn unary_expr(&mut self) -> Result<NodeId, ParseError> {
        let op = match self.peek() {
            Some(Token::Bang) => Some(UnaryOp::Not),
            Some(Token::Minus) => Some(UnaryOp::Neg),
            _ => None,
        };
        if let Some(op) = op {
            let start = self.bump().expect("peeked token").range;
            let operand = self.unary_expr()?;
            let range = start.to(self.ast.range(operand));
            return Ok(self.ast.push(range, NodeKind::Unary { op, operand }));
        }
        self.postfix_expr()
    }

    fn postfix_expr(&mut self) -> Result<NodeId, ParseError> {
        let mut expr = self.primary_expr()?;
        loop {
            match self.peek_raw() {
                Some(Token::LParen) => {
                    self.bump_raw();
                    let mut args = Vec::new();
                    if !matches!(self.peek(), Some(Token::RParen)) {
                        loop {
                            args.push(self.expression()?);
                            if matches!(self.peek(), Some(Token::Comma)) {
                                self.bump();
                            } else {
                                break;
                            }
                        }
                    }
                    let end = self.expect(&Token::RParen, "`)`")?;
                    let range = self.ast.range(expr).to(end);
                    // `Daddy(...)` is a parent-method call, not a reference call
                    let is_daddy = matches!(
                        self.ast.kind(expr),
                        NodeKind::Reference { name } if name == "Daddy"
                    );
                    expr = if is_daddy {
                        self.ast.push(range, NodeKind::DaddyCall { args })
                    } else {
                        self.ast.push(range, NodeKind::FunCall { callee: expr, args })
                    };
                }
                Some(Token::LBracket) => {
                    self.bump_raw();
                    let index = self.expression()?;
                    let end = self.expect(&Token::RBracket, "`]`")?;
                    let range = self.ast.range(expr).to(end);
                    expr = self.ast.push(range, NodeKind::ArrayAccess { array: expr, index });
                }
                Some(Token::Dot) => {
                    self.bump_raw();
                    let (field, field_range) = self.ident("a field name")?;
                    let range = self.ast.range(expr).to(field_range);
                    expr = self.ast.push(range, NodeKind::FieldAccess { stem: expr, field });
                }
                _ => break,
            }
        }
        Ok(expr)
    }

    fn primary_expr(&mut self) -> Result<NodeId, ParseError> {
        match self.peek() {
            Some(Token::IntLiteral(_)) => {
                let spanned = self.bump().expect("peeked token");
                match spanned.token {
                    Token::IntLiteral(value) => Ok(self.ast.push(spanned.range, NodeKind::IntLiteral(value))),
                    _ => unreachable!(),
                }
            }
            Some(Token::FloatLiteral(_)) => {
                let spanned = self.bump().expect("peeked token");
                match spanned.token {
                    Token::FloatLiteral(value) => Ok(self.ast.push(spanned.range, NodeKind::FloatLiteral(value))),
                    _ => unreachable!(),
                }
            }
            Some(Token::StringLiteral(_)) => {
                let spanned = self.bump().expect("peeked token");
                match spanned.token {
                    Token::StringLiteral(value) => Ok(self.ast.push(spanned.range, NodeKind::StringLiteral(value))),
                    _ => unreachable!(),
                }
            }
            Some(Token::LParen) => {
                self.bump();
                let expr = self.expression()?;
                self.expect(&Token::RParen, "`)`")?;
                Ok(expr)
            }
            Some(Token::LBracket) => {
                let start = self.bump().expect("peeked token").range;
                let mut elements = Vec::new();
                if !matches!(self.peek(), Some(Token::RBracket)) {
                    loop {
                        elements.push(self.expression()?);
                        if matches!(self.peek(), Some(Token::Comma)) {
                            self.bump();
                        } else {
                            break;
                        }
                    }
                }
                let end = self.expect(&Token::RBracket, "`]`")?;
                Ok(self.ast.push(start.to(end), NodeKind::ArrayLiteral { elements }))
            }
            Some(Token::Dollar) => {
                let start = self.bump().expect("peeked token").range;
                let reference = self.reference()?;
                let range = start.to(self.ast.range(reference));
                Ok(self.ast.push(range, NodeKind::Constructor { reference }))
            }
            Some(Token::Ident(_)) => self.reference(),
            _ => Err(self.unexpected("an expression")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse_ok(source: &str) -> Ast {
        parse(source).unwrap()
    }

    fn root_statements(ast: &Ast) -> Vec<NodeId> {
        match ast.kind(ast.root) {
            NodeKind::Root { statements } => statements.clone(),
            other => panic!("root is {other:?}"),
        }
    }

    #[test]
    fn parses_var_declaration() {
        let ast = parse_ok("var x: Int = 1 + 2");
        let stmts = root_statements(&ast);
        assert_eq!(stmts.len(), 1);
        let NodeKind::VarDecl { name, initializer, .. } = ast.kind(stmts[0]) else {
            panic!("expected var decl");
        };
        assert_eq!(name, "x");
        assert!(matches!(ast.kind(*initializer), NodeKind::Binary { op: BinaryOp::Add, .. }));
    }

    #[test]
    fn parses_array_and_unborn_types() {
        let ast = parse_ok("var xs: Int[][] = []\nvar u: Unborn<Float> = f()");
        let stmts = root_statements(&ast);
        let NodeKind::VarDecl { declared_type, .. } = ast.kind(stmts[0]) else {
            panic!();
        };
        let NodeKind::ArrayType { element } = ast.kind(*declared_type) else {
            panic!("expected outer array type");
        };
        assert!(matches!(ast.kind(*element), NodeKind::ArrayType { .. }));
        let NodeKind::VarDecl { declared_type, .. } = ast.kind(stmts[1]) else {
            panic!();
        };
        assert!(matches!(ast.kind(*declared_type), NodeKind::UnbornType { .. }));
    }

    #[test]
    fn fun_without_return_type_defaults_to_void() {
        let ast = parse_ok("fun f() {}");
        let stmts = root_statements(&ast);
        let NodeKind::FunDecl { return_type, .. } = ast.kind(stmts[0]) else {
            panic!();
        };
        assert!(matches!(
            ast.kind(*return_type),
            NodeKind::SimpleType { name } if name == "Void"
        ));
    }

    #[test]
    fn parses_class_with_parent_and_members() {
        let ast = parse_ok("class MyClass sonOf FatherClass { var a: Int = 0 fun MyClass() {} }");
        let stmts = root_statements(&ast);
        let NodeKind::ClassDecl { name, parent, members } = ast.kind(stmts[0]) else {
            panic!();
        };
        assert_eq!(name, "MyClass");
        assert_eq!(parent.as_deref(), Some("FatherClass"));
        assert_eq!(members.len(), 2);
    }

    #[test]
    fn daddy_call_is_its_own_node() {
        let ast = parse_ok("Daddy(1, 2)");
        let stmts = root_statements(&ast);
        let NodeKind::ExprStmt { expr } = ast.kind(stmts[0]) else {
            panic!();
        };
        let NodeKind::DaddyCall { args } = ast.kind(*expr) else {
            panic!("expected daddy call");
        };
        assert_eq!(args.len(), 2);
    }

    #[test]
    fn constructor_and_field_chain() {
        let ast = parse_ok("$Pair(1, 2).a");
        let stmts = root_statements(&ast);
        let NodeKind::ExprStmt { expr } = ast.kind(stmts[0]) else {
            panic!();
        };
        let NodeKind::FieldAccess { stem, field } = ast.kind(*expr) else {
            panic!("expected field access");
        };
        assert_eq!(field, "a");
        let NodeKind::FunCall { callee, .. } = ast.kind(*stem) else {
            panic!("expected call");
        };
        assert!(matches!(ast.kind(*callee), NodeKind::Constructor { .. }));
    }

    #[test]
    fn born_with_and_without_variable() {
        let ast = parse_ok("born(f)\nborn(f, v)");
        let stmts = root_statements(&ast);
        assert!(matches!(ast.kind(stmts[0]), NodeKind::Born { var_ref: None, .. }));
        assert!(matches!(ast.kind(stmts[1]), NodeKind::Born { var_ref: Some(_), .. }));
    }

    #[test]
    fn bare_return_before_brace() {
        let ast = parse_ok("fun f() { return }");
        let stmts = root_statements(&ast);
        let NodeKind::FunDecl { body, .. } = ast.kind(stmts[0]) else {
            panic!();
        };
        let NodeKind::Block { statements } = ast.kind(*body) else {
            panic!();
        };
        assert!(matches!(ast.kind(statements[0]), NodeKind::Return { value: None }));
    }

    #[test]
    fn newline_ends_an_expression_statement() {
        let ast = parse_ok("f()\n-1");
        assert_eq!(root_statements(&ast).len(), 2);
    }

    #[test]
    fn assignment_is_right_associative() {
        let ast = parse_ok("a = b = 1");
        let stmts = root_statements(&ast);
        let NodeKind::ExprStmt { expr } = ast.kind(stmts[0]) else {
            panic!();
        };
        let NodeKind::Assignment { rhs, .. } = ast.kind(*expr) else {
            panic!();
        };
        assert!(matches!(ast.kind(*rhs), NodeKind::Assignment { .. }));
    }

    #[test]
    fn error_reports_position() {
        let err = parse("var x Int = 1").unwrap_err();
        assert!(err.to_string().contains("expected `:`"), "{err}");
    }
}
