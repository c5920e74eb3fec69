//! The tree-walk recursive-descent parser.
//!
//! Unlike the bytecode [Compiler](crate::compiler), which is a one-pass Pratt parser driven by a
//! rule table, this parser builds an [Expr]/[Stmt] tree it hands to the
//! [resolver](crate::resolver) and [interpreter](crate::interpreter) afterwards. It still uses
//! precedence climbing for expressions, just via a cascade of named methods (`equality`,
//! `comparison`, ...) rather than a table, which is the natural shape for a recursive-descent
//! parser over a handful of fixed precedence levels.

use std::rc::Rc;

use crate::ast::{Expr, ExprId, FunctionDecl, Stmt};
use crate::diagnostics::{Diagnostic, Location};
use crate::scanner::{Scanner, Token as TokenType};
use crate::token::{Literal, Token};

/// Parses `source` into a program (a list of statements).
///
/// On success, every `Variable`/`Assign`/`This`/`Super` node carries a fresh, unique [ExprId] for
/// the resolver to annotate later. On failure, returns every [Diagnostic] collected while
/// synchronizing and resuming at the next declaration.
pub fn parse(source: &str) -> Result<Vec<Stmt>, Vec<Diagnostic>> {
    let mut parser = Parser::new(source);
    let mut stmts = Vec::new();

    while !parser.is_at_end() {
        match parser.declaration() {
            Some(stmt) => stmts.push(stmt),
            None => parser.synchronize(),
        }
    }

    if parser.diagnostics.is_empty() {
        Ok(stmts)
    } else {
        Err(parser.diagnostics)
    }
}

struct Parser<'a> {
    scanner: Scanner<'a>,
    previous: Token,
    current: Token,
    diagnostics: Vec<Diagnostic>,
    next_expr_id: u32,
}

type ParseResult<T> = Result<T, ()>;

impl<'a> Parser<'a> {
    fn new(source: &'a str) -> Parser<'a> {
        let mut scanner = Scanner::new(source);
        let first = scanner.scan_token();
        let placeholder = Token::synthetic(TokenType::Error, "", 0);
        let mut parser = Parser {
            scanner,
            previous: placeholder.clone(),
            current: placeholder,
            diagnostics: Vec::new(),
            next_expr_id: 0,
        };
        parser.current = Token::from_lexeme(&first);
        parser.skip_error_tokens();
        parser
    }

    fn fresh_id(&mut self) -> ExprId {
        let id = ExprId(self.next_expr_id);
        self.next_expr_id += 1;
        id
    }

    fn is_at_end(&self) -> bool {
        self.current.kind == TokenType::Eof
    }

    fn advance(&mut self) -> Token {
        self.previous = self.current.clone();
        let lexeme = self.scanner.scan_token();
        self.current = Token::from_lexeme(&lexeme);
        self.skip_error_tokens();
        self.previous.clone()
    }

    /// The scanner reports an unterminated string / unknown character as an [TokenType::Error]
    /// lexeme; surface it as a diagnostic and keep pulling tokens so the parser always sees a
    /// real token in `self.current`.
    fn skip_error_tokens(&mut self) {
        while self.current.kind == TokenType::Error {
            let message = self.current.lexeme.to_string();
            let line = self.current.line;
            self.diagnostics
                .push(Diagnostic::new(line, Location::None, message));
            let lexeme = self.scanner.scan_token();
            self.current = Token::from_lexeme(&lexeme);
        }
    }

    fn check(&self, kind: TokenType) -> bool {
        self.current.kind == kind
    }

    fn match_token(&mut self, kind: TokenType) -> bool {
        if self.check(kind) {
            self.advance();
            true
        } else {
            false
        }
    }

    fn consume(&mut self, kind: TokenType, message: &str) -> ParseResult<Token> {
        if self.check(kind) {
            Ok(self.advance())
        } else {
            Err(self.error_at_current(message))
        }
    }

    fn error_at_current(&mut self, message: &str) {
        let location = if self.current.kind == TokenType::Eof {
            Location::End
        } else {
            Location::Lexeme(self.current.lexeme.to_string())
        };
        self.diagnostics
            .push(Diagnostic::new(self.current.line, location, message));
    }

    fn error_at_previous(&mut self, message: &str) {
        let location = Location::Lexeme(self.previous.lexeme.to_string());
        self.diagnostics
            .push(Diagnostic::new(self.previous.line, location, message));
    }

    /// Discard tokens until a `;` or the start of a statement-like keyword.
    fn synchronize(&mut self) {
        while !self.is_at_end() {
            if self.previous.kind == TokenType::Semicolon {
                return;
            }
            match self.current.kind {
                TokenType::Class
                | TokenType::Fun
                | TokenType::Var
                | TokenType::For
                | TokenType::If
                | TokenType::While
                | TokenType::Print
                | TokenType::Return => return,
                _ => {
                    self.advance();
                }
            }
        }
    }

    ////////////////////////////////////////// Declarations //////////////////////////////////////

    fn declaration(&mut self) -> Option<Stmt> {
        let result = if self.match_token(TokenType::Class) {
            self.class_declaration()
        } else if self.match_token(TokenType::Fun) {
            self.function_declaration("function")
        } else if self.match_token(TokenType::Var) {
            self.var_declaration()
        } else {
            self.statement()
        };
        result.ok()
    }

    fn class_declaration(&mut self) -> ParseResult<Stmt> {
        let name = self.consume(TokenType::Identifier, "Expect class name.")?;

        let superclass = if self.match_token(TokenType::Less) {
            self.consume(TokenType::Identifier, "Expect superclass name.")?;
            let super_name = self.previous.clone();
            Some(Expr::Variable {
                id: self.fresh_id(),
                name: super_name,
            })
        } else {
            None
        };

        self.consume(TokenType::LeftBrace, "Expect '{' before class body.")?;

        let mut methods = Vec::new();
        while !self.check(TokenType::RightBrace) && !self.is_at_end() {
            methods.push(self.function("method")?);
        }

        self.consume(TokenType::RightBrace, "Expect '}' after class body.")?;

        Ok(Stmt::Class {
            name,
            superclass,
            methods,
        })
    }

    fn function_declaration(&mut self, kind: &str) -> ParseResult<Stmt> {
        let decl = self.function(kind)?;
        Ok(Stmt::Function { decl })
    }

    /// Parses `IDENT "(" params? ")" block`, shared by `funDecl` and class methods.
    fn function(&mut self, kind: &str) -> ParseResult<Rc<FunctionDecl>> {
        let name = self.consume(TokenType::Identifier, &format!("Expect {kind} name."))?;
        self.consume(
            TokenType::LeftParen,
            &format!("Expect '(' after {kind} name."),
        )?;

        let mut params = Vec::new();
        if !self.check(TokenType::RightParen) {
            loop {
                if params.len() >= 255 {
                    self.error_at_current("Can't have more than 255 parameters.");
                }
                let param = self.consume(TokenType::Identifier, "Expect parameter name.")?;
                if params.contains(&param) {
                    self.error_at_previous("Duplicate parameter name.");
                }
                params.push(param);
                if !self.match_token(TokenType::Comma) {
                    break;
                }
            }
        }
        self.consume(TokenType::RightParen, "Expect ')' after parameters.")?;
        self.consume(
            TokenType::LeftBrace,
            &format!("Expect '{{' before {kind} body."),
        )?;
        let body = self.block()?;

        Ok(Rc::new(FunctionDecl {
            name,
            params,
            body: Rc::new(body),
        }))
    }

    fn var_declaration(&mut self) -> ParseResult<Stmt> {
        let name = self.consume(TokenType::Identifier, "Expect variable name.")?;

        let initializer = if self.match_token(TokenType::Equal) {
            Some(self.expression()?)
        } else {
            None
        };

        self.consume(
            TokenType::Semicolon,
            "Expect ';' after variable declaration.",
        )?;

        Ok(Stmt::Var { name, initializer })
    }

    ////////////////////////////////////////// Statements /////////////////////////////////////////

    fn statement(&mut self) -> ParseResult<Stmt> {
        if self.match_token(TokenType::Print) {
            self.print_statement()
        } else if self.match_token(TokenType::For) {
            self.for_statement()
        } else if self.match_token(TokenType::If) {
            self.if_statement()
        } else if self.match_token(TokenType::Return) {
            self.return_statement()
        } else if self.match_token(TokenType::While) {
            self.while_statement()
        } else if self.match_token(TokenType::LeftBrace) {
            Ok(Stmt::Block {
                stmts: self.block()?,
            })
        } else {
            self.expression_statement()
        }
    }

    fn print_statement(&mut self) -> ParseResult<Stmt> {
        let expr = self.expression()?;
        self.consume(TokenType::Semicolon, "Expect ';' after value.")?;
        Ok(Stmt::Print { expr })
    }

    fn return_statement(&mut self) -> ParseResult<Stmt> {
        let keyword = self.previous.clone();
        let value = if self.check(TokenType::Semicolon) {
            None
        } else {
            Some(self.expression()?)
        };
        self.consume(TokenType::Semicolon, "Expect ';' after return value.")?;
        Ok(Stmt::Return { keyword, value })
    }

    fn if_statement(&mut self) -> ParseResult<Stmt> {
        self.consume(TokenType::LeftParen, "Expect '(' after 'if'.")?;
        let cond = self.expression()?;
        self.consume(TokenType::RightParen, "Expect ')' after if condition.")?;

        let then_branch = Box::new(self.statement()?);
        let else_branch = if self.match_token(TokenType::Else) {
            Some(Box::new(self.statement()?))
        } else {
            None
        };

        Ok(Stmt::If {
            cond,
            then_branch,
            else_branch,
        })
    }

    fn while_statement(&mut self) -> ParseResult<Stmt> {
        self.consume(TokenType::LeftParen, "Expect '(' after 'while'.")?;
        let cond = self.expression()?;
        self.consume(TokenType::RightParen, "Expect ')' after condition.")?;
        let body = Box::new(self.statement()?);
        Ok(Stmt::While { cond, body })
    }

    /// Desugars `for (init; cond; step) body` into
    /// `{ init; while (cond) { body; step; } }`.
    fn for_statement(&mut self) -> ParseResult<Stmt> {
        self.consume(TokenType::LeftParen, "Expect '(' after 'for'.")?;

        let initializer = if self.match_token(TokenType::Semicolon) {
            None
        } else if self.check(TokenType::Var) {
            self.advance();
            Some(self.var_declaration()?)
        } else {
            Some(self.expression_statement()?)
        };

        let condition = if !self.check(TokenType::Semicolon) {
            Some(self.expression()?)
        } else {
            None
        };
        self.consume(TokenType::Semicolon, "Expect ';' after loop condition.")?;

        let increment = if !self.check(TokenType::RightParen) {
            Some(self.expression()?)
        } else {
            None
        };
        self.consume(TokenType::RightParen, "Expect ')' after for clauses.")?;

        let mut body = self.statement()?;

        if let Some(increment) = increment {
            body = Stmt::Block {
                stmts: vec![body, Stmt::Expression { expr: increment }],
            };
        }

        let cond = condition.unwrap_or(Expr::Literal {
            value: Literal::Bool(true),
        });
        body = Stmt::While {
            cond,
            body: Box::new(body),
        };

        if let Some(initializer) = initializer {
            body = Stmt::Block {
                stmts: vec![initializer, body],
            };
        }

        Ok(body)
    }

    fn block(&mut self) -> ParseResult<Vec<Stmt>> {
        let mut stmts = Vec::new();
        while !self.check(TokenType::RightBrace) && !self.is_at_end() {
            match self.declaration() {
                Some(stmt) => stmts.push(stmt),
                None => {
                    self.synchronize();
                    if self.check(TokenType::RightBrace) || self.is_at_end() {
                        break;
                    }
                }
            }
        }
        self.consume(TokenType::RightBrace, "Expect '}' after block.")?;
        Ok(stmts)
    }

    fn expression_statement(&mut self) -> ParseResult<Stmt> {
        let expr = self.expression()?;
        self.consume(TokenType::Semicolon, "Expect ';' after expression.")?;
        Ok(Stmt::Expression { expr })
    }

    ////////////////////////////////////////// Expressions ////////////////////////////////////////

    fn expression(&mut self) -> ParseResult<Expr> {
        self.assignment()
    }

    /// `assignment → ( call "." )? IDENT "=" assignment | logic_or` — parsed as "LL(1) with
    /// look-back": parse an equality-level expression as an l-value candidate, and
    /// if `=` follows, convert `Variable`→`Assign` or `Get`→`Set`.
    fn assignment(&mut self) -> ParseResult<Expr> {
        let expr = self.or()?;

        if self.match_token(TokenType::Equal) {
            let equals = self.previous.clone();
            let value = self.assignment()?;

            return match expr {
                Expr::Variable { name, .. } => Ok(Expr::Assign {
                    id: self.fresh_id(),
                    name,
                    value: Box::new(value),
                }),
                Expr::Get { object, name } => Ok(Expr::Set {
                    object,
                    name,
                    value: Box::new(value),
                }),
                _ => {
                    self.error_at(&equals, "Invalid assignment target.");
                    Err(())
                }
            };
        }

        Ok(expr)
    }

    fn error_at(&mut self, token: &Token, message: &str) {
        let location = if token.kind == TokenType::Eof {
            Location::End
        } else {
            Location::Lexeme(token.lexeme.to_string())
        };
        self.diagnostics
            .push(Diagnostic::new(token.line, location, message));
    }

    fn or(&mut self) -> ParseResult<Expr> {
        let mut expr = self.and()?;
        while self.match_token(TokenType::Or) {
            let op = self.previous.clone();
            let right = self.and()?;
            expr = Expr::Logical {
                left: Box::new(expr),
                op,
                right: Box::new(right),
            };
        }
        Ok(expr)
    }

    fn and(&mut self) -> ParseResult<Expr> {
        let mut expr = self.equality()?;
        while self.match_token(TokenType::And) {
            let op = self.previous.clone();
            let right = self.equality()?;
            expr = Expr::Logical {
                left: Box::new(expr),
                op,
                right: Box::new(right),
            };
        }
        Ok(expr)
    }

    fn equality(&mut self) -> ParseResult<Expr> {
        let mut expr = self.comparison()?;
        while self.check(TokenType::BangEqual) || self.check(TokenType::EqualEqual) {
            let op = self.advance();
            let right = self.comparison()?;
            expr = Expr::Binary {
                left: Box::new(expr),
                op,
                right: Box::new(right),
            };
        }
        Ok(expr)
    }

    fn comparison(&mut self) -> ParseResult<Expr> {
        let mut expr = self.term()?;
        while matches!(
            self.current.kind,
            TokenType::Greater | TokenType::GreaterEqual | TokenType::Less | TokenType::LessEqual
        ) {
            let op = self.advance();
            let right = self.term()?;
            expr = Expr::Binary {
                left: Box::new(expr),
                op,
                right: Box::new(right),
            };
        }
        Ok(expr)
    }

    fn term(&mut self) -> ParseResult<Expr> {
        let mut expr = self.factor()?;
        while matches!(self.current.kind, TokenType::Plus | TokenType::Minus) {
            let op = self.advance();
            let right = self.factor()?;
            expr = Expr::Binary {
                left: Box::new(expr),
                op,
                right: Box::new(right),
            };
        }
        Ok(expr)
    }

    fn factor(&mut self) -> ParseResult<Expr> {
        let mut expr = self.unary()?;
        while matches!(self.current.kind, TokenType::Star | TokenType::Slash) {
            let op = self.advance();
            let right = self.unary()?;
            expr = Expr::Binary {
                left: Box::new(expr),
                op,
                right: Box::new(right),
            };
        }
        Ok(expr)
    }

    fn unary(&mut self) -> ParseResult<Expr> {
        if matches!(self.current.kind, TokenType::Bang | TokenType::Minus) {
            let op = self.advance();
            let operand = self.unary()?;
            return Ok(Expr::Unary {
                op,
                operand: Box::new(operand),
            });
        }
        self.call()
    }

    fn call(&mut self) -> ParseResult<Expr> {
        let mut expr = self.primary()?;

        loop {
            if self.match_token(TokenType::LeftParen) {
                expr = self.finish_call(expr)?;
            } else if self.match_token(TokenType::Dot) {
                let name = self.consume(TokenType::Identifier, "Expect property name after '.'.")?;
                expr = Expr::Get {
                    object: Box::new(expr),
                    name,
                };
            } else {
                break;
            }
        }

        Ok(expr)
    }

    fn finish_call(&mut self, callee: Expr) -> ParseResult<Expr> {
        let mut args = Vec::new();
        if !self.check(TokenType::RightParen) {
            loop {
                if args.len() >= 255 {
                    self.error_at_current("Can't have more than 255 arguments.");
                }
                args.push(self.expression()?);
                if !self.match_token(TokenType::Comma) {
                    break;
                }
            }
        }
        let paren = self.consume(TokenType::RightParen, "Expect ')' after arguments.")?;
        Ok(Expr::Call {
            callee: Box::new(callee),
            paren,
            args,
        })
    }

    fn primary(&mut self) -> ParseResult<Expr> {
        if self.match_token(TokenType::False) {
            return Ok(Expr::Literal {
                value: Literal::Bool(false),
            });
        }
        if self.match_token(TokenType::True) {
            return Ok(Expr::Literal {
                value: Literal::Bool(true),
            });
        }
        if self.match_token(TokenType::Nil) {
            return Ok(Expr::Literal {
                value: Literal::Nil,
            });
        }
        if self.match_token(TokenType::Number) || self.match_token(TokenType::StrLiteral) {
            return Ok(Expr::Literal {
                value: self.previous.literal.clone(),
            });
        }
        if self.match_token(TokenType::This) {
            return Ok(Expr::This {
                id: self.fresh_id(),
                keyword: self.previous.clone(),
            });
        }
        if self.match_token(TokenType::Super) {
            let keyword = self.previous.clone();
            self.consume(TokenType::Dot, "Expect '.' after 'super'.")?;
            let method = self.consume(TokenType::Identifier, "Expect superclass method name.")?;
            return Ok(Expr::Super {
                id: self.fresh_id(),
                keyword,
                method,
            });
        }
        if self.match_token(TokenType::Identifier) {
            return Ok(Expr::Variable {
                id: self.fresh_id(),
                name: self.previous.clone(),
            });
        }
        if self.match_token(TokenType::LeftParen) {
            let inner = self.expression()?;
            self.consume(TokenType::RightParen, "Expect ')' after expression.")?;
            return Ok(Expr::Grouping {
                inner: Box::new(inner),
            });
        }

        self.error_at_current("Expect expression.");
        Err(())
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn parses_arithmetic_with_correct_precedence() {
        let stmts = parse("print 1 + 2 * 3;").expect("should parse");
        assert_eq!(1, stmts.len());
        match &stmts[0] {
            Stmt::Print { expr: Expr::Binary { op, .. } } => {
                assert_eq!(TokenType::Plus, op.kind);
            }
            other => panic!("unexpected statement: {other:?}"),
        }
    }

    #[test]
    fn reports_multiple_errors_and_synchronizes() {
        let result = parse("var ; var y = 1;");
        assert!(result.is_err());
    }

    #[test]
    fn for_loop_desugars_to_while() {
        let stmts = parse("for (var i = 0; i < 3; i = i + 1) print i;").expect("should parse");
        assert_eq!(1, stmts.len());
        assert!(matches!(stmts[0], Stmt::Block { .. }));
    }

    #[test]
    fn assignment_target_must_be_an_lvalue() {
        let result = parse("1 + 2 = 3;");
        assert!(result.is_err());
    }

}
