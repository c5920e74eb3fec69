//! Static scope resolution for the tree-walk interpreter.
//!
//! Walks the parsed AST once, tracking a stack of block scopes (name → declared/defined) the way
//! the interpreter's [Environment](crate::environment::Environment) chain will later be built at
//! runtime. For every `Variable`/`Assign`/`This`/`Super` node it finds a binding for, it records
//! how many scopes up that binding lives, keyed by the expression's [ExprId]. Unresolved names are
//! left for the interpreter to treat as global.

use std::collections::HashMap;

use crate::ast::{Expr, ExprId, Stmt};
use crate::diagnostics::{Diagnostic, Location};
use crate::token::Token;

/// The resolver's output: expression identity → lexical scope-hop distance.
pub type ResolverMap = HashMap<ExprId, usize>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FunctionType {
    None,
    Function,
    Method,
    Initializer,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ClassType {
    None,
    Class,
    Subclass,
}

/// Runs the resolver over a parsed program. Returns the distance map on success, or every
/// diagnostic collected on failure.
pub fn resolve(stmts: &[Stmt]) -> Result<ResolverMap, Vec<Diagnostic>> {
    let mut resolver = Resolver {
        scopes: Vec::new(),
        distances: HashMap::new(),
        diagnostics: Vec::new(),
        current_function: FunctionType::None,
        current_class: ClassType::None,
    };

    resolver.resolve_stmts(stmts);

    if resolver.diagnostics.is_empty() {
        Ok(resolver.distances)
    } else {
        Err(resolver.diagnostics)
    }
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum Binding {
    Declared,
    Defined,
}

struct Resolver {
    scopes: Vec<HashMap<String, Binding>>,
    distances: ResolverMap,
    diagnostics: Vec<Diagnostic>,
    current_function: FunctionType,
    current_class: ClassType,
}

impl Resolver {
    fn error(&mut self, token: &Token, message: impl Into<String>) {
        self.diagnostics.push(Diagnostic::new(
            token.line,
            Location::Lexeme(token.lexeme.to_string()),
            message,
        ));
    }

    fn begin_scope(&mut self) {
        self.scopes.push(HashMap::new());
        log::trace!("resolver: push scope (depth {})", self.scopes.len());
    }

    fn end_scope(&mut self) {
        log::trace!("resolver: pop scope (depth {})", self.scopes.len());
        self.scopes.pop();
    }

    fn declare(&mut self, name: &Token) {
        if let Some(scope) = self.scopes.last_mut() {
            if scope.contains_key(name.lexeme.as_ref()) {
                self.error(name, "Already a variable with this name in this scope.");
            }
            scope.insert(name.lexeme.to_string(), Binding::Declared);
        }
    }

    fn define(&mut self, name: &Token) {
        if let Some(scope) = self.scopes.last_mut() {
            scope.insert(name.lexeme.to_string(), Binding::Defined);
        }
    }

    fn resolve_local(&mut self, id: ExprId, name: &Token) {
        for (depth, scope) in self.scopes.iter().rev().enumerate() {
            if scope.contains_key(name.lexeme.as_ref()) {
                self.distances.insert(id, depth);
                return;
            }
        }
        // Not found in any scope: treated as global.
    }

    fn resolve_stmts(&mut self, stmts: &[Stmt]) {
        for stmt in stmts {
            self.resolve_stmt(stmt);
        }
    }

    fn resolve_stmt(&mut self, stmt: &Stmt) {
        match stmt {
            Stmt::Block { stmts } => {
                self.begin_scope();
                self.resolve_stmts(stmts);
                self.end_scope();
            }
            Stmt::Class {
                name,
                superclass,
                methods,
            } => self.resolve_class(name, superclass.as_ref(), methods),
            Stmt::Expression { expr } => self.resolve_expr(expr),
            Stmt::Function { decl } => {
                self.declare(&decl.name);
                self.define(&decl.name);
                self.resolve_function(&decl.params, &decl.body, FunctionType::Function);
            }
            Stmt::If {
                cond,
                then_branch,
                else_branch,
            } => {
                self.resolve_expr(cond);
                self.resolve_stmt(then_branch);
                if let Some(else_branch) = else_branch {
                    self.resolve_stmt(else_branch);
                }
            }
            Stmt::Print { expr } => self.resolve_expr(expr),
            Stmt::Return { keyword, value } => {
                if self.current_function == FunctionType::None {
                    self.error(keyword, "Can't return from top-level code.");
                }
                if let Some(value) = value {
                    if self.current_function == FunctionType::Initializer {
                        self.error(keyword, "Can't return a value from an initializer.");
                    }
                    self.resolve_expr(value);
                }
            }
            Stmt::Var { name, initializer } => {
                self.declare(name);
                if let Some(initializer) = initializer {
                    self.resolve_expr(initializer);
                }
                self.define(name);
            }
            Stmt::While { cond, body } => {
                self.resolve_expr(cond);
                self.resolve_stmt(body);
            }
        }
    }

    fn resolve_class(
        &mut self,
        name: &Token,
        superclass: Option<&Expr>,
        methods: &[std::rc::Rc<crate::ast::FunctionDecl>],
    ) {
        let enclosing_class = self.current_class;
        self.current_class = ClassType::Class;

        self.declare(name);
        self.define(name);

        if let Some(Expr::Variable { name: super_name, .. }) = superclass {
            if super_name.lexeme == name.lexeme {
                self.error(super_name, "A class can't inherit from itself.");
            }
            self.current_class = ClassType::Subclass;
            self.resolve_expr(superclass.unwrap());
        }

        if superclass.is_some() {
            self.begin_scope();
            self.scopes
                .last_mut()
                .unwrap()
                .insert("super".to_string(), Binding::Defined);
        }

        self.begin_scope();
        self.scopes
            .last_mut()
            .unwrap()
            .insert("this".to_string(), Binding::Defined);

        for method in methods {
            let kind = if method.name.lexeme.as_ref() == "init" {
                FunctionType::Initializer
            } else {
                FunctionType::Method
            };
            self.resolve_function(&method.params, &method.body, kind);
        }

        self.end_scope();

        if superclass.is_some() {
            self.end_scope();
        }

        self.current_class = enclosing_class;
    }

    fn resolve_function(&mut self, params: &[Token], body: &[Stmt], kind: FunctionType) {
        let enclosing_function = self.current_function;
        self.current_function = kind;

        self.begin_scope();
        for param in params {
            self.declare(param);
            self.define(param);
        }
        self.resolve_stmts(body);
        self.end_scope();

        self.current_function = enclosing_function;
    }

    fn resolve_expr(&mut self, expr: &Expr) {
        match expr {
            Expr::Assign { id, name, value } => {
                self.resolve_expr(value);
                self.resolve_local(*id, name);
            }
            Expr::Binary { left, right, .. } => {
                self.resolve_expr(left);
                self.resolve_expr(right);
            }
            Expr::Call { callee, args, .. } => {
                self.resolve_expr(callee);
                for arg in args {
                    self.resolve_expr(arg);
                }
            }
            Expr::Get { object, .. } => self.resolve_expr(object),
            Expr::Grouping { inner } => self.resolve_expr(inner),
            Expr::Literal { .. } => {}
            Expr::Logical { left, right, .. } => {
                self.resolve_expr(left);
                self.resolve_expr(right);
            }
            Expr::Set { object, value, .. } => {
                self.resolve_expr(value);
                self.resolve_expr(object);
            }
            Expr::Super { id, keyword, .. } => {
                if self.current_class == ClassType::None {
                    self.error(keyword, "Can't use 'super' outside of a class.");
                } else if self.current_class != ClassType::Subclass {
                    self.error(keyword, "Can't use 'super' in a class with no superclass.");
                }
                self.resolve_local(*id, keyword);
            }
            Expr::This { id, keyword } => {
                if self.current_class == ClassType::None {
                    self.error(keyword, "Can't use 'this' outside of a class.");
                }
                self.resolve_local(*id, keyword);
            }
            Expr::Unary { operand, .. } => self.resolve_expr(operand),
            Expr::Variable { id, name } => {
                if let Some(scope) = self.scopes.last() {
                    if scope.get(name.lexeme.as_ref()) == Some(&Binding::Declared) {
                        self.error(
                            name,
                            "Can't read local variable in its own initializer.",
                        );
                    }
                }
                self.resolve_local(*id, name);
            }
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::parser::parse;

    fn resolve_source(src: &str) -> Result<ResolverMap, Vec<Diagnostic>> {
        let stmts = parse(src).expect("source should parse");
        resolve(&stmts)
    }

    #[test]
    fn block_shadowing_resolves_to_correct_distance() {
        let map = resolve_source("var a = 1; { var a = 2; print a; } print a;").unwrap();
        assert_eq!(1, map.len());
    }

    #[test]
    fn reading_own_initializer_is_an_error() {
        let result = resolve_source("var a = 1; { var a = a; }");
        assert!(result.is_err());
    }

    #[test]
    fn return_outside_function_is_an_error() {
        let result = resolve_source("return 1;");
        assert!(result.is_err());
    }

    #[test]
    fn return_value_in_initializer_is_an_error() {
        let result = resolve_source("class A { init() { return 1; } }");
        assert!(result.is_err());
    }

    #[test]
    fn this_outside_class_is_an_error() {
        let result = resolve_source("print this;");
        assert!(result.is_err());
    }

    #[test]
    fn super_outside_subclass_is_an_error() {
        let result = resolve_source("class A { m() { super.m(); } }");
        assert!(result.is_err());
    }

    #[test]
    fn class_inheriting_itself_is_an_error() {
        let result = resolve_source("class A < A {}");
        assert!(result.is_err());
    }
}
