//! The tree-walk interpreter: executes a resolved AST for effect/value.
//!
//! Evaluation is a `match` per [Expr]/[Stmt] variant — a tagged variant with a switch per
//! operation, same as the resolver. `return` is *not* implemented with Rust's `?`-propagated
//! errors all the way to the top: it needs an explicit unwind signal caught exactly at the call
//! frame boundary, so [Signal::Return] is a distinct variant from [Signal::Error] and
//! [Interpreter::call] is the only place that catches it.

use std::io::Write;
use std::rc::Rc;
use std::time::{SystemTime, UNIX_EPOCH};

use crate::ast::{Expr, Stmt};
use crate::environment::Environment;
use crate::error::RuntimeError;
use crate::resolver::ResolverMap;
use crate::scanner::Token as TokenType;
use crate::token::Literal;
use crate::value::{
    BoundMethod, Class, FunctionKind, Instance, LoxFunction, NativeFunction, Value,
};

/// A non-local control-flow signal, distinct from a [RuntimeError].
enum Signal {
    Return(Value),
    Error(RuntimeError),
}

impl From<RuntimeError> for Signal {
    fn from(e: RuntimeError) -> Self {
        Signal::Error(e)
    }
}

type EvalResult = Result<Value, Signal>;
type ExecResult = Result<(), Signal>;

pub struct Interpreter<'out> {
    globals: std::rc::Rc<std::cell::RefCell<Environment>>,
    env: std::rc::Rc<std::cell::RefCell<Environment>>,
    resolver: ResolverMap,
    out: &'out mut dyn Write,
}

impl<'out> Interpreter<'out> {
    pub fn new(resolver: ResolverMap, out: &'out mut dyn Write) -> Interpreter<'out> {
        let globals = Environment::new_global();
        globals.borrow_mut().define(
            Rc::from("clock"),
            Value::Native(Rc::new(NativeFunction {
                name: "clock",
                arity: 0,
                func: native_clock,
            })),
        );

        Interpreter {
            env: globals.clone(),
            globals,
            resolver,
            out,
        }
    }

    /// Executes a whole program. Returns the first runtime fault, if any.
    pub fn interpret(&mut self, stmts: &[Stmt]) -> Result<(), RuntimeError> {
        for stmt in stmts {
            match self.execute(stmt) {
                Ok(()) => {}
                Err(Signal::Error(e)) => return Err(e),
                Err(Signal::Return(_)) => {
                    // Unreachable for a resolver-checked program: `return` outside a function is a
                    // static error. Treat a stray one as a no-op rather than panicking.
                }
            }
        }
        Ok(())
    }

    fn distance_of(&self, id: crate::ast::ExprId) -> Option<usize> {
        self.resolver.get(&id).copied()
    }

    ////////////////////////////////////////// Statements /////////////////////////////////////////

    fn execute(&mut self, stmt: &Stmt) -> ExecResult {
        match stmt {
            Stmt::Block { stmts } => {
                let scope = Environment::new_enclosed(self.env.clone());
                self.execute_block(stmts, scope)
            }
            Stmt::Class {
                name,
                superclass,
                methods,
            } => self.execute_class(name, superclass.as_ref(), methods),
            Stmt::Expression { expr } => {
                self.evaluate(expr)?;
                Ok(())
            }
            Stmt::Function { decl } => {
                let function = Value::Function(Rc::new(LoxFunction {
                    decl: decl.clone(),
                    closure: self.env.clone(),
                    kind: FunctionKind::Function,
                }));
                self.env.borrow_mut().define(decl.name.lexeme.clone(), function);
                Ok(())
            }
            Stmt::If {
                cond,
                then_branch,
                else_branch,
            } => {
                if self.evaluate(cond)?.is_truthy() {
                    self.execute(then_branch)
                } else if let Some(else_branch) = else_branch {
                    self.execute(else_branch)
                } else {
                    Ok(())
                }
            }
            Stmt::Print { expr } => {
                let value = self.evaluate(expr)?;
                writeln!(self.out, "{value}").expect("write to output sink failed");
                Ok(())
            }
            Stmt::Return { value, .. } => {
                let value = match value {
                    Some(expr) => self.evaluate(expr)?,
                    None => Value::Nil,
                };
                Err(Signal::Return(value))
            }
            Stmt::Var { name, initializer } => {
                let value = match initializer {
                    Some(expr) => self.evaluate(expr)?,
                    None => Value::Nil,
                };
                self.env.borrow_mut().define(name.lexeme.clone(), value);
                Ok(())
            }
            Stmt::While { cond, body } => {
                while self.evaluate(cond)?.is_truthy() {
                    self.execute(body)?;
                }
                Ok(())
            }
        }
    }

    fn execute_block(&mut self, stmts: &[Stmt], scope: std::rc::Rc<std::cell::RefCell<Environment>>) -> ExecResult {
        let previous = std::mem::replace(&mut self.env, scope);
        let result = stmts.iter().try_for_each(|stmt| self.execute(stmt));
        self.env = previous;
        result
    }

    fn execute_class(
        &mut self,
        name: &crate::token::Token,
        superclass_expr: Option<&Expr>,
        methods: &[Rc<crate::ast::FunctionDecl>],
    ) -> ExecResult {
        let superclass = match superclass_expr {
            Some(expr) => match self.evaluate(expr)? {
                Value::Class(class) => Some(class),
                _ => {
                    return Err(RuntimeError::new("Superclass must be a class.", expr.line()).into());
                }
            },
            None => None,
        };

        self.env.borrow_mut().define(name.lexeme.clone(), Value::Nil);

        // The methods' closure is the class's defining scope, extended with `super` if there is
        // one. Held strongly, as every closure is — see value.rs::Closure.
        let method_scope = if let Some(superclass) = &superclass {
            let scope = Environment::new_enclosed(self.env.clone());
            scope
                .borrow_mut()
                .define(Rc::from("super"), Value::Class(superclass.clone()));
            scope
        } else {
            self.env.clone()
        };

        let mut method_table = std::collections::HashMap::new();
        for method in methods {
            let kind = if method.name.lexeme.as_ref() == "init" {
                FunctionKind::Initializer
            } else {
                FunctionKind::Method
            };
            let function = LoxFunction {
                decl: method.clone(),
                closure: method_scope.clone(),
                kind,
            };
            method_table.insert(Rc::from(method.name.lexeme.as_ref()), Rc::new(function));
        }

        let class = Value::Class(Rc::new(Class {
            name: Rc::from(name.lexeme.as_ref()),
            superclass,
            methods: method_table,
        }));

        // Classes may be declared locally, not just at global scope; re-bind in the same scope
        // the forward-declared `nil` placeholder above was defined in.
        self.env.borrow_mut().define(name.lexeme.clone(), class);
        Ok(())
    }

    ////////////////////////////////////////// Expressions ////////////////////////////////////////

    fn evaluate(&mut self, expr: &Expr) -> EvalResult {
        match expr {
            Expr::Assign { id, name, value } => {
                let value = self.evaluate(value)?;
                match self.distance_of(*id) {
                    Some(distance) => {
                        Environment::assign_at(&self.env, distance, name.lexeme.clone(), value.clone());
                    }
                    None => {
                        Environment::assign_global(&self.env, name.lexeme.clone(), value.clone(), name.line)?;
                    }
                }
                Ok(value)
            }
            Expr::Binary { left, op, right } => self.evaluate_binary(left, op, right),
            Expr::Call { callee, paren, args } => self.evaluate_call(callee, paren, args),
            Expr::Get { object, name } => self.evaluate_get(object, name),
            Expr::Grouping { inner } => self.evaluate(inner),
            Expr::Literal { value } => Ok(literal_to_value(value)),
            Expr::Logical { left, op, right } => self.evaluate_logical(left, op, right),
            Expr::Set { object, name, value } => self.evaluate_set(object, name, value),
            Expr::Super { id, keyword, method } => self.evaluate_super(*id, keyword, method),
            Expr::This { id, keyword } => self.lookup_variable(*id, keyword),
            Expr::Unary { op, operand } => self.evaluate_unary(op, operand),
            Expr::Variable { id, name } => self.lookup_variable(*id, name),
        }
    }

    fn lookup_variable(&self, id: crate::ast::ExprId, name: &crate::token::Token) -> EvalResult {
        match self.distance_of(id) {
            Some(distance) => Ok(Environment::get_at(&self.env, distance, &name.lexeme)),
            None => Environment::get_global(&self.env, &name.lexeme, name.line).map_err(Signal::Error),
        }
    }

    fn evaluate_logical(&mut self, left: &Expr, op: &crate::token::Token, right: &Expr) -> EvalResult {
        let left = self.evaluate(left)?;
        // `and`/`or` short-circuit and return the deciding operand, not a coerced bool.
        if op.kind == TokenType::Or {
            if left.is_truthy() {
                return Ok(left);
            }
        } else if !left.is_truthy() {
            return Ok(left);
        }
        self.evaluate(right)
    }

    fn evaluate_unary(&mut self, op: &crate::token::Token, operand: &Expr) -> EvalResult {
        let value = self.evaluate(operand)?;
        match op.kind {
            TokenType::Bang => Ok(Value::Bool(!value.is_truthy())),
            TokenType::Minus => match value {
                Value::Number(n) => Ok(Value::Number(-n)),
                other => Err(RuntimeError::new(
                    format!("Operand must be a number, was {}.", other.type_name()),
                    op.line,
                )
                .into()),
            },
            _ => unreachable!("unary operator is always `!` or `-`"),
        }
    }

    fn evaluate_binary(&mut self, left: &Expr, op: &crate::token::Token, right: &Expr) -> EvalResult {
        let left = self.evaluate(left)?;
        let right = self.evaluate(right)?;

        use TokenType::*;
        match op.kind {
            EqualEqual => Ok(Value::Bool(left.lox_equal(&right))),
            BangEqual => Ok(Value::Bool(!left.lox_equal(&right))),
            Plus => match (left, right) {
                (Value::Number(a), Value::Number(b)) => Ok(Value::Number(a + b)),
                (Value::Str(a), Value::Str(b)) => Ok(Value::Str(Rc::from(format!("{a}{b}")))),
                _ => Err(RuntimeError::new(
                    "Operands must be two numbers or two strings.",
                    op.line,
                )
                .into()),
            },
            Minus => numeric_binary(left, right, op.line, |a, b| a - b).map(Value::Number),
            Star => numeric_binary(left, right, op.line, |a, b| a * b).map(Value::Number),
            Slash => numeric_binary(left, right, op.line, |a, b| a / b).map(Value::Number),
            Greater => numeric_binary(left, right, op.line, |a, b| a > b).map(Value::Bool),
            GreaterEqual => numeric_binary(left, right, op.line, |a, b| a >= b).map(Value::Bool),
            Less => numeric_binary(left, right, op.line, |a, b| a < b).map(Value::Bool),
            LessEqual => numeric_binary(left, right, op.line, |a, b| a <= b).map(Value::Bool),
            _ => unreachable!("binary operator token outside the grammar"),
        }
    }

    fn evaluate_call(&mut self, callee: &Expr, paren: &crate::token::Token, args: &[Expr]) -> EvalResult {
        let callee = self.evaluate(callee)?;
        let mut arg_values = Vec::with_capacity(args.len());
        for arg in args {
            arg_values.push(self.evaluate(arg)?);
        }
        self.call(callee, arg_values, paren.line)
    }

    fn call(&mut self, callee: Value, args: Vec<Value>, line: usize) -> EvalResult {
        match callee {
            Value::Native(native) => {
                if args.len() != native.arity {
                    return Err(arity_error(native.arity, args.len(), line));
                }
                Ok((native.func)(&args))
            }
            Value::Function(function) => self.call_function(&function, args, line),
            Value::BoundMethod(bound) => {
                let function = bind_method(&bound);
                self.call_function(&function, args, line)
            }
            Value::Class(class) => self.instantiate(class, args, line),
            other => Err(RuntimeError::new(
                format!("Can only call functions and classes, not {}.", other.type_name()),
                line,
            )
            .into()),
        }
    }

    fn call_function(&mut self, function: &Rc<LoxFunction>, args: Vec<Value>, line: usize) -> EvalResult {
        if args.len() != function.arity() {
            return Err(arity_error(function.arity(), args.len(), line));
        }

        let call_env = Environment::new_enclosed(function.closure.clone());
        for (param, arg) in function.decl.params.iter().zip(args) {
            call_env.borrow_mut().define(param.lexeme.clone(), arg);
        }

        let previous = std::mem::replace(&mut self.env, call_env.clone());
        let result = function.decl.body.iter().try_for_each(|stmt| self.execute(stmt));
        self.env = previous;

        let returned = match result {
            Ok(()) => Value::Nil,
            Err(Signal::Return(value)) => value,
            Err(Signal::Error(e)) => return Err(Signal::Error(e)),
        };

        if function.kind == FunctionKind::Initializer {
            // An initializer always yields `this`, even on an explicit bare `return;`
            //.
            Ok(Environment::get_at(&call_env, 0, "this"))
        } else {
            Ok(returned)
        }
    }

    fn instantiate(&mut self, class: Rc<Class>, args: Vec<Value>, line: usize) -> EvalResult {
        let instance = Rc::new(Instance::new(class.clone()));
        if let Some(initializer) = class.find_method("init") {
            let bound = bind_method(&BoundMethod {
                receiver: instance.clone(),
                method: initializer,
            });
            self.call_function(&bound, args, line)?;
        } else if !args.is_empty() {
            return Err(arity_error(0, args.len(), line));
        }
        Ok(Value::Instance(instance))
    }

    fn evaluate_get(&mut self, object: &Expr, name: &crate::token::Token) -> EvalResult {
        let object = self.evaluate(object)?;
        match object {
            Value::Instance(instance) => {
                if let Some(value) = instance.fields.borrow().get(name.lexeme.as_ref()) {
                    return Ok(value.clone());
                }
                if let Some(method) = instance.class.find_method(&name.lexeme) {
                    return Ok(Value::BoundMethod(Rc::new(BoundMethod {
                        receiver: instance,
                        method,
                    })));
                }
                Err(RuntimeError::new(
                    format!("Undefined property '{}'.", name.lexeme),
                    name.line,
                )
                .into())
            }
            other => Err(RuntimeError::new(
                format!("Only instances have properties, not {}.", other.type_name()),
                name.line,
            )
            .into()),
        }
    }

    fn evaluate_set(&mut self, object: &Expr, name: &crate::token::Token, value: &Expr) -> EvalResult {
        let object = self.evaluate(object)?;
        let instance = match object {
            Value::Instance(instance) => instance,
            other => {
                return Err(RuntimeError::new(
                    format!("Only instances have fields, not {}.", other.type_name()),
                    name.line,
                )
                .into())
            }
        };
        let value = self.evaluate(value)?;
        instance
            .fields
            .borrow_mut()
            .insert(Rc::from(name.lexeme.as_ref()), value.clone());
        Ok(value)
    }

    fn evaluate_super(
        &mut self,
        id: crate::ast::ExprId,
        keyword: &crate::token::Token,
        method: &crate::token::Token,
    ) -> EvalResult {
        let distance = self
            .distance_of(id)
            .expect("resolver always annotates `super` inside a subclass method");
        let superclass = match Environment::get_at(&self.env, distance, "super") {
            Value::Class(class) => class,
            _ => unreachable!("`super` always binds to a class value"),
        };
        // `this` lives exactly one scope closer than `super`.
        let receiver = match Environment::get_at(&self.env, distance - 1, "this") {
            Value::Instance(instance) => instance,
            _ => unreachable!("`this` always binds to an instance value"),
        };

        let found = superclass.find_method(&method.lexeme).ok_or_else(|| {
            RuntimeError::new(format!("Undefined property '{}'.", method.lexeme), method.line)
        })?;

        Ok(Value::BoundMethod(Rc::new(BoundMethod {
            receiver,
            method: found,
        })))
    }
}

/// Binds a method to its receiver: a fresh scope enclosing the method's defining environment,
/// with `this` defined as the instance.
fn bind_method(bound: &BoundMethod) -> Rc<LoxFunction> {
    let this_env = Environment::new_enclosed(bound.method.closure.clone());
    this_env
        .borrow_mut()
        .define(Rc::from("this"), Value::Instance(bound.receiver.clone()));
    Rc::new(bound.method.with_closure(this_env))
}

fn arity_error(expected: usize, got: usize, line: usize) -> Signal {
    Signal::Error(RuntimeError::new(
        format!("Expected {expected} arguments but got {got}."),
        line,
    ))
}

fn numeric_binary<T>(left: Value, right: Value, line: usize, op: impl Fn(f64, f64) -> T) -> Result<T, Signal> {
    match (left, right) {
        (Value::Number(a), Value::Number(b)) => Ok(op(a, b)),
        _ => Err(RuntimeError::new("Operands must be numbers.", line).into()),
    }
}

fn literal_to_value(literal: &Literal) -> Value {
    match literal {
        Literal::None => Value::Nil,
        Literal::Number(n) => Value::Number(*n),
        Literal::Str(s) => Value::Str(s.clone()),
        Literal::Bool(b) => Value::Bool(*b),
        Literal::Nil => Value::Nil,
    }
}

fn native_clock(_args: &[Value]) -> Value {
    let seconds = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .expect("system clock is before the Unix epoch")
        .as_secs_f64();
    Value::Number(seconds)
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::{parser, resolver};

    fn run(src: &str) -> Result<String, RuntimeError> {
        let stmts = parser::parse(src).expect("should parse");
        let map = resolver::resolve(&stmts).expect("should resolve");
        let mut out = Vec::new();
        let mut interp = Interpreter::new(map, &mut out);
        interp.interpret(&stmts)?;
        Ok(String::from_utf8(out).unwrap())
    }

    #[test]
    fn arithmetic_precedence() {
        assert_eq!("7\n", run("print 1 + 2 * 3;").unwrap());
    }

    #[test]
    fn string_concatenation() {
        assert_eq!(
            "hi there\n",
            run(r#"var a = "hi"; var b = " there"; print a + b;"#).unwrap()
        );
    }

    #[test]
    fn block_scoping_shadows_then_restores() {
        assert_eq!(
            "2\n1\n",
            run("var a = 1; { var a = 2; print a; } print a;").unwrap()
        );
    }

    #[test]
    fn recursive_fibonacci() {
        assert_eq!(
            "55\n",
            run("fun fib(n) { if (n < 2) return n; return fib(n-1) + fib(n-2); } print fib(10);")
                .unwrap()
        );
    }

    #[test]
    fn classes_with_fields_and_methods() {
        assert_eq!(
            "hi from x\n",
            run(r#"class A { greet() { print "hi from " + this.name; } } var a = A(); a.name = "x"; a.greet();"#)
                .unwrap()
        );
    }

    #[test]
    fn string_plus_number_is_a_runtime_error() {
        assert!(run(r#"print "a" + 1;"#).is_err());
    }

    #[test]
    fn first_return_wins() {
        assert_eq!(
            "1\n",
            run("fun f() { return 1; return 2; } print f();").unwrap()
        );
    }

    #[test]
    fn or_short_circuit_preserves_operand_value() {
        assert_eq!("x\n", run(r#"print nil or "x";"#).unwrap());
    }

    #[test]
    fn inheritance_and_super_calls() {
        let result = run(
            r#"
            class A { greet() { print "A"; } }
            class B < A { greet() { super.greet(); print "and B"; } }
            var b = B(); b.greet();
            "#,
        )
        .unwrap();
        assert_eq!("A\nand B\n", result);
    }

    #[test]
    fn division_by_zero_follows_ieee_semantics() {
        assert_eq!("inf\n", run("print 1 / 0;").unwrap());
    }

    #[test]
    fn empty_for_clauses() {
        assert_eq!(
            "0\n1\n2\n",
            run("var i = 0; for (;i < 3;) { print i; i = i + 1; }").unwrap()
        );
    }
}
