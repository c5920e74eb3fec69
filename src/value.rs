//! Values for the tree-walk interpreter.
//!
//! `Value` is a tagged union rather than a trait object: the same "switch per operation" shape
//! used for AST nodes fits values here too — every place that cares what a `Value` is (truthiness,
//! equality, printing, calling) matches on this one enum instead of going through a vtable.

use std::cell::RefCell;
use std::collections::HashMap;
use std::fmt;
use std::rc::Rc;

use crate::ast::FunctionDecl;
use crate::environment::Environment;

/// A Lox value, as seen by the tree-walk interpreter.
#[derive(Clone)]
pub enum Value {
    Nil,
    Bool(bool),
    Number(f64),
    Str(Rc<str>),
    Function(Rc<LoxFunction>),
    Native(Rc<NativeFunction>),
    Class(Rc<Class>),
    Instance(Rc<Instance>),
    BoundMethod(Rc<BoundMethod>),
}

/// What kind of function body this is, for the resolver's tracking of return-from-initializer
/// and for the interpreter's "an initializer always yields `this`" rule.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FunctionKind {
    Function,
    Method,
    Initializer,
}

/// A closure's defining [Environment].
///
/// A method's closure keeps its environment alive exactly like a plain function's does: a class
/// declared inside a block whose methods are still reachable through a live instance must keep
/// resolving names against that block's scope after the block exits. Held strongly, this can
/// form a reference cycle (environment → class → method → environment, when the class is
/// declared in the very scope its methods close over) that never collects. This implementation
/// accepts that leak rather than breaking it with a weak edge that could be dropped out from
/// under a still-reachable method — the same trade-off the bytecode side's string table makes:
/// "there is no reference counting so all strings are kept forever" (`gc.rs`). A tracing
/// collector or an arena-with-handles (spec.md §9) would reclaim these cycles; this interpreter,
/// like the teacher's GC, just never frees them.
pub type Closure = Rc<RefCell<Environment>>;

/// A user-defined Lox function or method, closing over its defining environment.
pub struct LoxFunction {
    pub decl: Rc<FunctionDecl>,
    pub closure: Closure,
    pub kind: FunctionKind,
}

impl LoxFunction {
    pub fn name(&self) -> &str {
        &self.decl.name.lexeme
    }

    pub fn arity(&self) -> usize {
        self.decl.params.len()
    }

    /// Returns a copy of this function bound to a new closure — used to rebind a method to the
    /// scope that defines `this` for one particular receiver.
    pub fn with_closure(&self, closure: Closure) -> LoxFunction {
        LoxFunction {
            decl: self.decl.clone(),
            closure,
            kind: self.kind,
        }
    }
}

/// A Lox-callable native function, such as `clock()`.
pub struct NativeFunction {
    pub name: &'static str,
    pub arity: usize,
    pub func: fn(&[Value]) -> Value,
}

/// A Lox class: a factory for [Instance]s with a method table and optional superclass.
pub struct Class {
    pub name: Rc<str>,
    pub superclass: Option<Rc<Class>>,
    pub methods: HashMap<Rc<str>, Rc<LoxFunction>>,
}

impl Class {
    /// Looks up a method by name, walking up the superclass chain.
    pub fn find_method(&self, name: &str) -> Option<Rc<LoxFunction>> {
        if let Some(method) = self.methods.get(name) {
            return Some(method.clone());
        }
        self.superclass.as_ref()?.find_method(name)
    }
}

/// An instance of a Lox [Class]: a class reference plus a mutable field table.
pub struct Instance {
    pub class: Rc<Class>,
    pub fields: RefCell<HashMap<Rc<str>, Value>>,
}

impl Instance {
    pub fn new(class: Rc<Class>) -> Instance {
        Instance {
            class,
            fields: RefCell::new(HashMap::new()),
        }
    }
}

/// A method pre-bound to a specific instance as `this`.
pub struct BoundMethod {
    pub receiver: Rc<Instance>,
    pub method: Rc<LoxFunction>,
}

impl Value {
    /// Lox truthiness: only `false` and `nil` are falsey.
    pub fn is_truthy(&self) -> bool {
        !matches!(self, Value::Nil | Value::Bool(false))
    }

    /// Lox equality: never throws, different types compare unequal, `nil == nil` is true
    ///.
    pub fn lox_equal(&self, other: &Value) -> bool {
        match (self, other) {
            (Value::Nil, Value::Nil) => true,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Number(a), Value::Number(b)) => a == b,
            (Value::Str(a), Value::Str(b)) => a == b,
            (Value::Function(a), Value::Function(b)) => Rc::ptr_eq(a, b),
            (Value::Native(a), Value::Native(b)) => Rc::ptr_eq(a, b),
            (Value::Class(a), Value::Class(b)) => Rc::ptr_eq(a, b),
            (Value::Instance(a), Value::Instance(b)) => Rc::ptr_eq(a, b),
            (Value::BoundMethod(a), Value::BoundMethod(b)) => Rc::ptr_eq(a, b),
            _ => false,
        }
    }

    /// A short, stable name for runtime-error messages ("Operand must be a number", etc).
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Nil => "nil",
            Value::Bool(_) => "boolean",
            Value::Number(_) => "number",
            Value::Str(_) => "string",
            Value::Function(_) | Value::Native(_) | Value::BoundMethod(_) => "function",
            Value::Class(_) => "class",
            Value::Instance(_) => "instance",
        }
    }
}

impl fmt::Display for Value {
    /// Canonical printed form: `nil`, `true`/`false`, shortest round-trip decimal for
    /// numbers, raw string contents, `<fn name>`/`<native fn>` for callables, the class name for
    /// classes, `<name instance>` for instances, and a bound method prints as its function.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Nil => write!(f, "nil"),
            Value::Bool(b) => write!(f, "{b}"),
            Value::Number(n) => write!(f, "{}", format_number(*n)),
            Value::Str(s) => write!(f, "{s}"),
            Value::Function(func) => write!(f, "<fn {}>", func.name()),
            Value::Native(_) => write!(f, "<native fn>"),
            Value::Class(class) => write!(f, "{}", class.name),
            Value::Instance(instance) => write!(f, "{} instance", instance.class.name),
            Value::BoundMethod(bound) => write!(f, "<fn {}>", bound.method.name()),
        }
    }
}

/// Formats a number the way Lox prints it: shortest round-trip decimal, with no trailing `.0` for
/// integral values. Shared by both `Value` types' `Display` impls so the
/// tree-walk interpreter and the VM agree on `print` output.
pub fn format_number(n: f64) -> String {
    if n.is_nan() {
        return "nan".to_string();
    }
    if n.is_infinite() {
        return if n > 0.0 { "inf".to_string() } else { "-inf".to_string() };
    }
    if n == n.trunc() && n.abs() < 1e15 {
        format!("{n:.0}")
    } else {
        format!("{n}")
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn truthiness() {
        assert!(!Value::Nil.is_truthy());
        assert!(!Value::Bool(false).is_truthy());
        assert!(Value::Bool(true).is_truthy());
        assert!(Value::Number(0.0).is_truthy());
        assert!(Value::Str(Rc::from("")).is_truthy());
    }

    #[test]
    fn equality_never_panics_on_mixed_types() {
        assert!(!Value::Nil.lox_equal(&Value::Bool(false)));
        assert!(!Value::Number(0.0).lox_equal(&Value::Str(Rc::from("0"))));
        assert!(Value::Nil.lox_equal(&Value::Nil));
    }

    #[test]
    fn number_formatting_drops_trailing_zero() {
        assert_eq!("7", format_number(7.0));
        assert_eq!("1.5", format_number(1.5));
        assert_eq!("-3", format_number(-3.0));
    }
}
