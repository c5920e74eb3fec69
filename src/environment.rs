//! Chained lexical scopes for the tree-walk evaluator.
//!
//! A scope is a name→value mapping plus an optional parent. Scopes are always shared —
//! [Rc<RefCell<Environment>>] — because closures and bound methods capture a scope by reference,
//! not by value, so mutation through one closure is visible through another sharing the same
//! scope.

use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

use crate::error::RuntimeError;
use crate::value::Value;

pub struct Environment {
    values: HashMap<Rc<str>, Value>,
    parent: Option<Rc<RefCell<Environment>>>,
}

impl Environment {
    /// A fresh scope with no parent: the global environment.
    pub fn new_global() -> Rc<RefCell<Environment>> {
        Rc::new(RefCell::new(Environment {
            values: HashMap::new(),
            parent: None,
        }))
    }

    /// A fresh scope nested inside `parent`.
    pub fn new_enclosed(parent: Rc<RefCell<Environment>>) -> Rc<RefCell<Environment>> {
        Rc::new(RefCell::new(Environment {
            values: HashMap::new(),
            parent: Some(parent),
        }))
    }

    /// Binds `name` in *this* scope, overwriting any existing binding at this exact scope. Used
    /// for `var` declarations and for binding function parameters/`this`.
    pub fn define(&mut self, name: Rc<str>, value: Value) {
        self.values.insert(name, value);
    }

    /// Looks up `name` exactly `distance` scopes up from this one. `distance` comes from the
    /// resolver's annotation, so it must name a scope that actually exists and actually binds the
    /// name.
    pub fn get_at(env: &Rc<RefCell<Environment>>, distance: usize, name: &str) -> Value {
        Self::ancestor(env, distance)
            .borrow()
            .values
            .get(name)
            .cloned()
            .unwrap_or_else(|| {
                panic!("resolver distance {distance} does not bind `{name}` — resolver/interpreter out of sync")
            })
    }

    /// Assigns `name` exactly `distance` scopes up from this one. Same resolver-distance
    /// contract as [Environment::get_at].
    pub fn assign_at(env: &Rc<RefCell<Environment>>, distance: usize, name: Rc<str>, value: Value) {
        Self::ancestor(env, distance)
            .borrow_mut()
            .values
            .insert(name, value);
    }

    /// Looks up `name` in the global scope (the root of the parent chain), for unannotated
    /// (global) references.
    pub fn get_global(env: &Rc<RefCell<Environment>>, name: &str, line: usize) -> Result<Value, RuntimeError> {
        let global = Self::global_of(env);
        global
            .borrow()
            .values
            .get(name)
            .cloned()
            .ok_or_else(|| RuntimeError::new(format!("Undefined variable '{name}'."), line))
    }

    /// Assigns `name` in the global scope. Errors if the name was never declared there —
    /// Lox assignment (unlike `var`) never implicitly creates a binding.
    pub fn assign_global(
        env: &Rc<RefCell<Environment>>,
        name: Rc<str>,
        value: Value,
        line: usize,
    ) -> Result<(), RuntimeError> {
        let global = Self::global_of(env);
        let mut global = global.borrow_mut();
        if !global.values.contains_key(&name) {
            return Err(RuntimeError::new(
                format!("Undefined variable '{name}'."),
                line,
            ));
        }
        global.values.insert(name, value);
        Ok(())
    }

    fn global_of(env: &Rc<RefCell<Environment>>) -> Rc<RefCell<Environment>> {
        let mut current = env.clone();
        loop {
            let parent = current.borrow().parent.clone();
            match parent {
                Some(p) => current = p,
                None => return current,
            }
        }
    }

    fn ancestor(env: &Rc<RefCell<Environment>>, distance: usize) -> Rc<RefCell<Environment>> {
        let mut current = env.clone();
        for _ in 0..distance {
            let parent = current
                .borrow()
                .parent
                .clone()
                .expect("resolver distance exceeds the scope chain depth");
            current = parent;
        }
        current
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn nested_scope_shadows_then_restores() {
        let global = Environment::new_global();
        global
            .borrow_mut()
            .define(Rc::from("a"), Value::Number(1.0));

        let inner = Environment::new_enclosed(global.clone());
        inner.borrow_mut().define(Rc::from("a"), Value::Number(2.0));

        assert_eq!(2.0, as_number(Environment::get_at(&inner, 0, "a")));
        assert_eq!(1.0, as_number(Environment::get_at(&inner, 1, "a")));
    }

    #[test]
    fn closures_share_mutations() {
        let global = Environment::new_global();
        global
            .borrow_mut()
            .define(Rc::from("counter"), Value::Number(0.0));

        let closure_a = global.clone();
        let closure_b = global.clone();

        Environment::assign_at(&closure_a, 0, Rc::from("counter"), Value::Number(1.0));
        assert_eq!(1.0, as_number(Environment::get_at(&closure_b, 0, "counter")));
    }

    fn as_number(v: Value) -> f64 {
        match v {
            Value::Number(n) => n,
            _ => panic!("expected number"),
        }
    }
}
