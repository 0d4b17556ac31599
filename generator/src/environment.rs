use std::collections::HashMap;

use crate::runtime_value::RuntimeValue;

/// A single scope level, corresponding to a function invocation (or, for the
/// root scope, the script's top-level bindings).
#[derive(Debug, Default)]
pub struct Scope {
    variables: HashMap<String, RuntimeValue>,
}

impl Scope {
    pub fn new() -> Self {
        Scope::default()
    }

    pub fn get_variable(&self, name: &str) -> Option<&RuntimeValue> {
        self.variables.get(name)
    }

    pub fn set_variable(&mut self, name: &str, value: RuntimeValue) {
        self.variables.insert(name.to_string(), value);
    }

    pub fn into_bindings(self) -> HashMap<String, RuntimeValue> {
        self.variables
    }
}

/// The full environment is a stack of scopes. Function bodies see their
/// caller's bindings (dynamic scoping); lookups search from the innermost
/// scope outward.
#[derive(Debug)]
pub struct Environment {
    scopes: Vec<Scope>,
}

impl Environment {
    pub fn new() -> Self {
        Environment {
            scopes: vec![Scope::new()],
        }
    }

    pub fn push_scope(&mut self, scope: Scope) {
        self.scopes.push(scope);
    }

    pub fn pop_scope(&mut self) -> Option<Scope> {
        // The root scope is never popped
        if self.scopes.len() > 1 {
            self.scopes.pop()
        } else {
            None
        }
    }

    /// Look up a variable, searching from innermost scope outward.
    pub fn get_variable(&self, name: &str) -> Option<&RuntimeValue> {
        self.scopes
            .iter()
            .rev()
            .find_map(|scope| scope.get_variable(name))
    }

    /// Set a variable in the current (innermost) scope.
    pub fn set_variable(&mut self, name: &str, value: RuntimeValue) {
        if let Some(scope) = self.scopes.last_mut() {
            scope.set_variable(name, value);
        }
    }

    /// Consume the environment and return the root scope's bindings.
    pub fn into_root_bindings(mut self) -> HashMap<String, RuntimeValue> {
        self.scopes.drain(..).next().map(Scope::into_bindings).unwrap_or_default()
    }
}

impl Default for Environment {
    fn default() -> Self {
        Environment::new()
    }
}
