use std::cell::RefCell;
use std::collections::HashMap;
use std::fmt;
use std::rc::Rc;

use crate::Error;
use crate::ast::Expr;
use crate::symbol::Symbol;

struct Frame {
    bindings: HashMap<Symbol, Expr>,
    parent: Option<Environment>,
}

/// A chain of binding frames. Clones share the same frame, so a binding made
/// through one handle is visible through every other handle and to every
/// closure that captured it.
#[derive(Clone)]
pub struct Environment(Rc<RefCell<Frame>>);

impl Environment {
    /// An empty root frame
    pub fn new() -> Self {
        Environment(Rc::new(RefCell::new(Frame {
            bindings: HashMap::new(),
            parent: None,
        })))
    }

    /// An empty frame whose lookups fall back to `parent`
    pub fn with_parent(parent: &Environment) -> Self {
        Environment(Rc::new(RefCell::new(Frame {
            bindings: HashMap::new(),
            parent: Some(parent.clone()),
        })))
    }

    pub fn parent(&self) -> Option<Environment> {
        self.0.borrow().parent.clone()
    }

    /// Find the value bound to `name` in the nearest frame that binds it
    pub fn lookup(&self, name: &Symbol) -> Result<Expr, Error> {
        let mut frame = self.clone();
        loop {
            let parent = {
                let current = frame.0.borrow();
                if let Some(value) = current.bindings.get(name) {
                    return Ok(value.clone());
                }
                current.parent.clone()
            };
            match parent {
                Some(parent) => frame = parent,
                None => return Err(Error::UnboundSymbol(name.to_string())),
            }
        }
    }

    /// Bind `name` in this frame, replacing any existing binding here
    pub fn define(&self, name: Symbol, value: Expr) {
        self.0.borrow_mut().bindings.insert(name, value);
    }

    /// Replace the binding of `name` in the nearest frame that binds it
    pub fn set(&self, name: &Symbol, value: Expr) -> Result<(), Error> {
        let mut frame = self.clone();
        loop {
            let parent = {
                let mut current = frame.0.borrow_mut();
                if let Some(slot) = current.bindings.get_mut(name) {
                    *slot = value;
                    return Ok(());
                }
                current.parent.clone()
            };
            match parent {
                Some(parent) => frame = parent,
                None => return Err(Error::UnboundSymbol(name.to_string())),
            }
        }
    }

    /// Create a child frame binding `params` to `args`.
    ///
    /// `params` and `args` are walked together, each parameter symbol taking the next
    /// argument. A non-NIL symbol in tail position takes the list of all remaining
    /// arguments. Binding stops as soon as either side runs out: extra arguments are
    /// ignored, and parameters without an argument (rest parameter included) stay unbound.
    pub fn extend(&self, params: &Expr, args: &[Expr]) -> Result<Environment, Error> {
        let frame = Environment::with_parent(self);
        let mut params = params.clone();
        let mut remaining = args;

        while !remaining.is_empty() {
            match params {
                Expr::Pair(pair) => {
                    let Expr::Symbol(name) = pair.first() else {
                        return Err(Error::TypeMismatch(format!(
                            "parameter must be a symbol, got {}",
                            pair.first()
                        )));
                    };
                    if let Some((arg, rest)) = remaining.split_first() {
                        frame.define(name.clone(), arg.clone());
                        remaining = rest;
                    }
                    params = pair.rest().clone();
                }
                Expr::Symbol(name) if name.is_nil() => break,
                Expr::Symbol(name) => {
                    frame.define(name, Expr::list(remaining.iter().cloned()));
                    break;
                }
                other => {
                    return Err(Error::TypeMismatch(format!(
                        "parameter list must end in a symbol, got {other}"
                    )));
                }
            }
        }

        Ok(frame)
    }

    /// All visible bindings sorted by name, inner frames shadowing outer ones
    pub fn bindings(&self) -> Vec<(Symbol, Expr)> {
        let mut visible: HashMap<Symbol, Expr> = HashMap::new();
        let mut frame = Some(self.clone());
        while let Some(current) = frame {
            let current = current.0.borrow();
            for (name, value) in &current.bindings {
                visible
                    .entry(name.clone())
                    .or_insert_with(|| value.clone());
            }
            frame = current.parent.clone();
        }

        let mut result: Vec<_> = visible.into_iter().collect();
        result.sort_by(|a, b| a.0.name().cmp(b.0.name()));
        result
    }
}

impl Default for Environment {
    fn default() -> Self {
        Self::new()
    }
}

impl PartialEq for Environment {
    fn eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }
}

// Values may be closures holding this environment, so only names are shown
impl fmt::Debug for Environment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let frame = self.0.borrow();
        let mut names: Vec<&str> = frame.bindings.keys().map(Symbol::name).collect();
        names.sort_unstable();
        f.debug_struct("Environment")
            .field("bindings", &names)
            .field("has_parent", &frame.parent.is_some())
            .finish()
    }
}
