//! Process-wide symbol interning.
//!
//! Every symbol name is canonicalized to upper case and mapped to exactly one
//! [`Symbol`] handle, so comparing two symbols is a pointer comparison. The table
//! is append-only and guarded by a mutex, which makes interning safe from any
//! thread. It is seeded on first use with `NIL`, `TRUE` and the name of every
//! special form and primitive; those symbols carry their [`BuiltinOp`] so the
//! evaluator dispatches on a resolved tag instead of comparing names.

use std::collections::HashMap;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::{Arc, LazyLock, Mutex, PoisonError};

use crate::builtinops::{BuiltinOp, find_builtin_op, get_builtin_ops};

pub(crate) const NIL_NAME: &str = "NIL";
pub(crate) const TRUE_NAME: &str = "TRUE";

struct SymbolEntry {
    name: Box<str>,
    builtin: Option<&'static BuiltinOp>,
}

/// An interned symbol. Clones share the same identity.
#[derive(Clone)]
pub struct Symbol(Arc<SymbolEntry>);

impl Symbol {
    fn create(canonical_name: &str) -> Self {
        Symbol(Arc::new(SymbolEntry {
            name: canonical_name.into(),
            builtin: find_builtin_op(canonical_name),
        }))
    }

    /// The canonical (upper-case) name
    pub fn name(&self) -> &str {
        &self.0.name
    }

    /// The special form or primitive this symbol names, if any
    pub fn builtin(&self) -> Option<&'static BuiltinOp> {
        self.0.builtin
    }

    pub fn is_nil(&self) -> bool {
        *self == *NIL
    }

    pub fn is_true(&self) -> bool {
        *self == *TRUE
    }
}

impl PartialEq for Symbol {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

impl Eq for Symbol {}

impl Hash for Symbol {
    fn hash<H: Hasher>(&self, state: &mut H) {
        std::ptr::hash(Arc::as_ptr(&self.0), state);
    }
}

impl fmt::Debug for Symbol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Symbol({})", self.name())
    }
}

impl fmt::Display for Symbol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

static SYMBOL_TABLE: LazyLock<Mutex<HashMap<Box<str>, Symbol>>> = LazyLock::new(|| {
    let builtin_names = get_builtin_ops().iter().map(|op| op.name);
    let table = [NIL_NAME, TRUE_NAME]
        .into_iter()
        .chain(builtin_names)
        .map(|name| (Box::from(name), Symbol::create(name)))
        .collect();
    Mutex::new(table)
});

static NIL: LazyLock<Symbol> = LazyLock::new(|| intern(NIL_NAME));
static TRUE: LazyLock<Symbol> = LazyLock::new(|| intern(TRUE_NAME));

/// Fold a raw name to its canonical form
pub fn canonicalize(raw: &str) -> String {
    raw.to_uppercase()
}

/// Return the unique symbol for `raw`, creating it on first use.
pub fn intern(raw: &str) -> Symbol {
    let name = canonicalize(raw);
    // Nothing panics while the lock is held, so a poisoned table is still consistent
    let mut table = SYMBOL_TABLE.lock().unwrap_or_else(PoisonError::into_inner);
    if let Some(existing) = table.get(name.as_str()) {
        return existing.clone();
    }
    let symbol = Symbol::create(&name);
    table.insert(name.into_boxed_str(), symbol.clone());
    symbol
}

/// Look up an already-interned symbol without creating it
pub fn find(raw: &str) -> Option<Symbol> {
    let name = canonicalize(raw);
    let table = SYMBOL_TABLE.lock().unwrap_or_else(PoisonError::into_inner);
    table.get(name.as_str()).cloned()
}

/// The `NIL` symbol: empty list and logical false
pub fn nil_symbol() -> Symbol {
    NIL.clone()
}

/// The `TRUE` symbol: canonical logical true
pub fn true_symbol() -> Symbol {
    TRUE.clone()
}
