//! This module defines the expression model shared by the reader and the evaluator.
//! The main enum, [`Expr`], is a closed union of cons pairs, interned symbols, integers
//! and user-defined closures. Pairs are immutable and shared through reference counting,
//! so lists built by the reader, by `CONS`/`LIST` and by argument binding all share
//! structure freely. The module also provides the printed form of every expression,
//! the identity (`EQ?`) and structural (`EQUAL?`) equality relations, and helper
//! functions such as [`sym`], [`num`] and [`nil`] for building expressions from Rust.

use std::fmt;
use std::rc::Rc;

use crate::Error;
use crate::evaluator::environment::Environment;
use crate::symbol::{Symbol, intern, nil_symbol, true_symbol};

/// Type alias for number values in interpreter
pub type NumberType = i64;

/// Core expression type
///
/// To build expressions in Rust, use the helper functions:
/// - `num(42)` for numbers, `sym("name")` for symbols, `nil()` for the empty list
/// - `Expr::from([1, 2, 3])` for proper lists of numbers
/// - `Expr::from(vec![sym("op"), num(42)])` for mixed lists
#[derive(Clone)]
pub enum Expr {
    /// Immutable cons cell
    Pair(Rc<Pair>),
    /// Interned symbol (NIL included)
    Symbol(Symbol),
    /// Signed 64-bit integer
    Number(NumberType),
    /// User-defined function created by DEFUN
    Closure(Rc<Closure>),
}

/// A cons cell. Proper lists are chains of pairs ending in `NIL`.
pub struct Pair {
    first: Expr,
    rest: Expr,
}

impl Pair {
    pub fn first(&self) -> &Expr {
        &self.first
    }

    pub fn rest(&self) -> &Expr {
        &self.rest
    }
}

// Long lists would otherwise be released by one recursive drop per element
impl Drop for Pair {
    fn drop(&mut self) {
        let mut next = std::mem::replace(&mut self.rest, Expr::Number(0));
        while let Expr::Pair(rc) = next {
            match Rc::try_unwrap(rc) {
                Ok(mut pair) => next = std::mem::replace(&mut pair.rest, Expr::Number(0)),
                Err(_) => break,
            }
        }
    }
}

/// A user-defined function: parameter list, body and the environment it closes over.
///
/// The parameter list is a proper list of symbols, or an improper list whose final
/// tail symbol collects the remaining arguments.
///
/// A closure bound in the frame it captures (every DEFUN does this) forms an `Rc`
/// cycle with that frame, so neither is freed while the cycle exists.
pub struct Closure {
    params: Expr,
    body: Expr,
    env: Environment,
}

impl Closure {
    pub fn new(params: Expr, body: Expr, env: Environment) -> Self {
        Closure { params, body, env }
    }

    pub fn params(&self) -> &Expr {
        &self.params
    }

    pub fn body(&self) -> &Expr {
        &self.body
    }

    pub fn env(&self) -> &Environment {
        &self.env
    }
}

impl Expr {
    pub fn nil() -> Expr {
        Expr::Symbol(nil_symbol())
    }

    pub fn truth() -> Expr {
        Expr::Symbol(true_symbol())
    }

    /// `TRUE` or `NIL`
    pub fn boolean(value: bool) -> Expr {
        if value { Expr::truth() } else { Expr::nil() }
    }

    pub fn cons(first: Expr, rest: Expr) -> Expr {
        Expr::Pair(Rc::new(Pair { first, rest }))
    }

    /// Build a proper list from the given elements
    pub fn list<I>(items: I) -> Expr
    where
        I: IntoIterator<Item = Expr>,
        I::IntoIter: DoubleEndedIterator,
    {
        Expr::list_with_tail(items, Expr::nil())
    }

    /// Build a list whose final `rest` is `tail` (a dotted list unless `tail` is NIL)
    pub fn list_with_tail<I>(items: I, tail: Expr) -> Expr
    where
        I: IntoIterator<Item = Expr>,
        I::IntoIter: DoubleEndedIterator,
    {
        items
            .into_iter()
            .rev()
            .fold(tail, |rest, first| Expr::cons(first, rest))
    }

    pub fn is_nil(&self) -> bool {
        matches!(self, Expr::Symbol(s) if s.is_nil())
    }

    /// Everything except NIL counts as true
    pub fn is_truthy(&self) -> bool {
        !self.is_nil()
    }

    /// Symbols and numbers are atoms; pairs and closures are not
    pub fn is_atom(&self) -> bool {
        matches!(self, Expr::Symbol(_) | Expr::Number(_))
    }

    pub fn as_symbol(&self) -> Option<&Symbol> {
        match self {
            Expr::Symbol(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_number(&self) -> Option<NumberType> {
        match self {
            Expr::Number(n) => Some(*n),
            _ => None,
        }
    }

    pub fn first(&self) -> Result<Expr, Error> {
        match self {
            Expr::Pair(pair) => Ok(pair.first.clone()),
            _ => Err(self.not_a_list("first element")),
        }
    }

    pub fn rest(&self) -> Result<Expr, Error> {
        match self {
            Expr::Pair(pair) => Ok(pair.rest.clone()),
            _ => Err(self.not_a_list("rest")),
        }
    }

    fn not_a_list(&self, part: &str) -> Error {
        match self {
            Expr::Closure(_) => Error::NotAList(format!("cannot take the {part} of a function")),
            _ => Error::NotAList(format!("cannot take the {part} of atom {self}")),
        }
    }

    /// Identity equality (`EQ?`).
    ///
    /// Pairs and closures are identical only if they are the same object. Symbols are
    /// interned, so same name means same object. Numbers are plain values here and compare
    /// by value, which is what a fully cached number representation would give.
    pub fn is_identical(&self, other: &Expr) -> bool {
        match (self, other) {
            (Expr::Number(a), Expr::Number(b)) => a == b,
            (Expr::Symbol(a), Expr::Symbol(b)) => a == b,
            (Expr::Pair(a), Expr::Pair(b)) => Rc::ptr_eq(a, b),
            (Expr::Closure(a), Expr::Closure(b)) => Rc::ptr_eq(a, b),
            _ => false,
        }
    }

    /// Structural equality (`EQUAL?`): pairs compare element-wise, everything else by identity.
    pub fn equal(&self, other: &Expr) -> bool {
        let (mut a, mut b) = (self, other);
        loop {
            match (a, b) {
                (Expr::Pair(x), Expr::Pair(y)) => {
                    if Rc::ptr_eq(x, y) {
                        return true;
                    }
                    if !x.first.equal(&y.first) {
                        return false;
                    }
                    a = &x.rest;
                    b = &y.rest;
                }
                _ => return a.is_identical(b),
            }
        }
    }
}

impl PartialEq for Expr {
    fn eq(&self, other: &Self) -> bool {
        self.equal(other)
    }
}

impl fmt::Display for Expr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Expr::Number(n) => write!(f, "{n}"),
            Expr::Symbol(s) => write!(f, "{s}"),
            Expr::Closure(_) => write!(f, "#<FUNCTION>"),
            Expr::Pair(pair) => {
                write!(f, "({}", pair.first)?;
                let mut tail = &pair.rest;
                while let Expr::Pair(next) = tail {
                    write!(f, " {}", next.first)?;
                    tail = &next.rest;
                }
                if !tail.is_nil() {
                    write!(f, " . {tail}")?;
                }
                write!(f, ")")
            }
        }
    }
}

impl fmt::Debug for Expr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Expr::Number(n) => write!(f, "Number({n})"),
            Expr::Symbol(s) => write!(f, "Symbol({s})"),
            Expr::Pair(_) => write!(f, "Pair{self}"),
            Expr::Closure(closure) => write!(
                f,
                "Closure(params={}, body={})",
                closure.params, closure.body
            ),
        }
    }
}

impl From<Symbol> for Expr {
    fn from(s: Symbol) -> Self {
        Expr::Symbol(s)
    }
}

macro_rules! impl_from_integer {
    ($int_type:ty) => {
        impl From<$int_type> for Expr {
            fn from(n: $int_type) -> Self {
                Expr::Number(NumberType::from(n))
            }
        }
    };
}

impl_from_integer!(i8);
impl_from_integer!(i16);
impl_from_integer!(i32);
impl_from_integer!(NumberType);
impl_from_integer!(u8);
impl_from_integer!(u16);
impl_from_integer!(u32);

impl<T: Into<Expr>> From<Vec<T>> for Expr {
    fn from(v: Vec<T>) -> Self {
        Expr::list(v.into_iter().map(Into::into))
    }
}

impl<T: Into<Expr>, const N: usize> From<[T; N]> for Expr {
    fn from(arr: [T; N]) -> Self {
        Expr::list(arr.into_iter().map(Into::into))
    }
}

impl<T: Into<Expr> + Clone> From<&[T]> for Expr {
    fn from(slice: &[T]) -> Self {
        Expr::list(slice.iter().cloned().map(Into::into))
    }
}

/// Intern `name` and wrap it as an expression
pub fn sym<S: AsRef<str>>(name: S) -> Expr {
    Expr::Symbol(intern(name.as_ref()))
}

pub fn num(n: NumberType) -> Expr {
    Expr::Number(n)
}

/// The empty list (NIL)
pub fn nil() -> Expr {
    Expr::nil()
}

/// The TRUE symbol
pub fn truth() -> Expr {
    Expr::truth()
}

pub fn cons<A: Into<Expr>, B: Into<Expr>>(first: A, rest: B) -> Expr {
    Expr::cons(first.into(), rest.into())
}
