//! Built-in operations registry.
//!
//! The language has a closed set of built-in operators, each named by a
//! pre-interned symbol:
//!
//! ```lisp
//! (QUOTE x) (SET var expr) (DEFUN name params body) (COND (test expr) ...) (PRINT expr)
//! (CAR l) (CDR l) (CONS a b) (LIST ...) (ATOM? x) (EQ? a b) (EQUAL? a b)
//! (+ ...) (- n ...) (* ...) (/ n ...) (< a b) (> a b)
//! ```
//!
//! ## Special Forms vs Primitives
//!
//! - **Special forms** receive their operands unevaluated and are dispatched only when
//!   their symbol appears literally in call position. The evaluator implements them.
//! - **Primitives** receive evaluated arguments and are implemented here. Their symbols
//!   are bound to themselves in the global environment, so a primitive can be passed
//!   around as a value and applied later.
//!
//! Each operator is a variant of [`SpecialForm`] or [`Primitive`]. The symbol table
//! resolves a symbol to its [`BuiltinOp`] once, at intern time, and every dispatch
//! after that is an exhaustive `match` on the tag.
//!
//! ## Argument Policy
//!
//! - `+` and `*` are variadic with identities 0 and 1.
//! - `-` and `/` need at least one argument; with exactly one, `-` negates and `/`
//!   takes the truncated integer reciprocal.
//! - `<` and `>` take exactly two numbers and answer `TRUE` or `NIL`.
//! - Integer arithmetic wraps on overflow; any zero divisor is a `DivisionByZero`.

use std::collections::HashMap;
use std::fmt;
use std::sync::LazyLock;

use crate::Error;
use crate::ast::{Expr, NumberType};

/// Number of arguments an operator accepts
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Arity {
    Exact(usize),
    AtLeast(usize),
    Any,
}

impl Arity {
    pub fn accepts(self, count: usize) -> bool {
        match self {
            Arity::Exact(n) => count == n,
            Arity::AtLeast(n) => count >= n,
            Arity::Any => true,
        }
    }

    /// Check an argument count, reporting `operator` on mismatch
    pub fn validate(self, operator: &str, count: usize) -> Result<(), Error> {
        if self.accepts(count) {
            Ok(())
        } else {
            Err(Error::arity_mismatch(operator, self, count))
        }
    }
}

impl fmt::Display for Arity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Arity::Exact(n) => write!(f, "{n}"),
            Arity::AtLeast(n) => write!(f, "at least {n}"),
            Arity::Any => write!(f, "any number of"),
        }
    }
}

/// Operators whose operands are not pre-evaluated
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SpecialForm {
    Quote,
    Set,
    Defun,
    Cond,
    Print,
}

impl SpecialForm {
    pub const ALL: [SpecialForm; 5] = [
        SpecialForm::Quote,
        SpecialForm::Set,
        SpecialForm::Defun,
        SpecialForm::Cond,
        SpecialForm::Print,
    ];

    pub fn name(self) -> &'static str {
        match self {
            SpecialForm::Quote => "QUOTE",
            SpecialForm::Set => "SET",
            SpecialForm::Defun => "DEFUN",
            SpecialForm::Cond => "COND",
            SpecialForm::Print => "PRINT",
        }
    }
}

/// Operators applied to evaluated arguments
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Primitive {
    Car,
    Cdr,
    Cons,
    List,
    IsAtom,
    Eq,
    Equal,
    Add,
    Sub,
    Mul,
    Div,
    Lt,
    Gt,
}

impl Primitive {
    pub const ALL: [Primitive; 13] = [
        Primitive::Car,
        Primitive::Cdr,
        Primitive::Cons,
        Primitive::List,
        Primitive::IsAtom,
        Primitive::Eq,
        Primitive::Equal,
        Primitive::Add,
        Primitive::Sub,
        Primitive::Mul,
        Primitive::Div,
        Primitive::Lt,
        Primitive::Gt,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Primitive::Car => "CAR",
            Primitive::Cdr => "CDR",
            Primitive::Cons => "CONS",
            Primitive::List => "LIST",
            Primitive::IsAtom => "ATOM?",
            Primitive::Eq => "EQ?",
            Primitive::Equal => "EQUAL?",
            Primitive::Add => "+",
            Primitive::Sub => "-",
            Primitive::Mul => "*",
            Primitive::Div => "/",
            Primitive::Lt => "<",
            Primitive::Gt => ">",
        }
    }

    pub fn arity(self) -> Arity {
        match self {
            Primitive::Car | Primitive::Cdr | Primitive::IsAtom => Arity::Exact(1),
            Primitive::Cons | Primitive::Eq | Primitive::Equal | Primitive::Lt | Primitive::Gt => {
                Arity::Exact(2)
            }
            Primitive::Sub | Primitive::Div => Arity::AtLeast(1),
            Primitive::List | Primitive::Add | Primitive::Mul => Arity::Any,
        }
    }

    /// Apply this primitive to already-evaluated arguments
    pub fn apply(self, args: &[Expr]) -> Result<Expr, Error> {
        self.arity().validate(self.name(), args.len())?;
        match self {
            Primitive::Car => self.unary(args)?.first(),
            Primitive::Cdr => self.unary(args)?.rest(),
            Primitive::Cons => {
                let (first, rest) = self.binary(args)?;
                Ok(Expr::cons(first.clone(), rest.clone()))
            }
            Primitive::List => Ok(Expr::list(args.iter().cloned())),
            Primitive::IsAtom => Ok(Expr::boolean(self.unary(args)?.is_atom())),
            Primitive::Eq => {
                let (a, b) = self.binary(args)?;
                Ok(Expr::boolean(a.is_identical(b)))
            }
            Primitive::Equal => {
                let (a, b) = self.binary(args)?;
                Ok(Expr::boolean(a.equal(b)))
            }
            Primitive::Add => builtin_add(args),
            Primitive::Sub => builtin_sub(args),
            Primitive::Mul => builtin_mul(args),
            Primitive::Div => builtin_div(args),
            Primitive::Lt => self.compare(args, |a, b| a < b),
            Primitive::Gt => self.compare(args, |a, b| a > b),
        }
    }

    fn unary(self, args: &[Expr]) -> Result<&Expr, Error> {
        match args {
            [arg] => Ok(arg),
            _ => Err(Error::arity_mismatch(self.name(), Arity::Exact(1), args.len())),
        }
    }

    fn binary(self, args: &[Expr]) -> Result<(&Expr, &Expr), Error> {
        match args {
            [a, b] => Ok((a, b)),
            _ => Err(Error::arity_mismatch(self.name(), Arity::Exact(2), args.len())),
        }
    }

    fn number(self, value: &Expr) -> Result<NumberType, Error> {
        value.as_number().ok_or_else(|| {
            Error::TypeMismatch(format!(
                "{} requires numeric arguments, got {value}",
                self.name()
            ))
        })
    }

    fn compare(
        self,
        args: &[Expr],
        op: fn(NumberType, NumberType) -> bool,
    ) -> Result<Expr, Error> {
        let (a, b) = self.binary(args)?;
        Ok(Expr::boolean(op(self.number(a)?, self.number(b)?)))
    }
}

//
// Arithmetic
//

fn builtin_add(args: &[Expr]) -> Result<Expr, Error> {
    let mut sum: NumberType = 0;
    for arg in args {
        sum = sum.wrapping_add(Primitive::Add.number(arg)?);
    }
    Ok(Expr::Number(sum))
}

fn builtin_sub(args: &[Expr]) -> Result<Expr, Error> {
    let [first, rest @ ..] = args else {
        return Err(Error::arity_mismatch("-", Arity::AtLeast(1), 0));
    };
    let first = Primitive::Sub.number(first)?;

    if rest.is_empty() {
        return Ok(Expr::Number(first.wrapping_neg()));
    }

    let mut result = first;
    for arg in rest {
        result = result.wrapping_sub(Primitive::Sub.number(arg)?);
    }
    Ok(Expr::Number(result))
}

fn builtin_mul(args: &[Expr]) -> Result<Expr, Error> {
    let mut product: NumberType = 1;
    for arg in args {
        product = product.wrapping_mul(Primitive::Mul.number(arg)?);
    }
    Ok(Expr::Number(product))
}

fn builtin_div(args: &[Expr]) -> Result<Expr, Error> {
    let [first, rest @ ..] = args else {
        return Err(Error::arity_mismatch("/", Arity::AtLeast(1), 0));
    };
    let first = Primitive::Div.number(first)?;

    if rest.is_empty() {
        if first == 0 {
            return Err(Error::DivisionByZero);
        }
        return Ok(Expr::Number((1 as NumberType).wrapping_div(first)));
    }

    let mut result = first;
    for arg in rest {
        let divisor = Primitive::Div.number(arg)?;
        if divisor == 0 {
            return Err(Error::DivisionByZero);
        }
        result = result.wrapping_div(divisor);
    }
    Ok(Expr::Number(result))
}

/// Resolved implementation of a built-in operator
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpKind {
    SpecialForm(SpecialForm),
    Primitive(Primitive),
}

/// Definition of a built-in operation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuiltinOp {
    /// Canonical symbol name
    pub name: &'static str,
    pub kind: OpKind,
}

impl BuiltinOp {
    pub fn is_special_form(&self) -> bool {
        matches!(self.kind, OpKind::SpecialForm(_))
    }
}

/// Global registry of all built-in operations, special forms first.
static BUILTIN_OPS: LazyLock<Vec<BuiltinOp>> = LazyLock::new(|| {
    let special_forms = SpecialForm::ALL.into_iter().map(|form| BuiltinOp {
        name: form.name(),
        kind: OpKind::SpecialForm(form),
    });
    let primitives = Primitive::ALL.into_iter().map(|prim| BuiltinOp {
        name: prim.name(),
        kind: OpKind::Primitive(prim),
    });
    special_forms.chain(primitives).collect()
});

static BUILTIN_BY_NAME: LazyLock<HashMap<&'static str, &'static BuiltinOp>> =
    LazyLock::new(|| {
        let ops: &'static [BuiltinOp] = BUILTIN_OPS.as_slice();
        ops.iter().map(|op| (op.name, op)).collect()
    });

/// Get all builtin operations
pub fn get_builtin_ops() -> &'static [BuiltinOp] {
    BUILTIN_OPS.as_slice()
}

/// Find a builtin operation by its canonical name
pub fn find_builtin_op(name: &str) -> Option<&'static BuiltinOp> {
    BUILTIN_BY_NAME.get(name).copied()
}
