pub mod environment;

use std::io::{self, Stdout, Write};
use std::rc::Rc;

use tracing::{debug, trace};

use crate::ast::{Closure, Expr};
use crate::builtinops::{OpKind, SpecialForm, get_builtin_ops};
use crate::reader::Reader;
use crate::symbol::{Symbol, intern, nil_symbol, true_symbol};
use crate::{Config, Error};
use environment::Environment;

/// Evaluates expressions against an environment, writing `PRINT` output to `W`.
pub struct Evaluator<W: Write = Stdout> {
    output: W,
    config: Config,
}

impl<W: Write> Evaluator<W> {
    pub fn new(output: W) -> Self {
        Self::with_config(output, Config::default())
    }

    pub fn with_config(output: W, config: Config) -> Self {
        Evaluator { output, config }
    }

    pub fn config(&self) -> Config {
        self.config
    }

    /// The sink `PRINT` writes to
    pub fn output(&self) -> &W {
        &self.output
    }

    pub fn output_mut(&mut self) -> &mut W {
        &mut self.output
    }

    pub fn into_output(self) -> W {
        self.output
    }

    /// Evaluate `expr` in `env`
    pub fn evaluate(&mut self, expr: &Expr, env: &Environment) -> Result<Expr, Error> {
        self.eval_with_depth_tracking(expr, env, 0)
    }

    fn eval_with_depth_tracking(
        &mut self,
        expr: &Expr,
        env: &Environment,
        depth: usize,
    ) -> Result<Expr, Error> {
        if let Some(max) = self.config.max_eval_depth
            && depth >= max
        {
            return Err(Error::DepthLimitExceeded(max));
        }
        match expr {
            Expr::Number(_) | Expr::Closure(_) => Ok(expr.clone()),
            Expr::Symbol(symbol) if symbol.is_nil() || symbol.is_true() => Ok(expr.clone()),
            Expr::Symbol(symbol) => env.lookup(symbol),
            Expr::Pair(pair) => self
                .eval_list(pair.first(), pair.rest(), env, depth)
                .map_err(|err| add_context(err, expr)),
        }
    }

    /// Evaluate a call: a special form by literal name, otherwise a function application
    fn eval_list(
        &mut self,
        head: &Expr,
        operands: &Expr,
        env: &Environment,
        depth: usize,
    ) -> Result<Expr, Error> {
        if let Expr::Symbol(symbol) = head
            && let Some(op) = symbol.builtin()
            && let OpKind::SpecialForm(form) = op.kind
        {
            return self.eval_special_form(form, operands, env, depth);
        }

        let function = self.eval_with_depth_tracking(head, env, depth + 1)?;
        let args = self.eval_args(operands, env, depth)?;
        self.apply(&function, &args, depth)
    }

    /// Evaluate each operand left to right
    fn eval_args(
        &mut self,
        operands: &Expr,
        env: &Environment,
        depth: usize,
    ) -> Result<Vec<Expr>, Error> {
        let mut args = Vec::new();
        let mut rest = operands;
        while let Expr::Pair(pair) = rest {
            args.push(self.eval_with_depth_tracking(pair.first(), env, depth + 1)?);
            rest = pair.rest();
        }
        if !rest.is_nil() {
            return Err(Error::NotAList(format!("argument list ends in {rest}")));
        }
        Ok(args)
    }

    fn apply(&mut self, function: &Expr, args: &[Expr], depth: usize) -> Result<Expr, Error> {
        match function {
            Expr::Closure(closure) => {
                trace!(params = %closure.params(), args = args.len(), "applying closure");
                let frame = closure.env().extend(closure.params(), args)?;
                self.eval_with_depth_tracking(closure.body(), &frame, depth + 1)
            }
            Expr::Symbol(symbol) => match symbol.builtin().map(|op| op.kind) {
                Some(OpKind::Primitive(primitive)) => primitive.apply(args),
                _ => Err(Error::UnknownOperator(symbol.to_string())),
            },
            other => Err(Error::TypeMismatch(format!("cannot apply {other}"))),
        }
    }

    fn eval_special_form(
        &mut self,
        form: SpecialForm,
        operands: &Expr,
        env: &Environment,
        depth: usize,
    ) -> Result<Expr, Error> {
        match form {
            SpecialForm::Quote => operands.first(),
            SpecialForm::Set => self.eval_set(operands, env, depth),
            SpecialForm::Defun => eval_defun(operands, env),
            SpecialForm::Cond => self.eval_cond(operands, env, depth),
            SpecialForm::Print => self.eval_print(operands, env, depth),
        }
    }

    /// `(SET var expr)` binds in the current frame and returns the value
    fn eval_set(&mut self, operands: &Expr, env: &Environment, depth: usize) -> Result<Expr, Error> {
        let name = binding_target(SpecialForm::Set, &operands.first()?)?;
        let value = self.eval_with_depth_tracking(&operands.rest()?.first()?, env, depth + 1)?;
        if env.parent().is_none() {
            debug!(name = %name, value = %value, "SET global binding");
        }
        env.define(name, value.clone());
        Ok(value)
    }

    /// `(COND (test expr) ...)` evaluates the expression of the first clause whose test is not NIL
    fn eval_cond(&mut self, operands: &Expr, env: &Environment, depth: usize) -> Result<Expr, Error> {
        let mut clauses = operands.clone();
        while !clauses.is_nil() {
            let clause = clauses.first()?;
            let test = self.eval_with_depth_tracking(&clause.first()?, env, depth + 1)?;
            if test.is_truthy() {
                return self.eval_with_depth_tracking(&clause.rest()?.first()?, env, depth + 1);
            }
            clauses = clauses.rest()?;
        }
        Ok(Expr::nil())
    }

    fn eval_print(&mut self, operands: &Expr, env: &Environment, depth: usize) -> Result<Expr, Error> {
        let value = self.eval_with_depth_tracking(&operands.first()?, env, depth + 1)?;
        writeln!(self.output, "{value}").map_err(|e| Error::Output(e.to_string()))?;
        Ok(value)
    }
}

/// `(DEFUN name params body)` binds a closure over `env` and returns the name
fn eval_defun(operands: &Expr, env: &Environment) -> Result<Expr, Error> {
    let name = binding_target(SpecialForm::Defun, &operands.first()?)?;
    let tail = operands.rest()?;
    let params = tail.first()?;
    let body = tail.rest()?.first()?;

    if env.parent().is_none() {
        debug!(name = %name, params = %params, "DEFUN global function");
    }
    let closure = Expr::Closure(Rc::new(Closure::new(params, body, env.clone())));
    env.define(name.clone(), closure);
    Ok(Expr::Symbol(name))
}

fn binding_target(form: SpecialForm, target: &Expr) -> Result<Symbol, Error> {
    match target {
        Expr::Symbol(symbol) => Ok(symbol.clone()),
        other => Err(Error::TypeMismatch(format!(
            "{} requires a symbol to bind, got {other}",
            form.name()
        ))),
    }
}

/// Record the innermost list being evaluated on type errors
fn add_context(error: Error, expr: &Expr) -> Error {
    match error {
        Error::TypeMismatch(msg) if !msg.contains("while evaluating:") => {
            Error::TypeMismatch(format!("{msg}\n  Context: while evaluating: {expr}"))
        }
        other => other,
    }
}

/// Create a global environment: NIL, TRUE and every built-in operator bound to itself
pub fn create_global_env() -> Environment {
    let env = Environment::new();
    for symbol in [nil_symbol(), true_symbol()] {
        env.define(symbol.clone(), Expr::Symbol(symbol));
    }
    for op in get_builtin_ops() {
        let symbol = intern(op.name);
        env.define(symbol.clone(), Expr::Symbol(symbol));
    }
    env
}

/// Evaluate the first expression of `source` in a fresh global environment
pub fn evaluate_source(source: &str) -> Result<Expr, Error> {
    Interpreter::new().eval_str(source)
}

/// An evaluator paired with a persistent global environment.
///
/// ```
/// use conslisp::Interpreter;
///
/// let mut lisp = Interpreter::with_output(Vec::<u8>::new());
/// lisp.eval_all("(DEFUN SQUARE (X) (* X X)) (PRINT (SQUARE 12))").unwrap();
/// assert_eq!(lisp.output(), b"144\n");
/// ```
pub struct Interpreter<W: Write = Stdout> {
    evaluator: Evaluator<W>,
    global: Environment,
}

impl Interpreter<Stdout> {
    /// An interpreter printing to standard output
    pub fn new() -> Self {
        Self::with_config(Config::default())
    }

    pub fn with_config(config: Config) -> Self {
        Self::with_output_and_config(io::stdout(), config)
    }
}

impl Default for Interpreter<Stdout> {
    fn default() -> Self {
        Self::new()
    }
}

impl<W: Write> Interpreter<W> {
    pub fn with_output(output: W) -> Self {
        Self::with_output_and_config(output, Config::default())
    }

    pub fn with_output_and_config(output: W, config: Config) -> Self {
        Interpreter {
            evaluator: Evaluator::with_config(output, config),
            global: create_global_env(),
        }
    }

    /// Read the first expression of `source` and evaluate it in the global environment
    pub fn eval_str(&mut self, source: &str) -> Result<Expr, Error> {
        let expr = Reader::with_config(source, self.evaluator.config()).read_required()?;
        self.evaluate(&expr)
    }

    /// Evaluate every expression of `source` in order, returning the last value (NIL if none)
    pub fn eval_all(&mut self, source: &str) -> Result<Expr, Error> {
        let mut last = Expr::nil();
        for expr in Reader::with_config(source, self.evaluator.config()) {
            last = self.evaluate(&expr?)?;
        }
        Ok(last)
    }

    pub fn evaluate(&mut self, expr: &Expr) -> Result<Expr, Error> {
        self.evaluator.evaluate(expr, &self.global)
    }

    pub fn global_env(&self) -> &Environment {
        &self.global
    }

    pub fn evaluator(&self) -> &Evaluator<W> {
        &self.evaluator
    }


    pub fn output(&self) -> &W {
        self.evaluator.output()
    }

    pub fn into_output(self) -> W {
        self.evaluator.into_output()
    }
}

#[cfg(test)]
#[expect(clippy::unwrap_used)] // test code OK
mod tests {
    use super::*;
    use crate::ast::{nil, num, sym, truth};
    use crate::{MAX_EVAL_DEPTH, ParseErrorKind};

    /// Test result variants for comprehensive testing
    #[derive(Debug)]
    enum TestResult {
        EvalResult(Expr),            // Evaluation should succeed with this value
        Printed(&'static str),       // Evaluation should succeed and print as this
        SpecificError(&'static str), // Evaluation should fail with error containing this string
        AnyError,                    // Evaluation should fail (any error)
    }
    use TestResult::*;

    /// Test environment containing test cases that share state
    struct TestEnvironment(Vec<(&'static str, TestResult)>);

    fn success<T: Into<Expr>>(value: T) -> TestResult {
        EvalResult(value.into())
    }

    /// Macro for setup expressions (DEFUN answers with the function name)
    macro_rules! test_setup {
        ($expr:expr, $name:expr) => {
            ($expr, Printed($name))
        };
    }

    fn run_tests_in_environment(test_environments: Vec<TestEnvironment>) {
        for (env_idx, TestEnvironment(test_cases)) in test_environments.iter().enumerate() {
            let mut lisp = Interpreter::with_output(Vec::<u8>::new());
            for (test_idx, (input, expected)) in test_cases.iter().enumerate() {
                let test_id = format!("Environment #{} test #{}", env_idx + 1, test_idx + 1);
                execute_test_case(input, expected, &mut lisp, &test_id);
            }
        }
    }

    fn execute_test_case(
        input: &str,
        expected: &TestResult,
        lisp: &mut Interpreter<Vec<u8>>,
        test_id: &str,
    ) {
        match (lisp.eval_str(input), expected) {
            (Ok(actual), EvalResult(expected_val)) => {
                assert_eq!(actual, *expected_val, "{test_id}: '{input}' value mismatch");
            }
            (Ok(actual), Printed(expected_text)) => {
                assert_eq!(
                    actual.to_string(),
                    *expected_text,
                    "{test_id}: '{input}' printed form mismatch"
                );
            }
            (Err(_), AnyError) => {}
            (Err(e), SpecificError(expected_text)) => {
                let error_msg = e.to_string();
                assert!(
                    error_msg.contains(expected_text),
                    "{test_id}: '{input}' error should contain '{expected_text}', got: {error_msg}"
                );
            }
            (Ok(actual), AnyError | SpecificError(_)) => {
                panic!("{test_id}: '{input}' expected error, got {actual}");
            }
            (Err(err), _) => {
                panic!("{test_id}: '{input}' expected {expected:?}, got error {err}");
            }
        }
    }

    fn run_comprehensive_tests(test_cases: Vec<(&str, TestResult)>) {
        for (i, (input, expected)) in test_cases.iter().enumerate() {
            let mut lisp = Interpreter::with_output(Vec::<u8>::new());
            let test_id = format!("#{}", i + 1);
            execute_test_case(input, expected, &mut lisp, &test_id);
        }
    }

    #[test]
    #[expect(clippy::too_many_lines)] // Comprehensive test coverage is intentionally thorough
    fn test_comprehensive_operations_data_driven() {
        let test_cases = vec![
            // === SELF-EVALUATING FORMS ===
            ("42", success(42)),
            ("-271", success(-271)),
            ("nil", success(nil())),
            ("true", success(truth())),
            ("()", success(nil())),
            // Built-in operator symbols are bound to themselves
            ("+", success(sym("+"))),
            ("car", success(sym("CAR"))),
            ("quote", success(sym("QUOTE"))),
            ("undefined-thing", SpecificError("Unbound symbol: UNDEFINED-THING")),
            // === QUOTE ===
            ("'a", success(sym("A"))),
            ("(quote (1 2 3))", success([1, 2, 3])),
            ("'(1 2 3)", success([1, 2, 3])),
            ("''x", Printed("(QUOTE X)")),
            ("'(+ 1 2)", Printed("(+ 1 2)")),
            ("'(a . b)", Printed("(A . B)")),
            ("(quote)", SpecificError("Not a list")),
            // === LIST OPERATIONS ===
            ("(car '(1 2 3))", success(1)),
            ("(cdr '(1 2 3))", success([2, 3])),
            ("(cdr '(1))", success(nil())),
            ("(cdr '(1 . 2))", success(2)),
            ("(cons 1 '(2 3))", success([1, 2, 3])),
            ("(cons 1 2)", Printed("(1 . 2)")),
            ("(cons '(1) nil)", Printed("((1))")),
            ("(list)", success(nil())),
            ("(list 1 (+ 1 1) 'three)", Printed("(1 2 THREE)")),
            ("(car (cdr (list 1 2 3)))", success(2)),
            ("(car 5)", SpecificError("Not a list")),
            ("(car nil)", SpecificError("Not a list")),
            ("(car '(1) '(2))", SpecificError("ArityMismatch: CAR expected 1 arguments, got 2")),
            ("(cons 1)", SpecificError("ArityMismatch")),
            // === PREDICATES ===
            ("(atom? 1)", success(truth())),
            ("(atom? 'a)", success(truth())),
            ("(atom? nil)", success(truth())),
            ("(atom? '(1))", success(nil())),
            ("(eq? 'a 'A)", success(truth())),
            ("(eq? 3 3)", success(truth())),
            ("(eq? (list 1 2) (list 1 2))", success(nil())),
            ("(equal? (list 1 2) (list 1 2))", success(truth())),
            ("(equal? '(1 (2 3)) (list 1 (list 2 3)))", success(truth())),
            ("(equal? '(1 2) '(1 2 3))", success(nil())),
            ("(equal? 1 '(1))", success(nil())),
            ("(equal? '(quote x) ''x)", success(truth())),
            // === ARITHMETIC ===
            ("(+)", success(0)),
            ("(*)", success(1)),
            ("(+ 1 2 3 4)", success(10)),
            ("(* 2 3 4)", success(24)),
            ("(- 5)", success(-5)),
            ("(- 10 3 2)", success(5)),
            ("(/ 5)", success(0)),
            ("(/ 1)", success(1)),
            ("(/ -1)", success(-1)),
            ("(/ 20 2 3)", success(3)),
            ("(/ -7 2)", success(-3)),
            ("(/ 1 0)", SpecificError("Division by zero")),
            ("(/ 0)", SpecificError("Division by zero")),
            ("(/ 10 2 0)", SpecificError("Division by zero")),
            ("(-)", SpecificError("ArityMismatch: - expected at least 1 arguments, got 0")),
            ("(/)", SpecificError("ArityMismatch")),
            ("(+ 9223372036854775807 1)", success(i64::MIN)),
            ("(- -9223372036854775808)", success(i64::MIN)),
            ("(+ 1 'a)", SpecificError("Type error")),
            ("(* 2 '(1))", SpecificError("Type error")),
            // Type errors carry the list being evaluated
            ("(+ 1 (+ 2 'x))", SpecificError("while evaluating: (+ 2 (QUOTE X))")),
            // === COMPARISON ===
            ("(< 1 2)", success(truth())),
            ("(< 2 1)", success(nil())),
            ("(> 2 1)", success(truth())),
            ("(> 1 1)", success(nil())),
            ("(< 1 2 3)", SpecificError("ArityMismatch")),
            ("(< 1)", SpecificError("ArityMismatch")),
            ("(< 1 'b)", SpecificError("Type error")),
            // === COND ===
            ("(cond (nil 1) (true 2) (true 3))", success(2)),
            ("(cond ((< 2 1) 'no) ((> 2 1) 'yes))", success(sym("YES"))),
            ("(cond (nil 1))", success(nil())),
            ("(cond)", success(nil())),
            ("(cond (0 'zero-is-true))", success(sym("ZERO-IS-TRUE"))),
            ("(cond ('() 1) ('(x) 2))", success(2)),
            // Later clauses are never evaluated
            ("(cond (true 1) ((car 5) 2))", success(1)),
            ("(cond (nil (car 5)) (true 3))", success(3)),
            ("(cond ((car 5) 1))", SpecificError("Not a list")),
            // === SET ===
            ("(set x 5)", success(5)),
            ("(set 5 5)", SpecificError("Type error: SET requires a symbol")),
            // === APPLICATION ERRORS ===
            ("(1 2 3)", SpecificError("cannot apply 1")),
            ("('(1) 2)", SpecificError("cannot apply")),
            ("(nil)", SpecificError("Unknown operator: NIL")),
            ("('foo 1)", SpecificError("Unknown operator: FOO")),
            ("(undefined-fn 1)", SpecificError("Unbound symbol: UNDEFINED-FN")),
            ("(+ 1 . 2)", SpecificError("Not a list")),
            // === DEFUN ===
            ("(defun f (x) x)", success(sym("F"))),
            ("(defun 5 (x) x)", SpecificError("Type error: DEFUN requires a symbol")),
            ("(defun g)", SpecificError("Not a list")),
        ];

        run_comprehensive_tests(test_cases);
    }

    #[test]
    fn test_environment_operations_data_driven() {
        let environment_test_cases = vec![
            TestEnvironment(vec![
                test_setup!("(defun add1 (x) (+ x 1))", "ADD1"),
                ("(add1 5)", success(6)),
                ("(add1 (add1 5))", success(7)),
                ("add1", Printed("#<FUNCTION>")),
                ("(atom? add1)", success(nil())),
                ("(eq? add1 add1)", success(truth())),
                ("(car add1)", SpecificError("Not a list")),
            ]),
            TestEnvironment(vec![
                // Rest parameters
                test_setup!("(defun f (a . rest) (list a rest))", "F"),
                ("(f 1 2 3)", Printed("(1 (2 3))")),
                ("(f 1 2)", Printed("(1 (2))")),
                // A rest parameter with no arguments left stays unbound
                ("(f 1)", SpecificError("Unbound symbol: REST")),
                ("(f)", AnyError),
                test_setup!("(defun all args args)", "ALL"),
                ("(all 1 2 3)", success([1, 2, 3])),
                ("(all)", SpecificError("Unbound symbol: ARGS")),
            ]),
            TestEnvironment(vec![
                // Surplus arguments are ignored, missing ones stay unbound
                test_setup!("(defun first-of (a b) a)", "FIRST-OF"),
                ("(first-of 1 2 3)", success(1)),
                ("(first-of 1)", success(1)),
                test_setup!("(defun second-of (a b) b)", "SECOND-OF"),
                ("(second-of 1)", SpecificError("Unbound symbol: B")),
                test_setup!("(defun bad-params (1) 1)", "BAD-PARAMS"),
                ("(bad-params 1)", SpecificError("parameter must be a symbol")),
            ]),
            TestEnvironment(vec![
                // SET binds in the current frame
                ("(set x 10)", success(10)),
                ("x", success(10)),
                ("(set x (+ x 1))", success(11)),
                ("x", success(11)),
                test_setup!("(defun shadow (x) (cond ((set x 99) x)))", "SHADOW"),
                ("(shadow 1)", success(99)),
                ("x", success(11)),
                test_setup!("(defun make-global (v) (set fresh v))", "MAKE-GLOBAL"),
                ("(make-global 3)", success(3)),
                ("fresh", SpecificError("Unbound symbol: FRESH")),
            ]),
            TestEnvironment(vec![
                // Closures capture their defining environment
                ("(set n 100)", success(100)),
                test_setup!("(defun add-n (x) (+ x n))", "ADD-N"),
                ("(add-n 1)", success(101)),
                ("(set n 5)", success(5)),
                ("(add-n 1)", success(6)),
                // Parameters shadow globals
                test_setup!("(defun uses-param (n) n)", "USES-PARAM"),
                ("(uses-param 7)", success(7)),
                ("n", success(5)),
            ]),
            TestEnvironment(vec![
                // Primitives are first-class values
                ("(set plus +)", success(sym("+"))),
                ("(plus 2 3)", success(5)),
                test_setup!("(defun apply2 (f a b) (f a b))", "APPLY2"),
                ("(apply2 * 6 7)", success(42)),
                ("(apply2 cons 1 2)", Printed("(1 . 2)")),
                ("(apply2 add1-missing 1 2)", SpecificError("Unbound symbol")),
                // Special forms only work in call position
                ("(set p print)", success(sym("PRINT"))),
                ("(p 1)", SpecificError("Unknown operator: PRINT")),
                ("(apply2 quote 1 2)", SpecificError("Unknown operator: QUOTE")),
            ]),
            TestEnvironment(vec![
                // Errors leave the environment usable
                test_setup!("(defun id (x) x)", "ID"),
                ("undefined", SpecificError("Unbound symbol")),
                ("(car 5)", SpecificError("Not a list")),
                ("(/ 1 0)", SpecificError("Division by zero")),
                ("(id 'still-here)", success(sym("STILL-HERE"))),
            ]),
        ];

        run_tests_in_environment(environment_test_cases);
    }

    #[test]
    fn test_recursive_functions() {
        let recursive_test_cases = vec![
            TestEnvironment(vec![
                test_setup!(
                    "(defun factorial (n) (cond ((< n 1) 1) (true (* n (factorial (- n 1))))))",
                    "FACTORIAL"
                ),
                ("(factorial 0)", success(1)),
                ("(factorial 5)", success(120)),
                ("(factorial 20)", success(2_432_902_008_176_640_000_i64)),
            ]),
            TestEnvironment(vec![
                // Mutual recursion resolves through the shared global frame
                test_setup!(
                    "(defun is-even (n) (cond ((eq? n 0) true) (true (is-odd (- n 1)))))",
                    "IS-EVEN"
                ),
                test_setup!(
                    "(defun is-odd (n) (cond ((eq? n 0) nil) (true (is-even (- n 1)))))",
                    "IS-ODD"
                ),
                ("(is-even 10)", success(truth())),
                ("(is-odd 7)", success(truth())),
                ("(is-even 7)", success(nil())),
            ]),
            TestEnvironment(vec![
                test_setup!(
                    "(defun countdown (n) (cond ((< n 1) nil) (true (cons n (countdown (- n 1))))))",
                    "COUNTDOWN"
                ),
                ("(countdown 3)", success([3, 2, 1])),
                test_setup!(
                    "(defun len (l) (cond ((eq? l nil) 0) (true (+ 1 (len (cdr l))))))",
                    "LEN"
                ),
                ("(len (countdown 25))", success(25)),
                test_setup!(
                    "(defun rev-onto (l acc) (cond ((eq? l nil) acc) (true (rev-onto (cdr l) (cons (car l) acc)))))",
                    "REV-ONTO"
                ),
                ("(rev-onto '(1 2 3) nil)", success([3, 2, 1])),
            ]),
            TestEnvironment(vec![
                // Closures as arguments
                test_setup!(
                    "(defun map1 (f l) (cond ((eq? l nil) nil) (true (cons (f (car l)) (map1 f (cdr l))))))",
                    "MAP1"
                ),
                test_setup!("(defun square (x) (* x x))", "SQUARE"),
                ("(map1 square '(1 2 3 4))", success([1, 4, 9, 16])),
                ("(map1 car '((1 2) (3 4)))", success([1, 3])),
            ]),
        ];

        run_tests_in_environment(recursive_test_cases);
    }

    #[test]
    fn test_print_writes_to_sink() {
        let mut lisp = Interpreter::with_output(Vec::<u8>::new());
        assert_eq!(lisp.eval_str("(print '(1 . 2))").unwrap(), Expr::cons(num(1), num(2)));
        assert_eq!(lisp.eval_str("(print (+ 1 2))").unwrap(), num(3));
        lisp.eval_all("(defun f (x) (print x)) (f 'hello) (print f)").unwrap();
        let output = String::from_utf8(lisp.into_output()).unwrap();
        assert_eq!(output, "(1 . 2)\n3\nHELLO\n#<FUNCTION>\n");
    }

    #[test]
    fn test_print_sink_failure() {
        struct FailingSink;
        impl Write for FailingSink {
            fn write(&mut self, _buf: &[u8]) -> io::Result<usize> {
                Err(io::Error::other("sink closed"))
            }
            fn flush(&mut self) -> io::Result<()> {
                Ok(())
            }
        }

        let mut lisp = Interpreter::with_output(FailingSink);
        assert!(matches!(lisp.eval_str("(print 1)"), Err(Error::Output(_))));
        assert_eq!(lisp.eval_str("(+ 1 1)").unwrap(), num(2));
    }

    #[test]
    fn test_global_env_contents() {
        let env = create_global_env();
        let bindings = env.bindings();
        assert_eq!(bindings.len(), get_builtin_ops().len() + 2);
        for (name, value) in &bindings {
            assert_eq!(*value, Expr::Symbol(name.clone()), "{name} should be self-bound");
        }
        assert!(env.lookup(&intern("TRUE")).is_ok());
        assert!(env.lookup(&intern("DEFUN")).is_ok());
    }

    #[test]
    fn test_evaluate_with_explicit_environment() {
        let env = create_global_env();
        let mut evaluator = Evaluator::new(Vec::<u8>::new());
        let expr = crate::parse("(defun twice (x) (* 2 x))").unwrap();
        assert_eq!(evaluator.evaluate(&expr, &env).unwrap(), sym("twice"));

        let call = crate::parse("(twice 21)").unwrap();
        assert_eq!(evaluator.evaluate(&call, &env).unwrap(), num(42));

        let print = crate::parse("(print (twice 2))").unwrap();
        evaluator.evaluate(&print, &env).unwrap();
        assert_eq!(evaluator.output().as_slice(), b"4\n");
        evaluator.output_mut().clear();
        evaluator.evaluate(&print, &env).unwrap();
        assert_eq!(evaluator.output().as_slice(), b"4\n");

        // A child frame sees the parent's bindings but keeps its own
        let child = Environment::with_parent(&env);
        evaluator
            .evaluate(&crate::parse("(set local 1)").unwrap(), &child)
            .unwrap();
        assert!(child.lookup(&intern("local")).is_ok());
        assert!(env.lookup(&intern("local")).is_err());
        assert_eq!(
            evaluator.evaluate(&crate::parse("(twice local)").unwrap(), &child).unwrap(),
            num(2)
        );
    }

    #[test]
    fn test_evaluate_source_uses_fresh_environment() {
        assert_eq!(evaluate_source("(defun g (x) x)").unwrap(), sym("G"));
        assert!(matches!(evaluate_source("(g 1)"), Err(Error::UnboundSymbol(_))));
        assert_eq!(evaluate_source("(+ 1 2) (car 5)").unwrap(), num(3));
        match evaluate_source("  ; nothing here") {
            Err(Error::Syntax(e)) => assert_eq!(e.kind, ParseErrorKind::EmptyInput),
            other => panic!("expected EmptyInput, got {other:?}"),
        }
        assert!(matches!(evaluate_source("(1 2"), Err(Error::Syntax(_))));
    }

    #[test]
    fn test_eval_all() {
        let mut lisp = Interpreter::with_output(Vec::<u8>::new());
        assert_eq!(lisp.eval_all("").unwrap(), nil());
        assert_eq!(
            lisp.eval_all("(set a 2) (set b 3) (* a b)").unwrap(),
            num(6)
        );
        // Expressions before a failure keep their effects
        assert!(lisp.eval_all("(set c 1) (car c) (set d 2)").is_err());
        assert_eq!(lisp.eval_str("c").unwrap(), num(1));
        assert!(lisp.eval_str("d").is_err());
    }

    #[test]
    fn test_evaluation_depth_limit() {
        let mut lisp = Interpreter::with_output_and_config(Vec::<u8>::new(), Config::bounded());
        lisp.eval_str("(defun deep (n) (cond ((< n 1) 0) (true (+ 1 (deep (- n 1))))))")
            .unwrap();
        assert_eq!(lisp.eval_str("(deep 10)").unwrap(), num(10));
        assert_eq!(
            lisp.eval_str("(deep 1000)"),
            Err(Error::DepthLimitExceeded(MAX_EVAL_DEPTH))
        );
        // The interpreter is still usable afterwards
        assert_eq!(lisp.eval_str("(deep 5)").unwrap(), num(5));
    }
}
