use conslisp::{Config, Environment, Error, Expr, Interpreter, ParseErrorKind, Reader};
use rustyline::DefaultEditor;
use rustyline::error::ReadlineError;
use std::io::Stdout;
use std::panic;
use std::process;
use tracing_subscriber::EnvFilter;

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let result = panic::catch_unwind(|| {
        run_repl();
    });

    if let Err(panic_info) = result {
        eprintln!("The REPL encountered an unexpected error and must exit.");

        if let Some(msg) = panic_info.downcast_ref::<&str>() {
            eprintln!("Error: {msg}");
        } else if let Some(msg) = panic_info.downcast_ref::<String>() {
            eprintln!("Error: {msg}");
        } else {
            eprintln!("Error: Unknown panic occurred");
        }

        process::exit(1);
    }
}

/// Outcome of reading the buffered input
enum Input {
    Complete(Vec<Expr>),
    NeedsMore,
    Invalid(Error),
}

fn read_buffer(buffer: &str, config: Config) -> Input {
    match Reader::with_config(buffer, config).collect::<Result<Vec<_>, _>>() {
        Ok(exprs) => Input::Complete(exprs),
        Err(Error::Syntax(e)) if e.kind == ParseErrorKind::Incomplete => Input::NeedsMore,
        Err(e) => Input::Invalid(e),
    }
}

fn run_repl() {
    println!("ConsLisp interpreter");
    println!("Enter S-expressions like: (+ 1 2) or (DEFUN SQUARE (X) (* X X))");
    println!("Type :help for more commands, or Ctrl+C to exit.");
    println!();

    let mut rl = match DefaultEditor::new() {
        Ok(rl) => rl,
        Err(err) => {
            eprintln!("Could not initialize REPL: {err}");
            process::exit(1);
        }
    };
    let config = Config::bounded();
    let mut lisp = Interpreter::with_config(config);
    let mut buffer = String::new();

    loop {
        let prompt = if buffer.is_empty() { "conslisp> " } else { "     ...> " };
        match rl.readline(prompt) {
            Ok(line) => {
                if buffer.is_empty() {
                    let command = line.trim();
                    if command.is_empty() {
                        continue;
                    }
                    let _ = rl.add_history_entry(command);

                    match command {
                        ":help" => {
                            print_help();
                            continue;
                        }
                        ":env" => {
                            print_environment(lisp.global_env());
                            continue;
                        }
                        ":quit" | ":exit" => {
                            println!("Goodbye!");
                            break;
                        }
                        _ => {}
                    }
                } else {
                    let _ = rl.add_history_entry(line.trim());
                }

                buffer.push_str(&line);
                buffer.push('\n');

                match read_buffer(&buffer, config) {
                    Input::NeedsMore => continue,
                    Input::Invalid(e) => println!("Error: {e}"),
                    Input::Complete(exprs) => evaluate_all(&mut lisp, &exprs),
                }
                buffer.clear();
            }

            Err(ReadlineError::Interrupted) if !buffer.is_empty() => {
                // Abandon the unfinished expression
                buffer.clear();
            }
            Err(ReadlineError::Eof) | Err(ReadlineError::Interrupted) => {
                println!("Goodbye!");
                break;
            }
            Err(err) => {
                println!("Error: {err:?}");
                break;
            }
        }
    }
}

/// Evaluate each expression, stopping at the first error
fn evaluate_all(lisp: &mut Interpreter<Stdout>, exprs: &[Expr]) {
    for expr in exprs {
        match lisp.evaluate(expr) {
            Ok(value) => println!("=> {value}"),
            Err(e) => {
                println!("Error: {e}");
                break;
            }
        }
    }
}

fn print_help() {
    println!("ConsLisp commands:");
    println!("  :help      - Show this help message");
    println!("  :env       - Show current global bindings");
    println!("  :quit      - Exit the interpreter");
    println!("  :exit      - Exit the interpreter");
    println!("  Ctrl+C     - Cancel unfinished input, or exit");
    println!();
    println!("Language:");
    println!("  Numbers: 42, -5 (64-bit, wrapping)");
    println!("  Symbols: case-insensitive, NIL is false and the empty list");
    println!("  Special forms: QUOTE 'x, SET, DEFUN, COND, PRINT");
    println!("  Lists: CAR, CDR, CONS, LIST, ATOM?, EQ?, EQUAL?");
    println!("  Arithmetic: +, -, *, /, <, >");
    println!();
    println!("Examples:");
    println!("  (+ 1 2 3)");
    println!("  (CONS 1 '(2 3))");
    println!("  (DEFUN FACT (N) (COND ((< N 1) 1) (TRUE (* N (FACT (- N 1))))))");
    println!("  (DEFUN F (A . REST) (LIST A REST))");
    println!("  (COND ((> 2 1) 'YES) (TRUE 'NO))");
    println!();
}

fn print_environment(env: &Environment) {
    let bindings = env.bindings();

    if bindings.is_empty() {
        println!("Environment is empty.");
        return;
    }

    println!("Environment bindings ({} total):", bindings.len());
    println!();

    // Built-in operators and NIL/TRUE are bound to their own symbol
    let mut builtins = Vec::new();
    let mut user_defined = Vec::new();

    for (name, value) in bindings {
        match &value {
            Expr::Symbol(bound) if *bound == name => builtins.push(name),
            _ => user_defined.push((name, value)),
        }
    }

    if !builtins.is_empty() {
        println!("Built-in symbols ({}):", builtins.len());
        let mut col = 0;
        for name in builtins {
            print!("  {:<15}", name.name());
            col += 1;
            if col % 4 == 0 {
                println!();
            }
        }
        if col % 4 != 0 {
            println!();
        }
        println!();
    }

    if !user_defined.is_empty() {
        println!("User-defined values ({}):", user_defined.len());
        for (name, value) in user_defined {
            println!("  {name} = {value}");
        }
    }
}
