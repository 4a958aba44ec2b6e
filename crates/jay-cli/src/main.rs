//! Script runner: evaluates a file (or stdin) and prints the completion
//! value, or the exception with a non-zero exit code.

use std::io::Read;
use std::process::ExitCode;

use jay::{Context, JsValue};

fn main() -> ExitCode {
    let mut args = std::env::args().skip(1);
    let source = match args.next().as_deref() {
        None | Some("-") => {
            let mut buffer = String::new();
            if std::io::stdin().read_to_string(&mut buffer).is_err() {
                eprintln!("jay: failed to read stdin");
                return ExitCode::FAILURE;
            }
            buffer
        }
        Some("-e") => match args.next() {
            Some(expression) => expression,
            None => {
                eprintln!("usage: jay [-e <expression> | <script.js> | -]");
                return ExitCode::FAILURE;
            }
        },
        Some(path) => match std::fs::read_to_string(path) {
            Ok(source) => source,
            Err(error) => {
                eprintln!("jay: cannot read {path}: {error}");
                return ExitCode::FAILURE;
            }
        },
    };

    let mut ctx = Context::new();
    match ctx.eval(&source) {
        Ok(value) => {
            println!("{}", render(&mut ctx, value));
            ctx.release_value(value);
            ExitCode::SUCCESS
        }
        Err(exception) => {
            eprintln!("{exception}");
            ExitCode::FAILURE
        }
    }
}

/// Best-effort display of a completion value.
fn render(ctx: &mut Context, value: JsValue) -> String {
    if ctx.is_undefined(value) {
        return "undefined".to_owned();
    }
    if ctx.is_null(value) {
        return "null".to_owned();
    }
    if let Some(b) = ctx.get_boolean_value(value) {
        return b.to_string();
    }
    if let Some(s) = ctx.get_string(value) {
        return s;
    }
    if let Some(x) = ctx.get_number_value(value) {
        return format_number(x);
    }
    if ctx.is_function(value) {
        return "function".to_owned();
    }
    "[object]".to_owned()
}

fn format_number(x: f64) -> String {
    if x == x.trunc() && x.is_finite() && x.abs() < 1e21 {
        format!("{x:.0}")
    } else {
        x.to_string()
    }
}
