//! Report printing for medicctl

use owo_colors::OwoColorize;
use serde::Serialize;

/// Pretty JSON on stdout
pub fn print_json<T: Serialize>(value: &T) {
    match serde_json::to_string_pretty(value) {
        Ok(json) => println!("{}", json),
        Err(e) => error(&format!("could not serialize report: {}", e)),
    }
}

/// Print a report with a one-line status header on stderr; returns its `ok`
pub fn report<T: Serialize>(operation: &str, target: &str, value: &T) -> bool {
    let ok = serde_json::to_value(value)
        .ok()
        .and_then(|v| v.get("ok").and_then(|ok| ok.as_bool()))
        .unwrap_or(true);
    if ok {
        eprintln!("[OK] {} {}", operation.bold(), target.green());
    } else {
        eprintln!("[FAILED] {} {}", operation.bold(), target.red());
    }
    print_json(value);
    ok
}

pub fn error(message: &str) {
    eprintln!("[ERROR] {}", message.red());
}
