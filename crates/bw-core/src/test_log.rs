//! JSONL traces for tests, under `target/test-logs`.
//!
//! Integration tests call [`test_log!`](crate::test_log) at interesting
//! points so a failing CI run leaves a readable trail of what each test
//! saw. Tracing failures go to stderr and never fail the test.

use chrono::{SecondsFormat, Utc};
use serde_json::{json, Map, Value};
use std::fs::OpenOptions;
use std::io::Write;
use std::path::PathBuf;

fn trace_path() -> PathBuf {
    let target = std::env::var_os("CARGO_TARGET_DIR")
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("../../target"));
    target
        .join("test-logs")
        .join(format!("bw-core-tests-{}.jsonl", std::process::id()))
}

fn append(line: &str) -> std::io::Result<()> {
    let path = trace_path();
    if let Some(dir) = path.parent() {
        std::fs::create_dir_all(dir)?;
    }
    let mut file = OpenOptions::new().create(true).append(true).open(path)?;
    writeln!(file, "{line}")
}

/// Write one trace line. Keys in `fields` land under `"fields"`.
pub fn record(level: &str, msg: &str, file: &str, line: u32, fields: &[(&str, Value)]) {
    let thread = std::thread::current();
    let test = thread.name().unwrap_or("unnamed");
    let extra: Map<String, Value> = fields
        .iter()
        .map(|(k, v)| ((*k).to_string(), v.clone()))
        .collect();
    let entry = json!({
        "ts": Utc::now().to_rfc3339_opts(SecondsFormat::Micros, true),
        "level": level,
        "test": test,
        "msg": msg,
        "at": format!("{file}:{line}"),
        "pid": std::process::id(),
        "fields": extra,
    });
    if let Err(err) = append(&entry.to_string()) {
        eprintln!("test_log: {} not written: {err}", trace_path().display());
    }
}

/// `test_log!(INFO, "message", key = value, ...)`
#[macro_export]
macro_rules! test_log {
    ($level:ident, $msg:expr $(, $key:ident = $val:expr )* $(,)?) => {{
        let fields = vec![ $( (stringify!($key), serde_json::json!($val)), )* ];
        $crate::test_log::record(stringify!($level), &$msg.to_string(), file!(), line!(), &fields);
    }};
}

/// `assert_eq!` that also leaves an ERROR trace line on mismatch.
#[macro_export]
macro_rules! test_assert_eq {
    ($expected:expr, $actual:expr, $msg:expr $(, $key:ident = $val:expr )* $(,)?) => {{
        let (expected, actual) = (&$expected, &$actual);
        if expected != actual {
            let fields = vec![
                ("expected", serde_json::json!(format!("{:?}", expected))),
                ("actual", serde_json::json!(format!("{:?}", actual))),
                $( (stringify!($key), serde_json::json!($val)), )*
            ];
            $crate::test_log::record("ERROR", $msg, file!(), line!(), &fields);
            panic!("assertion failed: {} (expected: {:?}, actual: {:?})", $msg, expected, actual);
        }
    }};
}
