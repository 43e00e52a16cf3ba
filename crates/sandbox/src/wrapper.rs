// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Wrapper program generation and output parsing.
//!
//! Each test case runs a generated Python program that applies resource
//! limits to itself, installs the user code, evaluates the trusted call
//! template, and prints two marker-delimited JSON blocks to stdout. The
//! markers are fresh 256-bit random hex strings per invocation, so user
//! output cannot forge a result record.

use std::fmt::Write as _;

use rand::Rng;
use serde::Deserialize;
use serde_json::Value;

use crate::exec::ResourceLimits;
use crate::report::TestCase;

/// Tokens that must never appear in a call template. The template comes
/// from the trusted catalog, but a compromised or sloppy problem file
/// must not become an injection vector.
const FORBIDDEN_TOKENS: &[&str] =
    &["__", "import", "eval", "exec", "compile", "globals", "__builtins__"];

/// Attribute names a call template may access. Anything else is rejected
/// at catalog load.
const ALLOWED_ATTRS: &[&str] = &["lower", "upper", "strip", "split", "join", "copy", "sort"];

/// Validate a call template from a problem file.
///
/// Accepts a plain call of one function with identifier, literal, and
/// bracket arguments (`twoSum(nums, target)`, `rotate(matrix, 2)`).
/// Rejects forbidden tokens and attribute access outside [`ALLOWED_ATTRS`].
pub fn validate_function_call(call: &str) -> Result<(), String> {
    let trimmed = call.trim();
    if trimmed.is_empty() {
        return Err("empty call template".to_owned());
    }

    for token in FORBIDDEN_TOKENS {
        if trimmed.contains(token) {
            return Err(format!("forbidden token `{token}` in call template"));
        }
    }

    if let Some(bad) = trimmed.chars().find(|c| !is_template_char(*c)) {
        return Err(format!("character `{bad}` is not allowed in call templates"));
    }

    if template_callee(trimmed).is_none() || !trimmed.ends_with(')') {
        return Err("call template is not a single function call".to_owned());
    }

    let attrs = regex::Regex::new(r"\.\s*([A-Za-z_][A-Za-z0-9_]*)").map_err(|e| e.to_string())?;
    for cap in attrs.captures_iter(trimmed) {
        let name = &cap[1];
        if !ALLOWED_ATTRS.contains(&name) {
            return Err(format!("attribute access `.{name}` is not allowed in call templates"));
        }
    }

    Ok(())
}

/// Characters a call template may contain: identifiers, literals,
/// brackets, and keyword arguments. Statement separators stay out.
fn is_template_char(c: char) -> bool {
    c.is_ascii_alphanumeric()
        || matches!(
            c,
            '_' | ' ' | '(' | ')' | '[' | ']' | '{' | '}' | ',' | '.' | '\'' | '"' | ':' | '-'
                | '+' | '='
        )
}

/// The leading identifier of a call template (`twoSum(...)` → `twoSum`).
pub fn template_callee(call: &str) -> Option<&str> {
    let trimmed = call.trim();
    let end = trimmed.find('(')?;
    let name = trimmed[..end].trim_end();
    let mut chars = name.chars();
    let first = chars.next()?;
    if !(first.is_ascii_alphabetic() || first == '_') {
        return None;
    }
    if !chars.all(|c| c.is_ascii_alphanumeric() || c == '_') {
        return None;
    }
    Some(name)
}

// -- Markers ------------------------------------------------------------------

/// Random stdout delimiters, fresh per invocation.
#[derive(Debug, Clone)]
pub struct Markers {
    pub result_start: String,
    pub result_end: String,
    pub stdout_start: String,
    pub stdout_end: String,
}

impl Markers {
    pub fn generate() -> Self {
        Self {
            result_start: format!("RESULT_START_{}", random_hex_256()),
            result_end: format!("RESULT_END_{}", random_hex_256()),
            stdout_start: format!("STDOUT_START_{}", random_hex_256()),
            stdout_end: format!("STDOUT_END_{}", random_hex_256()),
        }
    }
}

/// 256 bits of randomness as 64 lowercase hex chars.
fn random_hex_256() -> String {
    let bytes: [u8; 32] = rand::rng().random();
    let mut out = String::with_capacity(64);
    for b in bytes {
        let _ = write!(out, "{b:02x}");
    }
    out
}

// -- Source generation --------------------------------------------------------

/// JSON text with every non-ASCII character escaped, so the result can be
/// embedded in single-line wrapper source (U+2028/U+2029 would otherwise
/// terminate a Python source line).
pub fn ascii_json(value: &Value) -> String {
    let raw = serde_json::to_string(value).unwrap_or_else(|_| "null".to_owned());
    let mut out = String::with_capacity(raw.len());
    for ch in raw.chars() {
        if ch.is_ascii() {
            out.push(ch);
        } else {
            let mut units = [0u16; 2];
            for unit in ch.encode_utf16(&mut units) {
                let _ = write!(out, "\\u{unit:04x}");
            }
        }
    }
    out
}

/// An ASCII Python string literal whose value is `s` (which must itself
/// be ASCII, as produced by [`ascii_json`]).
fn py_str_literal(s: &str) -> String {
    let mut out = String::with_capacity(s.len() + 2);
    out.push('"');
    for ch in s.chars() {
        match ch {
            '\\' => out.push_str("\\\\"),
            '"' => out.push_str("\\\""),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            c if c.is_ascii_graphic() || c == ' ' => out.push(c),
            c => {
                let _ = write!(out, "\\x{:02x}", c as u32);
            }
        }
    }
    out.push('"');
    out
}

/// Generate the wrapper program for one test case.
///
/// The user code and every input value cross into the wrapper as JSON
/// payloads decoded with `json.loads`; the only verbatim splice is the
/// pre-validated call template.
pub fn generate(code: &str, case: &TestCase, limits: &ResourceLimits, markers: &Markers) -> String {
    let code_literal = py_str_literal(&ascii_json(&Value::String(code.to_owned())));

    let mut bindings = String::new();
    for (name, value) in &case.input {
        let _ = writeln!(bindings, "{name} = json.loads({})", py_str_literal(&ascii_json(value)));
    }

    format!(
        r#"import io
import json
import resource
import sys
import time
import traceback


def _apply_limits():
    mem = {mem}
    try:
        resource.setrlimit(resource.RLIMIT_AS, (mem, mem))
    except (ValueError, OSError):
        # Some platforms ignore or reject RLIMIT_AS; cap the resident set.
        try:
            resource.setrlimit(resource.RLIMIT_RSS, (mem, mem))
        except (ValueError, OSError):
            pass
    resource.setrlimit(resource.RLIMIT_CPU, ({cpu}, {cpu}))
    try:
        resource.setrlimit(resource.RLIMIT_NOFILE, ({nofile}, {nofile}))
    except (ValueError, OSError):
        pass
    resource.setrlimit(resource.RLIMIT_FSIZE, ({fsize}, {fsize}))
    if hasattr(resource, "RLIMIT_NPROC"):
        # Per-UID on most platforms; best effort.
        try:
            resource.setrlimit(resource.RLIMIT_NPROC, ({nproc}, {nproc}))
        except (ValueError, OSError):
            pass


_apply_limits()

_user_code = json.loads({code_literal})
{bindings}
_record = {{}}
_captured = io.StringIO()
_real_stdout = sys.stdout
sys.stdout = _captured
try:
    exec(compile(_user_code, "solution.py", "exec"), globals())
    _t0 = time.perf_counter()
    _actual = {call}
    _elapsed_ms = (time.perf_counter() - _t0) * 1000.0
    try:
        _record = {{"actual": json.loads(json.dumps(_actual)), "runtime_ms": _elapsed_ms}}
    except (TypeError, ValueError):
        _record = {{"error": "return value of type %s is not JSON-serializable" % type(_actual).__name__}}
except BaseException:
    _record = {{"error": traceback.format_exc(limit=16)}}
finally:
    sys.stdout = _real_stdout

print({result_start})
print(json.dumps(_record))
print({result_end})
print({stdout_start})
sys.stdout.write(_captured.getvalue())
if not _captured.getvalue().endswith("\n") and _captured.getvalue():
    sys.stdout.write("\n")
print({stdout_end})
"#,
        mem = limits.memory_bytes,
        cpu = limits.cpu_seconds,
        nofile = limits.max_open_files,
        fsize = limits.max_file_bytes,
        nproc = limits.max_processes,
        code_literal = code_literal,
        bindings = bindings,
        call = case.function_call.trim(),
        result_start = py_str_literal(&markers.result_start),
        result_end = py_str_literal(&markers.result_end),
        stdout_start = py_str_literal(&markers.stdout_start),
        stdout_end = py_str_literal(&markers.stdout_end),
    )
}

// -- Output parsing -----------------------------------------------------------

/// The JSON record the wrapper prints between the result markers.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct WrapperRecord {
    #[serde(default)]
    pub actual: Option<Value>,
    #[serde(default)]
    pub error: Option<String>,
    #[serde(default)]
    pub runtime_ms: Option<f64>,
}

/// Parsed child stdout: the structured record (if the markers were found
/// and the block was valid JSON) plus everything the user code printed.
#[derive(Debug, Default)]
pub struct ParsedOutput {
    /// `None` when the result markers never appeared; `Some(Err(..))`
    /// when the block between them was not valid JSON.
    pub record: Option<Result<WrapperRecord, String>>,
    pub stdout: String,
}

/// Split child stdout on the invocation's markers.
///
/// Lines inside the STDOUT pair and lines outside every pair both count
/// as user stdout; interpreter-level redirection catches Python prints,
/// the outside-markers rule catches writes that bypass `sys.stdout`.
pub fn parse_output(raw: &str, markers: &Markers) -> ParsedOutput {
    #[derive(PartialEq)]
    enum Zone {
        Outside,
        Result,
        Stdout,
    }

    let mut zone = Zone::Outside;
    let mut result_buf = String::new();
    let mut stdout_buf = String::new();
    let mut saw_result = false;

    for line in raw.lines() {
        match zone {
            Zone::Outside => {
                if line == markers.result_start {
                    zone = Zone::Result;
                    saw_result = true;
                } else if line == markers.stdout_start {
                    zone = Zone::Stdout;
                } else {
                    stdout_buf.push_str(line);
                    stdout_buf.push('\n');
                }
            }
            Zone::Result => {
                if line == markers.result_end {
                    zone = Zone::Outside;
                } else {
                    result_buf.push_str(line);
                    result_buf.push('\n');
                }
            }
            Zone::Stdout => {
                if line == markers.stdout_end {
                    zone = Zone::Outside;
                } else {
                    stdout_buf.push_str(line);
                    stdout_buf.push('\n');
                }
            }
        }
    }

    let record = saw_result.then(|| {
        serde_json::from_str::<WrapperRecord>(result_buf.trim())
            .map_err(|e| format!("bad result record: {e}"))
    });

    ParsedOutput { record, stdout: stdout_buf }
}

#[cfg(test)]
#[path = "wrapper_tests.rs"]
mod tests;
