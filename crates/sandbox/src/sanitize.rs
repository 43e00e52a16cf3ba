// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Error-text sanitization.
//!
//! Tracebacks from the wrapper leak absolute host paths (temp dirs, home
//! directories). Rewrite them to `<sandbox>/<basename>` before anything
//! reaches a client, keeping `:line` suffixes intact.

use std::sync::OnceLock;

use regex::Regex;

static HOST_PATH: OnceLock<Option<Regex>> = OnceLock::new();

/// Replace absolute host paths under `/tmp`, `/var`, `/Users/<name>` and
/// `/home/<name>` with `<sandbox>/<basename>`.
pub fn sanitize_stderr(text: &str) -> String {
    let re = HOST_PATH.get_or_init(|| {
        Regex::new(
            r#"(?:/tmp|/var|/private/var|/Users/[^/\s:'"]+|/home/[^/\s:'"]+)(?:/[^/\s:'"]+)*/([^/\s:'"]+)"#,
        )
        .ok()
    });
    match re {
        Some(re) => re.replace_all(text, "<sandbox>/$1").into_owned(),
        None => text.to_owned(),
    }
}

#[cfg(test)]
#[path = "sanitize_tests.rs"]
mod tests;
