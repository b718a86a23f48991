//! Script line parsing: tokenizer, statement classifier, loop resolver.
//!
//! Scripts are UTF-8 text, one statement per line. `#` starts a whole-line
//! comment, `t<number>` and `l<integer>` are case-insensitive special forms,
//! `n` closes the innermost open loop, and everything else is a tokenized
//! command. The special-form matching is prefix-based, so `t5 trailing junk`
//! still classifies as a five-second timer,
//! while a bare `t` falls through to command classification and later fails
//! dispatch loudly instead of being silently swallowed.

use crate::error::{EngineError, EngineResult};
use once_cell::sync::Lazy;
use regex::Regex;

static TIMER_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[tT]([0-9.]+)").expect("timer regex is valid"));

static LOOP_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[lL]([0-9]+)").expect("loop regex is valid"));

// Quoted substrings are single tokens (quotes stripped); otherwise runs of
// non-whitespace, non-comma characters. No escaping of embedded quotes.
static TOKEN_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#""([^"]+)"|([^\s,]+)"#).expect("token regex is valid"));

/// One classified script line. Derived per line, never persisted.
#[derive(Debug, Clone, PartialEq)]
pub enum Statement {
    Comment,
    Blank,
    /// Suspend the flow for this many seconds.
    Timer(f64),
    /// Repeat the enclosed block this many times.
    LoopStart(u32),
    LoopEnd,
    Command { name: String, args: Vec<String> },
}

/// Splits a line into tokens, honoring double-quoted multi-word arguments.
pub fn tokenize(line: &str) -> Vec<String> {
    TOKEN_RE
        .captures_iter(line)
        .filter_map(|caps| {
            caps.get(1)
                .or_else(|| caps.get(2))
                .map(|m| m.as_str().to_string())
        })
        .collect()
}

/// Classifies a raw script line.
pub fn classify(line: &str) -> Statement {
    let line = line.trim();
    if line.is_empty() {
        return Statement::Blank;
    }
    if line.starts_with('#') {
        return Statement::Comment;
    }
    if line.eq_ignore_ascii_case("n") {
        return Statement::LoopEnd;
    }
    if let Some(caps) = TIMER_RE.captures(line) {
        // A capture like "1.2.3" fails the parse and falls through.
        if let Ok(seconds) = caps[1].parse::<f64>() {
            return Statement::Timer(seconds);
        }
    }
    if let Some(caps) = LOOP_RE.captures(line) {
        if let Ok(count) = caps[1].parse::<u32>() {
            return Statement::LoopStart(count);
        }
    }
    let mut tokens = tokenize(line);
    if tokens.is_empty() {
        return Statement::Blank;
    }
    let name = tokens.remove(0);
    Statement::Command { name, args: tokens }
}

/// Finds the `n` matching the `l` at `start`, using depth-counted bracket
/// matching over nested loops. Returns the index of the matching `n`.
pub fn find_loop_end(lines: &[String], start: usize) -> EngineResult<usize> {
    let mut depth = 0usize;
    for (index, line) in lines.iter().enumerate().skip(start + 1) {
        match classify(line) {
            Statement::LoopStart(_) => depth += 1,
            Statement::LoopEnd => {
                if depth == 0 {
                    return Ok(index);
                }
                depth -= 1;
            }
            _ => {}
        }
    }
    Err(EngineError::LoopSyntax)
}
