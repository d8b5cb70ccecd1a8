//! duploctl `--help` parsing.
//!
//! Pure text parsing plus one I/O helper, [`run_help`]. duploctl builds its
//! parsers with Python's argparse, so the layout is argparse's: a `usage:`
//! block, free-text description paragraphs, then sections such as
//! `positional arguments:` and `options:` with two-space indented entries.

use std::collections::HashMap;
use std::sync::LazyLock;
use std::time::Duration;

use regex::Regex;
use tokio::process::Command;

use crate::catalog::{ArgKind, ArgSpec, CommandSpec};
use crate::error::DuploMcpError;

/// Entries that are never resource commands.
const NOISE_COMMANDS: &[&str] = &["help", "version", "completion", "completions"];

/// argparse choice list: `{list,find,create}`.
static CHOICE_LIST: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\{([A-Za-z][A-Za-z0-9_-]*(?:,[A-Za-z][A-Za-z0-9_-]*)*)\}").expect("valid regex")
});

/// Section headers (case-insensitive) that introduce command lists.
const COMMAND_SECTIONS: &[&str] = &[
    "commands",
    "available commands",
    "subcommands",
    "positional arguments",
];

/// Flags every argparse parser carries.
const SKIPPED_FLAGS: &[&str] = &["-h", "--help"];

/// Run `command [prefix...] --help` and return the help text.
///
/// Reads stdout, falling back to stderr when stdout is empty.
pub async fn run_help(command: &str, prefix: &[String], timeout: Duration) -> crate::Result<String> {
    let target = help_target(command, prefix);
    let mut cmd = Command::new(command);
    cmd.args(prefix);
    cmd.arg("--help");
    cmd.stdin(std::process::Stdio::null());
    cmd.stdout(std::process::Stdio::piped());
    cmd.stderr(std::process::Stdio::piped());
    cmd.kill_on_drop(true);

    let output = match tokio::time::timeout(timeout, cmd.output()).await {
        Ok(result) => {
            result.map_err(|e| DuploMcpError::HelpParseFailed(target.clone(), e.to_string()))?
        }
        Err(_elapsed) => return Err(DuploMcpError::HelpTimeout(target)),
    };

    let stdout = String::from_utf8_lossy(&output.stdout);
    if stdout.trim().is_empty() {
        Ok(String::from_utf8_lossy(&output.stderr).into_owned())
    } else {
        Ok(stdout.into_owned())
    }
}

fn help_target(command: &str, prefix: &[String]) -> String {
    std::iter::once(command)
        .chain(prefix.iter().map(String::as_str))
        .collect::<Vec<_>>()
        .join(" ")
}

/// Command names from a resource's `--help` text.
///
/// An argparse choice list (`{list,find,create}`) wins; otherwise indented
/// entries under a commands section are collected.
pub fn parse_command_names(help_text: &str) -> Vec<String> {
    let choices = parse_choice_list(help_text);
    if !choices.is_empty() {
        return choices;
    }

    let mut results: Vec<String> = Vec::new();
    let mut in_section = false;

    for line in help_text.lines() {
        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }

        if is_section_header(line, trimmed, COMMAND_SECTIONS) {
            in_section = true;
            continue;
        }

        if !line.starts_with(' ') && !line.starts_with('\t') {
            in_section = false;
            continue;
        }

        if !in_section || indent_of(line) < 2 {
            continue;
        }

        let Some(first) = trimmed.split_whitespace().next() else {
            continue;
        };
        let name = first.trim_end_matches(':');
        if name.starts_with('-') || !is_valid_name(name) || NOISE_COMMANDS.contains(&name) {
            continue;
        }
        if !results.iter().any(|r| r == name) {
            results.push(name.to_string());
        }
    }

    results
}

/// First `{a,b,c}` group in the text, in declaration order.
fn parse_choice_list(help_text: &str) -> Vec<String> {
    CHOICE_LIST
        .captures(help_text)
        .and_then(|caps| caps.get(1))
        .map(|m| {
            m.as_str()
                .split(',')
                .filter(|c| !NOISE_COMMANDS.contains(c))
                .map(String::from)
                .collect()
        })
        .unwrap_or_default()
}

/// Parse a command's `--help` text into its docstring and arguments.
///
/// `target` names the command in errors. Text with neither a usage line nor
/// any description is rejected.
pub fn parse_command_help(target: &str, help_text: &str) -> crate::Result<CommandSpec> {
    let lines: Vec<&str> = help_text.lines().collect();
    let mut idx = 0;

    // Usage block: from "usage:" to the first blank line.
    let mut usage = String::new();
    while idx < lines.len() && lines[idx].trim().is_empty() {
        idx += 1;
    }
    if idx < lines.len() && lines[idx].trim_start().to_lowercase().starts_with("usage:") {
        while idx < lines.len() && !lines[idx].trim().is_empty() {
            usage.push_str(lines[idx].trim());
            usage.push(' ');
            idx += 1;
        }
    }

    // Description paragraphs until the first section header.
    let mut doc_lines: Vec<&str> = Vec::new();
    while idx < lines.len() && !is_any_section_header(lines[idx]) {
        doc_lines.push(lines[idx].trim_end());
        idx += 1;
    }
    let doc = doc_lines.join("\n").trim().to_string();

    if usage.is_empty() && doc.is_empty() {
        return Err(DuploMcpError::HelpParseFailed(
            target.to_string(),
            "no usage line or description found in help output".to_string(),
        ));
    }

    let usage_tokens = analyze_usage(&usage);
    let args = parse_argument_entries(&lines[idx..], &usage_tokens);

    Ok(CommandSpec {
        doc: dedent(&doc),
        aliases: Vec::new(),
        args,
        model: None,
    })
}

/// How a name appears in the usage line.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
struct UsageToken {
    /// Appears outside any `[...]`.
    required: bool,
    /// Followed by `...`.
    repeated: bool,
}

fn analyze_usage(usage: &str) -> HashMap<String, UsageToken> {
    let mut tokens: HashMap<String, UsageToken> = HashMap::new();
    let body = match usage.find(':') {
        Some(pos) => &usage[pos + 1..],
        None => usage,
    };

    let mut depth: i32 = 0;
    let mut last: Option<String> = None;
    for raw in body.split_whitespace() {
        let opening = raw.chars().take_while(|c| *c == '[' || *c == '(').count() as i32;
        depth += opening;
        let name = raw.trim_matches(|c| matches!(c, '[' | ']' | '(' | ')' | '|'));

        if name == "..." {
            if let Some(prev) = &last {
                tokens.entry(prev.clone()).or_default().repeated = true;
            }
        } else if !name.is_empty() {
            let entry = tokens.entry(name.to_string()).or_default();
            entry.required |= depth == 0;
            if !name.chars().all(|c| c.is_ascii_uppercase() || c == '_' || c == '-') {
                last = Some(name.to_string());
            }
        }

        let closing = raw
            .chars()
            .rev()
            .take_while(|c| *c == ']' || *c == ')')
            .count() as i32;
        depth = (depth - closing).max(0);
    }
    tokens
}

/// One raw entry from an arguments section.
struct Entry {
    invocation: String,
    help: String,
}

fn parse_argument_entries(lines: &[&str], usage: &HashMap<String, UsageToken>) -> Vec<ArgSpec> {
    let mut entries: Vec<Entry> = Vec::new();
    let mut entry_indent = usize::MAX;

    for line in lines {
        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }
        if is_any_section_header(line) {
            entry_indent = usize::MAX;
            continue;
        }

        let indent = indent_of(line);
        let is_continuation = indent > entry_indent && !entries.is_empty();
        if is_continuation {
            if let Some(last) = entries.last_mut() {
                if !last.help.is_empty() {
                    last.help.push(' ');
                }
                last.help.push_str(trimmed);
            }
            continue;
        }

        entry_indent = indent;
        let (invocation, help) = match trimmed.find("  ") {
            Some(pos) => (&trimmed[..pos], trimmed[pos..].trim()),
            None => (trimmed, ""),
        };
        entries.push(Entry {
            invocation: invocation.to_string(),
            help: help.to_string(),
        });
    }

    entries
        .into_iter()
        .filter_map(|entry| entry_to_arg(entry, usage))
        .collect()
}

fn entry_to_arg(entry: Entry, usage: &HashMap<String, UsageToken>) -> Option<ArgSpec> {
    let default = extract_default(&entry.help);
    if entry.invocation.starts_with('-') {
        option_to_arg(entry, usage, default)
    } else {
        positional_to_arg(entry, usage, default)
    }
}

fn option_to_arg(
    entry: Entry,
    usage: &HashMap<String, UsageToken>,
    default: Option<serde_json::Value>,
) -> Option<ArgSpec> {
    let mut flags = Vec::new();
    let mut metavar: Option<String> = None;
    for part in entry.invocation.split(", ") {
        let mut words = part.splitn(2, ' ');
        let Some(flag) = words.next() else {
            continue;
        };
        flags.push(flag.to_string());
        if metavar.is_none() {
            metavar = words.next().map(|m| m.trim().to_string()).filter(|m| !m.is_empty());
        }
    }
    if flags.is_empty() || flags.iter().any(|f| SKIPPED_FLAGS.contains(&f.as_str())) {
        return None;
    }

    let long = flags
        .iter()
        .find(|f| f.starts_with("--"))
        .or_else(|| flags.first())?;
    let name = long.trim_start_matches('-').replace('-', "_");
    let required = flags
        .iter()
        .any(|f| usage.get(f).map(|t| t.required).unwrap_or(false));

    let mut arg = ArgSpec {
        name,
        flags,
        help: entry.help,
        default,
        required,
        ..Default::default()
    };

    match metavar {
        None => {
            arg.kind = ArgKind::Boolean;
            arg.required = false;
        }
        Some(m) if m.contains("...") => arg.kind = ArgKind::List,
        Some(m) if m.starts_with('{') => {
            arg.choices = split_choices(&m);
        }
        Some(m) if arg.name == "file" || m == "FILE" => {
            // duploctl reads request bodies through `-f/--file`.
            arg.kind = ArgKind::File;
            arg.dest = Some("body".to_string());
        }
        Some(_) => {}
    }
    Some(arg)
}

fn positional_to_arg(
    entry: Entry,
    usage: &HashMap<String, UsageToken>,
    default: Option<serde_json::Value>,
) -> Option<ArgSpec> {
    let name = entry.invocation.split_whitespace().next()?.to_string();
    if name.starts_with('{') || !is_valid_name(&name) {
        return None;
    }
    let token = usage.get(&name).copied().unwrap_or(UsageToken {
        required: true,
        repeated: false,
    });
    Some(ArgSpec {
        name,
        kind: if token.repeated {
            ArgKind::List
        } else {
            ArgKind::String
        },
        help: entry.help,
        required: token.required && default.is_none(),
        default,
        ..Default::default()
    })
}

fn split_choices(metavar: &str) -> Vec<String> {
    metavar
        .trim_start_matches('{')
        .split('}')
        .next()
        .unwrap_or("")
        .split(',')
        .filter(|c| !c.is_empty())
        .map(String::from)
        .collect()
}

/// `(default: X)` in argparse help text, as JSON when it parses.
fn extract_default(help: &str) -> Option<serde_json::Value> {
    let start = help.find("(default: ")? + "(default: ".len();
    let end = help[start..].find(')')? + start;
    let raw = help[start..end].trim();
    if raw.is_empty() || raw == "None" {
        return None;
    }
    let value = match raw {
        "True" => serde_json::Value::Bool(true),
        "False" => serde_json::Value::Bool(false),
        _ => serde_json::from_str(raw)
            .unwrap_or_else(|_| serde_json::Value::String(raw.to_string())),
    };
    Some(value)
}

fn is_section_header(raw_line: &str, trimmed: &str, headers: &[&str]) -> bool {
    if indent_of(raw_line) > 1 {
        return false;
    }
    let lower = trimmed.trim_end_matches(':').to_lowercase();
    headers.iter().any(|h| lower == *h)
}

/// Zero-indent line ending with `:` (argparse group titles).
fn is_any_section_header(line: &str) -> bool {
    let trimmed = line.trim_end();
    indent_of(line) == 0 && trimmed.ends_with(':') && !trimmed.to_lowercase().starts_with("usage:")
}

fn indent_of(line: &str) -> usize {
    line.len() - line.trim_start().len()
}

fn is_valid_name(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(first) if first.is_ascii_alphabetic() => {
            chars.all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
        }
        _ => false,
    }
}

/// Strip the common leading indentation of non-empty lines.
fn dedent(text: &str) -> String {
    let min_indent = text
        .lines()
        .filter(|l| !l.trim().is_empty())
        .map(indent_of)
        .min()
        .unwrap_or(0);
    text.lines()
        .map(|l| if l.len() >= min_indent { &l[min_indent..] } else { l.trim_start() })
        .collect::<Vec<_>>()
        .join("\n")
}
