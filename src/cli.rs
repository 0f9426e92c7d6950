//! Command-line parsing: `<pandafile> <entrypoint> [-- <args>...]` plus a GC flag table,
//! producing a [`RuntimeBuilder`][crate::runtime::RuntimeBuilder] ready to
//! build. A handful of flags in that table (`--signal-catcher`, `--sigquit`, `--mobile-log`,
//! ...) belong to the rest of the runtime, not the GC core; this parser accepts and discards
//! them rather than rejecting them as unknown, so invoking the same command line against the
//! full system or just this core behaves the same.

use crate::runtime::RuntimeBuilder;

/// Flags this core recognizes but has nothing to do with (owned by the interpreter/signal
/// layer of the wider runtime). Accepted for CLI compatibility, otherwise ignored.
const PASSTHROUGH_FLAGS: &[&str] = &[
    "compiler-nullcheck",
    "signal-catcher",
    "signal-handler",
    "sigquit",
    "sigusr1",
    "sigusr2",
    "mobile-log",
    "dfx-log",
];

#[derive(Debug)]
pub struct ParsedArgs {
    pub pandafile: String,
    pub entrypoint: String,
    pub program_args: Vec<String>,
}

#[derive(Debug)]
pub enum CliError {
    /// Missing positional argument, unrecognized flag, or a value that failed validation.
    Usage(String),
}

impl std::fmt::Display for CliError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CliError::Usage(msg) => write!(f, "usage error: {msg}"),
        }
    }
}

/// Parse `argv` (excluding `argv[0]`) into a [`RuntimeBuilder`] plus the positional
/// pandafile/entrypoint/program-args triple. Options may appear in any position relative to
/// the positionals; everything after a bare `--` is collected as program arguments.
pub fn parse(args: &[String]) -> Result<(RuntimeBuilder, ParsedArgs), CliError> {
    let mut builder = RuntimeBuilder::new();
    let mut positionals = Vec::new();
    let mut program_args = Vec::new();
    let mut iter = args.iter().peekable();

    while let Some(arg) = iter.next() {
        if arg == "--" {
            program_args.extend(iter.by_ref().cloned());
            break;
        }
        let Some(flag) = arg.strip_prefix("--") else {
            positionals.push(arg.clone());
            continue;
        };

        let (dash_key, inline_value) = match flag.split_once('=') {
            Some((k, v)) => (k, Some(v.to_string())),
            None => (flag, None),
        };
        let key = dash_key.replace('-', "_");

        if PASSTHROUGH_FLAGS.contains(&dash_key) {
            if inline_value.is_none() {
                // These flags take a following 0/1 value per §6; consume it if present so it
                // isn't mistaken for the next positional.
                if let Some(next) = iter.peek() {
                    if next.parse::<u8>().is_ok() {
                        iter.next();
                    }
                }
            }
            continue;
        }

        let value = match inline_value {
            Some(v) => v,
            None => match flag {
                "no-async-jit" | "run-gc-in-place" | "pre-gc-heap-verification" | "post-gc-heap-verification"
                | "fail-on-heap-verification" | "print-memory-statistics" | "print-gc-statistics" => "true".to_string(),
                _ => iter
                    .next()
                    .ok_or_else(|| CliError::Usage(format!("--{flag} requires a value")))?
                    .clone(),
            },
        };

        if !builder.options_mut().set_from_command_line(&key, &value) {
            return Err(CliError::Usage(format!("invalid value for --{flag}: {value:?}")));
        }
    }

    if positionals.len() < 2 {
        return Err(CliError::Usage("expected <pandafile> <entrypoint>".to_string()));
    }
    let mut positionals = positionals.into_iter();
    let pandafile = positionals.next().unwrap();
    let entrypoint = positionals.next().unwrap();
    program_args.extend(positionals);

    Ok((builder, ParsedArgs { pandafile, entrypoint, program_args }))
}
