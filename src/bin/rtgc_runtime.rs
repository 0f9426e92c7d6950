//! Standalone entry point: `rtgc-runtime <pandafile> <entrypoint> [-- <args>...] [options...]`.
//!
//! This binary only drives the GC core's own lifecycle (attach a main thread, build the
//! runtime, wait for shutdown); it does not load or interpret `pandafile` itself, since
//! bytecode loading/interpretation is out of scope (see `rtgc::lang::LanguageContext`).

use rtgc::cli;
use std::process::ExitCode;

fn main() -> ExitCode {
    let args: Vec<String> = std::env::args().skip(1).collect();

    let (builder, parsed) = match cli::parse(&args) {
        Ok(parsed) => parsed,
        Err(err) => {
            eprintln!("rtgc-runtime: {err}");
            eprintln!("usage: rtgc-runtime <pandafile> <entrypoint> [-- <args>...] [options...]");
            return ExitCode::from(1);
        }
    };

    log::info!("rtgc-runtime: starting {} :: {}", parsed.pandafile, parsed.entrypoint);
    if !parsed.program_args.is_empty() {
        log::info!("rtgc-runtime: program args = {:?}", parsed.program_args);
    }

    let runtime = builder.build();
    let main_thread = match runtime.attach_thread(false) {
        Some(thread) => thread,
        None => {
            eprintln!("rtgc-runtime: failed to attach the main thread");
            return internal_error_code();
        }
    };

    // The embedding interpreter would drive bytecode execution here; this core only owns
    // the GC, so shutdown follows immediately.
    runtime.shutdown(main_thread.id, main_thread.id);

    ExitCode::from(0)
}

/// `-1` as a `u8` exit code, for an internal error (as opposed to a usage error).
fn internal_error_code() -> ExitCode {
    ExitCode::from(255)
}
