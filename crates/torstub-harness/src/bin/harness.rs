//! CLI entrypoint for the torstub harness.

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use serde::Serialize;
use torstub_harness::structured_log::LogEmitter;
use torstub_harness::{HarnessError, probe, verify};

/// Inspection and verification tooling for torstub.
#[derive(Debug, Parser)]
#[command(name = "torstub-harness")]
#[command(about = "Probe and verify the torstub interposer's decisions")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Show how `connect()` would route a destination port.
    Route {
        /// Destination port (host byte order).
        #[arg(long)]
        port: u16,
        /// Address family: `inet`, `inet6`, `local`, or a number.
        #[arg(long, default_value = "inet")]
        family: String,
        /// Address length passed to `connect()`.
        #[arg(long, default_value_t = 16)]
        addr_len: usize,
    },
    /// Show which domain `socket()` would actually request.
    Socket {
        /// Requested domain: `inet`, `inet6`, `local`, or a number.
        #[arg(long)]
        domain: String,
    },
    /// Parse the socket variables from the current environment.
    ///
    /// Reads the environment directly. The stub itself sees nothing in a
    /// setuid/setgid (`AT_SECURE`) process, so a report here does not mean
    /// such a process would start.
    Config,
    /// Evaluate the initial-thread stack base estimate.
    StackEstimate {
        /// Address of the environment block (hex with 0x, or decimal).
        #[arg(long)]
        environ: String,
        /// Stack size in bytes.
        #[arg(long)]
        size: usize,
        /// Address known to be on the stack (hex with 0x, or decimal).
        #[arg(long)]
        probe: String,
        /// Page size.
        #[arg(long, default_value_t = 4096)]
        page: usize,
    },
    /// Run the behavioral property suite and emit JSONL results.
    Verify {
        /// Output JSONL path (if omitted, prints to stdout).
        #[arg(long)]
        log: Option<PathBuf>,
    },
}

fn print_json<T: Serialize>(value: &T) -> Result<(), HarnessError> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn run(cli: Cli) -> Result<(), HarnessError> {
    match cli.command {
        Command::Route {
            port,
            family,
            addr_len,
        } => {
            let family = probe::parse_family(&family)?;
            print_json(&probe::probe_route(family, port, addr_len))
        }
        Command::Socket { domain } => {
            let domain = probe::parse_family(&domain)?;
            print_json(&probe::probe_socket(domain))
        }
        Command::Config => {
            let report = probe::probe_config(|key| std::env::var_os(key))?;
            print_json(&report)
        }
        Command::StackEstimate {
            environ,
            size,
            probe: probe_addr,
            page,
        } => {
            let environ = probe::parse_address(&environ)?;
            let probe_addr = probe::parse_address(&probe_addr)?;
            print_json(&probe::probe_stack_estimate(environ, size, probe_addr, page))
        }
        Command::Verify { log } => {
            let results = verify::run_suite();
            let run_id = format!("verify-{}", std::process::id());
            match log {
                Some(path) => {
                    let mut emitter = LogEmitter::to_file(&path, &run_id)?;
                    verify::emit_results(&results, &mut emitter)?;
                    eprintln!("Wrote {} results to {}", results.len(), path.display());
                }
                None => {
                    let mut emitter = LogEmitter::new(std::io::stdout().lock(), &run_id);
                    verify::emit_results(&results, &mut emitter)?;
                }
            }
            verify::require_all_passed(&results)
        }
    }
}

fn main() {
    if let Err(err) = run(Cli::parse()) {
        eprintln!("torstub-harness: {err}");
        std::process::exit(1);
    }
}
