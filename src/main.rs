//! # mctp-transport-demo
//!
//! A thin CLI front end over [`mctp_transport::Orchestrator`]: parses a
//! handful of connection/logging flags, wires up logging the way the rest
//! of this crate does, runs one endpoint (server or client) until Ctrl-C,
//! then shuts it down cleanly.
//!
//! This binary exists to exercise the library end-to-end; applications
//! embedding MCTP transport over TCP are expected to depend on the library
//! crate directly and drive `Orchestrator` themselves.

use anyhow::Result;
use clap::Parser;
use mctp_transport::endpoint::Verbosity;
use mctp_transport::{Config, Mode, Orchestrator};
use std::net::Ipv4Addr;
use tracing::info;
use tracing_subscriber::{filter::LevelFilter, prelude::*, Layer};

use mctp_transport::logging::ColorizedFormatter;

/// Command-line arguments for the MCTP transport demo.
#[derive(Parser, Debug)]
#[command(author, version, about = "Userspace MCTP transport over TCP", long_about = None)]
struct Args {
    /// Run as a server (accept connections) rather than a client.
    #[arg(long, default_value_t = true, overrides_with = "client")]
    server: bool,

    /// Run as a client (connect out) rather than a server.
    #[arg(long, default_value_t = false, overrides_with = "server")]
    client: bool,

    /// TCP port to bind (server) or connect to (client).
    #[arg(short, long, default_value_t = mctp_transport::config::DEFAULT_PORT)]
    port: u16,

    /// Address to bind (server mode) or connect to (client mode).
    #[arg(short, long, default_value = "0.0.0.0")]
    address: Ipv4Addr,

    /// Run the pipeline workers in busy-poll mode instead of blocking waits.
    #[arg(long, default_value_t = false)]
    no_blocking_waits: bool,

    /// Verbosity mask forwarded to the endpoint's reported `Verbosity`
    /// (does not affect `tracing` filtering; see `-v`/`--log-file` below).
    #[arg(long, default_value_t = 0)]
    endpoint_verbosity: u32,

    /// Increase tracing verbosity (-v debug, -vv trace).
    #[arg(short = 'v', long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Write detailed logs to this file instead of a daily-rotated default.
    /// Pass "stderr" to send detailed logs to stderr instead of a file.
    #[arg(long)]
    log_file: Option<String>,

    /// Suppress the clean, user-facing stdout log layer.
    #[arg(short, long, default_value_t = false)]
    quiet: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let log_level = match args.verbose {
        0 => LevelFilter::INFO,
        1 => LevelFilter::DEBUG,
        _ => LevelFilter::TRACE,
    };

    let guard;
    let detailed_log_layer;

    if let Some("stderr") = args.log_file.as_deref() {
        detailed_log_layer = tracing_subscriber::fmt::layer().with_writer(std::io::stderr).with_filter(log_level).boxed();
        guard = None;
    } else {
        let file_appender = match args.log_file.as_deref() {
            Some(path_str) => {
                let log_path = std::path::Path::new(path_str);
                let log_dir = log_path.parent().unwrap_or_else(|| std::path::Path::new("."));
                let log_filename = log_path.file_name().unwrap_or_else(|| std::ffi::OsStr::new("mctp-transport.log"));
                tracing_appender::rolling::daily(log_dir, log_filename)
            }
            None => tracing_appender::rolling::daily(".", "mctp-transport.log"),
        };
        let (non_blocking_writer, file_guard) = tracing_appender::non_blocking(file_appender);
        detailed_log_layer = tracing_subscriber::fmt::layer().with_writer(non_blocking_writer).with_ansi(false).with_filter(log_level).boxed();
        guard = Some(file_guard);
    }

    let stdout_log = if !args.quiet {
        Some(tracing_subscriber::fmt::layer().with_writer(std::io::stdout).event_format(ColorizedFormatter).with_filter(log_level))
    } else {
        None
    };

    tracing_subscriber::registry().with(detailed_log_layer).with(stdout_log).init();
    let _log_guard = guard;

    let mode = if args.client { Mode::Client } else { Mode::Server };
    let config = Config {
        port: args.port,
        address: args.address,
        mode,
        use_workers: !args.no_blocking_waits,
        non_blocking_start: false,
        verbosity: Verbosity(args.endpoint_verbosity),
    };

    info!(?mode, port = args.port, address = %args.address, "mctp-transport-demo: starting");

    let orchestrator = Orchestrator::new(config);
    let run_handle = {
        let orchestrator = orchestrator.clone();
        tokio::spawn(async move { orchestrator.run().await })
    };

    tokio::select! {
        res = run_handle => {
            match res {
                Ok(Ok(())) => info!("mctp-transport-demo: connection loop exited"),
                Ok(Err(e)) => tracing::error!(error = %e, "mctp-transport-demo: connection loop failed"),
                Err(e) => tracing::error!(error = %e, "mctp-transport-demo: connection task panicked"),
            }
        }
        _ = tokio::signal::ctrl_c() => {
            info!("mctp-transport-demo: Ctrl-C received, shutting down");
            orchestrator.stop().await;
        }
    }

    info!("mctp-transport-demo: stopped");
    Ok(())
}
