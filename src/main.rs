//! ip2as - resolve an IP address or CIDR block to its announcing AS.
//!
//! This is the command-line interface for the ip2as library.

#![allow(clippy::uninlined_format_args)]

use anyhow::Result;
use clap::Parser;
use ip2as::{AsnMatch, Ip2As, Ip2AsConfigBuilder};
use log::LevelFilter;
use std::io::Write;
use std::path::PathBuf;

/// A prefix covered the query
const EXIT_FOUND: i32 = 0;
/// The query did not parse or no prefix covers it
const EXIT_NOT_FOUND: i32 = 1;
/// Fetching, building or loading the database failed
const EXIT_ERROR: i32 = 2;

/// Get the version string for ip2as
fn get_version() -> &'static str {
    if cfg!(debug_assertions) {
        concat!(env!("CARGO_PKG_VERSION"), "-UNRELEASED")
    } else {
        env!("CARGO_PKG_VERSION")
    }
}

/// Command-line arguments for the IP-to-AS lookup tool.
#[derive(Parser, Debug)]
#[clap(
    author,
    version = get_version(),
    about = "Resolve an IP address or CIDR block to its Autonomous System",
    long_about = None
)]
struct Args {
    /// IP address or CIDR block to resolve
    target: String,

    /// Rebuild the prefix database even if the cached copy is fresh
    #[clap(long)]
    force_update: bool,

    /// Output the result in JSON format
    #[clap(long)]
    json: bool,

    /// Directory holding the cached prefix database
    #[clap(long, env = "IP2AS_DATA_DIR")]
    data_dir: Option<PathBuf>,

    /// Enable verbose logging (use -vv for trace output)
    #[clap(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

/// JSON output for a successful lookup
#[derive(Debug, serde::Serialize)]
struct JsonMatch<'a> {
    ip: &'a str,
    #[serde(flatten)]
    found: &'a AsnMatch,
}

/// JSON output when no AS covers the query
#[derive(Debug, serde::Serialize)]
struct JsonNotFound<'a> {
    ip: &'a str,
    error: &'static str,
}

fn main() {
    let args = Args::parse();
    init_logging(args.verbose);

    // Create single-threaded tokio runtime for lower overhead
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .expect("Failed to create Tokio runtime");

    match runtime.block_on(async_main(args)) {
        Ok(code) => std::process::exit(code),
        Err(e) => {
            eprintln!("Error: {}", e);
            std::process::exit(EXIT_ERROR);
        }
    }
}

/// Log level for the given number of `-v` flags
fn log_level(verbose: u8) -> LevelFilter {
    match verbose {
        0 => LevelFilter::Info,
        1 => LevelFilter::Debug,
        _ => LevelFilter::Trace,
    }
}

/// Send library logs to stderr; `RUST_LOG` takes precedence over `-v`
fn init_logging(verbose: u8) {
    let mut builder = env_logger::Builder::new();
    builder.filter_level(log_level(verbose));
    if verbose == 0 {
        // Progress lines read as plain output
        builder.format(|buf, record| writeln!(buf, "{}", record.args()));
    }
    builder.parse_default_env();
    builder.init();
}

async fn async_main(args: Args) -> Result<i32> {
    let mut builder = Ip2AsConfigBuilder::from_env().force_update(args.force_update);
    if let Some(dir) = &args.data_dir {
        builder = builder.data_dir(dir);
    }
    let config = builder.build().map_err(anyhow::Error::msg)?;

    let service = Ip2As::new(config)?;
    let found = service.lookup(&args.target).await?;

    println!("{}", render(&args.target, found.as_ref(), args.json)?);

    Ok(if found.is_some() {
        EXIT_FOUND
    } else {
        EXIT_NOT_FOUND
    })
}

/// Format the lookup outcome for stdout
fn render(query: &str, found: Option<&AsnMatch>, json: bool) -> Result<String> {
    let output = match (found, json) {
        (Some(found), false) => found.to_string(),
        (None, false) => format!("No AS found for {}", query),
        (Some(found), true) => serde_json::to_string_pretty(&JsonMatch { ip: query, found })?,
        (None, true) => serde_json::to_string_pretty(&JsonNotFound {
            ip: query,
            error: "not found",
        })?,
    };
    Ok(output)
}
