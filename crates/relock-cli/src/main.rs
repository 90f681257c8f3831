#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::needless_pass_by_value)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::too_many_lines)]

mod commands;
mod logging;

use clap::Parser;
use miette::Result;
use relock_core::pkg::Format;
use relock_core::{Config, FormatOptions};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "relock")]
#[command(author, version, about = "Convert between npm and yarn lockfiles", long_about = None)]
struct Cli {
    /// Increase logging verbosity (-v for DEBUG, -vv for TRACE)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Emit JSON formatted output (stable, machine-readable)
    #[arg(long, global = true)]
    json: bool,

    /// Override the working directory
    #[arg(long, global = true, value_name = "PATH")]
    cwd: Option<PathBuf>,

    /// Dump intermediate snapshot, tree and placement JSON into this directory
    #[arg(long, global = true, env = "RELOCK_DEBUG_DIR", value_name = "PATH")]
    debug_dir: Option<PathBuf>,

    /// Refuse lockfiles with more records than this
    #[arg(long, global = true, env = "RELOCK_MAX_ENTRIES", value_name = "N")]
    max_entries: Option<usize>,

    #[command(subcommand)]
    command: Option<Commands>,
}

/// Knobs for emitted lockfile text.
#[derive(clap::Args, Debug, Clone)]
struct EmitArgs {
    /// Target dialect: npm-1, npm-2, npm-3, yarn-classic, yarn-berry
    #[arg(short, long, value_name = "FORMAT")]
    format: Format,

    /// Registry written into npm `resolved` URLs
    #[arg(long, value_name = "URL", default_value = relock_core::config::NPM_REGISTRY)]
    npm_registry: String,

    /// Registry written into yarn-classic `resolved` URLs
    #[arg(long, value_name = "URL", default_value = relock_core::config::YARN_REGISTRY)]
    yarn_registry: String,

    /// `__metadata.version` of yarn-berry output
    #[arg(long, value_name = "N", default_value_t = 6)]
    berry_version: u32,

    /// `__metadata.cacheKey` of yarn-berry output
    #[arg(long, value_name = "KEY", default_value = "8")]
    berry_cache_key: String,
}

impl EmitArgs {
    fn options(&self) -> FormatOptions {
        FormatOptions {
            npm_registry: self.npm_registry.trim_end_matches('/').to_string(),
            yarn_registry: self.yarn_registry.trim_end_matches('/').to_string(),
            berry_metadata_version: self.berry_version,
            berry_cache_key: self.berry_cache_key.clone(),
        }
    }
}

#[derive(clap::Subcommand, Debug)]
enum Commands {
    /// Print version information
    Version,

    /// Read a lockfile into snapshot JSON
    Parse {
        /// Lockfile path or glob
        input: String,

        /// The project's package.json (defaults to one next to the lockfile)
        manifest: Option<String>,

        /// Read the input as this dialect instead of detecting it
        #[arg(long, value_name = "FORMAT")]
        from: Option<Format>,

        /// Write to this file instead of stdout
        #[arg(short, long, value_name = "PATH")]
        output: Option<PathBuf>,
    },

    /// Write a lockfile from snapshot JSON
    Format {
        /// Snapshot JSON written by `relock parse`
        snapshot: String,

        #[command(flatten)]
        emit: EmitArgs,

        /// Write to this file instead of stdout
        #[arg(short, long, value_name = "PATH")]
        output: Option<PathBuf>,
    },

    /// Convert a lockfile to another dialect
    Convert {
        /// Lockfile path or glob
        input: String,

        /// The project's package.json (defaults to one next to the lockfile)
        manifest: Option<String>,

        /// Read the input as this dialect instead of detecting it
        #[arg(long, value_name = "FORMAT")]
        from: Option<Format>,

        #[command(flatten)]
        emit: EmitArgs,

        /// Write to this file instead of stdout
        #[arg(short, long, value_name = "PATH")]
        output: Option<PathBuf>,
    },

    /// Summarize the resolved dependency graph and hoisted layout
    Graph {
        /// Lockfile path or glob
        input: String,

        /// The project's package.json (defaults to one next to the lockfile)
        manifest: Option<String>,

        /// Read the input as this dialect instead of detecting it
        #[arg(long, value_name = "FORMAT")]
        from: Option<Format>,

        /// Include the full tree, edges and placement in JSON output
        #[arg(long)]
        full: bool,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Determine working directory
    let cwd = cli
        .cwd
        .or_else(|| std::env::current_dir().ok())
        .unwrap_or_else(|| PathBuf::from("."));

    let config = Config::new(cwd)
        .with_verbosity(cli.verbose)
        .with_json_logs(cli.json)
        .with_debug_dir(cli.debug_dir)
        .with_max_entries(cli.max_entries);

    logging::init(config.verbosity, config.json_logs);

    let Some(command) = cli.command else {
        tracing::info!("relock initialized. Use --help for available commands.");
        return Ok(());
    };

    match command {
        Commands::Version => commands::version::run(cli.json),
        Commands::Parse {
            input,
            manifest,
            from,
            output,
        } => {
            let _span = tracing::info_span!("parse", cmd = "parse", input = %input).entered();
            commands::parse::run(
                &config,
                &commands::Input::new(input, manifest, from),
                output.as_deref(),
                cli.json,
            )
        }
        Commands::Format {
            snapshot,
            emit,
            output,
        } => {
            let _span = tracing::info_span!("format", cmd = "format", target = %emit.format).entered();
            let config = config.with_format(emit.options());
            commands::format::run(&config, &snapshot, emit.format, output.as_deref(), cli.json)
        }
        Commands::Convert {
            input,
            manifest,
            from,
            emit,
            output,
        } => {
            let _span =
                tracing::info_span!("convert", cmd = "convert", input = %input, target = %emit.format)
                    .entered();
            let config = config.with_format(emit.options());
            commands::convert::run(
                &config,
                &commands::Input::new(input, manifest, from),
                emit.format,
                output.as_deref(),
                cli.json,
            )
        }
        Commands::Graph {
            input,
            manifest,
            from,
            full,
        } => {
            let _span = tracing::info_span!("graph", cmd = "graph", input = %input).entered();
            commands::graph::run(
                &config,
                &commands::Input::new(input, manifest, from),
                full,
                cli.json,
            )
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_convert_args() {
        let cli = Cli::try_parse_from([
            "relock",
            "convert",
            "package-lock.json",
            "--format",
            "yarn-berry",
            "--berry-cache-key",
            "10c0",
            "--json",
        ])
        .unwrap();
        assert!(cli.json);
        let Some(Commands::Convert { emit, manifest, .. }) = cli.command else {
            panic!("expected convert");
        };
        assert!(manifest.is_none());
        assert_eq!(emit.format, Format::YarnBerry);
        let opts = emit.options();
        assert_eq!(opts.berry_cache_key, "10c0");
        assert_eq!(opts, FormatOptions {
            berry_cache_key: "10c0".into(),
            ..FormatOptions::default()
        });
    }

    #[test]
    fn test_unknown_format_is_rejected() {
        let err = Cli::try_parse_from(["relock", "convert", "yarn.lock", "--format", "pnpm"]);
        assert!(err.is_err());
    }

    #[test]
    fn test_registry_trailing_slash_trimmed() {
        let cli = Cli::try_parse_from([
            "relock",
            "format",
            "snap.json",
            "-f",
            "npm-3",
            "--npm-registry",
            "https://npm.example.com/",
        ])
        .unwrap();
        let Some(Commands::Format { emit, .. }) = cli.command else {
            panic!("expected format");
        };
        assert_eq!(emit.options().npm_registry, "https://npm.example.com");
    }
}
