// src/config/cli.rs
use clap::{CommandFactory, Parser};
use std::ffi::OsString;
use std::path::PathBuf;

/// Command line flags. Every flag is optional so that unset flags fall
/// through to the config file, the environment and then the defaults.
///
/// Single-dash spellings (`-varnish.port=6082`, `-debug`) are accepted as
/// aliases of the double-dash ones when parsed through [`Cli::parse_args`].
#[derive(Debug, Default, Parser)]
#[command(
    name = "varnish-backend-exporter",
    version,
    about = "Prometheus exporter for Varnish backend health"
)]
pub struct Cli {
    /// Optional config file (YAML, JSON or TOML)
    #[arg(long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Address to listen on for web interface and telemetry
    #[arg(long = "web.listen-address", value_name = "ADDR")]
    pub listen_address: Option<String>,

    /// Path under which to expose metrics
    #[arg(long = "web.telemetry-path", value_name = "PATH")]
    pub telemetry_path: Option<String>,

    /// Port of Varnish to connect to
    #[arg(long = "varnish.port", value_name = "PORT")]
    pub port: Option<u16>,

    /// Filename of varnish secret file
    #[arg(long = "varnish.secret", value_name = "FILE")]
    pub secret: Option<PathBuf>,

    /// Varnish checking interval in seconds
    #[arg(long = "varnish.interval", value_name = "SECS")]
    pub interval: Option<u64>,

    /// Regular expression extracting director name from backend name
    #[arg(long = "directorre", value_name = "REGEX")]
    pub director_regex: Option<String>,

    /// Reset the backends list after each scan
    #[arg(long = "varnish.reset")]
    pub reset: bool,

    /// Drop backend lines with fewer than three columns instead of counting them as sick
    #[arg(long = "varnish.strict-listing")]
    pub strict_listing: bool,

    /// Print debugging information
    #[arg(long)]
    pub debug: bool,
}

impl Cli {
    /// Parses the process arguments after [`normalize_single_dash_flags`].
    pub fn parse_args() -> Self {
        Self::parse_from(normalize_single_dash_flags(std::env::args_os()))
    }
}

/// Rewrites `-name` and `-name=value` to `--name...` when `name` is one of
/// our long flags. Everything after a bare `--` is left alone, as are short
/// flags and values that do not name a flag.
pub fn normalize_single_dash_flags<I, T>(args: I) -> Vec<OsString>
where
    I: IntoIterator<Item = T>,
    T: Into<OsString>,
{
    let command = Cli::command();
    let is_long_flag = |name: &str| {
        name == "help"
            || name == "version"
            || command.get_arguments().any(|arg| arg.get_long() == Some(name))
    };

    let mut passthrough = false;
    args.into_iter()
        .map(|arg| {
            let arg: OsString = arg.into();
            if passthrough {
                return arg;
            }
            let Some(text) = arg.to_str() else {
                return arg;
            };
            if text == "--" {
                passthrough = true;
                return arg;
            }
            match text.strip_prefix('-') {
                Some(rest) if !rest.starts_with('-') => {
                    let name = rest.split_once('=').map_or(rest, |(name, _)| name);
                    if is_long_flag(name) {
                        OsString::from(format!("-{}", text))
                    } else {
                        arg
                    }
                }
                _ => arg,
            }
        })
        .collect()
}
