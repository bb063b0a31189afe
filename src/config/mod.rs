// src/config/mod.rs
mod cli;
mod models;

pub use cli::Cli;
pub use models::*;

use ::config::{Config as Layers, Environment, File};
use anyhow::{Context, Result};

const ENV_PREFIX: &str = "VARNISH_EXPORTER";

/// Builds the configuration from, lowest precedence first: built-in
/// defaults, the optional `--config` file, `VARNISH_EXPORTER_*` environment
/// variables and command line flags.
pub fn load_config(cli: &Cli) -> Result<Config> {
    let mut builder = Layers::builder()
        .set_default("web.listen_address", DEFAULT_LISTEN_ADDRESS)?
        .set_default("web.telemetry_path", DEFAULT_TELEMETRY_PATH)?
        .set_default("varnish.port", i64::from(DEFAULT_VARNISH_PORT))?
        .set_default("varnish.secret", DEFAULT_SECRET_PATH)?
        .set_default("varnish.interval_secs", DEFAULT_INTERVAL_SECS as i64)?
        .set_default("varnish.reset", false)?
        .set_default("varnish.strict_listing", false)?
        .set_default("debug", false)?;

    if let Some(path) = &cli.config {
        builder = builder.add_source(File::from(path.as_path()));
    }

    let config: Config = builder
        .add_source(
            Environment::with_prefix(ENV_PREFIX)
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true),
        )
        .set_override_option("web.listen_address", cli.listen_address.clone())?
        .set_override_option("web.telemetry_path", cli.telemetry_path.clone())?
        .set_override_option("varnish.port", cli.port.map(i64::from))?
        .set_override_option(
            "varnish.secret",
            cli.secret.as_ref().map(|p| p.to_string_lossy().into_owned()),
        )?
        .set_override_option("varnish.interval_secs", cli.interval.map(|s| s as i64))?
        .set_override_option("varnish.director_regex", cli.director_regex.clone())?
        .set_override_option("varnish.reset", cli.reset.then_some(true))?
        .set_override_option("varnish.strict_listing", cli.strict_listing.then_some(true))?
        .set_override_option("debug", cli.debug.then_some(true))?
        .build()
        .context("Failed to assemble configuration")?
        .try_deserialize()
        .context("Failed to parse configuration")?;

    config.validate()?;
    Ok(config)
}
