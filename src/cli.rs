use std::path::PathBuf;

use anyhow::{bail, Context, Result};

pub(crate) const USAGE: &str = "usage: scriptdap [--port N] [--config-dir DIR]";

/// Command-line overrides.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub(crate) struct Cli {
    pub port: Option<u16>,
    pub config_dir: Option<PathBuf>,
    pub help: bool,
}

impl Cli {
    /// Parse arguments (without the program name).
    pub(crate) fn parse<I>(args: I) -> Result<Self>
    where
        I: IntoIterator<Item = String>,
    {
        let mut cli = Cli::default();
        let mut args = args.into_iter();
        while let Some(arg) = args.next() {
            match arg.as_str() {
                "--port" | "-p" => {
                    let value = args.next().context("--port needs a value")?;
                    let port = value
                        .parse()
                        .with_context(|| format!("invalid port: {value}"))?;
                    cli.port = Some(port);
                }
                "--config-dir" => {
                    let value = args.next().context("--config-dir needs a value")?;
                    cli.config_dir = Some(PathBuf::from(value));
                }
                "--help" | "-h" => cli.help = true,
                other => bail!("unexpected argument: {other}\n{USAGE}"),
            }
        }
        Ok(cli)
    }
}
