//! Setup shared between the harvest and probe commands.

use super::ProgressReporter;
use super::config::Config;
use crate::Result;
use crate::harvest::{ClientOptions, Progress, read_token_file};
use camino::Utf8PathBuf;
use clap::Args;
use clap::ValueEnum;
use core::time::Duration;
use std::path::Path;
use std::sync::Arc;

const LOG_TARGET: &str = "  commands";

/// Token file looked up in the current directory when none is given.
const DEFAULT_TOKEN_FILE: &str = "api_token.secret";

/// Color mode configuration for output
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum ColorMode {
    /// Always use colors
    Always,

    /// Never use colors
    Never,

    /// Use colors if the output is a terminal, otherwise don't use colors
    Auto,
}

/// Log level for diagnostic output
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum LogLevel {
    /// No logging output
    None,

    /// Only error messages
    Error,

    /// Warning and error messages
    Warn,

    /// Info, warning, and error messages
    Info,

    /// Debug, info, warning, and error messages
    Debug,

    /// Trace, debug, info, warning, and error messages
    Trace,
}

/// Common arguments shared between harvest and probe commands
#[derive(Args, Debug)]
pub struct CommonArgs {
    /// Directory holding the reference table, configuration, and output units
    #[arg(long, value_name = "PATH", default_value = "data")]
    pub data_dir: Utf8PathBuf,

    /// Path to configuration file (default is `harvest.toml` in the data directory)
    #[arg(long, short = 'c', value_name = "PATH")]
    pub config: Option<Utf8PathBuf>,

    /// GitHub personal access token
    #[arg(long, value_name = "TOKEN", env = "GITHUB_TOKEN", hide_env_values = true)]
    pub github_token: Option<String>,

    /// File whose first line is the GitHub token (default is `api_token.secret`)
    #[arg(long, value_name = "PATH")]
    pub token_file: Option<Utf8PathBuf>,

    /// Control when to use colored output
    #[arg(long, value_name = "WHEN", default_value = "auto")]
    pub color: ColorMode,

    /// Set the logging level for diagnostic output
    #[arg(long, value_name = "LEVEL", default_value = "none", global = true)]
    pub log_level: LogLevel,
}

/// Everything a command needs once arguments and configuration are resolved.
#[derive(Debug)]
pub struct Common {
    pub config: Config,
    pub data_dir: Utf8PathBuf,
    pub token: Option<String>,
    pub progress: Arc<ProgressReporter>,
}

impl Common {
    /// Initialize logging, then load the configuration and the token.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is invalid or an explicitly named token file
    /// cannot be read
    pub fn new(args: &CommonArgs) -> Result<Self> {
        init_logging(args.log_level);

        let config = Config::load(&args.data_dir, args.config.as_ref())?;
        let token = resolve_token(args)?;
        if token.is_none() {
            log::warn!(target: LOG_TARGET, "No GitHub token found, requests are limited to the unauthenticated rate");
        }

        let delay = if args.log_level == LogLevel::None {
            Duration::from_millis(300)
        } else {
            Duration::from_hours(365 * 24)
        };

        let use_colors_for_progress = match args.color {
            ColorMode::Always => true,
            ColorMode::Never => false,
            ColorMode::Auto => {
                use std::io::{IsTerminal, stderr};
                stderr().is_terminal()
            }
        };

        Ok(Self {
            config,
            data_dir: args.data_dir.clone(),
            token,
            progress: Arc::new(ProgressReporter::new(delay, use_colors_for_progress)),
        })
    }

    #[must_use]
    pub fn client_options(&self) -> ClientOptions {
        ClientOptions {
            api_base_url: self.config.api_base_url.clone(),
            token: self.token.clone(),
            request_timeout: self.config.request_timeout,
            default_wait: self.config.default_wait,
            max_wait_step: self.config.max_wait_step,
        }
    }

    #[must_use]
    pub fn progress(&self) -> Arc<dyn Progress> {
        Arc::clone(&self.progress) as Arc<dyn Progress>
    }
}

/// Prefer a token given directly or through `GITHUB_TOKEN`, then fall back to the token file.
fn resolve_token(args: &CommonArgs) -> Result<Option<String>> {
    if let Some(token) = args.github_token.as_deref().map(str::trim)
        && !token.is_empty()
    {
        return Ok(Some(token.to_string()));
    }

    match &args.token_file {
        Some(path) => read_token_file(path.as_std_path(), true),
        None => read_token_file(Path::new(DEFAULT_TOKEN_FILE), false),
    }
}

/// Initialize logger based on log level
fn init_logging(log_level: LogLevel) {
    let level = match log_level {
        LogLevel::None => return,
        LogLevel::Error => "error",
        LogLevel::Warn => "warn",
        LogLevel::Info => "info",
        LogLevel::Debug => "debug",
        LogLevel::Trace => "trace",
    };

    let env = env_logger::Env::default().filter_or("RUST_LOG", level);

    // A second command in the same process keeps the first logger.
    let _ = env_logger::Builder::from_env(env)
        .format_timestamp(None)
        .format_module_path(false)
        .format_target(matches!(log_level, LogLevel::Debug | LogLevel::Trace))
        .try_init();
}
