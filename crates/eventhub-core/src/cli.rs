use std::ffi::OsString;
use std::io::IsTerminal;
use std::path::PathBuf;

use anyhow::anyhow;
use clap::{ArgAction, Parser};
use tracing::debug;
use tracing_subscriber::EnvFilter;

use crate::config::Config;

#[derive(Debug, Clone, PartialEq)]
pub struct PreprocessedArgs {
    pub cleaned_args: Vec<OsString>,
    pub rc_overrides: Vec<(String, String)>,
}

/// One `--rc key=value` (or `key:value`) setting.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RcOverride {
    pub key: String,
    pub value: String,
}

impl std::str::FromStr for RcOverride {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        split_setting(s).ok_or_else(|| anyhow!("expected KEY=VALUE, got: {s}"))
    }
}

/// `=` wins over `:` so values such as URLs keep their colons.
fn split_setting(raw: &str) -> Option<RcOverride> {
    let (key, value) = raw.split_once('=').or_else(|| raw.split_once(':'))?;
    let key = key.trim();
    (!key.is_empty()).then(|| RcOverride {
        key: key.to_string(),
        value: value.trim().to_string(),
    })
}

#[derive(Parser, Debug, Clone)]
#[command(
    name = "eventhub",
    version,
    about = "Campus events from the terminal: calendar, RSVPs and event admin",
    disable_help_subcommand = true,
    arg_required_else_help = false
)]
pub struct GlobalCli {
    #[arg(short = 'v', long = "verbose", action = ArgAction::Count)]
    pub verbose: u8,

    #[arg(short = 'q', long = "quiet", action = ArgAction::Count)]
    pub quiet: u8,

    #[arg(
        long = "rc",
        value_parser = clap::builder::ValueParser::new(|s: &str| s.parse::<RcOverride>()),
        action = ArgAction::Append
    )]
    pub rc_overrides: Vec<RcOverride>,

    #[arg(long = "eventhubrc")]
    pub eventhubrc: Option<PathBuf>,

    #[arg(long = "data")]
    pub data: Option<PathBuf>,

    #[arg(
        trailing_var_arg = true,
        allow_hyphen_values = true,
        allow_negative_numbers = true
    )]
    pub rest: Vec<OsString>,
}

/// `RUST_LOG` wins; otherwise `-q`/`-v` move the level from `warn`.
pub fn init_tracing(verbose: u8, quiet: u8) -> anyhow::Result<()> {
    let default_level = match (quiet, verbose) {
        (2.., _) => "error",
        (1, _) | (0, 0) => "warn",
        (0, 1) => "info",
        (0, 2) => "debug",
        _ => "trace",
    };

    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(default_level))
        .map_err(|e| anyhow!("invalid RUST_LOG / log filter: {e}"))?;

    let stderr_is_tty = std::io::stderr().is_terminal();
    if let Err(err) = tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_writer(std::io::stderr)
        .with_ansi(stderr_is_tty)
        .with_target(verbose >= 2)
        .try_init()
    {
        debug!(error = %err, "tracing subscriber already set, continuing");
    }

    Ok(())
}

/// Pulls positional `rc.key=value` / `rc.key:value` tokens out of the
/// argument list before clap sees it. The binary name is kept in place.
#[tracing::instrument(skip_all, fields(args = raw.len()))]
pub fn preprocess_args(raw: &[OsString]) -> anyhow::Result<PreprocessedArgs> {
    let mut cleaned_args = Vec::with_capacity(raw.len());
    let mut rc_overrides = Vec::new();

    for (index, arg) in raw.iter().enumerate() {
        let setting = (index > 0)
            .then(|| arg.to_str())
            .flatten()
            .and_then(|text| text.strip_prefix("rc."))
            .and_then(split_setting);

        match setting {
            Some(RcOverride { key, value }) => {
                debug!(key = %key, value = %value, "captured positional rc override");
                rc_overrides.push((format!("rc.{key}"), value));
            }
            None => cleaned_args.push(arg.clone()),
        }
    }

    Ok(PreprocessedArgs {
        cleaned_args,
        rc_overrides,
    })
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Invocation {
    pub command: String,
    pub args: Vec<String>,
}

impl Invocation {
    /// The first token naming a command (abbreviations allowed) picks it;
    /// every other token becomes an argument, in order. A lone numeric
    /// token is an event id and means `info`.
    #[tracing::instrument(skip(cfg, rest))]
    pub fn parse(cfg: &Config, rest: Vec<OsString>) -> anyhow::Result<Self> {
        let tokens: Vec<String> = rest
            .into_iter()
            .map(|arg| arg.to_string_lossy().to_string())
            .collect();

        let default_command = cfg
            .get_nonempty("default.command")
            .unwrap_or("calendar")
            .to_string();

        if tokens.is_empty() {
            debug!(command = %default_command, "no explicit command, using default");
            return Ok(Self {
                command: default_command,
                args: vec![],
            });
        }

        if tokens.len() == 1 && tokens[0].parse::<u64>().is_ok() {
            debug!(token = %tokens[0], "single numeric token interpreted as event info query");
            return Ok(Self {
                command: "info".to_string(),
                args: tokens,
            });
        }

        match split_command(&tokens) {
            Some((command, args)) => Ok(Self { command, args }),
            None => {
                debug!(
                    command = %default_command,
                    "no command detected, passing all terms to the default command"
                );
                Ok(Self {
                    command: default_command,
                    args: tokens,
                })
            }
        }
    }
}

fn split_command(tokens: &[String]) -> Option<(String, Vec<String>)> {
    let known = crate::commands::known_command_names();

    for (i, token) in tokens.iter().enumerate() {
        if let Some(full) = crate::commands::expand_command_abbrev(token, &known) {
            debug!(
                token = %token,
                expanded = %full,
                split_index = i,
                "resolved command token"
            );
            let args = tokens[..i]
                .iter()
                .chain(&tokens[i + 1..])
                .cloned()
                .collect();
            return Some((full.to_string(), args));
        }
    }

    None
}
