use std::ffi::OsString;
use std::io::IsTerminal;
use std::path::{Path, PathBuf};

use anyhow::anyhow;
use clap::{ArgAction, Parser};
use tracing::debug;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::prelude::*;
use tracing_subscriber::{EnvFilter, fmt};

use crate::commands::{expand_command_abbrev, known_command_names};
use crate::config::Config;

/// Arguments left for clap, plus any `rc.key=value` tokens pulled out.
#[derive(Debug, Clone)]
pub struct PreprocessedArgs {
    pub cleaned_args: Vec<OsString>,
    pub rc_overrides: Vec<(String, String)>,
}

/// `--rc key=value`.
#[derive(Debug, Clone)]
pub struct KeyVal {
    pub key: String,
    pub value: String,
}

impl std::str::FromStr for KeyVal {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.split_once('=') {
            Some((key, value)) if !key.trim().is_empty() => Ok(Self {
                key: key.trim().to_string(),
                value: value.trim().to_string(),
            }),
            _ => Err(anyhow!("--rc expects KEY=VALUE, got: {s}")),
        }
    }
}

#[derive(Parser, Debug, Clone)]
#[command(
    name = "trellis",
    version,
    about = "Trellis: offline-first kanban board client",
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
        value_parser = clap::builder::ValueParser::new(|s: &str| s.parse::<KeyVal>()),
        action = ArgAction::Append
    )]
    pub rc_overrides: Vec<KeyVal>,

    /// Read this rc file instead of `$TRELLISRC` or `~/.trellisrc`.
    #[arg(long = "config")]
    pub config: Option<PathBuf>,

    #[arg(long = "data")]
    pub data: Option<PathBuf>,

    /// Skip the network for this invocation.
    #[arg(long = "offline")]
    pub offline: bool,

    #[arg(trailing_var_arg = true, allow_hyphen_values = true)]
    pub rest: Vec<OsString>,
}

fn default_log_level(verbose: u8, quiet: u8) -> &'static str {
    match (quiet, verbose) {
        (2.., _) => "error",
        (1, _) => "warn",
        (0, 3..) => "trace",
        (0, 2) => "debug",
        (0, 1) => "info",
        (0, 0) => "warn",
    }
}

/// Installs the stderr subscriber, plus a daily log file under
/// `log_dir` when given. Keep the returned guard alive until exit.
pub fn init_tracing(
    verbose: u8,
    quiet: u8,
    log_dir: Option<&Path>,
) -> anyhow::Result<Option<WorkerGuard>> {
    let level = default_log_level(verbose, quiet);
    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(level))
        .map_err(|e| anyhow!("invalid RUST_LOG / log filter: {e}"))?;

    let (file_layer, guard) = match log_dir {
        Some(dir) => {
            let (writer, guard) =
                tracing_appender::non_blocking(tracing_appender::rolling::daily(dir, "trellis.log"));
            let layer = fmt::layer().with_writer(writer).with_ansi(false);
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    let stderr_layer = fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(true)
        .with_ansi(std::io::stderr().is_terminal());

    if let Err(err) = tracing_subscriber::registry()
        .with(env_filter)
        .with(stderr_layer)
        .with(file_layer)
        .try_init()
    {
        debug!(error = %err, "tracing subscriber already set, continuing");
    }

    Ok(guard)
}

/// `rc.key=value` or `rc.key:value`, with the `rc.` prefix kept.
fn positional_override(token: &str) -> Option<(String, String)> {
    let rest = token.strip_prefix("rc.")?;
    let (key, value) = rest.split_once('=').or_else(|| rest.split_once(':'))?;
    Some((format!("rc.{key}"), value.to_string()))
}

#[tracing::instrument(skip_all)]
pub fn preprocess_args(raw: &[OsString]) -> anyhow::Result<PreprocessedArgs> {
    let mut pre = PreprocessedArgs {
        cleaned_args: Vec::with_capacity(raw.len()),
        rc_overrides: Vec::new(),
    };

    for (idx, arg) in raw.iter().enumerate() {
        let captured = (idx > 0)
            .then(|| positional_override(&arg.to_string_lossy()))
            .flatten();
        match captured {
            Some((key, value)) => {
                debug!(key = %key, value = %value, "captured positional rc override");
                pre.rc_overrides.push((key, value));
            }
            None => pre.cleaned_args.push(arg.clone()),
        }
    }

    Ok(pre)
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Invocation {
    pub command: String,
    pub command_args: Vec<String>,
}

impl Invocation {
    /// Commands that never talk to the server.
    pub fn is_local(&self) -> bool {
        matches!(self.command.as_str(), "help" | "version" | "pending")
    }

    #[tracing::instrument(skip(cfg, rest))]
    pub fn parse(cfg: &Config, rest: Vec<OsString>) -> anyhow::Result<Self> {
        let mut tokens = rest
            .into_iter()
            .map(|arg| arg.to_string_lossy().to_string());

        let known = known_command_names();
        let Some(first) = tokens.next() else {
            let cmd = cfg
                .get("default.command")
                .unwrap_or_else(|| "board".to_string());
            let command = expand_command_abbrev(&cmd, &known)
                .ok_or_else(|| anyhow!("unknown default.command: {cmd}"))?;
            debug!(command, "no explicit command, using default");
            return Ok(Self {
                command: command.to_string(),
                command_args: vec![],
            });
        };

        let command = expand_command_abbrev(&first, &known)
            .ok_or_else(|| anyhow!("unknown or ambiguous command: {first}"))?;
        debug!(token = %first, expanded = %command, "resolved command token");

        Ok(Self {
            command: command.to_string(),
            command_args: tokens.collect(),
        })
    }
}

#[cfg(test)]
mod tests {
    use std::ffi::OsString;

    use super::{Invocation, preprocess_args};
    use crate::config::Config;

    fn os(args: &[&str]) -> Vec<OsString> {
        args.iter().map(OsString::from).collect()
    }

    #[test]
    fn positional_rc_overrides_are_pulled_out() {
        let pre = preprocess_args(&os(&["trellis", "rc.offline:on", "board", "rc.color=off"]))
            .expect("preprocess");
        assert_eq!(pre.cleaned_args, os(&["trellis", "board"]));
        assert_eq!(
            pre.rc_overrides,
            vec![
                ("rc.offline".to_string(), "on".to_string()),
                ("rc.color".to_string(), "off".to_string()),
            ]
        );
    }

    #[test]
    fn quiet_wins_over_verbose() {
        assert_eq!(super::default_log_level(0, 0), "warn");
        assert_eq!(super::default_log_level(2, 0), "debug");
        assert_eq!(super::default_log_level(3, 1), "warn");
        assert_eq!(super::default_log_level(1, 2), "error");
    }

    #[test]
    fn commands_accept_unique_prefixes() {
        let mut cfg = Config::load(Some(std::path::Path::new("/dev/null"))).expect("cfg");
        cfg.apply_overrides([("default.command".to_string(), "pending".to_string())]);

        let inv = Invocation::parse(&cfg, os(&["mo", "7", "review"])).expect("parse");
        assert_eq!(inv.command, "move");
        assert_eq!(inv.command_args, vec!["7".to_string(), "review".to_string()]);

        let inv = Invocation::parse(&cfg, vec![]).expect("parse default");
        assert_eq!(inv.command, "pending");
        assert!(inv.is_local());
        assert!(Invocation::parse(&cfg, os(&["ver"])).expect("version").is_local());
        assert!(!Invocation::parse(&cfg, os(&["sy"])).expect("sync").is_local());

        assert!(Invocation::parse(&cfg, os(&["bogus"])).is_err());

        cfg.apply_overrides([("default.command".to_string(), "bogus".to_string())]);
        assert!(Invocation::parse(&cfg, vec![]).is_err());
    }
}
