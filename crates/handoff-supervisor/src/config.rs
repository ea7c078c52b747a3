use std::time::Duration;

use clap::{Command, CommandFactory, Parser};

use crate::rewrite::{RewriteRule, DEFAULT_REPLACEMENT, DEFAULT_TRIGGER};

/// Program launched when neither `--bin` nor `CLAUDE_BIN` is given.
pub const DEFAULT_PROGRAM: &str = "claude";

/// Readiness timeout, short enough to notice child exit promptly.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Command-line interface.
///
/// Only the supervisor's own options are declared here. Every other argument
/// is passed to the child, see [`Cli::parse_known`].
#[derive(Debug, Parser)]
#[command(
    name = "handoff-supervisor",
    version,
    about = "Launch Claude with input rewriting for handoff-friendly clears.",
    after_help = "Unrecognized arguments, and everything after `--`, are passed to the child."
)]
pub struct Cli {
    /// Child executable path.
    #[arg(
        long = "bin",
        visible_alias = "claude-bin",
        env = "CLAUDE_BIN",
        default_value = DEFAULT_PROGRAM
    )]
    pub bin: String,

    /// Disable the trigger -> replacement rewrite.
    #[arg(long)]
    pub no_rewrite: bool,

    /// Suppress supervisor informational messages.
    #[arg(long)]
    pub quiet: bool,

    /// Input line that gets rewritten.
    #[arg(long, default_value = DEFAULT_TRIGGER)]
    pub trigger: String,

    /// Line sent to the child in place of the trigger.
    #[arg(long, default_value = DEFAULT_REPLACEMENT)]
    pub replacement: String,
}

impl Cli {
    /// Parse the supervisor's options wherever they appear in `argv` and
    /// return them with the arguments meant for the child.
    ///
    /// The first `--` ends option parsing: it is dropped and everything after
    /// it goes to the child verbatim.
    pub fn parse_known<I, T>(argv: I) -> Result<(Self, Vec<String>), clap::Error>
    where
        I: IntoIterator<Item = T>,
        T: Into<String>,
    {
        let mut command = Self::command();
        command.build();

        let mut argv = argv.into_iter().map(Into::into);
        let mut own: Vec<String> = argv.next().into_iter().collect();
        let mut child = Vec::new();

        while let Some(arg) = argv.next() {
            if arg == "--" {
                child.extend(argv.by_ref());
                break;
            }
            match own_option(&command, &arg) {
                Some(needs_value) => {
                    own.push(arg);
                    if needs_value {
                        own.extend(argv.next());
                    }
                }
                None => child.push(arg),
            }
        }

        let cli = Self::try_parse_from(own)?;
        Ok((cli, child))
    }
}

/// `None` when `arg` is not one of `command`'s options. Otherwise whether
/// its value is the following argument.
fn own_option(command: &Command, arg: &str) -> Option<bool> {
    if let Some(long) = arg.strip_prefix("--") {
        let (name, inline_value) = match long.split_once('=') {
            Some((name, _)) => (name, true),
            None => (long, false),
        };
        let option = command.get_arguments().find(|a| {
            a.get_long() == Some(name)
                || a.get_all_aliases().is_some_and(|aliases| aliases.contains(&name))
        })?;
        return Some(option.get_action().takes_values() && !inline_value);
    }

    let mut short = arg.strip_prefix('-')?.chars();
    let (Some(c), None) = (short.next(), short.next()) else {
        return None;
    };
    let option = command.get_arguments().find(|a| a.get_short() == Some(c))?;
    Some(option.get_action().takes_values())
}

/// Everything the supervisor needs, resolved once at startup.
#[derive(Debug, Clone)]
pub struct SupervisorConfig {
    pub program: String,
    pub args: Vec<String>,
    /// `None` when rewriting is disabled.
    pub rewrite: Option<RewriteRule>,
    pub quiet: bool,
    pub poll_interval: Duration,
}

impl SupervisorConfig {
    pub fn new(cli: Cli, args: Vec<String>) -> Self {
        let rewrite = if cli.no_rewrite {
            None
        } else {
            Some(RewriteRule::new(cli.trigger, cli.replacement))
        };
        Self {
            program: cli.bin,
            args,
            rewrite,
            quiet: cli.quiet,
            poll_interval: DEFAULT_POLL_INTERVAL,
        }
    }

    /// Build the configuration from a full argument vector, program name
    /// first.
    pub fn from_args<I, T>(argv: I) -> Result<Self, clap::Error>
    where
        I: IntoIterator<Item = T>,
        T: Into<String>,
    {
        let (cli, args) = Cli::parse_known(argv)?;
        Ok(Self::new(cli, args))
    }
}
