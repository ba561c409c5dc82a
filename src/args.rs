//! Command-line argument parsing and processing.
//!
//! `greenhouse [OPTIONS] [run|dump]`. Parsing never fails outright: malformed
//! input produces [`CliAction::ShowHelpDueToError`] after a warning naming the
//! offending argument.

use crate::config::Overrides;
use crate::logger::LogLevel;

/// Options shared by every command.
#[derive(Debug, Clone, PartialEq)]
pub struct CommonOptions {
    pub log_level: LogLevel,
    pub config_dir: Option<String>,
}

impl Default for CommonOptions {
    fn default() -> Self {
        Self {
            log_level: LogLevel::Info,
            config_dir: None,
        }
    }
}

/// Represents the parsed command-line arguments and their intended actions.
#[derive(Debug, PartialEq)]
pub enum CliAction {
    /// Run the control loop
    Run {
        common: CommonOptions,
        overrides: Overrides,
        log_file: Option<String>,
    },
    /// Print the stored measurements and exit
    Dump { common: CommonOptions },
    /// Display help information and exit
    ShowHelp,
    /// Display version information and exit
    ShowVersion,
    /// Show help due to invalid arguments and exit
    ShowHelpDueToError,
}

/// Result of parsing command-line arguments.
pub struct ParsedArgs {
    pub action: CliAction,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Command {
    Run,
    Dump,
}

impl ParsedArgs {
    /// Parse command-line arguments (including the program name) into an action.
    pub fn parse<I, S>(args: I) -> ParsedArgs
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let args_vec: Vec<String> = args
            .into_iter()
            .skip(1)
            .map(|s| s.as_ref().to_string())
            .collect();

        let mut common = CommonOptions::default();
        let mut overrides = Overrides::default();
        let mut log_file: Option<String> = None;
        let mut command: Option<Command> = None;
        let mut run_only_flag = false;

        let mut iter = args_vec.iter();
        while let Some(arg) = iter.next() {
            match arg.as_str() {
                "--help" | "-h" => return ParsedArgs::from(CliAction::ShowHelp),
                "--version" | "-V" | "-v" => return ParsedArgs::from(CliAction::ShowVersion),
                "--debug" | "-d" => common.log_level = LogLevel::Debug,
                "--verbose" => match iter.next().map(|v| v.parse::<LogLevel>()) {
                    Some(Ok(level)) => common.log_level = level,
                    Some(Err(e)) => return invalid(&e.to_string()),
                    None => return invalid("--verbose requires a level"),
                },
                "--config" | "-c" => match iter.next() {
                    Some(dir) => common.config_dir = Some(dir.clone()),
                    None => return invalid("--config requires a directory"),
                },
                "--log" => match iter.next() {
                    Some(path) => {
                        log_file = Some(path.clone());
                        run_only_flag = true;
                    }
                    None => return invalid("--log requires a file path"),
                },
                "--iterations" | "-n" => match iter.next().map(|v| v.parse::<u64>()) {
                    Some(Ok(n)) if n > 0 => {
                        overrides.iterations = Some(n);
                        run_only_flag = true;
                    }
                    Some(_) => return invalid("--iterations requires a positive number"),
                    None => return invalid("--iterations requires a number"),
                },
                "--forever" => {
                    overrides.forever = true;
                    run_only_flag = true;
                }
                "--interval" | "-i" => match iter.next().map(|v| v.parse::<u64>()) {
                    Some(Ok(secs)) if secs > 0 => {
                        overrides.interval = Some(secs);
                        run_only_flag = true;
                    }
                    Some(_) => return invalid("--interval requires a positive number of seconds"),
                    None => return invalid("--interval requires a number of seconds"),
                },
                "run" | "dump" if command.is_none() => {
                    command = Some(if arg == "run" {
                        Command::Run
                    } else {
                        Command::Dump
                    });
                }
                other => return invalid(&format!("Unknown argument: {other}")),
            }
        }

        if overrides.forever && overrides.iterations.is_some() {
            return invalid("--forever and --iterations cannot be combined");
        }

        let action = match command.unwrap_or(Command::Run) {
            Command::Run => CliAction::Run {
                common,
                overrides,
                log_file,
            },
            Command::Dump if run_only_flag => {
                return invalid("dump does not accept loop options");
            }
            Command::Dump => CliAction::Dump { common },
        };

        ParsedArgs { action }
    }

    /// Parse the process arguments.
    pub fn from_env() -> ParsedArgs {
        Self::parse(std::env::args())
    }
}

impl From<CliAction> for ParsedArgs {
    fn from(action: CliAction) -> Self {
        ParsedArgs { action }
    }
}

fn invalid(message: &str) -> ParsedArgs {
    log_warning!("{message}");
    ParsedArgs::from(CliAction::ShowHelpDueToError)
}

/// Display version information using custom logging style.
pub fn display_version_info() {
    log_version!();
    log_pipe!();
    println!("┗ {}", env!("CARGO_PKG_DESCRIPTION"));
}

/// Display help information using custom logging style.
pub fn display_help() {
    log_version!();
    log_block_start!(env!("CARGO_PKG_DESCRIPTION"));
    log_block_start!("Usage:");
    log_indented!("greenhouse [OPTIONS] [COMMAND]");
    log_block_start!("Options:");
    log_indented!("-c, --config <dir>       Use custom configuration directory");
    log_indented!("-d, --debug              Same as --verbose DEBUG");
    log_indented!("    --verbose <level>    DEBUG, INFO, WARNING, ERROR or CRITICAL");
    log_indented!("    --log <file>         Also write output to a file");
    log_indented!("-n, --iterations <n>     Number of cycles to run");
    log_indented!("    --forever            Run until interrupted");
    log_indented!("-i, --interval <secs>    Seconds between cycles");
    log_indented!("-h, --help               Print help information");
    log_indented!("-V, --version            Print version information");
    log_block_start!("Commands:");
    log_indented!("run                      Run the control loop (default)");
    log_indented!("dump                     Print stored measurements");
    log_end!();
}
