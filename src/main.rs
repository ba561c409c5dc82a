//! Binary entry point: parse arguments, configure logging and dispatch.

use greenhouse::args::{self, CliAction, ParsedArgs};
use greenhouse::common::constants::{EXIT_FAILURE, EXIT_SUCCESS};
use greenhouse::config;
use greenhouse::logger::{Log, LogLevel};
use greenhouse::{Greenhouse, log_end, log_error_exit, log_version};

fn main() {
    let parsed = ParsedArgs::from_env();
    std::process::exit(dispatch(parsed.action));
}

fn dispatch(action: CliAction) -> i32 {
    match action {
        CliAction::ShowHelp => {
            args::display_help();
            EXIT_SUCCESS
        }
        CliAction::ShowVersion => {
            args::display_version_info();
            EXIT_SUCCESS
        }
        CliAction::ShowHelpDueToError => {
            args::display_help();
            EXIT_FAILURE
        }
        CliAction::Dump { common } => {
            if let Err(code) = apply_common(common.log_level, common.config_dir) {
                return code;
            }
            log_version!();
            report(greenhouse::commands::dump::handle_dump_command().map(|_| EXIT_SUCCESS))
        }
        CliAction::Run {
            common,
            overrides,
            log_file,
        } => {
            if let Err(code) = apply_common(common.log_level, common.config_dir) {
                return code;
            }

            let _log_guard = match log_file {
                Some(path) => match Log::start_file_logging(path) {
                    Ok(guard) => Some(guard),
                    Err(e) => {
                        log_error_exit!("Failed to open log file: {e}");
                        return EXIT_FAILURE;
                    }
                },
                None => None,
            };

            let result = Greenhouse::new()
                .with_overrides(overrides)
                .run()
                .map(|summary| {
                    log_end!();
                    if summary.fatal.is_some() {
                        EXIT_FAILURE
                    } else {
                        EXIT_SUCCESS
                    }
                });
            report(result)
        }
    }
}

fn apply_common(level: LogLevel, config_dir: Option<String>) -> Result<(), i32> {
    Log::set_level(level);
    if let Err(e) = config::set_config_dir(config_dir) {
        log_error_exit!("{e}");
        return Err(EXIT_FAILURE);
    }
    Ok(())
}

fn report(result: anyhow::Result<i32>) -> i32 {
    match result {
        Ok(code) => code,
        Err(e) => {
            log_error_exit!("{e}");
            for cause in e.chain().skip(1) {
                eprintln!("  caused by: {cause}");
            }
            EXIT_FAILURE
        }
    }
}
