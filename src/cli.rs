//! # Command-Line Interface / 命令行接口
//!
//! Builds the `clap` command tree with localized help, initializes logging
//! and dispatches to the subcommands.
//!
//! 构建带本地化帮助信息的 `clap` 命令树，初始化日志并分发到各子命令。

use anyhow::Result;
use clap::builder::PossibleValuesParser;
use clap::{Arg, ArgAction, ArgMatches, Command};
use std::{env, path::PathBuf};

use crate::cli::commands::{init, list, run, show};
use crate::infra::logging::{self, LogLevel};
use crate::infra::t;

pub mod commands;

/// Default configuration file name.
pub const DEFAULT_CONFIG: &str = "tox.ini";

/// Pre-parses the command line arguments to find the language setting.
/// This allows i18n to be initialized before the full CLI is built.
/// It looks for `--lang <VALUE>` or `--lang=<VALUE>`.
fn pre_parse_language(args: &[String]) -> Option<String> {
    args.iter().enumerate().find_map(|(pos, arg)| {
        if arg == "--lang" {
            args.get(pos + 1).cloned()
        } else {
            arg.strip_prefix("--lang=").map(str::to_string)
        }
    })
}

/// Parses `--parallel`: a positive number, or `auto` for the CPU count.
fn parse_parallel(raw: &str) -> Result<usize, String> {
    if raw.eq_ignore_ascii_case("auto") {
        return Ok(num_cpus::get().max(1));
    }
    match raw.parse::<usize>() {
        Ok(0) | Err(_) => Err(format!("expected a positive number or 'auto', got '{raw}'")),
        Ok(n) => Ok(n),
    }
}

fn envlist_arg(locale: &str) -> Arg {
    Arg::new("envlist")
        .help(t!("arg_envlist", locale = locale).to_string())
        .value_name("ENVLIST")
        .action(ArgAction::Set)
}

pub fn build_cli(locale: &str) -> Command {
    Command::new("envmatrix")
        .version(env!("CARGO_PKG_VERSION"))
        .about(t!("cli_about", locale = locale).to_string())
        .subcommand_required(true)
        .arg_required_else_help(true)
        .arg(
            Arg::new("config")
                .short('c')
                .long("config")
                .help(t!("arg_config", locale = locale).to_string())
                .value_name("CONFIG")
                .default_value(DEFAULT_CONFIG)
                .value_parser(clap::value_parser!(PathBuf))
                .global(true)
                .action(ArgAction::Set),
        )
        .arg(
            Arg::new("log-level")
                .long("log-level")
                .help(t!("arg_log_level", locale = locale).to_string())
                .value_name("LEVEL")
                .value_parser(PossibleValuesParser::new(LogLevel::NAMES))
                .global(true)
                .action(ArgAction::Set),
        )
        .arg(
            Arg::new("lang")
                .long("lang")
                .help(t!("cli_lang", locale = locale).to_string())
                .value_name("LANGUAGE")
                .global(true)
                .action(ArgAction::Set),
        )
        .subcommand(
            Command::new("run")
                .about(t!("cmd_run_about", locale = locale).to_string())
                .arg(envlist_arg(locale))
                .arg(
                    Arg::new("parallel")
                        .short('p')
                        .long("parallel")
                        .help(t!("arg_parallel", locale = locale).to_string())
                        .value_name("N|auto")
                        .default_value("1")
                        .value_parser(parse_parallel)
                        .action(ArgAction::Set),
                )
                .arg(
                    Arg::new("recreate")
                        .short('r')
                        .long("recreate")
                        .help(t!("arg_recreate", locale = locale).to_string())
                        .action(ArgAction::SetTrue),
                )
                .arg(
                    Arg::new("timeout")
                        .long("timeout")
                        .help(t!("arg_timeout", locale = locale).to_string())
                        .value_name("SECS")
                        .value_parser(clap::value_parser!(u64).range(1..))
                        .action(ArgAction::Set),
                )
                .arg(
                    Arg::new("html")
                        .long("html")
                        .help(t!("arg_html", locale = locale).to_string())
                        .value_name("HTML")
                        .value_parser(clap::value_parser!(PathBuf))
                        .action(ArgAction::Set),
                )
                .arg(
                    Arg::new("result-json")
                        .long("result-json")
                        .help(t!("arg_result_json", locale = locale).to_string())
                        .value_name("PATH")
                        .value_parser(clap::value_parser!(PathBuf))
                        .action(ArgAction::Set),
                )
                .arg(
                    Arg::new("posargs")
                        .help(t!("arg_posargs", locale = locale).to_string())
                        .value_name("POSARGS")
                        .num_args(0..)
                        .last(true)
                        .allow_hyphen_values(true)
                        .action(ArgAction::Append),
                ),
        )
        .subcommand(Command::new("list").about(t!("cmd_list_about", locale = locale).to_string()))
        .subcommand(
            Command::new("show")
                .about(t!("cmd_show_about", locale = locale).to_string())
                .arg(envlist_arg(locale)),
        )
        .subcommand(
            Command::new("init")
                .about(t!("cmd_init_about", locale = locale).to_string())
                .arg(
                    Arg::new("non-interactive")
                        .long("non-interactive")
                        .help(t!("arg_non_interactive", locale = locale).to_string())
                        .action(ArgAction::SetTrue),
                )
                .arg(
                    Arg::new("force")
                        .long("force")
                        .help(t!("arg_force", locale = locale).to_string())
                        .action(ArgAction::SetTrue),
                ),
        )
}

fn config_path(matches: &ArgMatches) -> PathBuf {
    matches
        .get_one::<PathBuf>("config")
        .cloned()
        .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG))
}

pub async fn run() -> Result<()> {
    // Pre-parse language and initialize i18n first.
    let args: Vec<String> = env::args().collect();
    let language = crate::resolve_locale(pre_parse_language(&args).as_deref());
    rust_i18n::set_locale(&language);

    let matches = build_cli(&language).get_matches_from(args);

    let log_level = matches
        .get_one::<String>("log-level")
        .and_then(|raw| raw.parse::<LogLevel>().ok());
    logging::init_logging(log_level)?;

    let config = config_path(&matches);

    match matches.subcommand() {
        Some(("run", run_matches)) => {
            let args = run::RunArgs {
                config,
                envlist: run_matches.get_one::<String>("envlist").cloned(),
                parallel: run_matches.get_one::<usize>("parallel").copied().unwrap_or(1),
                recreate: run_matches.get_flag("recreate"),
                timeout_secs: run_matches.get_one::<u64>("timeout").copied(),
                html: run_matches.get_one::<PathBuf>("html").cloned(),
                result_json: run_matches.get_one::<PathBuf>("result-json").cloned(),
                posargs: run_matches
                    .get_many::<String>("posargs")
                    .map(|values| values.cloned().collect())
                    .unwrap_or_default(),
            };
            run::execute(args, &language).await?;
        }
        Some(("list", _)) => list::execute(&config, &language)?,
        Some(("show", show_matches)) => {
            let envlist = show_matches.get_one::<String>("envlist").map(String::as_str);
            show::execute(&config, envlist, &language)?;
        }
        Some(("init", init_matches)) => {
            let non_interactive = init_matches.get_flag("non-interactive");
            let force = init_matches.get_flag("force");
            init::execute(&config, non_interactive, force, &language)?;
        }
        _ => {
            // `subcommand_required` makes clap print help before we get here.
        }
    }
    Ok(())
}
