use std::env;
use std::io;
use std::path::PathBuf;
use std::process::ExitCode;

use hive_cli::{run, CommandKind, CommonOptions};
use kernel::LogLevel;

fn main() -> ExitCode {
    match run_cli() {
        Ok(()) => ExitCode::SUCCESS,
        Err(message) => {
            eprintln!("{message}");
            ExitCode::from(1)
        }
    }
}

fn run_cli() -> Result<(), String> {
    let args = env::args().skip(1).collect::<Vec<_>>();
    if args.is_empty() {
        return Err(usage_text());
    }
    if args[0] == "-h" || args[0] == "--help" {
        print_usage();
        return Ok(());
    }

    let mut options = CommonOptions::default();
    let mut index = 0usize;
    while index < args.len() {
        match args[index].as_str() {
            "--store" => {
                let value = args
                    .get(index + 1)
                    .ok_or_else(|| "missing value for --store".to_string())?;
                options.store_path = Some(PathBuf::from(value));
                index += 2;
            }
            _ => break,
        }
    }

    let command = args
        .get(index)
        .ok_or_else(|| "missing subcommand".to_string())?
        .as_str();
    let command_args = &args[(index + 1)..];

    let kind = match command {
        "status" | "pause" | "resume" | "log-list" if !command_args.is_empty() => {
            return Err(format!("{command} takes no arguments"));
        }
        "status" => CommandKind::Status,
        "pause" => CommandKind::Pause,
        "resume" => CommandKind::Resume,
        "log-list" => CommandKind::LogList,
        "reset" => {
            let mut confirm = false;
            for arg in command_args {
                if arg == "--yes" {
                    confirm = true;
                } else {
                    return Err(format!("unknown reset argument '{arg}' (expected --yes)"));
                }
            }
            CommandKind::Reset { confirm }
        }
        "log-enable" => {
            let (scope, level) = match command_args {
                [scope] => (scope.clone(), LogLevel::Debug),
                [scope, level] => (scope.clone(), level.parse::<LogLevel>()?),
                _ => return Err("log-enable requires <scope> [level]".to_string()),
            };
            CommandKind::LogEnable { scope, level }
        }
        "log-disable" => match command_args {
            [scope] => CommandKind::LogDisable {
                scope: scope.clone(),
            },
            _ => return Err("log-disable requires <scope>".to_string()),
        },
        other => return Err(format!("unknown subcommand '{other}'")),
    };

    run(kind, options, &mut io::stdout())
}

fn print_usage() {
    println!("{}", usage_text());
}

fn usage_text() -> String {
    [
        "hive_cli - operator controls for a hive store",
        "",
        "Usage:",
        "  hive_cli [--store <path>] status",
        "  hive_cli [--store <path>] pause",
        "  hive_cli [--store <path>] resume",
        "  hive_cli [--store <path>] reset --yes",
        "  hive_cli [--store <path>] log-enable <scope> [off|error|warn|info|debug|trace]",
        "  hive_cli [--store <path>] log-disable <scope>",
        "  hive_cli [--store <path>] log-list",
        "",
        "Defaults:",
        "  --store $HIVE_STORE, else hive_store.json",
        "  log-enable level: debug",
    ]
    .join("\n")
}
