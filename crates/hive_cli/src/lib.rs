use std::io::Write;
use std::path::{Path, PathBuf};

use kernel::tick::control::{self, HiveStatus};
use kernel::{load_tree, resolve_store_path, save_tree, LogLevel, MemoryTree};

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommonOptions {
    /// Store file; `HIVE_STORE` or `hive_store.json` when unset.
    pub store_path: Option<PathBuf>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommandKind {
    Status,
    Pause,
    Resume,
    Reset { confirm: bool },
    LogEnable { scope: String, level: LogLevel },
    LogDisable { scope: String },
    LogList,
}

pub fn run<W: Write>(kind: CommandKind, opts: CommonOptions, stdout: &mut W) -> Result<(), String> {
    let path = match opts.store_path {
        Some(path) => path,
        None => resolve_store_path().map_err(|err| err.to_string())?,
    };

    match kind {
        CommandKind::Status => {
            let store = load_store(&path)?;
            let report = control::status(&store).map_err(|err| err.to_string())?;
            write_status(stdout, &path, &report)
        }
        CommandKind::Pause => update_store(&path, stdout, "paused", control::pause),
        CommandKind::Resume => update_store(&path, stdout, "resumed", control::resume),
        CommandKind::Reset { confirm } => {
            if !confirm {
                return Err("reset discards every agent and pending creation; rerun with --yes".to_string());
            }
            update_store(&path, stdout, "reset", control::reset)
        }
        CommandKind::LogEnable { scope, level } => {
            let message = format!("log scope {scope} set to {level}");
            update_store(&path, stdout, &message, |store| {
                control::enable_log_scope(store, &scope, level)
            })
        }
        CommandKind::LogDisable { scope } => {
            let message = format!("log scope {scope} disabled");
            update_store(&path, stdout, &message, |store| control::disable_log_scope(store, &scope))
        }
        CommandKind::LogList => {
            let store = load_store(&path)?;
            let scopes = control::log_scopes(&store).map_err(|err| err.to_string())?;
            if scopes.is_empty() {
                return write_line(stdout, "no log scopes configured");
            }
            for (scope, level) in scopes {
                write_line(stdout, &format!("{scope}={level}"))?;
            }
            Ok(())
        }
    }
}

fn load_store(path: &Path) -> Result<MemoryTree, String> {
    load_tree(path).map_err(|err| err.to_string())
}

fn update_store<W, F>(path: &Path, stdout: &mut W, done: &str, update: F) -> Result<(), String>
where
    W: Write,
    F: FnOnce(&mut MemoryTree) -> Result<(), kernel::StoreError>,
{
    let mut store = load_store(path)?;
    update(&mut store).map_err(|err| err.to_string())?;
    save_tree(path, &store).map_err(|err| err.to_string())?;
    write_line(stdout, &format!("ok: {done}"))
}

fn write_status<W: Write>(stdout: &mut W, path: &Path, report: &HiveStatus) -> Result<(), String> {
    write_line(stdout, &format!("store: {}", path.display()))?;
    write_line(stdout, &format!("paused: {}", report.paused))?;
    let last_tick = report
        .last_tick
        .map_or_else(|| "never".to_string(), |tick| tick.to_string());
    write_line(stdout, &format!("last tick: {last_tick}"))?;
    write_line(stdout, &format!("ids allocated: {}", report.ids_allocated))?;
    write_line(stdout, &format!("pending agents: {}", report.pending_agents))?;
    write_line(stdout, &format!("agents: {}", report.agents.len()))?;
    for agent in &report.agents {
        write_line(
            stdout,
            &format!(
                "  {} {} \"{}\" at {} task={} pending={} objective={}",
                agent.id,
                agent.agent_type,
                agent.name,
                agent.path,
                agent.current_task.as_deref().unwrap_or("-"),
                agent.pending_tasks,
                agent.objective.as_deref().unwrap_or("-"),
            ),
        )?;
    }
    for id in &report.unreadable_agents {
        write_line(stdout, &format!("  {id} unreadable"))?;
    }
    Ok(())
}

fn write_line<W: Write>(stdout: &mut W, line: &str) -> Result<(), String> {
    writeln!(stdout, "{line}").map_err(|err| format!("failed writing output: {err}"))
}
