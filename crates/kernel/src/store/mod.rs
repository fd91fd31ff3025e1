mod atomic_io;
mod file;
mod records;
mod tree;

pub use file::{load_tree, parse_tree_json, save_tree};
pub use records::{
    AgentRecord, ObjectiveRecord, Params, PendingRecord, TaskRecord, DEFAULT_TASK_PRIORITY,
};
pub use tree::{
    agent_path, MemoryTree, StoreError, AGENTS_ROOT, AGENT_INDEX_KEY, LOGGING_KEY,
    PENDING_AGENTS_KEY, RUNTIME_KEY,
};
