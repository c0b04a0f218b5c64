//! Built-in actions for Stepwise.
//!
//! Actions give the agent the ability to interact with the world:
//! read/write files in a workspace, run allowlisted commands, and ask
//! the user. The `done` action from `stepwise-core` ends a run.

pub mod ask_user;
pub mod file_read;
pub mod file_write;
pub mod shell;
pub mod workspace;

use std::sync::Arc;
use std::time::Duration;

use stepwise_config::ToolsConfig;
use stepwise_core::action::{Action, ActionFormat, ActionRegistry, DoneAction};
use stepwise_core::error::RegistryError;

pub use ask_user::AskUserAction;
pub use file_read::ReadFileAction;
pub use file_write::WriteFileAction;
pub use shell::RunCommandAction;
pub use workspace::Workspace;

/// Every built-in action configured from `config`, in catalog order:
/// read-file, write-file, run-command, ask-user (when enabled), done.
pub fn default_actions(config: &ToolsConfig) -> Vec<Arc<dyn Action>> {
    let workspace = Workspace::new(&config.workspace_root);
    let mut actions: Vec<Arc<dyn Action>> = vec![
        Arc::new(ReadFileAction::new(workspace.clone())),
        Arc::new(WriteFileAction::new(workspace)),
        Arc::new(RunCommandAction::new(
            config.allowed_commands.clone(),
            &config.workspace_root,
            Duration::from_secs(config.command_timeout_secs),
        )),
    ];
    if config.enable_ask_user {
        actions.push(Arc::new(AskUserAction::stdio()));
    }
    actions.push(Arc::new(DoneAction::new()));
    actions
}

/// A registry holding [`default_actions`].
pub fn default_registry(
    config: &ToolsConfig,
    format: Arc<dyn ActionFormat>,
) -> Result<ActionRegistry, RegistryError> {
    ActionRegistry::with_actions(format, default_actions(config))
}
