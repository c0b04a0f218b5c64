pub mod actions;
pub mod config_cmd;
pub mod run;

use std::sync::Arc;

use stepwise_config::ActionFormatKind;
use stepwise_core::action::{ActionFormat, FlexibleJsonActionFormat, JsonActionFormat};

/// The serialization format selected in configuration.
pub fn action_format(kind: ActionFormatKind) -> Arc<dyn ActionFormat> {
    match kind {
        ActionFormatKind::Json => Arc::new(JsonActionFormat),
        ActionFormatKind::FlexibleJson => Arc::new(FlexibleJsonActionFormat),
    }
}
