//! `stepwise actions`: print the action catalog.

use stepwise_config::{ActionFormatKind, AppConfig};
use stepwise_tools::default_registry;

pub fn run(config: &AppConfig, format: Option<ActionFormatKind>) -> stepwise_core::Result<()> {
    let kind = format.unwrap_or(config.agent.action_format);
    let registry = default_registry(&config.tools, super::action_format(kind))?;

    println!("Format: {}", registry.format().name());
    println!("Actions: {}", registry.ids().join(", "));
    println!();
    print!("{}", registry.render_catalog());
    Ok(())
}
