use parcelport_core::AdapterRegistry;
use serde_json::json;

use crate::error::CliError;

use super::CommandOutcome;

pub fn run(registry: &AdapterRegistry) -> Result<CommandOutcome, CliError> {
    let carriers = registry.snapshots();
    Ok(CommandOutcome::ok(json!({
        "count": carriers.len(),
        "carriers": serde_json::to_value(carriers)?,
    })))
}
