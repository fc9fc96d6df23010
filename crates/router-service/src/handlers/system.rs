// =============================================================================
// /help, /cancel, /exit rendering — ports
// `original_source/services/telegram_router/app/handlers/system.py::SystemHandler`
// =============================================================================

use crate::core::registry::Registry;
use crate::screens;

pub fn render_help(registry: &Registry) -> Vec<String> {
    screens::help_lines(&registry.help_lines())
}

pub fn render_cancel() -> Vec<String> {
    screens::canceled()
}

pub fn render_exit() -> Vec<String> {
    screens::canceled()
}
