//! Built-in provider implementations.
//!
//! | Locator            | Symbol                  | Entry points     |
//! |--------------------|-------------------------|------------------|
//! | `builtin::prompt`  | `PromptProvider`        | `main`           |
//! | `builtin::history` | `HistorySearchProvider` | `main`, `search` |

pub mod history;
pub mod prompt;

use std::sync::Arc;

use switchyard_core::CapabilityProvider;

pub use history::HistorySearchProvider;
pub use prompt::PromptProvider;

use crate::resolver::{FactoryTable, ProviderInit};

pub const PROMPT_LOCATOR: &str = "builtin::prompt";
pub const HISTORY_LOCATOR: &str = "builtin::history";

pub fn register_builtins(table: &FactoryTable) {
    table.register(PROMPT_LOCATOR, "PromptProvider", &["main"], |init: ProviderInit| {
        Ok(Arc::new(PromptProvider::new(init)) as Arc<dyn CapabilityProvider>)
    });
    table.register(
        HISTORY_LOCATOR,
        "HistorySearchProvider",
        &["main", "search"],
        |init: ProviderInit| Ok(Arc::new(HistorySearchProvider::new(init)) as Arc<dyn CapabilityProvider>),
    );
}
