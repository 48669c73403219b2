// Terminal session engine
//
// This crate spawns and multiplexes PTY shell sessions, dispatches commands
// against them with sentinel-based completion detection and timeout bounds,
// streams output to attached observers, and keeps bounded command history
// plus dispatch metrics.

mod dispatcher;
mod engine;
mod history;
mod metrics;
mod registry;
mod resolver;
mod session;

// Re-export public API
pub use dispatcher::CommandDispatcher;
pub use engine::TerminalEngine;
pub use history::HistoryStore;
pub use metrics::MetricsCollector;
pub use registry::SessionRegistry;
pub use resolver::resolve_shell;
pub use session::Session;
