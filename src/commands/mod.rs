pub mod check;
pub mod list;
pub mod state;

// Re-export command functions for convenience
pub use check::{check, CheckParams};
pub use list::list;
pub use state::{clear, show_state};
