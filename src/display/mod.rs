//! Display records and per-display configuration.
//!
//! Every physical e-ink display has a row plus a bag of named config
//! values. Display id 0 is the shared "default display" whose config
//! rows act as fallback values for all other displays.

mod models;
mod store;
pub mod wakeup;

pub use models::Display;
pub use store::{config_keys, DisplayStore, SqliteDisplayStore};
