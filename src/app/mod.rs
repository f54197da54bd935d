//! Application wiring

mod state;

pub use state::ClientApp;
