//! User settings and their on-disk persistence.

mod persistence;
mod settings;

pub use persistence::*;
pub use settings::*;
