pub mod show;
pub mod show_store;

pub use show::{Preset, PresetId, Show};
pub use show_store::{ShowLibrary, ShowStore};
