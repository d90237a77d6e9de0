pub mod app_state;
pub mod recent;

pub use app_state::*;
pub use recent::*;
