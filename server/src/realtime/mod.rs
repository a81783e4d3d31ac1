mod broadcaster;
mod events;

pub use broadcaster::*;
pub use events::*;
