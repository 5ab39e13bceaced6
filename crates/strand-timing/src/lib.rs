mod instant;
mod repeater;
mod wall;

pub use instant::{Instant, Millis};
pub use repeater::Repeater;
pub use wall::WallStamp;
