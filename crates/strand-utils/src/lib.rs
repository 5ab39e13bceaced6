mod assert;
mod hexdump;
mod label;
mod thread;

pub use hexdump::HexDumper;
pub use label::{Label, LabelError};
pub use thread::{ThreadPriority, boot_thread};
