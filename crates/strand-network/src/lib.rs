mod backoff;
mod client;
mod duplex;
mod error;
mod feeder;
mod poll;
mod server;
mod socket;

pub use client::{ClientConnector, ClientSettings};
pub use duplex::{CommContext, DuplexSettings, run_duplex};
pub use error::NetError;
pub use feeder::{FILE_READER_LABEL, FileFeeder};
pub use poll::{Readiness, wait_readable, wait_writable};
pub use server::{Protocol, SERVER_SEND_LABEL, ServerListener, ServerSettings};
pub use socket::RelaySocket;

use strand_timing::Millis;

// Blocking loops never sleep longer than this without polling shutdown.
pub(crate) fn interruptible_sleep(total: Millis) {
    use strand::shutdown::shutdown_signalled;
    let deadline = strand_timing::Instant::now() + total;
    while !shutdown_signalled() {
        let left = deadline.saturating_sub(strand_timing::Instant::now());
        if left == Millis::ZERO {
            return;
        }
        let nap = left.0.min(100);
        std::thread::sleep(std::time::Duration::from_millis(nap));
    }
}
