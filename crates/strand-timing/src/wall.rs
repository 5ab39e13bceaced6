use core::fmt;

use chrono::{DateTime, Local};

/// Wall-clock stamp carried by log entries.
///
/// Renders as `YYYY-MM-DD HH:MM:SS.nnn`, the log file line prefix.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub struct WallStamp(DateTime<Local>);

impl WallStamp {
    #[inline]
    pub fn now() -> Self {
        Self(Local::now())
    }
}

impl fmt::Display for WallStamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.format("%Y-%m-%d %H:%M:%S%.3f"))
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn renders_log_prefix_shape() {
        let s = WallStamp::now().to_string();
        // YYYY-MM-DD HH:MM:SS.nnn
        assert_eq!(s.len(), 23);
        assert_eq!(&s[4..5], "-");
        assert_eq!(&s[10..11], " ");
        assert_eq!(&s[19..20], ".");
    }
}
