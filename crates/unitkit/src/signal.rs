//! POSIX signals accepted by `systemd.unit.state`

use crate::error::Error;
use std::fmt;
use std::str::FromStr;

const NAMES: [&str; 31] = [
    "SIGHUP", "SIGINT", "SIGQUIT", "SIGILL", "SIGTRAP", "SIGABRT", "SIGBUS", "SIGFPE", "SIGKILL",
    "SIGUSR1", "SIGSEGV", "SIGUSR2", "SIGPIPE", "SIGALRM", "SIGTERM", "SIGSTKFLT", "SIGCHLD",
    "SIGCONT", "SIGSTOP", "SIGTSTP", "SIGTTIN", "SIGTTOU", "SIGURG", "SIGXCPU", "SIGXFSZ",
    "SIGVTALRM", "SIGPROF", "SIGWINCH", "SIGIO", "SIGPWR", "SIGSYS",
];

/// A signal number in `1..=31`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Signal(u8);

impl Signal {
    pub const TERM: Self = Self(15);
    pub const KILL: Self = Self(9);
    pub const HUP: Self = Self(1);

    pub fn from_number(number: i64) -> Option<Self> {
        u8::try_from(number)
            .ok()
            .filter(|n| (1..=31).contains(n))
            .map(Self)
    }

    pub fn number(self) -> i32 {
        i32::from(self.0)
    }

    /// Canonical name, e.g. `SIGTERM`
    pub fn name(self) -> &'static str {
        NAMES[usize::from(self.0 - 1)]
    }
}

impl fmt::Display for Signal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Accepts `15`, `TERM`, `sigterm`, `SIGTERM`
impl FromStr for Signal {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        if let Ok(number) = trimmed.parse::<i64>() {
            return Self::from_number(number).ok_or_else(|| Error::InvalidSignal(s.to_string()));
        }

        let upper = trimmed.to_ascii_uppercase();
        let bare = upper.strip_prefix("SIG").unwrap_or(&upper);
        NAMES
            .iter()
            .position(|name| name[3..] == *bare)
            .and_then(|i| u8::try_from(i + 1).ok())
            .map(Self)
            .ok_or_else(|| Error::InvalidSignal(s.to_string()))
    }
}
