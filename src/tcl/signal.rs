//! The signal catalog (SPEC_FULL.md §4.1): symbolic names to OS signal
//! numbers, with a safe default for anything unrecognized.

use crate::mylibc;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Signal {
    Term,
    Kill,
    Usr1,
    Usr2,
    Int,
    Hup,
    Quit,
}

impl Signal {
    /// Case-insensitive lookup by symbolic name. Unknown or empty names
    /// resolve to `TERM` and log a warning, they never fail the caller.
    pub fn from_name(name: &str) -> Signal {
        match name.to_ascii_uppercase().as_str() {
            "TERM" => Signal::Term,
            "KILL" => Signal::Kill,
            "USR1" => Signal::Usr1,
            "USR2" => Signal::Usr2,
            "INT" => Signal::Int,
            "HUP" => Signal::Hup,
            "QUIT" => Signal::Quit,
            other => {
                tracing::warn!("unknown stop signal '{other}', defaulting to TERM");
                Signal::Term
            }
        }
    }

    pub fn as_libc(&self) -> i32 {
        match self {
            Signal::Term => mylibc::SIGTERM,
            Signal::Kill => mylibc::SIGKILL,
            Signal::Usr1 => mylibc::SIGUSR1,
            Signal::Usr2 => mylibc::SIGUSR2,
            Signal::Int => mylibc::SIGINT,
            Signal::Hup => mylibc::SIGHUP,
            Signal::Quit => mylibc::SIGQUIT,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Signal::Term => "TERM",
            Signal::Kill => "KILL",
            Signal::Usr1 => "USR1",
            Signal::Usr2 => "USR2",
            Signal::Int => "INT",
            Signal::Hup => "HUP",
            Signal::Quit => "QUIT",
        }
    }
}

impl Default for Signal {
    fn default() -> Self {
        Signal::Term
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn is_case_insensitive() {
        assert_eq!(Signal::from_name("term"), Signal::Term);
        assert_eq!(Signal::from_name("Hup"), Signal::Hup);
    }

    #[test]
    fn unknown_name_defaults_to_term() {
        assert_eq!(Signal::from_name(""), Signal::Term);
        assert_eq!(Signal::from_name("BOGUS"), Signal::Term);
    }
}
