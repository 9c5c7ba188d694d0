#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(i32)]
pub enum ExitCode {
    Success = 0,

    /// A single-pass run (`run --once`, `dump`) did not deliver its payload.
    PassFailed = 10,

    /// Invalid CLI/config (bad flags, unreadable or invalid config file, missing api key, etc.).
    InvalidInput = 30,

    /// Internal/runtime error (process stats unavailable, signal handling, etc.).
    RuntimeError = 40,
}

impl ExitCode {
    #[must_use]
    pub fn as_i32(self) -> i32 {
        self as i32
    }

    #[must_use]
    pub fn from_pass(sent: bool) -> Self {
        if sent { Self::Success } else { Self::PassFailed }
    }
}
