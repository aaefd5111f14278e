//! Four-letter admin words.
//!
//! A connection whose first four bytes spell one of these words gets a
//! plain-text answer instead of a session. No valid connect frame can start
//! with them: read as a length prefix they are all far above the frame limit.

/// Admin commands answered on the client port.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FourLetterWord {
    /// Liveness probe, answered with `imok`.
    Ruok,
    /// Server summary.
    Srvr,
    /// Server summary (alias kept for older tooling).
    Stat,
    /// Tab-separated monitoring values.
    Mntr,
    /// Effective configuration.
    Conf,
    /// Process environment.
    Envi,
}

impl FourLetterWord {
    pub const ALL: [FourLetterWord; 6] = [
        FourLetterWord::Ruok,
        FourLetterWord::Srvr,
        FourLetterWord::Stat,
        FourLetterWord::Mntr,
        FourLetterWord::Conf,
        FourLetterWord::Envi,
    ];

    pub fn parse(prefix: &[u8; 4]) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|word| word.as_str().as_bytes() == prefix)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            FourLetterWord::Ruok => "ruok",
            FourLetterWord::Srvr => "srvr",
            FourLetterWord::Stat => "stat",
            FourLetterWord::Mntr => "mntr",
            FourLetterWord::Conf => "conf",
            FourLetterWord::Envi => "envi",
        }
    }
}
