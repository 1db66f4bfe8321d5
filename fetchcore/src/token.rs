use std::fmt;

/// Identifies one request cycle of a single loader.
///
/// Tokens are minted in strictly increasing order and never reused, so a
/// response can tell whether it still belongs to the current cycle by comparing
/// its token with the loader's.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub(crate) struct RequestToken(u64);

impl fmt::Display for RequestToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Per-loader source of request tokens.
#[derive(Debug, Default)]
pub(crate) struct TokenMint {
    last: u64,
}

impl TokenMint {
    pub(crate) fn mint(&mut self) -> RequestToken {
        self.last += 1;
        RequestToken(self.last)
    }
}
