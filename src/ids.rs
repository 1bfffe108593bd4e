use std::fmt::{Display, Formatter};
use std::str::FromStr;

/// Strongly typed dispatch identifier backed by ULID.
///
/// Every `request` / `notify` call gets one so that its lookup, invocation and
/// failure log lines can be correlated, including across the hop to a worker.
#[derive(Clone, Copy, Eq, PartialEq, Hash, Debug)]
pub struct DispatchId(pub ulid::Ulid);

impl DispatchId {
    #[must_use]
    pub fn new() -> Self {
        Self(ulid::Ulid::new())
    }
}

impl Default for DispatchId {
    fn default() -> Self {
        Self::new()
    }
}

impl Display for DispatchId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for DispatchId {
    type Err = ulid::DecodeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let id = ulid::Ulid::from_string(s)?;
        Ok(DispatchId(id))
    }
}
