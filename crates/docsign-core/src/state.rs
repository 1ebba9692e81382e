//! Signing pipeline states
//!
//! A signing call moves strictly forward through
//! `Unsigned -> PlaceholderInjected -> ByteRangeResolved -> Signed`. A
//! failure abandons the call; there is no resuming from the middle.

use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SigningState {
    /// Raw input, nothing written yet
    Unsigned,
    /// Signature dictionary and widget are in place, ByteRange is sentinels
    PlaceholderInjected,
    /// Real ByteRange written, Contents still zero-filled
    ByteRangeResolved,
    /// Signature embedded
    Signed,
}

impl SigningState {
    /// The only state reachable from this one
    pub fn next(self) -> Option<SigningState> {
        match self {
            SigningState::Unsigned => Some(SigningState::PlaceholderInjected),
            SigningState::PlaceholderInjected => Some(SigningState::ByteRangeResolved),
            SigningState::ByteRangeResolved => Some(SigningState::Signed),
            SigningState::Signed => None,
        }
    }

    pub fn can_transition_to(self, target: SigningState) -> bool {
        self.next() == Some(target)
    }

    pub fn is_terminal(self) -> bool {
        self.next().is_none()
    }

    pub fn as_str(self) -> &'static str {
        match self {
            SigningState::Unsigned => "unsigned",
            SigningState::PlaceholderInjected => "placeholder_injected",
            SigningState::ByteRangeResolved => "byte_range_resolved",
            SigningState::Signed => "signed",
        }
    }
}

impl fmt::Display for SigningState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
