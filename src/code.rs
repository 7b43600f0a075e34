//! Room codes: short, human-typeable, unambiguous.

use std::fmt;
use std::str::FromStr;

use rand::Rng;
use serde::{Deserialize, Serialize};

/// Alphabet with easily-confused glyphs removed (0/O, 1/I/L, 2/Z, 5/S, 8/B, U/V).
const ALPHABET: &[u8] = b"ACDEFGHJKMNPQRTWXY34679";

pub const CODE_LEN: usize = 4;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct RoomCode([u8; CODE_LEN]);

impl RoomCode {
    /// Generate a random code. Uniqueness is the registry's problem.
    pub fn random() -> Self {
        let mut rng = rand::thread_rng();
        let mut buf = [0u8; CODE_LEN];
        for b in &mut buf {
            *b = ALPHABET[rng.gen_range(0..ALPHABET.len())];
        }
        RoomCode(buf)
    }

    pub fn as_str(&self) -> &str {
        // Invariant: only ASCII from ALPHABET is ever stored.
        std::str::from_utf8(&self.0).unwrap_or("????")
    }
}

/// Uppercase a typed character and check it against the alphabet.
/// Confusable glyphs were never issued, so they simply fail to parse.
fn fold(c: char) -> Option<u8> {
    let b = c.to_ascii_uppercase() as u8;
    if ALPHABET.contains(&b) {
        Some(b)
    } else {
        None
    }
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
#[error("invalid room code")]
pub struct InvalidRoomCode;

impl FromStr for RoomCode {
    type Err = InvalidRoomCode;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if s.chars().count() != CODE_LEN {
            return Err(InvalidRoomCode);
        }
        let mut buf = [0u8; CODE_LEN];
        for (slot, c) in buf.iter_mut().zip(s.chars()) {
            *slot = fold(c).ok_or(InvalidRoomCode)?;
        }
        Ok(RoomCode(buf))
    }
}

impl TryFrom<String> for RoomCode {
    type Error = InvalidRoomCode;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        s.parse()
    }
}

impl From<RoomCode> for String {
    fn from(code: RoomCode) -> String {
        code.as_str().to_owned()
    }
}

impl fmt::Display for RoomCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
