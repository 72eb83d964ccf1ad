use rand::RngCore;
use rand::rngs::OsRng;
use std::fmt;

const RADIX_DIGITS: &[u8; 32] = b"0123456789abcdefghijklmnopqrstuv";
/// 128 bits in radix 32 is 26 digits (the top digit carries 3 bits).
const PASSWORD_LEN: usize = 26;

/// Password protecting a key entry inside a [`CredentialStore`](crate::CredentialStore).
///
/// Lives only as long as the caller keeps it; never written anywhere.
#[derive(Clone, PartialEq, Eq)]
pub struct KeyPassword(String);

impl KeyPassword {
    /// 128 bits from the OS RNG, rendered as 26 radix-32 digits (`0-9a-v`).
    pub fn generate() -> Self {
        let mut bytes = [0u8; 16];
        OsRng.fill_bytes(&mut bytes);
        Self(to_radix32(u128::from_be_bytes(bytes)))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for KeyPassword {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for KeyPassword {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl fmt::Debug for KeyPassword {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("KeyPassword(****)")
    }
}

fn to_radix32(mut value: u128) -> String {
    let mut digits = [b'0'; PASSWORD_LEN];
    for slot in digits.iter_mut().rev() {
        *slot = RADIX_DIGITS[(value & 0x1f) as usize];
        value >>= 5;
    }
    // Only ASCII digits were written
    digits.iter().map(|&b| b as char).collect()
}
