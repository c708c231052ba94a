//! Request line parser.
//!
//! Grammar (hex digits are case-insensitive):
//!
//! ```text
//! R dddd rr          read   (7 bytes)
//! W dddd rr vvvv     write  (11 bytes)
//! ```
//!
//! Validation runs in a fixed order and the first failure wins:
//! length, then command shape, then hex digits.

use core::fmt;

use crate::store::RegisterKey;

/// Longest line accepted before the command is even looked at.
pub const MAX_LINE_LEN: usize = 12;

/// Length of a well-formed read request.
pub const READ_LEN: usize = 7;

/// Length of a well-formed write request.
pub const WRITE_LEN: usize = 11;

/// A validated request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Request {
    Read { key: RegisterKey },
    Write { key: RegisterKey, value: u16 },
}

impl Request {
    pub const fn key(&self) -> RegisterKey {
        match self {
            Self::Read { key } | Self::Write { key, .. } => *key,
        }
    }
}

/// Reasons a line is rejected before it reaches the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProtocolError {
    /// Line longer than [`MAX_LINE_LEN`].
    IllegalLength,
    /// Neither a 7-byte `R…` nor an 11-byte `W…` line.
    IllegalCommand,
    /// A byte after the command letter is not a hex digit.
    IllegalCharacter,
}

impl ProtocolError {
    /// Wire text of the rejection, without the `X ` prefix.
    pub const fn reason(&self) -> &'static str {
        match self {
            Self::IllegalLength => "illegal length",
            Self::IllegalCommand => "illegal command",
            Self::IllegalCharacter => "illegal character",
        }
    }
}

impl fmt::Display for ProtocolError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.reason())
    }
}

#[derive(Clone, Copy)]
enum Command {
    Read,
    Write,
}

/// Parse one request line (terminator already stripped).
pub fn parse(line: &[u8]) -> Result<Request, ProtocolError> {
    if line.len() > MAX_LINE_LEN {
        return Err(ProtocolError::IllegalLength);
    }

    let command = match (line.len(), line.first()) {
        (READ_LEN, Some(b'R')) => Command::Read,
        (WRITE_LEN, Some(b'W')) => Command::Write,
        _ => return Err(ProtocolError::IllegalCommand),
    };

    let digits = &line[1..];
    if !digits.iter().all(u8::is_ascii_hexdigit) {
        return Err(ProtocolError::IllegalCharacter);
    }

    let key = RegisterKey::new(
        hex_value(&digits[0..4]) as u16,
        hex_value(&digits[4..6]) as u8,
    );

    Ok(match command {
        Command::Read => Request::Read { key },
        Command::Write => Request::Write {
            key,
            value: hex_value(&digits[6..10]) as u16,
        },
    })
}

/// Fold already-validated hex digits into an integer.
fn hex_value(digits: &[u8]) -> u32 {
    digits
        .iter()
        .fold(0, |acc, &d| (acc << 4) | u32::from(nibble(d)))
}

fn nibble(d: u8) -> u8 {
    match d {
        b'0'..=b'9' => d - b'0',
        b'a'..=b'f' => d - b'a' + 10,
        b'A'..=b'F' => d - b'A' + 10,
        _ => 0,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_read() {
        assert_eq!(
            parse(b"R00AA01"),
            Ok(Request::Read {
                key: RegisterKey::new(0x00AA, 0x01)
            })
        );
    }

    #[test]
    fn parses_write_mixed_case() {
        assert_eq!(
            parse(b"W00aA01bEeF"),
            Ok(Request::Write {
                key: RegisterKey::new(0x00AA, 0x01),
                value: 0xBEEF
            })
        );
    }

    #[test]
    fn parses_extremes() {
        assert_eq!(
            parse(b"WFFFFFFFFFF"),
            Ok(Request::Write {
                key: RegisterKey::new(0xFFFF, 0xFF),
                value: 0xFFFF
            })
        );
        assert_eq!(
            parse(b"R000000"),
            Ok(Request::Read {
                key: RegisterKey::new(0, 0)
            })
        );
    }

    #[test]
    fn length_checked_before_command() {
        assert_eq!(parse(b"0123456789ABC"), Err(ProtocolError::IllegalLength));
        assert_eq!(parse(b"ZZZZZZZZZZZZZ"), Err(ProtocolError::IllegalLength));
        assert_eq!(parse(&[0xFF; 40]), Err(ProtocolError::IllegalLength));
    }

    #[test]
    fn twelve_bytes_is_a_command_error() {
        assert_eq!(parse(b"W00AA01BEEF0"), Err(ProtocolError::IllegalCommand));
    }

    #[test]
    fn command_shape() {
        assert_eq!(parse(b""), Err(ProtocolError::IllegalCommand));
        assert_eq!(parse(b"ZZZZZZZZZZZ"), Err(ProtocolError::IllegalCommand));
        // Right letter, wrong length.
        assert_eq!(parse(b"R00AA01BEEF"), Err(ProtocolError::IllegalCommand));
        assert_eq!(parse(b"W00AA01"), Err(ProtocolError::IllegalCommand));
        // Command letter is case-sensitive.
        assert_eq!(parse(b"r00AA01"), Err(ProtocolError::IllegalCommand));
    }

    #[test]
    fn command_checked_before_characters() {
        assert_eq!(parse(b"Q00AA0G"), Err(ProtocolError::IllegalCommand));
    }

    #[test]
    fn non_hex_rejected() {
        assert_eq!(parse(b"R00AA0G"), Err(ProtocolError::IllegalCharacter));
        assert_eq!(parse(b"W00AA01BEE "), Err(ProtocolError::IllegalCharacter));
        assert_eq!(parse(b"R\0\0\0\0\0\0"), Err(ProtocolError::IllegalCharacter));
    }

    #[test]
    fn reason_text() {
        assert_eq!(ProtocolError::IllegalLength.to_string(), "illegal length");
        assert_eq!(ProtocolError::IllegalCommand.to_string(), "illegal command");
        assert_eq!(
            ProtocolError::IllegalCharacter.to_string(),
            "illegal character"
        );
    }
}
