use crate::prelude::*;
use crate::p1::port::LinePort;

pub const DELIVERED_PREFIX: &[u8] = b"1-0:1.7.0";
pub const RETURNED_PREFIX: &[u8] = b"1-0:2.7.0";

/// A DSMR 5 telegram is around 25-30 lines; anything past this means one of
/// the two registers is not coming.
pub const MAX_TELEGRAM_LINES: usize = 40;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ScanError {
    #[error("power registers not found in telegram, gave up after {lines} lines")]
    Incomplete { lines: usize },

    #[error("no value found in telegram line {line:?}")]
    Malformed { line: String },
}

/// Raw value strings of both power registers, e.g. `01.193`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Tokens {
    pub delivered: String,
    pub returned: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TelegramScanner {
    max_lines: usize,
}

impl Default for TelegramScanner {
    fn default() -> Self {
        Self::new()
    }
}

impl TelegramScanner {
    pub fn new() -> Self {
        Self {
            max_lines: MAX_TELEGRAM_LINES,
        }
    }

    /// Reads lines from `port` until both power registers have been seen.
    ///
    /// Fails with [`ScanError::Incomplete`] once `max_lines` lines have been
    /// read without finding both, and with [`ScanError::Malformed`] as soon as
    /// a register line carries no `(value*unit)` group. Errors raised by the
    /// port itself are passed through untouched.
    pub fn scan<P>(&self, port: &mut P) -> Result<Tokens>
    where
        P: LinePort + ?Sized,
    {
        let mut delivered = None;
        let mut returned = None;

        for _ in 0..self.max_lines {
            let line = port.read_line()?;

            let slot = if line.starts_with(DELIVERED_PREFIX) {
                &mut delivered
            } else if line.starts_with(RETURNED_PREFIX) {
                &mut returned
            } else {
                continue;
            };

            let token = extract_token(&line).ok_or_else(|| ScanError::Malformed {
                line: String::from_utf8_lossy(&line).trim_end().to_string(),
            })?;
            *slot = Some(token);

            if let (Some(delivered), Some(returned)) = (&delivered, &returned) {
                return Ok(Tokens {
                    delivered: delivered.clone(),
                    returned: returned.clone(),
                });
            }
        }

        Err(ScanError::Incomplete {
            lines: self.max_lines,
        }
        .into())
    }
}

/// The bytes between the first `(` and the `*` that follows it.
pub fn extract_token(line: &[u8]) -> Option<String> {
    let open = line.iter().position(|&b| b == b'(')?;
    let rest = &line[open + 1..];
    let star = rest.iter().position(|&b| b == b'*')?;

    Some(String::from_utf8_lossy(&rest[..star]).into_owned())
}
