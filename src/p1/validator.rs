//! Checks the fixed-width `DD.DDD` kW encoding used by both power registers.

/// Length of a well-formed value, `DD.DDD`.
const VALUE_WIDTH: usize = 6;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("cannot convert {} to a power value: {reason}", quoted(.token))]
pub struct ConversionError {
    /// The token exactly as it came off the line, before any trimming.
    pub token: Option<String>,
    pub reason: String,
}

impl ConversionError {
    fn new(token: Option<&str>, reason: impl Into<String>) -> Self {
        Self {
            token: token.map(str::to_string),
            reason: reason.into(),
        }
    }
}

/// Converts a register token to kW.
///
/// Tokens that fail the `DD.DDD` check are given one more chance: surrounding
/// whitespace is trimmed and only the first six characters are checked again.
/// Some meters occasionally pad the value with stray whitespace; everything
/// else is rejected.
pub fn validate(token: Option<&str>) -> Result<f64, ConversionError> {
    let Some(raw) = token else {
        return Err(ConversionError::new(None, "token was absent"));
    };

    if is_well_formed(raw) {
        return parse(raw, raw);
    }

    match raw.trim().get(..VALUE_WIDTH) {
        Some(head) if is_well_formed(head) => parse(head, raw),
        _ => Err(ConversionError::new(Some(raw), "expected DD.DDD")),
    }
}

fn quoted(token: &Option<String>) -> String {
    match token {
        Some(token) => format!("{:?}", token),
        None => "nothing".to_string(),
    }
}

fn is_well_formed(s: &str) -> bool {
    let b = s.as_bytes();

    b.len() == VALUE_WIDTH
        && b[..2].iter().all(u8::is_ascii_digit)
        && b[2] == b'.'
        && b[3..].iter().all(u8::is_ascii_digit)
}

fn parse(value: &str, raw: &str) -> Result<f64, ConversionError> {
    value
        .parse::<f64>()
        .map_err(|err| ConversionError::new(Some(raw), err.to_string()))
}
