use crate::error::ParseError;

const KB: u64 = 1024;
const MB: u64 = 1024 * 1024;
const GB: u64 = 1024 * 1024 * 1024;

/// Parse a human size literal into bytes: `3.5mb`, `10 KB`, `2gb`, `4096`.
///
/// `kb`/`mb`/`gb` take a decimal value and truncate the scaled result; without a
/// suffix the literal must be a plain integer byte count. Whitespace is ignored.
pub fn parse_size(literal: &str) -> Result<u64, ParseError> {
    let s: String = literal.chars().filter(|c| !c.is_whitespace()).collect::<String>().to_lowercase();
    let invalid = || ParseError::InvalidSize(literal.to_string());

    for (suffix, mult) in [("kb", KB), ("mb", MB), ("gb", GB)] {
        if let Some(num) = s.strip_suffix(suffix) {
            if num.is_empty() || !num.chars().all(|c| c.is_ascii_digit() || c == '.') {
                return Err(invalid());
            }
            let v: f64 = num.parse().map_err(|_| invalid())?;
            let bytes = v * mult as f64;
            if !bytes.is_finite() || bytes >= u64::MAX as f64 {
                return Err(invalid());
            }
            return Ok(bytes.trunc() as u64);
        }
    }

    if s.is_empty() || !s.chars().all(|c| c.is_ascii_digit()) {
        return Err(invalid());
    }
    s.parse::<u64>().map_err(|_| invalid())
}
