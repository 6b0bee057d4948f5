//! Byte size strings, as written in configurations and parted reports.

use std::fmt;

/// A size string that could not be decoded into bytes.
#[derive(Debug, Clone, PartialEq, Fail)]
#[fail(display = "invalid size '{}': {}", input, reason)]
pub struct SizeError {
    pub input:  String,
    pub reason: &'static str,
}

impl SizeError {
    fn new(input: &str, reason: &'static str) -> Self {
        SizeError { input: input.to_owned(), reason }
    }
}

fn multiplier(unit: &str) -> Option<u64> {
    const KI: u64 = 1024;
    const K: u64 = 1000;

    let value = match unit {
        "" | "b" => 1,
        "k" | "kb" => K,
        "ki" | "kib" => KI,
        "m" | "mb" => K.pow(2),
        "mi" | "mib" => KI.pow(2),
        "g" | "gb" => K.pow(3),
        "gi" | "gib" => KI.pow(3),
        "t" | "tb" => K.pow(4),
        "ti" | "tib" => KI.pow(4),
        "p" | "pb" => K.pow(5),
        "pi" | "pib" => KI.pow(5),
        "e" | "eb" => K.pow(6),
        "ei" | "eib" => KI.pow(6),
        _ => return None,
    };

    Some(value)
}

/// Decodes a size such as `512MiB`, `1.5 GB` or `1048576B` into bytes.
///
/// Binary prefixes (`KiB`, `MiB`, ...) are powers of 1024 and decimal prefixes (`KB`,
/// `MB`, ...) are powers of 1000. Units are case-insensitive and a bare number is bytes.
pub fn parse_size(input: &str) -> Result<u64, SizeError> {
    let trimmed = input.trim();
    let split = trimmed
        .find(|c: char| !(c.is_ascii_digit() || c == '.'))
        .unwrap_or_else(|| trimmed.len());
    let (number, unit) = trimmed.split_at(split);

    if number.is_empty() {
        return Err(SizeError::new(input, "no numeric value"));
    }

    let unit = unit.trim_start().to_ascii_lowercase();
    let multiplier = multiplier(&unit).ok_or_else(|| SizeError::new(input, "unknown unit"))?;

    if !number.contains('.') {
        let value = number.parse::<u64>().map_err(|_| SizeError::new(input, "invalid number"))?;
        return value.checked_mul(multiplier).ok_or_else(|| SizeError::new(input, "too large"));
    }

    let value = number.parse::<f64>().map_err(|_| SizeError::new(input, "invalid number"))?;
    let bytes = value * multiplier as f64;
    if bytes >= u64::max_value() as f64 {
        return Err(SizeError::new(input, "too large"));
    }

    Ok(bytes as u64)
}

/// Displays a byte count with SI units, such as `134 MB` or `9.5 kB`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Human(pub u64);

impl fmt::Display for Human {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        const UNITS: [&str; 7] = ["B", "kB", "MB", "GB", "TB", "PB", "EB"];

        if self.0 < 10 {
            return write!(f, "{} B", self.0);
        }

        let mut exponent = 0;
        let mut scaled = self.0 as f64;
        while scaled >= 1000.0 && exponent < UNITS.len() - 1 {
            scaled /= 1000.0;
            exponent += 1;
        }

        let value = (scaled * 10.0 + 0.5).floor() / 10.0;

        if value < 10.0 {
            write!(f, "{:.1} {}", value, UNITS[exponent])
        } else {
            write!(f, "{:.0} {}", value, UNITS[exponent])
        }
    }
}
