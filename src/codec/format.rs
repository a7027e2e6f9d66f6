//! Native and wire sample formats

use std::fmt;
use std::str::FromStr;

use serde::Deserialize;

/// Format a device delivers its interleaved I/Q values in
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SampleFormat {
    /// Unsigned 8-bit, 127.5 is zero (RTL2832U)
    U8,
    /// Signed 16-bit, native endian
    I16,
    /// 32-bit float, native endian
    F32,
}

impl SampleFormat {
    /// Bytes per I or Q value
    pub const fn value_size(self) -> usize {
        match self {
            SampleFormat::U8 => 1,
            SampleFormat::I16 => 2,
            SampleFormat::F32 => 4,
        }
    }
}

impl fmt::Display for SampleFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SampleFormat::U8 => f.write_str("u8"),
            SampleFormat::I16 => f.write_str("s16"),
            SampleFormat::F32 => f.write_str("f32"),
        }
    }
}

/// Format written to streaming clients
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WireFormat {
    /// Unsigned 8-bit pairs, rtl_tcp compatible
    U8,
    /// Little-endian 32-bit float pairs
    #[default]
    F32,
}

impl WireFormat {
    /// Bytes per I or Q value
    pub const fn value_size(self) -> usize {
        match self {
            WireFormat::U8 => 1,
            WireFormat::F32 => 4,
        }
    }
}

impl fmt::Display for WireFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WireFormat::U8 => f.write_str("u8"),
            WireFormat::F32 => f.write_str("f32"),
        }
    }
}

impl FromStr for WireFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "u8" | "uint8" => Ok(WireFormat::U8),
            "f32" | "float" => Ok(WireFormat::F32),
            other => Err(format!("unknown wire format: {other}")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wire_format_parse() {
        assert_eq!("u8".parse::<WireFormat>().unwrap(), WireFormat::U8);
        assert_eq!("FLOAT".parse::<WireFormat>().unwrap(), WireFormat::F32);
        assert!("s16".parse::<WireFormat>().is_err());
    }
}
