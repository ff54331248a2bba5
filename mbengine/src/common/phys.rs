use crate::decode::PhysDecodeLevel;
use std::fmt::Write;

pub(crate) struct PhysDisplay<'a> {
    level: PhysDecodeLevel,
    data: &'a [u8],
}

impl<'a> PhysDisplay<'a> {
    pub(crate) fn new(level: PhysDecodeLevel, data: &'a [u8]) -> Self {
        PhysDisplay { level, data }
    }
}

impl std::fmt::Display for PhysDisplay<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(f, "{} bytes", self.data.len())?;
        if self.level.data_enabled() {
            format_bytes(f, self.data)?;
        }
        Ok(())
    }
}

pub(crate) fn log_tx(level: PhysDecodeLevel, data: &[u8]) {
    if level.enabled() {
        tracing::info!("PHYS TX - {}", PhysDisplay::new(level, data));
    }
}

pub(crate) fn log_rx(level: PhysDecodeLevel, data: &[u8]) {
    if level.enabled() {
        tracing::info!("PHYS RX - {}", PhysDisplay::new(level, data));
    }
}

const BYTES_PER_DECODE_LINE: usize = 18;

pub(crate) fn format_bytes(f: &mut std::fmt::Formatter, bytes: &[u8]) -> std::fmt::Result {
    for chunk in bytes.chunks(BYTES_PER_DECODE_LINE) {
        writeln!(f)?;
        let mut first = true;
        for byte in chunk {
            if !first {
                f.write_char(' ')?;
            }
            first = false;
            write!(f, "{byte:02X?}")?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn length_only_omits_the_bytes() {
        let text = PhysDisplay::new(PhysDecodeLevel::Length, &[0x01, 0x02]).to_string();
        assert_eq!(text, "2 bytes");
    }

    #[test]
    fn data_level_wraps_lines() {
        let data: Vec<u8> = (0..20).collect();
        let text = PhysDisplay::new(PhysDecodeLevel::Data, &data).to_string();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), 3);
        assert_eq!(lines[0], "20 bytes");
        assert!(lines[1].starts_with("00 01 02"));
        assert_eq!(lines[2], "12 13");
    }
}
