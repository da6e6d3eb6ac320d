use crate::incident::{CrisisType, Severity};

pub type Rgb = (u8, u8, u8);

/// Marker fill color for an incident category.
pub const fn crisis_type_color(kind: CrisisType) -> Rgb {
    match kind {
        CrisisType::Earthquake => (0xd9, 0x25, 0x25),
        CrisisType::Flood => (0x0f, 0x7a, 0xc2),
        CrisisType::Wildfire => (0xff, 0x70, 0x00),
        CrisisType::Hurricane => (0x7e, 0x22, 0xce),
        CrisisType::Tornado => (0x36, 0xa2, 0xeb),
        CrisisType::Landslide => (0x8b, 0x45, 0x13),
        CrisisType::PowerOutage => (0xf1, 0xc2, 0x32),
        CrisisType::Infrastructure => (0x6b, 0x72, 0x80),
        CrisisType::Medical => (0x06, 0xb6, 0xd4),
    }
}

pub const fn severity_color(severity: Severity) -> Rgb {
    match severity {
        Severity::Critical => (0xef, 0x44, 0x44),
        Severity::High => (0xf9, 0x73, 0x16),
        Severity::Medium => (0xfa, 0xcc, 0x15),
        Severity::Low => (0x22, 0xc5, 0x5e),
    }
}

/// `#rrggbb` form for surfaces that take CSS colors.
pub fn hex_css((r, g, b): Rgb) -> String {
    format!("#{r:02x}{g:02x}{b:02x}")
}

/// Parse `#rrggbb` (leading `#` optional).
pub fn parse_hex(value: &str) -> Option<Rgb> {
    let hex = value.trim().trim_start_matches('#');
    if hex.len() != 6 || !hex.is_ascii() {
        return None;
    }
    let channel = |range: std::ops::Range<usize>| u8::from_str_radix(&hex[range], 16).ok();
    Some((channel(0..2)?, channel(2..4)?, channel(4..6)?))
}
