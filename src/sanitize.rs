//! Recognizes placeholder strings that firmware vendors leave in SMBIOS
//! fields instead of real values.

/// Values that are placeholders when a field starts with them, compared
/// ASCII case-insensitively.
pub const PLACEHOLDER_PREFIXES: &[&str] = &[
    "To be filled",
    "To be set",
    "OEM",
    "O.E.M.",
    "System Product",
];

/// Values that are placeholders when a field equals them, compared ASCII
/// case-insensitively.
pub const PLACEHOLDER_VALUES: &[&str] = &[
    "None",
    "System Name",
    "System Version",
    "Default string",
    "Undefined",
    "Not Specified",
    "Not Applicable",
    "Not Defined",
    "Not Available",
    "INVALID",
    "Type1ProductConfigId",
    "No Enclosure",
    "Chassis Version",
    "All Series",
    "N/A",
    "0x0000",
];

/// Reports whether `text` holds a real value: it is non-empty once trailing
/// whitespace is trimmed and is not a known placeholder.
pub fn is_significant(text: &str) -> bool {
    let text = text.trim_end();

    !text.is_empty()
        && !PLACEHOLDER_PREFIXES
            .iter()
            .any(|prefix| starts_with_ignore_case(text, prefix))
        && !PLACEHOLDER_VALUES
            .iter()
            .any(|value| text.eq_ignore_ascii_case(value))
}

fn starts_with_ignore_case(text: &str, prefix: &str) -> bool {
    text.as_bytes()
        .get(..prefix.len())
        .is_some_and(|head| head.eq_ignore_ascii_case(prefix.as_bytes()))
}
