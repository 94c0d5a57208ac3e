//! EVM address normalization and EIP-55 checksumming.

use sha3::{Digest, Keccak256};

/// Lowercase a `0x`-prefixed 40-hex address, or `None` if malformed.
pub fn normalize_wallet_address(value: &str) -> Option<String> {
    let trimmed = value.trim();
    let hex = trimmed
        .strip_prefix("0x")
        .or_else(|| trimmed.strip_prefix("0X"))?;
    if hex.len() != 40 || !hex.chars().all(|c| c.is_ascii_hexdigit()) {
        return None;
    }
    Some(format!("0x{}", hex.to_ascii_lowercase()))
}

/// EIP-55 mixed-case form of a valid address.
pub fn to_checksum_address(value: &str) -> Option<String> {
    let normalized = normalize_wallet_address(value)?;
    let hex = &normalized[2..];
    let digest = Keccak256::digest(hex.as_bytes());

    let mut out = String::with_capacity(42);
    out.push_str("0x");
    for (i, c) in hex.chars().enumerate() {
        let byte = digest[i / 2];
        let nibble = if i % 2 == 0 { byte >> 4 } else { byte & 0x0f };
        if c.is_ascii_alphabetic() && nibble >= 8 {
            out.push(c.to_ascii_uppercase());
        } else {
            out.push(c);
        }
    }
    Some(out)
}

/// Mixed-case input must match its checksum; all-lower or all-upper input is
/// accepted as unchecksummed.
pub fn is_valid_checksum(value: &str) -> bool {
    let trimmed = value.trim();
    let Some(hex) = trimmed.strip_prefix("0x") else {
        return false;
    };
    let has_lower = hex.chars().any(|c| c.is_ascii_lowercase());
    let has_upper = hex.chars().any(|c| c.is_ascii_uppercase());
    match to_checksum_address(trimmed) {
        Some(checksummed) if has_lower && has_upper => checksummed == trimmed,
        Some(_) => true,
        None => false,
    }
}
