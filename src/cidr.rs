//! CIDR expression parsing.
//!
//! Accepts `addr/len` for IPv4 and IPv6, and a bare address as a single-host
//! prefix. Host bits are kept as written.

use crate::error::CidrError;
use crate::types::NetworkPrefix;
use ipnetwork::IpNetwork;
use std::net::IpAddr;

/// Parse one CIDR expression such as `1.2.3.0/24`, `2a01:28::/32` or `1.2.3.4`.
pub fn parse_cidr(token: &str) -> Result<NetworkPrefix, CidrError> {
    let (addr_part, len_part) = match token.split_once('/') {
        Some((addr, len)) => (addr, Some(len)),
        None => (token, None),
    };

    let addr: IpAddr = addr_part.parse().map_err(|_| CidrError::InvalidAddress {
        token: token.to_string(),
    })?;

    let max_len = match addr {
        IpAddr::V4(_) => 32,
        IpAddr::V6(_) => 128,
    };

    let prefix_len = match len_part {
        // Digits only, no signs or padding zeros that `u8::from_str` would let through.
        Some(len)
            if len.is_empty()
                || !len.bytes().all(|b| b.is_ascii_digit())
                || (len.len() > 1 && len.starts_with('0')) =>
        {
            return Err(CidrError::InvalidPrefixLength {
                token: token.to_string(),
            })
        }
        Some(len) => len
            .parse::<u8>()
            .ok()
            .filter(|l| *l <= max_len)
            .ok_or_else(|| CidrError::InvalidPrefixLength {
                token: token.to_string(),
            })?,
        None => max_len,
    };

    IpNetwork::new(addr, prefix_len).map_err(|_| CidrError::InvalidPrefixLength {
        token: token.to_string(),
    })
}
