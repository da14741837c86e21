#![no_std]

//! lbgraph common primitives
//!
//! IPv4 CIDR parsing and the FNV-1a hash shared by the control plane.
//! Everything here is `no_std` and allocation-free so it can be reused by
//! any consumer that needs to agree byte-for-byte on prefixes and checksums.

use core::fmt;
use core::net::Ipv4Addr;
use core::str::FromStr;

/// Longest valid IPv4 mask length
pub const IPV4_MAX_MASK_LEN: u8 = 32;

/// FNV-1a 64-bit offset basis
pub const FNV_OFFSET: u64 = 0xcbf29ce484222325;

/// FNV-1a 64-bit prime
pub const FNV_PRIME: u64 = 0x100000001b3;

/// Reason a CIDR text was rejected
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CidrError {
    /// Text was empty
    Empty,
    /// No `/mask` part, or nothing after the slash
    MissingMask,
    /// Address part is not a dotted-quad IPv4 address
    InvalidAddress,
    /// Mask part is not a non-negative integer
    InvalidMask,
    /// Mask is an integer greater than 32
    MaskOutOfRange,
}

impl CidrError {
    /// Stable label, suitable for metrics
    pub const fn as_str(&self) -> &'static str {
        match self {
            CidrError::Empty => "empty",
            CidrError::MissingMask => "missing_mask",
            CidrError::InvalidAddress => "invalid_address",
            CidrError::InvalidMask => "invalid_mask",
            CidrError::MaskOutOfRange => "mask_out_of_range",
        }
    }
}

impl fmt::Display for CidrError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Normalised IPv4 network: host bits are always zero
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Ipv4Prefix {
    network: Ipv4Addr,
    mask_len: u8,
}

impl Ipv4Prefix {
    /// Build a prefix, clearing any host bits set in `addr`
    pub fn new(addr: Ipv4Addr, mask_len: u8) -> Result<Self, CidrError> {
        if mask_len > IPV4_MAX_MASK_LEN {
            return Err(CidrError::MaskOutOfRange);
        }
        Ok(Self {
            network: mask_address(addr, mask_len),
            mask_len,
        })
    }

    #[inline]
    pub const fn network(&self) -> Ipv4Addr {
        self.network
    }

    #[inline]
    pub const fn mask_len(&self) -> u8 {
        self.mask_len
    }

    /// Check whether `addr` falls inside this network
    pub fn contains(&self, addr: Ipv4Addr) -> bool {
        mask_address(addr, self.mask_len) == self.network
    }
}

impl fmt::Display for Ipv4Prefix {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.network, self.mask_len)
    }
}

impl FromStr for Ipv4Prefix {
    type Err = CidrError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        parse_ipv4_cidr(s)
    }
}

/// Clear the host bits of `addr` for a mask of `mask_len` bits
///
/// `mask_len` values above 32 are treated as 32.
pub fn mask_address(addr: Ipv4Addr, mask_len: u8) -> Ipv4Addr {
    let len = u32::from(mask_len.min(IPV4_MAX_MASK_LEN));
    let mask = if len == 0 { 0 } else { u32::MAX << (32 - len) };
    Ipv4Addr::from(u32::from(addr) & mask)
}

/// Parse `a.b.c.d/len` into a normalised [`Ipv4Prefix`]
///
/// The text is taken as-is: surrounding whitespace is an error. The mask
/// must be plain decimal digits without a leading zero (`/0` itself is fine).
pub fn parse_ipv4_cidr(text: &str) -> Result<Ipv4Prefix, CidrError> {
    if text.is_empty() {
        return Err(CidrError::Empty);
    }

    let (addr, mask) = text.split_once('/').ok_or(CidrError::MissingMask)?;
    let addr = Ipv4Addr::from_str(addr).map_err(|_| CidrError::InvalidAddress)?;

    if mask.is_empty() {
        return Err(CidrError::MissingMask);
    }
    if !mask.bytes().all(|b| b.is_ascii_digit()) {
        return Err(CidrError::InvalidMask);
    }
    if mask.len() > 1 && mask.starts_with('0') {
        return Err(CidrError::InvalidMask);
    }
    // Digits only, so the only failure left is overflow
    let mask_len: u32 = mask.parse().map_err(|_| CidrError::MaskOutOfRange)?;
    if mask_len > u32::from(IPV4_MAX_MASK_LEN) {
        return Err(CidrError::MaskOutOfRange);
    }

    Ipv4Prefix::new(addr, mask_len as u8)
}

/// FNV-1a hash over a byte slice
pub const fn fnv1a_hash(bytes: &[u8]) -> u64 {
    fnv1a_extend(FNV_OFFSET, bytes)
}

/// Continue an FNV-1a hash with more bytes
///
/// Lets callers checksum several fields without concatenating them first.
pub const fn fnv1a_extend(mut hash: u64, bytes: &[u8]) -> u64 {
    let mut i = 0;
    while i < bytes.len() {
        hash ^= bytes[i] as u64;
        hash = hash.wrapping_mul(FNV_PRIME);
        i += 1;
    }
    hash
}
