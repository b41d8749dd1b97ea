//! TCB (Trusted Computing Base) version composite.
//!
//! A TCB value is an 8-byte little-endian composite of one-byte security
//! patch levels (SPLs). The byte positions below are shared by the report's
//! `reported_tcb` field, the VCEK certificate extensions and the `tcbm`
//! value served by THIM.

use serde::{Deserialize, Serialize};

pub const BOOT_LOADER_SPL_INDEX: usize = 0;
pub const TEE_SPL_INDEX: usize = 1;
pub const SPL4_INDEX: usize = 2;
pub const SPL5_INDEX: usize = 3;
pub const SPL6_INDEX: usize = 4;
pub const SPL7_INDEX: usize = 5;
pub const SNP_SPL_INDEX: usize = 6;
pub const MICROCODE_SPL_INDEX: usize = 7;

/// Unpacked TCB version.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TcbVersion {
    /// Boot loader SPL.
    pub boot_loader: u8,
    /// PSP OS (TEE) SPL.
    pub tee: u8,
    /// Reserved SPL slots 4..=7.
    pub reserved: [u8; 4],
    /// SNP firmware SPL.
    pub snp: u8,
    /// CPU microcode SPL.
    pub microcode: u8,
}

impl TcbVersion {
    /// Pack back into the composite value.
    pub fn to_u64(&self) -> u64 {
        let mut bytes = [0u8; 8];
        bytes[BOOT_LOADER_SPL_INDEX] = self.boot_loader;
        bytes[TEE_SPL_INDEX] = self.tee;
        bytes[SPL4_INDEX..=SPL7_INDEX].copy_from_slice(&self.reserved);
        bytes[SNP_SPL_INDEX] = self.snp;
        bytes[MICROCODE_SPL_INDEX] = self.microcode;
        u64::from_le_bytes(bytes)
    }
}

impl From<u64> for TcbVersion {
    fn from(value: u64) -> Self {
        let bytes = value.to_le_bytes();
        let mut reserved = [0u8; 4];
        reserved.copy_from_slice(&bytes[SPL4_INDEX..=SPL7_INDEX]);
        Self {
            boot_loader: bytes[BOOT_LOADER_SPL_INDEX],
            tee: bytes[TEE_SPL_INDEX],
            reserved,
            snp: bytes[SNP_SPL_INDEX],
            microcode: bytes[MICROCODE_SPL_INDEX],
        }
    }
}

impl From<TcbVersion> for u64 {
    fn from(tcb: TcbVersion) -> Self {
        tcb.to_u64()
    }
}

impl std::fmt::Display for TcbVersion {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "bl{}_tee{}_snp{}_uc{}",
            self.boot_loader, self.tee, self.snp, self.microcode
        )
    }
}
