//! AMD SEV-SNP attestation report codec.
//!
//! The report is a fixed 1184-byte structure (SEV-SNP ABI, Table 21).
//! Integer fields are little-endian; opaque byte ranges are exposed as
//! lowercase hex strings. The layout is declared once in
//! [`REPORT_LAYOUT`] and both directions of the codec are driven by it.

use std::ops::Range;

use cvm_attest_core::error::{AttestError, Result};
use serde::{Deserialize, Serialize};

/// SNP attestation report size in bytes.
pub const SNP_REPORT_SIZE: usize = 1184;

/// Encoding of a single report field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    /// 4-byte little-endian integer.
    U32,
    /// 8-byte little-endian integer.
    U64,
    /// Opaque bytes, exposed as hex text.
    Bytes,
}

/// Name, position and encoding of one report field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FieldDescriptor {
    pub name: &'static str,
    pub offset: usize,
    pub len: usize,
    pub kind: FieldKind,
}

impl FieldDescriptor {
    /// Byte range covered by the field.
    pub fn range(&self) -> Range<usize> {
        self.offset..self.offset + self.len
    }
}

/// A Rust type that can occupy a report field.
trait LayoutField: Sized {
    const KIND: FieldKind;

    /// `bytes` is exactly the field's range.
    fn read(bytes: &[u8]) -> Self;

    fn write(&self, field: &'static str, out: &mut [u8]) -> Result<()>;
}

impl LayoutField for u32 {
    const KIND: FieldKind = FieldKind::U32;

    fn read(bytes: &[u8]) -> Self {
        let mut buf = [0u8; 4];
        buf.copy_from_slice(bytes);
        u32::from_le_bytes(buf)
    }

    fn write(&self, _field: &'static str, out: &mut [u8]) -> Result<()> {
        out.copy_from_slice(&self.to_le_bytes());
        Ok(())
    }
}

impl LayoutField for u64 {
    const KIND: FieldKind = FieldKind::U64;

    fn read(bytes: &[u8]) -> Self {
        let mut buf = [0u8; 8];
        buf.copy_from_slice(bytes);
        u64::from_le_bytes(buf)
    }

    fn write(&self, _field: &'static str, out: &mut [u8]) -> Result<()> {
        out.copy_from_slice(&self.to_le_bytes());
        Ok(())
    }
}

impl LayoutField for String {
    const KIND: FieldKind = FieldKind::Bytes;

    fn read(bytes: &[u8]) -> Self {
        hex::encode(bytes)
    }

    fn write(&self, field: &'static str, out: &mut [u8]) -> Result<()> {
        let decoded = hex::decode(self).map_err(|e| AttestError::Encode {
            field: field.to_string(),
            reason: format!("invalid hex: {}", e),
        })?;

        if decoded.len() != out.len() {
            return Err(AttestError::Encode {
                field: field.to_string(),
                reason: format!("expected {} bytes, got {}", out.len(), decoded.len()),
            });
        }

        out.copy_from_slice(&decoded);
        Ok(())
    }
}

/// Declares the report struct, its layout table and the per-field
/// read/write routines from one list of `name: type = offset, len;`.
macro_rules! report_layout {
    ($( $(#[$meta:meta])* $field:ident : $ty:ty = $offset:literal, $len:literal; )+) => {
        /// Decoded SEV-SNP attestation report.
        ///
        /// Hex fields must decode to exactly the field's byte length for
        /// the report to serialize.
        #[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
        pub struct SnpReport {
            $( $(#[$meta])* pub $field: $ty, )+
        }

        /// Byte layout of the report, in offset order.
        pub const REPORT_LAYOUT: &[FieldDescriptor] = &[
            $(
                FieldDescriptor {
                    name: stringify!($field),
                    offset: $offset,
                    len: $len,
                    kind: <$ty as LayoutField>::KIND,
                },
            )+
        ];

        impl SnpReport {
            fn read_fields(buf: &[u8]) -> Self {
                Self {
                    $( $field: <$ty as LayoutField>::read(&buf[$offset..$offset + $len]), )+
                }
            }

            fn write_fields(&self, buf: &mut [u8]) -> Result<()> {
                $( LayoutField::write(&self.$field, stringify!($field), &mut buf[$offset..$offset + $len])?; )+
                Ok(())
            }
        }
    };
}

report_layout! {
    /// Report format version.
    version: u32 = 0, 4;
    /// Guest SVN.
    guest_svn: u32 = 4, 4;
    /// Guest policy (debug, SMT, migration bits).
    policy: u64 = 8, 8;
    /// Family ID provided at launch.
    family_id: String = 16, 16;
    /// Image ID provided at launch.
    image_id: String = 32, 16;
    /// VMPL the report was requested at.
    vmpl: u32 = 48, 4;
    signature_algo: u32 = 52, 4;
    /// Installed firmware TCB.
    platform_version: u64 = 56, 8;
    platform_info: u64 = 64, 8;
    author_key_en: u32 = 72, 4;
    reserved1: u32 = 76, 4;
    /// Guest-provided data (digest of the runtime data).
    report_data: String = 80, 64;
    /// Launch measurement.
    measurement: String = 144, 48;
    /// Hypervisor-provided data (digest of the security policy).
    host_data: String = 192, 32;
    id_key_digest: String = 224, 48;
    author_key_digest: String = 272, 48;
    report_id: String = 320, 32;
    report_id_ma: String = 352, 32;
    /// TCB used to derive the VCEK that signed this report.
    reported_tcb: u64 = 384, 8;
    reserved2: String = 392, 24;
    /// Unique chip identifier.
    chip_id: String = 416, 64;
    committed_svn: u64 = 480, 8;
    committed_version: u64 = 488, 8;
    launch_svn: u64 = 496, 8;
    reserved3: String = 504, 168;
    /// ECDSA P-384 signature over bytes 0..672.
    signature: String = 672, 512;
}

impl SnpReport {
    /// Decode a raw report. Fails unless `bytes` is exactly
    /// [`SNP_REPORT_SIZE`] long.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        if bytes.len() != SNP_REPORT_SIZE {
            return Err(AttestError::Format(format!(
                "invalid snp report size: expected {} bytes, got {}",
                SNP_REPORT_SIZE,
                bytes.len()
            )));
        }
        Ok(Self::read_fields(bytes))
    }

    /// Encode the report into a fresh 1184-byte buffer.
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        let mut buf = vec![0u8; SNP_REPORT_SIZE];
        self.write_fields(&mut buf)?;
        Ok(buf)
    }
}
