//! TCB extraction from a VCEK certificate chain.
//!
//! AMD encodes each security patch level of the VCEK's TCB as a private
//! X.509 extension under `1.3.6.1.4.1.3704.1.3`. The extension value is a
//! DER INTEGER whose single content byte (offset 2) is the SPL.

use der::asn1::ObjectIdentifier;
use der::Decode;
use x509_cert::Certificate;

use cvm_attest_core::error::{AttestError, Result};

use super::pem;
use crate::tcb::{
    BOOT_LOADER_SPL_INDEX, MICROCODE_SPL_INDEX, SNP_SPL_INDEX, SPL4_INDEX, SPL5_INDEX,
    SPL6_INDEX, SPL7_INDEX, TEE_SPL_INDEX,
};

/// Common name carried by VCEK leaf certificates.
pub const VCEK_COMMON_NAME: &str = "SEV-VCEK";

const COMMON_NAME: ObjectIdentifier = ObjectIdentifier::new_unwrap("2.5.4.3");

/// Offset of the SPL byte within each extension value.
const SPL_VALUE_OFFSET: usize = 2;

/// Extension OID to TCB byte position.
const SPL_EXTENSIONS: &[(ObjectIdentifier, usize)] = &[
    (
        ObjectIdentifier::new_unwrap("1.3.6.1.4.1.3704.1.3.1"),
        BOOT_LOADER_SPL_INDEX,
    ),
    (
        ObjectIdentifier::new_unwrap("1.3.6.1.4.1.3704.1.3.2"),
        TEE_SPL_INDEX,
    ),
    (
        ObjectIdentifier::new_unwrap("1.3.6.1.4.1.3704.1.3.4"),
        SPL4_INDEX,
    ),
    (
        ObjectIdentifier::new_unwrap("1.3.6.1.4.1.3704.1.3.5"),
        SPL5_INDEX,
    ),
    (
        ObjectIdentifier::new_unwrap("1.3.6.1.4.1.3704.1.3.6"),
        SPL6_INDEX,
    ),
    (
        ObjectIdentifier::new_unwrap("1.3.6.1.4.1.3704.1.3.7"),
        SPL7_INDEX,
    ),
    (
        ObjectIdentifier::new_unwrap("1.3.6.1.4.1.3704.1.3.3"),
        SNP_SPL_INDEX,
    ),
    (
        ObjectIdentifier::new_unwrap("1.3.6.1.4.1.3704.1.3.8"),
        MICROCODE_SPL_INDEX,
    ),
];

/// Extract the TCB of the VCEK leaf in a PEM chain.
///
/// Certificates other than the leaf (ASK, ARK) are skipped. Absent SPL
/// extensions leave their byte at zero.
pub fn tcb_from_chain(chain: &[u8]) -> Result<u64> {
    for der in pem::certificates(chain)? {
        let cert = Certificate::from_der(&der)
            .map_err(|e| AttestError::CertParse(format!("Failed to parse certificate: {}", e)))?;
        if is_vcek(&cert) {
            return tcb_from_certificate(&cert);
        }
    }
    Err(AttestError::NoLeafCertificate)
}

/// Extract the TCB from a parsed VCEK certificate.
pub fn tcb_from_certificate(cert: &Certificate) -> Result<u64> {
    let mut tcb = [0u8; 8];
    let Some(extensions) = cert.tbs_certificate.extensions.as_ref() else {
        return Ok(0);
    };

    for ext in extensions {
        let Some(index) = SPL_EXTENSIONS
            .iter()
            .find(|(oid, _)| *oid == ext.extn_id)
            .map(|(_, index)| *index)
        else {
            continue;
        };

        let value = ext.extn_value.as_bytes();
        tcb[index] = *value.get(SPL_VALUE_OFFSET).ok_or_else(|| {
            AttestError::CertParse(format!(
                "SPL extension {} too short ({} bytes)",
                ext.extn_id,
                value.len()
            ))
        })?;
    }

    Ok(u64::from_le_bytes(tcb))
}

fn is_vcek(cert: &Certificate) -> bool {
    cert.tbs_certificate
        .subject
        .0
        .iter()
        .flat_map(|rdn| rdn.0.iter())
        .filter(|atv| atv.oid == COMMON_NAME)
        .any(|atv| std::str::from_utf8(atv.value.value()) == Ok(VCEK_COMMON_NAME))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rcgen::{CertificateParams, CustomExtension, DistinguishedName, DnType, KeyPair};

    const SPL_ARC: [u64; 9] = [1, 3, 6, 1, 4, 1, 3704, 1, 3];

    fn spl_oid(last: u64) -> Vec<u64> {
        let mut oid = SPL_ARC.to_vec();
        oid.push(last);
        oid
    }

    fn make_cert(common_name: &str, spls: &[(u64, Vec<u8>)]) -> String {
        let key = KeyPair::generate().unwrap();
        let mut params = CertificateParams::default();
        let mut dn = DistinguishedName::new();
        dn.push(DnType::CommonName, common_name);
        params.distinguished_name = dn;
        for (last, value) in spls {
            params
                .custom_extensions
                .push(CustomExtension::from_oid_content(&spl_oid(*last), value.clone()));
        }
        params.self_signed(&key).unwrap().pem()
    }

    #[test]
    fn test_snp_spl_lands_in_byte_six() {
        let chain = make_cert(VCEK_COMMON_NAME, &[(3, vec![2, 1, 7])]);
        let tcb = tcb_from_chain(chain.as_bytes()).unwrap();
        assert_eq!(tcb.to_le_bytes()[SNP_SPL_INDEX], 7);
        assert_eq!(tcb, 7u64 << 48);
    }

    #[test]
    fn test_all_spls() {
        let spls: Vec<(u64, Vec<u8>)> = vec![
            (1, vec![2, 1, 3]),
            (2, vec![2, 1, 0]),
            (3, vec![2, 1, 8]),
            (8, vec![2, 1, 115]),
        ];
        let chain = make_cert(VCEK_COMMON_NAME, &spls);
        let tcb = tcb_from_chain(chain.as_bytes()).unwrap();
        assert_eq!(tcb, 0x7308_0000_0000_0003);
    }

    #[test]
    fn test_absent_extensions_are_zero() {
        let chain = make_cert(VCEK_COMMON_NAME, &[]);
        assert_eq!(tcb_from_chain(chain.as_bytes()).unwrap(), 0);
    }

    #[test]
    fn test_leaf_found_after_other_certs() {
        let mut chain = make_cert("SEV-Milan", &[(3, vec![2, 1, 9])]);
        chain.push_str(&make_cert(VCEK_COMMON_NAME, &[(1, vec![2, 1, 4])]));
        chain.push_str(&make_cert("ARK-Milan", &[]));
        assert_eq!(tcb_from_chain(chain.as_bytes()).unwrap(), 4);
    }

    #[test]
    fn test_no_leaf() {
        let chain = make_cert("SEV-Milan", &[]);
        assert!(matches!(
            tcb_from_chain(chain.as_bytes()),
            Err(AttestError::NoLeafCertificate)
        ));
        assert!(matches!(
            tcb_from_chain(b""),
            Err(AttestError::NoLeafCertificate)
        ));
    }

    #[test]
    fn test_malformed_der() {
        let chain = pem::encode_certificate(&[0x30, 0x03, 0x01]);
        assert!(matches!(
            tcb_from_chain(&chain),
            Err(AttestError::CertParse(_))
        ));
    }

    #[test]
    fn test_short_extension_value() {
        let chain = make_cert(VCEK_COMMON_NAME, &[(3, vec![2, 1])]);
        assert!(matches!(
            tcb_from_chain(chain.as_bytes()),
            Err(AttestError::CertParse(_))
        ));
    }
}
