// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

//! Self-signed serving certificate for the webhook endpoint.

use crate::constants::tls::VALIDITY_YEARS;
use crate::error::{InstallerError, Result};
use rcgen::{
    BasicConstraints, CertificateParams, DistinguishedName, DnType, DnValue,
    ExtendedKeyUsagePurpose, IsCa, KeyPair, KeyUsagePurpose, PKCS_ECDSA_P256_SHA256,
};
use time::{Duration, OffsetDateTime};
use tracing::{debug, instrument};

/// PEM encoded key material stored in the webhook TLS secret
#[derive(Clone, PartialEq, Eq)]
pub struct CertificateBundle {
    pub private_key_pem: Vec<u8>,
    pub certificate_pem: Vec<u8>,
}

impl std::fmt::Debug for CertificateBundle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CertificateBundle")
            .field("private_key_pem", &"<redacted>")
            .field("certificate_pem_len", &self.certificate_pem.len())
            .finish()
    }
}

/// DNS name the webhook service answers on inside the cluster
pub fn service_dns_name(service_name: &str, namespace: &str) -> String {
    format!("{}.{}.svc", service_name, namespace)
}

/// Same instant `years` calendar years later. February 29th rolls over to
/// March 1st when the target year is not a leap year.
fn years_after(from: OffsetDateTime, years: i32) -> Result<OffsetDateTime> {
    let year = from.year() + years;
    from.replace_year(year)
        .or_else(|_| {
            from.replace_day(28)
                .and_then(|d| d.replace_year(year))
                .map(|d| d + Duration::days(1))
        })
        .map_err(|e| InstallerError::CertificateError(format!("invalid validity window: {}", e)))
}

fn compute_validity(years: i32) -> Result<(OffsetDateTime, OffsetDateTime)> {
    let now = OffsetDateTime::now_utc();
    Ok((now, years_after(now, years)?))
}

/// Issue a self-signed certificate for `<service>.<namespace>.svc`.
///
/// The certificate doubles as its own CA: the admission hook registration
/// embeds it as the trust anchor for the webhook's serving identity.
#[instrument]
pub fn issue_serving_certificate(service_name: &str, namespace: &str) -> Result<CertificateBundle> {
    let dns_name = service_dns_name(service_name, namespace);

    let mut params = CertificateParams::new(vec![dns_name.clone()]).map_err(|e| {
        InstallerError::CertificateError(format!("invalid DNS name '{}': {}", dns_name, e))
    })?;

    let mut dn = DistinguishedName::new();
    dn.push(DnType::CommonName, DnValue::Utf8String(dns_name.clone()));
    params.distinguished_name = dn;

    params.is_ca = IsCa::Ca(BasicConstraints::Unconstrained);
    params.key_usages = vec![
        KeyUsagePurpose::DigitalSignature,
        KeyUsagePurpose::KeyCertSign,
    ];
    params.extended_key_usages = vec![ExtendedKeyUsagePurpose::Any];

    let (not_before, not_after) = compute_validity(VALIDITY_YEARS)?;
    params.not_before = not_before;
    params.not_after = not_after;

    let key_pair = KeyPair::generate_for(&PKCS_ECDSA_P256_SHA256).map_err(|e| {
        InstallerError::CertificateError(format!("failed to generate private key: {}", e))
    })?;

    let cert = params.self_signed(&key_pair).map_err(|e| {
        InstallerError::CertificateError(format!("failed to sign certificate: {}", e))
    })?;

    debug!("Issued serving certificate for {}", dns_name);

    Ok(CertificateBundle {
        private_key_pem: key_pair.serialize_pem().into_bytes(),
        certificate_pem: cert.pem().into_bytes(),
    })
}
