// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0
use super::GeneratorContext;
use crate::constants::{labels, tls, BASE_NAME};
use crate::pki::CertificateBundle;
use k8s_openapi::api::core::v1::Secret;
use k8s_openapi::ByteString;
use std::collections::BTreeMap;

/// Opaque secret holding the webhook's serving key pair
pub fn tls_secret(ctx: &GeneratorContext, bundle: &CertificateBundle) -> Secret {
    Secret {
        metadata: ctx.namespaced_meta(
            BASE_NAME,
            &[(labels::WEBHOOK_SERVER, labels::WEBHOOK_SERVER_SECRET)],
        ),
        data: Some(BTreeMap::from([
            (
                tls::KEY_PEM.to_string(),
                ByteString(bundle.private_key_pem.clone()),
            ),
            (
                tls::CERT_PEM.to_string(),
                ByteString(bundle.certificate_pem.clone()),
            ),
        ])),
        type_: Some("Opaque".to_string()),
        ..Default::default()
    }
}

/// Certificate stored in a TLS secret, if any
pub fn certificate_pem(secret: &Secret) -> Option<&[u8]> {
    secret
        .data
        .as_ref()
        .and_then(|data| data.get(tls::CERT_PEM))
        .map(|cert| cert.0.as_slice())
}
