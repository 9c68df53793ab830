// Copyright 2023 Contributors to the Veraison project.
// SPDX-License-Identifier: Apache-2.0

use openssl::nid::Nid;
use openssl::x509::{X509Ref, X509VerifyResult};

/// caIssuers URL from the Authority Information Access extension
pub fn issuer_url(cert: &X509Ref) -> Option<String> {
    cert.authority_info()?
        .iter()
        .filter(|ad| ad.method().nid() == Nid::AD_CA_ISSUERS)
        .find_map(|ad| ad.location().uri().map(str::to_string))
}

/// First URI in the CRL Distribution Points extension
pub fn crl_url(cert: &X509Ref) -> Option<String> {
    cert.crl_distribution_points()?.iter().find_map(|dp| {
        dp.distpoint()?
            .fullname()?
            .iter()
            .find_map(|gn| gn.uri().map(str::to_string))
    })
}

/// Issuer equals subject and the certificate verifies with its own key
pub fn is_self_signed(cert: &X509Ref) -> bool {
    if cert.issued(cert) != X509VerifyResult::OK {
        return false;
    }

    cert.public_key()
        .and_then(|k| cert.verify(&k))
        .unwrap_or(false)
}

/// `parent` issued `child` and its key verifies the signature
pub fn is_signed_by(child: &X509Ref, parent: &X509Ref) -> bool {
    if parent.issued(child) != X509VerifyResult::OK {
        return false;
    }

    parent
        .public_key()
        .and_then(|k| child.verify(&k))
        .unwrap_or(false)
}

/// Subject common name, for logs
pub fn common_name(cert: &X509Ref) -> String {
    cert.subject_name()
        .entries_by_nid(Nid::COMMONNAME)
        .next()
        .and_then(|e| e.data().as_utf8().ok())
        .map(|s| s.to_string())
        .unwrap_or_else(|| "<no CN>".to_string())
}

pub fn serial_hex(cert: &X509Ref) -> String {
    cert.serial_number()
        .to_bn()
        .and_then(|bn| bn.to_hex_str().map(|s| s.to_string()))
        .unwrap_or_default()
}
