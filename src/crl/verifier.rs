// Copyright 2023 Contributors to the Veraison project.
// SPDX-License-Identifier: Apache-2.0

use super::errors::Error;
use crate::chain::{common_name, crl_url, serial_hex, CertificateChain, DistributionPoint};
use crate::dice::{tcb_infos_from_certificate, tcb_infos_from_extensions, TcbInfo};
use openssl::x509::{X509Crl, X509Ref};
use std::time::{SystemTime, UNIX_EPOCH};
use x509_parser::prelude::{CertificateRevocationList, FromDer};

/// Checks every certificate of a chain against the CRL published by its
/// issuer
pub struct CrlVerifier<D> {
    dp: D,
    require_crl_for_leaf: bool,
    verification_time: Option<i64>,
}

fn strip_leading_zeros(b: &[u8]) -> &[u8] {
    let n = b.iter().take_while(|x| **x == 0).count();
    &b[n..]
}

fn now() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or_default()
}

// An entry revokes a certificate by TcbInfo when every TcbInfo it carries
// is matched by one of the certificate's own
fn revoked_by_tcb_info(entry: &[TcbInfo], cert: &[TcbInfo]) -> bool {
    !entry.is_empty()
        && entry.iter().all(|e| {
            let (key, value) = (e.key(), e.value());
            cert.iter()
                .any(|c| c.key() == key && value.matches(&c.value()))
        })
}

impl<D: DistributionPoint> CrlVerifier<D> {
    pub fn new(dp: D) -> Self {
        Self {
            dp,
            require_crl_for_leaf: false,
            verification_time: None,
        }
    }

    /// Whether a leaf without a CRL distribution point fails verification
    pub fn require_crl_for_leaf(mut self, required: bool) -> Self {
        self.require_crl_for_leaf = required;
        self
    }

    /// Unix time against which CRL freshness is judged (default: now)
    pub fn verification_time(mut self, unix: i64) -> Self {
        self.verification_time = Some(unix);
        self
    }

    /// True only if no certificate in the chain is revoked and every
    /// required CRL is available, authentic and current
    pub fn verify(&self, chain: &CertificateChain) -> bool {
        let links = chain.links();
        let Some(last) = links.len().checked_sub(1) else {
            tracing::error!("empty certificate chain");
            return false;
        };

        for i in 0..last {
            match self.check(chain, i) {
                Ok(true) => {}
                Ok(false) => return false,
                Err(e) => {
                    tracing::error!(
                        "revocation check of {} failed: {e}",
                        common_name(&links[i].certificate)
                    );
                    return false;
                }
            }
        }

        true
    }

    fn check(&self, chain: &CertificateChain, i: usize) -> Result<bool, Error> {
        let links = chain.links();
        let cert = &links[i].certificate;
        let is_leaf = i == 0;
        let name = common_name(cert);

        let Some(url) = crl_url(cert) else {
            if is_leaf && !self.require_crl_for_leaf {
                tracing::debug!("{name}: no CRL distribution point, leaf CRL not required");
                return Ok(true);
            }
            tracing::error!("{name}: no CRL distribution point");
            return Ok(false);
        };

        let der = self
            .dp
            .get_bytes(&url)
            .map_err(|e| Error::FetchFailure(e.to_string()))?;

        let crl = X509Crl::from_der(&der).map_err(|e| Error::Crl(format!("{url}: {e:?}")))?;

        let authentic = links[i + 1..].iter().any(|l| {
            l.certificate
                .public_key()
                .and_then(|k| crl.verify(&k))
                .unwrap_or(false)
        });
        if !authentic {
            tracing::error!("{url}: CRL not signed by any issuer in the chain");
            return Ok(false);
        }

        let (_, parsed) = CertificateRevocationList::from_der(&der)
            .map_err(|e| Error::Crl(format!("{url}: {e}")))?;

        let at = self.verification_time.unwrap_or_else(now);
        if let Some(next) = parsed.next_update() {
            if next.timestamp() < at {
                tracing::error!("{url}: CRL expired at {next}");
                return Ok(false);
            }
        }

        if self.is_revoked(cert, &parsed)? {
            if is_leaf {
                tracing::error!("leaf certificate {name} ({}) is revoked", serial_hex(cert));
            } else {
                tracing::error!(
                    "intermediate certificate {name} ({}) is revoked",
                    serial_hex(cert)
                );
            }
            return Ok(false);
        }

        tracing::debug!("{name}: not revoked by {url}");

        Ok(true)
    }

    fn is_revoked(&self, cert: &X509Ref, crl: &CertificateRevocationList) -> Result<bool, Error> {
        let serial = cert
            .serial_number()
            .to_bn()
            .map(|bn| bn.to_vec())
            .map_err(|e| Error::Crl(format!("serial number: {e:?}")))?;

        let cert_der = cert
            .to_der()
            .map_err(|e| Error::Crl(format!("certificate: {e:?}")))?;
        let cert_tcbs =
            tcb_infos_from_certificate(&cert_der).map_err(|e| Error::Crl(e.to_string()))?;

        for entry in crl.iter_revoked_certificates() {
            let entry_tcbs = tcb_infos_from_extensions(entry.extensions())
                .map_err(|e| Error::Crl(e.to_string()))?;

            if entry_tcbs.is_empty() {
                if strip_leading_zeros(entry.raw_serial()) == strip_leading_zeros(&serial) {
                    return Ok(true);
                }
            } else if revoked_by_tcb_info(&entry_tcbs, &cert_tcbs) {
                tracing::debug!("revoked by TcbInfo in CRL entry");
                return Ok(true);
            }
        }

        Ok(false)
    }
}
