// Copyright 2023 Contributors to the Veraison project.
// SPDX-License-Identifier: Apache-2.0

use super::errors::Error;
use super::fetch::DistributionPoint;
use super::x509::{common_name, is_self_signed, is_signed_by, issuer_url};
use openssl::hash::{hash, MessageDigest};
use openssl::memcmp;
use openssl::x509::X509;
use std::collections::HashSet;

pub const DEFAULT_MAX_DEPTH: usize = 8;

/// A certificate and the URL it was fetched from (empty for a certificate
/// supplied by the caller)
#[derive(Clone)]
pub struct ChainLink {
    pub url: String,
    pub certificate: X509,
}

impl std::fmt::Debug for ChainLink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} <{}>", common_name(&self.certificate), self.url)
    }
}

/// Leaf-first certificate chain ending at a self-signed root
#[derive(Clone, Debug, Default)]
pub struct CertificateChain {
    links: Vec<ChainLink>,
}

impl CertificateChain {
    /// Wrap certificates obtained out of band (e.g. over SPDM), leaf first
    pub fn from_certificates(certs: Vec<X509>) -> Self {
        Self {
            links: certs
                .into_iter()
                .map(|certificate| ChainLink {
                    url: String::new(),
                    certificate,
                })
                .collect(),
        }
    }

    pub fn links(&self) -> &[ChainLink] {
        &self.links
    }

    pub fn certificates(&self) -> impl Iterator<Item = &X509> {
        self.links.iter().map(|l| &l.certificate)
    }

    pub fn len(&self) -> usize {
        self.links.len()
    }

    pub fn is_empty(&self) -> bool {
        self.links.is_empty()
    }

    pub fn leaf(&self) -> Option<&X509> {
        self.links.first().map(|l| &l.certificate)
    }

    pub fn root(&self) -> Option<&X509> {
        self.links.last().map(|l| &l.certificate)
    }

    /// Every certificate must be issued and signed by its successor, and the
    /// last one by itself
    pub fn verify_signatures(&self) -> Result<(), Error> {
        for pair in self.links.windows(2) {
            let (child, parent) = (&pair[0].certificate, &pair[1].certificate);

            if !is_signed_by(child, parent) {
                return Err(Error::Signature(format!(
                    "{} is not signed by {}",
                    common_name(child),
                    common_name(parent)
                )));
            }
        }

        let root = self
            .root()
            .ok_or_else(|| Error::ChainIncomplete("empty chain".to_string()))?;

        if !is_self_signed(root) {
            return Err(Error::ChainIncomplete(format!(
                "{} is not self-signed",
                common_name(root)
            )));
        }

        Ok(())
    }

    /// Compare the SHA-384 digest of the root certificate's DER against a
    /// pinned value
    pub fn verify_root(&self, expected_sha384: &[u8]) -> Result<(), Error> {
        let root = self
            .root()
            .ok_or_else(|| Error::ChainIncomplete("empty chain".to_string()))?;

        let der = root
            .to_der()
            .map_err(|e| Error::Certificate(format!("{e:?}")))?;
        let digest = hash(MessageDigest::sha384(), &der)
            .map_err(|e| Error::Certificate(format!("{e:?}")))?;

        if digest.len() != expected_sha384.len() || !memcmp::eq(&digest, expected_sha384) {
            return Err(Error::UntrustedRoot(format!(
                "{} has digest {}",
                common_name(root),
                hex::encode_upper(&*digest)
            )));
        }

        Ok(())
    }
}

/// Follows caIssuers URLs from a leaf up to a self-signed root
pub struct ChainBuilder<D> {
    dp: D,
    max_depth: usize,
}

impl<D: DistributionPoint> ChainBuilder<D> {
    pub fn new(dp: D) -> Self {
        Self {
            dp,
            max_depth: DEFAULT_MAX_DEPTH,
        }
    }

    /// Maximum number of certificates in a chain
    pub fn max_depth(mut self, n: usize) -> Self {
        self.max_depth = n;
        self
    }

    pub fn fetch_from_url(&self, url: &str) -> Result<CertificateChain, Error> {
        self.extend(CertificateChain::default(), url.to_string())
    }

    /// Build the chain of a certificate already in hand, e.g. the one the
    /// device returned
    pub fn fetch_from_certificate(&self, leaf: X509) -> Result<CertificateChain, Error> {
        let done = is_self_signed(&leaf);
        let next = issuer_url(&leaf);

        let chain = CertificateChain {
            links: vec![ChainLink {
                url: String::new(),
                certificate: leaf,
            }],
        };

        if done {
            return Ok(chain);
        }

        let url = next.ok_or_else(|| {
            Error::ChainIncomplete(format!(
                "{} has no issuer URL",
                chain.leaf().map(|c| common_name(c)).unwrap_or_default()
            ))
        })?;

        self.extend(chain, url)
    }

    fn extend(
        &self,
        mut chain: CertificateChain,
        mut url: String,
    ) -> Result<CertificateChain, Error> {
        let mut visited = HashSet::new();

        loop {
            if chain.len() >= self.max_depth {
                return Err(Error::TooDeep(format!(
                    "more than {} certificates before reaching a root",
                    self.max_depth
                )));
            }

            if !visited.insert(url.clone()) {
                return Err(Error::Cycle(format!("{url} visited twice")));
            }

            let der = self.dp.get_bytes(&url)?;
            let cert = X509::from_der(&der)
                .map_err(|e| Error::Certificate(format!("{url}: {e:?}")))?;

            tracing::debug!("fetched {} from {url}", common_name(&cert));

            let done = is_self_signed(&cert);
            let next = issuer_url(&cert);

            chain.links.push(ChainLink {
                url: url.clone(),
                certificate: cert,
            });

            if done {
                return Ok(chain);
            }

            url = next.ok_or_else(|| {
                Error::ChainIncomplete(format!("{url}: no issuer URL in a non-root certificate"))
            })?;
        }
    }
}
