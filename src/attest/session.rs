// Copyright 2023 Contributors to the Veraison project.
// SPDX-License-Identifier: Apache-2.0

use super::config::Config;
use super::errors::Error;
use super::state::SessionState;
use super::transport::Transport;
use crate::chain::{CertificateChain, ChainBuilder, DistributionPoint};
use crate::crl::CrlVerifier;
use crate::crypto::{hidden_asset, EcdhKeyPair};
use crate::dice::{
    self, parse_record, DeviceMeasurement, Status, TcbInfo, TcbInfoAggregator, Ueid,
};
use crate::verify::MeasurementVerifier;
use crate::wire::{
    self, get_attestation_certificate, get_chip_id, parse_certificate, parse_chip_id,
    sigma_teardown, Actor, CommandCode, MeasurementResponse, PsgPublicKey, PufType, SigmaRequest,
    SubKeyResponse, CONTEXT_LEN, DEVICE_ID_LEN,
};
use openssl::x509::X509;

/// One attestation of one device.
///
/// The session walks `Init` → `SessionEstablished` → `EvidenceCollected` →
/// `ChainValidated` → `Accepted`, one method per step.  A step invoked out of
/// order fails without talking to the device; a step that fails moves the
/// session to `Rejected` and records why.
pub struct AttestationSession<T, D> {
    transport: T,
    dp: D,
    config: Config,
    state: SessionState,
    failure: Option<Error>,
    verification_time: Option<i64>,

    device_id: Option<[u8; DEVICE_ID_LEN]>,
    verifier_dh: Option<EcdhKeyPair>,
    certificate: Option<X509>,
    measurement: Option<MeasurementResponse>,
    chain: Option<CertificateChain>,
    evidence: TcbInfoAggregator,
}

impl<T: Transport, D: DistributionPoint> AttestationSession<T, D> {
    pub fn new(transport: T, dp: D, config: Config) -> Self {
        Self {
            transport,
            dp,
            config,
            state: SessionState::Init,
            failure: None,
            verification_time: None,
            device_id: None,
            verifier_dh: None,
            certificate: None,
            measurement: None,
            chain: None,
            evidence: TcbInfoAggregator::new(),
        }
    }

    /// Judge CRL freshness at `unix` instead of the current time
    pub fn verification_time(mut self, unix: i64) -> Self {
        self.verification_time = Some(unix);
        self
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Why the session was rejected, if it was
    pub fn failure(&self) -> Option<&Error> {
        self.failure.as_ref()
    }

    /// Chip id reported by GET_CHIPID
    pub fn device_id(&self) -> Option<[u8; DEVICE_ID_LEN]> {
        self.device_id
    }

    pub fn chain(&self) -> Option<&CertificateChain> {
        self.chain.as_ref()
    }

    /// TcbInfo gathered from the certificate chain and the measurement
    /// record
    pub fn evidence(&self) -> &TcbInfoAggregator {
        &self.evidence
    }

    fn command(&mut self, command: CommandCode, message: &[u8]) -> Result<Vec<u8>, Error> {
        let request = wire::create(message, command)?;
        let response = self.transport.send(&request)?;

        Ok(wire::retrieve(&response, command)?)
    }

    fn step<R>(
        &mut self,
        from: SessionState,
        to: SessionState,
        f: impl FnOnce(&mut Self) -> Result<R, Error>,
    ) -> Result<R, Error> {
        if self.state != from {
            return Err(Error::Session(format!(
                "{to} requires {from}, session is {}",
                self.state
            )));
        }

        match f(self) {
            Ok(r) => {
                if from != to {
                    tracing::info!("session {from} -> {to}");
                }
                self.state = to;
                Ok(r)
            }
            Err(e) => {
                tracing::error!("session {from} -> {}: {e}", SessionState::Rejected);
                self.state = SessionState::Rejected;
                self.failure = Some(e.clone());
                Err(e)
            }
        }
    }

    fn established(&self) -> Result<([u8; DEVICE_ID_LEN], &EcdhKeyPair), Error> {
        match (self.device_id, self.verifier_dh.as_ref()) {
            (Some(id), Some(dh)) => Ok((id, dh)),
            _ => Err(Error::Internal("session keys missing".to_string())),
        }
    }

    fn fetch_attestation_certificate(&mut self) -> Result<X509, Error> {
        let cert_type = self.config.attestation_certificate_type;
        let payload = self.command(
            CommandCode::GetAttestationCertificate,
            &get_attestation_certificate(cert_type),
        )?;

        let der = parse_certificate(&payload)?;

        X509::from_der(&der).map_err(|e| Error::Protocol(format!("attestation certificate: {e:?}")))
    }

    // Closing the SIGMA session is best effort
    fn teardown(&mut self, session_id: u32) {
        let r = sigma_teardown(session_id, Actor::Firmware)
            .map_err(Error::from)
            .and_then(|m| self.command(CommandCode::SigmaTeardown, &m));

        match r {
            Ok(_) => tracing::debug!("SIGMA session {session_id:#x} closed"),
            Err(e) => tracing::warn!("SIGMA_TEARDOWN of session {session_id:#x} failed: {e}"),
        }
    }

    /// GET_CHIPID, then a fresh ephemeral ECDH key for the SIGMA exchange
    pub fn establish_session(&mut self) -> Result<(), Error> {
        self.step(SessionState::Init, SessionState::SessionEstablished, |s| {
            let payload = s.command(CommandCode::GetChipId, &get_chip_id())?;
            let device_id = parse_chip_id(&payload)?;

            let dh = EcdhKeyPair::generate()?;

            tracing::info!("device {}", hex::encode_upper(device_id));
            tracing::debug!(
                "verifier DH public key {}",
                hidden_asset(&hex::encode_upper(dh.public_key()))
            );

            s.device_id = Some(device_id);
            s.verifier_dh = Some(dh);

            Ok(())
        })
    }

    /// Fetch the attestation certificate and a signed GET_MEASUREMENT
    /// response
    pub fn collect_evidence(&mut self) -> Result<(), Error> {
        self.step(
            SessionState::SessionEstablished,
            SessionState::EvidenceCollected,
            |s| {
                let cert = s.fetch_attestation_certificate()?;

                let (_, dh) = s.established()?;
                let request =
                    SigmaRequest::new(dh.public_key(), s.config.puf_type, [0; CONTEXT_LEN])
                        .get_measurement(Actor::Firmware)?;

                let payload = s.command(CommandCode::GetMeasurement, &request)?;
                let m = MeasurementResponse::decode(&payload, Actor::Firmware)?;

                tracing::info!(
                    "SIGMA session {:#x}: {} measurement blocks",
                    m.sdm_session_id,
                    m.number_of_measurement_blocks
                );

                s.certificate = Some(cert);
                s.measurement = Some(m);

                Ok(())
            },
        )
    }

    /// Build and check the attestation certificate's chain, authenticate the
    /// measurement response and aggregate the evidence
    pub fn validate_chain(&mut self) -> Result<(), Error> {
        self.step(
            SessionState::EvidenceCollected,
            SessionState::ChainValidated,
            |s| {
                let (cert, m) = match (s.certificate.clone(), s.measurement.clone()) {
                    (Some(c), Some(m)) => (c, m),
                    _ => return Err(Error::Internal("evidence missing".to_string())),
                };

                // the SIGMA session is closed whatever the verdict
                let checked = s.check_evidence(&cert, &m);
                s.teardown(m.sdm_session_id);
                let (chain, evidence) = checked?;

                tracing::info!("{} TcbInfo entries in evidence", evidence.len());

                s.chain = Some(chain);
                s.evidence = evidence;

                Ok(())
            },
        )
    }

    fn check_evidence(
        &self,
        cert: &X509,
        m: &MeasurementResponse,
    ) -> Result<(CertificateChain, TcbInfoAggregator), Error> {
        let chain = self.check_chain(cert.clone())?;
        let mut evidence = self.chain_evidence(&chain)?;

        let (device_id, dh) = self.established()?;
        MeasurementVerifier::new(cert, dh, device_id)?
            .verify_mac(self.config.verify_mac)
            .verify(m)?;

        let tcbs = parse_record(&m.measurement_record, m.number_of_measurement_blocks)?
            .iter()
            .map(DeviceMeasurement::to_tcb_info)
            .collect::<Result<Vec<_>, _>>()?;
        evidence.add(&tcbs)?;

        Ok((chain, evidence))
    }

    fn check_chain(&self, leaf: X509) -> Result<CertificateChain, Error> {
        let chain = ChainBuilder::new(&self.dp)
            .max_depth(self.config.max_chain_depth)
            .fetch_from_certificate(leaf)?;

        chain.verify_signatures()?;

        if let Some(root) = &self.config.trusted_root_hash {
            chain.verify_root(root)?;
        }

        let mut crl =
            CrlVerifier::new(&self.dp).require_crl_for_leaf(self.config.require_crl_for_leaf);
        if let Some(t) = self.verification_time {
            crl = crl.verification_time(t);
        }

        if !crl.verify(&chain) {
            return Err(Error::Revocation(
                "certificate chain failed revocation checks".to_string(),
            ));
        }

        Ok(chain)
    }

    fn chain_evidence(&self, chain: &CertificateChain) -> Result<TcbInfoAggregator, Error> {
        let (device_id, _) = self.established()?;
        let mut evidence = TcbInfoAggregator::new();

        for cert in chain.certificates() {
            let der = cert
                .to_der()
                .map_err(|e| Error::Internal(format!("{e:?}")))?;

            evidence.add_certificate(&der)?;

            if let Some(ueid) = Ueid::from_certificate(&der)? {
                if !ueid.matches_chip_id(&device_id) {
                    return Err(Error::Evidence(format!(
                        "UEID {ueid} does not belong to device {}",
                        hex::encode_upper(device_id)
                    )));
                }
            }
        }

        Ok(evidence)
    }

    /// Compare the evidence with the reference measurements.  A mismatch is
    /// not an error: the session is rejected and `Status::Fail` returned.
    pub fn appraise(&mut self, reference: &[TcbInfo]) -> Result<Status, Error> {
        if self.state != SessionState::ChainValidated {
            return Err(Error::Session(format!(
                "appraisal requires {}, session is {}",
                SessionState::ChainValidated,
                self.state
            )));
        }

        let status = dice::appraise(&self.evidence, reference);

        if status == Status::Ok {
            self.state = SessionState::Accepted;
        } else {
            self.state = SessionState::Rejected;
            self.failure = Some(Error::Evidence(
                "evidence does not match reference measurements".to_string(),
            ));
        }

        tracing::info!("session {}", self.state);

        Ok(status)
    }

    /// Every step from a fresh session to the verdict
    pub fn run(&mut self, reference: &[TcbInfo]) -> Result<Status, Error> {
        self.establish_session()?;
        self.collect_evidence()?;
        self.validate_chain()?;
        self.appraise(reference)
    }

    /// Ask the device for an attestation sub-key bound to `context`.  Needs
    /// an established session and leaves its state unchanged.
    pub fn create_attestation_subkey(
        &mut self,
        context: [u8; CONTEXT_LEN],
        puf_type: PufType,
    ) -> Result<PsgPublicKey, Error> {
        self.step(
            SessionState::SessionEstablished,
            SessionState::SessionEstablished,
            |s| {
                let cert = s.fetch_attestation_certificate()?;

                let mut counter = [0u8; 4];
                openssl::rand::rand_bytes(&mut counter)
                    .map_err(|e| Error::Internal(format!("{e:?}")))?;

                let (_, dh) = s.established()?;
                let mut request = SigmaRequest::new(dh.public_key(), puf_type, context);
                request.counter = u32::from_le_bytes(counter);

                let payload = s.command(
                    CommandCode::CreateAttestationSubKey,
                    &request.create_attestation_subkey(Actor::Firmware)?,
                )?;
                let r = SubKeyResponse::decode(&payload, Actor::Firmware)?;

                let verified = s.check_subkey(&cert, &request, &r);
                s.teardown(r.sdm_session_id);
                let key = verified?;

                tracing::info!(
                    "attestation sub-key created: {}",
                    hidden_asset(&hex::encode_upper(key.xy()))
                );

                Ok(key)
            },
        )
    }

    fn check_subkey(
        &self,
        cert: &X509,
        request: &SigmaRequest,
        r: &SubKeyResponse,
    ) -> Result<PsgPublicKey, Error> {
        let (device_id, dh) = self.established()?;

        let key = MeasurementVerifier::new(cert, dh, device_id)?.verify_subkey(r)?;

        if r.device_unique_id != device_id {
            return Err(Error::Protocol(format!(
                "sub-key issued by device {}",
                hex::encode_upper(r.device_unique_id)
            )));
        }

        if r.verifier_input_context != request.context {
            return Err(Error::Protocol("sub-key bound to another context".to_string()));
        }

        if r.verifier_counter != request.counter {
            return Err(Error::Protocol(format!(
                "sub-key counter {:#x} does not echo ours",
                r.verifier_counter
            )));
        }

        Ok(key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::attest::simulator::{SimulatedDevice, CHIP_ID, IO_DIGEST};
    use crate::chain::fixtures::{published_chain, BASE};
    use crate::chain::MemoDistributionPoint;
    use crate::dice::{load_reference, SectionType};
    use crate::wire::parse_context;

    const ROOT_CRL: &[u8] = include_bytes!("../../testdata/root.crl");
    const FAMILY_CRL: &[u8] = include_bytes!("../../testdata/family.crl");
    const DEVICEID_CRL: &[u8] = include_bytes!("../../testdata/deviceid.crl");
    const DEVICEID_REVOKED: &[u8] = include_bytes!("../../testdata/deviceid-revoked.crl");

    fn distribution_point() -> MemoDistributionPoint {
        let dp = published_chain();
        for (name, der) in [
            ("root.crl", ROOT_CRL),
            ("family.crl", FAMILY_CRL),
            ("deviceid.crl", DEVICEID_CRL),
        ] {
            dp.insert(&format!("{BASE}{name}"), der).unwrap();
        }
        dp
    }

    fn config() -> Config {
        Config::from_json(
            r#"{
                "transport": { "host": "simulator", "port": 1 },
                "distribution-point": { "mirror": "." }
            }"#,
        )
        .unwrap()
    }

    fn reference(io_digest: &[u8]) -> Vec<TcbInfo> {
        load_reference(&format!(
            r#"[{{
                "vendor": "intel.com",
                "layer": 2,
                "type": "2.16.840.1.113741.1.15.4.2",
                "fwid": {{ "hash-alg": "2.16.840.1.101.3.4.2.2", "digest": "{}" }}
            }}]"#,
            hex::encode_upper(io_digest)
        ))
        .unwrap()
    }

    #[test]
    fn genuine_device_is_accepted() {
        let dp = distribution_point();
        let mut device = SimulatedDevice::new();

        let mut s = AttestationSession::new(&mut device, &dp, config());
        let status = s.run(&reference(&IO_DIGEST)).expect("attesting device");

        assert_eq!(status, Status::Ok);
        assert_eq!(s.state(), SessionState::Accepted);
        assert_eq!(s.device_id(), Some(CHIP_ID));
        assert_eq!(s.chain().map(CertificateChain::len), Some(5));
        assert_eq!(s.evidence().len(), 4);
        assert!(s.failure().is_none());

        drop(s);
        assert_eq!(
            device.received,
            vec![
                CommandCode::GetChipId,
                CommandCode::GetAttestationCertificate,
                CommandCode::GetMeasurement,
                CommandCode::SigmaTeardown,
            ]
        );
    }

    #[test]
    fn reference_mismatch_fails() {
        let dp = distribution_point();
        let mut device = SimulatedDevice::new();

        let mut s = AttestationSession::new(&mut device, &dp, config());
        let status = s.run(&reference(&[0xAB; 48])).unwrap();

        assert_eq!(status, Status::Fail);
        assert_eq!(s.state(), SessionState::Rejected);
        assert!(matches!(s.failure(), Some(Error::Evidence(_))));
    }

    #[test]
    fn measurement_contradicting_certificate() {
        let dp = distribution_point();
        let mut device = SimulatedDevice::new();
        device.measurements[0].value = vec![0xAB; 48];

        let mut s = AttestationSession::new(&mut device, &dp, config());

        assert!(matches!(s.run(&[]), Err(Error::Evidence(_))));
        assert_eq!(s.state(), SessionState::Rejected);

        drop(s);
        assert_eq!(device.received.last(), Some(&CommandCode::SigmaTeardown));
    }

    #[test]
    fn forged_signature() {
        let dp = distribution_point();
        let mut device = SimulatedDevice::new();
        device.corrupt_signature = true;

        let mut s = AttestationSession::new(&mut device, &dp, config());

        assert!(matches!(s.run(&[]), Err(Error::SignatureInvalid(_))));
        assert!(matches!(s.failure(), Some(Error::SignatureInvalid(_))));

        // the SIGMA session is closed anyway
        drop(s);
        assert_eq!(device.received.last(), Some(&CommandCode::SigmaTeardown));
    }

    #[test]
    fn revoked_device() {
        let dp = distribution_point();
        dp.insert(&format!("{BASE}deviceid.crl"), DEVICEID_REVOKED).unwrap();
        let mut device = SimulatedDevice::new();

        let mut s = AttestationSession::new(&mut device, &dp, config());

        assert!(matches!(s.run(&[]), Err(Error::Revocation(_))));
        assert_eq!(s.state(), SessionState::Rejected);

        drop(s);
        assert_eq!(
            device.received,
            vec![
                CommandCode::GetChipId,
                CommandCode::GetAttestationCertificate,
                CommandCode::GetMeasurement,
                CommandCode::SigmaTeardown,
            ]
        );
    }

    #[test]
    fn untrusted_root() {
        let dp = distribution_point();
        let mut device = SimulatedDevice::new();
        let mut c = config();
        c.trusted_root_hash = Some(vec![0; 48]);

        let mut s = AttestationSession::new(&mut device, &dp, c);

        assert!(matches!(s.run(&[]), Err(Error::ChainIncomplete(_))));
        assert_eq!(s.state(), SessionState::Rejected);

        drop(s);
        assert_eq!(device.received.last(), Some(&CommandCode::SigmaTeardown));
        assert_eq!(device.received.len(), 4);
    }

    #[test]
    fn unreachable_issuer_still_closes_session() {
        let dp = MemoDistributionPoint::new();
        let mut device = SimulatedDevice::new();

        let mut s = AttestationSession::new(&mut device, &dp, config());

        assert!(matches!(s.run(&[]), Err(Error::FetchFailure(_))));

        drop(s);
        assert_eq!(device.received.last(), Some(&CommandCode::SigmaTeardown));
    }

    #[test]
    fn ueid_must_belong_to_device() {
        let dp = distribution_point();
        let mut device = SimulatedDevice::new();
        device.chip_id = [0x11; 8];

        let mut s = AttestationSession::new(&mut device, &dp, config());

        assert!(matches!(s.run(&[]), Err(Error::Evidence(_))));

        drop(s);
        assert_eq!(device.received.last(), Some(&CommandCode::SigmaTeardown));
    }

    #[test]
    fn steps_out_of_order() {
        let dp = distribution_point();
        let mut device = SimulatedDevice::new();

        let mut s = AttestationSession::new(&mut device, &dp, config());

        assert!(matches!(s.collect_evidence(), Err(Error::Session(_))));
        assert!(matches!(s.validate_chain(), Err(Error::Session(_))));
        assert!(matches!(s.appraise(&[]), Err(Error::Session(_))));
        assert_eq!(s.state(), SessionState::Init);

        s.establish_session().unwrap();
        assert!(matches!(s.establish_session(), Err(Error::Session(_))));
        assert_eq!(s.state(), SessionState::SessionEstablished);

        drop(s);
        assert_eq!(device.received, vec![CommandCode::GetChipId]);
    }

    #[test]
    fn rejected_session_is_final() {
        let dp = distribution_point();
        let mut device = SimulatedDevice::new();
        device.unsupported = vec![CommandCode::GetMeasurement];

        let mut s = AttestationSession::new(&mut device, &dp, config());
        s.establish_session().unwrap();

        assert!(matches!(s.collect_evidence(), Err(Error::Protocol(_))));
        assert_eq!(s.state(), SessionState::Rejected);
        assert!(s.state().is_terminal());

        assert!(matches!(s.validate_chain(), Err(Error::Session(_))));
        assert!(matches!(s.establish_session(), Err(Error::Session(_))));

        drop(s);
        assert_eq!(
            device.received,
            vec![
                CommandCode::GetChipId,
                CommandCode::GetAttestationCertificate,
                CommandCode::GetMeasurement,
            ]
        );
    }

    #[test]
    fn device_state_block_reaches_evidence() {
        let dp = distribution_point();
        let mut device = SimulatedDevice::new();
        device.measurements.push(DeviceMeasurement {
            section: SectionType::DeviceState,
            index: 0,
            value: vec![0, 0, 0, 1],
        });

        let mut s = AttestationSession::new(&mut device, &dp, config());
        s.establish_session().unwrap();
        s.collect_evidence().unwrap();
        s.validate_chain().unwrap();

        assert_eq!(s.evidence().len(), 5);

        let reference = load_reference(
            r#"[{
                "vendor": "intel.com",
                "layer": 2,
                "type": "2.16.840.1.113741.1.15.4.1",
                "vendor-info": "00000001"
            }]"#,
        )
        .unwrap();
        assert_eq!(s.appraise(&reference).unwrap(), Status::Ok);
    }

    #[test]
    fn attestation_subkey() {
        let dp = distribution_point();
        let mut device = SimulatedDevice::new();

        let mut s = AttestationSession::new(&mut device, &dp, config());

        let context = parse_context("C0FFEE").unwrap();
        assert!(matches!(
            s.create_attestation_subkey(context, PufType::Efuse),
            Err(Error::Session(_))
        ));

        s.establish_session().unwrap();
        let key = s
            .create_attestation_subkey(context, PufType::Efuse)
            .expect("creating attestation sub-key");

        assert_eq!(key.x.len(), 48);
        assert_eq!(s.state(), SessionState::SessionEstablished);

        drop(s);
        assert_eq!(
            &device.received[1..],
            &[
                CommandCode::GetAttestationCertificate,
                CommandCode::CreateAttestationSubKey,
                CommandCode::SigmaTeardown,
            ]
        );
    }

    #[test]
    fn forged_subkey() {
        let dp = distribution_point();
        let mut device = SimulatedDevice::new();
        device.corrupt_signature = true;

        let mut s = AttestationSession::new(&mut device, &dp, config());
        s.establish_session().unwrap();

        assert!(matches!(
            s.create_attestation_subkey([0; CONTEXT_LEN], PufType::Iid),
            Err(Error::SignatureInvalid(_))
        ));
        assert_eq!(s.state(), SessionState::Rejected);
    }
}
