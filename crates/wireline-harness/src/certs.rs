//! Generated certificate material for transport tests.
//!
//! A throwaway CA signs one `localhost` server leaf and one client leaf.
//! Stores are written as PEM files under a temp directory owned by the
//! fixture: keystores hold `leaf + CA + private key`, truststores hold the
//! CA certificate alone. A second, unrelated CA provides truststore material
//! that trusts neither leaf, for the negative validation scenarios.

use std::fs;
use std::path::{Path, PathBuf};

use rcgen::{BasicConstraints, Certificate, CertificateParams, DnType, IsCa, KeyPair};
use tempfile::TempDir;

use crate::HarnessError;

/// On-disk PKI for one test run. Files disappear with the fixture.
#[derive(Debug)]
pub struct CertFixture {
    // Owns the directory the store paths point into.
    _dir: TempDir,
    /// Server keystore: `localhost` leaf chain plus private key.
    pub server_key_store: PathBuf,
    /// Client keystore: client leaf chain plus private key.
    pub client_key_store: PathBuf,
    /// Truststore holding the CA that signed both leaves.
    pub trust_store: PathBuf,
    /// Truststore holding an unrelated CA; trusts neither leaf.
    pub other_trust_store: PathBuf,
}

impl CertFixture {
    /// Generate the CA, leaves, and store files.
    pub fn generate() -> Result<Self, HarnessError> {
        let dir = TempDir::new().map_err(HarnessError::Io)?;

        let (ca_cert, ca_key) = authority("wireline test ca")?;
        let (server_cert, server_key) = leaf("localhost", &ca_cert, &ca_key)?;
        let (client_cert, client_key) = leaf("wireline-client", &ca_cert, &ca_key)?;
        let (other_ca_cert, _other_ca_key) = authority("unrelated test ca")?;

        let server_key_store = dir.path().join("server-keystore.pem");
        write_store(
            &server_key_store,
            &[&server_cert.pem(), &ca_cert.pem(), &server_key.serialize_pem()],
        )?;

        let client_key_store = dir.path().join("client-keystore.pem");
        write_store(
            &client_key_store,
            &[&client_cert.pem(), &ca_cert.pem(), &client_key.serialize_pem()],
        )?;

        let trust_store = dir.path().join("truststore.pem");
        write_store(&trust_store, &[&ca_cert.pem()])?;

        let other_trust_store = dir.path().join("other-truststore.pem");
        write_store(&other_trust_store, &[&other_ca_cert.pem()])?;

        Ok(Self {
            _dir: dir,
            server_key_store,
            client_key_store,
            trust_store,
            other_trust_store,
        })
    }
}

fn authority(common_name: &str) -> Result<(Certificate, KeyPair), HarnessError> {
    let mut params = CertificateParams::new(Vec::<String>::new())?;
    params.is_ca = IsCa::Ca(BasicConstraints::Unconstrained);
    params
        .distinguished_name
        .push(DnType::CommonName, common_name);
    let key = KeyPair::generate()?;
    let cert = params.self_signed(&key)?;
    Ok((cert, key))
}

fn leaf(
    subject: &str,
    ca_cert: &Certificate,
    ca_key: &KeyPair,
) -> Result<(Certificate, KeyPair), HarnessError> {
    let mut params = CertificateParams::new(vec![subject.to_string()])?;
    params.distinguished_name.push(DnType::CommonName, subject);
    let key = KeyPair::generate()?;
    let cert = params.signed_by(&key, ca_cert, ca_key)?;
    Ok((cert, key))
}

fn write_store(path: &Path, sections: &[&str]) -> Result<(), HarnessError> {
    let pem = sections.concat();
    fs::write(path, pem).map_err(HarnessError::Io)
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used)]

    use super::*;
    use wireline_transport::StoreType;
    use wireline_transport::ssl::{load_cert_chain, load_private_key};

    #[test]
    fn generated_stores_are_loadable() {
        let fixture = CertFixture::generate().unwrap();

        let chain = load_cert_chain(&fixture.server_key_store, StoreType::Pem).unwrap();
        assert_eq!(chain.len(), 2, "leaf plus CA");
        load_private_key(&fixture.server_key_store, StoreType::Pem).unwrap();

        let roots = load_cert_chain(&fixture.trust_store, StoreType::Pem).unwrap();
        assert_eq!(roots.len(), 1);

        let other = load_cert_chain(&fixture.other_trust_store, StoreType::Pem).unwrap();
        assert_ne!(roots[0], other[0], "the two authorities must differ");
    }
}
