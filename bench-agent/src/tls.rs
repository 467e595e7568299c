// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Writes the TLS material set delivered over the certificates relation.

use crate::config::Config;
use crate::relations::{CaClientError, CertificatesRelation};
use camino::{Utf8Path, Utf8PathBuf};
use openssl::pkey::PKey;
use openssl::x509::X509;
use slog::{info, Logger};

/// The five file artifacts regenerated wholesale on each issuance event.
pub struct TlsMaterialPaths {
    pub key: Utf8PathBuf,
    pub pub_key: Utf8PathBuf,
    pub cert: Utf8PathBuf,
    pub key_and_cert: Utf8PathBuf,
    pub ca_cert: Utf8PathBuf,
}

impl TlsMaterialPaths {
    pub fn from_config(config: &Config) -> Self {
        Self {
            key: config.tls_key(),
            pub_key: config.tls_pub_key(),
            cert: config.tls_cert(),
            key_and_cert: config.tls_key_and_cert(),
            ca_cert: config.tls_ca_cert(),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum TlsError {
    #[error(transparent)]
    CaClient(#[from] CaClientError),

    #[error("Failed to parse application private key")]
    BadPrivateKey(#[source] openssl::error::ErrorStack),

    #[error("Failed to parse application certificate")]
    BadCertificate(#[source] openssl::error::ErrorStack),

    #[error("Certificate and private key do not match")]
    Mismatch,

    #[error("Failed to derive public key")]
    DerivePublicKey(#[source] openssl::error::ErrorStack),

    #[error("Failed to write {path}: {err}")]
    Io {
        path: Utf8PathBuf,
        #[source]
        err: std::io::Error,
    },
}

fn write(path: &Utf8Path, contents: &[u8]) -> Result<(), TlsError> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .map_err(|err| TlsError::Io { path: path.into(), err })?;
    }
    std::fs::write(path, contents)
        .map_err(|err| TlsError::Io { path: path.into(), err })
}

/// Writes all five TLS artifacts from the delivered material.
///
/// The private key is parsed to verify it matches the certificate and to
/// derive the public key; the key, certificate, and CA certificate files
/// carry the PEM bytes exactly as delivered. The combined file is the
/// certificate, a newline, then the key.
pub fn write_material(
    log: &Logger,
    paths: &TlsMaterialPaths,
    certificates: &CertificatesRelation,
) -> Result<(), TlsError> {
    let key_pem = certificates.application_key()?;
    let cert_pem = certificates.application_certificate()?;
    let ca_pem = certificates.ca_certificate()?;

    let key = PKey::private_key_from_pem(key_pem.as_bytes())
        .map_err(TlsError::BadPrivateKey)?;
    let cert = X509::from_pem(cert_pem.as_bytes())
        .map_err(TlsError::BadCertificate)?;
    if !cert
        .public_key()
        .map_err(TlsError::BadCertificate)?
        .public_eq(&key)
    {
        return Err(TlsError::Mismatch);
    }
    let pub_key_pem =
        key.public_key_to_pem().map_err(TlsError::DerivePublicKey)?;

    write(&paths.key, key_pem.as_bytes())?;
    write(&paths.pub_key, &pub_key_pem)?;
    write(&paths.cert, cert_pem.as_bytes())?;
    write(
        &paths.key_and_cert,
        format!("{cert_pem}\n{key_pem}").as_bytes(),
    )?;
    write(&paths.ca_cert, ca_pem.as_bytes())?;
    info!(log, "Wrote TLS material"; "cert" => %paths.cert);
    Ok(())
}
