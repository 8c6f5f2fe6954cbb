//! TLS configuration for PostgreSQL connections.
//!
//! `tokio-postgres` only understands `disable`, `prefer` and `require`, so
//! the `sslmode` parameter is lifted out of the DSN and handled here before
//! the remainder is parsed.

use std::sync::Arc;

use rustls::client::danger::{HandshakeSignatureValid, ServerCertVerified, ServerCertVerifier};
use rustls::pki_types::{CertificateDer, ServerName, UnixTime};
use rustls::{ClientConfig, DigitallySignedStruct, SignatureScheme};
use tokio_postgres_rustls::MakeRustlsConnect;
use tracing::warn;

use crate::error::{CopyError, Result};

/// PostgreSQL `sslmode` values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SslMode {
    Disable,
    #[default]
    Prefer,
    Require,
    VerifyCa,
    VerifyFull,
}

impl SslMode {
    pub fn parse(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "disable" => Ok(SslMode::Disable),
            "prefer" | "allow" | "" => Ok(SslMode::Prefer),
            "require" => Ok(SslMode::Require),
            "verify-ca" => Ok(SslMode::VerifyCa),
            "verify-full" => Ok(SslMode::VerifyFull),
            other => Err(CopyError::Config(format!(
                "unknown sslmode '{}' (disable, prefer, require, verify-ca, verify-full)",
                other
            ))),
        }
    }

    /// The mode handed to `tokio-postgres`.
    pub fn driver_mode(&self) -> tokio_postgres::config::SslMode {
        match self {
            SslMode::Disable => tokio_postgres::config::SslMode::Disable,
            SslMode::Prefer => tokio_postgres::config::SslMode::Prefer,
            _ => tokio_postgres::config::SslMode::Require,
        }
    }

    /// Remove `sslmode` from a URL or key/value DSN, returning the remaining
    /// DSN and the parsed mode.
    pub fn split_from_dsn(dsn: &str) -> Result<(String, SslMode)> {
        let dsn = dsn.trim();
        if dsn.starts_with("postgres://") || dsn.starts_with("postgresql://") {
            let Some((base, query)) = dsn.split_once('?') else {
                return Ok((dsn.to_string(), SslMode::default()));
            };
            let mut mode = SslMode::default();
            let mut kept = Vec::new();
            for pair in query.split('&').filter(|p| !p.is_empty()) {
                match pair.split_once('=') {
                    Some((key, value)) if key.eq_ignore_ascii_case("sslmode") => {
                        mode = SslMode::parse(value)?;
                    }
                    _ => kept.push(pair),
                }
            }
            let rebuilt = if kept.is_empty() {
                base.to_string()
            } else {
                format!("{}?{}", base, kept.join("&"))
            };
            return Ok((rebuilt, mode));
        }

        let mut mode = SslMode::default();
        let mut kept = Vec::new();
        for part in dsn.split_whitespace() {
            match part.split_once('=') {
                Some((key, value)) if key.eq_ignore_ascii_case("sslmode") => {
                    mode = SslMode::parse(value)?;
                }
                _ => kept.push(part),
            }
        }
        Ok((kept.join(" "), mode))
    }
}

/// The rustls connector for `mode`, or `None` for plain TCP.
///
/// `prefer` and `require` skip certificate checks like libpq does;
/// `verify-ca` and `verify-full` validate against the webpki roots.
pub fn connector(mode: SslMode) -> Result<Option<MakeRustlsConnect>> {
    let builder = ClientConfig::builder();
    let config = match mode {
        SslMode::Disable => return Ok(None),
        SslMode::Prefer => builder
            .dangerous()
            .with_custom_certificate_verifier(Arc::new(AcceptAnyCert::new()))
            .with_no_client_auth(),
        SslMode::Require => {
            warn!("sslmode=require: the server certificate is not verified");
            builder
                .dangerous()
                .with_custom_certificate_verifier(Arc::new(AcceptAnyCert::new()))
                .with_no_client_auth()
        }
        SslMode::VerifyCa | SslMode::VerifyFull => {
            let roots = rustls::RootCertStore {
                roots: webpki_roots::TLS_SERVER_ROOTS.to_vec(),
            };
            builder.with_root_certificates(roots).with_no_client_auth()
        }
    };
    Ok(Some(MakeRustlsConnect::new(config)))
}

#[derive(Debug)]
struct AcceptAnyCert {
    schemes: Vec<SignatureScheme>,
}

impl AcceptAnyCert {
    fn new() -> Self {
        Self {
            schemes: rustls::crypto::ring::default_provider()
                .signature_verification_algorithms
                .supported_schemes(),
        }
    }
}

impl ServerCertVerifier for AcceptAnyCert {
    fn verify_server_cert(
        &self,
        _: &CertificateDer<'_>,
        _: &[CertificateDer<'_>],
        _: &ServerName<'_>,
        _: &[u8],
        _: UnixTime,
    ) -> std::result::Result<ServerCertVerified, rustls::Error> {
        Ok(ServerCertVerified::assertion())
    }

    fn verify_tls12_signature(
        &self,
        _: &[u8],
        _: &CertificateDer<'_>,
        _: &DigitallySignedStruct,
    ) -> std::result::Result<HandshakeSignatureValid, rustls::Error> {
        Ok(HandshakeSignatureValid::assertion())
    }

    fn verify_tls13_signature(
        &self,
        _: &[u8],
        _: &CertificateDer<'_>,
        _: &DigitallySignedStruct,
    ) -> std::result::Result<HandshakeSignatureValid, rustls::Error> {
        Ok(HandshakeSignatureValid::assertion())
    }

    fn supported_verify_schemes(&self) -> Vec<SignatureScheme> {
        self.schemes.clone()
    }
}
