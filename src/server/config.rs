//! Gateway configuration and command line parsing.

use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};

use clap::Parser;
use rustls::pki_types::{CertificateDer, PrivateKeyDer};
use rustls::ServerConfig;

use crate::error::{Error, Result};

/// Default listen port when no socket is passed in by the service manager.
pub const DEFAULT_PORT: u16 = 19531;

/// Command line arguments of `journal-gatewayd`.
///
/// The daemon takes no positional arguments; TLS key and certificate must
/// be specified together.
#[derive(Debug, Parser)]
#[command(name = "journal-gatewayd", version, about = "Journal gateway daemon")]
pub struct CliArgs {
    /// PEM private key file enabling TLS.
    #[arg(long, value_name = "PATH", requires = "cert")]
    pub key: Option<PathBuf>,

    /// PEM certificate file enabling TLS.
    #[arg(long, value_name = "PATH", requires = "key")]
    pub cert: Option<PathBuf>,
}

impl CliArgs {
    /// Builds the runtime configuration from the parsed arguments.
    pub fn to_config(&self) -> GatewayConfig {
        GatewayConfig {
            tls: self.key.as_ref().zip(self.cert.as_ref()).map(|(key, cert)| TlsPaths {
                key: key.clone(),
                cert: cert.clone(),
            }),
            ..GatewayConfig::default()
        }
    }
}

/// Runtime configuration of the gateway.
#[derive(Debug, Clone)]
pub struct GatewayConfig {
    /// Listen port, ignored when a socket is adopted from the service manager.
    pub port: u16,
    /// Directory holding the static browser asset.
    pub document_root: PathBuf,
    /// TLS material; `None` serves plain HTTP.
    pub tls: Option<TlsPaths>,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            port: DEFAULT_PORT,
            document_root: PathBuf::from("/usr/share/journal-gateway"),
            tls: None,
        }
    }
}

/// Paths of the PEM key and certificate files.
#[derive(Debug, Clone)]
pub struct TlsPaths {
    pub key: PathBuf,
    pub cert: PathBuf,
}

/// Assembles a rustls server configuration from the PEM files.
pub fn build_rustls_config(paths: &TlsPaths) -> Result<ServerConfig> {
    let certs = load_certs(&paths.cert)?;
    let key = load_private_key(&paths.key)?;
    ServerConfig::builder()
        .with_no_client_auth()
        .with_single_cert(certs, key)
        .map_err(|err| Error::Tls(err.to_string()))
}

fn load_certs(path: &Path) -> Result<Vec<CertificateDer<'static>>> {
    let file = File::open(path)
        .map_err(|err| Error::Tls(format!("failed to open certificate file {}: {err}", path.display())))?;
    let mut reader = BufReader::new(file);

    let certs: Vec<CertificateDer<'static>> = rustls_pemfile::certs(&mut reader)
        .collect::<std::io::Result<_>>()
        .map_err(|err| Error::Tls(format!("failed to parse certificate file {}: {err}", path.display())))?;

    if certs.is_empty() {
        return Err(Error::Tls(format!(
            "no certificates found in {}",
            path.display()
        )));
    }
    Ok(certs)
}

fn load_private_key(path: &Path) -> Result<PrivateKeyDer<'static>> {
    let file = File::open(path)
        .map_err(|err| Error::Tls(format!("failed to open key file {}: {err}", path.display())))?;
    let mut reader = BufReader::new(file);

    rustls_pemfile::private_key(&mut reader)
        .map_err(|err| Error::Tls(format!("failed to parse key file {}: {err}", path.display())))?
        .ok_or_else(|| Error::Tls(format!("no private key found in {}", path.display())))
}
