//! Shared helpers for the integration tests
//!
//! Certificates are generated at test time, so no key material lives in
//! the repository.

#![allow(dead_code)]

use std::fs;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::pin::Pin;

use openssl::asn1::Asn1Time;
use openssl::bn::{BigNum, MsbOption};
use openssl::ec::{EcGroup, EcKey};
use openssl::hash::MessageDigest;
use openssl::nid::Nid;
use openssl::pkey::{PKey, Private};
use openssl::ssl::{SslAcceptor, SslConnector, SslFiletype, SslMethod, SslVerifyMode};
use openssl::x509::extension::{
    AuthorityKeyIdentifier, BasicConstraints, ExtendedKeyUsage, KeyUsage, SubjectAlternativeName,
    SubjectKeyIdentifier,
};
use openssl::x509::{X509Builder, X509Name, X509NameBuilder, X509Ref, X509};
use serde_json::json;
use tempfile::TempDir;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio_openssl::SslStream;

use mtls_relay::config::{ConfigFile, ProxySettings, SslSettings};
use mtls_relay::{ConfigLoader, Proxy};

/// PEM files for a throwaway CA, a server leaf and a client leaf
pub struct TestPki {
    pub dir: TempDir,
    pub ca_cert: PathBuf,
    pub server_cert: PathBuf,
    pub server_key: PathBuf,
    pub client_cert: PathBuf,
    pub client_key: PathBuf,
}

fn new_key() -> PKey<Private> {
    let group = EcGroup::from_curve_name(Nid::X9_62_PRIME256V1).unwrap();
    PKey::from_ec_key(EcKey::generate(&group).unwrap()).unwrap()
}

fn x509_name(common_name: &str) -> X509Name {
    let mut name = X509NameBuilder::new().unwrap();
    name.append_entry_by_text("CN", common_name).unwrap();
    name.build()
}

fn base_builder(name: &X509Name, key: &PKey<Private>) -> X509Builder {
    let mut serial = BigNum::new().unwrap();
    serial.rand(64, MsbOption::MAYBE_ZERO, false).unwrap();

    let mut builder = X509::builder().unwrap();
    builder.set_version(2).unwrap();
    builder.set_serial_number(&serial.to_asn1_integer().unwrap()).unwrap();
    builder.set_subject_name(name).unwrap();
    builder.set_pubkey(key).unwrap();
    builder.set_not_before(&Asn1Time::days_from_now(0).unwrap()).unwrap();
    builder.set_not_after(&Asn1Time::days_from_now(2).unwrap()).unwrap();
    builder
}

fn build_ca() -> (X509, PKey<Private>) {
    let key = new_key();
    let name = x509_name("Relay Test CA");
    let mut builder = base_builder(&name, &key);
    builder.set_issuer_name(&name).unwrap();

    builder.append_extension(BasicConstraints::new().critical().ca().build().unwrap()).unwrap();
    builder
        .append_extension(KeyUsage::new().critical().key_cert_sign().crl_sign().build().unwrap())
        .unwrap();
    let ski = SubjectKeyIdentifier::new()
        .build(&builder.x509v3_context(None, None))
        .unwrap();
    builder.append_extension(ski).unwrap();

    builder.sign(&key, MessageDigest::sha256()).unwrap();
    (builder.build(), key)
}

fn build_leaf(common_name: &str, ca: &X509, ca_key: &PKey<Private>, server: bool) -> (X509, PKey<Private>) {
    let key = new_key();
    let issuer: &X509Ref = ca;
    let mut builder = base_builder(&x509_name(common_name), &key);
    builder.set_issuer_name(issuer.subject_name()).unwrap();

    builder.append_extension(BasicConstraints::new().build().unwrap()).unwrap();
    builder
        .append_extension(KeyUsage::new().critical().digital_signature().build().unwrap())
        .unwrap();
    let eku = if server {
        ExtendedKeyUsage::new().server_auth().build().unwrap()
    } else {
        ExtendedKeyUsage::new().client_auth().build().unwrap()
    };
    builder.append_extension(eku).unwrap();

    let san = SubjectAlternativeName::new()
        .dns("localhost")
        .ip("127.0.0.1")
        .build(&builder.x509v3_context(Some(issuer), None))
        .unwrap();
    builder.append_extension(san).unwrap();
    let ski = SubjectKeyIdentifier::new()
        .build(&builder.x509v3_context(Some(issuer), None))
        .unwrap();
    builder.append_extension(ski).unwrap();
    let aki = AuthorityKeyIdentifier::new()
        .keyid(false)
        .build(&builder.x509v3_context(Some(issuer), None))
        .unwrap();
    builder.append_extension(aki).unwrap();

    builder.sign(ca_key, MessageDigest::sha256()).unwrap();
    (builder.build(), key)
}

fn write_pem(dir: &Path, name: &str, pem: Vec<u8>) -> PathBuf {
    let path = dir.join(name);
    fs::write(&path, pem).unwrap();
    path
}

/// Generate a CA plus server and client certificates signed by it
pub fn generate_pki() -> TestPki {
    let dir = tempfile::tempdir().unwrap();
    let (ca, ca_key) = build_ca();
    let (server, server_key) = build_leaf("localhost", &ca, &ca_key, true);
    let (client, client_key) = build_leaf("relay-client", &ca, &ca_key, false);

    TestPki {
        ca_cert: write_pem(dir.path(), "ca.crt", ca.to_pem().unwrap()),
        server_cert: write_pem(dir.path(), "server.crt", server.to_pem().unwrap()),
        server_key: write_pem(dir.path(), "server.key", server_key.private_key_to_pem_pkcs8().unwrap()),
        client_cert: write_pem(dir.path(), "client.crt", client.to_pem().unwrap()),
        client_key: write_pem(dir.path(), "client.key", client_key.private_key_to_pem_pkcs8().unwrap()),
        dir,
    }
}

pub fn path_str(path: &Path) -> String {
    path.to_string_lossy().into_owned()
}

/// A port that was free a moment ago
pub fn free_port() -> u16 {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    listener.local_addr().unwrap().port()
}

/// Address nothing listens on
pub async fn dead_addr() -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    listener.local_addr().unwrap()
}

pub fn plain_config(local: &str, server: &str) -> ConfigFile {
    ConfigFile {
        proxy: ProxySettings {
            local: local.to_string(),
            server: server.to_string(),
            connect_wait_time: 5,
        },
        local_ssl: SslSettings::default(),
        server_ssl: SslSettings::default(),
    }
}

fn ssl_json(ssl: &SslSettings) -> serde_json::Value {
    json!({
        "enable": ssl.enable,
        "crt_file_path": ssl.crt_file_path,
        "key_file_path": ssl.key_file_path,
        "ca_file_path": ssl.ca_file_path,
    })
}

/// Write `config` as JSON into `dir`
pub fn write_config(dir: &Path, config: &ConfigFile) -> PathBuf {
    let document = json!({
        "proxy": {
            "local": config.proxy.local,
            "server": config.proxy.server,
            "connect_wait_time": config.proxy.connect_wait_time,
        },
        "local_ssl": ssl_json(&config.local_ssl),
        "server_ssl": ssl_json(&config.server_ssl),
    });

    let path = dir.join("config.json");
    fs::write(&path, serde_json::to_string_pretty(&document).unwrap()).unwrap();
    path
}

/// Load the config through the file loader, bind the relay and run it
///
/// Returns the address clients should connect to.
pub async fn start_relay(config: &ConfigFile) -> SocketAddr {
    let dir = tempfile::tempdir().unwrap();
    let path = write_config(dir.path(), config);
    let loaded = ConfigLoader::load(&path).unwrap();

    let proxy = Proxy::from_config(&loaded).await.unwrap();
    let port = proxy.local_addr().port();
    tokio::spawn(proxy.run());

    SocketAddr::from(([127, 0, 0, 1], port))
}

/// Plain TCP echo server, returns its address
pub async fn start_echo_server() -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        loop {
            let Ok((mut stream, _)) = listener.accept().await else { continue };
            tokio::spawn(async move {
                let (mut reader, mut writer) = stream.split();
                let _ = tokio::io::copy(&mut reader, &mut writer).await;
            });
        }
    });

    addr
}

/// TLS echo server presenting the PKI server certificate
///
/// With `require_client_cert`, clients must present a certificate signed
/// by the test CA.
pub async fn start_tls_echo_server(pki: &TestPki, require_client_cert: bool) -> SocketAddr {
    let mut acceptor = SslAcceptor::mozilla_intermediate_v5(SslMethod::tls()).unwrap();
    acceptor.set_certificate_file(&pki.server_cert, SslFiletype::PEM).unwrap();
    acceptor.set_private_key_file(&pki.server_key, SslFiletype::PEM).unwrap();
    acceptor.set_ca_file(&pki.ca_cert).unwrap();
    if require_client_cert {
        acceptor.set_verify(SslVerifyMode::PEER | SslVerifyMode::FAIL_IF_NO_PEER_CERT);
    }
    let acceptor = acceptor.build();

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        loop {
            let Ok((tcp, _)) = listener.accept().await else { continue };
            let ssl = openssl::ssl::Ssl::new(acceptor.context()).unwrap();
            tokio::spawn(async move {
                let mut stream = Box::pin(SslStream::new(ssl, tcp).unwrap());
                if stream.as_mut().accept().await.is_err() {
                    return;
                }
                let mut buf = [0u8; 4096];
                loop {
                    match stream.read(&mut buf).await {
                        Ok(0) | Err(_) => break,
                        Ok(n) => {
                            if stream.write_all(&buf[..n]).await.is_err() {
                                break;
                            }
                        }
                    }
                }
            });
        }
    });

    addr
}

/// Connect to `addr` over TLS, trusting the test CA
pub async fn tls_connect(
    addr: SocketAddr,
    pki: &TestPki,
    with_client_cert: bool,
) -> Result<Pin<Box<SslStream<TcpStream>>>, String> {
    let mut connector = SslConnector::builder(SslMethod::tls()).unwrap();
    connector.set_ca_file(&pki.ca_cert).unwrap();
    if with_client_cert {
        connector.set_certificate_file(&pki.client_cert, SslFiletype::PEM).unwrap();
        connector.set_private_key_file(&pki.client_key, SslFiletype::PEM).unwrap();
    }
    let ssl = connector.build().configure().unwrap().into_ssl("localhost").unwrap();

    let tcp = TcpStream::connect(addr).await.map_err(|e| e.to_string())?;
    let mut stream = Box::pin(SslStream::new(ssl, tcp).unwrap());
    stream.as_mut().connect().await.map_err(|e| e.to_string())?;
    Ok(stream)
}

/// Send `payload` and read the same number of bytes back
pub async fn round_trip<S>(stream: &mut S, payload: &[u8]) -> std::io::Result<Vec<u8>>
where
    S: tokio::io::AsyncRead + tokio::io::AsyncWrite + Unpin,
{
    stream.write_all(payload).await?;
    let mut reply = vec![0u8; payload.len()];
    stream.read_exact(&mut reply).await?;
    Ok(reply)
}
