// src/core/scanner/ssl_scanner.rs

use std::collections::BTreeMap;
use std::io;
use std::net::{IpAddr, SocketAddr, TcpStream};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, NaiveDateTime, Utc};
use hickory_resolver::TokioAsyncResolver;
use hickory_resolver::config::{ResolverConfig, ResolverOpts};
use rustls::pki_types::ServerName;
use rustls::{ClientConfig, ClientConnection, ProtocolVersion, RootCertStore};
use tokio::task::spawn_blocking;
use tracing::{debug, error, info};
use url::{Host, Url};
use x509_parser::prelude::*;

use crate::core::models::{ErrorCategory, SslTlsReport, ToolError};

pub const DEFAULT_TLS_PORT: u16 = 443;

/// Certificate fields as read off the wire, before validity is evaluated.
///
/// Validity timestamps are kept in the textual form `Jun 19 00:00:00 2023 GMT`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PeerCertificate {
    pub issuer: BTreeMap<String, String>,
    pub subject: BTreeMap<String, String>,
    pub version: Option<u32>,
    pub serial_number: Option<String>,
    pub not_before: Option<String>,
    pub not_after: Option<String>,
}

/// What a completed handshake negotiated, plus the leaf certificate.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TlsSession {
    pub tls_version: Option<String>,
    pub cipher: Option<String>,
    pub certificate: PeerCertificate,
}

/// The port a TLS scan connects to.
///
/// `Url` drops a port equal to the scheme default, so `http://host:80` would
/// otherwise read as "no port". The raw target decides whether one was written.
pub fn tls_port(raw_target: &str, target_url: &Url) -> u16 {
    if let Some(port) = target_url.port() {
        return port;
    }
    if has_explicit_port(raw_target) {
        return target_url.port_or_known_default().unwrap_or(DEFAULT_TLS_PORT);
    }
    DEFAULT_TLS_PORT
}

fn has_explicit_port(raw_target: &str) -> bool {
    let rest = raw_target.trim().split_once("://").map_or(raw_target, |(_, rest)| rest);
    let authority = rest.split(['/', '?', '#']).next().unwrap_or_default();
    let host_port = authority.rsplit_once('@').map_or(authority, |(_, host)| host);
    let port = match host_port.rsplit_once(']') {
        Some((_, after_ipv6)) => after_ipv6.strip_prefix(':'),
        None => host_port.rsplit_once(':').map(|(_, port)| port),
    };
    port.is_some_and(|port| !port.is_empty() && port.chars().all(|c| c.is_ascii_digit()))
}

/// Connects to `port` on the target's host and reports on the TLS session.
pub async fn run_ssl_scan(target_url: &Url, port: u16, timeout: Duration) -> Result<SslTlsReport, ToolError> {
    info!(target = %target_url, port, "Starting SSL/TLS scan.");

    let host = target_host(target_url)?;
    let address = resolve_address(&host, port, timeout).await?;
    let hostname = match &host {
        Host::Ipv6(ip) => ip.to_string(),
        other => other.to_string(),
    };

    debug!(%address, "Spawning blocking task for TLS connection.");
    let server_name = hostname.clone();
    let session = spawn_blocking(move || read_tls_session(&server_name, address, timeout))
        .await
        .unwrap_or_else(|e| {
            error!(panic = %e, "Blocking SSL scan task panicked!");
            Err(ToolError::new(ErrorCategory::Unknown, format!("Task panicked: {}", e)))
        })?;

    let report = build_tls_report(hostname, port, session, Utc::now())?;
    info!(
        is_expired = report.is_expired,
        tls_version = report.tls_version.as_deref().unwrap_or("unknown"),
        "SSL/TLS scan finished."
    );
    Ok(report)
}

fn target_host(target_url: &Url) -> Result<Host<String>, ToolError> {
    target_url.host().map(|host| host.to_owned()).ok_or_else(|| {
        error!(target = %target_url, "Target URL has no host component.");
        ToolError::new(ErrorCategory::Unknown, "Could not parse hostname from URL.")
    })
}

async fn resolve_address(host: &Host<String>, port: u16, timeout: Duration) -> Result<SocketAddr, ToolError> {
    let ip = match host {
        Host::Ipv4(ip) => IpAddr::V4(*ip),
        Host::Ipv6(ip) => IpAddr::V6(*ip),
        Host::Domain(domain) => {
            debug!(domain = %domain, "Resolving target address.");
            let resolver = TokioAsyncResolver::tokio_from_system_conf().unwrap_or_else(|_| {
                TokioAsyncResolver::tokio(ResolverConfig::default(), ResolverOpts::default())
            });
            let lookup = tokio::time::timeout(timeout, resolver.lookup_ip(domain.as_str()))
                .await
                .map_err(|_| {
                    error!(domain = %domain, "DNS resolution timed out.");
                    ToolError::new(ErrorCategory::Timeout, format!("DNS resolution of {} timed out", domain))
                })?
                .map_err(|e| {
                    error!(domain = %domain, error = %e, "DNS resolution failed.");
                    ToolError::new(
                        ErrorCategory::DnsError,
                        format!("Address-related error connecting to server: {}", e),
                    )
                })?;
            lookup.iter().next().ok_or_else(|| {
                ToolError::new(ErrorCategory::DnsError, format!("No addresses found for {}", domain))
            })?
        }
    };
    Ok(SocketAddr::new(ip, port))
}

fn client_config() -> Result<Arc<ClientConfig>, ToolError> {
    let roots = RootCertStore {
        roots: webpki_roots::TLS_SERVER_ROOTS.to_vec(),
    };
    let config = ClientConfig::builder_with_provider(Arc::new(rustls::crypto::ring::default_provider()))
        .with_safe_default_protocol_versions()
        .map_err(|e| {
            error!(error = %e, "Failed to build TLS client configuration");
            ToolError::new(ErrorCategory::SslError, format!("TLS configuration error: {}", e))
        })?
        .with_root_certificates(roots)
        .with_no_client_auth();
    Ok(Arc::new(config))
}

fn read_tls_session(hostname: &str, address: SocketAddr, timeout: Duration) -> Result<TlsSession, ToolError> {
    debug!(hostname, %address, "Performing TLS connection and handshake.");

    let server_name = ServerName::try_from(hostname.to_string()).map_err(|e| {
        error!(hostname, error = %e, "Hostname is not a valid TLS server name");
        ToolError::new(ErrorCategory::SslError, format!("Invalid server name '{}': {}", hostname, e))
    })?;
    let mut connection = ClientConnection::new(client_config()?, server_name).map_err(|e| {
        error!(error = %e, "Failed to create TLS client connection");
        ToolError::new(ErrorCategory::SslError, format!("TLS client error: {}", e))
    })?;

    let mut stream = TcpStream::connect_timeout(&address, timeout).map_err(|e| {
        error!(error = %e, "TCP connection failed");
        connection_error(&e)
    })?;
    stream
        .set_read_timeout(Some(timeout))
        .and_then(|_| stream.set_write_timeout(Some(timeout)))
        .map_err(|e| connection_error(&e))?;

    while connection.is_handshaking() {
        connection.complete_io(&mut stream).map_err(|e| {
            error!(error = %e, "TLS handshake failed");
            handshake_error(&e)
        })?;
    }

    let cert_der = connection
        .peer_certificates()
        .and_then(|chain| chain.first())
        .ok_or_else(|| ToolError::new(ErrorCategory::SslError, "Server did not present a certificate."))?;

    let session = TlsSession {
        tls_version: connection.protocol_version().map(protocol_name),
        cipher: connection
            .negotiated_cipher_suite()
            .map(|suite| format!("{:?}", suite.suite())),
        certificate: parse_peer_certificate(cert_der.as_ref())?,
    };
    debug!(tls_version = ?session.tls_version, cipher = ?session.cipher, "TLS handshake complete.");
    Ok(session)
}

/// Protocol names in the `TLSv1.3` form OpenSSL reports.
fn protocol_name(version: ProtocolVersion) -> String {
    match version {
        ProtocolVersion::TLSv1_3 => "TLSv1.3".to_string(),
        ProtocolVersion::TLSv1_2 => "TLSv1.2".to_string(),
        ProtocolVersion::TLSv1_1 => "TLSv1.1".to_string(),
        ProtocolVersion::TLSv1_0 => "TLSv1".to_string(),
        other => format!("{:?}", other),
    }
}

fn connection_error(e: &io::Error) -> ToolError {
    match e.kind() {
        io::ErrorKind::ConnectionRefused => {
            ToolError::new(ErrorCategory::ConnectionRefused, format!("Connection refused: {}", e))
        }
        io::ErrorKind::TimedOut | io::ErrorKind::WouldBlock => {
            ToolError::new(ErrorCategory::Timeout, format!("Connection timed out: {}", e))
        }
        _ => ToolError::new(ErrorCategory::Unknown, format!("An unexpected error occurred: {}", e)),
    }
}

// rustls reports protocol and certificate failures as `InvalidData`.
fn handshake_error(e: &io::Error) -> ToolError {
    match e.kind() {
        io::ErrorKind::TimedOut | io::ErrorKind::WouldBlock => {
            ToolError::new(ErrorCategory::Timeout, "Connection timed out during TLS handshake")
        }
        io::ErrorKind::ConnectionRefused => {
            ToolError::new(ErrorCategory::ConnectionRefused, format!("Connection refused: {}", e))
        }
        _ => ToolError::new(ErrorCategory::SslError, format!("SSL Error: {}", e)),
    }
}

/// Decodes a DER certificate into the fields reported by the scan.
pub fn parse_peer_certificate(der: &[u8]) -> Result<PeerCertificate, ToolError> {
    let (_, x509) = parse_x509_certificate(der).map_err(|e| {
        error!(error = %e, "Failed to parse X.509 certificate");
        ToolError::new(ErrorCategory::SslError, format!("X.509 Parse Error: {}", e))
    })?;

    info!(subject = %x509.subject(), issuer = %x509.issuer(), "Successfully parsed certificate.");

    let validity = x509.validity();
    Ok(PeerCertificate {
        issuer: name_attributes(x509.issuer()),
        subject: name_attributes(x509.subject()),
        version: Some(x509.version().0 + 1),
        serial_number: Some(format_serial(x509.raw_serial())),
        not_before: Some(format_cert_time(&asn1_time_to_chrono_utc(&validity.not_before))),
        not_after: Some(format_cert_time(&asn1_time_to_chrono_utc(&validity.not_after))),
    })
}

fn name_attributes(name: &X509Name<'_>) -> BTreeMap<String, String> {
    let fields = [
        ("commonName", first_value(name.iter_common_name())),
        ("organizationName", first_value(name.iter_organization())),
        ("organizationalUnitName", first_value(name.iter_organizational_unit())),
        ("countryName", first_value(name.iter_country())),
        ("stateOrProvinceName", first_value(name.iter_state_or_province())),
        ("localityName", first_value(name.iter_locality())),
        ("emailAddress", first_value(name.iter_email())),
    ];
    fields
        .into_iter()
        .filter_map(|(key, value)| value.map(|value| (key.to_string(), value)))
        .collect()
}

fn first_value<'a, 'b>(mut values: impl Iterator<Item = &'a AttributeTypeAndValue<'b>>) -> Option<String>
where
    'b: 'a,
{
    values.find_map(|attr| attr.as_str().ok()).map(String::from)
}

fn format_serial(raw: &[u8]) -> String {
    let significant = match raw.iter().position(|byte| *byte != 0) {
        Some(start) => &raw[start..],
        None => &raw[raw.len().saturating_sub(1)..],
    };
    significant.iter().map(|byte| format!("{:02X}", byte)).collect()
}

fn asn1_time_to_chrono_utc(time: &ASN1Time) -> DateTime<Utc> {
    DateTime::from_timestamp(time.timestamp(), 0).unwrap_or_default()
}

fn format_cert_time(time: &DateTime<Utc>) -> String {
    time.format("%b %e %H:%M:%S %Y GMT").to_string()
}

/// Parses `Mon DD HH:MM:SS YYYY GMT`. Single-digit days may be space padded.
pub fn parse_cert_time(raw: &str) -> Result<NaiveDateTime, ToolError> {
    let invalid = || ToolError::new(ErrorCategory::Unknown, format!("Unrecognized certificate timestamp: {:?}", raw));

    let parts: Vec<&str> = raw.split_whitespace().collect();
    let [month, day, clock, year, zone] = parts.as_slice() else {
        return Err(invalid());
    };
    if !matches!(*zone, "GMT" | "UTC") {
        return Err(invalid());
    }
    NaiveDateTime::parse_from_str(&format!("{} {} {} {}", month, day, clock, year), "%b %d %H:%M:%S %Y")
        .map_err(|_| invalid())
}

/// Builds the report, marking the certificate expired when `now` is past `notAfter`.
pub fn build_tls_report(
    hostname: String,
    port: u16,
    session: TlsSession,
    now: DateTime<Utc>,
) -> Result<SslTlsReport, ToolError> {
    let certificate = session.certificate;
    let not_before = certificate.not_before.as_deref().map(parse_cert_time).transpose()?;
    let not_after = certificate.not_after.as_deref().map(parse_cert_time).transpose()?;
    let is_expired = not_after.is_some_and(|expiry| now.naive_utc() > expiry);

    if is_expired {
        debug!(?not_after, "Certificate is expired.");
    }

    Ok(SslTlsReport {
        hostname,
        port,
        issuer: certificate.issuer,
        subject: certificate.subject,
        version: certificate.version,
        serial_number: certificate.serial_number,
        not_before,
        not_after,
        is_expired,
        tls_version: session.tls_version,
        cipher: session.cipher,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn session(not_after: &str) -> TlsSession {
        TlsSession {
            tls_version: Some("TLSv1.3".to_string()),
            cipher: Some("TLS13_AES_256_GCM_SHA384".to_string()),
            certificate: PeerCertificate {
                subject: BTreeMap::from([("commonName".to_string(), "example.com".to_string())]),
                version: Some(3),
                not_before: Some("Jan  1 00:00:00 2020 GMT".to_string()),
                not_after: Some(not_after.to_string()),
                ..PeerCertificate::default()
            },
        }
    }

    #[test]
    fn test_parse_cert_time() {
        let parsed = parse_cert_time("Jun 19 12:30:00 2023 GMT").unwrap();
        assert_eq!(parsed.to_string(), "2023-06-19 12:30:00");

        let padded = parse_cert_time("Jan  1 00:00:00 2020 GMT").unwrap();
        assert_eq!(padded.to_string(), "2020-01-01 00:00:00");

        assert!(parse_cert_time("2023-06-19T12:30:00Z").is_err());
        assert!(parse_cert_time("Jun 19 12:30:00 2023 PST").is_err());
    }

    #[test]
    fn test_certificate_past_not_after_is_expired() {
        let now = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        let report = build_tls_report(
            "example.com".to_string(),
            443,
            session("Jun 19 00:00:00 2023 GMT"),
            now,
        )
        .unwrap();

        assert!(report.is_expired);
        assert_eq!(report.subject.get("commonName").map(String::as_str), Some("example.com"));
    }

    #[test]
    fn test_certificate_before_not_after_is_valid() {
        let now = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        let report = build_tls_report(
            "example.com".to_string(),
            8443,
            session("Dec 31 23:59:59 2030 GMT"),
            now,
        )
        .unwrap();

        assert!(!report.is_expired);
        assert_eq!(report.port, 8443);
    }

    #[test]
    fn test_report_carries_negotiated_protocol_and_cipher() {
        let now = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        let report = build_tls_report("example.com".to_string(), 443, session("Dec 31 23:59:59 2030 GMT"), now).unwrap();

        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["tls_version"], "TLSv1.3");
        assert_eq!(json["cipher"], "TLS13_AES_256_GCM_SHA384");
    }

    #[test]
    fn test_unknown_protocol_and_cipher_serialize_as_null() {
        let now = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        let bare = TlsSession {
            certificate: session("Dec 31 23:59:59 2030 GMT").certificate,
            ..TlsSession::default()
        };
        let json = serde_json::to_value(build_tls_report("example.com".to_string(), 443, bare, now).unwrap()).unwrap();

        let object = json.as_object().unwrap();
        assert!(object["tls_version"].is_null());
        assert!(object["cipher"].is_null());
    }

    #[test]
    fn test_protocol_names() {
        assert_eq!(protocol_name(ProtocolVersion::TLSv1_3), "TLSv1.3");
        assert_eq!(protocol_name(ProtocolVersion::TLSv1_2), "TLSv1.2");
    }

    #[test]
    fn test_explicit_default_port_is_kept() {
        let raw = "http://example.com:80";
        let url = Url::parse(raw).unwrap();
        assert_eq!(url.port(), None);
        assert_eq!(tls_port(raw, &url), 80);

        let raw = "https://example.com:443/path";
        assert_eq!(tls_port(raw, &Url::parse(raw).unwrap()), 443);
    }

    #[test]
    fn test_port_falls_back_to_tls_default() {
        for raw in ["http://example.com", "http://example.com/a:80", "http://user:pw@example.com/", "http://[::1]/"] {
            assert_eq!(tls_port(raw, &Url::parse(raw).unwrap()), DEFAULT_TLS_PORT, "{}", raw);
        }
    }

    #[test]
    fn test_non_default_ports_are_used() {
        for (raw, port) in [("https://example.com:8443", 8443), ("http://user:pw@[::1]:8080/x", 8080)] {
            assert_eq!(tls_port(raw, &Url::parse(raw).unwrap()), port, "{}", raw);
        }
    }

    #[test]
    fn test_formatted_times_parse_back() {
        let time = Utc.with_ymd_and_hms(2025, 3, 7, 8, 9, 10).unwrap();
        let parsed = parse_cert_time(&format_cert_time(&time)).unwrap();
        assert_eq!(parsed, time.naive_utc());
    }

    #[test]
    fn test_serial_drops_sign_padding() {
        assert_eq!(format_serial(&[0x00, 0x9f, 0x0a]), "9F0A");
        assert_eq!(format_serial(&[0x00]), "00");
    }

    #[tokio::test]
    async fn test_refused_connection_is_categorized() {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);

        let url = Url::parse(&format!("https://127.0.0.1:{}/", port)).unwrap();
        let error = run_ssl_scan(&url, port, Duration::from_secs(2)).await.unwrap_err();
        assert_eq!(error.category, ErrorCategory::ConnectionRefused);
    }
}
