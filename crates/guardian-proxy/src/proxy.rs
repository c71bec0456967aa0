//! CONNECT proxy (C9): authenticated HTTP CONNECT tunnel with layered
//! allow/deny policy and blocking human approval for unlisted domains.

use std::{
    net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr},
    sync::Arc,
    time::Duration,
};

use guardian_core::{
    audit::{AuditAction, AuditEntry, AuditSender},
    cache::AllowlistCache,
    session::SessionLists,
    token::TokenRegistry,
    types::Outcome,
};
use tokio::{
    io::{AsyncBufReadExt, AsyncWriteExt, BufReader},
    net::{TcpListener, TcpStream},
};
use tracing::{info, instrument, warn};

use crate::{domain_approver::DomainApprover, metrics};

pub struct ProxyConfig {
    pub bind_addr: SocketAddr,
    pub upstream_dial_timeout: Duration,
    pub idle_splice_timeout: Duration,
}

pub struct GuardianProxy {
    cfg: ProxyConfig,
    token_registry: Arc<TokenRegistry>,
    sessions: Arc<SessionLists>,
    cache: Arc<AllowlistCache>,
    domain_approver: Arc<DomainApprover>,
    audit_tx: Option<AuditSender>,
}

impl GuardianProxy {
    pub fn new(
        cfg: ProxyConfig,
        token_registry: Arc<TokenRegistry>,
        sessions: Arc<SessionLists>,
        cache: Arc<AllowlistCache>,
        domain_approver: Arc<DomainApprover>,
        audit_tx: Option<AuditSender>,
    ) -> Self {
        Self {
            cfg,
            token_registry,
            sessions,
            cache,
            domain_approver,
            audit_tx,
        }
    }

    /// Accept loop. Stops when `shutdown` is signalled.
    pub async fn run(self: Arc<Self>, mut shutdown: tokio::sync::watch::Receiver<bool>) -> crate::error::Result<()> {
        let listener = TcpListener::bind(self.cfg.bind_addr).await?;
        info!(addr = %self.cfg.bind_addr, "guardian proxy listening");
        loop {
            tokio::select! {
                accepted = listener.accept() => {
                    let (stream, peer) = accepted?;
                    if !is_private_or_loopback(&peer.ip()) {
                        warn!(%peer, "rejecting connection from non-private peer");
                        continue;
                    }
                    let this = Arc::clone(&self);
                    tokio::spawn(async move {
                        metrics::connection_opened();
                        if let Err(e) = this.handle_client(stream).await {
                            warn!(error = %e, "connection handler failed");
                        }
                        metrics::connection_closed();
                    });
                }
                _ = shutdown_signal(&mut shutdown) => {
                    info!("guardian proxy shutting down");
                    return Ok(());
                }
            }
        }
    }

    #[instrument(skip(self, stream))]
    async fn handle_client(&self, stream: TcpStream) -> std::io::Result<()> {
        let mut reader = BufReader::new(stream);
        let mut request_line = String::new();
        if reader.read_line(&mut request_line).await? == 0 {
            return Ok(());
        }
        let request_line = request_line.trim_end();
        let mut parts = request_line.split_whitespace();
        let method = parts.next().unwrap_or_default();
        let target = parts.next().unwrap_or_default();

        if method != "CONNECT" {
            let suppress_body = method == "HEAD";
            let body = if suppress_body { "" } else { "only CONNECT is serviced" };
            write_response(&mut reader, 405, "Method Not Allowed", None, body).await?;
            return Ok(());
        }

        if target.is_empty() {
            write_response(&mut reader, 400, "Bad Request", None, "empty authority").await?;
            return Ok(());
        }

        let mut proxy_authorization: Option<String> = None;
        loop {
            let mut header_line = String::new();
            if reader.read_line(&mut header_line).await? == 0 {
                break;
            }
            let header_line = header_line.trim_end();
            if header_line.is_empty() {
                break;
            }
            if let Some((name, value)) = header_line.split_once(':') {
                if name.eq_ignore_ascii_case("proxy-authorization") {
                    proxy_authorization = Some(value.trim().to_string());
                }
            }
        }

        self.handle_connect(reader, target, proxy_authorization.as_deref()).await
    }

    async fn handle_connect(
        &self,
        mut reader: BufReader<TcpStream>,
        authority: &str,
        proxy_authorization: Option<&str>,
    ) -> std::io::Result<()> {
        let token = match extract_token(proxy_authorization) {
            Ok(Some(t)) => t,
            Ok(None) => {
                self.emit_audit(authority, "", AuditAction::AuthFailure, None).await;
                return write_response(
                    &mut reader,
                    407,
                    "Proxy Authentication Required",
                    Some("Proxy-Authenticate: Basic realm=\"cloister\""),
                    "missing credentials",
                )
                .await;
            },
            Err(reason) => {
                self.emit_audit(authority, "", AuditAction::AuthFailure, Some(&reason)).await;
                return write_response(
                    &mut reader,
                    407,
                    "Proxy Authentication Required",
                    Some("Proxy-Authenticate: Basic realm=\"cloister\""),
                    &reason,
                )
                .await;
            },
        };

        // Exactly one token lookup per request; threaded through `decide()`
        // and every downstream branch below.
        let Some(binding) = self.token_registry.lookup(&token) else {
            self.emit_audit(authority, &token, AuditAction::AuthFailure, Some("unknown token")).await;
            return write_response(
                &mut reader,
                407,
                "Proxy Authentication Required",
                Some("Proxy-Authenticate: Basic realm=\"cloister\""),
                "unknown token",
            )
            .await;
        };

        let snapshot = self.cache.snapshot();
        let mut outcome = guardian_core::decide(&token, Some(&binding), authority, &self.sessions, &snapshot);
        let mut approved_by_human = false;

        if outcome == Outcome::AskHuman {
            outcome = self
                .domain_approver
                .request_approval(&binding.project_name, &binding.cloister_name, authority, &token)
                .await;
            approved_by_human = outcome == Outcome::Allow;
        }

        match outcome {
            Outcome::Deny => {
                metrics::request_result("denied");
                self.emit_audit(authority, &token, AuditAction::Denied, None).await;
                write_response(&mut reader, 403, "Forbidden", None, "domain not permitted").await
            },
            Outcome::AskHuman => unreachable!("request_approval never returns AskHuman"),
            Outcome::Allow => {
                metrics::request_result(if approved_by_human { "approved" } else { "allowed" });
                self.dial_and_splice(reader, authority, &token, approved_by_human).await
            },
        }
    }

    async fn dial_and_splice(
        &self,
        mut reader: BufReader<TcpStream>,
        authority: &str,
        token: &str,
        approved_by_human: bool,
    ) -> std::io::Result<()> {
        let upstream = match tokio::time::timeout(self.cfg.upstream_dial_timeout, TcpStream::connect(authority)).await {
            Ok(Ok(stream)) => stream,
            Ok(Err(e)) => {
                metrics::upstream_error("connect_failed");
                self.emit_audit(authority, token, AuditAction::Denied, Some(&e.to_string())).await;
                return write_response(&mut reader, 502, "Bad Gateway", None, "upstream refused connection").await;
            },
            Err(_) => {
                metrics::upstream_error("dial_timeout");
                self.emit_audit(authority, token, AuditAction::Timeout, Some("upstream dial timeout")).await;
                return write_response(&mut reader, 504, "Gateway Timeout", None, "upstream dial timed out").await;
            },
        };

        let tunnel_started = std::time::Instant::now();
        let mut client = reader.into_inner();
        client.write_all(b"HTTP/1.1 200 Connection Established\r\n\r\n").await?;

        let (mut client_rd, mut client_wr) = client.into_split();
        let (mut upstream_rd, mut upstream_wr) = upstream.into_split();

        let idle_timeout = self.cfg.idle_splice_timeout;
        let client_to_upstream = async move {
            tokio::time::timeout(idle_timeout, tokio::io::copy(&mut client_rd, &mut upstream_wr))
                .await
                .unwrap_or(Ok(0))
        };
        let upstream_to_client = async move {
            tokio::time::timeout(idle_timeout, tokio::io::copy(&mut upstream_rd, &mut client_wr))
                .await
                .unwrap_or(Ok(0))
        };

        let (sent, received) = tokio::join!(client_to_upstream, upstream_to_client);
        metrics::tunnel_duration(tunnel_started.elapsed().as_secs_f64());
        if let Ok(n) = sent {
            metrics::bytes_transferred("client_to_upstream", n);
        }
        if let Ok(n) = received {
            metrics::bytes_transferred("upstream_to_client", n);
        }
        let action = if approved_by_human { AuditAction::ApprovedByUser } else { AuditAction::Allowed };
        self.emit_audit_with_bytes(authority, token, action, sent.ok(), received.ok()).await;
        Ok(())
    }

    async fn emit_audit(&self, authority: &str, token: &str, action: AuditAction, error: Option<&str>) {
        self.emit_audit_with_bytes_and_error(authority, token, action, None, None, error).await;
    }

    async fn emit_audit_with_bytes(&self, authority: &str, token: &str, action: AuditAction, sent: Option<u64>, received: Option<u64>) {
        self.emit_audit_with_bytes_and_error(authority, token, action, sent, received, None).await;
    }

    async fn emit_audit_with_bytes_and_error(
        &self,
        authority: &str,
        token: &str,
        action: AuditAction,
        bytes_sent: Option<u64>,
        bytes_received: Option<u64>,
        error: Option<&str>,
    ) {
        let Some(tx) = &self.audit_tx else { return };
        let token_prefix = token.chars().take(8).collect();
        let entry = AuditEntry {
            timestamp: time::OffsetDateTime::now_utc(),
            token_prefix,
            domain: guardian_core::matcher::strip_port(authority),
            action,
            bytes_sent,
            bytes_received,
            error: error.map(str::to_string),
        };
        let _ = tx.try_send(entry);
    }
}

/// Decode `Basic base64(user:token)`; the password field carries the token.
fn extract_token(proxy_authorization: Option<&str>) -> Result<Option<String>, String> {
    let Some(header) = proxy_authorization else {
        return Ok(None);
    };
    let encoded = header
        .strip_prefix("Basic ")
        .ok_or_else(|| "proxy-authorization must use Basic scheme".to_string())?;
    let decoded = base64::Engine::decode(&base64::engine::general_purpose::STANDARD, encoded)
        .map_err(|_| "invalid base64 in proxy-authorization".to_string())?;
    let decoded = String::from_utf8(decoded).map_err(|_| "invalid utf-8 in proxy-authorization".to_string())?;
    let (_, token) = decoded
        .split_once(':')
        .ok_or_else(|| "proxy-authorization missing colon separator".to_string())?;
    Ok(Some(token.to_string()))
}

async fn write_response(
    reader: &mut BufReader<TcpStream>,
    status: u16,
    reason: &str,
    extra_header: Option<&str>,
    body: &str,
) -> std::io::Result<()> {
    let mut response = format!("HTTP/1.1 {status} {reason}\r\n");
    if let Some(h) = extra_header {
        response.push_str(h);
        response.push_str("\r\n");
    }
    response.push_str(&format!("Content-Length: {}\r\n\r\n{body}", body.len()));
    reader.get_mut().write_all(response.as_bytes()).await
}

async fn shutdown_signal(rx: &mut tokio::sync::watch::Receiver<bool>) {
    if *rx.borrow_and_update() {
        return;
    }
    let _ = rx.changed().await;
}

/// Reject connections from routable public peers; only loopback, RFC1918,
/// CGNAT, and IPv6 ULA ranges may reach the proxy.
pub fn is_private_or_loopback(ip: &IpAddr) -> bool {
    match ip {
        IpAddr::V4(v4) => v4.is_loopback() || v4.is_private() || v4.is_link_local() || is_cgnat(*v4),
        IpAddr::V6(v6) => v6.is_loopback() || is_ula(*v6) || v6.is_unicast_link_local(),
    }
}

/// 100.64.0.0/10 (carrier-grade NAT, used by Tailscale/Docker).
pub fn is_cgnat(ip: Ipv4Addr) -> bool {
    let octets = ip.octets();
    octets[0] == 100 && (octets[1] & 0b1100_0000) == 0b0100_0000
}

/// fc00::/7 (unique local address).
pub fn is_ula(ip: Ipv6Addr) -> bool {
    (ip.segments()[0] & 0xfe00) == 0xfc00
}
