//! Minimal blocking SMTP submission client.
//!
//! Speaks just enough of RFC 5321 to submit one plain-text message through
//! an authenticated relay: EHLO, mandatory STARTTLS, AUTH (PLAIN or LOGIN,
//! whichever the relay advertises), one envelope, DATA. Runs on a blocking
//! thread; the caller wraps it in `spawn_blocking`.

use std::io::{Read, Write};
use std::net::{TcpStream, ToSocketAddrs};
use std::sync::Arc;
use std::time::Duration;

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64;
use tracing::{debug, trace};

use vigil_core::SmtpCredentials;

use crate::error::NotifyError;

/// Longest reply line accepted before the relay is considered broken.
const MAX_LINE: usize = 4096;

/// A message ready for submission.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Envelope {
    pub from: String,
    pub to: Vec<String>,
    pub subject: String,
    pub body: String,
}

impl Envelope {
    /// Build an envelope from configured addresses. `to` may hold several
    /// comma-separated recipients.
    pub fn new(from: &str, to: &str, subject: &str, body: &str) -> Result<Self, NotifyError> {
        let recipients = parse_recipients(to);
        if recipients.is_empty() {
            return Err(NotifyError::NoRecipients(to.to_string()));
        }
        Ok(Self {
            from: from.trim().to_string(),
            to: recipients,
            subject: subject.to_string(),
            body: body.to_string(),
        })
    }
}

/// One parsed SMTP reply (possibly multi-line).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reply {
    pub code: u16,
    pub lines: Vec<String>,
}

impl Reply {
    pub fn message(&self) -> String {
        self.lines.join(" ")
    }
}

/// SASL mechanisms the client can speak, in order of preference.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthMechanism {
    Plain,
    Login,
}

impl AuthMechanism {
    /// Pick a mechanism from the ones listed in the EHLO reply.
    pub fn negotiate(offered: &[String]) -> Result<Self, NotifyError> {
        let offers = |name: &str| offered.iter().any(|m| m.eq_ignore_ascii_case(name));
        if offers("PLAIN") {
            Ok(AuthMechanism::Plain)
        } else if offers("LOGIN") {
            Ok(AuthMechanism::Login)
        } else {
            Err(NotifyError::NoAuthMechanism(offered.join(" ")))
        }
    }
}

/// Mechanisms advertised by an EHLO reply (`AUTH ...` or the legacy
/// `AUTH=...` form).
pub fn auth_mechanisms(ehlo: &Reply) -> Vec<String> {
    let mut mechanisms = Vec::new();
    for line in &ehlo.lines {
        let mut words = line.split_whitespace();
        let Some(keyword) = words.next() else {
            continue;
        };
        let first = if keyword.eq_ignore_ascii_case("AUTH") {
            None
        } else {
            match keyword.get(..5) {
                Some(prefix) if prefix.eq_ignore_ascii_case("AUTH=") => Some(&keyword[5..]),
                _ => continue,
            }
        };
        for mechanism in first.into_iter().chain(words).filter(|m| !m.is_empty()) {
            let mechanism = mechanism.to_ascii_uppercase();
            if !mechanisms.contains(&mechanism) {
                mechanisms.push(mechanism);
            }
        }
    }
    mechanisms
}

/// Underlying transport: plain TCP before STARTTLS, TLS after.
enum Transport {
    Plain(TcpStream),
    Tls(Box<rustls::StreamOwned<rustls::ClientConnection, TcpStream>>),
}

impl Read for Transport {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        match self {
            Transport::Plain(s) => s.read(buf),
            Transport::Tls(s) => s.read(buf),
        }
    }
}

impl Write for Transport {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        match self {
            Transport::Plain(s) => s.write(buf),
            Transport::Tls(s) => s.write(buf),
        }
    }

    fn flush(&mut self) -> std::io::Result<()> {
        match self {
            Transport::Plain(s) => s.flush(),
            Transport::Tls(s) => s.flush(),
        }
    }
}

/// A live connection to the relay.
struct Session {
    transport: Transport,
    /// Bytes read but not yet consumed as reply lines.
    buf: Vec<u8>,
}

impl Session {
    fn connect(host: &str, port: u16, timeout: Duration) -> Result<Self, NotifyError> {
        let address = format!("{host}:{port}");
        let connect_err = |reason: String| NotifyError::Connect {
            address: address.clone(),
            reason,
        };

        let addrs = address
            .to_socket_addrs()
            .map_err(|e| connect_err(format!("dns resolution failed: {e}")))?;

        let mut last_err = "no address found".to_string();
        for addr in addrs {
            match TcpStream::connect_timeout(&addr, timeout) {
                Ok(stream) => {
                    stream.set_read_timeout(Some(timeout))?;
                    stream.set_write_timeout(Some(timeout))?;
                    let _ = stream.set_nodelay(true);
                    debug!(%address, "connected to smtp relay");
                    return Ok(Self {
                        transport: Transport::Plain(stream),
                        buf: Vec::new(),
                    });
                }
                Err(e) => last_err = e.to_string(),
            }
        }
        Err(connect_err(last_err))
    }

    /// Switch the connection to TLS after a successful `STARTTLS`.
    fn upgrade(self, tls: &Arc<rustls::ClientConfig>, host: &str) -> Result<Self, NotifyError> {
        // Anything buffered now was sent in the clear after STARTTLS.
        if !self.buf.is_empty() {
            return Err(NotifyError::Tls(
                "relay sent data before the tls handshake".to_string(),
            ));
        }
        let stream = match self.transport {
            Transport::Plain(stream) => stream,
            Transport::Tls(_) => return Err(NotifyError::Tls("already encrypted".to_string())),
        };

        let server_name = rustls::pki_types::ServerName::try_from(host)
            .map_err(|e| NotifyError::Tls(format!("invalid tls server name '{host}': {e}")))?
            .to_owned();
        let conn = rustls::ClientConnection::new(Arc::clone(tls), server_name)
            .map_err(|e| NotifyError::Tls(format!("tls session creation: {e}")))?;

        let mut tls_stream = rustls::StreamOwned::new(conn, stream);
        while tls_stream.conn.is_handshaking() {
            tls_stream
                .conn
                .complete_io(&mut tls_stream.sock)
                .map_err(|e| NotifyError::Tls(format!("handshake: {e}")))?;
        }
        debug!(%host, "smtp connection upgraded to tls");

        Ok(Self {
            transport: Transport::Tls(Box::new(tls_stream)),
            buf: Vec::new(),
        })
    }

    fn read_line(&mut self) -> Result<String, NotifyError> {
        loop {
            if let Some(pos) = self.buf.windows(2).position(|w| w == b"\r\n") {
                let line: Vec<u8> = self.buf.drain(..pos + 2).collect();
                return Ok(String::from_utf8_lossy(&line[..pos]).into_owned());
            }
            if self.buf.len() > MAX_LINE {
                return Err(NotifyError::Malformed("reply line too long".to_string()));
            }
            let mut chunk = [0u8; 512];
            let n = self.transport.read(&mut chunk)?;
            if n == 0 {
                return Err(NotifyError::Io(std::io::Error::new(
                    std::io::ErrorKind::UnexpectedEof,
                    "relay closed the connection",
                )));
            }
            self.buf.extend_from_slice(&chunk[..n]);
        }
    }

    fn read_reply(&mut self) -> Result<Reply, NotifyError> {
        let mut lines = Vec::new();
        loop {
            let line = self.read_line()?;
            let (code, more, text) = parse_reply_line(&line)?;
            trace!(code, %text, "smtp <");
            lines.push(text.to_string());
            if !more {
                return Ok(Reply { code, lines });
            }
        }
    }

    fn write_line(&mut self, line: &str) -> Result<(), NotifyError> {
        self.transport.write_all(line.as_bytes())?;
        self.transport.write_all(b"\r\n")?;
        self.transport.flush()?;
        Ok(())
    }

    fn expect(reply: Reply, command: &'static str, accepted: &[u16]) -> Result<Reply, NotifyError> {
        if accepted.contains(&reply.code) {
            Ok(reply)
        } else {
            Err(NotifyError::Reply {
                command,
                code: reply.code,
                message: reply.message(),
            })
        }
    }

    fn command(
        &mut self,
        line: &str,
        command: &'static str,
        accepted: &[u16],
    ) -> Result<Reply, NotifyError> {
        trace!(%command, "smtp >");
        self.write_line(line)?;
        let reply = self.read_reply()?;
        Self::expect(reply, command, accepted)
    }

    fn authenticate(
        &mut self,
        mechanism: AuthMechanism,
        username: &str,
        password: &str,
    ) -> Result<(), NotifyError> {
        let reply = match mechanism {
            AuthMechanism::Plain => {
                let token = BASE64.encode(format!("\0{username}\0{password}"));
                trace!("smtp > AUTH PLAIN <credentials>");
                self.write_line(&format!("AUTH PLAIN {token}"))?;
                self.read_reply()?
            }
            AuthMechanism::Login => {
                trace!("smtp > AUTH LOGIN");
                self.write_line("AUTH LOGIN")?;
                let challenge = self.read_reply()?;
                if challenge.code != 334 {
                    return Err(auth_error(challenge));
                }
                self.write_line(&BASE64.encode(username))?;
                let challenge = self.read_reply()?;
                if challenge.code != 334 {
                    return Err(auth_error(challenge));
                }
                trace!("smtp > <password>");
                self.write_line(&BASE64.encode(password))?;
                self.read_reply()?
            }
        };
        if reply.code == 235 {
            Ok(())
        } else {
            Err(auth_error(reply))
        }
    }

    fn data(&mut self, message: &str) -> Result<(), NotifyError> {
        self.command("DATA", "DATA", &[354])?;
        self.transport.write_all(message.as_bytes())?;
        self.transport.write_all(b".\r\n")?;
        self.transport.flush()?;
        let reply = self.read_reply()?;
        Self::expect(reply, "end of data", &[250])?;
        Ok(())
    }
}

fn auth_error(reply: Reply) -> NotifyError {
    NotifyError::Auth {
        code: reply.code,
        message: reply.message(),
    }
}

/// Submit `envelope` through the relay described by `creds`.
pub fn deliver(
    creds: &SmtpCredentials,
    helo_name: &str,
    tls: &Arc<rustls::ClientConfig>,
    envelope: &Envelope,
) -> Result<(), NotifyError> {
    let mut session = Session::connect(&creds.host, creds.port, creds.timeout)?;
    let greeting = session.read_reply()?;
    Session::expect(greeting, "greeting", &[220])?;

    session.command(&format!("EHLO {helo_name}"), "EHLO", &[250])?;
    session.command("STARTTLS", "STARTTLS", &[220])?;
    let mut session = session.upgrade(tls, &creds.host)?;
    let ehlo = session.command(&format!("EHLO {helo_name}"), "EHLO", &[250])?;

    let offered = auth_mechanisms(&ehlo);
    let mechanism = AuthMechanism::negotiate(&offered)?;
    debug!(?mechanism, ?offered, "authenticating with smtp relay");
    session.authenticate(mechanism, &creds.username, &creds.password)?;

    session.command(
        &format!("MAIL FROM:<{}>", bare_address(&envelope.from)),
        "MAIL FROM",
        &[250],
    )?;
    for rcpt in &envelope.to {
        session.command(
            &format!("RCPT TO:<{}>", bare_address(rcpt)),
            "RCPT TO",
            &[250, 251],
        )?;
    }
    session.data(&format_message(envelope))?;

    // The message is accepted at this point; a failed QUIT changes nothing.
    let _ = session.command("QUIT", "QUIT", &[221]);
    Ok(())
}

/// Split a reply line into (code, continuation, text).
fn parse_reply_line(line: &str) -> Result<(u16, bool, &str), NotifyError> {
    let bytes = line.as_bytes();
    if bytes.len() < 3 || !bytes[..3].iter().all(u8::is_ascii_digit) {
        return Err(NotifyError::Malformed(line.to_string()));
    }
    let code: u16 = line[..3]
        .parse()
        .map_err(|_| NotifyError::Malformed(line.to_string()))?;
    match bytes.get(3) {
        None => Ok((code, false, "")),
        Some(b' ') => Ok((code, false, &line[4..])),
        Some(b'-') => Ok((code, true, &line[4..])),
        Some(_) => Err(NotifyError::Malformed(line.to_string())),
    }
}

/// Render headers and body with CRLF line endings and dot-stuffing.
pub fn format_message(envelope: &Envelope) -> String {
    let mut out = String::new();
    out.push_str(&format!("From: {}\r\n", header_value(&envelope.from)));
    out.push_str(&format!("To: {}\r\n", header_value(&envelope.to.join(", "))));
    out.push_str(&format!("Subject: {}\r\n", header_value(&envelope.subject)));
    out.push_str("MIME-Version: 1.0\r\n");
    out.push_str("Content-Type: text/plain; charset=utf-8\r\n");
    out.push_str("Content-Transfer-Encoding: 8bit\r\n");
    out.push_str("\r\n");

    for line in envelope.body.lines() {
        if line.starts_with('.') {
            out.push('.');
        }
        out.push_str(line);
        out.push_str("\r\n");
    }
    out
}

/// Strip line breaks so a value cannot inject extra headers.
fn header_value(value: &str) -> String {
    value.replace(['\r', '\n'], " ")
}

/// `"Name <a@b>"` → `"a@b"`; bare addresses pass through.
fn bare_address(addr: &str) -> &str {
    let addr = addr.trim();
    match (addr.find('<'), addr.rfind('>')) {
        (Some(start), Some(end)) if start < end => &addr[start + 1..end],
        _ => addr,
    }
}

fn parse_recipients(to: &str) -> Vec<String> {
    to.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}
