//! SMTP/IMAP mail service — async lettre sending + async-imap mailbox reads.
//!
//! Sending renders one message per recipient upstream; this adapter handles
//! transport concerns only: From/Bcc headers, the configured signature,
//! attachments, TLS. Mailbox reads prefilter server-side with `SINCE` and
//! apply the full response filter client-side on parsed messages.

use std::path::PathBuf;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use mailflow_core::config::MailConfig;
use mailflow_core::error::{MailflowError, Result};
use mailflow_core::traits::MailService;
use mailflow_core::types::{EmailMessage, ResponseFilter};

/// Type alias for the TLS IMAP client used throughout this module.
type ImapTlsClient = async_imap::Client<tokio_native_tls::TlsStream<tokio::net::TcpStream>>;

/// Create a TLS-wrapped IMAP connection (async, tokio-native).
async fn connect_imap_tls(host: &str, port: u16) -> Result<ImapTlsClient> {
    let tcp = tokio::net::TcpStream::connect((host, port))
        .await
        .map_err(|e| MailflowError::Service(format!("TCP connect: {e}")))?;

    let connector = native_tls::TlsConnector::new()
        .map_err(|e| MailflowError::Service(format!("TLS connector: {e}")))?;
    let connector = tokio_native_tls::TlsConnector::from(connector);

    let tls_stream = connector
        .connect(host, tcp)
        .await
        .map_err(|e| MailflowError::Service(format!("TLS handshake: {e}")))?;

    Ok(async_imap::Client::new(tls_stream))
}

/// The SMTP/IMAP implementation of `MailService`.
pub struct SmtpImapMailer {
    config: MailConfig,
}

impl SmtpImapMailer {
    pub fn new(config: MailConfig) -> Self {
        Self { config }
    }

    /// Build the outgoing message: From (with optional display name), To,
    /// the configured auto-BCC, signature-appended body, and attachments.
    fn compose(
        &self,
        to: &str,
        subject: &str,
        body: &str,
        attachments: &[PathBuf],
    ) -> Result<lettre::Message> {
        use lettre::Message;
        use lettre::message::header::ContentType;
        use lettre::message::{Attachment, Mailbox, MultiPart, SinglePart};

        let from_mailbox: Mailbox = match self.config.display_name.as_deref() {
            Some(name) => format!("{name} <{}>", self.config.address),
            None => self.config.address.clone(),
        }
        .parse()
        .map_err(|e| MailflowError::Service(format!("Invalid from address: {e}")))?;

        let to_mailbox: Mailbox = to
            .parse()
            .map_err(|e| MailflowError::Service(format!("Invalid recipient '{to}': {e}")))?;

        let mut builder = Message::builder()
            .from(from_mailbox)
            .to(to_mailbox)
            .subject(subject);

        if !self.config.auto_bcc.is_empty() {
            let bcc: Mailbox = self
                .config
                .auto_bcc
                .parse()
                .map_err(|e| MailflowError::Service(format!("Invalid auto_bcc: {e}")))?;
            builder = builder.bcc(bcc);
        }

        let body = if self.config.signature.is_empty() {
            body.to_string()
        } else {
            format!("{body}\n\n{}", self.config.signature)
        };

        if attachments.is_empty() {
            return builder
                .header(ContentType::TEXT_PLAIN)
                .body(body)
                .map_err(|e| MailflowError::Service(format!("Build email: {e}")));
        }

        let mut multipart = MultiPart::mixed().singlepart(
            SinglePart::builder()
                .header(ContentType::TEXT_PLAIN)
                .body(body),
        );
        for path in attachments {
            let content = std::fs::read(path)?;
            let filename = path
                .file_name()
                .and_then(|n| n.to_str())
                .unwrap_or("attachment")
                .to_string();
            let content_type = ContentType::parse("application/octet-stream")
                .map_err(|e| MailflowError::Service(format!("Attachment content type: {e}")))?;
            multipart = multipart.singlepart(Attachment::new(filename).body(content, content_type));
        }

        builder
            .multipart(multipart)
            .map_err(|e| MailflowError::Service(format!("Build email: {e}")))
    }
}

#[async_trait]
impl MailService for SmtpImapMailer {
    async fn send(
        &self,
        to: &str,
        subject: &str,
        body: &str,
        attachments: &[PathBuf],
    ) -> Result<()> {
        use lettre::transport::smtp::authentication::Credentials;
        use lettre::{AsyncSmtpTransport, AsyncTransport};

        let email = self.compose(to, subject, body, attachments)?;

        let creds = Credentials::new(self.config.address.clone(), self.config.password.clone());
        let mailer =
            AsyncSmtpTransport::<lettre::Tokio1Executor>::starttls_relay(&self.config.smtp_host)
                .map_err(|e| MailflowError::Service(format!("SMTP relay: {e}")))?
                .port(self.config.smtp_port)
                .credentials(creds)
                .build();

        mailer
            .send(email)
            .await
            .map_err(|e| MailflowError::Service(format!("SMTP send: {e}")))?;

        tracing::info!("📤 Email sent to: {to}");
        Ok(())
    }

    async fn list_matching(&self, filter: &ResponseFilter) -> Result<Vec<EmailMessage>> {
        use futures::StreamExt;

        let client = connect_imap_tls(&self.config.imap_host, self.config.imap_port).await?;
        let mut session = client
            .login(&self.config.address, &self.config.password)
            .await
            .map_err(|e| MailflowError::Service(format!("IMAP login: {}", e.0)))?;

        session
            .select(&self.config.mailbox)
            .await
            .map_err(|e| MailflowError::Service(format!("Select {}: {e}", self.config.mailbox)))?;

        // Server-side prefilter on the window's lower bound; the full filter
        // runs client-side where substring semantics are under our control.
        let query = format!("SINCE {}", imap_since_date(filter.since));
        let uids = session
            .uid_search(&query)
            .await
            .map_err(|e| MailflowError::Service(format!("Search: {e}")))?;

        if uids.is_empty() {
            session.logout().await.ok();
            return Ok(Vec::new());
        }

        let uid_set = uids
            .iter()
            .map(|u| u.to_string())
            .collect::<Vec<_>>()
            .join(",");
        let mut fetches = session
            .uid_fetch(&uid_set, "(UID INTERNALDATE RFC822)")
            .await
            .map_err(|e| MailflowError::Service(format!("Fetch: {e}")))?;

        let mut messages = Vec::new();
        while let Some(fetch_result) = fetches.next().await {
            let fetch =
                fetch_result.map_err(|e| MailflowError::Service(format!("Fetch msg: {e}")))?;
            let uid = fetch.uid.unwrap_or(0);
            let internal_date = fetch.internal_date().map(|d| d.with_timezone(&Utc));
            if let Some(raw) = fetch.body()
                && let Some(message) = parse_email_bytes(raw, uid, internal_date)
                && filter.matches(&message)
            {
                messages.push(message);
            }
        }
        drop(fetches);

        session.logout().await.ok();

        messages.sort_by(|a, b| b.received_time.cmp(&a.received_time));
        tracing::info!("📧 {} matching response(s) in mailbox", messages.len());
        Ok(messages)
    }
}

/// Format the lower window bound as an IMAP `SINCE` date (e.g. `15-Mar-2026`).
fn imap_since_date(since: DateTime<Utc>) -> String {
    since.format("%d-%b-%Y").to_string()
}

/// Parse raw message bytes into the shared mail record. The IMAP internal
/// date wins over the Date header when both are present.
fn parse_email_bytes(
    raw: &[u8],
    uid: u32,
    internal_date: Option<DateTime<Utc>>,
) -> Option<EmailMessage> {
    use mail_parser::MessageParser;
    let parsed = MessageParser::default().parse(raw)?;

    let sender_email = parsed
        .from()
        .and_then(|a| a.first())
        .map(|a| a.address().unwrap_or_default().to_string())
        .unwrap_or_default();

    let sender_name = parsed
        .from()
        .and_then(|a| a.first())
        .and_then(|a| a.name())
        .map(String::from)
        .unwrap_or_else(|| sender_email.clone());

    let subject = parsed.subject().unwrap_or("(no subject)").to_string();

    let html_body = parsed.body_html(0).map(|h| h.to_string());
    let body = parsed
        .body_text(0)
        .map(|s| s.to_string())
        .unwrap_or_else(|| html_body.as_deref().map(strip_html).unwrap_or_default());

    let received_time = internal_date
        .or_else(|| {
            parsed
                .date()
                .and_then(|d| DateTime::from_timestamp(d.to_timestamp(), 0))
        })
        .unwrap_or_else(Utc::now);

    Some(EmailMessage {
        id: uid.to_string(),
        subject,
        sender_name,
        sender_email,
        received_time,
        body,
        html_body,
    })
}

fn strip_html(html: &str) -> String {
    let mut out = String::new();
    let mut in_tag = false;
    for ch in html.chars() {
        match ch {
            '<' => in_tag = true,
            '>' => in_tag = false,
            _ if !in_tag => out.push(ch),
            _ => {}
        }
    }
    out.trim().to_string()
}
