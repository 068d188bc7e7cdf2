//! # Mailflow Channels
//!
//! The SMTP/IMAP implementation of the `MailService` capability: async
//! lettre for sending, async-imap over native TLS for mailbox reads.

pub mod email;

pub use email::SmtpImapMailer;
