/*
 * Copyright Stalwart Labs Ltd. See the COPYING
 * file at the top-level directory of this distribution.
 *
 * Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
 * https://www.apache.org/licenses/LICENSE-2.0> or the MIT license
 * <LICENSE-MIT or https://opensource.org/licenses/MIT>, at your
 * option. This file may not be copied, modified, or distributed
 * except according to those terms.
 */

//! # mail-dispatch
//!
//! _mail-dispatch_ sends HTML e-mail messages to a list of recipients over a single
//! authenticated SMTP submission session. It includes the following features:
//!
//! - One message per recipient, built with [`mail-builder`](https://crates.io/crates/mail-builder)
//!   (_RFC 5322_, MIME _RFC 2045 - 2049_), with an optional binary attachment.
//! - SMTP Service Extension for Secure SMTP over **TLS** (_RFC 3207_).
//! - SMTP Service Extension for Authentication (_RFC 4954_) with automatic mechanism negotiation:
//!   - CRAM-MD5 (_RFC 2195_)
//!   - PLAIN
//!   - LOGIN
//! - Bounded retry of messages rejected with a transient authentication failure (`454`).
//! - Amazon SES configuration-set header injection.
//! - Full async (requires Tokio).
//!
//! ## Usage Example
//!
//! ```rust
//!     let settings = HashMap::from([
//!         ("host".to_string(), "email-smtp.eu-west-1.amazonaws.com".to_string()),
//!         ("port".to_string(), "587".to_string()),
//!         ("username".to_string(), "AKIA...".to_string()),
//!         ("password".to_string(), "p4ssw0rd".to_string()),
//!         ("provider".to_string(), "AWS".to_string()),
//!         ("tls".to_string(), "true".to_string()),
//!     ]);
//!
//!     // Connect, upgrade to TLS and authenticate.
//!     let mut dispatcher = MailDispatcher::connect(
//!         MailConfig::from_settings("reports@example.com", &settings)
//!             .unwrap()
//!             .configuration_set("reports"),
//!     )
//!     .await
//!     .unwrap();
//!
//!     // Send the same report to two recipients, closing the session once done.
//!     dispatcher
//!         .send_mail(
//!             &Mail::new("Weekly report", "<h1>Report attached</h1>")
//!                 .to("jane@example.com")
//!                 .to("james@example.com")
//!                 .attachment("/tmp/report.csv", Some("report.csv"))
//!                 .close_session(SessionClose::AfterBatch),
//!         )
//!         .await
//!         .unwrap();
//! ```
//!
//! ## Testing
//!
//! To run the testsuite:
//!
//! ```bash
//!  $ cargo test
//! ```
//!
//! ## License
//!
//! Licensed under either of
//!
//!  * Apache License, Version 2.0 ([LICENSE-APACHE](LICENSE-APACHE) or <http://www.apache.org/licenses/LICENSE-2.0>)
//!  * MIT license ([LICENSE-MIT](LICENSE-MIT) or <http://opensource.org/licenses/MIT>)
//!
//! at your option.
//!

pub mod dispatch;
pub mod smtp;

use std::{fmt::Display, path::PathBuf, time::Duration};

use smtp_proto::{EhloResponse, Response};
use tokio_rustls::TlsConnector;

pub use dispatch::{
    config::{MailConfig, Provider},
    outbound::{Attachment, Mail, OutboundMessage},
    retry::RetryPolicy,
    MailDispatcher, SessionClose,
};
pub use mail_builder;
pub use smtp_proto;

#[derive(Debug)]
pub enum Error {
    /// I/O error
    Io(std::io::Error),

    /// TLS error
    Tls(Box<rustls::Error>),

    /// Base64 decode error
    Base64(base64::DecodeError),

    /// SMTP authentication error.
    Auth(smtp::auth::Error),

    /// Failure parsing SMTP reply
    UnparseableReply,

    /// Unexpected SMTP reply.
    UnexpectedReply(Response<String>),

    /// SMTP authentication failure.
    AuthenticationFailed(Response<String>),

    /// Invalid TLS name provided.
    InvalidTLSName,

    /// Missing message sender.
    MissingMailFrom,

    /// Missing message recipients.
    MissingRcptTo,

    /// Missing message subject.
    MissingSubject,

    /// The server does no support any of the available authentication methods.
    UnsupportedAuthMechanism,

    /// STARTTLS was requested but the server does not advertise it.
    MissingStartTls,

    /// Connection timeout.
    Timeout,

    /// A required configuration setting is absent.
    MissingConfig(&'static str),

    /// A configuration setting could not be parsed.
    InvalidConfig { key: &'static str, value: String },

    /// The attachment file could not be read.
    Attachment {
        path: PathBuf,
        error: std::io::Error,
    },

    /// The SMTP session was closed by an earlier QUIT.
    SessionClosed,
}

pub type Result<T> = std::result::Result<T, Error>;

/// SMTP client.
pub struct SmtpClient<T> {
    pub stream: T,
    pub timeout: Duration,
    pub capabilities: EhloResponse<String>,
}

/// Builds and connects an [`SmtpClient`].
#[derive(Clone)]
pub struct SmtpClientBuilder<T: AsRef<str>> {
    pub timeout: Duration,
    pub tls_connector: TlsConnector,
    pub tls_hostname: T,
    pub starttls: bool,
    pub addr: String,
    pub local_host: String,
}

impl Error {
    /// Returns the SMTP reply code carried by this error, if any.
    pub fn reply_code(&self) -> Option<u16> {
        match self {
            Error::UnexpectedReply(reply) | Error::AuthenticationFailed(reply) => Some(reply.code),
            _ => None,
        }
    }

    /// Returns `true` if the connection can no longer carry commands.
    pub fn is_connection_failure(&self) -> bool {
        matches!(self, Error::Io(_) | Error::Timeout | Error::UnparseableReply)
    }

    /// Returns `true` if the server rejected a send with `454` (authentication failed).
    pub fn is_transient_auth_failure(&self) -> bool {
        matches!(self, Error::UnexpectedReply(reply)
            if reply.code == dispatch::retry::AUTHENTICATION_FAILED_CODE)
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::Io(err) => Some(err),
            Error::Tls(err) => Some(err.as_ref()),
            Error::Base64(err) => Some(err),
            Error::Attachment { error, .. } => Some(error),
            _ => None,
        }
    }
}

impl Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Error::Io(e) => write!(f, "I/O error: {e}"),
            Error::Tls(e) => write!(f, "TLS error: {e}"),
            Error::Base64(e) => write!(f, "Base64 decode error: {e}"),
            Error::Auth(e) => write!(f, "SMTP authentication error: {e}"),
            Error::UnparseableReply => write!(f, "Unparseable SMTP reply"),
            Error::UnexpectedReply(e) => {
                write!(f, "Unexpected reply: {} {}", e.code, e.message)
            }
            Error::AuthenticationFailed(e) => {
                write!(f, "Authentication failed: {} {}", e.code, e.message)
            }
            Error::InvalidTLSName => write!(f, "Invalid TLS name provided"),
            Error::MissingMailFrom => write!(f, "Missing message sender"),
            Error::MissingRcptTo => write!(f, "Missing message recipients"),
            Error::MissingSubject => write!(f, "Missing message subject"),
            Error::UnsupportedAuthMechanism => write!(
                f,
                "The server does no support any of the available authentication methods"
            ),
            Error::MissingStartTls => write!(f, "STARTTLS extension unavailable"),
            Error::Timeout => write!(f, "Connection timeout"),
            Error::MissingConfig(key) => write!(f, "Missing required setting {key:?}"),
            Error::InvalidConfig { key, value } => {
                write!(f, "Invalid value {value:?} for setting {key:?}")
            }
            Error::Attachment { path, error } => {
                write!(f, "Failed to read attachment {}: {error}", path.display())
            }
            Error::SessionClosed => write!(f, "SMTP session already closed"),
        }
    }
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Error::Io(err)
    }
}

impl From<base64::DecodeError> for Error {
    fn from(err: base64::DecodeError) -> Self {
        Error::Base64(err)
    }
}

impl From<smtp::auth::Error> for Error {
    fn from(err: smtp::auth::Error) -> Self {
        Error::Auth(err)
    }
}
