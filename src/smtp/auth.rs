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

use std::{borrow::Cow, fmt::Display};

use base64::{engine::general_purpose::STANDARD, Engine};
use smtp_proto::{AUTH_LOGIN, AUTH_PLAIN};
use tokio::io::{AsyncRead, AsyncWrite};

use crate::SmtpClient;

#[derive(Clone, PartialEq, Eq)]
pub struct Credentials<'x> {
    username: Cow<'x, str>,
    secret: Cow<'x, str>,
}

impl std::fmt::Debug for Credentials<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .finish_non_exhaustive()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Error {
    InvalidChallenge,
}

impl Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Error::InvalidChallenge => write!(f, "Invalid challenge received"),
        }
    }
}

/// Authentication mechanism, ordered from most to least preferred.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Mechanism {
    /// Challenge-Response Authentication Mechanism (CRAM)
    #[cfg(feature = "cram-md5")]
    CramMD5,

    /// Plain
    Plain,

    /// Login
    Login,
}

impl Mechanism {
    pub const PREFERENCE: &'static [Mechanism] = &[
        #[cfg(feature = "cram-md5")]
        Mechanism::CramMD5,
        Mechanism::Plain,
        Mechanism::Login,
    ];

    /// Bit used by `smtp-proto` to flag support for this mechanism.
    pub fn flag(&self) -> u64 {
        match self {
            #[cfg(feature = "cram-md5")]
            Mechanism::CramMD5 => smtp_proto::AUTH_CRAM_MD5,
            Mechanism::Plain => AUTH_PLAIN,
            Mechanism::Login => AUTH_LOGIN,
        }
    }
}

impl Display for Mechanism {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            #[cfg(feature = "cram-md5")]
            Mechanism::CramMD5 => write!(f, "CRAM-MD5"),
            Mechanism::Plain => write!(f, "PLAIN"),
            Mechanism::Login => write!(f, "LOGIN"),
        }
    }
}

impl<T: AsyncRead + AsyncWrite + Unpin> SmtpClient<T> {
    /// Authenticates with the first mechanism, in order of preference, that
    /// both sides support. When every attempt is rejected the last rejection
    /// is returned as [`crate::Error::AuthenticationFailed`].
    pub async fn authenticate(
        &mut self,
        credentials: &Credentials<'_>,
    ) -> crate::Result<&mut Self> {
        let supported = self.capabilities.auth_mechanisms;
        let mut rejected = None;

        for mechanism in Mechanism::PREFERENCE
            .iter()
            .filter(|mechanism| supported & mechanism.flag() != 0)
        {
            log::debug!("AUTH {mechanism} as {}", credentials.username);
            match self.auth(*mechanism, credentials).await {
                Ok(()) => return Ok(self),
                Err(crate::Error::UnexpectedReply(reply)) => {
                    log::debug!("AUTH {mechanism} rejected: {} {}", reply.code, reply.message);
                    rejected = Some(reply);
                }
                Err(err) => return Err(err),
            }
        }

        Err(match rejected {
            Some(reply) => crate::Error::AuthenticationFailed(reply),
            None => crate::Error::UnsupportedAuthMechanism,
        })
    }

    pub(crate) async fn auth(
        &mut self,
        mechanism: Mechanism,
        credentials: &Credentials<'_>,
    ) -> crate::Result<()> {
        // PLAIN carries its initial response on the AUTH line.
        let mut reply = if mechanism == Mechanism::Plain {
            self.cmd(format!("AUTH PLAIN {}\r\n", credentials.encode(mechanism, "")?))
                .await?
        } else {
            self.cmd(format!("AUTH {mechanism}\r\n")).await?
        };

        for _ in 0..3 {
            match reply.code {
                334 => {
                    reply = self
                        .cmd(format!(
                            "{}\r\n",
                            credentials.encode(mechanism, reply.message.as_str())?
                        ))
                        .await?;
                }
                235 => {
                    return Ok(());
                }
                _ => {
                    return Err(crate::Error::UnexpectedReply(reply));
                }
            }
        }

        Err(crate::Error::UnexpectedReply(reply))
    }
}

impl<'x> Credentials<'x> {
    /// Creates a new `Credentials` instance.
    pub fn new(
        username: impl Into<Cow<'x, str>>,
        secret: impl Into<Cow<'x, str>>,
    ) -> Credentials<'x> {
        Credentials {
            username: username.into(),
            secret: secret.into(),
        }
    }

    pub fn username(&self) -> &str {
        &self.username
    }

    pub(crate) fn encode(&self, mechanism: Mechanism, challenge: &str) -> crate::Result<String> {
        Ok(STANDARD.encode(
            match mechanism {
                Mechanism::Plain => {
                    format!("\u{0}{}\u{0}{}", self.username, self.secret)
                }

                Mechanism::Login => {
                    let challenge = STANDARD.decode(challenge)?;

                    if b"user name"
                        .eq_ignore_ascii_case(challenge.get(0..9).ok_or(Error::InvalidChallenge)?)
                        || b"username".eq_ignore_ascii_case(
                            // Some servers send "Username:"
                            challenge.get(0..8).ok_or(Error::InvalidChallenge)?,
                        )
                    {
                        &self.username
                    } else if b"password"
                        .eq_ignore_ascii_case(challenge.get(0..8).ok_or(Error::InvalidChallenge)?)
                    {
                        &self.secret
                    } else {
                        return Err(Error::InvalidChallenge.into());
                    }
                    .to_string()
                }

                #[cfg(feature = "cram-md5")]
                Mechanism::CramMD5 => {
                    let mut secret_opad: Vec<u8> = vec![0x5c; 64];
                    let mut secret_ipad: Vec<u8> = vec![0x36; 64];

                    let key = if self.secret.len() <= 64 {
                        self.secret.as_bytes().to_vec()
                    } else {
                        md5::compute(self.secret.as_bytes()).to_vec()
                    };
                    for (pos, byte) in key.iter().enumerate() {
                        secret_opad[pos] = *byte ^ 0x5c;
                        secret_ipad[pos] = *byte ^ 0x36;
                    }

                    secret_ipad.extend_from_slice(&STANDARD.decode(challenge)?);
                    secret_opad.extend_from_slice(&md5::compute(&secret_ipad).0);

                    format!("{} {:x}", self.username, md5::compute(&secret_opad))
                }
            }
            .as_bytes(),
        ))
    }
}

#[cfg(test)]
mod test {
    use crate::smtp::auth::{Credentials, Mechanism};

    #[test]
    fn auth_encode() {
        // Challenge-Response Authentication Mechanism (CRAM)
        #[cfg(feature = "cram-md5")]
        assert_eq!(
            Credentials::new("tim", "tanstaaftanstaaf")
                .encode(
                    Mechanism::CramMD5,
                    "PDE4OTYuNjk3MTcwOTUyQHBvc3RvZmZpY2UucmVzdG9uLm1jaS5uZXQ+",
                )
                .unwrap(),
            "dGltIGI5MTNhNjAyYzdlZGE3YTQ5NWI0ZTZlNzMzNGQzODkw"
        );

        // Login
        assert_eq!(
            Credentials::new("tim", "tanstaaftanstaaf")
                .encode(Mechanism::Login, "VXNlciBOYW1lAA==",)
                .unwrap(),
            "dGlt"
        );
        assert_eq!(
            Credentials::new("tim", "tanstaaftanstaaf")
                .encode(Mechanism::Login, "UGFzc3dvcmQA",)
                .unwrap(),
            "dGFuc3RhYWZ0YW5zdGFhZg=="
        );
        assert!(Credentials::new("tim", "tanstaaftanstaaf")
            .encode(Mechanism::Login, "SGVsbG8gdGhlcmU=")
            .is_err());

        // Plain
        assert_eq!(
            Credentials::new("tim", "tanstaaftanstaaf")
                .encode(Mechanism::Plain, "",)
                .unwrap(),
            "AHRpbQB0YW5zdGFhZnRhbnN0YWFm"
        );
    }

    #[test]
    fn mechanism_preference() {
        let mut mechs = vec![Mechanism::Login, Mechanism::Plain];
        #[cfg(feature = "cram-md5")]
        mechs.push(Mechanism::CramMD5);
        mechs.sort_unstable();
        assert_eq!(mechs, Mechanism::PREFERENCE);
        assert_eq!(Mechanism::PREFERENCE.last(), Some(&Mechanism::Login));
    }

    #[test]
    fn secret_not_in_debug() {
        let debug = format!("{:?}", Credentials::new("tim", "tanstaaftanstaaf"));
        assert!(debug.contains("tim"));
        assert!(!debug.contains("tanstaaf"));
    }
}
