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

use std::{borrow::Cow, collections::BTreeMap, fmt::Display};

use smtp_proto::EXT_SIZE;
use tokio::io::{AsyncRead, AsyncWrite};

use crate::SmtpClient;

/// An SMTP envelope together with the RFC 5322 message it carries.
#[derive(Debug, Default, Clone)]
pub struct Message<'x> {
    pub mail_from: Address<'x>,
    pub rcpt_to: Vec<Address<'x>>,
    pub body: Cow<'x, [u8]>,
}

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct Address<'x> {
    pub email: Cow<'x, str>,
    pub parameters: Parameters<'x>,
}

/// ESMTP parameters appended to MAIL FROM and RCPT TO.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct Parameters<'x> {
    params: BTreeMap<Cow<'x, str>, Cow<'x, str>>,
}

impl<'x> Message<'x> {
    /// Create a new message
    pub fn new<T, U, V>(from: T, to: U, body: V) -> Self
    where
        T: Into<Address<'x>>,
        U: IntoIterator<Item = T>,
        V: Into<Cow<'x, [u8]>>,
    {
        Message {
            mail_from: from.into(),
            rcpt_to: to.into_iter().map(Into::into).collect(),
            body: body.into(),
        }
    }
}

impl<'x> From<&'x str> for Address<'x> {
    fn from(email: &'x str) -> Self {
        Address {
            email: email.into(),
            parameters: Parameters::default(),
        }
    }
}

impl From<String> for Address<'_> {
    fn from(email: String) -> Self {
        Address {
            email: email.into(),
            parameters: Parameters::default(),
        }
    }
}

impl<'x> Parameters<'x> {
    pub fn param(&mut self, key: impl Into<Cow<'x, str>>, value: impl Into<Cow<'x, str>>) {
        self.params.insert(key.into(), value.into());
    }

    pub fn contains(&self, key: &str) -> bool {
        self.params.keys().any(|k| k.eq_ignore_ascii_case(key))
    }
}

impl Display for Parameters<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        for (key, value) in &self.params {
            write!(f, " {key}={value}")?;
        }
        Ok(())
    }
}

pub trait IntoMessage<'x> {
    fn into_message(self) -> crate::Result<Message<'x>>;
}

impl<T: AsyncRead + AsyncWrite + Unpin> SmtpClient<T> {
    /// Sends a message to the server: MAIL FROM, one RCPT TO per recipient
    /// and DATA. The message is borrowed so that it can be sent again.
    pub async fn send(&mut self, message: &Message<'_>) -> crate::Result<()> {
        if message.mail_from.email.is_empty() {
            return Err(crate::Error::MissingMailFrom);
        }
        if message.rcpt_to.is_empty() {
            return Err(crate::Error::MissingRcptTo);
        }

        // Declare the message size when the server supports it (RFC 1870)
        let mut params = message.mail_from.parameters.clone();
        if self.capabilities.has_capability(EXT_SIZE) && !params.contains("SIZE") {
            params.param("SIZE", message.body.len().to_string());
        }

        // Send mail-from
        self.mail_from(message.mail_from.email.as_ref(), &params)
            .await?;

        // Send rcpt-to
        for rcpt in &message.rcpt_to {
            self.rcpt_to(rcpt.email.as_ref(), &rcpt.parameters).await?;
        }

        // Send message
        self.data(message.body.as_ref()).await
    }
}
