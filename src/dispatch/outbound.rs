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

use std::{
    borrow::Cow,
    path::{Path, PathBuf},
    sync::Arc,
};

use mail_builder::{headers::raw::Raw, MessageBuilder};

use crate::smtp::message::{IntoMessage, Message};

use super::{config::MailConfig, SessionClose};

/// Content type used for every attachment.
pub const ATTACHMENT_CONTENT_TYPE: &str = "application/octet-stream";

/// A message to be delivered to a list of recipients, one copy each.
#[derive(Debug, Clone)]
pub struct Mail<'x> {
    pub subject: Cow<'x, str>,
    pub recipients: Vec<Cow<'x, str>>,
    pub html_body: Cow<'x, str>,
    pub attachment: Option<(PathBuf, Option<Cow<'x, str>>)>,
    pub close: SessionClose,
}

impl<'x> Mail<'x> {
    /// Creates a new mail in quiet mode.
    pub fn new(subject: impl Into<Cow<'x, str>>, html_body: impl Into<Cow<'x, str>>) -> Self {
        Mail {
            subject: subject.into(),
            recipients: Vec::new(),
            html_body: html_body.into(),
            attachment: None,
            close: SessionClose::default(),
        }
    }

    /// Adds a recipient. Recipients are delivered in insertion order and
    /// duplicates receive one copy per occurrence.
    pub fn to(mut self, recipient: impl Into<Cow<'x, str>>) -> Self {
        self.recipients.push(recipient.into());
        self
    }

    pub fn recipients<T, U>(mut self, recipients: T) -> Self
    where
        T: IntoIterator<Item = U>,
        U: Into<Cow<'x, str>>,
    {
        self.recipients.extend(recipients.into_iter().map(Into::into));
        self
    }

    /// Attaches the file at `path`, shown as `filename` or, if absent, as the
    /// file name of `path`.
    pub fn attachment(
        mut self,
        path: impl AsRef<Path>,
        filename: Option<&'x str>,
    ) -> Self {
        self.attachment = Some((path.as_ref().to_path_buf(), filename.map(Cow::Borrowed)));
        self
    }

    /// `true` closes the session after every send attempt, `false` keeps it open.
    pub fn quiet(self, quiet: bool) -> Self {
        self.close_session(SessionClose::from(quiet))
    }

    pub fn close_session(mut self, close: SessionClose) -> Self {
        self.close = close;
        self
    }
}

/// File contents embedded in a message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attachment {
    pub filename: String,
    pub contents: Arc<Vec<u8>>,
}

impl Attachment {
    /// Reads the whole file into memory. The file handle is released before
    /// this returns, whether or not the read succeeded.
    pub async fn load(path: impl AsRef<Path>, filename: Option<&str>) -> crate::Result<Self> {
        let path = path.as_ref();
        let filename = match filename.filter(|name| !name.is_empty()) {
            Some(filename) => filename.to_string(),
            None => path
                .file_name()
                .map(|name| name.to_string_lossy().into_owned())
                .unwrap_or_else(|| "attachment".to_string()),
        };

        match tokio::fs::read(path).await {
            Ok(contents) => {
                log::debug!(
                    "Loaded attachment {} ({} bytes) as {filename:?}",
                    path.display(),
                    contents.len()
                );
                Ok(Attachment {
                    filename,
                    contents: Arc::new(contents),
                })
            }
            Err(error) => Err(crate::Error::Attachment {
                path: path.to_path_buf(),
                error,
            }),
        }
    }
}

/// One copy of a [`Mail`], addressed to a single recipient.
#[derive(Debug, Clone)]
pub struct OutboundMessage {
    pub subject: String,
    pub from: String,
    pub reply_to: Option<String>,
    pub to: String,
    pub html_body: String,
    pub headers: Vec<(&'static str, String)>,
    pub attachment: Option<Attachment>,
}

impl OutboundMessage {
    pub fn new(
        config: &MailConfig,
        mail: &Mail<'_>,
        recipient: &str,
        attachment: Option<Attachment>,
    ) -> Self {
        OutboundMessage {
            subject: mail.subject.to_string(),
            from: config.from.clone(),
            reply_to: config.reply_to.clone(),
            to: recipient.to_string(),
            html_body: mail.html_body.to_string(),
            headers: config.provider_headers(),
            attachment,
        }
    }

    /// Renders the RFC 5322 message.
    pub fn write_to_vec(&self) -> crate::Result<Vec<u8>> {
        let mut builder = MessageBuilder::new()
            .from(self.from.as_str())
            .to(self.to.as_str())
            .subject(self.subject.as_str())
            .html_body(self.html_body.as_str());

        if let Some(reply_to) = &self.reply_to {
            builder = builder.reply_to(reply_to.as_str());
        }
        for (name, value) in &self.headers {
            builder = builder.header(*name, Raw::new(value.as_str()));
        }
        if let Some(attachment) = &self.attachment {
            builder = builder.attachment(
                ATTACHMENT_CONTENT_TYPE,
                attachment.filename.as_str(),
                attachment.contents.as_slice(),
            );
        }

        Ok(builder.write_to_vec()?)
    }
}

impl IntoMessage<'static> for OutboundMessage {
    fn into_message(self) -> crate::Result<Message<'static>> {
        let body = self.write_to_vec()?;
        Ok(Message::new(self.from, [self.to], body))
    }
}
