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

pub mod config;
pub mod outbound;
pub mod retry;

use crate::{
    smtp::{
        message::{IntoMessage, Message},
        stream::MailStream,
    },
    SmtpClient, SmtpClientBuilder,
};

use self::{
    config::MailConfig,
    outbound::{Attachment, Mail, OutboundMessage},
    retry::Delivery,
};

/// When the dispatcher sends QUIT on its session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SessionClose {
    /// Leave the session open for later calls.
    KeepOpen,
    /// QUIT once the whole batch has been attempted.
    AfterBatch,
    /// QUIT after every send attempt, successful or not. Any further
    /// attempt on the same dispatcher, including a retry, fails with
    /// [`crate::Error::SessionClosed`].
    #[default]
    AfterEachAttempt,
}

impl From<bool> for SessionClose {
    /// Maps the `quiet` flag.
    fn from(quiet: bool) -> Self {
        if quiet {
            SessionClose::AfterEachAttempt
        } else {
            SessionClose::KeepOpen
        }
    }
}

/// Sends mail over a single SMTP session that is opened and authenticated
/// when the dispatcher is created. The session is never re-established.
pub struct MailDispatcher {
    config: MailConfig,
    session: Option<SmtpClient<MailStream>>,
}

impl MailDispatcher {
    /// Connects to the configured server, upgrades the connection with
    /// STARTTLS if requested and authenticates.
    pub async fn connect(config: MailConfig) -> crate::Result<Self> {
        let mut builder = SmtpClientBuilder::new(config.host.as_str(), config.port)
            .starttls(config.tls)
            .timeout(config.timeout);
        if let Some(helo_host) = &config.helo_host {
            builder = builder.helo_host(helo_host.as_str());
        }
        if config.allow_invalid_certs {
            builder = builder.allow_invalid_certs();
        }

        let mut session = builder.connect().await?;
        session.authenticate(&config.credentials()).await?;

        log::info!(
            "Authenticated with {}:{} (provider {}, tls {})",
            config.host,
            config.port,
            config.provider,
            session.stream.is_tls()
        );

        Ok(MailDispatcher {
            config,
            session: Some(session),
        })
    }

    pub fn config(&self) -> &MailConfig {
        &self.config
    }

    /// Returns `false` once the session has been closed.
    pub fn is_connected(&self) -> bool {
        self.session.is_some()
    }

    /// Sends QUIT and drops the session.
    pub async fn close(&mut self) -> crate::Result<()> {
        match self.session.take() {
            Some(session) => session.quit().await,
            None => Err(crate::Error::SessionClosed),
        }
    }

    /// Sends one copy of `mail` to each of its recipients, in order.
    ///
    /// The attachment, if any, is read before anything is sent. A message
    /// rejected with `454` is retried according to the configured
    /// [`retry::RetryPolicy`]; any other failure stops the batch and is
    /// returned, leaving later recipients unattempted.
    pub async fn send_mail(&mut self, mail: &Mail<'_>) -> crate::Result<()> {
        if mail.subject.trim().is_empty() {
            return Err(crate::Error::MissingSubject);
        }
        if mail.recipients.is_empty() {
            return Err(crate::Error::MissingRcptTo);
        }

        let attachment = match &mail.attachment {
            Some((path, filename)) => Some(Attachment::load(path, filename.as_deref()).await?),
            None => None,
        };

        let messages = mail
            .recipients
            .iter()
            .map(|recipient| {
                OutboundMessage::new(&self.config, mail, recipient, attachment.clone())
                    .into_message()
            })
            .collect::<crate::Result<Vec<_>>>()?;

        let mut result = Ok(());
        for (pos, message) in messages.iter().enumerate() {
            if let Err(err) = self.deliver(message, mail.close).await {
                log::warn!(
                    "Delivery of {:?} stopped at recipient {} of {}: {err}",
                    mail.subject,
                    pos + 1,
                    messages.len()
                );
                result = Err(err);
                break;
            }
        }

        if mail.close == SessionClose::AfterBatch && self.session.is_some() {
            self.quit_quietly().await;
        }

        result
    }

    async fn deliver(&mut self, message: &Message<'_>, close: SessionClose) -> crate::Result<()> {
        let policy = self.config.retry;
        let rcpt = message
            .rcpt_to
            .first()
            .map(|rcpt| &*rcpt.email)
            .unwrap_or_default();
        let mut retries = 0;
        let mut state = Delivery::Pending;

        loop {
            state = match state {
                Delivery::Pending => {
                    let result = match self.session.as_mut() {
                        Some(session) => session.send(message).await,
                        None => Err(crate::Error::SessionClosed),
                    };
                    match &result {
                        Err(err) if err.is_connection_failure() => {
                            // QUIT would only wait on a dead stream.
                            log::debug!("Dropping SMTP session after {err}");
                            self.session = None;
                        }
                        _ if close == SessionClose::AfterEachAttempt
                            && self.session.is_some() =>
                        {
                            self.quit_quietly().await;
                        }
                        _ => (),
                    }
                    policy.next(result, retries)
                }
                Delivery::RetryWait(err) => {
                    retries += 1;
                    log::warn!(
                        "Sending to {rcpt} failed ({err}), retry {retries} of {} in {:?}",
                        policy.max_retries,
                        policy.delay
                    );
                    if let Some(session) = self.session.as_mut() {
                        // Clear the half-open transaction before trying again.
                        if let Err(err) = session.rset().await {
                            log::debug!("RSET failed: {err}");
                        }
                    }
                    tokio::time::sleep(policy.delay).await;
                    Delivery::Pending
                }
                Delivery::Sent => {
                    log::info!("Sent message to {rcpt}");
                    return Ok(());
                }
                Delivery::Failed(err) => {
                    return Err(err);
                }
            };
        }
    }

    async fn quit_quietly(&mut self) {
        if let Err(err) = self.close().await {
            log::warn!("QUIT failed: {err}");
        }
    }
}

impl std::fmt::Debug for MailDispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MailDispatcher")
            .field("config", &self.config)
            .field("connected", &self.is_connected())
            .finish()
    }
}
