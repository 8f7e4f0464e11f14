/*
 * Copyright Stalwart Labs Ltd.
 *
 * Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
 * https://www.apache.org/licenses/LICENSE-2.0> or the MIT license
 * <LICENSE-MIT or https://opensource.org/licenses/MIT>, at your
 * option. This file may not be copied, modified, or distributed
 * except according to those terms.
 */

use std::time::Duration;

use smtp_proto::{EhloResponse, EXT_START_TLS};
use tokio::net::TcpStream;

use crate::{SmtpClient, SmtpClientBuilder};

use super::{stream::MailStream, tls::build_tls_connector, AssertReply};

impl<T: AsRef<str>> SmtpClientBuilder<T> {
    pub fn new(hostname: T, port: u16) -> Self {
        SmtpClientBuilder {
            addr: format!("{}:{}", hostname.as_ref(), port),
            timeout: Duration::from_secs(60 * 60),
            tls_connector: build_tls_connector(false),
            tls_hostname: hostname,
            starttls: false,
            local_host: gethostname::gethostname()
                .to_str()
                .unwrap_or("[127.0.0.1]")
                .to_string(),
        }
    }

    /// Allow invalid TLS certificates
    pub fn allow_invalid_certs(mut self) -> Self {
        self.tls_connector = build_tls_connector(true);
        self
    }

    /// Upgrade the clear text connection with STARTTLS before returning
    pub fn starttls(mut self, starttls: bool) -> Self {
        self.starttls = starttls;
        self
    }

    /// Set the EHLO hostname
    pub fn helo_host(mut self, host: impl Into<String>) -> Self {
        self.local_host = host.into();
        self
    }

    /// Sets the SMTP connection timeout
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Connects to the server, reads the greeting and sends EHLO. When
    /// STARTTLS was requested the session is upgraded and EHLO is repeated
    /// over the encrypted channel.
    pub async fn connect(&self) -> crate::Result<SmtpClient<MailStream>> {
        log::debug!("Connecting to {}", self.addr);

        tokio::time::timeout(self.timeout, async {
            let mut client = SmtpClient {
                stream: TcpStream::connect(&self.addr).await?,
                timeout: self.timeout,
                capabilities: EhloResponse::default(),
            };

            // Read greeting
            client.read().await?.assert_positive_completion()?;

            // Send EHLO
            client.capabilities = client.ehlo(&self.local_host).await?;

            if !self.starttls {
                return Ok(SmtpClient {
                    stream: MailStream::from(client.stream),
                    timeout: client.timeout,
                    capabilities: client.capabilities,
                });
            }

            if !client.capabilities.has_capability(EXT_START_TLS) {
                return Err(crate::Error::MissingStartTls);
            }
            let mut client = client
                .start_tls(&self.tls_connector, self.tls_hostname.as_ref())
                .await?;

            // Capabilities may change after the upgrade.
            client.capabilities = client.ehlo(&self.local_host).await?;

            Ok(SmtpClient {
                stream: MailStream::from(client.stream),
                timeout: client.timeout,
                capabilities: client.capabilities,
            })
        })
        .await
        .map_err(|_| crate::Error::Timeout)?
    }
}
