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

use std::{collections::HashMap, fmt::Display, time::Duration};

use crate::smtp::auth::Credentials;

use super::retry::RetryPolicy;

/// Settings that must be present in the map given to [`MailConfig::from_settings`].
pub const REQUIRED_SETTINGS: [&str; 4] = ["username", "password", "host", "port"];

/// Header read by Amazon SES to select a configuration set.
pub const SES_CONFIGURATION_SET_HEADER: &str = "X-SES-CONFIGURATION-SET";

/// Mail submission provider.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum Provider {
    /// Amazon Simple Email Service.
    Aws,
    #[default]
    Generic,
}

impl From<&str> for Provider {
    fn from(value: &str) -> Self {
        if value.trim().eq_ignore_ascii_case("aws") {
            Provider::Aws
        } else {
            Provider::Generic
        }
    }
}

impl Display for Provider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Provider::Aws => write!(f, "AWS"),
            Provider::Generic => write!(f, "generic"),
        }
    }
}

/// Connection and sender settings for a [`super::MailDispatcher`].
///
/// The configuration is assembled with the setters below and then moved into
/// the dispatcher, which only hands out shared references to it.
#[derive(Clone)]
pub struct MailConfig {
    pub(crate) provider: Provider,
    pub(crate) host: String,
    pub(crate) port: u16,
    username: String,
    password: String,
    pub(crate) tls: bool,
    pub(crate) from: String,
    pub(crate) reply_to: Option<String>,
    configuration_set: Option<String>,
    pub(crate) helo_host: Option<String>,
    pub(crate) allow_invalid_certs: bool,
    pub(crate) timeout: Duration,
    pub(crate) retry: RetryPolicy,
}

impl MailConfig {
    pub fn new(
        from: impl Into<String>,
        host: impl Into<String>,
        port: u16,
        username: impl Into<String>,
        password: impl Into<String>,
    ) -> Self {
        MailConfig {
            provider: Provider::Generic,
            host: host.into(),
            port,
            username: username.into(),
            password: password.into(),
            tls: false,
            from: from.into(),
            reply_to: None,
            configuration_set: None,
            helo_host: None,
            allow_invalid_certs: false,
            timeout: Duration::from_secs(60 * 60),
            retry: RetryPolicy::default(),
        }
    }

    /// Builds a configuration from a settings map.
    ///
    /// `username`, `password`, `host` and `port` are required. `provider`,
    /// `tls`, `reply_to` and `configuration_set` are optional. No connection
    /// is attempted here.
    pub fn from_settings(
        from: impl Into<String>,
        settings: &HashMap<String, String>,
    ) -> crate::Result<Self> {
        let required = |key: &'static str| {
            settings
                .get(key)
                .map(String::as_str)
                .ok_or(crate::Error::MissingConfig(key))
        };
        for key in REQUIRED_SETTINGS {
            required(key)?;
        }

        let port = required("port")?;
        let mut config = MailConfig::new(
            from,
            required("host")?,
            port.trim().parse().map_err(|_| crate::Error::InvalidConfig {
                key: "port",
                value: port.to_string(),
            })?,
            required("username")?,
            required("password")?,
        );

        if let Some(provider) = settings.get("provider") {
            config.provider = Provider::from(provider.as_str());
        }
        if let Some(tls) = settings.get("tls") {
            config.tls = parse_bool(tls).ok_or_else(|| crate::Error::InvalidConfig {
                key: "tls",
                value: tls.to_string(),
            })?;
        }
        if let Some(reply_to) = settings.get("reply_to").filter(|v| !v.trim().is_empty()) {
            config.reply_to = Some(reply_to.trim().to_string());
        }
        if let Some(set) = settings.get("configuration_set") {
            config = config.configuration_set(set.as_str());
        }

        Ok(config)
    }

    pub fn provider(mut self, provider: Provider) -> Self {
        self.provider = provider;
        self
    }

    /// Upgrade the connection with STARTTLS before authenticating.
    pub fn tls(mut self, tls: bool) -> Self {
        self.tls = tls;
        self
    }

    pub fn reply_to(mut self, reply_to: impl Into<String>) -> Self {
        self.reply_to = Some(reply_to.into());
        self
    }

    /// SES configuration set, only sent when the provider is [`Provider::Aws`].
    pub fn configuration_set(mut self, configuration_set: impl Into<String>) -> Self {
        let configuration_set = configuration_set.into();
        self.configuration_set =
            Some(configuration_set.trim().to_string()).filter(|set| !set.is_empty());
        self
    }

    pub fn helo_host(mut self, helo_host: impl Into<String>) -> Self {
        self.helo_host = Some(helo_host.into());
        self
    }

    /// Disables checking for certificate validity (dangerous and should not be used).
    pub fn allow_invalid_certs(mut self, allow_invalid_certs: bool) -> Self {
        self.allow_invalid_certs = allow_invalid_certs;
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn is_tls(&self) -> bool {
        self.tls
    }

    pub fn from_address(&self) -> &str {
        &self.from
    }

    pub fn reply_to_address(&self) -> Option<&str> {
        self.reply_to.as_deref()
    }

    pub fn credentials(&self) -> Credentials<'_> {
        Credentials::new(self.username.as_str(), self.password.as_str())
    }

    /// Extra headers required by the provider on every message.
    pub fn provider_headers(&self) -> Vec<(&'static str, String)> {
        match (&self.provider, &self.configuration_set) {
            (Provider::Aws, Some(set)) => vec![(SES_CONFIGURATION_SET_HEADER, set.clone())],
            _ => Vec::new(),
        }
    }
}

impl std::fmt::Debug for MailConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MailConfig")
            .field("provider", &self.provider)
            .field("host", &self.host)
            .field("port", &self.port)
            .field("username", &self.username)
            .field("tls", &self.tls)
            .field("from", &self.from)
            .field("reply_to", &self.reply_to)
            .field("configuration_set", &self.configuration_set)
            .field("timeout", &self.timeout)
            .field("retry", &self.retry)
            .finish_non_exhaustive()
    }
}

fn parse_bool(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Some(true),
        "false" | "0" | "no" | "off" | "" => Some(false),
        _ => None,
    }
}

#[cfg(test)]
mod test {
    use std::collections::HashMap;

    use super::{MailConfig, Provider, REQUIRED_SETTINGS, SES_CONFIGURATION_SET_HEADER};

    fn settings(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    fn complete() -> HashMap<String, String> {
        settings(&[
            ("username", "tim"),
            ("password", "tanstaaf"),
            ("host", "smtp.example.com"),
            ("port", "587"),
        ])
    }

    #[test]
    fn missing_required_settings() {
        for key in REQUIRED_SETTINGS {
            let mut settings = complete();
            settings.remove(key);
            match MailConfig::from_settings("sender@example.com", &settings) {
                Err(crate::Error::MissingConfig(missing)) => assert_eq!(missing, key),
                other => panic!("Expected missing {key}, got {other:?}"),
            }
        }
    }

    #[test]
    fn parse_settings() {
        let config = MailConfig::from_settings("sender@example.com", &complete()).unwrap();
        assert_eq!(config.host(), "smtp.example.com");
        assert_eq!(config.port(), 587);
        assert_eq!(config.provider, Provider::Generic);
        assert!(!config.is_tls());
        assert_eq!(config.from_address(), "sender@example.com");
        assert_eq!(config.reply_to_address(), None);
        assert_eq!(config.credentials().username(), "tim");

        let mut settings = complete();
        settings.insert("provider".into(), "AWS".into());
        settings.insert("tls".into(), "True".into());
        settings.insert("reply_to".into(), "support@example.com".into());
        settings.insert("configuration_set".into(), "reports".into());
        let config = MailConfig::from_settings("sender@example.com", &settings).unwrap();
        assert_eq!(config.provider, Provider::Aws);
        assert!(config.is_tls());
        assert_eq!(config.reply_to_address(), Some("support@example.com"));
        assert_eq!(
            config.provider_headers(),
            vec![(SES_CONFIGURATION_SET_HEADER, "reports".to_string())]
        );
    }

    #[test]
    fn invalid_settings() {
        let mut settings = complete();
        settings.insert("port".into(), "smtp".into());
        assert!(matches!(
            MailConfig::from_settings("sender@example.com", &settings),
            Err(crate::Error::InvalidConfig { key: "port", .. })
        ));

        let mut settings = complete();
        settings.insert("tls".into(), "maybe".into());
        assert!(matches!(
            MailConfig::from_settings("sender@example.com", &settings),
            Err(crate::Error::InvalidConfig { key: "tls", .. })
        ));
    }

    #[test]
    fn provider_headers() {
        let config = MailConfig::new("a@example.com", "localhost", 25, "u", "p");
        assert!(config.clone().provider_headers().is_empty());
        assert!(config
            .clone()
            .provider(Provider::Aws)
            .provider_headers()
            .is_empty());
        assert!(config
            .clone()
            .provider(Provider::Aws)
            .configuration_set("  ")
            .provider_headers()
            .is_empty());
        assert!(config
            .clone()
            .provider(Provider::Generic)
            .configuration_set("reports")
            .provider_headers()
            .is_empty());
        assert_eq!(
            config
                .provider(Provider::Aws)
                .configuration_set("reports")
                .provider_headers()
                .len(),
            1
        );
        assert_eq!(Provider::from("aws"), Provider::Aws);
        assert_eq!(Provider::from("sendgrid"), Provider::Generic);
    }
}
