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

//! Scripted SMTP server used by the integration tests.

#![allow(dead_code)]

use std::{
    net::SocketAddr,
    sync::{Arc, Mutex},
    time::Duration,
};

use mail_dispatch::{MailConfig, RetryPolicy};
use tokio::{
    io::{AsyncBufReadExt, AsyncWriteExt, BufReader},
    net::{TcpListener, TcpStream},
};

pub const RETRY_DELAY: Duration = Duration::from_millis(100);

#[derive(Debug, Clone)]
pub struct Behavior {
    pub starttls: bool,
    pub size: bool,
    pub auth: &'static str,
    pub accept_auth: bool,
    pub mail_from_failures: usize,
    pub failure_code: u16,
    pub stall_mail_from: bool,
}

impl Default for Behavior {
    fn default() -> Self {
        Behavior {
            starttls: false,
            size: false,
            auth: "PLAIN LOGIN",
            accept_auth: true,
            mail_from_failures: 0,
            failure_code: 454,
            stall_mail_from: false,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct Delivered {
    pub mail_from: String,
    pub rcpt_to: Vec<String>,
    pub data: Vec<u8>,
}

#[derive(Debug, Default)]
pub struct Received {
    pub connections: usize,
    pub commands: Vec<String>,
    pub messages: Vec<Delivered>,
    failures_left: usize,
}

pub struct FakeServer {
    pub addr: SocketAddr,
    state: Arc<Mutex<Received>>,
}

impl FakeServer {
    pub async fn start(behavior: Behavior) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let state = Arc::new(Mutex::new(Received {
            failures_left: behavior.mail_from_failures,
            ..Default::default()
        }));
        let behavior = Arc::new(behavior);

        let accept_state = state.clone();
        tokio::spawn(async move {
            while let Ok((stream, _)) = listener.accept().await {
                accept_state.lock().unwrap().connections += 1;
                tokio::spawn(handle(stream, behavior.clone(), accept_state.clone()));
            }
        });

        FakeServer { addr, state }
    }

    pub fn config(&self) -> MailConfig {
        MailConfig::new(
            "sender@example.com",
            "127.0.0.1",
            self.addr.port(),
            "user",
            "secret",
        )
        .helo_host("client.test")
        .timeout(Duration::from_secs(10))
        .retry_policy(RetryPolicy::new(2, RETRY_DELAY))
    }

    pub fn connections(&self) -> usize {
        self.state.lock().unwrap().connections
    }

    pub fn commands(&self) -> Vec<String> {
        self.state.lock().unwrap().commands.clone()
    }

    /// Commands starting with `prefix`, compared case-insensitively.
    pub fn commands_starting(&self, prefix: &str) -> Vec<String> {
        self.commands()
            .into_iter()
            .filter(|cmd| {
                cmd.len() >= prefix.len()
                    && cmd[..prefix.len()].eq_ignore_ascii_case(prefix)
            })
            .collect()
    }

    pub fn messages(&self) -> Vec<Delivered> {
        self.state.lock().unwrap().messages.clone()
    }
}

pub fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

fn address(cmd: &str) -> String {
    cmd.split_once('<')
        .and_then(|(_, rest)| rest.split_once('>'))
        .map(|(addr, _)| addr.to_string())
        .unwrap_or_default()
}

async fn handle(stream: TcpStream, behavior: Arc<Behavior>, state: Arc<Mutex<Received>>) {
    let (read, mut write) = stream.into_split();
    let mut reader = BufReader::new(read);
    let mut envelope = Delivered::default();
    let mut line = String::new();

    if write.write_all(b"220 fake.test ESMTP ready\r\n").await.is_err() {
        return;
    }

    loop {
        line.clear();
        match reader.read_line(&mut line).await {
            Ok(0) | Err(_) => break,
            Ok(_) => (),
        }
        let cmd = line.trim_end().to_string();
        let upper = cmd.to_ascii_uppercase();
        state.lock().unwrap().commands.push(cmd.clone());

        let reply = if upper.starts_with("EHLO") {
            let mut lines = vec!["fake.test greets you".to_string()];
            if behavior.starttls {
                lines.push("STARTTLS".to_string());
            }
            if behavior.size {
                lines.push("SIZE 10485760".to_string());
            }
            lines.push("8BITMIME".to_string());
            if !behavior.auth.is_empty() {
                lines.push(format!("AUTH {}", behavior.auth));
            }
            let last = lines.len() - 1;
            lines
                .iter()
                .enumerate()
                .map(|(pos, text)| {
                    format!("250{}{}\r\n", if pos == last { ' ' } else { '-' }, text)
                })
                .collect::<String>()
        } else if upper.starts_with("STARTTLS") {
            // Accept the upgrade, then drop the connection mid-handshake.
            let _ = write.write_all(b"220 2.0.0 Ready to start TLS\r\n").await;
            break;
        } else if upper.starts_with("AUTH") {
            if behavior.accept_auth {
                "235 2.7.0 Authentication successful\r\n".to_string()
            } else {
                "535 5.7.8 Authentication credentials invalid\r\n".to_string()
            }
        } else if upper.starts_with("MAIL FROM:") && behavior.stall_mail_from {
            // Keep reading without ever replying.
            continue;
        } else if upper.starts_with("MAIL FROM:") {
            let fail = {
                let mut state = state.lock().unwrap();
                if state.failures_left > 0 {
                    state.failures_left -= 1;
                    true
                } else {
                    false
                }
            };
            if fail {
                format!("{} 4.7.0 Temporary failure\r\n", behavior.failure_code)
            } else {
                envelope = Delivered {
                    mail_from: address(&cmd),
                    ..Default::default()
                };
                "250 2.1.0 OK\r\n".to_string()
            }
        } else if upper.starts_with("RCPT TO:") {
            envelope.rcpt_to.push(address(&cmd));
            "250 2.1.5 OK\r\n".to_string()
        } else if upper == "DATA" {
            if write
                .write_all(b"354 Start mail input; end with <CRLF>.<CRLF>\r\n")
                .await
                .is_err()
            {
                break;
            }
            let mut data = Vec::new();
            loop {
                line.clear();
                match reader.read_line(&mut line).await {
                    Ok(0) | Err(_) => return,
                    Ok(_) => (),
                }
                if line == ".\r\n" {
                    break;
                }
                // Undo the transparency procedure.
                let text = line.strip_prefix('.').unwrap_or(&line);
                data.extend_from_slice(text.as_bytes());
            }
            envelope.data = data;
            state
                .lock()
                .unwrap()
                .messages
                .push(std::mem::take(&mut envelope));
            "250 2.0.0 Queued\r\n".to_string()
        } else if upper == "RSET" {
            envelope = Delivered::default();
            "250 2.0.0 Reset\r\n".to_string()
        } else if upper == "QUIT" {
            let _ = write.write_all(b"221 2.0.0 Bye\r\n").await;
            break;
        } else {
            "500 5.5.1 Unrecognized command\r\n".to_string()
        };

        if write.write_all(reply.as_bytes()).await.is_err() {
            break;
        }
    }
}
