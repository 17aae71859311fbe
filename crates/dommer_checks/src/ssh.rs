// SPDX-License-Identifier: AGPL-3.0-only
// Copyright Authors of dommer

use crate::{AuthMethod, CheckOutcome, CheckTarget};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::net::TcpStream;
use tracing::debug;

/// Connects to the target's SSH port and reads the identification banner.
/// The check passes if the endpoint speaks the SSH protocol.
#[derive(Debug, Clone, PartialEq)]
pub struct SshCheck {
    pub credlists: Vec<String>,
    pub port: u16,
    pub auth: Vec<AuthMethod>,
    pub keyfile: Option<String>,
}

impl SshCheck {
    pub(crate) async fn check(&self, target: &CheckTarget) -> CheckOutcome {
        debug!(addr = %target.addr, port = self.port, "conducting ssh check");
        let user = target
            .cred
            .as_ref()
            .map(|cred| cred.user.as_str())
            .unwrap_or("<none>");

        let stream = match TcpStream::connect((target.addr, self.port)).await {
            Ok(stream) => stream,
            Err(err) => return CheckOutcome::fail(format!("connect failed: {err}")),
        };

        let mut banner = String::new();
        let mut reader = BufReader::new(stream);
        if let Err(err) = reader.read_line(&mut banner).await {
            return CheckOutcome::fail(format!("banner read failed: {err}"));
        }
        let banner = banner.trim_end();

        if banner.starts_with("SSH-") {
            CheckOutcome::pass(format!("banner `{banner}` as user {user}"))
        } else {
            CheckOutcome::fail(format!("unexpected banner `{banner}`"))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::Ipv4Addr;
    use tokio::io::AsyncWriteExt;
    use tokio::net::TcpListener;

    async fn spawn_banner_listener(banner: &'static str) -> u16 {
        let listener = TcpListener::bind((Ipv4Addr::LOCALHOST, 0)).await.unwrap();
        let port = listener.local_addr().unwrap().port();
        tokio::spawn(async move {
            while let Ok((mut stream, _)) = listener.accept().await {
                let _ = stream.write_all(banner.as_bytes()).await;
            }
        });
        port
    }

    fn target() -> CheckTarget {
        CheckTarget {
            addr: Ipv4Addr::LOCALHOST,
            cred: Some(crate::Credential {
                user: "alice".to_string(),
                secret: "hunter2".to_string(),
            }),
        }
    }

    fn check_on(port: u16) -> SshCheck {
        SshCheck {
            credlists: vec!["admins".to_string()],
            port,
            auth: vec![AuthMethod::Plaintext],
            keyfile: None,
        }
    }

    #[tokio::test]
    async fn should_pass_on_ssh_banner() {
        let port = spawn_banner_listener("SSH-2.0-OpenSSH_9.6\r\n").await;
        let outcome = check_on(port).check(&target()).await;
        assert!(outcome.passed, "{}", outcome.message);
        assert!(outcome.message.contains("alice"));
    }

    #[tokio::test]
    async fn should_fail_on_non_ssh_banner() {
        let port = spawn_banner_listener("220 smtp ready\r\n").await;
        let outcome = check_on(port).check(&target()).await;
        assert!(!outcome.passed);
    }

    #[tokio::test]
    async fn should_fail_on_connection_refused() {
        // Bind-then-drop to get a port nothing listens on.
        let listener = TcpListener::bind((Ipv4Addr::LOCALHOST, 0)).await.unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);

        let outcome = check_on(port).check(&target()).await;
        assert!(!outcome.passed);
        assert!(outcome.message.contains("connect failed"));
    }
}
