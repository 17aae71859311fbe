// SPDX-License-Identifier: AGPL-3.0-only
// Copyright Authors of dommer

use crate::{CheckOutcome, CheckTarget};
use tracing::debug;

/// Issues an HTTP(S) GET against the target and passes on any non-error
/// status. HTTPS accepts self-signed certificates since competition boxes
/// rarely carry a real chain.
#[derive(Debug, Clone, PartialEq)]
pub struct HttpCheck {
    pub tls: bool,
    pub port: u16,
    pub path: Option<String>,
}

impl HttpCheck {
    fn url(&self, target: &CheckTarget) -> String {
        let scheme = if self.tls { "https" } else { "http" };
        let path = match self.path.as_deref() {
            Some(path) if path.starts_with('/') => path.to_string(),
            Some(path) => format!("/{path}"),
            None => "/".to_string(),
        };
        format!("{scheme}://{}:{}{path}", target.addr, self.port)
    }

    pub(crate) async fn check(&self, target: &CheckTarget) -> CheckOutcome {
        let url = self.url(target);
        debug!(%url, "conducting http check");

        // a 3xx is a scoring pass on its own; never chase the location
        let client = match reqwest::Client::builder()
            .danger_accept_invalid_certs(self.tls)
            .redirect(reqwest::redirect::Policy::none())
            .build()
        {
            Ok(client) => client,
            Err(err) => return CheckOutcome::fail(format!("client construction failed: {err}")),
        };

        match client.get(&url).send().await {
            Ok(response) => {
                let status = response.status();
                if status.is_client_error() || status.is_server_error() {
                    CheckOutcome::fail(format!("GET {url} returned {status}"))
                } else {
                    CheckOutcome::pass(format!("GET {url} returned {status}"))
                }
            }
            Err(err) => CheckOutcome::fail(format!("GET {url} failed: {err}")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::Ipv4Addr;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    async fn spawn_http_listener(response: &'static str) -> u16 {
        let listener = TcpListener::bind((Ipv4Addr::LOCALHOST, 0)).await.unwrap();
        let port = listener.local_addr().unwrap().port();
        tokio::spawn(async move {
            while let Ok((mut stream, _)) = listener.accept().await {
                let mut buf = [0u8; 1024];
                let _ = stream.read(&mut buf).await;
                let _ = stream.write_all(response.as_bytes()).await;
            }
        });
        port
    }

    fn target() -> CheckTarget {
        CheckTarget {
            addr: Ipv4Addr::LOCALHOST,
            cred: None,
        }
    }

    #[tokio::test]
    async fn should_pass_on_ok_status() {
        let port = spawn_http_listener("HTTP/1.1 200 OK\r\ncontent-length: 0\r\n\r\n").await;
        let check = HttpCheck {
            tls: false,
            port,
            path: None,
        };
        let outcome = check.check(&target()).await;
        assert!(outcome.passed, "{}", outcome.message);
    }

    #[tokio::test]
    async fn should_pass_on_redirect_without_following_it() {
        // the location is unreachable; the 302 itself is the pass
        let port = spawn_http_listener(
            "HTTP/1.1 302 Found\r\nlocation: http://127.0.0.1:1/\r\ncontent-length: 0\r\n\r\n",
        )
        .await;
        let check = HttpCheck {
            tls: false,
            port,
            path: None,
        };
        let outcome = check.check(&target()).await;
        assert!(outcome.passed, "{}", outcome.message);
        assert!(outcome.message.contains("302"));
    }

    #[tokio::test]
    async fn should_fail_on_server_error() {
        let port = spawn_http_listener(
            "HTTP/1.1 500 Internal Server Error\r\ncontent-length: 0\r\n\r\n",
        )
        .await;
        let check = HttpCheck {
            tls: false,
            port,
            path: None,
        };
        let outcome = check.check(&target()).await;
        assert!(!outcome.passed);
        assert!(outcome.message.contains("500"));
    }

    #[test]
    fn should_normalize_request_paths() {
        let target = target();
        let bare = HttpCheck {
            tls: false,
            port: 80,
            path: Some("health".to_string()),
        };
        let rooted = HttpCheck {
            tls: true,
            port: 8443,
            path: Some("/health".to_string()),
        };
        assert_eq!(bare.url(&target), "http://127.0.0.1:80/health");
        assert_eq!(rooted.url(&target), "https://127.0.0.1:8443/health");
    }
}
