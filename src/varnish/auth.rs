// src/varnish/auth.rs
use super::client::VarnishClient;
use super::error::VarnishError;
use super::response::STATUS_AUTH;
use sha2::{Digest, Sha256};
use std::fmt;
use std::path::Path;
use tokio::io::{AsyncRead, AsyncWrite};
use tracing::debug;

/// Shared secret for the management port, as read from the secret file.
///
/// The bytes are used verbatim, trailing newline included, which is how
/// varnishd itself treats the file.
#[derive(Clone)]
pub struct Secret(Vec<u8>);

impl Secret {
    pub fn new(bytes: impl Into<Vec<u8>>) -> Self {
        Self(bytes.into())
    }

    pub async fn from_file<P: AsRef<Path>>(path: P) -> std::io::Result<Self> {
        tokio::fs::read(path).await.map(Self)
    }

    fn as_bytes(&self) -> &[u8] {
        &self.0
    }
}

impl fmt::Debug for Secret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Secret(<redacted>)")
    }
}

/// Hex-encoded `sha256(challenge "\n" secret challenge "\n")`.
pub fn challenge_response(challenge: &str, secret: &Secret) -> String {
    let mut hasher = Sha256::new();
    hasher.update(challenge.as_bytes());
    hasher.update(b"\n");
    hasher.update(secret.as_bytes());
    hasher.update(challenge.as_bytes());
    hasher.update(b"\n");
    format!("{:x}", hasher.finalize())
}

/// Completes the handshake on a freshly opened connection.
///
/// Must be called exactly once, before any other command.
pub async fn authenticate<S>(
    client: &mut VarnishClient<S>,
    secret: &Secret,
) -> Result<(), VarnishError>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let greeting = client.read_response().await?;
    if greeting.status != STATUS_AUTH {
        return Err(VarnishError::NoAuthChallenge(greeting.status));
    }

    let answer = challenge_response(greeting.first_line(), secret);
    match client.command_for_success("auth", &[answer.as_str()]).await {
        Ok(_) => {
            debug!("Authenticated to Varnish");
            Ok(())
        }
        Err(VarnishError::UnexpectedStatus { actual, .. }) => Err(VarnishError::AuthRejected(actual)),
        Err(e) => Err(e),
    }
}
