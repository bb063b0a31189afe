// src/varnish/client.rs
use super::error::VarnishError;
use super::response::{parse_header, Response, STATUS_OK};
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, BufReader};
use tracing::trace;

/// A well-formed header is 13 bytes; anything much longer is garbage.
const MAX_HEADER_LEN: u64 = 64;
const MAX_INITIAL_BODY_CAPACITY: usize = 64 * 1024;

/// Framed request/response exchange over one management connection.
///
/// The client exclusively owns the stream. Any error it returns leaves the
/// stream in an unknown position, so callers must drop the client.
pub struct VarnishClient<S> {
    stream: BufReader<S>,
}

impl<S> VarnishClient<S>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    pub fn new(stream: S) -> Self {
        Self {
            stream: BufReader::new(stream),
        }
    }

    /// Reads one `"%03d %8d\n"` header followed by exactly `length + 1` bytes.
    pub async fn read_response(&mut self) -> Result<Response, VarnishError> {
        let mut header = Vec::with_capacity(16);
        let n = (&mut self.stream)
            .take(MAX_HEADER_LEN)
            .read_until(b'\n', &mut header)
            .await?;
        if n == 0 {
            return Err(VarnishError::Io(std::io::Error::new(
                std::io::ErrorKind::UnexpectedEof,
                "connection closed before response header",
            )));
        }
        let header = String::from_utf8_lossy(&header);
        if !header.ends_with('\n') {
            return Err(VarnishError::MalformedHeader(header.into_owned()));
        }
        let (status, length) = parse_header(&header)?;

        // The buffer grows with the bytes actually received, not the declared length.
        let expected = length + 1;
        let mut buf = Vec::with_capacity(expected.min(MAX_INITIAL_BODY_CAPACITY));
        let read = (&mut self.stream)
            .take(expected as u64)
            .read_to_end(&mut buf)
            .await?;
        if read < expected {
            return Err(VarnishError::ShortRead { expected, read });
        }

        if buf.pop() != Some(b'\n') {
            return Err(VarnishError::MissingTerminator);
        }

        trace!(status, length, "response received");
        Ok(Response {
            status,
            body: String::from_utf8_lossy(&buf).into_owned(),
        })
    }

    /// Writes `command` and its space-joined `args` as one line.
    pub async fn send(&mut self, command: &str, args: &[&str]) -> Result<(), VarnishError> {
        let mut line = String::from(command);
        for arg in args {
            line.push(' ');
            line.push_str(arg);
        }
        line.push('\n');

        let stream = self.stream.get_mut();
        stream.write_all(line.as_bytes()).await?;
        stream.flush().await?;

        trace!(command, "command sent");
        Ok(())
    }

    /// Sends a command and requires a 200 reply.
    pub async fn command_for_success(
        &mut self,
        command: &str,
        args: &[&str],
    ) -> Result<Response, VarnishError> {
        self.send(command, args).await?;
        let response = self.read_response().await?;
        if !response.is_ok() {
            return Err(VarnishError::UnexpectedStatus {
                expected: STATUS_OK,
                actual: response.status,
            });
        }
        Ok(response)
    }
}
