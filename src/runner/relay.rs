use std::io;
use std::sync::Arc;

use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncReadExt, BufReader};
use tokio::task::JoinHandle;

use crate::platform::{post_best_effort, ChatBackend};

/// Longest chunk of a single line posted at once, kept under the server's post size limit.
pub const MAX_LINE_BYTES: usize = 16_000;

/// Where and how the lines of one output stream are posted
#[derive(Debug, Clone)]
pub struct RelayTarget {
    pub channel_id: String,
    pub prefix: String,
    /// Markdown put in front of the prefix, e.g. ":exclamation: "
    pub emphasis: String,
}

impl RelayTarget {
    fn decorate(&self, line: &str) -> String {
        format!("{}{}{}", self.emphasis, self.prefix, line)
    }
}

/// How a relay stopped
#[derive(Debug)]
pub enum RelayEnd {
    /// The stream was fully drained
    Eof,
    /// A read failed; lines after the failure were not relayed
    Aborted(io::Error),
}

/// Post every line of `reader` to the target channel until end of stream.
///
/// Lines are decoded lossily so binary output never stops the relay. A final line
/// without a trailing newline is still posted. Lines longer than [`MAX_LINE_BYTES`]
/// are posted in several chunks.
pub async fn relay_lines<R>(reader: R, backend: &dyn ChatBackend, target: &RelayTarget) -> RelayEnd
where
    R: AsyncRead + Unpin,
{
    let mut reader = BufReader::new(reader);
    let mut buf = Vec::new();

    loop {
        buf.clear();
        let mut chunk = (&mut reader).take(MAX_LINE_BYTES as u64);
        match chunk.read_until(b'\n', &mut buf).await {
            Ok(0) => return RelayEnd::Eof,
            Ok(_) => {
                let line = String::from_utf8_lossy(&buf);
                let line = line.trim_end_matches('\n').trim_end_matches('\r');
                post_best_effort(backend, &target.channel_id, &target.decorate(line), None).await;
            }
            Err(e) => return RelayEnd::Aborted(e),
        }
    }
}

/// Run [`relay_lines`] on its own task.
pub fn spawn_relay<R>(
    reader: R,
    backend: Arc<dyn ChatBackend>,
    target: RelayTarget,
) -> JoinHandle<RelayEnd>
where
    R: AsyncRead + Unpin + Send + 'static,
{
    tokio::spawn(async move { relay_lines(reader, backend.as_ref(), &target).await })
}
