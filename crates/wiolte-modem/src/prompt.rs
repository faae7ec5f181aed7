//! Waiting for the raw `> ` payload prompt.

use std::time::Duration;

use tokio::io::{AsyncRead, AsyncWrite};
use tokio::time::Instant;
use tracing::{debug, trace};
use wiolte_at::{is_error_result, LineFramer, PromptMatcher};

use crate::error::ModemResult;
use crate::modem::Modem;

impl<T: AsyncRead + AsyncWrite + Unpin> Modem<T> {
    /// Scan raw bytes until `prompt` has been seen. `Ok(false)` on timeout,
    /// cancellation or an error result.
    ///
    /// The prompt carries no line terminator, so it is matched on the raw
    /// bytes. The same bytes also go through a line framer: URCs that arrive
    /// in front of the prompt are queued as usual, and an `ERROR` (the answer
    /// for a connection the module already dropped) ends the wait.
    pub async fn wait_for_prompt(&mut self, prompt: &[u8], timeout: Duration) -> ModemResult<bool> {
        let deadline = Instant::now() + timeout;
        let mut matcher = PromptMatcher::new(prompt);
        let mut framer = LineFramer::new(self.config.max_line_length);
        while !matcher.is_matched() {
            let Some(byte) = self.transport.read_byte(deadline).await? else {
                trace!("prompt {:?} not seen", String::from_utf8_lossy(prompt));
                return Ok(false);
            };
            matcher.feed(byte);
            let Some(line) = framer.feed(byte) else {
                continue;
            };
            if let Some(line) = self.filter_line(line) {
                if is_error_result(&line) {
                    debug!("{} instead of prompt", String::from_utf8_lossy(&line));
                    return Ok(false);
                }
                trace!("skipping {} before prompt", String::from_utf8_lossy(&line));
            }
        }
        Ok(true)
    }
}
