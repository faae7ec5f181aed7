//! Command/response exchanges.
//!
//! A command is written, then framed lines are collected until one of them
//! satisfies a [`ResponseMatcher`] or the deadline passes. URCs never reach
//! the matcher; they are diverted into the URC queue as they are framed.

use std::time::Duration;

use bytes::Bytes;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::time::Instant;
use tracing::{debug, trace, warn};
use wiolte_at::{is_final_result, Command, LineFramer, OK};
use wiolte_metrics::metric_defs;

use crate::error::ModemResult;
use crate::modem::Modem;

// ============================================================================
// Response Matching
// ============================================================================

/// Decides which response line ends an exchange.
pub enum ResponseMatcher {
    /// Any of these exact lines.
    ExactSet(Vec<Bytes>),
    /// Any line the predicate accepts.
    Predicate(Box<dyn Fn(&[u8]) -> bool + Send + Sync>),
}

impl ResponseMatcher {
    /// Exactly `OK`.
    pub fn ok() -> Self {
        Self::one_of(&[OK])
    }

    /// Any of the given exact lines.
    pub fn one_of(tokens: &[&'static [u8]]) -> Self {
        ResponseMatcher::ExactSet(tokens.iter().copied().map(Bytes::from_static).collect())
    }

    pub fn predicate(f: impl Fn(&[u8]) -> bool + Send + Sync + 'static) -> Self {
        ResponseMatcher::Predicate(Box::new(f))
    }

    /// `OK`, `ERROR`, `+CME ERROR: ...` or `+CMS ERROR: ...`.
    ///
    /// Error results end the exchange early; check
    /// [`CommandOutcome::is_ok`] to tell them apart.
    pub fn final_result() -> Self {
        Self::predicate(is_final_result)
    }

    /// Any line starting with `prefix`.
    pub fn prefix(prefix: &'static [u8]) -> Self {
        Self::predicate(move |line: &[u8]| line.starts_with(prefix))
    }

    pub fn matches(&self, line: &[u8]) -> bool {
        match self {
            ResponseMatcher::ExactSet(tokens) => tokens.iter().any(|t| t.as_ref() == line),
            ResponseMatcher::Predicate(f) => f(line),
        }
    }
}

impl Default for ResponseMatcher {
    fn default() -> Self {
        Self::ok()
    }
}

impl std::fmt::Debug for ResponseMatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ResponseMatcher::ExactSet(tokens) => f
                .debug_tuple("ExactSet")
                .field(&tokens.iter().map(|t| String::from_utf8_lossy(t)).collect::<Vec<_>>())
                .finish(),
            ResponseMatcher::Predicate(_) => f.write_str("Predicate(..)"),
        }
    }
}

/// Result of an exchange.
///
/// `success` is true when a line satisfied the matcher; that line is then the
/// last element of `lines`. On timeout `lines` holds everything seen.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandOutcome {
    pub success: bool,
    pub lines: Vec<Bytes>,
}

impl CommandOutcome {
    /// The line that satisfied the matcher.
    pub fn terminal(&self) -> Option<&Bytes> {
        if self.success {
            self.lines.last()
        } else {
            None
        }
    }

    /// Whether the exchange ended with `OK`.
    pub fn is_ok(&self) -> bool {
        self.terminal().is_some_and(|line| line.as_ref() == OK)
    }

    /// First line starting with `prefix`.
    pub fn first_with_prefix(&self, prefix: &[u8]) -> Option<&Bytes> {
        self.lines.iter().find(|line| line.starts_with(prefix))
    }

    /// Every line starting with `prefix`.
    pub fn lines_with_prefix<'a>(&'a self, prefix: &'a [u8]) -> impl Iterator<Item = &'a Bytes> {
        self.lines.iter().filter(move |line| line.starts_with(prefix))
    }
}

pub(crate) fn remaining(deadline: Instant) -> Duration {
    deadline.saturating_duration_since(Instant::now())
}

// ============================================================================
// Executor
// ============================================================================

impl<T: AsyncRead + AsyncWrite + Unpin> Modem<T> {
    /// Write a command line.
    pub async fn write_command(&mut self, command: &Command) -> ModemResult<()> {
        let text = command.to_command_string();
        debug!(modem = %self.config.name, "<- {}", text);
        metrics::counter!(
            metric_defs::AT_COMMANDS.name,
            &self.labels.clone().with_command(&text).to_labels()
        )
        .increment(1);
        self.transport.write_all(&command.encode()).await?;
        Ok(())
    }

    /// Read the next response line, skipping URCs.
    ///
    /// `Ok(None)` when the deadline passes (or the wait is cancelled) before a
    /// complete line arrives. A partially received line is discarded.
    pub async fn read_line(&mut self, deadline: Instant) -> ModemResult<Option<Bytes>> {
        let mut framer = LineFramer::new(self.config.max_line_length);
        loop {
            let Some(byte) = self.transport.read_byte(deadline).await? else {
                if framer.pending_len() > 0 {
                    trace!(bytes = framer.pending_len(), "discarding partial line");
                }
                return Ok(None);
            };
            if let Some(line) = framer.feed(byte) {
                if let Some(line) = self.filter_line(line) {
                    trace!(modem = %self.config.name, "-> {}", String::from_utf8_lossy(&line));
                    return Ok(Some(line));
                }
            }
        }
    }

    /// Collect lines until one satisfies `matcher` or `deadline` passes.
    /// Writes nothing.
    pub async fn collect_until(
        &mut self,
        matcher: &ResponseMatcher,
        deadline: Instant,
    ) -> ModemResult<CommandOutcome> {
        let mut outcome = CommandOutcome::default();
        while let Some(line) = self.read_line(deadline).await? {
            let done = matcher.matches(&line);
            outcome.lines.push(line);
            if done {
                outcome.success = true;
                break;
            }
        }
        Ok(outcome)
    }

    /// Write `command` and collect its response lines.
    ///
    /// A timeout is not an error: the outcome comes back with
    /// `success == false` and whatever lines were seen.
    pub async fn execute(
        &mut self,
        command: &Command,
        matcher: &ResponseMatcher,
        timeout: Duration,
    ) -> ModemResult<CommandOutcome> {
        let started = Instant::now();
        let deadline = started + timeout;
        self.write_command(command).await?;
        let outcome = self.collect_until(matcher, deadline).await?;

        let labels = self
            .labels
            .clone()
            .with_command(&command.to_command_string())
            .to_labels();
        if outcome.success {
            metrics::histogram!(metric_defs::AT_COMMAND_LATENCY.name, &labels)
                .record(started.elapsed().as_secs_f64() * 1000.0);
        } else {
            warn!(modem = %self.config.name, %command, "no reply before deadline");
            metrics::counter!(metric_defs::AT_COMMAND_TIMEOUTS.name, &labels).increment(1);
        }
        Ok(outcome)
    }

    /// Execute and report whether the command ended with `OK`. Error results
    /// end the wait early.
    pub async fn execute_ok(&mut self, command: &Command, timeout: Duration) -> ModemResult<bool> {
        let outcome = self
            .execute(command, &ResponseMatcher::final_result(), timeout)
            .await?;
        Ok(outcome.is_ok())
    }

    /// Execute a query and return its single information line.
    ///
    /// With a prefix, the first line starting with it; without, the first
    /// line that is not the final result. `None` unless the command ended
    /// with `OK`.
    pub async fn execute_single(
        &mut self,
        command: &Command,
        prefix: Option<&[u8]>,
        timeout: Duration,
    ) -> ModemResult<Option<Bytes>> {
        let outcome = self
            .execute(command, &ResponseMatcher::final_result(), timeout)
            .await?;
        if !outcome.is_ok() {
            return Ok(None);
        }
        let body = &outcome.lines[..outcome.lines.len() - 1];
        let line = match prefix {
            Some(prefix) => body.iter().find(|line| line.starts_with(prefix)),
            None => body.first(),
        };
        Ok(line.cloned())
    }

    /// Wait, without writing, for a line starting with `prefix`. Other lines
    /// are discarded.
    pub async fn wait_response(
        &mut self,
        prefix: &[u8],
        timeout: Duration,
    ) -> ModemResult<Option<Bytes>> {
        let deadline = Instant::now() + timeout;
        while let Some(line) = self.read_line(deadline).await? {
            if line.starts_with(prefix) {
                return Ok(Some(line));
            }
            trace!("skipping {}", String::from_utf8_lossy(&line));
        }
        Ok(None)
    }
}
