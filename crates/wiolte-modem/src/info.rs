//! Identity, signal, address and DNS queries.

use std::time::Duration;

use tokio::io::{AsyncRead, AsyncWrite};
use tokio::time::Instant;
use tracing::{debug, trace};
use wiolte_at::{
    parse_subscriber_number, Command, ContextState, SignalQuality, Urc, CNUM_PREFIX,
    CONTEXT_PREFIX, CSQ_PREFIX,
};

use crate::error::{ModemError, ModemResult};
use crate::executor::{remaining, ResponseMatcher};
use crate::modem::Modem;

fn text(line: &[u8]) -> String {
    String::from_utf8_lossy(line).trim().to_string()
}

impl<T: AsyncRead + AsyncWrite + Unpin> Modem<T> {
    /// IMEI (`AT+GSN`).
    pub async fn imei(&mut self) -> ModemResult<Option<String>> {
        let timeout = self.config.command_timeout();
        let line = self.execute_single(&Command::Imei, None, timeout).await?;
        Ok(line.map(|line| text(&line)))
    }

    /// IMSI of the inserted SIM (`AT+CIMI`).
    pub async fn imsi(&mut self) -> ModemResult<Option<String>> {
        let timeout = self.config.command_timeout();
        let line = self.execute_single(&Command::Imsi, None, timeout).await?;
        Ok(line.map(|line| text(&line)))
    }

    /// Subscriber number (`AT+CNUM`). `None` if the SIM does not carry one.
    pub async fn phone_number(&mut self) -> ModemResult<Option<String>> {
        let timeout = self.config.command_timeout();
        match self
            .execute_single(&Command::SubscriberNumber, Some(CNUM_PREFIX), timeout)
            .await?
        {
            Some(line) => Ok(Some(parse_subscriber_number(&line)?)),
            None => Ok(None),
        }
    }

    /// Signal quality (`AT+CSQ`). `None` if there was no reply or it could
    /// not be parsed.
    pub async fn signal_quality(&mut self) -> ModemResult<Option<SignalQuality>> {
        let timeout = self.config.command_timeout();
        let line = self
            .execute_single(&Command::SignalQuality, Some(CSQ_PREFIX), timeout)
            .await?;
        Ok(line.and_then(|line| match SignalQuality::parse(&line) {
            Ok(quality) => Some(quality),
            Err(e) => {
                debug!("unusable signal report: {}", e);
                None
            }
        }))
    }

    /// Address assigned to the configured PDP context (`AT+QIACT?`). `None`
    /// if the context is not active.
    pub async fn local_address(&mut self) -> ModemResult<Option<String>> {
        self.process_urcs();
        let timeout = self.config.command_timeout();
        let outcome = self
            .execute(&Command::QueryContexts, &ResponseMatcher::final_result(), timeout)
            .await?;
        if !outcome.is_ok() {
            return Ok(None);
        }
        for line in outcome.lines_with_prefix(CONTEXT_PREFIX) {
            let context = ContextState::parse(line)?;
            if context.context_id == self.config.context_id && context.state == 1 {
                return Ok(Some(context.address));
            }
        }
        Ok(None)
    }

    /// Resolve `host` through the module's DNS client (`AT+QIDNSGIP`).
    ///
    /// The addresses arrive as `dnsgip` URCs after the command's `OK`; this
    /// waits for the header and every address it announces.
    pub async fn resolve(&mut self, host: &str, timeout: Duration) -> ModemResult<Vec<String>> {
        self.process_urcs();
        let deadline = Instant::now() + timeout;

        let command = Command::ResolveHost {
            context_id: self.config.context_id,
            host: host.to_string(),
        };
        let outcome = self
            .execute(&command, &ResponseMatcher::final_result(), remaining(deadline))
            .await?;
        if !outcome.success {
            return Err(ModemError::Timeout {
                operation: "DNS request",
            });
        }
        if !outcome.is_ok() {
            return Err(ModemError::Protocol(format!("DNS request for {} rejected", host)));
        }

        let mut expected = None;
        let mut addresses = Vec::new();
        loop {
            let results = self
                .urcs
                .take_matching(|urc| matches!(urc, Urc::DnsHeader { .. } | Urc::DnsAddress { .. }));
            for urc in results {
                match urc {
                    Urc::DnsHeader {
                        error_code, count, ..
                    } => {
                        if error_code != 0 {
                            return Err(ModemError::Protocol(format!(
                                "DNS lookup for {} failed with error {}",
                                host, error_code
                            )));
                        }
                        expected = Some(count);
                    }
                    Urc::DnsAddress { address } => addresses.push(address),
                    _ => {}
                }
            }
            if expected.is_some_and(|count| addresses.len() >= count) {
                debug!(host, ?addresses, "resolved");
                return Ok(addresses);
            }

            match self.read_line(deadline).await? {
                Some(line) => trace!("ignoring {} while resolving", String::from_utf8_lossy(&line)),
                None => {
                    return Err(ModemError::Timeout {
                        operation: "DNS result",
                    })
                }
            }
        }
    }
}
