//! Power, boot, handshake and network activation.

use std::time::Duration;

use tokio::io::{AsyncRead, AsyncWrite};
use tracing::{debug, info, warn};
use wiolte_at::{Command, RegistrationDomain, RegistrationStatus, READY};

use crate::error::{ModemError, ModemResult};
use crate::executor::ResponseMatcher;
use crate::modem::{Modem, ModemState};

impl<T: AsyncRead + AsyncWrite + Unpin> Modem<T> {
    /// Put the control lines at their idle levels and forget all engine
    /// state. Stale input is discarded.
    pub async fn initialize(&mut self) -> ModemResult<()> {
        self.lines.set_idle_levels()?;
        self.powered = false;
        self.pool.clear();
        self.urcs.drain();
        self.transport.discard_pending().await?;
        self.set_state(ModemState::Off);
        self.record_open_connections();
        Ok(())
    }

    /// Switch the module supply. Switching it off returns the modem to
    /// [`ModemState::Off`] and forgets every connection.
    pub fn supply_power(&mut self, on: bool) -> ModemResult<()> {
        self.lines.module_power.set_level(on)?;
        self.powered = on;
        if !on {
            self.pool.clear();
            self.set_state(ModemState::Off);
            self.record_open_connections();
        }
        debug!(modem = %self.config.name, on, "module supply");
        Ok(())
    }

    /// Boot the module (power key if it is off, reset line otherwise), run
    /// the handshake and wait for the SIM.
    ///
    /// `Ok(false)` if the module never reported `RDY`, a handshake command
    /// was not answered with `OK`, the SIM query got no reply at all, or the
    /// call was cancelled. The SIM poll itself is unbounded.
    pub async fn turn_on_or_reset(&mut self) -> ModemResult<bool> {
        self.process_urcs();

        let booted = if self.lines.is_busy()? {
            self.turn_on().await?
        } else {
            self.reset().await?
        };
        if !booted {
            warn!(modem = %self.config.name, "module did not report ready");
            self.set_state(ModemState::Off);
            return Ok(false);
        }
        self.pool.clear();
        self.record_open_connections();

        self.set_state(ModemState::HandshakeInProgress);
        if !self.handshake().await? {
            self.set_state(ModemState::Off);
            return Ok(false);
        }

        self.set_state(ModemState::WaitingSimReady);
        if !self.wait_sim_ready().await? {
            self.set_state(ModemState::Off);
            return Ok(false);
        }

        self.set_state(ModemState::Registering);
        Ok(true)
    }

    async fn turn_on(&mut self) -> ModemResult<bool> {
        info!(modem = %self.config.name, "turning on");
        self.set_state(ModemState::TurningOn);

        if !self.transport.pause(self.config.power_key_delay()).await {
            return Ok(false);
        }
        self.lines.power_key.set_high()?;
        let pressed = self.transport.pause(self.config.power_key_pulse()).await;
        self.lines.power_key.set_low()?;
        if !pressed {
            return Ok(false);
        }

        if !self.wait_while_busy().await? {
            return Ok(false);
        }
        self.wait_ready().await
    }

    async fn reset(&mut self) -> ModemResult<bool> {
        info!(modem = %self.config.name, "resetting");
        self.set_state(ModemState::Resetting);

        self.lines.reset.set_low()?;
        let pulsed = self.transport.pause(self.config.reset_pulse()).await;
        self.transport.discard_pending().await?;
        self.lines.reset.set_high()?;
        if !pulsed || !self.transport.pause(self.config.reset_settle()).await {
            return Ok(false);
        }

        self.wait_ready().await
    }

    async fn wait_while_busy(&mut self) -> ModemResult<bool> {
        debug!("waiting while busy");
        let interval = self.config.busy_poll_interval();
        for _ in 0..self.config.busy_poll_attempts {
            if !self.lines.is_busy()? {
                return Ok(true);
            }
            if !self.transport.pause(interval).await {
                return Ok(false);
            }
        }
        warn!(modem = %self.config.name, "module stayed busy");
        Ok(false)
    }

    async fn wait_ready(&mut self) -> ModemResult<bool> {
        let timeout = self.config.boot_timeout();
        for attempt in 0..self.config.boot_attempts {
            if self.wait_response(READY, timeout).await?.is_some() {
                debug!(attempt, "module ready");
                return Ok(true);
            }
            if self.transport.is_cancelled() {
                break;
            }
        }
        Ok(false)
    }

    async fn handshake(&mut self) -> ModemResult<bool> {
        let timeout = self.config.command_timeout();
        let steps = [
            Command::EchoOff,
            Command::UrcPort {
                port: self.config.urc_port.clone(),
            },
            Command::SleepClock { enabled: true },
        ];
        for command in &steps {
            if !self.execute_ok(command, timeout).await? {
                warn!(modem = %self.config.name, %command, "handshake step failed");
                return Ok(false);
            }
        }
        Ok(true)
    }

    async fn wait_sim_ready(&mut self) -> ModemResult<bool> {
        info!(modem = %self.config.name, "waiting for SIM");
        let timeout = self.config.command_timeout();
        let matcher = ResponseMatcher::final_result();
        loop {
            let outcome = self.execute(&Command::SimStatus, &matcher, timeout).await?;
            if outcome.is_ok() {
                return Ok(true);
            }
            if outcome.lines.is_empty() {
                warn!(modem = %self.config.name, "SIM query got no reply");
                return Ok(false);
            }
            debug!("SIM not ready");
            if !self.transport.pause(self.config.sim_poll_interval()).await {
                return Ok(false);
            }
        }
    }

    /// Liveness check with a plain `AT`.
    pub async fn ping(&mut self) -> ModemResult<bool> {
        self.process_urcs();
        let timeout = self.config.command_timeout();
        self.execute_ok(&Command::Attention, timeout).await
    }

    /// Query one registration domain. `Ok(None)` if the query got no usable
    /// reply.
    pub async fn registration_status(
        &mut self,
        domain: RegistrationDomain,
        timeout: Duration,
    ) -> ModemResult<Option<RegistrationStatus>> {
        let command = match domain {
            RegistrationDomain::Gprs => Command::GprsRegistration,
            RegistrationDomain::Eps => Command::EpsRegistration,
        };
        match self.execute_single(&command, Some(domain.prefix()), timeout).await? {
            Some(line) => Ok(Some(RegistrationStatus::parse(&line, domain)?)),
            None => Ok(None),
        }
    }

    /// Wait for network registration, then configure and activate the PDP
    /// context.
    ///
    /// The registration poll is unbounded. A "not searching" or "unknown"
    /// status on either domain fails with
    /// [`ModemError::RegistrationDenied`]; "registered" on either domain
    /// ends the poll. `timeout` bounds each configuration command.
    pub async fn activate(
        &mut self,
        access_point: &str,
        user: &str,
        password: &str,
        timeout: Duration,
    ) -> ModemResult<bool> {
        self.process_urcs();
        info!(modem = %self.config.name, access_point, "activating network");
        self.set_state(ModemState::Registering);

        let query_timeout = self.config.command_timeout();
        'registration: loop {
            for domain in [RegistrationDomain::Gprs, RegistrationDomain::Eps] {
                let Some(status) = self.registration_status(domain, query_timeout).await? else {
                    if self.transport.is_cancelled() {
                        return Ok(false);
                    }
                    return Err(ModemError::Protocol(format!(
                        "no {} registration status",
                        domain
                    )));
                };
                debug!(%domain, ?status, "registration");
                if status.is_hard_failure() {
                    return Err(ModemError::RegistrationDenied {
                        domain,
                        status: status.code(),
                    });
                }
                if status.is_registered() {
                    break 'registration;
                }
            }
            if !self
                .transport
                .pause(self.config.registration_poll_interval())
                .await
            {
                return Ok(false);
            }
        }

        let configure = Command::ConfigureContext {
            context_id: self.config.context_id,
            apn: access_point.to_string(),
            user: user.to_string(),
            password: password.to_string(),
            auth: self.config.authentication.into(),
        };
        if !self.execute_ok(&configure, timeout).await? {
            return Ok(false);
        }
        let activate = Command::ActivateContext {
            context_id: self.config.context_id,
        };
        if !self.execute_ok(&activate, timeout).await? {
            return Ok(false);
        }

        self.set_state(ModemState::Activated);
        info!(modem = %self.config.name, "network activated");
        Ok(true)
    }
}
