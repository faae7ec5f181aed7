//! A scripted EC21 on the far end of an in-memory duplex stream.

#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncWriteExt, DuplexStream};
use tokio::task::JoinHandle;
use wiolte_modem::{
    ControlLines, InputLine, LatchedLine, LineError, Modem, ModemConfig, OutputLine, StaticInput,
};

/// One step of the device script.
#[derive(Debug, Clone)]
pub enum Step {
    /// Wait for the host to write `expect` (up to and including its CR),
    /// then write `reply`.
    Command { expect: Vec<u8>, reply: Vec<u8> },
    /// Wait for `len` raw bytes from the host, then write `reply`.
    Payload { len: usize, reply: Vec<u8> },
    /// Write bytes right away.
    Emit(Vec<u8>),
    /// Sleep before the next step.
    Delay(Duration),
}

/// `command` must be given without its terminator.
pub fn command(command: &str, reply: impl Into<Vec<u8>>) -> Step {
    let mut expect = command.as_bytes().to_vec();
    expect.push(b'\r');
    Step::Command {
        expect,
        reply: reply.into(),
    }
}

pub fn emit(bytes: impl Into<Vec<u8>>) -> Step {
    Step::Emit(bytes.into())
}

/// A response line with its framing.
pub fn line(body: &str) -> Vec<u8> {
    format!("\r\n{}\r\n", body).into_bytes()
}

/// Several response lines.
pub fn lines(bodies: &[&str]) -> Vec<u8> {
    bodies.iter().flat_map(|body| line(body)).collect()
}

pub fn ok() -> Vec<u8> {
    line("OK")
}

pub fn error() -> Vec<u8> {
    line("ERROR")
}

/// The device side of the script.
pub struct Device {
    received: Arc<Mutex<Vec<u8>>>,
    completed: Arc<AtomicUsize>,
    total: usize,
    task: JoinHandle<Result<(), String>>,
}

impl Device {
    /// Everything the host has written so far.
    pub fn written(&self) -> Vec<u8> {
        self.received.lock().expect("lock").clone()
    }

    pub fn written_text(&self) -> String {
        String::from_utf8_lossy(&self.written()).into_owned()
    }

    /// Number of times `needle` appears in what the host wrote.
    pub fn count(&self, needle: &str) -> usize {
        self.written_text().matches(needle).count()
    }

    pub fn steps_completed(&self) -> usize {
        self.completed.load(Ordering::SeqCst)
    }

    pub fn assert_script_complete(&self) {
        assert_eq!(
            self.steps_completed(),
            self.total,
            "device script stopped early; host wrote {:?}",
            self.written_text()
        );
    }

    /// Fails if the host wrote something the script did not expect.
    pub async fn check(self) {
        self.task.abort();
        if let Ok(Err(message)) = self.task.await {
            panic!("{}", message);
        }
    }
}

/// Spawn a device running `steps`. Returns the host end of the UART.
pub fn spawn_device(steps: Vec<Step>) -> (DuplexStream, Device) {
    let (host, mut device) = tokio::io::duplex(8192);
    let received = Arc::new(Mutex::new(Vec::new()));
    let completed = Arc::new(AtomicUsize::new(0));
    let total = steps.len();

    let task = {
        let received = Arc::clone(&received);
        let completed = Arc::clone(&completed);
        tokio::spawn(async move {
            for step in steps {
                match step {
                    Step::Command { expect, reply } => {
                        let mut got = Vec::new();
                        loop {
                            let byte = device
                                .read_u8()
                                .await
                                .map_err(|e| format!("host hung up waiting for {:?}: {}", lossy(&expect), e))?;
                            received.lock().expect("lock").push(byte);
                            got.push(byte);
                            if byte == b'\r' {
                                break;
                            }
                        }
                        if got != expect {
                            return Err(format!("expected {:?}, host wrote {:?}", lossy(&expect), lossy(&got)));
                        }
                        device.write_all(&reply).await.map_err(|e| e.to_string())?;
                    }
                    Step::Payload { len, reply } => {
                        let mut payload = vec![0u8; len];
                        device.read_exact(&mut payload).await.map_err(|e| e.to_string())?;
                        received.lock().expect("lock").extend_from_slice(&payload);
                        device.write_all(&reply).await.map_err(|e| e.to_string())?;
                    }
                    Step::Emit(bytes) => {
                        device.write_all(&bytes).await.map_err(|e| e.to_string())?;
                    }
                    Step::Delay(duration) => tokio::time::sleep(duration).await,
                }
                completed.fetch_add(1, Ordering::SeqCst);
            }
            // Keep recording whatever the host writes after the script ends.
            let mut buf = [0u8; 256];
            loop {
                match device.read(&mut buf).await {
                    Ok(0) | Err(_) => break,
                    Ok(n) => received.lock().expect("lock").extend_from_slice(&buf[..n]),
                }
            }
            Ok(())
        })
    };

    (
        host,
        Device {
            received,
            completed,
            total,
            task,
        },
    )
}

fn lossy(bytes: &[u8]) -> String {
    String::from_utf8_lossy(bytes).into_owned()
}

// ============================================================================
// Control lines
// ============================================================================

/// An output that records every level it is driven to.
#[derive(Debug, Clone, Default)]
pub struct RecordingLine {
    history: Arc<Mutex<Vec<bool>>>,
}

impl RecordingLine {
    pub fn history(&self) -> Vec<bool> {
        self.history.lock().expect("lock").clone()
    }
}

impl OutputLine for RecordingLine {
    fn set_level(&mut self, high: bool) -> Result<(), LineError> {
        self.history.lock().expect("lock").push(high);
        Ok(())
    }
}

/// An input that plays back a sequence of levels, repeating the last one.
#[derive(Debug, Clone)]
pub struct SequenceInput {
    levels: Arc<Mutex<VecDeque<bool>>>,
}

impl SequenceInput {
    pub fn new(levels: &[bool]) -> Self {
        SequenceInput {
            levels: Arc::new(Mutex::new(levels.iter().copied().collect())),
        }
    }
}

impl InputLine for SequenceInput {
    fn is_high(&mut self) -> Result<bool, LineError> {
        let mut levels = self.levels.lock().expect("lock");
        let level = levels.front().copied().unwrap_or(false);
        if levels.len() > 1 {
            levels.pop_front();
        }
        Ok(level)
    }
}

/// Lines a test can inspect afterwards.
pub struct TestLines {
    pub reset: RecordingLine,
    pub power_key: RecordingLine,
    pub module_power: LatchedLine,
}

/// Control lines with the status input reading `status`.
pub fn control_lines(status: impl InputLine + 'static) -> (ControlLines, TestLines) {
    let test = TestLines {
        reset: RecordingLine::default(),
        power_key: RecordingLine::default(),
        module_power: LatchedLine::new("module_power"),
    };
    let mut lines = ControlLines::latched(false);
    lines.reset = Box::new(test.reset.clone());
    lines.power_key = Box::new(test.power_key.clone());
    lines.module_power = Box::new(test.module_power.clone());
    lines.status = Box::new(status);
    (lines, test)
}

/// A modem on a scripted device whose status line reads "not busy", so
/// boots take the reset path.
pub fn scripted_modem(steps: Vec<Step>) -> (Modem<DuplexStream>, Device, TestLines) {
    let (host, device) = spawn_device(steps);
    let (lines, test) = control_lines(StaticInput::new(false));
    (Modem::new(host, lines, ModemConfig::default()), device, test)
}

/// The device side of a successful boot through the reset path.
pub fn boot_script() -> Vec<Step> {
    vec![
        Step::Delay(Duration::from_millis(250)),
        emit(line("RDY")),
        command("ATE0", ok()),
        command("AT+QURCCFG=\"urcport\",\"uart1\"", ok()),
        command("AT+QSCLK=1", ok()),
        command("AT+CPIN?", lines(&["+CPIN: READY", "OK"])),
    ]
}

/// The device side of opening `connect_id` with nothing else live.
pub fn open_script(connect_id: u8, host: &str, port: u16) -> Vec<Step> {
    vec![
        command("AT+QISTATE?", ok()),
        command(
            &format!("AT+QIOPEN=1,{},\"TCP\",\"{}\",{},0,0", connect_id, host, port),
            [ok(), line(&format!("+QIOPEN: {},0", connect_id))].concat(),
        ),
    ]
}

pub const TIMEOUT: Duration = Duration::from_secs(5);
