use std::io::{ErrorKind, Read, Write};
use std::os::fd::AsFd;
use tracing::{debug, info, trace, warn};
use zbus_bus::{AlertSource, BusError, BusTransactor, I2cBus};
use zbus_frame::{Command, CommandReader, CommandWriter, FrameError, ReadOutcome};

use crate::error::{GatewayError, Result};
use crate::shutdown::ShutdownSignal;
use crate::wait::{set_nonblocking, wait_ready};

/// What the loop is doing right now.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopState {
    /// Blocked waiting on the command stream and the alert line.
    Idle,
    /// Draining and executing supervisor commands.
    DispatchingCommands,
    /// Running one poll transaction after an asserted alert.
    PollingBus,
}

/// Why the loop stopped without an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitReason {
    /// The supervisor closed the command stream.
    EndOfInput,
    /// A termination signal was received.
    Shutdown,
}

/// Outcome of one loop iteration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    Continue,
    Exit(ExitReason),
}

/// Bridges a supervisor command stream to the bus.
///
/// `R` carries commands in, `W` carries events out, `A` is the alert line and
/// `B` the bus. Everything runs on the calling thread; the only blocking
/// point is the wait at the top of [`Gateway::step`].
pub struct Gateway<R, W, A, B> {
    reader: CommandReader<R>,
    writer: CommandWriter<W>,
    alert: A,
    transactor: BusTransactor<B>,
    state: LoopState,
    greeting: Option<String>,
    shutdown: Option<ShutdownSignal>,
}

#[cfg(target_os = "linux")]
impl Gateway<std::fs::File, std::fs::File, zbus_bus::AlertMonitor, zbus_bus::I2cDevice> {
    /// Open the alert line and the adapter named by `config`, then wrap the
    /// given command and event streams.
    pub fn open(
        config: &crate::GatewayConfig,
        input: std::fs::File,
        output: std::fs::File,
    ) -> Result<Self> {
        let alert = zbus_bus::AlertMonitor::open_in(&config.gpio_base, config.gpio_pin)?
            .with_active_low(config.alert_active_low);
        let bus = zbus_bus::I2cDevice::open(&config.i2c_path)?;

        let mut gateway = Self::new(input, output, alert, BusTransactor::new(bus))?;
        gateway.greeting = config.greeting.clone();
        Ok(gateway)
    }
}

impl<R, W, A, B> Gateway<R, W, A, B>
where
    R: Read + AsFd,
    W: Write,
    A: AlertSource,
    B: I2cBus,
{
    /// Wrap already-open endpoints. The command stream is switched to
    /// non-blocking mode so a drain never stalls the alert path.
    pub fn new(input: R, output: W, alert: A, transactor: BusTransactor<B>) -> Result<Self> {
        set_nonblocking(input.as_fd()).map_err(FrameError::Io)?;
        Ok(Self {
            reader: CommandReader::new(input),
            writer: CommandWriter::new(output),
            alert,
            transactor,
            state: LoopState::Idle,
            greeting: None,
            shutdown: None,
        })
    }

    /// Announce `ZBUS <version>` when [`Gateway::run`] starts.
    pub fn with_greeting(mut self, version: impl Into<String>) -> Self {
        self.greeting = Some(version.into());
        self
    }

    /// Stop the loop once `signal` is triggered. The wait also watches the
    /// signal's wake descriptor, so a trigger from another thread ends it.
    pub fn with_shutdown(mut self, signal: ShutdownSignal) -> Self {
        self.shutdown = Some(signal);
        self
    }

    /// Run until end of input, shutdown, or a fatal error.
    pub fn run(&mut self) -> Result<ExitReason> {
        if let Some(version) = &self.greeting {
            self.writer.write_greeting(version)?;
        }
        info!("gateway running");

        loop {
            if let Step::Exit(reason) = self.step()? {
                info!(?reason, "gateway stopped");
                return Ok(reason);
            }
        }
    }

    /// Wait once and handle whatever became ready.
    ///
    /// Commands are drained before the alert is serviced when both are ready.
    pub fn step(&mut self) -> Result<Step> {
        self.state = LoopState::Idle;
        if self.shutdown_requested() {
            return Ok(Step::Exit(ExitReason::Shutdown));
        }

        let ready = match wait_ready(
            self.reader.get_ref().as_fd(),
            self.alert.as_fd(),
            self.alert.interest(),
            self.shutdown.as_ref().map(AsFd::as_fd),
        ) {
            Ok(ready) => ready,
            Err(err) if err.kind() == ErrorKind::Interrupted => {
                if self.shutdown_requested() {
                    return Ok(Step::Exit(ExitReason::Shutdown));
                }
                return Ok(Step::Continue);
            }
            Err(err) => return Err(GatewayError::Wait(err)),
        };

        if ready.wake {
            if let Some(signal) = &self.shutdown {
                signal.drain();
            }
            if self.shutdown_requested() {
                return Ok(Step::Exit(ExitReason::Shutdown));
            }
        }

        if ready.commands {
            if let Some(reason) = self.dispatch_commands()? {
                return Ok(Step::Exit(reason));
            }
        }

        if ready.alert {
            self.poll_bus()?;
        }

        self.state = LoopState::Idle;
        Ok(Step::Continue)
    }

    /// Current loop state; `Idle` between steps.
    pub fn state(&self) -> LoopState {
        self.state
    }

    /// Borrow the event stream.
    pub fn writer(&self) -> &W {
        self.writer.get_ref()
    }

    /// Borrow the alert source.
    pub fn alert(&self) -> &A {
        &self.alert
    }

    /// Borrow the underlying bus.
    pub fn bus(&self) -> &B {
        self.transactor.get_ref()
    }

    fn shutdown_requested(&self) -> bool {
        self.shutdown
            .as_ref()
            .is_some_and(ShutdownSignal::is_triggered)
    }

    fn dispatch_commands(&mut self) -> Result<Option<ExitReason>> {
        self.state = LoopState::DispatchingCommands;
        loop {
            match self.reader.read_command()? {
                ReadOutcome::Command(command) => self.dispatch(command)?,
                ReadOutcome::WouldBlock => {
                    if self.reader.is_mid_command() {
                        warn!("command stream stalled mid-command");
                    } else {
                        trace!("command stream drained");
                    }
                    return Ok(None);
                }
                ReadOutcome::EndOfStream => {
                    info!("command stream closed");
                    return Ok(Some(ExitReason::EndOfInput));
                }
            }
        }
    }

    fn dispatch(&mut self, command: Command) -> Result<()> {
        match command {
            Command::Reset => {
                self.transactor.reset()?;
                self.writer.write_command(&Command::Reset)?;
            }
            Command::SendPacket { addr, packet } => {
                debug!(addr, len = packet.len(), "sending packet");
                if let Err(err) = self.transactor.send(addr, packet.data(), &mut self.writer) {
                    self.report_bus_error(err)?;
                }
            }
            other => {
                debug!(
                    directive = %other.directive(),
                    addr = ?other.addr(),
                    "ignoring event from supervisor"
                );
            }
        }
        Ok(())
    }

    fn poll_bus(&mut self) -> Result<()> {
        self.state = LoopState::PollingBus;

        let level = self.alert.level()?;
        if !level.is_asserted() {
            trace!("alert released");
            return Ok(());
        }

        match self.transactor.poll() {
            Ok(polled) => {
                debug!(addr = polled.addr, len = polled.packet.len(), "packet received");
                self.writer.write_command(&polled.into_command())?;
                Ok(())
            }
            Err(err) => self.report_bus_error(err),
        }
    }

    /// Report a failure tied to a slave as `ERR <addr>`; anything else is fatal.
    fn report_bus_error(&mut self, err: BusError) -> Result<()> {
        match err.slave_addr() {
            Some(addr) => {
                warn!(addr, error = %err, "bus transaction failed");
                self.writer.write_command(&Command::Error { addr })?;
                Ok(())
            }
            None => Err(err.into()),
        }
    }
}

impl<R, W, A, B> std::fmt::Debug for Gateway<R, W, A, B> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Gateway")
            .field("state", &self.state)
            .field("greeting", &self.greeting)
            .finish_non_exhaustive()
    }
}
