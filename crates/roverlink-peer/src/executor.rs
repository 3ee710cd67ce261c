//! Robot-side endpoint servers.
//!
//! One listener per channel, each serving a single peer at a time. Records
//! are parsed into [`RobotCommand`]s and dispatched to a [`HardwareDriver`];
//! pings are echoed and channel B additionally streams `ir` and `power`
//! telemetry.

use std::io::ErrorKind;
use std::net::{SocketAddr, TcpListener, TcpStream};
use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use roverlink_config::Config;
use roverlink_wire::{
    is_timeout, names, ChannelId, CommandRecord, Delimiter, RecordConfig, RecordReader,
    RecordWriter, WireError,
};
use tracing::{debug, info, warn};

use crate::command::{RobotCommand, MAX_GEAR};
use crate::driver::{HardwareDriver, Motor};
use crate::error::{PeerError, Result};

/// Accept poll and read timeout granularity.
pub const DEFAULT_TICK: Duration = Duration::from_millis(100);

const WRITE_TIMEOUT: Duration = Duration::from_secs(2);

/// Arm motor speed used by `arm_open` / `arm_close`.
pub const ARM_GRIP_SPEED: f64 = 50.0;

/// Why [`ExecutorServer::run`] returned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    /// The caller raised the stop flag.
    Interrupted,
    /// A `shutdown` command powered the driver down.
    Shutdown,
    /// An `update` command asked the supervisor to update and restart us.
    Update,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Directive {
    Restart,
    Stop(StopReason),
}

/// Listen addresses and pacing for both endpoints.
#[derive(Debug, Clone, PartialEq)]
pub struct ExecutorOptions {
    pub addr_a: SocketAddr,
    pub addr_b: SocketAddr,
    pub delimiter: Delimiter,
    pub telemetry_interval: Duration,
    pub quiet: bool,
    pub tick: Duration,
}

impl ExecutorOptions {
    pub fn from_config(config: &Config) -> Result<Self> {
        Ok(Self {
            addr_a: config.executor_addr(config.robot.channel_a_port)?,
            addr_b: config.executor_addr(config.robot.channel_b_port)?,
            delimiter: config.link.delimiter,
            telemetry_interval: config.executor.telemetry_interval,
            quiet: config.executor.quiet,
            tick: DEFAULT_TICK,
        })
    }

    fn addr(&self, channel: ChannelId) -> SocketAddr {
        match channel {
            ChannelId::A => self.addr_a,
            ChannelId::B => self.addr_b,
        }
    }
}

/// Both endpoint listeners plus the driver they share.
pub struct ExecutorServer<D> {
    listeners: [TcpListener; 2],
    options: ExecutorOptions,
    driver: Mutex<D>,
    gear: AtomicU8,
    halt: AtomicBool,
    directive: Mutex<Option<Directive>>,
}

impl<D: HardwareDriver> ExecutorServer<D> {
    /// Bind both endpoints. Nothing is accepted until [`ExecutorServer::run`].
    pub fn bind(options: ExecutorOptions, driver: D) -> Result<Self> {
        let bind = |channel: ChannelId| -> Result<TcpListener> {
            let addr = options.addr(channel);
            let listener =
                TcpListener::bind(addr).map_err(|source| PeerError::Bind { addr, source })?;
            listener.set_nonblocking(true)?;
            Ok(listener)
        };
        let listeners = [bind(ChannelId::A)?, bind(ChannelId::B)?];

        Ok(Self {
            listeners,
            options,
            driver: Mutex::new(driver),
            gear: AtomicU8::new(MAX_GEAR),
            halt: AtomicBool::new(false),
            directive: Mutex::new(None),
        })
    }

    pub fn local_addr(&self, channel: ChannelId) -> Result<SocketAddr> {
        Ok(self.listeners[channel.index()].local_addr()?)
    }

    pub fn gear(&self) -> u8 {
        self.gear.load(Ordering::Relaxed)
    }

    /// Run `f` with exclusive access to the driver.
    pub fn with_driver<R>(&self, f: impl FnOnce(&mut D) -> R) -> R {
        f(&mut self.lock_driver())
    }

    /// Serve both endpoints until a stop command or until `stop` is raised.
    ///
    /// `restart` drops the current peers and resumes accepting in-process.
    pub fn run(&self, stop: &AtomicBool) -> Result<StopReason> {
        loop {
            self.halt.store(false, Ordering::Release);
            *self.lock_directive() = None;

            let results = std::thread::scope(|scope| {
                ChannelId::ALL
                    .map(|channel| {
                        std::thread::Builder::new()
                            .name(format!("roverlink-endpoint-{channel}"))
                            .spawn_scoped(scope, move || {
                                let result = self.serve_endpoint(channel, stop);
                                if result.is_err() {
                                    self.halt.store(true, Ordering::Release);
                                }
                                result
                            })
                    })
                    .map(|spawned| match spawned {
                        Ok(handle) => handle.join().unwrap_or_else(|_| {
                            Err(PeerError::Io(std::io::Error::other(
                                "endpoint thread panicked",
                            )))
                        }),
                        Err(err) => {
                            self.halt.store(true, Ordering::Release);
                            Err(PeerError::Io(err))
                        }
                    })
            });
            for result in results {
                result?;
            }

            let directive = *self.lock_directive();
            match directive {
                Some(Directive::Restart) => {
                    info!("restarting endpoints");
                    self.gear.store(MAX_GEAR, Ordering::Relaxed);
                }
                Some(Directive::Stop(reason)) => {
                    info!(reason = ?reason, "executor stopped");
                    return Ok(reason);
                }
                None => {
                    info!("executor interrupted");
                    return Ok(StopReason::Interrupted);
                }
            }
        }
    }

    /// Parse and execute one record. Returns the reply to write back, if any.
    pub fn handle(&self, channel: ChannelId, record: &CommandRecord) -> Result<Option<CommandRecord>> {
        let command = RobotCommand::try_from(record)?;
        if !self.options.quiet {
            info!(channel = %channel, command = record.name(), value = record.value(), "command received");
        }

        match command {
            RobotCommand::Ping(_) => return Ok(Some(record.clone())),
            RobotCommand::Speak(text) => self.lock_driver().speak(&text)?,
            RobotCommand::Led(color) => self.lock_driver().set_led_color(color)?,
            RobotCommand::Xy { x, y } => {
                let left = ((y + x) * 10.0).clamp(-100.0, 100.0);
                let right = ((y - x) * 10.0).clamp(-100.0, 100.0);
                self.drive(left, right)?;
            }
            RobotCommand::Drive { left, right } => {
                self.drive(left.clamp(-100.0, 100.0), right.clamp(-100.0, 100.0))?;
            }
            RobotCommand::Arm(speed) => self
                .lock_driver()
                .set_motor_speed(Motor::Arm, speed.clamp(-100.0, 100.0))?,
            RobotCommand::ArmOpen => self
                .lock_driver()
                .set_motor_speed(Motor::Arm, ARM_GRIP_SPEED)?,
            RobotCommand::ArmClose => self
                .lock_driver()
                .set_motor_speed(Motor::Arm, -ARM_GRIP_SPEED)?,
            RobotCommand::Gear(gear) => {
                self.gear.store(gear, Ordering::Relaxed);
                debug!(gear, "gear changed");
            }
            RobotCommand::Restart => self.direct(Directive::Restart),
            RobotCommand::Update => self.direct(Directive::Stop(StopReason::Update)),
            RobotCommand::Shutdown => {
                self.lock_driver().shutdown()?;
                self.direct(Directive::Stop(StopReason::Shutdown));
            }
            RobotCommand::Legacy { name, value } => {
                info!(command = %name, value = %value, "legacy motor command ignored");
            }
            RobotCommand::Unknown { name, value } => {
                warn!(command = %name, value = %value, "unknown command");
            }
        }
        Ok(None)
    }

    fn drive(&self, left: f64, right: f64) -> Result<()> {
        let scale = f64::from(self.gear()) / f64::from(MAX_GEAR);
        let mut driver = self.lock_driver();
        driver.set_motor_speed(Motor::Left, left * scale)?;
        driver.set_motor_speed(Motor::Right, right * scale)?;
        Ok(())
    }

    fn direct(&self, directive: Directive) {
        let mut slot = self.lock_directive();
        if !matches!(*slot, Some(Directive::Stop(_))) {
            *slot = Some(directive);
        }
        self.halt.store(true, Ordering::Release);
    }

    fn should_halt(&self, stop: &AtomicBool) -> bool {
        stop.load(Ordering::Acquire) || self.halt.load(Ordering::Acquire)
    }

    fn serve_endpoint(&self, channel: ChannelId, stop: &AtomicBool) -> Result<()> {
        let listener = &self.listeners[channel.index()];
        info!(channel = %channel, addr = %listener.local_addr()?, "endpoint listening");

        while !self.should_halt(stop) {
            match listener.accept() {
                Ok((stream, peer)) => {
                    info!(channel = %channel, peer = %peer, "peer connected");
                    if let Err(err) = self.serve_peer(channel, stream, stop) {
                        warn!(channel = %channel, error = %err, "peer session failed");
                    }
                    info!(channel = %channel, peer = %peer, "peer disconnected");
                }
                Err(err) if err.kind() == ErrorKind::WouldBlock => {
                    std::thread::sleep(self.options.tick);
                }
                Err(err) if err.kind() == ErrorKind::Interrupted => continue,
                Err(err) => return Err(err.into()),
            }
        }
        Ok(())
    }

    fn serve_peer(&self, channel: ChannelId, stream: TcpStream, stop: &AtomicBool) -> Result<()> {
        stream.set_nonblocking(false)?;
        stream.set_nodelay(true)?;

        let config = RecordConfig {
            delimiter: self.options.delimiter,
            read_timeout: Some(self.options.tick.min(self.options.telemetry_interval)),
            write_timeout: Some(WRITE_TIMEOUT),
            ..RecordConfig::default()
        };
        let mut writer = RecordWriter::with_config_tcp(stream.try_clone()?, config.clone())?;
        let mut reader = RecordReader::with_config_tcp(stream, config, channel.into())?;
        let mut next_telemetry = Instant::now();

        while !self.should_halt(stop) {
            if channel == ChannelId::B && Instant::now() >= next_telemetry {
                self.send_telemetry(&mut writer)?;
                next_telemetry = Instant::now() + self.options.telemetry_interval;
            }

            match reader.read_record() {
                Ok(record) => match self.handle(channel, &record) {
                    Ok(Some(reply)) => writer.send(&reply)?,
                    Ok(None) => {}
                    Err(err) => {
                        warn!(channel = %channel, record = %record, error = %err, "command dropped");
                    }
                },
                Err(err) if is_timeout(&err) => continue,
                Err(WireError::ConnectionClosed) => return Ok(()),
                Err(WireError::Malformed { raw, .. }) if raw.trim().eq_ignore_ascii_case("quit") => {
                    info!(channel = %channel, "peer asked to disconnect");
                    return Ok(());
                }
                Err(
                    err @ (WireError::Malformed { .. }
                    | WireError::RecordTooLong { .. }
                    | WireError::EmptyName
                    | WireError::ReservedCharacter { .. }),
                ) => {
                    debug!(channel = %channel, error = %err, "dropped malformed record");
                }
                Err(err) => return Err(err.into()),
            }
        }
        Ok(())
    }

    fn send_telemetry<W: std::io::Write>(&self, writer: &mut RecordWriter<W>) -> Result<()> {
        let readings = {
            let mut driver = self.lock_driver();
            driver
                .read_distance()
                .and_then(|distance| Ok((distance, driver.read_voltage()?)))
        };
        let (distance, voltage) = match readings {
            Ok(readings) => readings,
            Err(err) => {
                warn!(error = %err, "telemetry read failed");
                return Ok(());
            }
        };

        let destination = ChannelId::B.into();
        let ir = CommandRecord::new(names::IR, format!("{distance:.0}"), destination)?;
        let power = CommandRecord::new(names::POWER, format!("{voltage:.2}"), destination)?;
        writer.send_all([&ir, &power])?;
        Ok(())
    }

    fn lock_driver(&self) -> MutexGuard<'_, D> {
        self.driver.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn lock_directive(&self) -> MutexGuard<'_, Option<Directive>> {
        self.directive.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
