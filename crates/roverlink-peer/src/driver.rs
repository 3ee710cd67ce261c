//! Hardware seam for the executor.
//!
//! The executor translates records into calls on a [`HardwareDriver`]; the
//! transport never touches hardware. [`SimulatedDriver`] stands in for a real
//! brick and records what it was asked to do.

use std::fmt;
use std::str::FromStr;

use serde::Serialize;
use tracing::info;

use crate::error::DriverError;

/// Driver call outcome.
pub type DriverResult<T> = std::result::Result<T, DriverError>;

/// Motors the executor drives.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Motor {
    Left,
    Right,
    Arm,
}

impl Motor {
    pub const ALL: [Motor; 3] = [Motor::Left, Motor::Right, Motor::Arm];

    fn index(self) -> usize {
        match self {
            Motor::Left => 0,
            Motor::Right => 1,
            Motor::Arm => 2,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Motor::Left => "left",
            Motor::Right => "right",
            Motor::Arm => "arm",
        }
    }
}

impl fmt::Display for Motor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Status LED colours.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LedColor {
    Green,
    Red,
    Orange,
    Yellow,
}

impl LedColor {
    pub fn as_str(self) -> &'static str {
        match self {
            LedColor::Green => "green",
            LedColor::Red => "red",
            LedColor::Orange => "orange",
            LedColor::Yellow => "yellow",
        }
    }
}

impl fmt::Display for LedColor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for LedColor {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "green" => Ok(LedColor::Green),
            "red" => Ok(LedColor::Red),
            "orange" => Ok(LedColor::Orange),
            "yellow" => Ok(LedColor::Yellow),
            other => Err(format!(
                "unknown colour {other:?} (expected green, red, orange or yellow)"
            )),
        }
    }
}

/// Robot hardware as seen by the executor.
pub trait HardwareDriver: Send {
    /// Set `motor` to `percent` of full speed, -100..=100.
    fn set_motor_speed(&mut self, motor: Motor, percent: f64) -> DriverResult<()>;

    fn set_led_color(&mut self, color: LedColor) -> DriverResult<()>;

    fn speak(&mut self, text: &str) -> DriverResult<()>;

    /// Distance to the nearest obstacle, centimetres.
    fn read_distance(&mut self) -> DriverResult<f64>;

    /// Battery voltage.
    fn read_voltage(&mut self) -> DriverResult<f64>;

    /// Stop all motors and power down.
    fn shutdown(&mut self) -> DriverResult<()>;
}

/// In-memory driver that logs every call.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SimulatedDriver {
    speeds: [f64; 3],
    led: Option<LedColor>,
    spoken: Vec<String>,
    distance_cm: f64,
    voltage: f64,
    shut_down: bool,
}

impl Default for SimulatedDriver {
    fn default() -> Self {
        Self {
            speeds: [0.0; 3],
            led: None,
            spoken: Vec::new(),
            distance_cm: 100.0,
            voltage: 8.0,
            shut_down: false,
        }
    }
}

impl SimulatedDriver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Values the sensors report until changed.
    pub fn with_sensors(mut self, distance_cm: f64, voltage: f64) -> Self {
        self.distance_cm = distance_cm;
        self.voltage = voltage;
        self
    }

    pub fn set_distance(&mut self, distance_cm: f64) {
        self.distance_cm = distance_cm;
    }

    pub fn set_voltage(&mut self, voltage: f64) {
        self.voltage = voltage;
    }

    pub fn speed(&self, motor: Motor) -> f64 {
        self.speeds[motor.index()]
    }

    pub fn led(&self) -> Option<LedColor> {
        self.led
    }

    pub fn spoken(&self) -> &[String] {
        &self.spoken
    }

    pub fn is_shut_down(&self) -> bool {
        self.shut_down
    }

    fn ensure_running(&self) -> DriverResult<()> {
        if self.shut_down {
            return Err(DriverError::Unavailable("driver is shut down".to_string()));
        }
        Ok(())
    }
}

impl HardwareDriver for SimulatedDriver {
    fn set_motor_speed(&mut self, motor: Motor, percent: f64) -> DriverResult<()> {
        self.ensure_running()?;
        if !percent.is_finite() || !(-100.0..=100.0).contains(&percent) {
            return Err(DriverError::OutOfRange {
                what: "motor speed",
                value: percent,
            });
        }
        self.speeds[motor.index()] = percent;
        info!(motor = %motor, percent, "motor speed set");
        Ok(())
    }

    fn set_led_color(&mut self, color: LedColor) -> DriverResult<()> {
        self.ensure_running()?;
        self.led = Some(color);
        info!(color = %color, "led set");
        Ok(())
    }

    fn speak(&mut self, text: &str) -> DriverResult<()> {
        self.ensure_running()?;
        info!(text, "speaking");
        self.spoken.push(text.to_string());
        Ok(())
    }

    fn read_distance(&mut self) -> DriverResult<f64> {
        self.ensure_running()?;
        Ok(self.distance_cm)
    }

    fn read_voltage(&mut self) -> DriverResult<f64> {
        self.ensure_running()?;
        Ok(self.voltage)
    }

    fn shutdown(&mut self) -> DriverResult<()> {
        self.speeds = [0.0; 3];
        self.shut_down = true;
        info!("driver shut down");
        Ok(())
    }
}
