use roverlink_wire::{names, CommandRecord, Destination};

use crate::driver::LedColor;
use crate::error::PeerError;

/// Highest gear; gear `n` runs the drive motors at `n / MAX_GEAR` of the
/// requested speed.
pub const MAX_GEAR: u8 = 10;

/// Everything the executor understands, parsed from a record.
#[derive(Debug, Clone, PartialEq)]
pub enum RobotCommand {
    Speak(String),
    Led(LedColor),
    Restart,
    Update,
    Shutdown,
    /// Joystick deltas, each in -10..=10.
    Xy { x: f64, y: f64 },
    /// Signed arm motor speed.
    Arm(f64),
    /// Clamped to `1..=MAX_GEAR`.
    Gear(u8),
    ArmOpen,
    ArmClose,
    /// Direct left/right motor percentages.
    Drive { left: f64, right: f64 },
    /// Opaque liveness marker, echoed back verbatim.
    Ping(String),
    /// Pre-`drive` motor commands, accepted and logged only.
    Legacy { name: String, value: String },
    Unknown { name: String, value: String },
}

impl RobotCommand {
    /// Channel this command belongs on.
    pub fn destination(&self) -> Destination {
        match self {
            RobotCommand::Led(_)
            | RobotCommand::Arm(_)
            | RobotCommand::ArmOpen
            | RobotCommand::ArmClose => Destination::ChannelA,
            RobotCommand::Unknown { .. } => Destination::Any,
            _ => Destination::ChannelB,
        }
    }

    pub fn name(&self) -> &str {
        match self {
            RobotCommand::Speak(_) => names::SPEAK,
            RobotCommand::Led(_) => names::LED,
            RobotCommand::Restart => names::RESTART,
            RobotCommand::Update => names::UPDATE,
            RobotCommand::Shutdown => names::SHUTDOWN,
            RobotCommand::Xy { .. } => names::XY,
            RobotCommand::Arm(_) => names::ARM,
            RobotCommand::Gear(_) => names::GEAR,
            RobotCommand::ArmOpen => names::ARM_OPEN,
            RobotCommand::ArmClose => names::ARM_CLOSE,
            RobotCommand::Drive { .. } => names::DRIVE,
            RobotCommand::Ping(_) => names::PING,
            RobotCommand::Legacy { name, .. } | RobotCommand::Unknown { name, .. } => name,
        }
    }

    pub fn value(&self) -> String {
        match self {
            RobotCommand::Speak(text) | RobotCommand::Ping(text) => text.clone(),
            RobotCommand::Led(color) => color.to_string(),
            RobotCommand::Xy { x, y } => format!("{x:.1},{y:.1}"),
            RobotCommand::Arm(speed) => format!("{speed}"),
            RobotCommand::Gear(gear) => gear.to_string(),
            RobotCommand::Drive { left, right } => format!("{left},{right}"),
            RobotCommand::Legacy { value, .. } | RobotCommand::Unknown { value, .. } => {
                value.clone()
            }
            RobotCommand::Restart
            | RobotCommand::Update
            | RobotCommand::Shutdown
            | RobotCommand::ArmOpen
            | RobotCommand::ArmClose => "1".to_string(),
        }
    }

    /// Record carrying this command on its natural channel.
    pub fn to_record(&self) -> crate::Result<CommandRecord> {
        Ok(CommandRecord::new(
            self.name(),
            self.value(),
            self.destination(),
        )?)
    }
}

impl TryFrom<&CommandRecord> for RobotCommand {
    type Error = PeerError;

    fn try_from(record: &CommandRecord) -> Result<Self, Self::Error> {
        let value = record.value().trim();
        let invalid = |reason: String| PeerError::InvalidCommand {
            name: record.name().to_string(),
            value: record.value().to_string(),
            reason,
        };

        let command = match record.name().trim() {
            names::SPEAK => RobotCommand::Speak(value.to_string()),
            names::LED => RobotCommand::Led(value.parse().map_err(invalid)?),
            names::RESTART => RobotCommand::Restart,
            names::UPDATE => RobotCommand::Update,
            names::SHUTDOWN => RobotCommand::Shutdown,
            names::XY => {
                let (x, y) = parse_pair(value).map_err(invalid)?;
                RobotCommand::Xy { x, y }
            }
            names::ARM => RobotCommand::Arm(parse_float(value).map_err(invalid)?),
            names::GEAR => {
                let gear: i64 = value
                    .parse()
                    .map_err(|_| invalid(format!("expected an integer gear, got {value:?}")))?;
                RobotCommand::Gear(gear.clamp(1, i64::from(MAX_GEAR)) as u8)
            }
            names::ARM_OPEN => RobotCommand::ArmOpen,
            names::ARM_CLOSE => RobotCommand::ArmClose,
            names::DRIVE => {
                let (left, right) = parse_pair(value).map_err(invalid)?;
                RobotCommand::Drive { left, right }
            }
            names::PING => RobotCommand::Ping(record.value().to_string()),
            name @ (names::MOTOR_A | names::MOTOR_B | names::SMALL_MOTOR) => {
                RobotCommand::Legacy {
                    name: name.to_string(),
                    value: value.to_string(),
                }
            }
            name => RobotCommand::Unknown {
                name: name.to_string(),
                value: value.to_string(),
            },
        };
        Ok(command)
    }
}

fn parse_float(text: &str) -> Result<f64, String> {
    match text.trim().parse::<f64>() {
        Ok(v) if v.is_finite() => Ok(v),
        _ => Err(format!("expected a number, got {text:?}")),
    }
}

fn parse_pair(text: &str) -> Result<(f64, f64), String> {
    let (a, b) = text
        .split_once(',')
        .ok_or_else(|| format!("expected \"a,b\", got {text:?}"))?;
    Ok((parse_float(a)?, parse_float(b)?))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(name: &str, value: &str) -> crate::Result<RobotCommand> {
        let record = CommandRecord::new(name, value, Destination::ChannelB).unwrap();
        RobotCommand::try_from(&record)
    }

    #[test]
    fn parses_known_commands() {
        assert_eq!(parse("speak", "hello").unwrap(), RobotCommand::Speak("hello".into()));
        assert_eq!(parse("led", "green").unwrap(), RobotCommand::Led(LedColor::Green));
        assert_eq!(
            parse("xy", "1.0,-0.5").unwrap(),
            RobotCommand::Xy { x: 1.0, y: -0.5 }
        );
        assert_eq!(parse("arm", "-3.5").unwrap(), RobotCommand::Arm(-3.5));
        assert_eq!(
            parse("drive", "40,-40").unwrap(),
            RobotCommand::Drive {
                left: 40.0,
                right: -40.0
            }
        );
        assert_eq!(parse("arm_open", "").unwrap(), RobotCommand::ArmOpen);
        assert_eq!(parse("shutdown", "now").unwrap(), RobotCommand::Shutdown);
        assert_eq!(parse("ping", "ok").unwrap(), RobotCommand::Ping("ok".into()));
    }

    #[test]
    fn gear_is_clamped() {
        assert_eq!(parse("gear", "9").unwrap(), RobotCommand::Gear(9));
        assert_eq!(parse("gear", "0").unwrap(), RobotCommand::Gear(1));
        assert_eq!(parse("gear", "42").unwrap(), RobotCommand::Gear(MAX_GEAR));
        assert!(matches!(
            parse("gear", "fast"),
            Err(PeerError::InvalidCommand { .. })
        ));
    }

    #[test]
    fn bad_values_are_invalid_commands() {
        for (name, value) in [("led", "blue"), ("xy", "1.0"), ("xy", "a,b"), ("arm", "inf")] {
            assert!(
                matches!(parse(name, value), Err(PeerError::InvalidCommand { .. })),
                "{name}:{value} should be rejected"
            );
        }
    }

    #[test]
    fn legacy_and_unknown_names() {
        assert_eq!(
            parse("motorA", "50").unwrap(),
            RobotCommand::Legacy {
                name: "motorA".into(),
                value: "50".into()
            }
        );
        assert_eq!(
            parse("laser", "on").unwrap(),
            RobotCommand::Unknown {
                name: "laser".into(),
                value: "on".into()
            }
        );
    }

    #[test]
    fn records_use_natural_channel() {
        let led = RobotCommand::Led(LedColor::Red).to_record().unwrap();
        assert_eq!(led.to_string(), "led:red");
        assert_eq!(led.destination(), Destination::ChannelA);

        let xy = RobotCommand::Xy { x: 1.0, y: 0.0 }.to_record().unwrap();
        assert_eq!(xy.to_string(), "xy:1.0,0.0");
        assert_eq!(xy.destination(), Destination::ChannelB);
    }
}
