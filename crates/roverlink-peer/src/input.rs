//! Operator input: anything that turns into outbound records once per
//! control cycle.

use std::io::BufRead;
use std::sync::mpsc::{self, Receiver, TryRecvError};
use std::time::{Duration, Instant};

use roverlink_wire::{names, CommandRecord, Destination, SEPARATOR};
use tracing::{debug, warn};

use crate::error::{PeerError, Result};

/// Phrase sent when the joystick speak button is pressed.
pub const SPEAK_PHRASE: &str = "Hello. I am robot.";

/// Raw axis magnitudes below this (after scaling to -10..=10) count as zero.
pub const AXIS_DEAD_ZONE: f64 = 2.0;

/// Source of operator commands for the control loop.
pub trait InputSource {
    /// Records produced since the previous call, oldest first. Never blocks.
    fn poll(&mut self, now: Instant) -> Vec<CommandRecord>;

    /// True once the source will never produce another record.
    fn is_exhausted(&self) -> bool {
        false
    }
}

/// Scale a raw axis value (-1..=1) to -10..=10 in 0.1 steps, with dead-zone.
pub fn quantize_axis(raw: f64) -> f64 {
    if !raw.is_finite() {
        return 0.0;
    }
    let value = (raw.clamp(-1.0, 1.0) * 100.0).trunc() / 10.0;
    if value.abs() < AXIS_DEAD_ZONE {
        0.0
    } else {
        value
    }
}

/// Joystick-style axis state; emits `xy` only when the quantised position
/// changes.
#[derive(Debug, Clone, Default)]
pub struct AxisInput {
    last: (f64, f64),
    speak_held: bool,
}

impl AxisInput {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed one sample of raw axes and the speak button.
    pub fn sample(&mut self, x: f64, y: f64, speak: bool) -> Vec<CommandRecord> {
        let mut out = Vec::new();
        let position = (quantize_axis(x), quantize_axis(y));
        if position != self.last {
            self.last = position;
            let value = format!("{:.1},{:.1}", position.0, position.1);
            if let Ok(record) = CommandRecord::new(names::XY, value, Destination::ChannelB) {
                out.push(record);
            }
        }

        if speak && !self.speak_held {
            if let Ok(record) = CommandRecord::new(names::SPEAK, SPEAK_PHRASE, Destination::ChannelB)
            {
                out.push(record);
            }
        }
        self.speak_held = speak;
        out
    }

    /// Last emitted quantised position.
    pub fn position(&self) -> (f64, f64) {
        self.last
    }
}

/// One parsed line of a command script.
#[derive(Debug, Clone, PartialEq)]
pub enum ScriptLine {
    Record(CommandRecord),
    Axis { x: f64, y: f64, speak: bool },
    Sleep(Duration),
    Blank,
}

/// Parse one script line.
///
/// ```text
/// <a|b|any> <name>[:<value>]
/// axis <x> <y> [speak]
/// sleep <seconds>
/// # comment
/// ```
pub fn parse_script_line(line: &str) -> Result<ScriptLine> {
    let trimmed = line.trim();
    if trimmed.is_empty() || trimmed.starts_with('#') {
        return Ok(ScriptLine::Blank);
    }
    let invalid = |reason: &str| PeerError::InvalidInput {
        line: line.to_string(),
        reason: reason.to_string(),
    };

    let (head, rest) = trimmed
        .split_once(char::is_whitespace)
        .map(|(h, r)| (h, r.trim()))
        .unwrap_or((trimmed, ""));

    let destination = match head.to_ascii_lowercase().as_str() {
        "a" => Destination::ChannelA,
        "b" => Destination::ChannelB,
        "any" => Destination::Any,
        "axis" => {
            let mut parts = rest.split_whitespace();
            let mut axis = || -> Result<f64> {
                parts
                    .next()
                    .and_then(|p| p.parse::<f64>().ok())
                    .ok_or_else(|| invalid("axis needs two numbers"))
            };
            let x = axis()?;
            let y = axis()?;
            let speak = match parts.next() {
                None => false,
                Some("speak") => true,
                Some(_) => return Err(invalid("axis accepts only a trailing \"speak\"")),
            };
            return Ok(ScriptLine::Axis { x, y, speak });
        }
        "sleep" => {
            let secs: f64 = rest
                .parse()
                .map_err(|_| invalid("sleep needs a number of seconds"))?;
            let duration =
                Duration::try_from_secs_f64(secs).map_err(|_| invalid("sleep out of range"))?;
            return Ok(ScriptLine::Sleep(duration));
        }
        _ => return Err(invalid("expected a, b, any, axis or sleep")),
    };

    if rest.is_empty() {
        return Err(invalid("missing command name"));
    }
    let (name, value) = rest.split_once(SEPARATOR).unwrap_or((rest, ""));
    let record = CommandRecord::new(name.trim(), value.trim(), destination)
        .map_err(|err| invalid(&err.to_string()))?;
    Ok(ScriptLine::Record(record))
}

/// Reads a command script on a background thread so the control loop never
/// blocks on input. `sleep` lines pause the reader, not the loop.
#[derive(Debug)]
pub struct ScriptInput {
    rx: Receiver<Result<ScriptLine>>,
    axis: AxisInput,
    exhausted: bool,
    rejected: u64,
}

impl ScriptInput {
    pub fn from_reader<R: BufRead + Send + 'static>(reader: R) -> Result<Self> {
        let (tx, rx) = mpsc::channel();
        std::thread::Builder::new()
            .name("roverlink-script".to_string())
            .spawn(move || {
                for line in reader.lines() {
                    let parsed = match line {
                        Ok(line) => parse_script_line(&line),
                        Err(err) => {
                            warn!(error = %err, "script read failed");
                            break;
                        }
                    };
                    match parsed {
                        Ok(ScriptLine::Sleep(duration)) => std::thread::sleep(duration),
                        Ok(ScriptLine::Blank) => {}
                        other => {
                            if tx.send(other).is_err() {
                                break;
                            }
                        }
                    }
                }
                debug!("script input finished");
            })?;

        Ok(Self {
            rx,
            axis: AxisInput::new(),
            exhausted: false,
            rejected: 0,
        })
    }

    /// Lines that could not be parsed so far.
    pub fn rejected(&self) -> u64 {
        self.rejected
    }
}

impl InputSource for ScriptInput {
    fn poll(&mut self, _now: Instant) -> Vec<CommandRecord> {
        let mut out = Vec::new();
        loop {
            match self.rx.try_recv() {
                Ok(Ok(ScriptLine::Record(record))) => out.push(record),
                Ok(Ok(ScriptLine::Axis { x, y, speak })) => out.extend(self.axis.sample(x, y, speak)),
                Ok(Ok(ScriptLine::Sleep(_) | ScriptLine::Blank)) => {}
                Ok(Err(err)) => {
                    self.rejected += 1;
                    warn!(error = %err, "skipping script line");
                }
                Err(TryRecvError::Empty) => break,
                Err(TryRecvError::Disconnected) => {
                    self.exhausted = true;
                    break;
                }
            }
        }
        out
    }

    fn is_exhausted(&self) -> bool {
        self.exhausted
    }
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use super::*;

    fn poll_until_exhausted(input: &mut ScriptInput) -> Vec<CommandRecord> {
        let deadline = Instant::now() + Duration::from_secs(3);
        let mut records = Vec::new();
        while !input.is_exhausted() {
            assert!(Instant::now() < deadline, "script never finished");
            records.extend(input.poll(Instant::now()));
            std::thread::sleep(Duration::from_millis(5));
        }
        records
    }

    #[test]
    fn quantizes_with_dead_zone() {
        assert_eq!(quantize_axis(0.15), 0.0);
        assert_eq!(quantize_axis(-0.19), 0.0);
        assert_eq!(quantize_axis(0.2), 2.0);
        assert_eq!(quantize_axis(-0.537), -5.3);
        assert_eq!(quantize_axis(1.7), 10.0);
        assert_eq!(quantize_axis(f64::NAN), 0.0);
    }

    #[test]
    fn axis_emits_only_on_change() {
        let mut axis = AxisInput::new();
        assert!(axis.sample(0.05, 0.1, false).is_empty());

        let moved = axis.sample(0.5, -0.3, false);
        assert_eq!(moved.len(), 1);
        assert_eq!(moved[0].to_string(), "xy:5.0,-3.0");
        assert_eq!(moved[0].destination(), Destination::ChannelB);

        assert!(axis.sample(0.505, -0.305, false).is_empty());
        assert_eq!(axis.sample(0.0, 0.0, false)[0].value(), "0.0,0.0");
    }

    #[test]
    fn speak_fires_once_per_press() {
        let mut axis = AxisInput::new();
        let first = axis.sample(0.0, 0.0, true);
        assert_eq!(first.len(), 1);
        assert_eq!(first[0].value(), SPEAK_PHRASE);
        assert!(axis.sample(0.0, 0.0, true).is_empty());
        assert!(axis.sample(0.0, 0.0, false).is_empty());
        assert_eq!(axis.sample(0.0, 0.0, true).len(), 1);
    }

    #[test]
    fn parses_script_lines() {
        assert_eq!(parse_script_line("  ").unwrap(), ScriptLine::Blank);
        assert_eq!(parse_script_line("# drive test").unwrap(), ScriptLine::Blank);

        let ScriptLine::Record(led) = parse_script_line("a led:green").unwrap() else {
            panic!("expected record");
        };
        assert_eq!(led.to_string(), "led:green");
        assert_eq!(led.destination(), Destination::ChannelA);

        let ScriptLine::Record(restart) = parse_script_line("B restart").unwrap() else {
            panic!("expected record");
        };
        assert_eq!(restart.value(), "");
        assert_eq!(restart.destination(), Destination::ChannelB);

        assert_eq!(
            parse_script_line("axis 0.5 -0.2 speak").unwrap(),
            ScriptLine::Axis {
                x: 0.5,
                y: -0.2,
                speak: true
            }
        );
        assert_eq!(
            parse_script_line("sleep 0.25").unwrap(),
            ScriptLine::Sleep(Duration::from_millis(250))
        );
    }

    #[test]
    fn rejects_bad_script_lines() {
        for line in ["c led:red", "a", "a led:red;", "axis 1", "sleep soon", "any :x"] {
            assert!(
                matches!(parse_script_line(line), Err(PeerError::InvalidInput { .. })),
                "{line:?} should be rejected"
            );
        }
    }

    #[test]
    fn script_input_reads_in_background() {
        let script = "a led:red\nbogus line\naxis 0.4 0.0\nsleep 0.01\nany speak:hi\n";
        let mut input = ScriptInput::from_reader(Cursor::new(script.to_string())).unwrap();

        let records = poll_until_exhausted(&mut input);
        let rendered: Vec<String> = records.iter().map(ToString::to_string).collect();
        assert_eq!(rendered, ["led:red", "xy:4.0,0.0", "speak:hi"]);
        assert_eq!(input.rejected(), 1);
    }
}
