//! Durations written as seconds in TOML, fractions allowed (`0.5`, `5`).

use std::time::Duration;

use serde::de::{self, Deserializer, Unexpected, Visitor};

pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
where
    D: Deserializer<'de>,
{
    deserializer.deserialize_any(SecondsVisitor)
}

struct SecondsVisitor;

impl Visitor<'_> for SecondsVisitor {
    type Value = Duration;

    fn expecting(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("a non-negative number of seconds")
    }

    fn visit_u64<E: de::Error>(self, secs: u64) -> Result<Duration, E> {
        Ok(Duration::from_secs(secs))
    }

    fn visit_i64<E: de::Error>(self, secs: i64) -> Result<Duration, E> {
        u64::try_from(secs)
            .map(Duration::from_secs)
            .map_err(|_| E::invalid_value(Unexpected::Signed(secs), &self))
    }

    fn visit_f64<E: de::Error>(self, secs: f64) -> Result<Duration, E> {
        Duration::try_from_secs_f64(secs).map_err(|_| E::invalid_value(Unexpected::Float(secs), &self))
    }
}

#[cfg(test)]
mod tests {
    use serde::Deserialize;

    use super::*;

    #[derive(Deserialize)]
    struct Wrapper {
        #[serde(with = "crate::duration")]
        value: Duration,
    }

    fn parse(src: &str) -> Result<Duration, toml::de::Error> {
        toml::from_str::<Wrapper>(src).map(|w| w.value)
    }

    #[test]
    fn integers_and_fractions() {
        assert_eq!(parse("value = 5").unwrap(), Duration::from_secs(5));
        assert_eq!(parse("value = 0.25").unwrap(), Duration::from_millis(250));
    }

    #[test]
    fn negative_is_rejected() {
        assert!(parse("value = -1").is_err());
        assert!(parse("value = -0.5").is_err());
    }
}
