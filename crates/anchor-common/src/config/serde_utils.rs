//! Serde helpers for configuration files

/// Durations written as seconds.
///
/// Whole values are written as integers (`interval = 5`); sub-second values
/// keep their fraction (`request_timeout = 0.5`). Either form reads back.
pub mod duration_secs {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        if duration.subsec_nanos() == 0 {
            serializer.serialize_u64(duration.as_secs())
        } else {
            serializer.serialize_f64(duration.as_secs_f64())
        }
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Seconds {
            Whole(u64),
            Fraction(f64),
        }

        match Seconds::deserialize(deserializer)? {
            Seconds::Whole(secs) => Ok(Duration::from_secs(secs)),
            Seconds::Fraction(secs) => Duration::try_from_secs_f64(secs)
                .map_err(|_| serde::de::Error::custom(format!("invalid duration: {}", secs))),
        }
    }
}
