//! Shared serialization/deserialization utilities for configuration

/// Helper module for Duration serialization as seconds
///
/// Whole durations are written as an integer number of seconds, others as a
/// float (`0.25`), which stays readable in TOML while allowing sub-second
/// delays. Both forms are accepted when reading, up to
/// [`MAX_DURATION`](crate::config::MAX_DURATION).
///
/// # Example
///
/// ```ignore
/// use std::time::Duration;
/// use serde::{Deserialize, Serialize};
///
/// #[derive(Serialize, Deserialize)]
/// struct Config {
///     #[serde(with = "cr_core::config::serde_utils::duration_secs")]
///     timeout: Duration,
/// }
/// ```
pub mod duration_secs {
    use serde::{self, de, Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    use crate::config::MAX_DURATION;

    /// Serialize a Duration as seconds
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

    /// Deserialize a Duration from integer or fractional seconds
    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let secs = f64::deserialize(deserializer)?;
        if !secs.is_finite() || secs < 0.0 {
            return Err(de::Error::custom(format!(
                "duration must be a non-negative number of seconds, got {}",
                secs
            )));
        }
        match Duration::try_from_secs_f64(secs) {
            Ok(duration) if duration <= MAX_DURATION => Ok(duration),
            _ => Err(de::Error::custom(format!(
                "duration of {} seconds exceeds the maximum of {} seconds",
                secs,
                MAX_DURATION.as_secs()
            ))),
        }
    }
}
