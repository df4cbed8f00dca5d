use serde::{Deserialize, Deserializer, Serializer};
use std::time::{SystemTime, UNIX_EPOCH};

pub fn deserialize_timestamp_millis<'de, D>(deserializer: D) -> Result<SystemTime, D::Error>
where
    D: Deserializer<'de>,
{
    let millis = u64::deserialize(deserializer)?;
    let duration = std::time::Duration::from_millis(millis);
    Ok(UNIX_EPOCH + duration)
}

pub fn serialize_timestamp_millis<S>(time: &SystemTime, serializer: S) -> Result<S::Ok, S::Error>
where
    S: Serializer,
{
    let millis = time
        .duration_since(UNIX_EPOCH)
        .map_err(serde::ser::Error::custom)?
        .as_millis() as u64;
    serializer.serialize_u64(millis)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::{Deserialize, Serialize};

    #[derive(Serialize, Deserialize)]
    struct TestStruct {
        #[serde(
            deserialize_with = "deserialize_timestamp_millis",
            serialize_with = "serialize_timestamp_millis"
        )]
        timestamp: SystemTime,
    }

    #[test]
    fn test_deserialize_timestamp_millis() {
        let json = r#"{"timestamp": 1640995200000}"#;
        let result: TestStruct = serde_json::from_str(json).unwrap();

        let expected_duration = std::time::Duration::from_millis(1640995200000);
        let expected_time = UNIX_EPOCH + expected_duration;

        assert_eq!(result.timestamp, expected_time);
    }

    #[test]
    fn test_timestamp_millis_round_trip() {
        let value = TestStruct {
            timestamp: UNIX_EPOCH + std::time::Duration::from_millis(1714000000123),
        };
        let json = serde_json::to_string(&value).unwrap();
        assert_eq!(json, r#"{"timestamp":1714000000123}"#);
    }
}
