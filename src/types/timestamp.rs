use chrono::{DateTime, SubsecRound, Utc};

use crate::errors::{Error, Result};

/// The current time, truncated to the seconds precision packets can carry.
pub fn now() -> DateTime<Utc> {
    Utc::now().trunc_subsecs(0)
}

/// Converts a packet timestamp into a `DateTime`.
pub fn from_wire(secs: u32) -> DateTime<Utc> {
    DateTime::from_timestamp(i64::from(secs), 0).unwrap_or_default()
}

/// Converts a `DateTime` into a packet timestamp.
pub fn to_wire(time: &DateTime<Utc>) -> Result<u32> {
    u32::try_from(time.timestamp()).map_err(|_| Error::Configuration {
        message: format!("time {time} can not be represented in a packet"),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wire_conversion() {
        let t = from_wire(1_600_000_000);
        assert_eq!(to_wire(&t).unwrap(), 1_600_000_000);
        assert!(to_wire(&from_wire(0)).is_ok());
        let before_epoch = DateTime::from_timestamp(-5, 0).unwrap();
        assert!(to_wire(&before_epoch).is_err());
    }
}
