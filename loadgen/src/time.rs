use time::OffsetDateTime;

pub trait TimeSource {
    // Current wall-clock time, used for event timestamps and id prefixes
    fn now(&self) -> OffsetDateTime;
}

#[derive(Clone)]
pub struct SystemTime {}

impl TimeSource for SystemTime {
    fn now(&self) -> OffsetDateTime {
        OffsetDateTime::now_utc()
    }
}

/// Milliseconds since the unix epoch, the time component of generated event ids.
pub fn unix_millis(time: OffsetDateTime) -> i128 {
    time.unix_timestamp_nanos() / 1_000_000
}
