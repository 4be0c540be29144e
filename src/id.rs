//! Identity generation for new records.

use rand::Rng;

/// Generates unique record identifiers.
///
/// Two flavors are produced: a 16-digit decimal "long" id (millisecond
/// timestamp plus a random tail, monotonic-ish and human-scannable) and a
/// compact UUID. Persistence components use the long form by default so
/// that keys sort roughly by creation time.
#[derive(Debug, Clone, Copy, Default)]
pub struct IdGenerator;

impl IdGenerator {
    /// Returns a 16-digit decimal identifier.
    ///
    /// Millisecond Unix timestamp (13 digits) followed by 3 random digits.
    /// Collisions require two ids generated in the same millisecond to also
    /// draw the same random tail.
    #[must_use]
    pub fn next_long() -> String {
        let millis = chrono::Utc::now().timestamp_millis();
        let tail: u16 = rand::thread_rng().gen_range(0..1000);
        format!("{millis:013}{tail:03}")
    }

    /// Returns a hyphen-less UUID v4 identifier.
    #[must_use]
    pub fn next_uuid() -> String {
        uuid::Uuid::new_v4().simple().to_string()
    }
}
