//! Generation id — a checksum fingerprinting a replicated data set.
//!
//! Two replicas may only keep replicating with each other if their initial
//! content matches; the generation id is how they compare it cheaply. The
//! checksum is a running sum of every byte of the exported data set's textual
//! form, skipping CR and LF so that platform line endings do not change the
//! fingerprint.

/// Generation id of an empty data set.
pub const EMPTY_DATA_SET_GENERATION_ID: u64 = 48810;

/// Running generation-id checksum.
///
/// # Examples
///
/// ```
/// use castor_core::generation::GenerationIdChecksum;
///
/// let mut checksum = GenerationIdChecksum::new();
/// checksum.update(b"dn: dc=example\n");
/// checksum.update(b"dc: example\r\n");
/// assert_ne!(checksum.value(), 0);
/// ```
#[derive(Debug, Default, Clone)]
pub struct GenerationIdChecksum {
    sum: u64,
}

impl GenerationIdChecksum {
    /// Start a new checksum.
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed bytes of the exported form. CR and LF are not counted.
    pub fn update(&mut self, bytes: &[u8]) {
        for &b in bytes {
            if b != b'\r' && b != b'\n' {
                self.sum = self.sum.wrapping_add(u64::from(b));
            }
        }
    }

    /// The checksum so far. An empty input yields the well-known empty
    /// data set value so that two freshly initialized replicas agree.
    pub fn value(&self) -> u64 {
        if self.sum == 0 {
            EMPTY_DATA_SET_GENERATION_ID
        } else {
            self.sum
        }
    }
}

/// Checksum a complete exported data set in one call.
pub fn generation_id(export: &[u8]) -> u64 {
    let mut checksum = GenerationIdChecksum::new();
    checksum.update(export);
    checksum.value()
}
