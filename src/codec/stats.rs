/// Running codec statistics.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct CodecStats {
    /// Successful `serialize` calls.
    pub serialized: u64,
    /// Successful `deserialize` calls.
    pub deserialized: u64,
    /// Failed calls in either direction.
    pub errors: u64,
    /// Approximate size of the values before serialization.
    pub bytes_before: u64,
    /// Size of the produced JSON text.
    pub bytes_after: u64,
}

impl CodecStats {
    /// `bytes_after / bytes_before`; `1.0` before anything was serialized.
    pub fn compression_ratio(&self) -> f64 {
        if self.bytes_before == 0 {
            1.0
        } else {
            self.bytes_after as f64 / self.bytes_before as f64
        }
    }

    /// Share of calls that failed.
    pub fn error_rate(&self) -> f64 {
        let total = self.serialized + self.deserialized + self.errors;
        if total == 0 {
            0.0
        } else {
            self.errors as f64 / total as f64
        }
    }
}
