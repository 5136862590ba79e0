//! Human-readable byte counts and download progress

const KIB: u64 = 1_024;
const MIB: u64 = KIB * 1_024;
const GIB: u64 = MIB * 1_024;

/// A byte count with readable unit conversions
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Units {
    pub bytes: u64,
}

impl Units {
    pub fn new(bytes: u64) -> Self {
        Self { bytes }
    }

    pub fn kilobytes(&self) -> f64 {
        self.bytes as f64 / KIB as f64
    }

    pub fn megabytes(&self) -> f64 {
        self.kilobytes() / 1_024.0
    }

    pub fn gigabytes(&self) -> f64 {
        self.megabytes() / 1_024.0
    }

    /// Format with the largest unit that keeps the value above 1
    ///
    /// Examples: `512 bytes`, `1.50 kb`, `12.00 mb`, `2.25 gb`
    pub fn readable(&self) -> String {
        match self.bytes {
            b if b < KIB => format!("{} bytes", b),
            b if b < MIB => format!("{:.2} kb", self.kilobytes()),
            b if b < GIB => format!("{:.2} mb", self.megabytes()),
            _ => format!("{:.2} gb", self.gigabytes()),
        }
    }
}

impl std::fmt::Display for Units {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.readable())
    }
}

/// Snapshot of a download in flight
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProgressModel {
    pub completed_units: u64,
    /// Zero when the server did not announce a length
    pub total_units: u64,
}

impl ProgressModel {
    pub fn new(completed_units: u64, total_units: u64) -> Self {
        Self { completed_units, total_units }
    }

    /// Completed share in `[0, 1]`
    pub fn fraction(&self) -> f64 {
        if self.total_units == 0 {
            return 0.0;
        }
        (self.completed_units as f64 / self.total_units as f64).clamp(0.0, 1.0)
    }

    /// `"1.00 mb / 4.00 mb"`
    pub fn describe(&self) -> String {
        format!(
            "{} / {}",
            Units::new(self.completed_units),
            Units::new(self.total_units)
        )
    }
}
