use std::time::Duration;

macro_rules! unit {
    ($name: ident) => {
        #[derive(
            Debug,
            Default,
            Copy,
            Clone,
            PartialOrd,
            Ord,
            PartialEq,
            Eq,
            Hash,
            derive_more::Add,
            derive_more::Sub,
            derive_more::AddAssign,
            derive_more::SubAssign,
            derive_more::Sum,
            derive_more::FromStr,
            serde::Serialize,
            serde::Deserialize,
        )]
        pub struct $name(u64);

        impl $name {
            pub const ZERO: $name = Self::new(0);
            pub const ONE: $name = Self::new(1);
            pub const MAX: $name = Self::new(u64::MAX);

            pub const fn new(value: u64) -> Self {
                Self(value)
            }

            pub const fn into_u64(self) -> u64 {
                self.0
            }

            pub fn into_f64(self) -> f64 {
                self.0 as f64
            }
        }
    };
}

unit!(Bytes);

impl std::fmt::Display for Bytes {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}B", self.0)
    }
}

impl Bytes {
    /// Returns the number of bytes counted since `earlier`, or zero if the counter went backwards
    /// (e.g. after a rule was reinstalled).
    pub fn saturating_delta(self, earlier: Bytes) -> Bytes {
        Bytes(self.0.saturating_sub(earlier.0))
    }
}

/// A link capacity or a flow rate in megabits per second.
#[derive(
    Debug,
    Default,
    Copy,
    Clone,
    PartialOrd,
    PartialEq,
    derive_more::Add,
    derive_more::Sub,
    derive_more::AddAssign,
    derive_more::SubAssign,
    derive_more::Sum,
    derive_more::FromStr,
    serde::Serialize,
    serde::Deserialize,
)]
#[serde(transparent)]
pub struct Mbps(f64);

impl Mbps {
    pub const ZERO: Mbps = Self::new(0.0);

    /// The capacity assumed for links declared without one (70 Tbps).
    pub const UNLIMITED: Mbps = Self::new(70_000_000.0);

    pub const fn new(value: f64) -> Self {
        Self(value)
    }

    pub const fn into_f64(self) -> f64 {
        self.0
    }

    /// The average rate needed to move `bytes` in `interval`.
    pub fn from_bytes(bytes: f64, interval: Duration) -> Self {
        let secs = interval.as_secs_f64();
        if secs <= 0.0 {
            return Self::ZERO;
        }
        Self((8.0 * bytes / secs) / 1e6)
    }

    pub fn scale_by(self, val: f64) -> Self {
        Self(self.0 * val)
    }
}

impl std::fmt::Display for Mbps {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}Mbps", self.0)
    }
}
