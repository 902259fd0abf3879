//! Controller constants. These match the behavior of the switches the controller was built
//! against (OpenFlow 1.3 select groups).

/// Guards utilization ratios against near-zero capacities.
pub const MIN_CAPACITY: f64 = 1e-13;

/// Bucket weights are scaled to this value.
pub const BUCKET_WEIGHT_SCALE: f64 = 65535.0;

/// Priority of the static shortest-path fallback rules.
pub const PRIORITY_FALLBACK: u16 = 1;

/// Priority of rules installed from evaluator output.
pub const PRIORITY_DYNAMIC: u16 = 5;

/// Priority of the statically pre-installed ECMP rules.
pub const PRIORITY_ECMP: u16 = 7;

/// EtherType of IPv4 frames.
pub const ETH_TYPE_IPV4: u16 = 0x0800;

/// EtherType of ARP frames.
pub const ETH_TYPE_ARP: u16 = 0x0806;
