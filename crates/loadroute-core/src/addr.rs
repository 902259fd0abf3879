//! Mapping between host indices and the addresses hosts are provisioned with.
//!
//! A host index is split into three mixed-radix components `(id / (256·254), (id / 254) mod
//! 256, id mod 254 + 1)`. The IPv4 form prefixes them with `10.`, the MAC form writes them in
//! hex behind a fixed vendor prefix. The last component never reaches 0 or 255, so neither the
//! network nor the broadcast address is ever handed out.

use std::net::Ipv4Addr;

use crate::network::types::{NodeId, NodeKind};

const RADIX_LOW: u32 = 254;
const RADIX_MID: u32 = 256;

/// The first IPv4 octet of every host address.
pub const IP_PREFIX: u8 = 10;

/// The vendor prefix of every host MAC address.
pub const MAC_PREFIX: [u8; 3] = [0x6f, 0x3d, 0x01];

/// The largest host index that can be encoded.
pub const MAX_HOST_ID: u32 = RADIX_MID * RADIX_MID * RADIX_LOW - 1;

fn split(id: u32) -> [u8; 3] {
    [
        (id / (RADIX_MID * RADIX_LOW)) as u8,
        ((id / RADIX_LOW) % RADIX_MID) as u8,
        ((id % RADIX_LOW) + 1) as u8,
    ]
}

fn combine([a, b, c]: [u8; 3]) -> Option<u32> {
    (u32::from(a) * RADIX_MID * RADIX_LOW + u32::from(b) * RADIX_LOW + u32::from(c)).checked_sub(1)
}

/// Encodes a host index as an IPv4 address.
pub fn id_to_ip(id: u32) -> Result<Ipv4Addr, AddrError> {
    if id > MAX_HOST_ID {
        return Err(AddrError::OutOfRange(id));
    }
    let [a, b, c] = split(id);
    Ok(Ipv4Addr::new(IP_PREFIX, a, b, c))
}

/// Decodes a host index from an IPv4 address. Returns `None` for the unassigned address
/// `10.0.0.0`, which stands for "any source" in stats replies.
pub fn ip_to_id(ip: Ipv4Addr) -> Option<u32> {
    let [_, a, b, c] = ip.octets();
    combine([a, b, c])
}

/// Encodes a host index as a MAC address string.
pub fn id_to_mac(id: u32) -> Result<String, AddrError> {
    if id > MAX_HOST_ID {
        return Err(AddrError::OutOfRange(id));
    }
    let bytes = MAC_PREFIX.iter().copied().chain(split(id));
    Ok(bytes
        .map(|b| format!("{b:02x}"))
        .collect::<Vec<_>>()
        .join(":"))
}

/// Decodes a host index from a MAC address string. Only the last three octets are significant.
pub fn mac_to_id(mac: &str) -> Result<u32, AddrError> {
    let octets = mac
        .split(':')
        .map(|s| u8::from_str_radix(s, 16))
        .collect::<Result<Vec<_>, _>>()
        .map_err(|_| AddrError::Malformed(mac.to_owned()))?;
    match octets[..] {
        [.., a, b, c] => combine([a, b, c]).ok_or_else(|| AddrError::Malformed(mac.to_owned())),
        _ => Err(AddrError::Malformed(mac.to_owned())),
    }
}

/// The IPv4 address of host `hN` (index `N - 1`).
pub fn host_ip(host: NodeId) -> Result<Ipv4Addr, AddrError> {
    if host.kind() != NodeKind::Host || host.num() == 0 {
        return Err(AddrError::NotAHost(host));
    }
    id_to_ip(host.num() - 1)
}

/// The host owning an IPv4 address, or `None` for the wildcard source `10.0.0.0`.
pub fn ip_host(ip: Ipv4Addr) -> Option<NodeId> {
    ip_to_id(ip).map(|id| NodeId::host(id + 1))
}

/// Address codec error.
#[derive(Debug, thiserror::Error)]
pub enum AddrError {
    /// The host index does not fit the address space.
    #[error("host index {0} is out of range")]
    OutOfRange(u32),

    /// The string is not a valid address.
    #[error("malformed address {0:?}")]
    Malformed(String),

    /// The node is not a host.
    #[error("{0} is not an addressable host")]
    NotAHost(NodeId),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ip_round_trips() -> anyhow::Result<()> {
        let ids = (0..70_000).chain((MAX_HOST_ID - 70_000)..=MAX_HOST_ID);
        for id in ids {
            assert_eq!(ip_to_id(id_to_ip(id)?), Some(id));
        }
        Ok(())
    }

    #[test]
    fn mac_round_trips() -> anyhow::Result<()> {
        for id in (0..MAX_HOST_ID).step_by(997).chain([MAX_HOST_ID]) {
            assert_eq!(mac_to_id(&id_to_mac(id)?)?, id);
        }
        Ok(())
    }

    #[test]
    fn first_hosts_get_sequential_addresses() -> anyhow::Result<()> {
        assert_eq!(id_to_ip(0)?, Ipv4Addr::new(10, 0, 0, 1));
        assert_eq!(id_to_ip(253)?, Ipv4Addr::new(10, 0, 0, 254));
        assert_eq!(id_to_ip(254)?, Ipv4Addr::new(10, 0, 1, 1));
        assert_eq!(id_to_mac(0)?, "6f:3d:01:00:00:01");
        assert_eq!(id_to_mac(254)?, "6f:3d:01:00:01:01");
        Ok(())
    }

    #[test]
    fn wildcard_source_has_no_host() {
        assert_eq!(ip_host(Ipv4Addr::new(10, 0, 0, 0)), None);
        assert_eq!(ip_host(Ipv4Addr::new(10, 0, 0, 3)), Some(NodeId::host(3)));
    }

    #[test]
    fn out_of_range_fails() {
        assert!(matches!(
            id_to_ip(MAX_HOST_ID + 1),
            Err(AddrError::OutOfRange(..))
        ));
    }

    #[test]
    fn switches_have_no_ip() {
        assert!(matches!(
            host_ip(NodeId::switch(1)),
            Err(AddrError::NotAHost(..))
        ));
    }
}
