//! Subnet types for the leasable network pool.
//!
//! Only `/24` networks are handled, and only those under
//! `192.168.{min_octet}.0` to `192.168.{max_octet}.0`. The third octet is the
//! subnet's identity and its index in the pool.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::net::Ipv4Addr;
use std::ops::RangeInclusive;
use std::str::FromStr;

use crate::error::{LeaseError, Result};

/// Prefix length of every leased network.
pub const CIDR_BITS: u8 = 24;

/// Default lower bound of the pool (third octet).
pub const DEFAULT_MIN_OCTET: u8 = 200;

/// Default upper bound of the pool (third octet, inclusive).
pub const DEFAULT_MAX_OCTET: u8 = 255;

/// First two octets shared by every leasable subnet.
const POOL_PREFIX: [u8; 2] = [192, 168];

/// A canonical IPv4 `/24` network.
///
/// Any host bits given on parsing are dropped, so `192.168.201.7` and
/// `192.168.201.0/24` are the same subnet.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Subnet {
    network: Ipv4Addr,
}

impl Subnet {
    /// Build the subnet `a.b.c.0/24`.
    pub fn from_octets(a: u8, b: u8, c: u8) -> Self {
        Self {
            network: Ipv4Addr::new(a, b, c, 0),
        }
    }

    /// The `/24` network containing `addr`.
    pub fn containing(addr: Ipv4Addr) -> Self {
        let [a, b, c, _] = addr.octets();
        Self::from_octets(a, b, c)
    }

    /// Network address (`x.y.z.0`).
    pub fn network(&self) -> Ipv4Addr {
        self.network
    }

    /// Third octet, which doubles as the pool index.
    pub fn octet(&self) -> u8 {
        self.network.octets()[2]
    }

    /// Gateway address handed to VM networks (`x.y.z.1`).
    pub fn gateway(&self) -> Ipv4Addr {
        self.host(1)
    }

    /// Address of host `index` inside this subnet.
    pub fn host(&self, index: u8) -> Ipv4Addr {
        let [a, b, c, _] = self.network.octets();
        Ipv4Addr::new(a, b, c, index)
    }

    /// Whether `addr` falls inside this subnet.
    pub fn contains(&self, addr: Ipv4Addr) -> bool {
        Self::containing(addr) == *self
    }

    /// Canonical CIDR notation, e.g. `192.168.201.0/24`.
    pub fn cidr(&self) -> String {
        self.to_string()
    }
}

fn malformed(input: &str, reason: impl Into<String>) -> LeaseError {
    LeaseError::MalformedAddress {
        input: input.to_string(),
        reason: reason.into(),
    }
}

impl FromStr for Subnet {
    type Err = LeaseError;

    fn from_str(s: &str) -> Result<Self> {
        let input = s.trim();
        let (addr, prefix) = match input.split_once('/') {
            Some((addr, prefix)) => (addr, Some(prefix)),
            None => (input, None),
        };

        let addr: Ipv4Addr = addr
            .parse()
            .map_err(|e| malformed(s, format!("invalid IPv4 address '{}': {}", addr, e)))?;

        if let Some(prefix) = prefix {
            let bits: u8 = prefix
                .parse()
                .map_err(|e| malformed(s, format!("invalid prefix length '{}': {}", prefix, e)))?;
            if bits != CIDR_BITS {
                return Err(malformed(
                    s,
                    format!("prefix length /{} not supported (only /{})", bits, CIDR_BITS),
                ));
            }
        }

        Ok(Self::containing(addr))
    }
}

impl TryFrom<String> for Subnet {
    type Error = LeaseError;

    fn try_from(value: String) -> Result<Self> {
        value.parse()
    }
}

impl From<Subnet> for String {
    fn from(subnet: Subnet) -> Self {
        subnet.to_string()
    }
}

impl fmt::Display for Subnet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.network, CIDR_BITS)
    }
}

/// Inclusive range of third octets that may be leased.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubnetPool {
    min_octet: u8,
    max_octet: u8,
}

impl Default for SubnetPool {
    fn default() -> Self {
        Self {
            min_octet: DEFAULT_MIN_OCTET,
            max_octet: DEFAULT_MAX_OCTET,
        }
    }
}

impl SubnetPool {
    /// Create a pool over `192.168.{min}.0/24` to `192.168.{max}.0/24`.
    pub fn new(min_octet: u8, max_octet: u8) -> Result<Self> {
        if min_octet > max_octet {
            return Err(LeaseError::InvalidConfig(format!(
                "min octet {} is greater than max octet {}",
                min_octet, max_octet
            )));
        }
        Ok(Self {
            min_octet,
            max_octet,
        })
    }

    pub fn min_octet(&self) -> u8 {
        self.min_octet
    }

    pub fn max_octet(&self) -> u8 {
        self.max_octet
    }

    /// Pool indices in ascending order.
    pub fn indices(&self) -> RangeInclusive<u8> {
        self.min_octet..=self.max_octet
    }

    /// Number of subnets in the pool.
    pub fn capacity(&self) -> usize {
        usize::from(self.max_octet - self.min_octet) + 1
    }

    /// Whether the subnet belongs to this pool.
    pub fn contains(&self, subnet: &Subnet) -> bool {
        let [a, b, c, _] = subnet.network().octets();
        [a, b] == POOL_PREFIX && self.indices().contains(&c)
    }

    /// Whether `subnet` (dotted address or CIDR) is dynamically leasable.
    ///
    /// Statically configured networks must not overlap the pool.
    pub fn is_leasable(&self, subnet: &str) -> bool {
        subnet
            .parse::<Subnet>()
            .map(|s| self.contains(&s))
            .unwrap_or(false)
    }

    /// Ensure the subnet belongs to this pool.
    pub fn check(&self, subnet: Subnet) -> Result<Subnet> {
        if self.contains(&subnet) {
            Ok(subnet)
        } else {
            Err(self.out_of_range(subnet))
        }
    }

    /// Parse and range-check a subnet string.
    pub fn parse(&self, subnet: &str) -> Result<Subnet> {
        self.check(subnet.parse()?)
    }

    /// The pool subnet with the given index.
    pub fn subnet_for_index(&self, index: u8) -> Result<Subnet> {
        let [a, b] = POOL_PREFIX;
        self.check(Subnet::from_octets(a, b, index))
    }

    fn out_of_range(&self, subnet: Subnet) -> LeaseError {
        LeaseError::OutOfRange {
            subnet: subnet.to_string(),
            min: self.min_octet,
            max: self.max_octet,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // --- Subnet parsing ---

    #[test]
    fn test_parse_without_prefix() {
        let subnet: Subnet = "192.168.210.0".parse().unwrap();
        assert_eq!(subnet.to_string(), "192.168.210.0/24");
        assert_eq!(subnet.octet(), 210);
    }

    #[test]
    fn test_parse_with_prefix() {
        let subnet: Subnet = "192.168.201.0/24".parse().unwrap();
        assert_eq!(subnet, Subnet::from_octets(192, 168, 201));
    }

    #[test]
    fn test_parse_normalizes_host_bits() {
        let subnet: Subnet = "192.168.201.1".parse().unwrap();
        assert_eq!(subnet.cidr(), "192.168.201.0/24");
        let subnet: Subnet = " 192.168.201.77/24 ".parse().unwrap();
        assert_eq!(subnet.cidr(), "192.168.201.0/24");
    }

    #[test]
    fn test_parse_malformed() {
        for input in ["256.256.256.0", "256.256.256.56", "0.0.0.-1", "not-an-ip", "", "192.168.1"] {
            let err = input.parse::<Subnet>().unwrap_err();
            assert!(
                matches!(err, LeaseError::MalformedAddress { .. }),
                "{input}: {err:?}"
            );
        }
    }

    #[test]
    fn test_parse_rejects_other_prefix_lengths() {
        for input in ["192.168.201.0/16", "192.168.201.0/25", "192.168.201.0/x"] {
            let err = input.parse::<Subnet>().unwrap_err();
            assert!(matches!(err, LeaseError::MalformedAddress { .. }), "{input}");
        }
    }

    #[test]
    fn test_gateway_and_hosts() {
        let subnet = Subnet::from_octets(192, 168, 203);
        assert_eq!(subnet.network(), Ipv4Addr::new(192, 168, 203, 0));
        assert_eq!(subnet.gateway(), Ipv4Addr::new(192, 168, 203, 1));
        assert_eq!(subnet.host(100), Ipv4Addr::new(192, 168, 203, 100));
        assert!(subnet.contains(Ipv4Addr::new(192, 168, 203, 254)));
        assert!(!subnet.contains(Ipv4Addr::new(192, 168, 204, 1)));
    }

    #[test]
    fn test_subnet_serde_as_cidr_string() {
        let subnet = Subnet::from_octets(192, 168, 222);
        let json = serde_json::to_string(&subnet).unwrap();
        assert_eq!(json, "\"192.168.222.0/24\"");
        let parsed: Subnet = serde_json::from_str("\"192.168.222.9\"").unwrap();
        assert_eq!(parsed, subnet);
        assert!(serde_json::from_str::<Subnet>("\"300.1.1.1\"").is_err());
    }

    // --- Pool ---

    #[test]
    fn test_default_pool() {
        let pool = SubnetPool::default();
        assert_eq!(pool.min_octet(), 200);
        assert_eq!(pool.max_octet(), 255);
        assert_eq!(pool.capacity(), 56);
    }

    #[test]
    fn test_pool_rejects_inverted_range() {
        assert!(matches!(
            SubnetPool::new(210, 200),
            Err(LeaseError::InvalidConfig(_))
        ));
        assert_eq!(SubnetPool::new(7, 7).unwrap().capacity(), 1);
    }

    #[test]
    fn test_subnet_for_index_round_trip() {
        let pool = SubnetPool::default();
        for index in pool.indices() {
            let subnet = pool.subnet_for_index(index).unwrap();
            assert_eq!(pool.parse(&subnet.to_string()).unwrap(), subnet);
            assert_eq!(subnet.octet(), index);
        }
    }

    #[test]
    fn test_subnet_for_index_out_of_range() {
        let pool = SubnetPool::new(200, 209).unwrap();
        let err = pool.subnet_for_index(210).unwrap_err();
        match err {
            LeaseError::OutOfRange { subnet, min, max } => {
                assert_eq!(subnet, "192.168.210.0/24");
                assert_eq!((min, max), (200, 209));
            }
            other => panic!("unexpected error: {other:?}"),
        }
        assert!(pool.subnet_for_index(199).is_err());
    }

    #[test]
    fn test_parse_out_of_range() {
        let pool = SubnetPool::default();
        for input in ["10.10.10.0", "127.0.0.1", "192.169.201.0", "192.168.199.0"] {
            assert!(
                matches!(pool.parse(input), Err(LeaseError::OutOfRange { .. })),
                "{input}"
            );
        }
    }

    #[test]
    fn test_parse_malformed_before_range() {
        let pool = SubnetPool::default();
        assert!(matches!(
            pool.parse("256.256.256.0"),
            Err(LeaseError::MalformedAddress { .. })
        ));
    }

    #[test]
    fn test_is_leasable() {
        let pool = SubnetPool::new(200, 209).unwrap();
        assert!(pool.is_leasable("192.168.200.1"));
        assert!(pool.is_leasable("192.168.209.0/24"));
        assert!(!pool.is_leasable("192.168.210.1"));
        assert!(!pool.is_leasable("10.0.0.1"));
        assert!(!pool.is_leasable("garbage"));
    }
}
