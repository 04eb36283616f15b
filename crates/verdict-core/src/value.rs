use std::fmt;
use std::net::IpAddr;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize};

use crate::error::{EvaluationError, EvaluationResult};

// ---------------------------------------------------------------------------
// Type — the closed set of attribute value types
// ---------------------------------------------------------------------------

/// Tag for every value the engine understands. Exhaustive on purpose so a
/// new type forces review of equality, containment and display.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Type {
    Boolean,
    String,
    Integer,
    Float,
    Address,
    Network,
    Domain,
    SetOfStrings,
    SetOfNetworks,
    SetOfDomains,
    ListOfStrings,
}

impl fmt::Display for Type {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Type::Boolean => "boolean",
            Type::String => "string",
            Type::Integer => "integer",
            Type::Float => "float",
            Type::Address => "address",
            Type::Network => "network",
            Type::Domain => "domain",
            Type::SetOfStrings => "set of strings",
            Type::SetOfNetworks => "set of networks",
            Type::SetOfDomains => "set of domains",
            Type::ListOfStrings => "list of strings",
        };
        write!(f, "{}", name)
    }
}

// ---------------------------------------------------------------------------
// Network — an address block with prefix-mask membership
// ---------------------------------------------------------------------------

/// An IP network given as base address plus prefix length.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Network {
    addr: IpAddr,
    prefix: u8,
}

impl Network {
    /// Builds a network, rejecting prefix lengths beyond the address family
    /// width (32 for IPv4, 128 for IPv6).
    pub fn new(addr: IpAddr, prefix: u8) -> EvaluationResult<Self> {
        let width = match addr {
            IpAddr::V4(_) => 32,
            IpAddr::V6(_) => 128,
        };
        if prefix > width {
            return Err(EvaluationError::function(
                "network",
                format!("prefix length {} exceeds {} for {}", prefix, width, addr),
            ));
        }
        Ok(Network { addr, prefix })
    }

    pub fn addr(&self) -> IpAddr {
        self.addr
    }

    pub fn prefix(&self) -> u8 {
        self.prefix
    }

    /// Whether the address falls inside this network. Addresses of the
    /// other family never match.
    pub fn contains(&self, addr: &IpAddr) -> bool {
        match (self.addr, addr) {
            (IpAddr::V4(base), IpAddr::V4(a)) => {
                let mask = prefix_mask_v4(self.prefix);
                u32::from(base) & mask == u32::from(*a) & mask
            }
            (IpAddr::V6(base), IpAddr::V6(a)) => {
                let mask = prefix_mask_v6(self.prefix);
                u128::from(base) & mask == u128::from(*a) & mask
            }
            _ => false,
        }
    }
}

fn prefix_mask_v4(prefix: u8) -> u32 {
    if prefix == 0 {
        0
    } else {
        u32::MAX << (32 - u32::from(prefix))
    }
}

fn prefix_mask_v6(prefix: u8) -> u128 {
    if prefix == 0 {
        0
    } else {
        u128::MAX << (128 - u32::from(prefix))
    }
}

impl FromStr for Network {
    type Err = EvaluationError;

    /// Parses CIDR text such as `10.0.0.0/8`; a bare address gets the full
    /// prefix of its family.
    fn from_str(s: &str) -> EvaluationResult<Self> {
        let bad = |detail: &str| EvaluationError::function("network", format!("{}: {}", detail, s));
        match s.split_once('/') {
            Some((addr, prefix)) => {
                let addr: IpAddr = addr.parse().map_err(|_| bad("bad address"))?;
                let prefix: u8 = prefix.parse().map_err(|_| bad("bad prefix"))?;
                Network::new(addr, prefix)
            }
            None => {
                let addr: IpAddr = s.parse().map_err(|_| bad("bad address"))?;
                let prefix = match addr {
                    IpAddr::V4(_) => 32,
                    IpAddr::V6(_) => 128,
                };
                Network::new(addr, prefix)
            }
        }
    }
}

impl fmt::Display for Network {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.addr, self.prefix)
    }
}

// ---------------------------------------------------------------------------
// Domain — a case-normalized DNS name with subdomain containment
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct Domain(String);

impl Domain {
    /// Normalizes to lowercase and strips a trailing dot.
    pub fn new(name: &str) -> Self {
        Domain(name.trim_end_matches('.').to_ascii_lowercase())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Whether `other` equals this domain or sits under it as a subdomain,
    /// by whole-label suffix.
    pub fn contains(&self, other: &Domain) -> bool {
        other.0 == self.0 || other.0.ends_with(&format!(".{}", self.0))
    }
}

impl<'de> Deserialize<'de> for Domain {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        Ok(Domain::new(&String::deserialize(deserializer)?))
    }
}

impl fmt::Display for Domain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ---------------------------------------------------------------------------
// OrderedSet — insertion-ordered, deduplicating container
// ---------------------------------------------------------------------------

/// Set with insertion-order iteration. Iteration order is what makes set
/// serialization and mapper key selection deterministic.
#[derive(Debug, Clone, PartialEq, Serialize, Default)]
pub struct OrderedSet<T: PartialEq>(Vec<T>);

impl<T: PartialEq> OrderedSet<T> {
    pub fn new() -> Self {
        OrderedSet(Vec::new())
    }

    /// Inserts at the back unless an equal item is already present.
    /// Returns whether the set changed.
    pub fn insert(&mut self, item: T) -> bool {
        if self.0.contains(&item) {
            return false;
        }
        self.0.push(item);
        true
    }

    pub fn contains(&self, item: &T) -> bool {
        self.0.contains(item)
    }

    pub fn iter(&self) -> std::slice::Iter<'_, T> {
        self.0.iter()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl<T: PartialEq> FromIterator<T> for OrderedSet<T> {
    fn from_iter<I: IntoIterator<Item = T>>(iter: I) -> Self {
        let mut set = OrderedSet::new();
        for item in iter {
            set.insert(item);
        }
        set
    }
}

impl<'de, T> Deserialize<'de> for OrderedSet<T>
where
    T: Deserialize<'de> + PartialEq,
{
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        Ok(Vec::<T>::deserialize(deserializer)?.into_iter().collect())
    }
}

// ---------------------------------------------------------------------------
// Value — the tagged union over all attribute types
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Value {
    Boolean(bool),
    String(String),
    Integer(i64),
    Float(f64),
    Address(IpAddr),
    Network(Network),
    Domain(Domain),
    SetOfStrings(OrderedSet<String>),
    SetOfNetworks(OrderedSet<Network>),
    SetOfDomains(OrderedSet<Domain>),
    ListOfStrings(Vec<String>),
}

impl Value {
    pub fn type_of(&self) -> Type {
        match self {
            Value::Boolean(_) => Type::Boolean,
            Value::String(_) => Type::String,
            Value::Integer(_) => Type::Integer,
            Value::Float(_) => Type::Float,
            Value::Address(_) => Type::Address,
            Value::Network(_) => Type::Network,
            Value::Domain(_) => Type::Domain,
            Value::SetOfStrings(_) => Type::SetOfStrings,
            Value::SetOfNetworks(_) => Type::SetOfNetworks,
            Value::SetOfDomains(_) => Type::SetOfDomains,
            Value::ListOfStrings(_) => Type::ListOfStrings,
        }
    }

    fn mismatch<T>(&self, expected: Type) -> EvaluationResult<T> {
        Err(EvaluationError::TypeMismatch {
            expected,
            actual: self.type_of(),
        })
    }

    pub fn boolean(&self) -> EvaluationResult<bool> {
        match self {
            Value::Boolean(b) => Ok(*b),
            other => other.mismatch(Type::Boolean),
        }
    }

    pub fn string(&self) -> EvaluationResult<&str> {
        match self {
            Value::String(s) => Ok(s),
            other => other.mismatch(Type::String),
        }
    }

    pub fn integer(&self) -> EvaluationResult<i64> {
        match self {
            Value::Integer(n) => Ok(*n),
            other => other.mismatch(Type::Integer),
        }
    }

    pub fn float(&self) -> EvaluationResult<f64> {
        match self {
            Value::Float(x) => Ok(*x),
            other => other.mismatch(Type::Float),
        }
    }

    pub fn address(&self) -> EvaluationResult<IpAddr> {
        match self {
            Value::Address(a) => Ok(*a),
            other => other.mismatch(Type::Address),
        }
    }

    pub fn network(&self) -> EvaluationResult<Network> {
        match self {
            Value::Network(n) => Ok(*n),
            other => other.mismatch(Type::Network),
        }
    }

    pub fn domain(&self) -> EvaluationResult<&Domain> {
        match self {
            Value::Domain(d) => Ok(d),
            other => other.mismatch(Type::Domain),
        }
    }

    /// Containment over the container types:
    /// - set/list of strings contains a string
    /// - network contains an address
    /// - set of networks contains an address
    /// - set of domains contains a domain (equality or subdomain)
    ///
    /// Any other pairing is a type mismatch on the container side.
    pub fn contains(&self, item: &Value) -> EvaluationResult<bool> {
        match (self, item) {
            (Value::SetOfStrings(set), Value::String(s)) => Ok(set.contains(s)),
            (Value::ListOfStrings(list), Value::String(s)) => Ok(list.contains(s)),
            (Value::Network(net), Value::Address(a)) => Ok(net.contains(a)),
            (Value::SetOfNetworks(set), Value::Address(a)) => {
                Ok(set.iter().any(|net| net.contains(a)))
            }
            (Value::SetOfDomains(set), Value::Domain(d)) => {
                Ok(set.iter().any(|member| member.contains(d)))
            }
            (container, item) => {
                let expected = match container.type_of() {
                    Type::SetOfStrings | Type::ListOfStrings => Type::String,
                    Type::Network | Type::SetOfNetworks => Type::Address,
                    Type::SetOfDomains => Type::Domain,
                    other => {
                        // Not a container at all.
                        return Err(EvaluationError::TypeMismatch {
                            expected: Type::SetOfStrings,
                            actual: other,
                        });
                    }
                };
                Err(EvaluationError::TypeMismatch {
                    expected,
                    actual: item.type_of(),
                })
            }
        }
    }
}

impl fmt::Display for Value {
    /// Deterministic textual form; sets render in insertion order.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fn join<T: fmt::Display>(
            f: &mut fmt::Formatter<'_>,
            items: impl Iterator<Item = T>,
            open: char,
            close: char,
        ) -> fmt::Result {
            write!(f, "{}", open)?;
            for (i, item) in items.enumerate() {
                if i > 0 {
                    write!(f, ", ")?;
                }
                write!(f, "{}", item)?;
            }
            write!(f, "{}", close)
        }

        match self {
            Value::Boolean(b) => write!(f, "{}", b),
            Value::String(s) => write!(f, "{}", s),
            Value::Integer(n) => write!(f, "{}", n),
            Value::Float(x) => write!(f, "{}", x),
            Value::Address(a) => write!(f, "{}", a),
            Value::Network(n) => write!(f, "{}", n),
            Value::Domain(d) => write!(f, "{}", d),
            Value::SetOfStrings(set) => join(f, set.iter(), '{', '}'),
            Value::SetOfNetworks(set) => join(f, set.iter(), '{', '}'),
            Value::SetOfDomains(set) => join(f, set.iter(), '{', '}'),
            Value::ListOfStrings(list) => join(f, list.iter(), '[', ']'),
        }
    }
}
