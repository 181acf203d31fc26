//! IPv4 subnet arithmetic tags

use std::net::Ipv4Addr;

use jsonteng_core::error::Result;
use jsonteng_core::tags::{require_args, resolve_string_arg, Tag};
use jsonteng_core::{Error, Resolution, Resolved, Value};

/// A parsed CIDR network; host bits are cleared
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Network {
    address: u32,
    prefix: u32,
}

impl Network {
    fn parse(tag: &str, text: &str) -> Result<Self> {
        let invalid = || Error::invalid_argument(tag, format!("Invalid network format {}", text));

        let (addr, prefix) = text.trim().split_once('/').ok_or_else(invalid)?;
        let addr: Ipv4Addr = addr.parse().map_err(|_| invalid())?;
        let prefix: u32 = prefix.parse().map_err(|_| invalid())?;
        if prefix > 32 {
            return Err(invalid());
        }

        Ok(Self {
            address: u32::from(addr) & netmask(prefix),
            prefix,
        })
    }

    fn resolve(tag: &str, arg: &Value, cx: &mut Resolution<'_>) -> Result<Self> {
        let text = resolve_string_arg(tag, arg, cx)?;
        Self::parse(tag, &text)
    }

    fn host(&self, tag: &str, index: u32) -> Result<Ipv4Addr> {
        let address = self.address.checked_add(index).ok_or_else(|| {
            Error::invalid_argument(
                tag,
                format!("Host {} is beyond the IPv4 address space", index),
            )
        })?;
        if address & netmask(self.prefix) != self.address {
            log::warn!(
                "Host {} lies outside {}/{}",
                index,
                Ipv4Addr::from(self.address),
                self.prefix
            );
        }
        Ok(Ipv4Addr::from(address))
    }
}

fn netmask(prefix: u32) -> u32 {
    u32::MAX.checked_shl(32 - prefix).unwrap_or(0)
}

/// Resolve a non-negative integer given as a number or a decimal string
fn resolve_count(tag: &str, what: &str, arg: &Value, cx: &mut Resolution<'_>) -> Result<u32> {
    let parsed = match cx.resolve_value(arg)? {
        Value::Number(n) if n >= 0.0 && n.fract() == 0.0 && n <= u32::MAX as f64 => Some(n as u32),
        Value::Number(_) => None,
        Value::String(s) => s.trim().parse::<u32>().ok(),
        other => {
            return Err(Error::type_mismatch("number or string", other.type_name())
                .with_help(format!("Tag \"{}\" needs a numeric {}", tag, what)))
        }
    };
    parsed.ok_or_else(|| Error::invalid_argument(tag, format!("Invalid {} format", what)))
}

/// `["#ipv4-subnet", network, count, index]`
///
/// Splits `network` into `count` equal subnets and returns subnet `index`.
#[derive(Debug, Clone, Copy, Default)]
pub struct Ipv4SubnetTag;

impl Tag for Ipv4SubnetTag {
    fn process(&self, args: &[Value], cx: &mut Resolution<'_>) -> Result<Resolved> {
        let tag = self.name();
        require_args(tag, args, 3)?;
        let network = Network::resolve(tag, &args[0], cx)?;
        let count = resolve_count(tag, "subnet count", &args[1], cx)?;
        let index = resolve_count(tag, "subnet index", &args[2], cx)?;

        if !count.is_power_of_two() {
            return Err(Error::invalid_argument(
                tag,
                format!("Subnet count must be a power of 2. {} is given", count),
            ));
        }
        let prefix = network.prefix + count.trailing_zeros();
        if prefix > 32 {
            return Err(Error::invalid_argument(
                tag,
                format!("/{} cannot be split into {} subnets", network.prefix, count),
            ));
        }
        if index >= count {
            return Err(Error::invalid_argument(
                tag,
                format!("Subnet index {} is out of range for {} subnets", index, count),
            ));
        }

        let offset = (u64::from(index) << (32 - prefix)) as u32;
        let subnet = Ipv4Addr::from(network.address | offset);
        Ok(Resolved::Value(Value::String(format!("{}/{}", subnet, prefix))))
    }

    fn name(&self) -> &str {
        "ipv4-subnet"
    }
}

/// `["#ipv4-host-ip", network, index]`: address `index` of `network`
#[derive(Debug, Clone, Copy, Default)]
pub struct Ipv4HostIpTag;

impl Tag for Ipv4HostIpTag {
    fn process(&self, args: &[Value], cx: &mut Resolution<'_>) -> Result<Resolved> {
        let tag = self.name();
        require_args(tag, args, 2)?;
        let network = Network::resolve(tag, &args[0], cx)?;
        let index = resolve_count(tag, "address index", &args[1], cx)?;

        let host = network.host(tag, index)?;
        Ok(Resolved::Value(Value::String(host.to_string())))
    }

    fn name(&self) -> &str {
        "ipv4-host-ip"
    }
}

/// `["#ipv4-host-gateway", network]`: the first host address
#[derive(Debug, Clone, Copy, Default)]
pub struct Ipv4HostGatewayTag;

impl Tag for Ipv4HostGatewayTag {
    fn process(&self, args: &[Value], cx: &mut Resolution<'_>) -> Result<Resolved> {
        let tag = self.name();
        require_args(tag, args, 1)?;
        let network = Network::resolve(tag, &args[0], cx)?;

        let gateway = network.host(tag, 1)?;
        Ok(Resolved::Value(Value::String(gateway.to_string())))
    }

    fn name(&self) -> &str {
        "ipv4-host-gateway"
    }
}

/// `["#ipv4-host-netmask", network]`: the netmask in dotted form
#[derive(Debug, Clone, Copy, Default)]
pub struct Ipv4HostNetmaskTag;

impl Tag for Ipv4HostNetmaskTag {
    fn process(&self, args: &[Value], cx: &mut Resolution<'_>) -> Result<Resolved> {
        let tag = self.name();
        require_args(tag, args, 1)?;
        let network = Network::resolve(tag, &args[0], cx)?;

        let mask = Ipv4Addr::from(netmask(network.prefix));
        Ok(Resolved::Value(Value::String(mask.to_string())))
    }

    fn name(&self) -> &str {
        "ipv4-host-netmask"
    }
}
