use serde_json::{json, Value};
use std::collections::HashSet;
use std::net::Ipv4Addr;

use super::{
    display_name, literal, param_name, param_ref, resource_id, string_prop, ArmResource, ExtractContext,
    ResourceKind,
};
use crate::error::ExtractionError;
use crate::graph::{Element, Group, Node};
use crate::template::{ParameterDef, Resource};

const NETWORK_API: &str = "2023-04-01";
const DEFAULT_ADDRESS_SPACE: &str = "10.0.0.0/16";

/// `virtual-network` group. Emits its nested subnets inline.
pub struct VirtualNetwork<'a>(pub &'a Group);

impl VirtualNetwork<'_> {
    fn prefix_param(&self) -> String {
        param_name(&self.0.id, "addressPrefix")
    }

    fn address_space(&self) -> Result<String, ExtractionError> {
        string_prop(Element::Group(self.0), "addressPrefix", DEFAULT_ADDRESS_SPACE)
    }
}

/// The `ordinal`-th /24 inside `space` (`a.b.c.d/n`), or `None` when `space`
/// is not an IPv4 prefix of length 24 or less, or has no room left.
fn carve_subnet(space: &str, ordinal: usize) -> Option<String> {
    let (addr, len) = space.trim().split_once('/')?;
    let base: Ipv4Addr = addr.parse().ok()?;
    let len: u32 = len.parse().ok()?;
    if len > 24 || ordinal as u64 >= 1u64 << (24 - len) {
        return None;
    }
    let mask = u32::MAX.checked_shl(32 - len).unwrap_or(0);
    let network = u32::from(base) & mask;
    Some(format!("{}/24", Ipv4Addr::from(network | ((ordinal as u32) << 8))))
}

impl ArmResource for VirtualNetwork<'_> {
    fn parameters(&self, _ctx: &ExtractContext<'_>) -> Result<Vec<(String, ParameterDef)>, ExtractionError> {
        let prefix = self.address_space()?;
        Ok(vec![(
            self.prefix_param(),
            ParameterDef::string(prefix)
                .described(format!("Address space of {}", display_name(Element::Group(self.0)))),
        )])
    }

    fn resources(&self, ctx: &ExtractContext<'_>) -> Result<Vec<Resource>, ExtractionError> {
        let space = self.address_space()?;
        let mut names = HashSet::new();
        let mut subnets = Vec::new();
        let children = self
            .0
            .child_groups()
            .iter()
            .filter_map(|child| ctx.graph.group(child))
            .filter(|group| group.kind == ResourceKind::Subnet.tag());
        for (ordinal, group) in children.enumerate() {
            let subnet = Subnet(group);
            let name = display_name(Element::Group(group));
            if !names.insert(name) {
                return Err(ExtractionError::new(
                    &self.0.id,
                    format!("subnet name '{}' is used twice", name),
                ));
            }
            subnets.push(subnet.inline(&space, ordinal)?);
        }

        let mut vnet = Resource::new(
            ResourceKind::VirtualNetwork.arm_type(),
            NETWORK_API,
            display_name(Element::Group(self.0)),
            &self.0.id,
        );
        vnet.properties = json!({
            "addressSpace": { "addressPrefixes": [param_ref(&self.prefix_param())] },
            "subnets": subnets,
        });
        Ok(vec![vnet])
    }
}

/// `subnet` group. Nested-only: its virtual network exports it. Reaching
/// this extractor directly means the subnet sits somewhere it can't be
/// deployed.
pub struct Subnet<'a>(pub &'a Group);

impl Subnet<'_> {
    /// Inline subnet entry. Without an explicit prefix the subnet takes the
    /// `ordinal`-th /24 of its network's address space.
    fn inline(&self, space: &str, ordinal: usize) -> Result<Value, ExtractionError> {
        let me = Element::Group(self.0);
        let prefix = if me.properties().contains_key("addressPrefix") {
            string_prop(me, "addressPrefix", "")?
        } else {
            carve_subnet(space, ordinal).ok_or_else(|| {
                ExtractionError::new(
                    &self.0.id,
                    format!(
                        "no default /24 is left in address space '{}'; set addressPrefix on the subnet",
                        space
                    ),
                )
            })?
        };
        Ok(json!({
            "name": literal(display_name(me)),
            "properties": { "addressPrefix": prefix },
        }))
    }

    fn misplaced(&self) -> ExtractionError {
        ExtractionError::new(
            &self.0.id,
            format!(
                "a subnet must be nested directly inside a {}",
                ResourceKind::VirtualNetwork.tag()
            ),
        )
    }
}

impl ArmResource for Subnet<'_> {
    fn parameters(&self, _ctx: &ExtractContext<'_>) -> Result<Vec<(String, ParameterDef)>, ExtractionError> {
        Err(self.misplaced())
    }

    fn resources(&self, _ctx: &ExtractContext<'_>) -> Result<Vec<Resource>, ExtractionError> {
        Err(self.misplaced())
    }
}

/// `public-ip` node.
pub struct PublicIp<'a>(pub &'a Node);

impl ArmResource for PublicIp<'_> {
    fn parameters(&self, _ctx: &ExtractContext<'_>) -> Result<Vec<(String, ParameterDef)>, ExtractionError> {
        let allocation = string_prop(Element::Node(self.0), "allocation", "Dynamic")?;
        if allocation != "Dynamic" && allocation != "Static" {
            return Err(ExtractionError::new(
                &self.0.id,
                format!("allocation '{}' must be Dynamic or Static", allocation),
            ));
        }
        Ok(vec![(
            param_name(&self.0.id, "allocation"),
            ParameterDef::string(allocation).allowing(["Dynamic", "Static"]),
        )])
    }

    fn resources(&self, _ctx: &ExtractContext<'_>) -> Result<Vec<Resource>, ExtractionError> {
        let mut ip = Resource::new(
            ResourceKind::PublicIp.arm_type(),
            NETWORK_API,
            display_name(Element::Node(self.0)),
            &self.0.id,
        );
        ip.sku = Some(json!({ "name": string_prop(Element::Node(self.0), "sku", "Basic")? }));
        ip.properties = json!({
            "publicIPAllocationMethod": param_ref(&param_name(&self.0.id, "allocation")),
        });
        Ok(vec![ip])
    }
}

/// `network-interface` node. Lives in a subnet; a linked `public-ip` becomes
/// its public address.
pub struct NetworkInterface<'a>(pub &'a Node);

impl ArmResource for NetworkInterface<'_> {
    fn parameters(&self, _ctx: &ExtractContext<'_>) -> Result<Vec<(String, ParameterDef)>, ExtractionError> {
        Ok(Vec::new())
    }

    fn resources(&self, ctx: &ExtractContext<'_>) -> Result<Vec<Resource>, ExtractionError> {
        let me = Element::Node(self.0);
        let subnet = ctx
            .parent_of(me)
            .filter(|p| p.kind() == ResourceKind::Subnet.tag())
            .ok_or_else(|| ExtractionError::new(&self.0.id, "a network interface must sit inside a subnet"))?;
        let vnet = ctx
            .parent_of(subnet)
            .filter(|p| p.kind() == ResourceKind::VirtualNetwork.tag())
            .ok_or_else(|| {
                ExtractionError::new(&self.0.id, "the enclosing subnet is not inside a virtual network")
            })?;
        let vnet_name = display_name(vnet);

        let mut ip_config = json!({
            "privateIPAllocationMethod": "Dynamic",
            "subnet": {
                "id": resource_id(
                    ResourceKind::Subnet.arm_type(),
                    &[vnet_name, display_name(subnet)],
                ),
            },
        });
        let mut depends_on = vec![resource_id(ResourceKind::VirtualNetwork.arm_type(), &[vnet_name])];

        let ips = ctx.linked_of_kind(&self.0.id, ResourceKind::PublicIp);
        match ips.as_slice() {
            [] => {}
            [ip] => {
                let ip_id = resource_id(ResourceKind::PublicIp.arm_type(), &[display_name(*ip)]);
                ip_config["publicIPAddress"] = json!({ "id": ip_id });
                depends_on.push(ip_id);
            }
            _ => {
                return Err(ExtractionError::new(
                    &self.0.id,
                    format!("{} public IPs are linked; at most one is allowed", ips.len()),
                ));
            }
        }

        let mut nic = Resource::new(
            ResourceKind::NetworkInterface.arm_type(),
            NETWORK_API,
            display_name(me),
            &self.0.id,
        );
        nic.depends_on = depends_on;
        nic.properties = json!({
            "ipConfigurations": [{ "name": "ipconfig1", "properties": ip_config }],
        });
        Ok(vec![nic])
    }
}
