use serde_json::json;

use super::{display_name, literal, param_name, param_ref, resource_id, string_prop, ArmResource, ExtractContext, ResourceKind};
use crate::error::ExtractionError;
use crate::graph::{Element, Node};
use crate::template::{ParamType, ParameterDef, Resource};

const COMPUTE_API: &str = "2023-03-01";

// Shared by every VM in a design: one login for the whole deployment.
const ADMIN_USERNAME: &str = "adminUsername";
const ADMIN_PASSWORD: &str = "adminPassword";

/// `virtual-machine` node. Needs at least one linked `network-interface`.
pub struct VirtualMachine<'a>(pub &'a Node);

impl ArmResource for VirtualMachine<'_> {
    fn parameters(&self, _ctx: &ExtractContext<'_>) -> Result<Vec<(String, ParameterDef)>, ExtractionError> {
        let me = Element::Node(self.0);
        Ok(vec![
            (
                param_name(&self.0.id, "vmSize"),
                ParameterDef::string(string_prop(me, "vmSize", "Standard_B2s")?)
                    .described(format!("Size of {}", display_name(me))),
            ),
            (
                ADMIN_USERNAME.to_string(),
                ParameterDef::string(string_prop(me, "adminUsername", "azureuser")?),
            ),
            (
                ADMIN_PASSWORD.to_string(),
                ParameterDef::new(ParamType::SecureString).described("Administrator password for all virtual machines"),
            ),
        ])
    }

    fn resources(&self, ctx: &ExtractContext<'_>) -> Result<Vec<Resource>, ExtractionError> {
        let me = Element::Node(self.0);
        let nics = ctx.linked_of_kind(&self.0.id, ResourceKind::NetworkInterface);
        if nics.is_empty() {
            return Err(ExtractionError::new(
                &self.0.id,
                "a virtual machine needs at least one linked network-interface",
            ));
        }

        let nic_ids: Vec<String> = nics
            .iter()
            .map(|nic| resource_id(ResourceKind::NetworkInterface.arm_type(), &[display_name(*nic)]))
            .collect();
        let interfaces: Vec<_> = nic_ids
            .iter()
            .enumerate()
            .map(|(i, id)| json!({ "id": id, "properties": { "primary": i == 0 } }))
            .collect();

        let publisher = string_prop(me, "imagePublisher", "Canonical")?;
        let offer = string_prop(me, "imageOffer", "0001-com-ubuntu-server-jammy")?;
        let image_sku = string_prop(me, "imageSku", "22_04-lts-gen2")?;

        let name = display_name(me);
        let mut vm = Resource::new(ResourceKind::VirtualMachine.arm_type(), COMPUTE_API, name, &self.0.id);
        vm.depends_on = nic_ids;
        vm.properties = json!({
            "hardwareProfile": { "vmSize": param_ref(&param_name(&self.0.id, "vmSize")) },
            "osProfile": {
                "computerName": literal(name),
                "adminUsername": param_ref(ADMIN_USERNAME),
                "adminPassword": param_ref(ADMIN_PASSWORD),
            },
            "storageProfile": {
                "imageReference": {
                    "publisher": publisher,
                    "offer": offer,
                    "sku": image_sku,
                    "version": "latest",
                },
                "osDisk": { "createOption": "FromImage" },
            },
            "networkProfile": { "networkInterfaces": interfaces },
        });
        Ok(vec![vm])
    }
}
