use serde_json::json;

use super::{display_name, param_name, param_ref, string_prop, ArmResource, ExtractContext, ResourceKind};
use crate::error::ExtractionError;
use crate::graph::{Element, Node};
use crate::template::{ParameterDef, Resource};

const STORAGE_API: &str = "2023-01-01";
const SKUS: [&str; 4] = ["Standard_LRS", "Standard_GRS", "Standard_ZRS", "Premium_LRS"];

/// `storage-account` node.
pub struct StorageAccount<'a>(pub &'a Node);

impl StorageAccount<'_> {
    /// Storage account names are 3-24 lowercase letters and digits.
    fn account_name(&self) -> Result<String, ExtractionError> {
        let name = display_name(Element::Node(self.0)).to_ascii_lowercase();
        let valid = (3..=24).contains(&name.len()) && name.chars().all(|c| c.is_ascii_alphanumeric());
        if valid {
            Ok(name)
        } else {
            Err(ExtractionError::new(
                &self.0.id,
                format!("storage account name '{}' must be 3-24 lowercase letters or digits", name),
            ))
        }
    }
}

impl ArmResource for StorageAccount<'_> {
    fn parameters(&self, _ctx: &ExtractContext<'_>) -> Result<Vec<(String, ParameterDef)>, ExtractionError> {
        let sku = string_prop(Element::Node(self.0), "sku", SKUS[0])?;
        if !SKUS.contains(&sku.as_str()) {
            return Err(ExtractionError::new(
                &self.0.id,
                format!("sku '{}' is not one of {}", sku, SKUS.join(", ")),
            ));
        }
        Ok(vec![(
            param_name(&self.0.id, "sku"),
            ParameterDef::string(sku).allowing(SKUS),
        )])
    }

    fn resources(&self, _ctx: &ExtractContext<'_>) -> Result<Vec<Resource>, ExtractionError> {
        let mut account = Resource::new(
            ResourceKind::StorageAccount.arm_type(),
            STORAGE_API,
            self.account_name()?,
            &self.0.id,
        );
        account.kind = Some("StorageV2".to_string());
        account.sku = Some(json!({ "name": param_ref(&param_name(&self.0.id, "sku")) }));
        account.properties = json!({
            "minimumTlsVersion": "TLS1_2",
            "supportsHttpsTrafficOnly": true,
        });
        Ok(vec![account])
    }
}
