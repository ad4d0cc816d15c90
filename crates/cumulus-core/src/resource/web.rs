use serde_json::json;

use super::{display_name, param_name, param_ref, resource_id, string_prop, ArmResource, ExtractContext, ResourceKind};
use crate::error::ExtractionError;
use crate::graph::{Element, Node};
use crate::template::{ParameterDef, Resource};

const WEB_API: &str = "2022-09-01";

/// `app-service-plan` node.
pub struct AppServicePlan<'a>(pub &'a Node);

impl ArmResource for AppServicePlan<'_> {
    fn parameters(&self, _ctx: &ExtractContext<'_>) -> Result<Vec<(String, ParameterDef)>, ExtractionError> {
        let sku = string_prop(Element::Node(self.0), "sku", "F1")?;
        Ok(vec![(param_name(&self.0.id, "sku"), ParameterDef::string(sku))])
    }

    fn resources(&self, _ctx: &ExtractContext<'_>) -> Result<Vec<Resource>, ExtractionError> {
        let mut plan = Resource::new(
            ResourceKind::AppServicePlan.arm_type(),
            WEB_API,
            display_name(Element::Node(self.0)),
            &self.0.id,
        );
        plan.sku = Some(json!({ "name": param_ref(&param_name(&self.0.id, "sku")) }));
        plan.properties = json!({});
        Ok(vec![plan])
    }
}

/// `web-app` node. Runs on exactly one linked `app-service-plan`.
pub struct WebApp<'a>(pub &'a Node);

impl ArmResource for WebApp<'_> {
    fn parameters(&self, _ctx: &ExtractContext<'_>) -> Result<Vec<(String, ParameterDef)>, ExtractionError> {
        Ok(Vec::new())
    }

    fn resources(&self, ctx: &ExtractContext<'_>) -> Result<Vec<Resource>, ExtractionError> {
        let plans = ctx.linked_of_kind(&self.0.id, ResourceKind::AppServicePlan);
        let plan = match plans.as_slice() {
            [plan] => *plan,
            [] => {
                return Err(ExtractionError::new(&self.0.id, "a web app needs a linked app-service-plan"));
            }
            _ => {
                return Err(ExtractionError::new(
                    &self.0.id,
                    format!("{} app service plans are linked; exactly one is allowed", plans.len()),
                ));
            }
        };
        let plan_id = resource_id(ResourceKind::AppServicePlan.arm_type(), &[display_name(plan)]);
        let https_only = self
            .0
            .properties
            .get("httpsOnly")
            .and_then(|v| v.as_bool())
            .unwrap_or(true);

        let mut site = Resource::new(
            ResourceKind::WebApp.arm_type(),
            WEB_API,
            display_name(Element::Node(self.0)),
            &self.0.id,
        );
        site.depends_on = vec![plan_id.clone()];
        site.properties = json!({
            "serverFarmId": plan_id,
            "httpsOnly": https_only,
        });
        Ok(vec![site])
    }
}
