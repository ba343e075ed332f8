use async_trait::async_trait;
use serde_json::Value;

use super::utils::user_roles;
use crate::dispatch::{Handler, HandlerResult, Reply, RequestContext};
use crate::error::ApiError;
use crate::workflow::WorkflowError;

/// `update_workflow_state`: apply a workflow action to any document.
pub struct UpdateWorkflowState;

#[async_trait]
impl Handler for UpdateWorkflowState {
    async fn handle(&self, ctx: &mut RequestContext, input: Value) -> HandlerResult {
        let field = |name: &str| input.get(name).and_then(Value::as_str).unwrap_or_default().to_string();
        let (doctype, name, action) = (field("reference_doctype"), field("reference_name"), field("action"));

        let services = ctx.services();
        let user = ctx.user().to_string();
        let roles = user_roles(ctx.tx()?, &user).await?;

        let result = services.workflow.apply(ctx.tx()?, &doctype, &name, &action, &roles).await;
        match result {
            Ok(doc) => {
                tracing::info!("{} moved {} {} via '{}'", user, doc.doctype, doc.name, action);
                Ok(Reply::message("Workflow State Updated Successfully"))
            }
            Err(WorkflowError::NotPermitted(doctype)) => {
                Err(ApiError::unhandled(format!("Not permitted for update {}", doctype)))
            }
            Err(err) => {
                ctx.rollback().await?;
                Err(err.into())
            }
        }
    }
}
