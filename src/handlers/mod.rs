//! ESS mobile endpoints and the table that registers them.

pub mod auth;
pub mod expense;
pub mod models;
pub mod utils;
pub mod workflow;

use crate::dispatch::{DispatchTable, EndpointDescriptor, HttpMethod, TableError};

/// The mobile v2 dispatch table.
pub fn endpoints() -> Result<DispatchTable, TableError> {
    use HttpMethod::{Get, Post};

    DispatchTable::builder()
        .register(
            EndpointDescriptor::new("login", auth::Login)
                .methods([Post])
                .schema(models::login_model())
                .allow_guest(),
        )
        .register(
            EndpointDescriptor::new("get_access_token", auth::GetAccessToken)
                .methods([Get])
                .schema(models::refresh_token_model())
                .allow_guest(),
        )
        .register(
            EndpointDescriptor::new("revoke_access_token", auth::RevokeAccessToken)
                .methods([Post])
                .schema(models::revoke_token_model()),
        )
        .register(EndpointDescriptor::new("get_expense_claims", expense::GetExpenseClaims).methods([Get]))
        .register(
            EndpointDescriptor::new("get_expense_claim_type_totals", expense::GetExpenseClaimTypeTotals)
                .methods([Get]),
        )
        .register(EndpointDescriptor::new("get_expense_type", expense::GetExpenseType).methods([Get]))
        .register(EndpointDescriptor::new("apply_expense", expense::ApplyExpense).methods([Post]))
        .register(
            EndpointDescriptor::new("update_expense", expense::UpdateExpense)
                .methods([Post])
                .schema(models::expense_update_model()),
        )
        .register(
            EndpointDescriptor::new("update_workflow_state", workflow::UpdateWorkflowState)
                .methods([Post])
                .schema(models::workflow_action_model()),
        )
        .build()
}
