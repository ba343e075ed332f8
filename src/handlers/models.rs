// Input models for the endpoints that declare one
use crate::dispatch::{FieldKind, Schema};

pub fn login_model() -> Schema {
    Schema::new("LoginModel")
        .required("usr", FieldKind::String)
        .required("pwd", FieldKind::String)
}

pub fn refresh_token_model() -> Schema {
    Schema::new("RefreshTokenModel").required("refresh_token", FieldKind::String)
}

pub fn revoke_token_model() -> Schema {
    Schema::new("RevokeTokenModel").required("token", FieldKind::String)
}

/// Everything besides `id` is passed through to the claim.
pub fn expense_update_model() -> Schema {
    Schema::new("ExpenseUpdateModel")
        .required("id", FieldKind::String)
        .allow_extra()
}

pub fn workflow_action_model() -> Schema {
    Schema::new("WorkflowActionModel")
        .required("reference_doctype", FieldKind::String)
        .required("reference_name", FieldKind::String)
        .required("action", FieldKind::String)
}
