//! Document state machines.
//!
//! A `Workflow` document binds a doctype to a list of transitions
//! `{state, action, next_state, allowed}`. The current state lives in the
//! workflow's state field on the document itself.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;

use crate::database::{Document, StoreError, StoreTransaction};
use crate::filter::FilterData;

pub const WORKFLOW_DOCTYPE: &str = "Workflow";
pub const DEFAULT_STATE_FIELD: &str = "workflow_state";

#[derive(Debug, Error)]
pub enum WorkflowError {
    #[error("Not permitted for update {0}")]
    NotPermitted(String),

    #[error("{doctype} {name} not found")]
    DocumentNotFound { doctype: String, name: String },

    #[error("Invalid workflow definition {0}")]
    InvalidDefinition(String),

    #[error(transparent)]
    Store(#[from] StoreError),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transition {
    pub state: String,
    pub action: String,
    pub next_state: String,
    /// Role allowed to take the action; empty or `All` means anyone.
    #[serde(default)]
    pub allowed: String,
}

impl Transition {
    fn allowed_for(&self, roles: &[String]) -> bool {
        self.allowed.is_empty()
            || self.allowed == "All"
            || roles.iter().any(|role| role == &self.allowed || role == "System Manager")
    }
}

#[derive(Debug, Clone)]
pub struct WorkflowDefinition {
    pub name: String,
    pub document_type: String,
    pub state_field: String,
    pub transitions: Vec<Transition>,
}

impl WorkflowDefinition {
    fn from_document(doc: &Document) -> Result<Self, WorkflowError> {
        let transitions = match doc.get("transitions") {
            Some(value) => serde_json::from_value::<Vec<Transition>>(value.clone())
                .map_err(|_| WorkflowError::InvalidDefinition(doc.name.clone()))?,
            None => Vec::new(),
        };
        Ok(Self {
            name: doc.name.clone(),
            document_type: doc.get_str("document_type").unwrap_or_default().to_string(),
            state_field: doc
                .get_str("workflow_state_field")
                .unwrap_or(DEFAULT_STATE_FIELD)
                .to_string(),
            transitions,
        })
    }

    /// State of `doc`; documents that never entered the workflow sit in the state
    /// of its first transition.
    pub fn current_state(&self, doc: &Document) -> Option<String> {
        doc.get_str(&self.state_field)
            .map(str::to_string)
            .or_else(|| self.transitions.first().map(|t| t.state.clone()))
    }
}

/// Reads workflow definitions from the store and applies transitions.
#[derive(Debug, Clone, Default)]
pub struct WorkflowEngine;

impl WorkflowEngine {
    pub fn new() -> Self {
        Self
    }

    pub async fn active_workflow(
        &self,
        tx: &mut dyn StoreTransaction,
        doctype: &str,
    ) -> Result<Option<WorkflowDefinition>, WorkflowError> {
        let filter = FilterData::new()
            .where_eq("document_type", doctype)
            .where_eq("is_active", 1)
            .limit(1);
        match tx.find(WORKFLOW_DOCTYPE, &filter).await?.first() {
            Some(doc) => Ok(Some(WorkflowDefinition::from_document(doc)?)),
            None => Ok(None),
        }
    }

    /// Name of the state field when `doctype` has an active workflow.
    pub async fn state_field(
        &self,
        tx: &mut dyn StoreTransaction,
        doctype: &str,
    ) -> Result<Option<String>, WorkflowError> {
        Ok(self.active_workflow(tx, doctype).await?.map(|w| w.state_field))
    }

    /// Transitions out of the document's current state that `roles` may take.
    pub async fn transitions(
        &self,
        tx: &mut dyn StoreTransaction,
        doc: &Document,
        roles: &[String],
    ) -> Result<Vec<Transition>, WorkflowError> {
        let Some(workflow) = self.active_workflow(tx, &doc.doctype).await? else {
            return Ok(Vec::new());
        };
        let Some(state) = workflow.current_state(doc) else {
            return Ok(Vec::new());
        };
        Ok(workflow
            .transitions
            .into_iter()
            .filter(|t| t.state == state && t.allowed_for(roles))
            .collect())
    }

    /// Action names available on `doc`. Without an active workflow the presented
    /// data gets `workflow_state` mirrored from `status` and there are no actions.
    pub async fn actions(
        &self,
        tx: &mut dyn StoreTransaction,
        doc: &Document,
        presented: &mut Map<String, Value>,
        roles: &[String],
    ) -> Result<Vec<String>, WorkflowError> {
        if self.active_workflow(tx, &doc.doctype).await?.is_none() {
            presented.insert(
                DEFAULT_STATE_FIELD.to_string(),
                doc.get("status").cloned().unwrap_or(Value::Null),
            );
            return Ok(Vec::new());
        }
        Ok(self
            .transitions(tx, doc, roles)
            .await?
            .into_iter()
            .map(|t| t.action)
            .collect())
    }

    /// Apply `action` to the stored document and persist the new state.
    pub async fn apply(
        &self,
        tx: &mut dyn StoreTransaction,
        doctype: &str,
        name: &str,
        action: &str,
        roles: &[String],
    ) -> Result<Document, WorkflowError> {
        let mut doc = tx.get(doctype, name).await?.ok_or_else(|| WorkflowError::DocumentNotFound {
            doctype: doctype.to_string(),
            name: name.to_string(),
        })?;

        let workflow = self
            .active_workflow(tx, doctype)
            .await?
            .ok_or_else(|| WorkflowError::NotPermitted(doctype.to_string()))?;
        let state = workflow.current_state(&doc).unwrap_or_default();

        let transition = workflow
            .transitions
            .iter()
            .find(|t| t.state == state && t.action == action && t.allowed_for(roles))
            .ok_or_else(|| WorkflowError::NotPermitted(doctype.to_string()))?;

        tracing::info!(
            "Workflow {}: {} {} '{}' -> '{}' via '{}'",
            workflow.name,
            doctype,
            name,
            state,
            transition.next_state,
            action
        );
        doc.set(workflow.state_field.clone(), transition.next_state.clone());
        Ok(tx.update(doc).await?)
    }
}
