//! Action catalog vocabulary: identities, brackets, side effects, triggers.

use crate::entity::EntityType;
use crate::error::UnknownVariant;
use crate::identity::Role;
use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// Capability class gating which kinds of actions a situation can reach.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Bracket {
    #[serde(rename = "READ")]
    Read,
    #[serde(rename = "WRITE-NOTE")]
    WriteNote,
    #[serde(rename = "WRITE-STATE")]
    WriteState,
    #[serde(rename = "WRITE-COMMS")]
    WriteComms,
    #[serde(rename = "WRITE-FINANCIAL")]
    WriteFinancial,
}

impl Bracket {
    pub const ALL: [Bracket; 5] = [
        Bracket::Read,
        Bracket::WriteNote,
        Bracket::WriteState,
        Bracket::WriteComms,
        Bracket::WriteFinancial,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Bracket::Read => "READ",
            Bracket::WriteNote => "WRITE-NOTE",
            Bracket::WriteState => "WRITE-STATE",
            Bracket::WriteComms => "WRITE-COMMS",
            Bracket::WriteFinancial => "WRITE-FINANCIAL",
        }
    }

    /// State and financial writes go through the prepare/execute round trip.
    pub fn requires_signature(&self) -> bool {
        matches!(self, Bracket::WriteState | Bracket::WriteFinancial)
    }

    pub fn is_mutation(&self) -> bool {
        !matches!(self, Bracket::Read)
    }
}

impl std::fmt::Display for Bracket {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SideEffect {
    ReadOnly,
    MutationLight,
    MutationHeavy,
}

/// Functional grouping an action belongs to.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Cluster {
    ManageWorkOrders,
    FixSomething,
    ManageEquipment,
    ControlInventory,
    ManageCertificates,
    Procurement,
    Receiving,
    Compliance,
    Documents,
    Search,
}

impl Cluster {
    pub fn as_str(&self) -> &'static str {
        match self {
            Cluster::ManageWorkOrders => "manage_work_orders",
            Cluster::FixSomething => "fix_something",
            Cluster::ManageEquipment => "manage_equipment",
            Cluster::ControlInventory => "control_inventory",
            Cluster::ManageCertificates => "manage_certificates",
            Cluster::Procurement => "procurement",
            Cluster::Receiving => "receiving",
            Cluster::Compliance => "compliance",
            Cluster::Documents => "documents",
            Cluster::Search => "search",
        }
    }
}

/// Closed set of executable actions. The catalog must define every variant
/// exactly once; the registry refuses to load otherwise.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionId {
    ViewWorkOrder,
    AddWorkOrderNote,
    UpdateWorkOrder,
    StartWorkOrder,
    CloseWorkOrder,
    ReassignWorkOrder,
    ViewFault,
    AddFaultNote,
    AcknowledgeFault,
    CreateWorkOrderFromFault,
    CloseFault,
    ViewEquipment,
    UpdateRunningHours,
    FlagEquipmentCritical,
    NotifyEquipmentOwner,
    ViewStock,
    LogPartUsage,
    OrderPart,
    ViewCertificate,
    AddCertificateNote,
    RenewCertificate,
    RevokeCertificate,
    ViewPurchaseOrder,
    UpdatePurchaseOrder,
    RequestPurchaseApproval,
    ApprovePurchaseOrder,
    CancelPurchaseOrder,
    ViewReceiving,
    UpdateReceivingLine,
    AcceptReceiving,
    RejectReceiving,
    ViewComplianceLog,
    AddComplianceEntry,
    CountersignComplianceLog,
    ViewDocument,
    RunSearch,
}

impl ActionId {
    pub const ALL: [ActionId; 36] = [
        ActionId::ViewWorkOrder,
        ActionId::AddWorkOrderNote,
        ActionId::UpdateWorkOrder,
        ActionId::StartWorkOrder,
        ActionId::CloseWorkOrder,
        ActionId::ReassignWorkOrder,
        ActionId::ViewFault,
        ActionId::AddFaultNote,
        ActionId::AcknowledgeFault,
        ActionId::CreateWorkOrderFromFault,
        ActionId::CloseFault,
        ActionId::ViewEquipment,
        ActionId::UpdateRunningHours,
        ActionId::FlagEquipmentCritical,
        ActionId::NotifyEquipmentOwner,
        ActionId::ViewStock,
        ActionId::LogPartUsage,
        ActionId::OrderPart,
        ActionId::ViewCertificate,
        ActionId::AddCertificateNote,
        ActionId::RenewCertificate,
        ActionId::RevokeCertificate,
        ActionId::ViewPurchaseOrder,
        ActionId::UpdatePurchaseOrder,
        ActionId::RequestPurchaseApproval,
        ActionId::ApprovePurchaseOrder,
        ActionId::CancelPurchaseOrder,
        ActionId::ViewReceiving,
        ActionId::UpdateReceivingLine,
        ActionId::AcceptReceiving,
        ActionId::RejectReceiving,
        ActionId::ViewComplianceLog,
        ActionId::AddComplianceEntry,
        ActionId::CountersignComplianceLog,
        ActionId::ViewDocument,
        ActionId::RunSearch,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ActionId::ViewWorkOrder => "view_work_order",
            ActionId::AddWorkOrderNote => "add_work_order_note",
            ActionId::UpdateWorkOrder => "update_work_order",
            ActionId::StartWorkOrder => "start_work_order",
            ActionId::CloseWorkOrder => "close_work_order",
            ActionId::ReassignWorkOrder => "reassign_work_order",
            ActionId::ViewFault => "view_fault",
            ActionId::AddFaultNote => "add_fault_note",
            ActionId::AcknowledgeFault => "acknowledge_fault",
            ActionId::CreateWorkOrderFromFault => "create_work_order_from_fault",
            ActionId::CloseFault => "close_fault",
            ActionId::ViewEquipment => "view_equipment",
            ActionId::UpdateRunningHours => "update_running_hours",
            ActionId::FlagEquipmentCritical => "flag_equipment_critical",
            ActionId::NotifyEquipmentOwner => "notify_equipment_owner",
            ActionId::ViewStock => "view_stock",
            ActionId::LogPartUsage => "log_part_usage",
            ActionId::OrderPart => "order_part",
            ActionId::ViewCertificate => "view_certificate",
            ActionId::AddCertificateNote => "add_certificate_note",
            ActionId::RenewCertificate => "renew_certificate",
            ActionId::RevokeCertificate => "revoke_certificate",
            ActionId::ViewPurchaseOrder => "view_purchase_order",
            ActionId::UpdatePurchaseOrder => "update_purchase_order",
            ActionId::RequestPurchaseApproval => "request_purchase_approval",
            ActionId::ApprovePurchaseOrder => "approve_purchase_order",
            ActionId::CancelPurchaseOrder => "cancel_purchase_order",
            ActionId::ViewReceiving => "view_receiving",
            ActionId::UpdateReceivingLine => "update_receiving_line",
            ActionId::AcceptReceiving => "accept_receiving",
            ActionId::RejectReceiving => "reject_receiving",
            ActionId::ViewComplianceLog => "view_compliance_log",
            ActionId::AddComplianceEntry => "add_compliance_entry",
            ActionId::CountersignComplianceLog => "countersign_compliance_log",
            ActionId::ViewDocument => "view_document",
            ActionId::RunSearch => "run_search",
        }
    }
}

impl FromStr for ActionId {
    type Err = UnknownVariant;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .iter()
            .copied()
            .find(|a| a.as_str() == s.trim())
            .ok_or_else(|| UnknownVariant::new("action", s))
    }
}

impl std::fmt::Display for ActionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Where a trigger condition reads its left-hand value from.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConditionSource {
    /// A field on the entity snapshot.
    Field,
    /// A pre-resolved related-record count.
    Related,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConditionOp {
    Exists,
    Missing,
    Eq,
    Ne,
    Gt,
    Gte,
    Lt,
    Lte,
}

impl ConditionOp {
    /// Numeric comparisons block with `threshold`; the rest with `missing_trigger`.
    pub fn is_numeric(&self) -> bool {
        matches!(
            self,
            ConditionOp::Gt | ConditionOp::Gte | ConditionOp::Lt | ConditionOp::Lte
        )
    }

    pub fn symbol(&self) -> &'static str {
        match self {
            ConditionOp::Exists => "exists",
            ConditionOp::Missing => "missing",
            ConditionOp::Eq => "==",
            ConditionOp::Ne => "!=",
            ConditionOp::Gt => ">",
            ConditionOp::Gte => ">=",
            ConditionOp::Lt => "<",
            ConditionOp::Lte => "<=",
        }
    }
}

/// Declarative entity-field or related-query condition.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TriggerCondition {
    pub source: ConditionSource,
    pub key: String,
    pub op: ConditionOp,
    /// Literal right-hand side.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<serde_json::Value>,
    /// Name of another snapshot field used as the right-hand side.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub compare_to: Option<String>,
}

/// When an action is offered at all.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ActionTrigger {
    /// Entity statuses in which the action applies. Empty means any status.
    #[serde(default)]
    pub statuses: Vec<String>,
    /// Roles the action is offered to. Empty means every role.
    #[serde(default)]
    pub roles: Vec<Role>,
    /// Roles explicitly barred from the action.
    #[serde(default)]
    pub forbidden_roles: Vec<Role>,
    #[serde(default)]
    pub conditions: Vec<TriggerCondition>,
    #[serde(default)]
    pub auto_run: bool,
}

/// One catalog entry. Immutable once the registry is loaded.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ActionDefinition {
    pub id: ActionId,
    pub label: String,
    pub cluster: Cluster,
    pub card_type: EntityType,
    pub bracket: Bracket,
    pub side_effect: SideEffect,
    /// Higher wins when choosing the primary action on a card.
    #[serde(default)]
    pub priority: u32,
    /// Ownership reassignment needs head-of-department authority or above.
    #[serde(default)]
    pub assignment: bool,
    #[serde(default)]
    pub trigger: ActionTrigger,
    #[serde(default)]
    pub required_fields: Vec<String>,
    #[serde(default)]
    pub optional_fields: Vec<String>,
}

impl ActionDefinition {
    /// Derived from the bracket; never declared in the catalog.
    pub fn signature_required(&self) -> bool {
        self.bracket.requires_signature()
    }
}
