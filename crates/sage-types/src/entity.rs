//! Operational entities (the "cards" actions are offered on).

use crate::error::UnknownVariant;
use crate::identity::Department;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::str::FromStr;

/// Kind of record an action targets.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityType {
    WorkOrder,
    Fault,
    Equipment,
    InventoryItem,
    Certificate,
    PurchaseOrder,
    Receiving,
    ComplianceLog,
    Document,
    SearchQuery,
}

/// Shape of an entity type's lifecycle.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LifecycleKind {
    /// Full IDLE → CANDIDATE → ACTIVE → COOLDOWN → RESOLVED lifecycle.
    Mutable,
    /// No COOLDOWN: resolution is an explicit countersignature.
    RecordLedger,
    /// Never leaves IDLE/CANDIDATE.
    ReadOnly,
}

impl EntityType {
    pub const ALL: [EntityType; 10] = [
        EntityType::WorkOrder,
        EntityType::Fault,
        EntityType::Equipment,
        EntityType::InventoryItem,
        EntityType::Certificate,
        EntityType::PurchaseOrder,
        EntityType::Receiving,
        EntityType::ComplianceLog,
        EntityType::Document,
        EntityType::SearchQuery,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            EntityType::WorkOrder => "work_order",
            EntityType::Fault => "fault",
            EntityType::Equipment => "equipment",
            EntityType::InventoryItem => "inventory_item",
            EntityType::Certificate => "certificate",
            EntityType::PurchaseOrder => "purchase_order",
            EntityType::Receiving => "receiving",
            EntityType::ComplianceLog => "compliance_log",
            EntityType::Document => "document",
            EntityType::SearchQuery => "search_query",
        }
    }

    pub fn lifecycle(&self) -> LifecycleKind {
        match self {
            EntityType::Document | EntityType::SearchQuery => LifecycleKind::ReadOnly,
            EntityType::ComplianceLog => LifecycleKind::RecordLedger,
            EntityType::WorkOrder
            | EntityType::Fault
            | EntityType::Equipment
            | EntityType::InventoryItem
            | EntityType::Certificate
            | EntityType::PurchaseOrder
            | EntityType::Receiving => LifecycleKind::Mutable,
        }
    }

    /// Statuses after which the entity accepts no further state-changing actions.
    pub fn terminal_statuses(&self) -> &'static [&'static str] {
        match self {
            EntityType::WorkOrder => &["closed", "cancelled"],
            EntityType::Fault => &["closed"],
            EntityType::Equipment => &["decommissioned"],
            EntityType::InventoryItem => &["written_off"],
            EntityType::Certificate => &["revoked"],
            EntityType::PurchaseOrder => &["approved", "cancelled"],
            EntityType::Receiving => &["accepted", "rejected"],
            EntityType::ComplianceLog => &["countersigned"],
            EntityType::Document | EntityType::SearchQuery => &[],
        }
    }
}

impl FromStr for EntityType {
    type Err = UnknownVariant;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let needle = s.trim().to_ascii_lowercase();
        Self::ALL
            .iter()
            .copied()
            .find(|t| t.as_str() == needle)
            .ok_or_else(|| UnknownVariant::new("entity type", s))
    }
}

impl std::fmt::Display for EntityType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EntityId(pub String);

impl EntityId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }
}

impl std::fmt::Display for EntityId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Identity of one tracked entity: `(entity_type, entity_id)`.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EntityKey {
    pub entity_type: EntityType,
    pub entity_id: EntityId,
}

impl EntityKey {
    pub fn new(entity_type: EntityType, entity_id: impl Into<String>) -> Self {
        Self {
            entity_type,
            entity_id: EntityId::new(entity_id),
        }
    }
}

impl std::fmt::Display for EntityKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.entity_type, self.entity_id)
    }
}

/// Point-in-time view of an entity, as far as governance needs it.
///
/// Maps are ordered so two snapshots with the same content serialize to the
/// same bytes.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EntitySnapshot {
    pub entity_type: EntityType,
    pub entity_id: EntityId,
    #[serde(default)]
    pub department: Option<Department>,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub fields: BTreeMap<String, serde_json::Value>,
    /// Counts of related records (e.g. `open_faults`), pre-resolved by the caller.
    #[serde(default)]
    pub related: BTreeMap<String, u64>,
    #[serde(default)]
    pub version: u64,
}

impl EntitySnapshot {
    pub fn new(entity_type: EntityType, entity_id: impl Into<String>) -> Self {
        Self {
            entity_type,
            entity_id: EntityId::new(entity_id),
            department: None,
            status: None,
            fields: BTreeMap::new(),
            related: BTreeMap::new(),
            version: 0,
        }
    }

    pub fn with_department(mut self, department: Department) -> Self {
        self.department = Some(department);
        self
    }

    pub fn with_status(mut self, status: impl Into<String>) -> Self {
        self.status = Some(status.into());
        self
    }

    pub fn with_field(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.fields.insert(key.into(), value);
        self
    }

    pub fn with_related(mut self, relation: impl Into<String>, count: u64) -> Self {
        self.related.insert(relation.into(), count);
        self
    }

    pub fn key(&self) -> EntityKey {
        EntityKey {
            entity_type: self.entity_type,
            entity_id: self.entity_id.clone(),
        }
    }

    /// Whether the entity's status is terminal for its type.
    pub fn is_terminal(&self) -> bool {
        self.status
            .as_deref()
            .is_some_and(|status| self.entity_type.terminal_statuses().contains(&status))
    }

    /// Field lookup that also exposes `status` and `department` by name.
    pub fn field(&self, name: &str) -> Option<serde_json::Value> {
        match name {
            "status" => self.status.clone().map(serde_json::Value::String),
            "department" => self
                .department
                .map(|d| serde_json::Value::String(d.as_str().to_string())),
            _ => self.fields.get(name).cloned(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn terminal_status_is_per_type() {
        let receiving = EntitySnapshot::new(EntityType::Receiving, "RCV-1").with_status("accepted");
        assert!(receiving.is_terminal());

        let work_order = EntitySnapshot::new(EntityType::WorkOrder, "WO-1").with_status("accepted");
        assert!(!work_order.is_terminal());
    }

    #[test]
    fn field_lookup_covers_status_and_department() {
        let snapshot = EntitySnapshot::new(EntityType::Fault, "F-7")
            .with_department(Department::Engineering)
            .with_status("open")
            .with_field("severity", json!(3));

        assert_eq!(snapshot.field("status"), Some(json!("open")));
        assert_eq!(snapshot.field("department"), Some(json!("engineering")));
        assert_eq!(snapshot.field("severity"), Some(json!(3)));
        assert_eq!(snapshot.field("missing"), None);
    }

    #[test]
    fn snapshot_deserializes_with_defaults() {
        let snapshot: EntitySnapshot =
            serde_json::from_value(json!({"entityType": "document", "entityId": "DOC-1"}))
                .unwrap();
        assert_eq!(snapshot.version, 0);
        assert!(snapshot.fields.is_empty());
        assert_eq!(snapshot.key().to_string(), "document/DOC-1");
    }
}
