//! Built-in property-management registry and seed data.
//!
//! Used when no registry file is configured, and throughout the tests.

use serde_json::{json, Value as Json};

use crate::schema::{Cardinality, EdgeMeta, EntitySchema, FieldKind, FieldMeta, Registry};

const SEEDED_AT: &str = "2024-01-01T00:00:00Z";

fn audited(entity: EntitySchema) -> EntitySchema {
    entity
        .with_field(FieldMeta::new("created_at", FieldKind::Time))
        .with_field(FieldMeta::new("updated_at", FieldKind::Time))
}

/// The sample registry: `lease`, `tenant`, `property`, and the immutable `audit_event`.
pub fn sample_registry() -> Registry {
    let lease = audited(
        EntitySchema::new("lease")
            .with_field(FieldMeta::new("id", FieldKind::Uuid))
            .with_field(FieldMeta::enumeration(
                "status",
                &["pending", "active", "ended", "terminated"],
            ))
            .with_field(FieldMeta::enumeration(
                "lease_type",
                &["fixed_term", "month_to_month", "commercial"],
            ))
            .with_field(FieldMeta::new("base_rent_amount_cents", FieldKind::Int64))
            .with_field(FieldMeta::new("start_date", FieldKind::Time))
            .with_field(FieldMeta::new("end_date", FieldKind::Time).optional())
            .with_field(FieldMeta::new("notes", FieldKind::String).optional()),
    )
    .with_edge(EdgeMeta::new("tenant", "tenant", Cardinality::M2O))
    .with_edge(EdgeMeta::new("property", "property", Cardinality::M2O))
    .with_transition("status", "pending", &["active", "terminated"])
    .with_transition("status", "active", &["ended", "terminated"]);

    let tenant = audited(
        EntitySchema::new("tenant")
            .with_field(FieldMeta::new("id", FieldKind::Uuid))
            .with_field(FieldMeta::new("name", FieldKind::String))
            .with_field(FieldMeta::new("email", FieldKind::String))
            .with_field(FieldMeta::new("phone", FieldKind::String).optional())
            .with_field(FieldMeta::new("tax_id", FieldKind::String).optional().sensitive()),
    )
    .with_edge(EdgeMeta::new("leases", "lease", Cardinality::O2M));

    let property = audited(
        EntitySchema::new("property")
            .with_field(FieldMeta::new("id", FieldKind::Uuid))
            .with_field(FieldMeta::new("name", FieldKind::String))
            .with_field(FieldMeta::new("address", FieldKind::String))
            .with_field(FieldMeta::new("unit_count", FieldKind::Int)),
    )
    .with_edge(EdgeMeta::new("leases", "lease", Cardinality::O2M));

    let audit_event = EntitySchema::new("audit_event")
        .with_field(FieldMeta::new("id", FieldKind::Int64))
        .with_field(FieldMeta::new("action", FieldKind::String))
        .with_field(FieldMeta::new("actor", FieldKind::String))
        .with_field(FieldMeta::new("occurred_at", FieldKind::Time))
        .with_field(FieldMeta::new("payload", FieldKind::Json).optional())
        .immutable();

    Registry::new()
        .with_entity(lease)
        .with_entity(tenant)
        .with_entity(property)
        .with_entity(audit_event)
}

fn seed_id(prefix: char, n: u32) -> String {
    let p: String = std::iter::repeat(prefix).take(8).collect();
    format!("{p}-0000-4000-8000-{n:012}")
}

struct LeaseSeed {
    tenant: u32,
    property: u32,
    status: &'static str,
    lease_type: &'static str,
    rent: i64,
    start: &'static str,
    end: Option<&'static str>,
    notes: Option<&'static str>,
}

const LEASES: &[LeaseSeed] = &[
    LeaseSeed {
        tenant: 1,
        property: 1,
        status: "active",
        lease_type: "fixed_term",
        rent: 150_000,
        start: "2023-06-01T00:00:00Z",
        end: None,
        notes: Some("corner unit"),
    },
    LeaseSeed {
        tenant: 1,
        property: 2,
        status: "ended",
        lease_type: "fixed_term",
        rent: 120_000,
        start: "2021-01-01T00:00:00Z",
        end: Some("2022-12-31T00:00:00Z"),
        notes: None,
    },
    LeaseSeed {
        tenant: 2,
        property: 1,
        status: "active",
        lease_type: "month_to_month",
        rent: 95_000,
        start: "2024-02-01T00:00:00Z",
        end: None,
        notes: None,
    },
    LeaseSeed {
        tenant: 2,
        property: 3,
        status: "pending",
        lease_type: "commercial",
        rent: 420_000,
        start: "2025-01-01T00:00:00Z",
        end: None,
        notes: Some("awaiting signature"),
    },
    LeaseSeed {
        tenant: 3,
        property: 3,
        status: "active",
        lease_type: "commercial",
        rent: 385_000,
        start: "2022-09-15T00:00:00Z",
        end: Some("2027-09-14T00:00:00Z"),
        notes: None,
    },
    LeaseSeed {
        tenant: 3,
        property: 2,
        status: "terminated",
        lease_type: "month_to_month",
        rent: 88_000,
        start: "2023-03-01T00:00:00Z",
        end: Some("2023-08-31T00:00:00Z"),
        notes: Some("early termination"),
    },
];

fn leases_of(pick: impl Fn(&LeaseSeed) -> u32, n: u32) -> Json {
    LEASES
        .iter()
        .enumerate()
        .filter(|(_, l)| pick(*l) == n)
        .map(|(i, _)| Json::String(seed_id('1', i as u32 + 1)))
        .collect()
}

/// Seed document for [`sample_registry`], in the format `MemoryStore::seed` reads.
pub fn sample_data() -> Json {
    let leases: Vec<Json> = LEASES
        .iter()
        .enumerate()
        .map(|(i, l)| {
            json!({
                "id": seed_id('1', i as u32 + 1),
                "status": l.status,
                "lease_type": l.lease_type,
                "base_rent_amount_cents": l.rent,
                "start_date": l.start,
                "end_date": l.end,
                "notes": l.notes,
                "created_at": SEEDED_AT,
                "updated_at": SEEDED_AT,
                "_edges": {
                    "tenant": seed_id('2', l.tenant),
                    "property": seed_id('3', l.property),
                }
            })
        })
        .collect();

    let tenants: Vec<Json> = [
        ("Ann Lee", "ann@example.com", Some("555-0101"), "900-11-2222"),
        ("Bob Ortiz", "bob@example.com", None, "900-33-4444"),
        ("Chen Wu", "chen@example.org", Some("555-0199"), "900-55-6666"),
    ]
    .iter()
    .enumerate()
    .map(|(i, (name, email, phone, tax_id))| {
        let n = i as u32 + 1;
        json!({
            "id": seed_id('2', n),
            "name": name,
            "email": email,
            "phone": phone,
            "tax_id": tax_id,
            "created_at": SEEDED_AT,
            "updated_at": SEEDED_AT,
            "_edges": { "leases": leases_of(|l| l.tenant, n) }
        })
    })
    .collect();

    let properties: Vec<Json> = [
        ("Acme Tower", "1 Main St", 40),
        ("Birch Court", "22 Birch Ave", 12),
        ("Harbor Plaza", "9 Wharf Rd", 64),
    ]
    .iter()
    .enumerate()
    .map(|(i, (name, address, units))| {
        let n = i as u32 + 1;
        json!({
            "id": seed_id('3', n),
            "name": name,
            "address": address,
            "unit_count": units,
            "created_at": SEEDED_AT,
            "updated_at": SEEDED_AT,
            "_edges": { "leases": leases_of(|l| l.property, n) }
        })
    })
    .collect();

    let audit_events = json!([
        {"id": 1, "action": "lease.created", "actor": "system", "occurred_at": SEEDED_AT, "payload": {"lease": seed_id('1', 1)}},
        {"id": 2, "action": "lease.ended", "actor": "ops", "occurred_at": "2023-01-01T00:00:00Z", "payload": null},
    ]);

    json!({
        "lease": leases,
        "tenant": tenants,
        "property": properties,
        "audit_event": audit_events,
    })
}
