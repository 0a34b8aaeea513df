//! Shared fixtures for unit tests

use crate::schema::{ColumnSpec, KeyType, ReferenceSpec, RelationKind, Schema, TableSchema};

fn config(table: &mut TableSchema, column: &str, mutable: bool) {
    table.config.insert(column.to_string(), ColumnSpec { mutable });
}

fn reference(table: &mut TableSchema, column: &str, spec: ReferenceSpec) {
    if spec.relation == RelationKind::Child {
        table.children.insert(column.to_string());
    }
    table.references.insert(column.to_string(), spec);
}

fn indexes(table: &mut TableSchema, columns: &[&str]) {
    table.indexes = columns.iter().map(|c| c.to_string()).collect();
}

/// A switch-like schema:
///
/// ```text
/// System (singleton)
/// Bridge ─vlans{int}─▶ VLAN
///        ◀─bridge── Port ─interfaces─▶ Interface
///                   Port ─acls (plain)─▶ ACL ─entries─▶ AclEntry (no natural index)
/// Neighbor [ip, mac] ─ports{str} (plain)─▶ Port
/// Lag ─members (immutable)─▶ LagMember ─port (plain)─▶ Port
/// Lag ─uplinks (plain, immutable)─▶ Port
/// ```
///
/// Immutable config: `System.asset_tag`, `Interface.type`.
pub fn schema() -> Schema {
    let mut system = TableSchema::new("System");
    system.singleton = true;
    config(&mut system, "hostname", true);
    config(&mut system, "asset_tag", false);

    let mut bridge = TableSchema::new("Bridge");
    indexes(&mut bridge, &["name"]);
    config(&mut bridge, "datapath_type", true);
    reference(
        &mut bridge,
        "vlans",
        ReferenceSpec::new("VLAN", RelationKind::Child).keyed(KeyType::Integer),
    );
    bridge.children.insert("Port".to_string());

    let mut vlan = TableSchema::new("VLAN");
    vlan.parent = Some("Bridge".into());
    indexes(&mut vlan, &["id"]);
    config(&mut vlan, "name", true);
    config(&mut vlan, "admin", true);

    let mut port = TableSchema::new("Port");
    port.parent = Some("Bridge".into());
    indexes(&mut port, &["name"]);
    config(&mut port, "admin", true);
    reference(&mut port, "bridge", ReferenceSpec::new("Bridge", RelationKind::Parent));
    reference(&mut port, "interfaces", ReferenceSpec::new("Interface", RelationKind::Child));
    reference(&mut port, "acls", ReferenceSpec::new("ACL", RelationKind::Plain));

    let mut interface = TableSchema::new("Interface");
    interface.parent = Some("Port".into());
    indexes(&mut interface, &["name"]);
    config(&mut interface, "type", false);

    let mut acl = TableSchema::new("ACL");
    indexes(&mut acl, &["name"]);
    reference(&mut acl, "entries", ReferenceSpec::new("AclEntry", RelationKind::Child));

    let mut entry = TableSchema::new("AclEntry");
    entry.parent = Some("ACL".into());
    config(&mut entry, "sequence", true);
    config(&mut entry, "action", true);

    let mut neighbor = TableSchema::new("Neighbor");
    indexes(&mut neighbor, &["ip", "mac"]);
    config(&mut neighbor, "state", true);
    reference(
        &mut neighbor,
        "ports",
        ReferenceSpec::new("Port", RelationKind::Plain).keyed(KeyType::String),
    );

    let mut lag = TableSchema::new("Lag");
    indexes(&mut lag, &["name"]);
    config(&mut lag, "mode", true);
    reference(&mut lag, "members", ReferenceSpec::new("LagMember", RelationKind::Child).immutable());
    reference(&mut lag, "uplinks", ReferenceSpec::new("Port", RelationKind::Plain).immutable());

    let mut member = TableSchema::new("LagMember");
    member.parent = Some("Lag".into());
    indexes(&mut member, &["name"]);
    reference(&mut member, "port", ReferenceSpec::new("Port", RelationKind::Plain));

    Schema::new([system, bridge, vlan, port, interface, acl, entry, neighbor, lag, member])
        .expect("fixture schema is valid")
}
