//! Cypher statement builder.
//!
//! Two-tier rule: structural names (labels, relationship types, property
//! keys) are written into the statement text, and only after they pass the
//! `[A-Z0-9_]` / `[a-z0-9_]` whitelist; every value travels as a parameter.
//! Nothing here quotes or escapes: a name that fails the whitelist is
//! rejected.

use std::collections::BTreeMap;

use strata_core::config::UniquenessMode;
use strata_core::naming::{domain_label, is_lower_ident, is_upper_ident};
use strata_core::{
    DomainSchema, EntityId, ObjectNode, ObjectRelationship, Properties, PropertyDecls,
    PropertyValue, RelSchemaKey, RelationshipSchema, Result, StrataError, TypeSchema,
};

/// A statement parameter.
#[derive(Debug, Clone, PartialEq)]
pub enum Param {
    String(String),
    Integer(i64),
    Float(f64),
    Boolean(bool),
    Strings(Vec<String>),
    Map(Properties),
}

impl From<&str> for Param {
    fn from(s: &str) -> Self {
        Self::String(s.to_string())
    }
}

impl From<String> for Param {
    fn from(s: String) -> Self {
        Self::String(s)
    }
}

impl From<&String> for Param {
    fn from(s: &String) -> Self {
        Self::String(s.clone())
    }
}

impl From<&EntityId> for Param {
    fn from(id: &EntityId) -> Self {
        Self::String(id.0.clone())
    }
}

impl From<i64> for Param {
    fn from(i: i64) -> Self {
        Self::Integer(i)
    }
}

impl From<Vec<String>> for Param {
    fn from(v: Vec<String>) -> Self {
        Self::Strings(v)
    }
}

impl From<Properties> for Param {
    fn from(m: Properties) -> Self {
        Self::Map(m)
    }
}

impl From<&PropertyValue> for Param {
    fn from(v: &PropertyValue) -> Self {
        match v {
            PropertyValue::String(s) => Self::String(s.clone()),
            PropertyValue::Integer(i) => Self::Integer(*i),
            PropertyValue::Float(f) => Self::Float(*f),
            PropertyValue::Boolean(b) => Self::Boolean(*b),
        }
    }
}

/// Statement text plus its parameter map.
#[derive(Debug, Clone, PartialEq)]
pub struct Statement {
    pub text: String,
    pub params: BTreeMap<String, Param>,
}

impl Statement {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            params: BTreeMap::new(),
        }
    }

    pub fn param(mut self, key: &str, value: impl Into<Param>) -> Self {
        self.params.insert(key.to_string(), value.into());
        self
    }
}

// ── Structural name guards ───────────────────────────────────────

/// Admit an upper-case structural name (label or relationship type).
pub fn label(name: &str) -> Result<&str> {
    if is_upper_ident(name) {
        Ok(name)
    } else {
        Err(StrataError::InvalidName {
            value: name.to_string(),
            reason: "not admissible as a label",
        })
    }
}

/// Admit a lower-case structural name (property key).
pub fn key(name: &str) -> Result<&str> {
    if is_lower_ident(name) {
        Ok(name)
    } else {
        Err(StrataError::InvalidPropertyKey {
            key: name.to_string(),
            reason: "not admissible as a property key",
        })
    }
}

fn label_chain<'a>(labels: impl IntoIterator<Item = &'a String>) -> Result<String> {
    let mut out = String::new();
    for l in labels {
        out.push(':');
        out.push_str(label(l)?);
    }
    Ok(out)
}

fn removal_list(var: &str, keys: &[String]) -> Result<String> {
    let mut parts = Vec::with_capacity(keys.len());
    for k in keys {
        parts.push(format!("{var}.{}", key(k)?));
    }
    Ok(parts.join(", "))
}

/// Take the write lock on `var` for the rest of the transaction. Reads of a
/// locked entity see every write committed before the lock was granted.
fn lock(var: &str) -> String {
    format!("SET {var}._lock = true REMOVE {var}._lock")
}

fn decls_json(decls: &PropertyDecls) -> Result<String> {
    serde_json::to_string(decls).map_err(StrataError::internal)
}

// ── Bootstrap and constraints ────────────────────────────────────

fn requirement(mode: UniquenessMode) -> &'static str {
    match mode {
        UniquenessMode::NodeKey => "IS NODE KEY",
        UniquenessMode::Unique => "IS UNIQUE",
    }
}

/// Constraints and indexes on the schema entities themselves.
pub fn bootstrap(mode: UniquenessMode) -> Vec<Statement> {
    let req = requirement(mode);
    vec![
        Statement::new(
            "CREATE CONSTRAINT domain_schema_name IF NOT EXISTS
             FOR (d:DomainSchema) REQUIRE d.name IS UNIQUE",
        ),
        Statement::new(format!(
            "CREATE CONSTRAINT type_schema_key IF NOT EXISTS
             FOR (t:TypeSchema) REQUIRE (t.name, t.domain) {req}"
        )),
        Statement::new(format!(
            "CREATE CONSTRAINT relationship_schema_key IF NOT EXISTS
             FOR (r:RelationshipSchema) REQUIRE (r.name, r.domain, r.from_type, r.to_type) {req}"
        )),
        Statement::new("CREATE INDEX domain_schema_id IF NOT EXISTS FOR (d:DomainSchema) ON (d.id)"),
        Statement::new("CREATE INDEX type_schema_id IF NOT EXISTS FOR (t:TypeSchema) ON (t.id)"),
        Statement::new(
            "CREATE INDEX relationship_schema_id IF NOT EXISTS FOR (r:RelationshipSchema) ON (r.id)",
        ),
    ]
}

/// `(name, type, domain)` uniqueness for every node carrying `node_label`.
pub fn node_key(node_label: &str, mode: UniquenessMode) -> Result<Statement> {
    let l = label(node_label)?;
    let constraint = format!("node_key_{}", l.to_ascii_lowercase());
    Ok(Statement::new(format!(
        "CREATE CONSTRAINT {constraint} IF NOT EXISTS
         FOR (n:{l}) REQUIRE (n.name, n.type, n.domain) {}",
        requirement(mode)
    )))
}

// ── Domains ──────────────────────────────────────────────────────

const DOMAIN_RETURN: &str = "RETURN d.id AS id, d.name AS name";

pub fn insert_domain(d: &DomainSchema) -> Statement {
    Statement::new("CREATE (d:DomainSchema {id: $id, name: $name})")
        .param("id", &d.id)
        .param("name", &d.name)
}

pub fn domain_by_id(id: &EntityId) -> Statement {
    Statement::new(format!("MATCH (d:DomainSchema {{id: $id}}) {DOMAIN_RETURN}")).param("id", id)
}

pub fn domain_by_name(name: &str) -> Statement {
    Statement::new(format!("MATCH (d:DomainSchema {{name: $name}}) {DOMAIN_RETURN}"))
        .param("name", name)
}

pub fn list_domains() -> Statement {
    Statement::new(format!("MATCH (d:DomainSchema) {DOMAIN_RETURN} ORDER BY d.name, d.id"))
}

pub fn set_domain_name(id: &EntityId, name: &str) -> Statement {
    Statement::new(format!(
        "MATCH (d:DomainSchema {{id: $id}}) SET d.name = $name {DOMAIN_RETURN}"
    ))
    .param("id", id)
    .param("name", name)
}

/// Move every schema and object of domain `old` to `new`.
pub fn move_domain(old: &str, new: &str) -> Result<Vec<Statement>> {
    let old_label = domain_label(old);
    let new_label = domain_label(new);
    let (ol, nl) = (label(&old_label)?, label(&new_label)?);
    Ok(vec![
        Statement::new("MATCH (t:TypeSchema {domain: $old}) SET t.domain = $new")
            .param("old", old)
            .param("new", new),
        Statement::new("MATCH (r:RelationshipSchema {domain: $old}) SET r.domain = $new")
            .param("old", old)
            .param("new", new),
        Statement::new(format!(
            "MATCH (n:{ol}) REMOVE n:{ol} SET n:{nl}, n.domain = $new"
        ))
        .param("new", new),
        Statement::new(format!(
            "MATCH (:{nl})-[r]->() WHERE r.domain = $old SET r.domain = $new"
        ))
        .param("old", old)
        .param("new", new),
    ])
}

pub fn count_domain_nodes(domain: &str) -> Result<Statement> {
    let dl = domain_label(domain);
    Ok(Statement::new(format!(
        "MATCH (n:{}) RETURN count(n) AS cnt",
        label(&dl)?
    )))
}

pub fn delete_domain(id: &EntityId, domain: &str) -> Vec<Statement> {
    vec![
        Statement::new(
            "MATCH (s) WHERE (s:TypeSchema OR s:RelationshipSchema) AND s.domain = $domain
             DETACH DELETE s",
        )
        .param("domain", domain),
        Statement::new("MATCH (d:DomainSchema {id: $id}) DETACH DELETE d").param("id", id),
    ]
}

// ── Types ────────────────────────────────────────────────────────

const TYPE_RETURN: &str =
    "RETURN t.id AS id, t.name AS name, t.domain AS domain, t.properties AS properties";

/// Create the type only if its domain exists; no row back means no domain.
pub fn insert_type(t: &TypeSchema) -> Result<Statement> {
    Ok(Statement::new(
        "MATCH (d:DomainSchema {name: $domain})
         CREATE (t:TypeSchema {id: $id, name: $name, domain: $domain, properties: $properties})
         RETURN t.id AS id",
    )
    .param("id", &t.id)
    .param("name", &t.name)
    .param("domain", &t.domain)
    .param("properties", decls_json(&t.properties)?))
}

pub fn type_by_id(id: &EntityId) -> Statement {
    Statement::new(format!("MATCH (t:TypeSchema {{id: $id}}) {TYPE_RETURN}")).param("id", id)
}

pub fn type_by_name(domain: &str, name: &str) -> Statement {
    Statement::new(format!(
        "MATCH (t:TypeSchema {{domain: $domain, name: $name}}) {TYPE_RETURN}"
    ))
    .param("domain", domain)
    .param("name", name)
}

/// Lock the type and return it as it stands.
pub fn lock_type(id: &EntityId) -> Statement {
    Statement::new(format!(
        "MATCH (t:TypeSchema {{id: $id}}) {} {TYPE_RETURN}",
        lock("t")
    ))
    .param("id", id)
}

pub fn lock_type_by_name(domain: &str, name: &str) -> Statement {
    Statement::new(format!(
        "MATCH (t:TypeSchema {{domain: $domain, name: $name}}) {} {TYPE_RETURN}",
        lock("t")
    ))
    .param("domain", domain)
    .param("name", name)
}

pub fn list_types(domain: Option<&str>) -> Statement {
    match domain {
        Some(d) => Statement::new(format!(
            "MATCH (t:TypeSchema {{domain: $domain}}) {TYPE_RETURN} ORDER BY t.name, t.id"
        ))
        .param("domain", d),
        None => Statement::new(format!(
            "MATCH (t:TypeSchema) {TYPE_RETURN} ORDER BY t.domain, t.name, t.id"
        )),
    }
}

pub fn set_type_name(id: &EntityId, name: &str) -> Statement {
    Statement::new(format!(
        "MATCH (t:TypeSchema {{id: $id}}) SET t.name = $name {TYPE_RETURN}"
    ))
    .param("id", id)
    .param("name", name)
}

/// Relabel the nodes of `domain.old` and repoint relationship schemas.
pub fn retype_nodes(domain: &str, old: &str, new: &str) -> Result<Vec<Statement>> {
    let dl = domain_label(domain);
    let (dl, ol, nl) = (label(&dl)?, label(old)?, label(new)?);
    Ok(vec![
        Statement::new(format!(
            "MATCH (n:{dl}:{ol}) WHERE n.type = $old REMOVE n:{ol} SET n:{nl}, n.type = $new"
        ))
        .param("old", old)
        .param("new", new),
        Statement::new(
            "MATCH (r:RelationshipSchema {domain: $domain, from_type: $old}) SET r.from_type = $new",
        )
        .param("domain", domain)
        .param("old", old)
        .param("new", new),
        Statement::new(
            "MATCH (r:RelationshipSchema {domain: $domain, to_type: $old}) SET r.to_type = $new",
        )
        .param("domain", domain)
        .param("old", old)
        .param("new", new),
    ])
}

pub fn count_type_nodes(domain: &str, type_name: &str) -> Result<Statement> {
    let dl = domain_label(domain);
    Ok(Statement::new(format!(
        "MATCH (n:{}:{}) WHERE n.type = $type RETURN count(n) AS cnt",
        label(&dl)?,
        label(type_name)?
    ))
    .param("type", type_name))
}

pub fn count_type_references(domain: &str, type_name: &str) -> Statement {
    Statement::new(
        "MATCH (r:RelationshipSchema {domain: $domain})
         WHERE r.from_type = $type OR r.to_type = $type
         RETURN count(r) AS cnt",
    )
    .param("domain", domain)
    .param("type", type_name)
}

pub fn delete_type(id: &EntityId) -> Statement {
    Statement::new("MATCH (t:TypeSchema {id: $id}) DELETE t").param("id", id)
}

pub fn set_type_properties(id: &EntityId, decls: &PropertyDecls) -> Result<Statement> {
    Ok(Statement::new(format!(
        "MATCH (t:TypeSchema {{id: $id}}) SET t.properties = $properties {TYPE_RETURN}"
    ))
    .param("id", id)
    .param("properties", decls_json(decls)?))
}

/// Rename and strip property keys on every node of `domain.type_name`.
pub fn rewrite_node_keys(
    domain: &str,
    type_name: &str,
    renamed: &[(String, String)],
    removed: &[String],
) -> Result<Vec<Statement>> {
    let dl = domain_label(domain);
    let (dl, tl) = (label(&dl)?, label(type_name)?);
    let mut out = Vec::new();
    for (from, to) in renamed {
        let (f, t) = (key(from)?, key(to)?);
        out.push(
            Statement::new(format!(
                "MATCH (n:{dl}:{tl}) WHERE n.type = $type AND n.{f} IS NOT NULL
                 SET n.{t} = n.{f} REMOVE n.{f}"
            ))
            .param("type", type_name),
        );
    }
    if !removed.is_empty() {
        out.push(
            Statement::new(format!(
                "MATCH (n:{dl}:{tl}) WHERE n.type = $type REMOVE {}",
                removal_list("n", removed)?
            ))
            .param("type", type_name),
        );
    }
    Ok(out)
}

// ── Relationship schemas ─────────────────────────────────────────

const REL_SCHEMA_RETURN: &str = "RETURN s.id AS id, s.name AS name, s.domain AS domain, \
     s.from_type AS from_type, s.to_type AS to_type, s.properties AS properties";

/// Create the schema only if both endpoint types exist.
pub fn insert_rel_schema(s: &RelationshipSchema) -> Result<Statement> {
    Ok(Statement::new(
        "MATCH (f:TypeSchema {domain: $domain, name: $from_type})
         MATCH (t:TypeSchema {domain: $domain, name: $to_type})
         CREATE (s:RelationshipSchema {id: $id, name: $name, domain: $domain,
                 from_type: $from_type, to_type: $to_type, properties: $properties})
         RETURN s.id AS id",
    )
    .param("id", &s.id)
    .param("name", &s.name)
    .param("domain", &s.domain)
    .param("from_type", &s.from_type)
    .param("to_type", &s.to_type)
    .param("properties", decls_json(&s.properties)?))
}

pub fn rel_schema_by_id(id: &EntityId) -> Statement {
    Statement::new(format!(
        "MATCH (s:RelationshipSchema {{id: $id}}) {REL_SCHEMA_RETURN}"
    ))
    .param("id", id)
}

pub fn rel_schema_by_key(k: &RelSchemaKey) -> Statement {
    Statement::new(format!(
        "MATCH (s:RelationshipSchema {{name: $name, domain: $domain, \
         from_type: $from_type, to_type: $to_type}}) {REL_SCHEMA_RETURN}"
    ))
    .param("name", &k.name)
    .param("domain", &k.domain)
    .param("from_type", &k.from_type)
    .param("to_type", &k.to_type)
}

pub fn lock_rel_schema(id: &EntityId) -> Statement {
    Statement::new(format!(
        "MATCH (s:RelationshipSchema {{id: $id}}) {} {REL_SCHEMA_RETURN}",
        lock("s")
    ))
    .param("id", id)
}

/// Lock the schema an edge `name` from `from` to `to` would be governed by.
pub fn lock_governing(name: &str, domain: &str, from: &EntityId, to: &EntityId) -> Statement {
    Statement::new(format!(
        "MATCH (a {{id: $from}}) WHERE a.type IS NOT NULL
         MATCH (b {{id: $to}}) WHERE b.type IS NOT NULL
         MATCH (s:RelationshipSchema {{name: $name, domain: $domain,
                from_type: a.type, to_type: b.type}})
         {} {REL_SCHEMA_RETURN}",
        lock("s")
    ))
    .param("from", from)
    .param("to", to)
    .param("name", name)
    .param("domain", domain)
}

/// Lock the schema governing an existing relationship.
pub fn lock_schema_of(rel: &EntityId) -> Statement {
    Statement::new(format!(
        "MATCH (a)-[r {{id: $id}}]->(b)
         MATCH (s:RelationshipSchema {{name: type(r), domain: r.domain,
                from_type: a.type, to_type: b.type}})
         {} {REL_SCHEMA_RETURN}",
        lock("s")
    ))
    .param("id", rel)
}

pub fn list_rel_schemas(domain: Option<&str>) -> Statement {
    match domain {
        Some(d) => Statement::new(format!(
            "MATCH (s:RelationshipSchema {{domain: $domain}}) {REL_SCHEMA_RETURN}
             ORDER BY s.name, s.from_type, s.to_type, s.id"
        ))
        .param("domain", d),
        None => Statement::new(format!(
            "MATCH (s:RelationshipSchema) {REL_SCHEMA_RETURN}
             ORDER BY s.domain, s.name, s.from_type, s.to_type, s.id"
        )),
    }
}

pub fn set_rel_schema_name(id: &EntityId, name: &str) -> Statement {
    Statement::new(format!(
        "MATCH (s:RelationshipSchema {{id: $id}}) SET s.name = $name {REL_SCHEMA_RETURN}"
    ))
    .param("id", id)
    .param("name", name)
}

pub fn set_rel_schema_properties(id: &EntityId, decls: &PropertyDecls) -> Result<Statement> {
    Ok(Statement::new(format!(
        "MATCH (s:RelationshipSchema {{id: $id}}) SET s.properties = $properties {REL_SCHEMA_RETURN}"
    ))
    .param("id", id)
    .param("properties", decls_json(decls)?))
}

/// `MATCH` clause selecting every relationship governed by `k`.
fn governed(k: &RelSchemaKey) -> Result<String> {
    let dl = domain_label(&k.domain);
    Ok(format!(
        "MATCH (a:{dl})-[r:{rel}]->(b:{dl}) WHERE a.type = $from_type AND b.type = $to_type",
        dl = label(&dl)?,
        rel = label(&k.name)?
    ))
}

fn with_endpoints(s: Statement, k: &RelSchemaKey) -> Statement {
    s.param("from_type", &k.from_type).param("to_type", &k.to_type)
}

pub fn count_governed(k: &RelSchemaKey) -> Result<Statement> {
    Ok(with_endpoints(
        Statement::new(format!("{} RETURN count(r) AS cnt", governed(k)?)),
        k,
    ))
}

/// Re-type every relationship governed by `k` to `new_name`.
pub fn retype_governed(k: &RelSchemaKey, new_name: &str) -> Result<Statement> {
    Ok(with_endpoints(
        Statement::new(format!(
            "{} CREATE (a)-[r2:{}]->(b) SET r2 = properties(r) DELETE r",
            governed(k)?,
            label(new_name)?
        )),
        k,
    ))
}

pub fn rewrite_rel_keys(
    k: &RelSchemaKey,
    renamed: &[(String, String)],
    removed: &[String],
) -> Result<Vec<Statement>> {
    let matcher = governed(k)?;
    let mut out = Vec::new();
    for (from, to) in renamed {
        let (f, t) = (key(from)?, key(to)?);
        out.push(with_endpoints(
            Statement::new(format!(
                "{matcher} AND r.{f} IS NOT NULL SET r.{t} = r.{f} REMOVE r.{f}"
            )),
            k,
        ));
    }
    if !removed.is_empty() {
        out.push(with_endpoints(
            Statement::new(format!("{matcher} REMOVE {}", removal_list("r", removed)?)),
            k,
        ));
    }
    Ok(out)
}

pub fn delete_rel_schema(id: &EntityId) -> Statement {
    Statement::new("MATCH (s:RelationshipSchema {id: $id}) DELETE s").param("id", id)
}

// ── Object nodes ─────────────────────────────────────────────────

const NODE_RETURN: &str = "RETURN n AS n, labels(n) AS labels, keys(n) AS keys";

/// All node attributes, reserved and declared, as one map parameter.
fn node_props(node: &ObjectNode) -> Properties {
    let mut props = node.properties.clone();
    props.insert("id".into(), PropertyValue::String(node.id.0.clone()));
    props.insert("name".into(), PropertyValue::String(node.name.clone()));
    props.insert("type".into(), PropertyValue::String(node.type_name.clone()));
    props.insert("domain".into(), PropertyValue::String(node.domain.clone()));
    props
}

/// Create the node only while its type exists; no row back means no type.
pub fn insert_node(node: &ObjectNode) -> Result<Statement> {
    for k in node.properties.keys() {
        key(k)?;
    }
    Ok(Statement::new(format!(
        "MATCH (t:TypeSchema {{domain: $domain, name: $type}}) \
         CREATE (n{} $props) RETURN n.id AS id",
        label_chain(&node.labels)?
    ))
    .param("domain", &node.domain)
    .param("type", &node.type_name)
    .param("props", node_props(node)))
}

pub fn node_by_id(id: &EntityId) -> Statement {
    Statement::new(format!(
        "MATCH (n {{id: $id}}) WHERE n.type IS NOT NULL {NODE_RETURN}"
    ))
    .param("id", id)
}

pub fn list_nodes(domain: Option<&str>, type_name: Option<&str>) -> Result<Statement> {
    let matcher = match domain {
        Some(d) => {
            let dl = domain_label(d);
            format!("MATCH (n:{}) WHERE n.type IS NOT NULL", label(&dl)?)
        }
        None => "MATCH (n) WHERE n.type IS NOT NULL AND n.domain IS NOT NULL".to_string(),
    };
    let mut stmt = match type_name {
        Some(t) => Statement::new(format!("{matcher} AND n.type = $type")).param("type", t),
        None => Statement::new(matcher),
    };
    stmt.text
        .push_str(&format!(" {NODE_RETURN} ORDER BY n.domain, n.type, n.name, n.id"));
    Ok(stmt)
}

pub fn set_node_name(id: &EntityId, name: &str) -> Statement {
    Statement::new("MATCH (n {id: $id}) WHERE n.type IS NOT NULL SET n.name = $name")
        .param("id", id)
        .param("name", name)
}

pub fn delete_node(id: &EntityId) -> Statement {
    Statement::new("MATCH (n {id: $id}) WHERE n.type IS NOT NULL DETACH DELETE n").param("id", id)
}

pub fn update_node_labels(id: &EntityId, add: &[String], remove: &[String]) -> Result<Statement> {
    let mut text = "MATCH (n {id: $id}) WHERE n.type IS NOT NULL".to_string();
    if !add.is_empty() {
        text.push_str(&format!(" SET n{}", label_chain(add)?));
    }
    if !remove.is_empty() {
        text.push_str(&format!(" REMOVE n{}", label_chain(remove)?));
    }
    Ok(Statement::new(text).param("id", id))
}

pub fn update_node_properties(
    id: &EntityId,
    set: &Properties,
    remove: &[String],
) -> Result<Statement> {
    update_properties(
        "MATCH (n {id: $id}) WHERE n.type IS NOT NULL",
        "n",
        id,
        set,
        remove,
    )
}

fn update_properties(
    matcher: &str,
    var: &str,
    id: &EntityId,
    set: &Properties,
    remove: &[String],
) -> Result<Statement> {
    for k in set.keys() {
        key(k)?;
    }
    let mut stmt = Statement::new(matcher).param("id", id);
    if !set.is_empty() {
        stmt.text.push_str(&format!(" SET {var} += $props"));
        stmt = stmt.param("props", set.clone());
    }
    if !remove.is_empty() {
        stmt.text
            .push_str(&format!(" REMOVE {}", removal_list(var, remove)?));
    }
    Ok(stmt)
}

// ── Object relationships ─────────────────────────────────────────

const REL_RETURN: &str =
    "RETURN r AS r, type(r) AS name, a.id AS from_id, b.id AS to_id, keys(r) AS keys";

/// Create the edge only if both endpoints and its schema exist; no row back
/// means one of them vanished.
pub fn insert_relationship(rel: &ObjectRelationship) -> Result<Statement> {
    let mut props = rel.properties.clone();
    for k in props.keys() {
        key(k)?;
    }
    props.insert("id".into(), PropertyValue::String(rel.id.0.clone()));
    props.insert("domain".into(), PropertyValue::String(rel.domain.clone()));
    Ok(Statement::new(format!(
        "MATCH (a {{id: $from}}) WHERE a.type IS NOT NULL
         MATCH (b {{id: $to}}) WHERE b.type IS NOT NULL
         MATCH (s:RelationshipSchema {{name: $name, domain: $domain,
                from_type: a.type, to_type: b.type}})
         CREATE (a)-[r:{} $props]->(b)
         RETURN r.id AS id",
        label(&rel.name)?
    ))
    .param("from", &rel.from)
    .param("to", &rel.to)
    .param("name", &rel.name)
    .param("domain", &rel.domain)
    .param("props", props))
}

pub fn relationship_by_id(id: &EntityId) -> Statement {
    Statement::new(format!("MATCH (a)-[r {{id: $id}}]->(b) {REL_RETURN}")).param("id", id)
}

pub fn list_relationships(node: Option<&EntityId>) -> Statement {
    let order = "ORDER BY r.domain, type(r), r.id";
    match node {
        Some(id) => Statement::new(format!(
            "MATCH (a)-[r]->(b) WHERE r.id IS NOT NULL AND (a.id = $id OR b.id = $id)
             {REL_RETURN} {order}"
        ))
        .param("id", id),
        None => Statement::new(format!(
            "MATCH (a)-[r]->(b) WHERE r.id IS NOT NULL AND r.domain IS NOT NULL
             {REL_RETURN} {order}"
        )),
    }
}

pub fn retype_relationship(id: &EntityId, new_name: &str) -> Result<Statement> {
    Ok(Statement::new(format!(
        "MATCH (a)-[r {{id: $id}}]->(b)
         CREATE (a)-[r2:{}]->(b) SET r2 = properties(r) DELETE r",
        label(new_name)?
    ))
    .param("id", id))
}

pub fn delete_relationship(id: &EntityId) -> Statement {
    Statement::new("MATCH ()-[r {id: $id}]->() DELETE r").param("id", id)
}

pub fn update_relationship_properties(
    id: &EntityId,
    set: &Properties,
    remove: &[String],
) -> Result<Statement> {
    update_properties("MATCH ()-[r {id: $id}]->()", "r", id, set, remove)
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeSet;

    use super::*;
    use strata_core::ErrorKind;

    fn alice() -> ObjectNode {
        let mut props = Properties::new();
        props.insert(
            "memo".into(),
            PropertyValue::String("it's \"quoted\" }) DETACH DELETE (x".into()),
        );
        ObjectNode::new(
            "FINANCE".into(),
            "ACCOUNT".into(),
            "alice".into(),
            BTreeSet::from(["VIP".to_string()]),
            props,
        )
    }

    #[test]
    fn create_node_passes_values_as_one_map() {
        let node = alice();
        let stmt = insert_node(&node).unwrap();
        assert_eq!(
            stmt.text,
            "MATCH (t:TypeSchema {domain: $domain, name: $type}) \
             CREATE (n:ACCOUNT:VIP:_FINANCE $props) RETURN n.id AS id"
        );
        assert_eq!(stmt.params.len(), 3);
        assert_eq!(stmt.params["type"], Param::from("ACCOUNT"));
        let Param::Map(map) = &stmt.params["props"] else {
            panic!("props must be a map parameter");
        };
        assert_eq!(map["name"], PropertyValue::String("alice".into()));
        assert_eq!(map["type"], PropertyValue::String("ACCOUNT".into()));
        assert_eq!(map["domain"], PropertyValue::String("FINANCE".into()));
        assert_eq!(map["id"], PropertyValue::String(node.id.0.clone()));
        assert!(!stmt.text.contains("quoted"));
    }

    #[test]
    fn values_never_reach_statement_text() {
        let hostile = "x\"}) MATCH (m) DETACH DELETE m //";
        let stmts = [
            domain_by_name(hostile),
            type_by_name("FINANCE", hostile),
            set_node_name(&EntityId::from(hostile), hostile),
            relationship_by_id(&EntityId::from(hostile)),
        ];
        for stmt in stmts {
            assert!(!stmt.text.contains(hostile), "{}", stmt.text);
            assert!(stmt.params.values().any(|p| *p == Param::from(hostile)));
        }
    }

    #[test]
    fn structural_names_are_whitelisted() {
        let mut node = alice();
        node.labels.insert("VIP`) DETACH DELETE n //".into());
        assert_eq!(insert_node(&node).unwrap_err().kind(), ErrorKind::InvalidName);

        assert_eq!(
            update_node_properties(&EntityId::new(), &Properties::new(), &["Bad Key".into()])
                .unwrap_err()
                .kind(),
            ErrorKind::InvalidPropertyKey
        );
        assert!(node_key("account", UniquenessMode::NodeKey).is_err());
    }

    #[test]
    fn node_key_constraint_text() {
        let stmt = node_key("_FINANCE", UniquenessMode::NodeKey).unwrap();
        assert!(stmt.text.contains("CREATE CONSTRAINT node_key__finance IF NOT EXISTS"));
        assert!(stmt.text.contains("FOR (n:_FINANCE)"));
        assert!(stmt.text.contains("REQUIRE (n.name, n.type, n.domain) IS NODE KEY"));

        let unique = node_key("ACCOUNT", UniquenessMode::Unique).unwrap();
        assert!(unique.text.ends_with("IS UNIQUE"));
    }

    #[test]
    fn retype_rewrites_labels_and_endpoints() {
        let stmts = retype_nodes("FINANCE", "ACCOUNT", "LEDGER").unwrap();
        assert_eq!(stmts.len(), 3);
        assert!(stmts[0]
            .text
            .contains("MATCH (n:_FINANCE:ACCOUNT) WHERE n.type = $old REMOVE n:ACCOUNT SET n:LEDGER"));
        assert_eq!(stmts[1].params["new"], Param::from("LEDGER"));
    }

    #[test]
    fn property_update_uses_map_merge_and_key_removal() {
        let mut set = Properties::new();
        set.insert("balance".into(), PropertyValue::Float(1.5));
        let stmt =
            update_node_properties(&EntityId::from("N1"), &set, &["memo".into(), "tier".into()])
                .unwrap();
        assert_eq!(
            stmt.text,
            "MATCH (n {id: $id}) WHERE n.type IS NOT NULL SET n += $props REMOVE n.memo, n.tier"
        );
        assert_eq!(stmt.params["id"], Param::from("N1"));
    }

    #[test]
    fn list_nodes_orders_by_domain_type_name_id() {
        let stmt = list_nodes(Some("FINANCE"), Some("ACCOUNT")).unwrap();
        assert!(stmt.text.starts_with("MATCH (n:_FINANCE) WHERE n.type IS NOT NULL AND n.type = $type"));
        assert!(stmt.text.ends_with("ORDER BY n.domain, n.type, n.name, n.id"));
    }

    #[test]
    fn relationship_create_targets_validated_type() {
        let rel = ObjectRelationship::new(
            "OWES".into(),
            "FINANCE".into(),
            EntityId::from("A"),
            EntityId::from("B"),
            Properties::new(),
        );
        let stmt = insert_relationship(&rel).unwrap();
        assert!(stmt.text.contains("CREATE (a)-[r:OWES $props]->(b)"));
        assert!(stmt.text.contains("MATCH (s:RelationshipSchema {name: $name, domain: $domain,"));
        assert_eq!(stmt.params["from"], Param::from("A"));
        assert_eq!(stmt.params["name"], Param::from("OWES"));

        let mut bad = rel.clone();
        bad.name = "OWES]->(x) DELETE x //".into();
        assert!(insert_relationship(&bad).is_err());
    }

    #[test]
    fn schema_guards_take_the_write_lock() {
        let id = EntityId::from("T1");
        for stmt in [
            lock_type(&id),
            lock_type_by_name("FINANCE", "ACCOUNT"),
            lock_rel_schema(&id),
            lock_schema_of(&id),
            lock_governing("OWES", "FINANCE", &id, &id),
        ] {
            assert!(stmt.text.contains("._lock = true REMOVE "), "{}", stmt.text);
            assert!(stmt.text.contains("AS properties"), "{}", stmt.text);
        }
    }
}
