use std::collections::{BTreeMap, HashSet};
use std::path::Path;

use kdl::{KdlDocument, KdlNode};

use crate::policy::errors::PolicyError;
use crate::policy::types::*;

/// One KDL document before aliases are resolved.
#[derive(Debug, Clone, Default)]
pub struct ParsedAuditConfig {
    pub exposed: Vec<ExposedEntity>,
    pub schemas: Vec<SchemaDeclaration>,
    pub users: Vec<String>,
    /// alias -> raw terms
    pub aliases: Vec<(String, Vec<String>)>,
    pub rows: Vec<PermissionsRow>,
    pub disabled: Vec<String>,
}

/// Parse a KDL document string into typed configuration structs.
pub fn parse_kdl_document(source: &str) -> Result<ParsedAuditConfig, PolicyError> {
    let doc: KdlDocument = source
        .parse()
        .map_err(|e: kdl::KdlError| PolicyError::KdlParse(e.to_string()))?;

    let mut parsed = ParsedAuditConfig::default();

    for node in doc.nodes() {
        match node.name().value() {
            "expose" => {
                let entity_type = first_string_arg(node).ok_or_else(|| {
                    PolicyError::InvalidConfig(
                        "expose node requires a type argument (e.g. expose \"parent\" rootable=#true)"
                            .into(),
                    )
                })?;
                let rootable = node
                    .get("rootable")
                    .and_then(|v| v.as_bool())
                    .unwrap_or(false);
                parsed.exposed.push(ExposedEntity {
                    entity_type,
                    rootable,
                });
            }
            "schema" => {
                let entity_type = first_string_arg(node).ok_or_else(|| {
                    PolicyError::InvalidConfig(
                        "schema node requires a type argument (e.g. schema \"child\" { ... })".into(),
                    )
                })?;

                let mut schema = SchemaDeclaration {
                    entity_type: entity_type.clone(),
                    ..Default::default()
                };

                if let Some(children) = node.children() {
                    for child in children.nodes() {
                        match child.name().value() {
                            "attributes" => {
                                schema.attributes.extend(string_args(child));
                            }
                            "relationship" => {
                                let name = first_string_arg(child).ok_or_else(|| {
                                    PolicyError::InvalidConfig(format!(
                                        "relationship in schema `{entity_type}` requires a name argument"
                                    ))
                                })?;
                                let target = child
                                    .get("type")
                                    .and_then(|v| v.as_string())
                                    .ok_or_else(|| {
                                        PolicyError::InvalidConfig(format!(
                                            "relationship `{name}` in schema `{entity_type}` missing `type` property"
                                        ))
                                    })?;
                                schema.relationships.push((name, target.to_string()));
                            }
                            other => {
                                return Err(PolicyError::InvalidConfig(format!(
                                    "unexpected child `{other}` in schema `{entity_type}` (expected `attributes` or `relationship`)"
                                )));
                            }
                        }
                    }
                }

                parsed.schemas.push(schema);
            }
            "users" => {
                parsed
                    .users
                    .extend(string_args(node).into_iter().filter(|u| !u.is_empty()));
            }
            "alias" => {
                let args = string_args(node);
                let [name, expansion] = args.as_slice() else {
                    return Err(PolicyError::InvalidConfig(
                        "alias node requires a name and an expansion (e.g. alias \"Kids\" \"1,2\")"
                            .into(),
                    ));
                };
                parsed.aliases.push((name.clone(), split_terms(expansion)));
            }
            "permission" => {
                parsed.rows.push(parse_permission_row(node)?);
            }
            "disabled" => {
                parsed.disabled.extend(string_args(node));
            }
            other => {
                tracing::warn!("ignoring unknown top-level KDL node `{other}`");
            }
        }
    }

    Ok(parsed)
}

fn parse_permission_row(node: &KdlNode) -> Result<PermissionsRow, PolicyError> {
    let prop = |key: &str| node.get(key).and_then(|v| v.as_string()).map(str::to_string);
    let required = |key: &str| {
        prop(key).ok_or_else(|| {
            PolicyError::InvalidConfig(format!(
                "permission node missing `{key}` property (e.g. permission user=\"Mo\" entity=\"parent\" ids=\"[All]\" grants=\"READ\")"
            ))
        })
    };

    Ok(PermissionsRow {
        user_alias: required("user")?,
        entity_type: required("entity")?,
        valid_ids_expression: required("ids")?,
        permissions: parse_permissions(&prop("grants").unwrap_or_default())?,
        read_restricted_fields: prop("read-restricted").unwrap_or_default(),
        write_restricted_fields: prop("write-restricted").unwrap_or_default(),
    })
}

/// Extract the first string argument from a KDL node.
fn first_string_arg(node: &KdlNode) -> Option<String> {
    node.entries()
        .iter()
        .find(|e| e.name().is_none())
        .and_then(|e| e.value().as_string())
        .map(|s| s.to_string())
}

/// Every positional string argument of a KDL node.
fn string_args(node: &KdlNode) -> Vec<String> {
    node.entries()
        .iter()
        .filter(|e| e.name().is_none())
        .filter_map(|e| e.value().as_string())
        .map(|s| s.to_string())
        .collect()
}

fn split_terms(s: &str) -> Vec<String> {
    s.split(',')
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .map(str::to_string)
        .collect()
}

/// Load a KDL file, or every `.kdl` file of a directory in name order, and
/// compile them into one configuration.
pub fn load_audit_config(path: &Path) -> Result<AuditConfig, PolicyError> {
    let files = if path.is_dir() {
        let mut entries: Vec<_> = std::fs::read_dir(path)?
            .filter_map(|e| e.ok())
            .map(|e| e.path())
            .filter(|p| p.extension().map(|ext| ext == "kdl").unwrap_or(false))
            .collect();
        entries.sort();
        entries
    } else {
        vec![path.to_path_buf()]
    };

    let mut all_parsed = Vec::with_capacity(files.len());
    for file in &files {
        let contents = std::fs::read_to_string(file).map_err(|source| PolicyError::LoadError {
            path: file.display().to_string(),
            source,
        })?;
        all_parsed.push(parse_kdl_document(&contents)?);
    }

    let config = compile_config(all_parsed)?;

    tracing::info!(
        files = files.len(),
        exposed = config.exposed.len(),
        users = config.users.len(),
        rows = config.rows.len(),
        disabled = config.disabled.len(),
        "Loaded audit configuration"
    );

    Ok(config)
}

/// Merge parsed documents, expand aliases and substitute them into id lists.
pub fn compile_config(parsed: Vec<ParsedAuditConfig>) -> Result<AuditConfig, PolicyError> {
    let mut config = AuditConfig::default();
    let mut raw_aliases: BTreeMap<String, Vec<String>> = BTreeMap::new();

    for p in parsed {
        config.exposed.extend(p.exposed);
        config.schemas.extend(p.schemas);
        for user in p.users {
            if !config.users.contains(&user) {
                config.users.push(user);
            }
        }
        raw_aliases.extend(p.aliases);
        config.rows.extend(p.rows);
        config.disabled.extend(p.disabled);
    }

    for name in raw_aliases.keys() {
        let expanded = expand_alias(name, &raw_aliases)?;
        config
            .aliases
            .insert(name.clone(), expanded.into_vec().join(","));
    }

    for row in config.rows.iter_mut() {
        row.valid_ids_expression = substitute_aliases(&row.valid_ids_expression, &config.aliases);
    }

    Ok(config)
}

/// Fully expand `alias` into terms that are not themselves aliases.
pub fn expand_alias(
    alias: &str,
    aliases: &BTreeMap<String, Vec<String>>,
) -> Result<IdSet, PolicyError> {
    let mut terms = IdSet::new();
    let mut in_stack = HashSet::new();
    let mut path = Vec::new();
    dfs_expand(alias, aliases, &mut in_stack, &mut path, &mut terms)?;
    Ok(terms)
}

fn dfs_expand(
    name: &str,
    aliases: &BTreeMap<String, Vec<String>>,
    in_stack: &mut HashSet<String>,
    path: &mut Vec<String>,
    terms: &mut IdSet,
) -> Result<(), PolicyError> {
    let Some(expansion) = aliases.get(name) else {
        terms.insert(name);
        return Ok(());
    };
    if in_stack.contains(name) {
        path.push(name.to_string());
        return Err(PolicyError::CyclicAlias(path.join(" -> ")));
    }
    in_stack.insert(name.to_string());
    path.push(name.to_string());

    for term in expansion {
        dfs_expand(term, aliases, in_stack, path, terms)?;
    }

    path.pop();
    in_stack.remove(name);
    Ok(())
}

/// Replace every comma-separated term of `template` that names an alias.
/// Bracketed terms and substrings of other terms are left alone.
pub fn substitute_aliases(template: &str, aliases: &BTreeMap<String, String>) -> String {
    template
        .split(',')
        .map(|term| {
            let name = term.trim();
            match aliases.get(name) {
                Some(expansion) if !name.starts_with('[') => term.replacen(name, expansion, 1),
                _ => term.to_string(),
            }
        })
        .collect::<Vec<_>>()
        .join(",")
}
