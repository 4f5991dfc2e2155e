//! User-defined extension fields
//!
//! Extra sheet columns are mapped onto extension fields of the test through a
//! declarative table of [`ExtensionFieldSpec`]s. Scalar kinds parse the cell
//! text; reference kinds resolve through the lookup cache and the workspace.
//! A cell that cannot be parsed or resolved never fails the test: the field
//! is left unset, defaulted, or the offending item dropped, with a warning.

use chrono::{DateTime, FixedOffset, NaiveDateTime, Utc};
use serde::Deserialize;
use std::collections::{BTreeMap, HashSet};
use std::fmt;
use tracing::{debug, warn};

use crate::entities::{EntityRef, FieldValue};
use crate::remote::Workspace;
use crate::sheet::columns::{normalize_header, unrecognized_columns};
use crate::sheet::SheetRow;

use super::lookup::LookupCache;

/// Format of date cells, followed by a zone token
const DATE_FORMAT: &str = "%d-%m-%Y %H:%M:%S";

/// List referenced by the built-in list extension fields
const DEFAULT_LIST: &str = "def_list";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScalarKind {
    String,
    Long,
    Float,
    Boolean,
    Date,
}

/// What a reference extension field points at
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RefKind {
    User,
    Release,
    /// Item of the named list
    List(String),
}

/// Kind of an extension field
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(try_from = "ExtensionFieldConfig")]
pub enum ExtensionFieldSpec {
    Scalar(ScalarKind),
    Reference(RefKind),
    MultiReference(RefKind),
}

/// Extension field as written in the configuration file
///
/// ```yaml
/// extension_fields:
///   severity_udf: { kind: reference, target: list, list: Severity }
///   reviewed_udf: { kind: boolean }
/// ```
#[derive(Debug, Clone, Deserialize)]
pub struct ExtensionFieldConfig {
    pub kind: String,
    #[serde(default)]
    pub target: Option<String>,
    #[serde(default)]
    pub list: Option<String>,
}

impl TryFrom<ExtensionFieldConfig> for ExtensionFieldSpec {
    type Error = String;

    fn try_from(config: ExtensionFieldConfig) -> Result<Self, Self::Error> {
        let scalar = match config.kind.to_lowercase().as_str() {
            "string" => Some(ScalarKind::String),
            "long" => Some(ScalarKind::Long),
            "float" => Some(ScalarKind::Float),
            "boolean" => Some(ScalarKind::Boolean),
            "date" => Some(ScalarKind::Date),
            "reference" | "multi_reference" => None,
            other => {
                return Err(format!(
                    "unknown extension field kind '{}' (expected string, long, float, boolean, date, reference or multi_reference)",
                    other
                ))
            }
        };
        if let Some(kind) = scalar {
            return Ok(ExtensionFieldSpec::Scalar(kind));
        }

        let target = config
            .target
            .as_deref()
            .ok_or_else(|| format!("{} extension fields need a target", config.kind))?;
        let ref_kind = match target.to_lowercase().as_str() {
            "user" => RefKind::User,
            "release" => RefKind::Release,
            "list" => {
                let list = config
                    .list
                    .filter(|l| !l.trim().is_empty())
                    .ok_or_else(|| "list targets need a list name".to_string())?;
                RefKind::List(list)
            }
            other => {
                return Err(format!(
                    "unknown reference target '{}' (expected user, release or list)",
                    other
                ))
            }
        };

        if config.kind.eq_ignore_ascii_case("reference") {
            Ok(ExtensionFieldSpec::Reference(ref_kind))
        } else {
            Ok(ExtensionFieldSpec::MultiReference(ref_kind))
        }
    }
}

impl fmt::Display for ExtensionFieldSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let target = |kind: &RefKind| match kind {
            RefKind::User => "user".to_string(),
            RefKind::Release => "release".to_string(),
            RefKind::List(name) => format!("list {}", name),
        };
        match self {
            ExtensionFieldSpec::Scalar(kind) => write!(f, "{:?}", kind),
            ExtensionFieldSpec::Reference(kind) => write!(f, "reference to {}", target(kind)),
            ExtensionFieldSpec::MultiReference(kind) => {
                write!(f, "multi reference to {}", target(kind))
            }
        }
    }
}

/// Extension fields used when the configuration declares none
pub fn builtin_extension_fields() -> BTreeMap<String, ExtensionFieldSpec> {
    use ExtensionFieldSpec::{MultiReference, Reference, Scalar};

    let list = || RefKind::List(DEFAULT_LIST.to_string());
    [
        ("str_udf", Scalar(ScalarKind::String)),
        ("memo_udf", Scalar(ScalarKind::String)),
        ("long_udf", Scalar(ScalarKind::String)),
        ("int_udf", Scalar(ScalarKind::Float)),
        ("bool_udf", Scalar(ScalarKind::Boolean)),
        ("date_udf", Scalar(ScalarKind::Date)),
        ("usr_ref_udf", Reference(RefKind::User)),
        ("rel_ref_udf", Reference(RefKind::Release)),
        ("list_ref_udf", Reference(list())),
        ("usr_udf", MultiReference(RefKind::User)),
        ("rel_udf", MultiReference(RefKind::Release)),
        ("def_list_udf", MultiReference(list())),
    ]
    .into_iter()
    .map(|(name, spec)| (name.to_string(), spec))
    .collect()
}

/// Parse `dd-mm-yyyy HH:MM:SS <zone>`; zone is UTC, GMT, Z or a numeric offset
pub fn parse_date(text: &str) -> Option<DateTime<Utc>> {
    let text = text.trim();
    let (stamp, zone) = match text.rsplit_once(' ') {
        Some((stamp, zone)) if !zone.contains(':') || zone.starts_with(['+', '-']) => {
            (stamp.trim(), Some(zone))
        }
        _ => (text, None),
    };

    let naive = NaiveDateTime::parse_from_str(stamp, DATE_FORMAT).ok()?;
    let offset = match zone {
        None => FixedOffset::east_opt(0)?,
        Some(z) if ["UTC", "GMT", "Z"].iter().any(|u| z.eq_ignore_ascii_case(u)) => {
            FixedOffset::east_opt(0)?
        }
        Some(z) => parse_offset(z)?,
    };

    let local = naive.and_local_timezone(offset).single()?;
    Some(local.with_timezone(&Utc))
}

/// `+02:00`, `+0200` or `-05`
fn parse_offset(zone: &str) -> Option<FixedOffset> {
    let (sign, digits) = match zone.as_bytes().first()? {
        b'+' => (1, &zone[1..]),
        b'-' => (-1, &zone[1..]),
        _ => return None,
    };
    let digits: String = digits.chars().filter(|c| *c != ':').collect();
    if !digits.chars().all(|c| c.is_ascii_digit()) {
        return None;
    }
    let (hours, minutes) = match digits.len() {
        2 => (digits.parse::<i32>().ok()?, 0),
        4 => (digits[..2].parse::<i32>().ok()?, digits[2..].parse::<i32>().ok()?),
        _ => return None,
    };
    FixedOffset::east_opt(sign * (hours * 3600 + minutes * 60))
}

fn parse_boolean(text: &str) -> Option<bool> {
    match text.to_lowercase().as_str() {
        "true" | "yes" | "y" | "1" => Some(true),
        "false" | "no" | "n" | "0" => Some(false),
        _ => None,
    }
}

/// Extension fields present in a sheet's header
#[derive(Debug, Clone, Default)]
pub struct ExtensionColumns {
    columns: Vec<(String, usize, ExtensionFieldSpec)>,
}

impl ExtensionColumns {
    /// Record the column of every configured field present in the header
    ///
    /// Mandatory columns are never treated as extension fields. Every other
    /// column that matches no configured field is logged and ignored.
    pub fn scan(header: &[String], specs: &BTreeMap<String, ExtensionFieldSpec>) -> Self {
        let by_header: BTreeMap<String, (&String, &ExtensionFieldSpec)> = specs
            .iter()
            .map(|(name, spec)| (normalize_header(name), (name, spec)))
            .collect();
        let known: HashSet<String> = by_header.keys().cloned().collect();

        for (idx, name) in unrecognized_columns(header, &known) {
            warn!(column = %name, index = idx, "column is unused, ignored");
        }

        let mut seen = HashSet::new();
        let mut columns = Vec::new();
        for (idx, name) in header.iter().enumerate() {
            let key = normalize_header(name);
            if crate::sheet::Column::from_header(&key).is_some() {
                continue;
            }
            if let Some((field, spec)) = by_header.get(&key) {
                if seen.insert(key.clone()) {
                    debug!(field = %field, index = idx, kind = %spec, "extension field column");
                    columns.push(((*field).clone(), idx, (*spec).clone()));
                }
            }
        }

        Self { columns }
    }

    pub fn len(&self) -> usize {
        self.columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }

    /// Names of the recognized extension fields, in column order
    pub fn field_names(&self) -> Vec<&str> {
        self.columns.iter().map(|(name, _, _)| name.as_str()).collect()
    }

    /// Resolve every present extension cell of a row
    pub fn resolve(
        &self,
        row: &SheetRow,
        label: &str,
        ws: &dyn Workspace,
        cache: &mut LookupCache,
    ) -> Vec<(String, FieldValue)> {
        let mut values = Vec::new();

        for (field, idx, spec) in &self.columns {
            let Some(raw) = row.cell(*idx).map(str::trim).filter(|s| !s.is_empty()) else {
                continue;
            };

            let value = match spec {
                ExtensionFieldSpec::Scalar(kind) => scalar_value(*kind, raw),
                ExtensionFieldSpec::Reference(kind) => {
                    resolve_reference(kind, raw, field, label, ws, cache).map(FieldValue::Reference)
                }
                ExtensionFieldSpec::MultiReference(kind) => {
                    let refs = resolve_references(kind, raw, field, label, ws, cache);
                    (!refs.is_empty()).then_some(FieldValue::References(refs))
                }
            };

            match value {
                Some(value) => values.push((field.clone(), value)),
                None => warn!(
                    unique_id = label,
                    field = %field,
                    value = raw,
                    "extension field value could not be used, the field will be left blank"
                ),
            }
        }

        values
    }
}

fn scalar_value(kind: ScalarKind, raw: &str) -> Option<FieldValue> {
    match kind {
        ScalarKind::String => Some(FieldValue::Text(raw.to_string())),
        ScalarKind::Long => raw
            .parse::<f64>()
            .ok()
            .filter(|v| v.is_finite())
            .map(|v| FieldValue::Integer(v.trunc() as i64)),
        ScalarKind::Float => raw
            .parse::<f64>()
            .ok()
            .filter(|v| v.is_finite())
            .map(FieldValue::Float),
        ScalarKind::Boolean => parse_boolean(raw).map(FieldValue::Boolean),
        ScalarKind::Date => parse_date(raw).map(FieldValue::Date),
    }
}

fn resolve_reference(
    kind: &RefKind,
    raw: &str,
    field: &str,
    label: &str,
    ws: &dyn Workspace,
    cache: &mut LookupCache,
) -> Option<EntityRef> {
    match kind {
        RefKind::User => Some(match cache.user(raw) {
            Some(user) => user.clone(),
            None => {
                warn!(
                    unique_id = label,
                    field,
                    value = raw,
                    "user not found, using the default user"
                );
                cache.default_user().clone()
            }
        }),
        RefKind::Release => {
            let release = match cache.release(ws, raw) {
                Ok(release) => release,
                Err(e) => {
                    warn!(unique_id = label, field, value = raw, error = %e, "release lookup failed");
                    None
                }
            };
            if release.is_some() {
                return release;
            }
            warn!(
                unique_id = label,
                field,
                value = raw,
                "release not found, using the default release"
            );
            match cache.default_release(ws) {
                Ok(Some(release)) => Some(release),
                Ok(None) => {
                    warn!(unique_id = label, field, "default release not found either");
                    None
                }
                Err(e) => {
                    warn!(unique_id = label, field, error = %e, "default release lookup failed");
                    None
                }
            }
        }
        RefKind::List(list) => match cache.list_item(ws, list, raw) {
            Ok(Some(item)) => Some(item),
            Ok(None) => {
                warn!(
                    unique_id = label,
                    field,
                    list = %list,
                    value = raw,
                    "list item not found, dropped"
                );
                None
            }
            Err(e) => {
                warn!(unique_id = label, field, list = %list, value = raw, error = %e, "list lookup failed");
                None
            }
        },
    }
}

fn resolve_references(
    kind: &RefKind,
    raw: &str,
    field: &str,
    label: &str,
    ws: &dyn Workspace,
    cache: &mut LookupCache,
) -> Vec<EntityRef> {
    let mut seen = HashSet::new();
    let mut refs = Vec::new();

    for item in raw.split(',').map(str::trim).filter(|s| !s.is_empty()) {
        let Some(resolved) = resolve_reference(kind, item, field, label, ws, cache) else {
            continue;
        };
        if seen.insert(resolved.display_name().to_string()) {
            refs.push(resolved);
        } else {
            warn!(
                unique_id = label,
                field,
                value = item,
                "value resolves to an entity already in the field, skipped"
            );
        }
    }

    refs
}
