//! Remesher interchange format: JSON documents checked against embedded
//! JSON Schemas before they are deserialised.

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use jsonschema::Draft;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::core::bundle::{Element, Field, Marker, MeshSolutionBundle};
use crate::error::AdaptError;

const BUNDLE_SCHEMA: &str = include_str!("../../schemas/bundle.v1.schema.json");
const FIELD_SCHEMA: &str = include_str!("../../schemas/field.v1.schema.json");

pub const FORMAT_VERSION: u32 = 1;

#[derive(Serialize)]
struct BundleDocumentRef<'a> {
    version: u32,
    dimension: usize,
    solution_tag: &'a [String],
    coordinates: &'a [f64],
    elements: &'a [Element],
    markers: &'a [Marker],
    solution: &'a Field,
    fields: &'a BTreeMap<String, Field>,
}

#[derive(Deserialize)]
struct BundleDocument {
    dimension: usize,
    solution_tag: Vec<String>,
    coordinates: Vec<f64>,
    elements: Vec<Element>,
    markers: Vec<Marker>,
    solution: Field,
    #[serde(default)]
    fields: BTreeMap<String, Field>,
}

#[derive(Serialize, Deserialize)]
struct FieldDocument {
    version: u32,
    vertices: usize,
    field: Field,
}

pub fn write_bundle(path: &Path, bundle: &MeshSolutionBundle) -> Result<()> {
    let doc = BundleDocumentRef {
        version: FORMAT_VERSION,
        dimension: bundle.dimension,
        solution_tag: bundle.solution_tag(),
        coordinates: &bundle.coordinates,
        elements: &bundle.elements,
        markers: &bundle.markers,
        solution: &bundle.solution,
        fields: &bundle.fields,
    };
    let json = serde_json::to_string(&doc).context("serialize bundle json")?;
    write_atomic(path, &json)
}

/// Load a bundle, validating schema, solution tag and connectivity.
pub fn read_bundle(path: &Path) -> Result<MeshSolutionBundle> {
    let raw = fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?;
    let doc: BundleDocument = parse_validated(&raw, BUNDLE_SCHEMA)
        .with_context(|| format!("load bundle {}", path.display()))?;
    if doc.solution_tag != doc.solution.components {
        return Err(AdaptError::BundleConsistency(format!(
            "{}: solution tag [{}] does not match solution components [{}]",
            path.display(),
            doc.solution_tag.join(", "),
            doc.solution.components.join(", ")
        ))
        .into());
    }
    let bundle = MeshSolutionBundle {
        dimension: doc.dimension,
        coordinates: doc.coordinates,
        elements: doc.elements,
        markers: doc.markers,
        solution: doc.solution,
        fields: doc.fields,
    };
    bundle
        .validate()
        .with_context(|| format!("validate bundle {}", path.display()))?;
    Ok(bundle)
}

/// Write a standalone per-vertex field (the staged adjoint state).
pub fn write_field(path: &Path, vertices: usize, field: &Field) -> Result<()> {
    let doc = FieldDocument {
        version: FORMAT_VERSION,
        vertices,
        field: field.clone(),
    };
    let json = serde_json::to_string(&doc).context("serialize field json")?;
    write_atomic(path, &json)
}

pub fn read_field(path: &Path) -> Result<Field> {
    let raw = fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?;
    let doc: FieldDocument = parse_validated(&raw, FIELD_SCHEMA)
        .with_context(|| format!("load field {}", path.display()))?;
    if doc.field.values.len() != doc.vertices * doc.field.width() {
        return Err(AdaptError::BundleConsistency(format!(
            "{}: {} values for {} vertices x {} components",
            path.display(),
            doc.field.values.len(),
            doc.vertices,
            doc.field.width()
        ))
        .into());
    }
    Ok(doc.field)
}

fn parse_validated<T: for<'de> Deserialize<'de>>(raw: &str, schema_raw: &str) -> Result<T> {
    let instance: Value = serde_json::from_str(raw).context("parse json")?;
    let schema: Value = serde_json::from_str(schema_raw).context("parse schema json")?;
    validate_schema(&instance, &schema)?;
    serde_json::from_value(instance).context("deserialize document")
}

/// Validate a JSON instance against a JSON Schema (Draft 2020-12).
fn validate_schema(instance: &Value, schema: &Value) -> Result<()> {
    let compiled = jsonschema::options()
        .with_draft(Draft::Draft202012)
        .build(schema)
        .context("compile json schema")?;
    let messages: Vec<String> = compiled
        .iter_errors(instance)
        .map(|err| err.to_string())
        .collect();
    if !messages.is_empty() {
        return Err(AdaptError::BundleConsistency(format!(
            "schema validation failed:\n- {}",
            messages.join("\n- ")
        ))
        .into());
    }
    Ok(())
}

fn write_atomic(path: &Path, contents: &str) -> Result<()> {
    let tmp_path = path.with_extension("json.tmp");
    fs::write(&tmp_path, contents).with_context(|| format!("write {}", tmp_path.display()))?;
    fs::rename(&tmp_path, path).with_context(|| format!("replace {}", path.display()))?;
    Ok(())
}
