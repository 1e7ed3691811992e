//! In-memory mesh + solution unit passed between sensing, remeshing and
//! staging.
//!
//! A bundle is always owned by exactly one component. Each stage reads a fresh
//! bundle from disk; nothing is shared across stages.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::AdaptError;

/// Reserved field key for feature-based sensors.
pub const SENSOR_KEY: &str = "sensor";
/// Reserved field key for goal-oriented metrics.
pub const METRIC_KEY: &str = "metric";
/// Reserved field key for the adjoint state carried through remeshing.
pub const ADJOINT_KEY: &str = "adjoint";

/// Element shapes, numbered with their VTK identifiers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ElementKind {
    Line,
    Triangle,
    Quadrilateral,
    Tetrahedron,
    Hexahedron,
    Prism,
    Pyramid,
}

impl ElementKind {
    pub fn vtk_id(self) -> u32 {
        match self {
            ElementKind::Line => 3,
            ElementKind::Triangle => 5,
            ElementKind::Quadrilateral => 9,
            ElementKind::Tetrahedron => 10,
            ElementKind::Hexahedron => 12,
            ElementKind::Prism => 13,
            ElementKind::Pyramid => 14,
        }
    }

    pub fn from_vtk_id(id: u32) -> Option<Self> {
        match id {
            3 => Some(ElementKind::Line),
            5 => Some(ElementKind::Triangle),
            9 => Some(ElementKind::Quadrilateral),
            10 => Some(ElementKind::Tetrahedron),
            12 => Some(ElementKind::Hexahedron),
            13 => Some(ElementKind::Prism),
            14 => Some(ElementKind::Pyramid),
            _ => None,
        }
    }

    pub fn node_count(self) -> usize {
        match self {
            ElementKind::Line => 2,
            ElementKind::Triangle => 3,
            ElementKind::Quadrilateral => 4,
            ElementKind::Tetrahedron => 4,
            ElementKind::Hexahedron => 8,
            ElementKind::Prism => 6,
            ElementKind::Pyramid => 5,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Element {
    pub kind: ElementKind,
    /// 0-based vertex indices.
    pub nodes: Vec<usize>,
}

impl Element {
    pub fn new(kind: ElementKind, nodes: Vec<usize>) -> Self {
        Self { kind, nodes }
    }
}

/// Named boundary with its surface elements.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Marker {
    pub tag: String,
    pub elements: Vec<Element>,
}

/// Per-vertex values with named components, stored row-major.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Field {
    pub components: Vec<String>,
    pub values: Vec<f64>,
}

impl Field {
    pub fn new(components: Vec<String>, values: Vec<f64>) -> Self {
        Self { components, values }
    }

    pub fn width(&self) -> usize {
        self.components.len()
    }

    /// Number of rows, or 0 for a field without components.
    pub fn rows(&self) -> usize {
        if self.components.is_empty() {
            0
        } else {
            self.values.len() / self.components.len()
        }
    }

    pub fn position(&self, name: &str) -> Option<usize> {
        self.components.iter().position(|c| c == name)
    }

    pub fn row(&self, index: usize) -> &[f64] {
        let width = self.width();
        &self.values[index * width..(index + 1) * width]
    }

    /// Copy the named components, in the requested order, into a new field.
    pub fn select(&self, names: &[&str]) -> Result<Field, AdaptError> {
        let positions = names
            .iter()
            .map(|name| {
                self.position(name).ok_or_else(|| {
                    AdaptError::BundleConsistency(format!(
                        "field '{name}' not found (available: {})",
                        self.components.join(", ")
                    ))
                })
            })
            .collect::<Result<Vec<_>, _>>()?;
        Ok(self.pick(&positions))
    }

    /// Split off the named components; returns `(selected, remainder)`.
    pub fn partition(&self, names: &[&str]) -> Result<(Field, Field), AdaptError> {
        let selected = self.select(names)?;
        let keep: Vec<usize> = (0..self.width())
            .filter(|&i| !names.contains(&self.components[i].as_str()))
            .collect();
        Ok((selected, self.pick(&keep)))
    }

    fn pick(&self, positions: &[usize]) -> Field {
        let rows = self.rows();
        let mut values = Vec::with_capacity(rows * positions.len());
        for row in 0..rows {
            let src = self.row(row);
            values.extend(positions.iter().map(|&p| src[p]));
        }
        Field {
            components: positions
                .iter()
                .map(|&p| self.components[p].clone())
                .collect(),
            values,
        }
    }

    fn check(&self, label: &str, vertices: usize) -> Result<(), AdaptError> {
        if self.values.len() != vertices * self.width() {
            return Err(AdaptError::BundleConsistency(format!(
                "{label}: expected {} values ({} vertices x {} components), found {}",
                vertices * self.width(),
                vertices,
                self.width(),
                self.values.len()
            )));
        }
        Ok(())
    }
}

/// Metadata the remesher must not alter.
///
/// Markers are identified by tag only; their elements follow the vertex
/// numbering of whichever mesh carries them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BundleMetadata {
    pub dimension: usize,
    pub marker_tags: Vec<String>,
    pub solution_tag: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MeshSolutionBundle {
    /// Spatial dimension, 2 or 3.
    pub dimension: usize,
    /// Vertex coordinates, `dimension` values per vertex.
    pub coordinates: Vec<f64>,
    /// Volume elements.
    pub elements: Vec<Element>,
    pub markers: Vec<Marker>,
    /// Flow state; its component names are the bundle's solution tag.
    pub solution: Field,
    /// Auxiliary fields keyed by role (`sensor`, `metric`, `adjoint`).
    #[serde(default)]
    pub fields: BTreeMap<String, Field>,
}

impl MeshSolutionBundle {
    /// A mesh without solution data.
    pub fn mesh_only(
        dimension: usize,
        coordinates: Vec<f64>,
        elements: Vec<Element>,
        markers: Vec<Marker>,
    ) -> Self {
        Self {
            dimension,
            coordinates,
            elements,
            markers,
            solution: Field::default(),
            fields: BTreeMap::new(),
        }
    }

    pub fn num_vertices(&self) -> usize {
        if self.dimension == 0 {
            return 0;
        }
        self.coordinates.len() / self.dimension
    }

    pub fn num_elements(&self) -> usize {
        self.elements.len()
    }

    /// True when there is nothing to solve on.
    pub fn is_empty(&self) -> bool {
        self.num_vertices() == 0 || self.elements.is_empty()
    }

    pub fn solution_tag(&self) -> &[String] {
        &self.solution.components
    }

    pub fn metadata(&self) -> BundleMetadata {
        BundleMetadata {
            dimension: self.dimension,
            marker_tags: self.marker_tags(),
            solution_tag: self.solution.components.clone(),
        }
    }

    pub fn marker_tags(&self) -> Vec<String> {
        self.markers.iter().map(|m| m.tag.clone()).collect()
    }

    /// Restore dimension and solution tag from `meta`.
    ///
    /// Boundary elements are kept as they are. The marker tags must already
    /// match `meta`, in the same order.
    pub fn inherit(&mut self, meta: BundleMetadata) -> Result<(), AdaptError> {
        let tags = self.marker_tags();
        if tags != meta.marker_tags {
            return Err(AdaptError::BundleConsistency(format!(
                "boundary markers changed: expected [{}], found [{}]",
                meta.marker_tags.join(", "),
                tags.join(", ")
            )));
        }
        self.dimension = meta.dimension;
        self.solution.components = meta.solution_tag;
        Ok(())
    }

    /// Attach an auxiliary field; the key and its component names must be new.
    pub fn insert_field(&mut self, key: &str, field: Field) -> Result<(), AdaptError> {
        if self.fields.contains_key(key) {
            return Err(AdaptError::BundleConsistency(format!(
                "field '{key}' is already attached"
            )));
        }
        if key != SENSOR_KEY && key != METRIC_KEY {
            let collisions: Vec<&str> = field
                .components
                .iter()
                .filter(|name| self.solution.position(name).is_some())
                .map(String::as_str)
                .collect();
            if !collisions.is_empty() {
                return Err(AdaptError::BundleConsistency(format!(
                    "merging '{key}' would overwrite flow fields: {}",
                    collisions.join(", ")
                )));
            }
        }
        field.check(key, self.num_vertices())?;
        self.fields.insert(key.to_string(), field);
        Ok(())
    }

    pub fn take_field(&mut self, key: &str) -> Option<Field> {
        self.fields.remove(key)
    }

    /// Check dimension, connectivity bounds and field sizes.
    pub fn validate(&self) -> Result<(), AdaptError> {
        if self.dimension != 2 && self.dimension != 3 {
            return Err(AdaptError::BundleConsistency(format!(
                "wrong dimension number {} (expected 2 or 3)",
                self.dimension
            )));
        }
        if self.coordinates.len() % self.dimension != 0 {
            return Err(AdaptError::BundleConsistency(format!(
                "{} coordinates is not a multiple of dimension {}",
                self.coordinates.len(),
                self.dimension
            )));
        }
        let vertices = self.num_vertices();
        let marker_elements = self.markers.iter().flat_map(|m| m.elements.iter());
        for element in self.elements.iter().chain(marker_elements) {
            if element.nodes.len() != element.kind.node_count() {
                return Err(AdaptError::BundleConsistency(format!(
                    "{:?} element has {} nodes",
                    element.kind,
                    element.nodes.len()
                )));
            }
            if let Some(&bad) = element.nodes.iter().find(|&&n| n >= vertices) {
                return Err(AdaptError::BundleConsistency(format!(
                    "element references vertex {bad} but the mesh has {vertices} vertices"
                )));
            }
        }
        self.solution.check("solution", vertices)?;
        for (key, field) in &self.fields {
            field.check(key, vertices)?;
        }
        Ok(())
    }
}

/// Short "N vertices, M elements" summary for logs.
pub struct MeshSize<'a>(pub &'a MeshSolutionBundle);

impl fmt::Display for MeshSize<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} vertices, {} elements",
            self.0.num_vertices(),
            self.0.num_elements()
        )
    }
}
