//! Native solver format: SU2 ASCII meshes and CSV restart files.

use std::fmt::Write as _;
use std::fs;
use std::path::Path;

use anyhow::{Context, Result, anyhow, bail};
use tracing::debug;

use crate::core::bundle::{Element, ElementKind, Field, Marker, MeshSolutionBundle};
use crate::error::AdaptError;

const POINT_ID: &str = "PointID";
const COORDINATE_COLUMNS: [&str; 3] = ["x", "y", "z"];

/// Read a mesh without solution data.
pub fn read_mesh(path: &Path) -> Result<MeshSolutionBundle> {
    let text = fs::read_to_string(path)
        .with_context(|| format!("read SU2 mesh {}", path.display()))?;
    parse_mesh(&text).with_context(|| format!("parse SU2 mesh {}", path.display()))
}

pub fn write_mesh(path: &Path, bundle: &MeshSolutionBundle) -> Result<()> {
    fs::write(path, format_mesh(bundle))
        .with_context(|| format!("write SU2 mesh {}", path.display()))
}

/// Read the non-coordinate columns of a CSV restart file.
pub fn read_solution(path: &Path) -> Result<Field> {
    let text = fs::read_to_string(path)
        .with_context(|| format!("read restart {}", path.display()))?;
    parse_solution(&text).with_context(|| format!("parse restart {}", path.display()))
}

/// Write `field` as a CSV restart next to the mesh coordinates.
pub fn write_solution(
    path: &Path,
    dimension: usize,
    coordinates: &[f64],
    field: &Field,
) -> Result<()> {
    let text = format_solution(dimension, coordinates, field)?;
    fs::write(path, text).with_context(|| format!("write restart {}", path.display()))
}

/// Read a mesh and its flow restart as one bundle.
pub fn read_bundle(mesh: &Path, restart: &Path) -> Result<MeshSolutionBundle> {
    let mut bundle = read_mesh(mesh)?;
    let solution = read_solution(restart)?;
    if solution.rows() != bundle.num_vertices() {
        return Err(AdaptError::BundleConsistency(format!(
            "{} has {} rows but {} has {} vertices",
            restart.display(),
            solution.rows(),
            mesh.display(),
            bundle.num_vertices()
        ))
        .into());
    }
    bundle.solution = solution;
    Ok(bundle)
}

/// Write the mesh and flow solution of `bundle`; auxiliary fields are dropped.
pub fn write_bundle(mesh: &Path, restart: &Path, bundle: &MeshSolutionBundle) -> Result<()> {
    write_mesh(mesh, bundle)?;
    write_solution(restart, bundle.dimension, &bundle.coordinates, &bundle.solution)
}

fn significant_lines(text: &str) -> impl Iterator<Item = &str> {
    text.lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('%'))
}

fn split_keyword(line: &str) -> Option<(&str, &str)> {
    let (key, value) = line.split_once('=')?;
    Some((key.trim(), value.trim()))
}

fn parse_count(value: &str, key: &str) -> Result<usize> {
    // NPOIN may carry a second (domain point) count.
    let first = value.split_whitespace().next().unwrap_or_default();
    first
        .parse()
        .with_context(|| format!("invalid {key} value '{value}'"))
}

fn check_dimension(dimension: usize) -> Result<(), AdaptError> {
    if dimension == 2 || dimension == 3 {
        Ok(())
    } else {
        Err(AdaptError::BundleConsistency(format!(
            "wrong dimension number {dimension} (expected 2 or 3)"
        )))
    }
}

fn next_line<'a>(lines: &mut impl Iterator<Item = &'a str>, what: &str) -> Result<&'a str> {
    lines
        .next()
        .ok_or_else(|| anyhow!("unexpected end of file while reading {what}"))
}

fn expect_keyword<'a>(line: &'a str, key: &str) -> Result<&'a str> {
    match split_keyword(line) {
        Some((found, value)) if found == key => Ok(value),
        _ => bail!("expected {key}= but found '{line}'"),
    }
}

fn parse_element(line: &str) -> Result<Element> {
    let mut tokens = line.split_whitespace();
    let id: u32 = tokens
        .next()
        .ok_or_else(|| anyhow!("empty element line"))?
        .parse()
        .with_context(|| format!("invalid element type in '{line}'"))?;
    let kind = ElementKind::from_vtk_id(id)
        .ok_or_else(|| anyhow!("unsupported element type {id}"))?;
    let nodes = tokens
        .take(kind.node_count())
        .map(|t| t.parse::<usize>().with_context(|| format!("invalid node index '{t}'")))
        .collect::<Result<Vec<_>>>()?;
    if nodes.len() != kind.node_count() {
        bail!("{kind:?} element '{line}' lists {} nodes", nodes.len());
    }
    Ok(Element::new(kind, nodes))
}

fn parse_elements<'a>(
    lines: &mut impl Iterator<Item = &'a str>,
    count: usize,
    what: &str,
) -> Result<Vec<Element>> {
    (0..count)
        .map(|_| parse_element(next_line(lines, what)?))
        .collect()
}

fn parse_mesh(text: &str) -> Result<MeshSolutionBundle> {
    let mut lines = significant_lines(text);
    let mut dimension = None;
    let mut elements = Vec::new();
    let mut coordinates = Vec::new();
    let mut markers = Vec::new();

    while let Some(line) = lines.next() {
        let Some((key, value)) = split_keyword(line) else {
            bail!("unexpected line '{line}'");
        };
        match key {
            "NDIME" => {
                let dim = parse_count(value, key)?;
                check_dimension(dim)?;
                dimension = Some(dim);
            }
            "NELEM" => {
                let count = parse_count(value, key)?;
                elements = parse_elements(&mut lines, count, "elements")?;
            }
            "NPOIN" => {
                let dim = dimension.ok_or_else(|| anyhow!("NPOIN appears before NDIME"))?;
                let count = parse_count(value, key)?;
                coordinates.reserve(count * dim);
                for _ in 0..count {
                    let point = next_line(&mut lines, "points")?;
                    let values = point
                        .split_whitespace()
                        .take(dim)
                        .map(|t| t.parse::<f64>().with_context(|| format!("invalid coordinate '{t}'")))
                        .collect::<Result<Vec<_>>>()?;
                    if values.len() != dim {
                        bail!("point '{point}' has fewer than {dim} coordinates");
                    }
                    coordinates.extend(values);
                }
            }
            "NMARK" => {
                let count = parse_count(value, key)?;
                for _ in 0..count {
                    let tag = expect_keyword(next_line(&mut lines, "markers")?, "MARKER_TAG")?;
                    let size = expect_keyword(next_line(&mut lines, "markers")?, "MARKER_ELEMS")?;
                    let size = parse_count(size, "MARKER_ELEMS")?;
                    markers.push(Marker {
                        tag: tag.to_string(),
                        elements: parse_elements(&mut lines, size, "marker elements")?,
                    });
                }
            }
            other => debug!(keyword = other, "ignoring SU2 mesh keyword"),
        }
    }

    let dimension = dimension.ok_or_else(|| anyhow!("mesh has no NDIME entry"))?;
    let bundle = MeshSolutionBundle::mesh_only(dimension, coordinates, elements, markers);
    bundle.validate()?;
    Ok(bundle)
}

fn format_element(out: &mut String, element: &Element, index: Option<usize>) {
    let _ = write!(out, "{}", element.kind.vtk_id());
    for node in &element.nodes {
        let _ = write!(out, " {node}");
    }
    if let Some(index) = index {
        let _ = write!(out, " {index}");
    }
    out.push('\n');
}

fn format_mesh(bundle: &MeshSolutionBundle) -> String {
    let mut out = String::new();
    let dim = bundle.dimension;
    let _ = writeln!(out, "NDIME= {dim}");
    let _ = writeln!(out, "NELEM= {}", bundle.num_elements());
    for (index, element) in bundle.elements.iter().enumerate() {
        format_element(&mut out, element, Some(index));
    }
    let _ = writeln!(out, "NPOIN= {}", bundle.num_vertices());
    for (index, point) in bundle.coordinates.chunks(dim.max(1)).enumerate() {
        for value in point {
            let _ = write!(out, "{value} ");
        }
        let _ = writeln!(out, "{index}");
    }
    let _ = writeln!(out, "NMARK= {}", bundle.markers.len());
    for marker in &bundle.markers {
        let _ = writeln!(out, "MARKER_TAG= {}", marker.tag);
        let _ = writeln!(out, "MARKER_ELEMS= {}", marker.elements.len());
        for element in &marker.elements {
            format_element(&mut out, element, None);
        }
    }
    out
}

fn unquote(token: &str) -> &str {
    token.trim().trim_matches('"')
}

fn parse_solution(text: &str) -> Result<Field> {
    let mut lines = text.lines().filter(|line| !line.trim().is_empty());
    let header = lines.next().ok_or_else(|| anyhow!("restart file is empty"))?;
    let columns: Vec<&str> = header.split(',').map(unquote).collect();
    let keep: Vec<usize> = columns
        .iter()
        .enumerate()
        .filter(|(_, name)| **name != POINT_ID && !COORDINATE_COLUMNS.contains(name))
        .map(|(i, _)| i)
        .collect();

    let mut values = Vec::new();
    for (row, line) in lines.enumerate() {
        let tokens: Vec<&str> = line.split(',').map(str::trim).collect();
        if tokens.len() != columns.len() {
            bail!(
                "row {row} has {} values but the header has {} columns",
                tokens.len(),
                columns.len()
            );
        }
        for &i in &keep {
            let value = tokens[i]
                .parse::<f64>()
                .with_context(|| format!("row {row}: invalid {} value '{}'", columns[i], tokens[i]))?;
            values.push(value);
        }
    }
    let components = keep.iter().map(|&i| columns[i].to_string()).collect();
    Ok(Field::new(components, values))
}

fn format_solution(dimension: usize, coordinates: &[f64], field: &Field) -> Result<String> {
    let vertices = coordinates.len() / dimension.max(1);
    if field.rows() != vertices && field.width() > 0 {
        return Err(AdaptError::BundleConsistency(format!(
            "solution has {} rows for {vertices} vertices",
            field.rows()
        ))
        .into());
    }
    let mut out = String::new();
    let header: Vec<String> = std::iter::once(POINT_ID)
        .chain(COORDINATE_COLUMNS.iter().copied().take(dimension))
        .chain(field.components.iter().map(String::as_str))
        .map(|name| format!("\"{name}\""))
        .collect();
    let _ = writeln!(out, "{}", header.join(","));
    for (index, point) in coordinates.chunks(dimension.max(1)).enumerate() {
        let _ = write!(out, "{index}");
        for value in point {
            let _ = write!(out, ",{value}");
        }
        if field.width() > 0 {
            for value in field.row(index) {
                let _ = write!(out, ",{value}");
            }
        }
        out.push('\n');
    }
    Ok(out)
}
