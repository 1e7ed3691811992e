//! Test-only collaborators: a scripted solver, a scripted remesher and a
//! temporary case directory with a small fixture mesh.

use std::cell::{Cell, RefCell};
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, anyhow};

use crate::core::bundle::{Element, ElementKind, Field, MeshSolutionBundle};
use crate::core::remesh::RemeshRequest;
use crate::core::sensor::metric_columns;
use crate::core::solver_request::{MetricTarget, SolverRequest};
use crate::core::suffix::add_suffix;
use crate::core::types::{SolverMode, TabularFormat};
use crate::error::AdaptError;
use crate::io::config::{LoadedConfig, load_config};
use crate::io::history::solver_history_path;
use crate::io::process::LogSink;
use crate::io::remesher::Remesher;
use crate::io::solver::{Solver, SolverOutcome};
use crate::io::su2;

/// Unit square split into two triangles, with a wall and a far-field marker.
pub const SQUARE_MESH: &str = "\
NDIME= 2
NELEM= 2
5 0 1 2 0
5 1 3 2 1
NPOIN= 4
0.0 0.0 0
1.0 0.0 1
0.0 1.0 2
1.0 1.0 3
NMARK= 2
MARKER_TAG= wall
MARKER_ELEMS= 1
3 0 1
MARKER_TAG= farfield
MARKER_ELEMS= 3
3 1 3
3 3 2
3 2 0
";

/// Flow columns written by [`ScriptedSolver`] in direct mode.
pub const FLOW_COLUMNS: [&str; 3] = ["Density", "Pressure", "Mach"];
/// Non-metric adjoint columns written by [`ScriptedSolver`].
pub const ADJOINT_COLUMNS: [&str; 1] = ["Adjoint_Density"];

/// One recorded solver call.
#[derive(Debug, Clone, PartialEq)]
pub struct RecordedSolve {
    pub mode: SolverMode,
    pub iterations: u32,
    pub restart_sol: bool,
    pub cfl: Option<f64>,
    pub metric: Option<MetricTarget>,
    pub workdir: PathBuf,
}

/// Solver double that writes plausible restart and history files.
///
/// It reads the requested mesh from `workdir` so restarts always have one row
/// per vertex, and refuses to run when a requested initial guess is missing.
pub struct ScriptedSolver {
    suffix: String,
    format: TabularFormat,
    fail_call: Option<usize>,
    skip_restart_call: Option<usize>,
    calls: RefCell<Vec<RecordedSolve>>,
}

impl ScriptedSolver {
    pub fn new(suffix: &str) -> Self {
        Self {
            suffix: suffix.to_string(),
            format: TabularFormat::Csv,
            fail_call: None,
            skip_restart_call: None,
            calls: RefCell::new(Vec::new()),
        }
    }

    pub fn with_format(mut self, format: TabularFormat) -> Self {
        self.format = format;
        self
    }

    /// Exit with a non-zero status on the `index`-th call (0-based).
    pub fn failing_at(mut self, index: usize) -> Self {
        self.fail_call = Some(index);
        self
    }

    /// Report success but write no restart on the `index`-th call (0-based).
    pub fn without_restart_at(mut self, index: usize) -> Self {
        self.skip_restart_call = Some(index);
        self
    }

    pub fn calls(&self) -> Vec<RecordedSolve> {
        self.calls.borrow().clone()
    }

    fn check_inputs(&self, request: &SolverRequest, workdir: &Path) -> Result<()> {
        if !request.restart_sol {
            return Ok(());
        }
        let mut inputs = Vec::new();
        if let Some(solution) = &request.solution_filename {
            inputs.push(solution.clone());
        }
        if request.mode == SolverMode::DiscreteAdjoint
            && let Some(solution_adj) = &request.solution_adj_filename
        {
            inputs.push(add_suffix(solution_adj, &self.suffix));
        }
        for input in inputs {
            if !workdir.join(&input).is_file() {
                return Err(anyhow!("initial guess {input} not found in {}", workdir.display()));
            }
        }
        Ok(())
    }

    fn restart_field(&self, request: &SolverRequest, mesh: &MeshSolutionBundle) -> Field {
        let vertices = mesh.num_vertices();
        let mut components: Vec<String> = match request.mode {
            SolverMode::Direct => FLOW_COLUMNS.iter().map(|c| c.to_string()).collect(),
            SolverMode::DiscreteAdjoint => {
                ADJOINT_COLUMNS.iter().map(|c| c.to_string()).collect()
            }
        };
        if request.metric.is_some() {
            components.extend(metric_columns(mesh.dimension).iter().map(|c| c.to_string()));
        }
        let width = components.len();
        let mut values = Vec::with_capacity(vertices * width);
        for vertex in 0..vertices {
            for column in 0..width {
                // Metrics stay positive; everything else varies per vertex.
                values.push(1.0 + vertex as f64 * 0.1 + column as f64);
            }
        }
        Field::new(components, values)
    }

    fn write_history(&self, request: &SolverRequest, workdir: &Path) -> Result<()> {
        let path = solver_history_path(workdir, &request.conv_filename, self.format);
        let last = request.iterations.saturating_sub(1);
        let text = match (self.format, request.mode) {
            (TabularFormat::Csv, SolverMode::Direct) => {
                format!("\"Inner_Iter\",\"rms[Rho]\",\"CD\"\n{last},-8.0,0.0125\n")
            }
            (TabularFormat::Csv, SolverMode::DiscreteAdjoint) => {
                format!("\"Inner_Iter\",\"rms[A_Rho]\",\"Sens_Geo\"\n{last},-9.0,0.5\n")
            }
            (TabularFormat::Tecplot, mode) => format!(
                "TITLE = \"scripted\"\nVARIABLES = \"Inner_Iter\",\"rms\"\nZONE T= \"{mode}\"\n{last}, -8.0\n"
            ),
        };
        fs::write(&path, text).with_context(|| format!("write {}", path.display()))
    }
}

impl Solver for ScriptedSolver {
    fn invoke(
        &self,
        request: &SolverRequest,
        workdir: &Path,
        _sink: &mut LogSink,
    ) -> Result<SolverOutcome> {
        let index = self.calls.borrow().len();
        self.calls.borrow_mut().push(RecordedSolve {
            mode: request.mode,
            iterations: request.iterations,
            restart_sol: request.restart_sol,
            cfl: request.cfl,
            metric: request.metric,
            workdir: workdir.to_path_buf(),
        });
        if self.fail_call == Some(index) {
            return Ok(SolverOutcome::failed(Some(1)));
        }
        self.check_inputs(request, workdir)?;

        let mesh = su2::read_mesh(&workdir.join(&request.mesh_filename))?;
        self.write_history(request, workdir)?;
        if self.skip_restart_call != Some(index) {
            let restart = workdir.join(request.expected_restart(&self.suffix));
            let field = self.restart_field(request, &mesh);
            su2::write_solution(&restart, mesh.dimension, &mesh.coordinates, &field)?;
        }
        Ok(SolverOutcome::succeeded())
    }
}

/// How [`ScriptedRemesher`] answers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RemeshBehavior {
    /// Split every triangle at its centroid, interpolating all fields, then
    /// renumber the vertices like a real remesher would.
    Refine,
    /// Return a mesh with no vertices.
    Empty,
    /// Fail like a crashed remesher.
    Fail,
}

/// Remesher double recording the requested complexities.
pub struct ScriptedRemesher {
    behavior: RemeshBehavior,
    requests: RefCell<Vec<RemeshRequest>>,
    workdirs: RefCell<Vec<PathBuf>>,
    saw_driver: Cell<bool>,
}

impl ScriptedRemesher {
    pub fn new(behavior: RemeshBehavior) -> Self {
        Self {
            behavior,
            requests: RefCell::new(Vec::new()),
            workdirs: RefCell::new(Vec::new()),
            saw_driver: Cell::new(true),
        }
    }

    pub fn requests(&self) -> Vec<RemeshRequest> {
        self.requests.borrow().clone()
    }

    pub fn workdirs(&self) -> Vec<PathBuf> {
        self.workdirs.borrow().clone()
    }

    /// True if every input bundle carried a sensor or metric field.
    pub fn always_saw_driver(&self) -> bool {
        self.saw_driver.get()
    }
}

impl Remesher for ScriptedRemesher {
    fn remesh(
        &self,
        bundle: MeshSolutionBundle,
        request: &RemeshRequest,
        workdir: &Path,
    ) -> Result<MeshSolutionBundle> {
        self.requests.borrow_mut().push(request.clone());
        self.workdirs.borrow_mut().push(workdir.to_path_buf());
        let has_driver = bundle.fields.contains_key(crate::core::bundle::SENSOR_KEY)
            || bundle.fields.contains_key(crate::core::bundle::METRIC_KEY);
        if !has_driver {
            self.saw_driver.set(false);
        }
        match self.behavior {
            RemeshBehavior::Refine => Ok(reverse_numbering(&refine(&bundle))),
            RemeshBehavior::Empty => Ok(MeshSolutionBundle::mesh_only(
                bundle.dimension,
                Vec::new(),
                Vec::new(),
                bundle.markers.clone(),
            )),
            RemeshBehavior::Fail => {
                Err(AdaptError::Remesh("scripted remesher failure".to_string()).into())
            }
        }
    }
}

/// Insert a centroid vertex in every triangle (1 → 3 triangles).
pub fn refine(bundle: &MeshSolutionBundle) -> MeshSolutionBundle {
    let dim = bundle.dimension;
    let mut out = bundle.clone();
    out.elements.clear();
    for element in &bundle.elements {
        if element.kind != ElementKind::Triangle {
            out.elements.push(element.clone());
            continue;
        }
        let centroid = out.num_vertices();
        for axis in 0..dim {
            let mean = element
                .nodes
                .iter()
                .map(|&n| bundle.coordinates[n * dim + axis])
                .sum::<f64>()
                / 3.0;
            out.coordinates.push(mean);
        }
        let fields = std::iter::once(&mut out.solution).chain(out.fields.values_mut());
        for field in fields {
            let width = field.width();
            for column in 0..width {
                let mean = element
                    .nodes
                    .iter()
                    .map(|&n| field.values[n * width + column])
                    .sum::<f64>()
                    / 3.0;
                field.values.push(mean);
            }
        }
        let [a, b, c] = [element.nodes[0], element.nodes[1], element.nodes[2]];
        for (p, q) in [(a, b), (b, c), (c, a)] {
            out.elements
                .push(Element::new(ElementKind::Triangle, vec![p, q, centroid]));
        }
    }
    out
}

/// Renumber vertices in reverse order (`n` becomes `N - 1 - n`).
///
/// Coordinates, field rows, volume elements and marker elements all move
/// together, so the mesh is geometrically unchanged.
pub fn reverse_numbering(bundle: &MeshSolutionBundle) -> MeshSolutionBundle {
    let vertices = bundle.num_vertices();
    let renumber = |element: &Element| {
        Element::new(
            element.kind,
            element.nodes.iter().map(|&n| vertices - 1 - n).collect(),
        )
    };
    let reverse_rows = |values: &[f64], width: usize| -> Vec<f64> {
        if width == 0 {
            return Vec::new();
        }
        values.chunks(width).rev().flatten().copied().collect()
    };

    let mut out = bundle.clone();
    out.coordinates = reverse_rows(&bundle.coordinates, bundle.dimension);
    out.elements = bundle.elements.iter().map(renumber).collect();
    for marker in &mut out.markers {
        marker.elements = marker.elements.iter().map(renumber).collect();
    }
    let fields = std::iter::once(&mut out.solution).chain(out.fields.values_mut());
    for field in fields {
        field.values = reverse_rows(&field.values, field.width());
    }
    out
}

/// Sorted coordinates of the vertices on marker `tag`.
pub fn marker_points(bundle: &MeshSolutionBundle, tag: &str) -> Vec<Vec<f64>> {
    let dim = bundle.dimension;
    let mut nodes: Vec<usize> = bundle
        .markers
        .iter()
        .filter(|marker| marker.tag == tag)
        .flat_map(|marker| marker.elements.iter())
        .flat_map(|element| element.nodes.iter().copied())
        .collect();
    nodes.sort_unstable();
    nodes.dedup();
    let mut points: Vec<Vec<f64>> = nodes
        .iter()
        .map(|&n| bundle.coordinates[n * dim..(n + 1) * dim].to_vec())
        .collect();
    points.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
    points
}

/// Temporary case directory holding the fixture mesh and a config file.
pub struct CaseDir {
    dir: tempfile::TempDir,
}

impl CaseDir {
    /// Create a case with `mesh.su2` and `adap.toml` containing `config`.
    pub fn new(config: &str) -> Result<Self> {
        let dir = tempfile::tempdir().context("create case tempdir")?;
        fs::write(dir.path().join("mesh.su2"), SQUARE_MESH).context("write fixture mesh")?;
        fs::write(dir.path().join("adap.toml"), config).context("write config")?;
        Ok(Self { dir })
    }

    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    pub fn config_path(&self) -> PathBuf {
        self.path().join("adap.toml")
    }

    pub fn load(&self) -> Result<LoadedConfig> {
        load_config(&self.config_path())
    }

    pub fn write(&self, name: &str, contents: &str) -> Result<PathBuf> {
        let path = self.path().join(name);
        fs::write(&path, contents).with_context(|| format!("write {}", path.display()))?;
        Ok(path)
    }

    /// Write a restart for the fixture mesh with `columns` filled per vertex.
    pub fn write_restart(&self, name: &str, columns: &[&str]) -> Result<PathBuf> {
        let mesh = su2::read_mesh(&self.path().join("mesh.su2"))?;
        let vertices = mesh.num_vertices();
        let values = (0..vertices * columns.len()).map(|i| 1.0 + i as f64).collect();
        let field = Field::new(columns.iter().map(|c| c.to_string()).collect(), values);
        let path = self.path().join(name);
        su2::write_solution(&path, mesh.dimension, &mesh.coordinates, &field)?;
        Ok(path)
    }

    /// Sorted entry names of `relative` inside the case directory.
    pub fn entries(&self, relative: &str) -> Result<Vec<String>> {
        let dir = self.path().join(relative);
        let mut names = fs::read_dir(&dir)
            .with_context(|| format!("read {}", dir.display()))?
            .map(|entry| entry.map(|e| e.file_name().to_string_lossy().to_string()))
            .collect::<std::io::Result<Vec<_>>>()?;
        names.sort();
        Ok(names)
    }
}
