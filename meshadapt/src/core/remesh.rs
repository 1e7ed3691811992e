//! Remesher request construction and output checks.

use std::fmt;
use std::path::{Path, PathBuf};

use crate::core::bundle::{BundleMetadata, MeshSolutionBundle};
use crate::core::config::AdaptationOptions;
use crate::error::AdaptError;

/// Background mesh and flags passed to every remesher call.
///
/// Ridge detection is disabled (`-nordg`) unless explicitly requested.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackgroundOptions {
    pub back: PathBuf,
    pub flags: Vec<&'static str>,
}

impl BackgroundOptions {
    pub fn new(back_mesh: &Path, options: &AdaptationOptions) -> Self {
        let mut flags = Vec::new();
        if options.invert_back {
            flags.push("-inv-back");
        }
        if options.ortho {
            flags.push("-cart3d-only");
        }
        if !options.ridge_detection {
            flags.push("-nordg");
        }
        Self {
            back: back_mesh.to_path_buf(),
            flags,
        }
    }

    /// Arguments in remesher order; the background path stays one argument.
    pub fn args(&self) -> Vec<String> {
        let mut args = vec!["-back".to_string(), self.back.display().to_string()];
        args.extend(self.flags.iter().map(|flag| flag.to_string()));
        args
    }
}

impl fmt::Display for BackgroundOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "-back {}", self.back.display())?;
        for flag in &self.flags {
            write!(f, " {flag}")?;
        }
        Ok(())
    }
}

/// Sizing request for one remesher call.
#[derive(Debug, Clone, PartialEq)]
pub struct RemeshRequest {
    pub complexity: u64,
    pub hmin: f64,
    pub hmax: f64,
    pub hgrad: Option<f64>,
    pub norm: f64,
    pub background: BackgroundOptions,
}

impl RemeshRequest {
    pub fn new(
        options: &AdaptationOptions,
        background: &BackgroundOptions,
        complexity: u64,
    ) -> Self {
        Self {
            complexity,
            hmin: options.hmin,
            hmax: options.hmax,
            hgrad: options.hgrad,
            norm: options.norm,
            background: background.clone(),
        }
    }

    /// Command-line arguments for a remesher reading `input` and writing `output`.
    pub fn args(&self, input: &Path, output: &Path) -> Vec<String> {
        let mut args = vec![
            "-in".to_string(),
            input.display().to_string(),
            "-out".to_string(),
            output.display().to_string(),
            "-size".to_string(),
            self.complexity.to_string(),
            "-hmin".to_string(),
            self.hmin.to_string(),
            "-hmax".to_string(),
            self.hmax.to_string(),
        ];
        if let Some(hgrad) = self.hgrad {
            args.push("-hgrad".to_string());
            args.push(hgrad.to_string());
        }
        args.push("-Lp".to_string());
        args.push(self.norm.to_string());
        args.extend(self.background.args());
        args
    }
}

/// Reject degenerate remesher output and restore metadata from the input.
///
/// The remesher's own boundary elements are kept; only the marker tags must
/// match the input.
pub fn accept_output(
    mut adapted: MeshSolutionBundle,
    inherited: BundleMetadata,
) -> Result<MeshSolutionBundle, AdaptError> {
    if adapted.is_empty() {
        return Err(AdaptError::Remesh(format!(
            "remesher returned an empty mesh ({} vertices, {} elements)",
            adapted.num_vertices(),
            adapted.num_elements()
        )));
    }
    adapted.inherit(inherited)?;
    adapted
        .validate()
        .map_err(|err| AdaptError::Remesh(format!("remesher output is inconsistent: {err}")))?;
    Ok(adapted)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::bundle::{Element, ElementKind, Field, Marker};

    fn line(a: usize, b: usize) -> Element {
        Element::new(ElementKind::Line, vec![a, b])
    }

    fn marker(tag: &str, elements: Vec<Element>) -> Marker {
        Marker {
            tag: tag.to_string(),
            elements,
        }
    }

    /// Unit square with the wall on `y = 0`, numbered counter-clockwise.
    fn square() -> MeshSolutionBundle {
        let mut bundle = MeshSolutionBundle::mesh_only(
            2,
            vec![0.0, 0.0, 1.0, 0.0, 1.0, 1.0, 0.0, 1.0],
            vec![
                Element::new(ElementKind::Triangle, vec![0, 1, 2]),
                Element::new(ElementKind::Triangle, vec![0, 2, 3]),
            ],
            vec![
                marker("wall", vec![line(0, 1)]),
                marker("farfield", vec![line(1, 2), line(2, 3), line(3, 0)]),
            ],
        );
        bundle.solution = Field::new(vec!["Mach".into()], vec![0.1, 0.2, 0.3, 0.4]);
        bundle
    }

    fn wall_y(bundle: &MeshSolutionBundle) -> Vec<f64> {
        bundle.markers[0].elements[0]
            .nodes
            .iter()
            .map(|&n| bundle.coordinates[n * 2 + 1])
            .collect()
    }

    #[test]
    fn default_flags_disable_ridge_detection_only() {
        let options = AdaptationOptions::default();
        let background = BackgroundOptions::new(Path::new("/case/amg_back.json"), &options);
        assert_eq!(background.flags, ["-nordg"]);
        assert_eq!(background.to_string(), "-back /case/amg_back.json -nordg");
    }

    #[test]
    fn all_flags_are_rendered_in_order() {
        let options = AdaptationOptions {
            invert_back: true,
            ortho: true,
            ridge_detection: true,
            ..AdaptationOptions::default()
        };
        let background = BackgroundOptions::new(Path::new("back.json"), &options);
        assert_eq!(
            background.args(),
            ["-back", "back.json", "-inv-back", "-cart3d-only"]
        );
    }

    #[test]
    fn background_path_with_spaces_stays_one_argument() {
        let options = AdaptationOptions::default();
        let background =
            BackgroundOptions::new(Path::new("/home/u/My Cases/wing/amg_back.json"), &options);
        let request = RemeshRequest::new(&options, &background, 500);
        let args = request.args(Path::new("in.json"), Path::new("out.json"));
        assert_eq!(
            &args[args.len() - 3..],
            ["-back", "/home/u/My Cases/wing/amg_back.json", "-nordg"]
        );
    }

    #[test]
    fn args_include_gradation_only_when_set() {
        let mut options = AdaptationOptions {
            hmin: 0.001,
            hmax: 10.0,
            ..AdaptationOptions::default()
        };
        let background = BackgroundOptions::new(Path::new("b.json"), &options);
        let request = RemeshRequest::new(&options, &background, 5000);
        let args = request.args(Path::new("current.json"), Path::new("adapted.json"));
        assert!(!args.contains(&"-hgrad".to_string()));
        assert_eq!(args[5], "5000");
        assert_eq!(&args[args.len() - 3..], ["-back", "b.json", "-nordg"]);

        options.hgrad = Some(1.5);
        let request = RemeshRequest::new(&options, &background, 5000);
        let args = request.args(Path::new("in"), Path::new("out"));
        let pos = args.iter().position(|a| a == "-hgrad").expect("hgrad");
        assert_eq!(args[pos + 1], "1.5");
    }

    #[test]
    fn empty_output_is_a_remesh_error() {
        let empty = MeshSolutionBundle::mesh_only(2, Vec::new(), Vec::new(), Vec::new());
        let meta = empty.metadata();
        let err = accept_output(empty, meta).unwrap_err();
        assert!(matches!(err, AdaptError::Remesh(_)));
    }

    #[test]
    fn accepted_output_inherits_metadata() {
        let source = square();
        let mut adapted = source.clone();
        adapted.solution.components = vec!["unnamed".into()];

        let accepted = accept_output(adapted, source.metadata()).expect("accept");
        assert_eq!(accepted.dimension, 2);
        assert_eq!(accepted.solution_tag(), ["Mach"]);
    }

    #[test]
    fn renumbered_output_keeps_its_own_boundary() {
        let source = square();
        // Same square with vertex order reversed: old n becomes 3 - n.
        let mut adapted = MeshSolutionBundle::mesh_only(
            2,
            vec![0.0, 1.0, 1.0, 1.0, 1.0, 0.0, 0.0, 0.0],
            vec![
                Element::new(ElementKind::Triangle, vec![3, 2, 1]),
                Element::new(ElementKind::Triangle, vec![3, 1, 0]),
            ],
            vec![
                marker("wall", vec![line(3, 2)]),
                marker("farfield", vec![line(2, 1), line(1, 0), line(0, 3)]),
            ],
        );
        adapted.solution = Field::new(vec!["Mach".into()], vec![0.4, 0.3, 0.2, 0.1]);

        let accepted = accept_output(adapted, source.metadata()).expect("accept");
        assert_eq!(accepted.markers[0].elements[0].nodes, [3, 2]);
        assert_eq!(wall_y(&accepted), [0.0, 0.0]);
    }

    #[test]
    fn coarsened_output_is_accepted() {
        let source = square();
        let mut adapted = MeshSolutionBundle::mesh_only(
            2,
            vec![0.0, 0.0, 1.0, 0.0, 0.0, 1.0],
            vec![Element::new(ElementKind::Triangle, vec![0, 1, 2])],
            vec![
                marker("wall", vec![line(0, 1)]),
                marker("farfield", vec![line(1, 2), line(2, 0)]),
            ],
        );
        adapted.solution = Field::new(vec!["Mach".into()], vec![0.1, 0.2, 0.4]);

        let accepted = accept_output(adapted, source.metadata()).expect("accept");
        assert_eq!(accepted.num_vertices(), 3);
        assert_eq!(accepted.markers[1].elements.len(), 2);
    }

    #[test]
    fn changed_marker_tags_are_a_consistency_error() {
        let source = square();
        let mut adapted = source.clone();
        adapted.markers.swap(0, 1);
        let err = accept_output(adapted, source.metadata()).unwrap_err();
        assert!(matches!(err, AdaptError::BundleConsistency(_)));
        assert!(err.to_string().contains("wall, farfield"));

        let mut adapted = source.clone();
        adapted.markers.pop();
        assert!(accept_output(adapted, source.metadata()).is_err());
    }
}
