//! Boosted Haar cascade model and its OpenCV XML loader.
//!
//! Only the `opencv-cascade-classifier` layout with `BOOST` stages and
//! upright `HAAR` features is understood. That covers the frontal face
//! cascades shipped with OpenCV.

use std::path::Path;

use roxmltree::{Document, Node};
use thiserror::Error;

use super::integral_image::IntegralImage;

/// Windows whose area times the inverse norm reaches this are flat.
const FLAT_WINDOW_LIMIT: f64 = 0.1;

#[derive(Error, Debug)]
pub enum CascadeError {
    #[error("failed to read cascade file {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("cascade is not valid XML: {0}")]
    Xml(#[from] roxmltree::Error),
    #[error("cascade is missing <{0}>")]
    Missing(&'static str),
    #[error("cannot parse <{element}> value {value:?}")]
    BadNumber { element: &'static str, value: String },
    #[error("unsupported cascade: {0}")]
    Unsupported(String),
    #[error("invalid cascade: {0}")]
    Invalid(String),
}

/// One weighted rectangle of a Haar feature, in window coordinates.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct HaarRect {
    pub x: usize,
    pub y: usize,
    pub width: usize,
    pub height: usize,
    pub weight: f64,
}

#[derive(Clone, Debug, PartialEq)]
pub struct HaarFeature {
    pub rects: Vec<HaarRect>,
}

/// Split node of a weak classifier tree.
///
/// `left` / `right` point at another node when positive, or at leaf
/// `-index` when zero or negative.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct TreeNode {
    pub feature: usize,
    pub threshold: f64,
    pub left: i32,
    pub right: i32,
}

#[derive(Clone, Debug, PartialEq)]
pub struct WeakClassifier {
    pub nodes: Vec<TreeNode>,
    pub leaves: Vec<f64>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct Stage {
    pub threshold: f64,
    pub classifiers: Vec<WeakClassifier>,
}

/// Outcome of running the cascade on one window.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum WindowVerdict {
    Accepted,
    /// Rejected by the stage at this index.
    Rejected(usize),
    /// Too little contrast to be worth evaluating.
    Flat,
}

#[derive(Clone, Debug)]
pub struct HaarCascade {
    window_width: usize,
    window_height: usize,
    stages: Vec<Stage>,
    features: Vec<HaarFeature>,
}

impl HaarCascade {
    pub fn new(
        window_width: usize,
        window_height: usize,
        stages: Vec<Stage>,
        features: Vec<HaarFeature>,
    ) -> Result<Self, CascadeError> {
        let cascade = Self {
            window_width,
            window_height,
            stages,
            features,
        };
        cascade.validate()?;
        Ok(cascade)
    }

    pub fn load(path: &Path) -> Result<Self, CascadeError> {
        let xml = std::fs::read_to_string(path).map_err(|source| CascadeError::Io {
            path: path.display().to_string(),
            source,
        })?;
        let cascade = Self::from_xml(&xml)?;
        log::info!(
            "Loaded cascade {} ({}x{} window, {} stages, {} features)",
            path.display(),
            cascade.window_width,
            cascade.window_height,
            cascade.stages.len(),
            cascade.features.len()
        );
        Ok(cascade)
    }

    pub fn from_xml(xml: &str) -> Result<Self, CascadeError> {
        let doc = Document::parse(xml)?;
        let cascade = doc
            .descendants()
            .find(|n| n.has_tag_name("cascade"))
            .ok_or_else(|| {
                let old_style = doc
                    .descendants()
                    .any(|n| n.attribute("type_id") == Some("opencv-haar-classifier"));
                if old_style {
                    CascadeError::Unsupported("old-style opencv-haar-classifier layout".into())
                } else {
                    CascadeError::Missing("cascade")
                }
            })?;

        let stage_type = text(child(cascade, "stageType")?);
        if !stage_type.eq_ignore_ascii_case("BOOST") {
            return Err(CascadeError::Unsupported(format!("stage type {stage_type}")));
        }
        let feature_type = text(child(cascade, "featureType")?);
        if !feature_type.eq_ignore_ascii_case("HAAR") {
            return Err(CascadeError::Unsupported(format!("feature type {feature_type}")));
        }

        let window_width = parse_one(child(cascade, "width")?, "width")?;
        let window_height = parse_one(child(cascade, "height")?, "height")?;

        let stages = items(child(cascade, "stages")?)
            .map(parse_stage)
            .collect::<Result<Vec<_>, _>>()?;
        let features = items(child(cascade, "features")?)
            .map(parse_feature)
            .collect::<Result<Vec<_>, _>>()?;

        Self::new(window_width, window_height, stages, features)
    }

    pub fn window_width(&self) -> usize {
        self.window_width
    }

    pub fn window_height(&self) -> usize {
        self.window_height
    }

    pub fn stage_count(&self) -> usize {
        self.stages.len()
    }

    /// Run every stage on the window whose top-left corner is `(x, y)`.
    ///
    /// The caller guarantees the window lies inside `ii`.
    pub fn classify(&self, ii: &IntegralImage, x: usize, y: usize) -> WindowVerdict {
        let Some(inv_norm) = self.inverse_variance_norm(ii, x, y) else {
            return WindowVerdict::Flat;
        };
        for (index, stage) in self.stages.iter().enumerate() {
            let score: f64 = stage
                .classifiers
                .iter()
                .map(|weak| self.eval_tree(weak, ii, x, y, inv_norm))
                .sum();
            if score < stage.threshold {
                return WindowVerdict::Rejected(index);
            }
        }
        WindowVerdict::Accepted
    }

    /// Features are normalised by the window's standard deviation (taken
    /// over the window shrunk by one pixel on every side), which makes the
    /// thresholds independent of lighting and contrast.
    ///
    /// `None` when that deviation is at most `1 / FLAT_WINDOW_LIMIT` grey
    /// levels; such windows are never evaluated.
    fn inverse_variance_norm(&self, ii: &IntegralImage, x: usize, y: usize) -> Option<f64> {
        let (w, h) = (self.window_width - 2, self.window_height - 2);
        let area = (w * h) as f64;
        let sum = ii.rect_sum(x + 1, y + 1, w, h) as f64;
        let sq_sum = ii.rect_sq_sum(x + 1, y + 1, w, h) as f64;
        let nf = area * sq_sum - sum * sum;
        if nf <= 0.0 {
            return None;
        }
        let inv_norm = 1.0 / nf.sqrt();
        (area * inv_norm < FLAT_WINDOW_LIMIT).then_some(inv_norm)
    }

    fn eval_tree(
        &self,
        weak: &WeakClassifier,
        ii: &IntegralImage,
        x: usize,
        y: usize,
        inv_norm: f64,
    ) -> f64 {
        let mut idx = 0i32;
        loop {
            let node = &weak.nodes[idx as usize];
            let value = self.feature_value(node.feature, ii, x, y) * inv_norm;
            idx = if value < node.threshold {
                node.left
            } else {
                node.right
            };
            if idx <= 0 {
                return weak.leaves[(-idx) as usize];
            }
        }
    }

    fn feature_value(&self, feature: usize, ii: &IntegralImage, x: usize, y: usize) -> f64 {
        self.features[feature]
            .rects
            .iter()
            .map(|r| r.weight * ii.rect_sum(x + r.x, y + r.y, r.width, r.height) as f64)
            .sum()
    }

    fn validate(&self) -> Result<(), CascadeError> {
        if self.window_width < 3 || self.window_height < 3 {
            return Err(CascadeError::Invalid(format!(
                "window {}x{} is too small",
                self.window_width, self.window_height
            )));
        }
        if self.stages.is_empty() {
            return Err(CascadeError::Invalid("cascade has no stages".into()));
        }

        for (fi, feature) in self.features.iter().enumerate() {
            if feature.rects.is_empty() {
                return Err(CascadeError::Invalid(format!("feature {fi} has no rectangles")));
            }
            for r in &feature.rects {
                if r.x + r.width > self.window_width || r.y + r.height > self.window_height {
                    return Err(CascadeError::Invalid(format!(
                        "feature {fi} rectangle {r:?} leaves the window"
                    )));
                }
            }
        }

        for (si, stage) in self.stages.iter().enumerate() {
            for weak in &stage.classifiers {
                if weak.nodes.is_empty() || weak.leaves.is_empty() {
                    return Err(CascadeError::Invalid(format!("stage {si} has an empty tree")));
                }
                for node in &weak.nodes {
                    if node.feature >= self.features.len() {
                        return Err(CascadeError::Invalid(format!(
                            "stage {si} references missing feature {}",
                            node.feature
                        )));
                    }
                    for link in [node.left, node.right] {
                        let ok = if link > 0 {
                            (link as usize) < weak.nodes.len()
                        } else {
                            (link.unsigned_abs() as usize) < weak.leaves.len()
                        };
                        if !ok {
                            return Err(CascadeError::Invalid(format!(
                                "stage {si} has a dangling tree link {link}"
                            )));
                        }
                    }
                }
            }
        }
        Ok(())
    }
}

fn child<'a, 'i>(node: Node<'a, 'i>, name: &'static str) -> Result<Node<'a, 'i>, CascadeError> {
    node.children()
        .find(|n| n.has_tag_name(name))
        .ok_or(CascadeError::Missing(name))
}

/// Element children of a sequence node (OpenCV writes each item as `<_>`).
fn items<'a, 'i>(node: Node<'a, 'i>) -> impl Iterator<Item = Node<'a, 'i>> {
    node.children().filter(|n| n.is_element())
}

fn text<'a>(node: Node<'a, '_>) -> &'a str {
    node.text().unwrap_or("").trim()
}

fn parse_numbers<T: std::str::FromStr>(
    node: Node<'_, '_>,
    element: &'static str,
) -> Result<Vec<T>, CascadeError> {
    // Text may be split across several nodes by comments.
    let joined: String = node
        .children()
        .filter(|n| n.is_text())
        .filter_map(|n| n.text())
        .collect::<Vec<_>>()
        .join(" ");
    joined
        .split_whitespace()
        .map(|tok| {
            tok.parse::<T>().map_err(|_| CascadeError::BadNumber {
                element,
                value: tok.to_string(),
            })
        })
        .collect()
}

fn parse_one<T: std::str::FromStr>(
    node: Node<'_, '_>,
    element: &'static str,
) -> Result<T, CascadeError> {
    let value = text(node);
    value.parse::<T>().map_err(|_| CascadeError::BadNumber {
        element,
        value: value.to_string(),
    })
}

fn parse_stage(node: Node<'_, '_>) -> Result<Stage, CascadeError> {
    let threshold = parse_one(child(node, "stageThreshold")?, "stageThreshold")?;
    let classifiers = items(child(node, "weakClassifiers")?)
        .map(parse_weak_classifier)
        .collect::<Result<Vec<_>, _>>()?;
    Ok(Stage {
        threshold,
        classifiers,
    })
}

fn parse_weak_classifier(node: Node<'_, '_>) -> Result<WeakClassifier, CascadeError> {
    let raw: Vec<f64> = parse_numbers(child(node, "internalNodes")?, "internalNodes")?;
    if raw.is_empty() || raw.len() % 4 != 0 {
        return Err(CascadeError::Invalid(format!(
            "internalNodes holds {} values, expected groups of 4",
            raw.len()
        )));
    }
    let nodes = raw
        .chunks_exact(4)
        .map(|n| {
            let feature = n[2];
            if feature < 0.0 || feature.fract() != 0.0 {
                return Err(CascadeError::Invalid(format!("bad feature index {feature}")));
            }
            Ok(TreeNode {
                left: n[0] as i32,
                right: n[1] as i32,
                feature: feature as usize,
                threshold: n[3],
            })
        })
        .collect::<Result<Vec<_>, _>>()?;
    let leaves = parse_numbers(child(node, "leafValues")?, "leafValues")?;
    Ok(WeakClassifier { nodes, leaves })
}

fn parse_feature(node: Node<'_, '_>) -> Result<HaarFeature, CascadeError> {
    if let Some(tilted) = node.children().find(|n| n.has_tag_name("tilted")) {
        if text(tilted) != "0" {
            return Err(CascadeError::Unsupported("tilted Haar features".into()));
        }
    }
    let rects = items(child(node, "rects")?)
        .map(|r| {
            let v: Vec<f64> = parse_numbers(r, "rects")?;
            if v.len() != 5 || v[..4].iter().any(|&c| c < 0.0) {
                return Err(CascadeError::Invalid(format!("bad feature rectangle {v:?}")));
            }
            Ok(HaarRect {
                x: v[0] as usize,
                y: v[1] as usize,
                width: v[2] as usize,
                height: v[3] as usize,
                weight: v[4],
            })
        })
        .collect::<Result<Vec<_>, _>>()?;
    Ok(HaarFeature { rects })
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use image::{GrayImage, Luma};
    use std::io::Write;

    /// Fires on a dark block surrounded by a lighter ring.
    pub(crate) const DARK_CENTER_XML: &str = r#"<?xml version="1.0"?>
<opencv_storage>
<cascade type_id="opencv-cascade-classifier"><stageType>BOOST</stageType>
  <featureType>HAAR</featureType>
  <height>24</height>
  <width>24</width>
  <stageParams>
    <maxWeakCount>1</maxWeakCount></stageParams>
  <featureParams>
    <maxCatCount>0</maxCatCount></featureParams>
  <stageNum>1</stageNum>
  <stages>
    <_>
      <maxWeakCount>1</maxWeakCount>
      <stageThreshold>0.</stageThreshold>
      <weakClassifiers>
        <_>
          <internalNodes>
            0 -1 0 -5.0000000000000003e-02</internalNodes>
          <leafValues>
            1. -1.</leafValues></_></weakClassifiers></_></stages>
  <features>
    <_>
      <rects>
        <_>
          0 0 24 24 -1.</_>
        <_>
          6 6 12 12 4.</_></rects></_></features></cascade>
</opencv_storage>
"#;

    pub(crate) fn dark_center_cascade() -> HaarCascade {
        HaarCascade::from_xml(DARK_CENTER_XML).unwrap()
    }

    #[test]
    fn test_parses_opencv_layout() {
        let cascade = dark_center_cascade();
        assert_eq!(cascade.window_width(), 24);
        assert_eq!(cascade.window_height(), 24);
        assert_eq!(cascade.stage_count(), 1);

        let node = cascade.stages[0].classifiers[0].nodes[0];
        assert_eq!((node.left, node.right, node.feature), (0, -1, 0));
        assert_relative_eq!(node.threshold, -0.05);
        assert_eq!(cascade.stages[0].classifiers[0].leaves, vec![1.0, -1.0]);
        assert_eq!(cascade.features[0].rects[1].x, 6);
        assert_relative_eq!(cascade.features[0].rects[1].weight, 4.0);
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(DARK_CENTER_XML.as_bytes()).unwrap();
        let cascade = HaarCascade::load(file.path()).unwrap();
        assert_eq!(cascade.stage_count(), 1);
    }

    #[test]
    fn test_load_missing_file_is_io_error() {
        let err = HaarCascade::load(Path::new("/definitely/not/here.xml")).unwrap_err();
        assert!(matches!(err, CascadeError::Io { .. }));
    }

    #[test]
    fn test_rejects_lbp_cascade() {
        let xml = DARK_CENTER_XML.replace("<featureType>HAAR", "<featureType>LBP");
        assert!(matches!(
            HaarCascade::from_xml(&xml),
            Err(CascadeError::Unsupported(_))
        ));
    }

    #[test]
    fn test_rejects_tilted_features() {
        let xml = DARK_CENTER_XML.replace("4.</_></rects>", "4.</_></rects><tilted>1</tilted>");
        assert!(matches!(
            HaarCascade::from_xml(&xml),
            Err(CascadeError::Unsupported(_))
        ));
    }

    #[test]
    fn test_rejects_old_style_layout() {
        let xml = r#"<opencv_storage><face type_id="opencv-haar-classifier"></face></opencv_storage>"#;
        assert!(matches!(
            HaarCascade::from_xml(xml),
            Err(CascadeError::Unsupported(_))
        ));
    }

    #[test]
    fn test_rejects_garbage_numbers() {
        let xml = DARK_CENTER_XML.replace("1. -1.", "1. minus-one");
        assert!(matches!(
            HaarCascade::from_xml(&xml),
            Err(CascadeError::BadNumber { element: "leafValues", .. })
        ));
    }

    #[test]
    fn test_rejects_feature_outside_window() {
        let xml = DARK_CENTER_XML.replace("6 6 12 12 4.", "20 6 12 12 4.");
        assert!(matches!(
            HaarCascade::from_xml(&xml),
            Err(CascadeError::Invalid(_))
        ));
    }

    #[test]
    fn test_rejects_dangling_feature_index() {
        let xml = DARK_CENTER_XML.replace("0 -1 0 -5", "0 -1 3 -5");
        assert!(matches!(
            HaarCascade::from_xml(&xml),
            Err(CascadeError::Invalid(_))
        ));
    }

    #[test]
    fn test_rejects_non_xml() {
        assert!(matches!(
            HaarCascade::from_xml("not xml at all"),
            Err(CascadeError::Xml(_))
        ));
    }

    #[test]
    fn test_classify_accepts_dark_center_window() {
        let img = GrayImage::from_fn(24, 24, |x, y| {
            if (6..18).contains(&x) && (6..18).contains(&y) {
                Luma([20])
            } else {
                Luma([200])
            }
        });
        let ii = IntegralImage::new(&img);
        assert_eq!(dark_center_cascade().classify(&ii, 0, 0), WindowVerdict::Accepted);
    }

    #[test]
    fn test_classify_skips_uniform_window() {
        let img = GrayImage::from_pixel(24, 24, Luma([120]));
        let ii = IntegralImage::new(&img);
        assert_eq!(dark_center_cascade().classify(&ii, 0, 0), WindowVerdict::Flat);
    }

    #[test]
    fn test_classify_skips_low_contrast_dark_center() {
        // Same shape the cascade fires on, but only 4 grey levels deep.
        let img = GrayImage::from_fn(24, 24, |x, y| {
            if (6..18).contains(&x) && (6..18).contains(&y) {
                Luma([124])
            } else {
                Luma([128])
            }
        });
        let ii = IntegralImage::new(&img);
        assert_eq!(dark_center_cascade().classify(&ii, 0, 0), WindowVerdict::Flat);
    }

    #[test]
    fn test_classify_rejects_light_center_at_first_stage() {
        let img = GrayImage::from_fn(24, 24, |x, y| {
            if (6..18).contains(&x) && (6..18).contains(&y) {
                Luma([220])
            } else {
                Luma([30])
            }
        });
        let ii = IntegralImage::new(&img);
        assert_eq!(
            dark_center_cascade().classify(&ii, 0, 0),
            WindowVerdict::Rejected(0)
        );
    }

    #[test]
    fn test_deeper_tree_follows_node_links() {
        let feature = HaarFeature {
            rects: vec![HaarRect {
                x: 0,
                y: 0,
                width: 4,
                height: 4,
                weight: 1.0,
            }],
        };
        // Root always goes right to node 1, which always goes left to leaf 2.
        let weak = WeakClassifier {
            nodes: vec![
                TreeNode {
                    feature: 0,
                    threshold: f64::MIN,
                    left: 0,
                    right: 1,
                },
                TreeNode {
                    feature: 0,
                    threshold: f64::MAX,
                    left: -2,
                    right: -1,
                },
            ],
            leaves: vec![-1.0, -1.0, 1.0],
        };
        let cascade = HaarCascade::new(
            4,
            4,
            vec![Stage {
                threshold: 0.5,
                classifiers: vec![weak],
            }],
            vec![feature],
        )
        .unwrap();
        let ii = IntegralImage::new(&GrayImage::from_fn(4, 4, |x, y| {
            Luma([if (x + y) % 2 == 0 { 0 } else { 200 }])
        }));
        assert_eq!(cascade.classify(&ii, 0, 0), WindowVerdict::Accepted);
    }
}
