//! Decision tree classifier stored as flat per-node arrays.
//!
//! Node `0` is the root. Internal nodes branch left when
//! `sample[split_feature] <= threshold`; leaves carry [`LEAF`] as threshold and
//! pick the class slot with the largest value.

use crate::error::{LoadError, LoadResult, ModelError};
use crate::io::{non_negative, put_f64s, put_i32s, write_row, BinaryReader, TextReader};
use ndarray::{Array2, ArrayView1};
use serde::{Deserialize, Serialize};
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use tracing::debug;

/// Threshold value marking a leaf node.
pub const LEAF: f64 = -2.0;

/// Child index stored for leaves.
pub const NO_CHILD: i32 = -1;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Encoding {
    #[default]
    Binary,
    Text,
}

impl Encoding {
    pub fn extension(self) -> &'static str {
        match self {
            Encoding::Binary => "bin",
            Encoding::Text => "txt",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoadOptions {
    pub encoding: Encoding,
    /// Whether the file carries the feature-name block.
    pub feature_names: bool,
}

impl Default for LoadOptions {
    fn default() -> Self {
        Self {
            encoding: Encoding::Binary,
            feature_names: true,
        }
    }
}

impl LoadOptions {
    pub fn text() -> Self {
        Self {
            encoding: Encoding::Text,
            ..Self::default()
        }
    }

    pub fn binary() -> Self {
        Self::default()
    }

    pub fn with_feature_names(mut self, feature_names: bool) -> Self {
        self.feature_names = feature_names;
        self
    }
}

/// Raw arrays a [`DecisionTree`] is validated from.
#[derive(Debug, Clone, PartialEq)]
pub struct TreeParts {
    pub num_features: usize,
    pub max_depth: usize,
    pub classes: Vec<usize>,
    pub feature_names: Vec<String>,
    pub left_child: Vec<i32>,
    pub right_child: Vec<i32>,
    pub threshold: Vec<f64>,
    pub split_feature: Vec<i32>,
    /// `node_count x num_classes` leaf scores.
    pub values: Array2<f64>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct DecisionTree {
    num_features: usize,
    max_depth: usize,
    classes: Vec<usize>,
    feature_names: Vec<String>,
    left_child: Vec<i32>,
    right_child: Vec<i32>,
    threshold: Vec<f64>,
    split_feature: Vec<i32>,
    values: Array2<f64>,
    source: Option<PathBuf>,
}

impl DecisionTree {
    /// Validates `parts` into a tree.
    ///
    /// Every internal node must reference two existing children and a split
    /// feature below `num_features`.
    pub fn new(parts: TreeParts) -> LoadResult<Self> {
        let TreeParts {
            num_features,
            max_depth,
            classes,
            feature_names,
            left_child,
            right_child,
            threshold,
            split_feature,
            values,
        } = parts;

        let node_count = threshold.len();
        let num_classes = classes.len();
        invalid_if(num_features == 0, || "tree has no features".into())?;
        invalid_if(num_classes == 0, || "tree has no classes".into())?;
        invalid_if(node_count == 0, || "tree has no nodes".into())?;
        for (name, len) in [
            ("left_child", left_child.len()),
            ("right_child", right_child.len()),
            ("split_feature", split_feature.len()),
        ] {
            invalid_if(len != node_count, || {
                format!("{name} holds {len} entries for {node_count} nodes")
            })?;
        }
        invalid_if(values.dim() != (node_count, num_classes), || {
            format!(
                "values are {:?}, expected ({node_count}, {num_classes})",
                values.dim()
            )
        })?;
        invalid_if(
            !feature_names.is_empty() && feature_names.len() != num_features,
            || format!("{} feature names for {num_features} features", feature_names.len()),
        )?;
        for count in [num_features, num_classes, node_count, max_depth]
            .into_iter()
            .chain(classes.iter().copied())
        {
            invalid_if(i32::try_from(count).is_err(), || {
                format!("{count} does not fit the serialized i32 range")
            })?;
        }

        let in_range = |child: i32| usize::try_from(child).map_or(false, |c| c < node_count);
        for node in 0..node_count {
            if threshold[node] == LEAF {
                continue;
            }
            invalid_if(!in_range(left_child[node]) || !in_range(right_child[node]), || {
                format!(
                    "node {node} has children ({}, {}) outside 0..{node_count}",
                    left_child[node], right_child[node]
                )
            })?;
            invalid_if(
                usize::try_from(split_feature[node]).map_or(true, |f| f >= num_features),
                || {
                    format!(
                        "node {node} splits on feature {} of {num_features}",
                        split_feature[node]
                    )
                },
            )?;
        }

        Ok(Self {
            num_features,
            max_depth,
            classes,
            feature_names,
            left_child,
            right_child,
            threshold,
            split_feature,
            values,
            source: None,
        })
    }

    pub fn load(path: impl AsRef<Path>, options: LoadOptions) -> LoadResult<Self> {
        let path = path.as_ref();
        let bytes = read_model_file(path)?;
        let mut tree = match options.encoding {
            Encoding::Text => Self::parse_text(utf8(&bytes)?, options.feature_names)?,
            Encoding::Binary => Self::parse_binary(&bytes, options.feature_names)?,
        };
        debug!(
            path = %path.display(),
            nodes = tree.node_count(),
            classes = tree.num_classes(),
            "loaded decision tree"
        );
        tree.source = Some(path.to_path_buf());
        Ok(tree)
    }

    pub fn parse_text(text: &str, feature_names: bool) -> LoadResult<Self> {
        let mut reader = TextReader::new(text);
        let tree = Self::read_text(&mut reader, feature_names)?;
        reader.finish()?;
        Ok(tree)
    }

    pub fn parse_binary(bytes: &[u8], feature_names: bool) -> LoadResult<Self> {
        let mut reader = BinaryReader::new(bytes);
        let tree = Self::read_binary(&mut reader, feature_names)?;
        reader.finish()?;
        Ok(tree)
    }

    pub(crate) fn read_text(reader: &mut TextReader<'_>, feature_names: bool) -> LoadResult<Self> {
        let header = reader.row::<i64>("tree header", 4)?;
        let num_features = non_negative(header[0], "feature count")?;
        let num_classes = non_negative(header[1], "class count")?;
        let node_count = non_negative(header[2], "node count")?;
        let max_depth = non_negative(header[3], "max depth")?;
        invalid_if(num_features == 0 || num_classes == 0 || node_count == 0, || {
            format!("empty tree header {header:?}")
        })?;

        let classes = read_text_classes(reader, num_classes)?;
        let feature_names = if feature_names {
            read_text_names(reader, num_features)?
        } else {
            Vec::new()
        };
        let left_child = reader.row("left children", node_count)?;
        let right_child = reader.row("right children", node_count)?;
        let threshold = reader.row("thresholds", node_count)?;
        let split_feature = reader.row("split features", node_count)?;
        let mut flat = Vec::new();
        for _ in 0..node_count {
            flat.extend(reader.row::<f64>("leaf values", num_classes)?);
        }
        let values = Array2::from_shape_vec((node_count, num_classes), flat)
            .map_err(|err| LoadError::Invalid(err.to_string()))?;

        Self::new(TreeParts {
            num_features,
            max_depth,
            classes,
            feature_names,
            left_child,
            right_child,
            threshold,
            split_feature,
            values,
        })
    }

    pub(crate) fn read_binary(reader: &mut BinaryReader<'_>, feature_names: bool) -> LoadResult<Self> {
        let header = reader.i32s(4, "tree header")?;
        let num_features = non_negative(header[0].into(), "feature count")?;
        let num_classes = non_negative(header[1].into(), "class count")?;
        let node_count = non_negative(header[2].into(), "node count")?;
        let max_depth = non_negative(header[3].into(), "max depth")?;
        invalid_if(num_features == 0 || num_classes == 0 || node_count == 0, || {
            format!("empty tree header {header:?}")
        })?;

        let classes = read_binary_classes(reader, num_classes)?;
        let feature_names = if feature_names {
            read_binary_names(reader, num_features)?
        } else {
            Vec::new()
        };
        let left_child = reader.i32s(node_count, "left children")?;
        let right_child = reader.i32s(node_count, "right children")?;
        let threshold = reader.f64s(node_count, "thresholds")?;
        let split_feature = reader.i32s(node_count, "split features")?;
        let flat = reader.f64s(node_count * num_classes, "leaf values")?;
        let values = Array2::from_shape_vec((node_count, num_classes), flat)
            .map_err(|err| LoadError::Invalid(err.to_string()))?;

        Self::new(TreeParts {
            num_features,
            max_depth,
            classes,
            feature_names,
            left_child,
            right_child,
            threshold,
            split_feature,
            values,
        })
    }

    /// Writes the text format. The feature-name block is emitted when the tree
    /// carries names.
    pub fn write_text<W: Write>(&self, mut writer: W) -> io::Result<()> {
        self.write_text_section(&mut writer, self.has_feature_names())
    }

    /// Writes the binary format. The feature-name block is emitted when the
    /// tree carries names.
    pub fn write_binary<W: Write>(&self, mut writer: W) -> io::Result<()> {
        let mut out = Vec::new();
        self.encode_binary(&mut out, self.has_feature_names());
        writer.write_all(&out)
    }

    pub(crate) fn write_text_section<W: Write + ?Sized>(
        &self,
        writer: &mut W,
        feature_names: bool,
    ) -> io::Result<()> {
        writeln!(writer, "# num_features num_classes node_count max_depth")?;
        write_row(
            writer,
            [self.num_features, self.num_classes(), self.node_count(), self.max_depth],
        )?;
        writeln!(writer, "# classes")?;
        write_row(writer, &self.classes)?;
        if feature_names {
            writeln!(writer, "# feature names")?;
            write_row(writer, self.feature_names.iter().map(String::len))?;
            write_row(writer, &self.feature_names)?;
        }
        writeln!(writer, "# left_child right_child threshold split_feature")?;
        write_row(writer, &self.left_child)?;
        write_row(writer, &self.right_child)?;
        write_row(writer, &self.threshold)?;
        write_row(writer, &self.split_feature)?;
        writeln!(writer, "# values")?;
        for row in self.values.rows() {
            write_row(writer, row)?;
        }
        Ok(())
    }

    pub(crate) fn encode_binary(&self, out: &mut Vec<u8>, feature_names: bool) {
        put_i32s(
            out,
            [self.num_features, self.num_classes(), self.node_count(), self.max_depth]
                .map(|count| count as i32),
        );
        put_i32s(out, self.classes.iter().map(|&class| class as i32));
        if feature_names {
            encode_names(out, &self.feature_names);
        }
        put_i32s(out, self.left_child.iter().copied());
        put_i32s(out, self.right_child.iter().copied());
        put_f64s(out, self.threshold.iter().copied());
        put_i32s(out, self.split_feature.iter().copied());
        put_f64s(out, self.values.iter().copied());
    }

    /// Class slot of the leaf `sample` descends to.
    pub fn predict_slot(&self, sample: &[f64]) -> Result<usize, ModelError> {
        if sample.len() < self.num_features {
            return Err(ModelError::SampleTooShort {
                expected: self.num_features,
                found: sample.len(),
            });
        }

        let mut node = 0usize;
        for _ in 0..self.node_count() {
            if self.is_leaf(node) {
                return Ok(argmax(self.values.row(node)));
            }
            // Validated at construction: internal nodes hold in-range indices.
            let feature = self.split_feature[node] as usize;
            node = if sample[feature] <= self.threshold[node] {
                self.left_child[node] as usize
            } else {
                self.right_child[node] as usize
            };
        }
        Err(ModelError::CycleDetected {
            nodes: self.node_count(),
        })
    }

    /// Class label predicted for `sample`.
    pub fn evaluate(&self, sample: &[f64]) -> Result<usize, ModelError> {
        self.predict_slot(sample).map(|slot| self.classes[slot])
    }

    pub fn is_leaf(&self, node: usize) -> bool {
        self.threshold[node] == LEAF
    }

    pub fn num_features(&self) -> usize {
        self.num_features
    }

    pub fn num_classes(&self) -> usize {
        self.classes.len()
    }

    pub fn node_count(&self) -> usize {
        self.threshold.len()
    }

    pub fn max_depth(&self) -> usize {
        self.max_depth
    }

    pub fn classes(&self) -> &[usize] {
        &self.classes
    }

    pub fn feature_names(&self) -> &[String] {
        &self.feature_names
    }

    pub fn has_feature_names(&self) -> bool {
        !self.feature_names.is_empty()
    }

    pub fn left_child(&self) -> &[i32] {
        &self.left_child
    }

    pub fn right_child(&self) -> &[i32] {
        &self.right_child
    }

    pub fn threshold(&self) -> &[f64] {
        &self.threshold
    }

    pub fn split_feature(&self) -> &[i32] {
        &self.split_feature
    }

    pub fn values(&self) -> &Array2<f64> {
        &self.values
    }

    /// File the tree was loaded from, if any.
    pub fn source(&self) -> Option<&Path> {
        self.source.as_deref()
    }

    pub fn write_summary<W: Write + ?Sized>(&self, writer: &mut W) -> io::Result<()> {
        writeln!(writer, "{:>25}{}", "Number of Features: ", self.num_features)?;
        writeln!(writer, "{:>25}{}", "Number of Classes: ", self.num_classes())?;
        writeln!(writer, "{:>25}{}", "Number of Nodes: ", self.node_count())?;
        writeln!(writer, "{:>25}{}", "Max Depth: ", self.max_depth)?;
        write_labels(writer, &self.classes, &self.feature_names)
    }
}

/// First slot holding the strictly largest value.
fn argmax(values: ArrayView1<'_, f64>) -> usize {
    let mut best = 0;
    for (slot, &value) in values.iter().enumerate() {
        if value > values[best] {
            best = slot;
        }
    }
    best
}

pub(crate) fn invalid_if(condition: bool, reason: impl FnOnce() -> String) -> LoadResult<()> {
    if condition {
        Err(LoadError::Invalid(reason()))
    } else {
        Ok(())
    }
}

pub(crate) fn read_model_file(path: &Path) -> LoadResult<Vec<u8>> {
    fs::read(path).map_err(|source| LoadError::Io {
        path: path.to_path_buf(),
        source,
    })
}

pub(crate) fn utf8(bytes: &[u8]) -> LoadResult<&str> {
    std::str::from_utf8(bytes).map_err(|err| LoadError::Invalid(format!("text model is not UTF-8: {err}")))
}

pub(crate) fn read_text_classes(reader: &mut TextReader<'_>, count: usize) -> LoadResult<Vec<usize>> {
    reader
        .row::<i64>("classes", count)?
        .into_iter()
        .map(|class| non_negative(class, "class label"))
        .collect()
}

pub(crate) fn read_binary_classes(reader: &mut BinaryReader<'_>, count: usize) -> LoadResult<Vec<usize>> {
    reader
        .i32s(count, "classes")?
        .into_iter()
        .map(|class| non_negative(class.into(), "class label"))
        .collect()
}

/// Reads the two-line name block: byte lengths, then the names.
pub(crate) fn read_text_names(reader: &mut TextReader<'_>, count: usize) -> LoadResult<Vec<String>> {
    let sizes = reader.row::<usize>("feature name sizes", count)?;
    let names = reader.row::<String>("feature names", count)?;
    for (name, &size) in names.iter().zip(&sizes) {
        invalid_if(name.len() != size, || {
            format!("feature name '{name}' does not have the declared length {size}")
        })?;
    }
    Ok(names)
}

/// Reads `count` name lengths followed by one concatenated byte block.
pub(crate) fn read_binary_names(reader: &mut BinaryReader<'_>, count: usize) -> LoadResult<Vec<String>> {
    let sizes = reader
        .i32s(count, "feature name sizes")?
        .into_iter()
        .map(|size| non_negative(size.into(), "feature name size"))
        .collect::<LoadResult<Vec<_>>>()?;
    let mut names = Vec::with_capacity(count);
    for size in sizes {
        let raw = reader.bytes(size, "feature names")?;
        names.push(utf8(raw)?.to_string());
    }
    Ok(names)
}

pub(crate) fn encode_names(out: &mut Vec<u8>, names: &[String]) {
    put_i32s(out, names.iter().map(|name| name.len() as i32));
    for name in names {
        out.extend_from_slice(name.as_bytes());
    }
}

pub(crate) fn write_labels<W: Write + ?Sized>(
    writer: &mut W,
    classes: &[usize],
    feature_names: &[String],
) -> io::Result<()> {
    write!(writer, "{:>25}", "Classes: ")?;
    for class in classes {
        write!(writer, "{class}\t")?;
    }
    writeln!(writer)?;
    if !feature_names.is_empty() {
        write!(writer, "{:>25}", "Feature Names: ")?;
        for name in feature_names {
            write!(writer, "{name}\t")?;
        }
        writeln!(writer)?;
    }
    Ok(())
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use ndarray::array;

    /// Root splits feature 0 at 5.0; left leaf favours slot 0, right slot 1.
    pub(crate) fn stump(classes: Vec<usize>) -> DecisionTree {
        DecisionTree::new(TreeParts {
            num_features: 2,
            max_depth: 1,
            classes,
            feature_names: vec!["rows".into(), "nnz".into()],
            left_child: vec![1, NO_CHILD, NO_CHILD],
            right_child: vec![2, NO_CHILD, NO_CHILD],
            threshold: vec![5.0, LEAF, LEAF],
            split_feature: vec![0, -2, -2],
            values: array![[0.0, 0.0], [9.0, 1.0], [2.0, 7.0]],
        })
        .unwrap()
    }

    #[test]
    fn stump_branches_on_threshold() {
        let tree = stump(vec![3, 1]);
        assert_eq!(tree.evaluate(&[1.0, 0.0]).unwrap(), 3);
        assert_eq!(tree.evaluate(&[9.0, 0.0]).unwrap(), 1);
        // Equal to the threshold takes the left branch.
        assert_eq!(tree.evaluate(&[5.0, 0.0]).unwrap(), 3);
        assert_eq!(tree.predict_slot(&[5.0, 0.0]).unwrap(), 0);
        assert_eq!(tree.predict_slot(&[5.000001, 0.0]).unwrap(), 1);
    }

    #[test]
    fn leaf_ties_pick_lowest_slot() {
        let tree = DecisionTree::new(TreeParts {
            num_features: 1,
            max_depth: 0,
            classes: vec![0, 1, 2],
            feature_names: Vec::new(),
            left_child: vec![NO_CHILD],
            right_child: vec![NO_CHILD],
            threshold: vec![LEAF],
            split_feature: vec![-2],
            values: array![[1.0, 4.0, 4.0]],
        })
        .unwrap();
        assert_eq!(tree.evaluate(&[0.0]).unwrap(), 1);
    }

    #[test]
    fn short_samples_are_rejected() {
        let tree = stump(vec![0, 1]);
        assert_eq!(
            tree.evaluate(&[1.0]),
            Err(ModelError::SampleTooShort {
                expected: 2,
                found: 1
            })
        );
    }

    #[test]
    fn cyclic_trees_fail_instead_of_looping() {
        let tree = DecisionTree::new(TreeParts {
            num_features: 1,
            max_depth: 2,
            classes: vec![0, 1],
            feature_names: Vec::new(),
            left_child: vec![1, 0],
            right_child: vec![1, 0],
            threshold: vec![0.5, 0.5],
            split_feature: vec![0, 0],
            values: Array2::zeros((2, 2)),
        })
        .unwrap();
        assert_eq!(
            tree.evaluate(&[0.0]),
            Err(ModelError::CycleDetected { nodes: 2 })
        );
    }

    #[test]
    fn invalid_children_are_rejected() {
        let mut parts = TreeParts {
            num_features: 1,
            max_depth: 1,
            classes: vec![0, 1],
            feature_names: Vec::new(),
            left_child: vec![1, NO_CHILD, NO_CHILD],
            right_child: vec![3, NO_CHILD, NO_CHILD],
            threshold: vec![1.0, LEAF, LEAF],
            split_feature: vec![0, -2, -2],
            values: Array2::zeros((3, 2)),
        };
        assert!(matches!(
            DecisionTree::new(parts.clone()),
            Err(LoadError::Invalid(_))
        ));
        parts.right_child[0] = 2;
        parts.split_feature[0] = 1;
        assert!(matches!(DecisionTree::new(parts), Err(LoadError::Invalid(_))));
    }

    #[test]
    fn binary_round_trip_is_bit_exact() {
        let tree = stump(vec![0, 2]);
        let mut bytes = Vec::new();
        tree.write_binary(&mut bytes).unwrap();

        let reloaded = DecisionTree::parse_binary(&bytes, true).unwrap();
        assert_eq!(reloaded.left_child(), tree.left_child());
        assert_eq!(reloaded.right_child(), tree.right_child());
        assert_eq!(reloaded.split_feature(), tree.split_feature());
        let bits = |values: &[f64]| values.iter().map(|v| v.to_bits()).collect::<Vec<_>>();
        assert_eq!(bits(reloaded.threshold()), bits(tree.threshold()));
        assert_eq!(
            bits(reloaded.values().as_slice().unwrap()),
            bits(tree.values().as_slice().unwrap())
        );
        assert_eq!(reloaded.feature_names(), tree.feature_names());
        assert_eq!(reloaded, tree);
    }

    #[test]
    fn text_round_trip_preserves_the_model() {
        let tree = stump(vec![4, 7]);
        let mut text = Vec::new();
        tree.write_text(&mut text).unwrap();
        let text = String::from_utf8(text).unwrap();

        let reloaded = DecisionTree::parse_text(&text, true).unwrap();
        assert_eq!(reloaded, tree);
    }

    #[test]
    fn parses_hand_written_text_without_names() {
        let text = "\
# stump
1 2 3 1
0 1

1 -1 -1
# right children
2 -1 -1
0.5 -2 -2
0 -2 -2
0 0
1 0
0 1
";
        let tree = DecisionTree::parse_text(text, false).unwrap();
        assert_eq!(tree.node_count(), 3);
        assert!(!tree.has_feature_names());
        assert_eq!(tree.evaluate(&[0.25]).unwrap(), 0);
        assert_eq!(tree.evaluate(&[0.75]).unwrap(), 1);
    }

    #[test]
    fn text_row_with_wrong_width_fails() {
        let text = "1 2 1 0\n0 1\n-1\n-1\n-2\n-2\n0.5 0.5 0.5\n";
        match DecisionTree::parse_text(text, false) {
            Err(LoadError::TokenCount {
                line,
                expected,
                found,
            }) => assert_eq!((line, expected, found), (7, 2, 3)),
            other => panic!("expected token count error, got {other:?}"),
        }
    }

    #[test]
    fn truncated_binary_reports_eof() {
        let mut bytes = Vec::new();
        stump(vec![0, 1]).write_binary(&mut bytes).unwrap();
        bytes.truncate(bytes.len() - 3);
        assert!(matches!(
            DecisionTree::parse_binary(&bytes, true),
            Err(LoadError::UnexpectedEof { what: "leaf values" })
        ));
    }

    #[test]
    fn negative_class_labels_are_rejected() {
        let text = "1 2 1 0\n0 -1\n-1\n-1\n-2\n-2\n0.5 0.5\n";
        assert!(matches!(
            DecisionTree::parse_text(text, false),
            Err(LoadError::Invalid(_))
        ));
    }

    #[test]
    fn missing_file_is_an_io_error() {
        let missing = std::env::temp_dir().join("formtune-no-such-tree.bin");
        assert!(matches!(
            DecisionTree::load(&missing, LoadOptions::binary()),
            Err(LoadError::Io { .. })
        ));
    }
}
