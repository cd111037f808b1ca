//! Random forest: an ordered set of decision trees voting by majority.

use crate::error::{LoadError, LoadResult, ModelError};
use crate::io::{non_negative, put_i32s, write_row, BinaryReader, TextReader};
use crate::tree::{
    encode_names, invalid_if, read_binary_classes, read_binary_names, read_model_file,
    read_text_classes, read_text_names, utf8, write_labels, DecisionTree, Encoding, LoadOptions,
};
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

#[derive(Debug, Clone, PartialEq)]
pub struct RandomForest {
    num_features: usize,
    num_outputs: usize,
    classes: Vec<usize>,
    feature_names: Vec<String>,
    estimators: Vec<DecisionTree>,
    source: Option<PathBuf>,
}

/// Forest-level header shared by the combined and split layouts.
struct Metadata {
    num_features: usize,
    num_outputs: usize,
    estimator_sizes: Vec<usize>,
    classes: Vec<usize>,
    feature_names: Vec<String>,
}

impl RandomForest {
    /// Every estimator must agree with the forest on features and classes.
    pub fn new(
        num_features: usize,
        num_outputs: usize,
        classes: Vec<usize>,
        feature_names: Vec<String>,
        estimators: Vec<DecisionTree>,
    ) -> LoadResult<Self> {
        invalid_if(estimators.is_empty(), || "forest has no estimators".into())?;
        invalid_if(
            !feature_names.is_empty() && feature_names.len() != num_features,
            || format!("{} feature names for {num_features} features", feature_names.len()),
        )?;
        for (idx, tree) in estimators.iter().enumerate() {
            invalid_if(tree.num_classes() != classes.len(), || {
                format!(
                    "estimator {idx} has {} classes, forest has {}",
                    tree.num_classes(),
                    classes.len()
                )
            })?;
            invalid_if(tree.num_features() != num_features, || {
                format!(
                    "estimator {idx} reads {} features, forest has {num_features}",
                    tree.num_features()
                )
            })?;
        }
        Ok(Self {
            num_features,
            num_outputs,
            classes,
            feature_names,
            estimators,
            source: None,
        })
    }

    /// Loads the combined layout: metadata followed by every estimator.
    pub fn load(path: impl AsRef<Path>, options: LoadOptions) -> LoadResult<Self> {
        let path = path.as_ref();
        let bytes = read_model_file(path)?;
        let mut forest = match options.encoding {
            Encoding::Text => Self::parse_text(utf8(&bytes)?, options.feature_names)?,
            Encoding::Binary => Self::parse_binary(&bytes, options.feature_names)?,
        };
        info!(
            path = %path.display(),
            estimators = forest.num_estimators(),
            "loaded random forest"
        );
        forest.source = Some(path.to_path_buf());
        Ok(forest)
    }

    /// Loads the split layout: one metadata file plus one tree file per
    /// estimator, in order.
    pub fn load_split<P: AsRef<Path>>(
        metadata: impl AsRef<Path>,
        estimators: &[P],
        options: LoadOptions,
    ) -> LoadResult<Self> {
        let metadata_path = metadata.as_ref();
        let bytes = read_model_file(metadata_path)?;
        let meta = match options.encoding {
            Encoding::Text => {
                let mut reader = TextReader::new(utf8(&bytes)?);
                let meta = Metadata::read_text(&mut reader, options.feature_names)?;
                reader.finish()?;
                meta
            }
            Encoding::Binary => {
                let mut reader = BinaryReader::new(&bytes);
                let meta = Metadata::read_binary(&mut reader, options.feature_names)?;
                reader.finish()?;
                meta
            }
        };
        invalid_if(meta.estimator_sizes.len() != estimators.len(), || {
            format!(
                "metadata lists {} estimators, {} files given",
                meta.estimator_sizes.len(),
                estimators.len()
            )
        })?;

        let tree_options = options.with_feature_names(false);
        let trees = estimators
            .iter()
            .map(|path| DecisionTree::load(path, tree_options))
            .collect::<LoadResult<Vec<_>>>()?;
        let mut forest = meta.into_forest(trees)?;
        info!(
            metadata = %metadata_path.display(),
            estimators = forest.num_estimators(),
            "loaded random forest"
        );
        forest.source = Some(metadata_path.to_path_buf());
        Ok(forest)
    }

    /// Loads a split layout directory. The file whose name contains
    /// `metadata` is the header; every other file, sorted by name, is an
    /// estimator.
    pub fn load_dir(dir: impl AsRef<Path>, options: LoadOptions) -> LoadResult<Self> {
        let dir = dir.as_ref();
        let io_error = |source| LoadError::Io {
            path: dir.to_path_buf(),
            source,
        };
        let mut files = Vec::new();
        for entry in fs::read_dir(dir).map_err(io_error)? {
            let path = entry.map_err(io_error)?.path();
            if path.is_file() {
                files.push(path);
            }
        }
        files.sort();

        let (metadata, estimators): (Vec<_>, Vec<_>) = files.into_iter().partition(|path| {
            path.file_name()
                .and_then(|name| name.to_str())
                .map_or(false, |name| name.contains("metadata"))
        });
        let [metadata] = metadata.as_slice() else {
            return Err(LoadError::Invalid(format!(
                "{} must hold exactly one metadata file, found {}",
                dir.display(),
                metadata.len()
            )));
        };
        debug!(dir = %dir.display(), estimators = estimators.len(), "loading forest directory");
        Self::load_split(metadata, estimators.as_slice(), options)
    }

    pub fn parse_text(text: &str, feature_names: bool) -> LoadResult<Self> {
        let mut reader = TextReader::new(text);
        let meta = Metadata::read_text(&mut reader, feature_names)?;
        let trees = (0..meta.estimator_sizes.len())
            .map(|_| DecisionTree::read_text(&mut reader, false))
            .collect::<LoadResult<Vec<_>>>()?;
        reader.finish()?;
        meta.into_forest(trees)
    }

    pub fn parse_binary(bytes: &[u8], feature_names: bool) -> LoadResult<Self> {
        let mut reader = BinaryReader::new(bytes);
        let meta = Metadata::read_binary(&mut reader, feature_names)?;
        let trees = (0..meta.estimator_sizes.len())
            .map(|_| DecisionTree::read_binary(&mut reader, false))
            .collect::<LoadResult<Vec<_>>>()?;
        reader.finish()?;
        meta.into_forest(trees)
    }

    /// Writes the combined text layout; names are written when present.
    pub fn write_text<W: Write>(&self, mut writer: W) -> io::Result<()> {
        self.write_metadata_text(&mut writer)?;
        for tree in &self.estimators {
            tree.write_text_section(&mut writer, false)?;
        }
        Ok(())
    }

    /// Writes the combined binary layout; names are written when present.
    pub fn write_binary<W: Write>(&self, mut writer: W) -> io::Result<()> {
        let mut out = Vec::new();
        self.encode_metadata(&mut out);
        for tree in &self.estimators {
            tree.encode_binary(&mut out, false);
        }
        writer.write_all(&out)
    }

    /// Writes the split layout into `dir`: `metadata.<ext>` plus one
    /// `estimator_NNNN.<ext>` per tree.
    pub fn save_dir(&self, dir: impl AsRef<Path>, encoding: Encoding) -> io::Result<()> {
        let dir = dir.as_ref();
        fs::create_dir_all(dir)?;
        let ext = encoding.extension();
        let mut metadata = Vec::new();
        match encoding {
            Encoding::Text => self.write_metadata_text(&mut metadata)?,
            Encoding::Binary => self.encode_metadata(&mut metadata),
        }
        fs::write(dir.join(format!("metadata.{ext}")), metadata)?;
        for (idx, tree) in self.estimators.iter().enumerate() {
            let mut out = Vec::new();
            match encoding {
                Encoding::Text => tree.write_text_section(&mut out, false)?,
                Encoding::Binary => tree.encode_binary(&mut out, false),
            }
            fs::write(dir.join(format!("estimator_{idx:04}.{ext}")), out)?;
        }
        Ok(())
    }

    fn write_metadata_text<W: Write + ?Sized>(&self, writer: &mut W) -> io::Result<()> {
        writeln!(writer, "# num_features num_classes num_outputs num_estimators")?;
        write_row(
            writer,
            [
                self.num_features,
                self.num_classes(),
                self.num_outputs,
                self.num_estimators(),
            ],
        )?;
        writeln!(writer, "# estimator node counts")?;
        write_row(writer, self.estimators.iter().map(DecisionTree::node_count))?;
        writeln!(writer, "# classes")?;
        write_row(writer, &self.classes)?;
        if !self.feature_names.is_empty() {
            writeln!(writer, "# feature names")?;
            write_row(writer, self.feature_names.iter().map(String::len))?;
            write_row(writer, &self.feature_names)?;
        }
        Ok(())
    }

    fn encode_metadata(&self, out: &mut Vec<u8>) {
        put_i32s(
            out,
            [
                self.num_features,
                self.num_classes(),
                self.num_outputs,
                self.num_estimators(),
            ]
            .map(|count| count as i32),
        );
        put_i32s(
            out,
            self.estimators.iter().map(|tree| tree.node_count() as i32),
        );
        put_i32s(out, self.classes.iter().map(|&class| class as i32));
        if !self.feature_names.is_empty() {
            encode_names(out, &self.feature_names);
        }
    }

    /// Majority vote over estimator slots. Returns the winning class index;
    /// ties go to the lowest index.
    pub fn evaluate(&self, sample: &[f64]) -> Result<usize, ModelError> {
        let mut votes = vec![0usize; self.num_classes()];
        for tree in &self.estimators {
            votes[tree.predict_slot(sample)?] += 1;
        }
        let mut winner = 0;
        for (slot, &count) in votes.iter().enumerate() {
            if count > votes[winner] {
                winner = slot;
            }
        }
        Ok(winner)
    }

    pub fn num_features(&self) -> usize {
        self.num_features
    }

    pub fn num_classes(&self) -> usize {
        self.classes.len()
    }

    pub fn num_outputs(&self) -> usize {
        self.num_outputs
    }

    pub fn num_estimators(&self) -> usize {
        self.estimators.len()
    }

    pub fn estimators(&self) -> &[DecisionTree] {
        &self.estimators
    }

    pub fn estimator_sizes(&self) -> Vec<usize> {
        self.estimators.iter().map(DecisionTree::node_count).collect()
    }

    pub fn classes(&self) -> &[usize] {
        &self.classes
    }

    pub fn feature_names(&self) -> &[String] {
        &self.feature_names
    }

    pub fn source(&self) -> Option<&Path> {
        self.source.as_deref()
    }

    pub fn write_summary<W: Write + ?Sized>(&self, writer: &mut W) -> io::Result<()> {
        writeln!(writer, "{:>25}{}", "Number of Features: ", self.num_features)?;
        writeln!(writer, "{:>25}{}", "Number of Classes: ", self.num_classes())?;
        writeln!(writer, "{:>25}{}", "Number of Outputs: ", self.num_outputs)?;
        writeln!(writer, "{:>25}{}", "Number of Estimators: ", self.num_estimators())?;
        write_labels(writer, &self.classes, &self.feature_names)
    }
}

impl Metadata {
    fn read_text(reader: &mut TextReader<'_>, feature_names: bool) -> LoadResult<Self> {
        let header = reader.row::<i64>("forest header", 4)?;
        let counts = header
            .iter()
            .map(|&value| non_negative(value, "forest header entry"))
            .collect::<LoadResult<Vec<_>>>()?;
        let (num_features, num_classes, num_outputs, num_estimators) =
            (counts[0], counts[1], counts[2], counts[3]);
        invalid_if(num_features == 0 || num_classes == 0 || num_estimators == 0, || {
            format!("empty forest header {header:?}")
        })?;

        let estimator_sizes = reader
            .row::<i64>("estimator node counts", num_estimators)?
            .into_iter()
            .map(|size| non_negative(size, "estimator node count"))
            .collect::<LoadResult<Vec<_>>>()?;
        let classes = read_text_classes(reader, num_classes)?;
        let feature_names = if feature_names {
            read_text_names(reader, num_features)?
        } else {
            Vec::new()
        };
        Ok(Self {
            num_features,
            num_outputs,
            estimator_sizes,
            classes,
            feature_names,
        })
    }

    fn read_binary(reader: &mut BinaryReader<'_>, feature_names: bool) -> LoadResult<Self> {
        let header = reader.i32s(4, "forest header")?;
        let counts = header
            .iter()
            .map(|&value| non_negative(value.into(), "forest header entry"))
            .collect::<LoadResult<Vec<_>>>()?;
        let (num_features, num_classes, num_outputs, num_estimators) =
            (counts[0], counts[1], counts[2], counts[3]);
        invalid_if(num_features == 0 || num_classes == 0 || num_estimators == 0, || {
            format!("empty forest header {header:?}")
        })?;

        let estimator_sizes = reader
            .i32s(num_estimators, "estimator node counts")?
            .into_iter()
            .map(|size| non_negative(size.into(), "estimator node count"))
            .collect::<LoadResult<Vec<_>>>()?;
        let classes = read_binary_classes(reader, num_classes)?;
        let feature_names = if feature_names {
            read_binary_names(reader, num_features)?
        } else {
            Vec::new()
        };
        Ok(Self {
            num_features,
            num_outputs,
            estimator_sizes,
            classes,
            feature_names,
        })
    }

    fn into_forest(self, estimators: Vec<DecisionTree>) -> LoadResult<RandomForest> {
        for (idx, (tree, &declared)) in estimators.iter().zip(&self.estimator_sizes).enumerate() {
            invalid_if(tree.node_count() != declared, || {
                format!(
                    "estimator {idx} has {} nodes, metadata declares {declared}",
                    tree.node_count()
                )
            })?;
        }
        RandomForest::new(
            self.num_features,
            self.num_outputs,
            self.classes,
            self.feature_names,
            estimators,
        )
    }
}
