//! Built-in experiment catalog
//!
//! Six runs of the sentiment classifier: each embedding source alone and both
//! combined in two-channel mode, first with frozen (static) embeddings and then
//! with fine-tuned ones.

use std::path::Path;

use super::definition::ExperimentConfig;
use crate::config::{GLOVE_EMBEDDINGS, WORD2VEC_EMBEDDINGS};

/// Embedding source for a single channel
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Embeddings {
    Word2Vec,
    Glove,
}

impl Embeddings {
    pub fn file_name(self) -> &'static str {
        match self {
            Embeddings::Word2Vec => WORD2VEC_EMBEDDINGS,
            Embeddings::Glove => GLOVE_EMBEDDINGS,
        }
    }
}

/// Row of the catalog table: (primary, secondary, static)
const CATALOG: [(Embeddings, Option<Embeddings>, bool); 6] = [
    (Embeddings::Word2Vec, None, true),
    (Embeddings::Glove, None, true),
    (Embeddings::Word2Vec, Some(Embeddings::Glove), true),
    (Embeddings::Word2Vec, None, false),
    (Embeddings::Glove, None, false),
    (Embeddings::Word2Vec, Some(Embeddings::Glove), false),
];

/// Where catalog experiments read embeddings from and write outputs to
#[derive(Debug, Clone)]
pub struct CatalogPaths<'a> {
    pub embeddings_dir: &'a Path,
    pub output_dir: &'a Path,
}

impl Default for CatalogPaths<'_> {
    fn default() -> Self {
        Self {
            embeddings_dir: Path::new("."),
            output_dir: Path::new("."),
        }
    }
}

/// Build the six catalog experiments in run order
///
/// `eval_only = false` produces the same configurations as training runs.
pub fn builtin_experiments(paths: &CatalogPaths<'_>, eval_only: bool) -> Vec<ExperimentConfig> {
    CATALOG
        .iter()
        .enumerate()
        .map(|(idx, &(primary, secondary, is_static))| {
            let number = idx + 1;
            ExperimentConfig {
                name: format!("exp{}", number),
                model: join(paths.output_dir, &format!("model_exp{}.ckpt", number)),
                embeddings: join(paths.embeddings_dir, primary.file_name()),
                embeddings2: secondary.map(|e| join(paths.embeddings_dir, e.file_name())),
                two_channel: secondary.is_some(),
                is_static,
                eval_only,
                predictions: join(paths.output_dir, &format!("predictions_exp{}.txt", number)),
            }
        })
        .collect()
}

/// Join without a leading "./" when the directory is the current one
fn join(dir: &Path, file: &str) -> String {
    if dir.as_os_str().is_empty() || dir == Path::new(".") {
        file.to_string()
    } else {
        dir.join(file).to_string_lossy().into_owned()
    }
}
