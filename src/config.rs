//! Configuration constants for the experiment runner
//!
//! This module centralizes the defaults and file names used throughout
//! the application.

// ============================================================================
// External Program
// ============================================================================

/// Evaluation program launched once per experiment
pub const DEFAULT_PROGRAM: &str = "assign4.py";

/// Interpreter used to launch the evaluation program
pub const DEFAULT_INTERPRETER: &str = "python";

// ============================================================================
// Embedding Files
// ============================================================================

/// Pretrained word2vec vectors (300 dimensions, text format)
pub const WORD2VEC_EMBEDDINGS: &str = "GoogleNews-vectors-negative300.txt";

/// Pretrained GloVe vectors (840B tokens, 300 dimensions)
pub const GLOVE_EMBEDDINGS: &str = "glove.840B.300d.txt";

// ============================================================================
// Output
// ============================================================================

/// Printed before and after every experiment
pub const SEPARATOR: &str =
    "==============================================================================";

/// File name of the suite description inside a record directory
pub const SUITE_RECORD_FILE: &str = "suite.json";
