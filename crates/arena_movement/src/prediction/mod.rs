//! # Client-Side Prediction
//!
//! Predict local movement immediately, keep what was predicted until the
//! authority confirms it, and rewind when it does not.
//!
//! ```text
//! Moves:      [1] [2] [3] [4] [5]
//!              │   │   │   │   │
//! Prediction: [P1][P2][P3][P4][P5]      kept in MoveHistoryBuffer
//!                      │
//! Correction:         [S3]───────────   authority disagrees at 3
//!                      │
//! Reconcile:  drop [1..3], replay [4,5] from S3
//! ```
//!
//! Silence from the authority means the prediction was right; moves are
//! then trimmed by good-move acknowledgements or by later corrections.

pub mod history;
pub mod reconcile;
pub mod record;

pub use history::{MoveHistoryBuffer, ReplayJob};
pub use reconcile::{CorrectionKind, ReconciliationEngine, ReconciliationOutcome, ReconciliationStats};
pub use record::MoveRecord;
