pub mod catalog;
pub mod storage;
pub mod retrieval;
pub mod extraction;
pub mod reconcile;
pub mod structuring;
pub mod processor; // Per-report extraction with external-model fallback
pub mod batch; // Report segmentation and batch serialization
pub mod diagnostic; // Pipeline diagnostic dump (MEDCODER_DUMP_DIR)
