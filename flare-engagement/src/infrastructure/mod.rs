pub mod enrichment;
pub mod persistence;
