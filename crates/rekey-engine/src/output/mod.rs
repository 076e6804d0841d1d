//! File formats for legacy sources and exported target tables.

pub mod csv;
