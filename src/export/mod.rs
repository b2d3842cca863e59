//! Interchange formats for finished networks.

pub mod gexf;

pub use gexf::{parse_gexf, write_gexf, ParsedEdge, ParsedGraph, ParsedNode};
