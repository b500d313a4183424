//! Navigation map: graph model and the text format the server sends it in

pub mod graph;
pub mod parser;

pub use graph::{HqNode, Map, Node, Position};
pub use parser::{parse_map, ParseError, ParseWarning, ParsedMap};
