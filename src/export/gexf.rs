//! GEXF 1.3 writer and reader for finished networks.
//!
//! Nodes carry their depth, kind and importance as GEXF attributes and their
//! color, size and radial position through the `viz` namespace. Edges carry
//! relation type, code, curvature and the reciprocal flag.

use quick_xml::escape::unescape;
use quick_xml::events::{BytesDecl, BytesEnd, BytesStart, BytesText, Event};
use quick_xml::{Reader, Writer};
use std::collections::HashMap;

use crate::error::{BionetError, Result};
use crate::network::model::{GraphDocument, NodeKind, PersonId, RelationType};

pub const GEXF_NS: &str = "http://gexf.net/1.3";
pub const VIZ_NS: &str = "http://gexf.net/1.3/viz";

/// (id, type) of node attributes, in declaration order.
const NODE_ATTRIBUTES: &[(&str, &str)] = &[
    ("depth", "integer"),
    ("kind", "string"),
    ("importance", "integer"),
    ("nameChn", "string"),
    ("indexYear", "integer"),
    ("dynasty", "string"),
];

const EDGE_ATTRIBUTES: &[(&str, &str)] = &[
    ("relation", "string"),
    ("code", "integer"),
    ("curvature", "double"),
    ("reciprocal", "boolean"),
];

fn node_color(kind: NodeKind) -> (u8, u8, u8) {
    match kind {
        NodeKind::Central => (220, 53, 69),
        NodeKind::Kinship => (40, 167, 69),
        NodeKind::Association => (0, 123, 255),
        NodeKind::Office => (255, 193, 7),
        NodeKind::Mixed => (108, 117, 125),
    }
}

fn edge_color(kind: RelationType) -> (u8, u8, u8) {
    match kind {
        RelationType::Kinship => (40, 167, 69),
        RelationType::Association => (0, 123, 255),
        RelationType::Office => (255, 193, 7),
    }
}

type XmlWriter = Writer<Vec<u8>>;

fn emit(writer: &mut XmlWriter, event: Event<'_>) -> Result<()> {
    writer
        .write_event(event)
        .map_err(|e| BionetError::Export(e.to_string()))
}

fn element<'a>(name: &'a str, attrs: &[(&str, &str)]) -> BytesStart<'a> {
    let mut start = BytesStart::new(name);
    for &attr in attrs {
        start.push_attribute(attr);
    }
    start
}

fn open(writer: &mut XmlWriter, name: &str, attrs: &[(&str, &str)]) -> Result<()> {
    emit(writer, Event::Start(element(name, attrs)))
}

fn close(writer: &mut XmlWriter, name: &str) -> Result<()> {
    emit(writer, Event::End(BytesEnd::new(name)))
}

fn empty(writer: &mut XmlWriter, name: &str, attrs: &[(&str, &str)]) -> Result<()> {
    emit(writer, Event::Empty(element(name, attrs)))
}

fn text_element(writer: &mut XmlWriter, name: &str, text: &str) -> Result<()> {
    open(writer, name, &[])?;
    emit(writer, Event::Text(BytesText::new(text)))?;
    close(writer, name)
}

fn attribute_block(writer: &mut XmlWriter, class: &str, attrs: &[(&str, &str)]) -> Result<()> {
    open(writer, "attributes", &[("class", class), ("mode", "static")])?;
    for &(id, kind) in attrs {
        empty(writer, "attribute", &[("id", id), ("title", id), ("type", kind)])?;
    }
    close(writer, "attributes")
}

fn attvalues(writer: &mut XmlWriter, values: &[(&str, String)]) -> Result<()> {
    open(writer, "attvalues", &[])?;
    for (key, value) in values {
        empty(writer, "attvalue", &[("for", *key), ("value", value.as_str())])?;
    }
    close(writer, "attvalues")
}

fn color(writer: &mut XmlWriter, (r, g, b): (u8, u8, u8)) -> Result<()> {
    let (r, g, b) = (r.to_string(), g.to_string(), b.to_string());
    empty(
        writer,
        "viz:color",
        &[("r", r.as_str()), ("g", g.as_str()), ("b", b.as_str())],
    )
}

/// Serialize `doc` as an undirected GEXF 1.3 graph.
pub fn write_gexf(doc: &GraphDocument) -> Result<String> {
    let mut writer = Writer::new_with_indent(Vec::new(), b' ', 2);
    emit(&mut writer, Event::Decl(BytesDecl::new("1.0", Some("UTF-8"), None)))?;
    open(
        &mut writer,
        "gexf",
        &[("xmlns", GEXF_NS), ("xmlns:viz", VIZ_NS), ("version", "1.3")],
    )?;

    let today = chrono::Utc::now().format("%Y-%m-%d").to_string();
    open(&mut writer, "meta", &[("lastmodifieddate", today.as_str())])?;
    text_element(&mut writer, "creator", concat!("bionet ", env!("CARGO_PKG_VERSION")))?;
    text_element(&mut writer, "description", &doc.interpretation.summary)?;
    close(&mut writer, "meta")?;

    open(
        &mut writer,
        "graph",
        &[("defaultedgetype", "undirected"), ("mode", "static")],
    )?;
    attribute_block(&mut writer, "node", NODE_ATTRIBUTES)?;
    attribute_block(&mut writer, "edge", EDGE_ATTRIBUTES)?;

    open(&mut writer, "nodes", &[])?;
    for node in &doc.nodes {
        let id = node.id.to_string();
        open(&mut writer, "node", &[("id", id.as_str()), ("label", node.label.as_str())])?;

        let mut values = vec![
            ("depth", node.depth.to_string()),
            ("kind", node.kind.as_str().to_string()),
            ("importance", node.importance.to_string()),
        ];
        if let Some(name) = &node.metadata.name_chn {
            values.push(("nameChn", name.clone()));
        }
        if let Some(year) = node.metadata.index_year {
            values.push(("indexYear", year.to_string()));
        }
        if let Some(dynasty) = &node.metadata.dynasty {
            values.push(("dynasty", dynasty.clone()));
        }
        attvalues(&mut writer, &values)?;

        color(&mut writer, node_color(node.kind))?;
        let size = node.size.to_string();
        empty(&mut writer, "viz:size", &[("value", size.as_str())])?;
        let (x, y) = (node.x.to_string(), node.y.to_string());
        empty(&mut writer, "viz:position", &[("x", x.as_str()), ("y", y.as_str()), ("z", "0.0")])?;
        close(&mut writer, "node")?;
    }
    close(&mut writer, "nodes")?;

    open(&mut writer, "edges", &[])?;
    for (index, edge) in doc.edges.iter().enumerate() {
        let (id, source, target) = (
            index.to_string(),
            edge.source.to_string(),
            edge.target.to_string(),
        );
        let weight = edge.weight.to_string();
        open(
            &mut writer,
            "edge",
            &[
                ("id", id.as_str()),
                ("source", source.as_str()),
                ("target", target.as_str()),
                ("label", edge.label.as_str()),
                ("weight", weight.as_str()),
            ],
        )?;
        attvalues(
            &mut writer,
            &[
                ("relation", edge.kind.as_str().to_string()),
                ("code", edge.code.to_string()),
                ("curvature", edge.curvature.to_string()),
                ("reciprocal", edge.reciprocal.to_string()),
            ],
        )?;
        color(&mut writer, edge_color(edge.kind))?;
        close(&mut writer, "edge")?;
    }
    close(&mut writer, "edges")?;

    close(&mut writer, "graph")?;
    close(&mut writer, "gexf")?;

    String::from_utf8(writer.into_inner()).map_err(|e| BionetError::Export(e.to_string()))
}

/// Node as read back from a GEXF file.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ParsedNode {
    pub id: PersonId,
    pub label: String,
    pub kind: Option<String>,
    pub depth: Option<u32>,
    pub size: Option<f64>,
    pub position: Option<(f64, f64)>,
}

/// Edge as read back from a GEXF file.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ParsedEdge {
    pub source: PersonId,
    pub target: PersonId,
    pub label: String,
    pub weight: Option<f64>,
    pub relation: Option<RelationType>,
    pub curvature: Option<f64>,
    pub reciprocal: bool,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ParsedGraph {
    pub nodes: Vec<ParsedNode>,
    pub edges: Vec<ParsedEdge>,
}

fn attributes(start: &BytesStart<'_>) -> Result<HashMap<String, String>> {
    let mut map = HashMap::new();
    for attr in start.attributes() {
        let attr = attr.map_err(|e| BionetError::Parse(e.to_string()))?;
        let key = String::from_utf8_lossy(attr.key.local_name().as_ref()).into_owned();
        let raw = String::from_utf8_lossy(&attr.value);
        let value = unescape(&raw)
            .map_err(|e| BionetError::Parse(e.to_string()))?
            .into_owned();
        map.insert(key, value);
    }
    Ok(map)
}

fn required<T: std::str::FromStr>(attrs: &HashMap<String, String>, key: &str, element: &str) -> Result<T> {
    let raw = attrs
        .get(key)
        .ok_or_else(|| BionetError::Parse(format!("<{}> without {}", element, key)))?;
    raw.parse()
        .map_err(|_| BionetError::Parse(format!("<{}> has invalid {} {:?}", element, key, raw)))
}

fn optional<T: std::str::FromStr>(attrs: &HashMap<String, String>, key: &str) -> Option<T> {
    attrs.get(key).and_then(|v| v.parse().ok())
}

/// Accumulates elements while the reader walks the document.
#[derive(Default)]
struct ParseState {
    graph: ParsedGraph,
    node: Option<ParsedNode>,
    edge: Option<ParsedEdge>,
    seen_root: bool,
}

impl ParseState {
    fn open(&mut self, start: &BytesStart<'_>, self_closing: bool) -> Result<()> {
        let local = start.local_name();
        let name = local.as_ref();

        if !self.seen_root {
            if name != b"gexf" {
                return Err(BionetError::Parse(format!(
                    "expected <gexf> root, found <{}>",
                    String::from_utf8_lossy(name)
                )));
            }
            self.seen_root = true;
            return Ok(());
        }

        match name {
            b"node" => {
                let attrs = attributes(start)?;
                let node = ParsedNode {
                    id: required(&attrs, "id", "node")?,
                    label: attrs.get("label").cloned().unwrap_or_default(),
                    ..ParsedNode::default()
                };
                if self_closing {
                    self.graph.nodes.push(node);
                } else {
                    self.node = Some(node);
                }
            }
            b"edge" => {
                let attrs = attributes(start)?;
                let edge = ParsedEdge {
                    source: required(&attrs, "source", "edge")?,
                    target: required(&attrs, "target", "edge")?,
                    label: attrs.get("label").cloned().unwrap_or_default(),
                    weight: optional(&attrs, "weight"),
                    ..ParsedEdge::default()
                };
                if self_closing {
                    self.graph.edges.push(edge);
                } else {
                    self.edge = Some(edge);
                }
            }
            b"attvalue" => {
                let attrs = attributes(start)?;
                let (Some(key), Some(value)) = (attrs.get("for"), attrs.get("value")) else {
                    return Ok(());
                };
                if let Some(node) = self.node.as_mut() {
                    match key.as_str() {
                        "depth" => node.depth = value.parse().ok(),
                        "kind" => node.kind = Some(value.clone()),
                        _ => {}
                    }
                } else if let Some(edge) = self.edge.as_mut() {
                    match key.as_str() {
                        "relation" => edge.relation = value.parse().ok(),
                        "curvature" => edge.curvature = value.parse().ok(),
                        "reciprocal" => edge.reciprocal = value == "true",
                        _ => {}
                    }
                }
            }
            b"size" => {
                if let Some(node) = self.node.as_mut() {
                    node.size = optional(&attributes(start)?, "value");
                }
            }
            b"position" => {
                if let Some(node) = self.node.as_mut() {
                    let attrs = attributes(start)?;
                    node.position = optional(&attrs, "x").zip(optional(&attrs, "y"));
                }
            }
            _ => {}
        }
        Ok(())
    }

    fn close(&mut self, name: &[u8]) {
        match name {
            b"node" => {
                if let Some(node) = self.node.take() {
                    self.graph.nodes.push(node);
                }
            }
            b"edge" => {
                if let Some(edge) = self.edge.take() {
                    self.graph.edges.push(edge);
                }
            }
            _ => {}
        }
    }
}

/// Read a GEXF document back into node and edge lists.
pub fn parse_gexf(xml: &str) -> Result<ParsedGraph> {
    let mut reader = Reader::from_str(xml);
    let mut buf = Vec::new();
    let mut state = ParseState::default();

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(e)) => state.open(&e, false)?,
            Ok(Event::Empty(e)) => state.open(&e, true)?,
            Ok(Event::End(e)) => state.close(e.local_name().as_ref()),
            Ok(Event::Eof) => break,
            Ok(_) => {}
            Err(e) => return Err(BionetError::Parse(e.to_string())),
        }
        buf.clear();
    }

    if !state.seen_root {
        return Err(BionetError::Parse("empty document".to_string()));
    }
    Ok(state.graph)
}
