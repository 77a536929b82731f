//! GEXF 1.2 export and import
//!
//! Node attributes `bipartite`, `language` and `weight`, edge attribute
//! `relation`. Node ids are the graph keys.

use crate::graph::{Node, NodeKind, ProjectGraph, Relation, UNKNOWN_LANGUAGE};
use crate::output::{OutputError, OutputResult};
use chrono::Utc;
use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;
use std::collections::HashMap;
use std::fmt::Write as _;
use std::fs::File;
use std::io::Write;
use std::path::Path;

const ATTR_BIPARTITE: u8 = 0;
const ATTR_LANGUAGE: u8 = 1;
const ATTR_WEIGHT: u8 = 2;
const ATTR_RELATION: u8 = 3;

/// Writes the graph as a GEXF file
///
/// # Arguments
///
/// * `graph` - The graph to export
/// * `output_path` - Path where the file should be written
pub fn write_gexf(graph: &ProjectGraph, output_path: &Path) -> OutputResult<()> {
    let document = format_gexf(graph)?;

    let mut file = File::create(output_path)?;
    file.write_all(document.as_bytes())?;

    tracing::info!(
        "Wrote {} nodes and {} edges to {}",
        graph.node_count(),
        graph.edge_count(),
        output_path.display()
    );
    Ok(())
}

/// Formats the graph as a GEXF document
pub fn format_gexf(graph: &ProjectGraph) -> OutputResult<String> {
    let mut out = String::new();

    writeln!(out, r#"<?xml version="1.0" encoding="UTF-8"?>"#)?;
    writeln!(
        out,
        r#"<gexf xmlns="http://www.gexf.net/1.2draft" version="1.2">"#
    )?;
    writeln!(
        out,
        r#"  <meta lastmodifieddate="{}">"#,
        Utc::now().format("%Y-%m-%d")
    )?;
    writeln!(out, "    <creator>repograph {}</creator>", env!("CARGO_PKG_VERSION"))?;
    writeln!(out, "  </meta>")?;
    writeln!(
        out,
        r#"  <graph mode="static" defaultedgetype="undirected">"#
    )?;

    writeln!(out, r#"    <attributes class="node">"#)?;
    writeln!(
        out,
        r#"      <attribute id="{}" title="bipartite" type="integer"/>"#,
        ATTR_BIPARTITE
    )?;
    writeln!(
        out,
        r#"      <attribute id="{}" title="language" type="string"/>"#,
        ATTR_LANGUAGE
    )?;
    writeln!(
        out,
        r#"      <attribute id="{}" title="weight" type="integer"/>"#,
        ATTR_WEIGHT
    )?;
    writeln!(out, "    </attributes>")?;
    writeln!(out, r#"    <attributes class="edge">"#)?;
    writeln!(
        out,
        r#"      <attribute id="{}" title="relation" type="string"/>"#,
        ATTR_RELATION
    )?;
    writeln!(out, "    </attributes>")?;

    writeln!(out, "    <nodes>")?;
    for node in graph.nodes() {
        let key = escape(node.key());
        writeln!(out, r#"      <node id="{}" label="{}">"#, key, key)?;
        writeln!(out, "        <attvalues>")?;
        write_attvalue(&mut out, ATTR_BIPARTITE, &node.kind().bipartite().to_string())?;
        if let Node::Repository(repo) = node {
            write_attvalue(&mut out, ATTR_LANGUAGE, &repo.language)?;
            write_attvalue(&mut out, ATTR_WEIGHT, &repo.weight.to_string())?;
        }
        writeln!(out, "        </attvalues>")?;
        writeln!(out, "      </node>")?;
    }
    writeln!(out, "    </nodes>")?;

    writeln!(out, "    <edges>")?;
    for (id, edge) in graph.edges().enumerate() {
        writeln!(
            out,
            r#"      <edge id="{}" source="{}" target="{}">"#,
            id,
            escape(edge.person),
            escape(edge.repository)
        )?;
        writeln!(out, "        <attvalues>")?;
        write_attvalue(&mut out, ATTR_RELATION, edge.relation.as_str())?;
        writeln!(out, "        </attvalues>")?;
        writeln!(out, "      </edge>")?;
    }
    writeln!(out, "    </edges>")?;

    writeln!(out, "  </graph>")?;
    writeln!(out, "</gexf>")?;
    Ok(out)
}

fn write_attvalue(out: &mut String, attr: u8, value: &str) -> std::fmt::Result {
    writeln!(
        out,
        r#"          <attvalue for="{}" value="{}"/>"#,
        attr,
        escape(value)
    )
}

/// Reads a graph from a GEXF file
///
/// # Arguments
///
/// * `input_path` - A file written by `write_gexf`, or any GEXF document
///   declaring the same attribute titles
pub fn read_gexf(input_path: &Path) -> OutputResult<ProjectGraph> {
    let document = std::fs::read_to_string(input_path)?;
    let graph = parse_gexf(&document)?;

    tracing::info!(
        "Read {} nodes and {} edges from {}",
        graph.node_count(),
        graph.edge_count(),
        input_path.display()
    );
    Ok(graph)
}

/// Parses a GEXF document
///
/// Attribute values are matched by title, not by id. Edge endpoints may be
/// given in either order.
pub fn parse_gexf(document: &str) -> OutputResult<ProjectGraph> {
    let mut reader = Reader::from_str(document);
    reader.trim_text(true);

    let mut state = ParseState::default();
    loop {
        match reader.read_event()? {
            Event::Start(element) => state.open(&element)?,
            Event::Empty(element) => {
                state.open(&element)?;
                state.close(element.name().as_ref());
            }
            Event::End(element) => state.close(element.name().as_ref()),
            Event::Eof => break,
            _ => {}
        }
    }

    state.into_graph()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
enum AttrClass {
    Node,
    Edge,
}

/// A `<node>` or `<edge>` whose attvalues are still being read
#[derive(Debug)]
struct OpenElement {
    class: AttrClass,
    /// Node id, or edge source
    id: String,
    /// Edge target
    target: Option<String>,
    values: HashMap<String, String>,
}

#[derive(Debug)]
struct ParseState {
    titles: HashMap<(AttrClass, String), String>,
    class: AttrClass,
    open: Option<OpenElement>,
    nodes: Vec<OpenElement>,
    edges: Vec<OpenElement>,
}

impl Default for ParseState {
    fn default() -> Self {
        Self {
            titles: HashMap::new(),
            class: AttrClass::Node,
            open: None,
            nodes: Vec::new(),
            edges: Vec::new(),
        }
    }
}

impl ParseState {
    fn open(&mut self, element: &BytesStart<'_>) -> OutputResult<()> {
        match element.name().as_ref() {
            b"attributes" => {
                self.class = match attribute(element, b"class")?.as_deref() {
                    Some("edge") => AttrClass::Edge,
                    _ => AttrClass::Node,
                };
            }
            b"attribute" => {
                let id = required(element, b"id")?;
                let title = required(element, b"title")?;
                self.titles.insert((self.class, id), title);
            }
            b"node" => {
                self.open = Some(OpenElement {
                    class: AttrClass::Node,
                    id: required(element, b"id")?,
                    target: None,
                    values: HashMap::new(),
                });
            }
            b"edge" => {
                self.open = Some(OpenElement {
                    class: AttrClass::Edge,
                    id: required(element, b"source")?,
                    target: Some(required(element, b"target")?),
                    values: HashMap::new(),
                });
            }
            b"attvalue" => {
                if let Some(open) = self.open.as_mut() {
                    let key = required(element, b"for")?;
                    let value = required(element, b"value")?;
                    let title = self
                        .titles
                        .get(&(open.class, key.clone()))
                        .cloned()
                        .unwrap_or(key);
                    open.values.insert(title, value);
                }
            }
            _ => {}
        }
        Ok(())
    }

    fn close(&mut self, name: &[u8]) {
        if !matches!(name, b"node" | b"edge") {
            return;
        }
        if let Some(open) = self.open.take() {
            match open.class {
                AttrClass::Node => self.nodes.push(open),
                AttrClass::Edge => self.edges.push(open),
            }
        }
    }

    fn into_graph(self) -> OutputResult<ProjectGraph> {
        let mut graph = ProjectGraph::new();

        for node in &self.nodes {
            let kind = node
                .values
                .get("bipartite")
                .and_then(|v| v.trim().parse::<u8>().ok())
                .and_then(NodeKind::from_bipartite)
                .ok_or_else(|| malformed(format!("node {} has no valid bipartite value", node.id)))?;

            let inserted = match kind {
                NodeKind::Repository => {
                    let language = node
                        .values
                        .get("language")
                        .map(String::as_str)
                        .unwrap_or(UNKNOWN_LANGUAGE);
                    let weight = match node.values.get("weight") {
                        Some(w) => w
                            .trim()
                            .parse::<u64>()
                            .map_err(|_| malformed(format!("node {} has weight {:?}", node.id, w)))?,
                        None => 0,
                    };
                    graph.add_repository(&node.id, language, weight)
                }
                NodeKind::Person => graph.add_person(&node.id),
            };
            if !inserted {
                return Err(malformed(format!("duplicate node {}", node.id)));
            }
        }

        for edge in &self.edges {
            let source = edge.id.as_str();
            let target = edge.target.as_deref().unwrap_or_default();
            let relation = edge
                .values
                .get("relation")
                .and_then(|r| Relation::parse(r))
                .ok_or_else(|| malformed(format!("edge {} - {} has no valid relation", source, target)))?;

            if !graph.contains(source) || !graph.contains(target) {
                return Err(malformed(format!("edge {} - {} names an unknown node", source, target)));
            }
            let (person, repository) = if graph.repository(source).is_some() {
                (target, source)
            } else {
                (source, target)
            };
            if !graph.link(person, repository, relation) {
                return Err(malformed(format!(
                    "edge {} - {} does not join a person and a repository",
                    source, target
                )));
            }
        }

        Ok(graph)
    }
}

fn attribute(element: &BytesStart<'_>, name: &[u8]) -> OutputResult<Option<String>> {
    match element
        .try_get_attribute(name)
        .map_err(quick_xml::Error::from)?
    {
        Some(attr) => Ok(Some(attr.unescape_value()?.into_owned())),
        None => Ok(None),
    }
}

fn required(element: &BytesStart<'_>, name: &[u8]) -> OutputResult<String> {
    attribute(element, name)?.ok_or_else(|| {
        malformed(format!(
            "<{}> without {}",
            String::from_utf8_lossy(element.name().as_ref()),
            String::from_utf8_lossy(name)
        ))
    })
}

fn malformed(message: String) -> OutputError {
    OutputError::Malformed(message)
}

fn escape(value: &str) -> String {
    let mut escaped = String::with_capacity(value.len());
    for c in value.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&apos;"),
            _ => escaped.push(c),
        }
    }
    escaped
}
