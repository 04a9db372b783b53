//! Rendering of a Petri net into a PDF diagram via Graphviz.

use std::io::{self, Write};
use std::path::PathBuf;
use std::process::{Command, Stdio};

use thiserror::Error;

use crate::net::PetriNet;

const LABEL_LIMIT: usize = 25;

#[derive(Debug, Error)]
pub enum RenderFailure {
    #[error("graphviz executable '{}' not found in PATH", .0.display())]
    BinaryNotFound(PathBuf),

    #[error("failed to run graphviz: {0}")]
    Spawn(#[source] io::Error),

    #[error("graphviz exited with {status}: {stderr}")]
    Exit { status: String, stderr: String },

    #[error("graphviz produced no output")]
    EmptyOutput,
}

/// Turns a validated net into diagram bytes.
pub trait Visualizer {
    fn render(&self, net: &PetriNet) -> Result<Vec<u8>, RenderFailure>;
}

/// Pipes DOT source through `dot -Tpdf`.
#[derive(Debug, Clone)]
pub struct GraphvizVisualizer {
    dot_binary: PathBuf,
}

impl GraphvizVisualizer {
    pub fn new(dot_binary: impl Into<PathBuf>) -> Self {
        Self {
            dot_binary: dot_binary.into(),
        }
    }
}

impl Visualizer for GraphvizVisualizer {
    fn render(&self, net: &PetriNet) -> Result<Vec<u8>, RenderFailure> {
        let source = to_dot(net, "petri_net");
        let mut child = Command::new(&self.dot_binary)
            .arg("-Tpdf")
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| match e.kind() {
                io::ErrorKind::NotFound => RenderFailure::BinaryNotFound(self.dot_binary.clone()),
                _ => RenderFailure::Spawn(e),
            })?;

        if let Some(mut stdin) = child.stdin.take() {
            stdin
                .write_all(source.as_bytes())
                .map_err(RenderFailure::Spawn)?;
        }
        let output = child.wait_with_output().map_err(RenderFailure::Spawn)?;

        if !output.status.success() {
            return Err(RenderFailure::Exit {
                status: output.status.to_string(),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }
        if output.stdout.is_empty() {
            return Err(RenderFailure::EmptyOutput);
        }
        Ok(output.stdout)
    }
}

/// DOT source for `net`: places are ellipses, transitions are boxes, marked
/// places get a thicker border and a token count.
pub fn to_dot(net: &PetriNet, name: &str) -> String {
    let mut out = String::new();
    out.push_str(&format!("digraph {} {{\n", quote(name)));
    out.push_str("  rankdir=LR;\n  fontsize=10;\n  splines=true;\n  nodesep=0.5;\n  ranksep=0.75;\n");

    for (id, label) in net.places() {
        let mut text = format!("{}\\nID: {}", escape(&truncate(label)), escape(id));
        let mut attrs = String::from("shape=ellipse, style=filled, fillcolor=lightblue, fontsize=9");
        if let Some(&tokens) = net.initial().get(id) {
            let plural = if tokens == 1 { "" } else { "s" };
            text.push_str(&format!("\\n({tokens} token{plural})"));
            attrs.push_str(", penwidth=2");
        }
        out.push_str(&format!("  {} [label=\"{text}\", {attrs}];\n", quote(id)));
    }

    for (id, label) in net.transitions() {
        out.push_str(&format!(
            "  {} [label=\"{}\\nID: {}\", shape=box, style=filled, fillcolor=lightgray, fontsize=9];\n",
            quote(id),
            escape(&truncate(label)),
            escape(id),
        ));
    }

    for arc in net.arcs() {
        out.push_str(&format!("  {} -> {};\n", quote(&arc.from), quote(&arc.to)));
    }

    out.push_str("}\n");
    out
}

fn truncate(label: &str) -> String {
    if label.chars().count() > LABEL_LIMIT {
        let head: String = label.chars().take(LABEL_LIMIT).collect();
        format!("{head}...")
    } else {
        label.to_string()
    }
}

fn escape(s: &str) -> String {
    s.replace('\\', "\\\\").replace('"', "\\\"")
}

fn quote(id: &str) -> String {
    format!("\"{}\"", escape(id))
}
