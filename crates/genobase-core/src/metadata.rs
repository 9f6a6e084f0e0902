//! The per-genome structured metadata document.
//!
//! Each genome owns exactly one document: an XML element tree rooted at
//! `<data>`, holding application-defined substructures such as the
//! `internal` namespace (creation timestamp, taxonomy, visibility class).
//! The document is stored whole in the genome row and updated by
//! whole-document read-modify-write; the storage layer serializes those
//! updates (see `genobase-store-sqlite`).
//!
//! Uses `quick-xml`'s writer API for generation and a hand-written
//! stack-based parser for reading.

use std::io::Cursor;

use chrono::{DateTime, Utc};
use quick_xml::{
  Writer,
  events::{BytesDecl, BytesEnd, BytesStart, BytesText, Event},
};

use crate::error::{Error, Result};

// ─── Nodes ───────────────────────────────────────────────────────────────────

/// One element of the document tree. Attributes are not used by this
/// application; a node carries its name, optional text content, and child
/// elements.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Node {
  pub name:     String,
  pub text:     String,
  pub children: Vec<Node>,
}

impl Node {
  fn named(name: &str) -> Node {
    Node { name: name.to_owned(), ..Node::default() }
  }

  fn child(&self, name: &str) -> Option<&Node> {
    self.children.iter().find(|c| c.name == name)
  }
}

// ─── Document ────────────────────────────────────────────────────────────────

/// A genome's metadata document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Document {
  root: Node,
}

impl Default for Document {
  fn default() -> Self { Self::new() }
}

impl Document {
  /// An empty document: `<data/>`.
  pub fn new() -> Document {
    Document { root: Node::named("data") }
  }

  /// The document stamped onto a genome at ingestion time.
  pub fn initial(added: DateTime<Utc>) -> Document {
    let mut doc = Document::new();
    doc.upsert_path(&["internal", "date_added"], &added.to_rfc3339());
    doc
  }

  /// Traverse named child elements from the root. An absent intermediate
  /// node is a lookup miss, not an error.
  pub fn get_path(&self, path: &[&str]) -> Option<&Node> {
    let mut node = &self.root;
    for name in path {
      node = node.child(name)?;
    }
    Some(node)
  }

  /// Text content of the node at `path`, if present.
  pub fn text_at(&self, path: &[&str]) -> Option<&str> {
    self.get_path(path).map(|n| n.text.as_str())
  }

  /// Set (or create) the text content of the node at `path`, creating
  /// missing intermediate nodes along the way. Surrounding whitespace is
  /// trimmed from `value`: text nodes are trimmed when a stored document is
  /// re-parsed, so untrimmed values would not survive a round trip.
  pub fn upsert_path(&mut self, path: &[&str], value: &str) {
    let mut node = &mut self.root;
    for name in path {
      let idx = match node.children.iter().position(|c| c.name == *name) {
        Some(idx) => idx,
        None => {
          node.children.push(Node::named(name));
          node.children.len() - 1
        }
      };
      node = &mut node.children[idx];
    }
    node.text = value.trim().to_owned();
  }

  /// Remove the node at `path` together with its subtree. Returns `false`
  /// if the node was absent.
  pub fn remove_path(&mut self, path: &[&str]) -> bool {
    let Some((leaf, parents)) = path.split_last() else {
      return false; // the root itself is never removed
    };
    let mut node = &mut self.root;
    for name in parents {
      let Some(idx) = node.children.iter().position(|c| c.name == *name)
      else {
        return false;
      };
      node = &mut node.children[idx];
    }
    match node.children.iter().position(|c| c.name == *leaf) {
      Some(idx) => {
        node.children.remove(idx);
        true
      }
      None => false,
    }
  }

  // ── XML codec ───────────────────────────────────────────────────────────

  /// Parse a stored document.
  pub fn parse(xml: &str) -> Result<Document> {
    let mut reader = quick_xml::Reader::from_str(xml);
    reader.config_mut().trim_text(true);

    let mut stack: Vec<Node> = Vec::new();
    let mut root: Option<Node> = None;

    loop {
      match reader.read_event() {
        Ok(Event::Start(ref e)) => {
          let name = String::from_utf8_lossy(e.name().as_ref()).into_owned();
          stack.push(Node { name, ..Node::default() });
        }
        Ok(Event::Empty(ref e)) => {
          let name = String::from_utf8_lossy(e.name().as_ref()).into_owned();
          attach(Node { name, ..Node::default() }, &mut stack, &mut root)?;
        }
        Ok(Event::Text(ref t)) => {
          let text = t
            .unescape()
            .map_err(|e| Error::MalformedDocument(e.to_string()))?;
          if let Some(top) = stack.last_mut() {
            top.text.push_str(&text);
          }
        }
        Ok(Event::End(_)) => {
          let node = stack
            .pop()
            .ok_or_else(|| Error::MalformedDocument("unbalanced end tag".into()))?;
          attach(node, &mut stack, &mut root)?;
        }
        Ok(Event::Eof) => break,
        Ok(_) => {} // declaration, comments, PIs
        Err(e) => return Err(Error::MalformedDocument(e.to_string())),
      }
    }

    if !stack.is_empty() {
      return Err(Error::MalformedDocument("unclosed element".into()));
    }
    root
      .map(|root| Document { root })
      .ok_or_else(|| Error::MalformedDocument("empty document".into()))
  }

  /// Serialise for storage. Text content is escaped by the writer, so the
  /// output is always well-formed.
  pub fn to_xml(&self) -> String {
    let mut writer = Writer::new(Cursor::new(Vec::new()));
    writer
      .write_event(Event::Decl(BytesDecl::new("1.0", None, None)))
      .unwrap();
    write_node(&mut writer, &self.root);
    String::from_utf8(writer.into_inner().into_inner())
      .expect("writer output is UTF-8")
  }
}

fn attach(node: Node, stack: &mut Vec<Node>, root: &mut Option<Node>) -> Result<()> {
  match stack.last_mut() {
    Some(parent) => parent.children.push(node),
    None if root.is_none() => *root = Some(node),
    None => {
      return Err(Error::MalformedDocument("multiple root elements".into()));
    }
  }
  Ok(())
}

fn write_node(writer: &mut Writer<Cursor<Vec<u8>>>, node: &Node) {
  // Writing to an in-memory cursor cannot fail.
  if node.children.is_empty() && node.text.is_empty() {
    writer
      .write_event(Event::Empty(BytesStart::new(node.name.as_str())))
      .unwrap();
    return;
  }
  writer
    .write_event(Event::Start(BytesStart::new(node.name.as_str())))
    .unwrap();
  if !node.text.is_empty() {
    writer
      .write_event(Event::Text(BytesText::new(node.text.as_str())))
      .unwrap();
  }
  for child in &node.children {
    write_node(writer, child);
  }
  writer
    .write_event(Event::End(BytesEnd::new(node.name.as_str())))
    .unwrap();
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn upsert_then_get_round_trips() {
    let mut doc = Document::new();
    doc.upsert_path(&["internal", "taxonomy"], "d__Bacteria;p__Foo");
    assert_eq!(
      doc.text_at(&["internal", "taxonomy"]),
      Some("d__Bacteria;p__Foo")
    );
  }

  #[test]
  fn upsert_creates_missing_intermediates() {
    let mut doc = Document::new();
    doc.upsert_path(&["a", "b", "c"], "deep");
    assert_eq!(doc.text_at(&["a", "b", "c"]), Some("deep"));
    assert!(doc.get_path(&["a", "b"]).is_some());
  }

  #[test]
  fn upsert_overwrites_existing_leaf() {
    let mut doc = Document::new();
    doc.upsert_path(&["internal", "vis"], "private");
    doc.upsert_path(&["internal", "vis"], "public");
    assert_eq!(doc.text_at(&["internal", "vis"]), Some("public"));
  }

  #[test]
  fn upsert_trims_surrounding_whitespace() {
    let mut doc = Document::new();
    doc.upsert_path(&["internal", "vis"], "  padded\t");
    assert_eq!(doc.text_at(&["internal", "vis"]), Some("padded"));

    // The trimmed value survives a storage round trip unchanged.
    let reparsed = Document::parse(&doc.to_xml()).unwrap();
    assert_eq!(reparsed, doc);
  }

  #[test]
  fn get_path_missing_is_none() {
    let doc = Document::new();
    assert!(doc.get_path(&["internal", "taxonomy"]).is_none());
  }

  #[test]
  fn remove_path_drops_subtree() {
    let mut doc = Document::new();
    doc.upsert_path(&["internal", "date_added"], "2010-01-01");
    doc.upsert_path(&["internal", "taxonomy"], "d__Archaea");
    assert!(doc.remove_path(&["internal"]));
    assert!(doc.text_at(&["internal", "taxonomy"]).is_none());
    assert!(!doc.remove_path(&["internal"]));
  }

  #[test]
  fn xml_round_trip_preserves_structure() {
    let mut doc = Document::new();
    doc.upsert_path(&["internal", "taxonomy"], "d__Bacteria;p__Foo");
    doc.upsert_path(&["external", "note"], "a < b & c");

    let xml = doc.to_xml();
    let reparsed = Document::parse(&xml).unwrap();
    assert_eq!(reparsed, doc);
    assert_eq!(reparsed.text_at(&["external", "note"]), Some("a < b & c"));
  }

  #[test]
  fn parse_accepts_legacy_empty_document() {
    let doc = Document::parse("<?xml version=\"1.0\"?><data></data>").unwrap();
    assert_eq!(doc, Document::new());
  }

  #[test]
  fn parse_rejects_garbage() {
    assert!(Document::parse("").is_err());
    assert!(Document::parse("<data><open></data>").is_err());
  }

  #[test]
  fn initial_document_carries_date_added() {
    let now = Utc::now();
    let doc = Document::initial(now);
    assert_eq!(
      doc.text_at(&["internal", "date_added"]),
      Some(now.to_rfc3339().as_str())
    );
  }
}
