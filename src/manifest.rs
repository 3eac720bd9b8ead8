use std::collections::BTreeMap;

use quick_xml::events::{BytesStart, Event};
use quick_xml::reader::Reader;
use tracing::debug;

use crate::error::JgiError;

const FILE_TAG: &[u8] = b"file";
const ORGANISM_TAG: &str = "organismDownloads";

/// One element of the download manifest.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ManifestNode {
    Container {
        name: Option<String>,
        children: Vec<ManifestNode>,
    },
    File {
        attributes: BTreeMap<String, String>,
    },
}

impl ManifestNode {
    pub fn container(name: impl Into<String>, children: Vec<ManifestNode>) -> Self {
        ManifestNode::Container {
            name: Some(name.into()),
            children,
        }
    }

    pub fn file<I, K, V>(attributes: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        ManifestNode::File {
            attributes: attributes
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }

    pub fn name(&self) -> Option<&str> {
        match self {
            ManifestNode::Container { name, .. } => name.as_deref(),
            ManifestNode::File { .. } => None,
        }
    }

    pub fn children(&self) -> &[ManifestNode] {
        match self {
            ManifestNode::Container { children, .. } => children,
            ManifestNode::File { .. } => &[],
        }
    }

    pub fn attribute(&self, key: &str) -> Option<&str> {
        match self {
            ManifestNode::File { attributes } => attributes.get(key).map(String::as_str),
            ManifestNode::Container { .. } => None,
        }
    }

    pub fn is_file(&self) -> bool {
        matches!(self, ManifestNode::File { .. })
    }
}

/// Parsed manifest; the document element is the root container.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Manifest {
    root_tag: String,
    root: ManifestNode,
}

impl Manifest {
    pub fn new(root_tag: impl Into<String>, root: ManifestNode) -> Self {
        Self {
            root_tag: root_tag.into(),
            root,
        }
    }

    /// Parses manifest markup. `source_address` only feeds error messages.
    pub fn parse(text: &str, source_address: &str) -> Result<Self, JgiError> {
        let fail = |message: String| JgiError::ManifestParse {
            source_address: source_address.to_string(),
            message,
        };

        let mut reader = Reader::from_str(text);
        reader.config_mut().trim_text(true);

        let mut stack: Vec<Frame> = Vec::new();
        let mut root: Option<(String, ManifestNode)> = None;

        loop {
            let event = reader.read_event().map_err(|err| {
                fail(format!("at byte {}: {err}", reader.error_position()))
            })?;
            match event {
                Event::Start(start) => {
                    let frame = Frame::open(&start, stack.last()).map_err(&fail)?;
                    if stack.is_empty() && root.is_some() {
                        return Err(fail("more than one document element".to_string()));
                    }
                    stack.push(frame);
                }
                Event::Empty(start) => {
                    let frame = Frame::open(&start, stack.last()).map_err(&fail)?;
                    if stack.is_empty() && root.is_some() {
                        return Err(fail("more than one document element".to_string()));
                    }
                    close_frame(frame, &mut stack, &mut root)?;
                }
                Event::End(_) => {
                    let frame = stack
                        .pop()
                        .ok_or_else(|| fail("unexpected closing tag".to_string()))?;
                    close_frame(frame, &mut stack, &mut root)?;
                }
                Event::Eof => break,
                _ => {}
            }
        }

        if !stack.is_empty() {
            return Err(fail("unexpected end of document".to_string()));
        }
        let (root_tag, root) = root.ok_or_else(|| fail("document is empty".to_string()))?;
        if root.is_file() {
            return Err(fail("document element is a file entry".to_string()));
        }
        debug!(root = %root_tag, "manifest parsed");
        Ok(Self { root_tag, root })
    }

    pub fn root(&self) -> &ManifestNode {
        &self.root
    }

    pub fn root_tag(&self) -> &str {
        &self.root_tag
    }

    /// Organism abbreviation from an `<organismDownloads name="...">` root.
    pub fn organism_name(&self) -> Option<&str> {
        if self.root_tag == ORGANISM_TAG {
            self.root.name()
        } else {
            None
        }
    }

    /// Number of file entries anywhere in the tree.
    pub fn file_count(&self) -> usize {
        fn count(node: &ManifestNode) -> usize {
            match node {
                ManifestNode::File { .. } => 1,
                ManifestNode::Container { children, .. } => children.iter().map(count).sum(),
            }
        }
        count(&self.root)
    }
}

enum Frame {
    Container {
        tag: String,
        name: Option<String>,
        children: Vec<ManifestNode>,
    },
    File {
        tag: String,
        attributes: BTreeMap<String, String>,
    },
    // Markup nested inside a file entry carries nothing we use.
    Ignored,
}

impl Frame {
    fn open(start: &BytesStart<'_>, parent: Option<&Frame>) -> Result<Self, String> {
        if matches!(parent, Some(Frame::File { .. } | Frame::Ignored)) {
            return Ok(Frame::Ignored);
        }
        let tag = String::from_utf8_lossy(start.local_name().as_ref()).into_owned();
        let mut attributes = BTreeMap::new();
        for attr in start.attributes() {
            let attr = attr.map_err(|err| err.to_string())?;
            let key = String::from_utf8_lossy(attr.key.local_name().as_ref()).into_owned();
            let value = attr.unescape_value().map_err(|err| err.to_string())?;
            attributes.insert(key, value.into_owned());
        }

        if start.local_name().as_ref() == FILE_TAG || attributes.contains_key("filename") {
            Ok(Frame::File { tag, attributes })
        } else {
            Ok(Frame::Container {
                tag,
                name: attributes.remove("name"),
                children: Vec::new(),
            })
        }
    }
}

fn close_frame(
    frame: Frame,
    stack: &mut [Frame],
    root: &mut Option<(String, ManifestNode)>,
) -> Result<(), JgiError> {
    let (tag, node) = match frame {
        Frame::Container {
            tag,
            name,
            children,
        } => (tag, ManifestNode::Container { name, children }),
        Frame::File { tag, attributes } => (tag, ManifestNode::File { attributes }),
        Frame::Ignored => return Ok(()),
    };
    match stack.last_mut() {
        Some(Frame::Container { children, .. }) => children.push(node),
        Some(_) => {}
        None => *root = Some((tag, node)),
    }
    Ok(())
}
