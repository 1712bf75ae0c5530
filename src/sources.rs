//! Resolution of media source roots from Kodi's `sources.xml`.
//!
//! The file groups named sources by category:
//!
//! ```xml
//! <sources>
//!     <video>
//!         <source>
//!             <name>Films</name>
//!             <path pathversion="1">/media/HD1/Films/</path>
//!         </source>
//!     </video>
//! </sources>
//! ```

use std::fs;
use std::path::{Path, PathBuf};

use roxmltree::{Document, Node};
use tracing::debug;

use crate::common::normalize_path;
use crate::error::{RenamerExpectedError, Result};

fn first_child_text<'a>(node: Node<'a, '_>, tag: &str) -> Option<&'a str> {
    node.children().find(|n| n.has_tag_name(tag)).and_then(|n| n.text())
}

fn is_excluded(raw: &str, exclude_paths: &[String]) -> bool {
    let normalized = normalize_path(raw);
    exclude_paths.iter().any(|e| e == raw || normalize_path(e) == normalized)
}

/// Parse a sources document and return the normalized paths of every source called `source_name`
/// within `category`, in document order. Paths equal to one of `exclude_paths` are dropped.
pub fn parse_source_paths(xml: &str, category: &str, source_name: &str, exclude_paths: &[String]) -> std::result::Result<Vec<PathBuf>, roxmltree::Error> {
    let doc = Document::parse(xml)?;
    let mut paths = Vec::new();
    for group in doc.root_element().children().filter(|n| n.has_tag_name(category)) {
        for source in group.children().filter(|n| n.has_tag_name("source")) {
            if first_child_text(source, "name").map(str::trim) != Some(source_name) {
                continue;
            }
            for path in source.children().filter(|n| n.has_tag_name("path")) {
                let Some(raw) = path.text().map(str::trim).filter(|t| !t.is_empty()) else {
                    continue;
                };
                if is_excluded(raw, exclude_paths) {
                    debug!("excluding source path {}", raw);
                    continue;
                }
                paths.push(normalize_path(raw));
            }
        }
    }
    Ok(paths)
}

/// Read `sources_file` and resolve the roots of the named source.
pub fn resolve_source_paths(sources_file: &Path, category: &str, source_name: &str, exclude_paths: &[String]) -> Result<Vec<PathBuf>> {
    let xml = fs::read_to_string(sources_file).map_err(|_| RenamerExpectedError::SourcesNotFound {
        path: sources_file.to_path_buf(),
    })?;
    let paths = parse_source_paths(&xml, category, source_name, exclude_paths).map_err(|e| RenamerExpectedError::SourcesDecode {
        path: sources_file.to_path_buf(),
        message: e.to_string(),
    })?;
    debug!("resolved {} root(s) for {}/{}: {:?}", paths.len(), category, source_name, paths);
    Ok(paths)
}
