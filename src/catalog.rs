use std::collections::{BTreeMap, BTreeSet};
use std::ops::Range;

use serde::Serialize;
use tracing::debug;

use crate::error::JgiError;
use crate::manifest::ManifestNode;
use crate::selection::SelectionSet;

const FALLBACK_ROOT_NAME: &str = "Other";

/// Which manifest folders become categories.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CategoryMode {
    /// Every folder that directly holds files is its own category.
    All,
    /// Only folders carrying one of these names, anywhere in the tree.
    Named(Vec<String>),
}

/// One selectable file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CatalogEntry {
    pub category_id: u32,
    pub category_name: String,
    pub group_name: String,
    pub index: u32,
    pub filename: String,
    pub url: String,
    pub size_bytes: u64,
    pub size_display: String,
    pub label: Option<String>,
    pub timestamp: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Group {
    pub name: String,
    entries: Range<usize>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Category {
    pub id: u32,
    pub name: String,
    pub groups: Vec<Group>,
    entries: Range<usize>,
}

impl Category {
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Indexed listing of downloadable files.
///
/// Entries live in one arena ordered by category id, then index; categories
/// and groups address contiguous slices of it.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Catalog {
    categories: Vec<Category>,
    entries: Vec<CatalogEntry>,
}

type Grouped<'m> = BTreeMap<String, BTreeMap<String, Vec<&'m ManifestNode>>>;

impl Catalog {
    /// Walks the manifest tree and numbers every file found under `mode`.
    ///
    /// Categories without any file are left out, so ids stay contiguous.
    pub fn extract(root: &ManifestNode, mode: &CategoryMode) -> Self {
        let mut grouped: Grouped<'_> = BTreeMap::new();
        match mode {
            CategoryMode::Named(names) => {
                let names: BTreeSet<&str> = names.iter().map(String::as_str).collect();
                for name in names {
                    let mut groups = BTreeMap::new();
                    if root.name() == Some(name) {
                        collect_match(name, root.children(), name, &mut groups);
                    }
                    collect_named(root, name, &mut groups);
                    if !groups.is_empty() {
                        grouped.insert(name.to_string(), groups);
                    }
                }
            }
            CategoryMode::All => {
                let root_name = root.name().unwrap_or(FALLBACK_ROOT_NAME);
                let mut ancestors = Vec::new();
                collect_all(root, root_name, &mut ancestors, &mut grouped);
            }
        }
        Self::number(grouped)
    }

    fn number(grouped: Grouped<'_>) -> Self {
        let mut categories = Vec::new();
        let mut entries = Vec::new();

        for (category_name, groups) in grouped {
            let category_id = categories.len() as u32 + 1;
            let category_start = entries.len();
            let mut index = 0u32;
            let mut category_groups = Vec::new();

            for (group_name, mut files) in groups {
                files.sort_by(|a, b| filename(a).cmp(filename(b)));
                let group_start = entries.len();
                for file in files {
                    index += 1;
                    entries.push(build_entry(
                        file,
                        category_id,
                        &category_name,
                        &group_name,
                        index,
                    ));
                }
                category_groups.push(Group {
                    name: group_name,
                    entries: group_start..entries.len(),
                });
            }

            debug!(id = category_id, name = %category_name, files = index, "category indexed");
            categories.push(Category {
                id: category_id,
                name: category_name,
                groups: category_groups,
                entries: category_start..entries.len(),
            });
        }

        Self {
            categories,
            entries,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn categories(&self) -> &[Category] {
        &self.categories
    }

    pub fn entries(&self) -> &[CatalogEntry] {
        &self.entries
    }

    pub fn category(&self, id: u32) -> Option<&Category> {
        self.categories
            .binary_search_by_key(&id, |category| category.id)
            .ok()
            .map(|pos| &self.categories[pos])
    }

    pub fn category_entries(&self, category: &Category) -> &[CatalogEntry] {
        &self.entries[category.entries.clone()]
    }

    pub fn group_entries(&self, group: &Group) -> &[CatalogEntry] {
        &self.entries[group.entries.clone()]
    }

    pub fn get(&self, category_id: u32, index: u32) -> Option<&CatalogEntry> {
        let category = self.category(category_id)?;
        let offset = usize::try_from(index).ok()?.checked_sub(1)?;
        self.category_entries(category).get(offset)
    }

    /// Maps a selection onto entries in download order.
    pub fn resolve(&self, selection: &SelectionSet) -> Result<Vec<&CatalogEntry>, JgiError> {
        let mut resolved = Vec::new();
        for (category_id, indices) in selection.iter() {
            if self.category(category_id).is_none() {
                return Err(JgiError::CategoryNotFound(category_id));
            }
            for index in indices {
                let entry = self
                    .get(category_id, index)
                    .ok_or(JgiError::IndexNotFound {
                        category: category_id,
                        index,
                    })?;
                resolved.push(entry);
            }
        }
        Ok(resolved)
    }
}

fn collect_named<'m>(
    node: &'m ManifestNode,
    category: &str,
    groups: &mut BTreeMap<String, Vec<&'m ManifestNode>>,
) {
    for child in node.children() {
        if let ManifestNode::Container {
            name: Some(name),
            children,
        } = child
            && name == category
        {
            let parent_group = node.name().unwrap_or(name.as_str());
            collect_match(parent_group, children, category, groups);
        }
        if !child.is_file() {
            collect_named(child, category, groups);
        }
    }
}

/// Files of one matching container: direct files go to `parent_group`,
/// each sub-folder becomes a group of its own.
fn collect_match<'m>(
    parent_group: &str,
    children: &'m [ManifestNode],
    category: &str,
    groups: &mut BTreeMap<String, Vec<&'m ManifestNode>>,
) {
    for child in children {
        match child {
            ManifestNode::File { .. } => {
                if has_filename(child) {
                    push(groups, parent_group, child);
                }
            }
            ManifestNode::Container {
                name: sub_name,
                children: sub_children,
            } => {
                // A nested folder with the category's own name is matched on its own.
                if sub_name.as_deref() == Some(category) {
                    continue;
                }
                let group = sub_name.as_deref().unwrap_or(category);
                for file in sub_children.iter().filter(|n| has_filename(n)) {
                    push(groups, group, file);
                }
            }
        }
    }
}

fn collect_all<'m>(
    node: &'m ManifestNode,
    root_name: &str,
    ancestors: &mut Vec<&'m str>,
    grouped: &mut Grouped<'m>,
) {
    for child in node.children() {
        match child {
            ManifestNode::File { .. } => {
                if !has_filename(child) {
                    continue;
                }
                let category = ancestors.last().copied().unwrap_or(root_name);
                let group = ancestors
                    .len()
                    .checked_sub(2)
                    .map(|pos| ancestors[pos])
                    .unwrap_or(category);
                grouped
                    .entry(category.to_string())
                    .or_default()
                    .entry(group.to_string())
                    .or_default()
                    .push(child);
            }
            ManifestNode::Container { name: Some(name), .. } => {
                ancestors.push(name);
                collect_all(child, root_name, ancestors, grouped);
                ancestors.pop();
            }
            ManifestNode::Container { name: None, .. } => {
                collect_all(child, root_name, ancestors, grouped);
            }
        }
    }
}

fn push<'m>(
    groups: &mut BTreeMap<String, Vec<&'m ManifestNode>>,
    group: &str,
    file: &'m ManifestNode,
) {
    groups.entry(group.to_string()).or_default().push(file);
}

fn has_filename(node: &ManifestNode) -> bool {
    node.attribute("filename").is_some()
}

fn filename(node: &ManifestNode) -> &str {
    node.attribute("filename").unwrap_or_default()
}

fn build_entry(
    file: &ManifestNode,
    category_id: u32,
    category_name: &str,
    group_name: &str,
    index: u32,
) -> CatalogEntry {
    let size_bytes = file
        .attribute("sizeInBytes")
        .and_then(|value| value.trim().parse::<u64>().ok())
        .unwrap_or(0);
    let size_display = file
        .attribute("size")
        .map(str::to_string)
        .unwrap_or_else(|| human_size(size_bytes));
    CatalogEntry {
        category_id,
        category_name: category_name.to_string(),
        group_name: group_name.to_string(),
        index,
        filename: filename(file).to_string(),
        url: file.attribute("url").unwrap_or_default().to_string(),
        size_bytes,
        size_display,
        label: file.attribute("label").map(str::to_string),
        timestamp: file.attribute("timestamp").map(str::to_string),
    }
}

pub fn total_size<'a>(entries: impl IntoIterator<Item = &'a CatalogEntry>) -> u64 {
    entries.into_iter().map(|entry| entry.size_bytes).sum()
}

/// Renders a byte count as KB, MB or GB (binary units, two decimals).
pub fn human_size(bytes: u64) -> String {
    const KIB: f64 = 1024.0;
    let megabytes = bytes as f64 / (KIB * KIB);
    if megabytes < 1.0 {
        format!("{:.2} KB", bytes as f64 / KIB)
    } else if megabytes < KIB {
        format!("{megabytes:.2} MB")
    } else {
        format!("{:.2} GB", megabytes / KIB)
    }
}
