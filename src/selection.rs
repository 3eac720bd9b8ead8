use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::str::FromStr;

use crate::error::JgiError;

/// Upper bound on the width of one `start-stop` item.
const MAX_RANGE_LEN: u64 = 100_000;

/// Requested indices per category, iterated in download order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SelectionSet(BTreeMap<u32, BTreeSet<u32>>);

impl SelectionSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, category: u32, index: u32) {
        self.0.entry(category).or_default().insert(index);
    }

    pub fn is_empty(&self) -> bool {
        self.0.values().all(BTreeSet::is_empty)
    }

    /// Total number of selected indices across categories.
    pub fn len(&self) -> usize {
        self.0.values().map(BTreeSet::len).sum()
    }

    pub fn categories(&self) -> impl Iterator<Item = u32> + '_ {
        self.0.keys().copied()
    }

    pub fn indices(&self, category: u32) -> Option<&BTreeSet<u32>> {
        self.0.get(&category)
    }

    /// Categories ascending, each with its indices ascending.
    pub fn iter(&self) -> impl Iterator<Item = (u32, impl Iterator<Item = u32> + '_)> + '_ {
        self.0
            .iter()
            .map(|(category, indices)| (*category, indices.iter().copied()))
    }
}

impl FromIterator<(u32, u32)> for SelectionSet {
    fn from_iter<T: IntoIterator<Item = (u32, u32)>>(iter: T) -> Self {
        let mut set = SelectionSet::new();
        for (category, index) in iter {
            set.insert(category, index);
        }
        set
    }
}

/// Parses `category:index[,index|start-stop...][;category:...]`.
///
/// Any malformed piece rejects the whole input; the error names the piece.
pub fn parse(input: &str) -> Result<SelectionSet, JgiError> {
    let mut selections: BTreeMap<u32, BTreeSet<u32>> = BTreeMap::new();
    let mut first_group: BTreeMap<u32, String> = BTreeMap::new();

    for group in input.split(';') {
        let group = group.trim();
        let parts: Vec<&str> = group.split(':').collect();
        let (category, index_list) = match parts.as_slice() {
            [category, index_list] => (category.trim(), index_list.trim()),
            [_] => return Err(syntax(group, "expected <category>:<indices>")),
            _ => return Err(syntax(group, "too many ':' separators")),
        };
        if category.is_empty() || index_list.is_empty() {
            return Err(syntax(group, "expected <category>:<indices>"));
        }
        let category: u32 = category
            .parse()
            .map_err(|_| syntax(category, "category is not an integer"))?;
        first_group
            .entry(category)
            .or_insert_with(|| group.to_string());

        let indices = selections.entry(category).or_default();
        for item in index_list.split(',') {
            parse_item(item.trim(), indices)?;
        }
    }

    if let Some((category, _)) = selections.iter().find(|(_, indices)| indices.is_empty()) {
        let fragment = first_group.get(category).map(String::as_str).unwrap_or_default();
        return Err(syntax(fragment, "no indices selected"));
    }

    Ok(SelectionSet(selections))
}

fn parse_item(item: &str, indices: &mut BTreeSet<u32>) -> Result<(), JgiError> {
    if let Ok(index) = item.parse::<u32>() {
        indices.insert(index);
        return Ok(());
    }
    let (start, stop) = item
        .split_once('-')
        .and_then(|(start, stop)| {
            Some((start.trim().parse::<u32>().ok()?, stop.trim().parse::<u32>().ok()?))
        })
        .ok_or_else(|| syntax(item, "not an index or start-stop range"))?;
    if stop >= start && u64::from(stop - start) >= MAX_RANGE_LEN {
        return Err(syntax(item, "range is too large"));
    }
    indices.extend(start..=stop);
    Ok(())
}

fn syntax(fragment: &str, reason: &str) -> JgiError {
    JgiError::Selection {
        fragment: fragment.to_string(),
        reason: reason.to_string(),
    }
}

impl FromStr for SelectionSet {
    type Err = JgiError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        parse(value)
    }
}

impl fmt::Display for SelectionSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut first_category = true;
        for (category, indices) in &self.0 {
            if indices.is_empty() {
                continue;
            }
            if !first_category {
                write!(f, ";")?;
            }
            first_category = false;
            write!(f, "{category}:")?;

            let mut items = indices.iter().copied().peekable();
            let mut first_item = true;
            while let Some(start) = items.next() {
                let mut stop = start;
                // Runs are split so every rendered range parses back.
                while items.peek() == Some(&(stop.wrapping_add(1)))
                    && stop != u32::MAX
                    && u64::from(stop - start) + 1 < MAX_RANGE_LEN
                {
                    stop = items.next().unwrap_or(stop);
                }
                if !first_item {
                    write!(f, ",")?;
                }
                first_item = false;
                match stop - start {
                    0 => write!(f, "{start}")?,
                    1 => write!(f, "{start},{stop}")?,
                    _ => write!(f, "{start}-{stop}")?,
                }
            }
        }
        Ok(())
    }
}
