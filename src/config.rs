//! The WML configuration tree and its diff/patch algebra

use std::io::Write;
use std::path::Path;

use hashbrown::HashMap;
use linked_hash_map::LinkedHashMap;

use crate::error::*;
use crate::io::read_file;
use crate::parser;
use crate::value::AttributeValue;

/// External lookup for attributes whose raw value starts with `$`. Absent
/// variables read as empty.
pub trait VariableProvider {
    fn get_variable(&self, name: &str) -> Option<String>;
}

/// Position of one child in the global insertion order: the tag it lives
/// under and its index within that tag's list.
#[derive(Clone, Debug, PartialEq)]
struct ChildPos {
    tag: String,
    index: usize,
}

/// A configuration node: an attribute map plus ordered children. Children
/// are grouped by tag, and the interleaved insertion order across tags is
/// kept separately so iteration and round-trips see the authored order.
///
/// # Examples
///
/// ```
/// # use wmlkit::config::Config;
/// let mut cfg = Config::new();
/// let side = cfg.add_child("side");
/// side.set_attr("type", "Elf");
///
/// assert_eq!("Elf", cfg.child("side").unwrap().attr("type").unwrap().raw());
/// ```
#[derive(Clone, Debug, Default)]
pub struct Config {
    values: LinkedHashMap<String, AttributeValue>,
    children: HashMap<String, Vec<Config>>,
    ordered: Vec<ChildPos>,
}

impl Config {
    pub fn new() -> Config {
        Config {
            values: LinkedHashMap::new(),
            children: HashMap::new(),
            ordered: Vec::new(),
        }
    }

    /// Returns the attribute, or `None` when it was never set.
    pub fn attr(&self, key: &str) -> Option<&AttributeValue> {
        self.values.get(key)
    }

    /// Returns the attribute for appending, creating it empty if absent.
    pub fn attr_entry(&mut self, key: &str) -> &mut AttributeValue {
        self.values
            .entry(key.to_string())
            .or_insert_with(AttributeValue::new)
    }

    pub fn set_attr<V: Into<AttributeValue>>(&mut self, key: &str, value: V) {
        self.values.insert(key.to_string(), value.into());
    }

    /// Attributes in insertion order.
    pub fn attrs(&self) -> linked_hash_map::Iter<'_, String, AttributeValue> {
        self.values.iter()
    }

    /// Raw attribute text with `$variable` indirection resolved through the
    /// given provider. Absent attributes and unknown variables read as empty.
    pub fn resolve_attr(&self, key: &str, vars: &dyn VariableProvider) -> String {
        let raw = match self.values.get(key) {
            Some(value) => value.raw(),
            None => return String::new(),
        };

        if let Some(name) = raw.strip_prefix('$') {
            return vars.get_variable(name).unwrap_or_default();
        }

        raw
    }

    /// Appends an empty child under `tag` and returns it.
    pub fn add_child(&mut self, tag: &str) -> &mut Config {
        self.append_child(tag, Config::new())
    }

    /// Appends a deep copy of `other` under `tag` and returns it.
    pub fn add_child_config(&mut self, tag: &str, other: &Config) -> &mut Config {
        self.append_child(tag, other.clone())
    }

    fn append_child(&mut self, tag: &str, cfg: Config) -> &mut Config {
        let index = {
            let v = self.children.entry(tag.to_string()).or_insert_with(Vec::new);
            v.push(cfg);
            v.len() - 1
        };

        self.ordered.push(ChildPos {
            tag: tag.to_string(),
            index,
        });

        match self.children.get_mut(tag) {
            Some(v) => &mut v[index],
            None => unreachable!(),
        }
    }

    /// First child with the given tag, in insertion order.
    pub fn child(&self, tag: &str) -> Option<&Config> {
        self.children.get(tag).and_then(|v| v.first())
    }

    pub fn child_mut(&mut self, tag: &str) -> Option<&mut Config> {
        self.children.get_mut(tag).and_then(|v| v.first_mut())
    }

    /// All children with the given tag, in order.
    pub fn child_range(&self, tag: &str) -> &[Config] {
        self.children.get(tag).map(|v| v.as_slice()).unwrap_or(&[])
    }

    pub fn child_count(&self, tag: &str) -> usize {
        self.children.get(tag).map(|v| v.len()).unwrap_or(0)
    }

    pub fn child_at(&self, tag: &str, index: usize) -> Option<&Config> {
        self.children.get(tag).and_then(|v| v.get(index))
    }

    pub fn child_at_mut(&mut self, tag: &str, index: usize) -> Option<&mut Config> {
        self.children.get_mut(tag).and_then(|v| v.get_mut(index))
    }

    /// First child of `tag` whose attribute `attr` has the given raw value.
    /// Absent attributes compare as empty.
    pub fn find_child(&self, tag: &str, attr: &str, value: &str) -> Option<&Config> {
        self.child_range(tag)
            .iter()
            .find(|c| c.attr(attr).map(|v| v.raw()).unwrap_or_default() == value)
    }

    /// Removes and returns the `index`-th child of `tag`. Later children of
    /// the same tag shift down by one; the global order drops the entry.
    pub fn remove_child(&mut self, tag: &str, index: usize) -> Option<Config> {
        let removed = {
            let v = self.children.get_mut(tag)?;
            if index >= v.len() {
                return None;
            }
            v.remove(index)
        };

        self.ordered.retain(|p| !(p.tag == tag && p.index == index));
        for p in self.ordered.iter_mut() {
            if p.tag == tag && p.index > index {
                p.index -= 1;
            }
        }

        Some(removed)
    }

    /// Inserts a child at the given per-tag index, keeping the global order
    /// consistent: the node lands directly before the child that held that
    /// index, or after the tag's last child when appending.
    fn insert_child_at(&mut self, tag: &str, index: usize, cfg: Config) {
        let old_len = {
            let v = self.children.entry(tag.to_string()).or_insert_with(Vec::new);
            let old_len = v.len();
            v.insert(index, cfg);
            old_len
        };

        for p in self.ordered.iter_mut() {
            if p.tag == tag && p.index >= index {
                p.index += 1;
            }
        }

        let pos = if index < old_len {
            self.ordered
                .iter()
                .position(|p| p.tag == tag && p.index == index + 1)
        } else if old_len > 0 {
            self.ordered
                .iter()
                .position(|p| p.tag == tag && p.index == old_len - 1)
                .map(|i| i + 1)
        } else {
            None
        };

        let entry = ChildPos {
            tag: tag.to_string(),
            index,
        };
        match pos {
            Some(pos) => self.ordered.insert(pos, entry),
            None => self.ordered.push(entry),
        }
    }

    pub fn clear_children(&mut self, tag: &str) {
        self.ordered.retain(|p| p.tag != tag);
        self.children.remove(tag);
    }

    pub fn clear(&mut self) {
        self.values.clear();
        self.children.clear();
        self.ordered.clear();
    }

    pub fn is_empty(&self) -> bool {
        self.children.is_empty() && self.values.is_empty()
    }

    /// Every child as `(tag, node)` in global insertion order.
    pub fn all_children_ordered(&self) -> impl Iterator<Item = (&str, &Config)> {
        self.ordered
            .iter()
            .map(move |p| (p.tag.as_str(), &self.children[&p.tag][p.index]))
    }

    /// Produces a patch that turns `older` into `self` when applied to it.
    ///
    /// The patch is itself a config: an `insert` child carrying attributes to
    /// set, a `delete` child naming attributes to drop, and per-tag
    /// `change_child`/`insert_child`/`delete_child` entries realigning the
    /// child lists.
    pub fn diff(&self, older: &Config) -> Config {
        let mut res = Config::new();

        let mut insert = Config::new();
        for (key, value) in self.values.iter() {
            if value.is_empty() {
                continue;
            }
            if older.values.get(key).map_or(true, |v| v != value) {
                insert.set_attr(key, value.clone());
            }
        }
        if !insert.is_empty() {
            res.append_child("insert", insert);
        }

        let mut delete = Config::new();
        for (key, value) in older.values.iter() {
            if value.is_empty() {
                continue;
            }
            if self.values.get(key).map_or(true, |v| v.is_empty()) {
                delete.set_attr(key, "x");
            }
        }
        if !delete.is_empty() {
            res.append_child("delete", delete);
        }

        // tag names in first-appearance order, self's first, so the patch is
        // deterministic for identical inputs
        let mut tags: Vec<&str> = Vec::new();
        for (tag, _) in self.all_children_ordered() {
            if !tags.contains(&tag) {
                tags.push(tag);
            }
        }
        for (tag, _) in older.all_children_ordered() {
            if !tags.contains(&tag) {
                tags.push(tag);
            }
        }

        for tag in tags {
            let a = self.child_range(tag);
            let b = older.child_range(tag);

            // walk both lists; on mismatch pick the operation that closes the
            // remaining length gap, counting deletes so emitted indices stay
            // valid when the patch is applied one entry at a time
            let mut ndeletes = 0;
            let (mut ai, mut bi) = (0, 0);
            while ai != a.len() || bi != b.len() {
                if ai < a.len() && bi < b.len() && a[ai] == b[bi] {
                    ai += 1;
                    bi += 1;
                } else if b.len() - bi > a.len() - ai {
                    let entry = res.add_child("delete_child");
                    entry.set_attr("index", (bi - ndeletes).to_string());
                    entry.add_child(tag);

                    ndeletes += 1;
                    bi += 1;
                } else if b.len() - bi < a.len() - ai {
                    let entry = res.add_child("insert_child");
                    entry.set_attr("index", ai.to_string());
                    entry.add_child_config(tag, &a[ai]);

                    ai += 1;
                } else {
                    let child_diff = a[ai].diff(&b[bi]);
                    let entry = res.add_child("change_child");
                    entry.set_attr("index", bi.to_string());
                    entry.append_child(tag, child_diff);

                    ai += 1;
                    bi += 1;
                }
            }
        }

        res
    }

    /// Applies a patch produced by [`Config::diff`]. The whole patch is
    /// validated before anything is touched, so a failing apply leaves the
    /// receiver unchanged.
    pub fn apply_diff(&mut self, diff: &Config) -> Result<(), Error> {
        self.validate_diff(diff)?;
        self.apply_diff_unchecked(diff);
        Ok(())
    }

    fn validate_diff(&self, diff: &Config) -> Result<(), Error> {
        for entry in diff.child_range("change_child") {
            let index = diff_index(entry)?;
            for (tag, sub) in entry.all_children_ordered() {
                if tag.is_empty() {
                    continue;
                }

                let len = self.child_count(tag);
                if len == 0 {
                    return Err(error!(
                        ErrorKind::DiffMissingChild,
                        "Diff refers to a child \"{}\" that does not exist.", tag
                    ));
                }
                if index >= len {
                    return Err(error!(
                        ErrorKind::DiffIndexOutOfRange,
                        "Diff changes child {} of \"{}\", but only {} exist.", index, tag, len
                    ));
                }

                match self.child_at(tag, index) {
                    Some(child) => child.validate_diff(sub)?,
                    None => unreachable!(),
                }
            }
        }

        // inserts and deletes shift the counts they are checked against, so
        // run the checks over simulated counts in application order
        let mut counts: HashMap<&str, usize> = HashMap::new();

        for entry in diff.child_range("insert_child") {
            let index = diff_index(entry)?;
            for (tag, _) in entry.all_children_ordered() {
                if tag.is_empty() {
                    continue;
                }

                let count = counts.entry(tag).or_insert_with(|| self.child_count(tag));
                if index > *count {
                    return Err(error!(
                        ErrorKind::DiffIndexOutOfRange,
                        "Diff inserts child {} of \"{}\", but only {} exist.", index, tag, *count
                    ));
                }
                *count += 1;
            }
        }

        for entry in diff.child_range("delete_child") {
            let index = diff_index(entry)?;
            for (tag, _) in entry.all_children_ordered() {
                if tag.is_empty() {
                    continue;
                }

                let count = counts.entry(tag).or_insert_with(|| self.child_count(tag));
                if index >= *count {
                    return Err(error!(
                        ErrorKind::DiffIndexOutOfRange,
                        "Diff deletes child {} of \"{}\", but only {} exist.", index, tag, *count
                    ));
                }
                *count -= 1;
            }
        }

        Ok(())
    }

    fn apply_diff_unchecked(&mut self, diff: &Config) {
        if let Some(insert) = diff.child("insert") {
            for (key, value) in insert.values.iter() {
                self.values.insert(key.clone(), value.clone());
            }
        }

        if let Some(delete) = diff.child("delete") {
            for (key, _) in delete.values.iter() {
                self.values.remove(key);
            }
        }

        for entry in diff.child_range("change_child") {
            let index = diff_index(entry).unwrap_or(0);
            for (tag, sub) in entry.all_children_ordered() {
                if tag.is_empty() {
                    continue;
                }
                if let Some(child) = self.child_at_mut(tag, index) {
                    child.apply_diff_unchecked(sub);
                }
            }
        }

        for entry in diff.child_range("insert_child") {
            let index = diff_index(entry).unwrap_or(0);
            for (tag, sub) in entry.all_children_ordered() {
                if tag.is_empty() {
                    continue;
                }
                self.insert_child_at(tag, index, sub.clone());
            }
        }

        for entry in diff.child_range("delete_child") {
            let index = diff_index(entry).unwrap_or(0);
            for (tag, _) in entry.all_children_ordered() {
                if tag.is_empty() {
                    continue;
                }
                self.remove_child(tag, index);
            }
        }
    }
}

fn diff_index(entry: &Config) -> Result<usize, Error> {
    let raw = entry.attr("index").map(|v| v.raw()).unwrap_or_default();
    raw.parse().map_err(|_| {
        error!(
            ErrorKind::DiffIndexOutOfRange,
            "Diff entry carries a bad index \"{}\".", raw
        )
    })
}

impl PartialEq for Config {
    fn eq(&self, other: &Config) -> bool {
        // attribute order is irrelevant and empty attributes count as absent
        for (key, value) in self.values.iter() {
            if value.is_empty() {
                continue;
            }
            if other.values.get(key).map_or(true, |v| v != value) {
                return false;
            }
        }
        for (key, value) in other.values.iter() {
            if value.is_empty() {
                continue;
            }
            if self.values.get(key).map_or(true, |v| v != value) {
                return false;
            }
        }

        if self.ordered.len() != other.ordered.len() {
            return false;
        }
        self.all_children_ordered()
            .zip(other.all_children_ordered())
            .all(|((t1, c1), (t2, c2))| t1 == t2 && c1 == c2)
    }
}

/// Reads two text configs, diffs them and writes the patch as text.
pub fn cmd_diff<O: Write>(target: &Path, base: &Path, output: &mut O) -> Result<(), Error> {
    let a = parser::read(&read_file(target)?).prepend_error("Failed to parse target config:")?;
    let b = parser::read(&read_file(base)?).prepend_error("Failed to parse base config:")?;

    parser::write(output, &a.diff(&b)).prepend_error("Failed to write diff:")?;

    Ok(())
}

/// Reads a text config and a patch, applies the patch and writes the result.
pub fn cmd_patch<O: Write>(base: &Path, patch: &Path, output: &mut O) -> Result<(), Error> {
    let mut cfg = parser::read(&read_file(base)?).prepend_error("Failed to parse base config:")?;
    let diff = parser::read(&read_file(patch)?).prepend_error("Failed to parse patch:")?;

    cfg.apply_diff(&diff).prepend_error("Failed to apply patch:")?;
    parser::write(output, &cfg).prepend_error("Failed to write patched config:")?;

    Ok(())
}
