use crate::mapping::{clone_mapping, MappingHandle};
use crate::rng::RngContext;
use std::rc::Rc;

/// Ordered, tagged collection of mapping handles. Sets route data between
/// pipeline stages: tags say *what a set is for*, not who owns it — a
/// mapping may live in any number of sets at once, and several sets may
/// carry the same tag.
#[derive(Debug, Clone, Default)]
pub struct SolutionSet {
    tags: Vec<String>,
    members: Vec<MappingHandle>,
}

impl SolutionSet {
    pub fn new() -> Self {
        SolutionSet::default()
    }

    pub fn with_tags<I, S>(tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut set = SolutionSet::new();
        for tag in tags {
            set.add_tag(&tag.into());
        }
        set
    }

    pub fn len(&self) -> usize {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, MappingHandle> {
        self.members.iter()
    }

    /// Alias a mapping into this set. O(1); no copy is made.
    pub fn append(&mut self, mapping: MappingHandle) {
        self.members.push(mapping);
    }

    /// Alias every member of `other` into this set.
    pub fn append_set(&mut self, other: &SolutionSet) {
        self.members.extend(other.members.iter().cloned());
    }

    /// Deep-copy a mapping into this set and return the new handle. The
    /// explicit counterpart of [`SolutionSet::append`].
    pub fn append_clone(&mut self, mapping: &MappingHandle) -> MappingHandle {
        let copy = clone_mapping(mapping);
        self.members.push(Rc::clone(&copy));
        copy
    }

    /// Bounds-checked access; callers must handle `None`.
    pub fn at(&self, index: usize) -> Option<MappingHandle> {
        self.members.get(index).map(Rc::clone)
    }

    pub fn remove_at(&mut self, index: usize) -> Option<MappingHandle> {
        if index < self.members.len() {
            Some(self.members.remove(index))
        } else {
            None
        }
    }

    /// Remove every occurrence of the mapping (by handle identity).
    /// Returns the number of occurrences removed.
    pub fn remove_mapping(&mut self, mapping: &MappingHandle) -> usize {
        let before = self.members.len();
        self.members.retain(|m| !Rc::ptr_eq(m, mapping));
        before - self.members.len()
    }

    pub fn clear(&mut self) {
        self.members.clear();
    }

    /// In-place Fisher-Yates shuffle through the RNG context.
    pub fn shuffle(&mut self, rng: &mut RngContext) {
        rng.shuffle(&mut self.members);
    }

    /// Aliasing sub-range `[from, from + len)`, clamped to the set size.
    /// The result carries no tags.
    pub fn range(&self, from: usize, len: usize) -> SolutionSet {
        let end = (from + len).min(self.members.len());
        let mut out = SolutionSet::new();
        if from < end {
            out.members.extend(self.members[from..end].iter().cloned());
        }
        out
    }

    /// Stable sort by ascending cost. NaN costs sort last.
    pub fn sort_by_cost(&mut self) {
        self.members.sort_by(|a, b| {
            let ca = a.borrow().cost();
            let cb = b.borrow().cost();
            ca.partial_cmp(&cb).unwrap_or(std::cmp::Ordering::Greater)
        });
    }

    pub fn tags(&self) -> &[String] {
        &self.tags
    }

    pub fn is_tagged(&self, tag: &str) -> bool {
        self.tags.iter().any(|t| t == tag)
    }

    /// Add a routing tag unless already present.
    pub fn add_tag(&mut self, tag: &str) {
        if !self.is_tagged(tag) {
            self.tags.push(tag.to_string());
        }
    }

    pub fn remove_tag(&mut self, tag: &str) {
        self.tags.retain(|t| t != tag);
    }
}

impl<'a> IntoIterator for &'a SolutionSet {
    type Item = &'a MappingHandle;
    type IntoIter = std::slice::Iter<'a, MappingHandle>;
    fn into_iter(self) -> Self::IntoIter {
        self.members.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::element::Element;
    use crate::mapping::Mapping;

    fn handle(cost: f64) -> MappingHandle {
        let mut m = Mapping::new(vec![Element::real(cost)]);
        m.set_cost(cost);
        m.into_handle()
    }

    #[test]
    fn test_append_aliases_not_copies() {
        let m = handle(1.0);
        let mut a = SolutionSet::new();
        let mut b = SolutionSet::new();
        a.append(Rc::clone(&m));
        b.append(Rc::clone(&m));

        a.at(0).unwrap().borrow_mut().set_cost(9.0);
        assert_eq!(b.at(0).unwrap().borrow().cost(), 9.0);
    }

    #[test]
    fn test_remove_mapping_removes_all_occurrences() {
        let m = handle(1.0);
        let other = handle(2.0);
        let mut set = SolutionSet::new();
        set.append(Rc::clone(&m));
        set.append(Rc::clone(&other));
        set.append(Rc::clone(&m));
        assert_eq!(set.remove_mapping(&m), 2);
        assert_eq!(set.len(), 1);
        assert!(Rc::ptr_eq(&set.at(0).unwrap(), &other));
    }

    #[test]
    fn test_at_is_bounds_checked() {
        let set = SolutionSet::new();
        assert!(set.at(0).is_none());
    }

    #[test]
    fn test_range_clamps() {
        let mut set = SolutionSet::new();
        for i in 0..5 {
            set.append(handle(i as f64));
        }
        assert_eq!(set.range(3, 10).len(), 2);
        assert_eq!(set.range(7, 2).len(), 0);
        let mid = set.range(1, 2);
        assert_eq!(mid.at(0).unwrap().borrow().cost(), 1.0);
    }

    #[test]
    fn test_tags_deduplicate() {
        let mut set = SolutionSet::new();
        set.add_tag("for-selection");
        set.add_tag("for-selection");
        assert_eq!(set.tags().len(), 1);
        assert!(set.is_tagged("for-selection"));
        set.remove_tag("for-selection");
        assert!(!set.is_tagged("for-selection"));
    }

    #[test]
    fn test_sort_by_cost() {
        let mut set = SolutionSet::new();
        for c in [3.0, 1.0, 2.0] {
            set.append(handle(c));
        }
        set.sort_by_cost();
        let costs: Vec<f64> = set.iter().map(|m| m.borrow().cost()).collect();
        assert_eq!(costs, vec![1.0, 2.0, 3.0]);
    }
}
