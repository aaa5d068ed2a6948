use super::{PolicyTier, RuleSpec};

/// Rules kept in non-increasing priority order.
///
/// Insertion places a rule after every rule of equal or higher priority, so
/// ties resolve in registration order. Removal preserves relative order, so
/// the store never needs a full re-sort.
#[derive(Debug, Clone)]
pub struct RuleStore<T> {
    rules: Vec<T>,
}

impl<T> Default for RuleStore<T> {
    fn default() -> Self {
        Self { rules: Vec::new() }
    }
}

impl<T: RuleSpec> RuleStore<T> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, rule: T) {
        let priority = rule.priority();
        let at = self.rules.partition_point(|r| r.priority() >= priority);
        self.rules.insert(at, rule);
    }

    /// Remove every rule in the given tier band. Returns how many were removed.
    pub fn remove_by_tier(&mut self, tier: PolicyTier) -> usize {
        self.remove_where(|r| PolicyTier::band_of(r.priority()) == tier.value())
    }

    pub fn remove_by_source(&mut self, source: &str) -> usize {
        self.remove_where(|r| r.source() == Some(source))
    }

    /// Remove rules naming exactly `tool_name`, optionally only from one source.
    pub fn remove_for_tool(&mut self, tool_name: &str, source: Option<&str>) -> usize {
        self.remove_where(|r| {
            r.tool_name() == Some(tool_name) && source.is_none_or(|s| r.source() == Some(s))
        })
    }

    pub fn remove_where(&mut self, mut pred: impl FnMut(&T) -> bool) -> usize {
        let before = self.rules.len();
        self.rules.retain(|r| !pred(r));
        before - self.rules.len()
    }

    pub fn as_slice(&self) -> &[T] {
        &self.rules
    }

    pub fn iter(&self) -> std::slice::Iter<'_, T> {
        self.rules.iter()
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    pub fn any_args_pattern(&self) -> bool {
        self.rules.iter().any(|r| r.args_pattern().is_some())
    }
}
