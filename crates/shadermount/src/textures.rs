use std::collections::BTreeMap;

/// Stable texture-unit assignment keyed by sampler uniform name.
///
/// Units are handed out once and never reused, so replacing or dropping one
/// image never shifts the unit another sampler is bound to.
#[derive(Debug, Clone, Default)]
pub struct TextureUnits {
    units: BTreeMap<String, u32>,
    next: u32,
}

impl TextureUnits {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the unit for `name`, registering the next free one on first use.
    pub fn unit_for(&mut self, name: &str) -> u32 {
        if let Some(unit) = self.units.get(name) {
            return *unit;
        }
        let unit = self.next;
        self.next += 1;
        self.units.insert(name.to_string(), unit);
        unit
    }

    #[cfg(test)]
    fn get(&self, name: &str) -> Option<u32> {
        self.units.get(name).copied()
    }

    #[cfg(test)]
    fn len(&self) -> usize {
        self.units.len()
    }
}
