//! Field declarations for a resource's parameters

/// Keys accepted on every declaration and handed to the scheduler
pub const RESERVED_KEYS: [&str; 2] = ["depends", "group"];

/// One declared parameter
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Field {
    pub name: &'static str,
    pub required: bool,
    /// Radix used when an integer arrives as a string
    pub base: u32,
    /// Enumerated alternatives; empty means anything goes
    pub valid_values: &'static [&'static str],
}

impl Field {
    pub const fn new(name: &'static str) -> Self {
        Self {
            name,
            required: false,
            base: 10,
            valid_values: &[],
        }
    }

    #[must_use]
    pub const fn required(mut self) -> Self {
        self.required = true;
        self
    }

    #[must_use]
    pub const fn base(mut self, base: u32) -> Self {
        self.base = base;
        self
    }

    #[must_use]
    pub const fn valid_values(mut self, values: &'static [&'static str]) -> Self {
        self.valid_values = values;
        self
    }
}

/// The parameter record of one resource type
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Schema {
    fields: Vec<Field>,
    exclusive: Vec<Vec<&'static str>>,
}

impl Schema {
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn field(mut self, field: Field) -> Self {
        self.fields.push(field);
        self
    }

    /// Declare a set of fields of which at most one may be set
    #[must_use]
    pub fn exclusive(mut self, names: &[&'static str]) -> Self {
        self.exclusive.push(names.to_vec());
        self
    }

    pub fn get(&self, name: &str) -> Option<&Field> {
        self.fields.iter().find(|f| f.name == name)
    }

    pub fn fields(&self) -> &[Field] {
        &self.fields
    }

    pub fn exclusive_sets(&self) -> &[Vec<&'static str>] {
        &self.exclusive
    }

    /// Known field names closest to `name` by edit distance
    pub fn suggest(&self, name: &str) -> Vec<String> {
        let threshold = (name.chars().count() / 3).max(2);
        let scored: Vec<(usize, &str)> = self
            .fields
            .iter()
            .map(|f| f.name)
            .chain(RESERVED_KEYS)
            .map(|candidate| (levenshtein(name, candidate), candidate))
            .filter(|(distance, _)| *distance <= threshold)
            .collect();

        let Some(best) = scored.iter().map(|(d, _)| *d).min() else {
            return Vec::new();
        };
        scored
            .into_iter()
            .filter(|(d, _)| *d == best)
            .map(|(_, c)| c.to_string())
            .collect()
    }
}

/// Edit distance counting insertions, deletions and substitutions
pub fn levenshtein(a: &str, b: &str) -> usize {
    let b: Vec<char> = b.chars().collect();
    let mut prev: Vec<usize> = (0..=b.len()).collect();
    let mut cur = vec![0; b.len() + 1];

    for (i, ca) in a.chars().enumerate() {
        cur[0] = i + 1;
        for (j, cb) in b.iter().enumerate() {
            let cost = usize::from(ca != *cb);
            cur[j + 1] = (prev[j] + cost).min(prev[j + 1] + 1).min(cur[j] + 1);
        }
        std::mem::swap(&mut prev, &mut cur);
    }
    prev[b.len()]
}
