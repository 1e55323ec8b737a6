// SPDX-FileCopyrightText: 2026 Archivist Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Reconciliation policy: attribute schema, alias groups, and conflict tuning.

use std::collections::{BTreeSet, HashMap};

use archivist_config::model::ReconcileConfig;
use archivist_core::types::{Cardinality, normalize_key, normalize_value};

/// Registry of known attribute keys and their cardinality.
///
/// Unregistered keys fall back to singleton and are reported as discovered.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AttributeSchema {
    singleton: BTreeSet<String>,
    multi_valued: BTreeSet<String>,
}

impl AttributeSchema {
    /// Builds a schema; keys are normalized on the way in.
    pub fn new<S, M>(singleton: S, multi_valued: M) -> Self
    where
        S: IntoIterator,
        S::Item: AsRef<str>,
        M: IntoIterator,
        M::Item: AsRef<str>,
    {
        Self {
            singleton: singleton
                .into_iter()
                .map(|k| normalize_key(k.as_ref()))
                .collect(),
            multi_valued: multi_valued
                .into_iter()
                .map(|k| normalize_key(k.as_ref()))
                .collect(),
        }
    }

    /// Cardinality of a normalized key, and whether the key is registered.
    pub fn lookup(&self, key: &str) -> (Cardinality, bool) {
        if self.multi_valued.contains(key) {
            (Cardinality::MultiValued, true)
        } else if self.singleton.contains(key) {
            (Cardinality::Singleton, true)
        } else {
            (Cardinality::Singleton, false)
        }
    }

    pub fn is_registered(&self, key: &str) -> bool {
        self.lookup(key).1
    }
}

/// Tuning knobs for [`crate::FactReconciler`].
#[derive(Debug, Clone, PartialEq)]
pub struct ReconcilePolicy {
    pub schema: AttributeSchema,
    /// Normalized value to alias-group index.
    aliases: HashMap<String, usize>,
    pub tie_tolerance: f64,
    /// Message-id distance that halves the older side's weight.
    pub recency_half_life: f64,
    pub fuzzy_threshold: Option<f64>,
}

impl ReconcilePolicy {
    pub fn new(schema: AttributeSchema) -> Self {
        let defaults = ReconcileConfig::default();
        Self {
            schema,
            aliases: HashMap::new(),
            tie_tolerance: defaults.tie_tolerance,
            recency_half_life: defaults.recency_half_life,
            fuzzy_threshold: None,
        }
    }

    pub fn from_config(config: &ReconcileConfig) -> Self {
        Self {
            schema: AttributeSchema::new(&config.singleton_keys, &config.multi_valued_keys),
            aliases: HashMap::new(),
            tie_tolerance: config.tie_tolerance,
            recency_half_life: config.recency_half_life,
            fuzzy_threshold: config.fuzzy_threshold,
        }
        .with_aliases(config.aliases.iter().map(|g| g.iter().map(String::as_str)))
    }

    /// Registers groups of equivalent values.
    ///
    /// A value listed in two groups belongs to the later one.
    pub fn with_aliases<G, V>(mut self, groups: G) -> Self
    where
        G: IntoIterator<Item = V>,
        V: IntoIterator,
        V::Item: AsRef<str>,
    {
        let base = self.aliases.values().max().map_or(0, |m| m + 1);
        for (offset, group) in groups.into_iter().enumerate() {
            for value in group {
                let normalized = normalize_value(value.as_ref());
                if !normalized.is_empty() {
                    self.aliases.insert(normalized, base + offset);
                }
            }
        }
        self
    }

    pub fn with_fuzzy_threshold(mut self, threshold: f64) -> Self {
        self.fuzzy_threshold = Some(threshold);
        self
    }

    pub fn with_tie_tolerance(mut self, tolerance: f64) -> Self {
        self.tie_tolerance = tolerance;
        self
    }

    pub fn with_recency_half_life(mut self, half_life: f64) -> Self {
        self.recency_half_life = half_life;
        self
    }

    /// Both normalized values are in the same alias group.
    pub fn are_aliases(&self, a: &str, b: &str) -> bool {
        match (self.aliases.get(a), self.aliases.get(b)) {
            (Some(x), Some(y)) => x == y,
            _ => false,
        }
    }

    /// Jaro-Winkler similarity when fuzzy matching is enabled and reaches the threshold.
    pub fn fuzzy_score(&self, a: &str, b: &str) -> Option<f64> {
        let threshold = self.fuzzy_threshold?;
        let score = strsim::jaro_winkler(a, b);
        (score >= threshold).then_some(score)
    }

    /// Weight of evidence `age` message ids older than the newer side.
    pub fn recency_weight(&self, age: i64) -> f64 {
        if age <= 0 {
            return 1.0;
        }
        0.5_f64.powf(age as f64 / self.recency_half_life)
    }
}

impl Default for ReconcilePolicy {
    fn default() -> Self {
        Self::from_config(&ReconcileConfig::default())
    }
}
