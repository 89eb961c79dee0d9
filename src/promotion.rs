//! Consistency-gated promotion
//!
//! Inferred envelopes accumulate in a sliding window. A window is stable once it
//! holds `capacity` entries whose contracts are structurally identical; only a
//! stable window may be promoted to the store.

use serde_json::Value;
use std::collections::VecDeque;

use crate::schema::{Contract, SchemaEnvelope};

/// Sliding window of the most recent inferred envelopes
#[derive(Debug, Clone)]
pub struct ConsistencyWindow {
    capacity: usize,
    samples: VecDeque<SchemaEnvelope>,
}

impl ConsistencyWindow {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            capacity,
            samples: VecDeque::with_capacity(capacity),
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn clear(&mut self) {
        self.samples.clear();
    }

    /// Append a sample and report whether the window is now stable.
    pub fn should_promote(&mut self, envelope: SchemaEnvelope) -> bool {
        self.samples.push_back(envelope);
        while self.samples.len() > self.capacity {
            self.samples.pop_front();
        }

        if self.samples.len() < self.capacity {
            return false;
        }

        self.is_stable()
    }

    /// All samples in a full window share one shape
    pub fn is_stable(&self) -> bool {
        match self.samples.front() {
            Some(first) if self.samples.len() == self.capacity => {
                self.samples.iter().all(|sample| sample.same_shape(first))
            }
            _ => false,
        }
    }

    /// The envelope to persist for a stable window.
    ///
    /// Takes the newest sample and marks as required every property that is
    /// present at the same place in every sample of the window.
    pub fn candidate(&self) -> Option<SchemaEnvelope> {
        if !self.is_stable() {
            return None;
        }
        let newest = self.samples.back()?;
        let window: Vec<&Value> = self.samples.iter().map(|s| s.contract.as_value()).collect();

        let mut contract = newest.contract.as_value().clone();
        intersect_required(&mut contract, &window);

        let mut envelope = newest.clone();
        envelope.contract = Contract::new(contract);
        Some(envelope)
    }
}

/// Set `required` on every object node to the keys its counterparts in all
/// `window` nodes also define.
///
/// Only the chain of `properties` from the root is visited. Below `items` or
/// `anyOf` the samples say nothing about individual elements, so the
/// element-wise `required` from inference is kept as is.
pub fn intersect_required(target: &mut Value, window: &[&Value]) {
    let Some(node) = target.as_object_mut() else {
        return;
    };

    if let Some(Value::Object(properties)) = node.get_mut("properties") {
        let mut required = Vec::new();
        for (key, child) in properties.iter_mut() {
            let counterparts: Vec<&Value> = window
                .iter()
                .filter_map(|w| w.get("properties").and_then(|p| p.get(key)))
                .collect();
            if counterparts.len() == window.len() {
                required.push(Value::String(key.clone()));
            }
            intersect_required(child, &counterparts);
        }
        if !required.is_empty() {
            node.insert("required".to_string(), Value::Array(required));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infer::infer_envelope;
    use crate::schema::SchemaIdentity;
    use crate::validator::{DocumentValidator, Draft7Engine, ValidatorEngine};
    use serde_json::json;

    fn sample(doc: Value) -> SchemaEnvelope {
        infer_envelope(&SchemaIdentity::new("wikipedia_cleaner", "1.2.0"), &doc)
    }

    #[test]
    fn test_not_enough_evidence() {
        let mut window = ConsistencyWindow::new(3);
        assert!(!window.should_promote(sample(json!({"a": 1}))));
        assert!(!window.should_promote(sample(json!({"a": 2}))));
        assert_eq!(window.len(), 2);
        assert!(window.candidate().is_none());

        window.clear();
        assert!(window.is_empty());
    }

    #[test]
    fn test_stable_window_promotes() {
        let mut window = ConsistencyWindow::new(3);
        window.should_promote(sample(json!({"a": 1})));
        window.should_promote(sample(json!({"a": 2})));
        assert!(window.should_promote(sample(json!({"a": 3}))));
    }

    #[test]
    fn test_window_slides_past_noise() {
        let mut window = ConsistencyWindow::new(2);
        assert!(!window.should_promote(sample(json!({"a": 1}))));
        assert!(!window.should_promote(sample(json!({"a": 1, "b": "x"}))));
        assert!(window.should_promote(sample(json!({"a": 5, "b": "y"}))));
        assert_eq!(window.len(), 2);
    }

    #[test]
    fn test_candidate_marks_required() {
        let mut window = ConsistencyWindow::new(2);
        window.should_promote(sample(json!({"a": 1, "page": {"id": 3}})));
        window.should_promote(sample(json!({"a": 2, "page": {"id": 4}})));

        let candidate = window.candidate().unwrap();
        let v = candidate.contract.as_value();
        assert_eq!(v["required"], json!(["a", "page"]));
        assert_eq!(v["properties"]["page"]["required"], json!(["id"]));
    }

    #[test]
    fn test_candidate_accepts_its_own_samples() {
        let samples = [
            json!({"rows": [{"x": 1}, {"x": 2, "y": "z"}]}),
            json!({"mixed": [1, {"k": "v"}, {"k": "w", "extra": true}], "title": "Election"}),
            json!({"page": {"links": [[{"href": "a"}], [{"href": "b", "rel": "next"}]]}}),
            json!({"empty": [], "nested": {"deep": {"flag": false}}}),
        ];

        for doc in samples {
            let mut window = ConsistencyWindow::new(2);
            window.should_promote(sample(doc.clone()));
            assert!(window.should_promote(sample(doc.clone())));

            let candidate = window.candidate().unwrap();
            let validator = Draft7Engine.compile(&candidate.contract).unwrap();
            let violations = validator.validate(&doc).unwrap();
            assert!(violations.is_empty(), "{} rejected: {:?}", doc, violations);
        }
    }

    #[test]
    fn test_array_elements_keep_inferred_requirements() {
        let mut window = ConsistencyWindow::new(2);
        window.should_promote(sample(json!({"rows": [{"x": 1}, {"x": 2, "y": "z"}]})));
        window.should_promote(sample(json!({"rows": [{"x": 3}, {"x": 4, "y": "w"}]})));

        let contract = window.candidate().unwrap().contract.into_value();
        assert_eq!(contract["required"], json!(["rows"]));
        assert_eq!(contract["properties"]["rows"]["items"]["required"], json!(["x"]));
    }

    #[test]
    fn test_window_of_one() {
        let mut window = ConsistencyWindow::new(0);
        assert_eq!(window.capacity(), 1);
        assert!(window.should_promote(sample(json!({"x": true}))));
    }
}
