use std::collections::HashMap;

use aigate_common::attempt::Candidate;

/// Maps a declared model name to its ordered set of Candidates. One table
/// entry per (API family, declared model) in principle; in practice a
/// declared model name is already family-specific (`gpt-4o-mini` vs
/// `claude-3-5-sonnet` never collide), so the table keys on model name
/// alone per spec §4.2.
#[derive(Debug, Clone, Default)]
pub struct RouteTable {
    routes: HashMap<String, Vec<Candidate>>,
}

impl RouteTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_route(&mut self, declared_model: impl Into<String>, candidates: Vec<Candidate>) {
        self.routes.insert(declared_model.into(), candidates);
    }

    pub fn candidates_for(&self, declared_model: &str) -> Option<&[Candidate]> {
        self.routes.get(declared_model).map(Vec::as_slice)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_model_has_no_candidates() {
        let table = RouteTable::new();
        assert!(table.candidates_for("gpt-4o-mini").is_none());
    }

    #[test]
    fn registered_model_returns_its_candidates() {
        let mut table = RouteTable::new();
        table.set_route("gpt-4o-mini", vec![Candidate::new("openai", "gpt-4o-mini", 100, 0)]);
        assert_eq!(table.candidates_for("gpt-4o-mini").unwrap().len(), 1);
    }
}
