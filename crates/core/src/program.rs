use crate::id::PatternId;
use serde::{Deserialize, Serialize};

/// Where a candidate program came from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ProgramOrigin {
    /// First program authored by the oracle for this job.
    Generated,
    /// Oracle revision of the previous candidate after feedback.
    Regenerated,
    /// Reused from the pattern cache.
    Cached { pattern_id: PatternId },
}

/// One immutable version of transformation logic.
///
/// Corrections never edit a program; [`CandidateProgram::successor`] makes a
/// new one that links back to its predecessor's generation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CandidateProgram {
    generation: u32,
    predecessor: Option<u32>,
    origin: ProgramOrigin,
    source: String,
}

impl CandidateProgram {
    /// A freshly authored program (generation 1).
    #[must_use]
    pub fn generated(source: impl Into<String>) -> Self {
        Self {
            generation: 1,
            predecessor: None,
            origin: ProgramOrigin::Generated,
            source: source.into(),
        }
    }

    /// A program taken from the pattern cache (generation 1).
    #[must_use]
    pub fn cached(source: impl Into<String>, pattern_id: PatternId) -> Self {
        Self {
            generation: 1,
            predecessor: None,
            origin: ProgramOrigin::Cached { pattern_id },
            source: source.into(),
        }
    }

    /// The revision that replaces `self`.
    #[must_use]
    pub fn successor(&self, source: impl Into<String>) -> Self {
        Self {
            generation: self.generation + 1,
            predecessor: Some(self.generation),
            origin: ProgramOrigin::Regenerated,
            source: source.into(),
        }
    }

    #[must_use]
    pub fn generation(&self) -> u32 {
        self.generation
    }

    #[must_use]
    pub fn predecessor(&self) -> Option<u32> {
        self.predecessor
    }

    #[must_use]
    pub fn origin(&self) -> &ProgramOrigin {
        &self.origin
    }

    #[must_use]
    pub fn source(&self) -> &str {
        &self.source
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_successor_links_back() {
        let first = CandidateProgram::generated("v1");
        let second = first.successor("v2");
        let third = second.successor("v3");

        assert_eq!(first.generation(), 1);
        assert_eq!(first.predecessor(), None);
        assert_eq!(second.predecessor(), Some(1));
        assert_eq!(third.generation(), 3);
        assert_eq!(third.origin(), &ProgramOrigin::Regenerated);
        assert_eq!(first.source(), "v1");
    }

    #[test]
    fn test_cached_origin_serializes_pattern_id() {
        let id = PatternId::from_raw("pattern_abc");
        let program = CandidateProgram::cached("x", id);
        let json = serde_json::to_value(&program).unwrap();
        assert_eq!(json["origin"]["kind"], "cached");
        assert_eq!(json["origin"]["pattern_id"], "pattern_abc");
    }
}
