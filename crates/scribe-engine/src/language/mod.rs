//! Heuristic language layer: schema-derived vocabulary, first-turn
//! clarification, follow-up detection and expansion, and the SQL/result
//! digests written back to session history.

pub mod ambiguity;
pub mod entities;
pub mod followup;
pub mod resolve;
pub mod summarize;
pub mod vocabulary;

pub use ambiguity::detect_ambiguity;
pub use entities::EntityExtractor;
pub use followup::{detect_followup, FollowupSignal};
pub use resolve::resolve_query;
pub use summarize::summarize_results;
pub use vocabulary::{extract_vocabulary, Vocabulary, VocabularyCache};
