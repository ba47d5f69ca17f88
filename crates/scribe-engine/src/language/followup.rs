use tracing::info;

use scribe_core::state::Turn;

use super::vocabulary::Vocabulary;

/// Connectives and deictic words that usually mean "relative to the last
/// answer" rather than a fresh question.
const FOLLOWUP_KEYWORDS: [&str; 27] = [
    "what about", "show me", "same but", "also show", "compare", "versus", "vs", "by", "for",
    "in", "only", "just", "filter", "more", "less", "that", "it", "them", "this", "these",
    "previous", "last", "next", "and", "also", "too", "again",
];

/// Phrases that read as complete requests even when short.
const COMPLETE_ACTIONS: [&str; 7] = [
    "list all", "show all", "get all", "display all", "show me all", "give me all", "find all",
];

const SHORT_QUERY_WORDS: usize = 4;

/// How the classifier read the new utterance against session history.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct FollowupSignal {
    pub is_followup: bool,
    pub confidence: f64,
}

impl FollowupSignal {
    fn new(is_followup: bool, confidence: f64) -> Self {
        Self { is_followup, confidence }
    }
}

/// Classify an utterance as standalone or a fragment needing expansion,
/// scoring keyword/length signals against the dataset vocabulary. The first
/// turn of a session is never a follow-up.
pub fn detect_followup(utterance: &str, history: &[Turn], vocabulary: &Vocabulary) -> FollowupSignal {
    if history.is_empty() {
        return FollowupSignal::new(false, 1.0);
    }

    let lowered = utterance.to_lowercase().trim().to_string();
    let has_keyword = FOLLOWUP_KEYWORDS.iter().any(|kw| lowered.contains(kw));
    let is_short = utterance.split_whitespace().count() <= SHORT_QUERY_WORDS;
    let has_entity = vocabulary.has_entity(&lowered);
    let has_complete_action = COMPLETE_ACTIONS.iter().any(|a| lowered.contains(a));
    // "by <dimension>" / "for <dimension>" modifies the previous answer even
    // when other signals say standalone.
    let has_dimension_modifier = vocabulary.dimensions.iter().any(|d| {
        lowered.contains(&format!("by {d}")) || lowered.contains(&format!("for {d}"))
    });

    let (signal, reason) = if has_dimension_modifier {
        (FollowupSignal::new(true, 0.85), "dimension modifier")
    } else if has_complete_action {
        (FollowupSignal::new(false, 0.9), "complete action phrase")
    } else if has_keyword && is_short && !has_entity {
        (FollowupSignal::new(true, 0.9), "keyword, short, no entity")
    } else if has_keyword && is_short && has_entity {
        (FollowupSignal::new(false, 0.7), "keyword but names an entity")
    } else if has_keyword && !has_entity {
        (FollowupSignal::new(true, 0.7), "keyword, no entity")
    } else if is_short && !has_entity {
        (FollowupSignal::new(true, 0.6), "short, no entity")
    } else {
        (FollowupSignal::new(false, 0.8), "reads as a new query")
    };

    info!(
        utterance,
        is_followup = signal.is_followup,
        confidence = signal.confidence,
        reason,
        "utterance classified"
    );
    signal
}
