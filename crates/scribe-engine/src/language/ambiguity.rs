use regex::Regex;
use tracing::{debug, info};

use super::vocabulary::Vocabulary;

/// Lead-ins that make a short first utterance read as a fragment of a
/// conversation that has not happened yet ("how about south").
const VAGUE_LEAD_INS: [&str; 8] = [
    "how about", "what about", "how are", "what are", "only ", "just ", "for ", "in ",
];

/// Direction and quarter words that can stand alone as an utterance without
/// saying what should be measured.
const LOCATION_WORDS: [&str; 8] = ["north", "south", "east", "west", "q1", "q2", "q3", "q4"];

const CATEGORY_WORDS: [&str; 4] = ["electronics", "furniture", "appliances", "fashion"];

/// "show me by region" style utterances that name a grouping but no data.
const GROUPING_PHRASES: [&str; 8] = [
    "show me by", "show by", "list by", "display by", "compare by", "group by", "break down by",
    "split by",
];

const TIME_KEYWORDS: [&str; 24] = [
    "q1", "q2", "q3", "q4", "january", "february", "march", "april", "may", "june", "july",
    "august", "september", "october", "november", "december", "week", "month", "quarter", "year",
    "last", "this", "recent", "latest",
];

const PERFORMANCE_METRICS: [&str; 6] = ["revenue", "sales", "quantity", "profit", "growth", "margin"];

/// Counting language that names a measure without naming a column.
const QUANTIFIER_WORDS: [&str; 8] = [
    "count", "total", "sum", "average", "how much", "how many", "all", "list",
];

/// Measures a "top X" request can rank by without them being schema columns.
const RANKING_WORDS: [&str; 12] = [
    "revenue", "sales", "sold", "quantity", "profit", "popular", "selling", "value", "units",
    "growth", "share", "size",
];

const ACTION_VERBS: [&str; 7] = ["show", "list", "display", "get", "find", "compare", "analyze"];

const SHORT_FRAGMENT_WORDS: usize = 4;

/// First-turn clarification heuristics. Each rule independently appends its
/// question(s) when the utterance trips it; a non-empty return means the run
/// should stop and ask instead of generating SQL. Later turns never reach
/// this check because session history resolves their fragments.
pub fn detect_ambiguity(utterance: &str, vocabulary: &Vocabulary) -> Vec<String> {
    let lowered = utterance.to_lowercase();
    let word_count = utterance.split_whitespace().count();

    let has_entity = vocabulary.has_entity(&lowered);
    let has_metric =
        vocabulary.has_measure(&lowered) || QUANTIFIER_WORDS.iter().any(|w| lowered.contains(w));
    let has_action = ACTION_VERBS.iter().any(|w| lowered.contains(w));

    let mut questions = Vec::new();

    // Vague short fragments: "how about south", "only electronics".
    let is_vague = VAGUE_LEAD_INS.iter().any(|p| lowered.contains(p));
    if is_vague && word_count <= SHORT_FRAGMENT_WORDS && !(has_entity && has_metric && has_action) {
        questions.push("What would you like to know? Please provide more details.".to_string());
        questions
            .push("Examples: 'Top products by revenue in South', 'Sales in Q4', etc.".to_string());
    }

    // Dimension or time value alone: "south", "q4", "electronics".
    let dimension_only = LOCATION_WORDS.iter().chain(&CATEGORY_WORDS).any(|w| lowered.contains(w));
    if dimension_only && !(has_entity && has_metric) {
        questions.push("What data would you like to see?".to_string());
        questions.push("What metric are you interested in? (revenue, quantity, count?)".to_string());
    }

    // Grouping named with no data: "show me by region".
    if GROUPING_PHRASES.iter().any(|p| lowered.contains(p)) && (!has_entity || !has_metric) {
        push_unique(
            &mut questions,
            "What data would you like to see? (products, sales, customers?)",
        );
        push_unique(
            &mut questions,
            "What metric are you interested in? (revenue, quantity, count?)",
        );
    }

    // A trend needs a time axis.
    if lowered.contains("trend")
        && !mentions_year(&lowered)
        && !TIME_KEYWORDS.iter().any(|w| lowered.contains(w))
    {
        questions.push("Which time period?".to_string());
    }

    // "performance" without saying which measure.
    if lowered.contains("performance")
        && !vocabulary.has_measure(&lowered)
        && !PERFORMANCE_METRICS.iter().any(|w| lowered.contains(w))
    {
        questions.push("Which metric (revenue, quantity, growth)?".to_string());
    }

    // Ranking requests need both a subject and a measure to rank by.
    if (lowered.contains("top") || lowered.contains("best"))
        && !(has_entity
            && (vocabulary.has_measure(&lowered)
                || RANKING_WORDS.iter().any(|w| lowered.contains(w))))
    {
        questions
            .push("By what measure? (e.g., revenue, units sold, market size, growth rate)".to_string());
    }

    if questions.is_empty() {
        debug!("utterance is clear, proceeding");
    } else {
        info!(count = questions.len(), "utterance is ambiguous, asking for clarification");
    }
    questions
}

/// The dimension-only and grouping-only rules ask about the same gaps with
/// different example lists; dedupe on the question stem before the examples.
fn push_unique(questions: &mut Vec<String>, question: &str) {
    let stem = question.split(" (").next().unwrap_or(question);
    if !questions.iter().any(|q| q.starts_with(stem)) {
        questions.push(question.to_string());
    }
}

fn mentions_year(lowered: &str) -> bool {
    Regex::new(r"\b20[0-9]{2}\b")
        .map(|re| re.is_match(lowered))
        .unwrap_or(false)
}
