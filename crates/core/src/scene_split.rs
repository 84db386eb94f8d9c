//! Deterministic prompt splitter for multi-scene video jobs.
//!
//! A single prompt becomes exactly two scenes: an establishing framing of
//! the original prompt, and a continuation that keeps the same
//! characters, style and lighting while escalating the detected action
//! verb. The split is a pure function of the prompt.

use std::sync::OnceLock;

use regex::Regex;

/// Number of scenes produced by [`split_prompt`].
pub const AUTO_SPLIT_SCENES: usize = 2;

/// Action verbs and their escalated replacements. Matched case-insensitively
/// on whole words; the first verb found in the prompt wins.
const ACTION_ESCALATIONS: &[(&str, &str)] = &[
    ("rises", "soars higher"),
    ("rise", "soar higher"),
    ("runs", "sprints"),
    ("run", "sprint"),
    ("running", "sprinting"),
    ("walks", "strides"),
    ("walk", "stride"),
    ("walking", "striding"),
    ("flies", "swoops"),
    ("fly", "swoop"),
    ("flying", "swooping"),
    ("jumps", "leaps higher"),
    ("jump", "leap higher"),
    ("dances", "spins wildly"),
    ("dance", "spin wildly"),
    ("dancing", "spinning wildly"),
    ("swims", "dives"),
    ("swim", "dive"),
    ("falls", "plummets"),
    ("fall", "plummet"),
    ("drives", "races"),
    ("drive", "race"),
    ("moves", "surges"),
    ("move", "surge"),
    ("grows", "towers"),
    ("spins", "whirls faster"),
    ("floats", "drifts higher"),
    ("climbs", "scrambles higher"),
    ("rolls", "tumbles"),
    ("glows", "blazes"),
    ("burns", "erupts in flames"),
    ("waves", "crashes"),
];

fn word_regex() -> &'static Regex {
    static WORD: OnceLock<Regex> = OnceLock::new();
    WORD.get_or_init(|| Regex::new(r"[A-Za-z]+").expect("static regex is valid"))
}

/// A detected action verb: byte range in the prompt plus its escalation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActionVerb {
    pub start: usize,
    pub end: usize,
    pub verb: String,
    pub escalation: &'static str,
}

/// Find the first known action verb in `prompt`.
pub fn detect_action_verb(prompt: &str) -> Option<ActionVerb> {
    word_regex().find_iter(prompt).find_map(|m| {
        let word = m.as_str().to_ascii_lowercase();
        ACTION_ESCALATIONS
            .iter()
            .find(|(verb, _)| *verb == word)
            .map(|(_, escalation)| ActionVerb {
                start: m.start(),
                end: m.end(),
                verb: m.as_str().to_string(),
                escalation,
            })
    })
}

/// Split a single prompt into exactly [`AUTO_SPLIT_SCENES`] scene prompts.
pub fn split_prompt(prompt: &str) -> Vec<String> {
    let base = prompt.trim().trim_end_matches(['.', '!', ' ']);

    let establishing = format!(
        "Establishing shot: {base}. Wide framing that introduces the setting and subjects."
    );

    let continuation = match detect_action_verb(base) {
        Some(action) => {
            let escalated = format!(
                "{}{}{}",
                &base[..action.start],
                action.escalation,
                &base[action.end..]
            );
            format!(
                "Continue with the same characters, style, and lighting: {escalated}. The action intensifies."
            )
        }
        None => format!(
            "Continue with the same characters, style, and lighting: {base}, as the action escalates."
        ),
    };

    vec![establishing, continuation]
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
