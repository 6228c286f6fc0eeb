use std::sync::OnceLock;

use regex::Regex;

use super::conversation::{ChatMessage, Stage};

const EMAIL_PATTERN: &str = r"[A-Za-z0-9._%+-]+@[A-Za-z0-9-]+(?:\.[A-Za-z0-9-]+)*\.[A-Za-z]{2,}";

/// Marker vocabulary for one stage, matched as whole words, case-insensitively.
#[derive(Debug, Clone, Copy)]
pub struct MarkerRule {
    pub stage: Stage,
    pub terms: &'static [&'static str],
}

/// Rules in evaluation order. Must stay sorted from the highest stage down.
pub const MARKER_RULES: &[MarkerRule] = &[
    MarkerRule {
        stage: Stage::Booking,
        terms: &[
            "schedule",
            "scheduling",
            "appointment",
            "book a",
            "book an",
            "booking",
            "meeting",
            "reserve",
            "reservation",
            "consultation",
            "calendar",
            "set up a call",
            "hop on a call",
            "discovery call",
            "video call",
            "quick call",
            "short call",
            "for a call",
            "have a call",
            "arrange a call",
            "jump on a call",
            "meet up",
            "meet with",
            "meet in person",
            "we meet",
            "can meet",
            "could meet",
            "rendez-vous",
            "rdv",
            "réserver",
            "réservation",
            "réunion",
            "un appel",
            "se rencontrer",
            "agendar",
            "cita",
            "reunión",
            "reservar",
            "una llamada",
            "reunirnos",
        ],
    },
    MarkerRule {
        stage: Stage::Lead,
        terms: &[
            "call me",
            "call back",
            "callback",
            "give me a call",
            "phone",
            "telephone",
            "phone number",
            "my number",
            "reach me",
            "contact me",
            "text me",
            "whatsapp",
            "appelez-moi",
            "rappelez-moi",
            "téléphone",
            "mon numéro",
            "llámame",
            "teléfono",
            "mi número",
            "contáctame",
        ],
    },
];

/// Stage of a whole message log.
///
/// Each message is classified on its own and the highest stage wins, so the
/// result ignores message order and never drops when a message is appended.
pub fn classify(messages: &[ChatMessage]) -> Stage {
    messages
        .iter()
        .map(|message| classify_text(&message.content))
        .max()
        .unwrap_or_default()
}

pub fn classify_text(text: &str) -> Stage {
    let lowered = text.to_lowercase();

    for rule in MARKER_RULES {
        if rule.terms.iter().any(|term| contains_term(&lowered, term)) {
            return rule.stage;
        }
    }

    if find_email(text).is_some() {
        Stage::Lead
    } else {
        Stage::Conversation
    }
}

pub(crate) fn find_email(text: &str) -> Option<&str> {
    email_pattern()?.find(text).map(|found| found.as_str())
}

fn email_pattern() -> Option<&'static Regex> {
    static EMAIL: OnceLock<Option<Regex>> = OnceLock::new();
    EMAIL
        .get_or_init(|| match Regex::new(EMAIL_PATTERN) {
            Ok(pattern) => Some(pattern),
            Err(error) => {
                tracing::error!(error = %error, "email marker pattern failed to compile");
                None
            }
        })
        .as_ref()
}

fn contains_term(haystack: &str, term: &str) -> bool {
    haystack.match_indices(term).any(|(start, matched)| {
        let before = haystack[..start].chars().next_back();
        let after = haystack[start + matched.len()..].chars().next();
        !before.is_some_and(char::is_alphanumeric) && !after.is_some_and(char::is_alphanumeric)
    })
}
