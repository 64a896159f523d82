//! Deterministic offline responder.
//!
//! Used when the model backend cannot be reached. The prompt is classified
//! into a topic by keyword and answered from a template, so identical
//! requests always produce identical text.

use std::fmt;

use switchyard_core::GenerateRequest;

/// Topic buckets, checked in declaration order; first match wins.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Topic {
    Weather,
    Dining,
    Places,
    Nature,
    History,
    General,
}

impl fmt::Display for Topic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Weather => "weather",
            Self::Dining => "dining",
            Self::Places => "places",
            Self::Nature => "nature",
            Self::History => "history",
            Self::General => "general",
        };
        f.write_str(s)
    }
}

const TOPIC_KEYWORDS: &[(Topic, &[&str])] = &[
    (
        Topic::Weather,
        &["weather", "temperature", "rain", "sunny", "climate", "forecast", "storm", "snow"],
    ),
    (
        Topic::Dining,
        &["restaurant", "dining", "food", "cuisine", "eat", "meal", "lunch", "dinner", "menu"],
    ),
    (
        Topic::Places,
        &["location", "scenic", "place", "visit", "destination", "tourist", "attraction", "museum"],
    ),
    (
        Topic::Nature,
        &["forest", "tree", "wildlife", "nature", "hike", "trail", "ecosystem", "park"],
    ),
    (
        Topic::History,
        &["history", "previous", "remember", "earlier", "last time", "similar"],
    ),
];

const LOCATION_MARKERS: &[&str] = &["in", "at", "near", "around", "to"];

#[derive(Debug, Clone, Default)]
pub struct OfflineResponder;

impl OfflineResponder {
    pub fn new() -> Self {
        Self
    }

    /// Classify the user prompt; the system prompt is a tie-breaker only.
    pub fn classify(&self, request: &GenerateRequest) -> Topic {
        classify_text(&request.prompt)
            .or_else(|| request.system.as_deref().and_then(classify_text))
            .unwrap_or(Topic::General)
    }

    /// Produce the templated answer for a request.
    pub fn respond(&self, request: &GenerateRequest) -> String {
        let topic = self.classify(request);
        let place = extract_location(&request.prompt);
        let where_ = place.map(|p| format!(" for {p}")).unwrap_or_default();

        let body = match topic {
            Topic::Weather => format!(
                "Weather outlook{where_}: expect typical seasonal conditions. Dress in layers, \
                 carry a light rain jacket, and check a local forecast service before heading out."
            ),
            Topic::Dining => format!(
                "Dining suggestions{where_}: look for places serving regional specialties, \
                 check recent reviews, and book ahead for dinner on weekends."
            ),
            Topic::Places => format!(
                "Places to see{where_}: start with the historic centre and the main viewpoints, \
                 then pick one museum or landmark that matches your interests."
            ),
            Topic::Nature => format!(
                "Outdoors{where_}: choose well-marked trails, start early, carry water, \
                 and check park opening hours and trail conditions."
            ),
            Topic::History => "From your history: I can't search past conversations right now, \
                 but your earlier questions are saved and will be used once the assistant is back online."
                .to_string(),
            Topic::General => format!(
                "Here is a general suggestion{where_}: break the plan into weather, food and \
                 things to see, and ask about each one for more detail."
            ),
        };

        format!("{body}\n\n(Generated offline: the language model is currently unavailable.)")
    }
}

fn classify_text(text: &str) -> Option<Topic> {
    let lowered = text.to_lowercase();
    TOPIC_KEYWORDS
        .iter()
        .find(|(_, words)| words.iter().any(|w| lowered.contains(w)))
        .map(|(topic, _)| *topic)
}

/// The capitalised word following a locative marker, e.g. "in Lisbon".
fn extract_location(prompt: &str) -> Option<String> {
    let words: Vec<&str> = prompt.split_whitespace().collect();
    words.windows(2).find_map(|pair| {
        let marker = pair[0].to_lowercase();
        let candidate = pair[1].trim_matches(|c: char| !c.is_alphanumeric() && c != '-');
        let capitalised = candidate.chars().next().is_some_and(char::is_uppercase);
        (LOCATION_MARKERS.contains(&marker.as_str()) && capitalised).then(|| candidate.to_string())
    })
}
