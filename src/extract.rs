//! Rule-based intent extraction: one line of free text in, a task draft out.
//!
//! Every rule is a case-insensitive substring check against a fixed table,
//! evaluated in table order. There is no tokenizer and no ambiguity
//! resolution; the first rule that fires wins.

use chrono::{Duration, Local, NaiveDate};

use crate::task::{Assignee, Priority, TaskDraft};

pub const DEFAULT_AGENT_NAME: &str = "jarvis";

const CATEGORIES: &[(&str, &[&str])] = &[
    (
        "wedding",
        &["wedding", "bride", "groom", "venue", "ceremony", "reception"],
    ),
    (
        "business",
        &["business", "client", "invoice", "contract", "proposal", "meeting"],
    ),
    (
        "marketing",
        &["marketing", "campaign", "instagram", "social media", "seo", "newsletter"],
    ),
    (
        "personal",
        &["personal", "gym", "doctor", "dentist", "family", "grocery"],
    ),
];

const DEFAULT_CATEGORY: &str = "general";

const HIGH_PRIORITY: &[&str] = &["urgent", "asap", "important", "!"];
const LOW_PRIORITY: &[&str] = &["whenever", "sometime"];

/// Checked in this order; `next week` before `today` so the longer phrase wins.
const DUE_PHRASES: &[(&str, i64)] = &[("tomorrow", 1), ("next week", 7), ("today", 0)];

const FILLERS: &[&str] = &["remind me to", "i need to", "can you", "please"];

const SECOND_PERSON: &str = "you";

#[derive(Debug, Clone)]
pub struct Extractor {
    agent_name: String,
    owner_name: Option<String>,
}

impl Default for Extractor {
    fn default() -> Self {
        Self::new(DEFAULT_AGENT_NAME, None)
    }
}

impl Extractor {
    pub fn new(agent_name: &str, owner_name: Option<&str>) -> Self {
        Self {
            agent_name: agent_name.trim().to_lowercase(),
            owner_name: owner_name
                .map(|n| n.trim().to_lowercase())
                .filter(|n| !n.is_empty()),
        }
    }

    pub fn extract(&self, text: &str, today: NaiveDate) -> TaskDraft {
        let lower = text.to_lowercase();

        let category = CATEGORIES
            .iter()
            .find(|(_, keywords)| keywords.iter().any(|k| lower.contains(k)))
            .map_or(DEFAULT_CATEGORY, |(name, _)| *name);

        let priority = if HIGH_PRIORITY.iter().any(|w| lower.contains(w)) {
            Priority::High
        } else if LOW_PRIORITY.iter().any(|w| lower.contains(w)) {
            Priority::Low
        } else {
            Priority::Medium
        };

        let mentions_agent = !self.agent_name.is_empty() && lower.contains(&self.agent_name);
        let assignee = if mentions_agent || lower.contains(SECOND_PERSON) {
            Assignee::Agent
        } else {
            Assignee::Owner
        };

        let due = DUE_PHRASES
            .iter()
            .find(|(phrase, _)| lower.contains(phrase));
        let due_date = due.map(|(_, days)| today + Duration::days(*days));

        let cleaned = self.clean_title(&lower, due.map(|(phrase, _)| *phrase));
        let title = if cleaned.is_empty() {
            text.to_string()
        } else {
            cleaned
        };

        TaskDraft {
            title,
            category: category.to_string(),
            priority,
            assignee,
            due_date,
        }
    }

    /// Drops trigger words and filler, whole words only, then tidies up.
    fn clean_title(&self, lower: &str, due_phrase: Option<&str>) -> String {
        let mut phrases: Vec<&str> = FILLERS.to_vec();
        phrases.extend(due_phrase);
        phrases.extend(HIGH_PRIORITY.iter().chain(LOW_PRIORITY).filter(|w| **w != "!"));
        if !self.agent_name.is_empty() {
            phrases.push(&self.agent_name);
        }
        if let Some(owner) = &self.owner_name {
            phrases.push(owner);
        }
        phrases.push(SECOND_PERSON);

        let phrases: Vec<Vec<&str>> = phrases
            .iter()
            .map(|p| p.split_whitespace().collect())
            .filter(|p: &Vec<&str>| !p.is_empty())
            .collect();

        let without_bangs = lower.replace('!', " ");
        let words: Vec<&str> = without_bangs.split_whitespace().collect();

        let mut kept = Vec::with_capacity(words.len());
        let mut i = 0;
        while i < words.len() {
            match phrases.iter().find(|p| phrase_at(&words[i..], p)) {
                Some(phrase) => i += phrase.len(),
                None => {
                    kept.push(words[i]);
                    i += 1;
                }
            }
        }

        capitalize(&kept.join(" "))
    }
}

fn phrase_at(words: &[&str], phrase: &[&str]) -> bool {
    words.len() >= phrase.len()
        && words
            .iter()
            .zip(phrase)
            .all(|(word, expected)| bare(word) == *expected)
}

fn bare(word: &str) -> &str {
    word.trim_matches(|c: char| !c.is_alphanumeric())
}

fn capitalize(s: &str) -> String {
    let mut chars = s.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().collect::<String>() + chars.as_str(),
        None => String::new(),
    }
}

/// Extracts with the default agent name against today's local date.
pub fn extract(text: &str) -> TaskDraft {
    Extractor::default().extract(text, Local::now().date_naive())
}
