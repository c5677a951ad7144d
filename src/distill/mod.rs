//! Content distillation: preprocessing plus readability-style extraction
//! tuned for job advertisements.
//!
//! The extractor's unlikely/negative/positive token classes are extended
//! exactly once, at first use, with the domain-specific alternatives below
//! (English and Danish). Everything else is per-call configuration.

pub mod normalize;
pub mod readability;

use once_cell::sync::Lazy;
use regex::Regex;
use scraper::Html;
use serde_json::{Map, Value};
use url::Url;

use crate::models::DistillResponse;
use self::normalize::preprocess_document;
use self::readability::{extract, ExtractOptions, TokenSets};

/// Elements to discard early: UI chrome, modals, recommendation rails, ads,
/// cookie / consent surfaces.
const EXTRA_UNLIKELY_TOKENS: &[&str] = &[
    // UI / structural chrome
    "breadcrumb-info",
    "filter-bar",
    "modal",
    "dialog",
    "paywall",
    "paywall-modal",
    // Cookie / consent / privacy widgets
    "cookie-alert",
    "cookie[-_]?banner",
    "cookie[-_]?consent",
    "cookie[-_]?notice",
    "cookie[-_]?preferences?",
    "cookie[-_]?settings?",
    "consent[-_]?banner",
    "consent[-_]?manager",
    "privacy[-_]?center",
    "tracking[-_]?consent",
    // Recommendation / similar content blocks (EN + DA)
    "similar[-_]?jobs?",
    "similar[-_]?positions?",
    "similar[-_]?roles?",
    "other[-_]?jobs?",
    "other[-_]?positions?",
    "other[-_]?roles?",
    "other[-_]?jobs[-_]?in[-_]?the[-_]?organis(?:ation|ation)",
    "lignende[-_]?jobs?",
    "lignende[-_]?stillinger",
    "andre[-_]?job",
    "andre[-_]?jobs?",
    "andre[-_]?stillinger",
    "lignende[-_]?annoncer",
    "andre[-_]?annoncer",
    "relaterede[-_]?annoncer",
    "flere[-_]?annoncer",
    "mest[-_]?sete[-_]?annoncer",
    "seneste[-_]?annoncer",
    "nyeste[-_]?annoncer",
    "similar[-_]?ads?",
    "other[-_]?ads?",
    "related[-_]?ads?",
    "more[-_]?ads?",
    // Testimonials / social proof
    "testimonials?",
];

/// Penalize blocks so they are unlikely top candidates: testimonial,
/// recommendation, feedback, ad and consent patterns.
const EXTRA_NEGATIVE_TOKENS: &[&str] = &[
    // Testimonials & feedback
    "testimonials?",
    "testimonial",
    "hvad[-_]?siger",
    "siger[-_]?folk",
    "vores[-_]?vikars?[-_]?feedback",
    "vikars?[-_]?feedback",
    "brugers?[-_]?feedback",
    "kunde[-_]?udtalelser",
    "kunders?[-_]?udtalelser",
    "tilfredse[-_]?kunder",
    "anbefalinger",
    "reference[r]?s?",
    "feedback[-_]?section",
    // Recommendation / similar listings
    "similar[-_]?jobs?",
    "other[-_]?jobs?",
    "other[-_]?positions?",
    "other[-_]?roles?",
    "other[-_]?jobs[-_]?in[-_]?the[-_]?organis(?:ation|ation)",
    "similar[-_]?positions?",
    "similar[-_]?roles?",
    "lignende[-_]?jobs?",
    "lignende[-_]?stillinger",
    "andre[-_]?job",
    "andre[-_]?jobs?",
    "andre[-_]?stillinger",
    "se[-_]?lokale[-_]?stillinger",
    "lokale[-_]?stillinger",
    "lignende[-_]?annoncer",
    "andre[-_]?annoncer",
    "relaterede[-_]?annoncer",
    "flere[-_]?annoncer",
    "mest[-_]?sete[-_]?annoncer",
    "seneste[-_]?annoncer",
    "nyeste[-_]?annoncer",
    "similar[-_]?ads?",
    "other[-_]?ads?",
    "related[-_]?ads?",
    "more[-_]?ads?",
    // Cookie / consent
    "accept[-_]?cookies?",
    "allow[-_]?all[-_]?cookies?",
    "only[-_]?necessary[-_]?cookies?",
    "necessary[-_]?cookies?",
    "reject[-_]?all[-_]?cookies?",
    "deny[-_]?all[-_]?cookies?",
    "manage[-_]?cookies?",
    "cookie[-_]?settings?",
    "cookie[-_]?preferences?",
    "cookie[-_]?consent",
    "cookie[-_]?banner",
    "cookie[-_]?notice",
    "consent[-_]?banner",
    "consent[-_]?manager",
    "gdpr[-_]?consent",
    "privacy[-_]?preferences?",
    "privacy[-_]?center",
    "tracking[-_]?preferences?",
    "tracking[-_]?consent",
];

/// Boost likelihood for authentic job ad / vacancy content, including the
/// semantic sections of structured ads (EN + DA).
const EXTRA_POSITIVE_TOKENS: &[&str] = &[
    // Core job / recruitment
    "job",
    "jobs",
    "jobpost",
    "job-post",
    "jobposting",
    "job-posting",
    "joblisting",
    "job-listing",
    "jobboard",
    "job-board",
    "jobannouncement",
    "job-announcement",
    "job-summary",
    "vacancy",
    "vacancies",
    "position",
    "positions",
    "role",
    "roles",
    "opening",
    "openings",
    "opportunity",
    "opportunities",
    "career",
    "careers",
    "employment",
    "recruitment",
    "recruiting",
    "hiring",
    "apply",
    "application",
    "intern",
    "internship",
    "trainee",
    "apprentice",
    "graduate",
    "student-assistant",
    // Job ad semantic sections (EN)
    "responsibilit(?:y|ies)",
    "requirements?",
    "qualifications?",
    "skills?",
    "benefits?",
    "perks?",
    "compensation",
    "about[-_]?the[-_]?role",
    "about[-_]?you",
    "about[-_]?us",
    "who[-_]?you[-_]?are",
    // Danish core terms
    "stilling",
    "stillinger",
    "stillingsopslag",
    "jobopslag",
    "jobannonce",
    "karriere",
    "ledig",
    "ledige",
    "praktik",
    "praktikplads",
    "praktikant",
    "studerende",
    "elev",
    "lærling",
    "rekruttering",
    "ansøg",
    "ansøgning",
    "ansættelse",
    // Danish semantic sections
    "ansvarsområder",
    "arbejdsopgaver",
    "kvalifikationer",
    "kompetencer",
    "vi[-_]?tilbyder",
    "om[-_]?stillingen",
    "om[-_]?dig",
    "om[-_]?os",
    // Generic section markers useful in structured job ads
    "profile",
    "jobprofile",
    "job-profile",
    "jobdescription",
    "job-description",
    "jobdetails?",
    "job-details?",
];

/// Minimum content size before the extractor falls back to the body.
const CHAR_THRESHOLD: usize = 300;

/// The `|`-union of a base token class and its extra alternatives, compiled
/// case-insensitively. Built once per process; re-running the daemon yields
/// the same classes regardless of call order.
fn extend_tokens(base: &str, extra: &[&str]) -> Regex {
    let pattern = if extra.is_empty() {
        format!("(?i){}", base)
    } else {
        format!("(?i){}|{}", base, extra.join("|"))
    };
    Regex::new(&pattern).expect("token class pattern")
}

static TOKENS: Lazy<TokenSets> = Lazy::new(|| TokenSets {
    unlikely: extend_tokens(readability::BASE_UNLIKELY_CANDIDATES, EXTRA_UNLIKELY_TOKENS),
    maybe_candidate: extend_tokens(readability::BASE_MAYBE_CANDIDATES, &[]),
    positive: extend_tokens(readability::BASE_POSITIVE, EXTRA_POSITIVE_TOKENS),
    negative: extend_tokens(readability::BASE_NEGATIVE, EXTRA_NEGATIVE_TOKENS),
});

fn extract_options() -> ExtractOptions {
    ExtractOptions {
        char_threshold: CHAR_THRESHOLD,
        tags_to_score: vec!["p", "td", "pre", "li", "dt", "dd"],
        classes_to_preserve: vec![
            "page",
            "caption",
            "emoji",
            "hidden",
            "invisible",
            "sr-only",
            "visually-hidden",
            "visuallyhidden",
            "wp-caption",
            "wp-caption-text",
            "wp-smiley",
        ],
    }
}

/// Parse, normalize and extract the primary article / job content, returning
/// simplified HTML plus metadata.
pub fn distill_html(html: &str, base: Option<&Url>) -> DistillResponse {
    let mut doc = Html::parse_document(html);
    preprocess_document(&mut doc);

    let article = extract(&mut doc, base, &TOKENS, &extract_options());

    // Metadata keys mirror the extractor's result fields, lower-cased, with
    // the DOM node left out.
    let mut metadata = Map::new();
    metadata.insert("title".into(), Value::String(article.title));
    metadata.insert("byline".into(), Value::String(article.byline));
    metadata.insert("textcontent".into(), Value::String(article.text_content));
    metadata.insert("length".into(), Value::from(article.length));
    metadata.insert("excerpt".into(), Value::String(article.excerpt));
    metadata.insert("sitename".into(), Value::String(article.site_name));
    metadata.insert("image".into(), Value::String(article.image));
    metadata.insert("favicon".into(), Value::String(article.favicon));
    metadata.insert("language".into(), Value::String(article.language));
    metadata.insert(
        "publishedtime".into(),
        optional_string(article.published_time),
    );
    metadata.insert(
        "modifiedtime".into(),
        optional_string(article.modified_time),
    );

    DistillResponse {
        html: article.html,
        metadata,
    }
}

fn optional_string(value: String) -> Value {
    if value.is_empty() {
        Value::Null
    } else {
        Value::String(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn token_classes_compile_and_extend() {
        assert!(TOKENS.unlikely.is_match("cookie-banner"));
        assert!(TOKENS.unlikely.is_match("similar_jobs"));
        assert!(TOKENS.unlikely.is_match("sidebar"));
        assert!(TOKENS.negative.is_match("testimonials"));
        assert!(TOKENS.negative.is_match("lignende-stillinger"));
        assert!(TOKENS.positive.is_match("jobannonce"));
        assert!(TOKENS.positive.is_match("om-stillingen"));
        assert!(TOKENS.positive.is_match("article"));
    }

    #[test]
    fn token_matching_is_case_insensitive() {
        assert!(TOKENS.unlikely.is_match("Cookie-Banner"));
        assert!(TOKENS.positive.is_match("Vacancy"));
    }

    #[test]
    fn metadata_keys_are_flattened_field_names() {
        let res = distill_html("<html><body><p>x</p></body></html>", None);
        for key in [
            "title",
            "byline",
            "textcontent",
            "length",
            "excerpt",
            "sitename",
            "image",
            "favicon",
            "language",
            "publishedtime",
            "modifiedtime",
        ] {
            assert!(res.metadata.contains_key(key), "missing {key}");
        }
        assert!(!res.metadata.contains_key("node"));
    }
}
