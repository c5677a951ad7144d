//! Readability-style main-content extraction.
//!
//! A compact port of the classic scoring heuristics: strip improbable
//! subtrees, score text-bearing tags into their ancestors, weight classes and
//! ids, pick the best candidate adjusted for link density, then assemble it
//! together with qualifying siblings. The token classes driving the
//! unlikely/positive/negative decisions are extendable, which is where the
//! job-ad heuristics plug in.

use std::collections::HashMap;

use ego_tree::NodeId;
use html5ever::{local_name, namespace_url, ns, LocalName, QualName};
use once_cell::sync::Lazy;
use regex::Regex;
use scraper::node::Node;
use scraper::{ElementRef, Html, Selector};
use url::Url;

use super::normalize::{collapse_ws, collect_ids, detach, element_at, element_text};

/// Base token classes of the stock scorer. The distiller extends these with
/// domain-specific alternatives by `|`-union.
pub const BASE_UNLIKELY_CANDIDATES: &str = "-ad-|ai2html|banner|breadcrumbs|combx|comment|\
    community|cover-wrap|disqus|extra|footer|gdpr|header|legends|menu|related|remark|replies|\
    rss|shoutbox|sidebar|skyscraper|social|sponsor|supplemental|ad-break|agegate|pagination|\
    pager|popup|yom-remote";

pub const BASE_MAYBE_CANDIDATES: &str = "and|article|body|column|content|main|shadow";

pub const BASE_POSITIVE: &str = "article|body|content|entry|hentry|h-entry|main|page|\
    pagination|post|text|blog|story";

pub const BASE_NEGATIVE: &str = "-ad-|hidden|^hid$| hid$| hid |^hid |banner|combx|comment|\
    com-|contact|foot|footer|footnote|gdpr|masthead|media|meta|outbrain|promo|related|scroll|\
    share|shoutbox|sidebar|skyscraper|sponsor|shopping|tags|tool|widget";

/// The compiled token classes used for one extraction run.
pub struct TokenSets {
    pub unlikely: Regex,
    pub maybe_candidate: Regex,
    pub positive: Regex,
    pub negative: Regex,
}

/// Per-call extractor configuration.
pub struct ExtractOptions {
    /// Minimum article length before the extractor falls back to the body.
    pub char_threshold: usize,
    /// Tags whose text feeds ancestor scores.
    pub tags_to_score: Vec<&'static str>,
    /// Class tokens kept when class attributes are scrubbed from the output.
    pub classes_to_preserve: Vec<&'static str>,
}

/// Extraction result: simplified content plus the page metadata the scorer
/// picked up along the way.
#[derive(Debug, Default)]
pub struct Article {
    pub title: String,
    pub byline: String,
    pub text_content: String,
    pub length: usize,
    pub excerpt: String,
    pub site_name: String,
    pub image: String,
    pub favicon: String,
    pub language: String,
    pub published_time: String,
    pub modified_time: String,
    pub html: String,
}

static SCRIPT_SEL: Lazy<Selector> = Lazy::new(|| sel("script,style,noscript"));
static META_SEL: Lazy<Selector> = Lazy::new(|| sel("meta"));
static TITLE_SEL: Lazy<Selector> = Lazy::new(|| sel("title"));
static HTML_SEL: Lazy<Selector> = Lazy::new(|| sel("html"));
static BODY_SEL: Lazy<Selector> = Lazy::new(|| sel("body"));
static FAVICON_SEL: Lazy<Selector> = Lazy::new(|| sel("link[rel~='icon']"));
static REL_AUTHOR_SEL: Lazy<Selector> = Lazy::new(|| sel("[rel='author']"));
static ANCHOR_SEL: Lazy<Selector> = Lazy::new(|| sel("a"));
static HREF_SEL: Lazy<Selector> = Lazy::new(|| sel("a[href]"));
static IMG_SRC_SEL: Lazy<Selector> = Lazy::new(|| sel("img[src]"));
static PARAGRAPH_SEL: Lazy<Selector> = Lazy::new(|| sel("p"));
static CLEAN_SEL: Lazy<Selector> =
    Lazy::new(|| sel("script,style,noscript,aside,footer,form,fieldset"));
static CLASSED_SEL: Lazy<Selector> = Lazy::new(|| sel("[class]"));
static SENTENCE_END: Lazy<Regex> = Lazy::new(|| Regex::new(r"\.( |$)").expect("sentence pattern"));

fn sel(selectors: &str) -> Selector {
    Selector::parse(selectors).expect("static selector")
}

/// Run extraction over a preprocessed document. The tree is consumed
/// destructively; callers parse a fresh document per call.
pub fn extract(
    doc: &mut Html,
    base: Option<&Url>,
    tokens: &TokenSets,
    opts: &ExtractOptions,
) -> Article {
    let mut article = scan_metadata(doc);

    for id in collect_ids(doc, &SCRIPT_SEL) {
        detach(doc, id);
    }
    remove_unlikely_candidates(doc, tokens);

    let candidates = score_candidates(doc, tokens, opts);
    let accepted = match top_candidate(doc, &candidates) {
        Some(top) => assemble_article(doc, top, &candidates),
        None => body_fallback(doc),
    };

    let accepted = clean_accepted(doc, accepted, opts, base);
    render(doc, &accepted, &mut article);

    if article.length < opts.char_threshold {
        // Not enough content survived scoring; fall back to the whole body.
        let fallback = body_fallback(doc);
        render(doc, &fallback, &mut article);
    }

    if article.excerpt.is_empty() {
        article.excerpt = first_paragraph_excerpt(doc, &accepted);
    }
    article
}

/// Pull title, byline, and the social/meta fields before any node is
/// removed.
fn scan_metadata(doc: &Html) -> Article {
    let mut article = Article::default();
    let mut meta: HashMap<String, String> = HashMap::new();

    for el in doc.select(&META_SEL) {
        let key = el
            .value()
            .attr("property")
            .or_else(|| el.value().attr("name"))
            .unwrap_or("")
            .to_lowercase();
        if key.is_empty() {
            continue;
        }
        if let Some(content) = el.value().attr("content") {
            meta.entry(key).or_insert_with(|| content.trim().to_string());
        }
    }

    article.title = meta
        .get("og:title")
        .or_else(|| meta.get("twitter:title"))
        .cloned()
        .unwrap_or_default();
    if article.title.is_empty() {
        if let Some(title) = doc.select(&TITLE_SEL).next() {
            article.title = element_text(&title).trim().to_string();
        }
    }

    article.byline = meta.get("author").cloned().unwrap_or_default();
    if article.byline.is_empty() {
        if let Some(author) = doc.select(&REL_AUTHOR_SEL).next() {
            article.byline = element_text(&author).trim().to_string();
        }
    }

    article.excerpt = meta
        .get("og:description")
        .or_else(|| meta.get("description"))
        .cloned()
        .unwrap_or_default();
    article.site_name = meta.get("og:site_name").cloned().unwrap_or_default();
    article.image = meta
        .get("og:image")
        .or_else(|| meta.get("twitter:image"))
        .cloned()
        .unwrap_or_default();
    article.published_time = meta
        .get("article:published_time")
        .cloned()
        .unwrap_or_default();
    article.modified_time = meta
        .get("article:modified_time")
        .cloned()
        .unwrap_or_default();

    if let Some(link) = doc.select(&FAVICON_SEL).next() {
        article.favicon = link.value().attr("href").unwrap_or("").to_string();
    }
    if let Some(html) = doc.select(&HTML_SEL).next() {
        article.language = html.value().attr("lang").unwrap_or("").to_string();
    }
    article
}

/// Drop subtrees whose class/id scream navigation, chrome or consent, unless
/// they also look like they might hold the main content.
fn remove_unlikely_candidates(doc: &mut Html, tokens: &TokenSets) {
    let mut doomed = Vec::new();
    for node in doc.tree.root().descendants() {
        let Some(el) = ElementRef::wrap(node) else {
            continue;
        };
        let tag = el.value().name();
        if matches!(tag, "html" | "body" | "a") {
            continue;
        }
        let match_string = format!(
            "{} {}",
            el.value().attr("class").unwrap_or(""),
            el.value().attr("id").unwrap_or("")
        );
        if match_string.trim().is_empty() {
            continue;
        }
        if tokens.unlikely.is_match(&match_string)
            && !tokens.maybe_candidate.is_match(&match_string)
        {
            doomed.push(el.id());
        }
    }
    for id in doomed {
        detach(doc, id);
    }
}

/// Score text-bearing elements into their parent and grandparent.
fn score_candidates(
    doc: &Html,
    tokens: &TokenSets,
    opts: &ExtractOptions,
) -> HashMap<NodeId, f64> {
    let mut candidates: HashMap<NodeId, f64> = HashMap::new();

    for node in doc.tree.root().descendants() {
        let Some(el) = ElementRef::wrap(node) else {
            continue;
        };
        if !opts.tags_to_score.contains(&el.value().name()) {
            continue;
        }
        let text = collapse_ws(&element_text(&el));
        let text = text.trim();
        if text.len() < 25 {
            continue;
        }

        let content_score =
            1.0 + text.matches(',').count() as f64 + (text.len() as f64 / 100.0).floor().min(3.0);

        let mut ancestors = node.ancestors().filter_map(ElementRef::wrap);
        if let Some(parent) = ancestors.next() {
            *candidates
                .entry(parent.id())
                .or_insert_with(|| initial_score(&parent, tokens)) += content_score;
        }
        if let Some(grandparent) = ancestors.next() {
            *candidates
                .entry(grandparent.id())
                .or_insert_with(|| initial_score(&grandparent, tokens)) += content_score / 2.0;
        }
    }
    candidates
}

/// Starting score of a scoring container: tag affinity plus class weight.
fn initial_score(el: &ElementRef, tokens: &TokenSets) -> f64 {
    let tag_score = match el.value().name() {
        "div" => 5.0,
        "pre" | "td" | "blockquote" => 3.0,
        "address" | "ol" | "ul" | "dl" | "dd" | "dt" | "li" | "form" => -3.0,
        "h1" | "h2" | "h3" | "h4" | "h5" | "h6" | "th" => -5.0,
        _ => 0.0,
    };
    tag_score + class_weight(el, tokens)
}

/// +25 / -25 per positive/negative match on class and id.
fn class_weight(el: &ElementRef, tokens: &TokenSets) -> f64 {
    let mut weight = 0.0;
    for attr in ["class", "id"] {
        let value = el.value().attr(attr).unwrap_or("");
        if value.is_empty() {
            continue;
        }
        if tokens.negative.is_match(value) {
            weight -= 25.0;
        }
        if tokens.positive.is_match(value) {
            weight += 25.0;
        }
    }
    weight
}

/// Fraction of an element's text living inside links.
fn link_density(el: &ElementRef) -> f64 {
    let total = element_text(el).chars().count();
    if total == 0 {
        return 0.0;
    }
    let linked: usize = el
        .select(&ANCHOR_SEL)
        .map(|a| element_text(&a).chars().count())
        .sum();
    linked as f64 / total as f64
}

fn top_candidate(doc: &Html, candidates: &HashMap<NodeId, f64>) -> Option<NodeId> {
    candidates
        .iter()
        .filter_map(|(id, score)| {
            let el = element_at(doc, *id)?;
            Some((*id, score * (1.0 - link_density(&el))))
        })
        .max_by(|a, b| a.1.total_cmp(&b.1))
        .map(|(id, _)| id)
}

/// The top candidate plus siblings that scored close to it or read like
/// standalone prose.
fn assemble_article(
    doc: &Html,
    top: NodeId,
    candidates: &HashMap<NodeId, f64>,
) -> Vec<NodeId> {
    let Some(top_el) = element_at(doc, top) else {
        return Vec::new();
    };
    let top_score = candidates.get(&top).copied().unwrap_or(0.0);
    let threshold = (top_score * 0.2).max(10.0);

    let Some(parent) = top_el.parent().and_then(ElementRef::wrap) else {
        return vec![top];
    };

    let mut accepted = Vec::new();
    for sibling in parent.children().filter_map(ElementRef::wrap) {
        if sibling.id() == top {
            accepted.push(top);
            continue;
        }
        if candidates.get(&sibling.id()).copied().unwrap_or(f64::MIN) >= threshold {
            accepted.push(sibling.id());
            continue;
        }
        if sibling.value().name() == "p" {
            let text = collapse_ws(&element_text(&sibling));
            let text = text.trim();
            let density = link_density(&sibling);
            let keep = (text.len() > 80 && density < 0.25)
                || (!text.is_empty()
                    && text.len() < 80
                    && density == 0.0
                    && SENTENCE_END.is_match(text));
            if keep {
                accepted.push(sibling.id());
            }
        }
    }
    if accepted.is_empty() {
        accepted.push(top);
    }
    accepted
}

fn body_fallback(doc: &Html) -> Vec<NodeId> {
    doc.select(&BODY_SEL).next().map(|b| vec![b.id()]).unwrap_or_default()
}

/// Post-process the accepted subtrees: drop leftover boilerplate, scrub
/// class attributes down to the preserved set, resolve relative links.
fn clean_accepted(
    doc: &mut Html,
    accepted: Vec<NodeId>,
    opts: &ExtractOptions,
    base: Option<&Url>,
) -> Vec<NodeId> {
    for &root in &accepted {
        let doomed: Vec<NodeId> = match element_at(doc, root) {
            Some(el) => el.select(&CLEAN_SEL).map(|d| d.id()).collect(),
            None => continue,
        };
        for id in doomed {
            detach(doc, id);
        }
        scrub_classes(doc, root, &opts.classes_to_preserve);
        if let Some(base) = base {
            resolve_relative_uris(doc, root, base);
        }
    }
    accepted
}

fn scrub_classes(doc: &mut Html, root: NodeId, preserve: &[&'static str]) {
    let ids: Vec<NodeId> = match element_at(doc, root) {
        Some(el) => {
            let mut ids: Vec<NodeId> = el.select(&CLASSED_SEL).map(|e| e.id()).collect();
            if el.value().attr("class").is_some() {
                ids.push(root);
            }
            ids
        }
        None => return,
    };
    let key = QualName::new(None, ns!(), local_name!("class"));
    for id in ids {
        let Some(mut node) = doc.tree.get_mut(id) else {
            continue;
        };
        let Node::Element(el) = node.value() else {
            continue;
        };
        let kept = match el.attrs.get(&key) {
            Some(existing) => existing
                .split_whitespace()
                .filter(|token| preserve.iter().any(|p| p == token))
                .collect::<Vec<_>>()
                .join(" "),
            None => continue,
        };
        if kept.is_empty() {
            el.attrs.retain(|name, _| *name != key);
        } else {
            el.attrs.insert(key.clone(), kept.as_str().into());
        }
    }
}

fn resolve_relative_uris(doc: &mut Html, root: NodeId, base: &Url) {
    for (selector, attr_name) in [(&*HREF_SEL, "href"), (&*IMG_SRC_SEL, "src")] {
        let targets: Vec<(NodeId, String)> = match element_at(doc, root) {
            Some(el) => el
                .select(selector)
                .filter_map(|e| {
                    e.value()
                        .attr(attr_name)
                        .map(|v| (e.id(), v.to_string()))
                })
                .collect(),
            None => continue,
        };
        let key = QualName::new(None, ns!(), LocalName::from(attr_name));
        for (id, value) in targets {
            let Ok(resolved) = base.join(&value) else {
                continue;
            };
            if let Some(mut node) = doc.tree.get_mut(id) {
                if let Node::Element(el) = node.value() {
                    el.attrs
                        .insert(key.clone(), resolved.as_str().into());
                }
            }
        }
    }
}

/// Serialize accepted nodes and fill the content-derived fields.
fn render(doc: &Html, accepted: &[NodeId], article: &mut Article) {
    let mut html = String::new();
    let mut text = String::new();
    for &id in accepted {
        if let Some(el) = element_at(doc, id) {
            html.push_str(&el.html());
            text.push_str(&element_text(&el));
        }
    }
    let text = collapse_ws(&text);
    article.text_content = text.trim().to_string();
    article.length = article.text_content.chars().count();
    article.html = html;
}

fn first_paragraph_excerpt(doc: &Html, accepted: &[NodeId]) -> String {
    for &id in accepted {
        if let Some(el) = element_at(doc, id) {
            for p in el.select(&PARAGRAPH_SEL) {
                let text = collapse_ws(&element_text(&p));
                let text = text.trim();
                if !text.is_empty() {
                    return text.chars().take(250).collect();
                }
            }
        }
    }
    String::new()
}
