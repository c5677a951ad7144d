//! DOM cleanup applied before content extraction.
//!
//! The extractor scores better when a page's structural noise is gone:
//! dialogs, embedded media wrappers, oversized article headers and inline
//! elements that wrap block content all get normalized here, in document
//! order, on the parsed tree.

use ego_tree::{NodeId, NodeRef, Tree};
use html5ever::{local_name, namespace_url, ns, Attribute, LocalName, QualName};
use once_cell::sync::Lazy;
use regex::Regex;
use scraper::node::{Element, Node};
use scraper::{ElementRef, Html, Selector};

static RE_WS: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+").expect("whitespace pattern"));

/// Short, generic badge texts that are not worth promoting into a trimmed
/// header (e.g. "job", "new").
const GENERIC_BADGE_LABELS: &[&str] = &[
    "job",
    "jobs",
    "stilling",
    "stillinger",
    "annonce",
    "annoncer",
    "ad",
    "ads",
    "advertisement",
    "ny",
    "new",
];

static DIALOG_SEL: Lazy<Selector> = Lazy::new(|| sel("dialog"));
static EMBED_SEL: Lazy<Selector> = Lazy::new(|| sel("object,embed,iframe"));
static NAV_SEL: Lazy<Selector> = Lazy::new(|| sel("nav"));
static FILTERBAR_SEL: Lazy<Selector> = Lazy::new(|| sel("#filterbar-container"));

static HEADER_SEL: Lazy<Selector> =
    Lazy::new(|| sel("article > header, body > header, main > header"));
static HEADING_SEL: Lazy<Selector> = Lazy::new(|| sel("h1,h2,h3"));
static BADGE_SEL: Lazy<Selector> = Lazy::new(|| sel(".badge, [class*='badge']"));
static PARAGRAPH_SEL: Lazy<Selector> = Lazy::new(|| sel("p"));
static BOLD_SEL: Lazy<Selector> = Lazy::new(|| sel("b,strong"));
static HEAVY_META_SEL: Lazy<Selector> =
    Lazy::new(|| sel(".row,.col,[class*=grid],table,form,button,ul,ol,figure,picture,video,time"));
static MEDIA_OR_LINK_SEL: Lazy<Selector> = Lazy::new(|| sel("img,a"));

static INLINE_SEL: Lazy<Selector> = Lazy::new(|| {
    sel("span,b,i,strong,em,u,s,code,kbd,mark,q,small,sub,sup,label,time,var,abbr,cite,dfn,tt")
});
static BLOCK_SEL: Lazy<Selector> = Lazy::new(|| {
    sel("address,article,aside,blockquote,div,dl,fieldset,figcaption,figure,footer,form,\
         h1,h2,h3,h4,h5,h6,header,hr,li,main,nav,ol,p,pre,section,table,ul,video")
});

fn sel(selectors: &str) -> Selector {
    Selector::parse(selectors).expect("static selector")
}

/// Structural cleanup before extraction:
/// - drop dialogs
/// - neutralize embedded media containers
/// - mark nav elements
/// - normalize article headers and inline wrappers
/// - site-specific noise removal
pub fn preprocess_document(doc: &mut Html) {
    for id in collect_ids(doc, &DIALOG_SEL) {
        detach(doc, id);
    }
    for id in collect_ids(doc, &EMBED_SEL) {
        rename_to_div(doc, id);
    }
    for id in collect_ids(doc, &NAV_SEL) {
        add_class(doc, id, "nav");
    }
    normalize_headers(doc);
    promote_inline_wrappers(doc);
    purge_filterbar(doc);
}

/// Trim noisy article headers down to badge + heading + summary.
fn normalize_headers(doc: &mut Html) {
    for header_id in collect_ids(doc, &HEADER_SEL) {
        let Some(header) = element_at(doc, header_id) else {
            continue;
        };
        let Some(heading) = header.select(&HEADING_SEL).next() else {
            continue;
        };
        let heading_id = heading.id();

        let badge = clone_useful_badge(&header);
        let (summary, summary_id) = find_summary_paragraph(&header);
        let heavy = collect_heavy_meta(doc, &header, heading_id, summary_id);

        let mut wrapper = trimmed_header_shell();
        if let Some(badge) = badge {
            wrapper.children.push(badge);
        }
        wrapper.children.push(Fragment::capture(*heading));
        if let Some(summary) = summary {
            wrapper.children.push(summary);
        }

        let original_text = element_text(&header).trim().to_string();
        let new_text = wrapper.text().trim().to_string();
        let media_or_extra = header.select(&MEDIA_OR_LINK_SEL).count();

        if should_replace_header(&original_text, &new_text, heavy.len(), media_or_extra) {
            graft_before(&mut doc.tree, header_id, &wrapper);
            detach(doc, header_id);
        } else {
            for id in heavy {
                detach(doc, id);
            }
        }
    }
}

/// Replace when the header carries heavy meta blocks, is stuffed with media
/// and links, or when the trimmed variant is substantially smaller.
fn should_replace_header(
    original_text: &str,
    new_text: &str,
    heavy_count: usize,
    media_or_extra: usize,
) -> bool {
    let mut shrink = 1.0;
    if !original_text.is_empty() && !new_text.is_empty() {
        shrink = new_text.len() as f64 / original_text.len() as f64;
    }
    heavy_count > 0 || media_or_extra > 8 || shrink < 0.85
}

/// The first badge-looking element, if its label is specific enough to keep.
fn clone_useful_badge(header: &ElementRef) -> Option<Fragment> {
    let badge = header.select(&BADGE_SEL).next()?;
    let raw = element_text(&badge).trim().to_string();
    if raw.len() < 3 || raw.len() > 40 {
        return None;
    }
    if GENERIC_BADGE_LABELS.contains(&raw.to_lowercase().as_str()) {
        return None;
    }
    Some(Fragment::capture(*badge))
}

/// The first descriptive paragraph near the heading: medium length, at most
/// a few bold runs, and either some bold text or enough words to read like
/// prose.
fn find_summary_paragraph(header: &ElementRef) -> (Option<Fragment>, Option<NodeId>) {
    for p in header.select(&PARAGRAPH_SEL) {
        let txt = collapse_ws(&element_text(&p));
        let txt = txt.trim();
        if txt.len() < 40 || txt.len() > 600 {
            continue;
        }
        let bolds = p.select(&BOLD_SEL).count();
        if bolds > 6 {
            continue;
        }
        if bolds > 0 || txt.matches(' ').count() + 1 > 6 {
            return (Some(Fragment::capture(*p)), Some(p.id()));
        }
    }
    (None, None)
}

/// Heavy / noisy metadata blocks inside a header, excluding anything that is
/// part of the heading or holds the summary.
fn collect_heavy_meta(
    doc: &Html,
    header: &ElementRef,
    heading_id: NodeId,
    summary_id: Option<NodeId>,
) -> Vec<NodeId> {
    let mut heavy = Vec::new();
    for el in header.select(&HEAVY_META_SEL) {
        if node_contains(doc, heading_id, el.id()) {
            continue;
        }
        if let Some(summary_id) = summary_id {
            if node_contains(doc, el.id(), summary_id) {
                continue;
            }
        }
        heavy.push(el.id());
    }
    heavy
}

/// Inclusive containment: `ancestor` is `node` or one of its ancestors.
fn node_contains(doc: &Html, ancestor: NodeId, node: NodeId) -> bool {
    if ancestor == node {
        return true;
    }
    doc.tree
        .get(node)
        .map(|n| n.ancestors().any(|a| a.id() == ancestor))
        .unwrap_or(false)
}

/// Convert inline elements that wrap block-level content into divs, so the
/// scorer sees them as containers rather than phrasing content.
fn promote_inline_wrappers(doc: &mut Html) {
    let ids: Vec<NodeId> = doc
        .select(&INLINE_SEL)
        .filter(|el| el.select(&BLOCK_SEL).next().is_some())
        .map(|el| el.id())
        .collect();
    for id in ids {
        rename_to_div(doc, id);
    }
}

// JobTeam has multiple sites with this annoying filterbar. Purge it.
fn purge_filterbar(doc: &mut Html) {
    for id in collect_ids(doc, &FILTERBAR_SEL) {
        detach(doc, id);
    }
}

// Tree helpers shared with the extractor.

pub(crate) fn collect_ids(doc: &Html, selector: &Selector) -> Vec<NodeId> {
    doc.select(selector).map(|el| el.id()).collect()
}

pub(crate) fn detach(doc: &mut Html, id: NodeId) {
    if let Some(mut node) = doc.tree.get_mut(id) {
        node.detach();
    }
}

pub(crate) fn element_at(doc: &Html, id: NodeId) -> Option<ElementRef<'_>> {
    doc.tree.get(id).and_then(ElementRef::wrap)
}

pub(crate) fn element_text(el: &ElementRef) -> String {
    el.text().collect()
}

pub(crate) fn collapse_ws(text: &str) -> String {
    RE_WS.replace_all(text, " ").into_owned()
}

fn rename_to_div(doc: &mut Html, id: NodeId) {
    if let Some(mut node) = doc.tree.get_mut(id) {
        if let Node::Element(el) = node.value() {
            el.name = QualName::new(None, ns!(html), local_name!("div"));
        }
    }
}

/// Idempotently append a class token to an element.
fn add_class(doc: &mut Html, id: NodeId, class: &str) {
    let Some(mut node) = doc.tree.get_mut(id) else {
        return;
    };
    let Node::Element(el) = node.value() else {
        return;
    };
    let key = QualName::new(None, ns!(), local_name!("class"));
    match el.attrs.get_mut(&key) {
        Some(existing) => {
            if existing.split_whitespace().any(|part| part == class) {
                return;
            }
            let updated = format!("{} {}", existing, class);
            *existing = updated.as_str().into();
        }
        None => {
            el.attrs.insert(key, class.into());
        }
    }
}

/// An owned copy of a subtree, safe to graft back into a tree that is being
/// mutated.
pub(crate) struct Fragment {
    pub(crate) value: Node,
    pub(crate) children: Vec<Fragment>,
}

impl Fragment {
    pub(crate) fn capture(node: NodeRef<Node>) -> Fragment {
        Fragment {
            value: node.value().clone(),
            children: node.children().map(Fragment::capture).collect(),
        }
    }

    /// Concatenated text content, matching what the live tree would yield.
    pub(crate) fn text(&self) -> String {
        let mut out = String::new();
        self.collect_text(&mut out);
        out
    }

    fn collect_text(&self, out: &mut String) {
        if let Node::Text(text) = &self.value {
            out.push_str(text);
        }
        for child in &self.children {
            child.collect_text(out);
        }
    }
}

/// The replacement header: `<div data-trimmed-header="1">`.
fn trimmed_header_shell() -> Fragment {
    let name = QualName::new(None, ns!(html), local_name!("div"));
    let marker = Attribute {
        name: QualName::new(None, ns!(), LocalName::from("data-trimmed-header")),
        value: "1".into(),
    };
    Fragment {
        value: Node::Element(Element::new(name, vec![marker])),
        children: Vec::new(),
    }
}

pub(crate) fn graft_before(tree: &mut Tree<Node>, anchor: NodeId, frag: &Fragment) {
    let Some(mut anchor) = tree.get_mut(anchor) else {
        return;
    };
    let id = anchor.insert_before(frag.value.clone()).id();
    for child in &frag.children {
        graft_append(tree, id, child);
    }
}

pub(crate) fn graft_append(tree: &mut Tree<Node>, parent: NodeId, frag: &Fragment) {
    let Some(mut parent) = tree.get_mut(parent) else {
        return;
    };
    let id = parent.append(frag.value.clone()).id();
    for child in &frag.children {
        graft_append(tree, id, child);
    }
}
