//! End-to-end distillation over fixture pages: preprocessing, candidate
//! scoring, sibling assembly and metadata flattening.

use decap::distill::distill_html;
use url::Url;

fn paragraph(text: &str, repeats: usize) -> String {
    format!("<p>{}</p>", text.repeat(repeats))
}

fn job_ad_page() -> String {
    let body_text = "Vi søger en erfaren smed til vores værksted i Aarhus, \
                     hvor du får ansvar for alt fra svejsning til montage. ";
    format!(
        r#"<html lang="da"><head>
<title>Smed søges - Jobindex</title>
<meta property="og:title" content="Smed søges">
<meta property="og:description" content="Vi søger en smed til vores værksted">
<meta property="og:site_name" content="Jobindex">
<meta property="article:published_time" content="2024-01-15T08:00:00Z">
</head><body>
<nav><a href="/">Forside</a><a href="/jobs">Job</a></nav>
<div class="cookie-banner"><p>We use cookies to improve your experience, please accept them all, thank you very much indeed.</p></div>
<article class="jobannonce">
{}
{}
{}
<p>Ansøg via <a href="/apply">vores portal</a> inden den 1. februar.</p>
</article>
<div class="similar-jobs"><ul><li>Another blacksmith job somewhere else entirely</li></ul></div>
</body></html>"#,
        paragraph(body_text, 2),
        paragraph(body_text, 2),
        paragraph(body_text, 2),
    )
}

#[test]
fn job_ad_is_distilled_to_its_content() {
    let res = distill_html(&job_ad_page(), None);

    assert!(res.html.contains("erfaren smed"), "main content kept");
    assert!(!res.html.contains("cookies"), "cookie banner stripped");
    assert!(!res.html.contains("Another blacksmith"), "similar-jobs rail stripped");

    let length = res.metadata["length"].as_u64().unwrap() as usize;
    assert!(length >= 300, "length {length} below threshold");
}

#[test]
fn metadata_is_flattened_from_the_page() {
    let res = distill_html(&job_ad_page(), None);

    assert_eq!(res.metadata["title"], "Smed søges");
    assert_eq!(res.metadata["sitename"], "Jobindex");
    assert_eq!(res.metadata["language"], "da");
    assert_eq!(res.metadata["excerpt"], "Vi søger en smed til vores værksted");
    assert_eq!(res.metadata["publishedtime"], "2024-01-15T08:00:00Z");
    assert!(res.metadata["modifiedtime"].is_null());
    assert!(res.metadata["textcontent"]
        .as_str()
        .unwrap()
        .contains("erfaren smed"));
}

#[test]
fn base_url_resolves_relative_links() {
    let base = Url::parse("https://jobs.example.dk/ads/123").unwrap();
    let res = distill_html(&job_ad_page(), Some(&base));
    assert!(
        res.html.contains("https://jobs.example.dk/apply"),
        "relative href resolved: {}",
        res.html
    );
}

#[test]
fn content_classes_are_scrubbed_to_the_preserved_set() {
    let page = format!(
        r#"<html><body><article class="jobannonce">
{}
<p class="sr-only note">Skjult tekst til skærmlæsere i annoncen.</p>
</article></body></html>"#,
        paragraph(
            "En lang beskrivelse af stillingen, med ansvar, opgaver og krav til dig som person. ",
            8
        )
    );
    let res = distill_html(&page, None);
    assert!(res.html.contains(r#"class="sr-only""#), "preserved class kept");
    assert!(!res.html.contains("note"), "unlisted class dropped");
    assert!(!res.html.contains("jobannonce"), "container class dropped");
}

#[test]
fn tiny_pages_fall_back_to_the_body() {
    let res = distill_html("<html><body><p>short notice</p></body></html>", None);
    assert!(res.html.contains("short notice"));
    let length = res.metadata["length"].as_u64().unwrap();
    assert!(length > 0);
}

#[test]
fn dialogs_and_filterbars_never_reach_the_output() {
    let page = format!(
        r#"<html><body>
<dialog><p>A modal that would otherwise score well because of its length and commas, yes.</p></dialog>
<div id="filterbar-container">filters</div>
<article>{}</article>
</body></html>"#,
        paragraph(
            "Selve annoncens brødtekst, som skal overleve udtrækket, uanset hvad der ellers sker. ",
            8
        )
    );
    let res = distill_html(&page, None);
    assert!(res.html.contains("brødtekst"));
    assert!(!res.html.contains("modal that would"));
    assert!(!res.html.contains("filters"));
}

#[test]
fn list_heavy_job_ads_are_scored_by_their_items() {
    // Job ads are frequently bullet lists; li/dt/dd feed the scorer too.
    let li = "<li>Du har erfaring med svejsning, montage og kvalitetskontrol af emner.</li>";
    let page = format!(
        r#"<html><body>
<div class="job-description"><h2>Dine opgaver</h2><ul>{}</ul></div>
</body></html>"#,
        li.repeat(8)
    );
    let res = distill_html(&page, None);
    assert!(res.html.contains("svejsning"));
}
