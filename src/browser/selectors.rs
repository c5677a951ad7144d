//! Built-in selector lists behind the `remove_info_boxes`,
//! `remove_info_sections`, `remove_nav_sections` and `hide_nav_buttons`
//! actions. The lists are part of the product surface; entries are plain CSS
//! selectors and none may contain an apostrophe (they are spliced into
//! JavaScript string literals).

use once_cell::sync::Lazy;

pub const INFO_BOX_SELECTORS: &[&str] = &[
    // `[class$="overlay" i]`, // too broad
    r#"#ca_banner"#,
    r#"#cconsent-modal"#,
    r#"#coiOverlay"#,
    r#"#onetrust-consent-sdk"#,
    r#".cdk-overlay-container"#,
    r#".conversation-quick"#,
    r#".lbOuterWrapper"#,
    r#".legalmonster-cleanslate"#,
    r#".modal-backdrop"#,
    r#".qc-cmp2-container"#,
    r#"[aria-label*="cookie" i]"#,
    r#"[class*="alert"]"#,
    r#"[class*="ui-dialog"]"#,
    r#"[class*="ui-widget-overlay"]"#,
    r#"[data-widget*="cookie" i]"#,
    r#"[id$="popup" i]"#,
    r#"[id*="alert"]"#,
    r#"[id*="cookie" i]"#,
    r#"cookie-consent"#,
    r#"div#usercentrics-root"#,
    r#"div.archive-header"#,
    r#"div.region-emergency"#,
    r#"div[aria-label*="message" i]"#,
    r#"div[class*="cookie" i]"#, // avoid body[class*="cookie"]
    r#"div[data-automation-id="legalNotice"]"#,
    r#"div[data-widget="ph-cookie-popup-v2"]"#,
    r#"th-widget"#,
];

pub const INFO_SECTION_SELECTORS: &[&str] = &[
    r#"[class*="infobar"]"#,
    r#"[class*=jobdetailslocation]"#,
    r#"[id*="contact" i]"#,
    r#"a[href^="tel:"]"#,
];

pub const NAV_BUTTON_SELECTORS: &[&str] = &[
    // `[class*="menu" i]`, // too broad
    // `[class*="search" i]`, // too broad, e.g. politi.dk
    // `[id*="menu" i]`, // too broad
    // `a[href="/"]`, backlink is sometimes the company logo
    r#".info-nav"#,
    r#".menu"#,
    r#".mobile-trigger"#,
    r#"[class$="icon"]"#,
    r#"[class$="print"]"#,
    r#"[class$="print-hidden"]"#,
    r#"[class$="print-none"]"#,
    r#"[class*="btn" i]"#,
    r#"[class*="burger"]"#,
    r#"[class*="button" i]"#,
    r#"[class*="email" i]"#,
    r#"[class*="facebook" i]"#,
    r#"[class*="jobcart" i]"#,
    r#"[class*="linkedin" i]"#,
    r#"[class*="links"]"#,
    r#"[class*="menuicon" i]"#,
    r#"[class*="navi-items"]"#,
    r#"[class*="navicon"]"#,
    r#"[class*="open-menu" i]"#,
    r#"[class*="search" i]"#,
    r#"[class*="toggle" i]"#,
    r#"[class*="twitter" i]"#,
    r#"[data-kind="menu" i]"#,
    r#"[id$="service-link"]"#,
    r#"[id*="button" i]"#,
    r#"[id*="nav-icon"]"#,
    r#"[id*="search" i]"#,
    r#"[id*="share-label"]"#,
    r#"[id*="toggle" i]"#,
    r#"[onclick^="window.print"]"#,
    r#"[role="button"]"#,
    r#"[role="menu"]"#,
    r#"a[data-tag*="profile" i]"#,
    r#"a[data-tag*="signin" i]"#,
    r#"a[href*="cookie"]"#,
    r#"a[href*="facebook"]"#,
    r#"a[href*="linkedin"]"#,
    r#"a[href*="login" i]"#,
    r#"a[href*="register" i]"#,
    r##"a[href="#"]"##,
    r#"button"#,
];

pub const NAV_SECTION_SELECTORS: &[&str] = &[
    // `.nav`,                       // probably too broad
    // `[class*="navbar"]`,          // too broad, e.g. Jobindex with sub-logo-header
    // `[id*="dropdown" i]`,         // too broad, e.g. recman.dk
    // `[role="navigation"]`,        // too broad, e.g. ncc.dk
    // `div[class*="navigation" i]`, // probably too broad
    r#"#outershell > .navbar"#,
    r#"#share"#,
    r#".ToolsWrapper"#,
    r#".social-panel-mobile"#,
    r#".social"#,
    r#"[aria-label="dele"]"#,
    r#"[aria-label="share"]"#,
    r#"[class$="back" i] svg"#,
    r#"[class$="controls"]"#,
    r#"[class$="header-buttons"]"#,
    r#"[class$="lang" i]"#,
    r#"[class$="share"]"#,
    r#"[class*="apply-link"]"#,
    r#"[class*="applylink"]"#,
    r#"[class*="back" i] a"#,
    r#"[class*="breadcrumb" i]"#,
    r#"[class*="dropdown" i]"#,
    r#"[class*="header"] > [class*="links"]"#,
    r#"[class*="leftmenu" i]"#,
    r#"[class*="linkbox"]"#,
    r#"[class*="localmenu" i]"#,
    r#"[class*="menulink" i] "#,
    r#"[class*="pagemenu" i]"#,
    r#"[class*="panel"] [class*="navigation"]"#,
    r#"[class*="topbarnav"]"#,
    r#"[class^="area-nav"]"#,
    r#"[class^="language" i]"#,
    r#"[id*="breadcrumb" i]"#,
    r#"a[class*="arrow"]"#,
    r#"a[href*="print" i]"#,
    r#"a[href^="/apply" i]"#,
    r#"iframe[src*="facebook"]"#,
    r#"img[src*="arrow_back"]"#,
    r#"nav"#,
];

pub static INFO_BOX_SELECTOR: Lazy<String> = Lazy::new(|| INFO_BOX_SELECTORS.join(", "));
pub static INFO_SECTION_SELECTOR: Lazy<String> = Lazy::new(|| INFO_SECTION_SELECTORS.join(", "));
pub static NAV_BUTTON_SELECTOR: Lazy<String> = Lazy::new(|| NAV_BUTTON_SELECTORS.join(", "));
pub static NAV_SECTION_SELECTOR: Lazy<String> = Lazy::new(|| NAV_SECTION_SELECTORS.join(", "));

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn joined_lists_are_comma_separated() {
        assert!(INFO_BOX_SELECTOR.starts_with("#ca_banner, "));
        assert!(NAV_SECTION_SELECTOR.ends_with(", nav"));
    }

    #[test]
    fn no_selector_contains_an_apostrophe() {
        for list in [
            INFO_BOX_SELECTORS,
            INFO_SECTION_SELECTORS,
            NAV_BUTTON_SELECTORS,
            NAV_SECTION_SELECTORS,
        ] {
            for sel in list {
                assert!(!sel.contains('\''), "apostrophe in {sel}");
            }
        }
    }
}
