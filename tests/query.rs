//! Script parsing and compilation behavior: validation messages carry the
//! offending element, and compiled blocks preserve the script's semantics.

use std::time::Duration;

use decap::error::Error;
use decap::models::Request;
use decap::query::{Cmd, Guard, Script, DEFAULT_PAGELOAD_EVENTS, MAX_RENDER_DELAY};

fn parse(json: &str) -> Result<Script, Error> {
    let req: Request = serde_json::from_str(json).expect("request json");
    Script::parse(req)
}

fn parse_err(json: &str) -> String {
    match parse(json) {
        Err(Error::Validation(msg)) => msg,
        Err(other) => panic!("expected validation error, got {other:?}"),
        Ok(_) => panic!("expected validation error, got script"),
    }
}

#[test]
fn minimal_script_compiles() {
    let script = parse(
        r#"{"query":[{"actions":[["navigate","https://example.com/"],["outer_html"]]}],
            "global_render_delay":"100ms"}"#,
    )
    .unwrap();

    assert_eq!(script.blocks.len(), 1);
    assert_eq!(
        script.blocks[0].cmds,
        vec![
            Cmd::Navigate("https://example.com/".to_string()),
            Cmd::OuterHtml { block: 0 }
        ]
    );
    assert_eq!(script.blocks[0].repeat, 1);
    assert_eq!(script.blocks[0].guard, Guard::Always);
    assert_eq!(script.timeout, Duration::from_secs(20));
    assert!(script.old_tab_id.is_empty());
    assert!(script.session_id.is_empty());
}

#[test]
fn forward_user_agent_is_rejected() {
    let msg = parse_err(
        r#"{"query":[{"actions":[["navigate","https://x/"],["outer_html"]]}],
            "global_render_delay":"1s","forward_user_agent":true}"#,
    );
    assert_eq!(msg, "value \"true\" is not supported for init.forward_user_agent");
}

#[test]
fn empty_query_is_rejected() {
    let msg = parse_err(r#"{"query":[],"global_render_delay":"1s"}"#);
    assert_eq!(msg, "query[0] must contain at least one action block");

    let msg = parse_err(r#"{"query":[{"actions":[]}],"global_render_delay":"1s"}"#);
    assert_eq!(msg, "query[0].actions must contain at least one action");
}

#[test]
fn first_action_must_open_a_page() {
    let msg = parse_err(
        r##"{"query":[{"actions":[["click","#go"]]}],"global_render_delay":"1s"}"##,
    );
    assert_eq!(
        msg,
        "query[0].actions[0] must begin with either \"load_tab\" or \"navigate\""
    );
}

#[test]
fn navigate_needs_a_second_action() {
    let msg = parse_err(
        r#"{"query":[{"actions":[["navigate","https://x/"]]}],"global_render_delay":"1s"}"#,
    );
    assert_eq!(
        msg,
        "query[0].actions must contain at least one other action besides \"navigate\""
    );
}

#[test]
fn navigate_requires_an_absolute_uri() {
    let msg = parse_err(
        r#"{"query":[{"actions":[["navigate","not a url"],["outer_html"]]}],
            "global_render_delay":"1s"}"#,
    );
    assert!(
        msg.starts_with("query[0].actions[0]: navigate: non-URL argument:"),
        "unexpected message: {msg}"
    );
}

#[test]
fn load_tab_pulls_the_tab_id_aside() {
    let script = parse(
        r#"{"query":[{"actions":[["load_tab","00c0ffee_deadbeef"],["eval","document.title"]]}],
            "global_render_delay":"1s"}"#,
    )
    .unwrap();
    assert_eq!(script.old_tab_id, "00c0ffee_deadbeef");
    assert_eq!(script.session_id, "00c0ffee");
    // The load_tab action itself is stripped from the compiled block.
    assert_eq!(
        script.blocks[0].cmds,
        vec![Cmd::Eval {
            src: "document.title".to_string(),
            block: 0
        }]
    );
}

#[test]
fn load_tab_session_mismatch_is_rejected() {
    let msg = parse_err(
        r#"{"query":[{"actions":[["load_tab","00c0ffee_deadbeef"]]}],
            "sessionid":"0badf00d","global_render_delay":"1s"}"#,
    );
    assert_eq!(
        msg,
        "tab 00c0ffee_deadbeef is not part of window session 0badf00d"
    );
}

#[test]
fn load_tab_rejects_malformed_ids() {
    let msg = parse_err(
        r#"{"query":[{"actions":[["load_tab","zzz"]]}],"global_render_delay":"1s"}"#,
    );
    assert_eq!(msg, "load_tab: illegal tab ID format \"zzz\"");
}

#[test]
fn load_tab_elsewhere_is_rejected() {
    let msg = parse_err(
        r#"{"query":[{"actions":[["navigate","https://x/"],["load_tab","00c0ffee_deadbeef"]]}],
            "global_render_delay":"1s"}"#,
    );
    assert_eq!(
        msg,
        "query[0].actions[1]: load_tab must be the first action of the first action block"
    );
}

#[test]
fn listen_prepends_event_setup_to_the_first_block() {
    let script = parse(
        r#"{"query":[{"actions":[["navigate","https://x/"],["listen"]]},
                     {"actions":[["outer_html"]]}],
            "global_render_delay":"1s"}"#,
    )
    .unwrap();
    assert_eq!(script.blocks[0].cmds[0], Cmd::NetworkEnable);
    assert_eq!(script.blocks[0].cmds[1], Cmd::LifecycleEnable);
    assert_eq!(
        script.blocks[0].cmds[3],
        Cmd::Listen(
            DEFAULT_PAGELOAD_EVENTS
                .iter()
                .map(|s| s.to_string())
                .collect()
        )
    );
}

#[test]
fn listen_rejects_unknown_events() {
    let msg = parse_err(
        r#"{"query":[{"actions":[["navigate","https://x/"],["listen","bogus"]]}],
            "global_render_delay":"1s"}"#,
    );
    assert_eq!(
        msg,
        "query[0].actions[1]: listen: arg 0 contains unknown event \"bogus\""
    );
}

#[test]
fn viewport_emulation_is_prepended() {
    let script = parse(
        r#"{"query":[{"actions":[["navigate","https://x/"],["outer_html"]]}],
            "emulate_viewport":{"width":390,"height":844,"orientation":"portrait","mobile":true},
            "global_render_delay":"1s"}"#,
    )
    .unwrap();
    match &script.blocks[0].cmds[0] {
        Cmd::EmulateViewport {
            width,
            height,
            mobile,
            ..
        } => {
            assert_eq!((*width, *height), (390, 844));
            assert!(*mobile);
        }
        other => panic!("expected viewport command first, got {other:?}"),
    }
}

#[test]
fn viewport_validation() {
    let msg = parse_err(
        r#"{"query":[{"actions":[["navigate","https://x/"],["outer_html"]]}],
            "emulate_viewport":{"width":0,"height":600},
            "global_render_delay":"1s"}"#,
    );
    assert_eq!(msg, "emulate_viewport.width: field must be non-zero");

    let msg = parse_err(
        r#"{"query":[{"actions":[["navigate","https://x/"],["outer_html"]]}],
            "emulate_viewport":{"width":800,"height":600,"orientation":"diagonal"},
            "global_render_delay":"1s"}"#,
    );
    assert_eq!(msg, "emulate_viewport: unknown orientation \"diagonal\"");
}

#[test]
fn render_delay_is_required_and_clamped() {
    let msg = parse_err(r#"{"query":[{"actions":[["navigate","https://x/"],["outer_html"]]}]}"#);
    assert_eq!(msg, "global_render_delay is empty or missing");

    // A sleep action with no argument picks up the (clamped) global delay.
    let script = parse(
        r#"{"query":[{"actions":[["navigate","https://x/"],["sleep"]]}],
            "global_render_delay":"1h"}"#,
    )
    .unwrap();
    assert_eq!(script.blocks[0].cmds[1], Cmd::Sleep(MAX_RENDER_DELAY));
}

#[test]
fn sleep_with_argument_parses_its_own_duration() {
    let script = parse(
        r#"{"query":[{"actions":[["navigate","https://x/"],["sleep","250ms"]]}],
            "global_render_delay":"1s"}"#,
    )
    .unwrap();
    assert_eq!(
        script.blocks[0].cmds[1],
        Cmd::Sleep(Duration::from_millis(250))
    );

    let msg = parse_err(
        r#"{"query":[{"actions":[["navigate","https://x/"],["sleep","soon"]]}],
            "global_render_delay":"1s"}"#,
    );
    assert_eq!(
        msg,
        "query[0].actions[1]: sleep: invalid duration: time: invalid duration \"soon\""
    );
}

#[test]
fn timeout_is_clamped() {
    let script = parse(
        r#"{"query":[{"actions":[["navigate","https://x/"],["outer_html"]]}],
            "global_render_delay":"1s","timeout":"10m"}"#,
    )
    .unwrap();
    assert_eq!(script.timeout, Duration::from_secs(120));
}

#[test]
fn repeat_zero_skips_but_parses() {
    let script = parse(
        r#"{"query":[{"actions":[["navigate","https://x/"],["scroll"]],"repeat":0}],
            "global_render_delay":"1s"}"#,
    )
    .unwrap();
    assert_eq!(script.blocks[0].repeat, 0);

    let msg = parse_err(
        r#"{"query":[{"actions":[["navigate","https://x/"],["scroll"]],"repeat":-3}],
            "global_render_delay":"1s"}"#,
    );
    assert_eq!(msg, "query[0].repeat: negative value (-3) not allowed");
}

#[test]
fn while_guards_compile_or_reject() {
    let script = parse(
        r#"{"query":[{"actions":[["navigate","https://x/"],["scroll"]],
                      "repeat":5,"while":["element_exists",".load-more"]}],
            "global_render_delay":"1s"}"#,
    )
    .unwrap();
    assert_eq!(
        script.blocks[0].guard,
        Guard::ElementExists(".load-more".to_string())
    );

    let msg = parse_err(
        r#"{"query":[{"actions":[["navigate","https://x/"],["scroll"]],
                      "while":["element_visible","a[title='x']"]}],
            "global_render_delay":"1s"}"#,
    );
    assert_eq!(msg, "query[0].while: element_visible selector contains \"'\"");

    let msg = parse_err(
        r##"{"query":[{"actions":[["navigate","https://x/"],["scroll"]],
                      "while":["element_glows","#x"]}],
            "global_render_delay":"1s"}"##,
    );
    assert_eq!(msg, "query[0].while: unknown while action \"element_glows\"");
}

#[test]
fn remove_validates_selectors() {
    let msg = parse_err(
        r#"{"query":[{"actions":[["navigate","https://x/"],["remove"]]}],
            "global_render_delay":"1s"}"#,
    );
    assert_eq!(msg, "query[0].actions[1]: remove: expected at least one argument");

    let msg = parse_err(
        r#"{"query":[{"actions":[["navigate","https://x/"],["remove","a[title='x']"]]}],
            "global_render_delay":"1s"}"#,
    );
    assert_eq!(msg, "query[0].actions[1]: remove[0]: selector contains \"'\"");

    let script = parse(
        r#"{"query":[{"actions":[["navigate","https://x/"],["remove",".ads",".banner"]]}],
            "global_render_delay":"1s"}"#,
    )
    .unwrap();
    assert_eq!(
        script.blocks[0].cmds[1],
        Cmd::Remove(".ads, .banner".to_string())
    );
}

#[test]
fn builtin_selector_actions_compile_to_joined_lists() {
    let script = parse(
        r#"{"query":[{"actions":[["navigate","https://x/"],
                                 ["remove_info_boxes"],["hide_nav_buttons"]]}],
            "global_render_delay":"1s"}"#,
    )
    .unwrap();
    match &script.blocks[0].cmds[1] {
        Cmd::Remove(sel) => assert!(sel.contains("#onetrust-consent-sdk")),
        other => panic!("expected remove command, got {other:?}"),
    }
    match &script.blocks[0].cmds[2] {
        Cmd::Hide(sel) => assert!(sel.contains("[role=\"button\"]")),
        other => panic!("expected hide command, got {other:?}"),
    }
}

#[test]
fn screenshot_named_args() {
    let script = parse(
        r##"{"query":[{"actions":[["navigate","https://x/"],
                                 ["screenshot","element","#main","padding","8px"]]}],
            "global_render_delay":"1s"}"##,
    )
    .unwrap();
    assert_eq!(
        script.blocks[0].cmds[1],
        Cmd::Screenshot {
            element: Some("#main".to_string()),
            padding: Some("8px".to_string())
        }
    );

    let msg = parse_err(
        r#"{"query":[{"actions":[["navigate","https://x/"],["screenshot","element"]]}],
            "global_render_delay":"1s"}"#,
    );
    assert_eq!(
        msg,
        "query[0].actions[1]: screenshot: expected even number of args"
    );

    let msg = parse_err(
        r#"{"query":[{"actions":[["navigate","https://x/"],
                                 ["screenshot","element","a[title='x']"]]}],
            "global_render_delay":"1s"}"#,
    );
    assert_eq!(msg, "query[0].actions[1]: element contains \"'\"");
}

#[test]
fn print_to_pdf_margins() {
    let script = parse(
        r#"{"query":[{"actions":[["navigate","https://x/"],
                                 ["print_to_pdf","0.4","0.4","0.4","0.4"]]}],
            "global_render_delay":"1s"}"#,
    )
    .unwrap();
    assert_eq!(
        script.blocks[0].cmds[1],
        Cmd::PrintToPdf([0.4, 0.4, 0.4, 0.4])
    );

    let msg = parse_err(
        r#"{"query":[{"actions":[["navigate","https://x/"],["print_to_pdf","1"]]}],
            "global_render_delay":"1s"}"#,
    );
    assert_eq!(msg, "query[0].actions[1]: print_to_pdf: needs 0 or 4 arguments");
}

#[test]
fn unknown_actions_are_hard_errors() {
    let msg = parse_err(
        r#"{"query":[{"actions":[["navigate","https://x/"],["frobnicate"]]}],
            "global_render_delay":"1s"}"#,
    );
    assert_eq!(msg, "query[0].actions[1]: unknown action name \"frobnicate\"");
}

#[test]
fn later_empty_blocks_need_a_loaded_tab() {
    let msg = parse_err(
        r#"{"query":[{"actions":[["navigate","https://x/"],["outer_html"]]},
                     {"actions":[]}],
            "global_render_delay":"1s"}"#,
    );
    assert_eq!(msg, "query[1].actions can't be empty");

    // With a loaded tab, empty blocks are tolerated.
    let script = parse(
        r#"{"query":[{"actions":[["load_tab","00c0ffee_deadbeef"]]},
                     {"actions":[]}],
            "global_render_delay":"1s"}"#,
    )
    .unwrap();
    assert_eq!(script.blocks.len(), 2);
    assert!(script.blocks[1].cmds.is_empty());
}

#[test]
fn result_slots_match_block_count() {
    let script = parse(
        r#"{"query":[{"actions":[["navigate","https://x/"],["outer_html"]]},
                     {"actions":[["eval","1+1"]]},
                     {"actions":[["scroll"]]}],
            "global_render_delay":"1s"}"#,
    )
    .unwrap();
    assert_eq!(script.blocks.len(), 3);
    // Output slots are wired by block index at compile time.
    assert_eq!(script.blocks[1].cmds[0], Cmd::Eval { src: "1+1".to_string(), block: 1 });
}
