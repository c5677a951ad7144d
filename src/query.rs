//! Script parsing, validation, compilation and execution.
//!
//! A request body is validated up front and compiled into driver commands;
//! nothing touches the browser until the whole script has parsed. Execution
//! then walks the blocks in order, honoring `repeat` counts and `while`
//! guards, and aborts the request on the first driver error.

use std::time::Duration;

use crate::browser::selectors::{
    INFO_BOX_SELECTOR, INFO_SECTION_SELECTOR, NAV_BUTTON_SELECTOR, NAV_SECTION_SELECTOR,
};
use crate::browser::Driver;
use crate::error::Error;
use crate::models::{Action, BrowseResult, Orientation, QueryBlock, Request};
use crate::registry::{parse_tab_id, Registry};

pub const MAX_RENDER_DELAY: Duration = Duration::from_secs(10);
pub const MAX_TIMEOUT: Duration = Duration::from_secs(120);
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(20);

pub const DEFAULT_PAGELOAD_EVENTS: &[&str] = &[
    "DOMContentLoaded",
    "firstMeaningfulPaint",
    "load",
    "networkAlmostIdle",
];

/// One compiled driver command. `block` indices point into the result's
/// per-block output slots.
#[derive(Debug, Clone, PartialEq)]
pub enum Cmd {
    EmulateViewport {
        width: i64,
        height: i64,
        orientation: Option<Orientation>,
        mobile: bool,
        scale: Option<f64>,
    },
    NetworkEnable,
    LifecycleEnable,
    Navigate(String),
    Click(String),
    Eval { src: String, block: usize },
    OuterHtml { block: usize },
    Listen(Vec<String>),
    Sleep(Duration),
    ScrollToBottom,
    ScrollIntoView(String),
    Remove(String),
    Hide(String),
    Screenshot {
        element: Option<String>,
        padding: Option<String>,
    },
    PrintToPdf([f64; 4]),
}

/// Compiled `while` guard. The default guard holds on every evaluation, so a
/// guardless block still runs its full repeat count.
#[derive(Debug, Clone, PartialEq)]
pub enum Guard {
    Always,
    ElementExists(String),
    ElementVisible(String),
}

#[derive(Debug, Clone)]
pub struct CompiledBlock {
    pub cmds: Vec<Cmd>,
    pub repeat: usize,
    pub guard: Guard,
}

/// A fully validated, compiled request ready to run against a tab.
#[derive(Debug)]
pub struct Script {
    pub blocks: Vec<CompiledBlock>,
    pub session_id: String,
    pub old_tab_id: String,
    pub reuse_tab: bool,
    pub reuse_window: bool,
    pub timeout: Duration,
    res: BrowseResult,
}

impl Script {
    /// Validate and compile a parsed request body. All validation errors
    /// carry a `query[i].actions[j]:` style prefix naming the offending
    /// element.
    pub fn parse(req: Request) -> Result<Script, Error> {
        if req.forward_user_agent {
            return Err(Error::validation(
                "value \"true\" is not supported for init.forward_user_agent",
            ));
        }

        let mut prelude = Vec::new();
        parse_viewport(req.emulate_viewport.as_ref(), &mut prelude)?;
        let render_delay = parse_render_delay(&req.render_delay)?;
        let timeout = parse_timeout(&req.timeout)?;

        let mut query = req.query;
        if query.is_empty() {
            return Err(Error::validation(
                "query[0] must contain at least one action block",
            ));
        }
        if query[0].actions.is_empty() {
            return Err(Error::validation(
                "query[0].actions must contain at least one action",
            ));
        }

        let mut session_id = req.session_id;
        let mut old_tab_id = String::new();

        match query[0].actions[0].name() {
            "load_tab" => {
                old_tab_id = query[0].actions[0].arg(1).to_string();
                query[0].actions.remove(0);
                let prefix = parse_tab_id(&old_tab_id)
                    .map(|(prefix, _)| prefix.to_string())
                    .map_err(|e| Error::Validation(format!("load_tab: {}", e)))?;
                if session_id.is_empty() {
                    session_id = prefix;
                    tracing::info!("Loading tab {}, inferring window {}", old_tab_id, session_id);
                } else if session_id == prefix {
                    tracing::info!("Loading tab {} and window {}", old_tab_id, session_id);
                } else {
                    return Err(Error::Validation(format!(
                        "tab {} is not part of window session {}",
                        old_tab_id, session_id
                    )));
                }
            }
            "navigate" => {
                if query[0].actions.len() < 2 {
                    return Err(Error::validation(
                        "query[0].actions must contain at least one other action besides \"navigate\"",
                    ));
                }
            }
            _ => {
                return Err(Error::validation(
                    "query[0].actions[0] must begin with either \"load_tab\" or \"navigate\"",
                ));
            }
        }

        let has_listen = query
            .iter()
            .flat_map(|b| b.actions.iter())
            .any(|xa| xa.name() == "listen");
        if has_listen {
            prelude.push(Cmd::NetworkEnable);
            prelude.push(Cmd::LifecycleEnable);
        }

        let new_tab = old_tab_id.is_empty();
        let res = BrowseResult::with_blocks(query.len());
        let mut blocks = Vec::with_capacity(query.len());

        for (pos, block) in query.iter().enumerate() {
            if block.actions.is_empty() && new_tab {
                return Err(Error::Validation(format!(
                    "query[{}].actions can't be empty",
                    pos
                )));
            }

            let mut cmds = if pos == 0 {
                std::mem::take(&mut prelude)
            } else {
                Vec::new()
            };
            for (j, xa) in block.actions.iter().enumerate() {
                compile_action(xa, pos, render_delay, &mut cmds).map_err(|e| {
                    Error::Validation(format!("query[{}].actions[{}]: {}", pos, j, e))
                })?;
            }

            let repeat = parse_repeat(block)
                .map_err(|e| Error::Validation(format!("query[{}].repeat: {}", pos, e)))?;
            let guard = parse_while(block)
                .map_err(|e| Error::Validation(format!("query[{}].while: {}", pos, e)))?;

            blocks.push(CompiledBlock {
                cmds,
                repeat,
                guard,
            });
        }

        Ok(Script {
            blocks,
            session_id,
            old_tab_id,
            reuse_tab: req.reuse_tab,
            reuse_window: req.reuse_window,
            timeout,
            res,
        })
    }

    /// Acquire a session, run the compiled blocks, and save or tear down the
    /// tab. The tab is saved (when requested) even if a block failed, so a
    /// client keeps its session across a mid-script error.
    pub async fn execute(mut self, driver: &Driver, registry: &Registry) -> Result<BrowseResult, Error> {
        let tab = if self.old_tab_id.is_empty() {
            let window = registry.window(&self.session_id, self.timeout).await?;
            self.session_id = window.id.clone();
            driver.create_tab(&window, self.timeout).await?
        } else {
            registry
                .load_tab(&self.old_tab_id)
                .await?
                .ok_or_else(|| Error::TabNotFound(self.old_tab_id.clone()))?
        };

        if self.reuse_window {
            self.res.window_id = self.session_id.clone();
        }
        if self.reuse_tab {
            self.res.tab_id = tab.id.clone();
        }

        let outcome = run_blocks(driver, &tab, &self.blocks, &self.session_id, &mut self.res).await;

        if self.reuse_tab {
            registry.save_tab(tab).await?;
        } else {
            driver.close_tab(tab).await;
        }

        outcome?;
        Ok(self.res)
    }
}

async fn run_blocks(
    driver: &Driver,
    tab: &crate::registry::TabSession,
    blocks: &[CompiledBlock],
    session_id: &str,
    res: &mut BrowseResult,
) -> Result<(), Error> {
    let total = blocks.len();
    for (pos, block) in blocks.iter().enumerate() {
        tracing::info!("Query {}/{} (session {})", pos + 1, total, session_id);

        for _ in 0..block.repeat {
            if !eval_guard(driver, tab, &block.guard).await? {
                break;
            }
            for cmd in &block.cmds {
                run_cmd(driver, tab, session_id, cmd, res).await?;
            }
        }
    }
    Ok(())
}

async fn eval_guard(
    driver: &Driver,
    tab: &crate::registry::TabSession,
    guard: &Guard,
) -> Result<bool, Error> {
    match guard {
        Guard::Always => Ok(true),
        Guard::ElementExists(sel) => driver.element_exists(tab, sel).await,
        Guard::ElementVisible(sel) => driver.element_visible(tab, sel).await,
    }
}

async fn run_cmd(
    driver: &Driver,
    tab: &crate::registry::TabSession,
    session_id: &str,
    cmd: &Cmd,
    res: &mut BrowseResult,
) -> Result<(), Error> {
    match cmd {
        Cmd::EmulateViewport {
            width,
            height,
            orientation,
            mobile,
            scale,
        } => {
            driver
                .emulate_viewport(tab, *width, *height, *orientation, *mobile, *scale)
                .await
        }
        Cmd::NetworkEnable => driver.enable_network_events(tab).await,
        Cmd::LifecycleEnable => driver.enable_lifecycle_events(tab).await,
        Cmd::Navigate(url) => driver.navigate(tab, url).await,
        Cmd::Click(sel) => driver.click(tab, sel).await,
        Cmd::Eval { src, block } => {
            let out = driver.evaluate(tab, src).await?;
            res.out[*block].push(out);
            Ok(())
        }
        Cmd::OuterHtml { block } => {
            let html = driver.outer_html(tab).await?;
            res.out[*block].push(html);
            Ok(())
        }
        Cmd::Listen(events) => driver.listen(tab, events, session_id).await,
        Cmd::Sleep(delay) => driver.sleep(tab, *delay).await,
        Cmd::ScrollToBottom => driver.scroll_to_bottom(tab).await,
        Cmd::ScrollIntoView(sel) => driver.scroll_into_view(tab, sel).await,
        Cmd::Remove(sel) => driver.remove_elements(tab, sel).await,
        Cmd::Hide(sel) => driver.hide_elements(tab, sel).await,
        Cmd::Screenshot { element, padding } => {
            res.img = driver
                .screenshot(tab, element.as_deref(), padding.as_deref())
                .await?;
            Ok(())
        }
        Cmd::PrintToPdf(margins) => {
            res.pdf = driver.print_to_pdf(tab, *margins).await?;
            Ok(())
        }
    }
}

fn parse_viewport(
    viewport: Option<&crate::models::ViewportBlock>,
    cmds: &mut Vec<Cmd>,
) -> Result<(), Error> {
    let Some(vp) = viewport else { return Ok(()) };
    if vp.width == 0 {
        return Err(Error::validation(
            "emulate_viewport.width: field must be non-zero",
        ));
    }
    if vp.height == 0 {
        return Err(Error::validation(
            "emulate_viewport.height: field must be non-zero",
        ));
    }
    let orientation = match vp.orientation.as_deref() {
        None => None,
        Some("landscape") => Some(Orientation::Landscape),
        Some("portrait") => Some(Orientation::Portrait),
        Some(other) => {
            return Err(Error::Validation(format!(
                "emulate_viewport: unknown orientation \"{}\"",
                other
            )));
        }
    };
    cmds.push(Cmd::EmulateViewport {
        width: vp.width,
        height: vp.height,
        orientation,
        mobile: vp.mobile,
        scale: vp.scale,
    });
    Ok(())
}

fn parse_render_delay(raw: &str) -> Result<Duration, Error> {
    if raw.is_empty() {
        return Err(Error::validation("global_render_delay is empty or missing"));
    }
    let delay = parse_duration(raw)
        .map_err(|e| Error::Validation(format!("invalid global_render_delay: {}", e)))?;
    Ok(delay.min(MAX_RENDER_DELAY))
}

fn parse_timeout(raw: &str) -> Result<Duration, Error> {
    if raw.is_empty() {
        return Ok(DEFAULT_TIMEOUT);
    }
    let timeout =
        parse_duration(raw).map_err(|e| Error::Validation(format!("invalid timeout: {}", e)))?;
    Ok(timeout.min(MAX_TIMEOUT))
}

fn parse_repeat(block: &QueryBlock) -> Result<usize, String> {
    match block.repeat {
        None => Ok(1),
        Some(n) if n < 0 => Err(format!("negative value ({}) not allowed", n)),
        Some(n) => Ok(n as usize),
    }
}

fn parse_while(block: &QueryBlock) -> Result<Guard, String> {
    let Some(xa) = &block.while_guard else {
        return Ok(Guard::Always);
    };
    xa.must_be_non_empty()?;

    match xa.name() {
        "element_exists" => {
            xa.must_arg_count(&[1])?;
            Ok(Guard::ElementExists(xa.arg(1).to_string()))
        }
        "element_visible" => {
            xa.must_arg_count(&[1])?;
            let sel = xa.arg(1);
            if sel.contains('\'') {
                return Err("element_visible selector contains \"'\"".to_string());
            }
            Ok(Guard::ElementVisible(sel.to_string()))
        }
        other => Err(format!("unknown while action \"{}\"", other)),
    }
}

fn compile_action(
    xa: &Action,
    block: usize,
    render_delay: Duration,
    cmds: &mut Vec<Cmd>,
) -> Result<(), String> {
    xa.must_be_non_empty()?;

    match xa.name() {
        "click" => {
            xa.must_arg_count(&[1])?;
            cmds.push(Cmd::Click(xa.arg(1).to_string()));
        }

        "eval" => {
            xa.must_arg_count(&[1])?;
            cmds.push(Cmd::Eval {
                src: xa.arg(1).to_string(),
                block,
            });
        }

        "hide_nav_buttons" => {
            xa.must_arg_count(&[0])?;
            cmds.push(Cmd::Hide(NAV_BUTTON_SELECTOR.clone()));
        }

        "listen" => {
            let events = parse_events(xa.args()).map_err(|e| format!("listen: {}", e))?;
            cmds.push(Cmd::Listen(events));
        }

        "load_tab" => {
            xa.must_arg_count(&[1])?;
            return Err("load_tab must be the first action of the first action block".to_string());
        }

        "navigate" => {
            xa.must_arg_count(&[1])?;
            let target = xa.arg(1);
            url::Url::parse(target).map_err(|e| format!("navigate: non-URL argument: {}", e))?;
            cmds.push(Cmd::Navigate(target.to_string()));
        }

        "outer_html" => {
            xa.must_arg_count(&[0])?;
            cmds.push(Cmd::OuterHtml { block });
        }

        "print_to_pdf" => {
            xa.must_arg_count(&[0, 4])?;
            let mut margins = [0.0f64; 4];
            for (i, arg) in xa.args().iter().enumerate() {
                margins[i] = arg
                    .parse()
                    .map_err(|e| format!("print_to_pdf: expected floating point margins: {}", e))?;
            }
            cmds.push(Cmd::PrintToPdf(margins));
        }

        "remove" => {
            if xa.args().is_empty() {
                return Err("remove: expected at least one argument".to_string());
            }
            for (i, sel) in xa.args().iter().enumerate() {
                if sel.contains('\'') {
                    return Err(format!("remove[{}]: selector contains \"'\"", i));
                }
            }
            cmds.push(Cmd::Remove(xa.args().join(", ")));
        }

        "remove_info_boxes" => {
            xa.must_arg_count(&[0])?;
            cmds.push(Cmd::Remove(INFO_BOX_SELECTOR.clone()));
        }

        "remove_info_sections" => {
            xa.must_arg_count(&[0])?;
            cmds.push(Cmd::Remove(INFO_SECTION_SELECTOR.clone()));
        }

        "remove_nav_sections" => {
            xa.must_arg_count(&[0])?;
            cmds.push(Cmd::Remove(NAV_SECTION_SELECTOR.clone()));
        }

        "screenshot" => {
            let mut element = None;
            let mut padding = None;
            for (key, value) in xa.named_args(1)? {
                match key.as_str() {
                    "element" => element = Some(value),
                    "padding" => padding = Some(value),
                    _ => {}
                }
            }
            if element.as_deref().is_some_and(|s| s.contains('\'')) {
                return Err("element contains \"'\"".to_string());
            }
            if padding.as_deref().is_some_and(|s| s.contains('\'')) {
                return Err("padding contains \"'\"".to_string());
            }
            cmds.push(Cmd::Screenshot { element, padding });
        }

        "scroll" => {
            xa.must_arg_count(&[0, 1])?;
            if xa.args().is_empty() {
                cmds.push(Cmd::ScrollToBottom);
            } else {
                cmds.push(Cmd::ScrollIntoView(xa.arg(1).to_string()));
            }
        }

        "sleep" => {
            xa.must_arg_count(&[0, 1])?;
            let delay = if xa.args().is_empty() {
                render_delay
            } else {
                parse_duration(xa.arg(1)).map_err(|e| format!("sleep: invalid duration: {}", e))?
            };
            cmds.push(Cmd::Sleep(delay));
        }

        other => return Err(format!("unknown action name \"{}\"", other)),
    }
    Ok(())
}

fn parse_events(events: &[String]) -> Result<Vec<String>, String> {
    if events.is_empty() {
        return Ok(DEFAULT_PAGELOAD_EVENTS
            .iter()
            .map(|s| s.to_string())
            .collect());
    }
    for (i, event) in events.iter().enumerate() {
        if !valid_event(event) {
            return Err(format!("arg {} contains unknown event \"{}\"", i, event));
        }
    }
    Ok(events.to_vec())
}

fn valid_event(event: &str) -> bool {
    matches!(
        event,
        "DOMContentLoaded"
            | "firstContentfulPaint"
            | "firstImagePaint"
            | "firstMeaningfulPaint"
            | "firstMeaningfulPaintCandidate"
            | "firstPaint"
            | "init"
            | "load"
            | "networkAlmostIdle"
            | "networkIdle"
    )
}

/// Parse a duration in the `<number><unit>` grammar with units
/// `ns, us, µs, ms, s, m, h`; segments concatenate (`1m30s`). Error strings
/// follow the conventional `time:` phrasing so they read well inside the
/// interpreter's validation messages.
pub fn parse_duration(raw: &str) -> Result<Duration, String> {
    let mut s = raw;
    let mut negative = false;
    if let Some(rest) = s.strip_prefix('-') {
        negative = true;
        s = rest;
    } else if let Some(rest) = s.strip_prefix('+') {
        s = rest;
    }

    if s == "0" {
        return Ok(Duration::ZERO);
    }
    if s.is_empty() {
        return Err(format!("time: invalid duration \"{}\"", raw));
    }

    let mut total_nanos = 0.0f64;
    while !s.is_empty() {
        let number_len = s
            .find(|c: char| !c.is_ascii_digit() && c != '.')
            .unwrap_or(s.len());
        let number = &s[..number_len];
        if number.is_empty() || number == "." {
            return Err(format!("time: invalid duration \"{}\"", raw));
        }
        let value: f64 = number
            .parse()
            .map_err(|_| format!("time: invalid duration \"{}\"", raw))?;
        s = &s[number_len..];

        let unit_len = s
            .find(|c: char| c.is_ascii_digit() || c == '.')
            .unwrap_or(s.len());
        let unit = &s[..unit_len];
        let scale = match unit {
            "" => return Err(format!("time: missing unit in duration \"{}\"", raw)),
            "ns" => 1.0,
            "us" | "µs" | "μs" => 1e3,
            "ms" => 1e6,
            "s" => 1e9,
            "m" => 60e9,
            "h" => 3600e9,
            _ => {
                return Err(format!(
                    "time: unknown unit \"{}\" in duration \"{}\"",
                    unit, raw
                ));
            }
        };
        s = &s[unit_len..];
        total_nanos += value * scale;
    }

    if negative {
        // Negative durations make no sense for delays or deadlines.
        return Ok(Duration::ZERO);
    }
    Ok(Duration::from_nanos(total_nanos as u64))
}
