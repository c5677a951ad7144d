//! Wire types for the browse and distill endpoints.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// One scripted action: `[name, arg, …]`.
///
/// Arguments are positional strings; `screenshot` additionally interprets its
/// tail as key/value pairs.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(transparent)]
pub struct Action(pub Vec<String>);

impl Action {
    pub fn new(list: &[&str]) -> Self {
        Action(list.iter().map(|s| s.to_string()).collect())
    }

    /// Positional element `n`; `arg(0)` is the action name. Out of range is "".
    pub fn arg(&self, n: usize) -> &str {
        self.0.get(n).map(String::as_str).unwrap_or("")
    }

    /// All arguments after the name.
    pub fn args(&self) -> &[String] {
        if self.0.is_empty() {
            &[]
        } else {
            &self.0[1..]
        }
    }

    pub fn name(&self) -> &str {
        self.arg(0)
    }

    /// Interprets elements from `offset` onward as key/value pairs; an odd
    /// tail is an error.
    pub fn named_args(&self, offset: usize) -> Result<Vec<(String, String)>, String> {
        if self.0.len() < offset {
            return Err(format!("{}: offset larger than arg list", self.name()));
        }
        let tail = &self.0[offset..];
        if tail.len() % 2 != 0 {
            return Err(format!("{}: expected even number of args", self.name()));
        }
        let mut args = Vec::with_capacity(tail.len() / 2);
        for pair in tail.chunks_exact(2) {
            args.push((pair[0].clone(), pair[1].clone()));
        }
        Ok(args)
    }

    /// Enforces one of the allowed argument counts.
    pub fn must_arg_count(&self, allowed: &[usize]) -> Result<(), String> {
        match allowed.len() {
            0 => {
                if self.0.is_empty() {
                    return Err(format!("{}: not enough arguments", self.name()));
                }
                Ok(())
            }
            1 => {
                let n = allowed[0];
                if self.args().len() < n {
                    return Err(format!("{}: not enough arguments", self.name()));
                }
                if self.args().len() > n {
                    return Err(format!(
                        "{}: too many arguments (\"{}\")",
                        self.name(),
                        self.arg(n + 1)
                    ));
                }
                Ok(())
            }
            _ => {
                if allowed.contains(&self.args().len()) {
                    return Ok(());
                }
                let head: Vec<String> = allowed[..allowed.len() - 1]
                    .iter()
                    .map(|n| n.to_string())
                    .collect();
                Err(format!(
                    "{}: needs {} or {} arguments",
                    self.name(),
                    head.join(", "),
                    allowed[allowed.len() - 1]
                ))
            }
        }
    }

    /// The name and every argument must be non-empty strings.
    pub fn must_be_non_empty(&self) -> Result<(), String> {
        if self.name().is_empty() {
            return Err("[0] must contain the name of an action".to_string());
        }
        for (i, arg) in self.args().iter().enumerate() {
            if arg.is_empty() {
                return Err(format!("[{}] must contain a non-empty argument", i + 1));
            }
        }
        Ok(())
    }
}

/// One block of the script: an action list run `repeat` times while the
/// optional guard holds.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct QueryBlock {
    #[serde(default)]
    pub actions: Vec<Action>,
    #[serde(default)]
    pub repeat: Option<i64>,
    #[serde(default, rename = "while")]
    pub while_guard: Option<Action>,
}

/// Validated screen orientation for viewport emulation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Orientation {
    Landscape,
    Portrait,
}

/// Viewport emulation settings applied before the first block.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ViewportBlock {
    #[serde(default)]
    pub width: i64,
    #[serde(default)]
    pub height: i64,
    #[serde(default)]
    pub orientation: Option<String>,
    #[serde(default)]
    pub mobile: bool,
    #[serde(default)]
    pub scale: Option<f64>,
}

/// The browse request body.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Request {
    #[serde(default)]
    pub query: Vec<QueryBlock>,
    #[serde(default)]
    pub emulate_viewport: Option<ViewportBlock>,
    #[serde(default)]
    pub forward_user_agent: bool,
    #[serde(default, rename = "global_render_delay")]
    pub render_delay: String,
    #[serde(default)]
    pub reuse_tab: bool,
    #[serde(default)]
    pub reuse_window: bool,
    #[serde(default, rename = "sessionid")]
    pub session_id: String,
    #[serde(default)]
    pub timeout: String,
}

/// Per-request output channels. `err` and `out` hold one slot per query
/// block; the byte buffers stay out of the JSON body and drive the response
/// content type instead.
#[derive(Debug, Clone, Default, Serialize)]
pub struct BrowseResult {
    pub err: Vec<String>,
    pub out: Vec<Vec<String>>,
    pub tab_id: String,
    pub window_id: String,
    #[serde(skip)]
    pub img: Vec<u8>,
    #[serde(skip)]
    pub pdf: Vec<u8>,
}

impl BrowseResult {
    pub fn with_blocks(n: usize) -> Self {
        BrowseResult {
            err: vec![String::new(); n],
            out: vec![Vec::new(); n],
            ..Default::default()
        }
    }

    /// Derived result kind: a non-empty PDF buffer wins over a non-empty
    /// image buffer; otherwise the result is the JSON body itself.
    pub fn kind(&self) -> &'static str {
        if !self.pdf.is_empty() {
            "pdf"
        } else if !self.img.is_empty() {
            "png"
        } else {
            "json"
        }
    }
}

/// The distill request body: raw HTML plus an optional base URL used to
/// resolve relative links.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct DistillRequest {
    #[serde(default)]
    pub html: String,
    #[serde(default, rename = "baseUrl")]
    pub base_url: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct DistillResponse {
    pub html: String,
    pub metadata: Map<String, Value>,
}
