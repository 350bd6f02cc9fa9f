//! Decoders for free-text model output.
//!
//! One decoder per shape, each with a fixed fallback policy:
//!
//! | shape      | on failure                                   |
//! |------------|----------------------------------------------|
//! | plan       | `Error::PlanParse` (fatal to the run)        |
//! | keywords   | `None`; caller uses the raw response         |
//! | selection  | identity selection `0..len`                  |
//! | judgment   | `false`                                      |

use deepsearch_core::{Error, Result};
use serde::Deserialize;
use serde_json::Value;

use crate::model::{Plan, Step, StepId};

/// Index of the bracket closing the one opened at `start`, skipping JSON string literals.
fn balanced_end(s: &str, start: usize, open: u8, close: u8) -> Option<usize> {
    let bytes = s.as_bytes();
    if bytes.get(start) != Some(&open) {
        return None;
    }
    let mut depth = 0usize;
    let mut in_str = false;
    let mut escaped = false;
    for (i, &b) in bytes.iter().enumerate().skip(start) {
        if in_str {
            if escaped {
                escaped = false;
            } else if b == b'\\' {
                escaped = true;
            } else if b == b'"' {
                in_str = false;
            }
            continue;
        }
        if b == b'"' {
            in_str = true;
        } else if b == open {
            depth += 1;
        } else if b == close {
            depth -= 1;
            if depth == 0 {
                return Some(i);
            }
        }
    }
    None
}

/// Drop commas that directly precede `}` or `]` (outside string literals).
fn strip_trailing_commas(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut in_str = false;
    let mut escaped = false;
    let mut chars = s.char_indices().peekable();
    while let Some((i, c)) = chars.next() {
        if in_str {
            if escaped {
                escaped = false;
            } else if c == '\\' {
                escaped = true;
            } else if c == '"' {
                in_str = false;
            }
            out.push(c);
            continue;
        }
        if c == '"' {
            in_str = true;
        } else if c == ',' {
            let rest = s[i + 1..].trim_start();
            if rest.starts_with('}') || rest.starts_with(']') {
                continue;
            }
        }
        out.push(c);
    }
    out
}

#[derive(Debug, Deserialize)]
struct RawStep {
    #[serde(default)]
    step: Option<StepId>,
    sub_question: String,
}

/// Locate the first JSON array of step objects in `raw` and decode it.
///
/// Tolerates surrounding prose, code fences, and trailing commas. A missing `step`
/// ordinal is filled with the 1-based position.
pub fn parse_plan(raw: &str) -> Result<Plan> {
    let mut last_err: Option<String> = None;
    for (start, _) in raw.match_indices('[') {
        let Some(end) = balanced_end(raw, start, b'[', b']') else {
            continue;
        };
        let candidate = &raw[start..=end];
        if !candidate[1..].trim_start().starts_with('{') {
            continue;
        }
        match serde_json::from_str::<Vec<RawStep>>(&strip_trailing_commas(candidate)) {
            Ok(steps) if !steps.is_empty() => {
                let steps = steps
                    .into_iter()
                    .enumerate()
                    .map(|(i, s)| Step {
                        step: s.step.unwrap_or(StepId::Int(i as i64 + 1)),
                        sub_question: s.sub_question,
                    })
                    .collect();
                return Ok(Plan::new(steps));
            }
            Ok(_) => {}
            Err(e) => last_err = Some(e.to_string()),
        }
    }
    Err(Error::PlanParse(match last_err {
        Some(e) => format!("no well-formed step array in model output ({e})"),
        None => "no step array in model output".to_string(),
    }))
}

/// Quoted segments of `s`, with `\"` and `\\` unescaped.
fn quoted_segments(s: &str) -> Vec<String> {
    let mut out = Vec::new();
    let mut cur: Option<String> = None;
    let mut escaped = false;
    for c in s.chars() {
        match cur.as_mut() {
            None => {
                if c == '"' {
                    cur = Some(String::new());
                }
            }
            Some(buf) => {
                if escaped {
                    buf.push(c);
                    escaped = false;
                } else if c == '\\' {
                    escaped = true;
                } else if c == '"' {
                    out.extend(cur.take());
                } else {
                    buf.push(c);
                }
            }
        }
    }
    out
}

/// Every quoted string inside bracket notation: `["a"]`, `["a", "b", ...]`.
///
/// `None` when the output carries no such list.
pub fn parse_keywords(raw: &str) -> Option<Vec<String>> {
    let mut found: Vec<String> = Vec::new();
    let mut pos = 0usize;
    while let Some(off) = raw[pos..].find('[') {
        let start = pos + off;
        let Some(end) = balanced_end(raw, start, b'[', b']') else {
            pos = start + 1;
            continue;
        };
        let inner = &raw[start + 1..end];
        if inner.trim_start().starts_with('"') {
            let items = serde_json::from_str::<Vec<String>>(&strip_trailing_commas(&raw[start..=end]))
                .unwrap_or_else(|_| quoted_segments(inner));
            found.extend(items);
        }
        pos = end + 1;
    }

    let mut out: Vec<String> = Vec::new();
    for k in found {
        let k = k.trim();
        if !k.is_empty() && !out.iter().any(|e| e == k) {
            out.push(k.to_string());
        }
    }
    if out.is_empty() {
        None
    } else {
        Some(out)
    }
}

/// Result of decoding a reranker response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Selection {
    pub indices: Vec<usize>,
    /// True when the response could not be used and every index was kept.
    pub fell_back: bool,
}

pub fn identity_selection(len: usize) -> Vec<usize> {
    (0..len).collect()
}

fn selection_from_value(v: &Value, len: usize) -> Option<Vec<usize>> {
    let arr = v
        .get("relevant_titles")
        .or_else(|| v.get("releative_titles"))?
        .as_array()?;
    let mut out: Vec<usize> = Vec::with_capacity(arr.len());
    for x in arr {
        let i = usize::try_from(x.as_u64()?).ok()?;
        if i >= len {
            return None;
        }
        if !out.contains(&i) {
            out.push(i);
        }
    }
    Some(out)
}

/// Decode `{"relevant_titles": [..]}` from the whole response, else from the first
/// JSON object embedded in it. Out-of-range or non-integer indices reject the response.
pub fn parse_selection(raw: &str, len: usize) -> Option<Vec<usize>> {
    if let Ok(v) = serde_json::from_str::<Value>(raw.trim()) {
        if let Some(sel) = selection_from_value(&v, len) {
            return Some(sel);
        }
    }
    for (start, _) in raw.match_indices('{') {
        let Some(end) = balanced_end(raw, start, b'{', b'}') else {
            continue;
        };
        if let Ok(v) = serde_json::from_str::<Value>(&raw[start..=end]) {
            return selection_from_value(&v, len);
        }
    }
    None
}

pub fn selection_or_identity(raw: &str, len: usize) -> Selection {
    match parse_selection(raw, len) {
        Some(indices) => Selection {
            indices,
            fell_back: false,
        },
        None => Selection {
            indices: identity_selection(len),
            fell_back: true,
        },
    }
}

/// Asymmetric: only a literal `True` anywhere in the output counts as complete.
pub fn judge_says_complete(raw: &str) -> bool {
    raw.contains("True")
}
