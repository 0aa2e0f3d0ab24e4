//! Page-context helper scripts.
//!
//! Each helper lives in its own `.js` file under `scripts/` so editors can
//! offer syntax highlighting, and is bundled as a string at compile time.
//! Every script is a bare function expression; [`invocation`] turns one into
//! an expression that calls it with a JSON argument.

use serde_json::{Value as JsonValue, json};

use crate::selectors::Locator;

macro_rules! page_script {
    ($file:literal) => {
        include_str!(concat!(env!("CARGO_MANIFEST_DIR"), "/scripts/", $file))
    };
}

/// `(locator) => Element[]`, the in-page counterpart of [`Locator::matches`].
pub const LOCATE_ELEMENTS: &str = page_script!("locate_elements.js");
/// `(elements) => ElementSnapshot[]`.
pub const DESCRIBE_ELEMENTS: &str = page_script!("describe_elements.js");
/// `(elements, value) => true`; throws when nothing matched.
pub const FILL_ELEMENT: &str = page_script!("fill_element.js");
/// `(elements, attribute) => boolean`; tags the first match so CDP can find it.
pub const MARK_TARGET: &str = page_script!("mark_target.js");
pub const HIGHLIGHT_ELEMENT: &str = page_script!("highlight_element.js");
pub const SUBMIT_ENCLOSING_FORM: &str = page_script!("submit_enclosing_form.js");
/// `({ index, value, delayMs }) => { filled, submitScheduled }`.
pub const HEURISTIC_FILL: &str = page_script!("heuristic_fill.js");
/// `(message) => true`; replaces the `#status-overlay` banner.
pub const STATUS_OVERLAY: &str = page_script!("status_overlay.js");

/// Attribute [`MARK_TARGET`] sets on the element a native click or key press goes to.
pub const TARGET_MARKER_ATTRIBUTE: &str = "data-search-pilot-target";

/// Wrap an `(elements, arg) => …` body into a `(request) => …` function whose
/// request is built by [`locator_request`].
pub fn with_located_elements(body: &str) -> String {
    format!(
        "(request) => {{ const locate = {LOCATE_ELEMENTS}; return ({body})(locate(request.locator), request.arg); }}"
    )
}

pub fn locator_request(locator: &Locator, arg: JsonValue) -> Result<JsonValue, serde_json::Error> {
    Ok(json!({
        "locator": serde_json::to_value(locator)?,
        "arg": arg,
    }))
}

/// Expression that calls `script` with `arg` serialized as a JSON literal.
pub fn invocation(script: &str, arg: &JsonValue) -> Result<String, serde_json::Error> {
    let arg = serde_json::to_string(arg)?;
    Ok(format!("({script})({arg})"))
}
