//! Prioritized locator catalog for the elements the workflow needs.
//!
//! Search pages rarely agree on markup, so each role (the search input and its
//! submit control) is described by an ordered list of candidate locators. A
//! [`Locator`] is a small closed set of strategies rather than a free-form
//! selector string: the same value renders to JSON for the in-page resolver
//! and can be matched against an [`ElementSnapshot`] in pure Rust.

use std::fmt;

use serde::Serialize;

use crate::driver::ElementSnapshot;

/// What a candidate is expected to find.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ElementRole {
    SearchInput,
    SubmitControl,
}

impl ElementRole {
    pub fn label(self) -> &'static str {
        match self {
            ElementRole::SearchInput => "search input",
            ElementRole::SubmitControl => "submit control",
        }
    }
}

/// How an attribute value is compared.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", content = "value", rename_all = "camelCase")]
pub enum AttributeMatch {
    Equals(&'static str),
    /// Case-sensitive substring.
    Contains(&'static str),
    /// Whitespace-separated token of the `class` attribute.
    HasClass(&'static str),
}

/// ARIA roles the catalog can ask for, explicit or implied by markup.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum AriaRole {
    Searchbox,
    Textbox,
    Button,
}

impl AriaRole {
    pub fn as_str(self) -> &'static str {
        match self {
            AriaRole::Searchbox => "searchbox",
            AriaRole::Textbox => "textbox",
            AriaRole::Button => "button",
        }
    }

    fn implied_by(self, element: &ElementSnapshot) -> bool {
        let tag = element.tag.to_ascii_lowercase();
        let input_type = element.input_type();
        match self {
            AriaRole::Searchbox => tag == "input" && input_type == "search",
            AriaRole::Textbox => {
                tag == "textarea" || (tag == "input" && matches!(input_type.as_str(), "text" | "email" | "url"))
            }
            AriaRole::Button => {
                tag == "button" || (tag == "input" && matches!(input_type.as_str(), "submit" | "button"))
            }
        }
    }
}

/// One way of finding elements on the page.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "strategy", rename_all = "camelCase")]
pub enum Locator {
    ByAttribute {
        tag: Option<&'static str>,
        attribute: &'static str,
        matcher: AttributeMatch,
    },
    ByRole {
        role: AriaRole,
        /// Case-insensitive substring of the accessible name.
        name: Option<&'static str>,
    },
    /// Case-insensitive substring of the element's visible text.
    ByText { tag: &'static str, text: &'static str },
    /// Any `tag` element nested somewhere inside an `ancestor` element.
    Within { ancestor: &'static str, tag: &'static str },
    /// Every element with the given tag, in document order.
    ByTag { tag: &'static str },
}

impl Locator {
    pub const fn attr_equals(tag: &'static str, attribute: &'static str, value: &'static str) -> Self {
        Locator::ByAttribute {
            tag: Some(tag),
            attribute,
            matcher: AttributeMatch::Equals(value),
        }
    }

    pub const fn any_attr_equals(attribute: &'static str, value: &'static str) -> Self {
        Locator::ByAttribute {
            tag: None,
            attribute,
            matcher: AttributeMatch::Equals(value),
        }
    }

    pub const fn id(value: &'static str) -> Self {
        Locator::any_attr_equals("id", value)
    }

    pub const fn class(tag: Option<&'static str>, value: &'static str) -> Self {
        Locator::ByAttribute {
            tag,
            attribute: "class",
            matcher: AttributeMatch::HasClass(value),
        }
    }

    pub const fn attr_contains(
        tag: Option<&'static str>,
        attribute: &'static str,
        value: &'static str,
    ) -> Self {
        Locator::ByAttribute {
            tag,
            attribute,
            matcher: AttributeMatch::Contains(value),
        }
    }

    /// Pure counterpart of the in-page resolver.
    pub fn matches(&self, element: &ElementSnapshot) -> bool {
        match self {
            Locator::ByAttribute {
                tag,
                attribute,
                matcher,
            } => {
                if let Some(tag) = tag {
                    if !element.tag.eq_ignore_ascii_case(tag) {
                        return false;
                    }
                }
                let Some(value) = element.attribute(attribute) else {
                    return false;
                };
                match matcher {
                    AttributeMatch::Equals(expected) => value == *expected,
                    AttributeMatch::Contains(needle) => value.contains(needle),
                    AttributeMatch::HasClass(class) => {
                        value.split_whitespace().any(|token| token == *class)
                    }
                }
            }
            Locator::ByRole { role, name } => {
                let explicit = element
                    .attribute("role")
                    .map(|value| value.eq_ignore_ascii_case(role.as_str()))
                    .unwrap_or(false);
                if !(explicit || role.implied_by(element)) {
                    return false;
                }
                match name {
                    Some(name) => contains_ignore_case(&element.accessible_name(), name),
                    None => true,
                }
            }
            Locator::ByText { tag, text } => {
                element.tag.eq_ignore_ascii_case(tag) && contains_ignore_case(&element.text, text)
            }
            Locator::Within { ancestor, tag } => {
                element.tag.eq_ignore_ascii_case(tag)
                    && element
                        .ancestors
                        .iter()
                        .any(|candidate| candidate.eq_ignore_ascii_case(ancestor))
            }
            Locator::ByTag { tag } => element.tag.eq_ignore_ascii_case(tag),
        }
    }
}

fn contains_ignore_case(haystack: &str, needle: &str) -> bool {
    haystack
        .to_lowercase()
        .contains(&needle.to_lowercase())
}

/// CSS-like rendering used in logs and snapshot names.
impl fmt::Display for Locator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Locator::ByAttribute {
                tag,
                attribute,
                matcher,
            } => {
                let tag = tag.unwrap_or("");
                match (attribute, matcher) {
                    (&"id", AttributeMatch::Equals(value)) => write!(f, "{tag}#{value}"),
                    (_, AttributeMatch::HasClass(value)) => write!(f, "{tag}.{value}"),
                    (_, AttributeMatch::Equals(value)) => write!(f, "{tag}[{attribute}=\"{value}\"]"),
                    (_, AttributeMatch::Contains(value)) => {
                        write!(f, "{tag}[{attribute}*=\"{value}\"]")
                    }
                }
            }
            Locator::ByRole { role, name } => match name {
                Some(name) => write!(f, "role={}[name~=\"{name}\"]", role.as_str()),
                None => write!(f, "role={}", role.as_str()),
            },
            Locator::ByText { tag, text } => write!(f, "{tag}:has-text(\"{text}\")"),
            Locator::Within { ancestor, tag } => write!(f, "{ancestor} {tag}"),
            Locator::ByTag { tag } => write!(f, "{tag}"),
        }
    }
}

/// A catalog entry: a locator tagged with the role it serves and its rank.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SelectorCandidate {
    pub role: ElementRole,
    pub locator: Locator,
    /// Lower is tried first.
    pub priority: u8,
}

impl SelectorCandidate {
    pub fn new(role: ElementRole, priority: u8, locator: Locator) -> Self {
        Self {
            role,
            locator,
            priority,
        }
    }
}

/// Immutable, ordered collection of candidates for every role.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SelectorCatalog {
    candidates: Vec<SelectorCandidate>,
}

impl SelectorCatalog {
    /// Candidates are kept sorted by role and priority; ties keep insertion order.
    pub fn new(mut candidates: Vec<SelectorCandidate>) -> Self {
        candidates.sort_by_key(|candidate| (candidate.role, candidate.priority));
        Self { candidates }
    }

    /// Catalog tuned for mainstream search engines (Bing markup first).
    pub fn search_engine_default() -> Self {
        use ElementRole::{SearchInput, SubmitControl};

        let search_inputs = [
            Locator::attr_equals("input", "name", "q"),
            Locator::attr_equals("input", "type", "search"),
            Locator::attr_equals("input", "type", "text"),
            Locator::attr_contains(Some("input"), "aria-label", "search"),
            Locator::attr_contains(Some("input"), "aria-label", "Search"),
            Locator::id("sb_form_q"),
            Locator::class(None, "b_searchbox"),
            Locator::any_attr_equals("name", "q"),
            Locator::id("search_form"),
            Locator::Within {
                ancestor: "form",
                tag: "input",
            },
            Locator::ByRole {
                role: AriaRole::Searchbox,
                name: None,
            },
        ];

        let submit_controls = [
            Locator::id("search_icon"),
            Locator::attr_equals("button", "type", "submit"),
            Locator::attr_equals("input", "type", "submit"),
            Locator::id("sb_form_go"),
            Locator::class(None, "search-button"),
            Locator::attr_contains(None, "aria-label", "Search"),
            Locator::attr_contains(Some("svg"), "aria-label", "Search"),
            Locator::class(Some("button"), "b_searchboxSubmit"),
            Locator::ByRole {
                role: AriaRole::Button,
                name: Some("search"),
            },
            Locator::ByText {
                tag: "button",
                text: "search",
            },
        ];

        let mut candidates = Vec::with_capacity(search_inputs.len() + submit_controls.len());
        candidates.extend(
            search_inputs
                .into_iter()
                .enumerate()
                .map(|(rank, locator)| SelectorCandidate::new(SearchInput, rank as u8, locator)),
        );
        candidates.extend(
            submit_controls
                .into_iter()
                .enumerate()
                .map(|(rank, locator)| SelectorCandidate::new(SubmitControl, rank as u8, locator)),
        );
        Self::new(candidates)
    }

    /// Candidates for `role` in the order they must be tried.
    pub fn candidates(&self, role: ElementRole) -> impl Iterator<Item = &SelectorCandidate> + '_ {
        self.candidates
            .iter()
            .filter(move |candidate| candidate.role == role)
    }

    pub fn len(&self, role: ElementRole) -> usize {
        self.candidates(role).count()
    }

    pub fn is_empty(&self) -> bool {
        self.candidates.is_empty()
    }
}

impl Default for SelectorCatalog {
    fn default() -> Self {
        Self::search_engine_default()
    }
}
