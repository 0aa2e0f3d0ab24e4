//! First-visible-wins element discovery over the selector catalog.

use std::collections::BTreeMap;

use serde::Serialize;
use serde_json::json;

use crate::context::RunContext;
use crate::driver::{DriverError, ElementSnapshot};
use crate::selectors::{ElementRole, SelectorCandidate, SelectorCatalog};

/// What probing one candidate found.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ElementProbe {
    pub present: bool,
    /// Visibility of the first match.
    pub visible: bool,
    pub match_count: usize,
    pub tag: Option<String>,
    pub attributes: BTreeMap<String, String>,
}

impl ElementProbe {
    pub fn absent() -> Self {
        Self::default()
    }

    pub fn from_matches(matches: &[ElementSnapshot]) -> Self {
        match matches.first() {
            Some(first) => Self {
                present: true,
                visible: first.visible,
                match_count: matches.len(),
                tag: Some(first.tag.to_ascii_lowercase()),
                attributes: first.attributes.clone(),
            },
            None => Self::absent(),
        }
    }

    pub fn is_usable(&self) -> bool {
        self.present && self.visible
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiscoveredElement {
    pub candidate: SelectorCandidate,
    pub probe: ElementProbe,
}

pub struct ElementDiscoveryEngine<'a> {
    ctx: RunContext<'a>,
    catalog: &'a SelectorCatalog,
}

impl<'a> ElementDiscoveryEngine<'a> {
    pub fn new(ctx: RunContext<'a>, catalog: &'a SelectorCatalog) -> Self {
        Self { ctx, catalog }
    }

    pub fn catalog(&self) -> &'a SelectorCatalog {
        self.catalog
    }

    /// Probe one candidate. A failed lookup reads as "absent" unless the page is gone.
    pub async fn probe(&self, candidate: &SelectorCandidate) -> Result<ElementProbe, DriverError> {
        match self.ctx.driver().query_all(&candidate.locator).await {
            Ok(matches) => Ok(ElementProbe::from_matches(&matches)),
            Err(err) if err.is_fatal() => Err(err),
            Err(err) => {
                self.ctx.logger().warn(
                    format!("Error checking selector '{}': {err}", candidate.locator),
                    Some("discovery"),
                    None,
                );
                Ok(ElementProbe::absent())
            }
        }
    }

    /// The first candidate, in priority order, whose element is present and visible.
    pub async fn discover(
        &self,
        role: ElementRole,
    ) -> Result<Option<DiscoveredElement>, DriverError> {
        for candidate in self.catalog.candidates(role) {
            let probe = self.probe(candidate).await?;
            if probe.is_usable() {
                self.ctx.logger().info(
                    format!("Found visible {} with selector: {}", role.label(), candidate.locator),
                    Some("discovery"),
                    None,
                );
                return Ok(Some(DiscoveredElement {
                    candidate: candidate.clone(),
                    probe,
                }));
            }
        }
        self.ctx.logger().info(
            format!("No visible {} found in catalog", role.label()),
            Some("discovery"),
            None,
        );
        Ok(None)
    }

    /// Probe every candidate for `role` and log what was found.
    pub async fn discover_all(
        &self,
        role: ElementRole,
    ) -> Result<Vec<(SelectorCandidate, ElementProbe)>, DriverError> {
        let mut report = Vec::new();
        for candidate in self.catalog.candidates(role) {
            let probe = self.probe(candidate).await?;
            self.ctx.logger().info(
                format!(
                    "SELECTOR CHECK: '{}' - Found: {} elements",
                    candidate.locator, probe.match_count
                ),
                Some("discovery"),
                None,
            );
            if probe.present {
                self.ctx.logger().debug(
                    format!("ELEMENT INFO for '{}'", candidate.locator),
                    Some("discovery"),
                    Some(json!({
                        "tag": probe.tag,
                        "visible": probe.visible,
                        "attributes": probe.attributes,
                    })),
                );
            }
            report.push((candidate.clone(), probe));
        }
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn probe_reflects_first_match() {
        let matches = vec![
            ElementSnapshot::new("INPUT")
                .with_attributes(&[("name", "q")])
                .visible(false),
            ElementSnapshot::new("INPUT").visible(true),
        ];
        let probe = ElementProbe::from_matches(&matches);
        assert!(probe.present);
        assert!(!probe.visible);
        assert_eq!(probe.match_count, 2);
        assert_eq!(probe.tag.as_deref(), Some("input"));
        assert_eq!(probe.attributes.get("name").map(String::as_str), Some("q"));
        assert!(!probe.is_usable());
    }

    #[test]
    fn empty_matches_are_absent() {
        let probe = ElementProbe::from_matches(&[]);
        assert_eq!(probe, ElementProbe::absent());
        assert!(!probe.is_usable());
    }
}
