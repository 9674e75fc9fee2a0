//! Source registry: the ordered list of upstream endpoints a station can be
//! fetched from.
//!
//! Descriptors are fixed at startup (from `sources.toml` or the built-in
//! defaults) and never mutated. Per-caller state such as demoted sources
//! lives in [`Demotions`], owned by the caller's session.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::config::ConfigError;
use crate::ingest::normalize::ShapeTag;

/// Placeholder every URL template must contain.
pub const STATION_PLACEHOLDER: &str = "{station_id}";

/// Station id used to check that a template renders to a valid URL.
const PROBE_STATION_ID: &str = "05BH004";

// ---------------------------------------------------------------------------
// Descriptors
// ---------------------------------------------------------------------------

/// One upstream endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceDescriptor {
    pub name: String,
    pub url_template: String,
    pub shape: ShapeTag,
    /// Lower is tried first. Unique within a registry.
    pub priority: u32,
}

impl SourceDescriptor {
    /// Substitutes the station id into the URL template.
    pub fn render_url(&self, station_id: &str) -> String {
        self.url_template.replace(STATION_PLACEHOLDER, station_id)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if !self.url_template.contains(STATION_PLACEHOLDER) {
            return Err(ConfigError::MissingPlaceholder {
                name: self.name.clone(),
            });
        }
        reqwest::Url::parse(&self.render_url(PROBE_STATION_ID)).map_err(|e| {
            ConfigError::InvalidUrl {
                name: self.name.clone(),
                reason: e.to_string(),
            }
        })?;
        Ok(())
    }
}

/// Built-in descriptors, in priority order.
///
/// The Water Office CSV endpoint now answers 422 for every request. It is
/// listed last so the fallback path is exercised against the real service.
pub fn default_descriptors() -> Vec<SourceDescriptor> {
    vec![
        SourceDescriptor {
            name: "geomet-realtime".to_string(),
            url_template: "https://api.weather.gc.ca/collections/hydrometric-realtime/items?STATION_NUMBER={station_id}&limit=1&f=json".to_string(),
            shape: ShapeTag::JsonFeatureCollection,
            priority: 10,
        },
        SourceDescriptor {
            name: "geomet-stations".to_string(),
            url_template: "https://api.weather.gc.ca/collections/hydrometric-stations/items?STATION_NUMBER={station_id}&limit=1&f=json".to_string(),
            shape: ShapeTag::JsonFeatureCollection,
            priority: 20,
        },
        SourceDescriptor {
            name: "wateroffice-csv".to_string(),
            url_template: "https://wateroffice.ec.gc.ca/services/real_time_data/csv/inline?stations[]={station_id}&parameters[]=46&parameters[]=47".to_string(),
            shape: ShapeTag::CsvLegacy,
            priority: 90,
        },
    ]
}

// ---------------------------------------------------------------------------
// Demotions
// ---------------------------------------------------------------------------

/// Sources that answered `Rejected` earlier in a session.
///
/// Demoted sources are still tried, but only after every other source.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Demotions {
    names: BTreeSet<String>,
}

impl Demotions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn demote(&mut self, name: &str) {
        self.names.insert(name.to_string());
    }

    pub fn is_demoted(&self, name: &str) -> bool {
        self.names.contains(name)
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.names.iter().map(String::as_str)
    }
}

// ---------------------------------------------------------------------------
// Registry
// ---------------------------------------------------------------------------

/// A descriptor paired with its URL rendered for one station.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Candidate<'r> {
    pub descriptor: &'r SourceDescriptor,
    pub url: String,
}

/// Validated descriptors sorted by ascending priority.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceRegistry {
    descriptors: Vec<SourceDescriptor>,
}

impl SourceRegistry {
    /// Validates and orders the descriptors. An empty list is accepted here;
    /// the pipeline reports it when a station is requested.
    pub fn new(mut descriptors: Vec<SourceDescriptor>) -> Result<Self, ConfigError> {
        let mut names = BTreeSet::new();
        let mut priorities = BTreeSet::new();

        for d in &descriptors {
            d.validate()?;
            if !names.insert(d.name.as_str()) {
                return Err(ConfigError::DuplicateName {
                    name: d.name.clone(),
                });
            }
            if !priorities.insert(d.priority) {
                return Err(ConfigError::DuplicatePriority {
                    priority: d.priority,
                });
            }
        }

        descriptors.sort_by_key(|d| d.priority);
        Ok(Self { descriptors })
    }

    pub fn is_empty(&self) -> bool {
        self.descriptors.is_empty()
    }

    pub fn len(&self) -> usize {
        self.descriptors.len()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, SourceDescriptor> {
        self.descriptors.iter()
    }

    pub fn get(&self, name: &str) -> Option<&SourceDescriptor> {
        self.descriptors.iter().find(|d| d.name == name)
    }

    /// Candidates for `station_id` in the order they should be tried.
    ///
    /// Lazy and side-effect free: cloning the iterator restarts the sequence
    /// from the same position.
    pub fn candidates<'r>(
        &'r self,
        station_id: &'r str,
        demotions: &'r Demotions,
    ) -> impl Iterator<Item = Candidate<'r>> + Clone + 'r {
        let preferred = self
            .descriptors
            .iter()
            .filter(move |d| !demotions.is_demoted(&d.name));
        let demoted = self
            .descriptors
            .iter()
            .filter(move |d| demotions.is_demoted(&d.name));

        preferred.chain(demoted).map(move |descriptor| Candidate {
            descriptor,
            url: descriptor.render_url(station_id),
        })
    }
}

/// Registry of [`default_descriptors`].
pub fn default_registry() -> Result<SourceRegistry, ConfigError> {
    SourceRegistry::new(default_descriptors())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn descriptor(name: &str, priority: u32) -> SourceDescriptor {
        SourceDescriptor {
            name: name.to_string(),
            url_template: format!("https://{}.test/items?STATION_NUMBER={{station_id}}", name),
            shape: ShapeTag::JsonFeatureCollection,
            priority,
        }
    }

    fn names(registry: &SourceRegistry, demotions: &Demotions) -> Vec<String> {
        registry
            .candidates("05BH004", demotions)
            .map(|c| c.descriptor.name.clone())
            .collect()
    }

    #[test]
    fn test_default_registry_is_valid_and_ordered() {
        let registry = default_registry().unwrap();
        assert_eq!(registry.len(), 3);
        let priorities: Vec<u32> = registry.iter().map(|d| d.priority).collect();
        assert_eq!(priorities, vec![10, 20, 90]);
        assert_eq!(registry.get("wateroffice-csv").unwrap().shape, ShapeTag::CsvLegacy);
    }

    #[test]
    fn test_candidates_follow_priority_not_declaration_order() {
        let registry =
            SourceRegistry::new(vec![descriptor("c", 30), descriptor("a", 10), descriptor("b", 20)])
                .unwrap();
        assert_eq!(names(&registry, &Demotions::new()), vec!["a", "b", "c"]);
    }

    #[test]
    fn test_candidates_are_deterministic_and_restartable() {
        let registry = default_registry().unwrap();
        let demotions = Demotions::new();
        let iter = registry.candidates("05BH004", &demotions);
        let first: Vec<_> = iter.clone().collect();
        let second: Vec<_> = iter.collect();
        assert_eq!(first, second);
        assert_eq!(names(&registry, &demotions), names(&registry, &demotions));
    }

    #[test]
    fn test_candidate_urls_are_rendered() {
        let registry = default_registry().unwrap();
        let demotions = Demotions::new();
        let first = registry.candidates("05BH004", &demotions).next().unwrap();
        assert!(first.url.contains("STATION_NUMBER=05BH004"));
        assert!(!first.url.contains(STATION_PLACEHOLDER));
    }

    #[test]
    fn test_demoted_sources_come_last_in_priority_order() {
        let registry = SourceRegistry::new(vec![
            descriptor("a", 10),
            descriptor("b", 20),
            descriptor("c", 30),
            descriptor("d", 40),
        ])
        .unwrap();
        let mut demotions = Demotions::new();
        demotions.demote("c");
        demotions.demote("a");
        assert_eq!(names(&registry, &demotions), vec!["b", "d", "a", "c"]);
        assert_eq!(demotions.iter().collect::<Vec<_>>(), vec!["a", "c"]);
    }

    #[test]
    fn test_empty_registry_is_allowed_and_yields_nothing() {
        let registry = SourceRegistry::new(Vec::new()).unwrap();
        assert!(registry.is_empty());
        assert_eq!(registry.candidates("05BH004", &Demotions::new()).count(), 0);
    }

    #[test]
    fn test_template_without_placeholder_is_rejected() {
        let mut d = descriptor("a", 10);
        d.url_template = "https://a.test/items".to_string();
        assert!(matches!(
            SourceRegistry::new(vec![d]),
            Err(ConfigError::MissingPlaceholder { .. })
        ));
    }

    #[test]
    fn test_unparseable_template_is_rejected() {
        let mut d = descriptor("a", 10);
        d.url_template = "not a url {station_id}".to_string();
        assert!(matches!(
            SourceRegistry::new(vec![d]),
            Err(ConfigError::InvalidUrl { .. })
        ));
    }

    #[test]
    fn test_duplicate_priority_is_rejected() {
        let result = SourceRegistry::new(vec![descriptor("a", 10), descriptor("b", 10)]);
        assert!(matches!(result, Err(ConfigError::DuplicatePriority { priority: 10 })));
    }

    #[test]
    fn test_duplicate_name_is_rejected() {
        let result = SourceRegistry::new(vec![descriptor("a", 10), descriptor("a", 20)]);
        assert!(matches!(result, Err(ConfigError::DuplicateName { .. })));
    }
}
