use std::collections::{HashMap, HashSet};

use url::Url;

use crate::synopsis::Synopsis;

/// Sentinel location that never attributes attention.
pub const NOOP_LOCATION: &str = "about:blank";

/// Two-part public suffixes the registrable-domain reduction knows about.
/// A full public-suffix list would be overkill for attention keys; these
/// cover the common cases where two labels are not enough.
const TWO_PART_SUFFIXES: &[&str] = &[
    "co.uk", "org.uk", "ac.uk", "co.jp", "co.nz", "co.in", "com.au", "com.br",
];

/// Outcome of feeding one navigation event to the tracker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VisitOutcome {
    /// Duration was attributed to the previous location's publisher.
    Attributed {
        publisher_key: String,
        duration_ms: u64,
        revisited: bool,
    },
    /// The previous location resolved to no publisher; nothing recorded.
    Ignored,
}

/// Converts a stream of navigation events into per-publisher duration
/// deltas on the synopsis.
///
/// The tracker only decides *who* gets the elapsed time and whether the
/// completed visit was a revisit. Minimum-duration policy is an
/// eligibility gate applied downstream by the normalizer, never here.
#[derive(Debug, Default)]
pub struct VisitTracker {
    last_timestamp_ms: Option<u64>,
    /// Tab ids already seen per (publisher_key, url) this session. Not
    /// persisted — a fresh session starts with a clean revisit slate.
    sessions: HashMap<(String, String), HashSet<u32>>,
}

impl VisitTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Attribute the time since the previous event to the publisher of
    /// `previous_url`, then advance the tracker clock to `timestamp_ms`.
    ///
    /// Duplicate events (`current_url == previous_url`) are dropped without
    /// touching the clock, so the eventual real navigation still carries
    /// the full dwell time. Clock skew (a timestamp before the previous
    /// one) clamps the delta to zero rather than going negative. Locations
    /// that resolve to no publisher advance the clock silently.
    pub fn record_visit(
        &mut self,
        synopsis: &mut Synopsis,
        current_url: &str,
        previous_url: &str,
        timestamp_ms: u64,
        tab_id: u32,
    ) -> VisitOutcome {
        if current_url == previous_url {
            return VisitOutcome::Ignored;
        }

        let last = self.last_timestamp_ms.replace(timestamp_ms);
        let Some(publisher_key) = resolve_publisher_key(previous_url) else {
            return VisitOutcome::Ignored;
        };

        let duration_ms = last.map_or(0, |prev| timestamp_ms.saturating_sub(prev));
        let revisited = !self
            .sessions
            .entry((publisher_key.clone(), previous_url.to_string()))
            .or_default()
            .insert(tab_id);

        synopsis.upsert(&publisher_key, duration_ms, revisited);

        VisitOutcome::Attributed {
            publisher_key,
            duration_ms,
            revisited,
        }
    }

    /// Forget all per-session state (browsing-data clear).
    pub fn reset(&mut self) {
        self.sessions.clear();
        self.last_timestamp_ms = None;
    }
}

/// Resolve a location to its publisher key.
///
/// Only http(s) content locations qualify; internal schemes and the no-op
/// sentinel resolve to no publisher. Hosts reduce to their registrable
/// domain, except known embedded-media hosts which map to
/// channel-qualified keys.
pub fn resolve_publisher_key(location: &str) -> Option<String> {
    if location == NOOP_LOCATION {
        return None;
    }
    let url = Url::parse(location).ok()?;
    if !matches!(url.scheme(), "http" | "https") {
        return None;
    }
    let host_lc = url.host_str()?.to_ascii_lowercase();
    let host = host_lc.strip_prefix("www.").unwrap_or(host_lc.as_str());
    if host.is_empty() {
        return None;
    }
    if let Some(media) = media_key(host, url.path()) {
        return Some(media);
    }
    Some(base_domain(host))
}

/// Channel-qualified keys for embedded media hosts, so attention lands on
/// the channel rather than the platform.
fn media_key(host: &str, path: &str) -> Option<String> {
    match host {
        "youtube.com" => {
            let rest = path.strip_prefix("/channel/")?;
            let id = rest.split('/').next().filter(|s| !s.is_empty())?;
            Some(format!("youtube#channel:{id}"))
        }
        "twitch.tv" => {
            let name = path
                .trim_start_matches('/')
                .split('/')
                .next()
                .filter(|s| !s.is_empty())?;
            Some(format!("twitch#author:{name}"))
        }
        _ => None,
    }
}

/// Naive registrable-domain reduction: last two host labels, or three when
/// the trailing pair is a known two-part suffix. IP literals pass through.
fn base_domain(host: &str) -> String {
    if host.parse::<std::net::IpAddr>().is_ok() {
        return host.to_string();
    }
    let labels: Vec<&str> = host.split('.').collect();
    if labels.len() <= 2 {
        return host.to_string();
    }
    let last_two = labels[labels.len() - 2..].join(".");
    let take = if TWO_PART_SUFFIXES.contains(&last_two.as_str()) {
        3
    } else {
        2
    };
    labels[labels.len() - take.min(labels.len())..].join(".")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolve_publisher_key() {
        let cases = [
            ("https://www.example.com/page", Some("example.com")),
            ("http://news.bbc.co.uk/story", Some("bbc.co.uk")),
            ("https://deep.sub.example.org/", Some("example.org")),
            ("https://127.0.0.1/admin", Some("127.0.0.1")),
            (
                "https://www.youtube.com/channel/UC123/videos",
                Some("youtube#channel:UC123"),
            ),
            ("https://twitch.tv/somestreamer", Some("twitch#author:somestreamer")),
            ("https://youtube.com/watch?v=abc", Some("youtube.com")),
            ("about:blank", None),
            ("chrome://settings", None),
            ("file:///tmp/x.html", None),
            ("not a url", None),
        ];
        for (input, expected) in cases {
            assert_eq!(
                resolve_publisher_key(input).as_deref(),
                expected,
                "input: {input}"
            );
        }
    }

    #[test]
    fn test_first_event_attributes_zero_duration() {
        let mut syn = Synopsis::new();
        let mut tracker = VisitTracker::new();

        let outcome = tracker.record_visit(
            &mut syn,
            "https://next.com/",
            "https://example.com/",
            1_000,
            1,
        );
        assert_eq!(
            outcome,
            VisitOutcome::Attributed {
                publisher_key: "example.com".to_string(),
                duration_ms: 0,
                revisited: false,
            }
        );
        assert_eq!(syn.get("example.com").unwrap().visits, 1);
    }

    #[test]
    fn test_duration_attributed_to_previous_publisher() {
        let mut syn = Synopsis::new();
        let mut tracker = VisitTracker::new();

        tracker.record_visit(&mut syn, "https://a.com/", NOOP_LOCATION, 0, 1);
        let outcome =
            tracker.record_visit(&mut syn, "https://b.com/", "https://a.com/", 10_000, 1);

        match outcome {
            VisitOutcome::Attributed {
                publisher_key,
                duration_ms,
                ..
            } => {
                assert_eq!(publisher_key, "a.com");
                assert_eq!(duration_ms, 10_000);
            }
            other => panic!("expected attribution, got {other:?}"),
        }
        assert_eq!(syn.get("a.com").unwrap().duration_ms, 10_000);
    }

    #[test]
    fn test_revisit_same_tab_accumulates_duration_not_visits() {
        let mut syn = Synopsis::new();
        let mut tracker = VisitTracker::new();

        // a.com → b.com → a.com → c.com, all in tab 1.
        tracker.record_visit(&mut syn, "https://b.com/", "https://a.com/", 0, 1);
        tracker.record_visit(&mut syn, "https://a.com/", "https://b.com/", 10_000, 1);
        let outcome =
            tracker.record_visit(&mut syn, "https://c.com/", "https://a.com/", 25_000, 1);

        assert_eq!(
            outcome,
            VisitOutcome::Attributed {
                publisher_key: "a.com".to_string(),
                duration_ms: 15_000,
                revisited: true,
            }
        );
        let rec = syn.get("a.com").unwrap();
        assert_eq!(rec.visits, 1, "revisit must not double count");
        assert_eq!(rec.duration_ms, 15_000, "duration accumulates on revisit");
    }

    #[test]
    fn test_same_page_in_other_tab_is_new_visit() {
        let mut syn = Synopsis::new();
        let mut tracker = VisitTracker::new();

        tracker.record_visit(&mut syn, "https://b.com/", "https://a.com/", 0, 1);
        let outcome = tracker.record_visit(&mut syn, "https://b.com/", "https://a.com/", 5_000, 2);

        match outcome {
            VisitOutcome::Attributed { revisited, .. } => assert!(!revisited),
            other => panic!("expected attribution, got {other:?}"),
        }
        assert_eq!(syn.get("a.com").unwrap().visits, 2);
    }

    #[test]
    fn test_negative_delta_clamps_to_zero() {
        let mut syn = Synopsis::new();
        let mut tracker = VisitTracker::new();

        tracker.record_visit(&mut syn, "https://b.com/", "https://a.com/", 50_000, 1);
        // Clock went backwards.
        let outcome =
            tracker.record_visit(&mut syn, "https://c.com/", "https://b.com/", 40_000, 1);

        match outcome {
            VisitOutcome::Attributed { duration_ms, .. } => assert_eq!(duration_ms, 0),
            other => panic!("expected attribution, got {other:?}"),
        }
    }

    #[test]
    fn test_duplicate_event_keeps_clock() {
        let mut syn = Synopsis::new();
        let mut tracker = VisitTracker::new();

        tracker.record_visit(&mut syn, "https://a.com/", NOOP_LOCATION, 0, 1);
        // Same location reported again — dropped, clock untouched.
        let dup = tracker.record_visit(&mut syn, "https://a.com/", "https://a.com/", 7_000, 1);
        assert_eq!(dup, VisitOutcome::Ignored);

        let outcome =
            tracker.record_visit(&mut syn, "https://b.com/", "https://a.com/", 12_000, 1);
        match outcome {
            VisitOutcome::Attributed { duration_ms, .. } => {
                assert_eq!(duration_ms, 12_000, "dwell spans the duplicate event")
            }
            other => panic!("expected attribution, got {other:?}"),
        }
    }

    #[test]
    fn test_unresolvable_previous_is_silent_noop() {
        let mut syn = Synopsis::new();
        let mut tracker = VisitTracker::new();

        let outcome =
            tracker.record_visit(&mut syn, "https://a.com/", "chrome://newtab", 1_000, 1);
        assert_eq!(outcome, VisitOutcome::Ignored);
        assert!(syn.is_empty());
    }

    #[test]
    fn test_reset_clears_revisit_state() {
        let mut syn = Synopsis::new();
        let mut tracker = VisitTracker::new();

        tracker.record_visit(&mut syn, "https://b.com/", "https://a.com/", 0, 1);
        tracker.reset();
        tracker.record_visit(&mut syn, "https://b.com/", "https://a.com/", 5_000, 1);

        assert_eq!(syn.get("a.com").unwrap().visits, 2, "fresh session, fresh visit");
    }
}
