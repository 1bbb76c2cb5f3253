//! Dependency discovery.
//!
//! Walks the requests of a reassembled session in order and, for every
//! field that looks dynamic, searches the actions before it (most recent
//! first) for a place the value could have come from. Each hit becomes a
//! [`Target`] on the request, so replay can recompute the field instead
//! of sending the captured value.
//!
//! Every candidate source is resolved against the prefix before it is
//! accepted; only sources that reproduce the captured value survive.

use crate::classifier::is_likely_random;
use crate::context::{ContextSynthesizer, fixed_offset_pattern};
use chrono::{DateTime, Utc};
use erpeto_config::AnalyserConfig;
use erpeto_core::http::percent_decode;
use erpeto_core::json_path::string_leaves;
use erpeto_core::{
    Action, Cookie, DataSource, InputAction, JsonFieldTarget, QueryPart, RequestAction,
    ResponseAction, Target,
};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, info, warn};

/// Summary of one discovery run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisReport {
    pub analysed_at: DateTime<Utc>,

    /// Requests inspected
    pub requests: usize,

    /// Targets attached across all requests
    pub targets: usize,

    /// Candidate sources dropped because they failed to resolve
    pub unresolved_candidates: usize,
}

/// Discovers the dependencies between the actions of a session.
#[derive(Debug, Clone)]
pub struct Analyser {
    config: AnalyserConfig,
    synthesizer: ContextSynthesizer,
}

impl Analyser {
    pub fn new(config: &AnalyserConfig) -> Self {
        Self {
            config: config.clone(),
            synthesizer: ContextSynthesizer::from_config(config),
        }
    }

    /// Attach discovered targets to every request in `actions`.
    ///
    /// Each request only sees the actions strictly before it. Targets are
    /// appended; existing ones are kept.
    pub fn analyse(&self, actions: &mut [Action]) -> AnalysisReport {
        let mut report = AnalysisReport {
            analysed_at: Utc::now(),
            requests: 0,
            targets: 0,
            unresolved_candidates: 0,
        };

        for index in 0..actions.len() {
            let (prefix, rest) = actions.split_at_mut(index);
            let Action::Request(request) = &mut rest[0] else {
                continue;
            };

            let mut search = Search::new(self, prefix);
            let targets = search.targets_for(request);
            report.requests += 1;
            report.targets += targets.len();
            report.unresolved_candidates += search.unresolved;

            if !targets.is_empty() {
                debug!(
                    index,
                    url = %request.url,
                    targets = ?targets.iter().map(Target::label).collect::<Vec<_>>(),
                    "Dependencies found"
                );
            }
            request.targets.extend(targets);
        }

        info!(
            requests = report.requests,
            targets = report.targets,
            unresolved = report.unresolved_candidates,
            "Discovery finished"
        );
        report
    }

    /// Targets for `request`, searched in `prefix`, without attaching them.
    pub fn targets_for(&self, request: &RequestAction, prefix: &[Action]) -> Vec<Target> {
        Search::new(self, prefix).targets_for(request)
    }

    /// Most recent source in `prefix` that reproduces `needle`.
    pub fn find_source(&self, needle: &str, prefix: &[Action]) -> Option<DataSource> {
        Search::new(self, prefix).find(needle)
    }
}

/// Discovery state for a single request.
struct Search<'a> {
    analyser: &'a Analyser,
    prefix: &'a [Action],
    unresolved: usize,
}

impl<'a> Search<'a> {
    fn new(analyser: &'a Analyser, prefix: &'a [Action]) -> Self {
        Self {
            analyser,
            prefix,
            unresolved: 0,
        }
    }

    fn targets_for(&mut self, request: &RequestAction) -> Vec<Target> {
        let mut targets = Vec::new();

        for (key, value) in request.headers.iter() {
            if self.analyser.config.is_constant_header(key) || !is_likely_random(value) {
                continue;
            }
            if let Some(source) = self.find(value) {
                targets.push(Target::Header {
                    key: key.to_string(),
                    source,
                    captured: Some(value.to_string()),
                });
            }
        }

        for cookie in &request.cookies {
            if cookie.value.is_empty() || !is_likely_random(&cookie.value) {
                continue;
            }
            if let Some(source) = self.find(&cookie.value) {
                targets.push(Target::cookie(cookie.name.as_str(), source));
            }
        }

        if let Some(body) = request.body_text() {
            let target = match serde_json::from_str::<Value>(&body) {
                Ok(document) if document.is_object() || document.is_array() => {
                    self.json_target(document)
                }
                _ => self.query_target(&body),
            };
            targets.extend(target);
        }

        targets
    }

    /// One container target for every string leaf with a source.
    fn json_target(&mut self, template: Value) -> Option<Target> {
        let mut fields = Vec::new();
        for leaf in string_leaves(&template) {
            if leaf.value.is_empty() {
                continue;
            }
            if let Some(source) = self.find(&leaf.value) {
                fields.push(JsonFieldTarget {
                    path: leaf.path,
                    source,
                });
            }
        }
        (!fields.is_empty()).then_some(Target::JsonContainer { template, fields })
    }

    /// One container target for a form body with at least one bound part.
    fn query_target(&mut self, body: &str) -> Option<Target> {
        let pairs = parse_query_strict(body)?;
        let mut bound = false;
        let mut params = Vec::with_capacity(pairs.len());
        for (name, value) in pairs {
            let name = self.query_part(name, &mut bound);
            let value = self.query_part(value, &mut bound);
            params.push((name, value));
        }
        bound.then_some(Target::QueryString { params })
    }

    /// Random-looking parts search the whole prefix; other long parts are
    /// only looked up in the last few responses and inputs.
    fn query_part(&mut self, text: String, bound: &mut bool) -> QueryPart {
        let source = if is_likely_random(&text) {
            self.find(&text)
        } else if text.chars().count() > 3 {
            self.find_recent(&text)
        } else {
            None
        };
        match source {
            Some(source) => {
                *bound = true;
                QueryPart::Source(source)
            }
            None => QueryPart::Literal(text),
        }
    }

    fn find(&mut self, needle: &str) -> Option<DataSource> {
        self.search(needle, None)
    }

    fn find_recent(&mut self, needle: &str) -> Option<DataSource> {
        self.search(needle, Some(self.analyser.config.echo_lookback))
    }

    /// Backward search; `limit` bounds the number of responses and inputs
    /// inspected.
    fn search(&mut self, needle: &str, limit: Option<usize>) -> Option<DataSource> {
        let prefix = self.prefix;
        let mut inspected = 0;
        for (index, action) in prefix.iter().enumerate().rev() {
            if limit.is_some_and(|limit| inspected >= limit) {
                break;
            }
            let candidates = match action {
                Action::Response(response) => self.response_candidates(index, response, needle),
                Action::Input(input) => input_candidate(input, needle).into_iter().collect(),
                Action::Request(_) => continue,
            };
            inspected += 1;

            for candidate in candidates {
                if self.reproduces(&candidate, needle) {
                    return Some(candidate);
                }
            }
        }
        None
    }

    /// Sources in one response that may hold `needle`: the body first,
    /// then cookies and headers.
    fn response_candidates(
        &self,
        index: usize,
        response: &ResponseAction,
        needle: &str,
    ) -> Vec<DataSource> {
        let mut candidates = Vec::new();

        if let Some(body) = response.body_text()
            && body.contains(needle)
        {
            match self.analyser.synthesizer.synthesize(&body, needle) {
                Ok(pattern) => candidates.push(DataSource::body(index).regex(pattern, needle)),
                Err(e) => debug!(index, error = %e, "Body holds the value but cannot be localized"),
            }
        }

        for (key, value) in response.headers.iter() {
            if key.eq_ignore_ascii_case("set-cookie") {
                if !percent_decode(value).contains(needle) {
                    continue;
                }
                for cookie in Cookie::parse_set_cookie(value) {
                    if let Some(pattern) = cookie_pattern(&cookie.value, needle) {
                        candidates.push(DataSource::cookie(index, cookie.name, pattern));
                    }
                }
            } else if value == needle {
                candidates.push(DataSource::header(index, key));
            } else if let Some((start, end)) = char_span(value, needle) {
                candidates.push(DataSource::header(index, key).substr(start, end));
            }
        }

        candidates
    }

    fn reproduces(&mut self, candidate: &DataSource, needle: &str) -> bool {
        match candidate.resolve(self.prefix) {
            Ok(value) => value.as_deref() == Some(needle),
            Err(e) => {
                self.unresolved += 1;
                warn!(source = %candidate, error = %e, "Candidate source does not resolve");
                false
            }
        }
    }
}

/// The user input as a source, sliced to the part equal to `needle`.
fn input_candidate(input: &InputAction, needle: &str) -> Option<DataSource> {
    let (start, end) = char_span(&input.text, needle)?;
    Some(DataSource::input(input.text.as_str()).substr(start, end))
}

fn cookie_pattern(value: &str, needle: &str) -> Option<String> {
    let start = value.find(needle)?;
    Some(fixed_offset_pattern(
        value[..start].chars().count(),
        needle.chars().count(),
        value.chars().count(),
    ))
}

/// Character span of the first occurrence of `needle` in `haystack`.
fn char_span(haystack: &str, needle: &str) -> Option<(i64, i64)> {
    let start = haystack.find(needle)?;
    let start = haystack[..start].chars().count() as i64;
    Some((start, start + needle.chars().count() as i64))
}

/// Decode a form body, requiring every `&`-separated segment to be a
/// non-empty `name=value` pair.
fn parse_query_strict(body: &str) -> Option<Vec<(String, String)>> {
    if body
        .split('&')
        .any(|segment| segment.is_empty() || !segment.contains('='))
    {
        return None;
    }
    Some(form_urlencoded::parse(body.as_bytes()).into_owned().collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use erpeto_core::json_path;

    fn analyser() -> Analyser {
        Analyser::new(&AnalyserConfig::default())
    }

    fn response_with_body(body: &str) -> Action {
        Action::Response(ResponseAction {
            status: Some(200),
            body: Some(body.as_bytes().to_vec()),
            ..ResponseAction::default()
        })
    }

    fn response_with_header(key: &str, value: &str) -> Action {
        let mut response = ResponseAction::default();
        response.headers.insert(key, value);
        Action::Response(response)
    }

    fn post(body: &str) -> RequestAction {
        let mut request = RequestAction::new("POST", "https://app.test/api");
        request.body = Some(body.as_bytes().to_vec());
        request
    }

    #[test]
    fn strict_query_parsing() {
        assert_eq!(
            parse_query_strict("a=1&b=x%20y&c="),
            Some(vec![
                ("a".into(), "1".into()),
                ("b".into(), "x y".into()),
                ("c".into(), String::new()),
            ])
        );
        assert_eq!(parse_query_strict(""), None);
        assert_eq!(parse_query_strict("a=1&&b=2"), None);
        assert_eq!(parse_query_strict("a=1&flag"), None);
    }

    #[test]
    fn header_is_bound_to_a_response_header() {
        let prefix = vec![response_with_header("X-Request-Token", "q8w7e6r5t4y3")];
        let mut request = RequestAction::new("GET", "https://app.test/");
        request.headers.insert("X-Token", "q8w7e6r5t4y3");

        let targets = analyser().targets_for(&request, &prefix);
        assert_eq!(
            targets,
            vec![Target::Header {
                key: "X-Token".into(),
                source: DataSource::header(0, "X-Request-Token"),
                captured: Some("q8w7e6r5t4y3".into()),
            }]
        );
    }

    #[test]
    fn header_substring_becomes_a_slice() {
        let prefix = vec![response_with_header("Location", "/next?code=q8w7e6r5t4y3")];
        let mut request = RequestAction::new("GET", "https://app.test/");
        request.headers.insert("X-Code", "q8w7e6r5t4y3");

        let targets = analyser().targets_for(&request, &prefix);
        assert_eq!(
            targets,
            vec![Target::Header {
                key: "X-Code".into(),
                source: DataSource::header(0, "Location").substr(11, 23),
                captured: Some("q8w7e6r5t4y3".into()),
            }]
        );
    }

    #[test]
    fn constant_and_non_random_headers_are_skipped() {
        let prefix = vec![response_with_header("X-Echo", "q8w7e6r5t4y3")];
        let mut request = RequestAction::new("GET", "https://app.test/");
        request.headers.insert("User-Agent", "q8w7e6r5t4y3");
        request.headers.insert("Sec-CH-UA-Platform", "q8w7e6r5t4y3");
        request.headers.insert("X-Mode", "aaaaaaaa");
        assert!(analyser().targets_for(&request, &prefix).is_empty());
    }

    #[test]
    fn most_recent_source_wins() {
        let prefix = vec![
            response_with_header("X-Token", "q8w7e6r5t4y3"),
            response_with_header("X-Token-Again", "q8w7e6r5t4y3"),
        ];
        let source = analyser().find_source("q8w7e6r5t4y3", &prefix).unwrap();
        assert_eq!(source, DataSource::header(1, "X-Token-Again"));
    }

    #[test]
    fn body_source_reproduces_the_value() {
        let body = r#"<html><body><form><input type="hidden" name="csrf" value="q8w7e6r5t4y3"></form></body></html>"#;
        let prefix = vec![response_with_body(body)];
        let source = analyser().find_source("q8w7e6r5t4y3", &prefix).unwrap();
        assert!(matches!(source, DataSource::Regex { .. }));
        assert_eq!(source.action_index(), Some(0));
        assert_eq!(source.resolve(prefix.as_slice()).unwrap().as_deref(), Some("q8w7e6r5t4y3"));
    }

    #[test]
    fn input_source_is_sliced() {
        let prefix = vec![Action::Input(InputAction::new(
            "hello q8w7e6r5t4y3",
            "input#q",
            1.0,
        ))];
        let source = analyser().find_source("q8w7e6r5t4y3", &prefix).unwrap();
        assert_eq!(source, DataSource::input("hello q8w7e6r5t4y3").substr(6, 18));
    }

    #[test]
    fn requests_are_not_sources() {
        let mut earlier = RequestAction::new("GET", "https://app.test/");
        earlier.headers.insert("X-Token", "q8w7e6r5t4y3");
        let prefix = vec![Action::Request(earlier)];
        assert_eq!(analyser().find_source("q8w7e6r5t4y3", &prefix), None);
    }

    #[test]
    fn json_leaves_share_one_container() {
        let prefix = vec![response_with_header("X-Nonce", "n0n5e1x9z8")];
        let request = post(r#"{"user":"bob","auth":{"nonce":"n0n5e1x9z8"},"tags":[""]}"#);

        let targets = analyser().targets_for(&request, &prefix);
        assert_eq!(targets.len(), 1);
        let Target::JsonContainer { template, fields } = &targets[0] else {
            panic!("expected a JSON container, got {targets:?}");
        };
        assert_eq!(template["user"], "bob");
        assert_eq!(
            fields,
            &vec![JsonFieldTarget {
                path: json_path!["auth", "nonce"],
                source: DataSource::header(0, "X-Nonce"),
            }]
        );
    }

    #[test]
    fn json_without_sources_has_no_target() {
        let request = post(r#"{"user":"bob"}"#);
        assert!(analyser().targets_for(&request, &[]).is_empty());
    }

    #[test]
    fn query_string_binds_random_parts() {
        let prefix = vec![response_with_header("X-Nonce", "n0n5e1x9z8")];
        let request = post("user=bob&nonce=n0n5e1x9z8");

        let targets = analyser().targets_for(&request, &prefix);
        assert_eq!(
            targets,
            vec![Target::QueryString {
                params: vec![
                    (QueryPart::Literal("user".into()), QueryPart::Literal("bob".into())),
                    (
                        QueryPart::Literal("nonce".into()),
                        QueryPart::Source(DataSource::header(0, "X-Nonce")),
                    ),
                ],
            }]
        );
    }

    #[test]
    fn echoed_query_value_is_found_within_lookback() {
        let prefix = vec![
            response_with_header("X-Page", "aaaa-bbbb"),
            response_with_header("X-Other", "unrelated"),
        ];
        let request = post("p=aaaa-bbbb");
        let targets = analyser().targets_for(&request, &prefix);
        assert_eq!(targets.len(), 1);

        let narrow = Analyser::new(&AnalyserConfig {
            echo_lookback: 1,
            ..AnalyserConfig::default()
        });
        assert!(narrow.targets_for(&request, &prefix).is_empty());
    }

    #[test]
    fn short_query_parts_are_not_searched() {
        let prefix = vec![response_with_header("X-Flag", "on")];
        let request = post("f=on");
        assert!(analyser().targets_for(&request, &prefix).is_empty());
    }

    #[test]
    fn dangling_candidate_is_not_accepted() {
        let analyser = analyser();
        let mut search = Search::new(&analyser, &[]);
        assert!(!search.reproduces(&DataSource::body(3), "x"));
        assert_eq!(search.unresolved, 1);
    }

    #[test]
    fn analyse_attaches_targets_in_place() {
        let mut request = RequestAction::new("GET", "https://app.test/data");
        request.headers.insert("X-Token", "q8w7e6r5t4y3");
        let mut actions = vec![
            Action::Request(RequestAction::new("GET", "https://app.test/")),
            response_with_header("X-Token", "q8w7e6r5t4y3"),
            Action::Request(request),
        ];

        let report = analyser().analyse(&mut actions);
        assert_eq!(report.requests, 2);
        assert_eq!(report.targets, 1);
        assert!(actions[0].as_request().unwrap().targets.is_empty());
        assert_eq!(actions[2].as_request().unwrap().targets.len(), 1);
    }
}
