//! Paged Resource Iterator
//!
//! Turns one paginated VPC list operation into a flat stream of items.
//! Each page response carries a `next.href` URL whose `start` query
//! parameter is the cursor for the following request; the walk stops when
//! the response has no `next` or the `next` has no `href`.
//!
//! Pages are fetched lazily: the next request is only issued once every
//! item of the current page has been pulled from the stream.

use super::QueryParams;
use anyhow::Result;
use futures::future::BoxFuture;
use futures::stream::{self, Stream, TryStreamExt};
use serde_json::Value;
use thiserror::Error;

/// Fields every VPC list response may carry besides the resource array
pub const RESERVED_KEYS: &[&str] = &["limit", "first", "total_count", "next"];

/// Errors raised by the pager itself (transport errors pass through untouched)
#[derive(Debug, Error, PartialEq, Eq)]
pub enum PagerError {
    /// No non-reserved field in the response to read items from
    #[error("No array key found in {fields:?}")]
    NoArrayKey { fields: Vec<String> },

    /// Strict detection found more than one candidate field
    #[error("Ambiguous array key, candidates {candidates:?} in {fields:?}")]
    AmbiguousArrayKey {
        candidates: Vec<String>,
        fields: Vec<String>,
    },
}

/// Strategy for finding the resource array in a page response
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum KeyDetector {
    /// Take the first non-reserved field (in sorted field order)
    #[default]
    FirstRemaining,
    /// Require exactly one non-reserved field
    ExactlyOne,
}

impl KeyDetector {
    /// Pick the array key out of a page response
    pub fn detect(&self, response: &Value) -> Result<String, PagerError> {
        let mut fields: Vec<String> = response
            .as_object()
            .map(|map| map.keys().cloned().collect())
            .unwrap_or_default();
        fields.sort();

        let candidates: Vec<&String> = fields
            .iter()
            .filter(|k| !RESERVED_KEYS.contains(&k.as_str()))
            .collect();

        match (self, candidates.as_slice()) {
            (_, []) => Err(PagerError::NoArrayKey {
                fields: fields.clone(),
            }),
            (_, [only]) => Ok((*only).clone()),
            (KeyDetector::FirstRemaining, [first, ..]) => {
                tracing::warn!(
                    "Several candidate array keys {:?}, using {}",
                    candidates,
                    first
                );
                Ok((*first).clone())
            }
            (KeyDetector::ExactlyOne, _) => Err(PagerError::AmbiguousArrayKey {
                candidates: candidates.iter().map(|c| (*c).clone()).collect(),
                fields: fields.clone(),
            }),
        }
    }
}

/// Which response field holds the items
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ArrayKey {
    /// Caller knows the field name
    Named(String),
    /// Detect from the first page, then reuse for the rest of the walk
    Detect(KeyDetector),
}

impl Default for ArrayKey {
    fn default() -> Self {
        ArrayKey::Detect(KeyDetector::default())
    }
}

impl From<&str> for ArrayKey {
    fn from(key: &str) -> Self {
        ArrayKey::Named(key.to_string())
    }
}

impl From<String> for ArrayKey {
    fn from(key: String) -> Self {
        ArrayKey::Named(key)
    }
}

/// A bound list operation: one call fetches one page
pub trait ListOperation: Send + Sync {
    fn call<'a>(
        &'a self,
        start: Option<&'a str>,
        params: &'a QueryParams,
    ) -> BoxFuture<'a, Result<Value>>;
}

impl<T: ListOperation + ?Sized> ListOperation for &T {
    fn call<'a>(
        &'a self,
        start: Option<&'a str>,
        params: &'a QueryParams,
    ) -> BoxFuture<'a, Result<Value>> {
        (**self).call(start, params)
    }
}

/// What to do after a page
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Continuation {
    /// Final page
    Done,
    /// Fetch another page with this cursor (`None` when the href had no `start`)
    Next(Option<String>),
}

/// Read the continuation out of a page response
pub fn continuation(response: &Value) -> Continuation {
    let Some(next) = response.get("next") else {
        return Continuation::Done;
    };

    match next.get("href").and_then(|v| v.as_str()) {
        Some(href) if !href.is_empty() => Continuation::Next(start_from_href(href)),
        _ => {
            tracing::debug!("'next' without 'href', treating as last page");
            Continuation::Done
        }
    }
}

/// Extract the `start` query parameter from an absolute or relative href.
/// When `start` is repeated the last value wins.
pub fn start_from_href(href: &str) -> Option<String> {
    let query = href.split_once('?')?.1;
    let query = query.split('#').next().unwrap_or(query);

    url::form_urlencoded::parse(query.as_bytes())
        .filter(|(k, _)| k == "start")
        .last()
        .map(|(_, v)| v.into_owned())
}

struct Walk<O> {
    operation: O,
    params: QueryParams,
    key: ArrayKey,
    cursor: Option<String>,
    finished: bool,
    pages: usize,
}

async fn next_page<O: ListOperation>(
    mut walk: Walk<O>,
) -> Result<Option<(Vec<Value>, Walk<O>)>> {
    if walk.finished {
        return Ok(None);
    }

    let mut response = walk
        .operation
        .call(walk.cursor.as_deref(), &walk.params)
        .await?;
    walk.pages += 1;

    let key = match &walk.key {
        ArrayKey::Named(key) => key.clone(),
        ArrayKey::Detect(detector) => {
            let key = detector.detect(&response)?;
            tracing::debug!("Detected array key '{}'", key);
            walk.key = ArrayKey::Named(key.clone());
            key
        }
    };

    match continuation(&response) {
        Continuation::Done => walk.finished = true,
        Continuation::Next(cursor) => walk.cursor = cursor,
    }

    let items = match response.get_mut(&key).map(Value::take) {
        Some(Value::Array(items)) => items,
        None | Some(Value::Null) => Vec::new(),
        Some(_) => {
            tracing::warn!("Field '{}' is not an array, skipping page", key);
            Vec::new()
        }
    };

    tracing::debug!(
        "Page {} of '{}': {} items, more={}",
        walk.pages,
        key,
        items.len(),
        !walk.finished
    );

    Ok(Some((items, walk)))
}

/// Walk every page of `operation` and yield the items one by one.
///
/// A `start` entry in `params` resumes the walk from that cursor; it is only
/// used for the first request.
pub fn each_resource<'a, O>(
    operation: O,
    array_key: ArrayKey,
    mut params: QueryParams,
) -> impl Stream<Item = Result<Value>> + Send + 'a
where
    O: ListOperation + 'a,
{
    let cursor = params.remove("start");
    let walk = Walk {
        operation,
        params,
        key: array_key,
        cursor,
        finished: false,
        pages: 0,
    };

    stream::try_unfold(walk, next_page)
        .map_ok(|items| stream::iter(items.into_iter().map(Ok::<Value, anyhow::Error>)))
        .try_flatten()
}

/// Drain an item stream into a `Vec`, stopping at the first error
pub async fn collect_all<S>(items: S) -> Result<Vec<Value>>
where
    S: Stream<Item = Result<Value>>,
{
    items.try_collect().await
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::StreamExt;
    use serde_json::json;
    use std::sync::Mutex;
    use tokio_test::block_on;

    /// Serves canned pages in order and records the cursor of each call
    struct FakePages {
        pages: Vec<Value>,
        fail_at: Option<usize>,
        calls: Mutex<Vec<(Option<String>, QueryParams)>>,
    }

    impl FakePages {
        fn new(pages: Vec<Value>) -> Self {
            Self {
                pages,
                fail_at: None,
                calls: Mutex::new(Vec::new()),
            }
        }

        fn cursors(&self) -> Vec<Option<String>> {
            self.calls
                .lock()
                .unwrap()
                .iter()
                .map(|(c, _)| c.clone())
                .collect()
        }
    }

    impl ListOperation for FakePages {
        fn call<'a>(
            &'a self,
            start: Option<&'a str>,
            params: &'a QueryParams,
        ) -> BoxFuture<'a, Result<Value>> {
            Box::pin(async move {
                let mut calls = self.calls.lock().unwrap();
                let index = calls.len();
                calls.push((start.map(str::to_string), params.clone()));
                if self.fail_at == Some(index) {
                    return Err(anyhow::anyhow!("API request failed: 500"));
                }
                Ok(self.pages[index].clone())
            })
        }
    }

    fn next(href: &str) -> Value {
        json!({ "href": href })
    }

    fn run(op: &FakePages, key: ArrayKey, params: QueryParams) -> Result<Vec<Value>> {
        block_on(collect_all(each_resource(op, key, params)))
    }

    #[test]
    fn test_walks_cursor_chain_in_order() {
        let op = FakePages::new(vec![
            json!({"limit": 2, "instances": [1, 2], "next": next("https://x/v1/instances?limit=2&start=c2")}),
            json!({"limit": 2, "instances": [3, 4], "next": next("https://x/v1/instances?start=c3&limit=2")}),
            json!({"limit": 2, "instances": [5]}),
        ]);

        let items = run(&op, ArrayKey::default(), QueryParams::new()).unwrap();

        assert_eq!(items, vec![json!(1), json!(2), json!(3), json!(4), json!(5)]);
        assert_eq!(
            op.cursors(),
            vec![None, Some("c2".to_string()), Some("c3".to_string())]
        );
    }

    #[test]
    fn test_href_without_start_fetches_with_no_cursor() {
        let op = FakePages::new(vec![
            json!({"items": ["a"], "next": next("https://x/v1/items?limit=1")}),
            json!({"items": ["b"]}),
        ]);

        let items = run(&op, ArrayKey::default(), QueryParams::new()).unwrap();

        assert_eq!(items, vec![json!("a"), json!("b")]);
        assert_eq!(op.cursors(), vec![None, None]);
    }

    #[test]
    fn test_next_without_href_stops_after_page() {
        let op = FakePages::new(vec![
            json!({"items": ["a", "b"], "next": {}}),
            json!({"items": ["never"]}),
        ]);

        let items = run(&op, ArrayKey::default(), QueryParams::new()).unwrap();

        assert_eq!(items, vec![json!("a"), json!("b")]);
        assert_eq!(op.cursors().len(), 1);
    }

    #[test]
    fn test_detects_single_remaining_key() {
        let page = json!({
            "limit": 50,
            "first": {"href": "https://x/v1/widgets?limit=50"},
            "next": {"href": "https://x/v1/widgets?start=abc"},
            "total_count": 3,
            "widgets": []
        });
        assert_eq!(KeyDetector::FirstRemaining.detect(&page).unwrap(), "widgets");
        assert_eq!(KeyDetector::ExactlyOne.detect(&page).unwrap(), "widgets");
    }

    #[test]
    fn test_detection_fails_without_candidates() {
        let page = json!({
            "limit": 50,
            "first": {"href": "https://x/v1/widgets"},
            "next": {"href": "https://x/v1/widgets?start=abc"},
            "total_count": 0
        });

        let err = KeyDetector::FirstRemaining.detect(&page).unwrap_err();
        assert_eq!(
            err,
            PagerError::NoArrayKey {
                fields: vec![
                    "first".to_string(),
                    "limit".to_string(),
                    "next".to_string(),
                    "total_count".to_string()
                ]
            }
        );
        assert!(err.to_string().contains("total_count"));
    }

    #[test]
    fn test_detection_failure_surfaces_through_stream() {
        let op = FakePages::new(vec![json!({"limit": 1, "total_count": 0})]);

        let err = run(&op, ArrayKey::default(), QueryParams::new()).unwrap_err();

        assert!(matches!(
            err.downcast_ref::<PagerError>(),
            Some(PagerError::NoArrayKey { .. })
        ));
    }

    #[test]
    fn test_first_remaining_tolerates_extra_fields() {
        let page = json!({"limit": 1, "instances": [], "zeta": 1});
        assert_eq!(KeyDetector::FirstRemaining.detect(&page).unwrap(), "instances");
    }

    #[test]
    fn test_exactly_one_rejects_extra_fields() {
        let page = json!({"limit": 1, "instances": [], "zeta": 1});
        let err = KeyDetector::ExactlyOne.detect(&page).unwrap_err();
        assert!(matches!(
            err,
            PagerError::AmbiguousArrayKey { ref candidates, .. } if candidates.len() == 2
        ));
    }

    #[test]
    fn test_named_key_skips_detection() {
        let op = FakePages::new(vec![json!({"instances": [1], "extra": [9, 9]})]);

        let items = run(&op, ArrayKey::from("extra"), QueryParams::new()).unwrap();

        assert_eq!(items, vec![json!(9), json!(9)]);
    }

    #[test]
    fn test_detected_key_reused_on_later_pages() {
        let op = FakePages::new(vec![
            json!({"instances": [1], "next": next("/v1/instances?start=p2")}),
            // "aaa" would win detection on this page; the first page's key must stick
            json!({"aaa": 0, "instances": [2]}),
        ]);

        let items = run(&op, ArrayKey::default(), QueryParams::new()).unwrap();

        assert_eq!(items, vec![json!(1), json!(2)]);
    }

    #[test]
    fn test_missing_or_null_array_yields_nothing() {
        let op = FakePages::new(vec![
            json!({"instances": null, "next": next("/v1/instances?start=p2")}),
            json!({"instances": [7]}),
        ]);

        let items = run(&op, ArrayKey::from("instances"), QueryParams::new()).unwrap();

        assert_eq!(items, vec![json!(7)]);
        assert_eq!(op.cursors().len(), 2);
    }

    #[test]
    fn test_non_array_field_skipped_and_walk_continues() {
        let op = FakePages::new(vec![
            json!({"instances": {"x": 1}, "next": next("/v1/instances?start=p2")}),
            json!({"instances": [8, 9]}),
        ]);

        let items = run(&op, ArrayKey::from("instances"), QueryParams::new()).unwrap();

        assert_eq!(items, vec![json!(8), json!(9)]);
        assert_eq!(op.cursors(), vec![None, Some("p2".to_string())]);
    }

    #[test]
    fn test_caller_start_used_for_first_call_only() {
        let op = FakePages::new(vec![
            json!({"instances": [1], "next": next("/v1/instances?start=p2")}),
            json!({"instances": [2]}),
        ]);
        let mut params = QueryParams::new();
        params.insert("start".to_string(), "resume".to_string());
        params.insert("limit".to_string(), "1".to_string());

        run(&op, ArrayKey::default(), params).unwrap();

        let calls = op.calls.lock().unwrap();
        assert_eq!(calls[0].0.as_deref(), Some("resume"));
        assert_eq!(calls[1].0.as_deref(), Some("p2"));
        for (_, params) in calls.iter() {
            assert!(!params.contains_key("start"));
            assert_eq!(params.get("limit").map(String::as_str), Some("1"));
        }
    }

    #[test]
    fn test_pages_fetched_on_demand() {
        let op = FakePages::new(vec![
            json!({"instances": [1, 2], "next": next("/v1/instances?start=p2")}),
            json!({"instances": [3]}),
        ]);

        let mut items = Box::pin(each_resource(&op, ArrayKey::default(), QueryParams::new()));

        assert_eq!(block_on(items.next()).unwrap().unwrap(), json!(1));
        assert_eq!(block_on(items.next()).unwrap().unwrap(), json!(2));
        assert_eq!(op.cursors().len(), 1);

        assert_eq!(block_on(items.next()).unwrap().unwrap(), json!(3));
        assert_eq!(op.cursors().len(), 2);
        assert!(block_on(items.next()).is_none());
    }

    #[test]
    fn test_transport_error_after_yielded_items() {
        let mut op = FakePages::new(vec![
            json!({"instances": [1, 2], "next": next("/v1/instances?start=p2")}),
            json!({"instances": [3]}),
        ]);
        op.fail_at = Some(1);

        let results: Vec<Result<Value>> = block_on(
            each_resource(&op, ArrayKey::default(), QueryParams::new()).collect(),
        );

        assert_eq!(results.len(), 3);
        assert_eq!(results[0].as_ref().unwrap(), &json!(1));
        assert_eq!(results[1].as_ref().unwrap(), &json!(2));
        assert!(results[2].is_err());
    }

    #[test]
    fn test_start_from_href_variants() {
        assert_eq!(
            start_from_href("https://us-south.iaas.cloud.ibm.com/v1/instances?limit=50&start=r006-abc"),
            Some("r006-abc".to_string())
        );
        assert_eq!(
            start_from_href("/v1/instances?start=a%2Fb#frag"),
            Some("a/b".to_string())
        );
        assert_eq!(start_from_href("https://x/v1/instances"), None);
        assert_eq!(
            start_from_href("/v1/instances?start=old&limit=5&start=new"),
            Some("new".to_string())
        );
    }

    #[test]
    fn test_continuation_states() {
        assert_eq!(continuation(&json!({"instances": []})), Continuation::Done);
        assert_eq!(continuation(&json!({"next": {"href": ""}})), Continuation::Done);
        assert_eq!(
            continuation(&json!({"next": {"href": "/v1/x?start=s"}})),
            Continuation::Next(Some("s".to_string()))
        );
    }
}
