//! In-memory backend fixture shared by the integration suites

use async_trait::async_trait;
use coalesce::{CollectionService, LoaderError, LoaderResult, Params, ServiceCall};
use parking_lot::Mutex;
use serde_json::{json, Map, Value};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

/// Collection backend over a fixed row set. Counts calls and records find
/// queries so tests can assert how often and with what the backend was hit.
pub struct TestService {
    rows: Vec<Value>,
    pub envelope: bool,
    pub has_find: bool,
    pub fail_next_find: AtomicBool,
    find_calls: AtomicUsize,
    get_calls: AtomicUsize,
    hooked_calls: AtomicUsize,
    queries: Mutex<Vec<Value>>,
}

impl TestService {
    pub fn new(rows: Vec<Value>) -> Self {
        Self {
            rows,
            envelope: false,
            has_find: true,
            fail_next_find: AtomicBool::new(false),
            find_calls: AtomicUsize::new(0),
            get_calls: AtomicUsize::new(0),
            hooked_calls: AtomicUsize::new(0),
            queries: Mutex::new(Vec::new()),
        }
    }

    pub fn with_envelope(mut self) -> Self {
        self.envelope = true;
        self
    }

    pub fn without_find(mut self) -> Self {
        self.has_find = false;
        self
    }

    pub fn find_count(&self) -> usize {
        self.find_calls.load(Ordering::SeqCst)
    }

    pub fn get_count(&self) -> usize {
        self.get_calls.load(Ordering::SeqCst)
    }

    pub fn hooked_count(&self) -> usize {
        self.hooked_calls.load(Ordering::SeqCst)
    }

    pub fn recorded_queries(&self) -> Vec<Value> {
        self.queries.lock().clone()
    }

    fn get_impl(&self, id: &Value) -> LoaderResult<Value> {
        self.get_calls.fetch_add(1, Ordering::SeqCst);
        self.rows
            .iter()
            .find(|row| row.get("id").map(skey) == Some(skey(id)))
            .cloned()
            .ok_or_else(|| LoaderError::Backend(format!("no record found for id {}", id)))
    }

    fn find_impl(&self, params: &Params) -> LoaderResult<Value> {
        self.find_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_next_find.swap(false, Ordering::SeqCst) {
            return Err(LoaderError::Backend("backend down".to_string()));
        }
        self.queries.lock().push(
            params
                .query
                .clone()
                .map(Value::Object)
                .unwrap_or(Value::Null),
        );
        let rows = self.filter(params.query.as_ref());
        Ok(if self.envelope {
            json!({ "total": rows.len(), "data": rows })
        } else {
            Value::Array(rows)
        })
    }

    fn filter(&self, query: Option<&Map<String, Value>>) -> Vec<Value> {
        let Some(query) = query else {
            return self.rows.clone();
        };
        self.rows
            .iter()
            .filter(|row| {
                query.iter().all(|(field, cond)| {
                    if field.starts_with('$') {
                        return true;
                    }
                    let value = row.get(field);
                    match cond {
                        Value::Object(cond) if cond.contains_key("$in") => {
                            match (value, cond.get("$in")) {
                                (Some(value), Some(Value::Array(options))) => {
                                    options.iter().any(|option| skey(option) == skey(value))
                                }
                                _ => false,
                            }
                        }
                        other => value.map_or(false, |value| skey(value) == skey(other)),
                    }
                })
            })
            .cloned()
            .collect()
    }
}

#[async_trait]
impl CollectionService for TestService {
    fn provides(&self, call: ServiceCall) -> bool {
        match call {
            ServiceCall::Find | ServiceCall::FindRaw => self.has_find,
            _ => true,
        }
    }

    async fn get(&self, id: &Value, params: &Params) -> LoaderResult<Value> {
        self.hooked_calls.fetch_add(1, Ordering::SeqCst);
        let _ = params;
        self.get_impl(id)
    }

    async fn find(&self, params: &Params) -> LoaderResult<Value> {
        self.hooked_calls.fetch_add(1, Ordering::SeqCst);
        self.find_impl(params)
    }

    async fn get_raw(&self, id: &Value, _params: &Params) -> LoaderResult<Value> {
        self.get_impl(id)
    }

    async fn find_raw(&self, params: &Params) -> LoaderResult<Value> {
        self.find_impl(params)
    }
}

fn skey(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

pub fn posts() -> Arc<TestService> {
    Arc::new(TestService::new(post_rows()))
}

pub fn comments() -> Arc<TestService> {
    Arc::new(TestService::new(comment_rows()))
}

pub fn post_rows() -> Vec<Value> {
    vec![
        json!({"id": 1, "body": "John post", "userId": 101, "starIds": [102, 103, 104]}),
        json!({"id": 2, "body": "Marshall post", "userId": 102, "starIds": [101, 103, 104]}),
        json!({"id": 3, "body": "Barbara post", "userId": 103}),
        json!({"id": 4, "body": "Aubree post", "userId": 104}),
    ]
}

pub fn comment_rows() -> Vec<Value> {
    vec![
        json!({"id": 11, "text": "John post Marshall comment 11", "postId": 1, "userId": 102}),
        json!({"id": 12, "text": "John post Marshall comment 12", "postId": 1, "userId": 102}),
        json!({"id": 13, "text": "John post Marshall comment 13", "postId": 1, "userId": 102}),
        json!({"id": 14, "text": "Marshall post John comment 14", "postId": 2, "userId": 101}),
        json!({"id": 15, "text": "Marshall post John comment 15", "postId": 2, "userId": 101}),
        json!({"id": 16, "text": "Barbara post John comment 16", "postId": 3, "userId": 101}),
        json!({"id": 17, "text": "Aubree post Marshall comment 17", "postId": 4, "userId": 102}),
    ]
}
